//! Terrain: chunk grid, shared LOD index buffers and height queries

use crate::chunk::{build_chunk_vertices, ChunkLayout, GridSpacing, TerrainChunk};
use crate::heightmap::Heightfield;
use crate::{CHUNK_GRID_SIZE, DETAIL_REPEATS_PER_CHUNK, MAX_CHUNK_TILE_RES, MAX_LOD_LEVELS};
use std::path::Path;
use xengine_asset::{Handle, ResourceCache, Texture};
use xengine_core::{is_power_of_two, BoundingBox, EngineError, IntRect, Result, Vec3};
use xengine_gpu::{
    create_index_buffer, create_vertex_buffer, BufferId, DrawCall, GpuBackend, Material, VertexLayout,
};
use xengine_scene::NodeView;

/// Lightmap brightness of a fully shadowed texel
const LIGHTMAP_AMBIENT: f32 = 0.35;

/// Terrain placement and LOD parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainConfig {
    /// World extent: x and z span the terrain, y is the height of 1.0
    pub size: Vec3,
    /// How far skirts drop below chunk edges
    pub skirt_height: f32,
    /// Camera distance covered by each LOD level
    pub lod_range: f32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            size: Vec3::new(512.0, 48.0, 512.0),
            skirt_height: 4.0,
            lod_range: 96.0,
        }
    }
}

/// Result of a vertical ray cast
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainIntersection {
    pub point: Vec3,
    pub normal: Vec3,
}

#[derive(Clone, Copy, Debug)]
struct LodIndexBuffer {
    buffer: BufferId,
    count: u32,
}

#[derive(Clone, Debug)]
struct Lightmap {
    res: u32,
    texels: Vec<u8>,
}

/// Chunk size in samples for a terrain resolution.
///
/// The resolution must be `CHUNK_GRID_SIZE` times a power of two between
/// 2 and `MAX_CHUNK_TILE_RES`.
pub fn chunk_tile_res_for(terrain_res: u32) -> Result<u32> {
    let tile = terrain_res / CHUNK_GRID_SIZE;
    if terrain_res % CHUNK_GRID_SIZE != 0 || !is_power_of_two(tile) || tile < 2 {
        return Err(EngineError::Configuration(format!(
            "terrain resolution {} is not {} x a power of two",
            terrain_res, CHUNK_GRID_SIZE
        )));
    }
    if tile > MAX_CHUNK_TILE_RES {
        return Err(EngineError::Configuration(format!(
            "terrain resolution {} needs chunks of {} tiles; at most {} fit 16-bit indices",
            terrain_res, tile, MAX_CHUNK_TILE_RES
        )));
    }
    Ok(tile)
}

/// A heightfield split into `CHUNK_GRID_SIZE x CHUNK_GRID_SIZE` chunks.
///
/// Coordinates passed to queries are terrain-local: the terrain spans
/// `[0, size.x) x [0, size.z)` on the XZ plane.
pub struct Terrain {
    heightfield: Heightfield,
    config: TerrainConfig,
    layout: ChunkLayout,
    spacing: GridSpacing,
    chunks: Vec<TerrainChunk>,
    index_buffers: Vec<LodIndexBuffer>,
    lightmap: Option<Lightmap>,
    texture_map: Option<Handle<Texture>>,
    detail_map: Option<Handle<Texture>>,
    lod_counts: Vec<usize>,
    pub material: Material,
}

impl Terrain {
    /// Build chunk vertex buffers and the shared LOD index buffers
    pub fn new(heightfield: Heightfield, config: TerrainConfig, gpu: &mut dyn GpuBackend) -> Result<Self> {
        let res = heightfield.res();
        let tile = chunk_tile_res_for(res)?;
        let levels = tile.trailing_zeros() + 1;
        if levels > MAX_LOD_LEVELS {
            return Err(EngineError::Configuration(format!(
                "{} LOD levels exceed the limit of {}",
                levels, MAX_LOD_LEVELS
            )));
        }
        if config.size.x <= 0.0 || config.size.z <= 0.0 {
            return Err(EngineError::Configuration(format!(
                "terrain size {:?} must be positive",
                config.size
            )));
        }

        let layout = ChunkLayout::new(tile);
        let spacing = GridSpacing {
            x: config.size.x / res as f32,
            z: config.size.z / res as f32,
            height_scale: config.size.y,
            res,
        };

        let index_buffers = (0..levels)
            .map(|level| {
                let indices = layout.lod_indices(level);
                LodIndexBuffer {
                    buffer: create_index_buffer(gpu, &indices),
                    count: indices.len() as u32,
                }
            })
            .collect();

        let mut chunks = Vec::with_capacity((CHUNK_GRID_SIZE * CHUNK_GRID_SIZE) as usize);
        for cz in 0..CHUNK_GRID_SIZE {
            for cx in 0..CHUNK_GRID_SIZE {
                let (ox, oz) = (cx * tile, cz * tile);
                let (vertices, bounds) =
                    build_chunk_vertices(&heightfield, layout, ox, oz, spacing, config.skirt_height);
                chunks.push(TerrainChunk {
                    vertex_buffer: create_vertex_buffer(gpu, &vertices),
                    region: IntRect::new(ox as i32, oz as i32, (ox + tile) as i32, (oz + tile) as i32),
                    bounds,
                });
            }
        }

        let terrain = Self {
            heightfield,
            config,
            layout,
            spacing,
            chunks,
            index_buffers,
            lightmap: None,
            texture_map: None,
            detail_map: None,
            lod_counts: vec![0; levels as usize],
            material: Material::default(),
        };

        let gap = terrain.max_seam_gap();
        if gap > config.skirt_height {
            log::warn!(
                "terrain seams may show: worst LOD gap {:.2} exceeds skirt height {:.2}",
                gap,
                config.skirt_height
            );
        }
        log::info!(
            "terrain {}x{}: {} chunks of {} tiles, {} LOD levels",
            res,
            res,
            terrain.chunks.len(),
            tile,
            levels
        );
        Ok(terrain)
    }

    /// Load an 8-bit heightmap image and build a terrain from it
    pub fn from_heightmap(path: &Path, config: TerrainConfig, gpu: &mut dyn GpuBackend) -> Result<Self> {
        Self::new(Heightfield::from_image(path)?, config, gpu)
    }

    /// A flat terrain of the given resolution
    pub fn with_size(terrain_res: u32, config: TerrainConfig, gpu: &mut dyn GpuBackend) -> Result<Self> {
        Self::new(Heightfield::flat(terrain_res), config, gpu)
    }

    pub fn terrain_res(&self) -> u32 {
        self.heightfield.res()
    }

    pub fn chunk_tile_res(&self) -> u32 {
        self.layout.tile
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn heightfield(&self) -> &Heightfield {
        &self.heightfield
    }

    pub fn lod_level_count(&self) -> usize {
        self.index_buffers.len()
    }

    pub fn chunks(&self) -> &[TerrainChunk] {
        &self.chunks
    }

    pub fn chunk(&self, cx: u32, cz: u32) -> Option<&TerrainChunk> {
        if cx >= CHUNK_GRID_SIZE || cz >= CHUNK_GRID_SIZE {
            return None;
        }
        self.chunks.get((cz * CHUNK_GRID_SIZE + cx) as usize)
    }

    /// Local bounds of the whole terrain, skirts included
    pub fn bounds(&self) -> BoundingBox {
        self.chunks
            .iter()
            .map(|c| c.bounds)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default()
    }

    /// Draws per LOD level during the last `render`
    pub fn lod_counts(&self) -> &[usize] {
        &self.lod_counts
    }

    /// LOD level for a chunk whose center is `distance` from the camera
    pub fn lod_for_distance(&self, distance: f32) -> usize {
        let coarsest = self.index_buffers.len().saturating_sub(1);
        if self.config.lod_range <= 0.0 {
            return 0;
        }
        ((distance / self.config.lod_range).floor().max(0.0) as usize).min(coarsest)
    }

    fn contains(&self, x: f32, z: f32) -> bool {
        x >= 0.0 && x < self.config.size.x && z >= 0.0 && z < self.config.size.z
    }

    /// World height at (x, z); positions outside clamp to the nearest edge
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.heightfield.sample(x / self.spacing.x, z / self.spacing.z) * self.config.size.y
    }

    /// Cast a vertical ray through `pos`. `None` outside the terrain.
    pub fn intersect_vertically_at(&self, pos: Vec3) -> Option<TerrainIntersection> {
        if !self.contains(pos.x, pos.z) {
            return None;
        }
        let fx = pos.x / self.spacing.x;
        let fz = pos.z / self.spacing.z;
        let normal = self
            .heightfield
            .normal(fx, fz, self.spacing.x, self.spacing.z, self.config.size.y);
        Some(TerrainIntersection {
            point: Vec3::new(pos.x, self.height_at(pos.x, pos.z), pos.z),
            normal: Vec3::from_array(normal),
        })
    }

    /// Lightmap brightness in [0..1] at `pos`; 1.0 without a lightmap
    pub fn sample_lightmap_at(&self, pos: Vec3) -> f32 {
        let Some(lightmap) = &self.lightmap else {
            return 1.0;
        };
        let last = lightmap.res as i32 - 1;
        let tx = ((pos.x / self.config.size.x * lightmap.res as f32).floor() as i32).clamp(0, last);
        let tz = ((pos.z / self.config.size.z * lightmap.res as f32).floor() as i32).clamp(0, last);
        f32::from(lightmap.texels[(tz * lightmap.res as i32 + tx) as usize]) / 255.0
    }

    /// Install a precomputed `res x res` lightmap
    pub fn set_lightmap(&mut self, texels: Vec<u8>, res: u32) -> Result<()> {
        if res == 0 || texels.len() != (res as usize) * (res as usize) {
            return Err(EngineError::Configuration(format!(
                "lightmap has {} texels, expected {}x{}",
                texels.len(),
                res,
                res
            )));
        }
        self.lightmap = Some(Lightmap { res, texels });
        Ok(())
    }

    /// Bake a `res x res` lightmap for light arriving from `to_light`:
    /// a Lambert term, darkened where a ray towards the light hits terrain.
    pub fn compute_lightmap(&mut self, to_light: Vec3, res: u32) -> Result<()> {
        let light = to_light.normalized();
        let step = self.spacing.x.min(self.spacing.z);
        let max_steps = ((self.config.size.x + self.config.size.z) / step) as usize * 2;

        let mut texels = Vec::with_capacity((res as usize) * (res as usize));
        for tz in 0..res {
            for tx in 0..res {
                let x = (tx as f32 + 0.5) / res as f32 * self.config.size.x;
                let z = (tz as f32 + 0.5) / res as f32 * self.config.size.z;
                let Some(hit) = self.intersect_vertically_at(Vec3::new(x, 0.0, z)) else {
                    texels.push(255);
                    continue;
                };
                let lambert = hit.normal.dot(&light).max(0.0);
                let lit = if lambert > 0.0 && !self.is_shadowed(hit.point, light, step, max_steps) {
                    lambert
                } else {
                    0.0
                };
                let value = LIGHTMAP_AMBIENT + (1.0 - LIGHTMAP_AMBIENT) * lit;
                texels.push((value * 255.0).round() as u8);
            }
        }
        self.set_lightmap(texels, res)
    }

    fn is_shadowed(&self, from: Vec3, light: Vec3, step: f32, max_steps: usize) -> bool {
        let mut p = from + Vec3::new(0.0, 0.01, 0.0);
        for _ in 0..max_steps {
            p += light * step;
            if !self.contains(p.x, p.z) || p.y > self.config.size.y {
                return false;
            }
            if self.height_at(p.x, p.z) > p.y {
                return true;
            }
        }
        false
    }

    /// Worst vertical mismatch along shared chunk edges between any two
    /// LOD levels. Skirts hide seams as long as this stays below the
    /// skirt height.
    pub fn max_seam_gap(&self) -> f32 {
        let res = self.heightfield.res();
        let tile = self.layout.tile;
        let levels = self.index_buffers.len() as u32;
        let hf = &self.heightfield;

        let mut worst = 0.0f32;
        let mut line_gap = |height: &dyn Fn(u32) -> f32| {
            for j in 0..=res {
                let (mut lo, mut hi) = (f32::MAX, f32::MIN);
                for level in 0..levels {
                    let step = 1u32 << level;
                    let a = j / step * step;
                    let value = if a == j {
                        height(j)
                    } else {
                        let t = (j - a) as f32 / step as f32;
                        height(a) * (1.0 - t) + height(a + step) * t
                    };
                    lo = lo.min(value);
                    hi = hi.max(value);
                }
                worst = worst.max(hi - lo);
            }
        };

        for k in 1..CHUNK_GRID_SIZE {
            let line = (k * tile) as i32;
            line_gap(&|j| hf.get(line, j as i32));
            line_gap(&|j| hf.get(j as i32, line));
        }
        worst * self.config.size.y
    }

    /// Acquire the color texture spanning the whole terrain
    pub fn set_texture_map(&mut self, file: &str, cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) -> Result<()> {
        let texture = cache.acquire::<Texture>(file, gpu)?;
        if let Some(old) = self.texture_map.replace(texture) {
            cache.release(old);
        }
        Ok(())
    }

    /// Acquire the detail texture repeated `DETAIL_REPEATS_PER_CHUNK` times per chunk
    pub fn set_detail_map(&mut self, file: &str, cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) -> Result<()> {
        let texture = cache.acquire::<Texture>(file, gpu)?;
        if let Some(old) = self.detail_map.replace(texture) {
            cache.release(old);
        }
        Ok(())
    }

    /// Cull chunks, pick a LOD per chunk and draw. Returns the number of draws.
    pub fn render(&mut self, view: &NodeView<'_>, gpu: &mut dyn GpuBackend) -> usize {
        self.lod_counts.iter_mut().for_each(|c| *c = 0);
        let camera = view.camera;
        let mvp = view.mvp();
        let model = view.model_matrix();
        let texture = self.texture_map.as_ref().map(|t| t.id());
        let detail = self.detail_map.as_ref().map(|t| t.id());

        let mut draws = 0;
        for chunk in &self.chunks {
            if !camera.is_visible_box_transformed(&chunk.bounds, view.position, &view.rotation) {
                continue;
            }
            let center = view.position + view.rotation.mul_vec3(chunk.center());
            let lod = self.lod_for_distance(camera.distance_to(center));
            let lod_buffer = self.index_buffers[lod];

            let mut call = DrawCall::new(chunk.vertex_buffer, lod_buffer.buffer, lod_buffer.count, VertexLayout::Lit);
            call.texture = texture;
            call.detail_texture = detail;
            call.detail_repeat = (DETAIL_REPEATS_PER_CHUNK * CHUNK_GRID_SIZE) as f32;
            call.mvp = mvp;
            call.model = model;
            call.material = self.material;
            call.fog = view.fog;
            gpu.draw(&call);

            self.lod_counts[lod] += 1;
            draws += 1;
        }
        log::trace!("terrain drew {} chunks, per LOD {:?}", draws, self.lod_counts);
        draws
    }

    /// Free chunk and shared buffers and release the textures
    pub fn release(self, cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) {
        for chunk in &self.chunks {
            gpu.destroy_buffer(chunk.vertex_buffer);
        }
        for lod in &self.index_buffers {
            gpu.destroy_buffer(lod.buffer);
        }
        for texture in [self.texture_map, self.detail_map].into_iter().flatten() {
            cache.release(texture);
        }
    }
}
