//! Clutter system: grass and rocks scattered by density, shown by view range

use crate::batch::BatchGrid;
use crate::{shade, Ground};
use std::f32::consts::TAU;
use xengine_asset::{Handle, ResourceCache, Texture};
use xengine_core::{BoundingBox, EngineError, Result, Rng, ScalarRect, Vec3};
use xengine_gpu::{
    create_index_buffer, create_vertex_buffer, write_vertices, BlendMode, BufferId, ColorVertex, DrawCall,
    GpuBackend, Index, VertexLayout,
};
use xengine_scene::{Camera, NodeView};
use xengine_script::ScriptNode;

pub const MAX_CLUTTER_TYPES: usize = 4;
pub const CLUTTER_BATCH_GRID_SIZE: u32 = 8;
pub const MAX_CLUTTER_PER_BATCH: usize = 256;
/// Upper bound on instances per square unit for one type
pub const MAX_CLUTTER_DENSITY: f32 = 100.0;

/// Placement and look of one kind of clutter. Type `i` uses cell `i` of a
/// 2x2 texture atlas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClutterType {
    /// Instances per square unit
    pub density: f32,
    pub y_offset: f32,
    pub min_size: f32,
    pub max_size: f32,
    pub min_view_range: f32,
    pub max_view_range: f32,
    pub min_lightness: f32,
    pub max_lightness: f32,
}

impl Default for ClutterType {
    fn default() -> Self {
        Self {
            density: 0.0,
            y_offset: 0.0,
            min_size: 0.5,
            max_size: 1.0,
            min_view_range: 20.0,
            max_view_range: 40.0,
            min_lightness: 0.8,
            max_lightness: 1.0,
        }
    }
}

impl ClutterType {
    /// Read a `type { density ..; y_offset ..; size min max; view_range min max;
    /// lightness min max }` node. Absent fields keep their defaults.
    pub fn from_script(node: &ScriptNode) -> Result<Self> {
        let d = Self::default();
        let clutter = Self {
            density: node.subnode_f32_or("density", 0, d.density)?,
            y_offset: node.subnode_f32_or("y_offset", 0, d.y_offset)?,
            min_size: node.subnode_f32_or("size", 0, d.min_size)?,
            max_size: node.subnode_f32_or("size", 1, d.max_size)?,
            min_view_range: node.subnode_f32_or("view_range", 0, d.min_view_range)?,
            max_view_range: node.subnode_f32_or("view_range", 1, d.max_view_range)?,
            min_lightness: node.subnode_f32_or("lightness", 0, d.min_lightness)?,
            max_lightness: node.subnode_f32_or("lightness", 1, d.max_lightness)?,
        };
        clutter.validate()?;
        Ok(clutter)
    }

    /// Every field finite and the density within `0..=MAX_CLUTTER_DENSITY`
    pub fn validate(&self) -> Result<()> {
        let fields = [
            self.density,
            self.y_offset,
            self.min_size,
            self.max_size,
            self.min_view_range,
            self.max_view_range,
            self.min_lightness,
            self.max_lightness,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::Configuration("clutter type values must be finite".into()));
        }
        if !(0.0..=MAX_CLUTTER_DENSITY).contains(&self.density) {
            return Err(EngineError::Configuration(format!(
                "clutter density {} outside 0..={}",
                self.density, MAX_CLUTTER_DENSITY
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClutterInstance {
    pub type_index: usize,
    pub position: Vec3,
    pub size: f32,
    pub view_range: f32,
    pub lightness: f32,
    pub wave_freq: f32,
    pub wave_phase: f32,
    pub wave_mag: f32,
    pub visible: bool,
}

/// What one [`ClutterSystem::update`] did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClutterUpdate {
    /// Batches whose visible membership changed
    pub rebuilt: usize,
    /// Batches re-uploaded for wind sway only
    pub swayed: usize,
}

#[derive(Debug, Default)]
struct ClutterBatch {
    vertex_buffer: Option<BufferId>,
    /// Visible members, in draw order
    visible: Vec<usize>,
    bounds: BoundingBox,
    rebuilds: usize,
}

/// A fixed-capacity set of clutter instances
pub struct ClutterSystem {
    capacity: usize,
    types: Vec<ClutterType>,
    instances: Vec<ClutterInstance>,
    grid: BatchGrid,
    batches: Vec<ClutterBatch>,
    index_buffer: Option<BufferId>,
    atlas: Option<Handle<Texture>>,
}

impl ClutterSystem {
    /// A system holding at most `capacity` instances over `area`
    pub fn new(capacity: usize, area: ScalarRect) -> Self {
        let cells = (CLUTTER_BATCH_GRID_SIZE * CLUTTER_BATCH_GRID_SIZE) as usize;
        Self {
            capacity,
            types: Vec::new(),
            instances: Vec::new(),
            grid: BatchGrid::new(CLUTTER_BATCH_GRID_SIZE, area, MAX_CLUTTER_PER_BATCH),
            batches: (0..cells).map(|_| ClutterBatch::default()).collect(),
            index_buffer: None,
            atlas: None,
        }
    }

    pub fn set_atlas_texture(&mut self, file: &str, cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) -> Result<()> {
        let texture = cache.acquire::<Texture>(file, gpu)?;
        if let Some(old) = self.atlas.replace(texture) {
            cache.release(old);
        }
        Ok(())
    }

    pub fn types(&self) -> &[ClutterType] {
        &self.types
    }

    /// Replace the clutter types. Call [`ClutterSystem::regen_clutter_types`] afterwards.
    pub fn set_types(&mut self, types: Vec<ClutterType>) -> Result<()> {
        if types.len() > MAX_CLUTTER_TYPES {
            return Err(EngineError::Configuration(format!(
                "{} clutter types given, at most {} are supported",
                types.len(),
                MAX_CLUTTER_TYPES
            )));
        }
        self.types = types;
        Ok(())
    }

    /// Read every `type` subnode of `node`
    pub fn load_clutter_types_from_script(&mut self, node: &ScriptNode) -> Result<()> {
        let types = node
            .subnodes_named("type")
            .map(ClutterType::from_script)
            .collect::<Result<Vec<_>>>()?;
        self.set_types(types)
    }

    pub fn instances(&self) -> &[ClutterInstance] {
        &self.instances
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Instances dropped by full batches during the last regeneration
    pub fn rejected_count(&self) -> usize {
        self.grid.rejected()
    }

    pub fn visible_count(&self) -> usize {
        self.batches.iter().map(|b| b.visible.len()).sum()
    }

    pub fn batch_rebuilds(&self, x: u32, y: u32) -> usize {
        self.batches[(y * CLUTTER_BATCH_GRID_SIZE + x) as usize].rebuilds
    }

    /// Scatter instances for the current types. Each type gets
    /// `density x area` instances, scaled down together when the total
    /// exceeds the capacity.
    pub fn regen_clutter_types(&mut self, ground: &dyn Ground, rng: &mut Rng, gpu: &mut dyn GpuBackend) {
        let bounds = self.grid.area();
        let area = bounds.area();
        let capacity = self.capacity as f64;
        // NaN densities count as zero and no single type asks for more than
        // the capacity, so the sum stays finite
        let wanted: Vec<f64> = self
            .types
            .iter()
            .map(|t| f64::from((t.density.max(0.0) * area).floor()).min(capacity))
            .collect();
        let total: f64 = wanted.iter().sum();
        let scale = if total > capacity { capacity / total } else { 1.0 };
        let counts: Vec<usize> = wanted.iter().map(|&n| (n * scale).floor() as usize).collect();

        self.grid.clear();
        self.instances.clear();
        for batch in &mut self.batches {
            batch.visible.clear();
            batch.bounds = BoundingBox::empty();
        }

        for (type_index, (ty, &count)) in self.types.iter().zip(&counts).enumerate() {
            for _ in 0..count {
                let x = rng.range(bounds.left, bounds.right);
                let z = rng.range(bounds.top, bounds.bottom);
                let size = rng.range(ty.min_size, ty.max_size);
                let instance = ClutterInstance {
                    type_index,
                    position: Vec3::new(x, ground.height_at(x, z) + ty.y_offset, z),
                    size,
                    view_range: rng.range(ty.min_view_range, ty.max_view_range),
                    lightness: rng.range(ty.min_lightness, ty.max_lightness) * ground.lightness_at(x, z),
                    wave_freq: rng.range(1.0, 2.5),
                    wave_phase: rng.range(0.0, TAU),
                    wave_mag: size * rng.range(0.05, 0.15),
                    visible: false,
                };
                if self.grid.insert(self.instances.len(), x, z).is_some() {
                    self.instances.push(instance);
                }
            }
        }

        if self.index_buffer.is_none() {
            self.index_buffer = Some(create_index_buffer(gpu, &shared_quad_indices(MAX_CLUTTER_PER_BATCH)));
        }
        if self.grid.rejected() > 0 {
            log::warn!("{} clutter instances dropped by full batches", self.grid.rejected());
        }
        log::info!(
            "clutter regenerated: {} instances of {} types",
            self.instances.len(),
            self.types.len()
        );
    }

    /// Toggle instance visibility by view range and re-upload batches.
    /// Batches whose visible set changed are rebuilt; other visible batches
    /// only get their sway animation re-uploaded.
    pub fn update(&mut self, camera: &Camera, time: f32, gpu: &mut dyn GpuBackend) -> ClutterUpdate {
        let mut result = ClutterUpdate::default();
        let right = horizontal_right(camera);

        for y in 0..CLUTTER_BATCH_GRID_SIZE {
            for x in 0..CLUTTER_BATCH_GRID_SIZE {
                let slot = (y * CLUTTER_BATCH_GRID_SIZE + x) as usize;
                let mut changed = false;
                for &index in self.grid.cell(x, y) {
                    let instance = &mut self.instances[index];
                    let visible = camera.distance_squared_to(instance.position) <= instance.view_range * instance.view_range;
                    if visible != instance.visible {
                        instance.visible = visible;
                        changed = true;
                    }
                }

                let batch = &mut self.batches[slot];
                if changed {
                    batch.visible = self
                        .grid
                        .cell(x, y)
                        .iter()
                        .copied()
                        .filter(|&i| self.instances[i].visible)
                        .collect();
                    batch.bounds = BoundingBox::empty();
                    for &i in &batch.visible {
                        let inst = &self.instances[i];
                        let half = inst.size * 0.5 + inst.wave_mag;
                        batch.bounds.include(inst.position - Vec3::new(half, 0.0, half));
                        batch.bounds.include(inst.position + Vec3::new(half, inst.size, half));
                    }
                    batch.rebuilds += 1;
                    result.rebuilt += 1;
                } else if !batch.visible.is_empty() {
                    result.swayed += 1;
                }

                if !batch.visible.is_empty() {
                    let vertices: Vec<ColorVertex> = batch
                        .visible
                        .iter()
                        .flat_map(|&i| instance_vertices(&self.instances[i], right, time))
                        .collect();
                    let buffer = *batch.vertex_buffer.get_or_insert_with(|| {
                        create_vertex_buffer(gpu, &vec![ColorVertex::default(); MAX_CLUTTER_PER_BATCH * 4])
                    });
                    write_vertices(gpu, buffer, 0, &vertices);
                }
            }
        }
        result
    }

    /// Draw batches with visible members that pass the box test
    pub fn render(&mut self, view: &NodeView<'_>, gpu: &mut dyn GpuBackend) -> usize {
        let Some(index_buffer) = self.index_buffer else {
            return 0;
        };
        let mut draws = 0;
        for batch in &self.batches {
            let Some(vertex_buffer) = batch.vertex_buffer else {
                continue;
            };
            if batch.visible.is_empty()
                || !view
                    .camera
                    .is_visible_box_transformed(&batch.bounds, view.position, &view.rotation)
            {
                continue;
            }
            let mut call = DrawCall::new(vertex_buffer, index_buffer, (batch.visible.len() * 6) as u32, VertexLayout::Colored);
            call.texture = self.atlas.as_ref().map(|t| t.id());
            call.blend = BlendMode::Alpha;
            call.mvp = view.mvp();
            call.model = view.model_matrix();
            call.fog = view.fog;
            gpu.draw(&call);
            draws += 1;
        }
        draws
    }

    pub fn release(self, cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) {
        for buffer in self.batches.iter().filter_map(|b| b.vertex_buffer) {
            gpu.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer {
            gpu.destroy_buffer(buffer);
        }
        if let Some(atlas) = self.atlas {
            cache.release(atlas);
        }
    }
}

/// Camera right vector flattened onto the ground plane
fn horizontal_right(camera: &Camera) -> Vec3 {
    let right = camera.look.cross(&camera.up);
    let flat = Vec3::new(right.x, 0.0, right.z);
    if flat.length_squared() < 1e-8 {
        Vec3::UNIT_X
    } else {
        flat.normalized()
    }
}

/// Camera-facing quad whose top edge sways along `right`
fn instance_vertices(instance: &ClutterInstance, right: Vec3, time: f32) -> [ColorVertex; 4] {
    let half = right * (instance.size * 0.5);
    let sway = right * ((time * instance.wave_freq + instance.wave_phase).sin() * instance.wave_mag);
    let up = Vec3::new(0.0, instance.size, 0.0);
    let p = instance.position;
    let color = shade(instance.lightness);

    let u0 = (instance.type_index % 2) as f32 * 0.5;
    let v0 = (instance.type_index / 2) as f32 * 0.5;
    let (u1, v1) = (u0 + 0.5, v0 + 0.5);
    [
        ColorVertex::new((p - half).to_array(), [u0, v1], color),
        ColorVertex::new((p + half).to_array(), [u1, v1], color),
        ColorVertex::new((p + half + up + sway).to_array(), [u1, v0], color),
        ColorVertex::new((p - half + up + sway).to_array(), [u0, v0], color),
    ]
}

fn shared_quad_indices(quads: usize) -> Vec<Index> {
    (0..quads)
        .flat_map(|q| {
            let b = (q * 4) as Index;
            [b, b + 1, b + 2, b, b + 2, b + 3]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlatGround;
    use xengine_core::Mat3;
    use xengine_gpu::RecordingBackend;
    use xengine_scene::NodeId;

    fn area() -> ScalarRect {
        ScalarRect::new(0.0, 0.0, 100.0, 100.0)
    }

    fn grass(density: f32) -> ClutterType {
        ClutterType {
            density,
            min_view_range: 15.0,
            max_view_range: 15.0,
            ..ClutterType::default()
        }
    }

    #[test]
    fn test_types_from_script() {
        let node = ScriptNode::parse(
            "clutter {\n type { density 0.02; size 0.5 1.5; view_range 10 30 }\n type { lightness 0.5 0.6 }\n}",
        )
        .unwrap();
        let mut system = ClutterSystem::new(100, area());
        system
            .load_clutter_types_from_script(node.required_subnode("clutter").unwrap())
            .unwrap();
        assert_eq!(system.types().len(), 2);
        assert_eq!(system.types()[0].density, 0.02);
        assert_eq!(system.types()[0].max_size, 1.5);
        assert_eq!(system.types()[0].min_view_range, 10.0);
        assert_eq!(system.types()[1].min_lightness, 0.5);
        assert_eq!(system.types()[1].density, 0.0);

        let too_many = ScriptNode::parse("type\ntype\ntype\ntype\ntype").unwrap();
        assert!(system.load_clutter_types_from_script(&too_many).unwrap_err().is_configuration());
    }

    #[test]
    fn test_regen_is_proportional_and_capped() {
        let mut gpu = RecordingBackend::new();
        let mut rng = Rng::new(11);
        let mut system = ClutterSystem::new(200, area());
        system.set_types(vec![grass(0.01), grass(0.03)]).unwrap();
        system.regen_clutter_types(&FlatGround(2.0), &mut rng, &mut gpu);

        let count = |t: usize| system.instances().iter().filter(|i| i.type_index == t).count();
        assert_eq!(count(0) + system.rejected_count(), 50);
        assert_eq!(count(1), 150);
        assert!(system.instances().iter().all(|i| i.position.y == 2.0 && !i.visible));
        system.release(&mut ResourceCache::new("."), &mut gpu);
    }

    #[test]
    fn test_huge_densities_stay_within_capacity() {
        let mut gpu = RecordingBackend::new();
        let mut rng = Rng::new(3);
        let mut system = ClutterSystem::new(300, ScalarRect::new(0.0, 0.0, 64.0, 64.0));
        system
            .set_types(vec![grass(1e30), grass(f32::INFINITY), grass(f32::NAN)])
            .unwrap();
        system.regen_clutter_types(&FlatGround(0.0), &mut rng, &mut gpu);

        let count = |t: usize| system.instances().iter().filter(|i| i.type_index == t).count();
        assert_eq!(count(0) + count(1) + system.rejected_count(), 300);
        assert_eq!(count(2), 0);
        system.release(&mut ResourceCache::new("."), &mut gpu);
    }

    #[test]
    fn test_script_density_is_bounded() {
        for text in ["type { density 1e30 }", "type { density inf }", "type { density -1 }", "type { size 1 nan }"] {
            let node = ScriptNode::parse(text).unwrap();
            let err = ClutterType::from_script(node.subnode(0).unwrap()).unwrap_err();
            assert!(err.is_configuration(), "{}: {:?}", text, err);
        }
        let node = ScriptNode::parse("type { density 100 }").unwrap();
        assert_eq!(ClutterType::from_script(node.subnode(0).unwrap()).unwrap().density, MAX_CLUTTER_DENSITY);
    }

    #[test]
    fn test_update_rebuilds_only_changed_batches() {
        let mut gpu = RecordingBackend::new();
        let mut rng = Rng::new(5);
        let mut system = ClutterSystem::new(2000, area());
        system.set_types(vec![grass(0.1)]).unwrap();
        system.regen_clutter_types(&FlatGround(0.0), &mut rng, &mut gpu);

        let mut camera = Camera::new();
        camera.origin = Vec3::new(5.0, 1.0, 5.0);
        camera.look = Vec3::new(1.0, 0.0, 1.0);
        camera.update();

        let first = system.update(&camera, 0.0, &mut gpu);
        assert!(first.rebuilt > 0);
        let visible = system.visible_count();
        assert!(visible > 0 && visible < system.instances().len());

        // same position: nothing changes membership, visible batches only sway
        let second = system.update(&camera, 0.5, &mut gpu);
        assert_eq!(second.rebuilt, 0);
        assert_eq!(second.swayed, first.rebuilt);
        // the far corner batch never had visible members
        assert_eq!(system.batch_rebuilds(7, 7), 0);

        let view = NodeView {
            id: NodeId::default(),
            position: Vec3::ZERO,
            rotation: Mat3::IDENTITY,
            bounding_box: BoundingBox::default(),
            bounding_radius: 1000.0,
            use_bounding_sphere_only: true,
            camera: &camera,
            fog: None,
        };
        let draws = system.render(&view, &mut gpu);
        assert!(draws > 0);
        assert_eq!(gpu.pending_errors(), 0);

        camera.origin = Vec3::new(95.0, 1.0, 95.0);
        camera.update();
        let moved = system.update(&camera, 1.0, &mut gpu);
        assert!(moved.rebuilt > 0);
        assert!(system.batch_rebuilds(7, 7) > 0);
        system.release(&mut ResourceCache::new("."), &mut gpu);
    }
}
