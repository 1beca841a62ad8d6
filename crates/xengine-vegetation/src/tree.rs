//! Tree system: crossed-quad trees in a grid of batches

use crate::batch::BatchGrid;
use crate::{shade, Ground};
use std::f32::consts::TAU;
use xengine_asset::{Handle, ResourceCache, Texture};
use xengine_core::{BoundingBox, IntRect, Result, Rng, ScalarRect, Vec2, Vec3};
use xengine_gpu::{
    create_index_buffer, create_vertex_buffer, write_vertices, BlendMode, BufferId, ColorVertex, DrawCall,
    GpuBackend, Index, VertexLayout,
};
use xengine_scene::NodeView;

/// Batches per side. Must be a power of two.
pub const TREE_BATCH_GRID_SIZE: u32 = 4;
pub const MAX_TREES_PER_BATCH: usize = 100;

const VERTICES_PER_TREE: usize = 8;
const INDICES_PER_TREE: usize = 12;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TreeInstance {
    /// Position on the ground plane (`y` is world Z)
    pub position: Vec2,
    pub size: f32,
    /// Yaw in radians
    pub rotation: f32,
}

/// `count` trees spread uniformly over `area`
pub fn populate_trees_procedurally(
    count: usize,
    min_size: f32,
    max_size: f32,
    area: ScalarRect,
    rng: &mut Rng,
) -> Vec<TreeInstance> {
    (0..count)
        .map(|_| TreeInstance {
            position: Vec2::new(rng.range(area.left, area.right), rng.range(area.top, area.bottom)),
            size: rng.range(min_size, max_size),
            rotation: rng.range(0.0, TAU),
        })
        .collect()
}

/// Number of trees for a density (trees per square unit) over `area`
pub fn tree_count_for_density(density: f32, area: &ScalarRect) -> usize {
    (density.max(0.0) * area.area()).floor() as usize
}

#[derive(Debug, Default)]
struct TreeBatch {
    vertex_buffer: Option<BufferId>,
    tree_count: usize,
    bounds: BoundingBox,
    rebuilds: usize,
}

/// All trees of a map, batched by position
pub struct TreeSystem {
    grid: BatchGrid,
    trees: Vec<TreeInstance>,
    /// Batch of each tree; `None` for trees dropped by a full batch
    cells: Vec<Option<(u32, u32)>>,
    batches: Vec<TreeBatch>,
    index_buffer: Option<BufferId>,
    texture: Option<Handle<Texture>>,
    batches_drawn: usize,
}

impl TreeSystem {
    pub fn new(area: ScalarRect) -> Self {
        let cells = (TREE_BATCH_GRID_SIZE * TREE_BATCH_GRID_SIZE) as usize;
        Self {
            grid: BatchGrid::new(TREE_BATCH_GRID_SIZE, area, MAX_TREES_PER_BATCH),
            trees: Vec::new(),
            cells: Vec::new(),
            batches: (0..cells).map(|_| TreeBatch::default()).collect(),
            index_buffer: None,
            texture: None,
            batches_drawn: 0,
        }
    }

    pub fn set_texture(&mut self, file: &str, cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) -> Result<()> {
        let texture = cache.acquire::<Texture>(file, gpu)?;
        if let Some(old) = self.texture.replace(texture) {
            cache.release(old);
        }
        Ok(())
    }

    pub fn trees(&self) -> &[TreeInstance] {
        &self.trees
    }

    /// Trees placed in a batch (excludes rejected ones)
    pub fn placed_count(&self) -> usize {
        self.grid.len()
    }

    /// Trees dropped because their batch was full
    pub fn rejected_count(&self) -> usize {
        self.grid.rejected()
    }

    pub fn batch_tree_count(&self, x: u32, y: u32) -> usize {
        self.batch(x, y).tree_count
    }

    /// Times batch (x, y) was rebuilt
    pub fn batch_rebuilds(&self, x: u32, y: u32) -> usize {
        self.batch(x, y).rebuilds
    }

    /// Batches drawn by the last `render`
    pub fn batches_drawn(&self) -> usize {
        self.batches_drawn
    }

    fn slot(x: u32, y: u32) -> usize {
        (y * TREE_BATCH_GRID_SIZE + x) as usize
    }

    fn batch(&self, x: u32, y: u32) -> &TreeBatch {
        &self.batches[Self::slot(x, y)]
    }

    /// Replace every tree and rebuild all batches
    pub fn set_trees(&mut self, trees: Vec<TreeInstance>, ground: &dyn Ground, gpu: &mut dyn GpuBackend) {
        self.grid.clear();
        self.cells = trees
            .iter()
            .enumerate()
            .map(|(i, t)| self.grid.insert(i, t.position.x, t.position.y))
            .collect();
        self.trees = trees;

        if self.grid.rejected() > 0 {
            log::warn!(
                "{} of {} trees dropped: batches hold at most {}",
                self.grid.rejected(),
                self.trees.len(),
                MAX_TREES_PER_BATCH
            );
        }
        if self.index_buffer.is_none() {
            self.index_buffer = Some(create_index_buffer(gpu, &shared_tree_indices()));
        }
        self.update_trees_region(self.grid.full_region(), ground, gpu);
    }

    /// Rebuild every batch in a cell rectangle (right/bottom exclusive)
    pub fn update_trees_region(&mut self, region: IntRect, ground: &dyn Ground, gpu: &mut dyn GpuBackend) {
        let size = TREE_BATCH_GRID_SIZE as i32;
        let region = region.clamped(size, size);
        for y in region.top..region.bottom {
            for x in region.left..region.right {
                self.update_tree_batch(x as u32, y as u32, ground, gpu);
            }
        }
    }

    /// Regenerate and upload the geometry of one batch
    pub fn update_tree_batch(&mut self, x: u32, y: u32, ground: &dyn Ground, gpu: &mut dyn GpuBackend) {
        let mut vertices = Vec::with_capacity(self.grid.cell(x, y).len() * VERTICES_PER_TREE);
        let mut bounds = BoundingBox::empty();
        for &index in self.grid.cell(x, y) {
            let tree = &self.trees[index];
            let base_y = ground.height_at(tree.position.x, tree.position.y);
            let color = shade(ground.lightness_at(tree.position.x, tree.position.y));
            push_tree_vertices(&mut vertices, tree, base_y, color);

            let half = tree.size * 0.5;
            bounds.include(Vec3::new(tree.position.x - half, base_y, tree.position.y - half));
            bounds.include(Vec3::new(tree.position.x + half, base_y + tree.size, tree.position.y + half));
        }

        let batch = &mut self.batches[Self::slot(x, y)];
        batch.tree_count = vertices.len() / VERTICES_PER_TREE;
        batch.bounds = bounds;
        batch.rebuilds += 1;
        if !vertices.is_empty() {
            let buffer = *batch.vertex_buffer.get_or_insert_with(|| {
                create_vertex_buffer(gpu, &vec![ColorVertex::default(); MAX_TREES_PER_BATCH * VERTICES_PER_TREE])
            });
            write_vertices(gpu, buffer, 0, &vertices);
        }
        log::trace!("tree batch ({}, {}) rebuilt with {} trees", x, y, batch.tree_count);
    }

    /// Move tree `index`. Only the batches it leaves and enters are rebuilt.
    /// Returns false (and leaves the tree alone) if the index is unknown
    /// or the destination batch is full.
    pub fn move_tree(&mut self, index: usize, position: Vec2, ground: &dyn Ground, gpu: &mut dyn GpuBackend) -> bool {
        let Some(Some(from)) = self.cells.get(index).copied() else {
            return false;
        };
        let to = self.grid.cell_of(position.x, position.y);
        if to != from {
            if self.grid.is_full(to) {
                log::debug!("tree {} cannot move: batch {:?} is full", index, to);
                return false;
            }
            self.grid.remove(index, from);
            self.grid.insert(index, position.x, position.y);
            self.cells[index] = Some(to);
        }
        self.trees[index].position = position;

        self.update_tree_batch(from.0, from.1, ground, gpu);
        if to != from {
            self.update_tree_batch(to.0, to.1, ground, gpu);
        }
        true
    }

    /// Union of the bounds of non-empty batches in a cell rectangle.
    /// Empty if the region holds no trees.
    pub fn bounds_of_batch_region(&self, region: IntRect) -> BoundingBox {
        let size = TREE_BATCH_GRID_SIZE as i32;
        let region = region.clamped(size, size);
        let mut bounds = BoundingBox::empty();
        for y in region.top..region.bottom {
            for x in region.left..region.right {
                let batch = self.batch(x as u32, y as u32);
                if batch.tree_count > 0 {
                    bounds = bounds.union(&batch.bounds);
                }
            }
        }
        bounds
    }

    /// Draw every visible batch. Returns the number of draws.
    pub fn render(&mut self, view: &NodeView<'_>, gpu: &mut dyn GpuBackend) -> usize {
        self.batches_drawn = 0;
        let mut draws = 0;
        self.render_region(self.grid.full_region(), view, gpu, &mut draws);
        self.batches_drawn = draws;
        draws
    }

    /// Cull a region as a whole, then its quadrants, down to single batches
    pub fn render_region(&self, region: IntRect, view: &NodeView<'_>, gpu: &mut dyn GpuBackend, draws: &mut usize) {
        if region.width() <= 0 || region.height() <= 0 {
            return;
        }
        let bounds = self.bounds_of_batch_region(region);
        if bounds.is_empty()
            || !view
                .camera
                .is_visible_box_transformed(&bounds, view.position, &view.rotation)
        {
            return;
        }

        if region.width() == 1 && region.height() == 1 {
            self.draw_batch(region.left as u32, region.top as u32, view, gpu);
            *draws += 1;
            return;
        }

        let split = |lo: i32, hi: i32| -> Vec<(i32, i32)> {
            if hi - lo > 1 {
                let mid = lo + (hi - lo) / 2;
                vec![(lo, mid), (mid, hi)]
            } else {
                vec![(lo, hi)]
            }
        };
        for (top, bottom) in split(region.top, region.bottom) {
            for &(left, right) in &split(region.left, region.right) {
                self.render_region(IntRect::new(left, top, right, bottom), view, gpu, draws);
            }
        }
    }

    fn draw_batch(&self, x: u32, y: u32, view: &NodeView<'_>, gpu: &mut dyn GpuBackend) {
        let batch = self.batch(x, y);
        let (Some(vertex_buffer), Some(index_buffer)) = (batch.vertex_buffer, self.index_buffer) else {
            return;
        };
        let mut call = DrawCall::new(
            vertex_buffer,
            index_buffer,
            (batch.tree_count * INDICES_PER_TREE) as u32,
            VertexLayout::Colored,
        );
        call.texture = self.texture.as_ref().map(|t| t.id());
        call.blend = BlendMode::Alpha;
        call.mvp = view.mvp();
        call.model = view.model_matrix();
        call.fog = view.fog;
        gpu.draw(&call);
    }

    pub fn release(self, cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) {
        for buffer in self.batches.iter().filter_map(|b| b.vertex_buffer) {
            gpu.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer {
            gpu.destroy_buffer(buffer);
        }
        if let Some(texture) = self.texture {
            cache.release(texture);
        }
    }
}

/// Two quads crossing at the trunk, each `size` wide and tall
fn push_tree_vertices(out: &mut Vec<ColorVertex>, tree: &TreeInstance, base_y: f32, color: [u8; 4]) {
    let half = tree.size * 0.5;
    let (sin, cos) = tree.rotation.sin_cos();
    let base = Vec3::new(tree.position.x, base_y, tree.position.y);
    let up = Vec3::new(0.0, tree.size, 0.0);
    for dir in [Vec3::new(cos, 0.0, sin), Vec3::new(-sin, 0.0, cos)] {
        let d = dir * half;
        out.push(ColorVertex::new((base - d).to_array(), [0.0, 1.0], color));
        out.push(ColorVertex::new((base + d).to_array(), [1.0, 1.0], color));
        out.push(ColorVertex::new((base + d + up).to_array(), [1.0, 0.0], color));
        out.push(ColorVertex::new((base - d + up).to_array(), [0.0, 0.0], color));
    }
}

fn shared_tree_indices() -> Vec<Index> {
    let quads = MAX_TREES_PER_BATCH * 2;
    (0..quads)
        .flat_map(|q| {
            let b = (q * 4) as Index;
            [b, b + 1, b + 2, b, b + 2, b + 3]
        })
        .collect()
}
