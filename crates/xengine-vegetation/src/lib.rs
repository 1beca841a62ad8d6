//! X-engine Vegetation - Batched trees and ground clutter
//!
//! Instances are bucketed into a grid of fixed-capacity batches. Each batch
//! owns one vertex buffer that is re-uploaded only when its membership
//! changes, and is drawn with a single draw call.

mod batch;
mod clutter;
mod tree;

pub use batch::BatchGrid;
pub use clutter::{
    ClutterInstance, ClutterSystem, ClutterType, ClutterUpdate, CLUTTER_BATCH_GRID_SIZE,
    MAX_CLUTTER_DENSITY, MAX_CLUTTER_PER_BATCH, MAX_CLUTTER_TYPES,
};
pub use tree::{
    populate_trees_procedurally, tree_count_for_density, TreeInstance, TreeSystem,
    MAX_TREES_PER_BATCH, TREE_BATCH_GRID_SIZE,
};

use xengine_terrain::Terrain;

/// Height and brightness of the surface vegetation stands on
pub trait Ground {
    fn height_at(&self, x: f32, z: f32) -> f32;

    /// Brightness in [0..1] used to shade instances
    fn lightness_at(&self, _x: f32, _z: f32) -> f32 {
        1.0
    }
}

impl Ground for Terrain {
    fn height_at(&self, x: f32, z: f32) -> f32 {
        Terrain::height_at(self, x, z)
    }

    fn lightness_at(&self, x: f32, z: f32) -> f32 {
        self.sample_lightmap_at(xengine_core::Vec3::new(x, 0.0, z))
    }
}

/// A level plane at a fixed height
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatGround(pub f32);

impl Ground for FlatGround {
    fn height_at(&self, _x: f32, _z: f32) -> f32 {
        self.0
    }
}

/// Grayscale vertex color for a lightness in [0..1]
pub(crate) fn shade(lightness: f32) -> [u8; 4] {
    let l = (lightness.clamp(0.0, 1.0) * 255.0).round() as u8;
    [l, l, l, 0xFF]
}
