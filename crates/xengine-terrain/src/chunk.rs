//! Terrain chunk geometry: grid vertices, skirts and LOD index lists

use crate::heightmap::Heightfield;
use xengine_core::{BoundingBox, IntRect, Vec3};
use xengine_gpu::{BufferId, Index, LitVertex};

/// Edges of a chunk in skirt order: top (z = 0), bottom (z = tile),
/// left (x = 0), right (x = tile)
const EDGES: usize = 4;

/// Vertex layout shared by every chunk of one terrain.
///
/// `(tile + 1)^2` grid vertices row by row, followed by one skirt vertex
/// per edge vertex (corners appear once per edge).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLayout {
    pub tile: u32,
}

impl ChunkLayout {
    pub fn new(tile: u32) -> Self {
        Self { tile }
    }

    fn side(&self) -> u32 {
        self.tile + 1
    }

    pub fn grid_vertex_count(&self) -> u32 {
        self.side() * self.side()
    }

    pub fn vertex_count(&self) -> u32 {
        self.grid_vertex_count() + EDGES as u32 * self.side()
    }

    pub fn grid_index(&self, x: u32, z: u32) -> Index {
        (z * self.side() + x) as Index
    }

    /// Grid coordinates of vertex `i` along `edge`
    fn edge_coords(&self, edge: usize, i: u32) -> (u32, u32) {
        match edge {
            0 => (i, 0),
            1 => (i, self.tile),
            2 => (0, i),
            _ => (self.tile, i),
        }
    }

    fn edge_index(&self, edge: usize, i: u32) -> Index {
        let (x, z) = self.edge_coords(edge, i);
        self.grid_index(x, z)
    }

    fn skirt_index(&self, edge: usize, i: u32) -> Index {
        (self.grid_vertex_count() + edge as u32 * self.side() + i) as Index
    }

    /// Triangle list for one LOD level. Level `l` steps over `2^l` tiles,
    /// and skirts follow the same step so they hang below the simplified edge.
    pub fn lod_indices(&self, level: u32) -> Vec<Index> {
        let step = 1u32 << level;
        let t = self.tile;
        let quads = (t / step) * (t / step);
        let mut indices = Vec::with_capacity((quads as usize + 4 * (t / step) as usize) * 6);

        for qz in (0..t).step_by(step as usize) {
            for qx in (0..t).step_by(step as usize) {
                let tl = self.grid_index(qx, qz);
                let tr = self.grid_index(qx + step, qz);
                let bl = self.grid_index(qx, qz + step);
                let br = self.grid_index(qx + step, qz + step);
                indices.extend_from_slice(&[tl, bl, br, tl, br, tr]);
            }
        }

        for edge in 0..EDGES {
            for i in (0..t).step_by(step as usize) {
                let a = self.edge_index(edge, i);
                let b = self.edge_index(edge, i + step);
                let sa = self.skirt_index(edge, i);
                let sb = self.skirt_index(edge, i + step);
                indices.extend_from_slice(&[a, sa, sb, a, sb, b]);
            }
        }
        indices
    }
}

/// Placement of a terrain's samples in world space
#[derive(Clone, Copy, Debug)]
pub struct GridSpacing {
    pub x: f32,
    pub z: f32,
    pub height_scale: f32,
    /// Samples per terrain side, for texture coordinates
    pub res: u32,
}

/// One square region of the terrain with its own vertex buffer
#[derive(Debug)]
pub struct TerrainChunk {
    pub vertex_buffer: BufferId,
    /// Sample region covered, right/bottom inclusive of the shared edge
    pub region: IntRect,
    /// Local bounds, including the skirt
    pub bounds: BoundingBox,
}

impl TerrainChunk {
    pub fn center(&self) -> Vec3 {
        self.bounds.center()
    }
}

/// Vertices for the chunk whose top-left sample is `(origin_x, origin_z)`.
/// Returns the vertices and their bounds.
pub fn build_chunk_vertices(
    heightfield: &Heightfield,
    layout: ChunkLayout,
    origin_x: u32,
    origin_z: u32,
    spacing: GridSpacing,
    skirt_height: f32,
) -> (Vec<LitVertex>, BoundingBox) {
    let mut vertices = Vec::with_capacity(layout.vertex_count() as usize);
    let mut bounds = BoundingBox::empty();

    let vertex_at = |x: u32, z: u32| {
        let sx = origin_x + x;
        let sz = origin_z + z;
        let position = [
            sx as f32 * spacing.x,
            heightfield.get(sx as i32, sz as i32) * spacing.height_scale,
            sz as f32 * spacing.z,
        ];
        let normal = heightfield.normal(sx as f32, sz as f32, spacing.x, spacing.z, spacing.height_scale);
        let texcoord = [sx as f32 / spacing.res as f32, sz as f32 / spacing.res as f32];
        LitVertex::new(position, normal, texcoord)
    };

    for z in 0..=layout.tile {
        for x in 0..=layout.tile {
            let v = vertex_at(x, z);
            bounds.include(Vec3::from_array(v.position));
            vertices.push(v);
        }
    }

    for edge in 0..EDGES {
        for i in 0..=layout.tile {
            let (x, z) = layout.edge_coords(edge, i);
            let mut v = vertex_at(x, z);
            v.position[1] -= skirt_height;
            bounds.include(Vec3::from_array(v.position));
            vertices.push(v);
        }
    }

    (vertices, bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_count_includes_skirt() {
        let layout = ChunkLayout::new(8);
        assert_eq!(layout.grid_vertex_count(), 81);
        assert_eq!(layout.vertex_count(), 81 + 36);

        let hf = Heightfield::flat(64);
        let spacing = GridSpacing { x: 1.0, z: 1.0, height_scale: 10.0, res: 64 };
        let (vertices, bounds) = build_chunk_vertices(&hf, layout, 8, 16, spacing, 2.0);
        assert_eq!(vertices.len(), layout.vertex_count() as usize);
        assert_eq!(bounds.min, Vec3::new(8.0, -2.0, 16.0));
        assert_eq!(bounds.max, Vec3::new(16.0, 0.0, 24.0));
    }

    #[test]
    fn test_lod_index_counts() {
        let layout = ChunkLayout::new(8);
        // level 0: 64 quads + 4 edges x 8 skirt quads
        assert_eq!(layout.lod_indices(0).len(), (64 + 32) * 6);
        // level 3: 1 quad + 4 skirt quads
        assert_eq!(layout.lod_indices(3).len(), (1 + 4) * 6);

        for level in 0..4 {
            assert!(layout
                .lod_indices(level)
                .iter()
                .all(|&i| u32::from(i) < layout.vertex_count()));
        }
    }

    #[test]
    fn test_skirt_hangs_below_edge() {
        let layout = ChunkLayout::new(2);
        let hf = Heightfield::from_heights(vec![0.5; 16], 4).unwrap();
        let spacing = GridSpacing { x: 1.0, z: 1.0, height_scale: 4.0, res: 4 };
        let (vertices, _) = build_chunk_vertices(&hf, layout, 0, 0, spacing, 1.5);

        for edge in 0..EDGES {
            for i in 0..=layout.tile {
                let top = vertices[layout.edge_index(edge, i) as usize];
                let skirt = vertices[layout.skirt_index(edge, i) as usize];
                assert_eq!(top.position[0], skirt.position[0]);
                assert_eq!(top.position[2], skirt.position[2]);
                assert_eq!(top.position[1] - skirt.position[1], 1.5);
            }
        }
    }
}
