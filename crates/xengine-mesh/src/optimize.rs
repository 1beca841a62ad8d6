//! Converter-side mesh optimization

use crate::format::{MeshData, SubmeshData};
use std::collections::HashMap;
use xengine_gpu::{Index, LitVertex};

const MAX_VERTICES: usize = Index::MAX as usize + 1;

/// Bit pattern of a vertex, so that identical vertices hash together
/// (`-0.0` and `0.0` stay distinct, which is harmless)
type VertexBits = [u32; 8];

fn vertex_bits(v: &LitVertex) -> VertexBits {
    let mut bits = [0u32; 8];
    for (slot, f) in bits
        .iter_mut()
        .zip(v.position.iter().chain(&v.normal).chain(&v.texcoord))
    {
        *slot = f.to_bits();
    }
    bits
}

impl SubmeshData {
    /// Append `other`'s triangles, offsetting its indices
    pub fn append(&mut self, other: &SubmeshData) {
        let base = self.vertices.len() as Index;
        self.bounds = if self.vertices.is_empty() {
            other.bounds
        } else {
            self.bounds.union(&other.bounds)
        };
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| base + i));
    }

    /// Remove duplicate vertices and remap indices. Triangles are unchanged.
    pub fn weld_vertices(&mut self) {
        let mut lookup: HashMap<VertexBits, Index> = HashMap::with_capacity(self.vertices.len());
        let mut unique = Vec::with_capacity(self.vertices.len());
        let remap: Vec<Index> = self
            .vertices
            .iter()
            .map(|v| {
                *lookup.entry(vertex_bits(v)).or_insert_with(|| {
                    unique.push(*v);
                    (unique.len() - 1) as Index
                })
            })
            .collect();

        for index in &mut self.indices {
            *index = remap[*index as usize];
        }
        self.vertices = unique;
    }
}

impl MeshData {
    /// Merge submeshes that share a texture (as long as the result stays
    /// addressable by 16-bit indices), weld identical vertices and
    /// recompute every bounding box.
    pub fn optimize(&mut self) {
        let before = (self.submeshes.len(), self.vertex_count());

        let mut merged: Vec<SubmeshData> = Vec::with_capacity(self.submeshes.len());
        for mut submesh in std::mem::take(&mut self.submeshes) {
            submesh.weld_vertices();
            let target = merged.iter_mut().find(|m| {
                m.texture == submesh.texture
                    && m.vertices.len() + submesh.vertices.len() <= MAX_VERTICES
            });
            match target {
                Some(target) => {
                    target.append(&submesh);
                    target.weld_vertices();
                }
                None => merged.push(submesh),
            }
        }

        for submesh in &mut merged {
            submesh.bounds = submesh.compute_bounds();
        }
        self.submeshes = merged;

        log::debug!(
            "optimized mesh: {} -> {} submeshes, {} -> {} vertices",
            before.0,
            self.submeshes.len(),
            before.1,
            self.vertex_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::quad;

    /// Triangles as vertex triples, for order-independent comparison
    fn triangles(submesh: &SubmeshData) -> Vec<[[u32; 8]; 3]> {
        let mut tris: Vec<_> = submesh
            .indices
            .chunks(3)
            .map(|t| {
                [
                    vertex_bits(&submesh.vertices[t[0] as usize]),
                    vertex_bits(&submesh.vertices[t[1] as usize]),
                    vertex_bits(&submesh.vertices[t[2] as usize]),
                ]
            })
            .collect();
        tris.sort();
        tris
    }

    #[test]
    fn test_weld_removes_duplicates() {
        let mut submesh = quad("q", "", 0.0);
        // un-indexed copy: 6 vertices, 2 of them repeated
        let flat: Vec<LitVertex> = submesh
            .indices
            .iter()
            .map(|&i| submesh.vertices[i as usize])
            .collect();
        let expected = triangles(&submesh);
        submesh.vertices = flat;
        submesh.indices = (0..6).collect();

        submesh.weld_vertices();
        assert_eq!(submesh.vertices.len(), 4);
        assert_eq!(triangles(&submesh), expected);
    }

    #[test]
    fn test_merge_by_texture() {
        let mut data = MeshData {
            submeshes: vec![
                quad("a", "metal.png", 0.0),
                quad("b", "wood.png", 2.0),
                quad("c", "metal.png", 4.0),
            ],
        };
        data.optimize();

        assert_eq!(data.submeshes.len(), 2);
        let metal = &data.submeshes[0];
        assert_eq!(metal.texture, "metal.png");
        assert_eq!(metal.name, "a");
        assert_eq!(metal.triangle_count(), 4);
        assert_eq!(metal.vertices.len(), 8);
        assert_eq!(metal.bounds.max.x, 5.0);
        assert_eq!(data.submeshes[1].texture, "wood.png");
    }

    #[test]
    fn test_merge_respects_index_range() {
        let mut big = quad("big", "t.png", 0.0);
        big.vertices = (0..MAX_VERTICES - 2)
            .map(|i| LitVertex::new([i as f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]))
            .collect();
        big.indices = vec![0, 1, 2];
        let mut data = MeshData {
            submeshes: vec![big, quad("small", "t.png", 0.0)],
        };
        data.optimize();
        assert_eq!(data.submeshes.len(), 2);
    }
}
