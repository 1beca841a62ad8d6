//! Vertex formats shared by all geometry

use crate::backend::{BufferId, BufferKind, GpuBackend};
use bytemuck::{Pod, Zeroable};

/// Index type for every index buffer
pub type Index = u16;

/// Lit, textured vertex used by meshes, terrain and bullets
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LitVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
}

impl LitVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], texcoord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            texcoord,
        }
    }
}

/// Unlit, vertex-colored vertex used by clutter, trees and particles
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: [f32; 3],
    pub texcoord: [f32; 2],
    pub color: [u8; 4],
}

impl ColorVertex {
    pub fn new(position: [f32; 3], texcoord: [f32; 2], color: [u8; 4]) -> Self {
        Self {
            position,
            texcoord,
            color,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    Lit,
    Colored,
}

impl VertexLayout {
    pub fn stride(&self) -> usize {
        match self {
            VertexLayout::Lit => std::mem::size_of::<LitVertex>(),
            VertexLayout::Colored => std::mem::size_of::<ColorVertex>(),
        }
    }
}

pub fn create_vertex_buffer<V: Pod>(gpu: &mut dyn GpuBackend, vertices: &[V]) -> BufferId {
    gpu.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(vertices))
}

pub fn create_index_buffer(gpu: &mut dyn GpuBackend, indices: &[Index]) -> BufferId {
    gpu.create_buffer(BufferKind::Index, bytemuck::cast_slice(indices))
}

/// Overwrite vertices starting at vertex `first`
pub fn write_vertices<V: Pod>(gpu: &mut dyn GpuBackend, buffer: BufferId, first: usize, vertices: &[V]) {
    let offset = (first * std::mem::size_of::<V>()) as u64;
    gpu.write_buffer(buffer, offset, bytemuck::cast_slice(vertices));
}
