//! X-engine GPU - The seam between engine code and a graphics API
//!
//! Engine crates never talk to a graphics API directly. They create buffers
//! and textures and submit [`DrawCall`]s through a [`GpuBackend`]:
//! - `xengine-render` implements it on top of wgpu
//! - [`RecordingBackend`] keeps everything in memory for tests and headless runs

mod backend;
mod check;
mod draw;
mod recording;
mod vertex;

pub use backend::{BufferId, BufferKind, GpuBackend, TextureDesc, TextureId};
pub use check::{gpu_check, BindingTracker};
pub use draw::{BlendMode, DrawCall, FogRange, Material};
pub use recording::{RecordedBuffer, RecordingBackend};
pub use vertex::{
    create_index_buffer, create_vertex_buffer, write_vertices, ColorVertex, Index, LitVertex,
    VertexLayout,
};
