//! X-engine Render - wgpu backend
//!
//! [`WgpuBackend`] implements [`xengine_gpu::GpuBackend`] over an offscreen
//! [`HeadlessContext`]. Every draw uses one WGSL shader with a vertex entry
//! point per [`xengine_gpu::VertexLayout`]; pipelines are created lazily per
//! layout, blend mode and depth-write combination.

mod backend;
mod context;
mod headless;
mod pipeline;

pub use backend::{FrameStats, WgpuBackend};
pub use context::{request_device, RenderError};
pub use headless::HeadlessContext;
pub use pipeline::{blend_state, DrawUniforms, PipelineCache, PipelineKey};

/// Offscreen color target format
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[cfg(test)]
mod tests {
    #[test]
    fn shader_wgsl_parses() {
        let source = include_str!("shader.wgsl");
        naga::front::wgsl::parse_str(source).expect("shader.wgsl failed to parse");
    }

    #[test]
    fn shader_has_both_vertex_entry_points() {
        let module = naga::front::wgsl::parse_str(include_str!("shader.wgsl")).unwrap();
        let names: Vec<_> = module.entry_points.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"vs_lit"));
        assert!(names.contains(&"vs_colored"));
        assert!(names.contains(&"fs_main"));
    }
}
