//! Render pipeline setup

use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;
use xengine_gpu::{BlendMode, DrawCall, VertexLayout};

/// Per-draw uniform block (bind group 0, binding 0)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub mvp: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub tint: [f32; 4],
    pub diffuse: [f32; 4],
    pub ambient: [f32; 4],
    pub fog_color: [f32; 4],
    /// start, end, enabled, detail repeat
    pub fog: [f32; 4],
    /// lit
    pub flags: [f32; 4],
}

impl DrawUniforms {
    pub fn from_call(call: &DrawCall) -> Self {
        let (fog_color, fog) = match call.fog {
            Some(range) if range.end > range.start => (
                range.color.to_array(),
                [range.start, range.end, 1.0, call.detail_repeat],
            ),
            _ => ([0.0; 4], [0.0, 1.0, 0.0, call.detail_repeat]),
        };
        Self {
            mvp: call.mvp.to_cols_array(),
            model: call.model.to_cols_array(),
            tint: call.tint.to_array(),
            diffuse: call.material.diffuse.to_array(),
            ambient: call.material.ambient.to_array(),
            fog_color,
            fog,
            flags: [if call.lit { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
        }
    }
}

pub fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    let color = |src_factor, dst_factor| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    match mode {
        BlendMode::None => None,
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        BlendMode::Additive => Some(wgpu::BlendState {
            color: color(wgpu::BlendFactor::SrcAlpha, wgpu::BlendFactor::One),
            alpha: wgpu::BlendComponent::OVER,
        }),
        BlendMode::Modulative => Some(wgpu::BlendState {
            color: color(wgpu::BlendFactor::Zero, wgpu::BlendFactor::Src),
            alpha: wgpu::BlendComponent::OVER,
        }),
    }
}

const LIT_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
const COLORED_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2, 2 => Unorm8x4];

pub fn vertex_buffer_layout(layout: VertexLayout) -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: layout.stride() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: match layout {
            VertexLayout::Lit => &LIT_ATTRIBUTES,
            VertexLayout::Colored => &COLORED_ATTRIBUTES,
        },
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub layout: VertexLayout,
    pub blend: BlendMode,
    pub depth_write: bool,
}

impl PipelineKey {
    pub fn of(call: &DrawCall) -> Self {
        Self {
            layout: call.layout,
            blend: call.blend,
            depth_write: call.depth_write,
        }
    }
}

/// Shader, bind group layout and one pipeline per state combination
pub struct PipelineCache {
    shader: wgpu::ShaderModule,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    format: wgpu::TextureFormat,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

impl PipelineCache {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("X-engine Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                // binding 0: DrawUniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // binding 1/2: base texture
                texture_entry(1),
                sampler_entry(2),
                // binding 3/4: detail texture
                texture_entry(3),
                sampler_entry(4),
            ],
            label: Some("Draw Bind Group Layout"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("X-engine Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            shader,
            bind_group_layout,
            pipeline_layout,
            format,
            pipelines: HashMap::new(),
        }
    }

    /// Build the pipeline for `key` if it does not exist yet
    pub fn prepare(&mut self, device: &wgpu::Device, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        log::debug!("creating pipeline {:?}", key);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("X-engine Render Pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some(match key.layout {
                    VertexLayout::Lit => "vs_lit",
                    VertexLayout::Colored => "vs_colored",
                }),
                buffers: &[vertex_buffer_layout(key.layout)],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.format,
                    blend: blend_state(key.blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // billboards and crossed tree quads are seen from both sides
                cull_mode: match key.layout {
                    VertexLayout::Lit => Some(wgpu::Face::Back),
                    VertexLayout::Colored => None,
                },
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: crate::DEPTH_FORMAT,
                depth_write_enabled: key.depth_write,
                depth_compare: if key.depth_write {
                    wgpu::CompareFunction::Less
                } else {
                    wgpu::CompareFunction::LessEqual
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        self.pipelines.insert(key, pipeline);
    }

    pub fn get(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xengine_core::{Color, Mat4};
    use xengine_gpu::{BufferId, FogRange};

    #[test]
    fn uniforms_match_shader_block_size() {
        // two mat4 and six vec4
        assert_eq!(std::mem::size_of::<DrawUniforms>(), 2 * 64 + 6 * 16);
    }

    #[test]
    fn uniforms_from_call() {
        let mut call = DrawCall::new(BufferId(1), BufferId(2), 6, VertexLayout::Lit);
        call.mvp = Mat4::perspective(60.0, 1.0, 1.0, 100.0);
        call.detail_repeat = 64.0;
        let u = DrawUniforms::from_call(&call);
        assert_eq!(u.mvp, call.mvp.to_cols_array());
        assert_eq!(u.flags[0], 1.0);
        assert_eq!(u.fog, [0.0, 1.0, 0.0, 64.0]);

        call.fog = Some(FogRange {
            start: 10.0,
            end: 50.0,
            color: Color::GRAY,
        });
        call.lit = false;
        let u = DrawUniforms::from_call(&call);
        assert_eq!(u.fog, [10.0, 50.0, 1.0, 64.0]);
        assert_eq!(u.fog_color, Color::GRAY.to_array());
        assert_eq!(u.flags[0], 0.0);
    }

    #[test]
    fn degenerate_fog_is_disabled() {
        let mut call = DrawCall::new(BufferId(1), BufferId(2), 6, VertexLayout::Colored);
        call.fog = Some(FogRange {
            start: 50.0,
            end: 50.0,
            color: Color::WHITE,
        });
        assert_eq!(DrawUniforms::from_call(&call).fog[2], 0.0);
    }

    #[test]
    fn blend_modes_map_to_wgpu_states() {
        assert!(blend_state(BlendMode::None).is_none());
        assert_eq!(blend_state(BlendMode::Alpha), Some(wgpu::BlendState::ALPHA_BLENDING));
        let additive = blend_state(BlendMode::Additive).unwrap();
        assert_eq!(additive.color.dst_factor, wgpu::BlendFactor::One);
        let modulative = blend_state(BlendMode::Modulative).unwrap();
        assert_eq!(modulative.color.src_factor, wgpu::BlendFactor::Zero);
        assert_eq!(modulative.color.dst_factor, wgpu::BlendFactor::Src);
    }

    #[test]
    fn vertex_layouts_match_strides() {
        assert_eq!(vertex_buffer_layout(VertexLayout::Lit).array_stride, 32);
        assert_eq!(vertex_buffer_layout(VertexLayout::Colored).array_stride, 24);
    }
}
