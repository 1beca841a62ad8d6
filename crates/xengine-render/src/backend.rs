//! [`GpuBackend`] implementation on wgpu
//!
//! Draws are queued between [`WgpuBackend::begin_frame`] and
//! [`WgpuBackend::end_frame`], which encodes them into a single render pass
//! over the headless targets. Validation failures never panic: they are
//! queued and handed out by `poll_error`, like a GL error flag.

use crate::headless::HeadlessContext;
use crate::pipeline::{DrawUniforms, PipelineCache, PipelineKey};
use crate::context::RenderError;
use crate::COLOR_FORMAT;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use wgpu::util::DeviceExt;
use xengine_core::Color;
use xengine_gpu::{BufferId, BufferKind, DrawCall, GpuBackend, TextureDesc, TextureId};

struct GpuBuffer {
    buffer: wgpu::Buffer,
    kind: BufferKind,
}

struct GpuTexture {
    view: wgpu::TextureView,
    repeat: bool,
}

/// Frame counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draws: usize,
    pub pipelines: usize,
}

pub struct WgpuBackend {
    ctx: HeadlessContext,
    pipelines: PipelineCache,
    buffers: HashMap<BufferId, GpuBuffer>,
    textures: HashMap<TextureId, GpuTexture>,
    white: wgpu::TextureView,
    repeat_sampler: wgpu::Sampler,
    clamp_sampler: wgpu::Sampler,
    next_id: u32,
    clear_color: Color,
    queued: Vec<DrawCall>,
    errors: Arc<Mutex<VecDeque<String>>>,
}

/// wgpu requires copy sizes to be 4-byte multiples
fn padded(data: &[u8]) -> Vec<u8> {
    let len = (data.len().max(1) as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT) as usize;
    let mut bytes = data.to_vec();
    bytes.resize(len, 0);
    bytes
}

fn upload_texture(ctx: &HeadlessContext, label: &str, width: u32, height: u32, rgba: &[u8]) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    ctx.queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn sampler(device: &wgpu::Device, address_mode: wgpu::AddressMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("X-engine Sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

impl WgpuBackend {
    pub fn new(ctx: HeadlessContext) -> Self {
        let errors = Arc::new(Mutex::new(VecDeque::new()));
        let sink = Arc::clone(&errors);
        ctx.device.on_uncaptured_error(Box::new(move |err| {
            if let Ok(mut queue) = sink.lock() {
                queue.push_back(err.to_string());
            }
        }));

        let pipelines = PipelineCache::new(&ctx.device, COLOR_FORMAT);
        let white = upload_texture(&ctx, "White Texture", 1, 1, &[0xFF; 4]);
        let repeat_sampler = sampler(&ctx.device, wgpu::AddressMode::Repeat);
        let clamp_sampler = sampler(&ctx.device, wgpu::AddressMode::ClampToEdge);

        Self {
            ctx,
            pipelines,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            white,
            repeat_sampler,
            clamp_sampler,
            next_id: 1,
            clear_color: Color::BLACK,
            queued: Vec::new(),
            errors,
        }
    }

    /// Open a device and wrap `width x height` offscreen targets
    pub fn headless(width: u32, height: u32) -> Result<Self, RenderError> {
        let ctx = pollster::block_on(HeadlessContext::new(width, height))?;
        Ok(Self::new(ctx))
    }

    pub fn context(&self) -> &HeadlessContext {
        &self.ctx
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record_error(&self, message: String) {
        log::warn!("{}", message);
        if let Ok(mut queue) = self.errors.lock() {
            queue.push_back(message);
        }
    }

    /// Drop draws queued by an unfinished frame and set the clear color
    pub fn begin_frame(&mut self, clear_color: Color) {
        self.queued.clear();
        self.clear_color = clear_color;
    }

    /// Encode and submit every queued draw
    pub fn end_frame(&mut self) -> FrameStats {
        let calls = std::mem::take(&mut self.queued);
        for call in &calls {
            self.pipelines.prepare(&self.ctx.device, PipelineKey::of(call));
        }

        let mut bind_groups = Vec::with_capacity(calls.len());
        for call in &calls {
            let uniforms = self.ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Draw Uniforms"),
                contents: bytemuck::bytes_of(&DrawUniforms::from_call(call)),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let (base_view, base_sampler) = self.texture_binding(call.texture);
            let (detail_view, detail_sampler) = self.texture_binding(call.detail_texture);
            bind_groups.push(self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Draw Bind Group"),
                layout: &self.pipelines.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(base_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(base_sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(detail_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::Sampler(detail_sampler),
                    },
                ],
            }));
        }

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        let mut draws = 0;
        {
            let c = self.clear_color;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.ctx.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: c.r as f64,
                            g: c.g as f64,
                            b: c.b as f64,
                            a: c.a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for (call, bind_group) in calls.iter().zip(&bind_groups) {
                let (Some(vertices), Some(indices), Some(pipeline)) = (
                    self.buffers.get(&call.vertex_buffer),
                    self.buffers.get(&call.index_buffer),
                    self.pipelines.get(&PipelineKey::of(call)),
                ) else {
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.set_vertex_buffer(0, vertices.buffer.slice(..));
                pass.set_index_buffer(indices.buffer.slice(..), wgpu::IndexFormat::Uint16);
                pass.draw_indexed(call.first_index..call.first_index + call.index_count, 0, 0..1);
                draws += 1;
            }
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        FrameStats {
            draws,
            pipelines: self.pipelines.len(),
        }
    }

    fn texture_binding(&self, texture: Option<TextureId>) -> (&wgpu::TextureView, &wgpu::Sampler) {
        match texture.and_then(|id| self.textures.get(&id)) {
            Some(t) if t.repeat => (&t.view, &self.repeat_sampler),
            Some(t) => (&t.view, &self.clamp_sampler),
            None => (&self.white, &self.repeat_sampler),
        }
    }

    /// Read the last frame back as tightly packed RGBA
    pub fn read_pixels(&self) -> Result<Vec<u8>, RenderError> {
        pollster::block_on(self.ctx.read_pixels())
    }
}

impl GpuBackend for WgpuBackend {
    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> BufferId {
        let id = BufferId(self.next_id());
        let usage = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        } | wgpu::BufferUsages::COPY_DST;
        let buffer = self.ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(match kind {
                BufferKind::Vertex => "Vertex Buffer",
                BufferKind::Index => "Index Buffer",
            }),
            contents: &padded(contents),
            usage,
        });
        self.buffers.insert(id, GpuBuffer { buffer, kind });
        id
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        let Some(target) = self.buffers.get(&buffer) else {
            self.record_error(format!("write to unknown buffer {:?}", buffer));
            return;
        };
        let bytes = padded(data);
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || offset + bytes.len() as u64 > target.buffer.size() {
            self.record_error(format!(
                "write of {} bytes at {} outside {:?} buffer {:?} ({} bytes)",
                data.len(),
                offset,
                target.kind,
                buffer,
                target.buffer.size()
            ));
            return;
        }
        self.ctx.queue.write_buffer(&target.buffer, offset, &bytes);
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        match self.buffers.remove(&buffer) {
            Some(b) => b.buffer.destroy(),
            None => self.record_error(format!("destroy of unknown buffer {:?}", buffer)),
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, rgba: &[u8]) -> TextureId {
        let id = TextureId(self.next_id());
        if rgba.len() != desc.byte_len() || desc.width == 0 || desc.height == 0 {
            self.record_error(format!(
                "texture '{}' is {}x{} but has {} bytes",
                desc.label,
                desc.width,
                desc.height,
                rgba.len()
            ));
            return id;
        }
        let view = upload_texture(&self.ctx, &desc.label, desc.width, desc.height, rgba);
        self.textures.insert(
            id,
            GpuTexture {
                view,
                repeat: desc.repeat,
            },
        );
        id
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            self.record_error(format!("destroy of unknown texture {:?}", texture));
        }
    }

    fn draw(&mut self, call: &DrawCall) {
        if !self.buffers.contains_key(&call.vertex_buffer) || !self.buffers.contains_key(&call.index_buffer) {
            self.record_error(format!(
                "draw with unknown buffers {:?}/{:?}",
                call.vertex_buffer, call.index_buffer
            ));
            return;
        }
        self.queued.push(call.clone());
    }

    fn poll_error(&mut self) -> Option<String> {
        self.errors.lock().ok().and_then(|mut queue| queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_rounds_up_to_copy_alignment() {
        assert_eq!(padded(&[]).len(), 4);
        assert_eq!(padded(&[1, 2]).len(), 4);
        assert_eq!(padded(&[0; 24]).len(), 24);
        assert_eq!(padded(&[7; 6]), vec![7, 7, 7, 7, 7, 7, 0, 0]);
    }
}
