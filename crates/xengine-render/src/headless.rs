//! Offscreen color and depth targets for windowless rendering

use crate::context::{request_device, RenderError};
use crate::{COLOR_FORMAT, DEPTH_FORMAT};

const BYTES_PER_PIXEL: u32 = 4;

/// Row layout of a texture-to-buffer copy. Rows in the staging buffer are
/// padded to `COPY_BYTES_PER_ROW_ALIGNMENT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Readback {
    row_bytes: u32,
    padded_row_bytes: u32,
    rows: u32,
}

impl Readback {
    fn new(width: u32, height: u32) -> Self {
        let row_bytes = width * BYTES_PER_PIXEL;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        Self {
            row_bytes,
            padded_row_bytes: row_bytes.div_ceil(align) * align,
            rows: height,
        }
    }

    fn buffer_size(&self) -> u64 {
        u64::from(self.padded_row_bytes) * u64::from(self.rows)
    }

    /// Drop the per-row padding
    fn unpad(&self, padded: &[u8]) -> Vec<u8> {
        padded
            .chunks(self.padded_row_bytes as usize)
            .take(self.rows as usize)
            .flat_map(|row| &row[..self.row_bytes as usize])
            .copied()
            .collect()
    }
}

fn render_target(
    device: &wgpu::Device,
    label: &str,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: usage | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// A device plus the frame targets the wgpu backend draws into
pub struct HeadlessContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub width: u32,
    pub height: u32,
    pub color_texture: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth_texture: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
}

impl HeadlessContext {
    pub async fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidTargetSize { width, height });
        }
        let (device, queue) = request_device().await?;
        Ok(Self::with_device(device, queue, width, height))
    }

    pub fn with_device(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let (color_texture, color_view) = render_target(
            &device,
            "Frame Color",
            COLOR_FORMAT,
            wgpu::TextureUsages::COPY_SRC,
            width,
            height,
        );
        let (depth_texture, depth_view) = render_target(
            &device,
            "Frame Depth",
            DEPTH_FORMAT,
            wgpu::TextureUsages::empty(),
            width,
            height,
        );
        log::debug!("headless targets {}x{}", width, height);

        Self {
            device,
            queue,
            width,
            height,
            color_texture,
            color_view,
            depth_texture,
            depth_view,
        }
    }

    /// Copy the color target out as tightly packed RGBA rows, top row first
    pub async fn read_pixels(&self) -> Result<Vec<u8>, RenderError> {
        let layout = Readback::new(self.width, self.height);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Readback"),
            size: layout.buffer_size(),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame Readback") });
        encoder.copy_texture_to_buffer(
            self.color_texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(layout.padded_row_bytes),
                    rows_per_image: Some(layout.rows),
                },
            },
            self.color_texture.size(),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::BufferReadFailed(e.to_string()))?
            .map_err(|e| RenderError::BufferReadFailed(e.to_string()))?;

        let pixels = layout.unpad(&slice.get_mapped_range());
        staging.unmap();
        Ok(pixels)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readback_rows_are_aligned() {
        let layout = Readback::new(10, 3);
        assert_eq!(layout.row_bytes, 40);
        assert_eq!(layout.padded_row_bytes, 256);
        assert_eq!(layout.buffer_size(), 768);

        let exact = Readback::new(64, 2);
        assert_eq!(exact.padded_row_bytes, exact.row_bytes);
    }

    #[test]
    fn test_unpad_strips_row_padding() {
        let layout = Readback::new(2, 2);
        let mut padded = vec![0xEE; layout.buffer_size() as usize];
        padded[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let second = layout.padded_row_bytes as usize;
        padded[second..second + 8].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let pixels = layout.unpad(&padded);
        assert_eq!(pixels, (1..=16).collect::<Vec<u8>>());
    }
}
