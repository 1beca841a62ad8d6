//! In-memory backend that records every operation

use crate::backend::{BufferId, BufferKind, GpuBackend, TextureDesc, TextureId};
use crate::check::BindingTracker;
use crate::draw::DrawCall;
use bytemuck::Pod;
use std::collections::{HashMap, VecDeque};

/// Contents and history of one recorded buffer
#[derive(Clone, Debug)]
pub struct RecordedBuffer {
    pub kind: BufferKind,
    pub data: Vec<u8>,
    /// Number of `write_buffer` calls after creation
    pub writes: usize,
}

/// Headless [`GpuBackend`] that keeps buffer contents and draw calls in
/// memory. Invalid operations are reported through `poll_error`.
#[derive(Default)]
pub struct RecordingBackend {
    next_id: u32,
    buffers: HashMap<BufferId, RecordedBuffer>,
    textures: HashMap<TextureId, TextureDesc>,
    draws: Vec<DrawCall>,
    errors: VecDeque<String>,
    bindings: BindingTracker,
    pub buffers_created: usize,
    pub buffers_destroyed: usize,
    pub textures_created: usize,
    pub textures_destroyed: usize,
    pub buffer_writes: usize,
    /// Draws that needed a mesh or texture rebind
    pub state_changes: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn error(&mut self, message: String) {
        log::debug!("recorded GPU error: {}", message);
        self.errors.push_back(message);
    }

    pub fn buffer(&self, id: BufferId) -> Option<&RecordedBuffer> {
        self.buffers.get(&id)
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&id)
    }

    /// Buffer contents reinterpreted as `T`s (empty if the buffer is gone)
    pub fn read_buffer<T: Pod>(&self, id: BufferId) -> Vec<T> {
        self.buffers
            .get(&id)
            .map(|b| bytemuck::pod_collect_to_vec(&b.data))
            .unwrap_or_default()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn take_draws(&mut self) -> Vec<DrawCall> {
        self.bindings = BindingTracker::new();
        std::mem::take(&mut self.draws)
    }

    pub fn pending_errors(&self) -> usize {
        self.errors.len()
    }
}

impl GpuBackend for RecordingBackend {
    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> BufferId {
        let id = BufferId(self.next_id());
        self.buffers.insert(
            id,
            RecordedBuffer {
                kind,
                data: contents.to_vec(),
                writes: 0,
            },
        );
        self.buffers_created += 1;
        id
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        let start = offset as usize;
        let end = start + data.len();
        let failure = match self.buffers.get_mut(&buffer) {
            None => Some(format!("write to unknown buffer {:?}", buffer)),
            Some(target) if end > target.data.len() => Some(format!(
                "write of {}..{} past end of buffer {:?} ({} bytes)",
                start,
                end,
                buffer,
                target.data.len()
            )),
            Some(target) => {
                target.data[start..end].copy_from_slice(data);
                target.writes += 1;
                None
            }
        };
        match failure {
            Some(message) => self.error(message),
            None => self.buffer_writes += 1,
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_some() {
            self.buffers_destroyed += 1;
        } else {
            self.error(format!("destroy of unknown buffer {:?}", buffer));
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, rgba: &[u8]) -> TextureId {
        if rgba.len() != desc.byte_len() {
            self.error(format!(
                "texture '{}' expects {} bytes, got {}",
                desc.label,
                desc.byte_len(),
                rgba.len()
            ));
        }
        let id = TextureId(self.next_id());
        self.textures.insert(id, desc.clone());
        self.textures_created += 1;
        id
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_some() {
            self.textures_destroyed += 1;
        } else {
            self.error(format!("destroy of unknown texture {:?}", texture));
        }
    }

    fn draw(&mut self, call: &DrawCall) {
        let known_vertices = self.buffers.contains_key(&call.vertex_buffer);
        let index_len = self
            .buffers
            .get(&call.index_buffer)
            .map(|ib| ib.data.len() / std::mem::size_of::<crate::Index>());
        let index_len = match index_len {
            Some(len) if known_vertices => len,
            _ => {
                self.error(format!(
                    "draw with unknown buffers {:?}/{:?}",
                    call.vertex_buffer, call.index_buffer
                ));
                return;
            }
        };
        let end = (call.first_index + call.index_count) as usize;
        if end > index_len {
            self.error(format!("draw reads index {} of {}", end, index_len));
            return;
        }
        for texture in [call.texture, call.detail_texture].into_iter().flatten() {
            if !self.textures.contains_key(&texture) {
                self.error(format!("draw with unknown texture {:?}", texture));
                return;
            }
        }

        let mesh_changed = self
            .bindings
            .check_bind_mesh(call.vertex_buffer, call.index_buffer);
        let textures_changed = self
            .bindings
            .check_bind_textures(call.texture, call.detail_texture);
        if mesh_changed || textures_changed {
            self.state_changes += 1;
        }
        self.draws.push(call.clone());
    }

    fn poll_error(&mut self) -> Option<String> {
        self.errors.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::{create_index_buffer, create_vertex_buffer, write_vertices, LitVertex, VertexLayout};

    #[test]
    fn records_buffer_contents_and_writes() {
        let mut gpu = RecordingBackend::new();
        let verts = [LitVertex::default(); 3];
        let vb = create_vertex_buffer(&mut gpu, &verts);

        let moved = LitVertex::new([1.0, 2.0, 3.0], [0.0, 1.0, 0.0], [0.5, 0.5]);
        write_vertices(&mut gpu, vb, 2, &[moved]);

        let read: Vec<LitVertex> = gpu.read_buffer(vb);
        assert_eq!(read.len(), 3);
        assert_eq!(read[2], moved);
        assert_eq!(gpu.buffer(vb).unwrap().writes, 1);
        assert!(gpu.poll_error().is_none());
    }

    #[test]
    fn out_of_range_write_is_an_error() {
        let mut gpu = RecordingBackend::new();
        let vb = create_vertex_buffer(&mut gpu, &[LitVertex::default()]);
        write_vertices(&mut gpu, vb, 1, &[LitVertex::default()]);
        assert!(gpu.poll_error().is_some());
    }

    #[test]
    fn draw_validates_index_range() {
        let mut gpu = RecordingBackend::new();
        let vb = create_vertex_buffer(&mut gpu, &[LitVertex::default(); 3]);
        let ib = create_index_buffer(&mut gpu, &[0, 1, 2]);

        gpu.draw(&DrawCall::new(vb, ib, 3, VertexLayout::Lit));
        assert!(gpu.poll_error().is_none());
        assert_eq!(gpu.draws().len(), 1);

        gpu.draw(&DrawCall::new(vb, ib, 6, VertexLayout::Lit));
        assert!(gpu.poll_error().is_some());
        assert_eq!(gpu.draws().len(), 1);
    }

    #[test]
    fn state_changes_count_rebinds_only() {
        let mut gpu = RecordingBackend::new();
        let vb = create_vertex_buffer(&mut gpu, &[LitVertex::default(); 3]);
        let ib = create_index_buffer(&mut gpu, &[0, 1, 2]);
        let call = DrawCall::new(vb, ib, 3, VertexLayout::Lit);
        gpu.draw(&call);
        gpu.draw(&call);
        assert_eq!(gpu.state_changes, 1);
    }

    #[test]
    fn destroy_tracks_live_counts() {
        let mut gpu = RecordingBackend::new();
        let ib = create_index_buffer(&mut gpu, &[0, 1, 2]);
        let tex = gpu.create_texture(&TextureDesc::new("white", 1, 1), &[255; 4]);
        assert_eq!(gpu.live_buffer_count(), 1);
        assert_eq!(gpu.live_texture_count(), 1);

        gpu.destroy_buffer(ib);
        gpu.destroy_texture(tex);
        assert_eq!(gpu.live_buffer_count(), 0);
        assert_eq!(gpu.live_texture_count(), 0);
        assert_eq!(gpu.buffers_destroyed, 1);
        assert!(gpu.poll_error().is_none());
    }
}
