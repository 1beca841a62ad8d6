//! Backend trait and resource ids

/// Opaque GPU buffer id. Zero is never handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Opaque GPU texture id. Zero is never handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Texture creation parameters. Pixel data is always tightly packed RGBA8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Wrap (repeat) rather than clamp texture coordinates
    pub repeat: bool,
}

impl TextureDesc {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            repeat: true,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// GPU operations used by the engine.
///
/// Creation calls do not fail synchronously; like a GL context, a backend
/// records the first error it hits and reports it from [`poll_error`].
/// Debug builds check it through [`gpu_check`](crate::gpu_check).
///
/// [`poll_error`]: GpuBackend::poll_error
pub trait GpuBackend {
    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> BufferId;

    /// Overwrite `data.len()` bytes of `buffer` starting at byte `offset`
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);

    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_texture(&mut self, desc: &TextureDesc, rgba: &[u8]) -> TextureId;

    fn destroy_texture(&mut self, texture: TextureId);

    fn draw(&mut self, call: &crate::DrawCall);

    /// Take the oldest pending error, if any
    fn poll_error(&mut self) -> Option<String>;
}
