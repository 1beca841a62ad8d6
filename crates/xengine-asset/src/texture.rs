//! Texture resource

use crate::cache::{LoadContext, ResourceCache};
use crate::resource::{Resource, ResourceKind};
use xengine_core::{EngineError, Result};
use xengine_gpu::{GpuBackend, TextureDesc, TextureId};

/// A GPU texture decoded from PNG/TGA/JPEG/BMP into RGBA8
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
}

impl Texture {
    /// Upload raw RGBA8 pixels. Textures made this way are not cached;
    /// free them with [`Texture::destroy`].
    pub fn from_rgba(
        gpu: &mut dyn GpuBackend,
        label: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<Self> {
        let desc = TextureDesc::new(label, width, height);
        if rgba.len() != desc.byte_len() {
            return Err(EngineError::Format(format!(
                "texture '{}' is {}x{} but has {} bytes of pixel data",
                label,
                width,
                height,
                rgba.len()
            )));
        }
        let id = gpu.create_texture(&desc, rgba);
        Ok(Self { id, width, height })
    }

    pub fn destroy(self, gpu: &mut dyn GpuBackend) {
        gpu.destroy_texture(self.id);
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Resource for Texture {
    const KIND: ResourceKind = "texture";

    fn load(ctx: &mut LoadContext<'_>) -> Result<Self> {
        let bytes = ctx.read_bytes()?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| EngineError::AssetLoad {
                path: ctx.filename().to_string(),
                reason: e.to_string(),
            })?
            .to_rgba8();
        let (width, height) = image.dimensions();
        let label = ctx.filename().to_string();
        Self::from_rgba(ctx.gpu(), &label, width, height, image.as_raw())
    }

    fn unload(self, _cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) {
        self.destroy(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xengine_gpu::RecordingBackend;

    #[test]
    fn test_texture_load_and_sweep() {
        let dir = std::env::temp_dir().join(format!("xengine-tex-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]))
            .save(dir.join("grass.png"))
            .unwrap();

        let mut gpu = RecordingBackend::new();
        let mut cache = ResourceCache::new(&dir);
        let tex = cache.acquire::<Texture>("grass.png", &mut gpu).unwrap();
        assert_eq!((tex.width(), tex.height()), (4, 2));
        assert_eq!(gpu.live_texture_count(), 1);

        cache.release(tex);
        cache.sweep_now(&mut gpu);
        assert_eq!(gpu.live_texture_count(), 0);
        assert!(gpu.poll_error().is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_texture_is_asset_error() {
        let dir = std::env::temp_dir().join(format!("xengine-tex-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bad.png"), b"not a png").unwrap();

        let mut gpu = RecordingBackend::new();
        let mut cache = ResourceCache::new(&dir);
        let err = cache.acquire::<Texture>("bad.png", &mut gpu).unwrap_err();
        assert!(matches!(err, EngineError::AssetLoad { .. }));
        assert_eq!(gpu.live_texture_count(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_from_rgba_checks_size() {
        let mut gpu = RecordingBackend::new();
        assert!(Texture::from_rgba(&mut gpu, "x", 2, 2, &[0; 15]).is_err());
        let tex = Texture::from_rgba(&mut gpu, "x", 2, 2, &[0; 16]).unwrap();
        tex.destroy(&mut gpu);
        assert_eq!(gpu.live_texture_count(), 0);
    }
}
