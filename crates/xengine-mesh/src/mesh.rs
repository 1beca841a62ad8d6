//! Mesh resource: immutable GPU geometry

use crate::format::MeshData;
use xengine_asset::{LoadContext, Resource, ResourceCache, ResourceKind};
use xengine_core::{BoundingBox, Result};
use xengine_gpu::{create_index_buffer, create_vertex_buffer, BufferId, GpuBackend};

/// One textured part of a [`Mesh`] on the GPU
#[derive(Debug)]
pub struct Submesh {
    pub name: String,
    /// Texture filename used when a model has no override
    pub default_texture: String,
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub vertex_count: u32,
    pub index_count: u32,
    pub bounds: BoundingBox,
}

/// Vertex and index buffers for every submesh of a mesh file.
/// Shared between all models that use it.
#[derive(Debug)]
pub struct Mesh {
    submeshes: Vec<Submesh>,
    bounds: BoundingBox,
}

impl Mesh {
    /// Upload decoded mesh data
    pub fn from_data(data: &MeshData, gpu: &mut dyn GpuBackend) -> Self {
        let submeshes = data
            .submeshes
            .iter()
            .map(|s| Submesh {
                name: s.name.clone(),
                default_texture: s.texture.clone(),
                vertex_buffer: create_vertex_buffer(gpu, &s.vertices),
                index_buffer: create_index_buffer(gpu, &s.indices),
                vertex_count: s.vertices.len() as u32,
                index_count: s.indices.len() as u32,
                bounds: s.bounds,
            })
            .collect();
        Self {
            submeshes,
            bounds: data.bounds(),
        }
    }

    pub fn submeshes(&self) -> &[Submesh] {
        &self.submeshes
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn triangle_count(&self) -> u32 {
        self.submeshes.iter().map(|s| s.index_count / 3).sum()
    }

    pub fn destroy(self, gpu: &mut dyn GpuBackend) {
        for submesh in self.submeshes {
            gpu.destroy_buffer(submesh.vertex_buffer);
            gpu.destroy_buffer(submesh.index_buffer);
        }
    }
}

impl Resource for Mesh {
    const KIND: ResourceKind = "mesh";

    fn load(ctx: &mut LoadContext<'_>) -> Result<Self> {
        let bytes = ctx.read_bytes()?;
        let data = MeshData::from_bytes(&bytes)?;
        log::debug!(
            "mesh '{}': {} submeshes, {} triangles",
            ctx.filename(),
            data.submeshes.len(),
            data.triangle_count()
        );
        Ok(Self::from_data(&data, ctx.gpu()))
    }

    fn unload(self, _cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) {
        self.destroy(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::quad;
    use std::fs;
    use std::path::PathBuf;
    use xengine_core::EngineError;
    use xengine_gpu::{LitVertex, RecordingBackend};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("xengine_mesh_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_load_through_cache() {
        let dir = temp_dir();
        let data = MeshData {
            submeshes: vec![quad("hull", "hull.png", 0.0), quad("turret", "", 1.0)],
        };
        fs::write(dir.join("tank.xmesh"), data.to_bytes().unwrap()).unwrap();

        let mut gpu = RecordingBackend::new();
        let mut cache = ResourceCache::new(&dir);
        let mesh = cache.acquire::<Mesh>("tank.xmesh", &mut gpu).unwrap();
        assert_eq!(mesh.submeshes().len(), 2);
        assert_eq!(mesh.submeshes()[0].default_texture, "hull.png");
        assert_eq!(mesh.triangle_count(), 4);
        assert_eq!(mesh.bounds().max.x, 2.0);
        assert_eq!(gpu.live_buffer_count(), 4);

        let uploaded: Vec<LitVertex> = gpu.read_buffer(mesh.submeshes()[1].vertex_buffer);
        assert_eq!(uploaded, data.submeshes[1].vertices);

        cache.release(mesh);
        assert_eq!(cache.sweep_now(&mut gpu), 1);
        assert_eq!(gpu.live_buffer_count(), 0);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_file_is_asset_error() {
        let dir = temp_dir();
        fs::write(dir.join("bad.xmesh"), [1, 0, 0, 0, 9]).unwrap();

        let mut gpu = RecordingBackend::new();
        let mut cache = ResourceCache::new(&dir);
        let err = cache.acquire::<Mesh>("bad.xmesh", &mut gpu).unwrap_err();
        assert!(matches!(err, EngineError::AssetLoad { .. }));
        assert!(cache.is_empty());

        let _ = fs::remove_dir_all(&dir);
    }
}
