//! Model: a mesh plus per-submesh textures and a material

use crate::mesh::Mesh;
use xengine_asset::{Handle, ResourceCache, Texture};
use xengine_core::{BoundingBox, Color, Result};
use xengine_gpu::{DrawCall, GpuBackend, Material, VertexLayout};
use xengine_scene::NodeView;

struct SubModel {
    texture: Option<Handle<Texture>>,
    /// Filename the texture was (or should have been) loaded from
    texture_name: String,
}

/// A drawable instance of a [`Mesh`]. Several models may share one mesh
/// while using different textures.
///
/// Models hold cache handles, so they must be returned with
/// [`Model::release`].
pub struct Model {
    mesh: Handle<Mesh>,
    submodels: Vec<SubModel>,
    pub material: Material,
    pub tint: Color,
}

impl Model {
    /// Build a model from a mesh, acquiring each submesh's default texture.
    /// A texture that fails to load leaves its slot empty.
    pub fn new(mesh: Handle<Mesh>, cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) -> Self {
        let submodels = mesh
            .submeshes()
            .iter()
            .map(|submesh| {
                let name = submesh.default_texture.clone();
                let texture = if name.is_empty() {
                    None
                } else {
                    match cache.acquire::<Texture>(&name, gpu) {
                        Ok(texture) => Some(texture),
                        Err(err) => {
                            log::warn!("submesh '{}': {}", submesh.name, err);
                            None
                        }
                    }
                };
                SubModel {
                    texture,
                    texture_name: name,
                }
            })
            .collect();
        Self {
            mesh,
            submodels,
            material: Material::default(),
            tint: Color::WHITE,
        }
    }

    /// Acquire `filename` as a mesh and build a model from it
    pub fn load(filename: &str, cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) -> Result<Self> {
        let mesh = cache.acquire::<Mesh>(filename, gpu)?;
        Ok(Self::new(mesh, cache, gpu))
    }

    /// Another model sharing this one's mesh and textures
    pub fn duplicate(&self, cache: &mut ResourceCache) -> Self {
        Self {
            mesh: cache.retain(&self.mesh),
            submodels: self
                .submodels
                .iter()
                .map(|s| SubModel {
                    texture: s.texture.as_ref().map(|t| cache.retain(t)),
                    texture_name: s.texture_name.clone(),
                })
                .collect(),
            material: self.material,
            tint: self.tint,
        }
    }

    /// Fill every empty texture slot with `fallback`. Returns how many
    /// slots were filled.
    pub fn set_unloaded_textures(&mut self, fallback: &Handle<Texture>, cache: &mut ResourceCache) -> usize {
        let mut filled = 0;
        for submodel in self.submodels.iter_mut().filter(|s| s.texture.is_none()) {
            submodel.texture = Some(cache.retain(fallback));
            filled += 1;
        }
        filled
    }

    /// Replace the texture of submodel `index`, releasing the previous one.
    /// Out-of-range indices give the handle straight back to the cache.
    pub fn set_texture(&mut self, index: usize, texture: Option<Handle<Texture>>, cache: &mut ResourceCache) {
        let Some(submodel) = self.submodels.get_mut(index) else {
            if let Some(texture) = texture {
                cache.release(texture);
            }
            return;
        };
        if let Some(old) = std::mem::replace(&mut submodel.texture, texture) {
            cache.release(old);
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn bounds(&self) -> BoundingBox {
        self.mesh.bounds()
    }

    pub fn submodel_count(&self) -> usize {
        self.submodels.len()
    }

    pub fn texture(&self, index: usize) -> Option<&Texture> {
        self.submodels.get(index)?.texture.as_deref()
    }

    pub fn texture_name(&self, index: usize) -> Option<&str> {
        self.submodels.get(index).map(|s| s.texture_name.as_str())
    }

    /// Render-group key: models with the same first texture draw together
    pub fn render_group_key(&self) -> String {
        let texture = self
            .submodels
            .first()
            .map(|s| s.texture_name.as_str())
            .unwrap_or_default();
        format!("model:{}", texture)
    }

    /// Return every handle to the cache
    pub fn release(self, cache: &mut ResourceCache) {
        for texture in self.submodels.into_iter().filter_map(|s| s.texture) {
            cache.release(texture);
        }
        cache.release(self.mesh);
    }

    /// Cull against the view, then issue one draw per submesh
    pub fn render(&self, view: &NodeView<'_>, gpu: &mut dyn GpuBackend) -> usize {
        if !view.is_visible() {
            return 0;
        }
        let mvp = view.mvp();
        let model = view.model_matrix();
        for (submesh, submodel) in self.mesh.submeshes().iter().zip(&self.submodels) {
            let mut call = DrawCall::new(
                submesh.vertex_buffer,
                submesh.index_buffer,
                submesh.index_count,
                VertexLayout::Lit,
            );
            call.texture = submodel.texture.as_ref().map(|t| t.id());
            call.mvp = mvp;
            call.model = model;
            call.material = self.material;
            call.tint = self.tint;
            call.fog = view.fog;
            gpu.draw(&call);
        }
        self.submodels.len()
    }
}
