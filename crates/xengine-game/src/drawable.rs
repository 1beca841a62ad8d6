//! The closed set of things a game scene node can hold

use xengine_asset::ResourceCache;
use xengine_gpu::GpuBackend;
use xengine_mesh::Model;
use xengine_particles::ParticleSystem;
use xengine_scene::{NodeView, RenderNode};
use xengine_terrain::Terrain;
use xengine_vegetation::{ClutterSystem, TreeSystem};

pub enum Drawable {
    Model(Model),
    Terrain(Box<Terrain>),
    Trees(TreeSystem),
    Clutter(ClutterSystem),
    Particles(ParticleSystem),
}

impl Drawable {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Drawable::Model(_) => "model",
            Drawable::Terrain(_) => "terrain",
            Drawable::Trees(_) => "trees",
            Drawable::Clutter(_) => "clutter",
            Drawable::Particles(_) => "particles",
        }
    }

    pub fn as_terrain(&self) -> Option<&Terrain> {
        match self {
            Drawable::Terrain(terrain) => Some(terrain),
            _ => None,
        }
    }

    pub fn as_clutter(&self) -> Option<&ClutterSystem> {
        match self {
            Drawable::Clutter(clutter) => Some(clutter),
            _ => None,
        }
    }

    pub fn as_particles(&self) -> Option<&ParticleSystem> {
        match self {
            Drawable::Particles(system) => Some(system),
            _ => None,
        }
    }

    /// Hand every resource back. Particle effects come from the common
    /// cache, everything else from the map cache.
    pub fn release(self, common: &mut ResourceCache, map_cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) {
        match self {
            Drawable::Model(model) => model.release(map_cache),
            Drawable::Terrain(terrain) => terrain.release(map_cache, gpu),
            Drawable::Trees(trees) => trees.release(map_cache, gpu),
            Drawable::Clutter(clutter) => clutter.release(map_cache, gpu),
            Drawable::Particles(system) => system.release(common),
        }
    }
}

impl RenderNode for Drawable {
    fn render(&mut self, view: &NodeView<'_>, gpu: &mut dyn GpuBackend) -> usize {
        match self {
            Drawable::Model(model) => model.render(view, gpu),
            Drawable::Terrain(terrain) => terrain.render(view, gpu),
            Drawable::Trees(trees) => trees.render(view, gpu),
            Drawable::Clutter(clutter) => clutter.render(view, gpu),
            Drawable::Particles(system) => system.render(view, gpu),
        }
    }
}
