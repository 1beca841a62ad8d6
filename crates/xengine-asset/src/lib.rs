//! X-engine Asset - Reference-counted resource cache
//!
//! A [`ResourceCache`] loads file-backed resources (textures, meshes,
//! particle effects, ...) at most once per `(kind, filename)` key and hands
//! out [`Handle`]s. Releasing the last handle does not free anything; the
//! owner decides when to sweep unreferenced resources, either immediately
//! (level change, low memory) or after a grace period.

mod cache;
mod resource;
mod texture;

pub use cache::{CacheStats, Handle, LoadContext, ResourceCache, ResourceKey};
pub use resource::{Resource, ResourceKind};
pub use texture::Texture;
