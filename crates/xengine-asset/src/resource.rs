//! The resource trait

use crate::cache::{LoadContext, ResourceCache};
use xengine_core::Result;
use xengine_gpu::GpuBackend;

/// Short, unique name of a resource type ("texture", "mesh", ...).
/// Together with the filename it forms the cache key.
pub type ResourceKind = &'static str;

/// A file-backed object managed by a [`ResourceCache`]
pub trait Resource: Sized + 'static {
    const KIND: ResourceKind;

    /// Load from `ctx.path()`. Loaders may acquire other resources through
    /// the context; those handles belong to the new resource.
    fn load(ctx: &mut LoadContext<'_>) -> Result<Self>;

    /// Free GPU objects and release nested handles. Called once, when the
    /// cache sweeps the resource.
    fn unload(self, cache: &mut ResourceCache, gpu: &mut dyn GpuBackend);
}
