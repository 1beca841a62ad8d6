//! Debug GPU-state checks and redundant-bind tracking

use crate::backend::{BufferId, GpuBackend, TextureId};
use xengine_core::{EngineError, Result};

/// Turn the backend's pending error (if any) into a `GpuState` error
pub fn check_gpu_state(gpu: &mut dyn GpuBackend) -> Result<()> {
    match gpu.poll_error() {
        Some(message) => Err(EngineError::GpuState(message)),
        None => Ok(()),
    }
}

/// Debug builds: panic on a pending GPU error. Release builds: no-op.
#[cfg(debug_assertions)]
pub fn gpu_check(gpu: &mut dyn GpuBackend) {
    if let Err(err) = check_gpu_state(gpu) {
        panic!("{err}");
    }
}

#[cfg(not(debug_assertions))]
#[inline(always)]
pub fn gpu_check(_gpu: &mut dyn GpuBackend) {}

/// Remembers the currently bound mesh buffers and texture stages so callers
/// can skip redundant binds. Anything that changes bindings without going
/// through `check_bind_*` must call the matching `notify_*` method.
#[derive(Clone, Debug, Default)]
pub struct BindingTracker {
    mesh: Option<(BufferId, BufferId)>,
    textures: [Option<Option<TextureId>>; 2],
}

impl BindingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the pair is not already bound. Records it as bound.
    pub fn check_bind_mesh(&mut self, vertex: BufferId, index: BufferId) -> bool {
        if self.mesh == Some((vertex, index)) {
            return false;
        }
        self.mesh = Some((vertex, index));
        true
    }

    pub fn check_bind_texture0(&mut self, texture: Option<TextureId>) -> bool {
        self.check_stage(0, texture)
    }

    pub fn check_bind_texture1(&mut self, texture: Option<TextureId>) -> bool {
        self.check_stage(1, texture)
    }

    pub fn check_bind_textures(&mut self, t0: Option<TextureId>, t1: Option<TextureId>) -> bool {
        let a = self.check_stage(0, t0);
        let b = self.check_stage(1, t1);
        a || b
    }

    pub fn notify_mesh_bindings_changed(&mut self) {
        self.mesh = None;
    }

    pub fn notify_texture_bindings_changed(&mut self) {
        self.textures = [None, None];
    }

    fn check_stage(&mut self, stage: usize, texture: Option<TextureId>) -> bool {
        if self.textures[stage] == Some(texture) {
            return false;
        }
        self.textures[stage] = Some(texture);
        true
    }
}
