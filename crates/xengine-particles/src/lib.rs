//! X-engine Particles - Effect resources and pooled particle systems
//!
//! A [`ParticleEffect`] is a script-defined recipe. A [`ParticleSystem`]
//! runs one effect: `begin_animation` emits its particles and leases
//! geometry from a shared [`ParticleBufferPool`], `update_animation`
//! ages them, and `render` writes camera-facing quads into the lease.

mod effect;
mod pool;
mod system;

pub use effect::{EmissionData, ParticleEffect};
pub use pool::{BufferLease, BufferSet, ParticleBufferPool, PoolStats};
pub use system::{Particle, ParticleSystem};

/// Particles a single system can hold at once
pub const MAX_PARTICLES_PER_SYSTEM: usize = 128;
