//! Shared pool of particle geometry buffers.
//!
//! Every animating [`ParticleSystem`](crate::ParticleSystem) leases one
//! vertex/index buffer pair. Leases go back to the free list when dropped.
//! While the pool is retained (a level with many effects is loaded) free
//! sets are kept for reuse; once released, [`ParticleBufferPool::collect`]
//! destroys them.

use crate::MAX_PARTICLES_PER_SYSTEM;
use std::cell::RefCell;
use std::rc::Rc;
use xengine_gpu::{create_index_buffer, BufferId, BufferKind, ColorVertex, GpuBackend, Index};

pub(crate) const VERTICES_PER_SET: usize = MAX_PARTICLES_PER_SYSTEM * 4;
pub(crate) const INDICES_PER_SET: usize = MAX_PARTICLES_PER_SYSTEM * 6;

/// Vertex buffer for `MAX_PARTICLES_PER_SYSTEM` quads and its index buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferSet {
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
}

/// Counters for tests and the frame report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub created: usize,
    pub destroyed: usize,
    pub free: usize,
    pub outstanding: usize,
}

#[derive(Default)]
struct PoolState {
    retain_count: u32,
    free: Vec<BufferSet>,
    stats: PoolStats,
}

/// Cheap to clone; clones share the same pool
#[derive(Clone, Default)]
pub struct ParticleBufferPool {
    state: Rc<RefCell<PoolState>>,
}

/// A checked-out buffer set. Dropping it returns the set to the pool.
pub struct BufferLease {
    set: BufferSet,
    state: Rc<RefCell<PoolState>>,
}

impl BufferLease {
    pub fn set(&self) -> BufferSet {
        self.set
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.stats.outstanding -= 1;
        state.free.push(self.set);
    }
}

fn quad_indices() -> Vec<Index> {
    let mut indices = Vec::with_capacity(INDICES_PER_SET);
    for quad in 0..MAX_PARTICLES_PER_SYSTEM as Index {
        let b = quad * 4;
        indices.extend_from_slice(&[b, b + 1, b + 2, b, b + 2, b + 3]);
    }
    indices
}

impl ParticleBufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep free sets alive until the matching [`release`](Self::release)
    pub fn retain(&self) {
        self.state.borrow_mut().retain_count += 1;
    }

    pub fn release(&self) {
        let mut state = self.state.borrow_mut();
        if state.retain_count == 0 {
            log::warn!("particle buffer pool released more often than retained");
            return;
        }
        state.retain_count -= 1;
    }

    pub fn is_retained(&self) -> bool {
        self.state.borrow().retain_count > 0
    }

    /// Reuse a free set, or create a new one
    pub fn checkout(&self, gpu: &mut dyn GpuBackend) -> BufferLease {
        let mut state = self.state.borrow_mut();
        let set = match state.free.pop() {
            Some(set) => set,
            None => {
                let zeroed = vec![0u8; VERTICES_PER_SET * std::mem::size_of::<ColorVertex>()];
                let set = BufferSet {
                    vertex_buffer: gpu.create_buffer(BufferKind::Vertex, &zeroed),
                    index_buffer: create_index_buffer(gpu, &quad_indices()),
                };
                state.stats.created += 1;
                set
            }
        };
        state.stats.outstanding += 1;
        BufferLease {
            set,
            state: Rc::clone(&self.state),
        }
    }

    /// Destroy free sets unless the pool is retained. Returns how many
    /// sets were destroyed.
    pub fn collect(&self, gpu: &mut dyn GpuBackend) -> usize {
        if self.is_retained() {
            return 0;
        }
        self.purge(gpu)
    }

    /// Destroy every free set regardless of retention
    pub fn purge(&self, gpu: &mut dyn GpuBackend) -> usize {
        let mut state = self.state.borrow_mut();
        let sets = std::mem::take(&mut state.free);
        for set in &sets {
            gpu.destroy_buffer(set.vertex_buffer);
            gpu.destroy_buffer(set.index_buffer);
        }
        state.stats.destroyed += sets.len();
        if !sets.is_empty() {
            log::debug!("destroyed {} particle buffer sets", sets.len());
        }
        sets.len()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.borrow();
        PoolStats {
            free: state.free.len(),
            ..state.stats
        }
    }
}
