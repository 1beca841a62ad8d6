//! Latest-value handoff from a sensor thread

use std::sync::{Arc, Mutex, MutexGuard};
use xengine_core::Vec3;

/// Mutex-guarded slot written by a sensor callback thread and read once
/// per frame. Clones share the slot.
#[derive(Clone, Debug, Default)]
pub struct SensorMailbox {
    slot: Arc<Mutex<Vec3>>,
}

impl SensorMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec3> {
        // a panicked writer leaves a plain Vec3 behind, still usable
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the stored sample
    pub fn post(&self, sample: Vec3) {
        *self.lock() = sample;
    }

    /// Most recent sample
    pub fn latest(&self) -> Vec3 {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_sample_wins() {
        let mailbox = SensorMailbox::new();
        assert_eq!(mailbox.latest(), Vec3::ZERO);
        mailbox.post(Vec3::new(0.0, -1.0, 0.0));
        mailbox.post(Vec3::new(0.1, -0.9, 0.0));
        assert_eq!(mailbox.latest(), Vec3::new(0.1, -0.9, 0.0));
    }

    #[test]
    fn test_written_from_another_thread() {
        let mailbox = SensorMailbox::new();
        let writer = mailbox.clone();
        std::thread::spawn(move || {
            for i in 0..100 {
                writer.post(Vec3::new(i as f32, 0.0, 0.0));
            }
        })
        .join()
        .unwrap();
        assert_eq!(mailbox.latest().x, 99.0);
    }
}
