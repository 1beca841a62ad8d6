//! Fixed-step simulation clock

use xengine_core::GameTime;

/// Longest frame the simulation will catch up on
const MAX_FRAME_DELTA: f32 = 0.25;

/// Splits variable frame deltas into fixed simulation steps so bullets and
/// particles advance the same way regardless of frame rate.
#[derive(Clone, Debug)]
pub struct GameClock {
    pub fixed_timestep: f32,
    total_time: f32,
    delta_time: f32,
    accumulator: f32,
}

impl Default for GameClock {
    fn default() -> Self {
        Self::with_fixed_timestep(60.0)
    }
}

impl GameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixed_timestep(hz: f32) -> Self {
        Self {
            fixed_timestep: 1.0 / hz,
            total_time: 0.0,
            delta_time: 0.0,
            accumulator: 0.0,
        }
    }

    /// Add one frame's elapsed time. Returns the number of fixed steps due.
    pub fn advance(&mut self, dt: f32) -> u32 {
        self.delta_time = dt.clamp(0.0, MAX_FRAME_DELTA);
        self.total_time += self.delta_time;
        self.accumulator += self.delta_time;

        let mut steps = 0;
        while self.accumulator >= self.fixed_timestep {
            self.accumulator -= self.fixed_timestep;
            steps += 1;
        }
        steps
    }

    pub fn time(&self) -> GameTime {
        GameTime {
            total: self.total_time,
            delta: self.delta_time,
        }
    }

    /// Fraction of a fixed step left in the accumulator
    pub fn interpolation_alpha(&self) -> f32 {
        self.accumulator / self.fixed_timestep
    }
}
