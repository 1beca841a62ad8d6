//! Time sources and frame timing

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// A source of "now" in seconds. The resource cache stamps zero-refcount
/// times with it, so tests can drive eviction with a manual clock.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Wall clock measured from construction
#[derive(Clone, Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Settable clock. Clones share the same time value.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

/// Total and per-frame elapsed time in seconds
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GameTime {
    pub total: f32,
    pub delta: f32,
}

/// Frame timer: each `capture` samples the clock and updates the
/// current and previous `GameTime`.
pub struct Timer {
    clock: Box<dyn Clock>,
    start: f64,
    time: GameTime,
    last_time: GameTime,
}

impl Timer {
    /// Longest delta a single frame may report (seconds)
    pub const MAX_DELTA: f32 = 0.25;

    pub fn new(clock: Box<dyn Clock>) -> Self {
        let start = clock.now();
        Self {
            clock,
            start,
            time: GameTime::default(),
            last_time: GameTime::default(),
        }
    }

    pub fn capture(&mut self) -> GameTime {
        self.last_time = self.time;
        let total = (self.clock.now() - self.start) as f32;
        self.time = GameTime {
            total,
            delta: (total - self.last_time.total).clamp(0.0, Self::MAX_DELTA),
        };
        self.time
    }

    pub fn time(&self) -> GameTime {
        self.time
    }

    pub fn last_time(&self) -> GameTime {
        self.last_time
    }
}
