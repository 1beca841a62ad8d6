//! X-engine Core - Foundational types for the engine
//!
//! This crate provides the core types that all other engine crates depend on:
//! - `Vec2`, `Vec3`, `Vec4`, `Mat3`, `Mat4` - Spatial math
//! - `BoundingBox`, `IntRect`, `ScalarRect` - Bounds and regions
//! - `Color`, `ColorBytes` - Float and packed colors
//! - `Rng` - Small deterministic PRNG for procedural placement
//! - `Clock`, `Timer` - Time sources for eviction and frame timing
//! - Error types and Result alias

mod bounds;
mod error;
mod matrix;
mod rand;
mod time;
mod types;

pub use bounds::{BoundingBox, IntRect, ScalarRect};
pub use error::{EngineError, Result};
pub use matrix::{Mat3, Mat4};
pub use rand::Rng;
pub use time::{Clock, GameTime, ManualClock, MonotonicClock, Timer};
pub use types::{Color, ColorBytes, Vec2, Vec3, Vec4};

/// Returns true if `value` is a non-zero power of two
pub fn is_power_of_two(value: u32) -> bool {
    value != 0 && value & (value - 1) == 0
}
