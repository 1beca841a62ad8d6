//! X-engine Game - Application context and gameplay plumbing
//!
//! - `GameContext` owns the caches, the scene and everything a map loads
//! - `EngineConfig` is read from TOML, maps from the script format
//! - `BulletPool` recycles a fixed number of projectiles
//! - `SensorMailbox` hands sensor samples from another thread to the frame loop

mod bullet;
mod clock;
mod config;
mod drawable;
mod map;
mod sensor;
mod session;

pub use bullet::{Bullet, BulletPool, BulletType, Impact, ImpactTarget};
pub use clock::GameClock;
pub use config::{CameraConfig, EngineConfig, FogConfig};
pub use drawable::Drawable;
pub use map::{
    CameraDescription, ClutterDescription, MapDescription, ModelPlacement, TerrainDescription, TerrainSource,
    TreeDescription,
};
pub use sensor::SensorMailbox;
pub use session::{FrameStats, GameContext};
