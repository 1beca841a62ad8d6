//! Engine configuration loaded from TOML
//!
//! Every field has a default, so a config file only lists what it changes:
//!
//! ```toml
//! asset_root = "data"
//! bullet_capacity = 32
//!
//! [fog]
//! start = 150.0
//! end = 400.0
//! color = [0.6, 0.7, 0.8]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use xengine_core::{Color, EngineError, Result};
use xengine_gpu::FogRange;
use xengine_scene::Camera;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FogConfig {
    pub start: f32,
    pub end: f32,
    #[serde(default = "default_fog_color")]
    pub color: [f32; 3],
}

impl FogConfig {
    pub fn to_range(&self) -> FogRange {
        let [r, g, b] = self.color;
        FogRange {
            start: self.start,
            end: self.end,
            color: Color::new(r, g, b, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_aspect")]
    pub aspect: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: default_fov(),
            aspect: default_aspect(),
            near: default_near(),
            far: default_far(),
        }
    }
}

impl CameraConfig {
    pub fn apply(&self, camera: &mut Camera) {
        camera.fov = self.fov;
        camera.aspect = self.aspect;
        camera.near = self.near;
        camera.far = self.far;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory every resource filename is resolved against
    #[serde(default = "default_asset_root")]
    pub asset_root: PathBuf,
    /// Unreferenced resources older than this are freed by the periodic sweep
    #[serde(default = "default_sweep_timeout")]
    pub sweep_timeout_secs: f32,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: f32,
    #[serde(default)]
    pub fog: Option<FogConfig>,
    #[serde(default = "default_lod_range")]
    pub lod_range: f32,
    #[serde(default = "default_skirt_height")]
    pub skirt_height: f32,
    #[serde(default = "default_bullet_capacity")]
    pub bullet_capacity: usize,
    /// Keep free particle buffers while a map is loaded
    #[serde(default = "default_true")]
    pub retain_particle_pool: bool,
    /// Particle systems alive at once; more spawns are dropped
    #[serde(default = "default_max_particle_effects")]
    pub max_particle_effects: usize,
    #[serde(default = "default_clutter_capacity")]
    pub clutter_capacity: usize,
    #[serde(default)]
    pub camera: CameraConfig,
    /// Seed for procedural placement and particle emission
    #[serde(default = "default_seed")]
    pub seed: u32,
}

fn default_asset_root() -> PathBuf {
    PathBuf::from("assets")
}
fn default_sweep_timeout() -> f32 {
    30.0
}
fn default_sweep_interval() -> f32 {
    5.0
}
fn default_lod_range() -> f32 {
    96.0
}
fn default_skirt_height() -> f32 {
    4.0
}
fn default_bullet_capacity() -> usize {
    64
}
fn default_true() -> bool {
    true
}
fn default_max_particle_effects() -> usize {
    32
}
fn default_clutter_capacity() -> usize {
    2048
}
fn default_seed() -> u32 {
    0x5EED
}
fn default_fov() -> f32 {
    60.0
}
fn default_aspect() -> f32 {
    1.5
}
fn default_near() -> f32 {
    1.0
}
fn default_far() -> f32 {
    1000.0
}
fn default_fog_color() -> [f32; 3] {
    [0.7, 0.75, 0.8]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asset_root: default_asset_root(),
            sweep_timeout_secs: default_sweep_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            fog: None,
            lod_range: default_lod_range(),
            skirt_height: default_skirt_height(),
            bullet_capacity: default_bullet_capacity(),
            retain_particle_pool: true,
            max_particle_effects: default_max_particle_effects(),
            clutter_capacity: default_clutter_capacity(),
            camera: CameraConfig::default(),
            seed: default_seed(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        let bad = |what: &str| Err(EngineError::Configuration(what.to_string()));
        let c = &self.camera;
        let mut scalars = vec![
            self.sweep_timeout_secs,
            self.sweep_interval_secs,
            self.lod_range,
            self.skirt_height,
            c.fov,
            c.aspect,
            c.near,
            c.far,
        ];
        if let Some(fog) = &self.fog {
            scalars.extend([fog.start, fog.end]);
            scalars.extend(fog.color);
        }
        if scalars.iter().any(|v| !v.is_finite()) {
            return bad("config values must be finite numbers");
        }
        if self.sweep_timeout_secs < 0.0 || self.sweep_interval_secs <= 0.0 {
            return bad("sweep timeout must be >= 0 and sweep interval > 0");
        }
        if self.lod_range <= 0.0 {
            return bad("lod_range must be positive");
        }
        if self.bullet_capacity == 0 {
            return bad("bullet_capacity must be at least 1");
        }
        if let Some(fog) = &self.fog {
            if fog.end <= fog.start {
                return bad("fog end must lie beyond fog start");
            }
        }
        if c.near <= 0.0 || c.far <= c.near || c.fov <= 0.0 || c.fov >= 180.0 {
            return bad("camera needs 0 < near < far and 0 < fov < 180");
        }
        Ok(())
    }
}
