//! Particle effect definitions loaded from script files
//!
//! ```text
//! texture "smoke.png"
//! blend additive
//! emission {
//!     count 20
//!     box -1 0 -1 1 1 1          // min xyz, max xyz
//!     velocity -1 2 -1 1 4 1     // min xyz, max xyz
//!     gravity -9.8 -4
//!     angle 0 360                // degrees
//!     rotate_speed -90 90        // degrees per second
//!     scale 0.5 1
//!     scale_speed 0 0.5
//!     color 200 200 200 255 255 255
//!     alpha 1 0                  // start, end
//!     life 1 2
//! }
//! ```

use xengine_asset::{Handle, LoadContext, Resource, ResourceCache, ResourceKind, Texture};
use xengine_core::{BoundingBox, ColorBytes, EngineError, Result, Vec3};
use xengine_gpu::{BlendMode, GpuBackend};
use xengine_script::ScriptNode;

/// Random ranges for one burst of particles
#[derive(Clone, Debug, PartialEq)]
pub struct EmissionData {
    pub emit_count: usize,
    pub emit_box: BoundingBox,
    pub min_velocity: Vec3,
    pub max_velocity: Vec3,
    /// Vertical acceleration range (negative falls)
    pub min_gravity: f32,
    pub max_gravity: f32,
    /// Radians
    pub min_angle: f32,
    pub max_angle: f32,
    /// Radians per second
    pub min_rotate_speed: f32,
    pub max_rotate_speed: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub min_scale_speed: f32,
    pub max_scale_speed: f32,
    pub min_color: ColorBytes,
    pub max_color: ColorBytes,
    pub start_alpha: f32,
    pub end_alpha: f32,
    pub min_life: f32,
    pub max_life: f32,
}

impl Default for EmissionData {
    fn default() -> Self {
        Self {
            emit_count: 1,
            emit_box: BoundingBox::default(),
            min_velocity: Vec3::ZERO,
            max_velocity: Vec3::ZERO,
            min_gravity: 0.0,
            max_gravity: 0.0,
            min_angle: 0.0,
            max_angle: 0.0,
            min_rotate_speed: 0.0,
            max_rotate_speed: 0.0,
            min_scale: 1.0,
            max_scale: 1.0,
            min_scale_speed: 0.0,
            max_scale_speed: 0.0,
            min_color: ColorBytes::WHITE,
            max_color: ColorBytes::WHITE,
            start_alpha: 1.0,
            end_alpha: 0.0,
            min_life: 1.0,
            max_life: 1.0,
        }
    }
}

fn vec3_pair(node: &ScriptNode, name: &str, default: (Vec3, Vec3)) -> Result<(Vec3, Vec3)> {
    let Some(sub) = node.subnode_named(name) else {
        return Ok(default);
    };
    let v = |i| sub.value_f32(i);
    Ok((Vec3::new(v(0)?, v(1)?, v(2)?), Vec3::new(v(3)?, v(4)?, v(5)?)))
}

fn f32_pair(node: &ScriptNode, name: &str, default: (f32, f32)) -> Result<(f32, f32)> {
    match node.subnode_named(name) {
        Some(sub) => Ok((sub.value_f32(0)?, sub.value_f32(1)?)),
        None => Ok(default),
    }
}

fn color_byte(node: &ScriptNode, index: usize) -> Result<u8> {
    let value = node.value_i32(index)?;
    u8::try_from(value)
        .map_err(|_| EngineError::Configuration(format!("color component {} is outside 0..=255", value)))
}

impl EmissionData {
    pub fn from_script(node: &ScriptNode) -> Result<Self> {
        let d = Self::default();
        let emit_count = match node.subnode_named("count") {
            Some(sub) => usize::try_from(sub.value_i32(0)?)
                .map_err(|_| EngineError::Configuration("emission count must not be negative".into()))?,
            None => d.emit_count,
        };
        let (box_min, box_max) = vec3_pair(node, "box", (d.emit_box.min, d.emit_box.max))?;
        let (min_velocity, max_velocity) = vec3_pair(node, "velocity", (d.min_velocity, d.max_velocity))?;
        let (min_gravity, max_gravity) = f32_pair(node, "gravity", (d.min_gravity, d.max_gravity))?;
        let (min_angle, max_angle) = f32_pair(node, "angle", (0.0, 0.0))?;
        let (min_rotate_speed, max_rotate_speed) = f32_pair(node, "rotate_speed", (0.0, 0.0))?;
        let (min_scale, max_scale) = f32_pair(node, "scale", (d.min_scale, d.max_scale))?;
        let (min_scale_speed, max_scale_speed) = f32_pair(node, "scale_speed", (0.0, 0.0))?;
        let (start_alpha, end_alpha) = f32_pair(node, "alpha", (d.start_alpha, d.end_alpha))?;
        let (min_life, max_life) = f32_pair(node, "life", (d.min_life, d.max_life))?;

        let (min_color, max_color) = match node.subnode_named("color") {
            Some(sub) => (
                ColorBytes::new(color_byte(sub, 0)?, color_byte(sub, 1)?, color_byte(sub, 2)?, 0xFF),
                ColorBytes::new(color_byte(sub, 3)?, color_byte(sub, 4)?, color_byte(sub, 5)?, 0xFF),
            ),
            None => (d.min_color, d.max_color),
        };

        if min_life <= 0.0 || max_life < min_life {
            return Err(EngineError::Configuration(format!(
                "particle life range {}..{} is invalid",
                min_life, max_life
            )));
        }

        Ok(Self {
            emit_count,
            emit_box: BoundingBox::new(box_min, box_max),
            min_velocity,
            max_velocity,
            min_gravity,
            max_gravity,
            min_angle: min_angle.to_radians(),
            max_angle: max_angle.to_radians(),
            min_rotate_speed: min_rotate_speed.to_radians(),
            max_rotate_speed: max_rotate_speed.to_radians(),
            min_scale,
            max_scale,
            min_scale_speed,
            max_scale_speed,
            min_color,
            max_color,
            start_alpha,
            end_alpha,
            min_life,
            max_life,
        })
    }
}

fn parse_blend(name: &str) -> Result<BlendMode> {
    match name {
        "none" => Ok(BlendMode::None),
        "additive" => Ok(BlendMode::Additive),
        "modulative" => Ok(BlendMode::Modulative),
        "alpha" => Ok(BlendMode::Alpha),
        other => Err(EngineError::Configuration(format!("unknown blend mode '{}'", other))),
    }
}

/// A particle effect: emissions plus the texture and blend mode to draw with
pub struct ParticleEffect {
    pub emissions: Vec<EmissionData>,
    pub blend: BlendMode,
    texture: Option<Handle<Texture>>,
}

impl ParticleEffect {
    /// Particles emitted by one run of the effect
    pub fn total_particles(&self) -> usize {
        self.emissions.iter().map(|e| e.emit_count).sum()
    }

    pub fn texture(&self) -> Option<&Texture> {
        self.texture.as_deref()
    }

    /// Effect from a parsed script; the texture (if named) is acquired
    /// through `acquire_texture`
    fn from_script(
        root: &ScriptNode,
        acquire_texture: impl FnOnce(&str) -> Result<Handle<Texture>>,
    ) -> Result<Self> {
        let emissions = root
            .subnodes_named("emission")
            .map(EmissionData::from_script)
            .collect::<Result<Vec<_>>>()?;
        if emissions.is_empty() {
            return Err(EngineError::Configuration("particle effect has no emission".into()));
        }
        let blend = match root.subnode_named("blend").and_then(|n| n.value(0)) {
            Some(name) => parse_blend(name)?,
            None => BlendMode::Alpha,
        };
        let texture = match root.subnode_named("texture").and_then(|n| n.value(0)) {
            Some(file) => Some(acquire_texture(file)?),
            None => None,
        };
        Ok(Self {
            emissions,
            blend,
            texture,
        })
    }
}

impl Resource for ParticleEffect {
    const KIND: ResourceKind = "particle_effect";

    fn load(ctx: &mut LoadContext<'_>) -> Result<Self> {
        let root = ScriptNode::parse(&ctx.read_to_string()?)?;
        Self::from_script(&root, |file| ctx.acquire::<Texture>(file))
    }

    fn unload(self, cache: &mut ResourceCache, _gpu: &mut dyn GpuBackend) {
        if let Some(texture) = self.texture {
            cache.release(texture);
        }
    }
}
