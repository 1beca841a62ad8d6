//! Map description scripts
//!
//! ```text
//! terrain {
//!     heightmap "valley.png"      // or: resolution 64 (flat)
//!     size 512 48 512
//!     skirt 4
//!     texture "valley_color.png"
//!     detail "detail.png"
//!     lightmap -1 0.6 0.3 128      // direction to the light, resolution
//! }
//! trees { texture "pine.png"; density 0.002; size 6 10; seed 7 }
//! clutter {
//!     texture "grass_atlas.png"
//!     capacity 1024
//!     type { density 0.05; size 0.4 0.9; view_range 20 40 }
//! }
//! camera { position 256 40 300; look 0 -0.3 -1 }
//! skybox { folder "sky"; prefix "day_"; extension "png" }
//!                              // or: top "t.png"; front ..; back ..; right ..; left ..
//! fog 150 400 0.6 0.7 0.8
//! model "bunker.xmesh" { position 250 0 260; yaw 90 }
//! bullets "shell.bullet"
//! ```

use std::path::Path;
use xengine_core::{Color, EngineError, Result, Vec3};
use xengine_gpu::FogRange;
use xengine_script::ScriptNode;
use xengine_mesh::{SkyBox, SKY_FACES};
use xengine_vegetation::{ClutterType, MAX_CLUTTER_TYPES};

#[derive(Clone, Debug, PartialEq)]
pub enum TerrainSource {
    Heightmap(String),
    /// Flat terrain of the given sample resolution
    Flat(u32),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TerrainDescription {
    pub source: TerrainSource,
    pub size: Option<Vec3>,
    pub skirt_height: Option<f32>,
    pub texture: Option<String>,
    pub detail: Option<String>,
    /// Direction to the light and lightmap resolution
    pub lightmap: Option<(Vec3, u32)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TreeDescription {
    pub texture: Option<String>,
    /// Trees per square unit
    pub density: f32,
    pub min_size: f32,
    pub max_size: f32,
    pub seed: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClutterDescription {
    pub texture: Option<String>,
    pub capacity: Option<usize>,
    pub seed: Option<u32>,
    pub types: Vec<ClutterType>,
}

/// Sky face textures in [`SKY_FACES`] order
#[derive(Clone, Debug, PartialEq)]
pub struct SkyDescription {
    pub faces: [String; 5],
}

#[derive(Clone, Debug, PartialEq)]
pub struct CameraDescription {
    pub position: Vec3,
    pub look: Vec3,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelPlacement {
    pub file: String,
    pub position: Vec3,
    /// Yaw in degrees
    pub yaw: f32,
}

/// Everything a map script asks for, validated but not yet loaded
#[derive(Clone, Debug, PartialEq)]
pub struct MapDescription {
    pub terrain: TerrainDescription,
    pub trees: Option<TreeDescription>,
    pub clutter: Option<ClutterDescription>,
    pub camera: Option<CameraDescription>,
    pub sky: Option<SkyDescription>,
    pub fog: Option<FogRange>,
    pub models: Vec<ModelPlacement>,
    pub bullets: Option<String>,
}

fn config_error(message: impl Into<String>) -> EngineError {
    EngineError::Configuration(message.into())
}

fn string_value(node: &ScriptNode, what: &str) -> Result<String> {
    node.value(0)
        .map(str::to_string)
        .ok_or_else(|| config_error(format!("'{}' needs a {}", node.name(), what)))
}

fn optional_string(parent: &ScriptNode, name: &str) -> Result<Option<String>> {
    parent
        .subnode_named(name)
        .map(|node| string_value(node, "filename"))
        .transpose()
}

fn vec3_values(node: &ScriptNode, first: usize) -> Result<Vec3> {
    Ok(Vec3::new(
        node.value_f32(first)?,
        node.value_f32(first + 1)?,
        node.value_f32(first + 2)?,
    ))
}

fn optional_vec3(parent: &ScriptNode, name: &str) -> Result<Option<Vec3>> {
    parent
        .subnode_named(name)
        .map(|node| vec3_values(node, 0))
        .transpose()
}

fn non_negative_int(node: &ScriptNode, index: usize) -> Result<u32> {
    let value = node.value_i32(index)?;
    u32::try_from(value).map_err(|_| config_error(format!("'{}' must not be negative, got {}", node.name(), value)))
}

fn optional_u32(parent: &ScriptNode, name: &str) -> Result<Option<u32>> {
    parent
        .subnode_named(name)
        .map(|node| non_negative_int(node, 0))
        .transpose()
}

impl TerrainDescription {
    fn from_script(node: &ScriptNode) -> Result<Self> {
        let source = match (node.subnode_named("heightmap"), node.subnode_named("resolution")) {
            (Some(heightmap), None) => TerrainSource::Heightmap(string_value(heightmap, "filename")?),
            (None, Some(resolution)) => TerrainSource::Flat(non_negative_int(resolution, 0)?),
            _ => return Err(config_error("terrain needs exactly one of 'heightmap' or 'resolution'")),
        };

        let lightmap = match node.subnode_named("lightmap") {
            Some(lightmap) => {
                let direction = vec3_values(lightmap, 0)?;
                let res = if lightmap.value_count() > 3 {
                    non_negative_int(lightmap, 3)?
                } else {
                    128
                };
                Some((direction, res))
            }
            None => None,
        };

        let skirt_height = node
            .subnode_named("skirt")
            .map(|n| n.value_f32(0))
            .transpose()?;

        Ok(Self {
            source,
            size: optional_vec3(node, "size")?,
            skirt_height,
            texture: optional_string(node, "texture")?,
            detail: optional_string(node, "detail")?,
            lightmap,
        })
    }
}

impl TreeDescription {
    fn from_script(node: &ScriptNode) -> Result<Self> {
        let density = node.subnode_f32_or("density", 0, 0.001)?;
        let min_size = node.subnode_f32_or("size", 0, 4.0)?;
        let max_size = node.subnode_f32_or("size", 1, min_size)?;
        if density < 0.0 || min_size <= 0.0 || max_size < min_size {
            return Err(config_error("trees need density >= 0 and 0 < min size <= max size"));
        }
        Ok(Self {
            texture: optional_string(node, "texture")?,
            density,
            min_size,
            max_size,
            seed: optional_u32(node, "seed")?,
        })
    }
}

impl ClutterDescription {
    fn from_script(node: &ScriptNode) -> Result<Self> {
        let types = node
            .subnodes_named("type")
            .map(ClutterType::from_script)
            .collect::<Result<Vec<_>>>()?;
        if types.len() > MAX_CLUTTER_TYPES {
            return Err(config_error(format!(
                "clutter has {} types, at most {} are supported",
                types.len(),
                MAX_CLUTTER_TYPES
            )));
        }
        Ok(Self {
            texture: optional_string(node, "texture")?,
            capacity: optional_u32(node, "capacity")?.map(|c| c as usize),
            seed: optional_u32(node, "seed")?,
            types,
        })
    }
}

impl CameraDescription {
    fn from_script(node: &ScriptNode) -> Result<Self> {
        let position = vec3_values(node.required_subnode("position")?, 0)?;
        let look = optional_vec3(node, "look")?.unwrap_or(Vec3::NEG_UNIT_Z);
        if look.length_squared() == 0.0 {
            return Err(config_error("camera look direction must not be zero"));
        }
        Ok(Self { position, look })
    }
}

impl SkyDescription {
    fn from_script(node: &ScriptNode) -> Result<Self> {
        let named = SKY_FACES.iter().filter(|face| node.subnode_named(face).is_some()).count();
        if named == 0 {
            let folder = optional_string(node, "folder")?.unwrap_or_default();
            let prefix = optional_string(node, "prefix")?.unwrap_or_default();
            let extension = optional_string(node, "extension")?.unwrap_or_else(|| "png".into());
            return Ok(Self {
                faces: SkyBox::face_files(&folder, &prefix, &extension),
            });
        }
        if named < SKY_FACES.len() {
            return Err(config_error(format!("skybox names {} of its {} faces", named, SKY_FACES.len())));
        }
        let mut faces: [String; 5] = Default::default();
        for (slot, face) in faces.iter_mut().zip(SKY_FACES) {
            *slot = string_value(node.required_subnode(face)?, "filename")?;
        }
        Ok(Self { faces })
    }
}

fn fog_from_script(node: &ScriptNode) -> Result<FogRange> {
    let start = node.value_f32(0)?;
    let end = node.value_f32(1)?;
    if end <= start {
        return Err(config_error(format!("fog end {} must lie beyond start {}", end, start)));
    }
    let color = if node.value_count() >= 5 {
        Color::new(node.value_f32(2)?, node.value_f32(3)?, node.value_f32(4)?, 1.0)
    } else {
        Color::GRAY
    };
    Ok(FogRange { start, end, color })
}

impl ModelPlacement {
    fn from_script(node: &ScriptNode) -> Result<Self> {
        Ok(Self {
            file: string_value(node, "filename")?,
            position: optional_vec3(node, "position")?.unwrap_or(Vec3::ZERO),
            yaw: node.subnode_f32_or("yaw", 0, 0.0)?,
        })
    }
}

impl MapDescription {
    pub fn from_script(root: &ScriptNode) -> Result<Self> {
        Ok(Self {
            terrain: TerrainDescription::from_script(root.required_subnode("terrain")?)?,
            trees: root.subnode_named("trees").map(TreeDescription::from_script).transpose()?,
            clutter: root
                .subnode_named("clutter")
                .map(ClutterDescription::from_script)
                .transpose()?,
            camera: root
                .subnode_named("camera")
                .map(CameraDescription::from_script)
                .transpose()?,
            sky: root.subnode_named("skybox").map(SkyDescription::from_script).transpose()?,
            fog: root.subnode_named("fog").map(fog_from_script).transpose()?,
            models: root
                .subnodes_named("model")
                .map(ModelPlacement::from_script)
                .collect::<Result<Vec<_>>>()?,
            bullets: optional_string(root, "bullets")?,
        })
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::from_script(&ScriptNode::parse(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_script(&ScriptNode::load(path)?)
    }
}
