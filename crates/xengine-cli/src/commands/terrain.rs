//! Heightmap checks

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use xengine_core::Vec3;
use xengine_gpu::RecordingBackend;
use xengine_terrain::{chunk_tile_res_for, Heightfield, Terrain, TerrainConfig};

#[derive(Subcommand)]
pub enum TerrainCommands {
    /// Check that a heightmap builds a terrain and that skirts hide LOD seams
    Check {
        heightmap: PathBuf,

        /// World size as x,y,z
        #[arg(long, value_parser = parse_vec3)]
        size: Option<[f32; 3]>,

        /// Skirt height
        #[arg(long)]
        skirt: Option<f32>,
    },
}

fn parse_vec3(s: &str) -> Result<[f32; 3], String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("expected 3 comma-separated values, got {}", parts.len()));
    }
    let mut out = [0.0; 3];
    for (slot, part) in out.iter_mut().zip(&parts) {
        *slot = part.trim().parse().map_err(|e| format!("invalid number '{}': {}", part, e))?;
    }
    Ok(out)
}

pub fn run(cmd: TerrainCommands) -> Result<()> {
    match cmd {
        TerrainCommands::Check { heightmap, size, skirt } => {
            let defaults = TerrainConfig::default();
            let config = TerrainConfig {
                size: size.map(|[x, y, z]| Vec3::new(x, y, z)).unwrap_or(defaults.size),
                skirt_height: skirt.unwrap_or(defaults.skirt_height),
                ..defaults
            };
            check(&heightmap, config).map(|_| ())
        }
    }
}

/// Returns the largest seam gap between neighbouring chunk LODs
fn check(path: &Path, config: TerrainConfig) -> Result<f32> {
    let heightfield =
        Heightfield::from_image(path).with_context(|| format!("Failed to read heightmap {}", path.display()))?;
    let res = heightfield.res();
    let tile = chunk_tile_res_for(res).with_context(|| format!("{} has an unusable resolution", path.display()))?;

    let mut gpu = RecordingBackend::new();
    let terrain = Terrain::new(heightfield, config, &mut gpu)?;
    let gap = terrain.max_seam_gap();
    let bounds = terrain.bounds();

    println!("{}: {}x{} samples", path.display(), res, res);
    println!("  chunk tiles: {} samples, {} LOD levels", tile, terrain.lod_level_count());
    println!("  height range: {:.2} .. {:.2}", bounds.min.y, bounds.max.y);
    if gap > config.skirt_height {
        println!(
            "  warning: largest LOD seam gap {:.2} exceeds the skirt height {:.2}",
            gap, config.skirt_height
        );
    } else {
        println!("  largest LOD seam gap {:.2} is covered by skirts ({:.2})", gap, config.skirt_height);
    }
    Ok(gap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vec3() {
        assert_eq!(parse_vec3("1, 2.5,3").unwrap(), [1.0, 2.5, 3.0]);
        assert!(parse_vec3("1,2").is_err());
        assert!(parse_vec3("1,x,3").is_err());
    }

    #[test]
    fn test_check_heightmaps() {
        let dir = std::env::temp_dir().join(format!("xengine_cli_terrain_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let flat = dir.join("flat.png");
        image::GrayImage::from_pixel(64, 64, image::Luma([128u8])).save(&flat).unwrap();
        assert_eq!(check(&flat, TerrainConfig::default()).unwrap(), 0.0);

        let odd = dir.join("odd.png");
        image::GrayImage::from_pixel(65, 65, image::Luma([0u8])).save(&odd).unwrap();
        assert!(check(&odd, TerrainConfig::default()).is_err());

        assert!(check(&dir.join("absent.png"), TerrainConfig::default()).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
