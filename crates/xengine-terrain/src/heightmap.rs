//! Heightfield loading and sampling

use std::path::Path;
use xengine_core::{EngineError, Result};

/// A square grid of heights normalized to [0..1]
#[derive(Clone, Debug)]
pub struct Heightfield {
    /// Row-major, `res * res` samples
    heights: Vec<f32>,
    res: u32,
}

impl Heightfield {
    /// Load an 8-bit grayscale heightmap image. Color images are reduced
    /// to luminance.
    pub fn from_image(path: &Path) -> Result<Self> {
        let img = image::open(path).map_err(|e| EngineError::AssetLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let gray = img.into_luma8();
        let (width, height) = gray.dimensions();
        Self::from_luma(gray.as_raw(), width, height)
    }

    /// Heights from raw 8-bit luminance rows
    pub fn from_luma(luma: &[u8], width: u32, height: u32) -> Result<Self> {
        if width != height {
            return Err(EngineError::Configuration(format!(
                "heightmap must be square, got {}x{}",
                width, height
            )));
        }
        if luma.len() != (width as usize) * (height as usize) {
            return Err(EngineError::Configuration(format!(
                "heightmap has {} bytes, expected {}",
                luma.len(),
                width * height
            )));
        }
        let heights = luma.iter().map(|&l| f32::from(l) / 255.0).collect();
        Ok(Self { heights, res: width })
    }

    /// Heights from floats (clamped to [0..1])
    pub fn from_heights(heights: Vec<f32>, res: u32) -> Result<Self> {
        if heights.len() != (res as usize) * (res as usize) {
            return Err(EngineError::Configuration(format!(
                "{} heights do not form a {}x{} grid",
                heights.len(),
                res,
                res
            )));
        }
        let heights = heights.into_iter().map(|h| h.clamp(0.0, 1.0)).collect();
        Ok(Self { heights, res })
    }

    /// A flat field at height 0
    pub fn flat(res: u32) -> Self {
        Self {
            heights: vec![0.0; (res as usize) * (res as usize)],
            res,
        }
    }

    pub fn res(&self) -> u32 {
        self.res
    }

    /// Height of sample (x, z); coordinates outside the grid clamp to the edge
    pub fn get(&self, x: i32, z: i32) -> f32 {
        let last = self.res as i32 - 1;
        let x = x.clamp(0, last) as usize;
        let z = z.clamp(0, last) as usize;
        self.heights[z * self.res as usize + x]
    }

    /// Bilinear sample at fractional sample coordinates, clamped to the edge
    pub fn sample(&self, fx: f32, fz: f32) -> f32 {
        let x0 = fx.floor();
        let z0 = fz.floor();
        let tx = fx - x0;
        let tz = fz - z0;
        let (x0, z0) = (x0 as i32, z0 as i32);

        let h00 = self.get(x0, z0);
        let h10 = self.get(x0 + 1, z0);
        let h01 = self.get(x0, z0 + 1);
        let h11 = self.get(x0 + 1, z0 + 1);

        let h0 = h00 * (1.0 - tx) + h10 * tx;
        let h1 = h01 * (1.0 - tx) + h11 * tx;
        h0 * (1.0 - tz) + h1 * tz
    }

    /// Surface normal at fractional sample coordinates by central
    /// differences. `spacing` is the world distance between samples and
    /// `height_scale` the world height of 1.0.
    pub fn normal(&self, fx: f32, fz: f32, spacing_x: f32, spacing_z: f32, height_scale: f32) -> [f32; 3] {
        let dx = (self.sample(fx + 1.0, fz) - self.sample(fx - 1.0, fz)) * height_scale / (2.0 * spacing_x);
        let dz = (self.sample(fx, fz + 1.0) - self.sample(fx, fz - 1.0)) * height_scale / (2.0 * spacing_z);

        let (nx, ny, nz) = (-dx, 1.0, -dz);
        let len = (nx * nx + ny * ny + nz * nz).sqrt();
        [nx / len, ny / len, nz / len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma_is_normalized() {
        let hf = Heightfield::from_luma(&[0, 255, 51, 102], 2, 2).unwrap();
        assert_eq!(hf.get(0, 0), 0.0);
        assert_eq!(hf.get(1, 0), 1.0);
        assert!((hf.get(0, 1) - 0.2).abs() < 1e-6);
        assert!((hf.get(1, 1) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_non_square_rejected() {
        let err = Heightfield::from_luma(&[0; 6], 3, 2).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_sampling_clamps_and_interpolates() {
        #[rustfmt::skip]
        let hf = Heightfield::from_heights(vec![
            0.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 0.0,
        ], 3).unwrap();
        assert!((hf.sample(1.0, 1.0) - 1.0).abs() < 1e-6);
        assert!((hf.sample(0.5, 1.0) - 0.5).abs() < 1e-6);
        assert_eq!(hf.sample(-4.0, -4.0), 0.0);
        assert_eq!(hf.get(10, 1), 0.0);
    }

    #[test]
    fn test_flat_normal_points_up() {
        let hf = Heightfield::flat(4);
        let n = hf.normal(1.5, 1.5, 2.0, 2.0, 50.0);
        assert!(n[0].abs() < 1e-6 && (n[1] - 1.0).abs() < 1e-6 && n[2].abs() < 1e-6);
    }

    #[test]
    fn test_load_png() {
        let dir = std::env::temp_dir().join(format!("xengine_hf_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("hm.png");
        let img = image::GrayImage::from_fn(4, 4, |x, _| image::Luma([(x * 85) as u8]));
        img.save(&path).unwrap();

        let hf = Heightfield::from_image(&path).unwrap();
        assert_eq!(hf.res(), 4);
        assert_eq!(hf.get(3, 2), 1.0);

        assert!(matches!(
            Heightfield::from_image(&dir.join("missing.png")),
            Err(EngineError::AssetLoad { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
