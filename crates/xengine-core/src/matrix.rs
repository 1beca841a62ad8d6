//! 3x3 rotation/scale and 4x4 column-major matrices

use crate::types::{Vec3, Vec4};
use std::ops::Mul;

/// A 3x3 matrix stored as three column vectors.
///
/// Node rotations are `Mat3`s; any scale is baked into the column lengths.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat3 {
    pub x_axis: Vec3,
    pub y_axis: Vec3,
    pub z_axis: Vec3,
}

impl Default for Mat3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat3 {
    pub const IDENTITY: Self = Self {
        x_axis: Vec3::UNIT_X,
        y_axis: Vec3::UNIT_Y,
        z_axis: Vec3::UNIT_Z,
    };

    pub const fn from_cols(x_axis: Vec3, y_axis: Vec3, z_axis: Vec3) -> Self {
        Self {
            x_axis,
            y_axis,
            z_axis,
        }
    }

    pub fn from_scale(scale: Vec3) -> Self {
        Self::from_cols(
            Vec3::new(scale.x, 0.0, 0.0),
            Vec3::new(0.0, scale.y, 0.0),
            Vec3::new(0.0, 0.0, scale.z),
        )
    }

    /// Rotation about the Y axis (radians)
    pub fn from_rotation_y(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_cols(
            Vec3::new(c, 0.0, -s),
            Vec3::UNIT_Y,
            Vec3::new(s, 0.0, c),
        )
    }

    /// Rotation of `angle` radians about a (not necessarily unit) axis
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let a = axis.normalized();
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        Self::from_cols(
            Vec3::new(t * a.x * a.x + c, t * a.x * a.y + s * a.z, t * a.x * a.z - s * a.y),
            Vec3::new(t * a.x * a.y - s * a.z, t * a.y * a.y + c, t * a.y * a.z + s * a.x),
            Vec3::new(t * a.x * a.z + s * a.y, t * a.y * a.z - s * a.x, t * a.z * a.z + c),
        )
    }

    pub fn transpose(&self) -> Self {
        Self::from_cols(
            Vec3::new(self.x_axis.x, self.y_axis.x, self.z_axis.x),
            Vec3::new(self.x_axis.y, self.y_axis.y, self.z_axis.y),
            Vec3::new(self.x_axis.z, self.y_axis.z, self.z_axis.z),
        )
    }

    pub fn mul_vec3(&self, v: Vec3) -> Vec3 {
        self.x_axis * v.x + self.y_axis * v.y + self.z_axis * v.z
    }

    /// Per-axis scale factors (column lengths)
    pub fn scale_factors(&self) -> Vec3 {
        Vec3::new(
            self.x_axis.length(),
            self.y_axis.length(),
            self.z_axis.length(),
        )
    }

    /// Expand to an affine 4x4 transform with the given translation
    pub fn to_mat4(&self, translation: Vec3) -> Mat4 {
        Mat4([
            [self.x_axis.x, self.x_axis.y, self.x_axis.z, 0.0],
            [self.y_axis.x, self.y_axis.y, self.y_axis.z, 0.0],
            [self.z_axis.x, self.z_axis.y, self.z_axis.z, 0.0],
            [translation.x, translation.y, translation.z, 1.0],
        ])
    }
}

impl Mul for Mat3 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::from_cols(
            self.mul_vec3(rhs.x_axis),
            self.mul_vec3(rhs.y_axis),
            self.mul_vec3(rhs.z_axis),
        )
    }
}

impl Mul<Vec3> for Mat3 {
    type Output = Vec3;
    fn mul(self, rhs: Vec3) -> Vec3 {
        self.mul_vec3(rhs)
    }
}

/// A 4x4 column-major matrix (`m[col][row]`), the layout uploaded to the GPU
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat4(pub [[f32; 4]; 4]);

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Self = Self([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    /// Right-handed perspective projection mapping depth to [-1, 1]
    pub fn perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let f = 1.0 / (fov_degrees.to_radians() / 2.0).tan();
        let depth = far - near;

        Self([
            [f / aspect, 0.0, 0.0, 0.0],
            [0.0, f, 0.0, 0.0],
            [0.0, 0.0, -(far + near) / depth, -1.0],
            [0.0, 0.0, -(2.0 * far * near) / depth, 0.0],
        ])
    }

    /// View matrix for an eye at `eye` looking along `forward` (unit length)
    pub fn look_to(eye: Vec3, forward: Vec3, up: Vec3) -> Self {
        let f = forward;
        let s = f.cross(&up).normalized();
        let u = s.cross(&f);

        Self([
            [s.x, u.x, -f.x, 0.0],
            [s.y, u.y, -f.y, 0.0],
            [s.z, u.z, -f.z, 0.0],
            [-s.dot(&eye), -u.dot(&eye), f.dot(&eye), 1.0],
        ])
    }

    /// Row `i` as a vector (used for frustum plane extraction)
    pub fn row(&self, i: usize) -> Vec4 {
        let m = &self.0;
        Vec4::new(m[0][i], m[1][i], m[2][i], m[3][i])
    }

    /// Transform a point, returning homogeneous clip coordinates
    pub fn transform_point4(&self, p: Vec3) -> Vec4 {
        let m = &self.0;
        Vec4::new(
            m[0][0] * p.x + m[1][0] * p.y + m[2][0] * p.z + m[3][0],
            m[0][1] * p.x + m[1][1] * p.y + m[2][1] * p.z + m[3][1],
            m[0][2] * p.x + m[1][2] * p.y + m[2][2] * p.z + m[3][2],
            m[0][3] * p.x + m[1][3] * p.y + m[2][3] * p.z + m[3][3],
        )
    }

    pub fn to_cols_array(&self) -> [[f32; 4]; 4] {
        self.0
    }

    /// Inverse using cofactor expansion. Singular matrices yield identity.
    pub fn inverse(&self) -> Self {
        let m = &self.0;
        let s = |col: usize, row: usize| -> f32 { m[col][row] };

        let c00 = s(2, 2) * s(3, 3) - s(3, 2) * s(2, 3);
        let c02 = s(1, 2) * s(3, 3) - s(3, 2) * s(1, 3);
        let c03 = s(1, 2) * s(2, 3) - s(2, 2) * s(1, 3);

        let c04 = s(2, 1) * s(3, 3) - s(3, 1) * s(2, 3);
        let c06 = s(1, 1) * s(3, 3) - s(3, 1) * s(1, 3);
        let c07 = s(1, 1) * s(2, 3) - s(2, 1) * s(1, 3);

        let c08 = s(2, 1) * s(3, 2) - s(3, 1) * s(2, 2);
        let c10 = s(1, 1) * s(3, 2) - s(3, 1) * s(1, 2);
        let c11 = s(1, 1) * s(2, 2) - s(2, 1) * s(1, 2);

        let c12 = s(2, 0) * s(3, 3) - s(3, 0) * s(2, 3);
        let c14 = s(1, 0) * s(3, 3) - s(3, 0) * s(1, 3);
        let c15 = s(1, 0) * s(2, 3) - s(2, 0) * s(1, 3);

        let c16 = s(2, 0) * s(3, 2) - s(3, 0) * s(2, 2);
        let c18 = s(1, 0) * s(3, 2) - s(3, 0) * s(1, 2);
        let c19 = s(1, 0) * s(2, 2) - s(2, 0) * s(1, 2);

        let c20 = s(2, 0) * s(3, 1) - s(3, 0) * s(2, 1);
        let c22 = s(1, 0) * s(3, 1) - s(3, 0) * s(1, 1);
        let c23 = s(1, 0) * s(2, 1) - s(2, 0) * s(1, 1);

        let f0 = [c00, c00, c02, c03];
        let f1 = [c04, c04, c06, c07];
        let f2 = [c08, c08, c10, c11];
        let f3 = [c12, c12, c14, c15];
        let f4 = [c16, c16, c18, c19];
        let f5 = [c20, c20, c22, c23];

        let v0 = [s(1, 0), s(0, 0), s(0, 0), s(0, 0)];
        let v1 = [s(1, 1), s(0, 1), s(0, 1), s(0, 1)];
        let v2 = [s(1, 2), s(0, 2), s(0, 2), s(0, 2)];
        let v3 = [s(1, 3), s(0, 3), s(0, 3), s(0, 3)];

        let mut inv = [[0.0f32; 4]; 4];
        let sign_a = [1.0, -1.0, 1.0, -1.0];
        let sign_b = [-1.0, 1.0, -1.0, 1.0];

        for i in 0..4 {
            inv[0][i] = sign_a[i] * (v1[i] * f0[i] - v2[i] * f1[i] + v3[i] * f2[i]);
            inv[1][i] = sign_b[i] * (v0[i] * f0[i] - v2[i] * f3[i] + v3[i] * f4[i]);
            inv[2][i] = sign_a[i] * (v0[i] * f1[i] - v1[i] * f3[i] + v3[i] * f5[i]);
            inv[3][i] = sign_b[i] * (v0[i] * f2[i] - v1[i] * f4[i] + v2[i] * f5[i]);
        }

        let det = s(0, 0) * inv[0][0] + s(1, 0) * inv[0][1] + s(2, 0) * inv[0][2] + s(3, 0) * inv[0][3];

        if det.abs() < 1e-10 {
            return Self::IDENTITY;
        }

        let inv_det = 1.0 / det;
        for col in &mut inv {
            for val in col.iter_mut() {
                *val *= inv_det;
            }
        }
        Self(inv)
    }
}

impl Mul for Mat4 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let (a, b) = (&self.0, &rhs.0);
        let mut result = [[0.0; 4]; 4];
        for i in 0..4 {
            for j in 0..4 {
                for k in 0..4 {
                    result[i][j] += a[k][j] * b[i][k];
                }
            }
        }
        Self(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn yaw_rotation_turns_x_into_negative_z() {
        let r = Mat3::from_rotation_y(std::f32::consts::FRAC_PI_2);
        assert!(approx(r * Vec3::UNIT_X, Vec3::new(0.0, 0.0, -1.0)));
        assert!(approx(r * Vec3::UNIT_Y, Vec3::UNIT_Y));
    }

    #[test]
    fn axis_angle_matches_yaw() {
        let a = Mat3::from_axis_angle(Vec3::UNIT_Y, 0.7);
        let b = Mat3::from_rotation_y(0.7);
        assert!(approx(a.x_axis, b.x_axis));
        assert!(approx(a.z_axis, b.z_axis));
    }

    #[test]
    fn scale_factors_read_column_lengths() {
        let m = Mat3::from_rotation_y(1.1) * Mat3::from_scale(Vec3::new(2.0, 3.0, 4.0));
        assert!(approx(m.scale_factors(), Vec3::new(2.0, 3.0, 4.0)));
    }

    #[test]
    fn inverse_round_trips_affine_transform() {
        let m = Mat3::from_rotation_y(0.3).to_mat4(Vec3::new(1.0, 2.0, 3.0));
        let product = m * m.inverse();
        for (i, col) in product.0.iter().enumerate() {
            for (j, v) in col.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn transform_point_applies_translation() {
        let m = Mat3::IDENTITY.to_mat4(Vec3::new(5.0, 0.0, -1.0));
        let p = m.transform_point4(Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(p, Vec4::new(6.0, 1.0, 0.0, 1.0));
    }
}
