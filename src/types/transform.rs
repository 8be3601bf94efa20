//! Matrix helpers shared by the scene evaluator and the exporters.

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Determinants below this are treated as singular.
const SINGULAR_EPSILON: f32 = 1e-12;

/// Rotation that turns a Z-up scene into a Y-up one.
pub fn yup_correction() -> Mat4 {
    Mat4::from_rotation_x(-90f32.to_radians())
}

/// Convert an XYZ Euler triple (X applied first, then Y, then Z) to a quaternion.
pub fn euler_to_quat(euler: [f32; 3]) -> Quat {
    Quat::from_euler(EulerRot::ZYX, euler[2], euler[1], euler[0])
}

/// Inverse of [`euler_to_quat`].
pub fn quat_to_euler(rotation: Quat) -> [f32; 3] {
    let (z, y, x) = rotation.to_euler(EulerRot::ZYX);
    [x, y, z]
}

/// Invert a matrix, tolerating singular input.
///
/// A singular matrix is nudged along its diagonal before inversion; if that
/// still fails the identity is returned so callers never propagate NaNs.
pub fn inverted_safe(matrix: &Mat4) -> Mat4 {
    let det = matrix.determinant();
    if det.is_finite() && det.abs() > SINGULAR_EPSILON {
        return matrix.inverse();
    }

    let nudged = *matrix + Mat4::from_diagonal(glam::Vec4::splat(f32::EPSILON * 8.0));
    let det = nudged.determinant();
    if det.is_finite() && det.abs() > SINGULAR_EPSILON {
        nudged.inverse()
    } else {
        Mat4::IDENTITY
    }
}

/// Local transform channels of an object or pose bone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trs {
    pub location: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Trs {
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, location) = matrix.to_scale_rotation_translation();
        Self {
            location,
            rotation,
            scale,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.location)
    }

    /// True if any scale axis is exactly zero (the transform collapses space).
    pub fn has_zero_scale_axis(&self) -> bool {
        self.scale.to_array().iter().any(|s| *s == 0.0)
    }
}

impl Default for Trs {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}
