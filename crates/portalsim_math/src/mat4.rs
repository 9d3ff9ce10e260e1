//! 4x4 Matrix utilities for rigid transformations
//!
//! Matrices are column-major (`m[col][row]`) affine transforms: the upper-left
//! 3x3 block is the linear part and column 3 holds the translation. Portal
//! transforms are always rigid, so the inverse is computed by transposing the
//! rotation instead of a general inversion.

use crate::{Quat, Vec3};

/// 4x4 matrix type (column-major)
pub type Mat4 = [[f32; 4]; 4];

/// Identity matrix
pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Create a rotation matrix in the plane spanned by axes `p1` and `p2`.
///
/// A positive angle rotates `p1` toward `p2` (0=X, 1=Y, 2=Z).
pub fn plane_rotation(angle: f32, p1: usize, p2: usize) -> Mat4 {
    let cs = angle.cos();
    let sn = angle.sin();

    let mut m = IDENTITY;
    m[p1][p1] = cs;
    m[p2][p2] = cs;
    m[p1][p2] = sn;
    m[p2][p1] = -sn;
    m
}

/// Rotation about the world up axis (Z)
#[inline]
pub fn rotation_z(angle: f32) -> Mat4 {
    plane_rotation(angle, 0, 1)
}

/// Build an affine matrix from a rotation and a translation
pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Mat4 {
    let r = rotation.to_matrix3();
    [
        [r[0][0], r[0][1], r[0][2], 0.0],
        [r[1][0], r[1][1], r[1][2], 0.0],
        [r[2][0], r[2][1], r[2][2], 0.0],
        [translation.x, translation.y, translation.z, 1.0],
    ]
}

/// Multiply two 4x4 matrices: result = a * b
///
/// In column-major convention, this applies b first, then a.
#[allow(clippy::needless_range_loop)]
pub fn mul(a: Mat4, b: Mat4) -> Mat4 {
    let mut result = [[0.0f32; 4]; 4];

    for i in 0..4 {
        for j in 0..4 {
            for k in 0..4 {
                result[i][j] += a[k][j] * b[i][k];
            }
        }
    }

    result
}

/// Transform a point (w = 1)
pub fn transform_point(m: Mat4, p: Vec3) -> Vec3 {
    Vec3::new(
        m[0][0] * p.x + m[1][0] * p.y + m[2][0] * p.z + m[3][0],
        m[0][1] * p.x + m[1][1] * p.y + m[2][1] * p.z + m[3][1],
        m[0][2] * p.x + m[1][2] * p.y + m[2][2] * p.z + m[3][2],
    )
}

/// Transform a direction (w = 0): rotated, never translated
pub fn transform_vector(m: Mat4, v: Vec3) -> Vec3 {
    Vec3::new(
        m[0][0] * v.x + m[1][0] * v.y + m[2][0] * v.z,
        m[0][1] * v.x + m[1][1] * v.y + m[2][1] * v.z,
        m[0][2] * v.x + m[1][2] * v.y + m[2][2] * v.z,
    )
}

/// Get a column of the linear part as a vector
pub fn get_column(m: Mat4, col: usize) -> Vec3 {
    Vec3::new(m[col][0], m[col][1], m[col][2])
}

/// Translation part
#[inline]
pub fn translation(m: Mat4) -> Vec3 {
    get_column(m, 3)
}

/// Rotation part as a quaternion (assumes an orthonormal linear part)
pub fn rotation(m: Mat4) -> Quat {
    Quat::from_basis(get_column(m, 0), get_column(m, 1), get_column(m, 2))
}

/// Transpose a matrix
pub fn transpose(m: Mat4) -> Mat4 {
    [
        [m[0][0], m[1][0], m[2][0], m[3][0]],
        [m[0][1], m[1][1], m[2][1], m[3][1]],
        [m[0][2], m[1][2], m[2][2], m[3][2]],
        [m[0][3], m[1][3], m[2][3], m[3][3]],
    ]
}

/// Inverse of a rigid (rotation + translation) matrix
pub fn inverse_rigid(m: Mat4) -> Mat4 {
    let mut inv = IDENTITY;
    for col in 0..3 {
        for row in 0..3 {
            inv[col][row] = m[row][col];
        }
    }
    let t = translation(m);
    let inv_t = -transform_vector(inv, t);
    inv[3][0] = inv_t.x;
    inv[3][1] = inv_t.y;
    inv[3][2] = inv_t.z;
    inv
}

/// Element-wise approximate equality
pub fn approx_eq(a: Mat4, b: Mat4, epsilon: f32) -> bool {
    a.iter()
        .zip(b.iter())
        .all(|(ca, cb)| ca.iter().zip(cb.iter()).all(|(x, y)| (x - y).abs() <= epsilon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    const EPSILON: f32 = 0.0001;

    fn vec_approx_eq(a: Vec3, b: Vec3) -> bool {
        a.approx_eq(b, EPSILON)
    }

    #[test]
    fn test_identity() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert!(vec_approx_eq(transform_point(IDENTITY, v), v));
    }

    #[test]
    fn test_rotation_z_half_turn() {
        let m = rotation_z(PI);
        assert!(vec_approx_eq(transform_vector(m, Vec3::X), -Vec3::X));
        assert!(vec_approx_eq(transform_vector(m, Vec3::Y), -Vec3::Y));
        assert!(vec_approx_eq(transform_vector(m, Vec3::Z), Vec3::Z));
    }

    #[test]
    fn test_plane_rotation_matches_quat() {
        let m = plane_rotation(FRAC_PI_2, 0, 1);
        let q = Quat::from_rotation_z(FRAC_PI_2);
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert!(vec_approx_eq(transform_vector(m, v), q.rotate(v)));
    }

    #[test]
    fn test_translation_ignored_for_vectors() {
        let m = from_rotation_translation(Quat::IDENTITY, Vec3::new(5.0, 6.0, 7.0));
        assert!(vec_approx_eq(transform_vector(m, Vec3::X), Vec3::X));
        assert!(vec_approx_eq(transform_point(m, Vec3::X), Vec3::new(6.0, 6.0, 7.0)));
    }

    #[test]
    fn test_mul_composition() {
        let r45 = rotation_z(FRAC_PI_4);
        let r90 = rotation_z(FRAC_PI_2);
        assert!(approx_eq(mul(r45, r45), r90, EPSILON));
        assert!(approx_eq(mul(IDENTITY, r45), r45, EPSILON));
    }

    #[test]
    fn test_mul_applies_right_first() {
        let t = from_rotation_translation(Quat::IDENTITY, Vec3::new(10.0, 0.0, 0.0));
        let r = rotation_z(FRAC_PI_2);
        // rotate then translate
        let m = mul(t, r);
        assert!(vec_approx_eq(transform_point(m, Vec3::X), Vec3::new(10.0, 1.0, 0.0)));
    }

    #[test]
    fn test_inverse_rigid() {
        let q = Quat::from_axis_angle(Vec3::new(1.0, -2.0, 0.5), 1.3);
        let m = from_rotation_translation(q, Vec3::new(3.0, -4.0, 12.0));
        let inv = inverse_rigid(m);
        assert!(approx_eq(mul(m, inv), IDENTITY, EPSILON));
        assert!(approx_eq(mul(inv, m), IDENTITY, EPSILON));
    }

    #[test]
    fn test_rotation_extraction() {
        let q = Quat::from_axis_angle(Vec3::new(0.2, 0.4, -1.0), 0.9);
        let m = from_rotation_translation(q, Vec3::ZERO);
        assert!(rotation(m).approx_eq(&q, 0.0005));
    }

    #[test]
    fn test_transpose_twice() {
        let m = plane_rotation(0.5, 1, 2);
        assert!(approx_eq(transpose(transpose(m)), m, EPSILON));
    }
}
