//! Unit quaternion rotations
//!
//! A quaternion is the 3D rotor: scalar `w` plus the bivector part `(x, y, z)`.
//! `a * b` applies `b` first, then `a`.

use bytemuck::{Pod, Zeroable};
use serde::{Serialize, Deserialize};
use crate::Vec3;

/// Rotation as a unit quaternion
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quat {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    /// Identity rotation
    pub const IDENTITY: Self = Self { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };

    /// Create from raw components (not normalized)
    #[inline]
    pub const fn from_xyzw(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { w, x, y, z }
    }

    /// Rotation of `radians` about `axis` (right-hand rule)
    pub fn from_axis_angle(axis: Vec3, radians: f32) -> Self {
        let axis = axis.normalized();
        let half = radians * 0.5;
        let s = half.sin();
        Self {
            w: half.cos(),
            x: axis.x * s,
            y: axis.y * s,
            z: axis.z * s,
        }
    }

    /// Rotation about the world up axis
    #[inline]
    pub fn from_rotation_z(radians: f32) -> Self {
        Self::from_axis_angle(Vec3::Z, radians)
    }

    /// Build from an orthonormal basis (forward, left, up) = local (X, Y, Z)
    pub fn from_basis(forward: Vec3, left: Vec3, up: Vec3) -> Self {
        let (m00, m10, m20) = (forward.x, forward.y, forward.z);
        let (m01, m11, m21) = (left.x, left.y, left.z);
        let (m02, m12, m22) = (up.x, up.y, up.z);
        let trace = m00 + m11 + m22;

        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self { w: 0.25 * s, x: (m21 - m12) / s, y: (m02 - m20) / s, z: (m10 - m01) / s }
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
            Self { w: (m21 - m12) / s, x: 0.25 * s, y: (m01 + m10) / s, z: (m02 + m20) / s }
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
            Self { w: (m02 - m20) / s, x: (m01 + m10) / s, y: 0.25 * s, z: (m12 + m21) / s }
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
            Self { w: (m10 - m01) / s, x: (m02 + m20) / s, y: (m12 + m21) / s, z: 0.25 * s }
        };
        q.normalize()
    }

    /// Shortest rotation taking direction `from` onto direction `to`
    pub fn from_rotation_arc(from: Vec3, to: Vec3) -> Self {
        let from = from.normalized();
        let to = to.normalized();
        let d = from.dot(to);
        if d >= 1.0 - 1.0e-6 {
            return Self::IDENTITY;
        }
        if d <= -1.0 + 1.0e-6 {
            return Self::from_axis_angle(from.any_orthogonal(), std::f32::consts::PI);
        }
        let c = from.cross(to);
        Self { w: 1.0 + d, x: c.x, y: c.y, z: c.z }.normalize()
    }

    /// Dot product of the four components
    #[inline]
    pub fn dot(&self, other: &Self) -> f32 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Squared magnitude
    #[inline]
    pub fn magnitude_squared(&self) -> f32 {
        self.dot(self)
    }

    /// Normalize to unit magnitude
    pub fn normalize(&self) -> Self {
        let mag = self.magnitude_squared().sqrt();
        if mag > 0.0 {
            let inv = 1.0 / mag;
            Self { w: self.w * inv, x: self.x * inv, y: self.y * inv, z: self.z * inv }
        } else {
            Self::IDENTITY
        }
    }

    /// Conjugate; the inverse for unit quaternions
    #[inline]
    pub fn conjugate(&self) -> Self {
        Self { w: self.w, x: -self.x, y: -self.y, z: -self.z }
    }

    /// Compose two rotations: result = self * other (other first)
    pub fn compose(&self, other: &Self) -> Self {
        let a = self;
        let b = other;
        Self {
            w: a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
            x: a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            y: a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            z: a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
        }
    }

    /// Rotate a vector
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        let q = Vec3::new(self.x, self.y, self.z);
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }

    /// Local +X in world space
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.rotate(Vec3::X)
    }

    /// Local +Y in world space
    #[inline]
    pub fn left(&self) -> Vec3 {
        self.rotate(Vec3::Y)
    }

    /// Local -Y in world space
    #[inline]
    pub fn right(&self) -> Vec3 {
        -self.left()
    }

    /// Local +Z in world space
    #[inline]
    pub fn up(&self) -> Vec3 {
        self.rotate(Vec3::Z)
    }

    /// Rotation matrix as columns (forward, left, up)
    pub fn to_matrix3(&self) -> [[f32; 3]; 3] {
        let f = self.forward();
        let l = self.left();
        let u = self.up();
        [[f.x, f.y, f.z], [l.x, l.y, l.z], [u.x, u.y, u.z]]
    }

    /// Angle in radians between two orientations
    pub fn angle_to(&self, other: &Self) -> f32 {
        let d = self.dot(other).abs().min(1.0);
        2.0 * d.acos()
    }

    /// Rotation taking `self` to `target`, as axis * angle (radians)
    pub fn scaled_axis_to(&self, target: &Self) -> Vec3 {
        let mut delta = target.compose(&self.conjugate()).normalize();
        if delta.w < 0.0 {
            delta = Self { w: -delta.w, x: -delta.x, y: -delta.y, z: -delta.z };
        }
        let sin_half = (1.0 - delta.w * delta.w).max(0.0).sqrt();
        if sin_half < 1.0e-6 {
            return Vec3::ZERO;
        }
        let angle = 2.0 * delta.w.min(1.0).acos();
        Vec3::new(delta.x, delta.y, delta.z) * (angle / sin_half)
    }

    /// Integrate an angular velocity (radians/second, world axes) over `dt`
    pub fn integrate(&self, angular_velocity: Vec3, dt: f32) -> Self {
        let angle = angular_velocity.length() * dt;
        if angle < 1.0e-8 {
            return *self;
        }
        Self::from_axis_angle(angular_velocity, angle).compose(self).normalize()
    }

    /// Spherical interpolation along the shortest arc
    pub fn slerp(&self, other: &Self, t: f32) -> Self {
        let mut end = *other;
        let mut cos = self.dot(other);
        if cos < 0.0 {
            end = Self { w: -end.w, x: -end.x, y: -end.y, z: -end.z };
            cos = -cos;
        }
        if cos > 0.9995 {
            let lerped = Self {
                w: self.w + (end.w - self.w) * t,
                x: self.x + (end.x - self.x) * t,
                y: self.y + (end.y - self.y) * t,
                z: self.z + (end.z - self.z) * t,
            };
            return lerped.normalize();
        }
        let theta = cos.acos();
        let sin = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin;
        let b = (t * theta).sin() / sin;
        Self {
            w: self.w * a + end.w * b,
            x: self.x * a + end.x * b,
            y: self.y * a + end.y * b,
            z: self.z * a + end.z * b,
        }
        .normalize()
    }

    /// Approximate equality as rotations (q and -q are the same rotation)
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.angle_to(other) <= epsilon
    }
}

impl std::ops::Mul for Quat {
    type Output = Self;
    #[inline]
    fn mul(self, other: Self) -> Self {
        self.compose(&other)
    }
}
