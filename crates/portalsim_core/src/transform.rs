//! Rigid 3D transform (position and rotation)
//!
//! A Transform3D places an entity or portal in the world. Portals only ever
//! move rigidly, so there is no scale.

use portalsim_math::{mat4, Angles, Mat4, Quat, Vec3};
use serde::{Serialize, Deserialize};

/// A rigid transform with position and rotation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    /// Position in world space
    pub position: Vec3,
    /// Rotation as a unit quaternion
    pub rotation: Quat,
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform3D {
    /// Create an identity transform
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    /// Create a transform with just a position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation: rotation.normalize(),
        }
    }

    /// Create a transform from an origin and pitch/yaw/roll angles
    pub fn from_origin_angles(origin: Vec3, angles: Angles) -> Self {
        Self::from_position_rotation(origin, angles.to_quat())
    }

    /// The rotation expressed as angles
    pub fn angles(&self) -> Angles {
        Angles::from_quat(&self.rotation)
    }

    /// Build from a rigid matrix
    pub fn from_matrix(m: Mat4) -> Self {
        Self::from_position_rotation(mat4::translation(m), mat4::rotation(m))
    }

    /// Local-to-world matrix
    pub fn to_matrix(&self) -> Mat4 {
        mat4::from_rotation_translation(self.rotation, self.position)
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.rotation.forward()
    }

    #[inline]
    pub fn left(&self) -> Vec3 {
        self.rotation.left()
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.rotation.up()
    }

    /// Transform a point from local space to world space
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation.rotate(p) + self.position
    }

    /// Transform a direction from local space to world space
    pub fn transform_direction(&self, d: Vec3) -> Vec3 {
        self.rotation.rotate(d)
    }

    /// Transform a point from world space into local space
    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation.conjugate().rotate(p - self.position)
    }

    /// Transform a direction from world space into local space
    pub fn inverse_transform_direction(&self, d: Vec3) -> Vec3 {
        self.rotation.conjugate().rotate(d)
    }

    /// Compute the inverse transform
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.conjugate();
        Self {
            position: inv_rotation.rotate(-self.position),
            rotation: inv_rotation,
        }
    }

    /// Compose two transforms: result = self * other
    ///
    /// The composed transform applies `other` first, then `self`.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(other.position),
            rotation: self.rotation.compose(&other.rotation).normalize(),
        }
    }

    /// Translate the transform by an offset
    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    /// Approximate equality (position per component, rotation by angle)
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.position.approx_eq(other.position, epsilon) && self.rotation.approx_eq(&other.rotation, epsilon)
    }
}
