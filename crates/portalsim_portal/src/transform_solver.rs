//! Cross-portal transform
//!
//! The link matrix of a portal pair maps world space in front of one portal
//! to world space in front of the other: undo the entrance pose, turn half a
//! revolution about the portal's up axis, apply the exit pose. Whatever walks
//! into the entrance comes out of the exit facing away from it.

use portalsim_core::Transform3D;
use portalsim_math::{mat4, Mat4, Quat, Vec3};

/// Half a revolution about local up
pub fn half_turn() -> Mat4 {
    mat4::rotation_z(std::f32::consts::PI)
}

/// World-to-world matrix taking points at `entrance` to `exit`
pub fn portal_matrix(entrance: &Transform3D, exit: &Transform3D) -> Mat4 {
    let to_entrance_local = mat4::inverse_rigid(entrance.to_matrix());
    mat4::mul(exit.to_matrix(), mat4::mul(half_turn(), to_entrance_local))
}

/// The matrix pair of a link, always updated together
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkTransform {
    /// Entrance to exit
    pub forward: Mat4,
    /// Exit to entrance, the exact rigid inverse of `forward`
    pub inverse: Mat4,
}

impl LinkTransform {
    pub fn between(entrance: &Transform3D, exit: &Transform3D) -> Self {
        let forward = portal_matrix(entrance, exit);
        Self {
            forward,
            inverse: mat4::inverse_rigid(forward),
        }
    }

    /// The same link seen from the other side
    pub fn flipped(&self) -> Self {
        Self {
            forward: self.inverse,
            inverse: self.forward,
        }
    }
}

impl Default for LinkTransform {
    fn default() -> Self {
        Self {
            forward: mat4::IDENTITY,
            inverse: mat4::IDENTITY,
        }
    }
}

pub fn apply_point(m: Mat4, p: Vec3) -> Vec3 {
    mat4::transform_point(m, p)
}

/// Rotate a vector (velocity, angular velocity) without translating it
pub fn apply_vector(m: Mat4, v: Vec3) -> Vec3 {
    mat4::transform_vector(m, v)
}

pub fn apply_rotation(m: Mat4, q: Quat) -> Quat {
    mat4::rotation(m).compose(&q).normalize()
}

pub fn apply_transform(m: Mat4, t: &Transform3D) -> Transform3D {
    Transform3D::from_position_rotation(apply_point(m, t.position), apply_rotation(m, t.rotation))
}
