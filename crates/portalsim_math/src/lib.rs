//! 3D Mathematics Library
//!
//! This crate provides the vector, rotation and matrix types used by the portal
//! simulation. The world is Z-up; a pose's local frame is forward = +X,
//! left = +Y, up = +Z.
//!
//! ## Core Types
//!
//! - [`Vec3`] - 3D vector with x, y, z components
//! - [`Quat`] - Unit quaternion rotation
//! - [`Angles`] - Pitch/yaw/roll in degrees (pitch positive looks down)
//! - [`Mat4`] - 4x4 column-major affine matrix with free-function helpers
//! - [`Rect`] - Axis-aligned rectangle in a plane's local coordinates

mod vec3;
mod quat;
mod angles;
mod rect;
pub mod mat4;

pub use vec3::Vec3;
pub use quat::Quat;
pub use angles::Angles;
pub use rect::Rect;
pub use mat4::Mat4;

/// Tolerance used by the approximate comparison helpers
pub const EPSILON: f32 = 1.0e-4;
