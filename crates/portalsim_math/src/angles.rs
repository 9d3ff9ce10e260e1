//! Euler angles in degrees
//!
//! Convention: rotation = Rz(yaw) * Ry(pitch) * Rx(roll). With the standard
//! right-handed Ry, a positive pitch tips the forward vector downward.

use serde::{Serialize, Deserialize};
use crate::{Quat, Vec3};

/// Pitch, yaw and roll in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Angles {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Angles {
    pub const ZERO: Self = Self { pitch: 0.0, yaw: 0.0, roll: 0.0 };

    #[inline]
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Build from an array `[pitch, yaw, roll]`
    #[inline]
    pub const fn from_array(a: [f32; 3]) -> Self {
        Self { pitch: a[0], yaw: a[1], roll: a[2] }
    }

    #[inline]
    pub fn to_array(self) -> [f32; 3] {
        [self.pitch, self.yaw, self.roll]
    }

    /// Convert to a quaternion
    pub fn to_quat(self) -> Quat {
        let yaw = Quat::from_axis_angle(Vec3::Z, self.yaw.to_radians());
        let pitch = Quat::from_axis_angle(Vec3::Y, self.pitch.to_radians());
        let roll = Quat::from_axis_angle(Vec3::X, self.roll.to_radians());
        (yaw * pitch * roll).normalize()
    }

    /// Extract angles from a rotation
    ///
    /// Near straight up/down the yaw is taken from the left vector and roll is zero.
    pub fn from_quat(q: &Quat) -> Self {
        let f = q.forward();
        let l = q.left();
        let u = q.up();
        let xy_dist = (f.x * f.x + f.y * f.y).sqrt();
        if xy_dist > 0.001 {
            Self {
                yaw: f.y.atan2(f.x).to_degrees(),
                pitch: (-f.z).atan2(xy_dist).to_degrees(),
                roll: l.z.atan2(u.z).to_degrees(),
            }
        } else {
            Self {
                yaw: (-l.x).atan2(l.y).to_degrees(),
                pitch: (-f.z).atan2(xy_dist).to_degrees(),
                roll: 0.0,
            }
        }
    }

    /// Forward direction for these angles
    #[inline]
    pub fn forward(self) -> Vec3 {
        self.to_quat().forward()
    }

    /// Angles looking along `dir` with zero roll
    pub fn looking_along(dir: Vec3) -> Self {
        let dir = dir.normalized();
        let xy_dist = (dir.x * dir.x + dir.y * dir.y).sqrt();
        let yaw = if xy_dist > 0.001 { dir.y.atan2(dir.x).to_degrees() } else { 0.0 };
        Self {
            pitch: (-dir.z).atan2(xy_dist).to_degrees(),
            yaw,
            roll: 0.0,
        }
    }

    /// Wrap every component into (-180, 180]
    pub fn normalized(self) -> Self {
        fn wrap(a: f32) -> f32 {
            let mut a = a % 360.0;
            if a > 180.0 {
                a -= 360.0;
            } else if a <= -180.0 {
                a += 360.0;
            }
            a
        }
        Self { pitch: wrap(self.pitch), yaw: wrap(self.yaw), roll: wrap(self.roll) }
    }
}
