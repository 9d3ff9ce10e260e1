//! Player hulls and stances
//!
//! Players collide as axis-aligned boxes that cannot rotate. Crouching swaps
//! in a shorter box around the same center; standing back up is only allowed
//! when the taller box fits.

use portalsim_math::Vec3;
use serde::{Deserialize, Serialize};

/// Default standing half-extents (32 x 32 x 72 box)
pub const DEFAULT_STANDING_HALF_EXTENTS: Vec3 = Vec3::new(16.0, 16.0, 36.0);

/// Default crouching half-extents (32 x 32 x 36 box)
pub const DEFAULT_CROUCHING_HALF_EXTENTS: Vec3 = Vec3::new(16.0, 16.0, 18.0);

/// Eye height above the hull center while standing
pub const DEFAULT_EYE_OFFSET: f32 = 28.0;

/// Player posture
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stance {
    #[default]
    Standing,
    Crouching,
}

/// Collision box sizes for each stance
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerHull {
    pub standing: Vec3,
    pub crouching: Vec3,
}

impl Default for PlayerHull {
    fn default() -> Self {
        Self {
            standing: DEFAULT_STANDING_HALF_EXTENTS,
            crouching: DEFAULT_CROUCHING_HALF_EXTENTS,
        }
    }
}

impl PlayerHull {
    pub fn new(standing: Vec3, crouching: Vec3) -> Self {
        Self { standing, crouching }
    }

    /// Half-extents for a stance
    pub fn half_extents(&self, stance: Stance) -> Vec3 {
        match stance {
            Stance::Standing => self.standing,
            Stance::Crouching => self.crouching,
        }
    }

    /// Eye offset above the center for a stance, scaled with the hull height
    pub fn eye_offset(&self, stance: Stance) -> f32 {
        let scale = self.half_extents(stance).z / self.standing.z.max(f32::EPSILON);
        DEFAULT_EYE_OFFSET * scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stance() {
        assert_eq!(Stance::default(), Stance::Standing);
    }

    #[test]
    fn test_hull_for_stance() {
        let hull = PlayerHull::default();
        assert_eq!(hull.half_extents(Stance::Standing), DEFAULT_STANDING_HALF_EXTENTS);
        assert_eq!(hull.half_extents(Stance::Crouching), DEFAULT_CROUCHING_HALF_EXTENTS);
    }

    #[test]
    fn test_crouching_eye_is_lower() {
        let hull = PlayerHull::default();
        assert!(hull.eye_offset(Stance::Crouching) < hull.eye_offset(Stance::Standing));
        assert!((hull.eye_offset(Stance::Standing) - DEFAULT_EYE_OFFSET).abs() < 0.0001);
    }
}
