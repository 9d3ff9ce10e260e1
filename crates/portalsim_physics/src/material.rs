//! Physical material properties for collision response

use serde::{Deserialize, Serialize};

/// Physical material properties for collision response
///
/// Materials define how objects interact during collisions, including
/// friction (how much objects resist sliding) and restitution (bounciness).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicsMaterial {
    /// Friction coefficient (0.0 = ice, 1.0 = rubber)
    pub friction: f32,
    /// Restitution/bounciness (0.0 = no bounce, 1.0 = perfect bounce)
    pub restitution: f32,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            friction: 0.5,
            restitution: 0.0,
        }
    }
}

impl PhysicsMaterial {
    /// Ice-like material: very low friction, slight bounce
    pub const ICE: Self = Self {
        friction: 0.05,
        restitution: 0.1,
    };

    /// Rubber-like material: high friction, very bouncy
    pub const RUBBER: Self = Self {
        friction: 0.9,
        restitution: 0.8,
    };

    /// Metal-like material: moderate friction and bounce
    pub const METAL: Self = Self {
        friction: 0.3,
        restitution: 0.3,
    };

    /// Concrete-like material: high friction, very low bounce
    pub const CONCRETE: Self = Self {
        friction: 0.7,
        restitution: 0.1,
    };

    /// Create a new physics material with custom friction and restitution
    ///
    /// Values are clamped to the range [0.0, 1.0].
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            friction: friction.clamp(0.0, 1.0),
            restitution: restitution.clamp(0.0, 1.0),
        }
    }

    /// Combine two materials for collision response
    ///
    /// Geometric mean for friction, maximum for restitution.
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            friction: (self.friction * other.friction).sqrt(),
            restitution: self.restitution.max(other.restitution),
        }
    }
}

/// Material of a static world surface
///
/// Besides the collision response this records whether portals may be
/// placed on the surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMaterial {
    pub friction: f32,
    pub restitution: f32,
    /// Portals can open on this surface
    pub portalable: bool,
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self::CONCRETE
    }
}

impl SurfaceMaterial {
    /// White concrete panels: accepts portals
    pub const CONCRETE: Self = Self {
        friction: 0.7,
        restitution: 0.1,
        portalable: true,
    };

    /// Dark metal panels: rejects portals
    pub const METAL: Self = Self {
        friction: 0.3,
        restitution: 0.3,
        portalable: false,
    };

    /// Glass: rejects portals
    pub const GLASS: Self = Self {
        friction: 0.2,
        restitution: 0.1,
        portalable: false,
    };

    /// Create a surface material; friction and restitution are clamped to [0, 1]
    pub fn new(friction: f32, restitution: f32, portalable: bool) -> Self {
        Self {
            friction: friction.clamp(0.0, 1.0),
            restitution: restitution.clamp(0.0, 1.0),
            portalable,
        }
    }

    /// The collision response part of this surface
    pub fn physics(&self) -> PhysicsMaterial {
        PhysicsMaterial::new(self.friction, self.restitution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_material() {
        let material = PhysicsMaterial::default();
        assert_eq!(material.friction, 0.5);
        assert_eq!(material.restitution, 0.0);
    }

    #[test]
    fn test_new_clamps_values() {
        let material = PhysicsMaterial::new(1.5, -0.5);
        assert_eq!(material.friction, 1.0);
        assert_eq!(material.restitution, 0.0);
    }

    #[test]
    fn test_combine_geometric_mean_friction() {
        let combined = PhysicsMaterial::ICE.combine(&PhysicsMaterial::RUBBER);
        let expected_friction = (0.05_f32 * 0.9_f32).sqrt();
        assert!((combined.friction - expected_friction).abs() < 0.0001);
    }

    #[test]
    fn test_combine_max_restitution() {
        let combined = PhysicsMaterial::METAL.combine(&PhysicsMaterial::RUBBER);
        assert_eq!(combined.restitution, 0.8);
    }

    #[test]
    fn test_combine_is_commutative() {
        let a = PhysicsMaterial::new(0.3, 0.5);
        let b = PhysicsMaterial::new(0.7, 0.2);
        let ab = a.combine(&b);
        let ba = b.combine(&a);
        assert!((ab.friction - ba.friction).abs() < 0.0001);
        assert_eq!(ab.restitution, ba.restitution);
    }

    #[test]
    fn test_surface_portalable_presets() {
        assert!(SurfaceMaterial::CONCRETE.portalable);
        assert!(!SurfaceMaterial::METAL.portalable);
        assert!(!SurfaceMaterial::GLASS.portalable);
    }

    #[test]
    fn test_surface_physics_part() {
        let surface = SurfaceMaterial::new(0.4, 0.2, true);
        assert_eq!(surface.physics(), PhysicsMaterial::new(0.4, 0.2));
    }
}
