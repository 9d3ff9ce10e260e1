//! Rigid bodies and static colliders

use bitflags::bitflags;
use portalsim_math::{Quat, Vec3};
use slotmap::new_key_type;

use crate::collision::CollisionFilter;
use crate::environment::EnvironmentKey;
use crate::material::{PhysicsMaterial, SurfaceMaterial};
use crate::shapes::{Aabb, Collider, Obb, Plane, Sphere};

new_key_type! {
    /// Key to a rigid body in the physics world
    ///
    /// Uses generational indexing to prevent the ABA problem where a handle
    /// could point to a reused slot. If a body is removed and its slot reused,
    /// old keys will return None instead of pointing to the wrong body.
    pub struct BodyKey;

    /// Key to a static collider in the physics world
    pub struct ColliderKey;
}

/// How a body participates in the simulation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BodyType {
    /// Moved by gravity, velocity and collision response
    #[default]
    Dynamic,
    /// Moved only by its velocity; pushes dynamic bodies but is never pushed
    Kinematic,
    /// Never moves
    Static,
}

/// A rigid body with position, orientation, velocity and a collision shape
///
/// The collision shape is a sphere or an axis-aligned box centered on the
/// body's position. It does not rotate with `orientation`; the orientation
/// and angular velocity are still integrated so they can be carried through
/// portals.
#[derive(Clone, Debug)]
pub struct RigidBody {
    /// Position in world space
    pub position: Vec3,
    /// Orientation in world space
    pub orientation: Quat,
    /// Velocity (units per second)
    pub velocity: Vec3,
    /// Angular velocity as a scaled axis (radians per second)
    pub angular_velocity: Vec3,
    /// Mass of the body (used for push calculations)
    pub mass: f32,
    /// Friction and restitution
    pub material: PhysicsMaterial,
    pub body_type: BodyType,
    /// Whether this body is affected by gravity
    pub affected_by_gravity: bool,
    /// The collision shape for this body (stores absolute world position)
    pub collider: Collider,
    pub filter: CollisionFilter,
    /// Collision environment overriding the world's static geometry
    pub environment: Option<EnvironmentKey>,
    /// Set by the last step when resting on an upward-facing surface
    pub grounded: bool,
}

impl RigidBody {
    fn with_collider(position: Vec3, collider: Collider) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            mass: 1.0,
            material: PhysicsMaterial::default(),
            body_type: BodyType::Dynamic,
            affected_by_gravity: true,
            collider,
            filter: CollisionFilter::default(),
            environment: None,
            grounded: false,
        }
    }

    /// Create a new rigid body with a sphere collider
    pub fn new_sphere(position: Vec3, radius: f32) -> Self {
        Self::with_collider(position, Collider::Sphere(Sphere::new(position, radius)))
    }

    /// Create a new rigid body with an AABB collider
    pub fn new_aabb(position: Vec3, half_extents: Vec3) -> Self {
        Self::with_collider(
            position,
            Collider::Aabb(Aabb::from_center_half_extents(position, half_extents)),
        )
    }

    /// Create a kinematic box (a moving brush)
    pub fn new_kinematic_aabb(position: Vec3, half_extents: Vec3) -> Self {
        Self::new_aabb(position, half_extents)
            .with_body_type(BodyType::Kinematic)
            .with_filter(CollisionFilter::mover())
    }

    /// Set the velocity of this body
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    /// Set the angular velocity of this body
    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = orientation.normalize();
        self
    }

    /// Set the mass of this body
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    /// Set the restitution (bounciness) of this body
    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.material.restitution = restitution.clamp(0.0, 1.0);
        self
    }

    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    /// Set whether this body is affected by gravity
    pub fn with_gravity(mut self, affected: bool) -> Self {
        self.affected_by_gravity = affected;
        self
    }

    /// Set the body type; non-dynamic bodies ignore gravity
    pub fn with_body_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        if body_type != BodyType::Dynamic {
            self.affected_by_gravity = false;
        }
        self
    }

    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn is_kinematic(&self) -> bool {
        self.body_type == BodyType::Kinematic
    }

    /// Static and kinematic bodies are never pushed
    pub fn is_immovable(&self) -> bool {
        self.body_type != BodyType::Dynamic
    }

    /// Update the position and sync the collider
    pub fn set_position(&mut self, position: Vec3) {
        let delta = position - self.position;
        self.position = position;
        self.collider = self.collider.translated(delta);
    }

    /// Apply a positional correction (e.g., from collision resolution)
    pub fn apply_correction(&mut self, correction: Vec3) {
        self.position += correction;
        self.collider = self.collider.translated(correction);
    }

    /// World-space bounds of the collider
    pub fn bounds(&self) -> Aabb {
        self.collider
            .bounds()
            .unwrap_or_else(|| Aabb::from_center_half_extents(self.position, Vec3::ZERO))
    }

    /// Half-extents of the collider's bounds
    pub fn half_extents(&self) -> Vec3 {
        self.bounds().half_extents()
    }

    /// Radius of the sphere around the position containing the collider
    pub fn bounding_radius(&self) -> f32 {
        self.collider.bounding_radius()
    }

    /// Replace the collider's size, keeping it centered on the position
    pub fn set_half_extents(&mut self, half_extents: Vec3) {
        self.collider = match self.collider {
            Collider::Sphere(_) => Collider::Sphere(Sphere::new(self.position, half_extents.max_element())),
            _ => Collider::Aabb(Aabb::from_center_half_extents(self.position, half_extents)),
        };
    }
}

bitflags! {
    /// Per-surface behaviour flags
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfaceFlags: u32 {
        /// Portals may never open on this surface regardless of material
        const NO_PORTAL = 1 << 0;
        /// Traces and bodies pass through; only queries see it
        const NONSOLID = 1 << 1;
    }
}

/// A static collider (floor, wall, ramp)
#[derive(Clone, Debug, PartialEq)]
pub struct StaticCollider {
    pub collider: Collider,
    pub material: SurfaceMaterial,
    pub filter: CollisionFilter,
    pub flags: SurfaceFlags,
}

impl StaticCollider {
    pub fn new(collider: Collider, material: SurfaceMaterial) -> Self {
        Self {
            collider,
            material,
            filter: CollisionFilter::static_world(),
            flags: SurfaceFlags::empty(),
        }
    }

    /// Infinite floor plane at height `z`
    pub fn floor(z: f32, material: SurfaceMaterial) -> Self {
        Self::new(Collider::Plane(Plane::floor(z)), material)
    }

    /// Axis-aligned box
    pub fn aabb(center: Vec3, half_extents: Vec3, material: SurfaceMaterial) -> Self {
        Self::new(
            Collider::Aabb(Aabb::from_center_half_extents(center, half_extents)),
            material,
        )
    }

    /// Oriented box
    pub fn obb(obb: Obb, material: SurfaceMaterial) -> Self {
        Self::new(Collider::Obb(obb), material)
    }

    pub fn with_flags(mut self, flags: SurfaceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Whether bodies collide with this surface
    pub fn is_solid(&self) -> bool {
        !self.flags.contains(SurfaceFlags::NONSOLID)
    }

    /// Whether a portal may be placed on this surface
    pub fn accepts_portals(&self) -> bool {
        self.material.portalable && !self.flags.contains(SurfaceFlags::NO_PORTAL)
    }
}
