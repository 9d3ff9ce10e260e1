//! ChamberBuilder - Declarative chamber construction
//!
//! Provides a fluent API for building portal test chambers with physics.

use portalsim_core::{
    Angles, Entity, EntityKey, PhysicsConfig, Quat, RigidBody, StaticCollider, Transform3D, Vec3, World,
};
use portalsim_physics::{Obb, SurfaceMaterial};
use portalsim_portal::{LinkageId, PortalSystem, Volume, VolumeKind};

/// Builder for portal test chambers
///
/// # Example
/// ```ignore
/// let chamber = ChamberBuilder::new()
///     .with_gravity(-600.0)
///     .add_floor(0.0, SurfaceMaterial::CONCRETE)
///     .add_wall(Vec3::new(200.0, 0.0, 128.0), Vec3::new(8.0, 256.0, 256.0), SurfaceMaterial::CONCRETE)
///     .add_player(Vec3::new(-100.0, 0.0, 36.0), 1)
///     .add_prop("cube", Vec3::new(0.0, 0.0, 200.0), 8.0)
///     .build(&mut portals);
/// ```
pub struct ChamberBuilder {
    world: World,
    volumes: Vec<Volume>,
    player: Option<EntityKey>,
}

/// A built chamber: the world plus the keys a host usually needs
pub struct Chamber {
    pub world: World,
    pub player: Option<EntityKey>,
}

impl ChamberBuilder {
    /// Create a builder with default physics
    pub fn new() -> Self {
        Self {
            world: World::new(),
            volumes: Vec::new(),
            player: None,
        }
    }

    pub fn with_physics(mut self, config: PhysicsConfig) -> Self {
        self.world = self.world.with_physics(config);
        self
    }

    /// Set gravity along Z (negative = downward)
    pub fn with_gravity(self, gravity: f32) -> Self {
        self.with_physics(PhysicsConfig::new(gravity))
    }

    /// Add an infinite floor plane at height `z`
    pub fn add_floor(mut self, z: f32, material: SurfaceMaterial) -> Self {
        self.world.physics_mut().add_static_collider(StaticCollider::floor(z, material));
        self
    }

    /// Add a solid axis-aligned box
    pub fn add_wall(mut self, center: Vec3, half_extents: Vec3, material: SurfaceMaterial) -> Self {
        self.world
            .physics_mut()
            .add_static_collider(StaticCollider::aabb(center, half_extents, material));
        self
    }

    /// Add a player standing at `position` (hull center), firing portals of `linkage_id`
    pub fn add_player(mut self, position: Vec3, linkage_id: LinkageId) -> Self {
        let entity = Entity::player(linkage_id).with_name("player");
        let half_extents = entity.player.as_ref().map_or(Vec3::splat(16.0), |p| p.hull.standing);
        let key = self.world.spawn_with_body(entity, RigidBody::new_aabb(position, half_extents));
        self.player = Some(key);
        self
    }

    /// Face the player in a direction
    pub fn with_player_view(mut self, angles: Angles) -> Self {
        if let Some(state) = self
            .player
            .and_then(|key| self.world.get_entity_mut(key))
            .and_then(|e| e.player.as_mut())
        {
            state.view_angles = angles;
        }
        self
    }

    /// Add a cube that can be picked up and carried through portals
    pub fn add_prop(mut self, name: &str, position: Vec3, half_size: f32) -> Self {
        let body = RigidBody::new_aabb(position, Vec3::splat(half_size)).with_mass(10.0);
        self.world.spawn_with_body(Entity::prop().with_name(name).with_tag("dynamic"), body);
        self
    }

    /// Add a moving brush; it fizzles any portal whose hole it enters
    pub fn add_mover(mut self, name: &str, position: Vec3, half_extents: Vec3, velocity: Vec3) -> Self {
        let body = RigidBody::new_kinematic_aabb(position, half_extents).with_velocity(velocity);
        self.world.spawn_with_body(Entity::prop().with_name(name).with_tag("mover"), body);
        self
    }

    /// Add an emancipation grid
    pub fn add_cleanser(self, center: Vec3, half_extents: Vec3) -> Self {
        self.add_volume(Volume::new(aligned(center, half_extents), VolumeKind::Cleanser).with_name("cleanser"))
    }

    /// Add a region no portal may overlap
    pub fn add_no_portal(self, center: Vec3, half_extents: Vec3) -> Self {
        self.add_volume(Volume::new(aligned(center, half_extents), VolumeKind::NoPortal))
    }

    /// Add a placement helper that snaps nearby placements to `pose`
    pub fn add_helper(self, center: Vec3, half_extents: Vec3, pose: Transform3D, radius: f32) -> Self {
        self.add_volume(Volume::helper(aligned(center, half_extents), pose, radius, None))
    }

    pub fn add_volume(mut self, volume: Volume) -> Self {
        self.volumes.push(volume);
        self
    }

    /// Finish the chamber, handing its volumes to the portal system
    pub fn build(self, portals: &mut PortalSystem) -> Chamber {
        for volume in self.volumes {
            portals.volumes_mut().add(volume);
        }
        log::info!(
            "Built chamber with {} entities and {} static colliders",
            self.world.entity_count(),
            self.world.physics().static_colliders().count()
        );
        Chamber {
            world: self.world,
            player: self.player,
        }
    }
}

impl Default for ChamberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn aligned(center: Vec3, half_extents: Vec3) -> Obb {
    Obb::new(center, half_extents, Quat::IDENTITY)
}
