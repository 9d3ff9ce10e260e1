//! World container for entities
//!
//! The World owns every entity together with the physics world that moves
//! them, and keeps the simulation clock.

use std::collections::HashMap;

use portalsim_math::{Angles, Vec3};
use portalsim_physics::{Aabb, BodyKey, PhysicsConfig, PhysicsWorld, RigidBody, Stance};
use slotmap::{new_key_type, SlotMap};

use crate::entity::{DirtyFlags, Entity, EntityFlags};
use crate::error::WorldError;
use crate::Transform3D;

new_key_type! {
    /// Generational key to an entity in the world
    pub struct EntityKey;
}

/// Deepest parent chain followed before giving up
const MAX_PARENT_DEPTH: usize = 32;

/// Why damage was dealt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DamageKind {
    /// Left inside solid geometry with nowhere to go
    Crush,
    Generic,
}

/// A damage event waiting for the host to react
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DamageEvent {
    pub entity: EntityKey,
    pub amount: f32,
    pub kind: DamageKind,
    pub time: f64,
}

/// The world containing all entities
///
/// The World is the central container for all game objects.
/// It manages entities and integrates with physics simulation.
pub struct World {
    /// All entities in the world
    entities: SlotMap<EntityKey, Entity>,
    /// Reverse lookup from physics body to entity
    by_body: HashMap<BodyKey, EntityKey>,
    physics: PhysicsWorld,
    /// Simulation time in seconds
    time: f64,
    damage_events: Vec<DamageEvent>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create a new empty world with default physics
    pub fn new() -> Self {
        Self {
            entities: SlotMap::with_key(),
            by_body: HashMap::new(),
            physics: PhysicsWorld::new(),
            time: 0.0,
            damage_events: Vec::new(),
        }
    }

    /// Replace the physics configuration
    pub fn with_physics(mut self, config: PhysicsConfig) -> Self {
        self.physics.config = config;
        self
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    /// Simulation time in seconds
    pub fn time(&self) -> f64 {
        self.time
    }

    // --- Entities ---

    /// Add an entity to the world, returning its key
    pub fn add_entity(&mut self, entity: Entity) -> EntityKey {
        let body = entity.physics_body;
        let key = self.entities.insert(entity);
        if let Some(body) = body {
            self.by_body.insert(body, key);
        }
        key
    }

    /// Add an entity together with a new physics body
    ///
    /// The entity's transform is placed at the body's position.
    pub fn spawn_with_body(&mut self, mut entity: Entity, body: RigidBody) -> EntityKey {
        entity.transform.position = body.position;
        if !entity.is_player() {
            entity.transform.rotation = body.orientation;
        }
        let body_key = self.physics.add_body(body);
        self.add_entity(entity.with_physics_body(body_key))
    }

    /// Remove an entity and its physics body
    ///
    /// Children are detached rather than removed.
    pub fn remove_entity(&mut self, key: EntityKey) -> Option<Entity> {
        let entity = self.entities.remove(key)?;
        if let Some(body) = entity.physics_body {
            self.by_body.remove(&body);
            self.physics.remove_body(body);
        }
        for child in self.entities.values_mut() {
            if child.parent == Some(key) {
                child.parent = None;
            }
        }
        log::debug!("Removed entity {:?}", key);
        Some(entity)
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    /// Get a reference to an entity by key
    pub fn get_entity(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    /// Get a mutable reference to an entity by key
    pub fn get_entity_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(key)
    }

    /// Find the first entity with the given name
    pub fn get_by_name(&self, name: &str) -> Option<(EntityKey, &Entity)> {
        self.entities.iter().find(|(_, e)| e.name.as_deref() == Some(name))
    }

    /// The entity owning a physics body
    pub fn entity_for_body(&self, body: BodyKey) -> Option<EntityKey> {
        self.by_body.get(&body).copied()
    }

    /// Get the number of entities
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Check if the world is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate over all entities with their keys
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &Entity)> {
        self.entities.iter()
    }

    /// Iterate over all entity keys
    pub fn keys(&self) -> impl Iterator<Item = EntityKey> + '_ {
        self.entities.keys()
    }

    /// Remove all entities and their bodies
    pub fn clear(&mut self) {
        for (_, entity) in self.entities.drain() {
            if let Some(body) = entity.physics_body {
                self.physics.remove_body(body);
            }
        }
        self.by_body.clear();
        self.damage_events.clear();
    }

    // --- Hierarchy ---

    /// Attach `child` to `parent` (or detach with `None`)
    pub fn set_parent(&mut self, child: EntityKey, parent: Option<EntityKey>) -> Result<(), WorldError> {
        if !self.entities.contains_key(child) {
            return Err(WorldError::UnknownEntity(child));
        }
        if let Some(parent) = parent {
            if !self.entities.contains_key(parent) {
                return Err(WorldError::UnknownEntity(parent));
            }
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == child {
                    return Err(WorldError::ParentCycle { child, parent });
                }
                cursor = self.entities.get(current).and_then(|e| e.parent);
            }
        }
        if let Some(entity) = self.entities.get_mut(child) {
            entity.parent = parent;
        }
        Ok(())
    }

    /// Whether an entity may pass through portals
    ///
    /// The entity's own kind must be teleportable, it must not carry
    /// `NO_TELEPORT`, and nothing up its parent chain may be a kind that
    /// carries its children (doors, track trains).
    pub fn is_teleportable(&self, key: EntityKey) -> bool {
        let Some(entity) = self.entities.get(key) else {
            return false;
        };
        if !entity.kind.can_teleport() || entity.flags.contains(EntityFlags::NO_TELEPORT) {
            return false;
        }

        let mut cursor = entity.parent;
        let mut depth = 0;
        while let Some(parent_key) = cursor {
            let Some(parent) = self.entities.get(parent_key) else {
                break;
            };
            if parent.kind.blocks_descendants() || depth >= MAX_PARENT_DEPTH {
                return false;
            }
            cursor = parent.parent;
            depth += 1;
        }
        true
    }

    // --- Kinematic state ---

    /// Center of the entity (its body's position if it has one)
    pub fn center(&self, key: EntityKey) -> Option<Vec3> {
        let entity = self.entities.get(key)?;
        match entity.physics_body.and_then(|b| self.physics.get_body(b)) {
            Some(body) => Some(body.position),
            None => Some(entity.transform.position),
        }
    }

    /// World bounds of the entity (a point if it has no body)
    pub fn bounds(&self, key: EntityKey) -> Option<Aabb> {
        let entity = self.entities.get(key)?;
        match entity.physics_body.and_then(|b| self.physics.get_body(b)) {
            Some(body) => Some(body.bounds()),
            None => Some(Aabb::from_center_half_extents(entity.transform.position, Vec3::ZERO)),
        }
    }

    /// Bounding radius of the entity's collider
    pub fn radius(&self, key: EntityKey) -> f32 {
        self.entities
            .get(key)
            .and_then(|e| e.physics_body)
            .and_then(|b| self.physics.get_body(b))
            .map_or(0.0, |b| b.bounding_radius())
    }

    /// Linear and angular velocity
    pub fn velocity(&self, key: EntityKey) -> Option<(Vec3, Vec3)> {
        let body = self.entities.get(key)?.physics_body?;
        self.physics.get_body(body).map(|b| (b.velocity, b.angular_velocity))
    }

    /// Place an entity (and its body) at a new pose
    pub fn set_pose(&mut self, key: EntityKey, transform: Transform3D) -> bool {
        let Some(entity) = self.entities.get_mut(key) else {
            return false;
        };
        entity.set_transform(transform);
        let is_player = entity.is_player();
        if let Some(body) = entity.physics_body.and_then(|b| self.physics.get_body_mut(b)) {
            body.set_position(transform.position);
            if !is_player {
                body.orientation = transform.rotation;
            }
        }
        true
    }

    /// Set linear and angular velocity
    pub fn set_velocity(&mut self, key: EntityKey, linear: Vec3, angular: Vec3) -> bool {
        let Some(body_key) = self.entities.get(key).and_then(|e| e.physics_body) else {
            return false;
        };
        match self.physics.get_body_mut(body_key) {
            Some(body) => {
                body.velocity = linear;
                body.angular_velocity = angular;
                true
            }
            None => false,
        }
    }

    /// Change a player's stance; standing up only happens when there is room
    pub fn set_stance(&mut self, key: EntityKey, stance: Stance) -> bool {
        let Some(entity) = self.entities.get(key) else {
            return false;
        };
        let (Some(state), Some(body)) = (entity.player.as_ref(), entity.physics_body) else {
            return false;
        };
        let hull = state.hull;
        if !self.physics.set_stance(body, &hull, stance) {
            return false;
        }
        if let Some(entity) = self.entities.get_mut(key) {
            if let Some(state) = entity.player.as_mut() {
                state.stance = stance;
            }
            entity.mark_dirty(DirtyFlags::STATE);
        }
        true
    }

    // --- Damage ---

    /// Deal damage; returns true if this killed the entity
    pub fn apply_damage(&mut self, key: EntityKey, amount: f32, kind: DamageKind) -> bool {
        let time = self.time;
        let Some(entity) = self.entities.get_mut(key) else {
            return false;
        };
        let was_alive = entity.is_alive();
        entity.health -= amount;
        entity.mark_dirty(DirtyFlags::STATE);
        self.damage_events.push(DamageEvent { entity: key, amount, kind, time });

        if was_alive && entity.health <= 0.0 {
            entity.flags |= EntityFlags::DEAD;
            log::info!("Entity {:?} killed by {:?} damage", key, kind);
            return true;
        }
        false
    }

    /// Take all damage events recorded since the last drain
    pub fn drain_damage_events(&mut self) -> Vec<DamageEvent> {
        std::mem::take(&mut self.damage_events)
    }

    // --- Simulation ---

    /// Step physics, sync entity transforms from their bodies and advance the clock
    pub fn step(&mut self, dt: f32) {
        self.physics.step(dt);
        self.sync_from_physics();
        self.time += dt as f64;
    }

    /// Copy body poses onto entity transforms
    ///
    /// Players keep a yaw-only transform derived from their view angles.
    pub fn sync_from_physics(&mut self) {
        for entity in self.entities.values_mut() {
            let Some(body) = entity.physics_body.and_then(|b| self.physics.get_body(b)) else {
                continue;
            };
            let rotation = match &entity.player {
                Some(state) => Angles::new(0.0, state.view_angles.yaw, 0.0).to_quat(),
                None => body.orientation,
            };
            let next = Transform3D::from_position_rotation(body.position, rotation);
            if next != entity.transform {
                entity.set_transform(next);
            }
        }
    }
}
