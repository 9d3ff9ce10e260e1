//! Physics world and simulation

use portalsim_math::Vec3;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::body::{BodyKey, BodyType, ColliderKey, RigidBody, StaticCollider};
use crate::collision::{collide, CollisionFilter, Contact};
use crate::environment::{CollisionEnvironment, EnvironmentKey};
use crate::material::PhysicsMaterial;
use crate::player::{PlayerHull, Stance};
use crate::shapes::{Aabb, Collider, Obb};
use crate::trace::{ray_vs_collider, sweep_box, Ray};

/// Penetration below this is treated as touching, not overlapping
pub const CONTACT_TOLERANCE: f32 = 0.01;

/// Distance a swept box stops short of what it hits
const TRACE_BACKOFF: f32 = 0.03125;

/// Contact normals steeper than this count as ground
const GROUND_NORMAL_Z: f32 = 0.7;

/// Configuration for the physics simulation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity acceleration along Z (negative = down)
    pub gravity: f32,
    /// Speed limit applied to every moving body
    pub max_velocity: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: -600.0,
            max_velocity: 3500.0,
        }
    }
}

impl PhysicsConfig {
    /// Create a new physics config with the given gravity
    pub fn new(gravity: f32) -> Self {
        Self {
            gravity,
            ..Self::default()
        }
    }
}

/// What a trace or overlap query touched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceTarget {
    /// A world static collider
    Static(ColliderKey),
    /// An environment-local collider, by index in the environment
    Environment(EnvironmentKey, usize),
    Body(BodyKey),
}

/// Result of a ray hitting something
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub distance: f32,
    pub point: Vec3,
    pub normal: Vec3,
    pub target: TraceTarget,
}

/// Result of sweeping a box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxTrace {
    /// Fraction of the requested move completed (0..=1)
    pub fraction: f32,
    /// Final box center
    pub end: Vec3,
    /// What stopped the box, if anything
    pub hit: Option<RayHit>,
    /// The box was already overlapping solid geometry at the start
    pub start_solid: bool,
}

/// Which colliders a query sees
#[derive(Clone, Debug)]
pub struct TraceFilter {
    pub filter: CollisionFilter,
    /// Bodies the query passes through
    pub ignore: Vec<BodyKey>,
    /// Environment whose static geometry replaces the world's
    pub environment: Option<EnvironmentKey>,
    /// Whether bodies are considered at all
    pub include_bodies: bool,
}

impl Default for TraceFilter {
    fn default() -> Self {
        Self::new(CollisionFilter::default())
    }
}

impl TraceFilter {
    pub fn new(filter: CollisionFilter) -> Self {
        Self {
            filter,
            ignore: Vec::new(),
            environment: None,
            include_bodies: true,
        }
    }

    /// Only solid world geometry
    pub fn world_only() -> Self {
        Self {
            include_bodies: false,
            ..Self::new(CollisionFilter::world_only())
        }
    }

    pub fn ignoring(mut self, key: BodyKey) -> Self {
        self.ignore.push(key);
        self
    }

    pub fn in_environment(mut self, environment: Option<EnvironmentKey>) -> Self {
        self.environment = environment;
        self
    }

    pub fn statics_only(mut self) -> Self {
        self.include_bodies = false;
        self
    }

    fn accepts_body(&self, key: BodyKey, body: &RigidBody) -> bool {
        self.include_bodies && !self.ignore.contains(&key) && self.filter.collides_with(&body.filter)
    }
}

/// Static colliders visible from an environment (world minus exclusions, plus locals)
fn visible_statics<'a>(
    statics: &'a SlotMap<ColliderKey, StaticCollider>,
    environments: &'a SlotMap<EnvironmentKey, CollisionEnvironment>,
    environment: Option<EnvironmentKey>,
) -> impl Iterator<Item = (TraceTarget, &'a StaticCollider)> + 'a {
    let env = environment.and_then(|key| environments.get(key).map(|e| (key, e)));

    let world = statics
        .iter()
        .filter(move |(key, _)| env.map_or(true, |(_, e)| !e.is_excluded(*key)))
        .map(|(key, c)| (TraceTarget::Static(key), c));

    let local = env.into_iter().flat_map(|(env_key, e)| {
        e.colliders()
            .iter()
            .enumerate()
            .map(move |(i, c)| (TraceTarget::Environment(env_key, i), c))
    });

    world.chain(local)
}

/// Remove the velocity component driving into a surface and apply friction
fn respond(velocity: Vec3, normal: Vec3, material: PhysicsMaterial) -> Vec3 {
    let velocity_along_normal = velocity.dot(normal);
    if velocity_along_normal >= 0.0 {
        return velocity;
    }

    let bounced = velocity - normal * velocity_along_normal * (1.0 + material.restitution);
    let tangent = bounced.reject(normal);
    if tangent.length_squared() > 1.0e-8 {
        normal * bounced.dot(normal) + tangent * (1.0 - material.friction)
    } else {
        bounced
    }
}

/// The physics world containing all rigid bodies
pub struct PhysicsWorld {
    /// All rigid bodies in the world (using generational keys)
    bodies: SlotMap<BodyKey, RigidBody>,
    /// Static colliders (floors, walls, platforms)
    static_colliders: SlotMap<ColliderKey, StaticCollider>,
    /// Local overrides of the static geometry
    environments: SlotMap<EnvironmentKey, CollisionEnvironment>,
    /// Physics configuration
    pub config: PhysicsConfig,
}

impl PhysicsWorld {
    /// Create a new physics world with default configuration
    pub fn new() -> Self {
        Self::with_config(PhysicsConfig::default())
    }

    /// Create a new physics world with custom configuration
    pub fn with_config(config: PhysicsConfig) -> Self {
        Self {
            bodies: SlotMap::with_key(),
            static_colliders: SlotMap::with_key(),
            environments: SlotMap::with_key(),
            config,
        }
    }

    // --- Static colliders ---

    /// Add a static collider to the world
    pub fn add_static_collider(&mut self, collider: StaticCollider) -> ColliderKey {
        self.static_colliders.insert(collider)
    }

    pub fn remove_static_collider(&mut self, key: ColliderKey) -> Option<StaticCollider> {
        self.static_colliders.remove(key)
    }

    pub fn static_collider(&self, key: ColliderKey) -> Option<&StaticCollider> {
        self.static_colliders.get(key)
    }

    /// Iterate over all static colliders
    pub fn static_colliders(&self) -> impl Iterator<Item = (ColliderKey, &StaticCollider)> {
        self.static_colliders.iter()
    }

    /// Look up the static collider a trace reported
    pub fn target_static(&self, target: TraceTarget) -> Option<&StaticCollider> {
        match target {
            TraceTarget::Static(key) => self.static_colliders.get(key),
            TraceTarget::Environment(env, index) => {
                self.environments.get(env).and_then(|e| e.colliders().get(index))
            }
            TraceTarget::Body(_) => None,
        }
    }

    // --- Environments ---

    pub fn add_environment(&mut self, environment: CollisionEnvironment) -> EnvironmentKey {
        self.environments.insert(environment)
    }

    /// Remove an environment; bodies assigned to it return to the world geometry
    pub fn remove_environment(&mut self, key: EnvironmentKey) -> Option<CollisionEnvironment> {
        for body in self.bodies.values_mut() {
            if body.environment == Some(key) {
                body.environment = None;
            }
        }
        self.environments.remove(key)
    }

    pub fn environment(&self, key: EnvironmentKey) -> Option<&CollisionEnvironment> {
        self.environments.get(key)
    }

    pub fn environment_mut(&mut self, key: EnvironmentKey) -> Option<&mut CollisionEnvironment> {
        self.environments.get_mut(key)
    }

    /// Assign a body to an environment (or back to the world with `None`)
    pub fn set_body_environment(&mut self, body: BodyKey, environment: Option<EnvironmentKey>) -> bool {
        match self.bodies.get_mut(body) {
            Some(b) => {
                b.environment = environment;
                true
            }
            None => false,
        }
    }

    // --- Bodies ---

    /// Add a body to the world and return its key
    pub fn add_body(&mut self, body: RigidBody) -> BodyKey {
        self.bodies.insert(body)
    }

    /// Remove a body from the world and return it
    pub fn remove_body(&mut self, key: BodyKey) -> Option<RigidBody> {
        self.bodies.remove(key)
    }

    /// Get an immutable reference to a body by key
    pub fn get_body(&self, key: BodyKey) -> Option<&RigidBody> {
        self.bodies.get(key)
    }

    /// Get a mutable reference to a body by key
    pub fn get_body_mut(&mut self, key: BodyKey) -> Option<&mut RigidBody> {
        self.bodies.get_mut(key)
    }

    /// Get the number of bodies in the world
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Iterate over all body keys
    pub fn body_keys(&self) -> impl Iterator<Item = BodyKey> + '_ {
        self.bodies.keys()
    }

    /// Iterate over all bodies
    pub fn bodies(&self) -> impl Iterator<Item = (BodyKey, &RigidBody)> {
        self.bodies.iter()
    }

    // --- Simulation ---

    /// Step the physics simulation forward by dt seconds
    ///
    /// This performs:
    /// 1. Gravity application to dynamic bodies with gravity enabled
    /// 2. Velocity and angular velocity integration
    /// 3. Static collider collision detection and resolution
    /// 4. Body-body collision detection and resolution
    pub fn step(&mut self, dt: f32) {
        let gravity = self.config.gravity;
        let max_velocity = self.config.max_velocity;

        for body in self.bodies.values_mut() {
            if body.body_type == BodyType::Static {
                continue;
            }
            if body.is_dynamic() && body.affected_by_gravity {
                body.velocity.z += gravity * dt;
            }
            body.velocity = body.velocity.clamp_length(max_velocity);
            body.apply_correction(body.velocity * dt);
            if body.angular_velocity.length_squared() > 0.0 {
                body.orientation = body.orientation.integrate(body.angular_velocity, dt);
            }
        }

        self.resolve_static_collisions();
        self.resolve_body_collisions();
    }

    /// Resolve collisions between bodies and static colliders
    fn resolve_static_collisions(&mut self) {
        for body in self.bodies.values_mut() {
            if !body.is_dynamic() {
                continue;
            }
            body.grounded = false;

            let statics = visible_statics(&self.static_colliders, &self.environments, body.environment);
            for (_, static_col) in statics {
                if !static_col.is_solid() || !body.filter.collides_with(&static_col.filter) {
                    continue;
                }
                let Some(contact) = collide(&body.collider, &static_col.collider) else {
                    continue;
                };
                if !contact.is_colliding() {
                    continue;
                }

                body.apply_correction(contact.normal * contact.penetration);
                let combined = body.material.combine(&static_col.material.physics());
                body.velocity = respond(body.velocity, contact.normal, combined);
                if contact.normal.z > GROUND_NORMAL_Z {
                    body.grounded = true;
                }
            }
        }
    }

    /// Resolve collisions between bodies
    fn resolve_body_collisions(&mut self) {
        // Collect all keys first (needed because we can't iterate and mutate)
        let keys: Vec<BodyKey> = self.bodies.keys().collect();

        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                let (key_a, key_b) = (keys[i], keys[j]);
                let (body_a, body_b) = (&self.bodies[key_a], &self.bodies[key_b]);

                if body_a.is_immovable() && body_b.is_immovable() {
                    continue;
                }
                if !body_a.filter.collides_with(&body_b.filter) {
                    continue;
                }

                // Normal points from B toward A
                if let Some(contact) = collide(&body_a.collider, &body_b.collider) {
                    if contact.is_colliding() {
                        self.resolve_body_pair_collision(key_a, key_b, &contact);
                    }
                }
            }
        }
    }

    /// Resolve collision between two specific bodies
    fn resolve_body_pair_collision(&mut self, key_a: BodyKey, key_b: BodyKey, contact: &Contact) {
        let immovable_a = self.bodies[key_a].is_immovable();
        let immovable_b = self.bodies[key_b].is_immovable();
        let push = contact.normal * contact.penetration;

        let (ratio_a, ratio_b) = if immovable_a {
            (0.0, 1.0)
        } else if immovable_b {
            (1.0, 0.0)
        } else {
            // Split based on mass
            let mass_a = self.bodies[key_a].mass;
            let mass_b = self.bodies[key_b].mass;
            let total_mass = mass_a + mass_b;
            (mass_b / total_mass, mass_a / total_mass)
        };

        let combined = self.bodies[key_a].material.combine(&self.bodies[key_b].material);

        if !immovable_a {
            let body = &mut self.bodies[key_a];
            body.apply_correction(push * ratio_a);
            body.velocity = respond(body.velocity, contact.normal, combined);
            if contact.normal.z > GROUND_NORMAL_Z {
                body.grounded = true;
            }
        }
        if !immovable_b {
            let body = &mut self.bodies[key_b];
            body.apply_correction(-push * ratio_b);
            body.velocity = respond(body.velocity, -contact.normal, combined);
            if -contact.normal.z > GROUND_NORMAL_Z {
                body.grounded = true;
            }
        }
    }

    // --- Queries ---

    /// Check whether a collider fits without overlapping solid static geometry
    pub fn is_collider_clear(
        &self,
        collider: &Collider,
        filter: &CollisionFilter,
        environment: Option<EnvironmentKey>,
    ) -> bool {
        visible_statics(&self.static_colliders, &self.environments, environment).all(|(_, s)| {
            !s.is_solid()
                || !filter.collides_with(&s.filter)
                || collide(collider, &s.collider).map_or(true, |c| c.penetration <= CONTACT_TOLERANCE)
        })
    }

    /// Check whether a body is free of solid static geometry at its position
    pub fn is_body_clear(&self, key: BodyKey) -> bool {
        match self.bodies.get(key) {
            Some(body) => self.is_body_clear_at(key, body.position),
            None => false,
        }
    }

    /// Check whether a body would be free of solid static geometry at `position`
    pub fn is_body_clear_at(&self, key: BodyKey, position: Vec3) -> bool {
        let Some(body) = self.bodies.get(key) else {
            return false;
        };
        let collider = body.collider.translated(position - body.position);
        self.is_collider_clear(&collider, &body.filter, body.environment)
    }

    /// Find the closest position within `radius` where the body is clear
    ///
    /// Pushing out along the contact normals is tried first, then a search
    /// over 26 directions on growing shells. Returns `None` if nothing fits.
    pub fn find_nearest_passable_space(&self, key: BodyKey, radius: f32) -> Option<Vec3> {
        let body = self.bodies.get(key)?;
        let origin = body.position;
        if self.is_body_clear_at(key, origin) {
            return Some(origin);
        }

        // Depenetrate along contact normals
        let mut position = origin;
        for _ in 0..4 {
            let collider = body.collider.translated(position - body.position);
            let mut push = Vec3::ZERO;
            for (_, s) in visible_statics(&self.static_colliders, &self.environments, body.environment) {
                if !s.is_solid() || !body.filter.collides_with(&s.filter) {
                    continue;
                }
                if let Some(c) = collide(&collider, &s.collider) {
                    if c.penetration > CONTACT_TOLERANCE {
                        push += c.normal * (c.penetration + CONTACT_TOLERANCE);
                    }
                }
            }
            if push == Vec3::ZERO {
                break;
            }
            position += push;
        }
        if position.distance(origin) <= radius && self.is_body_clear_at(key, position) {
            return Some(position);
        }

        const SHELLS: u32 = 8;
        let step = radius / SHELLS as f32;
        let directions = search_directions();
        for shell in 1..=SHELLS {
            let distance = step * shell as f32;
            for dir in &directions {
                let candidate = origin + *dir * distance;
                if self.is_body_clear_at(key, candidate) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Cast a ray and return the nearest hit within `max_distance`
    pub fn trace_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: &TraceFilter,
    ) -> Option<RayHit> {
        let ray = Ray::new(origin, direction);
        let mut best: Option<RayHit> = None;
        let mut consider = |target: TraceTarget, collider: &Collider| {
            if let Some(hit) = ray_vs_collider(&ray, collider) {
                let closer = best.map_or(true, |b| hit.distance < b.distance);
                if hit.distance <= max_distance && closer {
                    best = Some(RayHit {
                        distance: hit.distance,
                        point: ray.at(hit.distance),
                        normal: hit.normal,
                        target,
                    });
                }
            }
        };

        for (target, s) in visible_statics(&self.static_colliders, &self.environments, filter.environment) {
            if s.is_solid() && filter.filter.collides_with(&s.filter) {
                consider(target, &s.collider);
            }
        }
        for (key, body) in &self.bodies {
            if filter.accepts_body(key, body) {
                consider(TraceTarget::Body(key), &body.collider);
            }
        }
        best
    }

    /// Sweep an axis-aligned box from `start` to `end`
    pub fn trace_box(&self, start: Vec3, end: Vec3, half_extents: Vec3, filter: &TraceFilter) -> BoxTrace {
        let start_box = Collider::Aabb(Aabb::from_center_half_extents(start, half_extents));
        let (ray, length) = Ray::between(start, end);

        let mut best: Option<RayHit> = None;
        let mut start_solid = false;
        let mut consider = |target: TraceTarget, collider: &Collider| {
            if let Some(contact) = collide(&start_box, collider) {
                if contact.penetration > CONTACT_TOLERANCE {
                    start_solid = true;
                    return;
                }
                // Touching at the start: only moving into the surface blocks
                if length > 0.0 && ray.direction.dot(contact.normal) >= 0.0 {
                    return;
                }
            }
            if length <= 0.0 {
                return;
            }
            if let Some(hit) = sweep_box(&ray, half_extents, collider) {
                if hit.distance <= length && best.map_or(true, |b| hit.distance < b.distance) {
                    best = Some(RayHit {
                        distance: hit.distance,
                        point: ray.at(hit.distance),
                        normal: hit.normal,
                        target,
                    });
                }
            }
        };

        for (target, s) in visible_statics(&self.static_colliders, &self.environments, filter.environment) {
            if s.is_solid() && filter.filter.collides_with(&s.filter) {
                consider(target, &s.collider);
            }
        }
        for (key, body) in &self.bodies {
            if filter.accepts_body(key, body) {
                consider(TraceTarget::Body(key), &body.collider);
            }
        }

        if start_solid {
            return BoxTrace { fraction: 0.0, end: start, hit: best, start_solid };
        }
        match best {
            Some(hit) => {
                let travelled = (hit.distance - TRACE_BACKOFF).max(0.0);
                BoxTrace {
                    fraction: if length > 0.0 { travelled / length } else { 0.0 },
                    end: ray.at(travelled),
                    hit: Some(hit),
                    start_solid,
                }
            }
            None => BoxTrace { fraction: 1.0, end, hit: None, start_solid },
        }
    }

    /// Everything overlapping an oriented box
    ///
    /// Non-solid statics are reported too; they are meant for queries.
    pub fn overlap_obb(&self, obb: &Obb, filter: &TraceFilter) -> Vec<TraceTarget> {
        let shape = Collider::Obb(*obb);
        let mut hits = Vec::new();
        for (target, s) in visible_statics(&self.static_colliders, &self.environments, filter.environment) {
            if filter.filter.collides_with(&s.filter)
                && collide(&shape, &s.collider).is_some_and(|c| c.is_colliding())
            {
                hits.push(target);
            }
        }
        for (key, body) in &self.bodies {
            if filter.accepts_body(key, body) && collide(&shape, &body.collider).is_some_and(|c| c.is_colliding()) {
                hits.push(TraceTarget::Body(key));
            }
        }
        hits
    }

    /// Change a player body's stance
    ///
    /// Crouching always succeeds. Standing up only happens when the standing
    /// hull fits at the current position; returns whether the stance applied.
    pub fn set_stance(&mut self, key: BodyKey, hull: &PlayerHull, stance: Stance) -> bool {
        let Some(body) = self.bodies.get(key) else {
            return false;
        };
        let half_extents = hull.half_extents(stance);
        if stance == Stance::Standing {
            let standing = Collider::Aabb(Aabb::from_center_half_extents(body.position, half_extents));
            if !self.is_collider_clear(&standing, &body.filter, body.environment) {
                return false;
            }
        }
        match self.bodies.get_mut(key) {
            Some(body) => {
                body.set_half_extents(half_extents);
                true
            }
            None => false,
        }
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Unit directions toward the 26 neighbours of a cube, upward ones first
fn search_directions() -> Vec<Vec3> {
    let mut dirs = Vec::with_capacity(26);
    for z in [1.0, 0.0, -1.0] {
        for y in [0.0, 1.0, -1.0] {
            for x in [0.0, 1.0, -1.0] {
                if x == 0.0 && y == 0.0 && z == 0.0 {
                    continue;
                }
                dirs.push(Vec3::new(x, y, z).normalized());
            }
        }
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::SurfaceFlags;
    use crate::material::SurfaceMaterial;
    use portalsim_math::Quat;

    const EPSILON: f32 = 0.001;

    fn world_with_floor(gravity: f32) -> (PhysicsWorld, ColliderKey) {
        let mut world = PhysicsWorld::with_config(PhysicsConfig::new(gravity));
        let floor = world.add_static_collider(StaticCollider::aabb(
            Vec3::new(0.0, 0.0, -8.0),
            Vec3::new(512.0, 512.0, 8.0),
            SurfaceMaterial::CONCRETE,
        ));
        (world, floor)
    }

    #[test]
    fn test_physics_config_default() {
        let config = PhysicsConfig::default();
        assert_eq!(config.gravity, -600.0);
    }

    #[test]
    fn test_stale_key_returns_none() {
        let mut world = PhysicsWorld::new();
        let key = world.add_body(RigidBody::new_sphere(Vec3::new(0.0, 0.0, 5.0), 0.5));
        assert!(world.get_body(key).is_some());
        assert!(world.remove_body(key).is_some());
        assert!(world.get_body(key).is_none());

        let new_key = world.add_body(RigidBody::new_sphere(Vec3::ZERO, 0.5));
        assert!(world.get_body(key).is_none());
        assert!(world.get_body(new_key).is_some());
    }

    #[test]
    fn test_gravity_application() {
        let mut world = PhysicsWorld::new();
        let handle = world.add_body(RigidBody::new_sphere(Vec3::new(0.0, 0.0, 100.0), 0.5));
        world.step(0.1);
        let body = world.get_body(handle).unwrap();
        assert!((body.velocity.z + 60.0).abs() < EPSILON);
    }

    #[test]
    fn test_velocity_integration() {
        let mut world = PhysicsWorld::with_config(PhysicsConfig::new(0.0));
        let body = RigidBody::new_sphere(Vec3::ZERO, 0.5).with_velocity(Vec3::new(10.0, 0.0, 0.0));
        let handle = world.add_body(body);
        world.step(0.5);
        assert!((world.get_body(handle).unwrap().position.x - 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_angular_velocity_integration() {
        let mut world = PhysicsWorld::with_config(PhysicsConfig::new(0.0));
        let body = RigidBody::new_sphere(Vec3::ZERO, 0.5)
            .with_angular_velocity(Vec3::new(0.0, 0.0, std::f32::consts::FRAC_PI_2));
        let handle = world.add_body(body);
        for _ in 0..10 {
            world.step(0.1);
        }
        let q = world.get_body(handle).unwrap().orientation;
        assert!(q.approx_eq(&Quat::from_rotation_z(std::f32::consts::FRAC_PI_2), 0.01));
    }

    #[test]
    fn test_body_rests_on_floor() {
        let (mut world, _) = world_with_floor(-600.0);
        let handle = world.add_body(RigidBody::new_aabb(Vec3::new(0.0, 0.0, 20.0), Vec3::splat(16.0)));
        for _ in 0..120 {
            world.step(1.0 / 60.0);
        }
        let body = world.get_body(handle).unwrap();
        assert!((body.position.z - 16.0).abs() < 1.0, "z = {}", body.position.z);
        assert!(body.grounded);
    }

    #[test]
    fn test_environment_exclusion_lets_body_fall_through() {
        let (mut world, floor) = world_with_floor(-600.0);
        let mut env = CollisionEnvironment::new();
        env.exclude(floor);
        let env = world.add_environment(env);

        let handle = world.add_body(RigidBody::new_aabb(Vec3::new(0.0, 0.0, 20.0), Vec3::splat(16.0)));
        world.set_body_environment(handle, Some(env));
        for _ in 0..60 {
            world.step(1.0 / 60.0);
        }
        assert!(world.get_body(handle).unwrap().position.z < -50.0);
    }

    #[test]
    fn test_environment_local_collider_blocks() {
        let (mut world, floor) = world_with_floor(-600.0);
        let mut env = CollisionEnvironment::new();
        env.exclude(floor);
        env.add_collider(StaticCollider::aabb(
            Vec3::new(0.0, 0.0, -108.0),
            Vec3::new(512.0, 512.0, 8.0),
            SurfaceMaterial::CONCRETE,
        ));
        let env = world.add_environment(env);

        let handle = world.add_body(RigidBody::new_aabb(Vec3::new(0.0, 0.0, 20.0), Vec3::splat(16.0)));
        world.set_body_environment(handle, Some(env));
        for _ in 0..180 {
            world.step(1.0 / 60.0);
        }
        let z = world.get_body(handle).unwrap().position.z;
        assert!((z + 84.0).abs() < 1.0, "z = {}", z);
    }

    #[test]
    fn test_remove_environment_clears_assignment() {
        let mut world = PhysicsWorld::new();
        let env = world.add_environment(CollisionEnvironment::new());
        let handle = world.add_body(RigidBody::new_sphere(Vec3::ZERO, 1.0));
        world.set_body_environment(handle, Some(env));
        world.remove_environment(env);
        assert_eq!(world.get_body(handle).unwrap().environment, None);
    }

    #[test]
    fn test_kinematic_body_pushes_dynamic() {
        let mut world = PhysicsWorld::with_config(PhysicsConfig::new(0.0));
        let mover = world.add_body(
            RigidBody::new_kinematic_aabb(Vec3::ZERO, Vec3::splat(10.0)).with_velocity(Vec3::new(150.0, 0.0, 0.0)),
        );
        let prop = world.add_body(
            RigidBody::new_aabb(Vec3::new(25.0, 0.0, 0.0), Vec3::splat(5.0)).with_filter(CollisionFilter::prop()),
        );
        world.step(0.1);
        let mover_x = world.get_body(mover).unwrap().position.x;
        let prop_x = world.get_body(prop).unwrap().position.x;
        // The mover keeps its path; the prop is shoved clear of it
        assert!((mover_x - 15.0).abs() < EPSILON);
        assert!((prop_x - 30.0).abs() < EPSILON);
    }

    #[test]
    fn test_trace_ray_hits_nearest() {
        let (mut world, floor) = world_with_floor(0.0);
        world.add_static_collider(StaticCollider::aabb(
            Vec3::new(0.0, 0.0, -100.0),
            Vec3::splat(50.0),
            SurfaceMaterial::CONCRETE,
        ));
        let hit = world
            .trace_ray(Vec3::new(0.0, 0.0, 100.0), -Vec3::Z, 1000.0, &TraceFilter::world_only())
            .unwrap();
        assert!((hit.distance - 100.0).abs() < EPSILON);
        assert_eq!(hit.target, TraceTarget::Static(floor));
        assert!(hit.normal.approx_eq(Vec3::UP, EPSILON));
    }

    #[test]
    fn test_trace_ray_respects_max_distance_and_nonsolid() {
        let mut world = PhysicsWorld::new();
        world.add_static_collider(
            StaticCollider::floor(0.0, SurfaceMaterial::CONCRETE).with_flags(SurfaceFlags::NONSOLID),
        );
        let filter = TraceFilter::world_only();
        assert!(world.trace_ray(Vec3::new(0.0, 0.0, 10.0), -Vec3::Z, 100.0, &filter).is_none());

        world.add_static_collider(StaticCollider::floor(-50.0, SurfaceMaterial::CONCRETE));
        assert!(world.trace_ray(Vec3::new(0.0, 0.0, 10.0), -Vec3::Z, 30.0, &filter).is_none());
        assert!(world.trace_ray(Vec3::new(0.0, 0.0, 10.0), -Vec3::Z, 100.0, &filter).is_some());
    }

    #[test]
    fn test_trace_ray_ignores_listed_body() {
        let mut world = PhysicsWorld::new();
        let body = world.add_body(RigidBody::new_sphere(Vec3::new(10.0, 0.0, 0.0), 2.0));
        let filter = TraceFilter::default();
        assert!(world.trace_ray(Vec3::ZERO, Vec3::X, 100.0, &filter).is_some());
        let filter = TraceFilter::default().ignoring(body);
        assert!(world.trace_ray(Vec3::ZERO, Vec3::X, 100.0, &filter).is_none());
    }

    #[test]
    fn test_trace_box_stops_before_wall() {
        let mut world = PhysicsWorld::new();
        world.add_static_collider(StaticCollider::aabb(
            Vec3::new(100.0, 0.0, 0.0),
            Vec3::new(10.0, 100.0, 100.0),
            SurfaceMaterial::CONCRETE,
        ));
        let trace = world.trace_box(Vec3::ZERO, Vec3::new(200.0, 0.0, 0.0), Vec3::splat(10.0), &TraceFilter::world_only());
        assert!(trace.hit.is_some());
        assert!(!trace.start_solid);
        assert!((trace.end.x - 80.0).abs() < 0.1);
        assert!(trace.fraction < 0.5);
    }

    #[test]
    fn test_trace_box_leaving_a_touching_surface() {
        let (world, _) = world_with_floor(0.0);
        let trace = world.trace_box(
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(0.0, 0.0, 50.0),
            Vec3::splat(10.0),
            &TraceFilter::world_only(),
        );
        assert!(!trace.start_solid);
        assert_eq!(trace.fraction, 1.0);
    }

    #[test]
    fn test_trace_box_start_solid() {
        let (world, _) = world_with_floor(0.0);
        let trace = world.trace_box(Vec3::ZERO, Vec3::new(0.0, 0.0, 50.0), Vec3::splat(10.0), &TraceFilter::world_only());
        assert!(trace.start_solid);
        assert_eq!(trace.fraction, 0.0);
    }

    #[test]
    fn test_overlap_obb_finds_bodies_and_statics() {
        let (mut world, floor) = world_with_floor(0.0);
        let body = world.add_body(RigidBody::new_sphere(Vec3::new(0.0, 0.0, 20.0), 5.0));
        let query = Obb::new(Vec3::new(0.0, 0.0, 10.0), Vec3::splat(12.0), Quat::IDENTITY);
        let hits = world.overlap_obb(&query, &TraceFilter::default());
        assert!(hits.contains(&TraceTarget::Static(floor)));
        assert!(hits.contains(&TraceTarget::Body(body)));
    }

    #[test]
    fn test_find_nearest_passable_space() {
        let (mut world, _) = world_with_floor(0.0);
        let handle = world.add_body(RigidBody::new_aabb(Vec3::new(0.0, 0.0, 10.0), Vec3::splat(16.0)));
        assert!(!world.is_body_clear(handle));
        let spot = world.find_nearest_passable_space(handle, 64.0).unwrap();
        assert!(world.is_body_clear_at(handle, spot));
        assert!(spot.z >= 16.0 - EPSILON);
    }

    #[test]
    fn test_find_nearest_passable_space_fails_when_enclosed() {
        let mut world = PhysicsWorld::new();
        world.add_static_collider(StaticCollider::aabb(Vec3::ZERO, Vec3::splat(500.0), SurfaceMaterial::CONCRETE));
        let handle = world.add_body(RigidBody::new_sphere(Vec3::ZERO, 10.0));
        assert!(world.find_nearest_passable_space(handle, 64.0).is_none());
    }

    #[test]
    fn test_stance_uncrouch_needs_room() {
        let mut world = PhysicsWorld::with_config(PhysicsConfig::new(0.0));
        // Ceiling underside at 30: room to crouch, not to stand
        world.add_static_collider(StaticCollider::aabb(
            Vec3::new(0.0, 0.0, 40.0),
            Vec3::new(100.0, 100.0, 10.0),
            SurfaceMaterial::CONCRETE,
        ));
        let hull = PlayerHull::default();
        let handle = world.add_body(RigidBody::new_aabb(Vec3::ZERO, hull.crouching));
        assert!(!world.set_stance(handle, &hull, Stance::Standing));
        assert_eq!(world.get_body(handle).unwrap().half_extents(), hull.crouching);

        world.get_body_mut(handle).unwrap().set_position(Vec3::new(0.0, 0.0, -100.0));
        assert!(world.set_stance(handle, &hull, Stance::Standing));
        assert_eq!(world.get_body(handle).unwrap().half_extents(), hull.standing);
    }

    #[test]
    fn test_sphere_sphere_bodies_separate() {
        let mut world = PhysicsWorld::with_config(PhysicsConfig::new(0.0));
        let a = world.add_body(RigidBody::new_sphere(Vec3::ZERO, 1.0));
        let b = world.add_body(RigidBody::new_sphere(Vec3::new(1.5, 0.0, 0.0), 1.0));
        world.step(0.01);
        let pa = world.get_body(a).unwrap().position;
        let pb = world.get_body(b).unwrap().position;
        assert!(pa.distance(pb) >= 2.0 - EPSILON);
    }
}
