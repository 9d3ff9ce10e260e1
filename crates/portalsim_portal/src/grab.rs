//! Held objects
//!
//! A holder keeps one object floating at a hold point in front of its eye.
//! Every tick the controller computes the target pose and sets the object's
//! velocity so it arrives there on the next physics step.
//!
//! When holder and object are on opposite sides of a portal pair the object
//! is "held across": the raw target, which lies behind the portal the holder
//! looks through, is carried through that portal's live link matrix so the
//! object follows on the far side.

use std::collections::BTreeMap;

use portalsim_core::{Angles, EntityFlags, EntityKey, Transform3D, World};
use portalsim_math::{Quat, Vec3};
use portalsim_physics::trace::{ray_vs_aabb, ray_vs_obb, Ray};
use portalsim_physics::{CollisionFilter, CollisionLayer, TraceFilter, TraceTarget};

use crate::config::GrabConfig;
use crate::error::PortalError;
use crate::linkage::LinkageRegistry;
use crate::portal::PortalKey;
use crate::transform_solver::{apply_point, apply_transform, apply_vector};

/// Why an object stopped being held
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReleaseReason {
    Dropped,
    Thrown,
    /// The object could not keep up with its target
    TooFar,
    /// The portal it was held across closed
    BrokenLink,
    EntityRemoved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GrabRelease {
    pub holder: EntityKey,
    pub held: EntityKey,
    pub reason: ReleaseReason,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GrabState {
    pub holder: EntityKey,
    pub held: EntityKey,
    /// Grab point relative to the object's center, in object space
    pub attach_offset: Vec3,
    /// Object orientation relative to the holder's yaw
    pub attach_orientation: Quat,
    pub held_across_portal: bool,
    /// Portal on the holder's side that the object is held through
    pub across_portal: Option<PortalKey>,
    pub target: Transform3D,
    /// How long the error has exceeded tolerance
    pub error_time: f32,
    had_gravity: bool,
}

/// Picking something up as seen from the holder
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PickupTarget {
    pub entity: EntityKey,
    /// Seen through an open portal
    pub across: bool,
}

#[derive(Debug, Default)]
pub struct GrabController {
    grabs: BTreeMap<EntityKey, GrabState>,
}

impl GrabController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, holder: EntityKey) -> Option<&GrabState> {
        self.grabs.get(&holder)
    }

    pub fn is_holding(&self, holder: EntityKey) -> bool {
        self.grabs.contains_key(&holder)
    }

    pub fn holder_of(&self, held: EntityKey) -> Option<EntityKey> {
        self.grabs.values().find(|g| g.held == held).map(|g| g.holder)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GrabState> {
        self.grabs.values()
    }

    pub fn len(&self) -> usize {
        self.grabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grabs.is_empty()
    }

    // --- Pickup ---

    /// Start holding `held`; `across` marks an object picked up through a portal
    pub fn pick_up(
        &mut self,
        world: &mut World,
        holder: EntityKey,
        held: EntityKey,
        across: bool,
    ) -> Result<(), PortalError> {
        if !world.contains(holder) {
            return Err(PortalError::UnknownEntity(holder));
        }
        let Some(object) = world.get_entity(held) else {
            return Err(PortalError::UnknownEntity(held));
        };
        let Some(body_key) = object.physics_body else {
            return Err(PortalError::NotTeleportable(held));
        };
        if self.is_holding(holder) || self.holder_of(held).is_some() || holder == held {
            return Err(PortalError::AlreadyHeld(held));
        }
        let rotation = object.transform.rotation;

        let (eye, view) = eye_and_view(world, holder);
        let Some(body) = world.physics().get_body(body_key) else {
            return Err(PortalError::UnknownEntity(held));
        };
        let center = body.position;
        let grab_point = ray_vs_aabb(&Ray::new(eye, view.forward()), &body.bounds())
            .map_or(center, |hit| eye + view.forward() * hit.distance);
        let attach_offset = if across { Vec3::ZERO } else { rotation.conjugate().rotate(grab_point - center) };
        let yaw = Angles::new(0.0, view.yaw, 0.0).to_quat();

        let had_gravity = body.affected_by_gravity;
        if let Some(body) = world.physics_mut().get_body_mut(body_key) {
            body.affected_by_gravity = false;
        }
        log::debug!("{:?} picked up {:?}{}", holder, held, if across { " across a portal" } else { "" });
        self.grabs.insert(
            holder,
            GrabState {
                holder,
                held,
                attach_offset,
                attach_orientation: yaw.conjugate().compose(&rotation).normalize(),
                held_across_portal: across,
                across_portal: None,
                target: Transform3D::from_position_rotation(center, rotation),
                error_time: 0.0,
                had_gravity,
            },
        );
        Ok(())
    }

    /// What the holder is looking at, if it can be picked up
    ///
    /// A view ray that goes through an open portal hole first continues from
    /// the partner portal.
    pub fn find_pickup_target(
        &self,
        world: &World,
        registry: &LinkageRegistry,
        holder: EntityKey,
        range: f32,
    ) -> Option<PickupTarget> {
        let (eye, view) = eye_and_view(world, holder);
        let forward = view.forward();
        let holder_body = world.get_entity(holder).and_then(|e| e.physics_body);
        let filter = pickup_filter(holder_body, body_environment(world, holder_body));

        let direct = world.physics().trace_ray(eye, forward, range, &filter);
        let through = nearest_portal_hit(registry, eye, forward, range);

        match (direct, through) {
            (hit, Some((portal, distance))) if hit.map_or(true, |h| distance < h.distance) => {
                let source = registry.get(portal)?;
                let exit = registry.get(source.linked()?)?;
                let m = source.link_matrix();
                let direction = apply_vector(m, forward);
                let start = apply_point(m, eye + forward * distance) + direction * (exit.half_depth() + 0.1);
                let filter = pickup_filter(holder_body, exit.simulator().environment());
                let hit = world.physics().trace_ray(start, direction, range - distance, &filter)?;
                pickup_entity(world, hit.target).map(|entity| PickupTarget { entity, across: true })
            }
            (Some(hit), _) => pickup_entity(world, hit.target).map(|entity| PickupTarget { entity, across: false }),
            _ => None,
        }
    }

    // --- Release ---

    pub fn drop_object(&mut self, world: &mut World, holder: EntityKey, unstuck_radius: f32) -> Result<GrabRelease, PortalError> {
        let state = self.grabs.remove(&holder).ok_or(PortalError::NotHeld(holder))?;
        Ok(finish(world, state, ReleaseReason::Dropped, unstuck_radius))
    }

    /// Let go with an outgoing velocity
    pub fn throw_object(
        &mut self,
        world: &mut World,
        holder: EntityKey,
        velocity: Vec3,
        unstuck_radius: f32,
    ) -> Result<GrabRelease, PortalError> {
        let state = self.grabs.remove(&holder).ok_or(PortalError::NotHeld(holder))?;
        let held = state.held;
        let release = finish(world, state, ReleaseReason::Thrown, unstuck_radius);
        world.set_velocity(held, velocity, Vec3::ZERO);
        Ok(release)
    }

    fn force_release(&mut self, world: &mut World, holder: EntityKey, reason: ReleaseReason, radius: f32) -> Option<GrabRelease> {
        let state = self.grabs.remove(&holder)?;
        log::info!("{:?} lost hold of {:?}: {:?}", holder, state.held, reason);
        Some(finish(world, state, reason, radius))
    }

    /// Release every grab involving an entity that is going away
    pub fn forget_entity(&mut self, world: &mut World, entity: EntityKey) -> Vec<GrabRelease> {
        let holders: Vec<EntityKey> = self
            .grabs
            .values()
            .filter(|g| g.holder == entity || g.held == entity)
            .map(|g| g.holder)
            .collect();
        holders
            .into_iter()
            .filter_map(|h| self.force_release(world, h, ReleaseReason::EntityRemoved, 0.0))
            .collect()
    }

    pub fn clear(&mut self, world: &mut World) {
        let holders: Vec<EntityKey> = self.grabs.keys().copied().collect();
        for holder in holders {
            self.force_release(world, holder, ReleaseReason::EntityRemoved, 0.0);
        }
    }

    // --- Per tick ---

    /// Raw hold pose in front of the holder, before any portal transform
    pub fn hold_pose(&self, world: &World, state: &GrabState, config: &GrabConfig) -> Option<Transform3D> {
        let (eye, view) = eye_and_view(world, state.holder);
        let forward = view.forward();
        let held_body = world.get_entity(state.held)?.physics_body?;
        let half_extents = world.physics().get_body(held_body)?.half_extents();
        let holder_body = world.get_entity(state.holder).and_then(|e| e.physics_body);

        let center = world.center(state.holder).unwrap_or(eye);
        let clearance = world.radius(state.holder) + world.radius(state.held);
        let min_distance = clear_of_holder(eye - center, forward, clearance);

        let mut distance = config.hold_distance.max(min_distance);
        let filter = TraceFilter::new(CollisionFilter::prop())
            .statics_only()
            .in_environment(body_environment(world, holder_body));
        let trace = world.physics().trace_box(eye, eye + forward * distance, half_extents, &filter);
        if trace.hit.is_some() || trace.start_solid {
            distance = (trace.fraction * distance).max(distance * 0.5).max(min_distance);
        }

        let rotation = Angles::new(0.0, view.yaw, 0.0).to_quat().compose(&state.attach_orientation).normalize();
        let point = eye + forward * distance;
        Some(Transform3D::from_position_rotation(point - rotation.rotate(state.attach_offset), rotation))
    }

    /// Recompute a holder's target, resolving the portal it holds across
    ///
    /// Returns `Err(BrokenLink)` when the object is held through a portal that
    /// is no longer open.
    pub fn update_target(
        &mut self,
        world: &World,
        registry: &LinkageRegistry,
        holder: EntityKey,
        config: &GrabConfig,
    ) -> Result<Option<Transform3D>, ReleaseReason> {
        let Some(state) = self.grabs.get(&holder) else {
            return Ok(None);
        };
        let Some(raw) = self.hold_pose(world, state, config) else {
            return Err(ReleaseReason::EntityRemoved);
        };

        let mut across = state.across_portal;
        if state.held_across_portal && across.is_none() {
            let (eye, view) = eye_and_view(world, holder);
            let reach = config.hold_distance.max(eye.distance(raw.position)) * 2.0;
            across = nearest_portal_hit(registry, eye, view.forward(), reach).map(|(k, _)| k);
        }
        let target = match across {
            Some(portal) => {
                let portal = registry.get(portal).filter(|p| p.is_open()).ok_or(ReleaseReason::BrokenLink)?;
                apply_transform(portal.link_matrix(), &raw)
            }
            None => raw,
        };

        if let Some(state) = self.grabs.get_mut(&holder) {
            state.across_portal = across;
            state.held_across_portal = across.is_some() || state.held_across_portal;
            state.target = target;
        }
        Ok(Some(target))
    }

    /// Steer every held object toward its target
    pub fn drive(&mut self, world: &mut World, registry: &LinkageRegistry, config: &GrabConfig, dt: f32) -> Vec<GrabRelease> {
        let mut releases = Vec::new();
        if dt <= 0.0 {
            return releases;
        }
        let holders: Vec<EntityKey> = self.grabs.keys().copied().collect();
        for holder in holders {
            let Some(held) = self.grabs.get(&holder).map(|g| g.held) else {
                continue;
            };
            if !world.contains(holder) || !world.contains(held) {
                releases.extend(self.force_release(world, holder, ReleaseReason::EntityRemoved, 0.0));
                continue;
            }
            let target = match self.update_target(world, registry, holder, config) {
                Ok(Some(target)) => target,
                Ok(None) => continue,
                Err(reason) => {
                    releases.extend(self.force_release(world, holder, reason, config.drop_unstuck_radius));
                    continue;
                }
            };

            let (Some(position), Some(rotation)) =
                (world.center(held), world.get_entity(held).map(|e| e.transform.rotation))
            else {
                continue;
            };
            let error = target.position.distance(position);
            let Some(state) = self.grabs.get_mut(&holder) else {
                continue;
            };
            let tolerance = if state.held_across_portal {
                config.error_tolerance * config.cross_portal_tolerance_scale
            } else {
                config.error_tolerance
            };
            if error > tolerance {
                state.error_time += dt;
            } else {
                state.error_time = 0.0;
            }
            if state.error_time > config.grace_period {
                releases.extend(self.force_release(world, holder, ReleaseReason::TooFar, config.drop_unstuck_radius));
                continue;
            }

            let linear = ((target.position - position) / dt).clamp_length(config.max_speed);
            let angular = (rotation.scaled_axis_to(&target.rotation) / dt).clamp_length(config.max_angular_speed);
            world.set_velocity(held, linear, angular);
        }
        releases
    }

    /// Drop holds whose portal is gone or closed
    pub fn validate_links(&mut self, world: &mut World, registry: &LinkageRegistry, config: &GrabConfig) -> Vec<GrabRelease> {
        let broken: Vec<EntityKey> = self
            .grabs
            .values()
            .filter(|g| g.across_portal.is_some_and(|p| !registry.get(p).is_some_and(|p| p.is_open())))
            .map(|g| g.holder)
            .collect();
        broken
            .into_iter()
            .filter_map(|h| self.force_release(world, h, ReleaseReason::BrokenLink, config.drop_unstuck_radius))
            .collect()
    }

    /// Track which side of a portal pair the object is on after a teleport
    pub fn on_teleport(&mut self, entity: EntityKey, entrance: PortalKey, exit: PortalKey) {
        for state in self.grabs.values_mut() {
            if state.held == entity {
                toggle_across(state, entrance);
            }
            if state.holder == entity {
                toggle_across(state, exit);
            }
        }
    }
}

fn toggle_across(state: &mut GrabState, portal: PortalKey) {
    state.across_portal = match state.across_portal {
        None => Some(portal),
        Some(_) => None,
    };
    state.held_across_portal = state.across_portal.is_some();
    state.error_time = 0.0;
}

/// Restore the object and free it if it ended up inside geometry
fn finish(world: &mut World, state: GrabState, reason: ReleaseReason, unstuck_radius: f32) -> GrabRelease {
    let body_key = world.get_entity(state.held).and_then(|e| e.physics_body);
    if let Some(body) = body_key.and_then(|b| world.physics_mut().get_body_mut(b)) {
        body.affected_by_gravity = state.had_gravity;
    }
    if let Some(body) = body_key {
        if unstuck_radius > 0.0 && !world.physics().is_body_clear(body) {
            if let Some(free) = world.physics().find_nearest_passable_space(body, unstuck_radius) {
                let rotation = world.get_entity(state.held).map_or(Quat::IDENTITY, |e| e.transform.rotation);
                world.set_pose(state.held, Transform3D::from_position_rotation(free, rotation));
                log::debug!("Dropped {:?} moved out of geometry to {:?}", state.held, free);
            }
        }
    }
    GrabRelease { holder: state.holder, held: state.held, reason }
}

/// Eye position and view angles of a holder
/// Distance along `forward` from the eye at which a point is `clearance` away from the holder's center
///
/// `eye_offset` is the eye relative to that center.
fn clear_of_holder(eye_offset: Vec3, forward: Vec3, clearance: f32) -> f32 {
    let along = eye_offset.dot(forward);
    let discriminant = along * along - eye_offset.length_squared() + clearance * clearance;
    if discriminant <= 0.0 {
        return 0.0;
    }
    (-along + discriminant.sqrt()).max(0.0)
}

fn eye_and_view(world: &World, holder: EntityKey) -> (Vec3, Angles) {
    let center = world.center(holder).unwrap_or(Vec3::ZERO);
    match world.get_entity(holder) {
        Some(entity) => match &entity.player {
            Some(state) => (center + Vec3::UP * state.hull.eye_offset(state.stance), state.view_angles),
            None => (center, entity.transform.angles()),
        },
        None => (center, Angles::ZERO),
    }
}

fn body_environment(world: &World, body: Option<portalsim_core::BodyKey>) -> Option<portalsim_physics::EnvironmentKey> {
    body.and_then(|b| world.physics().get_body(b)).and_then(|b| b.environment)
}

fn pickup_filter(holder: Option<portalsim_core::BodyKey>, environment: Option<portalsim_physics::EnvironmentKey>) -> TraceFilter {
    let filter = TraceFilter::new(CollisionFilter::new(CollisionLayer::ALL, CollisionLayer::ALL)).in_environment(environment);
    match holder {
        Some(body) => filter.ignoring(body),
        None => filter,
    }
}

fn pickup_entity(world: &World, target: TraceTarget) -> Option<EntityKey> {
    let TraceTarget::Body(body) = target else {
        return None;
    };
    let entity = world.entity_for_body(body)?;
    world
        .get_entity(entity)
        .filter(|e| e.flags.contains(EntityFlags::PICKUP))
        .map(|_| entity)
}

/// Nearest open portal whose hole a ray enters from the front
fn nearest_portal_hit(registry: &LinkageRegistry, origin: Vec3, direction: Vec3, range: f32) -> Option<(PortalKey, f32)> {
    let ray = Ray::new(origin, direction);
    registry
        .open_portals()
        .filter(|(_, p)| p.signed_distance(origin) > 0.0 && direction.dot(p.normal()) < 0.0)
        .filter_map(|(key, p)| ray_vs_obb(&ray, &p.hole_obb()).map(|hit| (key, hit.distance)))
        .filter(|(_, distance)| *distance <= range)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use portalsim_core::{Entity, PhysicsConfig, RigidBody};
    use portalsim_physics::{StaticCollider, SurfaceMaterial};

    const DT: f32 = 1.0 / 60.0;

    fn vec_approx_eq(a: Vec3, b: Vec3, epsilon: f32) -> bool {
        a.approx_eq(b, epsilon)
    }

    fn setup() -> (World, EntityKey, EntityKey) {
        let mut world = World::new().with_physics(PhysicsConfig::new(0.0));
        let player = world.spawn_with_body(
            Entity::player(1),
            RigidBody::new_aabb(Vec3::new(0.0, 0.0, 64.0), portalsim_physics::PlayerHull::default().standing),
        );
        let cube = world.spawn_with_body(
            Entity::prop().with_flags(EntityFlags::PICKUP),
            RigidBody::new_aabb(Vec3::new(60.0, 0.0, 64.0), Vec3::splat(8.0)).with_gravity(true),
        );
        (world, player, cube)
    }

    fn cube_body(world: &World, cube: EntityKey) -> portalsim_core::BodyKey {
        world.get_entity(cube).unwrap().physics_body.unwrap()
    }

    #[test]
    fn test_pick_up_disables_gravity() {
        let (mut world, player, cube) = setup();
        let mut grab = GrabController::new();
        grab.pick_up(&mut world, player, cube, false).unwrap();
        assert!(grab.is_holding(player));
        assert_eq!(grab.holder_of(cube), Some(player));
        assert!(!world.physics().get_body(cube_body(&world, cube)).unwrap().affected_by_gravity);

        assert_eq!(grab.pick_up(&mut world, player, cube, false), Err(PortalError::AlreadyHeld(cube)));
        let release = grab.drop_object(&mut world, player, 64.0).unwrap();
        assert_eq!(release.reason, ReleaseReason::Dropped);
        assert!(world.physics().get_body(cube_body(&world, cube)).unwrap().affected_by_gravity);
        assert_eq!(grab.drop_object(&mut world, player, 64.0), Err(PortalError::NotHeld(player)));
    }

    fn hold_point_looking(pitch: f32) -> (World, EntityKey, Vec3) {
        let (mut world, player, cube) = setup();
        world.get_entity_mut(player).unwrap().player.as_mut().unwrap().view_angles = Angles::new(pitch, 0.0, 0.0);
        let mut grab = GrabController::new();
        grab.pick_up(&mut world, player, cube, false).unwrap();
        let state = grab.state(player).unwrap().clone();
        let pose = grab.hold_pose(&world, &state, &GrabConfig::default()).unwrap();
        (world, cube, pose.position)
    }

    #[test]
    fn test_hold_point_clears_holder_looking_down() {
        let (world, cube, target) = hold_point_looking(89.0);
        let player = world.iter().find(|(_, e)| e.is_player()).unwrap().0;
        let clearance = world.radius(player) + world.radius(cube);
        let center = world.center(player).unwrap();
        assert!(target.distance(center) >= clearance - 0.01, "{:?} too close", target);
        // Below the feet rather than inside the hull
        assert!(target.z < 28.0, "got {:?}", target);
    }

    #[test]
    fn test_hold_point_clears_holder_looking_up() {
        let (world, cube, target) = hold_point_looking(-89.0);
        let player = world.iter().find(|(_, e)| e.is_player()).unwrap().0;
        let clearance = world.radius(player) + world.radius(cube);
        assert!(target.distance(world.center(player).unwrap()) >= clearance - 0.01);
        assert!(target.z > 100.0, "got {:?}", target);
    }

    #[test]
    fn test_clear_of_holder_distance() {
        // Eye 28 above center, looking straight down, 56 clearance
        let d = clear_of_holder(Vec3::new(0.0, 0.0, 28.0), Vec3::new(0.0, 0.0, -1.0), 56.0);
        assert!((d - 84.0).abs() < 1e-4);
        // Eye outside the clearance sphere looking away needs nothing
        assert_eq!(clear_of_holder(Vec3::new(100.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 56.0), 0.0);
    }

    #[test]
    fn test_held_object_reaches_hold_point() {
        let (mut world, player, cube) = setup();
        let registry = LinkageRegistry::default();
        let config = GrabConfig::default();
        let mut grab = GrabController::new();
        grab.pick_up(&mut world, player, cube, false).unwrap();

        for _ in 0..30 {
            assert!(grab.drive(&mut world, &registry, &config, DT).is_empty());
            world.step(DT);
        }
        // Eye at 64 + 28, looking along +X, hold distance 60
        let target = grab.state(player).unwrap().target;
        assert!(vec_approx_eq(target.position, Vec3::new(60.0, 0.0, 92.0), 0.01), "got {:?}", target.position);
        assert!(vec_approx_eq(world.center(cube).unwrap(), target.position, 1.0));
    }

    #[test]
    fn test_obstruction_shortens_hold() {
        let (mut world, player, cube) = setup();
        world.physics_mut().add_static_collider(StaticCollider::aabb(
            Vec3::new(45.0, 0.0, 92.0),
            Vec3::new(5.0, 100.0, 100.0),
            SurfaceMaterial::CONCRETE,
        ));
        let mut grab = GrabController::new();
        grab.pick_up(&mut world, player, cube, false).unwrap();

        let pose = grab.hold_pose(&world, grab.state(player).unwrap(), &GrabConfig::default()).unwrap();
        // The swept cube stops with its face at the wall (x = 40)
        assert!((pose.position.x - 32.0).abs() < 0.1, "got {:?}", pose.position);
    }

    #[test]
    fn test_blocked_close_falls_back_to_half_distance() {
        let (mut world, player, cube) = setup();
        world.physics_mut().add_static_collider(StaticCollider::aabb(
            Vec3::new(30.0, 0.0, 92.0),
            Vec3::new(5.0, 100.0, 100.0),
            SurfaceMaterial::CONCRETE,
        ));
        let mut grab = GrabController::new();
        grab.pick_up(&mut world, player, cube, false).unwrap();

        let pose = grab.hold_pose(&world, grab.state(player).unwrap(), &GrabConfig::default()).unwrap();
        assert!((pose.position.x - 30.0).abs() < 0.01, "got {:?}", pose.position);
    }

    #[test]
    fn test_sustained_error_releases() {
        let (mut world, player, cube) = setup();
        let registry = LinkageRegistry::default();
        let config = GrabConfig::default();
        let mut grab = GrabController::new();
        grab.pick_up(&mut world, player, cube, false).unwrap();
        world.set_pose(cube, Transform3D::from_position(Vec3::new(500.0, 0.0, 64.0)));

        let mut released = Vec::new();
        for _ in 0..12 {
            // Never step physics: the object stays far away
            released.extend(grab.drive(&mut world, &registry, &config, 0.1));
        }
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].reason, ReleaseReason::TooFar);
        assert!(!grab.is_holding(player));
    }

    #[test]
    fn test_drop_inside_wall_is_freed() {
        let (mut world, player, cube) = setup();
        world.physics_mut().add_static_collider(StaticCollider::aabb(
            Vec3::new(200.0, 0.0, 64.0),
            Vec3::new(10.0, 100.0, 100.0),
            SurfaceMaterial::CONCRETE,
        ));
        let mut grab = GrabController::new();
        grab.pick_up(&mut world, player, cube, false).unwrap();
        world.set_pose(cube, Transform3D::from_position(Vec3::new(195.0, 0.0, 64.0)));

        grab.drop_object(&mut world, player, 64.0).unwrap();
        assert!(world.physics().is_body_clear(cube_body(&world, cube)));
    }

    #[test]
    fn test_throw_sets_velocity() {
        let (mut world, player, cube) = setup();
        let mut grab = GrabController::new();
        grab.pick_up(&mut world, player, cube, false).unwrap();
        let release = grab.throw_object(&mut world, player, Vec3::new(400.0, 0.0, 100.0), 64.0).unwrap();
        assert_eq!(release.reason, ReleaseReason::Thrown);
        let (velocity, _) = world.velocity(cube).unwrap();
        assert!(vec_approx_eq(velocity, Vec3::new(400.0, 0.0, 100.0), 0.001));
    }

    #[test]
    fn test_teleports_toggle_across() {
        let (mut world, player, cube) = setup();
        let mut keys = slotmap::SlotMap::<PortalKey, ()>::with_key();
        let (entrance, exit) = (keys.insert(()), keys.insert(()));
        let mut grab = GrabController::new();
        grab.pick_up(&mut world, player, cube, false).unwrap();

        grab.on_teleport(cube, entrance, exit);
        assert_eq!(grab.state(player).unwrap().across_portal, Some(entrance));
        assert!(grab.state(player).unwrap().held_across_portal);

        // Holder follows the object through: back on the same side
        grab.on_teleport(player, entrance, exit);
        assert_eq!(grab.state(player).unwrap().across_portal, None);
        assert!(!grab.state(player).unwrap().held_across_portal);

        grab.on_teleport(player, exit, entrance);
        assert_eq!(grab.state(player).unwrap().across_portal, Some(entrance));
    }

    #[test]
    fn test_unknown_across_portal_breaks_link() {
        let (mut world, player, cube) = setup();
        let registry = LinkageRegistry::default();
        let mut grab = GrabController::new();
        grab.pick_up(&mut world, player, cube, false).unwrap();
        let stale = slotmap::SlotMap::<PortalKey, ()>::with_key().insert(());
        grab.on_teleport(cube, stale, stale);

        let released = grab.validate_links(&mut world, &registry, &GrabConfig::default());
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].reason, ReleaseReason::BrokenLink);
    }

    #[test]
    fn test_find_pickup_target_direct() {
        let (world, player, cube) = setup();
        let registry = LinkageRegistry::default();
        let grab = GrabController::new();
        // Eye at z 92 looks over a cube at z 64; look down a little
        assert_eq!(grab.find_pickup_target(&world, &registry, player, 96.0), None);

        let mut world = world;
        world.get_entity_mut(player).unwrap().player.as_mut().unwrap().view_angles = Angles::new(25.0, 0.0, 0.0);
        assert_eq!(
            grab.find_pickup_target(&world, &registry, player, 96.0),
            Some(PickupTarget { entity: cube, across: false })
        );
    }
}
