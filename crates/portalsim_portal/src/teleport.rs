//! Crossing detection and teleport application
//!
//! Every entity near an open portal gets a tracker per portal:
//!
//! ```text
//! NotInHole -> Approaching -> Crossed -> Teleported -> NotInHole
//! ```
//!
//! Detection runs during the collision callback phase and only queues
//! [`TeleportEvent`]s. The queue is flushed once per tick, after ownership
//! arbitration, so every crossing decision of a tick is made against the same
//! pre-teleport state and no entity teleports twice in one tick.

use std::collections::{BTreeMap, BTreeSet};

use portalsim_core::{Angles, EntityKey, Stance, Transform3D, World};
use portalsim_math::{Mat4, Quat, Vec3};

use crate::config::{PortalConfig, TeleportConfig};
use crate::events::PortalEvent;
use crate::linkage::LinkageRegistry;
use crate::ownership::{reaches, OwnershipArbiter};
use crate::portal::{Portal, PortalKey};
use crate::transform_solver::{apply_point, apply_rotation, apply_vector};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TeleportState {
    #[default]
    NotInHole,
    Approaching,
    Crossed,
    /// Went through this tick; the tracker is dropped on the next pass
    Teleported,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Tracker {
    state: TeleportState,
    last_distance: f32,
}

/// A crossing waiting for the flush
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TeleportEvent {
    pub entity: EntityKey,
    /// Entrance
    pub source: PortalKey,
    /// Exit
    pub destination: PortalKey,
    pub time: f64,
    pub forced_crouch: bool,
}

#[derive(Debug, Default)]
pub struct TeleportExecutor {
    trackers: BTreeMap<(EntityKey, PortalKey), Tracker>,
    queue: Vec<TeleportEvent>,
}

impl TeleportExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, entity: EntityKey, portal: PortalKey) -> TeleportState {
        self.trackers.get(&(entity, portal)).map_or(TeleportState::NotInHole, |t| t.state)
    }

    pub fn queued(&self) -> &[TeleportEvent] {
        &self.queue
    }

    pub fn queued_entities(&self) -> BTreeSet<EntityKey> {
        self.queue.iter().map(|e| e.entity).collect()
    }

    /// Evaluate every teleportable entity against every open portal
    ///
    /// Must run inside the arbiter's callback phase; releases it asks for are
    /// deferred until the phase ends.
    pub fn detect(
        &mut self,
        world: &World,
        registry: &LinkageRegistry,
        arbiter: &mut OwnershipArbiter,
        config: &PortalConfig,
    ) {
        self.trackers.retain(|_, t| t.state != TeleportState::Teleported);

        let mut queued = self.queued_entities();
        let entities: Vec<EntityKey> = world.keys().filter(|e| world.is_teleportable(*e)).collect();
        for (key, portal) in registry.open_portals() {
            let Some(destination) = portal.linked() else {
                continue;
            };
            let region = portal.extruded_obb(config.simulator.tunnel_depth, config.simulator.claim_depth);

            for &entity in &entities {
                let (Some(bounds), Some(center)) = (world.bounds(entity), world.center(entity)) else {
                    continue;
                };
                let tracker_key = (entity, key);
                let inside = reaches(&region, &bounds);
                let distance = portal.signed_distance(center);

                let Some(tracker) = self.trackers.get_mut(&tracker_key) else {
                    if inside && distance >= 0.0 {
                        self.trackers.insert(
                            tracker_key,
                            Tracker { state: TeleportState::Approaching, last_distance: distance },
                        );
                    }
                    continue;
                };
                if !inside {
                    self.trackers.remove(&tracker_key);
                    continue;
                }
                if tracker.state != TeleportState::Approaching {
                    continue;
                }

                let crossed = tracker.last_distance >= 0.0 && distance < 0.0;
                if !crossed {
                    tracker.last_distance = distance;
                    continue;
                }
                if !portal.projects_into_hole(center) {
                    // Went behind the plane beside the hole
                    self.trackers.remove(&tracker_key);
                    if arbiter.owner(entity) == Some(key) {
                        arbiter.request_release(entity);
                    }
                    continue;
                }
                if !queued.insert(entity) {
                    tracker.last_distance = distance;
                    continue;
                }

                tracker.state = TeleportState::Crossed;
                tracker.last_distance = distance;
                let forced_crouch = world.get_entity(entity).is_some_and(|e| e.is_player())
                    && registry
                        .get(destination)
                        .is_some_and(|exit| needs_forced_crouch(portal, exit, &config.teleport));
                log::debug!("Entity {:?} crossed portal {:?}", entity, key);
                self.queue.push(TeleportEvent {
                    entity,
                    source: key,
                    destination,
                    time: world.time(),
                    forced_crouch,
                });
            }
        }
    }

    /// Apply every queued teleport
    pub fn flush(
        &mut self,
        world: &mut World,
        registry: &mut LinkageRegistry,
        arbiter: &mut OwnershipArbiter,
        config: &TeleportConfig,
    ) -> Vec<PortalEvent> {
        let mut events = Vec::new();
        for event in std::mem::take(&mut self.queue) {
            let valid = world.contains(event.entity)
                && world.is_teleportable(event.entity)
                && registry
                    .get(event.source)
                    .is_some_and(|p| p.is_open() && p.linked() == Some(event.destination))
                && registry.get(event.destination).is_some_and(Portal::is_open);
            if !valid {
                log::debug!("Discarding stale teleport of {:?} through {:?}", event.entity, event.source);
                self.trackers.remove(&(event.entity, event.source));
                continue;
            }
            events.extend(self.apply(world, registry, arbiter, config, event));
        }
        events
    }

    fn apply(
        &mut self,
        world: &mut World,
        registry: &mut LinkageRegistry,
        arbiter: &mut OwnershipArbiter,
        config: &TeleportConfig,
        event: TeleportEvent,
    ) -> Vec<PortalEvent> {
        let TeleportEvent { entity, source, destination, .. } = event;
        let (Some(entrance), Some(exit)) = (registry.get(source), registry.get(destination)) else {
            return Vec::new();
        };
        let m = entrance.link_matrix();
        let floorish = is_floorish(entrance.normal(), config) || is_floorish(exit.normal(), config);
        let exit_normal = exit.normal();

        let Some(center) = world.center(entity) else {
            return Vec::new();
        };
        let (linear, angular) = world.velocity(entity).unwrap_or((Vec3::ZERO, Vec3::ZERO));
        let new_center = apply_point(m, center);
        let linear = clamp_exit_velocity(apply_vector(m, linear), exit_normal, floorish, config);
        let angular = apply_vector(m, angular);
        let exit_distance = exit.signed_distance(new_center);

        let view = world.get_entity(entity).and_then(|e| e.player.as_ref()).map(|p| p.view_angles);
        let rotation = match view {
            Some(view) => {
                let reoriented = reorient_view(view, m, config);
                if let Some(state) = world.get_entity_mut(entity).and_then(|e| e.player.as_mut()) {
                    state.view_angles = reoriented;
                }
                Angles::new(0.0, reoriented.yaw, 0.0).to_quat()
            }
            None => {
                let current = world.get_entity(entity).map_or(Quat::IDENTITY, |e| e.transform.rotation);
                apply_rotation(m, current)
            }
        };

        world.set_pose(entity, Transform3D::from_position_rotation(new_center, rotation));
        world.set_velocity(entity, linear, angular);
        if event.forced_crouch && world.set_stance(entity, Stance::Crouching) {
            if let Some(state) = world.get_entity_mut(entity).and_then(|e| e.player.as_mut()) {
                state.forced_crouch = true;
            }
        }

        let mut events: Vec<PortalEvent> = arbiter.transfer(world, registry, entity, destination).into_iter().collect();
        self.trackers.insert(
            (entity, source),
            Tracker { state: TeleportState::Teleported, last_distance: 0.0 },
        );
        self.trackers.insert(
            (entity, destination),
            Tracker { state: TeleportState::Approaching, last_distance: exit_distance },
        );

        log::info!("Entity {:?} teleported {:?} -> {:?}", entity, source, destination);
        events.push(PortalEvent::EntityTeleported {
            entity,
            from: source,
            to: destination,
            time: event.time,
            forced_crouch: event.forced_crouch,
        });
        events
    }

    /// Stand players back up once they have left every portal and there is room
    pub fn release_forced_crouch(&mut self, world: &mut World, arbiter: &OwnershipArbiter) {
        let crouched: Vec<EntityKey> = world
            .iter()
            .filter(|(k, e)| e.player.as_ref().is_some_and(|p| p.forced_crouch) && arbiter.owner(*k).is_none())
            .map(|(k, _)| k)
            .collect();
        for entity in crouched {
            if world.set_stance(entity, Stance::Standing) {
                if let Some(state) = world.get_entity_mut(entity).and_then(|e| e.player.as_mut()) {
                    state.forced_crouch = false;
                }
                log::debug!("Player {:?} stood up after forced crouch", entity);
            }
        }
    }

    /// Forget a portal's trackers and queued teleports through it
    pub fn discard_portal(&mut self, portal: PortalKey) {
        let (dropped, kept): (Vec<TeleportEvent>, Vec<TeleportEvent>) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|e| e.source == portal || e.destination == portal);
        self.queue = kept;
        for event in dropped {
            self.trackers.remove(&(event.entity, event.source));
        }
        self.trackers.retain(|(_, p), _| *p != portal);
    }

    pub fn discard_entity(&mut self, entity: EntityKey) {
        self.trackers.retain(|(e, _), _| *e != entity);
        self.queue.retain(|e| e.entity != entity);
    }

    pub fn clear(&mut self) {
        self.trackers.clear();
        self.queue.clear();
    }
}

fn is_floorish(normal: Vec3, config: &TeleportConfig) -> bool {
    normal.z.abs() > config.floor_normal_threshold
}

/// Box hulls cannot turn with the player between a floor and a wall
fn needs_forced_crouch(entrance: &Portal, exit: &Portal, config: &TeleportConfig) -> bool {
    let (a, b) = (entrance.normal(), exit.normal());
    a.dot(b).abs() < config.perpendicular_threshold && (is_floorish(a, config) || is_floorish(b, config))
}

/// Enforce the outward minimum along the exit normal, then the global cap
pub fn clamp_exit_velocity(velocity: Vec3, exit_normal: Vec3, floorish: bool, config: &TeleportConfig) -> Vec3 {
    let minimum = if floorish { config.floor_exit_min_speed } else { config.min_exit_speed };
    let outward = velocity.dot(exit_normal);
    let boosted = if outward < minimum {
        velocity + exit_normal * (minimum - outward)
    } else {
        velocity
    };
    boosted.clamp_length(config.max_exit_speed)
}

/// Carry view angles through a link without leaving any roll behind
///
/// When entrance and exit share an up axis the link only turns the heading,
/// so pitch is kept and yaw is rotated. Otherwise the view is rebuilt from
/// the rotated look direction; looking nearly straight up or down
/// afterwards, yaw comes from where the top of the view points.
pub fn reorient_view(view: Angles, m: Mat4, config: &TeleportConfig) -> Angles {
    if apply_vector(m, Vec3::UP).z > UPRIGHT_LINK_DOT {
        let heading = apply_vector(m, Angles::new(0.0, view.yaw, 0.0).forward());
        let yaw = heading.y.atan2(heading.x).to_degrees();
        return Angles::new(view.pitch, yaw, 0.0).normalized();
    }

    let rotated = apply_rotation(m, view.to_quat());
    let forward = rotated.forward();
    let mut angles = Angles::looking_along(forward);
    if forward.z.abs() > config.roll_reorient_threshold {
        let up = rotated.up();
        let sign = angles.pitch.to_radians().sin().signum();
        angles.yaw = (sign * up.y).atan2(sign * up.x).to_degrees();
    }
    angles.normalized()
}

/// Links whose up axis survives above this keep the view's pitch
const UPRIGHT_LINK_DOT: f32 = 0.999;
