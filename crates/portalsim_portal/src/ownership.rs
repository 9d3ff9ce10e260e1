//! Which portal environment simulates which entity
//!
//! The arbiter keeps the authoritative entity to portal map and mirrors it
//! into each portal simulator. An entity belongs to at most one portal at a
//! time; moving it between portals releases it from the old one before the
//! new one claims it.
//!
//! Structural changes requested while the physics callbacks are being
//! processed are not applied on the spot. They are recorded and applied, in
//! order, once the callback phase ends.

use std::collections::{BTreeMap, BTreeSet};

use portalsim_core::{DamageKind, EntityKey, Transform3D, World};
use portalsim_physics::{collide, Aabb, Collider, Obb};

use crate::config::SimulatorConfig;
use crate::events::PortalEvent;
use crate::linkage::LinkageRegistry;
use crate::portal::{Portal, PortalKey};

/// Distances this close count as a tie
const TIE_EPSILON: f32 = 1.0e-4;

/// Whether structural ownership changes may be applied right now
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    InCollisionCallback,
}

/// An ownership change held back until the callback phase ends
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeferredOp {
    Take { entity: EntityKey, portal: PortalKey },
    Release { entity: EntityKey },
}

#[derive(Debug, Default)]
pub struct OwnershipArbiter {
    owners: BTreeMap<EntityKey, PortalKey>,
    phase: Phase,
    deferred: Vec<DeferredOp>,
}

impl OwnershipArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self, entity: EntityKey) -> Option<PortalKey> {
        self.owners.get(&entity).copied()
    }

    pub fn owned_by(&self, portal: PortalKey) -> impl Iterator<Item = EntityKey> + '_ {
        self.owners.iter().filter(move |(_, p)| **p == portal).map(|(e, _)| *e)
    }

    pub fn owners(&self) -> impl Iterator<Item = (EntityKey, PortalKey)> + '_ {
        self.owners.iter().map(|(e, p)| (*e, *p))
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn deferred(&self) -> &[DeferredOp] {
        &self.deferred
    }

    // --- Phase ---

    pub fn begin_callback(&mut self) {
        self.phase = Phase::InCollisionCallback;
    }

    /// Leave the callback phase and apply what was held back
    pub fn end_callback(&mut self, world: &mut World, registry: &mut LinkageRegistry) -> Vec<PortalEvent> {
        self.phase = Phase::Idle;
        let mut events = Vec::new();
        for op in std::mem::take(&mut self.deferred) {
            let event = match op {
                DeferredOp::Take { entity, portal } => self.take(world, registry, entity, portal),
                DeferredOp::Release { entity } => self.release(world, registry, entity),
            };
            events.extend(event);
        }
        events
    }

    // --- Take and release ---

    /// Give an entity to a portal, releasing it from its previous owner first
    pub fn take(
        &mut self,
        world: &mut World,
        registry: &mut LinkageRegistry,
        entity: EntityKey,
        portal: PortalKey,
    ) -> Option<PortalEvent> {
        if self.phase == Phase::InCollisionCallback {
            self.deferred.push(DeferredOp::Take { entity, portal });
            return None;
        }
        let previous = self.owner(entity);
        if previous == Some(portal) || !registry.contains(portal) || !world.contains(entity) {
            return None;
        }

        let body = world.get_entity(entity).and_then(|e| e.physics_body);
        if let Some(old) = previous {
            if let Some(p) = registry.get_mut(old) {
                p.simulator.release_ownership(world.physics_mut(), entity, body);
            }
        }
        if let Some(p) = registry.get_mut(portal) {
            p.simulator.take_ownership(world.physics_mut(), entity, body);
        }
        self.owners.insert(entity, portal);
        log::debug!("Entity {:?} owned by {:?} (was {:?})", entity, portal, previous);
        Some(PortalEvent::OwnershipChanged { entity, from: previous, to: Some(portal) })
    }

    /// Hand an entity back to the plain world
    pub fn release(
        &mut self,
        world: &mut World,
        registry: &mut LinkageRegistry,
        entity: EntityKey,
    ) -> Option<PortalEvent> {
        if self.phase == Phase::InCollisionCallback {
            self.deferred.push(DeferredOp::Release { entity });
            return None;
        }
        let previous = self.owners.remove(&entity)?;
        let body = world.get_entity(entity).and_then(|e| e.physics_body);
        if let Some(p) = registry.get_mut(previous) {
            p.simulator.release_ownership(world.physics_mut(), entity, body);
        }
        log::debug!("Entity {:?} released by {:?}", entity, previous);
        Some(PortalEvent::OwnershipChanged { entity, from: Some(previous), to: None })
    }

    /// Ask for a release from inside the callback phase
    pub fn request_release(&mut self, entity: EntityKey) {
        if !self.deferred.contains(&DeferredOp::Release { entity }) {
            self.deferred.push(DeferredOp::Release { entity });
        }
    }

    /// Move an entity to another portal in one step
    pub fn transfer(
        &mut self,
        world: &mut World,
        registry: &mut LinkageRegistry,
        entity: EntityKey,
        to: PortalKey,
    ) -> Option<PortalEvent> {
        self.take(world, registry, entity, to)
    }

    // --- Arbitration ---

    /// Decide the owner of every entity near an open portal
    ///
    /// A portal claims an entity whose bounds reach into the box in front of
    /// its hole and whose center is on the front side. The current owner
    /// keeps the entity while it is anywhere in its claim box or tunnel.
    /// Between several candidates the nearer portal origin wins; ties keep
    /// the current owner. Entities in `skip` are left untouched.
    pub fn arbitrate(
        &mut self,
        world: &mut World,
        registry: &mut LinkageRegistry,
        config: &SimulatorConfig,
        skip: &BTreeSet<EntityKey>,
    ) -> Vec<PortalEvent> {
        let mut events = Vec::new();

        let stale: Vec<EntityKey> = self
            .owners
            .iter()
            .filter(|(e, p)| !world.contains(**e) || !registry.get(**p).is_some_and(Portal::is_open))
            .map(|(e, _)| *e)
            .collect();
        for entity in stale {
            if world.contains(entity) {
                events.extend(self.release(world, registry, entity));
            } else {
                self.forget_entity(registry, entity);
            }
        }

        let open: Vec<PortalKey> = registry.open_portals().map(|(k, _)| k).collect();
        let entities: Vec<EntityKey> = world.keys().collect();
        for entity in entities {
            if skip.contains(&entity) {
                continue;
            }
            let incumbent = self.owner(entity);
            let winner = if world.is_teleportable(entity) {
                self.choose(world, registry, config, entity, incumbent, &open)
            } else {
                None
            };
            let event = match (incumbent, winner) {
                (Some(current), Some(best)) if current == best => None,
                (_, Some(best)) => self.take(world, registry, entity, best),
                (Some(_), None) => self.release(world, registry, entity),
                (None, None) => None,
            };
            events.extend(event);
        }
        events
    }

    fn choose(
        &self,
        world: &World,
        registry: &LinkageRegistry,
        config: &SimulatorConfig,
        entity: EntityKey,
        incumbent: Option<PortalKey>,
        open: &[PortalKey],
    ) -> Option<PortalKey> {
        let (Some(bounds), Some(center)) = (world.bounds(entity), world.center(entity)) else {
            return None;
        };

        let mut best: Option<(PortalKey, f32)> = None;
        for &key in open {
            let Some(portal) = registry.get(key) else {
                continue;
            };
            let eligible = if incumbent == Some(key) {
                reaches(&portal.extruded_obb(config.tunnel_depth, config.claim_depth), &bounds)
            } else {
                reaches(&portal.extruded_obb(0.0, config.claim_depth), &bounds) && portal.signed_distance(center) >= 0.0
            };
            if !eligible {
                continue;
            }

            let distance = portal.origin().distance(center);
            best = match best {
                None => Some((key, distance)),
                Some((_, d)) if distance < d - TIE_EPSILON => Some((key, distance)),
                Some((_, d)) if (distance - d).abs() <= TIE_EPSILON && incumbent == Some(key) => {
                    Some((key, distance))
                }
                keep => keep,
            };
        }
        best.map(|(k, _)| k)
    }

    // --- Cleanup ---

    /// Release everything a portal owns; used before it closes or goes away
    pub fn forget_portal(
        &mut self,
        world: &mut World,
        registry: &mut LinkageRegistry,
        portal: PortalKey,
    ) -> Vec<PortalEvent> {
        let owned: Vec<EntityKey> = self.owned_by(portal).collect();
        self.deferred.retain(|op| !matches!(op, DeferredOp::Take { portal: p, .. } if *p == portal));
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        let events = owned
            .into_iter()
            .filter_map(|entity| self.release(world, registry, entity))
            .collect();
        self.phase = phase;
        events
    }

    /// Drop an entity that no longer exists
    pub fn forget_entity(&mut self, registry: &mut LinkageRegistry, entity: EntityKey) {
        self.deferred.retain(|op| match op {
            DeferredOp::Take { entity: e, .. } | DeferredOp::Release { entity: e } => *e != entity,
        });
        if let Some(portal) = self.owners.remove(&entity) {
            if let Some(p) = registry.get_mut(portal) {
                p.simulator.forget(entity);
            }
        }
    }

    pub fn clear(&mut self) {
        self.owners.clear();
        self.deferred.clear();
        self.phase = Phase::Idle;
    }

    /// Free owned entities stuck in geometry, or crush them if nothing fits
    pub fn fix_stuck_entities(&mut self, world: &mut World, config: &SimulatorConfig) -> Vec<PortalEvent> {
        let mut events = Vec::new();
        let owned: Vec<(EntityKey, PortalKey)> = self.owners().collect();
        for (entity, portal) in owned {
            let Some((body, rotation)) = world
                .get_entity(entity)
                .filter(|e| e.is_alive())
                .and_then(|e| e.physics_body.map(|b| (b, e.transform.rotation)))
            else {
                continue;
            };
            let Some(from) = world.physics().get_body(body).map(|b| b.position) else {
                continue;
            };
            if world.physics().is_body_clear(body) {
                continue;
            }

            match world.physics().find_nearest_passable_space(body, config.unstuck_radius) {
                Some(to) => {
                    world.set_pose(entity, Transform3D::from_position_rotation(to, rotation));
                    log::debug!("Freed stuck entity {:?} from {:?} to {:?}", entity, from, to);
                    events.push(PortalEvent::EntityUnstuck { entity, portal, from, to });
                }
                None => {
                    log::warn!("Entity {:?} stuck in {:?} with no free space nearby", entity, portal);
                    world.apply_damage(entity, config.stuck_damage, DamageKind::Crush);
                    events.push(PortalEvent::EntityCrushed { entity, portal, damage: config.stuck_damage });
                }
            }
        }
        events
    }

    /// Whether the map and every simulator agree and nobody is owned twice
    pub fn is_partition(&self, registry: &LinkageRegistry) -> bool {
        let mut seen = BTreeSet::new();
        for (key, portal) in registry.iter() {
            for entity in portal.simulator().owned() {
                if !seen.insert(entity) || self.owner(entity) != Some(key) {
                    return false;
                }
            }
        }
        seen.len() == self.owners.len()
    }
}

/// Whether entity bounds reach into a portal region
pub(crate) fn reaches(region: &Obb, bounds: &Aabb) -> bool {
    if region.contains(bounds.center()) {
        return true;
    }
    collide(&Collider::Obb(*region), &Collider::Aabb(*bounds)).is_some_and(|c| c.is_colliding())
}
