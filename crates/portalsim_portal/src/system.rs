//! Portal system facade
//!
//! [`PortalSystem`] owns every portal subsystem and runs them in a fixed
//! order around the host physics step:
//!
//! ```text
//! pre_physics   grab controller drives held objects
//! World::step   host physics
//! post_physics  1. crossing detection (callback phase, releases deferred)
//!               2. deferred ownership changes applied
//!               3. ownership arbitration
//!               4. teleport queue flushed
//!               5. portal validation and detectors
//!               6. command queue drained
//!               7. stuck entity correction
//!               8. cross-portal holds re-validated
//! ```

use portalsim_core::{EntityKey, Transform3D, World};
use portalsim_math::Vec3;
use portalsim_physics::{CollisionFilter, CollisionLayer, TraceFilter, TraceTarget};

use crate::commands::{CommandQueue, PortalCommand};
use crate::config::PortalConfig;
use crate::error::PortalError;
use crate::events::{EventBus, FizzleReason, PortalEvent, PortalListener};
use crate::grab::{GrabController, GrabRelease};
use crate::linkage::{LinkChange, LinkageRegistry};
use crate::ownership::{reaches, OwnershipArbiter};
use crate::persist::PortalSave;
use crate::placement::{PlacedBy, PlacementOutcome, PlacementRequest, PlacementSolver};
use crate::portal::{LinkageId, Portal, PortalKey, PortalSide};
use crate::simulator::sync_attachment;
use crate::teleport::TeleportExecutor;
use crate::volumes::VolumeSet;

#[derive(Debug)]
pub struct PortalSystem {
    config: PortalConfig,
    registry: LinkageRegistry,
    arbiter: OwnershipArbiter,
    teleporter: TeleportExecutor,
    grabs: GrabController,
    placement: PlacementSolver,
    volumes: VolumeSet,
    commands: CommandQueue,
    events: EventBus,
}

impl PortalSystem {
    pub fn new(config: PortalConfig) -> Result<Self, PortalError> {
        config.validate()?;
        Ok(Self {
            registry: LinkageRegistry::new(config.hole.clone(), config.simulator.clone()),
            placement: PlacementSolver::new(config.placement.clone(), config.debug.force_placement_success),
            arbiter: OwnershipArbiter::new(),
            teleporter: TeleportExecutor::new(),
            grabs: GrabController::new(),
            volumes: VolumeSet::new(),
            commands: CommandQueue::new(),
            events: EventBus::new(),
            config,
        })
    }

    // --- Accessors ---

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn registry(&self) -> &LinkageRegistry {
        &self.registry
    }

    pub fn arbiter(&self) -> &OwnershipArbiter {
        &self.arbiter
    }

    pub fn teleporter(&self) -> &TeleportExecutor {
        &self.teleporter
    }

    pub fn grabs(&self) -> &GrabController {
        &self.grabs
    }

    pub fn placement(&self) -> &PlacementSolver {
        &self.placement
    }

    pub fn volumes(&self) -> &VolumeSet {
        &self.volumes
    }

    pub fn volumes_mut(&mut self) -> &mut VolumeSet {
        &mut self.volumes
    }

    pub fn commands(&self) -> &CommandQueue {
        &self.commands
    }

    pub fn portal(&self, key: PortalKey) -> Option<&Portal> {
        self.registry.get(key)
    }

    /// Turn the placement debug override on or off
    pub fn set_force_placement_success(&mut self, force: bool) {
        self.config.debug.force_placement_success = force;
        self.placement.set_force_success(force);
    }

    // --- Events ---

    pub fn add_listener(&mut self, listener: Box<dyn PortalListener>) {
        self.events.add_listener(listener);
    }

    pub fn events(&self) -> &[PortalEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<PortalEvent> {
        self.events.drain()
    }

    fn emit_all(&mut self, events: impl IntoIterator<Item = PortalEvent>) {
        for event in events {
            self.events.emit(event);
        }
    }

    fn emit_releases(&mut self, releases: Vec<GrabRelease>) {
        self.emit_all(releases.into_iter().map(|r| PortalEvent::GrabReleased {
            holder: r.holder,
            held: r.held,
            reason: r.reason,
        }));
    }

    // --- Lookup ---

    pub fn find_portal(
        &mut self,
        linkage_id: LinkageId,
        side: PortalSide,
        create_if_missing: bool,
    ) -> Result<Option<PortalKey>, PortalError> {
        self.registry.find_portal(linkage_id, side, create_if_missing)
    }

    /// Active portal whose hole contains a point
    pub fn is_point_in_portal_hole(&self, point: Vec3) -> Option<PortalKey> {
        self.registry
            .iter()
            .find(|(_, p)| p.is_active() && p.hole_contains_point(point))
            .map(|(k, _)| k)
    }

    /// Open portal whose hole an entity's bounds touch
    pub fn is_entity_in_portal_hole(&self, world: &World, entity: EntityKey) -> Option<PortalKey> {
        let bounds = world.bounds(entity)?;
        self.registry
            .open_portals()
            .find(|(_, p)| reaches(&p.hole_obb(), &bounds))
            .map(|(k, _)| k)
    }

    // --- Placement ---

    /// Try to open a portal at a pose
    ///
    /// Rejections are reported in the outcome and as a
    /// [`PortalEvent::PlacementRejected`]. A successful placement moves the
    /// side's portal right away and opens it when the command queue is next
    /// drained.
    pub fn attempt_place_portal(&mut self, world: &mut World, request: &PlacementRequest) -> Result<PlacementOutcome, PortalError> {
        let outcome = self.placement.solve(world.physics(), &self.registry, &self.volumes, request);
        if !outcome.is_success() {
            log::info!(
                "Portal placement for group {} side {:?} rejected: {:?} ({})",
                request.linkage_id,
                request.side,
                outcome.reason,
                outcome.quality
            );
            self.events.emit(PortalEvent::PlacementRejected {
                linkage_id: request.linkage_id,
                reason: outcome.reason,
                quality: outcome.quality,
            });
            return Ok(outcome);
        }

        if let Some(stolen) = outcome.stolen {
            self.apply_fizzle(world, stolen, FizzleReason::Stolen);
        }
        let key = match self.registry.find_portal(request.linkage_id, request.side, true)? {
            Some(key) => key,
            None => self.registry.create(request.linkage_id, request.side)?,
        };
        if self.registry.get(key).is_some_and(Portal::is_active) {
            self.close(world, key);
        }
        self.commands.cancel_placement(key);

        let pose = outcome.pose;
        if let Some(portal) = self.registry.get_mut(key) {
            portal.set_transform(pose);
            portal.set_surface(outcome.surface);
            portal.simulator.move_to(world.physics_mut(), pose.position, pose.angles());
        }
        self.commands.push(PortalCommand::CompletePlacement { portal: key });
        log::info!("Portal {:?} placed at {:?} ({:?})", key, pose.position, outcome.reason);
        Ok(outcome)
    }

    /// Shoot a portal from `eye` along `direction`; `None` when nothing was hit
    pub fn fire_portal(
        &mut self,
        world: &mut World,
        linkage_id: LinkageId,
        side: PortalSide,
        eye: Vec3,
        direction: Vec3,
    ) -> Result<Option<PlacementOutcome>, PortalError> {
        let Some(pose) = self.placement.aim(world.physics(), eye, direction, &self.config.teleport) else {
            return Ok(None);
        };
        let request = PlacementRequest::from_pose(linkage_id, side, &pose, PlacedBy::Player).with_shot_origin(eye);
        self.attempt_place_portal(world, &request).map(Some)
    }

    /// Close a portal at the next drain point
    pub fn fizzle(&mut self, portal: PortalKey, reason: FizzleReason) {
        self.commands.push(PortalCommand::Fizzle { portal, reason });
    }

    /// Remove a portal at the next drain point
    pub fn remove_portal(&mut self, portal: PortalKey) {
        self.commands.push(PortalCommand::Remove { portal });
    }

    // --- Grabbing ---

    pub fn pick_up(&mut self, world: &mut World, holder: EntityKey, held: EntityKey, across: bool) -> Result<(), PortalError> {
        if across && !world.is_teleportable(held) {
            return Err(PortalError::NotTeleportable(held));
        }
        self.grabs.pick_up(world, holder, held, across)?;
        if across {
            // The holder looks through the portal nearest its view
            let target = self.grabs.update_target(world, &self.registry, holder, &self.config.grab);
            if target.is_err() {
                let releases = self.grabs.validate_links(world, &self.registry, &self.config.grab);
                self.emit_releases(releases);
            }
        }
        Ok(())
    }

    /// Pick up whatever the holder is looking at, through portals too
    pub fn use_pickup(&mut self, world: &mut World, holder: EntityKey) -> Result<Option<EntityKey>, PortalError> {
        let Some(target) = self
            .grabs
            .find_pickup_target(world, &self.registry, holder, self.config.grab.pickup_range)
        else {
            return Ok(None);
        };
        self.pick_up(world, holder, target.entity, target.across)?;
        Ok(Some(target.entity))
    }

    pub fn drop_object(&mut self, world: &mut World, holder: EntityKey) -> Result<(), PortalError> {
        let release = self.grabs.drop_object(world, holder, self.config.grab.drop_unstuck_radius)?;
        self.emit_releases(vec![release]);
        Ok(())
    }

    pub fn throw_object(&mut self, world: &mut World, holder: EntityKey, velocity: Vec3) -> Result<(), PortalError> {
        let release = self
            .grabs
            .throw_object(world, holder, velocity, self.config.grab.drop_unstuck_radius)?;
        self.emit_releases(vec![release]);
        Ok(())
    }

    /// Remove an entity from the world and from every portal subsystem
    pub fn remove_entity(&mut self, world: &mut World, entity: EntityKey) {
        let releases = self.grabs.forget_entity(world, entity);
        self.emit_releases(releases);
        self.teleporter.discard_entity(entity);
        self.arbiter.forget_entity(&mut self.registry, entity);
        world.remove_entity(entity);
    }

    // --- Tick ---

    /// Steer held objects before the physics step
    pub fn pre_physics(&mut self, world: &mut World, dt: f32) {
        let releases = self.grabs.drive(world, &self.registry, &self.config.grab, dt);
        self.emit_releases(releases);
    }

    /// Everything that follows the physics step
    pub fn post_physics(&mut self, world: &mut World, _dt: f32) {
        self.arbiter.begin_callback();
        self.teleporter.detect(world, &self.registry, &mut self.arbiter, &self.config);
        let deferred = self.arbiter.end_callback(world, &mut self.registry);
        self.emit_all(deferred);

        let skip = self.teleporter.queued_entities();
        let arbitrated = self.arbiter.arbitrate(world, &mut self.registry, &self.config.simulator, &skip);
        self.emit_all(arbitrated);

        let teleported = self
            .teleporter
            .flush(world, &mut self.registry, &mut self.arbiter, &self.config.teleport);
        for event in &teleported {
            if let PortalEvent::EntityTeleported { entity, from, to, .. } = *event {
                self.grabs.on_teleport(entity, from, to);
            }
        }
        self.emit_all(teleported);

        self.validate_portals(world);
        self.drain_commands(world);

        let stuck = self.arbiter.fix_stuck_entities(world, &self.config.simulator);
        self.emit_all(stuck);
        self.teleporter.release_forced_crouch(world, &self.arbiter);

        let releases = self.grabs.validate_links(world, &self.registry, &self.config.grab);
        self.emit_releases(releases);
    }

    /// Queue fizzles for portals that lost their footing and update detectors
    fn validate_portals(&mut self, world: &World) {
        let physics = world.physics();
        let mut fizzles = Vec::new();
        for (key, portal) in self.registry.iter().filter(|(_, p)| p.is_active()) {
            if portal.surface().is_some_and(|s| physics.static_collider(s).is_none()) {
                fizzles.push((key, FizzleReason::SurfaceLost));
                continue;
            }
            let filter = TraceFilter::new(CollisionFilter::new(CollisionLayer::ALL, CollisionLayer::ALL));
            let intruded = physics.overlap_obb(&portal.hole_obb(), &filter).into_iter().any(|t| match t {
                TraceTarget::Body(body) => physics.get_body(body).is_some_and(|b| b.is_kinematic()),
                _ => false,
            });
            if intruded {
                fizzles.push((key, FizzleReason::MovingBrush));
            }
        }

        for (_, entity) in world.iter() {
            let Some(player) = &entity.player else {
                continue;
            };
            let touching = entity
                .physics_body
                .and_then(|b| physics.get_body(b))
                .is_some_and(|b| self.volumes.cleanser_touching(&b.bounds()).is_some());
            if touching {
                fizzles.extend(
                    self.registry
                        .iter()
                        .filter(|(_, p)| p.is_active() && p.linkage_id == player.linkage_id)
                        .map(|(k, _)| (k, FizzleReason::Cleanser)),
                );
            }
        }

        for (portal, reason) in fizzles {
            if !self.commands.contains(&PortalCommand::Fizzle { portal, reason }) {
                self.fizzle(portal, reason);
            }
        }

        let active: Vec<(PortalKey, Vec3, LinkageId)> = self
            .registry
            .iter()
            .filter(|(_, p)| p.is_active())
            .map(|(k, p)| (k, p.origin(), p.linkage_id))
            .collect();
        let detected = self.volumes.update_detectors(&active);
        self.emit_all(detected);
    }

    /// Apply every queued command
    pub fn drain_commands(&mut self, world: &mut World) {
        while let Some(command) = self.commands.pop() {
            match command {
                PortalCommand::Fizzle { portal, reason } => self.apply_fizzle(world, portal, reason),
                PortalCommand::Remove { portal } => self.apply_remove(world, portal),
                PortalCommand::CompletePlacement { portal } => self.complete_placement(world, portal),
            }
        }
    }

    // --- Structural changes ---

    fn complete_placement(&mut self, world: &mut World, key: PortalKey) {
        let Some(linkage_id) = self.registry.get(key).map(|p| p.linkage_id) else {
            return;
        };
        for displaced in self.registry.activate(key) {
            self.release_portal(world, displaced);
            self.events.emit(PortalEvent::Deactivated { portal: displaced });
        }
        log::info!("Portal {:?} activated", key);
        self.events.emit(PortalEvent::Activated { portal: key });
        let changes = self.registry.relink(linkage_id);
        self.handle_link_changes(world, changes);
        // Partner geometry follows the new pose even when the link itself did not change
        if let Some(partner) = self.registry.get(key).and_then(|p| p.linked()) {
            sync_attachment(&mut self.registry, world.physics_mut(), key);
            sync_attachment(&mut self.registry, world.physics_mut(), partner);
        }
    }

    fn apply_fizzle(&mut self, world: &mut World, key: PortalKey, reason: FizzleReason) {
        let cancelled = self.commands.cancel_placement(key);
        let was_active = self.registry.get(key).is_some_and(Portal::is_active);
        if !was_active && !cancelled {
            return;
        }
        if was_active {
            self.close(world, key);
        }
        log::info!("Portal {:?} fizzled: {:?}", key, reason);
        self.events.emit(PortalEvent::Fizzled { portal: key, reason, effect: reason.effect() });
    }

    fn apply_remove(&mut self, world: &mut World, key: PortalKey) {
        if !self.registry.contains(key) {
            return;
        }
        if self.registry.get(key).is_some_and(Portal::is_active) {
            self.close(world, key);
            self.events.emit(PortalEvent::Fizzled {
                portal: key,
                reason: FizzleReason::Removed,
                effect: FizzleReason::Removed.effect(),
            });
        }
        self.commands.forget_portal(key);
        if let Some((mut portal, changes)) = self.registry.remove(key) {
            portal.simulator.destroy(world.physics_mut());
            self.handle_link_changes(world, changes);
        }
        log::debug!("Portal {:?} removed", key);
    }

    /// Deactivate an open or active portal and unlink its group
    fn close(&mut self, world: &mut World, key: PortalKey) {
        self.release_portal(world, key);
        let Some(linkage_id) = self.registry.get(key).map(|p| p.linkage_id) else {
            return;
        };
        if self.registry.deactivate(key) {
            self.events.emit(PortalEvent::Deactivated { portal: key });
        }
        let changes = self.registry.relink(linkage_id);
        self.handle_link_changes(world, changes);
    }

    /// Drop everything a portal is simulating or about to teleport
    fn release_portal(&mut self, world: &mut World, key: PortalKey) {
        let released = self.arbiter.forget_portal(world, &mut self.registry, key);
        self.emit_all(released);
        self.teleporter.discard_portal(key);
    }

    fn handle_link_changes(&mut self, world: &mut World, changes: Vec<LinkChange>) {
        for change in changes {
            match change {
                LinkChange::Linked(a, b) => {
                    sync_attachment(&mut self.registry, world.physics_mut(), a);
                    sync_attachment(&mut self.registry, world.physics_mut(), b);
                    self.events.emit(PortalEvent::Linked { portal: a, partner: b });
                }
                LinkChange::Unlinked(key) => {
                    self.release_portal(world, key);
                    sync_attachment(&mut self.registry, world.physics_mut(), key);
                    self.events.emit(PortalEvent::Unlinked { portal: key });
                }
            }
        }
        let releases = self.grabs.validate_links(world, &self.registry, &self.config.grab);
        self.emit_releases(releases);
    }

    // --- Level lifetime ---

    /// Drop every portal, hold and pending change; call on level unload
    pub fn clear(&mut self, world: &mut World) {
        self.grabs.clear(world);
        for mut portal in self.registry.clear() {
            portal.simulator.destroy(world.physics_mut());
        }
        self.arbiter.clear();
        self.teleporter.clear();
        self.commands.clear();
        self.events.clear();
    }

    pub fn snapshot(&self) -> PortalSave {
        PortalSave::capture(&self.registry)
    }

    /// Replace every portal with the saved ones and relink them
    pub fn restore(&mut self, world: &mut World, save: &PortalSave) -> Result<(), PortalError> {
        self.clear(world);
        let mut groups = Vec::new();
        for snapshot in &save.portals {
            let key = self.registry.create(snapshot.linkage_id, snapshot.side)?;
            let pose = Transform3D::from_origin_angles(snapshot.origin, snapshot.angles);
            let surface = self.placement.backing_surface(world.physics(), &pose);
            if let Some(portal) = self.registry.get_mut(key) {
                portal.set_hole_size(snapshot.half_width, snapshot.half_height)?;
                portal.color_index = snapshot.color_index;
                portal.set_transform(pose);
                portal.set_surface(surface);
                portal.simulator.move_to(world.physics_mut(), pose.position, pose.angles());
            }
            if snapshot.active {
                self.registry.activate(key);
            }
            if !groups.contains(&snapshot.linkage_id) {
                groups.push(snapshot.linkage_id);
            }
        }
        for linkage_id in groups {
            let changes = self.registry.relink(linkage_id);
            self.handle_link_changes(world, changes);
        }
        log::info!("Restored {} portals", save.portals.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volumes::{Volume, VolumeKind};
    use crate::placement::PlacementReason;
    use portalsim_core::{Angles, Entity, PhysicsConfig, Quat, RigidBody};
    use portalsim_physics::{ColliderKey, Obb, PlayerHull, StaticCollider, SurfaceMaterial};

    const DT: f32 = 1.0 / 60.0;

    /// Wall whose face is at x = 192, facing -X
    fn setup() -> (World, PortalSystem, ColliderKey) {
        let mut world = World::new().with_physics(PhysicsConfig::new(0.0));
        let wall = world.physics_mut().add_static_collider(StaticCollider::aabb(
            Vec3::new(200.0, 0.0, 128.0),
            Vec3::new(8.0, 256.0, 256.0),
            SurfaceMaterial::CONCRETE,
        ));
        (world, PortalSystem::new(PortalConfig::default()).unwrap(), wall)
    }

    fn place(system: &mut PortalSystem, world: &mut World, side: PortalSide, y: f32) -> PlacementOutcome {
        let request = PlacementRequest::new(
            1,
            side,
            Vec3::new(191.5, y, 128.0),
            Angles::new(0.0, 180.0, 0.0),
            PlacedBy::Player,
        );
        system.attempt_place_portal(world, &request).unwrap()
    }

    fn key(system: &PortalSystem, side: PortalSide) -> PortalKey {
        system.registry().find_existing(1, side).unwrap()
    }

    fn open_pair(system: &mut PortalSystem, world: &mut World) -> (PortalKey, PortalKey) {
        place(system, world, PortalSide::A, -150.0);
        place(system, world, PortalSide::B, 150.0);
        system.post_physics(world, DT);
        (key(system, PortalSide::A), key(system, PortalSide::B))
    }

    fn fizzled(events: &[PortalEvent], portal: PortalKey) -> Option<FizzleReason> {
        events.iter().find_map(|e| match *e {
            PortalEvent::Fizzled { portal: p, reason, .. } if p == portal => Some(reason),
            _ => None,
        })
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let mut config = PortalConfig::default();
        config.hole.half_width = 0.0;
        assert!(matches!(PortalSystem::new(config), Err(PortalError::InvalidGeometry { .. })));
    }

    #[test]
    fn test_placement_opens_on_drain_and_links() {
        let (mut world, mut system, wall) = setup();
        let outcome = place(&mut system, &mut world, PortalSide::A, -150.0);
        assert_eq!(outcome.reason, PlacementReason::Success);
        let a = key(&system, PortalSide::A);
        assert!(!system.portal(a).unwrap().is_active());
        assert!(system.commands().has_pending_placement(a));

        system.drain_commands(&mut world);
        let portal = system.portal(a).unwrap();
        assert!(portal.is_active());
        assert!(!portal.is_open());
        assert_eq!(portal.surface(), Some(wall));

        place(&mut system, &mut world, PortalSide::B, 150.0);
        system.post_physics(&mut world, DT);
        let b = key(&system, PortalSide::B);
        assert_eq!(system.portal(a).unwrap().linked(), Some(b));
        assert_eq!(system.portal(b).unwrap().linked(), Some(a));
        assert!(system.registry().links_are_symmetric());
        assert!(system
            .events()
            .iter()
            .any(|e| matches!(*e, PortalEvent::Linked { portal, partner } if portal == a && partner == b || portal == b && partner == a)));
    }

    #[test]
    fn test_overlap_rejection_opens_nothing() {
        let (mut world, mut system, _) = setup();
        place(&mut system, &mut world, PortalSide::A, 0.0);
        system.drain_commands(&mut world);

        let request = PlacementRequest::new(1, PortalSide::B, Vec3::new(191.5, 10.0, 128.0), Angles::new(0.0, 180.0, 0.0), PlacedBy::Designer);
        let outcome = system.attempt_place_portal(&mut world, &request).unwrap();
        assert_eq!(outcome.reason, PlacementReason::Overlap);
        assert!((outcome.quality - 0.027).abs() < 1e-6);
        assert!(system.registry().find_existing(1, PortalSide::B).is_none());
        assert!(system.events().iter().any(|e| matches!(e, PortalEvent::PlacementRejected { reason: PlacementReason::Overlap, .. })));
        assert!(system.commands().is_empty());
    }

    #[test]
    fn test_steal_fizzles_counterpart() {
        let (mut world, mut system, _) = setup();
        place(&mut system, &mut world, PortalSide::A, 0.0);
        system.drain_commands(&mut world);
        let a = key(&system, PortalSide::A);

        let outcome = place(&mut system, &mut world, PortalSide::B, 2.0);
        assert_eq!(outcome.reason, PlacementReason::Stolen);
        assert_eq!(outcome.stolen, Some(a));
        assert!(!system.portal(a).unwrap().is_active());
        assert_eq!(fizzled(system.events(), a), Some(FizzleReason::Stolen));

        system.drain_commands(&mut world);
        assert!(system.portal(key(&system, PortalSide::B)).unwrap().is_active());
    }

    #[test]
    fn test_replacing_an_active_portal_keeps_it_linked() {
        let (mut world, mut system, _) = setup();
        let (a, b) = open_pair(&mut system, &mut world);
        place(&mut system, &mut world, PortalSide::A, -60.0);
        assert!(!system.portal(a).unwrap().is_active());
        assert_eq!(system.portal(b).unwrap().linked(), None);

        system.drain_commands(&mut world);
        assert_eq!(key(&system, PortalSide::A), a);
        assert_eq!(system.portal(b).unwrap().linked(), Some(a));
        assert!(system.portal(a).unwrap().origin().approx_eq(Vec3::new(191.5, -60.0, 128.0), 0.01));
    }

    #[test]
    fn test_fizzle_before_completion_emits_once() {
        let (mut world, mut system, _) = setup();
        let (a, _) = open_pair(&mut system, &mut world);
        system.drain_events();

        system.fizzle(a, FizzleReason::Explicit);
        system.fizzle(a, FizzleReason::Explicit);
        system.drain_commands(&mut world);
        let events = system.drain_events();
        let count = events.iter().filter(|e| matches!(e, PortalEvent::Fizzled { .. })).count();
        assert_eq!(count, 1);
        assert!(events.iter().any(|e| matches!(*e, PortalEvent::Unlinked { .. })));
    }

    #[test]
    fn test_remove_unlinks_partner() {
        let (mut world, mut system, _) = setup();
        let (a, b) = open_pair(&mut system, &mut world);
        system.remove_portal(a);
        system.drain_commands(&mut world);
        assert!(!system.registry().contains(a));
        assert_eq!(system.portal(b).unwrap().linked(), None);
        assert!(system.portal(b).unwrap().is_active());
        assert!(system.events().iter().any(|e| *e == PortalEvent::Unlinked { portal: b }));
    }

    #[test]
    fn test_lost_surface_fizzles() {
        let (mut world, mut system, wall) = setup();
        let (a, b) = open_pair(&mut system, &mut world);
        world.physics_mut().remove_static_collider(wall);
        system.post_physics(&mut world, DT);
        assert_eq!(fizzled(system.events(), a), Some(FizzleReason::SurfaceLost));
        assert_eq!(fizzled(system.events(), b), Some(FizzleReason::SurfaceLost));
        assert!(system.registry().open_portals().next().is_none());
    }

    #[test]
    fn test_forced_helper_portal_fizzles_when_surface_goes() {
        let (mut world, mut system, wall) = setup();
        let helper_pose = Transform3D::from_origin_angles(Vec3::new(191.5, -100.0, 128.0), Angles::new(0.0, 180.0, 0.0));
        system.volumes_mut().add(Volume::new(
            Obb::new(helper_pose.position, Vec3::splat(32.0), Quat::IDENTITY),
            VolumeKind::PlacementHelper { radius: 128.0, pose: helper_pose, linkage: None, force: true },
        ));
        let outcome = place(&mut system, &mut world, PortalSide::A, -150.0);
        assert_eq!(outcome.reason, PlacementReason::Helper);
        system.post_physics(&mut world, DT);
        let a = key(&system, PortalSide::A);
        assert!(system.portal(a).unwrap().is_active());

        world.physics_mut().remove_static_collider(wall);
        system.post_physics(&mut world, DT);
        assert_eq!(fizzled(system.events(), a), Some(FizzleReason::SurfaceLost));
    }

    #[test]
    fn test_moving_brush_in_hole_fizzles() {
        let (mut world, mut system, _) = setup();
        let (a, _) = open_pair(&mut system, &mut world);
        world.spawn_with_body(Entity::prop(), RigidBody::new_kinematic_aabb(Vec3::new(188.0, -150.0, 128.0), Vec3::splat(8.0)));
        system.post_physics(&mut world, DT);
        assert_eq!(fizzled(system.events(), a), Some(FizzleReason::MovingBrush));
    }

    #[test]
    fn test_cleanser_fizzles_players_portals() {
        let (mut world, mut system, _) = setup();
        let (a, b) = open_pair(&mut system, &mut world);
        let hull = PlayerHull::default();
        world.spawn_with_body(Entity::player(1), RigidBody::new_aabb(Vec3::new(0.0, 0.0, 64.0), hull.standing));
        system.volumes_mut().add(Volume::new(
            Obb::new(Vec3::new(0.0, 0.0, 64.0), Vec3::new(4.0, 128.0, 128.0), Quat::IDENTITY),
            VolumeKind::Cleanser,
        ));
        system.post_physics(&mut world, DT);
        assert_eq!(fizzled(system.events(), a), Some(FizzleReason::Cleanser));
        assert_eq!(fizzled(system.events(), b), Some(FizzleReason::Cleanser));
    }

    #[test]
    fn test_point_and_entity_in_hole() {
        let (mut world, mut system, _) = setup();
        let (a, _) = open_pair(&mut system, &mut world);
        assert_eq!(system.is_point_in_portal_hole(Vec3::new(191.5, -150.0, 128.0)), Some(a));
        assert_eq!(system.is_point_in_portal_hole(Vec3::new(100.0, -150.0, 128.0)), None);

        let prop = world.spawn_with_body(Entity::prop(), RigidBody::new_aabb(Vec3::new(185.0, -150.0, 128.0), Vec3::splat(10.0)));
        assert_eq!(system.is_entity_in_portal_hole(&world, prop), Some(a));
    }

    #[test]
    fn test_snapshot_restores_linked_pair() {
        let (mut world, mut system, wall) = setup();
        let (a, _) = open_pair(&mut system, &mut world);
        system.registry.get_mut(a).unwrap().color_index = 7;
        let save = system.snapshot();

        system.clear(&mut world);
        assert!(system.registry().is_empty());
        system.restore(&mut world, &save).unwrap();

        let a = key(&system, PortalSide::A);
        let b = key(&system, PortalSide::B);
        assert_eq!(system.portal(a).unwrap().linked(), Some(b));
        assert_eq!(system.portal(a).unwrap().color_index, 7);
        assert_eq!(system.portal(a).unwrap().surface(), Some(wall));
        assert!(system.registry().links_are_symmetric());
        let again = system.snapshot();
        assert_eq!(again.portals.len(), 2);
        for (before, after) in save.portals.iter().zip(&again.portals) {
            assert_eq!((before.linkage_id, before.side, before.active), (after.linkage_id, after.side, after.active));
            assert!(before.origin.approx_eq(after.origin, 0.01));
        }
    }

    #[test]
    fn test_remove_entity_drops_everything() {
        let (mut world, mut system, _) = setup();
        open_pair(&mut system, &mut world);
        let prop = world.spawn_with_body(Entity::prop(), RigidBody::new_aabb(Vec3::new(170.0, -150.0, 128.0), Vec3::splat(10.0)));
        system.post_physics(&mut world, DT);
        assert!(system.arbiter().owner(prop).is_some());

        system.remove_entity(&mut world, prop);
        assert!(!world.contains(prop));
        assert!(system.arbiter().owner(prop).is_none());
        assert!(system.arbiter().is_partition(system.registry()));
    }
}
