//! Per-portal collision environment
//!
//! Each portal owns a [`CollisionEnvironment`] in the physics world. Bodies
//! claimed by the portal are assigned to it and see:
//! - the world, minus every solid static that fills the hole behind the portal
//! - a replica of those statics with the hole cut out, so the rest of the wall
//!   still blocks
//! - once attached, the geometry in front of the partner portal, carried
//!   through the link so it fills the tunnel behind this one
//!
//! All geometry is rebuilt from scratch on every change, so repeating a call
//! with the same arguments yields the same environment.

use std::collections::BTreeSet;

use portalsim_core::{Angles, EntityKey, Transform3D};
use portalsim_math::{Mat4, Rect, Vec3};
use portalsim_physics::{
    collide, Aabb, BodyKey, Collider, ColliderKey, CollisionEnvironment, EnvironmentKey, Obb, PhysicsWorld,
    StaticCollider,
};

use crate::config::{validate_hole, SimulatorConfig};
use crate::error::PortalError;
use crate::linkage::LinkageRegistry;
use crate::portal::PortalKey;
use crate::transform_solver::{apply_point, apply_rotation};

/// Statics flush with the hole edge stay in the world
const EDGE_INSET: f32 = 0.5;

/// Clipped boxes thinner than this are dropped
const MIN_THICKNESS: f32 = 1.0e-3;

#[derive(Debug)]
pub struct PortalSimulator {
    config: SimulatorConfig,
    pose: Transform3D,
    half_width: f32,
    half_height: f32,
    environment: Option<EnvironmentKey>,
    excluded: Vec<ColliderKey>,
    wall: Vec<StaticCollider>,
    linked: Vec<StaticCollider>,
    attached: Option<PortalKey>,
    owned: BTreeSet<EntityKey>,
}

impl PortalSimulator {
    pub fn new(
        pose: Transform3D,
        half_width: f32,
        half_height: f32,
        config: SimulatorConfig,
    ) -> Result<Self, PortalError> {
        validate_hole(half_width, half_height)?;
        Ok(Self {
            config,
            pose,
            half_width,
            half_height,
            environment: None,
            excluded: Vec::new(),
            wall: Vec::new(),
            linked: Vec::new(),
            attached: None,
            owned: BTreeSet::new(),
        })
    }

    pub fn set_hole_size(&mut self, half_width: f32, half_height: f32) -> Result<(), PortalError> {
        validate_hole(half_width, half_height)?;
        self.half_width = half_width;
        self.half_height = half_height;
        Ok(())
    }

    pub fn pose(&self) -> &Transform3D {
        &self.pose
    }

    pub fn environment(&self) -> Option<EnvironmentKey> {
        self.environment
    }

    pub fn attached(&self) -> Option<PortalKey> {
        self.attached
    }

    /// World statics hidden from owned bodies
    pub fn excluded(&self) -> &[ColliderKey] {
        &self.excluded
    }

    /// The wall replica around the hole
    pub fn wall_pieces(&self) -> &[StaticCollider] {
        &self.wall
    }

    /// Partner-side geometry placed behind this portal
    pub fn linked_pieces(&self) -> &[StaticCollider] {
        &self.linked
    }

    // --- Placement ---

    /// Reposition and rebuild the wall replica
    ///
    /// Returns whether any solid geometry backs the hole.
    pub fn move_to(&mut self, physics: &mut PhysicsWorld, origin: Vec3, angles: Angles) -> bool {
        self.pose = Transform3D::from_origin_angles(origin, angles);
        self.rebuild_wall(physics);
        self.sync_environment(physics);
        !self.excluded.is_empty()
    }

    /// Rebuild the wall replica against the current world statics
    pub fn refresh(&mut self, physics: &mut PhysicsWorld) {
        self.rebuild_wall(physics);
        self.sync_environment(physics);
    }

    /// Bring the partner's front geometry into this portal's tunnel
    ///
    /// `to_self` is the partner's link matrix (partner side to this side).
    pub fn attach_to(
        &mut self,
        physics: &mut PhysicsWorld,
        partner: PortalKey,
        partner_pose: &Transform3D,
        partner_half_width: f32,
        partner_half_height: f32,
        to_self: Mat4,
    ) {
        self.attached = Some(partner);
        self.linked = self.partner_geometry(physics, partner_pose, partner_half_width, partner_half_height, to_self);
        self.sync_environment(physics);
        log::debug!("Simulator attached to {:?} with {} linked pieces", partner, self.linked.len());
    }

    pub fn detach(&mut self, physics: &mut PhysicsWorld) {
        if self.attached.take().is_some() {
            self.linked.clear();
            self.sync_environment(physics);
        }
    }

    /// Remove the environment; bodies in it fall back to world geometry
    pub fn destroy(&mut self, physics: &mut PhysicsWorld) {
        if let Some(env) = self.environment.take() {
            physics.remove_environment(env);
        }
        self.owned.clear();
        self.attached = None;
        self.linked.clear();
    }

    // --- Ownership ---

    pub fn owns(&self, entity: EntityKey) -> bool {
        self.owned.contains(&entity)
    }

    pub fn owned(&self) -> impl Iterator<Item = EntityKey> + '_ {
        self.owned.iter().copied()
    }

    pub fn owned_count(&self) -> usize {
        self.owned.len()
    }

    /// Claim an entity and move its body into this environment
    pub fn take_ownership(&mut self, physics: &mut PhysicsWorld, entity: EntityKey, body: Option<BodyKey>) -> bool {
        if self.environment.is_none() {
            self.sync_environment(physics);
        }
        let newly = self.owned.insert(entity);
        if let Some(body) = body {
            physics.set_body_environment(body, self.environment);
        }
        newly
    }

    /// Release an entity; its body returns to world geometry
    pub fn release_ownership(&mut self, physics: &mut PhysicsWorld, entity: EntityKey, body: Option<BodyKey>) -> bool {
        let was_owned = self.owned.remove(&entity);
        if let Some(body) = body {
            let in_ours = physics.get_body(body).is_some_and(|b| b.environment == self.environment);
            if in_ours {
                physics.set_body_environment(body, None);
            }
        }
        was_owned
    }

    /// Drop an entity without touching its body, for entities that are gone
    pub fn forget(&mut self, entity: EntityKey) -> bool {
        self.owned.remove(&entity)
    }

    // --- Geometry ---

    fn hole_rect(&self) -> Rect {
        Rect::from_center_half(0.0, 0.0, self.half_width, self.half_height)
    }

    fn rebuild_wall(&mut self, physics: &PhysicsWorld) {
        let SimulatorConfig { tunnel_depth, replica_extent, .. } = self.config;
        let column = local_to_world(
            &self.pose,
            &Aabb::new(
                Vec3::new(-tunnel_depth, -(self.half_width - EDGE_INSET), -(self.half_height - EDGE_INSET)),
                Vec3::new(0.0, self.half_width - EDGE_INSET, self.half_height - EDGE_INSET),
            ),
        );
        let region = Aabb::new(
            Vec3::new(-tunnel_depth, -replica_extent, -replica_extent),
            Vec3::new(replica_extent, replica_extent, replica_extent),
        );
        let hole = self.hole_rect();

        self.excluded.clear();
        self.wall.clear();
        for (key, s) in physics.static_colliders() {
            if !s.is_solid() || !touches(&column, &s.collider) {
                continue;
            }
            self.excluded.push(key);

            let Some(clipped) = local_bounds(&s.collider, &self.pose, replica_extent * 4.0)
                .and_then(|b| clip(&b, &region))
            else {
                continue;
            };
            let footprint = Rect::new(clipped.min.y, clipped.min.z, clipped.max.y, clipped.max.z);
            for piece in footprint.subtract(&hole) {
                let local = Aabb::new(
                    Vec3::new(clipped.min.x, piece.min_u, piece.min_v),
                    Vec3::new(clipped.max.x, piece.max_u, piece.max_v),
                );
                self.wall.push(StaticCollider {
                    collider: Collider::Obb(local_to_world(&self.pose, &local)),
                    ..s.clone()
                });
            }
        }
    }

    fn partner_geometry(
        &self,
        physics: &PhysicsWorld,
        partner_pose: &Transform3D,
        half_width: f32,
        half_height: f32,
        to_self: Mat4,
    ) -> Vec<StaticCollider> {
        let depth = self.config.tunnel_depth;
        let front = Aabb::new(Vec3::new(0.0, -half_width, -half_height), Vec3::new(depth, half_width, half_height));
        let probe = local_to_world(
            partner_pose,
            &Aabb::new(
                Vec3::new(0.0, -(half_width - EDGE_INSET), -(half_height - EDGE_INSET)),
                Vec3::new(depth, half_width - EDGE_INSET, half_height - EDGE_INSET),
            ),
        );

        let mut pieces = Vec::new();
        for (_, s) in physics.static_colliders() {
            if !s.is_solid() || !touches(&probe, &s.collider) {
                continue;
            }
            let Some(clipped) = local_bounds(&s.collider, partner_pose, depth * 4.0).and_then(|b| clip(&b, &front))
            else {
                continue;
            };
            let there = local_to_world(partner_pose, &clipped);
            let here = Obb::new(
                apply_point(to_self, there.center),
                there.half_extents,
                apply_rotation(to_self, there.rotation),
            );
            pieces.push(StaticCollider {
                collider: Collider::Obb(here),
                ..s.clone()
            });
        }
        pieces
    }

    fn sync_environment(&mut self, physics: &mut PhysicsWorld) {
        let env = match self.environment.filter(|k| physics.environment(*k).is_some()) {
            Some(env) => env,
            None => {
                let env = physics.add_environment(CollisionEnvironment::new());
                self.environment = Some(env);
                env
            }
        };
        let colliders: Vec<StaticCollider> = self.wall.iter().chain(self.linked.iter()).cloned().collect();
        if let Some(environment) = physics.environment_mut(env) {
            environment.rebuild(self.excluded.iter().copied(), colliders);
        }
    }
}

/// Attach a portal's simulator to its current partner, or detach it
pub(crate) fn sync_attachment(registry: &mut LinkageRegistry, physics: &mut PhysicsWorld, key: PortalKey) {
    let partner = registry.get(key).and_then(|p| p.linked()).and_then(|other| {
        registry
            .get(other)
            .map(|o| (other, *o.transform(), o.half_width(), o.half_height(), o.link_matrix()))
    });
    let Some(portal) = registry.get_mut(key) else {
        return;
    };
    match partner {
        Some((other, pose, half_width, half_height, to_self)) => {
            portal.simulator.attach_to(physics, other, &pose, half_width, half_height, to_self)
        }
        None => portal.simulator.detach(physics),
    }
}

fn touches(obb: &Obb, collider: &Collider) -> bool {
    collide(&Collider::Obb(*obb), collider).is_some_and(|c| c.is_colliding())
}

fn local_to_world(frame: &Transform3D, local: &Aabb) -> Obb {
    Obb::new(frame.transform_point(local.center()), local.half_extents(), frame.rotation)
}

fn with_axis(v: Vec3, axis: usize, value: f32) -> Vec3 {
    match axis {
        0 => Vec3::new(value, v.y, v.z),
        1 => Vec3::new(v.x, value, v.z),
        _ => Vec3::new(v.x, v.y, value),
    }
}

/// Bounds of a collider in a frame's local coordinates
///
/// Planes become a box of half size `extent` on their solid side, as long as
/// they line up with one of the frame's axes.
fn local_bounds(collider: &Collider, frame: &Transform3D, extent: f32) -> Option<Aabb> {
    if let Collider::Plane(plane) = collider {
        let normal = frame.inverse_transform_direction(plane.normal);
        let distance = plane.distance - plane.normal.dot(frame.position);
        let axis = (0..3).find(|i| normal.axis(*i).abs() > 0.999)?;
        let (min, max) = (Vec3::splat(-extent), Vec3::splat(extent));
        return Some(if normal.axis(axis) > 0.0 {
            Aabb::new(min, with_axis(max, axis, distance))
        } else {
            Aabb::new(with_axis(min, axis, -distance), max)
        });
    }

    let corners = match collider.as_obb() {
        Some(obb) => obb.corners(),
        None => collider.bounds()?.corners(),
    };
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for corner in corners {
        let local = frame.inverse_transform_point(corner);
        min = min.min_components(local);
        max = max.max_components(local);
    }
    Some(Aabb::new(min, max))
}

/// Intersection of two boxes, if it has volume
fn clip(a: &Aabb, b: &Aabb) -> Option<Aabb> {
    let min = a.min.max_components(b.min);
    let max = a.max.min_components(b.max);
    let size = max - min;
    if size.x <= MIN_THICKNESS || size.y <= MIN_THICKNESS || size.z <= MIN_THICKNESS {
        return None;
    }
    Some(Aabb { min, max })
}

#[cfg(test)]
mod tests {
    use super::*;
    use portalsim_physics::{CollisionFilter, Sphere, SurfaceMaterial};
    use slotmap::SlotMap;

    /// Wall occupying x in [-16, 0], portal on its face at z = 128
    fn world_with_wall() -> (PhysicsWorld, ColliderKey) {
        let mut physics = PhysicsWorld::new();
        let wall = physics.add_static_collider(StaticCollider::aabb(
            Vec3::new(-8.0, 0.0, 256.0),
            Vec3::new(8.0, 512.0, 256.0),
            SurfaceMaterial::CONCRETE,
        ));
        (physics, wall)
    }

    fn simulator() -> PortalSimulator {
        PortalSimulator::new(Transform3D::identity(), 32.0, 54.0, SimulatorConfig::default()).unwrap()
    }

    fn clear_at(physics: &PhysicsWorld, point: Vec3, radius: f32, env: Option<EnvironmentKey>) -> bool {
        let probe = Collider::Sphere(Sphere::new(point, radius));
        physics.is_collider_clear(&probe, &CollisionFilter::prop(), env)
    }

    #[test]
    fn test_degenerate_hole_refused() {
        let result = PortalSimulator::new(Transform3D::identity(), 32.0, 0.0, SimulatorConfig::default());
        assert!(matches!(result, Err(PortalError::InvalidGeometry { .. })));
    }

    #[test]
    fn test_move_to_cuts_hole_in_wall() {
        let (mut physics, wall) = world_with_wall();
        let mut sim = simulator();
        assert!(sim.move_to(&mut physics, Vec3::new(0.5, 0.0, 128.0), Angles::ZERO));

        assert_eq!(sim.excluded(), &[wall]);
        assert_eq!(sim.wall_pieces().len(), 4);
        let env = sim.environment();
        assert!(env.is_some());

        // Inside the hole: blocked by the world, open in the environment
        assert!(!clear_at(&physics, Vec3::new(-8.0, 0.0, 128.0), 6.0, None));
        assert!(clear_at(&physics, Vec3::new(-8.0, 0.0, 128.0), 6.0, env));

        // Beside the hole the replica still blocks
        assert!(!clear_at(&physics, Vec3::new(-8.0, 100.0, 128.0), 6.0, env));
        assert!(!clear_at(&physics, Vec3::new(-8.0, 0.0, 220.0), 6.0, env));
    }

    #[test]
    fn test_move_to_is_idempotent() {
        let (mut physics, _) = world_with_wall();
        let mut sim = simulator();
        sim.move_to(&mut physics, Vec3::new(0.5, 10.0, 128.0), Angles::ZERO);
        let env = sim.environment().unwrap();
        let first = physics.environment(env).unwrap().clone();

        sim.move_to(&mut physics, Vec3::new(0.5, 10.0, 128.0), Angles::ZERO);
        assert_eq!(sim.environment(), Some(env));
        assert_eq!(physics.environment(env).unwrap(), &first);
    }

    #[test]
    fn test_move_to_without_backing_reports_false() {
        let (mut physics, _) = world_with_wall();
        let mut sim = simulator();
        assert!(!sim.move_to(&mut physics, Vec3::new(200.0, 0.0, 128.0), Angles::ZERO));
        assert!(sim.wall_pieces().is_empty());
    }

    #[test]
    fn test_floor_plane_is_replicated() {
        let mut physics = PhysicsWorld::new();
        let floor = physics.add_static_collider(StaticCollider::floor(0.0, SurfaceMaterial::CONCRETE));
        let mut sim = simulator();
        sim.move_to(&mut physics, Vec3::new(0.0, 0.0, 0.5), Angles::new(-90.0, 0.0, 0.0));

        assert_eq!(sim.excluded(), &[floor]);
        assert_eq!(sim.wall_pieces().len(), 4);
        let env = sim.environment();
        assert!(clear_at(&physics, Vec3::new(0.0, 0.0, -10.0), 8.0, env));
        assert!(!clear_at(&physics, Vec3::new(100.0, 0.0, -10.0), 8.0, env));
    }

    #[test]
    fn test_attach_brings_partner_geometry_behind() {
        let (mut physics, _) = world_with_wall();
        // A block standing in front of the partner portal
        physics.add_static_collider(StaticCollider::aabb(
            Vec3::new(1020.5, 0.0, 128.0),
            Vec3::splat(10.0),
            SurfaceMaterial::CONCRETE,
        ));
        let here = Transform3D::from_origin_angles(Vec3::new(0.5, 0.0, 128.0), Angles::ZERO);
        let there = Transform3D::from_origin_angles(Vec3::new(1000.5, 0.0, 128.0), Angles::ZERO);

        let mut sim = simulator();
        sim.move_to(&mut physics, here.position, Angles::ZERO);
        let to_self = crate::transform_solver::portal_matrix(&there, &here);
        let partner = SlotMap::<PortalKey, ()>::with_key().insert(());
        sim.attach_to(&mut physics, partner, &there, 32.0, 54.0, to_self);

        assert_eq!(sim.attached(), Some(partner));
        assert_eq!(sim.linked_pieces().len(), 1);
        let env = sim.environment();
        assert!(!clear_at(&physics, Vec3::new(-19.5, 0.0, 128.0), 2.0, env));
        assert!(clear_at(&physics, Vec3::new(-60.0, 0.0, 128.0), 2.0, env));

        sim.detach(&mut physics);
        assert!(sim.linked_pieces().is_empty());
        assert!(clear_at(&physics, Vec3::new(-19.5, 0.0, 128.0), 2.0, env));
    }

    #[test]
    fn test_ownership_moves_body_environment() {
        let (mut physics, _) = world_with_wall();
        let mut sim = simulator();
        sim.move_to(&mut physics, Vec3::new(0.5, 0.0, 128.0), Angles::ZERO);
        let body = physics.add_body(portalsim_physics::RigidBody::new_sphere(Vec3::new(20.0, 0.0, 128.0), 8.0));
        let entity = SlotMap::<EntityKey, ()>::with_key().insert(());

        assert!(sim.take_ownership(&mut physics, entity, Some(body)));
        assert!(!sim.take_ownership(&mut physics, entity, Some(body)));
        assert!(sim.owns(entity));
        assert_eq!(physics.get_body(body).unwrap().environment, sim.environment());

        assert!(sim.release_ownership(&mut physics, entity, Some(body)));
        assert_eq!(physics.get_body(body).unwrap().environment, None);
        assert_eq!(sim.owned_count(), 0);
    }

    #[test]
    fn test_destroy_removes_environment() {
        let (mut physics, _) = world_with_wall();
        let mut sim = simulator();
        sim.move_to(&mut physics, Vec3::new(0.5, 0.0, 128.0), Angles::ZERO);
        let env = sim.environment().unwrap();
        sim.destroy(&mut physics);
        assert!(physics.environment(env).is_none());
        assert_eq!(sim.environment(), None);
    }
}
