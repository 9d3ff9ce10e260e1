//! Portal type and hole geometry
//!
//! A portal's local frame puts the hole in the (left, up) plane with the
//! normal along forward. Hole coordinates `(u, v)` are the local left and up
//! components.

use portalsim_core::{Angles, Transform3D};
use portalsim_math::{Mat4, Rect, Vec3};
use portalsim_physics::{Aabb, ColliderKey, Obb, Plane};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::config::{validate_hole, HoleConfig, SimulatorConfig};
use crate::error::PortalError;
use crate::simulator::PortalSimulator;
use crate::transform_solver::LinkTransform;

new_key_type! {
    /// Generational key to a portal in the registry
    pub struct PortalKey;
}

/// Linkage group identifier
pub type LinkageId = u32;

/// Which end of a linkage group a portal is
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PortalSide {
    A,
    B,
}

impl PortalSide {
    pub fn opposite(self) -> Self {
        match self {
            PortalSide::A => PortalSide::B,
            PortalSide::B => PortalSide::A,
        }
    }
}

/// A portal: pose, hole, activation, link and its simulator
#[derive(Debug)]
pub struct Portal {
    pub linkage_id: LinkageId,
    pub side: PortalSide,
    /// Cosmetic color slot, replicated and persisted only
    pub color_index: u8,
    transform: Transform3D,
    half_width: f32,
    half_height: f32,
    half_depth: f32,
    active: bool,
    linked: Option<PortalKey>,
    link: LinkTransform,
    /// Static collider the portal was opened on
    surface: Option<ColliderKey>,
    pub(crate) simulator: PortalSimulator,
}

impl Portal {
    /// Create an inactive portal at the origin
    ///
    /// Fails with `InvalidGeometry` for holes that are not finite and positive.
    pub fn new(
        linkage_id: LinkageId,
        side: PortalSide,
        hole: &HoleConfig,
        simulator: &SimulatorConfig,
    ) -> Result<Self, PortalError> {
        hole.validate()?;
        let transform = Transform3D::identity();
        Ok(Self {
            linkage_id,
            side,
            color_index: match side {
                PortalSide::A => 0,
                PortalSide::B => 1,
            },
            transform,
            half_width: hole.half_width,
            half_height: hole.half_height,
            half_depth: hole.half_depth,
            active: false,
            linked: None,
            link: LinkTransform::default(),
            surface: None,
            simulator: PortalSimulator::new(transform, hole.half_width, hole.half_height, simulator.clone())?,
        })
    }

    /// Resize the hole; refused for degenerate sizes
    pub fn set_hole_size(&mut self, half_width: f32, half_height: f32) -> Result<(), PortalError> {
        validate_hole(half_width, half_height)?;
        self.simulator.set_hole_size(half_width, half_height)?;
        self.half_width = half_width;
        self.half_height = half_height;
        Ok(())
    }

    #[inline]
    pub fn transform(&self) -> &Transform3D {
        &self.transform
    }

    pub fn origin(&self) -> Vec3 {
        self.transform.position
    }

    pub fn angles(&self) -> Angles {
        self.transform.angles()
    }

    /// Outward facing normal
    pub fn normal(&self) -> Vec3 {
        self.transform.forward()
    }

    pub fn plane(&self) -> Plane {
        Plane::from_point_normal(self.transform.position, self.normal())
    }

    pub fn half_width(&self) -> f32 {
        self.half_width
    }

    pub fn half_height(&self) -> f32 {
        self.half_height
    }

    pub fn half_depth(&self) -> f32 {
        self.half_depth
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn linked(&self) -> Option<PortalKey> {
        self.linked
    }

    /// Active with a partner: the only state in which things pass through
    pub fn is_open(&self) -> bool {
        self.active && self.linked.is_some()
    }

    /// Matrix taking world space at this portal to world space at its partner
    pub fn link_matrix(&self) -> Mat4 {
        self.link.forward
    }

    pub fn link_transform(&self) -> &LinkTransform {
        &self.link
    }

    pub fn surface(&self) -> Option<ColliderKey> {
        self.surface
    }

    pub fn simulator(&self) -> &PortalSimulator {
        &self.simulator
    }

    pub(crate) fn set_transform(&mut self, transform: Transform3D) {
        self.transform = transform;
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn set_link(&mut self, linked: Option<PortalKey>, link: LinkTransform) {
        self.linked = linked;
        self.link = link;
    }

    pub(crate) fn set_surface(&mut self, surface: Option<ColliderKey>) {
        self.surface = surface;
    }

    // --- Hole geometry ---

    /// World point in hole coordinates: (depth along normal, u, v)
    pub fn to_local(&self, point: Vec3) -> Vec3 {
        self.transform.inverse_transform_point(point)
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.plane().signed_distance(point)
    }

    /// The hole as a rectangle in (u, v)
    pub fn hole_rect(&self) -> Rect {
        Rect::from_center_half(0.0, 0.0, self.half_width, self.half_height)
    }

    /// Whether a point's projection onto the plane falls inside the hole
    pub fn projects_into_hole(&self, point: Vec3) -> bool {
        let local = self.to_local(point);
        self.hole_rect().contains(local.y, local.z)
    }

    /// Whether a point lies inside the thin hole volume
    pub fn hole_contains_point(&self, point: Vec3) -> bool {
        let local = self.to_local(point);
        local.x.abs() <= self.half_depth && self.hole_rect().contains(local.y, local.z)
    }

    /// The portal volume used for placement and overlap tests
    pub fn hole_obb(&self) -> Obb {
        Obb::new(
            self.transform.position,
            Vec3::new(self.half_depth, self.half_width, self.half_height),
            self.transform.rotation,
        )
    }

    /// Hole rectangle extruded from `behind` units behind the plane to `front` in front
    pub fn extruded_obb(&self, behind: f32, front: f32) -> Obb {
        let local = Aabb::new(
            Vec3::new(-behind, -self.half_width, -self.half_height),
            Vec3::new(front, self.half_width, self.half_height),
        );
        Obb::new(
            self.transform.transform_point(local.center()),
            local.half_extents(),
            self.transform.rotation,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portalsim_physics::{collide, Collider};

    fn floor_portal() -> Portal {
        let mut portal =
            Portal::new(1, PortalSide::A, &HoleConfig::default(), &SimulatorConfig::default()).unwrap();
        portal.set_transform(Transform3D::from_origin_angles(Vec3::ZERO, Angles::new(-90.0, 0.0, 0.0)));
        portal
    }

    #[test]
    fn test_degenerate_hole_refused() {
        let hole = HoleConfig { half_width: 0.0, ..HoleConfig::default() };
        let result = Portal::new(1, PortalSide::A, &hole, &SimulatorConfig::default());
        assert!(matches!(result, Err(PortalError::InvalidGeometry { .. })));

        let mut portal = floor_portal();
        assert!(portal.set_hole_size(32.0, -4.0).is_err());
        assert_eq!(portal.half_height(), 54.0);
    }

    #[test]
    fn test_new_portal_is_closed() {
        let portal = floor_portal();
        assert!(!portal.is_active());
        assert!(!portal.is_open());
        assert_eq!(portal.linked(), None);
    }

    #[test]
    fn test_floor_portal_normal_and_distance() {
        let portal = floor_portal();
        assert!(portal.normal().approx_eq(Vec3::UP, 0.0001));
        assert!((portal.signed_distance(Vec3::new(0.0, 0.0, 10.0)) - 10.0).abs() < 0.0001);
        assert!(portal.signed_distance(Vec3::new(5.0, 5.0, -3.0)) < 0.0);
    }

    #[test]
    fn test_hole_bounds_are_two_dimensional() {
        let portal = floor_portal();
        // Floor portal: left = +Y, up = -X
        assert!(portal.projects_into_hole(Vec3::new(50.0, 30.0, 100.0)));
        assert!(!portal.projects_into_hole(Vec3::new(0.0, 40.0, 0.0)));
        assert!(portal.hole_contains_point(Vec3::new(-50.0, 0.0, 1.0)));
        assert!(!portal.hole_contains_point(Vec3::new(-50.0, 0.0, 3.0)));
    }

    #[test]
    fn test_extruded_obb_spans_front_only() {
        let portal = floor_portal();
        let obb = portal.extruded_obb(0.0, 64.0);
        assert!(obb.center.approx_eq(Vec3::new(0.0, 0.0, 32.0), 0.0001));
        let above = Collider::Sphere(portalsim_physics::Sphere::new(Vec3::new(0.0, 0.0, 60.0), 2.0));
        let below = Collider::Sphere(portalsim_physics::Sphere::new(Vec3::new(0.0, 0.0, -10.0), 2.0));
        assert!(collide(&Collider::Obb(obb), &above).is_some_and(|c| c.is_colliding()));
        assert!(collide(&Collider::Obb(obb), &below).map_or(true, |c| !c.is_colliding()));
    }
}
