//! Collision detection for 3D shapes
//!
//! Provides collision detection between spheres, AABBs, oriented boxes and
//! planes. Also provides collision filtering via layer masks.
//!
//! Every routine returns a contact whose normal points from the second shape
//! toward the first, so pushing the first shape along `normal * penetration`
//! separates the pair.

use bitflags::bitflags;

use crate::shapes::{Aabb, Collider, Obb, Plane, Sphere};
use portalsim_math::Vec3;

bitflags! {
    /// Collision layers for filtering which objects can collide
    ///
    /// Each layer is a bit in a 32-bit mask. Objects can belong to multiple layers
    /// and can define which layers they collide with via a collision mask.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CollisionLayer: u32 {
        /// Default layer for most objects
        const DEFAULT = 1 << 0;
        /// Player character layer
        const PLAYER = 1 << 1;
        /// Physics props (boxes, balls) that can be picked up
        const PROP = 1 << 2;
        /// Static world geometry (floors, walls)
        const STATIC = 1 << 3;
        /// Trigger zones (detect but don't push)
        const TRIGGER = 1 << 4;
        /// Moving brushes (doors, platforms, track trains)
        const MOVER = 1 << 5;
        /// All layers (collide with everything)
        const ALL = 0xFFFFFFFF;
    }
}

/// Collision filter determining what an object collides with
///
/// Uses a layer/mask system:
/// - `layer`: Which layer(s) this object belongs to
/// - `mask`: Which layer(s) this object can collide with
///
/// Two objects A and B collide if:
/// - (A.layer & B.mask) != 0, AND
/// - (B.layer & A.mask) != 0
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollisionFilter {
    /// Which layer(s) this object belongs to
    pub layer: CollisionLayer,
    /// Which layer(s) this object can collide with
    pub mask: CollisionLayer,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            layer: CollisionLayer::DEFAULT,
            mask: CollisionLayer::ALL,
        }
    }
}

impl CollisionFilter {
    /// Create a new collision filter with specified layer and mask
    pub fn new(layer: CollisionLayer, mask: CollisionLayer) -> Self {
        Self { layer, mask }
    }

    /// Check if this filter allows collision with another filter
    ///
    /// Returns true if both objects' layers match each other's masks.
    pub fn collides_with(&self, other: &Self) -> bool {
        self.layer.intersects(other.mask) && other.layer.intersects(self.mask)
    }

    /// Players collide with everything except other players and triggers
    pub fn player() -> Self {
        Self {
            layer: CollisionLayer::PLAYER,
            mask: CollisionLayer::ALL & !CollisionLayer::PLAYER & !CollisionLayer::TRIGGER,
        }
    }

    /// Props collide with everything except triggers
    pub fn prop() -> Self {
        Self {
            layer: CollisionLayer::PROP,
            mask: CollisionLayer::ALL & !CollisionLayer::TRIGGER,
        }
    }

    /// Create a filter for static world geometry
    ///
    /// Static objects are detected by everything but don't detect anything themselves.
    pub fn static_world() -> Self {
        Self {
            layer: CollisionLayer::STATIC,
            mask: CollisionLayer::ALL,
        }
    }

    /// Moving brushes push players and props but ignore world geometry
    pub fn mover() -> Self {
        Self {
            layer: CollisionLayer::MOVER,
            mask: CollisionLayer::PLAYER | CollisionLayer::PROP | CollisionLayer::DEFAULT,
        }
    }

    /// Create a filter for trigger zones
    ///
    /// Triggers detect specified layers but those layers don't get pushed by triggers.
    pub fn trigger(detects: CollisionLayer) -> Self {
        Self {
            layer: CollisionLayer::TRIGGER,
            mask: detects,
        }
    }

    /// Filter for queries that only care about solid world geometry
    pub fn world_only() -> Self {
        Self {
            layer: CollisionLayer::ALL,
            mask: CollisionLayer::STATIC,
        }
    }
}

/// Contact information from a collision
#[derive(Clone, Copy, Debug)]
pub struct Contact {
    /// Point of contact (on the surface of the first shape)
    pub point: Vec3,
    /// Normal pointing from the second shape toward the first
    pub normal: Vec3,
    /// Penetration depth (positive means overlapping)
    pub penetration: f32,
}

impl Contact {
    /// Create a new contact
    pub fn new(point: Vec3, normal: Vec3, penetration: f32) -> Self {
        Self {
            point,
            normal,
            penetration,
        }
    }

    /// Check if this represents an actual collision (positive penetration)
    pub fn is_colliding(&self) -> bool {
        self.penetration > 0.0
    }

    /// Same contact seen from the other shape
    pub fn flipped(mut self) -> Self {
        self.normal = -self.normal;
        self
    }
}

/// Test sphere vs plane collision
///
/// The contact normal is the plane normal (pointing from the plane toward the sphere).
pub fn sphere_vs_plane(sphere: &Sphere, plane: &Plane) -> Option<Contact> {
    let signed_dist = plane.signed_distance(sphere.center);
    // Works whether the center is above or below the plane
    let penetration = sphere.radius - signed_dist;

    if penetration > 0.0 {
        let normal = plane.normal;
        let point = sphere.center - normal * sphere.radius;
        Some(Contact::new(point, normal, penetration))
    } else {
        None
    }
}

/// Test AABB vs plane collision
///
/// Returns a contact if any part of the AABB is below/intersecting the plane.
pub fn aabb_vs_plane(aabb: &Aabb, plane: &Plane) -> Option<Contact> {
    let center = aabb.center();
    let half_extents = aabb.half_extents();

    // Vertex furthest along -normal
    let closest_vertex = center - half_extents.component_mul(plane.normal.sign());
    let signed_dist = plane.signed_distance(closest_vertex);

    if signed_dist < 0.0 {
        Some(Contact::new(closest_vertex, plane.normal, -signed_dist))
    } else {
        None
    }
}

/// Test oriented box vs plane collision
pub fn obb_vs_plane(obb: &Obb, plane: &Plane) -> Option<Contact> {
    let radius = obb.projected_radius(plane.normal);
    let signed_dist = plane.signed_distance(obb.center) - radius;

    if signed_dist < 0.0 {
        let point = obb.center - plane.normal * radius;
        Some(Contact::new(point, plane.normal, -signed_dist))
    } else {
        None
    }
}

/// Sphere vs sphere collision
///
/// The normal points from `b` toward `a`.
pub fn sphere_vs_sphere(a: &Sphere, b: &Sphere) -> Option<Contact> {
    let delta = a.center - b.center;
    let dist_sq = delta.length_squared();
    let min_dist = a.radius + b.radius;

    if dist_sq >= min_dist * min_dist {
        return None;
    }

    let dist = dist_sq.sqrt();
    let normal = if dist > 0.0001 { delta / dist } else { Vec3::UP };
    let point = a.center - normal * a.radius;
    Some(Contact::new(point, normal, min_dist - dist))
}

/// Test sphere vs AABB collision
///
/// The normal points from the AABB toward the sphere.
pub fn sphere_vs_aabb(sphere: &Sphere, aabb: &Aabb) -> Option<Contact> {
    let closest = aabb.closest_point(sphere.center);
    let delta = sphere.center - closest;
    let dist_squared = delta.length_squared();

    if dist_squared >= sphere.radius * sphere.radius {
        return None;
    }

    let dist = dist_squared.sqrt();
    if dist > 0.0001 {
        return Some(Contact::new(closest, delta / dist, sphere.radius - dist));
    }

    // Center is inside the box: escape through the nearest face
    let to_min = sphere.center - aabb.min;
    let to_max = aabb.max - sphere.center;
    let mut min_dist = to_min.x;
    let mut normal = -Vec3::X;

    let candidates = [
        (to_max.x, Vec3::X),
        (to_min.y, -Vec3::Y),
        (to_max.y, Vec3::Y),
        (to_min.z, -Vec3::Z),
        (to_max.z, Vec3::Z),
    ];
    for (d, n) in candidates {
        if d < min_dist {
            min_dist = d;
            normal = n;
        }
    }

    Some(Contact::new(closest, normal, sphere.radius + min_dist))
}

/// Test sphere vs oriented box collision
///
/// Solved in the box's local frame, where it is an AABB.
pub fn sphere_vs_obb(sphere: &Sphere, obb: &Obb) -> Option<Contact> {
    let local_sphere = Sphere::new(obb.to_local(sphere.center), sphere.radius);
    let local_box = Aabb::from_center_half_extents(Vec3::ZERO, obb.half_extents);

    sphere_vs_aabb(&local_sphere, &local_box).map(|c| {
        Contact::new(obb.to_world(c.point), obb.rotation.rotate(c.normal), c.penetration)
    })
}

/// Test AABB vs AABB collision
///
/// Returns a contact if the AABBs are intersecting. The normal is the axis of
/// least overlap, pointing from `b` toward `a`.
pub fn aabb_vs_aabb(a: &Aabb, b: &Aabb) -> Option<Contact> {
    if !a.intersects(b) {
        return None;
    }

    let overlap = a.max.min_components(b.max) - a.min.max_components(b.min);
    let a_center = a.center();
    let b_center = b.center();

    let mut min_overlap = overlap.x.max(0.0);
    let mut axis = 0;
    for i in 1..3 {
        let o = overlap.axis(i).max(0.0);
        if o < min_overlap {
            min_overlap = o;
            axis = i;
        }
    }

    let unit = [Vec3::X, Vec3::Y, Vec3::Z][axis];
    let normal = if a_center.axis(axis) < b_center.axis(axis) {
        -unit
    } else {
        unit
    };

    // Contact point at the center of the overlap region
    let overlap_min = a.min.max_components(b.min);
    let overlap_max = a.max.min_components(b.max);
    let point = (overlap_min + overlap_max) * 0.5;

    Some(Contact::new(point, normal, min_overlap))
}

/// Test oriented box vs oriented box collision with the separating axis test
///
/// Face axes of both boxes are tried first, then the nine edge cross products.
/// The normal is the axis of least penetration, pointing from `b` toward `a`.
pub fn obb_vs_obb(a: &Obb, b: &Obb) -> Option<Contact> {
    let a_axes = a.axes();
    let b_axes = b.axes();
    let delta = a.center - b.center;

    let mut best_overlap = f32::INFINITY;
    let mut best_normal = Vec3::UP;

    let mut test_axis = |axis: Vec3, bias: f32| -> bool {
        let len = axis.length();
        if len < 1.0e-5 {
            // Parallel edges produce no new axis
            return true;
        }
        let axis = axis / len;
        let dist = delta.dot(axis);
        let overlap = a.projected_radius(axis) + b.projected_radius(axis) - dist.abs();
        if overlap < 0.0 {
            return false;
        }
        if overlap + bias < best_overlap {
            best_overlap = overlap;
            best_normal = if dist < 0.0 { -axis } else { axis };
        }
        true
    };

    for axis in a_axes.iter().chain(b_axes.iter()) {
        if !test_axis(*axis, 0.0) {
            return None;
        }
    }
    // Edge axes must be clearly better to win over a face axis
    for ea in &a_axes {
        for eb in &b_axes {
            if !test_axis(ea.cross(*eb), 1.0e-3) {
                return None;
            }
        }
    }

    let point = (a.closest_point(b.center) + b.closest_point(a.center)) * 0.5;
    Some(Contact::new(point, best_normal, best_overlap))
}

/// Collide two arbitrary colliders
///
/// The normal points from `b` toward `a`. Plane vs plane never collides.
pub fn collide(a: &Collider, b: &Collider) -> Option<Contact> {
    match (a, b) {
        (Collider::Sphere(sa), Collider::Sphere(sb)) => sphere_vs_sphere(sa, sb),
        (Collider::Sphere(s), Collider::Aabb(bx)) => sphere_vs_aabb(s, bx),
        (Collider::Sphere(s), Collider::Obb(bx)) => sphere_vs_obb(s, bx),
        (Collider::Sphere(s), Collider::Plane(p)) => sphere_vs_plane(s, p),

        (Collider::Aabb(ax), Collider::Aabb(bx)) => aabb_vs_aabb(ax, bx),
        (Collider::Aabb(bx), Collider::Plane(p)) => aabb_vs_plane(bx, p),
        (Collider::Obb(bx), Collider::Plane(p)) => obb_vs_plane(bx, p),

        (Collider::Aabb(_), Collider::Sphere(_)) | (Collider::Obb(_), Collider::Sphere(_)) => {
            collide(b, a).map(Contact::flipped)
        }
        (Collider::Plane(_), Collider::Plane(_)) => None,
        (Collider::Plane(_), _) => collide(b, a).map(Contact::flipped),

        (Collider::Aabb(_) | Collider::Obb(_), Collider::Aabb(_) | Collider::Obb(_)) => {
            // Both box-like; as_obb cannot fail here
            match (a.as_obb(), b.as_obb()) {
                (Some(oa), Some(ob)) => obb_vs_obb(&oa, &ob),
                _ => None,
            }
        }
    }
}

/// Check whether two colliders overlap with more than `tolerance` penetration
pub fn overlaps(a: &Collider, b: &Collider, tolerance: f32) -> bool {
    collide(a, b).is_some_and(|c| c.penetration > tolerance)
}
