//! Collision shapes
//!
//! Lightweight primitives used for collision detection and traces. Oriented
//! boxes carry portal holes, clipped wall replicas and trigger volumes; bodies
//! collide as spheres or axis-aligned boxes.

use portalsim_math::{Quat, Vec3};

/// A sphere defined by center and radius
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    /// Create a new sphere at the given center with the given radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Check if a point is inside or on the sphere
    pub fn contains(&self, point: Vec3) -> bool {
        (point - self.center).length_squared() <= self.radius * self.radius
    }
}

/// An axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min_components(max),
            max: min.max_components(max),
        }
    }

    /// Create an AABB centered at a position with given half-extents
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the half-extents
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if a point is inside or on the AABB
    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Check overlap with another AABB (touching counts as overlapping)
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Get the closest point inside or on the AABB to a given point
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp_components(self.min, self.max)
    }

    /// Translate the AABB by a delta
    pub fn translated(&self, delta: Vec3) -> Self {
        Self {
            min: self.min + delta,
            max: self.max + delta,
        }
    }

    /// Grow by `amount` on every side
    pub fn expanded(&self, amount: Vec3) -> Self {
        Self {
            min: self.min - amount,
            max: self.max + amount,
        }
    }

    /// The 8 corners
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// View as an oriented box with identity rotation
    pub fn to_obb(&self) -> Obb {
        Obb::new(self.center(), self.half_extents(), Quat::IDENTITY)
    }
}

/// An oriented bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obb {
    pub center: Vec3,
    /// Half-extents along the box's local axes
    pub half_extents: Vec3,
    pub rotation: Quat,
}

impl Obb {
    pub fn new(center: Vec3, half_extents: Vec3, rotation: Quat) -> Self {
        Self { center, half_extents, rotation }
    }

    /// The three local axes in world space
    pub fn axes(&self) -> [Vec3; 3] {
        [self.rotation.forward(), self.rotation.left(), self.rotation.up()]
    }

    /// Convert a world point into the box's local frame
    pub fn to_local(&self, point: Vec3) -> Vec3 {
        self.rotation.conjugate().rotate(point - self.center)
    }

    /// Convert a local point into world space
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.center + self.rotation.rotate(local)
    }

    /// Check if a point is inside or on the box
    pub fn contains(&self, point: Vec3) -> bool {
        let local = self.to_local(point);
        local.x.abs() <= self.half_extents.x
            && local.y.abs() <= self.half_extents.y
            && local.z.abs() <= self.half_extents.z
    }

    /// Closest point inside or on the box
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let local = self.to_local(point);
        self.to_world(local.clamp_components(-self.half_extents, self.half_extents))
    }

    /// Projection radius of the box onto a unit axis
    pub fn projected_radius(&self, axis: Vec3) -> f32 {
        let [ax, ay, az] = self.axes();
        self.half_extents.x * ax.dot(axis).abs()
            + self.half_extents.y * ay.dot(axis).abs()
            + self.half_extents.z * az.dot(axis).abs()
    }

    /// World-space bounds
    pub fn bounds(&self) -> Aabb {
        let extent = Vec3::new(
            self.projected_radius(Vec3::X),
            self.projected_radius(Vec3::Y),
            self.projected_radius(Vec3::Z),
        );
        Aabb::from_center_half_extents(self.center, extent)
    }

    /// The 8 corners in world space
    pub fn corners(&self) -> [Vec3; 8] {
        let local = Aabb::from_center_half_extents(Vec3::ZERO, self.half_extents).corners();
        local.map(|c| self.to_world(c))
    }

    /// Translate by a delta
    pub fn translated(&self, delta: Vec3) -> Self {
        Self { center: self.center + delta, ..*self }
    }

    /// Smallest half-extent; zero or negative means the box is degenerate
    pub fn min_half_extent(&self) -> f32 {
        self.half_extents.x.min(self.half_extents.y).min(self.half_extents.z)
    }
}

/// An infinite plane defined by normal and distance from origin
///
/// The plane equation is: normal · point = distance
/// Points with normal · point > distance are "above" the plane (positive side)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Unit normal vector pointing to the positive side
    pub normal: Vec3,
    /// Signed distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from a normal and distance (normal is normalized)
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self {
            normal: normal.normalized(),
            distance,
        }
    }

    /// Create a plane from a point on the plane and a normal
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalized();
        Self {
            normal: n,
            distance: n.dot(point),
        }
    }

    /// Create a horizontal floor plane at the given Z height
    pub fn floor(z: f32) -> Self {
        Self::from_point_normal(Vec3::new(0.0, 0.0, z), Vec3::UP)
    }

    /// Signed distance from a point to the plane (positive = in front)
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }

    /// Project a point onto the plane
    pub fn project_point(&self, point: Vec3) -> Vec3 {
        point - self.normal * self.signed_distance(point)
    }

    /// Check if a point is on the positive side of the plane
    pub fn is_above(&self, point: Vec3) -> bool {
        self.signed_distance(point) > 0.0
    }
}

/// Collider enum for storing different collision shape types
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Collider {
    Sphere(Sphere),
    Aabb(Aabb),
    Obb(Obb),
    Plane(Plane),
}

impl Collider {
    /// Get the center of the collider
    ///
    /// For planes, returns the point on the plane closest to the origin.
    pub fn center(&self) -> Vec3 {
        match self {
            Collider::Sphere(s) => s.center,
            Collider::Aabb(b) => b.center(),
            Collider::Obb(b) => b.center,
            Collider::Plane(p) => p.normal * p.distance,
        }
    }

    /// Translate the collider by a delta
    pub fn translated(&self, delta: Vec3) -> Self {
        match self {
            Collider::Sphere(s) => Collider::Sphere(Sphere::new(s.center + delta, s.radius)),
            Collider::Aabb(b) => Collider::Aabb(b.translated(delta)),
            Collider::Obb(b) => Collider::Obb(b.translated(delta)),
            Collider::Plane(p) => {
                Collider::Plane(Plane::new(p.normal, p.distance + p.normal.dot(delta)))
            }
        }
    }

    /// Radius of the smallest sphere around the center containing the shape
    ///
    /// Infinite for planes.
    pub fn bounding_radius(&self) -> f32 {
        match self {
            Collider::Sphere(s) => s.radius,
            Collider::Aabb(b) => b.half_extents().length(),
            Collider::Obb(b) => b.half_extents.length(),
            Collider::Plane(_) => f32::INFINITY,
        }
    }

    /// World-space bounds; `None` for unbounded planes
    pub fn bounds(&self) -> Option<Aabb> {
        match self {
            Collider::Sphere(s) => Some(Aabb::from_center_half_extents(s.center, Vec3::splat(s.radius))),
            Collider::Aabb(b) => Some(*b),
            Collider::Obb(b) => Some(b.bounds()),
            Collider::Plane(_) => None,
        }
    }

    /// The shape as an oriented box, if it is box-like
    pub fn as_obb(&self) -> Option<Obb> {
        match self {
            Collider::Aabb(b) => Some(b.to_obb()),
            Collider::Obb(b) => Some(*b),
            _ => None,
        }
    }
}
