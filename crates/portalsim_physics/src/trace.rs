//! Ray and swept-box intersection routines
//!
//! Swept boxes are handled by Minkowski expansion: the target shape is grown
//! by the moving box's half-extents and a ray is cast against the result.
//! For rotated targets the growth uses the box's projection onto each local
//! axis, which is slightly conservative near edges.

use crate::shapes::{Aabb, Collider, Obb, Plane, Sphere};
use portalsim_math::Vec3;

/// A ray with a unit direction
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray; the direction is normalized
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalized(),
        }
    }

    /// Ray from `start` toward `end`, plus the segment length
    pub fn between(start: Vec3, end: Vec3) -> (Self, f32) {
        let delta = end - start;
        (Self::new(start, delta), delta.length())
    }

    /// Point at distance `t` along the ray
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Where a ray enters a shape
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayIntersection {
    /// Distance along the ray
    pub distance: f32,
    /// Surface normal at the entry point
    pub normal: Vec3,
}

/// Ray vs plane (front face only)
pub fn ray_vs_plane(ray: &Ray, plane: &Plane) -> Option<RayIntersection> {
    let denom = plane.normal.dot(ray.direction);
    if denom >= -1.0e-6 {
        return None;
    }
    let t = -plane.signed_distance(ray.origin) / denom;
    (t >= 0.0).then_some(RayIntersection { distance: t, normal: plane.normal })
}

/// Ray vs sphere
pub fn ray_vs_sphere(ray: &Ray, sphere: &Sphere) -> Option<RayIntersection> {
    let m = ray.origin - sphere.center;
    let b = m.dot(ray.direction);
    let c = m.length_squared() - sphere.radius * sphere.radius;
    if c > 0.0 && b > 0.0 {
        return None;
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()).max(0.0);
    let point = ray.at(t);
    let normal = (point - sphere.center).normalized();
    Some(RayIntersection { distance: t, normal })
}

/// Ray vs AABB using the slab method
///
/// A ray starting inside the box reports distance zero with the normal of the
/// face it would exit through reversed.
pub fn ray_vs_aabb(ray: &Ray, aabb: &Aabb) -> Option<RayIntersection> {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;
    let mut enter_normal = Vec3::ZERO;
    let mut exit_normal = Vec3::ZERO;

    for i in 0..3 {
        let origin = ray.origin.axis(i);
        let dir = ray.direction.axis(i);
        let (lo, hi) = (aabb.min.axis(i), aabb.max.axis(i));
        let unit = [Vec3::X, Vec3::Y, Vec3::Z][i];

        if dir.abs() < 1.0e-8 {
            if origin < lo || origin > hi {
                return None;
            }
            continue;
        }

        let inv = 1.0 / dir;
        let (mut t1, mut t2) = ((lo - origin) * inv, (hi - origin) * inv);
        let (mut n1, mut n2) = (-unit, unit);
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
            std::mem::swap(&mut n1, &mut n2);
        }
        if t1 > t_min {
            t_min = t1;
            enter_normal = n1;
        }
        if t2 < t_max {
            t_max = t2;
            exit_normal = n2;
        }
        if t_min > t_max {
            return None;
        }
    }

    if t_max < 0.0 {
        return None;
    }
    if t_min < 0.0 {
        return Some(RayIntersection { distance: 0.0, normal: -exit_normal });
    }
    Some(RayIntersection { distance: t_min, normal: enter_normal })
}

/// Ray vs oriented box, solved in the box's local frame
pub fn ray_vs_obb(ray: &Ray, obb: &Obb) -> Option<RayIntersection> {
    let inv = obb.rotation.conjugate();
    let local_ray = Ray {
        origin: inv.rotate(ray.origin - obb.center),
        direction: inv.rotate(ray.direction),
    };
    let local_box = Aabb::from_center_half_extents(Vec3::ZERO, obb.half_extents);
    ray_vs_aabb(&local_ray, &local_box).map(|hit| RayIntersection {
        distance: hit.distance,
        normal: obb.rotation.rotate(hit.normal),
    })
}

/// Ray vs any collider
pub fn ray_vs_collider(ray: &Ray, collider: &Collider) -> Option<RayIntersection> {
    match collider {
        Collider::Sphere(s) => ray_vs_sphere(ray, s),
        Collider::Aabb(b) => ray_vs_aabb(ray, b),
        Collider::Obb(b) => ray_vs_obb(ray, b),
        Collider::Plane(p) => ray_vs_plane(ray, p),
    }
}

/// Grow a collider by an axis-aligned box's half-extents
///
/// Spheres are grown as their bounding boxes.
pub fn minkowski_expand(collider: &Collider, half_extents: Vec3) -> Collider {
    match collider {
        Collider::Sphere(s) => Collider::Aabb(Aabb::from_center_half_extents(
            s.center,
            Vec3::splat(s.radius) + half_extents,
        )),
        Collider::Aabb(b) => Collider::Aabb(b.expanded(half_extents)),
        Collider::Obb(b) => {
            let [ax, ay, az] = b.axes();
            let grow = Vec3::new(
                half_extents.component_mul(ax.abs()).dot(Vec3::ONE),
                half_extents.component_mul(ay.abs()).dot(Vec3::ONE),
                half_extents.component_mul(az.abs()).dot(Vec3::ONE),
            );
            Collider::Obb(Obb::new(b.center, b.half_extents + grow, b.rotation))
        }
        Collider::Plane(p) => {
            let radius = half_extents.dot(p.normal.abs());
            Collider::Plane(Plane::new(p.normal, p.distance + radius))
        }
    }
}

/// Sweep an axis-aligned box along a ray against a collider
pub fn sweep_box(ray: &Ray, half_extents: Vec3, collider: &Collider) -> Option<RayIntersection> {
    ray_vs_collider(ray, &minkowski_expand(collider, half_extents))
}
