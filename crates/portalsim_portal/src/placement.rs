//! Portal placement
//!
//! [`PlacementSolver::solve`] decides whether a portal may open at a candidate
//! pose. The checks run in a fixed order and the first failure wins:
//!
//! 1. surface: the whole hole is backed by a flat, portalable static surface
//! 2. volume: the portal volume stays out of no-portal volumes
//! 3. overlap: no other group's portal is in the way (a small overlap may be
//!    cleared by nudging); landing exactly on the counterpart steals it
//! 4. cleanser: the shot did not pass through a cleanser on its way
//!
//! A nearby placement helper whose pose passes checks 1 to 3 replaces the
//! candidate pose. The solver never mutates anything, so the same world
//! always gives the same outcome.

use portalsim_core::{Angles, Transform3D};
use portalsim_math::{Quat, Vec3};
use portalsim_physics::{collide, Collider, ColliderKey, Obb, PhysicsWorld, TraceFilter, TraceTarget};

use crate::config::{PlacementConfig, TeleportConfig};
use crate::linkage::LinkageRegistry;
use crate::portal::{LinkageId, PortalKey, PortalSide};
use crate::volumes::{VolumeKey, VolumeSet};

/// Who is placing the portal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlacedBy {
    /// A portal gun shot: every check applies and small overlaps are nudged
    Player,
    /// Level design or scripts: the material check is skipped and the pose is never nudged
    Designer,
}

/// Result code of a placement attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlacementReason {
    Success,
    /// Moved off another portal to fit
    Bumped,
    /// Replaced the group's own counterpart
    Stolen,
    /// A placement helper's pose was used
    Helper,
    /// Debug override
    Forced,
    BadSurface,
    BadVolume,
    Overlap,
    Cleanser,
}

impl PlacementReason {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            PlacementReason::Success
                | PlacementReason::Bumped
                | PlacementReason::Stolen
                | PlacementReason::Helper
                | PlacementReason::Forced
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementRequest {
    pub linkage_id: LinkageId,
    pub side: PortalSide,
    /// Portal origin, just off the surface
    pub origin: Vec3,
    pub angles: Angles,
    pub placed_by: PlacedBy,
    /// Where the shot came from, for the cleanser check
    pub shot_origin: Option<Vec3>,
}

impl PlacementRequest {
    pub fn new(linkage_id: LinkageId, side: PortalSide, origin: Vec3, angles: Angles, placed_by: PlacedBy) -> Self {
        Self {
            linkage_id,
            side,
            origin,
            angles,
            placed_by,
            shot_origin: None,
        }
    }

    pub fn from_pose(linkage_id: LinkageId, side: PortalSide, pose: &Transform3D, placed_by: PlacedBy) -> Self {
        Self::new(linkage_id, side, pose.position, pose.angles(), placed_by)
    }

    pub fn with_shot_origin(mut self, shot_origin: Vec3) -> Self {
        self.shot_origin = Some(shot_origin);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementOutcome {
    /// Cosmetic and telemetry value for the result
    pub quality: f32,
    pub reason: PlacementReason,
    /// Final pose; on failure, the pose that failed
    pub pose: Transform3D,
    /// Static collider backing the hole center
    pub surface: Option<ColliderKey>,
    /// Counterpart that will fizzle
    pub stolen: Option<PortalKey>,
    pub helper: Option<VolumeKey>,
}

impl PlacementOutcome {
    pub fn is_success(&self) -> bool {
        self.reason.is_success()
    }
}

/// What the world looks like to one placement
struct Scene<'a> {
    physics: &'a PhysicsWorld,
    registry: &'a LinkageRegistry,
    volumes: &'a VolumeSet,
    /// Portal volume half extents: (depth, width, height)
    half: Vec3,
}

/// A pose that passed checks 1 to 3
struct Accepted {
    pose: Transform3D,
    surface: Option<ColliderKey>,
    stolen: Option<PortalKey>,
    bumped: bool,
}

enum Overlap {
    Clear,
    Steal(PortalKey),
    /// Blocked; carries the nudge that would clear it, if one fits
    Blocked(Option<Vec3>),
}

/// Offset of a surface probe's start in front of the portal plane
const PROBE_LEAD: f32 = 1.0;
/// Corner samples are pulled in from the hole edge by this much
const CORNER_INSET: f32 = 1.0;
/// Extra distance a nudge adds past the touching point
const BUMP_CLEARANCE: f32 = 0.1;
/// Normals closer than this count as the same plane orientation
const COPLANAR_DOT: f32 = 0.99;

#[derive(Clone, Debug, Default)]
pub struct PlacementSolver {
    config: PlacementConfig,
    force_success: bool,
}

impl PlacementSolver {
    pub fn new(config: PlacementConfig, force_success: bool) -> Self {
        Self { config, force_success }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn set_force_success(&mut self, force: bool) {
        self.force_success = force;
    }

    pub fn quality(&self, reason: PlacementReason) -> f32 {
        let c = &self.config;
        match reason {
            PlacementReason::Success | PlacementReason::Stolen | PlacementReason::Helper | PlacementReason::Forced => {
                c.success_quality
            }
            PlacementReason::Bumped => c.bumped_quality,
            PlacementReason::BadSurface => c.bad_surface_quality,
            PlacementReason::BadVolume => c.bad_volume_quality,
            PlacementReason::Overlap => c.overlap_quality,
            PlacementReason::Cleanser => c.cleanser_quality,
        }
    }

    /// Candidate pose for a shot from `eye` along `direction`
    ///
    /// Wall portals stand upright; floor and ceiling portals put their up
    /// axis along the shot.
    pub fn aim(&self, physics: &PhysicsWorld, eye: Vec3, direction: Vec3, teleport: &TeleportConfig) -> Option<Transform3D> {
        let direction = direction.normalized();
        let hit = physics.trace_ray(eye, direction, self.config.max_fire_distance, &TraceFilter::world_only())?;
        let forward = hit.normal.normalized();
        let reference = if forward.z.abs() < teleport.floor_normal_threshold { Vec3::UP } else { direction };
        let mut up = reference.reject(forward);
        if up.length_squared() < 1e-6 {
            up = forward.any_orthogonal();
        }
        let up = up.normalized();
        let rotation = Quat::from_basis(forward, up.cross(forward), up);
        Some(Transform3D::from_position_rotation(hit.point + forward * self.config.surface_offset, rotation))
    }

    /// Evaluate a placement without changing anything
    pub fn solve(
        &self,
        physics: &PhysicsWorld,
        registry: &LinkageRegistry,
        volumes: &VolumeSet,
        request: &PlacementRequest,
    ) -> PlacementOutcome {
        let (half_width, half_height) = registry
            .find_existing(request.linkage_id, request.side)
            .and_then(|k| registry.get(k))
            .map_or((registry.hole().half_width, registry.hole().half_height), |p| {
                (p.half_width(), p.half_height())
            });
        let scene = Scene {
            physics,
            registry,
            volumes,
            half: Vec3::new(registry.hole().half_depth, half_width, half_height),
        };
        let pose = orient(Transform3D::from_origin_angles(request.origin, request.angles), volumes);

        if self.force_success {
            log::debug!("Placement forced at {:?}", pose.position);
            return PlacementOutcome {
                quality: self.quality(PlacementReason::Forced),
                reason: PlacementReason::Forced,
                pose,
                surface: self.backing_surface(physics, &pose),
                stolen: None,
                helper: None,
            };
        }

        for candidate in volumes.helpers_near(request.origin, request.linkage_id) {
            let checked = if candidate.force {
                Ok(Accepted {
                    pose: candidate.pose,
                    surface: self.backing_surface(physics, &candidate.pose),
                    stolen: None,
                    bumped: false,
                })
            } else {
                self.check(&scene, request, candidate.pose, false)
            };
            if let Ok(accepted) = checked {
                log::debug!("Placement snapped to helper {:?}", candidate.volume);
                return self.finish(&scene, request, accepted, Some(candidate.volume));
            }
        }

        match self.check(&scene, request, pose, request.placed_by == PlacedBy::Player) {
            Ok(accepted) => self.finish(&scene, request, accepted, None),
            Err(reason) => self.reject(reason, pose),
        }
    }

    /// Check 4 and the final outcome for an accepted pose
    fn finish(&self, scene: &Scene, request: &PlacementRequest, accepted: Accepted, helper: Option<VolumeKey>) -> PlacementOutcome {
        if let Some(shot) = request.shot_origin {
            if scene.volumes.cleanser_on_segment(shot, request.origin).is_some() {
                return self.reject(PlacementReason::Cleanser, accepted.pose);
            }
        }
        let reason = if helper.is_some() {
            PlacementReason::Helper
        } else if accepted.stolen.is_some() {
            PlacementReason::Stolen
        } else if accepted.bumped {
            PlacementReason::Bumped
        } else {
            PlacementReason::Success
        };
        PlacementOutcome {
            quality: self.quality(reason),
            reason,
            pose: accepted.pose,
            surface: accepted.surface,
            stolen: accepted.stolen,
            helper,
        }
    }

    fn reject(&self, reason: PlacementReason, pose: Transform3D) -> PlacementOutcome {
        log::debug!("Placement at {:?} rejected: {:?}", pose.position, reason);
        PlacementOutcome {
            quality: self.quality(reason),
            reason,
            pose,
            surface: None,
            stolen: None,
            helper: None,
        }
    }

    /// Checks 1 to 3, nudging once when allowed
    fn check(&self, scene: &Scene, request: &PlacementRequest, pose: Transform3D, allow_bump: bool) -> Result<Accepted, PlacementReason> {
        let surface = self.check_surface(scene, &pose, request.placed_by)?;
        if scene.volumes.blocks_portal(&portal_obb(&pose, scene.half)) {
            return Err(PlacementReason::BadVolume);
        }
        match self.check_overlap(scene, request, &pose) {
            Overlap::Clear => Ok(Accepted { pose, surface, stolen: None, bumped: false }),
            Overlap::Steal(key) => Ok(Accepted { pose, surface, stolen: Some(key), bumped: false }),
            Overlap::Blocked(Some(shift)) if allow_bump => {
                let nudged = Transform3D::from_position_rotation(pose.position + shift, pose.rotation);
                let accepted = self.check(scene, request, nudged, false).map_err(|_| PlacementReason::Overlap)?;
                Ok(Accepted { bumped: true, ..accepted })
            }
            Overlap::Blocked(_) => Err(PlacementReason::Overlap),
        }
    }

    /// The hole center and corners must all be backed by flat surface
    fn check_surface(&self, scene: &Scene, pose: &Transform3D, placed_by: PlacedBy) -> Result<Option<ColliderKey>, PlacementReason> {
        let (u, v) = (scene.half.y - CORNER_INSET, scene.half.z - CORNER_INSET);
        let samples = [
            Vec3::ZERO,
            Vec3::new(0.0, u, v),
            Vec3::new(0.0, -u, v),
            Vec3::new(0.0, u, -v),
            Vec3::new(0.0, -u, -v),
        ];
        let mut surface = None;
        for (i, sample) in samples.into_iter().enumerate() {
            let (target, distance) = self.probe(scene.physics, pose, sample).ok_or(PlacementReason::BadSurface)?;
            // Something sits in front of the portal plane
            if distance < PROBE_LEAD {
                return Err(PlacementReason::BadSurface);
            }
            let collider = scene.physics.target_static(target).ok_or(PlacementReason::BadSurface)?;
            if placed_by == PlacedBy::Player && !collider.accepts_portals() {
                return Err(PlacementReason::BadSurface);
            }
            if i == 0 {
                surface = static_key(target);
            }
        }
        Ok(surface)
    }

    /// Static collider behind the hole center of a pose
    pub fn backing_surface(&self, physics: &PhysicsWorld, pose: &Transform3D) -> Option<ColliderKey> {
        self.probe(physics, pose, Vec3::ZERO).and_then(|(target, _)| static_key(target))
    }

    /// Trace back onto the surface behind a hole point; returns the target and distance
    fn probe(&self, physics: &PhysicsWorld, pose: &Transform3D, local: Vec3) -> Option<(TraceTarget, f32)> {
        let forward = pose.forward();
        let start = pose.transform_point(local) + forward * PROBE_LEAD;
        let reach = PROBE_LEAD + self.config.surface_offset + self.config.surface_probe_depth;
        let hit = physics.trace_ray(start, -forward, reach, &TraceFilter::world_only())?;
        (hit.normal.dot(forward) >= self.config.surface_flatness).then_some((hit.target, hit.distance))
    }

    fn check_overlap(&self, scene: &Scene, request: &PlacementRequest, pose: &Transform3D) -> Overlap {
        let candidate = portal_obb(pose, scene.half);
        let mut steal = None;
        for (key, portal) in scene.registry.iter() {
            if !portal.is_active() || (portal.linkage_id == request.linkage_id && portal.side == request.side) {
                continue;
            }
            let touching = collide(&Collider::Obb(candidate), &Collider::Obb(portal.hole_obb())).is_some_and(|c| c.is_colliding());
            if !touching {
                continue;
            }
            let aligned = portal.normal().dot(pose.forward()) > COPLANAR_DOT;
            if portal.linkage_id == request.linkage_id
                && aligned
                && portal.origin().distance(pose.position) <= self.config.steal_tolerance
            {
                steal = Some(key);
                continue;
            }
            if !aligned {
                return Overlap::Blocked(None);
            }
            // Push apart in the plane along whichever hole axis needs less
            let local = pose.inverse_transform_point(portal.origin());
            let need_u = scene.half.y + portal.half_width() - local.y.abs();
            let need_v = scene.half.z + portal.half_height() - local.z.abs();
            let away = |d: f32| if d > 0.0 { -1.0 } else { 1.0 };
            let shift = if need_u <= need_v {
                pose.left() * (away(local.y) * (need_u + BUMP_CLEARANCE))
            } else {
                pose.up() * (away(local.z) * (need_v + BUMP_CLEARANCE))
            };
            let fits = shift.length() <= self.config.max_bump_distance;
            return Overlap::Blocked(fits.then_some(shift));
        }
        steal.map_or(Overlap::Clear, Overlap::Steal)
    }
}

/// Portal volume for a pose
pub fn portal_obb(pose: &Transform3D, half: Vec3) -> Obb {
    Obb::new(pose.position, half, pose.rotation)
}

/// Apply an orientation volume: keep the normal, align the up axis
fn orient(pose: Transform3D, volumes: &VolumeSet) -> Transform3D {
    let Some(up) = volumes.orientation_at(pose.position) else {
        return pose;
    };
    let forward = pose.forward();
    let up = up.reject(forward);
    if up.length_squared() < 1e-6 {
        return pose;
    }
    let up = up.normalized();
    Transform3D::from_position_rotation(pose.position, Quat::from_basis(forward, up.cross(forward), up))
}

fn static_key(target: TraceTarget) -> Option<ColliderKey> {
    match target {
        TraceTarget::Static(key) => Some(key),
        _ => None,
    }
}
