//! Portal-aware volumes
//!
//! Designer volumes that affect portals come in a handful of capability
//! tags, stored together and dispatched on [`VolumeKind`]:
//! - detectors report active portals entering and leaving them
//! - orientation volumes fix the up axis of portals placed inside
//! - placement helpers snap nearby placements to an exact pose
//! - no-portal volumes refuse placements
//! - cleansers block shots and fizzle the portals of players touching them

use std::collections::BTreeSet;

use portalsim_core::Transform3D;
use portalsim_math::Vec3;
use portalsim_physics::trace::{ray_vs_obb, Ray};
use portalsim_physics::{collide, Aabb, Collider, Obb};
use slotmap::{new_key_type, SlotMap};

use crate::events::PortalEvent;
use crate::portal::{LinkageId, PortalKey};

new_key_type! {
    pub struct VolumeKey;
}

#[derive(Clone, Debug, PartialEq)]
pub enum VolumeKind {
    Detector {
        /// Only portals of this group are reported; `None` reports all
        linkage: Option<LinkageId>,
        inside: BTreeSet<PortalKey>,
    },
    Orientation {
        up: Vec3,
    },
    PlacementHelper {
        /// Placements within this distance of the helper pose may snap to it
        radius: f32,
        pose: Transform3D,
        linkage: Option<LinkageId>,
        /// Use the pose even if it fails the placement checks
        force: bool,
    },
    NoPortal,
    Cleanser,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    pub name: Option<String>,
    pub bounds: Obb,
    pub kind: VolumeKind,
    pub enabled: bool,
}

impl Volume {
    pub fn new(bounds: Obb, kind: VolumeKind) -> Self {
        Self {
            name: None,
            bounds,
            kind,
            enabled: true,
        }
    }

    pub fn detector(bounds: Obb, linkage: Option<LinkageId>) -> Self {
        Self::new(bounds, VolumeKind::Detector { linkage, inside: BTreeSet::new() })
    }

    pub fn helper(bounds: Obb, pose: Transform3D, radius: f32, linkage: Option<LinkageId>) -> Self {
        Self::new(bounds, VolumeKind::PlacementHelper { radius, pose, linkage, force: false })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.bounds.contains(point)
    }

    pub fn intersects_obb(&self, obb: &Obb) -> bool {
        collide(&Collider::Obb(self.bounds), &Collider::Obb(*obb)).is_some_and(|c| c.is_colliding())
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        collide(&Collider::Obb(self.bounds), &Collider::Aabb(*aabb)).is_some_and(|c| c.is_colliding())
    }

    /// Whether the segment from `start` to `end` passes through the volume
    pub fn intersects_segment(&self, start: Vec3, end: Vec3) -> bool {
        if self.bounds.contains(start) || self.bounds.contains(end) {
            return true;
        }
        let (ray, length) = Ray::between(start, end);
        if length <= f32::EPSILON {
            return false;
        }
        ray_vs_obb(&ray, &self.bounds).is_some_and(|hit| hit.distance <= length)
    }

    fn matches(linkage: Option<LinkageId>, group: LinkageId) -> bool {
        linkage.map_or(true, |id| id == group)
    }
}

/// A helper pose that may replace a placement
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HelperCandidate {
    pub volume: VolumeKey,
    pub pose: Transform3D,
    pub distance: f32,
    pub force: bool,
}

#[derive(Debug, Default)]
pub struct VolumeSet {
    volumes: SlotMap<VolumeKey, Volume>,
}

impl VolumeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, volume: Volume) -> VolumeKey {
        self.volumes.insert(volume)
    }

    pub fn remove(&mut self, key: VolumeKey) -> Option<Volume> {
        self.volumes.remove(key)
    }

    pub fn get(&self, key: VolumeKey) -> Option<&Volume> {
        self.volumes.get(key)
    }

    pub fn get_mut(&mut self, key: VolumeKey) -> Option<&mut Volume> {
        self.volumes.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VolumeKey, &Volume)> {
        self.volumes.iter()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn clear(&mut self) {
        self.volumes.clear();
    }

    fn enabled(&self) -> impl Iterator<Item = (VolumeKey, &Volume)> {
        self.volumes.iter().filter(|(_, v)| v.enabled)
    }

    /// Whether a portal volume would intrude on a no-portal volume
    pub fn blocks_portal(&self, obb: &Obb) -> bool {
        self.enabled()
            .any(|(_, v)| matches!(v.kind, VolumeKind::NoPortal) && v.intersects_obb(obb))
    }

    /// First cleanser crossed by a segment
    pub fn cleanser_on_segment(&self, start: Vec3, end: Vec3) -> Option<VolumeKey> {
        self.enabled()
            .find(|(_, v)| matches!(v.kind, VolumeKind::Cleanser) && v.intersects_segment(start, end))
            .map(|(k, _)| k)
    }

    pub fn cleanser_touching(&self, bounds: &Aabb) -> Option<VolumeKey> {
        self.enabled()
            .find(|(_, v)| matches!(v.kind, VolumeKind::Cleanser) && v.intersects_aabb(bounds))
            .map(|(k, _)| k)
    }

    /// Up axis imposed on portals whose center is at `point`
    pub fn orientation_at(&self, point: Vec3) -> Option<Vec3> {
        self.enabled().find_map(|(_, v)| match v.kind {
            VolumeKind::Orientation { up } if v.contains_point(point) => Some(up),
            _ => None,
        })
    }

    /// Helpers in range of `point` for a linkage group, nearest first
    pub fn helpers_near(&self, point: Vec3, linkage_id: LinkageId) -> Vec<HelperCandidate> {
        let mut found: Vec<HelperCandidate> = self
            .enabled()
            .filter_map(|(key, v)| match v.kind {
                VolumeKind::PlacementHelper { radius, pose, linkage, force } if Volume::matches(linkage, linkage_id) => {
                    let distance = pose.position.distance(point);
                    (distance <= radius).then_some(HelperCandidate { volume: key, pose, distance, force })
                }
                _ => None,
            })
            .collect();
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        found
    }

    /// Track which active portals sit inside each detector
    ///
    /// `portals` lists every active portal with its center and group.
    pub fn update_detectors(&mut self, portals: &[(PortalKey, Vec3, LinkageId)]) -> Vec<PortalEvent> {
        let mut events = Vec::new();
        for (volume_key, volume) in self.volumes.iter_mut() {
            let enabled = volume.enabled;
            let bounds = volume.bounds;
            let VolumeKind::Detector { linkage, inside } = &mut volume.kind else {
                continue;
            };
            let now: BTreeSet<PortalKey> = portals
                .iter()
                .filter(|(_, center, group)| enabled && Volume::matches(*linkage, *group) && bounds.contains(*center))
                .map(|(key, _, _)| *key)
                .collect();

            for portal in now.difference(inside) {
                events.push(PortalEvent::DetectorPortalEntered { volume: volume_key, portal: *portal });
            }
            for portal in inside.difference(&now) {
                events.push(PortalEvent::DetectorPortalLeft { volume: volume_key, portal: *portal });
            }
            *inside = now;
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portalsim_math::Quat;

    fn cube(center: Vec3, half: f32) -> Obb {
        Obb::new(center, Vec3::splat(half), Quat::IDENTITY)
    }

    #[test]
    fn test_no_portal_blocks_only_when_enabled() {
        let mut set = VolumeSet::new();
        let key = set.add(Volume::new(cube(Vec3::ZERO, 50.0), VolumeKind::NoPortal));
        let portal = cube(Vec3::new(40.0, 0.0, 0.0), 20.0);
        assert!(set.blocks_portal(&portal));
        assert!(!set.blocks_portal(&cube(Vec3::new(200.0, 0.0, 0.0), 20.0)));

        set.get_mut(key).unwrap().enabled = false;
        assert!(!set.blocks_portal(&portal));
    }

    #[test]
    fn test_cleanser_on_segment() {
        let mut set = VolumeSet::new();
        let key = set.add(Volume::new(cube(Vec3::new(100.0, 0.0, 0.0), 10.0), VolumeKind::Cleanser));
        assert_eq!(set.cleanser_on_segment(Vec3::ZERO, Vec3::new(300.0, 0.0, 0.0)), Some(key));
        assert_eq!(set.cleanser_on_segment(Vec3::ZERO, Vec3::new(50.0, 0.0, 0.0)), None);
        assert_eq!(set.cleanser_on_segment(Vec3::new(0.0, 50.0, 0.0), Vec3::new(300.0, 50.0, 0.0)), None);
    }

    #[test]
    fn test_helpers_sorted_and_filtered() {
        let mut set = VolumeSet::new();
        let near = Transform3D::from_position(Vec3::new(10.0, 0.0, 0.0));
        let far = Transform3D::from_position(Vec3::new(30.0, 0.0, 0.0));
        set.add(Volume::helper(cube(far.position, 8.0), far, 64.0, None));
        let near_key = set.add(Volume::helper(cube(near.position, 8.0), near, 64.0, Some(1)));
        set.add(Volume::helper(cube(near.position, 8.0), near, 64.0, Some(2)));

        let found = set.helpers_near(Vec3::ZERO, 1);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].volume, near_key);
        assert!(found[0].distance < found[1].distance);
    }

    #[test]
    fn test_detector_enter_and_leave() {
        let mut set = VolumeSet::new();
        let detector = set.add(Volume::detector(cube(Vec3::ZERO, 100.0), Some(1)));
        let portal = SlotMap::<PortalKey, ()>::with_key().insert(());

        let events = set.update_detectors(&[(portal, Vec3::new(10.0, 0.0, 0.0), 1)]);
        assert_eq!(events, vec![PortalEvent::DetectorPortalEntered { volume: detector, portal }]);
        assert!(set.update_detectors(&[(portal, Vec3::new(20.0, 0.0, 0.0), 1)]).is_empty());

        let events = set.update_detectors(&[]);
        assert_eq!(events, vec![PortalEvent::DetectorPortalLeft { volume: detector, portal }]);
    }

    #[test]
    fn test_detector_ignores_other_groups() {
        let mut set = VolumeSet::new();
        set.add(Volume::detector(cube(Vec3::ZERO, 100.0), Some(1)));
        let portal = SlotMap::<PortalKey, ()>::with_key().insert(());
        assert!(set.update_detectors(&[(portal, Vec3::ZERO, 7)]).is_empty());
    }

    #[test]
    fn test_orientation_lookup() {
        let mut set = VolumeSet::new();
        set.add(Volume::new(cube(Vec3::ZERO, 10.0), VolumeKind::Orientation { up: Vec3::Y }));
        assert_eq!(set.orientation_at(Vec3::new(1.0, 1.0, 1.0)), Some(Vec3::Y));
        assert_eq!(set.orientation_at(Vec3::new(50.0, 0.0, 0.0)), None);
    }
}
