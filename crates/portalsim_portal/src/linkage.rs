//! Linkage registry
//!
//! Owns every portal and groups them by linkage id. Links are never stored as
//! raw mutual references: each portal's `linked` key is a cache recomputed by
//! [`LinkageRegistry::relink`] from the group's active portals, and checked
//! for symmetry every time.

use std::collections::BTreeMap;

use slotmap::SlotMap;

use crate::config::{HoleConfig, SimulatorConfig};
use crate::error::PortalError;
use crate::portal::{LinkageId, Portal, PortalKey, PortalSide};
use crate::transform_solver::LinkTransform;

/// Portals sharing a linkage id, in creation order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkageGroup {
    pub id: LinkageId,
    members: Vec<PortalKey>,
}

impl LinkageGroup {
    fn new(id: LinkageId) -> Self {
        Self { id, members: Vec::new() }
    }

    pub fn members(&self) -> &[PortalKey] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// A change in link state reported by [`LinkageRegistry::relink`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkChange {
    Linked(PortalKey, PortalKey),
    Unlinked(PortalKey),
}

/// Registry of all portals and their linkage groups
///
/// Lifetime is tied to the level: [`clear`](Self::clear) on unload.
#[derive(Debug)]
pub struct LinkageRegistry {
    portals: SlotMap<PortalKey, Portal>,
    groups: BTreeMap<LinkageId, LinkageGroup>,
    hole: HoleConfig,
    simulator: SimulatorConfig,
}

impl LinkageRegistry {
    pub fn new(hole: HoleConfig, simulator: SimulatorConfig) -> Self {
        Self {
            portals: SlotMap::with_key(),
            groups: BTreeMap::new(),
            hole,
            simulator,
        }
    }

    /// Hole size given to new portals
    pub fn hole(&self) -> &HoleConfig {
        &self.hole
    }

    // --- Portals ---

    /// Create an inactive portal in a group
    pub fn create(&mut self, linkage_id: LinkageId, side: PortalSide) -> Result<PortalKey, PortalError> {
        let portal = Portal::new(linkage_id, side, &self.hole, &self.simulator)?;
        let key = self.portals.insert(portal);
        self.groups
            .entry(linkage_id)
            .or_insert_with(|| LinkageGroup::new(linkage_id))
            .members
            .push(key);
        log::debug!("Created portal {:?} (group {}, side {:?})", key, linkage_id, side);
        Ok(key)
    }

    /// Find the portal for a side of a group, preferring an active one
    ///
    /// With `create_if_missing` a new inactive portal is made when the side
    /// has none.
    pub fn find_portal(
        &mut self,
        linkage_id: LinkageId,
        side: PortalSide,
        create_if_missing: bool,
    ) -> Result<Option<PortalKey>, PortalError> {
        if let Some(key) = self.find_existing(linkage_id, side) {
            return Ok(Some(key));
        }
        if create_if_missing {
            return self.create(linkage_id, side).map(Some);
        }
        Ok(None)
    }

    /// Lookup without creating
    pub fn find_existing(&self, linkage_id: LinkageId, side: PortalSide) -> Option<PortalKey> {
        let group = self.groups.get(&linkage_id)?;
        let on_side: Vec<PortalKey> = group
            .members
            .iter()
            .copied()
            .filter(|k| self.portals[*k].side == side)
            .collect();
        on_side
            .iter()
            .copied()
            .find(|k| self.portals[*k].is_active())
            .or_else(|| on_side.first().copied())
    }

    /// Remove a portal, relinking what remains of its group
    pub fn remove(&mut self, key: PortalKey) -> Option<(Portal, Vec<LinkChange>)> {
        let portal = self.portals.remove(key)?;
        let mut changes = Vec::new();
        if let Some(group) = self.groups.get_mut(&portal.linkage_id) {
            group.members.retain(|k| *k != key);
            if group.is_empty() {
                self.groups.remove(&portal.linkage_id);
            } else {
                changes = self.relink(portal.linkage_id);
            }
        }
        Some((portal, changes))
    }

    pub fn get(&self, key: PortalKey) -> Option<&Portal> {
        self.portals.get(key)
    }

    pub fn get_mut(&mut self, key: PortalKey) -> Option<&mut Portal> {
        self.portals.get_mut(key)
    }

    pub fn contains(&self, key: PortalKey) -> bool {
        self.portals.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PortalKey, &Portal)> {
        self.portals.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PortalKey, &mut Portal)> {
        self.portals.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = PortalKey> + '_ {
        self.portals.keys()
    }

    /// Portals that are active and linked
    pub fn open_portals(&self) -> impl Iterator<Item = (PortalKey, &Portal)> {
        self.portals.iter().filter(|(_, p)| p.is_open())
    }

    pub fn len(&self) -> usize {
        self.portals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portals.is_empty()
    }

    pub fn group(&self, linkage_id: LinkageId) -> Option<&LinkageGroup> {
        self.groups.get(&linkage_id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &LinkageGroup> {
        self.groups.values()
    }

    /// Drop every portal and group
    pub fn clear(&mut self) -> Vec<Portal> {
        self.groups.clear();
        self.portals.drain().map(|(_, p)| p).collect()
    }

    // --- Activation and links ---

    /// Activate a portal, deactivating any other active portal on its side
    ///
    /// Returns the portals that were deactivated to make room.
    pub fn activate(&mut self, key: PortalKey) -> Vec<PortalKey> {
        let Some(portal) = self.portals.get(key) else {
            return Vec::new();
        };
        let (linkage_id, side) = (portal.linkage_id, portal.side);

        let displaced: Vec<PortalKey> = self
            .groups
            .get(&linkage_id)
            .map(|g| {
                g.members
                    .iter()
                    .copied()
                    .filter(|k| *k != key && self.portals[*k].side == side && self.portals[*k].is_active())
                    .collect()
            })
            .unwrap_or_default();

        for other in &displaced {
            if let Some(p) = self.portals.get_mut(*other) {
                p.set_active(false);
            }
        }
        if let Some(p) = self.portals.get_mut(key) {
            p.set_active(true);
        }
        displaced
    }

    pub fn deactivate(&mut self, key: PortalKey) -> bool {
        match self.portals.get_mut(key) {
            Some(p) if p.is_active() => {
                p.set_active(false);
                true
            }
            _ => false,
        }
    }

    /// Recompute the links of a group from its active portals
    ///
    /// The first active portal on each side pair up; every other member is
    /// unlinked. Both matrices of a link are written together.
    pub fn relink(&mut self, linkage_id: LinkageId) -> Vec<LinkChange> {
        let Some(group) = self.groups.get(&linkage_id) else {
            return Vec::new();
        };
        let members = group.members.clone();
        let pair = self
            .first_active(&members, PortalSide::A)
            .zip(self.first_active(&members, PortalSide::B));

        let mut changes = Vec::new();
        for key in &members {
            let wanted = match pair {
                Some((a, b)) if *key == a => Some(b),
                Some((a, b)) if *key == b => Some(a),
                _ => None,
            };
            let current = self.portals[*key].linked();
            if wanted.is_none() && current.is_some() {
                self.portals[*key].set_link(None, LinkTransform::default());
                changes.push(LinkChange::Unlinked(*key));
            }
        }

        if let Some((a, b)) = pair {
            let link = LinkTransform::between(self.portals[a].transform(), self.portals[b].transform());
            let was_linked = self.portals[a].linked() == Some(b) && self.portals[b].linked() == Some(a);
            self.portals[a].set_link(Some(b), link);
            self.portals[b].set_link(Some(a), link.flipped());
            if !was_linked {
                log::info!("Linked portals {:?} <-> {:?} (group {})", a, b, linkage_id);
                changes.push(LinkChange::Linked(a, b));
            }
        }

        self.verify_symmetry(linkage_id);
        changes
    }

    fn first_active(&self, members: &[PortalKey], side: PortalSide) -> Option<PortalKey> {
        members
            .iter()
            .copied()
            .find(|k| self.portals[*k].side == side && self.portals[*k].is_active())
    }

    /// Recompute link matrices after a linked portal moved
    pub fn refresh_link_transform(&mut self, key: PortalKey) {
        let Some(other) = self.portals.get(key).and_then(|p| p.linked()) else {
            return;
        };
        if !self.portals.contains_key(other) {
            return;
        }
        let link = LinkTransform::between(self.portals[key].transform(), self.portals[other].transform());
        self.portals[key].set_link(Some(other), link);
        self.portals[other].set_link(Some(key), link.flipped());
    }

    /// Break any link that is not mirrored by its partner
    fn verify_symmetry(&mut self, linkage_id: LinkageId) {
        let Some(group) = self.groups.get(&linkage_id) else {
            return;
        };
        let broken: Vec<PortalKey> = group
            .members
            .iter()
            .copied()
            .filter(|k| match self.portals[*k].linked() {
                Some(other) => self.portals.get(other).and_then(|o| o.linked()) != Some(*k),
                None => false,
            })
            .collect();
        for key in broken {
            log::warn!("Portal {:?} had an asymmetric link; unlinking", key);
            self.portals[key].set_link(None, LinkTransform::default());
        }
    }

    /// Whether every link in the registry is mirrored by its partner
    pub fn links_are_symmetric(&self) -> bool {
        self.portals.iter().all(|(key, p)| match p.linked() {
            Some(other) => self.portals.get(other).and_then(|o| o.linked()) == Some(key),
            None => true,
        })
    }
}

impl Default for LinkageRegistry {
    fn default() -> Self {
        Self::new(HoleConfig::default(), SimulatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portalsim_core::Transform3D;
    use portalsim_math::{mat4, Angles, Vec3};

    fn place(registry: &mut LinkageRegistry, key: PortalKey, origin: Vec3, angles: Angles) {
        registry
            .get_mut(key)
            .unwrap()
            .set_transform(Transform3D::from_origin_angles(origin, angles));
    }

    #[test]
    fn test_find_portal_creates_on_request() {
        let mut registry = LinkageRegistry::default();
        assert_eq!(registry.find_portal(1, PortalSide::A, false).unwrap(), None);
        let key = registry.find_portal(1, PortalSide::A, true).unwrap().unwrap();
        assert_eq!(registry.find_portal(1, PortalSide::A, true).unwrap(), Some(key));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.group(1).unwrap().members(), &[key]);
    }

    #[test]
    fn test_find_prefers_active_portal() {
        let mut registry = LinkageRegistry::default();
        let first = registry.create(1, PortalSide::B).unwrap();
        let second = registry.create(1, PortalSide::B).unwrap();
        assert_eq!(registry.find_existing(1, PortalSide::B), Some(first));
        registry.activate(second);
        assert_eq!(registry.find_existing(1, PortalSide::B), Some(second));
    }

    #[test]
    fn test_one_active_portal_per_side() {
        let mut registry = LinkageRegistry::default();
        let first = registry.create(1, PortalSide::A).unwrap();
        let second = registry.create(1, PortalSide::A).unwrap();
        registry.activate(first);
        let displaced = registry.activate(second);
        assert_eq!(displaced, vec![first]);
        assert!(!registry.get(first).unwrap().is_active());
        assert!(registry.get(second).unwrap().is_active());
    }

    #[test]
    fn test_relink_pairs_active_sides() {
        let mut registry = LinkageRegistry::default();
        let a = registry.create(7, PortalSide::A).unwrap();
        let b = registry.create(7, PortalSide::B).unwrap();
        place(&mut registry, a, Vec3::ZERO, Angles::new(-90.0, 0.0, 0.0));
        place(&mut registry, b, Vec3::new(300.0, 0.0, 64.0), Angles::new(0.0, 180.0, 0.0));

        registry.activate(a);
        assert!(registry.relink(7).is_empty());
        registry.activate(b);
        assert_eq!(registry.relink(7), vec![LinkChange::Linked(a, b)]);
        assert_eq!(registry.get(a).unwrap().linked(), Some(b));
        assert_eq!(registry.get(b).unwrap().linked(), Some(a));
        assert!(registry.links_are_symmetric());

        let m_ab = registry.get(a).unwrap().link_matrix();
        let m_ba = registry.get(b).unwrap().link_matrix();
        assert!(mat4::approx_eq(mat4::mul(m_ab, m_ba), mat4::IDENTITY, 0.001));

        // Relinking an unchanged group reports nothing
        assert!(registry.relink(7).is_empty());
    }

    #[test]
    fn test_deactivate_unlinks_both() {
        let mut registry = LinkageRegistry::default();
        let a = registry.create(1, PortalSide::A).unwrap();
        let b = registry.create(1, PortalSide::B).unwrap();
        registry.activate(a);
        registry.activate(b);
        registry.relink(1);

        registry.deactivate(b);
        let changes = registry.relink(1);
        assert_eq!(changes, vec![LinkChange::Unlinked(a), LinkChange::Unlinked(b)]);
        assert_eq!(registry.get(a).unwrap().linked(), None);
        assert!(registry.links_are_symmetric());
    }

    #[test]
    fn test_groups_do_not_cross_link() {
        let mut registry = LinkageRegistry::default();
        let a1 = registry.create(1, PortalSide::A).unwrap();
        let b2 = registry.create(2, PortalSide::B).unwrap();
        registry.activate(a1);
        registry.activate(b2);
        registry.relink(1);
        registry.relink(2);
        assert_eq!(registry.get(a1).unwrap().linked(), None);
        assert_eq!(registry.get(b2).unwrap().linked(), None);
    }

    #[test]
    fn test_remove_relinks_group() {
        let mut registry = LinkageRegistry::default();
        let a = registry.create(1, PortalSide::A).unwrap();
        let b = registry.create(1, PortalSide::B).unwrap();
        registry.activate(a);
        registry.activate(b);
        registry.relink(1);

        let (_, changes) = registry.remove(b).unwrap();
        assert_eq!(changes, vec![LinkChange::Unlinked(a)]);
        assert!(!registry.contains(b));
        assert_eq!(registry.get(a).unwrap().linked(), None);
    }

    #[test]
    fn test_refresh_link_transform_tracks_moves() {
        let mut registry = LinkageRegistry::default();
        let a = registry.create(1, PortalSide::A).unwrap();
        let b = registry.create(1, PortalSide::B).unwrap();
        registry.activate(a);
        registry.activate(b);
        registry.relink(1);

        place(&mut registry, b, Vec3::new(100.0, 0.0, 0.0), Angles::ZERO);
        registry.refresh_link_transform(b);
        let m = registry.get(a).unwrap().link_matrix();
        assert!(mat4::translation(m).approx_eq(Vec3::new(100.0, 0.0, 0.0), 0.001));
        let back = registry.get(b).unwrap().link_matrix();
        assert!(mat4::approx_eq(mat4::mul(m, back), mat4::IDENTITY, 0.001));
    }
}
