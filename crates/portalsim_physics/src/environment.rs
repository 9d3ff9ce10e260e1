//! Collision environments
//!
//! An environment swaps part of the world's static geometry for a local set
//! of colliders. A body assigned to an environment ignores the environment's
//! excluded world colliders and collides with its own colliders instead.

use std::collections::BTreeSet;

use slotmap::new_key_type;

use crate::body::{ColliderKey, StaticCollider};

new_key_type! {
    /// Key to a collision environment in the physics world
    pub struct EnvironmentKey;
}

/// A local override of the world's static geometry
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollisionEnvironment {
    excluded: BTreeSet<ColliderKey>,
    colliders: Vec<StaticCollider>,
}

impl CollisionEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hide a world collider from bodies in this environment
    pub fn exclude(&mut self, key: ColliderKey) {
        self.excluded.insert(key);
    }

    pub fn is_excluded(&self, key: ColliderKey) -> bool {
        self.excluded.contains(&key)
    }

    pub fn excluded(&self) -> impl Iterator<Item = ColliderKey> + '_ {
        self.excluded.iter().copied()
    }

    /// Add an environment-local collider
    pub fn add_collider(&mut self, collider: StaticCollider) {
        self.colliders.push(collider);
    }

    pub fn colliders(&self) -> &[StaticCollider] {
        &self.colliders
    }

    /// Replace everything with a new exclusion set and collider list
    pub fn rebuild(
        &mut self,
        excluded: impl IntoIterator<Item = ColliderKey>,
        colliders: Vec<StaticCollider>,
    ) {
        self.excluded = excluded.into_iter().collect();
        self.colliders = colliders;
    }

    /// Remove all exclusions and local colliders
    pub fn clear(&mut self) {
        self.excluded.clear();
        self.colliders.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty() && self.colliders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::SurfaceMaterial;
    use portalsim_math::Vec3;
    use slotmap::SlotMap;

    #[test]
    fn test_exclude_and_query() {
        let mut keys: SlotMap<ColliderKey, ()> = SlotMap::with_key();
        let a = keys.insert(());
        let b = keys.insert(());

        let mut env = CollisionEnvironment::new();
        env.exclude(a);
        assert!(env.is_excluded(a));
        assert!(!env.is_excluded(b));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut keys: SlotMap<ColliderKey, ()> = SlotMap::with_key();
        let a = keys.insert(());
        let wall = StaticCollider::aabb(Vec3::ZERO, Vec3::ONE, SurfaceMaterial::CONCRETE);

        let mut first = CollisionEnvironment::new();
        first.rebuild([a], vec![wall.clone()]);
        let mut second = first.clone();
        second.rebuild([a], vec![wall]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_clear() {
        let mut env = CollisionEnvironment::new();
        env.add_collider(StaticCollider::floor(0.0, SurfaceMaterial::CONCRETE));
        assert!(!env.is_empty());
        env.clear();
        assert!(env.is_empty());
    }
}
