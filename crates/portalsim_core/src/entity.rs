//! Entity types
//!
//! An Entity is anything the portal simulation can see: players, props,
//! doors, trains and other attached geometry.

use std::collections::HashSet;

use bitflags::bitflags;
use portalsim_math::Angles;
use portalsim_physics::{BodyKey, PlayerHull, Stance};
use serde::{Serialize, Deserialize};

use crate::world::EntityKey;
use crate::Transform3D;

bitflags! {
    /// Flags indicating which parts of an entity have changed
    ///
    /// Hosts that replicate or render entities read and clear these.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DirtyFlags: u8 {
        /// No changes
        const NONE = 0;
        /// Transform (position, rotation) has changed
        const TRANSFORM = 1 << 0;
        /// Stance, health or other state has changed
        const STATE = 1 << 1;
        /// All flags set
        const ALL = Self::TRANSFORM.bits() | Self::STATE.bits();
    }
}

bitflags! {
    /// Behaviour flags on an entity
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityFlags: u16 {
        /// Designer has forbidden this entity from using portals
        const NO_TELEPORT = 1 << 0;
        /// Can be picked up by a player
        const PICKUP = 1 << 1;
        /// Health has reached zero
        const DEAD = 1 << 2;
    }
}

/// What sort of thing an entity is
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    #[default]
    Prop,
    /// Hinged or sliding door; moves with its parent hierarchy
    Door,
    /// Train or platform following a track
    TrackTrain,
    /// Anything without portal-relevant behaviour
    Other,
}

impl EntityKind {
    /// Kinds that may pass through portals on their own
    pub fn can_teleport(&self) -> bool {
        matches!(self, EntityKind::Player | EntityKind::Prop)
    }

    /// Kinds whose children are carried along and must never teleport
    pub fn blocks_descendants(&self) -> bool {
        matches!(self, EntityKind::Door | EntityKind::TrackTrain)
    }
}

/// Player-only state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Look direction
    pub view_angles: Angles,
    pub stance: Stance,
    pub hull: PlayerHull,
    /// Linkage group of the player's portal gun
    pub linkage_id: u32,
    /// Crouch was forced by a teleport and ends once there is room to stand
    pub forced_crouch: bool,
}

impl PlayerState {
    pub fn new(linkage_id: u32) -> Self {
        Self {
            view_angles: Angles::ZERO,
            stance: Stance::Standing,
            hull: PlayerHull::default(),
            linkage_id,
            forced_crouch: false,
        }
    }
}

/// An entity in the world
///
/// Each entity has:
/// - An optional name (for lookup by name)
/// - Tags (for categorization and filtering)
/// - A kind and behaviour flags
/// - A transform (position, rotation)
/// - An optional parent (attached entities move with it)
/// - An optional physics body key (links to PhysicsWorld)
/// - Health
/// - Dirty flags (for change tracking)
#[derive(Clone, Debug)]
pub struct Entity {
    /// Optional name for this entity (for lookup)
    pub name: Option<String>,
    /// Tags for categorization (e.g., "cube", "turret")
    pub tags: HashSet<String>,
    pub kind: EntityKind,
    pub flags: EntityFlags,
    /// The entity's transform in world space
    pub transform: Transform3D,
    pub parent: Option<EntityKey>,
    /// Optional physics body key (links to PhysicsWorld)
    pub physics_body: Option<BodyKey>,
    pub health: f32,
    /// Present for players only
    pub player: Option<PlayerState>,
    /// Dirty flags for change tracking
    dirty: DirtyFlags,
}

impl Entity {
    /// Create a new entity of the given kind
    pub fn new(kind: EntityKind) -> Self {
        Self {
            name: None,
            tags: HashSet::new(),
            kind,
            flags: EntityFlags::empty(),
            transform: Transform3D::identity(),
            parent: None,
            physics_body: None,
            health: 100.0,
            player: None,
            dirty: DirtyFlags::ALL,
        }
    }

    /// Create a player with a portal gun on the given linkage group
    pub fn player(linkage_id: u32) -> Self {
        let mut entity = Self::new(EntityKind::Player);
        entity.player = Some(PlayerState::new(linkage_id));
        entity
    }

    /// Create a prop that can be picked up
    pub fn prop() -> Self {
        Self::new(EntityKind::Prop).with_flags(EntityFlags::PICKUP)
    }

    /// Set the name of this entity (for lookup)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a tag to this entity
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Check if this entity has a specific tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn with_flags(mut self, flags: EntityFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_transform(mut self, transform: Transform3D) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_health(mut self, health: f32) -> Self {
        self.health = health;
        self
    }

    /// Attach a physics body to this entity
    pub fn with_physics_body(mut self, key: BodyKey) -> Self {
        self.physics_body = Some(key);
        self
    }

    pub fn is_player(&self) -> bool {
        self.kind == EntityKind::Player
    }

    pub fn is_alive(&self) -> bool {
        !self.flags.contains(EntityFlags::DEAD)
    }

    /// Check if the entity has any dirty flags set
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn mark_dirty(&mut self, flags: DirtyFlags) {
        self.dirty |= flags;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = DirtyFlags::NONE;
    }

    /// Set the transform and mark it dirty
    pub fn set_transform(&mut self, transform: Transform3D) {
        self.transform = transform;
        self.dirty |= DirtyFlags::TRANSFORM;
    }
}
