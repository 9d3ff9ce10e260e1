//! World error types

use std::fmt;

use crate::world::EntityKey;

/// Error type for structural world operations
#[derive(Debug, Clone, PartialEq)]
pub enum WorldError {
    /// The key does not refer to a live entity
    UnknownEntity(EntityKey),
    /// Parenting would make an entity its own ancestor
    ParentCycle { child: EntityKey, parent: EntityKey },
}

impl fmt::Display for WorldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldError::UnknownEntity(key) => write!(f, "Unknown entity {:?}", key),
            WorldError::ParentCycle { child, parent } => {
                write!(f, "Parenting {:?} to {:?} would create a cycle", child, parent)
            }
        }
    }
}

impl std::error::Error for WorldError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_cycle() {
        let err = WorldError::ParentCycle {
            child: EntityKey::default(),
            parent: EntityKey::default(),
        };
        assert!(err.to_string().contains("cycle"));
    }
}
