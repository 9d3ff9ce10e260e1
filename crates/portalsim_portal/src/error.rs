//! Portal error types

use std::fmt;

use portalsim_core::EntityKey;

use crate::portal::PortalKey;

/// Error type for portal operations
///
/// Placement rejections are not errors; they come back as a
/// [`PlacementOutcome`](crate::PlacementOutcome) with a quality and reason.
#[derive(Debug, Clone, PartialEq)]
pub enum PortalError {
    /// Hole dimensions that cannot form a portal
    InvalidGeometry { reason: String },
    /// The key does not refer to a live portal
    UnknownPortal(PortalKey),
    /// The key does not refer to a live entity
    UnknownEntity(EntityKey),
    /// The entity is not allowed to pass through or be held across portals
    NotTeleportable(EntityKey),
    /// The entity is already being held
    AlreadyHeld(EntityKey),
    /// The holder is not holding anything
    NotHeld(EntityKey),
    /// Snapshot encoding or decoding failed
    Snapshot(String),
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortalError::InvalidGeometry { reason } => write!(f, "Invalid portal geometry: {}", reason),
            PortalError::UnknownPortal(key) => write!(f, "Unknown portal {:?}", key),
            PortalError::UnknownEntity(key) => write!(f, "Unknown entity {:?}", key),
            PortalError::NotTeleportable(key) => write!(f, "Entity {:?} cannot use portals", key),
            PortalError::AlreadyHeld(key) => write!(f, "Entity {:?} is already held", key),
            PortalError::NotHeld(key) => write!(f, "Entity {:?} is not holding anything", key),
            PortalError::Snapshot(msg) => write!(f, "Portal snapshot error: {}", msg),
        }
    }
}

impl std::error::Error for PortalError {}

impl From<ron::Error> for PortalError {
    fn from(e: ron::Error) -> Self {
        PortalError::Snapshot(e.to_string())
    }
}

impl From<ron::error::SpannedError> for PortalError {
    fn from(e: ron::error::SpannedError) -> Self {
        PortalError::Snapshot(e.to_string())
    }
}
