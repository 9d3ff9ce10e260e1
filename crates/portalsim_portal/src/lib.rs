//! Portal teleportation, ownership, grab and placement
//!
//! This crate is the portal layer on top of `portalsim_core`:
//!
//! - [`Portal`] - Oriented rectangular aperture with a link to its partner
//! - [`LinkageRegistry`] - Portals grouped by linkage id, at most one active per side
//! - [`PortalSimulator`] - Per-portal collision environment with the wall cut open
//! - [`OwnershipArbiter`] - Which portal simulates which entity
//! - [`TeleportExecutor`] - Crossing detection and deferred teleports
//! - [`GrabController`] - Holding objects, including through portals
//! - [`PlacementSolver`] - Validates and nudges portal placements
//! - [`PortalSystem`] - Runs all of the above around the physics step
//!
//! A host drives it like this:
//!
//! ```ignore
//! let mut portals = PortalSystem::new(PortalConfig::default())?;
//! portals.fire_portal(&mut world, 1, PortalSide::A, eye, forward)?;
//!
//! portals.pre_physics(&mut world, dt);
//! world.step(dt);
//! portals.post_physics(&mut world, dt);
//! for event in portals.drain_events() { /* ... */ }
//! ```

mod commands;
mod config;
mod error;
mod events;
mod grab;
mod linkage;
mod ownership;
mod persist;
mod placement;
mod portal;
mod simulator;
mod system;
mod teleport;
mod transform_solver;
mod volumes;

#[cfg(test)]
mod test_support;

pub use commands::{CommandQueue, PortalCommand};
pub use config::{
    GrabConfig, HoleConfig, PlacementConfig, PortalConfig, PortalDebugConfig, SimulatorConfig, TeleportConfig,
};
pub use error::PortalError;
pub use events::{EventBus, FizzleEffect, FizzleReason, PortalEvent, PortalListener};
pub use grab::{GrabController, GrabRelease, GrabState, PickupTarget, ReleaseReason};
pub use linkage::{LinkChange, LinkageGroup, LinkageRegistry};
pub use ownership::{DeferredOp, OwnershipArbiter, Phase};
pub use persist::{PortalSave, PortalSnapshot};
pub use placement::{portal_obb, PlacedBy, PlacementOutcome, PlacementReason, PlacementRequest, PlacementSolver};
pub use portal::{LinkageId, Portal, PortalKey, PortalSide};
pub use simulator::PortalSimulator;
pub use system::PortalSystem;
pub use teleport::{clamp_exit_velocity, reorient_view, TeleportEvent, TeleportExecutor, TeleportState};
pub use transform_solver::{apply_point, apply_rotation, apply_transform, apply_vector, half_turn, portal_matrix, LinkTransform};
pub use volumes::{HelperCandidate, Volume, VolumeKey, VolumeKind, VolumeSet};
