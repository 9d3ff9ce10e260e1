//! Core types for the portal simulation
//!
//! This crate provides the foundational types the portal layer works on:
//!
//! - [`Transform3D`] - Rigid position and rotation
//! - [`Entity`] - An object in the world with a kind, flags and a parent
//! - [`World`] - Container for all entities, owning the physics world
//! - [`EntityKey`] - Generational key to an entity in the world
//! - [`WorldError`] - Failures of structural world operations

mod transform;
mod entity;
mod world;
mod error;

pub use transform::Transform3D;
pub use entity::{DirtyFlags, Entity, EntityFlags, EntityKind, PlayerState};
pub use world::{DamageEvent, DamageKind, EntityKey, World};
pub use error::WorldError;

// Re-export commonly used types from portalsim_math for convenience
pub use portalsim_math::{Angles, Quat, Vec3};

// Re-export physics types for convenient access through portalsim_core
pub use portalsim_physics::{BodyKey, PhysicsConfig, PhysicsWorld, RigidBody, Stance, StaticCollider};
