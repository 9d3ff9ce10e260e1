//! Physics host for the portal simulation
//!
//! This crate provides the rigid-body and collision services the portal core
//! consumes:
//! - Collision shapes (spheres, AABBs, oriented boxes, planes)
//! - Collision detection and layer filtering
//! - Rigid body dynamics with gravity
//! - Collision environments that swap out parts of the static world
//! - Ray and swept-box traces, overlap queries, unstuck search
//! - Player hulls and stances

pub mod body;
pub mod collision;
pub mod environment;
pub mod material;
pub mod player;
pub mod shapes;
pub mod trace;
pub mod world;

// Re-export commonly used types
pub use body::{BodyKey, BodyType, ColliderKey, RigidBody, StaticCollider, SurfaceFlags};
pub use collision::{collide, overlaps, CollisionFilter, CollisionLayer, Contact};
pub use environment::{CollisionEnvironment, EnvironmentKey};
pub use material::{PhysicsMaterial, SurfaceMaterial};
pub use player::{PlayerHull, Stance};
pub use shapes::{Aabb, Collider, Obb, Plane, Sphere};
pub use trace::{Ray, RayIntersection};
pub use world::{BoxTrace, PhysicsConfig, PhysicsWorld, RayHit, TraceFilter, TraceTarget, CONTACT_TOLERANCE};
