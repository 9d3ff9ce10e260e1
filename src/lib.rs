//! Portal simulation application crate
//!
//! Ties the portal core to a host: layered configuration, chamber
//! construction and the fixed-timestep driver used by the demo binary.

pub mod config;
pub mod scene;
pub mod systems;
