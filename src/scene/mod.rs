//! Chamber construction utilities
//!
//! This module provides a declarative API for building test chambers:
//! static geometry, players, props and portal volumes.

mod chamber_builder;

pub use chamber_builder::{Chamber, ChamberBuilder};
