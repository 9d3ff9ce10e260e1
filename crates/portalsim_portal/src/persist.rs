//! Save and restore of portal state
//!
//! Each portal is saved as a flat record of named scalar and vector fields.
//! Links, simulators and ownership are not saved: they are rebuilt from the
//! restored poses and activation flags.

use std::fs;
use std::path::Path;

use portalsim_math::{Angles, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::PortalError;
use crate::linkage::LinkageRegistry;
use crate::portal::{LinkageId, PortalSide};

/// One portal's persisted fields
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortalSnapshot {
    pub linkage_id: LinkageId,
    pub side: PortalSide,
    pub origin: Vec3,
    pub angles: Angles,
    pub active: bool,
    pub color_index: u8,
    pub half_width: f32,
    pub half_height: f32,
}

/// Every portal of a level
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortalSave {
    pub portals: Vec<PortalSnapshot>,
}

impl PortalSave {
    /// Record every portal in the registry, grouped by linkage id then side
    pub fn capture(registry: &LinkageRegistry) -> Self {
        let mut portals: Vec<PortalSnapshot> = registry
            .iter()
            .map(|(_, p)| PortalSnapshot {
                linkage_id: p.linkage_id,
                side: p.side,
                origin: p.origin(),
                angles: p.angles(),
                active: p.is_active(),
                color_index: p.color_index,
                half_width: p.half_width(),
                half_height: p.half_height(),
            })
            .collect();
        portals.sort_by_key(|s| (s.linkage_id, s.side, !s.active));
        Self { portals }
    }

    pub fn to_ron(&self) -> Result<String, PortalError> {
        let pretty = ron::ser::PrettyConfig::new().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    pub fn from_ron(text: &str) -> Result<Self, PortalError> {
        Ok(ron::from_str(text)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PortalError> {
        let contents = self.to_ron()?;
        fs::write(path, contents).map_err(|e| PortalError::Snapshot(e.to_string()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PortalError> {
        let contents = fs::read_to_string(path).map_err(|e| PortalError::Snapshot(e.to_string()))?;
        Self::from_ron(&contents)
    }
}
