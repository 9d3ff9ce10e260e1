//! Portal tuning
//!
//! Units are inches and seconds. Every section deserializes with defaults
//! for missing fields, so a host config file only needs the values it changes.

use serde::{Deserialize, Serialize};

use crate::error::PortalError;

/// All portal tuning, grouped by subsystem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub hole: HoleConfig,
    pub teleport: TeleportConfig,
    pub grab: GrabConfig,
    pub placement: PlacementConfig,
    pub simulator: SimulatorConfig,
    pub debug: PortalDebugConfig,
}

impl PortalConfig {
    /// Check the values that would make portals degenerate
    pub fn validate(&self) -> Result<(), PortalError> {
        self.hole.validate()?;
        if self.simulator.claim_depth <= 0.0 || self.simulator.tunnel_depth <= 0.0 {
            return Err(PortalError::InvalidGeometry {
                reason: "simulator depths must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Size of the teleportation aperture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoleConfig {
    /// Half size along the portal's left axis
    pub half_width: f32,
    /// Half size along the portal's up axis
    pub half_height: f32,
    /// Half thickness of the portal volume used for overlap tests
    pub half_depth: f32,
}

impl Default for HoleConfig {
    fn default() -> Self {
        Self {
            half_width: 32.0,
            half_height: 54.0,
            half_depth: 2.0,
        }
    }
}

impl HoleConfig {
    pub fn validate(&self) -> Result<(), PortalError> {
        validate_hole(self.half_width, self.half_height)?;
        if !(self.half_depth.is_finite() && self.half_depth > 0.0) {
            return Err(PortalError::InvalidGeometry {
                reason: format!("half depth {} is not positive", self.half_depth),
            });
        }
        Ok(())
    }
}

/// Refuse hole sizes that are not finite and strictly positive
pub fn validate_hole(half_width: f32, half_height: f32) -> Result<(), PortalError> {
    if !(half_width.is_finite() && half_width > 0.0) {
        return Err(PortalError::InvalidGeometry {
            reason: format!("half width {} is not positive", half_width),
        });
    }
    if !(half_height.is_finite() && half_height > 0.0) {
        return Err(PortalError::InvalidGeometry {
            reason: format!("half height {} is not positive", half_height),
        });
    }
    Ok(())
}

/// Exit speed rules and player reorientation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleportConfig {
    /// Smallest outward speed leaving any portal
    pub min_exit_speed: f32,
    /// Smallest outward speed when either portal of the pair faces up or down
    pub floor_exit_min_speed: f32,
    /// Cap on total exit speed
    pub max_exit_speed: f32,
    /// A portal normal with |z| above this counts as a floor or ceiling
    pub floor_normal_threshold: f32,
    /// Look directions with |z| above this reorient by roll instead of pitch
    pub roll_reorient_threshold: f32,
    /// Normals with |dot| below this count as perpendicular for forced crouch
    pub perpendicular_threshold: f32,
}

impl Default for TeleportConfig {
    fn default() -> Self {
        Self {
            min_exit_speed: 50.0,
            floor_exit_min_speed: 200.0,
            max_exit_speed: 1000.0,
            floor_normal_threshold: std::f32::consts::FRAC_1_SQRT_2,
            roll_reorient_threshold: 0.9,
            perpendicular_threshold: 0.3,
        }
    }
}

/// Held-object controller tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabConfig {
    /// Preferred distance from the holder's eye to the hold point
    pub hold_distance: f32,
    /// Position error tolerated before the release timer runs
    pub error_tolerance: f32,
    /// Tolerance multiplier while the object is held across a portal
    pub cross_portal_tolerance_scale: f32,
    /// How long the error may exceed tolerance before the object drops
    pub grace_period: f32,
    /// Fastest the controller will move the object
    pub max_speed: f32,
    /// Fastest the controller will spin the object (radians per second)
    pub max_angular_speed: f32,
    /// Longest reach when picking up
    pub pickup_range: f32,
    /// Search radius used to free an object dropped inside geometry
    pub drop_unstuck_radius: f32,
}

impl Default for GrabConfig {
    fn default() -> Self {
        Self {
            hold_distance: 60.0,
            error_tolerance: 24.0,
            cross_portal_tolerance_scale: 2.0,
            grace_period: 1.0,
            max_speed: 1200.0,
            max_angular_speed: 20.0,
            pickup_range: 96.0,
            drop_unstuck_radius: 64.0,
        }
    }
}

/// Placement quality values and tolerances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub success_quality: f32,
    pub bumped_quality: f32,
    pub cleanser_quality: f32,
    pub overlap_quality: f32,
    pub bad_volume_quality: f32,
    pub bad_surface_quality: f32,
    /// How far behind the hole the surface check looks for backing geometry
    pub surface_probe_depth: f32,
    /// Minimum dot between the hit normal and the portal normal
    pub surface_flatness: f32,
    /// Farthest a placement may be nudged to clear another portal
    pub max_bump_distance: f32,
    /// Centers closer than this over a counterpart count as a steal
    pub steal_tolerance: f32,
    /// Distance the portal origin sits off the surface it is placed on
    pub surface_offset: f32,
    /// Longest portal gun shot
    pub max_fire_distance: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            success_quality: 1.0,
            bumped_quality: 0.3,
            cleanser_quality: 0.028,
            overlap_quality: 0.027,
            bad_volume_quality: 0.026,
            bad_surface_quality: 0.025,
            surface_probe_depth: 8.0,
            surface_flatness: 0.99,
            max_bump_distance: 48.0,
            steal_tolerance: 4.0,
            surface_offset: 0.5,
            max_fire_distance: 8192.0,
        }
    }
}

/// Per-portal collision environment tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Depth in front of the hole where entities are claimed
    pub claim_depth: f32,
    /// Depth behind the hole kept open and filled with linked geometry
    pub tunnel_depth: f32,
    /// Half size of the wall replica around the hole
    pub replica_extent: f32,
    /// Damage dealt to an owned entity that cannot be freed
    pub stuck_damage: f32,
    /// Search radius for freeing a stuck entity
    pub unstuck_radius: f32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            claim_depth: 64.0,
            tunnel_depth: 128.0,
            replica_extent: 256.0,
            stuck_damage: 1000.0,
            unstuck_radius: 64.0,
        }
    }
}

/// Debug overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalDebugConfig {
    /// Every placement succeeds regardless of the checks
    pub force_placement_success: bool,
}
