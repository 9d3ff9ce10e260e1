//! Application configuration
//!
//! Configuration is loaded from multiple sources with the following priority (lowest to highest):
//! 1. `config/default.toml` (version controlled)
//! 2. `config/user.toml` (gitignored, user overrides)
//! 3. Environment variables (`PSIM_SECTION__KEY`)

use figment::{Figment, providers::{Format, Toml, Env}};
use portalsim_portal::PortalConfig;
use serde::{Serialize, Deserialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fixed-timestep driver
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Host physics
    #[serde(default)]
    pub physics: PhysicsConfig,
    /// Portal tuning, passed through to the portal system
    #[serde(default)]
    pub portal: PortalConfig,
    /// Debug configuration
    #[serde(default)]
    pub debug: DebugConfig,
}

impl AppConfig {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. `config/default.toml`
    /// 2. `config/user.toml`
    /// 3. Environment variables (`PSIM_*`)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific config directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let default_path = config_dir.join("default.toml");
        let user_path = config_dir.join("user.toml");

        let mut figment = Figment::new();

        if default_path.exists() {
            figment = figment.merge(Toml::file(&default_path));
        }

        // Load user config (optional)
        if user_path.exists() {
            figment = figment.merge(Toml::file(&user_path));
        }

        // Environment variables override everything
        // PSIM_PORTAL__HOLE__HALF_WIDTH=40 -> portal.hole.half_width = 40
        figment = figment.merge(Env::prefixed("PSIM_").split("__"));

        let config: Self = figment.extract()?;
        config.portal.validate().map_err(|e| ConfigError { message: e.to_string() })?;
        Ok(config)
    }

    /// Portal tuning with the debug overrides folded in
    pub fn portal_config(&self) -> PortalConfig {
        let mut portal = self.portal.clone();
        portal.debug.force_placement_success |= self.debug.force_placement_success;
        portal
    }
}

/// Fixed-timestep driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Fixed ticks per second
    pub tick_rate: f32,
    /// Longest frame the driver will catch up on, in seconds
    pub max_frame_time: f32,
    /// Seconds of simulated time the headless demo runs for
    pub demo_duration: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_frame_time: 0.25,
            demo_duration: 3.0,
        }
    }
}

impl SimulationConfig {
    pub fn fixed_dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1.0)
    }
}

/// Physics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Gravity along Z in inches per second squared (negative = downward)
    pub gravity: f32,
    /// Speed limit for every moving body
    pub max_velocity: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: -600.0,
            max_velocity: 3500.0,
        }
    }
}

impl PhysicsConfig {
    /// Convert to the physics engine's config
    pub fn to_physics_config(&self) -> portalsim_core::PhysicsConfig {
        portalsim_core::PhysicsConfig {
            gravity: self.gravity,
            max_velocity: self.max_velocity,
        }
    }
}

/// Debug configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Every portal placement succeeds
    pub force_placement_success: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            force_placement_success: false,
        }
    }
}

/// Configuration error
#[derive(Debug)]
pub struct ConfigError {
    message: String,
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError {
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}
