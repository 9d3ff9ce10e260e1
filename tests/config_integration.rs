//! Integration tests for configuration loading
//!
//! Tests that verify config loading from files and environment variables.

use portalsim::config::AppConfig;
use serial_test::serial;

#[test]
#[serial]
fn test_env_override() {
    std::env::set_var("PSIM_PORTAL__HOLE__HALF_WIDTH", "40.0");
    let config = AppConfig::load().unwrap();
    assert_eq!(config.portal.hole.half_width, 40.0);
    std::env::remove_var("PSIM_PORTAL__HOLE__HALF_WIDTH");
}

#[test]
#[serial]
fn test_default_file_matches_built_in_defaults() {
    std::env::remove_var("PSIM_PORTAL__HOLE__HALF_WIDTH");

    let cwd = std::env::current_dir().unwrap();
    assert!(cwd.join("config/default.toml").exists());

    let config = AppConfig::load_from(cwd.join("config")).unwrap();
    let defaults = AppConfig::default();
    assert_eq!(config.portal.hole, defaults.portal.hole);
    assert_eq!(config.portal.simulator, defaults.portal.simulator);
    assert!((config.portal.teleport.floor_normal_threshold - defaults.portal.teleport.floor_normal_threshold).abs() < 1e-4);
    assert!((config.portal.placement.overlap_quality - 0.027).abs() < 1e-6);
    assert_eq!(config.simulation.tick_rate, 60.0);
    assert_eq!(config.debug.log_level, "info");
}

#[test]
#[serial]
fn test_degenerate_hole_is_rejected() {
    std::env::set_var("PSIM_PORTAL__HOLE__HALF_HEIGHT", "0.0");
    let result = AppConfig::load();
    std::env::remove_var("PSIM_PORTAL__HOLE__HALF_HEIGHT");
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_missing_directory_falls_back_to_defaults() {
    let config = AppConfig::load_from("does/not/exist").unwrap();
    assert_eq!(config.physics.gravity, -600.0);
    assert!(!config.portal_config().debug.force_placement_success);
}
