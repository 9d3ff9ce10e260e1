//! Portal simulation demo
//!
//! Builds a small test chamber, shoots a floor and a wall portal and lets a
//! cube fall through them, logging every portal event on the way.

use portalsim::config::AppConfig;
use portalsim::scene::ChamberBuilder;
use portalsim::systems::SimulationSystem;
use portalsim_core::Vec3;
use portalsim_physics::SurfaceMaterial;
use portalsim_portal::{PortalError, PortalSide, PortalSystem};

const LINKAGE: u32 = 1;

fn main() {
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load config: {}. Using defaults.", e);
        AppConfig::default()
    });

    // RUST_LOG still wins over the configured level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.debug.log_level.as_str())).init();
    log::info!("Starting portal simulation");

    if let Err(e) = run(&config) {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run(config: &AppConfig) -> Result<(), PortalError> {
    let mut portals = PortalSystem::new(config.portal_config())?;
    let chamber = ChamberBuilder::new()
        .with_physics(config.physics.to_physics_config())
        .add_wall(Vec3::new(0.0, 0.0, -8.0), Vec3::new(1024.0, 1024.0, 8.0), SurfaceMaterial::CONCRETE)
        .add_wall(Vec3::new(400.0, 0.0, 128.0), Vec3::new(8.0, 512.0, 256.0), SurfaceMaterial::CONCRETE)
        .add_player(Vec3::new(0.0, -200.0, 36.0), LINKAGE)
        .add_prop("cube", Vec3::new(0.0, 0.0, 160.0), 8.0)
        .build(&mut portals);
    let mut world = chamber.world;

    let eye = Vec3::new(0.0, -200.0, 64.0);
    let shots = [
        (PortalSide::A, Vec3::new(0.0, 0.0, 0.0) - eye),
        (PortalSide::B, Vec3::new(392.0, 0.0, 128.0) - eye),
    ];
    for (side, direction) in shots {
        match portals.fire_portal(&mut world, LINKAGE, side, eye, direction.normalized())? {
            Some(outcome) => log::info!("Portal {:?}: {:?}", side, outcome.reason),
            None => log::warn!("Portal {:?} shot hit nothing", side),
        }
    }

    let mut sim = SimulationSystem::new(&config.simulation);
    let ticks = (config.simulation.demo_duration / sim.fixed_dt()).ceil() as u32;
    for _ in 0..ticks {
        sim.tick(&mut world, &mut portals);
        for event in portals.drain_events() {
            log::info!("[t={:.3}] {:?}", world.time(), event);
        }
    }

    if let Some((key, _)) = world.get_by_name("cube") {
        log::info!("Cube finished at {:?}", world.center(key));
    }
    log::debug!("Portal save:\n{}", portals.snapshot().to_ron()?);
    log::info!("Ran {} ticks", sim.total_ticks());
    Ok(())
}
