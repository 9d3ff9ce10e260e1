//! Fixed-timestep simulation system
//!
//! Manages the simulation loop including:
//! - Delta time calculation
//! - Fixed-tick accumulation
//! - Portal passes around the physics step

use std::time::Instant;

use portalsim_core::World;
use portalsim_portal::{PortalEvent, PortalSystem};

use crate::config::SimulationConfig;

/// Result of a simulation update
pub struct SimulationResult {
    /// Fixed ticks run this frame
    pub ticks: u32,
    /// Portal events emitted during those ticks
    pub events: Vec<PortalEvent>,
}

/// Runs the portal system and physics at a fixed rate
///
/// Each tick runs, in order:
/// - `PortalSystem::pre_physics`
/// - `World::step`
/// - `PortalSystem::post_physics`
pub struct SimulationSystem {
    last_frame: Instant,
    accumulator: f32,
    fixed_dt: f32,
    max_frame_time: f32,
    total_ticks: u64,
}

impl SimulationSystem {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            last_frame: Instant::now(),
            accumulator: 0.0,
            fixed_dt: config.fixed_dt(),
            max_frame_time: config.max_frame_time,
            total_ticks: 0,
        }
    }

    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Run one frame with the wall-clock time since the last call
    pub fn update(&mut self, world: &mut World, portals: &mut PortalSystem) -> SimulationResult {
        let now = Instant::now();
        let frame_dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.advance(world, portals, frame_dt)
    }

    /// Run as many fixed ticks as `frame_dt` covers
    ///
    /// Frame time is capped at `max_frame_time`; the remainder carries over
    /// to the next call.
    pub fn advance(&mut self, world: &mut World, portals: &mut PortalSystem, frame_dt: f32) -> SimulationResult {
        self.accumulator += frame_dt.clamp(0.0, self.max_frame_time);

        let mut ticks = 0;
        while self.accumulator >= self.fixed_dt {
            self.accumulator -= self.fixed_dt;
            self.tick(world, portals);
            ticks += 1;
        }
        if ticks > 0 {
            log::trace!("Ran {} ticks, {:.4}s carried over", ticks, self.accumulator);
        }
        SimulationResult {
            ticks,
            events: portals.drain_events(),
        }
    }

    /// Exactly one fixed tick
    pub fn tick(&mut self, world: &mut World, portals: &mut PortalSystem) {
        portals.pre_physics(world, self.fixed_dt);
        world.step(self.fixed_dt);
        portals.post_physics(world, self.fixed_dt);
        self.total_ticks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ChamberBuilder;
    use portalsim_core::{Angles, Vec3};
    use portalsim_physics::SurfaceMaterial;
    use portalsim_portal::{PlacedBy, PlacementRequest, PortalConfig, PortalSide};

    fn config() -> SimulationConfig {
        SimulationConfig {
            tick_rate: 60.0,
            max_frame_time: 0.25,
            demo_duration: 1.0,
        }
    }

    fn empty() -> (World, PortalSystem) {
        let mut portals = PortalSystem::new(PortalConfig::default()).unwrap();
        let chamber = ChamberBuilder::new().build(&mut portals);
        (chamber.world, portals)
    }

    #[test]
    fn test_accumulator_carries_remainder() {
        let (mut world, mut portals) = empty();
        let mut sim = SimulationSystem::new(&config());

        // 1.5 ticks, then another 0.5
        let result = sim.advance(&mut world, &mut portals, 1.5 / 60.0);
        assert_eq!(result.ticks, 1);
        let result = sim.advance(&mut world, &mut portals, 0.6 / 60.0);
        assert_eq!(result.ticks, 1);
        assert_eq!(sim.total_ticks(), 2);
        assert!((world.time() - 2.0 / 60.0).abs() < 1e-5);
    }

    #[test]
    fn test_long_frame_is_capped() {
        let (mut world, mut portals) = empty();
        let mut sim = SimulationSystem::new(&config());
        let result = sim.advance(&mut world, &mut portals, 5.0);
        assert_eq!(result.ticks, 15);
    }

    #[test]
    fn test_negative_frame_runs_nothing() {
        let (mut world, mut portals) = empty();
        let mut sim = SimulationSystem::new(&config());
        assert_eq!(sim.advance(&mut world, &mut portals, -1.0).ticks, 0);
    }

    #[test]
    fn test_cube_falls_through_floor_portal_and_out_of_wall() {
        let mut portals = PortalSystem::new(PortalConfig::default()).unwrap();
        let chamber = ChamberBuilder::new()
            .with_gravity(-600.0)
            .add_wall(Vec3::new(0.0, 0.0, -8.0), Vec3::new(1024.0, 1024.0, 8.0), SurfaceMaterial::CONCRETE)
            .add_wall(Vec3::new(400.0, 0.0, 128.0), Vec3::new(8.0, 512.0, 256.0), SurfaceMaterial::CONCRETE)
            .add_prop("cube", Vec3::new(0.0, 0.0, 120.0), 8.0)
            .build(&mut portals);
        let mut world = chamber.world;
        let (cube, _) = world.get_by_name("cube").unwrap();

        for (side, origin, angles) in [
            (PortalSide::A, Vec3::new(0.0, 0.0, 0.5), Angles::new(-90.0, 0.0, 0.0)),
            (PortalSide::B, Vec3::new(391.5, 0.0, 128.0), Angles::new(0.0, 180.0, 0.0)),
        ] {
            let request = PlacementRequest::new(1, side, origin, angles, PlacedBy::Designer);
            assert!(portals.attempt_place_portal(&mut world, &request).unwrap().is_success());
        }

        let mut sim = SimulationSystem::new(&config());
        let mut teleported = false;
        for _ in 0..120 {
            sim.tick(&mut world, &mut portals);
            teleported |= portals
                .drain_events()
                .iter()
                .any(|e| matches!(*e, PortalEvent::EntityTeleported { entity, .. } if entity == cube));
            if teleported {
                break;
            }
        }
        assert!(teleported);
        let (velocity, _) = world.velocity(cube).unwrap();
        // Out of the wall portal, moving away from it
        assert!(velocity.x < -199.0, "got {:?}", velocity);
        assert!(world.center(cube).unwrap().x < 391.5);
    }
}
