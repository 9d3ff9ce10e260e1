//! Shared fixtures for unit tests

use portalsim_core::{Angles, Transform3D, Vec3, World};

use crate::linkage::LinkageRegistry;
use crate::portal::{PortalKey, PortalSide};
use crate::simulator::sync_attachment;

/// Upright portal facing along `yaw`
pub fn wall_pose(origin: Vec3, yaw: f32) -> Transform3D {
    Transform3D::from_origin_angles(origin, Angles::new(0.0, yaw, 0.0))
}

/// Place and open both sides of group 1
pub fn open_pair(
    world: &mut World,
    registry: &mut LinkageRegistry,
    a_pose: Transform3D,
    b_pose: Transform3D,
) -> (PortalKey, PortalKey) {
    let a = registry.create(1, PortalSide::A).unwrap();
    let b = registry.create(1, PortalSide::B).unwrap();
    for (key, pose) in [(a, a_pose), (b, b_pose)] {
        let portal = registry.get_mut(key).unwrap();
        portal.set_transform(pose);
        portal.simulator.move_to(world.physics_mut(), pose.position, pose.angles());
        registry.activate(key);
    }
    registry.relink(1);
    sync_attachment(registry, world.physics_mut(), a);
    sync_attachment(registry, world.physics_mut(), b);
    (a, b)
}
