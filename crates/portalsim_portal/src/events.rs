//! Portal notifications
//!
//! Everything observable the portal core does is recorded as a [`PortalEvent`]
//! in an [`EventBus`]. The host drains the log once per tick; listeners that
//! want a push-style hook register a [`PortalListener`] and get called as
//! events are emitted.

use portalsim_core::EntityKey;
use portalsim_math::Vec3;

use crate::grab::ReleaseReason;
use crate::placement::PlacementReason;
use crate::portal::{LinkageId, PortalKey};
use crate::volumes::VolumeKey;

/// Why a portal closed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FizzleReason {
    BadSurface,
    BadVolume,
    Overlap,
    Cleanser,
    /// The static surface it was placed on went away
    SurfaceLost,
    /// A moving brush pushed into the hole
    MovingBrush,
    Explicit,
    /// Its counterpart was placed over it
    Stolen,
    Removed,
}

impl FizzleReason {
    /// Cosmetic effect played for this reason
    pub fn effect(self) -> FizzleEffect {
        match self {
            FizzleReason::BadSurface | FizzleReason::BadVolume | FizzleReason::SurfaceLost => {
                FizzleEffect::BadSurface
            }
            FizzleReason::Overlap | FizzleReason::MovingBrush => FizzleEffect::Rejected,
            FizzleReason::Cleanser => FizzleEffect::Cleanser,
            FizzleReason::Explicit | FizzleReason::Stolen | FizzleReason::Removed => FizzleEffect::Close,
        }
    }
}

/// Cosmetic effect of a fizzle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FizzleEffect {
    Close,
    Rejected,
    BadSurface,
    Cleanser,
}

/// Something the portal core did
#[derive(Clone, Debug, PartialEq)]
pub enum PortalEvent {
    Activated {
        portal: PortalKey,
    },
    Deactivated {
        portal: PortalKey,
    },
    Linked {
        portal: PortalKey,
        partner: PortalKey,
    },
    Unlinked {
        portal: PortalKey,
    },
    Fizzled {
        portal: PortalKey,
        reason: FizzleReason,
        effect: FizzleEffect,
    },
    EntityTeleported {
        entity: EntityKey,
        /// Entrance
        from: PortalKey,
        /// Exit
        to: PortalKey,
        time: f64,
        forced_crouch: bool,
    },
    OwnershipChanged {
        entity: EntityKey,
        from: Option<PortalKey>,
        to: Option<PortalKey>,
    },
    EntityUnstuck {
        entity: EntityKey,
        portal: PortalKey,
        from: Vec3,
        to: Vec3,
    },
    EntityCrushed {
        entity: EntityKey,
        portal: PortalKey,
        damage: f32,
    },
    GrabReleased {
        holder: EntityKey,
        held: EntityKey,
        reason: ReleaseReason,
    },
    PlacementRejected {
        linkage_id: LinkageId,
        reason: PlacementReason,
        quality: f32,
    },
    DetectorPortalEntered {
        volume: VolumeKey,
        portal: PortalKey,
    },
    DetectorPortalLeft {
        volume: VolumeKey,
        portal: PortalKey,
    },
}

/// Push-style hooks; every method defaults to doing nothing
pub trait PortalListener {
    fn on_entity_teleported(&mut self, _entity: EntityKey, _portal: PortalKey, _time: f64, _forced_crouch: bool) {}
    fn on_portal_activated(&mut self, _portal: PortalKey) {}
    fn on_portal_deactivated(&mut self, _portal: PortalKey) {}
    fn on_portal_linked(&mut self, _portal: PortalKey, _partner: PortalKey) {}
    fn on_portal_fizzled(&mut self, _portal: PortalKey, _reason: FizzleReason) {}
    fn on_grab_released(&mut self, _holder: EntityKey, _held: EntityKey, _reason: ReleaseReason) {}
    /// Every event, including those with a dedicated hook
    fn on_event(&mut self, _event: &PortalEvent) {}
}

/// Event log plus registered listeners
#[derive(Default)]
pub struct EventBus {
    log: Vec<PortalEvent>,
    listeners: Vec<Box<dyn PortalListener>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("log", &self.log)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Box<dyn PortalListener>) {
        self.listeners.push(listener);
    }

    pub fn emit(&mut self, event: PortalEvent) {
        log::trace!("Portal event: {:?}", event);
        for listener in &mut self.listeners {
            dispatch(listener.as_mut(), &event);
        }
        self.log.push(event);
    }

    /// Events emitted since the last drain
    pub fn events(&self) -> &[PortalEvent] {
        &self.log
    }

    pub fn drain(&mut self) -> Vec<PortalEvent> {
        std::mem::take(&mut self.log)
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }
}

fn dispatch(listener: &mut dyn PortalListener, event: &PortalEvent) {
    match *event {
        PortalEvent::Activated { portal } => listener.on_portal_activated(portal),
        PortalEvent::Deactivated { portal } => listener.on_portal_deactivated(portal),
        PortalEvent::Linked { portal, partner } => listener.on_portal_linked(portal, partner),
        PortalEvent::Fizzled { portal, reason, .. } => listener.on_portal_fizzled(portal, reason),
        PortalEvent::EntityTeleported { entity, to, time, forced_crouch, .. } => {
            listener.on_entity_teleported(entity, to, time, forced_crouch)
        }
        PortalEvent::GrabReleased { holder, held, reason } => listener.on_grab_released(holder, held, reason),
        _ => {}
    }
    listener.on_event(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        fizzles: Rc<RefCell<Vec<FizzleReason>>>,
        seen: Rc<RefCell<usize>>,
    }

    impl PortalListener for Recorder {
        fn on_portal_fizzled(&mut self, _portal: PortalKey, reason: FizzleReason) {
            self.fizzles.borrow_mut().push(reason);
        }

        fn on_event(&mut self, _event: &PortalEvent) {
            *self.seen.borrow_mut() += 1;
        }
    }

    #[test]
    fn test_effect_follows_reason() {
        assert_eq!(FizzleReason::Cleanser.effect(), FizzleEffect::Cleanser);
        assert_eq!(FizzleReason::Stolen.effect(), FizzleEffect::Close);
        assert_eq!(FizzleReason::SurfaceLost.effect(), FizzleEffect::BadSurface);
        assert_eq!(FizzleReason::MovingBrush.effect(), FizzleEffect::Rejected);
    }

    #[test]
    fn test_bus_logs_and_dispatches() {
        let portal = SlotMap::<PortalKey, ()>::with_key().insert(());
        let recorder = Recorder::default();
        let fizzles = recorder.fizzles.clone();
        let seen = recorder.seen.clone();

        let mut bus = EventBus::new();
        bus.add_listener(Box::new(recorder));
        bus.emit(PortalEvent::Activated { portal });
        bus.emit(PortalEvent::Fizzled {
            portal,
            reason: FizzleReason::Explicit,
            effect: FizzleReason::Explicit.effect(),
        });

        assert_eq!(bus.events().len(), 2);
        assert_eq!(*fizzles.borrow(), vec![FizzleReason::Explicit]);
        assert_eq!(*seen.borrow(), 2);

        let drained = bus.drain();
        assert_eq!(drained.len(), 2);
        assert!(bus.events().is_empty());
    }
}
