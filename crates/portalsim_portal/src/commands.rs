//! Deferred structural changes
//!
//! Fizzles, removals and placement completions are queued and applied at a
//! single point in the tick, never from inside the loop that discovers them.

use std::collections::VecDeque;

use crate::events::FizzleReason;
use crate::portal::PortalKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortalCommand {
    Fizzle { portal: PortalKey, reason: FizzleReason },
    Remove { portal: PortalKey },
    /// Activate and link a portal whose placement succeeded
    CompletePlacement { portal: PortalKey },
}

impl PortalCommand {
    pub fn portal(&self) -> PortalKey {
        match *self {
            PortalCommand::Fizzle { portal, .. }
            | PortalCommand::Remove { portal }
            | PortalCommand::CompletePlacement { portal } => portal,
        }
    }
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    queue: VecDeque<PortalCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: PortalCommand) {
        self.queue.push_back(command);
    }

    pub fn pop(&mut self) -> Option<PortalCommand> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop a pending placement completion; returns whether one was queued
    pub fn cancel_placement(&mut self, portal: PortalKey) -> bool {
        let before = self.queue.len();
        self.queue
            .retain(|c| !matches!(c, PortalCommand::CompletePlacement { portal: p } if *p == portal));
        self.queue.len() != before
    }

    pub fn contains(&self, command: &PortalCommand) -> bool {
        self.queue.contains(command)
    }

    pub fn has_pending_placement(&self, portal: PortalKey) -> bool {
        self.queue
            .iter()
            .any(|c| matches!(c, PortalCommand::CompletePlacement { portal: p } if *p == portal))
    }

    /// Forget everything queued for a portal
    pub fn forget_portal(&mut self, portal: PortalKey) {
        self.queue.retain(|c| c.portal() != portal);
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_fifo_order() {
        let mut keys = SlotMap::<PortalKey, ()>::with_key();
        let (a, b) = (keys.insert(()), keys.insert(()));
        let mut queue = CommandQueue::new();
        queue.push(PortalCommand::CompletePlacement { portal: a });
        queue.push(PortalCommand::Fizzle { portal: b, reason: FizzleReason::Explicit });

        assert_eq!(queue.pop(), Some(PortalCommand::CompletePlacement { portal: a }));
        assert_eq!(queue.pop().map(|c| c.portal()), Some(b));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_placement_only_touches_completion() {
        let mut keys = SlotMap::<PortalKey, ()>::with_key();
        let a = keys.insert(());
        let mut queue = CommandQueue::new();
        queue.push(PortalCommand::CompletePlacement { portal: a });
        queue.push(PortalCommand::Fizzle { portal: a, reason: FizzleReason::Explicit });

        assert!(queue.has_pending_placement(a));
        assert!(queue.cancel_placement(a));
        assert!(!queue.cancel_placement(a));
        assert_eq!(queue.len(), 1);

        queue.forget_portal(a);
        assert!(queue.is_empty());
    }
}
