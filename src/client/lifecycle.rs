// src/client/lifecycle.rs

//! Aggregate readiness and end-of-life for a connection pair.
//!
//! Each connection reports `Ready` and `End` on its own. The client turns
//! those into one `ready` and one `end` signal using a pair of one-shot
//! latches. A latch remembers which roles have signalled rather than counting
//! signals, so a connection that reports `Ready` again after a reconnect can
//! neither complete the latch on its own nor fire it a second time.

use crate::{ConnectionEvent, ConnectionRole};

/// One-shot latch that opens once both connection roles have signalled.
#[derive(Debug, Default, Clone)]
pub struct AggregateLatch {
    // ---
    seen: [bool; 2],
    fired: bool,
}

impl AggregateLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signal from `role`.
    ///
    /// Returns `true` exactly once: on the signal that completes the pair.
    pub fn observe(&mut self, role: ConnectionRole) -> bool {
        // ---
        if self.fired {
            return false;
        }

        self.seen[role.index()] = true;
        self.fired = self.seen.iter().all(|seen| *seen);
        self.fired
    }

    /// Whether the latch has opened.
    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

/// Aggregate signal produced by [`Lifecycle::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Aggregate {
    Ready,
    End,
}

/// Ready and end latches owned by one client.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    ready: AggregateLatch,
    end: AggregateLatch,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, role: ConnectionRole, event: &ConnectionEvent) -> Option<Aggregate> {
        // ---
        match event {
            ConnectionEvent::Ready if self.ready.observe(role) => Some(Aggregate::Ready),
            ConnectionEvent::End if self.end.observe(role) => Some(Aggregate::End),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionRole::{Emitter, Receiver};

    #[test]
    fn opens_after_both_roles_in_either_order() {
        let mut latch = AggregateLatch::new();
        assert!(!latch.observe(Receiver));
        assert!(latch.observe(Emitter));

        let mut latch = AggregateLatch::new();
        assert!(!latch.observe(Emitter));
        assert!(latch.observe(Receiver));
        assert!(latch.has_fired());
    }

    #[test]
    fn repeated_signal_from_one_role_does_not_open() {
        let mut latch = AggregateLatch::new();
        assert!(!latch.observe(Receiver));
        assert!(!latch.observe(Receiver));
        assert!(!latch.has_fired());
    }

    #[test]
    fn never_fires_twice() {
        let mut latch = AggregateLatch::new();
        latch.observe(Emitter);
        assert!(latch.observe(Receiver));
        assert!(!latch.observe(Receiver));
        assert!(!latch.observe(Emitter));
    }

    #[test]
    fn lifecycle_tracks_ready_and_end_separately() {
        let mut lifecycle = Lifecycle::new();

        assert_eq!(lifecycle.observe(Emitter, &ConnectionEvent::Ready), None);
        assert_eq!(lifecycle.observe(Emitter, &ConnectionEvent::End), None);
        assert_eq!(
            lifecycle.observe(Receiver, &ConnectionEvent::Ready),
            Some(Aggregate::Ready)
        );
        assert_eq!(
            lifecycle.observe(Receiver, &ConnectionEvent::End),
            Some(Aggregate::End)
        );
        assert_eq!(lifecycle.observe(Receiver, &ConnectionEvent::Ready), None);
    }
}
