//! The closure sub-state machine: tracks whether the nameplate side and the mailbox side
//! of teardown are each still outstanding, independently, and signals "stop" (drop the
//! transport) only once both are done and a close was actually requested.
//!
//! Mirrors the shape of the teacher's `TerminatorMachine`, collapsed from its named
//! cross-product of states to two booleans — the cross product and the booleans are
//! equivalent for our purposes, since "close requested" is tracked once at the `Session`
//! level rather than re-derived per state.

/// Whether a `release`/`close` was ever emitted that some ack could still be outstanding
/// for, and whether that ack has arrived.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Terminator {
    /// `None` if no nameplate was ever claimed (nothing to release).
    nameplate_active: Option<bool>,
    /// `None` if no mailbox was ever opened (nothing to close).
    mailbox_active: Option<bool>,
    close_requested: bool,
}

impl Terminator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call once a nameplate has been claimed: there is now a `release` we must see
    /// acknowledged before stopping.
    pub fn nameplate_claimed(&mut self) {
        self.nameplate_active = Some(true);
    }

    /// Call once a mailbox has been opened: there is now a `close` we must see
    /// acknowledged before stopping.
    pub fn mailbox_opened(&mut self) {
        self.mailbox_active = Some(true);
    }

    /// The server acknowledged our `release`.
    pub fn released(&mut self) -> bool {
        self.nameplate_active = Some(false);
        self.should_stop()
    }

    /// The server acknowledged our `close`.
    pub fn closed(&mut self) -> bool {
        self.mailbox_active = Some(false);
        self.should_stop()
    }

    /// `close()` was called; returns whether we should stop immediately (nothing was ever
    /// claimed or opened).
    pub fn close_requested(&mut self) -> bool {
        self.close_requested = true;
        self.should_stop()
    }

    fn should_stop(&self) -> bool {
        self.close_requested
            && self.nameplate_active != Some(true)
            && self.mailbox_active != Some(true)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stops_immediately_if_nothing_was_ever_opened() {
        let mut t = Terminator::new();
        assert!(t.close_requested());
    }

    #[test]
    fn waits_for_release_ack_before_stopping() {
        let mut t = Terminator::new();
        t.nameplate_claimed();
        assert!(!t.close_requested());
        assert!(t.released());
    }

    #[test]
    fn waits_for_both_release_and_close_acks() {
        let mut t = Terminator::new();
        t.nameplate_claimed();
        t.mailbox_opened();
        assert!(!t.close_requested());
        assert!(!t.released());
        assert!(t.closed());
    }

    #[test]
    fn order_of_acks_does_not_matter() {
        let mut t = Terminator::new();
        t.nameplate_claimed();
        t.mailbox_opened();
        t.close_requested();
        assert!(!t.closed());
        assert!(t.released());
    }

    #[test]
    fn close_before_claim_or_open_stops_once_requested() {
        let mut t = Terminator::new();
        assert!(t.close_requested());
    }
}
