//! Mailbox bookkeeping: echo detection, the outbound send queue pending key establishment,
//! and the buffered-vs-awaited bookkeeping for inbound application messages.
//!
//! Grounded on the teacher's `MailboxMachine`, which tracks a `HashSet<Phase>` of phases
//! already seen to detect the server echoing our own sends back to us.

use std::collections::{HashMap, HashSet, VecDeque};

use futures::channel::oneshot;

use crate::error::WormholeError;
use crate::ids::Phase;

/// Pending plaintext queued to go out as soon as the session key is known.
pub type PendingSend = (Phase, Vec<u8>);

#[derive(Default)]
pub struct Mailbox {
    /// Phases we've already seen a `message` frame for, echoes included. Used solely to
    /// detect and drop the echo of our own `pake`/application sends (invariant 3).
    seen: HashSet<Phase>,
    /// Outbound plaintexts waiting on the key before they can be encrypted and sent.
    send_queue: VecDeque<PendingSend>,
    /// Next outbound application phase number.
    next_send_phase: u64,
    /// Next application phase number the application is expected to `get()`.
    next_recv_phase: u64,
    /// Messages that arrived before the application asked for them.
    received: HashMap<Phase, Vec<u8>>,
    /// A single pending `get()` result per phase, installed when the application asked
    /// before the message arrived.
    waiters: HashMap<Phase, oneshot::Sender<Result<Vec<u8>, WormholeError>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if a `message` frame for `phase` has already been processed (used to silently
    /// drop echoes of our own sends rather than deliver them to the application).
    pub fn is_echo(&self, phase: &Phase) -> bool {
        self.seen.contains(phase)
    }

    pub fn mark_seen(&mut self, phase: Phase) {
        self.seen.insert(phase);
    }

    pub fn next_send_phase(&mut self) -> Phase {
        let phase = Phase::numeric(self.next_send_phase);
        self.next_send_phase += 1;
        phase
    }

    pub fn queue_send(&mut self, phase: Phase, plaintext: Vec<u8>) {
        self.send_queue.push_back((phase, plaintext));
    }

    /// Drain everything queued before the key was known, in send order.
    pub fn drain_send_queue(&mut self) -> Vec<PendingSend> {
        self.send_queue.drain(..).collect()
    }

    /// Record a phase + plaintext. If a waiter is already installed for that phase, it is
    /// resolved and returned (so the caller can avoid holding both a waiter and a buffered
    /// value for the same phase, per invariant 4); otherwise the plaintext is buffered.
    pub fn deliver(&mut self, phase: Phase, plaintext: Vec<u8>) {
        if let Some(waiter) = self.waiters.remove(&phase) {
            let _ = waiter.send(Ok(plaintext));
        } else {
            self.received.insert(phase, plaintext);
        }
    }

    /// `get()`: resolve `result` immediately if the next expected phase is already
    /// buffered, otherwise install it as a waiter to be resolved by a later `deliver`.
    pub fn get(&mut self, result: oneshot::Sender<Result<Vec<u8>, WormholeError>>) {
        let phase = Phase::numeric(self.next_recv_phase);
        self.next_recv_phase += 1;
        match self.received.remove(&phase) {
            Some(plaintext) => {
                let _ = result.send(Ok(plaintext));
            }
            None => {
                self.waiters.insert(phase, result);
            }
        }
    }

    /// Fail every outstanding waiter with `err`, e.g. because the session errored or was
    /// closed while `get()` calls were still pending.
    pub fn fail_all_waiters(&mut self, err: &WormholeError) {
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(Err(err.clone()));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn echo_detection_is_per_phase() {
        let mut m = Mailbox::new();
        assert!(!m.is_echo(&Phase::PAKE));
        m.mark_seen(Phase::PAKE);
        assert!(m.is_echo(&Phase::PAKE));
        assert!(!m.is_echo(&Phase::CONFIRM));
    }

    #[test]
    fn send_phases_increment() {
        let mut m = Mailbox::new();
        assert_eq!(m.next_send_phase(), Phase::numeric(0));
        assert_eq!(m.next_send_phase(), Phase::numeric(1));
    }

    #[test]
    fn buffered_message_is_returned_synchronously() {
        let mut m = Mailbox::new();
        m.deliver(Phase::numeric(0), b"hello".to_vec());
        let (tx, rx) = oneshot::channel();
        m.get(tx);
        assert_eq!(rx.try_recv().unwrap().unwrap().unwrap(), b"hello".to_vec());
    }

    #[test]
    fn waiter_is_resolved_when_message_arrives_later() {
        let mut m = Mailbox::new();
        let (tx, rx) = oneshot::channel();
        m.get(tx);
        assert!(rx.try_recv().unwrap().is_none(), "no message yet, waiter should still be pending");
        m.deliver(Phase::numeric(0), b"later".to_vec());
        assert_eq!(rx.try_recv().unwrap().unwrap().unwrap(), b"later".to_vec());
    }

    #[test]
    fn send_queue_drains_in_order() {
        let mut m = Mailbox::new();
        m.queue_send(Phase::numeric(0), b"a".to_vec());
        m.queue_send(Phase::numeric(1), b"b".to_vec());
        let drained = m.drain_send_queue();
        assert_eq!(drained, vec![(Phase::numeric(0), b"a".to_vec()), (Phase::numeric(1), b"b".to_vec())]);
        assert!(m.drain_send_queue().is_empty());
    }
}
