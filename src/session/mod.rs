//! The protocol state machine: one `Session` per wormhole, driven entirely from a single
//! driver task (see [`crate::api`]) that alternates between user intents and inbound
//! server frames. No method here ever blocks or awaits; every suspension the public API
//! exposes is modelled as a `oneshot` channel the caller awaits independently.

pub mod mailbox;
pub mod terminator;

use std::sync::Arc;

use futures::channel::oneshot;
use tracing::warn;

use crate::code::{complete_allocated_code, CodeInputHelper, CodeState};
use crate::crypto::{self, Key, PakeState};
use crate::error::{ServerError, UsageError, WormholeError};
use crate::ids::{AppID, Code, Mailbox as MailboxId, Mood, MySide, Nameplate, Phase};
use crate::server_messages::{self, ClientMessage, ServerMessage};
use crate::welcome::WelcomeHandler;
use crate::wordlist::Wordlist;

use mailbox::Mailbox;
use terminator::Terminator;

type DoneResult<T> = oneshot::Sender<Result<T, WormholeError>>;

/// One fulfilled-once slot for `verify()`: the single winner of {key established, confirm
/// received} resolves it. `None` once taken.
enum Verifier {
    NotRequested,
    Requested(DoneResult<Vec<u8>>),
    Resolved(Vec<u8>),
}

/// A user intent delivered to the driver task over the intent channel.
pub enum Intent {
    SetCode(Code, DoneResult<()>),
    GetCode(usize, DoneResult<Code>),
    InputCode(Arc<dyn CodeInputHelper>, DoneResult<Code>),
    Verify(DoneResult<Vec<u8>>),
    Send(Vec<u8>),
    Get(DoneResult<Vec<u8>>),
    DeriveKey(String, usize, DoneResult<Vec<u8>>),
    Close(Mood, DoneResult<()>),
}

/// What the driver should do after feeding one server frame to the session.
pub enum HandledMessage {
    /// Send these frames (possibly none) and move on to the next event.
    Frames(Vec<ClientMessage>),
    /// Await the collaborator for a nameplate and trailing words, then call
    /// [`Session::complete_input`] with the answer.
    NeedsCodeInput(Arc<dyn CodeInputHelper>, Vec<Nameplate>),
}

pub struct Session {
    app_id: AppID,
    side: MySide,
    code_state: CodeState,
    nameplate: Option<Nameplate>,
    mailbox_id: Option<MailboxId>,
    pake_state: Option<PakeState>,
    key: Option<Key>,
    confirmation_key: Option<Vec<u8>>,
    received_confirm: bool,
    verifier: Verifier,
    welcome: WelcomeHandler,
    mailbox: Mailbox,
    terminator: Terminator,
    wordlist: Wordlist,
    close_mood: Mood,
    closing: bool,
    close_waiter: Option<DoneResult<()>>,
    code_waiter: Option<DoneResult<Code>>,
    input_helper: Option<Arc<dyn CodeInputHelper>>,
    error: Option<WormholeError>,
    /// Set once `connected()` has run; a nameplate can only be claimed once both a code is
    /// known and the transport is up.
    connection_open: bool,
    /// Set once we've sent `claim` for `self.nameplate`, so a later event (e.g. the welcome
    /// frame) can't re-send it.
    claim_sent: bool,
    /// Set once we've sent `close{mailbox, mood}`, so the repeated calls to
    /// `maybe_finish_close` triggered by `on_released`/`on_closed` don't resend it.
    close_sent: bool,
}

impl Session {
    pub fn new(app_id: AppID) -> Self {
        Session {
            app_id,
            side: MySide::generate(),
            code_state: CodeState::Idle,
            nameplate: None,
            mailbox_id: None,
            pake_state: None,
            key: None,
            confirmation_key: None,
            received_confirm: false,
            verifier: Verifier::NotRequested,
            welcome: WelcomeHandler::new(),
            mailbox: Mailbox::new(),
            terminator: Terminator::new(),
            wordlist: Wordlist::default_wordlist(2),
            close_mood: Mood::Lonely,
            closing: false,
            close_waiter: None,
            code_waiter: None,
            input_helper: None,
            error: None,
            connection_open: false,
            claim_sent: false,
            close_sent: false,
        }
    }

    pub fn side(&self) -> &MySide {
        &self.side
    }

    /// `close()` has been requested (either explicitly or, via `complete_close_on_drop`,
    /// implicitly), but the closure protocol may still be waiting on acks.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// The closure protocol has fully finished: every release/close we emitted has a
    /// matching ack, and the caller's `close()` result has been resolved. Once true, the
    /// driver loop may drop the transport.
    pub fn is_closed(&self) -> bool {
        self.closing && self.close_waiter.is_none()
    }

    fn fail(&mut self, err: WormholeError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn check_error(&self) -> Result<(), WormholeError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// The transport just finished connecting (fused with "mailbox opened implied by the
    /// handshake completing", per the spec's simplification).
    pub fn connected(&mut self) -> Vec<ClientMessage> {
        self.connection_open = true;
        let mut out = vec![server_messages::bind(self.app_id.clone(), self.side.as_ref())];
        out.extend(self.maybe_claim_nameplate());
        out
    }

    /// Send `claim{nameplate}` exactly once, as soon as both a code is known and the
    /// connection is up, whichever happens last.
    fn maybe_claim_nameplate(&mut self) -> Vec<ClientMessage> {
        if !self.connection_open || self.claim_sent {
            return vec![];
        }
        let Some(nameplate) = self.nameplate.clone() else {
            return vec![];
        };
        self.claim_sent = true;
        self.terminator.nameplate_claimed();
        vec![server_messages::claim(nameplate.as_ref())]
    }

    pub fn welcome(&mut self, payload: &crate::server_messages::WelcomePayload) -> Vec<ClientMessage> {
        if let Err(e) = self.welcome.handle(payload) {
            self.fail(WormholeError::Welcome(e));
            self.fail_everything();
        }
        vec![]
    }

    /// Process one inbound server frame. Most frames are handled entirely synchronously;
    /// `nameplates` may need the driver to await the code-input collaborator first.
    pub fn handle_server_message(&mut self, msg: ServerMessage) -> HandledMessage {
        match msg {
            ServerMessage::Welcome { welcome } => HandledMessage::Frames(self.welcome(&welcome)),
            ServerMessage::Nameplates { nameplates } => match self.on_nameplates(nameplates) {
                Some((helper, available)) => HandledMessage::NeedsCodeInput(helper, available),
                None => HandledMessage::Frames(vec![]),
            },
            ServerMessage::Allocated { nameplate } => HandledMessage::Frames(self.on_allocated(nameplate)),
            ServerMessage::Claimed { mailbox } => HandledMessage::Frames(self.on_claimed(mailbox)),
            ServerMessage::Released {} => HandledMessage::Frames(self.on_released()),
            ServerMessage::Message { side, phase, body } => {
                HandledMessage::Frames(self.on_message(side, phase, body))
            }
            ServerMessage::Closed {} => HandledMessage::Frames(self.on_closed()),
            ServerMessage::Error { error, orig } => HandledMessage::Frames(self.on_error(error, orig)),
        }
    }

    /// A `nameplates` frame arrived. If `input_code` put us in `Inputting` mode, hand back
    /// the collaborator and the candidate list so the driver can `.await` it outside of
    /// any borrow of `self` and feed the answer back through [`Session::complete_input`].
    fn on_nameplates(
        &mut self,
        nameplates: Vec<crate::server_messages::NameplateEntry>,
    ) -> Option<(Arc<dyn CodeInputHelper>, Vec<Nameplate>)> {
        let helper = self.input_helper.clone()?;
        let available = nameplates.into_iter().map(|n| Nameplate::new(n.id)).collect();
        Some((helper, available))
    }

    /// Resume after the driver awaited the `CodeInputHelper` for a nameplate and words.
    pub fn complete_input(&mut self, nameplate: Nameplate, password: crate::ids::Password) -> Vec<ClientMessage> {
        let code = Code::new(&nameplate, &password);
        self.nameplate = Some(nameplate);
        self.code_state = CodeState::Known(code.clone());
        if let Some(waiter) = self.code_waiter.take() {
            let _ = waiter.send(Ok(code));
        }
        self.maybe_claim_nameplate()
    }

    fn on_allocated(&mut self, nameplate: String) -> Vec<ClientMessage> {
        let nameplate = Nameplate::new(nameplate);
        let code = complete_allocated_code(&nameplate, &self.wordlist);
        self.nameplate = Some(nameplate);
        self.code_state = CodeState::Known(code.clone());
        if let Some(waiter) = self.code_waiter.take() {
            let _ = waiter.send(Ok(code));
        }
        self.maybe_claim_nameplate()
    }

    fn on_claimed(&mut self, mailbox: String) -> Vec<ClientMessage> {
        self.mailbox_id = Some(MailboxId(mailbox.clone()));
        self.terminator.mailbox_opened();
        let mut out = vec![server_messages::open(&mailbox)];
        if self.key.is_none() && self.pake_state.is_none() {
            let code = self.code_state.code().expect("claimed implies a code is known").clone();
            let (state, msg1) = crypto::start_pake(code.as_ref(), &self.app_id);
            self.pake_state = Some(state);
            out.push(server_messages::add(Phase::PAKE.as_ref(), &msg1));
        }
        out
    }

    fn on_released(&mut self) -> Vec<ClientMessage> {
        self.terminator.released();
        self.maybe_finish_close()
    }

    fn on_closed(&mut self) -> Vec<ClientMessage> {
        self.terminator.closed();
        self.maybe_finish_close()
    }

    fn on_error(&mut self, error: String, orig: String) -> Vec<ClientMessage> {
        self.fail(WormholeError::Server(ServerError { message: error, orig }));
        self.fail_everything();
        vec![]
    }

    fn on_message(&mut self, side: String, phase: String, body: String) -> Vec<ClientMessage> {
        let phase = Phase(phase.into());
        let their_side = crate::ids::TheirSide::from(side.clone());

        if their_side == self.side {
            // Echo of our own send: note it and stop, no delivery (invariant 3).
            self.mailbox.mark_seen(phase);
            return vec![];
        }
        self.mailbox.mark_seen(phase.clone());

        let Ok(body) = hex::decode(&body) else {
            warn!("dropping message frame with non-hex body");
            return vec![];
        };

        if phase.is_pake() {
            return self.on_pake_message(&body);
        }
        if phase.is_confirm() {
            return self.on_confirm_message(&body, &their_side);
        }
        self.on_application_message(phase, &body, &their_side)
    }

    fn on_pake_message(&mut self, body: &[u8]) -> Vec<ClientMessage> {
        let Some(state) = self.pake_state.take() else {
            warn!("got a pake message with no pake exchange in progress");
            return vec![];
        };
        match crypto::finish_pake(state, body) {
            Ok(key) => self.established_key(key),
            Err(_) => {
                self.fail(WormholeError::WrongPassword);
                self.fail_everything();
                vec![]
            }
        }
    }

    fn established_key(&mut self, key: Key) -> Vec<ClientMessage> {
        let confirmation_key = crypto::derive_confirmation_key(&key);
        self.key = Some(key);
        self.confirmation_key = Some(confirmation_key.clone());
        self.resolve_verifier_if_ready();

        let mut out = Vec::new();
        let confirm_body = crypto::make_confirmation_message(&confirmation_key);
        out.push(server_messages::add(Phase::CONFIRM.as_ref(), &confirm_body));

        let key_ref = self.key.clone().expect("just set above");
        for (phase, plaintext) in self.mailbox.drain_send_queue() {
            let ciphertext = crypto::encrypt_phase(&self.side, &key_ref, &phase, &plaintext);
            out.push(server_messages::add(phase.as_ref(), &ciphertext));
        }

        if let Some(nameplate) = self.nameplate.take() {
            out.push(server_messages::release(Some(nameplate.as_ref())));
        }
        out
    }

    fn on_confirm_message(&mut self, body: &[u8], _their_side: &crate::ids::TheirSide) -> Vec<ClientMessage> {
        let Some(confirmation_key) = &self.confirmation_key else {
            warn!("got a confirm message before our own key was established");
            return vec![];
        };
        if crypto::check_confirmation_message(confirmation_key, body) {
            self.received_confirm = true;
            self.resolve_verifier_if_ready();
        } else {
            self.fail(WormholeError::WrongPassword);
            self.fail_everything();
        }
        vec![]
    }

    fn on_application_message(&mut self, phase: Phase, body: &[u8], their_side: &crate::ids::TheirSide) -> Vec<ClientMessage> {
        let Some(key) = &self.key else {
            warn!("got an application message before the key was established");
            return vec![];
        };
        match crypto::decrypt_phase(their_side, key, &phase, body) {
            Some(plaintext) => self.mailbox.deliver(phase, plaintext),
            None => {
                self.fail(WormholeError::WrongPassword);
                self.fail_everything();
            }
        }
        vec![]
    }

    fn resolve_verifier_if_ready(&mut self) {
        if self.key.is_some() && self.received_confirm {
            let verifier = crypto::derive_verifier(self.key.as_ref().unwrap());
            if let Verifier::Requested(_) = &self.verifier {
                if let Verifier::Requested(waiter) = std::mem::replace(&mut self.verifier, Verifier::Resolved(verifier.clone())) {
                    let _ = waiter.send(Ok(verifier));
                }
            } else {
                self.verifier = Verifier::Resolved(verifier);
            }
        }
    }

    fn fail_everything(&mut self) {
        let err = self.error.clone().expect("fail_everything called without a sticky error");
        self.mailbox.fail_all_waiters(&err);
        if let Some(w) = self.code_waiter.take() {
            let _ = w.send(Err(err.clone()));
        }
        if let Verifier::Requested(w) = std::mem::replace(&mut self.verifier, Verifier::NotRequested) {
            let _ = w.send(Err(err.clone()));
        }
    }

    // -- user intents --

    pub fn set_code(&mut self, code: Code, result: DoneResult<()>) -> Vec<ClientMessage> {
        if let Err(e) = self.check_error() {
            let _ = result.send(Err(e));
            return vec![];
        }
        match self.code_state.begin_set(&code) {
            Ok(code) => {
                self.code_state = CodeState::Known(code.clone());
                self.nameplate = Some(code.nameplate());
                let _ = result.send(Ok(()));
                self.maybe_claim_nameplate()
            }
            Err(e) => {
                let _ = result.send(Err(WormholeError::Usage(e)));
                vec![]
            }
        }
    }

    pub fn get_code(&mut self, num_words: usize, result: DoneResult<Code>) -> Vec<ClientMessage> {
        if let Err(e) = self.check_error() {
            let _ = result.send(Err(e));
            return vec![];
        }
        if let Err(e) = self.code_state.begin_allocate() {
            let _ = result.send(Err(WormholeError::Usage(e)));
            return vec![];
        }
        self.wordlist = Wordlist::default_wordlist(num_words);
        self.code_state = CodeState::Allocating;
        self.code_waiter = Some(result);
        vec![server_messages::allocate()]
    }

    pub fn input_code(&mut self, helper: Arc<dyn CodeInputHelper>, result: DoneResult<Code>) -> Vec<ClientMessage> {
        if let Err(e) = self.check_error() {
            let _ = result.send(Err(e));
            return vec![];
        }
        if let Err(e) = self.code_state.begin_input() {
            let _ = result.send(Err(WormholeError::Usage(e)));
            return vec![];
        }
        self.code_state = CodeState::Inputting;
        self.input_helper = Some(helper);
        self.code_waiter = Some(result);
        vec![server_messages::list()]
    }

    pub fn verify(&mut self, result: DoneResult<Vec<u8>>) {
        if let Err(e) = self.check_error() {
            let _ = result.send(Err(e));
            return;
        }
        match &self.verifier {
            Verifier::Resolved(v) => {
                let _ = result.send(Ok(v.clone()));
            }
            _ => {
                self.verifier = Verifier::Requested(result);
                self.resolve_verifier_if_ready();
            }
        }
    }

    pub fn send(&mut self, plaintext: Vec<u8>) -> Vec<ClientMessage> {
        if self.check_error().is_err() {
            return vec![];
        }
        let phase = self.mailbox.next_send_phase();
        match &self.key {
            Some(key) => {
                let ciphertext = crypto::encrypt_phase(&self.side, key, &phase, &plaintext);
                vec![server_messages::add(phase.as_ref(), &ciphertext)]
            }
            None => {
                self.mailbox.queue_send(phase, plaintext);
                vec![]
            }
        }
    }

    pub fn get(&mut self, result: DoneResult<Vec<u8>>) {
        if let Err(e) = self.check_error() {
            let _ = result.send(Err(e));
            return;
        }
        self.mailbox.get(result);
    }

    pub fn derive_key(&mut self, purpose: String, length: usize, result: DoneResult<Vec<u8>>) {
        if let Err(e) = self.check_error() {
            let _ = result.send(Err(e));
            return;
        }
        match &self.key {
            Some(key) => {
                let _ = result.send(Ok(crypto::derive_key(key, purpose.as_bytes(), length)));
            }
            None => {
                let _ = result.send(Err(WormholeError::Usage(UsageError::KeyNotEstablishedYet)));
            }
        }
    }

    /// `close(mood)`, per the closure protocol table in the spec. Returns outbound frames;
    /// the close result is resolved later, from `on_closed`/`maybe_finish_close`, once the
    /// transport has actually been told to go away.
    pub fn close(&mut self, mood: Mood, result: DoneResult<()>) -> Vec<ClientMessage> {
        self.closing = true;
        self.close_mood = mood;
        self.close_waiter = Some(result);
        self.fail_everything_for_close();
        self.maybe_finish_close()
    }

    fn fail_everything_for_close(&mut self) {
        self.mailbox.fail_all_waiters(&WormholeError::Closed);
        if let Some(w) = self.code_waiter.take() {
            let _ = w.send(Err(WormholeError::Closed));
        }
        if let Verifier::Requested(w) = std::mem::replace(&mut self.verifier, Verifier::NotRequested) {
            let _ = w.send(Err(WormholeError::Closed));
        }
    }

    fn maybe_finish_close(&mut self) -> Vec<ClientMessage> {
        if !self.closing {
            return vec![];
        }
        let mut out = Vec::new();
        if self.claim_sent {
            if let Some(nameplate) = self.nameplate.take() {
                out.push(server_messages::release(Some(nameplate.as_ref())));
            }
        } else {
            self.nameplate = None;
        }
        if !self.close_sent {
            if let Some(mailbox) = &self.mailbox_id {
                out.push(server_messages::close(Some(mailbox.0.as_str()), self.close_mood));
            }
            self.close_sent = true;
        }
        if self.terminator.close_requested() {
            if let Some(waiter) = self.close_waiter.take() {
                let _ = waiter.send(Ok(()));
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn new_session() -> Session {
        Session::new(AppID::new("test-app"))
    }

    #[test]
    fn set_code_twice_is_a_usage_error() {
        let mut s = new_session();
        let (tx1, rx1) = oneshot::channel();
        s.set_code("4-a-b".parse().unwrap(), tx1);
        assert!(rx1.try_recv().unwrap().unwrap().is_ok());

        let (tx2, rx2) = oneshot::channel();
        s.set_code("4-a-b".parse().unwrap(), tx2);
        assert!(matches!(
            rx2.try_recv().unwrap().unwrap(),
            Err(WormholeError::Usage(UsageError::CodeAcquisitionAlreadyInProgress))
        ));
    }

    #[test]
    fn connected_then_set_code_emits_claim() {
        let mut s = new_session();
        let connected = s.connected();
        assert!(matches!(connected[0], ClientMessage::Bind { .. }));

        let (tx, _rx) = oneshot::channel();
        let out = s.set_code("4-a-b".parse().unwrap(), tx);
        assert!(matches!(out[0], ClientMessage::Claim { .. }));
    }

    #[test]
    fn set_code_before_connecting_defers_claim_until_connected() {
        let mut s = new_session();
        let (tx, _rx) = oneshot::channel();
        let out = s.set_code("4-a-b".parse().unwrap(), tx);
        assert!(out.is_empty(), "no transport yet, nothing to claim against");

        let out = s.connected();
        assert!(matches!(out[0], ClientMessage::Bind { .. }));
        assert!(matches!(out[1], ClientMessage::Claim { .. }));
    }

    #[test]
    fn claimed_emits_open_and_pake_add() {
        let mut s = new_session();
        let (tx, _rx) = oneshot::channel();
        s.connected();
        s.set_code("4-a-b".parse().unwrap(), tx);
        let out = s.on_claimed("mbox1".to_string());
        assert!(matches!(out[0], ClientMessage::Open { .. }));
        assert!(matches!(out[1], ClientMessage::Add { .. }));
    }

    #[test]
    fn send_before_key_is_queued_then_drained() {
        let mut s = new_session();
        let (tx, _rx) = oneshot::channel();
        s.set_code("4-a-b".parse().unwrap(), tx);
        let out = s.send(b"hello".to_vec());
        assert!(out.is_empty(), "nothing goes out before the key is known");
    }

    #[test]
    fn close_waits_for_both_release_and_closed_acks() {
        let mut s = new_session();
        let (tx, _rx) = oneshot::channel();
        s.connected();
        s.set_code("4-a-b".parse().unwrap(), tx);
        s.on_claimed("mbox1".to_string());

        let (close_tx, mut close_rx) = oneshot::channel();
        let out = s.close(Mood::Happy, close_tx);
        assert!(matches!(out[0], ClientMessage::Release { .. }));
        assert!(matches!(out[1], ClientMessage::Close { .. }));
        assert!(close_rx.try_recv().unwrap().is_none(), "neither ack has arrived yet");
        assert!(!s.is_closed());

        s.on_released();
        assert!(close_rx.try_recv().unwrap().is_none(), "closed{{}} ack is still outstanding");
        assert!(!s.is_closed());

        s.on_closed();
        assert!(close_rx.try_recv().unwrap().unwrap().is_ok());
        assert!(s.is_closed());
    }

    #[test]
    fn close_does_not_resend_close_frame_on_each_ack() {
        let mut s = new_session();
        let (tx, _rx) = oneshot::channel();
        s.connected();
        s.set_code("4-a-b".parse().unwrap(), tx);
        s.on_claimed("mbox1".to_string());

        let (close_tx, _close_rx) = oneshot::channel();
        s.close(Mood::Happy, close_tx);
        assert!(s.on_released().is_empty(), "release ack alone emits nothing further");
        assert!(s.on_closed().is_empty(), "closed ack must not trigger a second close frame");
    }
}
