//! The public facade: `Wormhole`, a handle to a session driven by a background task.
//!
//! Every method here does nothing but send an [`Intent`] down a channel and, where the
//! operation can fail or take time, await a `oneshot` reply. All the actual protocol logic
//! lives in [`crate::session::Session`]; this module only owns the task that drives it.

use std::sync::Arc;

use futures::channel::oneshot;
use futures::{pin_mut, select, FutureExt, StreamExt};
use tracing::warn;

use crate::code::CodeInputHelper;
use crate::error::WormholeError;
use crate::ids::{AppID, Code, Mood};
use crate::session::{HandledMessage, Intent, Session};
use crate::transport::{Transport, WebSocketTransport};

/// A handle to a running wormhole session. Cheap to clone: every clone sends intents to
/// the same driver task.
#[derive(Clone)]
pub struct Wormhole {
    intents: async_channel::Sender<Intent>,
}

impl Wormhole {
    /// Connect to a rendezvous server over WebSocket and start the driver task.
    pub async fn connect(app_id: AppID, relay_url: &str) -> Result<Self, WormholeError> {
        let transport = WebSocketTransport::connect(relay_url).await?;
        Ok(Self::spawn(app_id, transport))
    }

    /// Start the driver task over an arbitrary transport (used directly in tests with a
    /// mock transport; `connect` is the normal entry point otherwise).
    pub fn spawn<T: Transport + Send + 'static>(app_id: AppID, transport: T) -> Self {
        let (intent_tx, intent_rx) = async_channel::unbounded();
        async_std::task::spawn(driver_loop(app_id, transport, intent_rx));
        Wormhole { intents: intent_tx }
    }

    async fn call<T>(&self, make_intent: impl FnOnce(oneshot::Sender<Result<T, WormholeError>>) -> Intent) -> Result<T, WormholeError> {
        let (tx, rx) = oneshot::channel();
        self.intents
            .send(make_intent(tx))
            .await
            .map_err(|_| WormholeError::Shutdown)?;
        rx.await.map_err(|_| WormholeError::Shutdown)?
    }

    pub async fn set_code(&self, code: Code) -> Result<(), WormholeError> {
        self.call(|tx| Intent::SetCode(code, tx)).await
    }

    pub async fn get_code(&self, num_words: usize) -> Result<Code, WormholeError> {
        self.call(|tx| Intent::GetCode(num_words, tx)).await
    }

    pub async fn input_code(&self, helper: Arc<dyn CodeInputHelper>) -> Result<Code, WormholeError> {
        self.call(|tx| Intent::InputCode(helper, tx)).await
    }

    pub async fn verify(&self) -> Result<Vec<u8>, WormholeError> {
        self.call(Intent::Verify).await
    }

    /// Queue a plaintext message for the peer. Returns once the intent is accepted by the
    /// driver task, not once it's actually on the wire — ordering, not delivery, is what
    /// `send` promises.
    pub async fn send(&self, plaintext: Vec<u8>) -> Result<(), WormholeError> {
        self.intents
            .send(Intent::Send(plaintext))
            .await
            .map_err(|_| WormholeError::Shutdown)
    }

    pub async fn get(&self) -> Result<Vec<u8>, WormholeError> {
        self.call(Intent::Get).await
    }

    pub async fn derive_key(&self, purpose: impl Into<String>, length: usize) -> Result<Vec<u8>, WormholeError> {
        let purpose = purpose.into();
        self.call(|tx| Intent::DeriveKey(purpose, length, tx)).await
    }

    pub async fn close(&self, mood: Mood) -> Result<(), WormholeError> {
        self.call(|tx| Intent::Close(mood, tx)).await
    }
}

impl Drop for Wormhole {
    /// A caller that drops the handle without calling `close()` still owes the peer a
    /// closure frame. Best-effort: only the last surviving clone fires it, `try_send`
    /// never blocks the dropping thread, and the reply is discarded since nothing is left
    /// to await it.
    fn drop(&mut self) {
        if self.intents.sender_count() > 1 {
            return;
        }
        let (tx, _rx) = oneshot::channel();
        let _ = self.intents.try_send(Intent::Close(Mood::Lonely, tx));
    }
}

/// Drives one session to completion. Keeps polling the intent channel until it drains
/// (either a caller's `close()` eventually lets the loop exit via `is_closed`, or every
/// `Wormhole` clone was dropped and the implicit close's `Intent::Close` has been taken
/// off the queue); from then on only the transport is polled, since there is no one left
/// to send further intents. Breaking out of the loop on `close()` requires the closure
/// protocol to have actually finished — every emitted release/close has a matching ack —
/// not merely that the intent was handled.
async fn driver_loop<T: Transport + Send>(
    app_id: AppID,
    mut transport: T,
    intent_rx: async_channel::Receiver<Intent>,
) {
    let mut session = Session::new(app_id);
    send_all(&mut transport, session.connected()).await;
    let mut intents_open = true;

    loop {
        if intents_open {
            let next_intent = intent_rx.next().fuse();
            let next_frame = transport.recv().fuse();
            pin_mut!(next_intent, next_frame);

            select! {
                intent = next_intent => {
                    match intent {
                        Some(intent) => handle_intent(&mut session, &mut transport, intent).await,
                        None => intents_open = false,
                    }
                },
                frame = next_frame => {
                    if !dispatch_frame(&mut session, &mut transport, frame).await {
                        break;
                    }
                },
            }
        } else {
            let frame = transport.recv().await;
            if !dispatch_frame(&mut session, &mut transport, frame).await {
                break;
            }
        }

        if session.is_closed() {
            break;
        }
    }
}

/// Handle one user intent.
async fn handle_intent<T: Transport>(session: &mut Session, transport: &mut T, intent: Intent) {
    match intent {
        Intent::SetCode(code, result) => send_all(transport, session.set_code(code, result)).await,
        Intent::GetCode(num_words, result) => send_all(transport, session.get_code(num_words, result)).await,
        Intent::InputCode(helper, result) => send_all(transport, session.input_code(helper, result)).await,
        Intent::Verify(result) => session.verify(result),
        Intent::Send(plaintext) => send_all(transport, session.send(plaintext)).await,
        Intent::Get(result) => session.get(result),
        Intent::DeriveKey(purpose, length, result) => session.derive_key(purpose, length, result),
        Intent::Close(mood, result) => send_all(transport, session.close(mood, result)).await,
    }
}

/// Handle one inbound server frame (or its absence). Returns `false` if the driver loop
/// should stop because the transport itself is gone.
async fn dispatch_frame<T: Transport>(session: &mut Session, transport: &mut T, frame: Option<crate::server_messages::ServerMessage>) -> bool {
    match frame {
        Some(msg) => {
            match session.handle_server_message(msg) {
                HandledMessage::Frames(frames) => send_all(transport, frames).await,
                HandledMessage::NeedsCodeInput(helper, available) => {
                    let nameplate = helper.choose_nameplate(&available).await;
                    let password = helper.choose_words().await;
                    let frames = session.complete_input(nameplate, password);
                    send_all(transport, frames).await;
                }
            }
            true
        }
        None => {
            if !session.is_closing() {
                warn!("transport closed unexpectedly");
            }
            false
        }
    }
}

async fn send_all<T: Transport>(transport: &mut T, frames: Vec<crate::server_messages::ClientMessage>) {
    for frame in frames {
        if let Err(e) = transport.send(frame).await {
            warn!("failed to send frame: {e}");
        }
    }
}
