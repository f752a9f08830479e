//! The `Transport` trait and its two implementations: a real WebSocket connection to the
//! rendezvous server, and an in-memory mock driven directly by tests.

use async_tungstenite::tungstenite::Message as WsMessage;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::error::WormholeError;
use crate::server_messages::{ClientMessage, ServerMessage};

/// Everything the session state machine needs from the wire: send a frame, receive the
/// next one. Kept generic (rather than a trait object) so the driver task can be
/// monomorphized per transport and avoid boxing every poll.
///
/// `#[async_trait]` so the returned futures are boxed and provably `Send`: `driver_loop`
/// hands its future to `async_std::task::spawn`, which requires `Send`, and the anonymous
/// future of a native `async fn` in a generic context isn't provably so without this.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Serialise and send a client frame.
    async fn send(&mut self, msg: ClientMessage) -> Result<(), WormholeError>;

    /// Receive and parse the next server frame. `None` means the connection closed.
    /// Frames with an unrecognised `type` are logged and skipped transparently.
    async fn recv(&mut self) -> Option<ServerMessage>;
}

/// A WebSocket connection to the rendezvous server, carrying newline-delimited JSON text
/// frames in both directions.
pub struct WebSocketTransport {
    ws: async_tungstenite::WebSocketStream<
        async_tungstenite::async_std::ConnectStream,
    >,
}

impl WebSocketTransport {
    pub async fn connect(relay_url: &str) -> Result<Self, WormholeError> {
        let (ws, _response) = async_tungstenite::async_std::connect_async(relay_url)
            .await
            .map_err(|e| WormholeError::Transport(e.to_string()))?;
        Ok(WebSocketTransport { ws })
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, msg: ClientMessage) -> Result<(), WormholeError> {
        let text = serde_json::to_string(&msg)
            .expect("ClientMessage serialization is infallible for our own enum");
        self.ws
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| WormholeError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ServerMessage> {
        loop {
            match self.ws.next().await {
                None => return None,
                Some(Err(e)) => {
                    warn!("transport error: {e}");
                    return None;
                }
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str(&text) {
                    Ok(frame) => return Some(frame),
                    Err(_) => {
                        debug!("ignoring frame with unrecognised shape: {text}");
                        continue;
                    }
                },
                Some(Ok(WsMessage::Close(_))) => return None,
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                Some(Ok(WsMessage::Binary(_))) | Some(Ok(WsMessage::Frame(_))) => {
                    debug!("ignoring non-text frame");
                    continue;
                }
            }
        }
    }
}

/// An in-memory transport for tests: outbound frames land on a queue the test inspects,
/// inbound frames are fed in by the test. Mirrors the source's `MockWebSocket`.
#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    pub struct MockTransport {
        pub sent: VecDeque<ClientMessage>,
        pub to_deliver: VecDeque<ServerMessage>,
        pub closed: bool,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_inbound(&mut self, msg: ServerMessage) {
            self.to_deliver.push_back(msg);
        }

        pub fn take_sent(&mut self) -> Vec<ClientMessage> {
            self.sent.drain(..).collect()
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, msg: ClientMessage) -> Result<(), WormholeError> {
            if self.closed {
                return Err(WormholeError::Transport("mock transport closed".into()));
            }
            self.sent.push_back(msg);
            Ok(())
        }

        /// Pop the next queued frame. If the queue is empty and the mock hasn't been marked
        /// closed, yields to the executor and keeps polling rather than returning `None` —
        /// an empty-but-open mock should behave like a real socket with nothing to read yet,
        /// not like a hung-up one.
        async fn recv(&mut self) -> Option<ServerMessage> {
            loop {
                if let Some(msg) = self.to_deliver.pop_front() {
                    return Some(msg);
                }
                if self.closed {
                    return None;
                }
                async_std::task::yield_now().await;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::mock::MockTransport;
    use super::*;
    use crate::ids::Mood;

    #[async_std::test]
    async fn mock_records_sent_frames() {
        let mut t = MockTransport::new();
        t.send(crate::server_messages::bind(crate::ids::AppID::new("app"), "side1"))
            .await
            .unwrap();
        t.send(crate::server_messages::close(None, Mood::Happy))
            .await
            .unwrap();
        assert_eq!(t.take_sent().len(), 2);
    }

    #[async_std::test]
    async fn mock_delivers_queued_frames_in_order() {
        let mut t = MockTransport::new();
        t.push_inbound(ServerMessage::Allocated { nameplate: "4".into() });
        t.push_inbound(ServerMessage::Claimed { mailbox: "mbox1".into() });
        assert!(matches!(t.recv().await, Some(ServerMessage::Allocated { .. })));
        assert!(matches!(t.recv().await, Some(ServerMessage::Claimed { .. })));
    }
}
