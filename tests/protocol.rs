//! End-to-end tests driving two `Wormhole` facades against each other through a tiny
//! in-process relay that stands in for the rendezvous server: it learns each side's id
//! from its `bind` frame and rebroadcasts `add` frames to every side that has `open`ed the
//! same mailbox, exactly as the real server does.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use magic_wormhole::{
    AppID, ClientMessage, Mood, NameplateEntry, ServerMessage, Transport, WelcomePayload,
    Wormhole, WormholeError,
};

#[derive(Default)]
struct Queues {
    sent: VecDeque<ClientMessage>,
    to_deliver: VecDeque<ServerMessage>,
}

/// A transport backed by shared, lock-protected queues, so the relay loop and the driver
/// task it's feeding can each hold their own handle to the same mailbox.
#[derive(Clone, Default)]
struct SharedMock(Arc<Mutex<Queues>>);

impl SharedMock {
    fn new() -> Self {
        Self::default()
    }

    fn take_sent(&self) -> Vec<ClientMessage> {
        self.0.lock().unwrap().sent.drain(..).collect()
    }

    fn push_inbound(&self, msg: ServerMessage) {
        self.0.lock().unwrap().to_deliver.push_back(msg);
    }
}

#[async_trait::async_trait]
impl Transport for SharedMock {
    async fn send(&mut self, msg: ClientMessage) -> Result<(), WormholeError> {
        self.0.lock().unwrap().sent.push_back(msg);
        Ok(())
    }

    async fn recv(&mut self) -> Option<ServerMessage> {
        loop {
            if let Some(msg) = self.0.lock().unwrap().to_deliver.pop_front() {
                return Some(msg);
            }
            async_std::task::yield_now().await;
        }
    }
}

/// Relay client frames between the two mock transports the way the rendezvous server
/// would, until `done` is set and both queues have drained.
async fn relay(a: SharedMock, b: SharedMock, done: Arc<AtomicBool>) {
    let transports = [a, b];
    let mut sides: [Option<String>; 2] = [None, None];
    let mut opened = [false, false];
    let mut open_nameplates: Vec<String> = Vec::new();
    let mut next_nameplate = 100u64;

    loop {
        let mut progressed = false;
        for i in 0..2 {
            let sent = transports[i].take_sent();
            if sent.is_empty() {
                continue;
            }
            progressed = true;
            for msg in sent {
                match msg {
                    ClientMessage::Bind { side, .. } => {
                        sides[i] = Some(side);
                        transports[i].push_inbound(ServerMessage::Welcome {
                            welcome: WelcomePayload::default(),
                        });
                    }
                    ClientMessage::Allocate {} => {
                        let nameplate = next_nameplate.to_string();
                        next_nameplate += 1;
                        open_nameplates.push(nameplate.clone());
                        transports[i].push_inbound(ServerMessage::Allocated { nameplate });
                    }
                    ClientMessage::List {} => {
                        let nameplates = open_nameplates
                            .iter()
                            .map(|id| NameplateEntry { id: id.clone() })
                            .collect();
                        transports[i].push_inbound(ServerMessage::Nameplates { nameplates });
                    }
                    ClientMessage::Claim { nameplate } => {
                        transports[i].push_inbound(ServerMessage::Claimed {
                            mailbox: format!("mb-{nameplate}"),
                        });
                    }
                    ClientMessage::Open { .. } => {
                        opened[i] = true;
                    }
                    ClientMessage::Add { phase, body } => {
                        let side = sides[i].clone().expect("bind always precedes add");
                        for (j, is_open) in opened.iter().enumerate() {
                            if *is_open {
                                transports[j].push_inbound(ServerMessage::Message {
                                    side: side.clone(),
                                    phase: phase.clone(),
                                    body: body.clone(),
                                });
                            }
                        }
                    }
                    ClientMessage::Release { .. } => {
                        transports[i].push_inbound(ServerMessage::Released {});
                    }
                    ClientMessage::Close { .. } => {
                        transports[i].push_inbound(ServerMessage::Closed {});
                    }
                }
            }
        }
        if !progressed {
            if done.load(Ordering::SeqCst) {
                break;
            }
            async_std::task::yield_now().await;
        }
    }
}

struct Harness {
    done: Arc<AtomicBool>,
    relay: async_std::task::JoinHandle<()>,
}

impl Harness {
    fn start() -> (Self, Wormhole, Wormhole) {
        let mock_a = SharedMock::new();
        let mock_b = SharedMock::new();
        let done = Arc::new(AtomicBool::new(false));
        let relay = async_std::task::spawn(relay(mock_a.clone(), mock_b.clone(), done.clone()));

        let w1 = Wormhole::spawn(AppID::new("test-app"), mock_a);
        let w2 = Wormhole::spawn(AppID::new("test-app"), mock_b);
        (Harness { done, relay }, w1, w2)
    }

    async fn stop(self) {
        self.done.store(true, Ordering::SeqCst);
        self.relay.await;
    }
}

#[async_std::test]
async fn basic_exchange_both_directions() {
    let (harness, w1, w2) = Harness::start();

    let code = w1.get_code(2).await.expect("get_code");
    w2.set_code(code).await.expect("set_code");

    w1.send(b"data1".to_vec()).await.expect("send from w1");
    w2.send(b"data2".to_vec()).await.expect("send from w2");

    assert_eq!(w2.get().await.expect("w2 recv"), b"data1".to_vec());
    assert_eq!(w1.get().await.expect("w1 recv"), b"data2".to_vec());

    let v1 = w1.verify().await.expect("w1 verify");
    let v2 = w2.verify().await.expect("w2 verify");
    assert_eq!(v1, v2);
    assert!(!v1.is_empty());

    w1.close(Mood::Happy).await.expect("w1 close");
    w2.close(Mood::Happy).await.expect("w2 close");

    harness.stop().await;
}

#[async_std::test]
async fn send_before_code_is_set_is_delivered_once_key_is_established() {
    let (harness, w1, w2) = Harness::start();

    // Fire the send immediately; the driver must queue it until the PAKE exchange
    // finishes rather than dropping or blocking on it.
    w1.send(b"early".to_vec()).await.expect("queue early send");

    w1.set_code("123-abc-def".parse().unwrap()).await.expect("set_code w1");
    w2.set_code("123-abc-def".parse().unwrap()).await.expect("set_code w2");

    assert_eq!(w2.get().await.expect("w2 recv"), b"early".to_vec());

    w1.close(Mood::Happy).await.expect("w1 close");
    w2.close(Mood::Happy).await.expect("w2 close");

    harness.stop().await;
}

#[async_std::test]
async fn mismatched_codes_surface_wrong_password() {
    let (harness, w1, w2) = Harness::start();

    w1.set_code("100-apple-banana".parse().unwrap()).await.expect("set_code w1");
    w2.set_code("100-wrong-words".parse().unwrap()).await.expect("set_code w2");

    let err = w1.get().await.expect_err("mismatched codes must not decrypt");
    assert!(matches!(err, WormholeError::WrongPassword));

    let _ = w1.close(Mood::Scared).await;
    let _ = w2.close(Mood::Scared).await;

    harness.stop().await;
}
