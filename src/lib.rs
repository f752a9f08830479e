//! Client-side core of the Magic Wormhole protocol: PAKE key exchange, mailbox relay, and
//! the nameplate/code machinery that turns a short human-readable code into a shared key.
//!
//! This crate is transport- and UI-agnostic. [`api::Wormhole`] drives a single background
//! task per session; everything the caller can do is expressed as an async method that
//! sends an intent to that task and awaits a reply.

mod api;
mod code;
mod crypto;
mod error;
mod ids;
mod server_messages;
mod session;
mod transport;
mod welcome;
mod wordlist;

pub use api::Wormhole;
pub use code::{CodeInputHelper, FixedCodeInputHelper};
pub use error::{ServerError, UsageError, WelcomeError, WormholeError};
pub use ids::{AppID, Code, EitherSide, InvalidCodeError, Mailbox, Mood, MySide, Nameplate, Password, Phase, TheirSide};
pub use server_messages::{ClientMessage, NameplateEntry, ServerMessage, WelcomePayload};
pub use transport::{Transport, WebSocketTransport};

#[cfg(any(test, feature = "test-support"))]
pub use transport::mock::MockTransport;
