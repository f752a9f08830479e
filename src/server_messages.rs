//! Wire frame types exchanged with the rendezvous server: one JSON object per line, tagged
//! by a `type` field.

use serde_derive::{Deserialize, Serialize};

use crate::ids::{AppID, Mood};

/// A single nameplate entry inside a `nameplates` frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NameplateEntry {
    pub id: String,
}

/// A client-to-server frame. Every outbound frame carries a client-chosen `id` so the
/// server can echo it back on ack, though the rendezvous protocol doesn't require callers
/// to correlate on it — the session tracks state transitions instead.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(tag = "type")]
pub enum ClientMessage {
    Bind { appid: AppID, side: String },
    List {},
    Allocate {},
    Claim { nameplate: String },
    Release { nameplate: Option<String> },
    Open { mailbox: String },
    Add { phase: String, body: String },
    Close { mailbox: Option<String>, mood: Mood },
}

pub fn bind(appid: AppID, side: &str) -> ClientMessage {
    ClientMessage::Bind {
        appid,
        side: side.to_string(),
    }
}

pub fn list() -> ClientMessage {
    ClientMessage::List {}
}

pub fn allocate() -> ClientMessage {
    ClientMessage::Allocate {}
}

pub fn claim(nameplate: &str) -> ClientMessage {
    ClientMessage::Claim {
        nameplate: nameplate.to_string(),
    }
}

pub fn release(nameplate: Option<&str>) -> ClientMessage {
    ClientMessage::Release {
        nameplate: nameplate.map(str::to_string),
    }
}

pub fn open(mailbox: &str) -> ClientMessage {
    ClientMessage::Open {
        mailbox: mailbox.to_string(),
    }
}

pub fn add(phase: &str, body: &[u8]) -> ClientMessage {
    ClientMessage::Add {
        phase: phase.to_string(),
        body: hex::encode(body),
    }
}

pub fn close(mailbox: Option<&str>, mood: Mood) -> ClientMessage {
    ClientMessage::Close {
        mailbox: mailbox.map(str::to_string),
        mood,
    }
}

/// The payload of an inbound `welcome` frame. Every field is optional and handled by the
/// welcome handler in [`crate::welcome`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct WelcomePayload {
    pub motd: Option<String>,
    pub current_version: Option<String>,
    pub error: Option<String>,
}

/// A server-to-client frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(tag = "type")]
pub enum ServerMessage {
    Welcome { welcome: WelcomePayload },
    Nameplates { nameplates: Vec<NameplateEntry> },
    Allocated { nameplate: String },
    Claimed { mailbox: String },
    Released {},
    Message { side: String, phase: String, body: String },
    Closed {},
    Error { error: String, orig: String },
}
