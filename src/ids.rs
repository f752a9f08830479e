//! Newtype wrappers for the identifiers that flow through the wormhole protocol.
//!
//! Keeping these as distinct types (rather than passing `String`s around) makes it
//! impossible to e.g. accidentally send `TheirSide` back to the server as our own side.

use serde_derive::{Deserialize, Serialize};
use std::{borrow::Cow, str::FromStr};

/// Scopes all commands to a particular upper-layer protocol; only sessions sharing the
/// same `AppID` (and connecting to the same rendezvous server) can talk to each other.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Deserialize, Serialize, derive_more::Display, derive_more::Deref)]
#[deref(forward)]
pub struct AppID(pub Cow<'static, str>);

impl AppID {
    /// Create a new app ID from an ID string.
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        AppID(id.into())
    }
}

impl From<String> for AppID {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for AppID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A bare random identifier, generated fresh per session, that has not yet been tagged
/// as "ours" or "theirs". Exists so [`MySide`] and [`TheirSide`] can share a `Display`/
/// serde impl without either being constructible from the other.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Deserialize, Serialize, derive_more::Display, derive_more::Deref)]
#[deref(forward)]
pub struct EitherSide(pub String);

impl<S: Into<String>> From<S> for EitherSide {
    fn from(s: S) -> EitherSide {
        EitherSide(s.into())
    }
}

/// Identifies this endpoint on the mailbox. Sent in every outbound frame as `side`.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Deserialize, Serialize, derive_more::Display, derive_more::Deref)]
#[serde(transparent)]
#[display("{_0}")]
pub struct MySide(pub EitherSide);

impl MySide {
    /// Generate a fresh random side: 16 hex characters (8 random bytes).
    pub fn generate() -> MySide {
        use rand::RngCore;
        let mut bytes = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        MySide(EitherSide(hex::encode(bytes)))
    }

    #[cfg(test)]
    pub fn unchecked_from_string(s: impl Into<String>) -> MySide {
        MySide(EitherSide(s.into()))
    }
}

/// The side string that arrives inside an inbound `message` frame, naming who sent it.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Deserialize, Serialize, derive_more::Display, derive_more::Deref)]
#[serde(transparent)]
#[display("{_0}")]
pub struct TheirSide(pub EitherSide);

impl<S: Into<String>> From<S> for TheirSide {
    fn from(s: S) -> TheirSide {
        TheirSide(EitherSide(s.into()))
    }
}

impl PartialEq<MySide> for TheirSide {
    fn eq(&self, other: &MySide) -> bool {
        self.0 == other.0
    }
}

/// A phase tag on a message: the literal names `pake`/`confirm`, or a decimal string
/// numbering application-level sends in order.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Deserialize, Serialize, derive_more::Display)]
#[serde(transparent)]
pub struct Phase(pub Cow<'static, str>);

impl Phase {
    pub const PAKE: Self = Phase(Cow::Borrowed("pake"));
    pub const CONFIRM: Self = Phase(Cow::Borrowed("confirm"));

    pub fn numeric(n: u64) -> Self {
        Phase(n.to_string().into())
    }

    pub fn is_pake(&self) -> bool {
        self == &Self::PAKE
    }

    pub fn is_confirm(&self) -> bool {
        self == &Self::CONFIRM
    }

    /// The numeric value of an application phase, or `None` for `pake`/`confirm`.
    pub fn to_num(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl AsRef<str> for Phase {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The server-assigned id of the mailbox both peers exchange messages through.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Deserialize, Serialize, derive_more::Display)]
#[serde(transparent)]
pub struct Mailbox(pub String);

/// Short numeric server-side identifier that, when claimed, maps to a [`Mailbox`].
#[derive(PartialEq, Eq, Clone, Debug, Hash, Deserialize, Serialize, derive_more::Display, derive_more::Deref)]
#[serde(transparent)]
#[deref(forward)]
pub struct Nameplate(pub String);

impl Nameplate {
    pub fn new(n: impl Into<String>) -> Self {
        Nameplate(n.into())
    }
}

impl AsRef<str> for Nameplate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The free-text part of a code, i.e. everything after the nameplate and its separating dash.
#[derive(PartialEq, Eq, Clone, Debug, derive_more::Display)]
pub struct Password(pub String);

impl AsRef<str> for Password {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A wormhole code, e.g. `4-purple-sausages`: a [`Nameplate`], a dash, and a [`Password`].
#[derive(PartialEq, Eq, Clone, Debug, derive_more::Display)]
pub struct Code(pub String);

/// A code string did not look like `<digits>-<word>[-<word>...]`.
#[derive(PartialEq, Eq, Clone, Copy, Debug, derive_more::Display, thiserror::Error)]
#[display("code must look like '<digits>-<word>-<word>...'")]
pub struct InvalidCodeError;

impl Code {
    pub fn new(nameplate: &Nameplate, password: &Password) -> Self {
        Code(format!("{nameplate}-{password}"))
    }

    /// Split into the [`Nameplate`] and [`Password`] halves.
    pub fn split(&self) -> (Nameplate, Password) {
        let mut iter = self.0.splitn(2, '-');
        let nameplate = Nameplate::new(iter.next().unwrap());
        let password = Password(iter.next().unwrap_or_default().to_string());
        (nameplate, password)
    }

    pub fn nameplate(&self) -> Nameplate {
        Nameplate::new(self.0.split('-').next().unwrap())
    }
}

impl AsRef<str> for Code {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Code {
    type Err = InvalidCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // `^\d+(-[a-z0-9]+)+$`
        let mut parts = s.split('-');
        let nameplate = parts.next().unwrap_or_default();
        if nameplate.is_empty() || !nameplate.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidCodeError);
        }
        let mut saw_word = false;
        for word in parts {
            if word.is_empty() || !word.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Err(InvalidCodeError);
            }
            saw_word = true;
        }
        if !saw_word {
            return Err(InvalidCodeError);
        }
        Ok(Code(s.to_string()))
    }
}

/// The close command's optional "mood" string: tells the server (in general terms) about
/// the client's experience with the session, purely for the operator's usage records.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Deserialize, Serialize, derive_more::Display)]
pub enum Mood {
    /// PAKE worked and at least one valid encrypted message was seen from the peer.
    #[serde(rename = "happy")]
    Happy,
    /// Gave up without hearing anything from the peer.
    #[serde(rename = "lonely")]
    Lonely,
    /// Some other error: protocol problem or internal error.
    #[serde(rename = "errory")]
    Errory,
    /// Saw an invalid encrypted message from the peer: wrong code, or an attacker guessing.
    #[serde(rename = "scary")]
    Scared,
    /// Clients are not welcome on the server right now.
    #[serde(rename = "unwelcome")]
    Unwelcome,
}
