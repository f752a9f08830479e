//! The error taxonomy surfaced to callers of the public API.

use crate::ids::InvalidCodeError;

/// A caller-side mistake: calling an API method in a way the session's usage contract
/// forbids. Unlike the other variants, a `UsageError` never poisons the session — it's
/// raised synchronously and the session remains usable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum UsageError {
    #[error("the wormhole code has already been set")]
    CodeAlreadyProvided,
    #[error("the wormhole code has not been provided yet")]
    NoCodeProvided,
    #[error("one of set_code/get_code/input_code may be called, and only once")]
    CodeAcquisitionAlreadyInProgress,
    #[error("a key cannot be derived before the PAKE exchange has completed")]
    KeyNotEstablishedYet,
    #[error(transparent)]
    InvalidCode(#[from] InvalidCodeError),
}

/// The server's `welcome` frame carried an `error` field: the relay is refusing this
/// client, e.g. because it considers the protocol version unsupported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("the relay server rejected this client: {0}")]
pub struct WelcomeError(pub String);

/// The relay sent a top-level `error` frame unrelated to welcome, naming the offending
/// message it was responding to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("server error: {message} (in response to: {orig})")]
pub struct ServerError {
    pub message: String,
    pub orig: String,
}

/// Every error that can reach a caller of the public API.
///
/// Marked `#[non_exhaustive]` so new failure modes can be added without a breaking change.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum WormholeError {
    /// Caller misused the API; see [`UsageError`]. Never sticky.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// The relay refused the session via a `welcome.error` field.
    #[error(transparent)]
    Welcome(#[from] WelcomeError),

    /// Our confirmation message, or a peer message, failed to decrypt: the two sides did
    /// not derive the same key, almost always because they typed different codes.
    #[error("wrong password, or the peer never connected")]
    WrongPassword,

    /// The relay sent a standalone `error` frame.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The transport closed uncleanly, before the closure protocol completed.
    #[error("transport error: {0}")]
    Transport(String),

    /// This result was still pending when `close()` was called.
    #[error("the wormhole was closed while this operation was still pending")]
    Closed,

    /// The driver task is gone (e.g. it panicked); the facade can no longer make progress.
    #[error("the wormhole's internal task is no longer running")]
    Shutdown,
}

impl WormholeError {
    /// True for errors that indicate the peer (or an attacker) behaved unexpectedly,
    /// as opposed to ordinary connectivity loss or caller mistakes.
    pub fn is_scary(&self) -> bool {
        matches!(self, WormholeError::WrongPassword)
    }
}
