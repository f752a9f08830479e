//! SPAKE2-symmetric key agreement, HKDF key derivation, and SecretBox message sealing.
//!
//! This module has no notion of "session" or "phase ordering"; it is pure cryptographic
//! plumbing, kept free of protocol state so it can be exercised with fixed test vectors.

use crypto_secretbox::{
    aead::{Aead, KeyInit},
    Nonce, XSalsa20Poly1305,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256};
use spake2::{Ed25519Group, Identity, Password as SpakePassword, SPAKE2};

use crate::ids::{AppID, MySide, Phase, TheirSide};

/// The 32-byte shared secret produced by a completed SPAKE2 exchange.
#[derive(Clone)]
pub struct Key(pub [u8; 32]);

impl Key {
    fn as_secretbox_key(&self) -> &crypto_secretbox::Key {
        crypto_secretbox::Key::from_slice(&self.0)
    }
}

/// In-progress SPAKE2 state: our outbound message has been built, we are waiting to see
/// the peer's.
pub struct PakeState(SPAKE2<Ed25519Group>);

/// Start a SPAKE2-symmetric exchange, returning the retained state and the bytes to send
/// as the `pake` phase body.
pub fn start_pake(code: &str, app_id: &AppID) -> (PakeState, Vec<u8>) {
    let (state, msg1) = SPAKE2::<Ed25519Group>::start_symmetric(
        &SpakePassword::new(code.as_bytes()),
        &Identity::new(app_id.as_bytes()),
    );
    (PakeState(state), msg1)
}

/// Consume the peer's `pake` phase body, completing the exchange.
pub fn finish_pake(state: PakeState, peer_msg: &[u8]) -> Result<Key, spake2::Error> {
    let key = state.0.finish(peer_msg)?;
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&key);
    Ok(Key(buf))
}

fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// `HKDF-SHA256(key, purpose, length)`, the general-purpose key derivation primitive used
/// for the verifier, the confirmation key, and per-phase message keys.
pub fn derive_key(key: &Key, purpose: &[u8], length: usize) -> Vec<u8> {
    let hk = Hkdf::<Sha256>::new(None, &key.0);
    let mut out = vec![0u8; length];
    hk.expand(purpose, &mut out)
        .expect("HKDF output length is always valid for our fixed-size purposes");
    out
}

/// `HKDF(key, "wormhole:verifier", 32)` — the out-of-band comparable verifier.
pub fn derive_verifier(key: &Key) -> Vec<u8> {
    derive_key(key, b"wormhole:verifier", 32)
}

/// `HKDF(key, "wormhole:confirmation", 32)` — keys the first authenticated message, whose
/// successful decryption proves both sides hold the same key (and hence typed the same code).
pub fn derive_confirmation_key(key: &Key) -> Vec<u8> {
    derive_key(key, b"wormhole:confirmation", 32)
}

/// Per-phase message key: `HKDF(key, "wormhole:phase:" || SHA256(side) || SHA256(phase), 32)`.
///
/// `side` must be the *sender's* side: outbound messages are keyed by our own side, inbound
/// messages are decrypted with a key derived from the peer's side.
pub fn derive_phase_key(side: &str, key: &Key, phase: &Phase) -> Vec<u8> {
    let mut purpose = b"wormhole:phase:".to_vec();
    purpose.extend_from_slice(&sha256(side.as_bytes()));
    purpose.extend_from_slice(&sha256(phase.as_ref().as_bytes()));
    derive_key(key, &purpose, 32)
}

fn phase_key_for(key: &Key, side: &str, phase: &Phase) -> crypto_secretbox::Key {
    let raw = derive_phase_key(side, key, phase);
    *crypto_secretbox::Key::from_slice(&raw)
}

/// Encrypt `plaintext` with a fresh random nonce, returning `nonce || ciphertext`.
pub fn encrypt(key: &Key, plaintext: &[u8]) -> Vec<u8> {
    let mut nonce_bytes = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let cipher = XSalsa20Poly1305::new(key.as_secretbox_key());
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .expect("SecretBox encryption of an unbounded-size plaintext does not fail");
    let mut out = Vec::with_capacity(24 + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypt a `nonce || ciphertext` blob. Returns `None` on any MAC failure or malformed input.
pub fn decrypt(key: &Key, data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 24 {
        return None;
    }
    let (nonce_bytes, ciphertext) = data.split_at(24);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = XSalsa20Poly1305::new(key.as_secretbox_key());
    cipher.decrypt(nonce, ciphertext).ok()
}

/// Encrypt our outbound application/confirmation message under the phase key derived from
/// our own side.
pub fn encrypt_phase(our_side: &MySide, key: &Key, phase: &Phase, plaintext: &[u8]) -> Vec<u8> {
    let k = phase_key_for(key, our_side.as_ref(), phase);
    let k = Key({
        let mut b = [0u8; 32];
        b.copy_from_slice(&k);
        b
    });
    encrypt(&k, plaintext)
}

/// Decrypt an inbound application/confirmation message under the phase key derived from
/// the peer's side.
pub fn decrypt_phase(their_side: &TheirSide, key: &Key, phase: &Phase, data: &[u8]) -> Option<Vec<u8>> {
    let k = phase_key_for(key, their_side.as_ref(), phase);
    let k = Key({
        let mut b = [0u8; 32];
        b.copy_from_slice(&k);
        b
    });
    decrypt(&k, data)
}

/// Build a confirmation message: an encrypted zero-length payload under the confirmation
/// key. A successful decrypt of this by the peer (and vice versa) proves key agreement.
pub fn make_confirmation_message(confirmation_key: &[u8]) -> Vec<u8> {
    let mut k = [0u8; 32];
    k.copy_from_slice(confirmation_key);
    encrypt(&Key(k), &[])
}

/// Verify a confirmation message decrypts (to the expected empty payload) under our
/// confirmation key.
pub fn check_confirmation_message(confirmation_key: &[u8], data: &[u8]) -> bool {
    let mut k = [0u8; 32];
    k.copy_from_slice(confirmation_key);
    matches!(decrypt(&Key(k), data), Some(plaintext) if plaintext.is_empty())
}
