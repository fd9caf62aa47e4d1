//! AES-256-GCM sealing and opening of channel payloads.
//!
//! Stateless: every call takes the key explicitly and `seal` draws a fresh
//! random 96-bit nonce, so nonces never repeat under one key. The tag is
//! kept separate from the ciphertext; the wire layer transports the three
//! components independently and `open` reassembles them before
//! authenticated decryption.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, OsRng, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

use crate::error::CodecError;
use crate::handshake::SharedKey;

/// Nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// The three AEAD components of one sealed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    /// Fresh random nonce.
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext, same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// Authentication tag over the ciphertext.
    pub tag: [u8; TAG_LEN],
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// # Errors
/// [`CodecError::AuthenticationFailure`] if the cipher rejects the input;
/// internal faults are not distinguished further.
pub fn seal(key: &SharedKey, plaintext: &[u8]) -> Result<SealedEnvelope, CodecError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let combined = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload::from(plaintext))
        .map_err(|_| CodecError::AuthenticationFailure)?;

    // The aead API appends the tag to the ciphertext; split it back out so
    // the wire can carry the components independently.
    let split_at = combined.len() - TAG_LEN;
    let mut ciphertext = combined;
    let tag_bytes = ciphertext.split_off(split_at);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&tag_bytes);

    Ok(SealedEnvelope { nonce, ciphertext, tag })
}

/// Authenticate and decrypt a sealed envelope.
///
/// Fails closed: on any tag mismatch or malformed component no plaintext is
/// returned, partial or otherwise.
///
/// # Errors
/// [`CodecError::AuthenticationFailure`] on verification failure.
pub fn open(key: &SharedKey, envelope: &SealedEnvelope) -> Result<Vec<u8>, CodecError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut combined = Vec::with_capacity(envelope.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&envelope.ciphertext);
    combined.extend_from_slice(&envelope.tag);

    cipher
        .decrypt(Nonce::from_slice(&envelope.nonce), Payload::from(combined.as_slice()))
        .map_err(|_| CodecError::AuthenticationFailure)
}
