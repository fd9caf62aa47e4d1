//! Error types for the handshake and codec layers.

use thiserror::Error;

/// Errors from ephemeral key handling and shared-key derivation.
///
/// Internal faults during key operations are deliberately collapsed into
/// these two variants; nothing from the underlying curve implementation
/// leaks to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// The peer's public key was malformed, or not a point on the
    /// protocol's curve.
    #[error("invalid public key encoding")]
    InvalidKeyEncoding,

    /// Key generation, export, or agreement failed.
    #[error("key exchange failed")]
    KeyExchangeFailure,
}

/// Errors from sealing and opening envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The tag did not verify, or an envelope component was malformed.
    /// No partial plaintext is ever returned.
    #[error("authentication failure")]
    AuthenticationFailure,
}
