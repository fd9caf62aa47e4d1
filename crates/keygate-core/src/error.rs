//! Error types for the registry and state-machine layers.
//!
//! Every variant here is terminal for the connection that raised it: the
//! reason is reported to the peer (plaintext before key establishment,
//! encrypted after) and the connection is closed. Nothing is retried and
//! nothing propagates upward to crash the process.

use thiserror::Error;

/// Session-registry failures. Attach is all-or-nothing: a failed call
/// leaves the registry unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The session token is unknown.
    #[error("session not found")]
    SessionNotFound,

    /// The one-way hash of the claimed identifier does not match the hash
    /// stored at creation.
    #[error("identifier mismatch")]
    IdentifierMismatch,

    /// A live connection is already bound to this session.
    #[error("session already bound to a live connection")]
    AlreadyBound,

    /// Hashing the owner identifier failed.
    #[error("identifier hashing failed")]
    IdentifierHashing,
}

/// State-machine failures, with `Display` texts that go to the peer as the
/// plaintext `{"error":...}` reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// No valid key message arrived within the handshake window.
    #[error("Timeout: No client-public-key received")]
    HandshakeTimeout,

    /// A message arrived out of protocol order.
    #[error("Expected client-public-key first")]
    ProtocolOrderViolation,

    /// The inbound text was not a well-formed protocol message.
    #[error("Invalid JSON")]
    MalformedMessage,

    /// Key import or shared-key derivation failed.
    #[error("Key exchange failed")]
    KeyExchangeFailure,

    /// An envelope component was missing or malformed.
    #[error("Invalid iv/payload/tag format")]
    InvalidEnvelope,

    /// Decryption or response encryption failed. Deliberately generic; the
    /// peer learns nothing about which step failed.
    #[error("Auth failed or bad encrypted message")]
    DecryptionFailure,
}
