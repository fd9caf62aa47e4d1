//! Cryptographic primitives for the Keygate secure channel.
//!
//! Two pure components, both driven by the connection state machine in
//! `keygate-core`:
//!
//! - [`handshake`]: per-connection ephemeral P-256 key pairs, ECDH
//!   shared-key derivation, and portable SPKI public-key encodings.
//! - [`codec`]: AES-256-GCM sealing and opening of opaque byte payloads
//!   with a fresh random nonce per call.
//!
//! Neither component holds connection state or performs I/O; randomness is
//! the only side effect.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod handshake;

pub use codec::{SealedEnvelope, open, seal};
pub use error::{CodecError, HandshakeError};
pub use handshake::{EphemeralKeyPair, SharedKey, import_peer_public_key};
