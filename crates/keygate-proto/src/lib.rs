//! Wire format for the Keygate secure-channel protocol.
//!
//! Messages are JSON-object framed and strictly ordered. A connection first
//! negotiates an ephemeral shared key (plaintext key-announcement messages),
//! then carries exactly one encrypted request/response exchange. The envelope
//! keeps nonce, ciphertext, and auth tag as three independent hex strings;
//! the receiver reassembles them before authenticated decryption.
//!
//! This crate owns the message shapes and their parsing errors only.
//! Sequencing rules (which message is legal when) live in `keygate-core`.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod envelope;
pub mod errors;
pub mod messages;

pub use command::{AuthCommand, AuthResponse, CommandError};
pub use envelope::WireEnvelope;
pub use errors::{ProtocolError, Result};
pub use messages::{ClientMessage, ServerMessage};
