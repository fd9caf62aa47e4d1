//! Keygate protocol core logic.
//!
//! Pure protocol state, decoupled from I/O. The connection state machine
//! consumes discrete events (inbound message, timeout) with time passed as
//! a parameter and returns declarative actions for a driver to execute; the
//! session registry is the only cross-connection shared state and exposes
//! atomic operations only.
//!
//! # Components
//!
//! - [`connection`]: per-connection secure-channel state machine
//! - [`registry`]: session-token registry with exclusive attachment
//! - [`auth`]: credential-store and token-issuer collaborator seams
//! - [`mod@env`]: environment abstraction (time, RNG)
//! - [`error`]: layer error types

pub mod auth;
pub mod connection;
pub mod env;
pub mod error;
pub mod registry;

pub use auth::{
    AuthDispatcher, CollaboratorError, CommandHandler, CredentialStore, TokenClaims, TokenIssuer,
};
pub use connection::{
    ChannelAction, ChannelConfig, ChannelState, HANDSHAKE_TIMEOUT, SecureChannel,
};
pub use env::{Environment, SystemEnv};
pub use error::{ChannelError, RegistryError};
pub use registry::{CloseReason, ConnectionHandle, SessionRegistry, SessionToken};
