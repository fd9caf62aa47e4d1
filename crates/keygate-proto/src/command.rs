//! Application commands and responses carried inside the encrypted channel.
//!
//! These shapes are owned by the credential collaborator; the core only
//! decrypts, parses, dispatches, and re-encrypts. Field validation mirrors
//! the protocol rule that a missing credential field is a domain error (it
//! travels back encrypted), not a protocol violation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::Result;

/// A decrypted credential-verification command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthCommand {
    /// Verify an existing credential pair and mint a token.
    Login {
        /// Account name.
        username: String,
        /// Plaintext password; only ever seen decrypted, in memory.
        password: String,
        /// The session owner identifier, echoed into the token claims.
        uuid: String,
    },
    /// Create a new credential record and mint a token.
    Register {
        /// Account name; must be unique.
        username: String,
        /// Plaintext password.
        password: String,
        /// The session owner identifier.
        uuid: String,
    },
}

/// Why a decrypted payload could not be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The plaintext was not a JSON object.
    #[error("Invalid JSON format")]
    Malformed,
    /// One of `username`, `password`, `uuid` was absent or empty.
    #[error("Missing username, password, or uuid")]
    MissingCredentialFields,
    /// The `type` field named no known command.
    #[error("Unknown message type")]
    UnknownCommand,
}

/// Loose intermediate shape so field presence can be checked before the
/// command type is, matching the observed validation order.
#[derive(Deserialize)]
struct RawCommand {
    #[serde(rename = "type")]
    kind: Option<String>,
    username: Option<String>,
    password: Option<String>,
    uuid: Option<String>,
}

impl AuthCommand {
    /// Parse a decrypted payload into a command.
    ///
    /// # Errors
    /// [`CommandError::Malformed`] for non-JSON input,
    /// [`CommandError::MissingCredentialFields`] when any credential field is
    /// absent or empty, and [`CommandError::UnknownCommand`] for an
    /// unrecognized `type`.
    pub fn parse(plaintext: &[u8]) -> std::result::Result<Self, CommandError> {
        let raw: RawCommand =
            serde_json::from_slice(plaintext).map_err(|_| CommandError::Malformed)?;

        let (username, password, uuid) = match (raw.username, raw.password, raw.uuid) {
            (Some(u), Some(p), Some(i)) if !u.is_empty() && !p.is_empty() && !i.is_empty() => {
                (u, p, i)
            }
            _ => return Err(CommandError::MissingCredentialFields),
        };

        match raw.kind.as_deref() {
            Some("login") => Ok(Self::Login { username, password, uuid }),
            Some("register") => Ok(Self::Register { username, password, uuid }),
            _ => Err(CommandError::UnknownCommand),
        }
    }

    /// Serialize for transmission (client side and tests).
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The application response, encrypted before it leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthResponse {
    /// The command succeeded and a token was minted.
    Success {
        /// Human-readable outcome.
        message: String,
        /// The issued token.
        token: String,
    },
    /// The command failed for a domain reason.
    Error {
        /// Human-readable failure reason.
        message: String,
    },
}

impl AuthResponse {
    /// A success response carrying a freshly minted token.
    pub fn success(message: impl Into<String>, token: impl Into<String>) -> Self {
        Self::Success { message: message.into(), token: token.into() }
    }

    /// A domain-error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Serialize for encryption.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a decrypted response (client side and tests).
    pub fn parse(plaintext: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(plaintext)?)
    }
}
