//! Plaintext protocol messages exchanged over the connection.
//!
//! Client-to-server traffic is either a public-key announcement (before the
//! shared key exists) or an encrypted envelope (after). Server-to-client
//! traffic adds the initial readiness status and the plaintext error shape
//! used for protocol violations before the channel is sealed.

use serde::{Deserialize, Serialize};

use crate::envelope::WireEnvelope;
use crate::errors::{ProtocolError, Result};

/// A message received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `{"type":"client-public-key","key":...}` — the peer's ephemeral
    /// public key in a portable SPKI encoding (PEM or base64 DER).
    PublicKey {
        /// The encoded public key, uninterpreted at this layer.
        key: String,
    },
    /// An encrypted envelope; only legal once the shared key exists.
    Envelope(WireEnvelope),
}

/// Internally tagged shape for typed client messages.
#[derive(Deserialize)]
#[serde(tag = "type")]
enum TaggedClient {
    #[serde(rename = "client-public-key")]
    ClientPublicKey { key: String },
}

/// Untagged union used only during parsing. Envelope is tried last since it
/// is discriminated by its field set rather than a `type` tag.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawClient {
    Tagged(TaggedClient),
    Envelope(WireEnvelope),
}

impl ClientMessage {
    /// Parse one inbound text frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::MalformedMessage`] if the text is not a JSON
    /// object matching either known shape.
    pub fn parse(text: &str) -> Result<Self> {
        match serde_json::from_str::<RawClient>(text) {
            Ok(RawClient::Tagged(TaggedClient::ClientPublicKey { key })) => {
                Ok(Self::PublicKey { key })
            }
            Ok(RawClient::Envelope(envelope)) => Ok(Self::Envelope(envelope)),
            Err(_) => Err(ProtocolError::MalformedMessage),
        }
    }

    /// Serialize for sending (used by clients and tests).
    pub fn encode(&self) -> Result<String> {
        let value = match self {
            Self::PublicKey { key } => serde_json::json!({
                "type": "client-public-key",
                "key": key,
            }),
            Self::Envelope(envelope) => serde_json::to_value(envelope)?,
        };
        Ok(serde_json::to_string(&value)?)
    }
}

/// A message sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// `{"status":"awaiting-client-public-key"}` — sent once on connect.
    Status {
        /// Status discriminant; only one value exists on this protocol.
        status: StatusKind,
    },
    /// `{"type":"server-public-key","serverPubKey":...}` — handshake reply.
    ServerPublicKey {
        /// Message discriminant.
        #[serde(rename = "type")]
        kind: ServerKeyKind,
        /// The server's ephemeral public key, base64 SPKI DER.
        #[serde(rename = "serverPubKey")]
        server_pub_key: String,
    },
    /// An encrypted envelope carrying the application response.
    Envelope(WireEnvelope),
    /// `{"error":...}` — plaintext protocol error, always followed by close.
    Error {
        /// Human-readable terminal reason.
        error: String,
    },
}

/// The single readiness status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusKind {
    /// Waiting for the peer's ephemeral public key.
    #[serde(rename = "awaiting-client-public-key")]
    AwaitingClientPublicKey,
}

/// The `type` tag of the server key announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerKeyKind {
    /// Server ephemeral public key announcement.
    #[serde(rename = "server-public-key")]
    ServerPublicKey,
}

impl ServerMessage {
    /// The readiness message sent when a connection opens.
    pub fn awaiting_client_key() -> Self {
        Self::Status { status: StatusKind::AwaitingClientPublicKey }
    }

    /// The server's ephemeral public key announcement.
    pub fn server_public_key(server_pub_key: String) -> Self {
        Self::ServerPublicKey { kind: ServerKeyKind::ServerPublicKey, server_pub_key }
    }

    /// A plaintext terminal error.
    pub fn plain_error(reason: impl Into<String>) -> Self {
        Self::Error { error: reason.into() }
    }

    /// Serialize for sending.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
