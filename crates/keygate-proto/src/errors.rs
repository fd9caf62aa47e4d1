//! Error types for wire-format parsing and encoding.

use thiserror::Error;

/// Errors produced while parsing or encoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The inbound text was not a JSON object matching any known message
    /// shape.
    #[error("malformed message")]
    MalformedMessage,

    /// An envelope field was not valid hex, or had an impossible length.
    #[error("invalid {field} encoding in envelope")]
    InvalidEnvelopeField {
        /// Which of `iv`, `payload`, or `tag` failed to decode.
        field: &'static str,
    },

    /// Serializing an outbound message failed.
    #[error("message encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result alias for wire-format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
