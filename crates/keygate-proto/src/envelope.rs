//! Encrypted envelope wire encoding.
//!
//! The three AEAD components travel as independent hex strings. The tag is
//! never concatenated into the ciphertext on the wire; reassembly happens on
//! the receiving side, immediately before authenticated decryption.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Length of an AEAD nonce on this protocol, in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Length of an AEAD authentication tag, in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// An encrypted envelope as it appears on the wire.
///
/// `iv` decodes to exactly [`NONCE_LEN`] bytes and `tag` to exactly
/// [`TAG_LEN`] bytes; `payload` is variable-length ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireEnvelope {
    /// Nonce, hex-encoded.
    pub iv: String,
    /// Ciphertext, hex-encoded.
    pub payload: String,
    /// Authentication tag, hex-encoded.
    pub tag: String,
}

impl WireEnvelope {
    /// Build a wire envelope from raw AEAD components.
    pub fn from_parts(nonce: &[u8; NONCE_LEN], ciphertext: &[u8], tag: &[u8; TAG_LEN]) -> Self {
        Self {
            iv: hex::encode(nonce),
            payload: hex::encode(ciphertext),
            tag: hex::encode(tag),
        }
    }

    /// Decode the hex fields back into raw AEAD components.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidEnvelopeField`] naming the first field
    /// that is not valid hex or has the wrong length.
    pub fn decode(&self) -> Result<([u8; NONCE_LEN], Vec<u8>, [u8; TAG_LEN])> {
        let nonce: [u8; NONCE_LEN] = hex::decode(&self.iv)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(ProtocolError::InvalidEnvelopeField { field: "iv" })?;

        let ciphertext = hex::decode(&self.payload)
            .map_err(|_| ProtocolError::InvalidEnvelopeField { field: "payload" })?;

        let tag: [u8; TAG_LEN] = hex::decode(&self.tag)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(ProtocolError::InvalidEnvelopeField { field: "tag" })?;

        Ok((nonce, ciphertext, tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_parts() {
        let nonce = [7u8; NONCE_LEN];
        let tag = [9u8; TAG_LEN];
        let envelope = WireEnvelope::from_parts(&nonce, b"ciphertext bytes", &tag);

        let (n, c, t) = envelope.decode().unwrap();
        assert_eq!(n, nonce);
        assert_eq!(c, b"ciphertext bytes");
        assert_eq!(t, tag);
    }

    #[test]
    fn rejects_non_hex_iv() {
        let envelope = WireEnvelope {
            iv: "zz".repeat(NONCE_LEN),
            payload: "00".into(),
            tag: "00".repeat(TAG_LEN),
        };
        assert!(matches!(
            envelope.decode(),
            Err(ProtocolError::InvalidEnvelopeField { field: "iv" })
        ));
    }

    #[test]
    fn rejects_short_tag() {
        let envelope = WireEnvelope {
            iv: "00".repeat(NONCE_LEN),
            payload: "00".into(),
            tag: "00".repeat(TAG_LEN - 1),
        };
        assert!(matches!(
            envelope.decode(),
            Err(ProtocolError::InvalidEnvelopeField { field: "tag" })
        ));
    }

    #[test]
    fn empty_ciphertext_is_allowed() {
        let envelope = WireEnvelope {
            iv: "00".repeat(NONCE_LEN),
            payload: String::new(),
            tag: "00".repeat(TAG_LEN),
        };
        let (_, ciphertext, _) = envelope.decode().unwrap();
        assert!(ciphertext.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn decode_never_panics(iv in ".*", payload in ".*", tag in ".*") {
            let envelope = WireEnvelope { iv, payload, tag };
            let _ = envelope.decode();
        }
    }
}
