//! Ephemeral key exchange over NIST P-256.
//!
//! The curve is a protocol constant agreed out of band, never negotiated.
//! Each connection generates a fresh key pair; the private half is consumed
//! by derivation and does not outlive it. Both peers computing the ECDH
//! agreement from their own private key and the other's public key obtain
//! bit-identical 256-bit keys — the shared secret's raw bytes are used
//! directly as the channel key, matching WebCrypto `deriveBits` on the
//! browser side.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use p256::PublicKey;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::rand_core::OsRng;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};

use crate::error::HandshakeError;

/// Length of a derived shared key, in bytes (256 bits).
pub const SHARED_KEY_LEN: usize = 32;

/// A 256-bit symmetric key derived once per connection.
///
/// Exclusively owned by the connection state; never transmitted.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey([u8; SHARED_KEY_LEN]);

impl SharedKey {
    /// Raw key bytes, for handing to the codec.
    pub fn as_bytes(&self) -> &[u8; SHARED_KEY_LEN] {
        &self.0
    }
}

impl From<[u8; SHARED_KEY_LEN]> for SharedKey {
    fn from(bytes: [u8; SHARED_KEY_LEN]) -> Self {
        Self(bytes)
    }
}

// Key material stays out of logs.
impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// A per-connection ephemeral key pair.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a fresh key pair on the protocol curve.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random(&mut OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Export the public half as base64 SPKI DER, the server-to-client
    /// wire encoding.
    ///
    /// # Errors
    /// [`HandshakeError::KeyExchangeFailure`] if DER encoding fails.
    pub fn export_public_key(&self) -> Result<String, HandshakeError> {
        let der = self
            .public
            .to_public_key_der()
            .map_err(|_| HandshakeError::KeyExchangeFailure)?;
        Ok(BASE64.encode(der.as_bytes()))
    }

    /// Derive the shared channel key, consuming the private half.
    pub fn derive_shared_key(self, peer_public: &PublicKey) -> SharedKey {
        let secret = self.secret.diffie_hellman(peer_public);
        let mut key = [0u8; SHARED_KEY_LEN];
        key.copy_from_slice(secret.raw_secret_bytes());
        SharedKey(key)
    }
}

/// Import a peer's ephemeral public key from its portable encoding.
///
/// Accepts SPKI as PEM (the browser export format) or base64 DER, both
/// constrained to the protocol curve.
///
/// # Errors
/// [`HandshakeError::InvalidKeyEncoding`] on malformed or wrong-curve input.
pub fn import_peer_public_key(encoded: &str) -> Result<PublicKey, HandshakeError> {
    let trimmed = encoded.trim();
    if trimmed.contains("-----BEGIN PUBLIC KEY-----") {
        return PublicKey::from_public_key_pem(trimmed)
            .map_err(|_| HandshakeError::InvalidKeyEncoding);
    }
    let der = BASE64
        .decode(trimmed)
        .map_err(|_| HandshakeError::InvalidKeyEncoding)?;
    PublicKey::from_public_key_der(&der).map_err(|_| HandshakeError::InvalidKeyEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_peers_derive_identical_keys() {
        let client = EphemeralKeyPair::generate();
        let server = EphemeralKeyPair::generate();

        let client_pub = import_peer_public_key(&client.export_public_key().unwrap()).unwrap();
        let server_pub = import_peer_public_key(&server.export_public_key().unwrap()).unwrap();

        let client_key = client.derive_shared_key(&server_pub);
        let server_key = server.derive_shared_key(&client_pub);

        assert_eq!(client_key, server_key);
    }

    #[test]
    fn distinct_private_keys_disagree() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();
        let peer = EphemeralKeyPair::generate();

        let peer_pub = import_peer_public_key(&peer.export_public_key().unwrap()).unwrap();

        let key_a = a.derive_shared_key(&peer_pub);
        let key_b = b.derive_shared_key(&peer_pub);
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn imports_pem_encoding() {
        let pair = EphemeralKeyPair::generate();
        let der_b64 = pair.export_public_key().unwrap();

        // Re-wrap the DER into PEM the way a browser would export it.
        let wrapped: Vec<String> = der_b64
            .as_bytes()
            .chunks(64)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect();
        let pem = format!(
            "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----",
            wrapped.join("\n")
        );

        let from_pem = import_peer_public_key(&pem).unwrap();
        let from_b64 = import_peer_public_key(&der_b64).unwrap();
        assert_eq!(from_pem, from_b64);
    }

    #[test]
    fn rejects_garbage_key() {
        assert_eq!(
            import_peer_public_key("not a key").unwrap_err(),
            HandshakeError::InvalidKeyEncoding
        );
    }

    #[test]
    fn rejects_empty_key() {
        assert_eq!(
            import_peer_public_key("").unwrap_err(),
            HandshakeError::InvalidKeyEncoding
        );
    }

    #[test]
    fn rejects_valid_base64_invalid_der() {
        let bogus = BASE64.encode(b"these are not SPKI bytes");
        assert_eq!(
            import_peer_public_key(&bogus).unwrap_err(),
            HandshakeError::InvalidKeyEncoding
        );
    }
}
