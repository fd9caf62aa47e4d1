//! HMAC-signed token issuer collaborator.
//!
//! Tokens are `base64url(claims-json) "." base64url(hmac-sha256)` over the
//! claims bytes. This is a deliberately plain mint/verify contract: the
//! core only ever sees opaque strings, and the issuer can be swapped for
//! any other signed-token format behind the same trait.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use hmac::{Hmac, Mac};
use keygate_core::{CollaboratorError, TokenClaims, TokenIssuer};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize, Deserialize)]
struct WireClaims {
    username: String,
    uuid: String,
    /// Expiry as unix seconds.
    exp: u64,
}

/// Token issuer keyed by a process-wide secret.
pub struct HmacTokenIssuer {
    secret: Vec<u8>,
}

impl HmacTokenIssuer {
    /// Build an issuer from a signing secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    /// Build an issuer with a fresh random secret. Tokens minted before a
    /// restart will not verify.
    pub fn with_random_secret() -> Self {
        use rand::RngCore;
        let mut secret = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self { secret }
    }

    fn mac(&self) -> Result<HmacSha256, CollaboratorError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| CollaboratorError(format!("hmac key rejected: {err}")))
    }
}

fn unix_now() -> Result<u64, CollaboratorError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .map_err(|err| CollaboratorError(format!("clock before epoch: {err}")))
}

impl TokenIssuer for HmacTokenIssuer {
    fn mint(&self, claims: &TokenClaims, ttl: Duration) -> Result<String, CollaboratorError> {
        let wire = WireClaims {
            username: claims.username.clone(),
            uuid: claims.uuid.clone(),
            exp: unix_now()?.saturating_add(ttl.as_secs()),
        };
        let payload = serde_json::to_vec(&wire)
            .map_err(|err| CollaboratorError(format!("claims encoding failed: {err}")))?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}.{}", B64.encode(&payload), B64.encode(signature)))
    }

    fn verify(&self, token: &str) -> Result<TokenClaims, CollaboratorError> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or_else(|| CollaboratorError("token has no signature".into()))?;
        let payload = B64
            .decode(payload_b64)
            .map_err(|_| CollaboratorError("token payload is not base64".into()))?;
        let signature = B64
            .decode(signature_b64)
            .map_err(|_| CollaboratorError("token signature is not base64".into()))?;

        // Constant-time comparison via the MAC itself.
        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| CollaboratorError("token signature mismatch".into()))?;

        let wire: WireClaims = serde_json::from_slice(&payload)
            .map_err(|_| CollaboratorError("token claims unparseable".into()))?;
        if wire.exp < unix_now()? {
            return Err(CollaboratorError("token expired".into()));
        }
        Ok(TokenClaims { username: wire.username, uuid: wire.uuid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> HmacTokenIssuer {
        HmacTokenIssuer::new(&b"test-secret"[..])
    }

    fn claims() -> TokenClaims {
        TokenClaims { username: "alice".into(), uuid: "u1".into() }
    }

    #[test]
    fn mint_verify_round_trip() {
        let issuer = issuer();
        let token = issuer.mint(&claims(), Duration::from_secs(60)).unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), claims());
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = issuer();
        let token = issuer.mint(&claims(), Duration::ZERO).unwrap();
        // exp == now is still valid; one second in the past is not.
        std::thread::sleep(Duration::from_millis(1100));
        assert!(issuer.verify(&token).is_err());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let issuer = issuer();
        let token = issuer.mint(&claims(), Duration::from_secs(60)).unwrap();

        let (payload_b64, signature_b64) = token.split_once('.').unwrap();
        let mut payload = B64.decode(payload_b64).unwrap();
        // Change the username inside the signed claims.
        let text = String::from_utf8(payload.clone()).unwrap().replace("alice", "mallory");
        payload = text.into_bytes();
        let forged = format!("{}.{}", B64.encode(&payload), signature_b64);

        assert!(issuer.verify(&forged).is_err());
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = issuer().mint(&claims(), Duration::from_secs(60)).unwrap();
        let other = HmacTokenIssuer::new(&b"different-secret"[..]);
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let issuer = issuer();
        assert!(issuer.verify("").is_err());
        assert!(issuer.verify("no-dot-here").is_err());
        assert!(issuer.verify("a.b").is_err());
    }
}
