//! Process-wide session registry with exclusive connection binding.
//!
//! A session is created by the HTTP layer before the client connects; its
//! token is a one-time value binding that HTTP request to exactly one
//! subsequent persistent connection. The registry stores a salted slow hash
//! (Argon2id) of the client-supplied owner identifier, never the plaintext,
//! so possession of the raw identifier is required to attach.
//!
//! All operations are safe under concurrent invocation. The
//! bound-check-and-set inside [`SessionRegistry::attach`] happens under one
//! lock acquisition, so two racing attaches for the same token cannot both
//! succeed. The slow hash verification runs outside the lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use tracing::{info, warn};

use crate::env::Environment;
use crate::error::RegistryError;

/// WebSocket-style close code sent when a bound connection is forcibly
/// terminated by a detach.
pub const DETACH_CLOSE_CODE: u16 = 4001;

/// Why a bound connection is being forcibly terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The session was removed while the connection was still bound.
    SessionDetached,
}

impl CloseReason {
    /// The close code carried on the wire.
    pub fn code(self) -> u16 {
        match self {
            Self::SessionDetached => DETACH_CLOSE_CODE,
        }
    }

    /// The close reason text carried on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionDetached => "Session removed",
        }
    }
}

/// A handle through which the registry can observe and terminate a bound
/// connection. Implemented by the server driver; test doubles are trivial.
pub trait ConnectionHandle: Send + Sync + 'static {
    /// Whether the connection behind this handle is still live. A stale
    /// binding (dead connection) does not block a new attach.
    fn is_live(&self) -> bool;

    /// Forcibly terminate the connection. Must be safe to call on an
    /// already-dead connection.
    fn force_close(&self, reason: CloseReason);
}

/// One-time opaque session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Token length in random bytes before hex encoding.
    const RAW_LEN: usize = 16;

    fn generate(env: &impl Environment) -> Self {
        let mut raw = [0u8; Self::RAW_LEN];
        env.random_bytes(&mut raw);
        Self(hex::encode(raw))
    }

    /// The token text as it appears in URLs.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct SessionEntry {
    owner_hash: String,
    connection: Option<Arc<dyn ConnectionHandle>>,
}

/// Concurrency-safe mapping from session token to connection binding.
///
/// The raw map is never exposed; only the atomic operations below are.
/// Sessions are not expired automatically here; the surrounding system may
/// do so at its boundary.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionToken, SessionEntry>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for `owner_identifier`, returning its one-time
    /// token. Only the Argon2id hash of the identifier is stored.
    ///
    /// # Errors
    /// [`RegistryError::IdentifierHashing`] if the hash cannot be computed.
    pub fn create_session(
        &self,
        owner_identifier: &str,
        env: &impl Environment,
    ) -> Result<SessionToken, RegistryError> {
        let owner_hash = hash_identifier(owner_identifier, env)?;
        let entry = SessionEntry { owner_hash, connection: None };

        let mut sessions = lock(&self.sessions);
        // 128-bit random tokens do not collide in practice; loop anyway so a
        // collision can never silently replace an existing session.
        let token = loop {
            let candidate = SessionToken::generate(env);
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.insert(token.clone(), entry);
        drop(sessions);

        info!(token = %token, "session created");
        Ok(token)
    }

    /// Bind `connection` to the session, verifying the claimed owner
    /// identifier against the stored hash.
    ///
    /// All-or-nothing: on any error the registry is unchanged. The
    /// bound-check-and-set is atomic; the slow hash check runs outside the
    /// lock, after which the entry is re-validated.
    ///
    /// # Errors
    /// [`RegistryError::SessionNotFound`], [`RegistryError::IdentifierMismatch`],
    /// or [`RegistryError::AlreadyBound`].
    pub fn attach(
        &self,
        token: &SessionToken,
        connection: Arc<dyn ConnectionHandle>,
        claimed_identifier: &str,
    ) -> Result<(), RegistryError> {
        let owner_hash = {
            let sessions = lock(&self.sessions);
            let entry = sessions.get(token).ok_or(RegistryError::SessionNotFound)?;
            entry.owner_hash.clone()
        };

        if !verify_identifier(claimed_identifier, &owner_hash) {
            warn!(token = %token, "identifier mismatch on attach");
            return Err(RegistryError::IdentifierMismatch);
        }

        let mut sessions = lock(&self.sessions);
        let entry = sessions.get_mut(token).ok_or(RegistryError::SessionNotFound)?;
        if entry.connection.as_ref().is_some_and(|existing| existing.is_live()) {
            warn!(token = %token, "connection already attached, blocking new connection");
            return Err(RegistryError::AlreadyBound);
        }
        entry.connection = Some(connection);
        drop(sessions);

        info!(token = %token, "connection attached");
        Ok(())
    }

    /// Remove the session, forcibly terminating any live bound connection.
    ///
    /// Idempotent: detaching an unknown or already-detached token is a
    /// no-op logged as a warning.
    pub fn detach(&self, token: &SessionToken) {
        let removed = lock(&self.sessions).remove(token);
        match removed {
            Some(entry) => {
                if let Some(connection) = entry.connection {
                    if connection.is_live() {
                        connection.force_close(CloseReason::SessionDetached);
                    }
                }
                info!(token = %token, "session removed");
            }
            None => {
                warn!(token = %token, "attempted to remove non-existent session");
            }
        }
    }

    /// Whether a session with this token currently exists.
    pub fn has_session(&self, token: &SessionToken) -> bool {
        lock(&self.sessions).contains_key(token)
    }
}

/// A panicked holder cannot leave the map in a torn state; all mutations
/// are single insert/remove calls, so recover from poisoning.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn hash_identifier(identifier: &str, env: &impl Environment) -> Result<String, RegistryError> {
    let mut salt_bytes = [0u8; 16];
    env.random_bytes(&mut salt_bytes);
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|_| RegistryError::IdentifierHashing)?;
    Argon2::default()
        .hash_password(identifier.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| RegistryError::IdentifierHashing)
}

/// Comparison goes through the hashing primitive, not raw equality; the
/// stored value is salted.
fn verify_identifier(claimed: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| Argon2::default().verify_password(claimed.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}
