//! In-memory credential store collaborator.
//!
//! Passwords are stored only as salted Argon2id hashes; verification goes
//! through the same primitive. Not persisted across restarts — durability
//! is explicitly out of scope for this collaborator.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use keygate_core::{CollaboratorError, CredentialStore};

/// Process-local credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, CollaboratorError> {
        let stored = {
            let users = lock(&self.users);
            users.get(username).cloned()
        };
        // The slow hash runs outside the lock.
        let Some(stored) = stored else {
            return Ok(false);
        };
        let parsed = PasswordHash::new(&stored)
            .map_err(|err| CollaboratorError(format!("stored hash unparseable: {err}")))?;
        Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    }

    fn username_exists(&self, username: &str) -> Result<bool, CollaboratorError> {
        Ok(lock(&self.users).contains_key(username))
    }

    fn insert_user(&self, username: &str, password: &str) -> Result<(), CollaboratorError> {
        let mut salt_bytes = [0u8; 16];
        {
            use rand::RngCore;
            rand::thread_rng().fill_bytes(&mut salt_bytes);
        }
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|err| CollaboratorError(format!("salt encoding failed: {err}")))?;
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| CollaboratorError(format!("password hashing failed: {err}")))?
            .to_string();

        lock(&self.users).insert(username.to_string(), hash);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
