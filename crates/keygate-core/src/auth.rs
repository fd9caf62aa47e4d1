//! Collaborator seams for credential verification and token issuance.
//!
//! The core never stores credentials or signs tokens itself; it dispatches
//! decrypted commands across these traits and re-encrypts whatever comes
//! back. Domain failures (`Invalid credentials`, `Username already exists`,
//! ...) are responses, not protocol errors: they travel encrypted and do
//! not by themselves distinguish which step failed.

use std::time::Duration;

use keygate_proto::{AuthCommand, AuthResponse};
use thiserror::Error;
use tracing::{error, info};

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Claims carried by an issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Authenticated account name.
    pub username: String,
    /// The session owner identifier the flow was initiated with.
    pub uuid: String,
}

/// An internal collaborator fault. Opaque to the peer; it surfaces as a
/// generic error response and a log line, never a crash.
#[derive(Debug, Error)]
#[error("collaborator failure: {0}")]
pub struct CollaboratorError(pub String);

/// Credential storage and verification, owned by an external collaborator.
pub trait CredentialStore: Send + Sync {
    /// Whether `username`/`password` match a stored record.
    fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, CollaboratorError>;

    /// Whether `username` is already taken.
    fn username_exists(&self, username: &str) -> Result<bool, CollaboratorError>;

    /// Persist a new credential record.
    fn insert_user(&self, username: &str, password: &str) -> Result<(), CollaboratorError>;
}

/// Signed-token issuance and verification, owned by an external
/// collaborator.
pub trait TokenIssuer: Send + Sync {
    /// Mint a token for `claims`, valid for `ttl`.
    fn mint(&self, claims: &TokenClaims, ttl: Duration) -> Result<String, CollaboratorError>;

    /// Verify a presented token, returning its claims if valid and
    /// unexpired.
    fn verify(&self, token: &str) -> Result<TokenClaims, CollaboratorError>;
}

/// Consumer of decrypted application commands. The state machine calls this
/// once per connection, after successful decryption.
pub trait CommandHandler: Send + Sync {
    /// Produce the response that will be encrypted and returned.
    fn handle(&self, command: AuthCommand) -> AuthResponse;
}

/// Dispatches commands to the credential store and token issuer.
pub struct AuthDispatcher<S, T> {
    store: S,
    issuer: T,
    token_ttl: Duration,
}

impl<S: CredentialStore, T: TokenIssuer> AuthDispatcher<S, T> {
    /// Build a dispatcher with the default token lifetime.
    pub fn new(store: S, issuer: T) -> Self {
        Self::with_ttl(store, issuer, DEFAULT_TOKEN_TTL)
    }

    /// Build a dispatcher with an explicit token lifetime.
    pub fn with_ttl(store: S, issuer: T, token_ttl: Duration) -> Self {
        Self { store, issuer, token_ttl }
    }

    /// The token issuer, for flows that verify without dispatching.
    pub fn issuer(&self) -> &T {
        &self.issuer
    }

    fn login(&self, username: &str, password: &str, uuid: &str) -> AuthResponse {
        info!(username, "login attempt");
        match self.store.verify_credentials(username, password) {
            Ok(true) => {}
            Ok(false) => {
                // Uniform message for unknown user and wrong password.
                info!(username, "invalid credentials");
                return AuthResponse::error("Invalid credentials");
            }
            Err(err) => return internal_error(&err),
        }
        self.mint_for(username, uuid, "Login successful")
    }

    fn register(&self, username: &str, password: &str, uuid: &str) -> AuthResponse {
        match self.store.username_exists(username) {
            Ok(true) => {
                info!(username, "username already exists");
                return AuthResponse::error("Username already exists");
            }
            Ok(false) => {}
            Err(err) => return internal_error(&err),
        }
        if let Err(err) = self.store.insert_user(username, password) {
            return internal_error(&err);
        }
        self.mint_for(username, uuid, "User registered")
    }

    fn mint_for(&self, username: &str, uuid: &str, message: &str) -> AuthResponse {
        let claims = TokenClaims { username: username.to_string(), uuid: uuid.to_string() };
        match self.issuer.mint(&claims, self.token_ttl) {
            Ok(token) => AuthResponse::success(message, token),
            Err(err) => internal_error(&err),
        }
    }
}

impl<S: CredentialStore, T: TokenIssuer> CommandHandler for AuthDispatcher<S, T> {
    fn handle(&self, command: AuthCommand) -> AuthResponse {
        match command {
            AuthCommand::Login { username, password, uuid } => {
                self.login(&username, &password, &uuid)
            }
            AuthCommand::Register { username, password, uuid } => {
                self.register(&username, &password, &uuid)
            }
        }
    }
}

fn internal_error(err: &CollaboratorError) -> AuthResponse {
    error!(%err, "auth collaborator failure");
    AuthResponse::error("Internal error")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct StubStore {
        users: Mutex<HashMap<String, String>>,
    }

    impl CredentialStore for StubStore {
        fn verify_credentials(
            &self,
            username: &str,
            password: &str,
        ) -> Result<bool, CollaboratorError> {
            Ok(self
                .users
                .lock()
                .map_err(|_| CollaboratorError("lock".into()))?
                .get(username)
                .is_some_and(|stored| stored == password))
        }

        fn username_exists(&self, username: &str) -> Result<bool, CollaboratorError> {
            Ok(self
                .users
                .lock()
                .map_err(|_| CollaboratorError("lock".into()))?
                .contains_key(username))
        }

        fn insert_user(&self, username: &str, password: &str) -> Result<(), CollaboratorError> {
            self.users
                .lock()
                .map_err(|_| CollaboratorError("lock".into()))?
                .insert(username.to_string(), password.to_string());
            Ok(())
        }
    }

    struct StubIssuer;

    impl TokenIssuer for StubIssuer {
        fn mint(&self, claims: &TokenClaims, _ttl: Duration) -> Result<String, CollaboratorError> {
            Ok(format!("tok-{}-{}", claims.username, claims.uuid))
        }

        fn verify(&self, token: &str) -> Result<TokenClaims, CollaboratorError> {
            let rest = token
                .strip_prefix("tok-")
                .ok_or_else(|| CollaboratorError("bad token".into()))?;
            let (username, uuid) = rest
                .split_once('-')
                .ok_or_else(|| CollaboratorError("bad token".into()))?;
            Ok(TokenClaims { username: username.to_string(), uuid: uuid.to_string() })
        }
    }

    fn dispatcher() -> AuthDispatcher<StubStore, StubIssuer> {
        AuthDispatcher::new(StubStore::default(), StubIssuer)
    }

    #[test]
    fn register_then_login() {
        let dispatcher = dispatcher();

        let response = dispatcher.handle(AuthCommand::Register {
            username: "alice".into(),
            password: "pw".into(),
            uuid: "u1".into(),
        });
        assert_eq!(response, AuthResponse::success("User registered", "tok-alice-u1"));

        let response = dispatcher.handle(AuthCommand::Login {
            username: "alice".into(),
            password: "pw".into(),
            uuid: "u1".into(),
        });
        assert_eq!(response, AuthResponse::success("Login successful", "tok-alice-u1"));
    }

    #[test]
    fn duplicate_username_conflicts() {
        let dispatcher = dispatcher();
        let register = AuthCommand::Register {
            username: "alice".into(),
            password: "pw".into(),
            uuid: "u1".into(),
        };
        dispatcher.handle(register.clone());
        assert_eq!(
            dispatcher.handle(register),
            AuthResponse::error("Username already exists")
        );
    }

    #[test]
    fn wrong_password_and_unknown_user_look_identical() {
        let dispatcher = dispatcher();
        dispatcher.handle(AuthCommand::Register {
            username: "alice".into(),
            password: "pw".into(),
            uuid: "u1".into(),
        });

        let wrong_password = dispatcher.handle(AuthCommand::Login {
            username: "alice".into(),
            password: "nope".into(),
            uuid: "u1".into(),
        });
        let unknown_user = dispatcher.handle(AuthCommand::Login {
            username: "bob".into(),
            password: "pw".into(),
            uuid: "u1".into(),
        });
        assert_eq!(wrong_password, unknown_user);
        assert_eq!(wrong_password, AuthResponse::error("Invalid credentials"));
    }
}
