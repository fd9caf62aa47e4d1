//! Shared server state.

use std::sync::Arc;
use std::time::Duration;

use keygate_core::{AuthDispatcher, SessionRegistry, SystemEnv};

use crate::config::ServerConfig;
use crate::credentials::MemoryCredentialStore;
use crate::tokens::HmacTokenIssuer;

/// Default dispatcher wiring used by the binary and the test harness.
pub type Dispatcher = AuthDispatcher<MemoryCredentialStore, HmacTokenIssuer>;

/// State shared by every route handler and connection task.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<ServerConfig>,
    pub env: SystemEnv,
}

impl AppState {
    /// Wire up in-memory collaborators from the given config.
    pub fn new(config: ServerConfig) -> Self {
        let issuer = match &config.token_secret {
            Some(secret) => HmacTokenIssuer::new(secret.as_bytes()),
            None => HmacTokenIssuer::with_random_secret(),
        };
        let dispatcher =
            AuthDispatcher::with_ttl(MemoryCredentialStore::new(), issuer, config.token_ttl());
        Self {
            registry: Arc::new(SessionRegistry::new()),
            dispatcher: Arc::new(dispatcher),
            config: Arc::new(config),
            env: SystemEnv,
        }
    }

    /// The handshake deadline connections run under.
    pub fn handshake_timeout(&self) -> Duration {
        self.config.handshake_timeout()
    }
}
