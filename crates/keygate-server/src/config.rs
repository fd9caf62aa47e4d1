//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Command-line configuration for the Keygate server.
#[derive(Debug, Clone, Parser)]
#[command(name = "keygate-server", about = "Authenticated end-to-end-encrypted login channel")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:3001")]
    pub bind: SocketAddr,

    /// Handshake deadline in milliseconds (protocol default 3000).
    #[arg(long, default_value_t = 3000)]
    pub handshake_timeout_ms: u64,

    /// Issued-token lifetime in seconds.
    #[arg(long, default_value_t = 3600)]
    pub token_ttl_secs: u64,

    /// Token signing secret. A random secret is generated when omitted,
    /// which invalidates outstanding tokens across restarts.
    #[arg(long)]
    pub token_secret: Option<String>,
}

impl ServerConfig {
    /// The handshake deadline as a duration.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// The token lifetime as a duration.
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: ([127, 0, 0, 1], 3001).into(),
            handshake_timeout_ms: 3000,
            token_ttl_secs: 3600,
            token_secret: None,
        }
    }
}
