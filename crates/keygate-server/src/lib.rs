//! Keygate server runtime.
//!
//! Binds the pure protocol core to a tokio/axum runtime: a statically
//! declared route table maps each flow to an HTTP session-initiation
//! handler and a WebSocket connection handler, and a per-connection driver
//! task executes the state machine's actions against the socket. The
//! in-memory credential store and HMAC token issuer live here as the
//! default collaborator implementations.

pub mod config;
pub mod credentials;
pub mod driver;
pub mod routes;
pub mod state;
pub mod tokens;

pub use config::ServerConfig;
pub use credentials::MemoryCredentialStore;
pub use routes::{Flow, FlowRoute, ROUTES, router};
pub use state::AppState;
pub use tokens::HmacTokenIssuer;
