//! Keygate server binary.

use clap::Parser;
use keygate_server::{AppState, ServerConfig, router};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::parse();
    let bind = config.bind;
    let state = AppState::new(config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "auth server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
