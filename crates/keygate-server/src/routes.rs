//! HTTP route table and session-initiation handlers.
//!
//! Each flow exposes two endpoints: `GET /<flow>/init` creates a session
//! and returns the WebSocket URL to connect to, and `GET /<flow>` upgrades
//! to a WebSocket handled by the connection driver. The table is static;
//! there is no dynamic route discovery.

use std::collections::HashMap;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::json;
use tracing::info;

use crate::driver;
use crate::state::AppState;

/// The connection flows the server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Encrypted credential exchange that authenticates an existing user.
    Login,
    /// Encrypted credential exchange that creates a new user.
    Register,
    /// Plaintext verification of a previously issued token.
    CheckToken,
}

/// A flow and the URL path it is mounted at.
#[derive(Debug, Clone, Copy)]
pub struct FlowRoute {
    pub flow: Flow,
    pub path: &'static str,
}

/// Every mounted flow.
pub const ROUTES: [FlowRoute; 3] = [
    FlowRoute { flow: Flow::Login, path: "login" },
    FlowRoute { flow: Flow::Register, path: "register" },
    FlowRoute { flow: Flow::CheckToken, path: "checktoken" },
];

/// Build the application router over the shared state.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new();
    for route in ROUTES {
        let flow = route.flow;
        let path = route.path;
        app = app
            .route(
                &format!("/{path}/init"),
                get(move |state, headers, query| init(flow, path, state, headers, query)),
            )
            .route(
                &format!("/{path}"),
                get(move |state, query, ws| upgrade(flow, state, query, ws)),
            );
        info!(path, "route mounted");
    }
    app.with_state(state)
}

/// Create a session for the caller's UUID and hand back the WebSocket URL
/// that carries the session token.
async fn init(
    flow: Flow,
    path: &'static str,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(uuid) = params.get("uuid") else {
        return bad_request("UUID required");
    };
    // The token-check flow additionally needs the token to verify.
    let presented = if flow == Flow::CheckToken {
        match params.get("auth") {
            Some(token) => Some(token.as_str()),
            None => return bad_request("UUID and token required"),
        }
    } else {
        None
    };

    let session_token = match state.registry.create_session(uuid, &state.env) {
        Ok(token) => token,
        Err(err) => {
            tracing::error!(%err, "session creation failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({ "error": "Session creation failed" })),
            )
                .into_response();
        }
    };

    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| state.config.bind.to_string());

    let mut ws_url = format!("ws://{host}/{path}?uuid={uuid}&token={session_token}");
    if let Some(presented) = presented {
        ws_url.push_str("&auth=");
        ws_url.push_str(presented);
    }

    info!(%uuid, path, "session created");
    axum::Json(json!({ "wsUrl": ws_url })).into_response()
}

async fn upgrade(
    flow: Flow,
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| driver::run(flow, state, params, socket))
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, axum::Json(json!({ "error": message }))).into_response()
}
