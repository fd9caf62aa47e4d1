//! Per-connection WebSocket driver.
//!
//! One tokio task per connection. The task owns the socket and the channel
//! state machine; everything the machine decides comes back as actions the
//! task executes in order. Forced termination (session detach) arrives over
//! an mpsc channel owned by the registry-facing handle, so it serializes
//! with inbound frames and the handshake deadline inside one `select!`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use keygate_core::{
    ChannelAction, ChannelConfig, CloseReason, ConnectionHandle, Environment, SecureChannel,
    SessionToken, TokenIssuer,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::routes::Flow;
use crate::state::AppState;

/// Registry-facing view of a live connection.
///
/// `live` flips to false when the driver task stops servicing the socket,
/// at which point the binding is stale and a detach has nothing to close.
struct WsHandle {
    live: AtomicBool,
    closer: mpsc::UnboundedSender<CloseReason>,
}

impl ConnectionHandle for WsHandle {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn force_close(&self, reason: CloseReason) {
        // The driver task may already be gone; a dropped receiver is fine.
        let _ = self.closer.send(reason);
    }
}

/// Drive one upgraded WebSocket to completion.
pub async fn run(flow: Flow, state: AppState, params: HashMap<String, String>, mut socket: WebSocket) {
    let (Some(uuid), Some(token)) = (params.get("uuid").cloned(), params.get("token").cloned())
    else {
        warn!("closing websocket: missing uuid or token query parameter");
        let _ = socket.send(close_frame(1008, "uuid and token required")).await;
        return;
    };
    let token = SessionToken::from(token);

    let (close_tx, mut close_rx) = mpsc::unbounded_channel();
    let handle = Arc::new(WsHandle { live: AtomicBool::new(true), closer: close_tx });

    if let Err(err) = state.registry.attach(&token, handle.clone(), &uuid) {
        warn!(%uuid, %err, "closing websocket: failed to attach");
        let _ = socket.close().await;
        return;
    }

    match flow {
        Flow::Login | Flow::Register => {
            run_channel(&state, &mut socket, &mut close_rx).await;
        }
        Flow::CheckToken => {
            run_token_check(&state, &mut socket, &uuid, params.get("auth")).await;
        }
    }

    // Stale before detach, so the registry does not force-close us back.
    handle.live.store(false, Ordering::Release);
    state.registry.detach(&token);
    let _ = socket.close().await;
}

/// Run the key-exchange state machine over the socket until it terminates.
async fn run_channel(
    state: &AppState,
    socket: &mut WebSocket,
    close_rx: &mut mpsc::UnboundedReceiver<CloseReason>,
) {
    let config = ChannelConfig { handshake_timeout: state.handshake_timeout() };
    let mut channel = SecureChannel::new(state.env.now(), config);

    if send_message(socket, &channel.greeting()).await.is_err() {
        return;
    }

    loop {
        let deadline = async {
            match channel.handshake_deadline() {
                Some(at) => {
                    let remaining = at.saturating_duration_since(state.env.now());
                    state.env.sleep(remaining).await;
                }
                None => std::future::pending().await,
            }
        };

        let actions = tokio::select! {
            reason = close_rx.recv() => {
                let reason = reason.unwrap_or(CloseReason::SessionDetached);
                info!(code = reason.code(), "closing websocket: forced by detach");
                let _ = socket.send(close_frame(reason.code(), reason.as_str())).await;
                return;
            }
            () = deadline => channel.on_timeout(),
            frame = socket.recv() => match frame {
                Some(Ok(Message::Text(text))) => {
                    channel.on_message(&text, state.dispatcher.as_ref())
                }
                // Binary frames go through the same parse path as text;
                // non-JSON bytes terminate the channel as malformed input.
                Some(Ok(Message::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes);
                    channel.on_message(&text, state.dispatcher.as_ref())
                }
                // Pings are answered by axum.
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    info!("websocket closed by peer");
                    return;
                }
            },
        };

        for action in actions {
            match action {
                ChannelAction::Send(message) => {
                    if send_message(socket, &message).await.is_err() {
                        return;
                    }
                }
                ChannelAction::Close => return,
            }
        }
    }
}

/// Verify a previously issued token and report the result in plaintext.
/// No key exchange happens on this flow.
async fn run_token_check(
    state: &AppState,
    socket: &mut WebSocket,
    uuid: &str,
    presented: Option<&String>,
) {
    let verdict = presented
        .ok_or(())
        .and_then(|token| state.dispatcher.issuer().verify(token).map_err(|_| ()));

    let reply = match verdict {
        Ok(claims) => {
            info!(%uuid, "token valid");
            serde_json::json!({
                "status": "success",
                "message": "Token valid",
                "username": claims.username,
            })
        }
        Err(()) => {
            info!(%uuid, "closing websocket: invalid or expired token");
            serde_json::json!({ "status": "error", "message": "Invalid or expired token" })
        }
    };
    let _ = socket.send(Message::Text(reply.to_string())).await;
}

async fn send_message(
    socket: &mut WebSocket,
    message: &keygate_proto::ServerMessage,
) -> Result<(), ()> {
    let text = message.encode().map_err(|err| {
        warn!(%err, "outbound message encoding failed");
    })?;
    socket.send(Message::Text(text)).await.map_err(|err| {
        info!(%err, "websocket send failed");
    })
}

fn close_frame(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame { code, reason: reason.into() }))
}
