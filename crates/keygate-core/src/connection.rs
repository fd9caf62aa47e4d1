//! Secure-channel state machine for one connection.
//!
//! # Architecture: Action-Based State Machine
//!
//! This state machine follows the action pattern:
//! - Methods accept discrete events (inbound message, timeout); time enters
//!   only at construction
//! - Methods return `Vec<ChannelAction>` for the driver to execute
//! - The driver owns the socket and the deadline timer
//!
//! # State Machine
//!
//! ```text
//! ┌─────────────┐  valid key   ┌────────────────┐  one exchange  ┌────────────┐
//! │ AwaitingKey │─────────────>│ KeyEstablished │───────────────>│ Terminated │
//! └─────────────┘              └────────────────┘                └────────────┘
//!        │                             │
//!        │ timeout / bad message       │ decrypt failure
//!        └─────────────────────────────┴───────> Terminated
//! ```
//!
//! `Terminated` is absorbing: no event emitted to a terminated channel
//! produces further sends, and no path returns to an earlier state.
//!
//! The protocol is single-exchange-per-connection: one authenticated
//! request, one encrypted response, then close. The driver must be a single
//! sequential task so message handling and timer firing never interleave
//! within one connection.

use std::time::{Duration, Instant};

use keygate_crypto::codec::SealedEnvelope;
use keygate_crypto::{EphemeralKeyPair, SharedKey, import_peer_public_key, open, seal};
use keygate_proto::{AuthCommand, ClientMessage, ServerMessage, WireEnvelope};
use tracing::{debug, info, warn};

use crate::auth::CommandHandler;
use crate::error::ChannelError;

/// How long the server waits for the client's ephemeral public key.
/// Protocol constant.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Actions returned by the channel state machine.
///
/// The driver executes these in order: serialize and send each message,
/// then close the underlying connection when `Close` appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAction {
    /// Send this message to the peer.
    Send(ServerMessage),
    /// Close the connection.
    Close,
}

/// Channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Waiting for the peer's ephemeral public key.
    AwaitingKey,
    /// Shared key derived; waiting for the encrypted command.
    KeyEstablished,
    /// Terminal. The underlying connection is closed or closing.
    Terminated,
}

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Handshake deadline measured from connection start.
    pub handshake_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { handshake_timeout: HANDSHAKE_TIMEOUT }
    }
}

/// State machine sequencing the handshake engine and channel codec over one
/// connection's lifetime.
///
/// No I/O, no timers of its own. The shared key lives here and nowhere
/// else; it is dropped with the channel when the connection ends.
pub struct SecureChannel {
    state: ChannelState,
    config: ChannelConfig,
    shared_key: Option<SharedKey>,
    opened_at: Instant,
}

impl SecureChannel {
    /// Create a channel for a connection opened at `now`.
    pub fn new(now: Instant, config: ChannelConfig) -> Self {
        Self { state: ChannelState::AwaitingKey, config, shared_key: None, opened_at: now }
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Whether the channel is still waiting for the peer's key. Drivers use
    /// this to gate the deadline timer.
    pub fn awaiting_key(&self) -> bool {
        self.state == ChannelState::AwaitingKey
    }

    /// The readiness message announced when the connection opens.
    pub fn greeting(&self) -> ServerMessage {
        ServerMessage::awaiting_client_key()
    }

    /// The absolute handshake deadline, while one is armed.
    pub fn handshake_deadline(&self) -> Option<Instant> {
        self.awaiting_key().then(|| self.opened_at + self.config.handshake_timeout)
    }

    /// The handshake deadline elapsed before a valid key arrived.
    ///
    /// Firing is single-shot by construction: the first call transitions to
    /// `Terminated`, and every later call (or a call after key
    /// establishment) returns no actions.
    pub fn on_timeout(&mut self) -> Vec<ChannelAction> {
        if self.state != ChannelState::AwaitingKey {
            return Vec::new();
        }
        info!("closing channel: client-public-key timeout");
        self.fail(ChannelError::HandshakeTimeout)
    }

    /// An inbound text frame arrived.
    ///
    /// `handler` is the credential collaborator invoked once the encrypted
    /// command is decrypted; it never sees ciphertext and the channel never
    /// interprets its responses.
    pub fn on_message(&mut self, raw: &str, handler: &dyn CommandHandler) -> Vec<ChannelAction> {
        match self.state {
            ChannelState::Terminated => Vec::new(),
            ChannelState::AwaitingKey => self.handle_awaiting_key(raw),
            ChannelState::KeyEstablished => self.handle_established(raw, handler),
        }
    }

    fn handle_awaiting_key(&mut self, raw: &str) -> Vec<ChannelAction> {
        let message = match ClientMessage::parse(raw) {
            Ok(message) => message,
            Err(_) => {
                info!("closing channel: invalid JSON during handshake");
                return self.fail(ChannelError::MalformedMessage);
            }
        };

        let key = match message {
            ClientMessage::PublicKey { key } => key,
            ClientMessage::Envelope(_) => {
                // Encrypted traffic before key exchange is a protocol-order
                // violation, not a decryption problem.
                info!("closing channel: envelope received before key exchange");
                return self.fail(ChannelError::ProtocolOrderViolation);
            }
        };

        let peer_public = match import_peer_public_key(&key) {
            Ok(peer_public) => peer_public,
            Err(err) => {
                warn!(%err, "closing channel: peer key import failed");
                return self.fail(ChannelError::KeyExchangeFailure);
            }
        };

        let pair = EphemeralKeyPair::generate();
        let server_pub = match pair.export_public_key() {
            Ok(server_pub) => server_pub,
            Err(err) => {
                warn!(%err, "closing channel: public key export failed");
                return self.fail(ChannelError::KeyExchangeFailure);
            }
        };

        // Derivation consumes the private key; nothing of it outlives this
        // call.
        self.shared_key = Some(pair.derive_shared_key(&peer_public));
        self.state = ChannelState::KeyEstablished;
        info!("shared secret established with client");

        vec![ChannelAction::Send(ServerMessage::server_public_key(server_pub))]
    }

    fn handle_established(&mut self, raw: &str, handler: &dyn CommandHandler) -> Vec<ChannelAction> {
        let envelope = match ClientMessage::parse(raw) {
            Ok(ClientMessage::Envelope(envelope)) => envelope,
            Ok(ClientMessage::PublicKey { .. }) | Err(_) => {
                info!("closing channel: expected encrypted envelope");
                return self.fail(ChannelError::InvalidEnvelope);
            }
        };

        let Some(key) = self.shared_key.clone() else {
            // Unreachable by state discipline; treat as a decryption fault
            // rather than panicking.
            return self.fail(ChannelError::DecryptionFailure);
        };

        let plaintext = match decrypt_envelope(&key, &envelope) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                info!("closing channel: envelope failed authentication");
                return self.fail(ChannelError::DecryptionFailure);
            }
        };

        // Domain errors travel back encrypted; the connection still ends
        // after the single exchange.
        let response = match AuthCommand::parse(&plaintext) {
            Ok(command) => {
                debug!("dispatching decrypted command");
                handler.handle(command)
            }
            Err(err) => keygate_proto::AuthResponse::error(err.to_string()),
        };

        let reply = match encrypt_response(&key, &response) {
            Ok(reply) => reply,
            Err(_) => {
                warn!("closing channel: response encryption failed");
                return self.fail(ChannelError::DecryptionFailure);
            }
        };

        self.state = ChannelState::Terminated;
        info!("auth exchange complete");
        vec![ChannelAction::Send(ServerMessage::Envelope(reply)), ChannelAction::Close]
    }

    /// Report `err` to the peer in plaintext and terminate.
    fn fail(&mut self, err: ChannelError) -> Vec<ChannelAction> {
        self.state = ChannelState::Terminated;
        vec![
            ChannelAction::Send(ServerMessage::plain_error(err.to_string())),
            ChannelAction::Close,
        ]
    }
}

fn decrypt_envelope(key: &SharedKey, envelope: &WireEnvelope) -> Result<Vec<u8>, ChannelError> {
    let (nonce, ciphertext, tag) =
        envelope.decode().map_err(|_| ChannelError::DecryptionFailure)?;
    open(key, &SealedEnvelope { nonce, ciphertext, tag })
        .map_err(|_| ChannelError::DecryptionFailure)
}

fn encrypt_response(
    key: &SharedKey,
    response: &keygate_proto::AuthResponse,
) -> Result<WireEnvelope, ChannelError> {
    let plaintext = response.encode().map_err(|_| ChannelError::DecryptionFailure)?;
    let sealed = seal(key, plaintext.as_bytes()).map_err(|_| ChannelError::DecryptionFailure)?;
    Ok(WireEnvelope::from_parts(&sealed.nonce, &sealed.ciphertext, &sealed.tag))
}

#[cfg(test)]
mod tests {
    use keygate_proto::AuthResponse;

    use super::*;

    struct EchoHandler;

    impl CommandHandler for EchoHandler {
        fn handle(&self, command: AuthCommand) -> AuthResponse {
            match command {
                AuthCommand::Login { username, .. } => {
                    AuthResponse::success("Login successful", format!("token-{username}"))
                }
                AuthCommand::Register { username, .. } => {
                    AuthResponse::success("User registered", format!("token-{username}"))
                }
            }
        }
    }

    fn new_channel() -> SecureChannel {
        SecureChannel::new(Instant::now(), ChannelConfig::default())
    }

    #[test]
    fn greeting_announces_readiness() {
        let channel = new_channel();
        assert_eq!(channel.greeting(), ServerMessage::awaiting_client_key());
        assert!(channel.handshake_deadline().is_some());
    }

    #[test]
    fn timeout_fires_exactly_once() {
        let mut channel = new_channel();

        let actions = channel.on_timeout();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], ChannelAction::Send(ServerMessage::Error { .. })));
        assert_eq!(actions[1], ChannelAction::Close);
        assert_eq!(channel.state(), ChannelState::Terminated);

        // A second fire (racing close) produces nothing.
        assert!(channel.on_timeout().is_empty());
    }

    #[test]
    fn envelope_before_key_is_order_violation() {
        let mut channel = new_channel();
        let actions = channel
            .on_message(r#"{"iv":"00","payload":"11","tag":"22"}"#, &EchoHandler);

        match &actions[0] {
            ChannelAction::Send(ServerMessage::Error { error }) => {
                assert_eq!(error, "Expected client-public-key first");
            }
            other => panic!("expected plaintext error, got {other:?}"),
        }
        assert_eq!(channel.state(), ChannelState::Terminated);
    }

    #[test]
    fn malformed_message_terminates() {
        let mut channel = new_channel();
        let actions = channel.on_message("}{ not json", &EchoHandler);
        assert_eq!(actions.len(), 2);
        assert_eq!(channel.state(), ChannelState::Terminated);
    }

    #[test]
    fn corrupt_key_is_key_exchange_failure() {
        let mut channel = new_channel();
        let actions = channel
            .on_message(r#"{"type":"client-public-key","key":"garbage!!"}"#, &EchoHandler);

        match &actions[0] {
            ChannelAction::Send(ServerMessage::Error { error }) => {
                assert_eq!(error, "Key exchange failed");
            }
            other => panic!("expected plaintext error, got {other:?}"),
        }
        assert_eq!(channel.state(), ChannelState::Terminated);
    }

    #[test]
    fn empty_key_is_rejected() {
        let mut channel = new_channel();
        channel.on_message(r#"{"type":"client-public-key","key":""}"#, &EchoHandler);
        assert_eq!(channel.state(), ChannelState::Terminated);
    }

    #[test]
    fn valid_key_establishes_channel_and_cancels_deadline() {
        let mut channel = new_channel();
        let client = EphemeralKeyPair::generate();
        let announce = ClientMessage::PublicKey { key: client.export_public_key().unwrap() }
            .encode()
            .unwrap();

        let actions = channel.on_message(&announce, &EchoHandler);
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            actions[0],
            ChannelAction::Send(ServerMessage::ServerPublicKey { .. })
        ));
        assert_eq!(channel.state(), ChannelState::KeyEstablished);
        assert!(channel.handshake_deadline().is_none());
        assert!(channel.on_timeout().is_empty());
    }

    #[test]
    fn full_exchange_round_trip() {
        let mut channel = new_channel();
        let client = EphemeralKeyPair::generate();
        let announce = ClientMessage::PublicKey { key: client.export_public_key().unwrap() }
            .encode()
            .unwrap();

        let actions = channel.on_message(&announce, &EchoHandler);
        let server_pub = match &actions[0] {
            ChannelAction::Send(ServerMessage::ServerPublicKey { server_pub_key, .. }) => {
                server_pub_key.clone()
            }
            other => panic!("expected server key, got {other:?}"),
        };

        // Client side derives the same key and seals a login command.
        let server_public = import_peer_public_key(&server_pub).unwrap();
        let client_key = client.derive_shared_key(&server_public);
        let command = AuthCommand::Login {
            username: "alice".into(),
            password: "pw".into(),
            uuid: "u1".into(),
        };
        let sealed = seal(&client_key, command.encode().unwrap().as_bytes()).unwrap();
        let wire = WireEnvelope::from_parts(&sealed.nonce, &sealed.ciphertext, &sealed.tag);
        let frame = ClientMessage::Envelope(wire).encode().unwrap();

        let actions = channel.on_message(&frame, &EchoHandler);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1], ChannelAction::Close);
        assert_eq!(channel.state(), ChannelState::Terminated);

        let reply = match &actions[0] {
            ChannelAction::Send(ServerMessage::Envelope(envelope)) => envelope.clone(),
            other => panic!("expected encrypted reply, got {other:?}"),
        };
        let (nonce, ciphertext, tag) = reply.decode().unwrap();
        let plaintext =
            open(&client_key, &SealedEnvelope { nonce, ciphertext, tag }).unwrap();
        let response = AuthResponse::parse(&plaintext).unwrap();
        assert_eq!(response, AuthResponse::success("Login successful", "token-alice"));
    }

    #[test]
    fn tampered_envelope_is_generic_decryption_error() {
        let mut channel = new_channel();
        let client = EphemeralKeyPair::generate();
        let announce = ClientMessage::PublicKey { key: client.export_public_key().unwrap() }
            .encode()
            .unwrap();
        channel.on_message(&announce, &EchoHandler);

        // Well-formed hex, but sealed under a different key.
        let wrong_key = SharedKey::from([9u8; 32]);
        let sealed = seal(&wrong_key, b"{}").unwrap();
        let wire = WireEnvelope::from_parts(&sealed.nonce, &sealed.ciphertext, &sealed.tag);
        let frame = ClientMessage::Envelope(wire).encode().unwrap();

        let actions = channel.on_message(&frame, &EchoHandler);
        match &actions[0] {
            ChannelAction::Send(ServerMessage::Error { error }) => {
                assert_eq!(error, "Auth failed or bad encrypted message");
            }
            other => panic!("expected plaintext error, got {other:?}"),
        }
        assert_eq!(channel.state(), ChannelState::Terminated);
    }

    #[test]
    fn terminated_channel_ignores_everything() {
        let mut channel = new_channel();
        channel.on_timeout();
        assert!(channel.on_message("{}", &EchoHandler).is_empty());
        assert!(channel.on_timeout().is_empty());
    }

    #[test]
    fn missing_fields_come_back_encrypted() {
        let mut channel = new_channel();
        let client = EphemeralKeyPair::generate();
        let announce = ClientMessage::PublicKey { key: client.export_public_key().unwrap() }
            .encode()
            .unwrap();
        let actions = channel.on_message(&announce, &EchoHandler);
        let server_pub = match &actions[0] {
            ChannelAction::Send(ServerMessage::ServerPublicKey { server_pub_key, .. }) => {
                server_pub_key.clone()
            }
            other => panic!("expected server key, got {other:?}"),
        };
        let client_key =
            client.derive_shared_key(&import_peer_public_key(&server_pub).unwrap());

        let sealed = seal(&client_key, br#"{"type":"login","username":"a"}"#).unwrap();
        let wire = WireEnvelope::from_parts(&sealed.nonce, &sealed.ciphertext, &sealed.tag);
        let frame = ClientMessage::Envelope(wire).encode().unwrap();

        let actions = channel.on_message(&frame, &EchoHandler);
        let reply = match &actions[0] {
            ChannelAction::Send(ServerMessage::Envelope(envelope)) => envelope.clone(),
            other => panic!("expected encrypted reply, got {other:?}"),
        };
        let (nonce, ciphertext, tag) = reply.decode().unwrap();
        let plaintext = open(&client_key, &SealedEnvelope { nonce, ciphertext, tag }).unwrap();
        assert_eq!(
            AuthResponse::parse(&plaintext).unwrap(),
            AuthResponse::error("Missing username, password, or uuid")
        );
    }
}
