//! Handshake and session lifecycle.
//!
//! # Connection Flow
//!
//! 1. Transport connects to `host:port`
//! 2. Transport upgrades on `path`
//! 3. Client sends `{"msg":"connect","version":"1","support":["1"]}`
//! 4. Client waits one pacing interval and reads the reply once
//! 5. `connected` stores the session token; anything else fails
//!
//! Transport and handshake failures are both reported as `false`. There is
//! no retry; callers re-invoke [`ConnectionManager::connect`].

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionToken;
use crate::protocol::codec::is_banner;
use crate::protocol::{Message, decode};
use crate::transport::{FrameRead, Transport};

// ============================================================================
// SessionState
// ============================================================================

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No connection attempted, or reset.
    #[default]
    Disconnected,
    /// Connect frame sent, reply not yet evaluated.
    HandshakePending,
    /// Server accepted the handshake.
    Connected,
    /// Transport or handshake failed.
    Failed,
}

// ============================================================================
// Session
// ============================================================================

/// One handshake-established connection context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// WebSocket path.
    pub path: String,
    /// Current state.
    pub state: SessionState,
    /// Token issued by the server; present only when connected.
    pub token: Option<SessionToken>,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Drives the handshake and owns the [`Session`].
#[derive(Debug)]
pub struct ConnectionManager {
    session: Session,
    version: String,
    support: Vec<String>,
    pacing: Duration,
    last_error: Option<String>,
}

impl ConnectionManager {
    /// Creates a manager proposing `version` and advertising `support`.
    #[must_use]
    pub fn new(version: impl Into<String>, support: Vec<String>, pacing: Duration) -> Self {
        Self {
            session: Session::default(),
            version: version.into(),
            support,
            pacing,
            last_error: None,
        }
    }

    /// Connects the transport and performs the protocol handshake.
    ///
    /// Returns `true` once the server answered `connected`.
    pub async fn connect<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        host: &str,
        port: u16,
        path: &str,
    ) -> bool {
        self.session = Session {
            host: host.to_owned(),
            port,
            path: path.to_owned(),
            ..Session::default()
        };
        self.last_error = None;

        match self.establish(transport).await {
            Ok(token) => {
                info!(host, port, session = %token, "Connected");
                self.session.state = SessionState::Connected;
                self.session.token = Some(token);
                true
            }
            Err(e) => {
                warn!(host, port, error = %e, "Connection failed");
                self.session.state = SessionState::Failed;
                self.last_error = Some(e.to_string());
                false
            }
        }
    }

    async fn establish<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<SessionToken> {
        let Session { host, port, path, .. } = &self.session;

        transport.connect(host, *port).await?;
        debug!(host, port, "Transport connected");

        transport.handshake(path).await?;
        debug!(path, "Transport handshake completed");

        transport
            .send_message(&Message::connect(&self.version, self.support.clone()))
            .await?;
        self.session.state = SessionState::HandshakePending;

        tokio::time::sleep(self.pacing).await;

        let reply = Self::read_reply(transport)?;
        match decode(&reply)? {
            Message::Connected { session } => Ok(session),
            Message::Failed { version } => Err(Error::handshake_failed(match version {
                Some(version) => format!("server requires version {version}"),
                None => "server refused the handshake".to_string(),
            })),
            other => Err(Error::handshake_failed(format!(
                "unexpected reply: {}",
                other.kind()
            ))),
        }
    }

    /// Takes the first frame available now, skipping `server_id` banners.
    fn read_reply<T: Transport + ?Sized>(transport: &mut T) -> Result<String> {
        loop {
            match transport.receive_frame() {
                FrameRead::Data(text) if is_banner(&text) => {
                    debug!(frame = %text, "Skipping banner");
                }
                FrameRead::Data(text) => return Ok(text),
                FrameRead::NoData => {
                    return Err(Error::handshake_failed("no reply to connect"));
                }
                FrameRead::Error(e) => return Err(e),
            }
        }
    }

    /// Returns the current session.
    #[inline]
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.session.state
    }

    /// Returns `true` if the last handshake succeeded.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.state == SessionState::Connected
    }

    /// Why the last connect failed, if it did.
    #[inline]
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::{MemoryPeer, MemoryTransport};

    fn manager() -> ConnectionManager {
        ConnectionManager::new("1", vec!["1".into()], Duration::ZERO)
    }

    async fn connect(peer_setup: impl FnOnce(&MemoryPeer)) -> (ConnectionManager, bool, MemoryPeer) {
        let (mut transport, peer) = MemoryTransport::pair();
        peer_setup(&peer);
        let mut manager = manager();
        let ok = manager
            .connect(&mut transport, "localhost", 3000, "/websocket")
            .await;
        (manager, ok, peer)
    }

    #[tokio::test]
    async fn test_handshake_success() {
        let (manager, ok, peer) = connect(|peer| {
            peer.push_frame(r#"{"msg":"connected","session":"zwKbMXqs7jcKrke4Y"}"#);
        })
        .await;

        assert!(ok);
        assert!(manager.is_connected());
        assert_eq!(
            manager.session().token.as_ref().map(SessionToken::as_str),
            Some("zwKbMXqs7jcKrke4Y")
        );
        assert_eq!(manager.session().path, "/websocket");
        assert_eq!(
            peer.sent(),
            vec![r#"{"msg":"connect","version":"1","support":["1"]}"#.to_string()]
        );
        assert_eq!(peer.path().as_deref(), Some("/websocket"));
    }

    #[tokio::test]
    async fn test_token_length_not_fixed() {
        let (manager, ok, _peer) = connect(|peer| {
            peer.push_frame(r#"{"session":"short","msg":"connected"}"#);
        })
        .await;

        assert!(ok);
        assert_eq!(
            manager.session().token.as_ref().map(SessionToken::as_str),
            Some("short")
        );
    }

    #[tokio::test]
    async fn test_handshake_failed_reply() {
        let (manager, ok, _peer) = connect(|peer| {
            peer.push_frame(r#"{"msg":"failed","version":"pre2"}"#);
        })
        .await;

        assert!(!ok);
        assert_eq!(manager.state(), SessionState::Failed);
        assert!(manager.session().token.is_none());
        assert!(manager.last_error().is_some_and(|e| e.contains("pre2")));
    }

    #[tokio::test]
    async fn test_banner_skipped() {
        let (manager, ok, _peer) = connect(|peer| {
            peer.push_frame(r#"{"server_id":"0"}"#);
            peer.push_frame(r#"{"msg":"connected","session":"abc"}"#);
        })
        .await;

        assert!(ok);
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn test_no_reply_fails() {
        let (manager, ok, _peer) = connect(|_| {}).await;
        assert!(!ok);
        assert_eq!(manager.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_transport_refused() {
        let (manager, ok, peer) = connect(|peer| peer.refuse_connect(true)).await;
        assert!(!ok);
        assert_eq!(manager.state(), SessionState::Failed);
        assert!(peer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_upgrade_refused() {
        let (manager, ok, peer) = connect(|peer| peer.refuse_handshake(true)).await;
        assert!(!ok);
        assert_eq!(manager.state(), SessionState::Failed);
        assert!(peer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_resets_session() {
        let (mut transport, peer) = MemoryTransport::pair();
        let mut manager = manager();

        peer.push_frame(r#"{"msg":"connected","session":"one"}"#);
        assert!(manager.connect(&mut transport, "a", 1, "/websocket").await);

        peer.push_frame(r#"{"msg":"failed"}"#);
        assert!(!manager.connect(&mut transport, "b", 2, "/websocket").await);
        assert_eq!(manager.session().host, "b");
        assert!(manager.session().token.is_none());
    }
}
