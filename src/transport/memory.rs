//! In-memory transport.
//!
//! [`MemoryTransport`] is handed to the client while the paired
//! [`MemoryPeer`] plays the server: it scripts inbound frames, flips
//! connectivity and inspects everything the client sent.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{Message, decode, encode};

use super::{FrameRead, Transport};

// ============================================================================
// Types
// ============================================================================

/// A scripted inbound read.
#[derive(Debug)]
enum Scripted {
    Frame(String),
    Failure(String),
}

/// State shared between transport and peer.
#[derive(Debug, Default)]
struct Shared {
    connected: bool,
    refuse_connect: bool,
    refuse_handshake: bool,
    inbound: VecDeque<Scripted>,
    outbound: Vec<String>,
    target: Option<(String, u16)>,
    path: Option<String>,
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// Transport backed by in-process queues.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTransport {
    /// Creates a connected-on-demand transport and its peer.
    #[must_use]
    pub fn pair() -> (Self, MemoryPeer) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MemoryPeer { shared },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let mut shared = self.shared.lock();
        if shared.refuse_connect {
            shared.connected = false;
            return Err(Error::transport_unavailable(format!(
                "{host}:{port} refused"
            )));
        }
        shared.connected = true;
        shared.target = Some((host.to_owned(), port));
        Ok(())
    }

    fn connected(&self) -> bool {
        self.shared.lock().connected
    }

    async fn handshake(&mut self, path: &str) -> Result<()> {
        let mut shared = self.shared.lock();
        if !shared.connected {
            return Err(Error::NotConnected);
        }
        if shared.refuse_handshake {
            return Err(Error::handshake_failed(format!("upgrade on {path} refused")));
        }
        shared.path = Some(path.to_owned());
        Ok(())
    }

    async fn send_frame(&mut self, frame: &str) -> Result<()> {
        let mut shared = self.shared.lock();
        if !shared.connected {
            return Err(Error::NotConnected);
        }
        trace!(frame, "Frame sent");
        shared.outbound.push(frame.to_owned());
        Ok(())
    }

    fn receive_frame(&mut self) -> FrameRead {
        let mut shared = self.shared.lock();
        if !shared.connected {
            return FrameRead::Error(Error::NotConnected);
        }
        match shared.inbound.pop_front() {
            Some(Scripted::Frame(text)) => FrameRead::Data(text),
            Some(Scripted::Failure(message)) => {
                FrameRead::Error(Error::transport_unavailable(message))
            }
            None => FrameRead::NoData,
        }
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Server side of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryPeer {
    /// Queues a raw inbound frame.
    pub fn push_frame(&self, frame: impl Into<String>) {
        self.shared
            .lock()
            .inbound
            .push_back(Scripted::Frame(frame.into()));
    }

    /// Queues an encoded inbound message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the message cannot be encoded.
    pub fn push_message(&self, message: &Message) -> Result<()> {
        self.push_frame(encode(message)?);
        Ok(())
    }

    /// Queues a failed read.
    pub fn push_read_error(&self, message: impl Into<String>) {
        self.shared
            .lock()
            .inbound
            .push_back(Scripted::Failure(message.into()));
    }

    /// Number of inbound frames not yet read.
    #[must_use]
    pub fn pending_inbound(&self) -> usize {
        self.shared.lock().inbound.len()
    }

    /// Makes subsequent connects fail.
    pub fn refuse_connect(&self, refuse: bool) {
        self.shared.lock().refuse_connect = refuse;
    }

    /// Makes subsequent handshakes fail.
    pub fn refuse_handshake(&self, refuse: bool) {
        self.shared.lock().refuse_handshake = refuse;
    }

    /// Opens or drops the connection.
    pub fn set_connected(&self, connected: bool) {
        self.shared.lock().connected = connected;
    }

    /// Host and port of the last successful connect.
    #[must_use]
    pub fn target(&self) -> Option<(String, u16)> {
        self.shared.lock().target.clone()
    }

    /// Path of the last successful handshake.
    #[must_use]
    pub fn path(&self) -> Option<String> {
        self.shared.lock().path.clone()
    }

    /// Raw frames sent by the client so far.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.shared.lock().outbound.clone()
    }

    /// Sent frames decoded into messages; undecodable frames are skipped.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent().iter().filter_map(|f| decode(f).ok()).collect()
    }

    /// Removes and returns the sent frames.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.shared.lock().outbound)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (mut transport, peer) = MemoryTransport::pair();
        transport.connect("localhost", 3000).await.expect("connect");
        transport.handshake("/websocket").await.expect("handshake");

        peer.push_frame(r#"{"msg":"ping"}"#);
        assert_eq!(
            transport.receive_frame().into_data().as_deref(),
            Some(r#"{"msg":"ping"}"#)
        );
        assert!(matches!(transport.receive_frame(), FrameRead::NoData));

        transport.send_frame(r#"{"msg":"pong"}"#).await.expect("send");
        assert_eq!(peer.sent_messages(), vec![Message::pong(None)]);
        assert_eq!(peer.target(), Some(("localhost".to_owned(), 3000)));
        assert_eq!(peer.path().as_deref(), Some("/websocket"));
    }

    #[tokio::test]
    async fn test_refusals() {
        let (mut transport, peer) = MemoryTransport::pair();
        peer.refuse_connect(true);
        assert!(transport.connect("h", 1).await.is_err());
        assert!(!transport.connected());

        peer.refuse_connect(false);
        peer.refuse_handshake(true);
        transport.connect("h", 1).await.expect("connect");
        assert!(matches!(
            transport.handshake("/").await,
            Err(Error::HandshakeFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_error_is_distinct_from_no_data() {
        let (mut transport, peer) = MemoryTransport::pair();
        transport.connect("h", 1).await.expect("connect");
        peer.push_read_error("reset");
        assert!(matches!(transport.receive_frame(), FrameRead::Error(_)));
        assert!(matches!(transport.receive_frame(), FrameRead::NoData));
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (mut transport, peer) = MemoryTransport::pair();
        assert!(matches!(
            transport.send_frame("{}").await,
            Err(Error::NotConnected)
        ));
        assert!(peer.sent().is_empty());
    }
}
