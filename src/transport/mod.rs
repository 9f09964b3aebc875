//! Byte transport layer.
//!
//! The engine never touches sockets directly. It talks to a [`Transport`],
//! which owns connection establishment, the WebSocket upgrade and frame I/O.
//!
//! # Connection Lifecycle
//!
//! 1. [`Transport::connect`] - Open the TCP connection to `host:port`
//! 2. [`Transport::handshake`] - Upgrade to WebSocket on `path`
//! 3. [`Transport::send_frame`] / [`Transport::receive_frame`] - Exchange text frames
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | In-memory transport driven by a [`MemoryPeer`] |
//! | `websocket` | WebSocket transport over tokio-tungstenite |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::protocol::{Message, encode};

// ============================================================================
// Submodules
// ============================================================================

/// In-memory transport for tests and embedding.
pub mod memory;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{MemoryPeer, MemoryTransport};
pub use websocket::WsTransport;

// ============================================================================
// FrameRead
// ============================================================================

/// Outcome of a non-blocking frame read.
#[derive(Debug)]
pub enum FrameRead {
    /// A complete text frame.
    Data(String),
    /// Nothing available right now.
    NoData,
    /// The read failed.
    Error(Error),
}

impl FrameRead {
    /// Returns the frame text, if any.
    #[inline]
    #[must_use]
    pub fn into_data(self) -> Option<String> {
        match self {
            Self::Data(text) => Some(text),
            Self::NoData | Self::Error(_) => None,
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Frame-level connection to a DDP server.
#[async_trait]
pub trait Transport: Send {
    /// Opens the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportUnavailable`] if the server cannot be reached.
    async fn connect(&mut self, host: &str, port: u16) -> Result<()>;

    /// Returns `true` while the connection is open.
    fn connected(&self) -> bool;

    /// Performs the transport-level upgrade on `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeFailed`] if the upgrade is refused.
    async fn handshake(&mut self, path: &str) -> Result<()>;

    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] before the handshake, or the
    /// underlying write error.
    async fn send_frame(&mut self, frame: &str) -> Result<()>;

    /// Reads one frame without waiting.
    fn receive_frame(&mut self) -> FrameRead;

    /// Encodes and sends one message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if encoding fails, otherwise as
    /// [`Transport::send_frame`].
    async fn send_message(&mut self, message: &Message) -> Result<()> {
        let frame = encode(message)?;
        self.send_frame(&frame).await
    }
}
