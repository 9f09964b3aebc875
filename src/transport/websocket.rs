//! WebSocket transport.
//!
//! Connects over TCP, upgrades to WebSocket, and spawns a reader task that
//! feeds inbound text frames into a bounded channel. [`Transport::receive_frame`]
//! polls that channel without waiting, so the dispatch loop keeps control of
//! its own pacing.
//!
//! # Reader Task
//!
//! The reader task handles:
//!
//! - Text frames: forwarded to the inbound channel
//! - Close frames and stream end: marks the stream closed; the transport
//!   reports disconnected once the buffered frames are drained
//! - Errors: forwarded once, then the task exits

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, client_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{FrameRead, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Inbound frames buffered before the reader task waits.
const INBOUND_CAPACITY: usize = 64;

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<TcpStream>;

/// Frames (or the terminal read error) produced by the reader task.
type Inbound = mpsc::Receiver<Result<String>>;

// ============================================================================
// WsTransport
// ============================================================================

/// WebSocket transport over plain TCP.
///
/// # Example
///
/// ```ignore
/// use ddp_client::{Client, ClientOptions, WsTransport};
///
/// let mut client = Client::new(WsTransport::new(), ClientOptions::new("localhost"))?;
/// if client.connect().await {
///     client.subscribe("tasks").await?;
/// }
/// ```
#[derive(Default)]
pub struct WsTransport {
    /// Host and port of the open TCP connection.
    target: Option<(String, u16)>,
    /// TCP stream waiting for the upgrade.
    stream: Option<TcpStream>,
    /// Write half after the upgrade.
    writer: Option<SplitSink<WsStream, Message>>,
    /// Frames from the reader task.
    inbound: Option<Inbound>,
    /// Cleared by the reader task when the stream ends.
    open: Arc<AtomicBool>,
    /// Reader task handle.
    reader: Option<JoinHandle<()>>,
}

impl WsTransport {
    /// Creates an unconnected transport.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops any previous connection state.
    fn reset(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.target = None;
        self.stream = None;
        self.writer = None;
        self.inbound = None;
        self.open = Arc::new(AtomicBool::new(false));
    }

    /// Reader loop that forwards text frames from the server.
    async fn run_reader(
        mut ws_read: SplitStream<WsStream>,
        inbound_tx: mpsc::Sender<Result<String>>,
        open: Arc<AtomicBool>,
    ) {
        while let Some(message) = ws_read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    trace!(len = text.len(), "Frame received");
                    if inbound_tx.send(Ok(text.as_str().to_owned())).await.is_err() {
                        debug!("Inbound channel closed");
                        break;
                    }
                }

                Ok(Message::Close(_)) => {
                    debug!("WebSocket closed by remote");
                    break;
                }

                Err(e) => {
                    error!(error = %e, "WebSocket error");
                    let _ = inbound_tx.send(Err(Error::WebSocket(e))).await;
                    break;
                }

                // Ignore Binary, Ping, Pong, Frame
                Ok(_) => {}
            }
        }

        open.store(false, Ordering::Release);
        debug!("Reader task terminated");
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.reset();

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| Error::transport_unavailable(format!("{host}:{port}: {e}")))?;

        stream.set_nodelay(true)?;
        debug!(host, port, "TCP connection established");

        self.target = Some((host.to_owned(), port));
        self.stream = Some(stream);
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    /// Stays `true` after the remote closes until every frame received
    /// before the close has been read.
    fn connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
            || self.inbound.as_ref().is_some_and(|inbound| !inbound.is_empty())
    }

    async fn handshake(&mut self, path: &str) -> Result<()> {
        let (Some((host, port)), Some(stream)) = (self.target.as_ref(), self.stream.take()) else {
            return Err(Error::NotConnected);
        };

        let url = Url::parse(&format!("ws://{host}:{port}"))?.join(path)?;

        let (ws_stream, _response) = match client_async(url.as_str(), stream).await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                self.open.store(false, Ordering::Release);
                return Err(Error::handshake_failed(e.to_string()));
            }
        };

        debug!(%url, "WebSocket handshake completed");

        let (ws_write, ws_read) = ws_stream.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        self.writer = Some(ws_write);
        self.inbound = Some(inbound_rx);
        self.reader = Some(tokio::spawn(Self::run_reader(
            ws_read,
            inbound_tx,
            Arc::clone(&self.open),
        )));

        Ok(())
    }

    async fn send_frame(&mut self, frame: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;

        if let Err(e) = writer.send(Message::Text(frame.to_owned().into())).await {
            warn!(error = %e, "Failed to send frame");
            return Err(Error::WebSocket(e));
        }

        trace!(len = frame.len(), "Frame sent");
        Ok(())
    }

    fn receive_frame(&mut self) -> FrameRead {
        let Some(inbound) = self.inbound.as_mut() else {
            return FrameRead::Error(Error::NotConnected);
        };

        match inbound.try_recv() {
            Ok(Ok(text)) => FrameRead::Data(text),
            Ok(Err(e)) => FrameRead::Error(e),
            Err(TryRecvError::Empty) => FrameRead::NoData,
            Err(TryRecvError::Disconnected) => FrameRead::Error(Error::ConnectionClosed),
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
