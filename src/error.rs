//! Error types for the DDP client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use ddp_client::{Client, Result};
//!
//! async fn example(client: &mut Client<WsTransport>) -> Result<()> {
//!     let id = client.subscribe("tasks").await?;
//!     client.subscriptions().ensure_accepted(id)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::TransportUnavailable`], [`Error::HandshakeFailed`], [`Error::NotConnected`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::SubscriptionRejected`] |
//! | Calls | [`Error::CallbackCapacityExceeded`], [`Error::CallThrottled`], [`Error::ServerReported`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;
use url::ParseError as UrlError;

use crate::identifiers::SubscriptionId;
use crate::protocol::ServerError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The byte transport could not reach the server.
    #[error("Transport unavailable: {message}")]
    TransportUnavailable {
        /// Description of the transport failure.
        message: String,
    },

    /// Transport or protocol handshake was refused.
    #[error("Handshake failed: {message}")]
    HandshakeFailed {
        /// Description of the handshake failure.
        message: String,
    },

    /// Operation requires an established transport.
    #[error("Not connected")]
    NotConnected,

    /// Connection closed by the remote end.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed or unexpected frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The server answered a subscription with `nosub`.
    #[error("Subscription {id} rejected: {reason}")]
    SubscriptionRejected {
        /// The rejected subscription.
        id: SubscriptionId,
        /// Server-supplied reason, if any.
        reason: String,
    },

    // ========================================================================
    // Call Errors
    // ========================================================================
    /// Every call slot is in use.
    #[error("Callback capacity exceeded ({capacity} slots in use)")]
    CallbackCapacityExceeded {
        /// Configured number of call slots.
        capacity: usize,
    },

    /// A call with the same name is still pending.
    #[error("Call '{name}' already pending (attempt {attempt})")]
    CallThrottled {
        /// Name of the pending call.
        name: String,
        /// Position of this attempt in the throttle cycle.
        attempt: u8,
    },

    /// Error reported by the server in a `result` message.
    #[error("Server error: {0}")]
    ServerReported(ServerError),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Invalid server URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] UrlError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a transport unavailable error.
    #[inline]
    pub fn transport_unavailable(message: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            message: message.into(),
        }
    }

    /// Creates a handshake failed error.
    #[inline]
    pub fn handshake_failed(message: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a subscription rejected error.
    #[inline]
    pub fn subscription_rejected(id: SubscriptionId, reason: impl Into<String>) -> Self {
        Self::SubscriptionRejected {
            id,
            reason: reason.into(),
        }
    }

    /// Creates a callback capacity error.
    #[inline]
    pub fn capacity_exceeded(capacity: usize) -> Self {
        Self::CallbackCapacityExceeded { capacity }
    }

    /// Creates a call throttled error.
    #[inline]
    pub fn call_throttled(name: impl Into<String>, attempt: u8) -> Self {
        Self::CallThrottled {
            name: name.into(),
            attempt,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::TransportUnavailable { .. }
                | Self::HandshakeFailed { .. }
                | Self::NotConnected
                | Self::ConnectionClosed
                | Self::Io(_)
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if a call registration was refused.
    #[inline]
    #[must_use]
    pub fn is_call_rejected(&self) -> bool {
        matches!(
            self,
            Self::CallbackCapacityExceeded { .. } | Self::CallThrottled { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed when the caller retries later.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CallbackCapacityExceeded { .. }
                | Self::CallThrottled { .. }
                | Self::Protocol { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
