//! DDP client - Cooperative client engine for Meteor's Distributed Data Protocol.
//!
//! This library connects to a DDP server over WebSocket, keeps a local cache
//! of subscribed collections, and correlates method calls with their results.
//!
//! # Architecture
//!
//! The engine is single-threaded and cooperative:
//!
//! - **[`Client`]**: Owns one transport plus every engine component
//! - **Tick**: Each [`Client::tick`] reads at most one frame and dispatches it
//! - **Transport**: A [`Transport`] hides sockets; [`WsTransport`] for real
//!   servers, [`MemoryTransport`] for tests
//!
//! Key design principles:
//!
//! - Nothing runs in the background except the WebSocket reader task
//! - Method call ids are the method names, so one call per name is in flight
//! - Server pings are answered within the tick that reads them
//! - The document cache has a byte budget; over-budget changes are dropped
//!
//! # Quick Start
//!
//! ```no_run
//! use ddp_client::{Client, ClientOptions, Result, TickOutcome, WsTransport};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let options = ClientOptions::new("localhost").with_port(3000);
//!     let mut client = Client::new(WsTransport::new(), options)?;
//!
//!     if !client.connect().await {
//!         eprintln!("connect failed: {:?}", client.connection().last_error());
//!         return Ok(());
//!     }
//!
//!     // Cache one collection and subscribe to it
//!     client.register_collection("tasks");
//!     client.subscribe("tasks").await?;
//!
//!     // Call a method; the callback runs from a later tick
//!     client
//!         .call("tasks.count", vec![json!({})], |outcome| {
//!             println!("tasks.count -> {outcome:?}");
//!         })
//!         .await?;
//!
//!     while client.tick().await != TickOutcome::Disconnected {}
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`] facade and [`ClientOptions`] |
//! | [`connection`] | Handshake and [`Session`] |
//! | [`dispatch`] | Tick loop and message routing |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`heartbeat`] | Ping/pong |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | DDP message types and codec |
//! | [`registry`] | Subscription and call registries |
//! | [`store`] | Document cache |
//! | [`transport`] | Frame transports |

// ============================================================================
// Modules
// ============================================================================

/// Client facade and configuration.
///
/// Use [`Client::new`] with a transport and [`ClientOptions`].
pub mod client;

/// Handshake and session lifecycle.
pub mod connection;

/// Cooperative dispatch loop.
///
/// One [`MessageDispatcher::tick`] reads at most one frame and routes it.
pub mod dispatch;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Ping/pong heartbeats.
pub mod heartbeat;

/// Type-safe identifiers.
///
/// Newtype wrappers keep subscription ids and session tokens apart.
pub mod identifiers;

/// DDP protocol message types.
pub mod protocol;

/// Subscription and method call registries.
pub mod registry;

/// Local document cache.
pub mod store;

/// Frame transport layer.
///
/// Defines the [`Transport`] trait and its WebSocket and in-memory
/// implementations.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientOptions};

// Connection types
pub use connection::{ConnectionManager, Session, SessionState};

// Dispatch types
pub use dispatch::{DispatchContext, MessageDispatcher, TickOutcome, TickSchedule};

// Error types
pub use error::{Error, Result};

// Heartbeat
pub use heartbeat::HeartbeatMonitor;

// Identifier types
pub use identifiers::{SessionToken, SubscriptionId};

// Protocol types
pub use protocol::{Fields, Message, MessageKind, ServerError};

// Registry types
pub use registry::{
    CallCallback, CallOutcome, CallRegistry, Subscription, SubscriptionRegistry,
    SubscriptionState, into_result,
};

// Store types
pub use store::{ApplyMode, ApplyOutcome, DocumentStore, MergePolicy};

// Transport types
pub use transport::{FrameRead, MemoryPeer, MemoryTransport, Transport, WsTransport};
