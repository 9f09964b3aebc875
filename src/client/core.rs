//! DDP client facade.
//!
//! The [`Client`] owns one transport and one of each engine component, and
//! exposes the operations callers drive: connect once, then tick in a loop
//! while issuing subscriptions and calls.
//!
//! # Example
//!
//! ```no_run
//! use ddp_client::{Client, ClientOptions, TickOutcome, WsTransport};
//! use serde_json::json;
//!
//! # async fn example() -> ddp_client::Result<()> {
//! let mut client = Client::new(WsTransport::new(), ClientOptions::new("localhost"))?;
//!
//! if !client.connect().await {
//!     return Ok(());
//! }
//!
//! client.register_collection("tasks");
//! client.subscribe("tasks").await?;
//! client
//!     .call("tasks.add", vec![json!({"title": "write docs"})], |outcome| {
//!         println!("tasks.add -> {outcome:?}");
//!     })
//!     .await?;
//!
//! while client.tick().await != TickOutcome::Disconnected {}
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::connection::{ConnectionManager, Session};
use crate::dispatch::{DispatchContext, MessageDispatcher, TickOutcome};
use crate::error::Result;
use crate::heartbeat::HeartbeatMonitor;
use crate::identifiers::SubscriptionId;
use crate::protocol::Message;
use crate::registry::{CallOutcome, CallRegistry, SubscriptionRegistry};
use crate::store::DocumentStore;
use crate::transport::Transport;

use super::options::ClientOptions;

// ============================================================================
// Client
// ============================================================================

/// A single-session DDP client.
///
/// All state is owned and mutated through `&mut self`; the client is
/// driven by repeated [`Client::tick`] calls and never spawns work of its
/// own.
pub struct Client<T: Transport> {
    transport: T,
    options: ClientOptions,
    connection: ConnectionManager,
    dispatcher: MessageDispatcher,
    heartbeat: HeartbeatMonitor,
    subscriptions: SubscriptionRegistry,
    calls: CallRegistry,
    store: DocumentStore,
}

impl<T: Transport> Client<T> {
    /// Creates a client over `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the options are
    /// invalid.
    pub fn new(transport: T, options: ClientOptions) -> Result<Self> {
        options.validate()?;

        Ok(Self {
            transport,
            connection: ConnectionManager::new(
                options.version.clone(),
                options.support.clone(),
                options.pacing,
            ),
            dispatcher: MessageDispatcher::new(options.schedule, options.pacing),
            heartbeat: HeartbeatMonitor::new(),
            subscriptions: SubscriptionRegistry::new(options.pacing),
            calls: CallRegistry::new(options.max_call_slots),
            store: DocumentStore::new(options.cache_capacity, options.merge_policy),
            options,
        })
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Connects and performs the handshake.
    ///
    /// Returns `false` on any transport or handshake failure; see
    /// [`ConnectionManager::last_error`] for the cause.
    pub async fn connect(&mut self) -> bool {
        let ClientOptions {
            host, port, path, ..
        } = &self.options;

        self.connection
            .connect(&mut self.transport, host, *port, path)
            .await
    }

    /// Runs one dispatch tick.
    pub async fn tick(&mut self) -> TickOutcome {
        self.dispatcher
            .tick(DispatchContext {
                transport: &mut self.transport,
                heartbeat: &mut self.heartbeat,
                subscriptions: &mut self.subscriptions,
                calls: &mut self.calls,
                store: &mut self.store,
            })
            .await
    }

    /// Sends an unsolicited ping.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the frame cannot be sent.
    pub async fn ping(&mut self, id: Option<&str>) -> Result<()> {
        self.heartbeat.ping(&mut self.transport, id).await
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Subscribes to a publication without arguments.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the `sub` cannot be sent.
    pub async fn subscribe(&mut self, name: &str) -> Result<SubscriptionId> {
        self.subscribe_with(name, Vec::new()).await
    }

    /// Subscribes to a publication with arguments.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the `sub` cannot be sent.
    pub async fn subscribe_with(&mut self, name: &str, params: Vec<Value>) -> Result<SubscriptionId> {
        self.subscriptions
            .subscribe(&mut self.transport, name, params)
            .await
    }

    // ========================================================================
    // Method Calls
    // ========================================================================

    /// Calls a server method and registers `callback` for its result.
    ///
    /// The call id on the wire is the method name.
    ///
    /// # Errors
    ///
    /// - [`Error::CallThrottled`](crate::Error::CallThrottled) if a call with
    ///   the same name is still pending
    /// - [`Error::CallbackCapacityExceeded`](crate::Error::CallbackCapacityExceeded)
    ///   if every slot is in use
    /// - the transport error if the frame cannot be sent; the slot is freed
    pub async fn call<F>(&mut self, name: &str, params: Vec<Value>, callback: F) -> Result<()>
    where
        F: FnMut(CallOutcome) + Send + 'static,
    {
        self.calls.register(name, Box::new(callback), true)?;

        if let Err(e) = self.send_call(name, params).await {
            self.calls.release(name);
            return Err(e);
        }
        Ok(())
    }

    /// Calls a method with a single `{key: value}` object argument.
    ///
    /// # Errors
    ///
    /// As [`Client::call`].
    pub async fn call_keyed<F>(
        &mut self,
        name: &str,
        key: &str,
        value: impl Into<Value>,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(CallOutcome) + Send + 'static,
    {
        let mut argument = Map::new();
        argument.insert(key.to_owned(), value.into());
        self.call(name, vec![Value::Object(argument)], callback)
            .await
    }

    /// Sends a method call without tracking its result.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the frame cannot be sent.
    pub async fn send_call(&mut self, name: &str, params: Vec<Value>) -> Result<()> {
        trace!(name, "Calling method");
        self.transport
            .send_message(&Message::method(name, params, name))
            .await?;
        debug!(name, "Method call sent");
        Ok(())
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// Registers a collection for caching.
    ///
    /// Returns `false` if it was already registered.
    pub fn register_collection(&mut self, name: impl Into<String>) -> bool {
        self.store.register_collection(name)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the document cache.
    #[inline]
    #[must_use]
    pub const fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Returns the call registry.
    #[inline]
    #[must_use]
    pub const fn calls(&self) -> &CallRegistry {
        &self.calls
    }

    /// Returns the subscription registry.
    #[inline]
    #[must_use]
    pub const fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// Returns the connection manager.
    #[inline]
    #[must_use]
    pub const fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Returns the current session.
    #[inline]
    #[must_use]
    pub const fn session(&self) -> &Session {
        self.connection.session()
    }

    /// Returns the heartbeat counters.
    #[inline]
    #[must_use]
    pub const fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    /// Returns the dispatcher state.
    #[inline]
    #[must_use]
    pub const fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    /// Returns the options the client was built with.
    #[inline]
    #[must_use]
    pub const fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns the transport.
    #[inline]
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }
}

// ============================================================================
// Tests
// ============================================================================
