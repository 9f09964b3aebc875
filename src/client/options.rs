//! Client configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use ddp_client::{ClientOptions, MergePolicy};
//!
//! let options = ClientOptions::new("meteor.example.com")
//!     .with_port(443)
//!     .with_pacing(Duration::from_millis(50))
//!     .with_merge_policy(MergePolicy::CreateMissing);
//!
//! assert_eq!(options.url(), "ws://meteor.example.com:443/websocket");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::dispatch::TickSchedule;
use crate::error::{Error, Result};
use crate::registry::call::DEFAULT_CALL_SLOTS;
use crate::store::{DEFAULT_CACHE_CAPACITY, MergePolicy};

// ============================================================================
// Constants
// ============================================================================

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default WebSocket path.
pub const DEFAULT_PATH: &str = "/websocket";

/// Protocol version proposed in the handshake.
pub const PROTOCOL_VERSION: &str = "1";

/// Default pause used by the handshake, `subscribe` and idle ticks.
pub const DEFAULT_PACING: Duration = Duration::from_millis(100);

// ============================================================================
// ClientOptions
// ============================================================================

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Server host.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// WebSocket path.
    pub path: String,

    /// Version proposed in `connect`.
    pub version: String,

    /// Versions advertised in `connect`.
    pub support: Vec<String>,

    /// Maximum pending method calls.
    pub max_call_slots: usize,

    /// Pacing interval.
    pub pacing: Duration,

    /// Document cache capacity in bytes.
    pub cache_capacity: usize,

    /// Heartbeat and yield intervals, in ticks.
    pub schedule: TickSchedule,

    /// Treatment of unknown fields in `changed`.
    pub merge_policy: MergePolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new("localhost")
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options for `host` with every other setting at its default.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            support: vec![PROTOCOL_VERSION.to_string()],
            max_call_slots: DEFAULT_CALL_SLOTS,
            pacing: DEFAULT_PACING,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            schedule: TickSchedule::default(),
            merge_policy: MergePolicy::default(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the server port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the WebSocket path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the proposed version and advertises only that version.
    #[inline]
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        self.support = vec![version.clone()];
        self.version = version;
        self
    }

    /// Sets the advertised versions.
    #[inline]
    #[must_use]
    pub fn with_support(mut self, support: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.support = support.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the number of call slots.
    #[inline]
    #[must_use]
    pub fn with_max_call_slots(mut self, slots: usize) -> Self {
        self.max_call_slots = slots;
        self
    }

    /// Sets the pacing interval.
    #[inline]
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Sets the cache capacity in bytes.
    #[inline]
    #[must_use]
    pub fn with_cache_capacity(mut self, bytes: usize) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Sets the ticks between unsolicited pings.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_every(mut self, ticks: u64) -> Self {
        self.schedule.heartbeat_every = ticks;
        self
    }

    /// Sets the ticks between forced yields.
    #[inline]
    #[must_use]
    pub fn with_yield_every(mut self, ticks: u64) -> Self {
        self.schedule.yield_every = ticks;
        self
    }

    /// Sets the merge policy.
    #[inline]
    #[must_use]
    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientOptions {
    /// Checks the options for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::config("host is empty"));
        }
        if !self.path.starts_with('/') {
            return Err(Error::config(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        if self.support.is_empty() {
            return Err(Error::config("no supported protocol versions"));
        }
        if self.max_call_slots == 0 {
            return Err(Error::config("max_call_slots must be at least 1"));
        }
        if self.cache_capacity == 0 {
            return Err(Error::config("cache_capacity must be at least 1"));
        }
        if self.schedule.heartbeat_every == 0 || self.schedule.yield_every == 0 {
            return Err(Error::config("tick intervals must be at least 1"));
        }
        Ok(())
    }

    /// Returns the WebSocket URL the options describe.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }
}

// ============================================================================
// Tests
// ============================================================================
