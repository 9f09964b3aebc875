//! Heartbeats.
//!
//! The server pings periodically and drops clients that stay silent, so
//! every inbound `ping` must be answered with a `pong` carrying the same id
//! within the same tick. The dispatcher also emits unsolicited pings on its
//! heartbeat interval.

// ============================================================================
// Imports
// ============================================================================

use tracing::trace;

use crate::error::Result;
use crate::protocol::Message;
use crate::transport::Transport;

// ============================================================================
// HeartbeatMonitor
// ============================================================================

/// Sends pings and pongs and counts them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatMonitor {
    pings_sent: u64,
    pongs_sent: u64,
}

impl HeartbeatMonitor {
    /// Creates a monitor with zeroed counters.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pings_sent: 0,
            pongs_sent: 0,
        }
    }

    /// Sends a `ping`, with `id` only when non-empty.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the frame cannot be sent.
    pub async fn ping<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        id: Option<&str>,
    ) -> Result<()> {
        transport.send_message(&Message::ping(id)).await?;
        self.pings_sent += 1;
        trace!(?id, "Ping sent");
        Ok(())
    }

    /// Sends a `pong`, with `id` only when non-empty.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the frame cannot be sent.
    pub async fn pong<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        id: Option<&str>,
    ) -> Result<()> {
        transport.send_message(&Message::pong(id)).await?;
        self.pongs_sent += 1;
        trace!(?id, "Pong sent");
        Ok(())
    }

    /// Pings sent so far.
    #[inline]
    #[must_use]
    pub const fn pings_sent(&self) -> u64 {
        self.pings_sent
    }

    /// Pongs sent so far.
    #[inline]
    #[must_use]
    pub const fn pongs_sent(&self) -> u64 {
        self.pongs_sent
    }
}

// ============================================================================
// Tests
// ============================================================================
