//! Inbound message dispatch.
//!
//! [`MessageDispatcher::tick`] is one bounded slice of work: it reads at
//! most one frame, decodes it, and routes it to the heartbeat monitor, the
//! registries or the document store. Callers drive it in a loop; nothing
//! runs in the background.
//!
//! # Tick Sequence
//!
//! 1. Return [`TickOutcome::Disconnected`] if the transport is closed
//! 2. Advance the tick counter
//! 3. Send a ping every [`TickSchedule::heartbeat_every`] ticks
//! 4. Yield every [`TickSchedule::yield_every`] ticks without reading
//! 5. Read one frame; sleep the pacing interval if none is available
//! 6. Decode and dispatch, or discard an undecodable frame
//!
//! A discarded frame changes no state and produces no outbound traffic.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::heartbeat::HeartbeatMonitor;
use crate::protocol::{Message, MessageKind, decode};
use crate::registry::{CallOutcome, CallRegistry, SubscriptionRegistry};
use crate::store::{ApplyMode, DocumentStore};
use crate::transport::{FrameRead, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Ticks between unsolicited pings.
pub const DEFAULT_HEARTBEAT_EVERY: u64 = 40;

/// Ticks between forced yields.
pub const DEFAULT_YIELD_EVERY: u64 = 10;

// ============================================================================
// TickSchedule
// ============================================================================

/// Named tick intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSchedule {
    /// Send a ping when the tick counter is a multiple of this.
    pub heartbeat_every: u64,
    /// Return without reading when the tick counter is a multiple of this.
    pub yield_every: u64,
}

impl Default for TickSchedule {
    fn default() -> Self {
        Self {
            heartbeat_every: DEFAULT_HEARTBEAT_EVERY,
            yield_every: DEFAULT_YIELD_EVERY,
        }
    }
}

// ============================================================================
// TickOutcome
// ============================================================================

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Transport closed; nothing done.
    Disconnected,
    /// Time slice ended without reading.
    Yielded,
    /// No frame was available.
    Idle,
    /// The transport reported a read error.
    ReadFailed,
    /// Frame could not be decoded and was dropped.
    Discarded,
    /// A message of this kind was handled.
    Dispatched(MessageKind),
}

// ============================================================================
// DispatchContext
// ============================================================================

/// Everything a tick may touch.
pub struct DispatchContext<'a, T: ?Sized> {
    /// Frame transport.
    pub transport: &'a mut T,
    /// Ping/pong sender.
    pub heartbeat: &'a mut HeartbeatMonitor,
    /// Subscriptions, for `nosub`.
    pub subscriptions: &'a mut SubscriptionRegistry,
    /// Pending calls, for `result`.
    pub calls: &'a mut CallRegistry,
    /// Document cache, for `added` and `changed`.
    pub store: &'a mut DocumentStore,
}

// ============================================================================
// MessageDispatcher
// ============================================================================

/// Cooperative dispatch loop state.
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    schedule: TickSchedule,
    pacing: Duration,
    ticks: u64,
}

impl MessageDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new(schedule: TickSchedule, pacing: Duration) -> Self {
        Self {
            schedule,
            pacing,
            ticks: 0,
        }
    }

    /// Ticks run while connected.
    #[inline]
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one tick.
    pub async fn tick<T: Transport + ?Sized>(&mut self, ctx: DispatchContext<'_, T>) -> TickOutcome {
        if !ctx.transport.connected() {
            return TickOutcome::Disconnected;
        }

        self.ticks += 1;

        if self.ticks.is_multiple_of(self.schedule.heartbeat_every)
            && let Err(e) = ctx.heartbeat.ping(&mut *ctx.transport, None).await
        {
            warn!(error = %e, "Heartbeat ping failed");
        }

        if self.ticks.is_multiple_of(self.schedule.yield_every) {
            trace!(tick = self.ticks, "Time slice exhausted");
            return TickOutcome::Yielded;
        }

        let text = match ctx.transport.receive_frame() {
            FrameRead::Data(text) => text,
            FrameRead::NoData => {
                tokio::time::sleep(self.pacing).await;
                return TickOutcome::Idle;
            }
            FrameRead::Error(e) => {
                warn!(error = %e, "Frame read failed");
                tokio::time::sleep(self.pacing).await;
                return TickOutcome::ReadFailed;
            }
        };

        let message = match decode(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, len = text.len(), "Discarding frame");
                return TickOutcome::Discarded;
            }
        };

        let kind = message.kind();
        trace!(%kind, "Dispatching");
        Self::dispatch(message, ctx).await;
        TickOutcome::Dispatched(kind)
    }

    /// Routes a decoded message.
    async fn dispatch<T: Transport + ?Sized>(message: Message, ctx: DispatchContext<'_, T>) {
        match message {
            Message::Ping { id } => {
                if let Err(e) = ctx.heartbeat.pong(&mut *ctx.transport, id.as_deref()).await {
                    warn!(error = %e, ?id, "Failed to answer ping");
                }
            }

            Message::Pong { id } => trace!(?id, "Pong received"),

            Message::Nosub { id, error } => {
                ctx.subscriptions.reject(&id, error);
            }

            Message::Added {
                collection,
                id,
                fields,
            } => {
                let outcome = ctx.store.apply(&collection, &id, &fields, ApplyMode::Insert);
                trace!(%collection, %id, ?outcome, "added");
            }

            Message::Changed {
                collection,
                id,
                fields,
                cleared,
            } => {
                if !cleared.is_empty() {
                    trace!(%collection, %id, ?cleared, "Cleared fields kept");
                }
                let outcome = ctx.store.apply(&collection, &id, &fields, ApplyMode::Merge);
                trace!(%collection, %id, ?outcome, "changed");
            }

            Message::Ready { subs } => debug!(?subs, "Subscriptions ready"),

            Message::Result { id, result, error } => {
                let outcome: CallOutcome = match error {
                    Some(error) => {
                        debug!(%id, %error, "Call failed");
                        Err(error)
                    }
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                ctx.calls.notify(&id, &outcome);
            }

            Message::Updated { methods, id } => trace!(?methods, ?id, "Methods updated"),

            Message::Error {
                reason,
                offending_message,
            } => warn!(?reason, ?offending_message, "Server reported a protocol error"),

            other => trace!(kind = %other.kind(), "Ignored"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use crate::identifiers::SubscriptionId;
    use crate::registry::SubscriptionState;
    use crate::transport::{MemoryPeer, MemoryTransport};

    struct Harness {
        transport: MemoryTransport,
        peer: MemoryPeer,
        dispatcher: MessageDispatcher,
        heartbeat: HeartbeatMonitor,
        subscriptions: SubscriptionRegistry,
        calls: CallRegistry,
        store: DocumentStore,
    }

    impl Harness {
        async fn new() -> Self {
            let (mut transport, peer) = MemoryTransport::pair();
            transport.connect("localhost", 3000).await.expect("connect");
            Self {
                transport,
                peer,
                dispatcher: MessageDispatcher::new(TickSchedule::default(), Duration::ZERO),
                heartbeat: HeartbeatMonitor::new(),
                subscriptions: SubscriptionRegistry::new(Duration::ZERO),
                calls: CallRegistry::default(),
                store: DocumentStore::default(),
            }
        }

        async fn tick(&mut self) -> TickOutcome {
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
    }

    #[tokio::test]
    async fn test_disconnected_is_noop() {
        let mut h = Harness::new().await;
        h.peer.set_connected(false);
        h.peer.push_frame(r#"{"msg":"ping"}"#);

        assert_eq!(h.tick().await, TickOutcome::Disconnected);
        assert_eq!(h.dispatcher.ticks(), 0);
        assert_eq!(h.peer.pending_inbound(), 1);
    }

    #[tokio::test]
    async fn test_ping_answered_before_next_frame() {
        let mut h = Harness::new().await;
        h.peer.push_frame(r#"{"msg":"ping","id":"7"}"#);
        h.peer.push_frame(r#"{"msg":"ping","id":"8"}"#);

        assert_eq!(h.tick().await, TickOutcome::Dispatched(MessageKind::Ping));
        assert_eq!(h.peer.sent(), vec![r#"{"msg":"pong","id":"7"}"#.to_string()]);
        assert_eq!(h.peer.pending_inbound(), 1);
    }

    #[tokio::test]
    async fn test_one_frame_per_tick() {
        let mut h = Harness::new().await;
        h.peer.push_frame(r#"{"msg":"pong"}"#);
        h.peer.push_frame(r#"{"msg":"pong"}"#);

        assert_eq!(h.tick().await, TickOutcome::Dispatched(MessageKind::Pong));
        assert_eq!(h.peer.pending_inbound(), 1);
        assert!(h.peer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_idle_and_read_failure() {
        let mut h = Harness::new().await;
        assert_eq!(h.tick().await, TickOutcome::Idle);

        h.peer.push_read_error("reset by peer");
        assert_eq!(h.tick().await, TickOutcome::ReadFailed);
        assert!(h.peer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_yield_every_tenth_tick() {
        let mut h = Harness::new().await;
        for _ in 0..9 {
            assert_eq!(h.tick().await, TickOutcome::Idle);
        }

        h.peer.push_frame(r#"{"msg":"ping","id":"1"}"#);
        assert_eq!(h.tick().await, TickOutcome::Yielded);
        assert_eq!(h.peer.pending_inbound(), 1);

        assert_eq!(h.tick().await, TickOutcome::Dispatched(MessageKind::Ping));
    }

    #[tokio::test]
    async fn test_heartbeat_every_fortieth_tick() {
        let mut h = Harness::new().await;
        for _ in 0..39 {
            h.tick().await;
        }
        assert!(h.peer.sent().is_empty());

        assert_eq!(h.tick().await, TickOutcome::Yielded);
        assert_eq!(h.peer.sent(), vec![r#"{"msg":"ping"}"#.to_string()]);
        assert_eq!(h.heartbeat.pings_sent(), 1);
    }

    #[tokio::test]
    async fn test_custom_schedule() {
        let mut h = Harness::new().await;
        h.dispatcher = MessageDispatcher::new(
            TickSchedule {
                heartbeat_every: 2,
                yield_every: 3,
            },
            Duration::ZERO,
        );

        assert_eq!(h.tick().await, TickOutcome::Idle);
        assert_eq!(h.tick().await, TickOutcome::Idle);
        assert_eq!(h.peer.sent().len(), 1);
        assert_eq!(h.tick().await, TickOutcome::Yielded);
    }

    #[tokio::test]
    async fn test_malformed_frame_changes_nothing() {
        let mut h = Harness::new().await;
        h.store.register_collection("tasks");
        h.calls
            .register("add", Box::new(|_| {}), true)
            .expect("register");
        let id = h
            .subscriptions
            .subscribe(&mut h.transport, "tasks", Vec::new())
            .await
            .expect("subscribe");
        h.peer.take_sent();

        h.peer.push_frame(r#"{"msg":"added","collection":"tasks","id":"#);
        h.peer.push_frame("not json at all");
        h.peer.push_frame(r#"{"collection":"tasks"}"#);

        for _ in 0..3 {
            assert_eq!(h.tick().await, TickOutcome::Discarded);
        }

        assert!(h.peer.sent().is_empty());
        assert!(h.store.collection("tasks").is_some_and(|c| c.is_empty()));
        assert_eq!(h.store.used_bytes(), 0);
        assert!(h.calls.is_pending("add"));
        assert_eq!(h.calls.in_flight(), 1);
        assert_eq!(h.subscriptions.len(), 1);
        assert_eq!(
            h.subscriptions.get(id).map(|s| &s.state),
            Some(&SubscriptionState::Requested)
        );
    }

    #[tokio::test]
    async fn test_added_then_changed() {
        let mut h = Harness::new().await;
        h.store.register_collection("tasks");

        h.peer
            .push_frame(r#"{"msg":"added","collection":"tasks","id":"t1","fields":{"a":1}}"#);
        h.peer.push_frame(
            r#"{"msg":"changed","collection":"tasks","id":"t1","fields":{"a":2,"b":3},"cleared":["a"]}"#,
        );
        h.peer
            .push_frame(r#"{"msg":"added","collection":"other","id":"o1","fields":{"x":1}}"#);

        assert_eq!(h.tick().await, TickOutcome::Dispatched(MessageKind::Added));
        assert_eq!(h.tick().await, TickOutcome::Dispatched(MessageKind::Changed));
        assert_eq!(h.tick().await, TickOutcome::Dispatched(MessageKind::Added));

        assert_eq!(h.store.field("tasks", "t1", "a"), Some(&json!(2)));
        assert_eq!(h.store.field("tasks", "t1", "b"), None);
        assert!(h.store.collection("other").is_none());
    }

    #[tokio::test]
    async fn test_result_success_and_error_release_slot() {
        let mut h = Harness::new().await;
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["add", "remove", "noop"] {
            let sink = Arc::clone(&seen);
            h.calls
                .register(name, Box::new(move |o| sink.lock().push(o)), true)
                .expect("register");
        }

        h.peer.push_frame(r#"{"msg":"result","id":"add","result":{"sum":5}}"#);
        h.peer.push_frame(
            r#"{"msg":"result","id":"remove","error":{"error":403,"reason":"Access denied"}}"#,
        );
        h.peer.push_frame(r#"{"msg":"result","id":"noop"}"#);

        for _ in 0..3 {
            assert_eq!(h.tick().await, TickOutcome::Dispatched(MessageKind::Result));
        }

        let seen = seen.lock();
        assert_eq!(seen[0], Ok(json!({"sum": 5})));
        assert_eq!(
            seen[1].as_ref().map_err(|e| e.describe()),
            Err("Access denied".to_string())
        );
        assert_eq!(seen[2], Ok(Value::Null));
        assert_eq!(h.calls.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_nosub_recorded() {
        let mut h = Harness::new().await;
        let id = h
            .subscriptions
            .subscribe(&mut h.transport, "secret", Vec::new())
            .await
            .expect("subscribe");
        assert_eq!(id, SubscriptionId::new(1));

        h.peer
            .push_frame(r#"{"msg":"nosub","id":"1","error":{"error":404,"reason":"Subscription 'secret' not found"}}"#);
        assert_eq!(h.tick().await, TickOutcome::Dispatched(MessageKind::Nosub));

        assert!(matches!(
            h.subscriptions.get(id).map(|s| &s.state),
            Some(SubscriptionState::Rejected(Some(_)))
        ));
    }

    #[tokio::test]
    async fn test_extension_points_are_noops() {
        let mut h = Harness::new().await;
        h.peer.push_frame(r#"{"msg":"ready","subs":["1"]}"#);
        h.peer.push_frame(r#"{"msg":"update","id":"add"}"#);
        h.peer.push_frame(r#"{"msg":"removed","collection":"tasks","id":"t1"}"#);
        h.peer.push_frame(r#"{"msg":"somethingnew"}"#);

        assert_eq!(h.tick().await, TickOutcome::Dispatched(MessageKind::Ready));
        assert_eq!(h.tick().await, TickOutcome::Dispatched(MessageKind::Updated));
        assert_eq!(h.tick().await, TickOutcome::Dispatched(MessageKind::Removed));
        assert_eq!(h.tick().await, TickOutcome::Dispatched(MessageKind::Unknown));
        assert!(h.peer.sent().is_empty());
    }
}
