//! Subscription bookkeeping.
//!
//! Ids are allocated from 1, strictly increasing, and never reused. There is
//! no unsubscribe, so records only ever accumulate.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::{Message, ServerError};
use crate::transport::Transport;

// ============================================================================
// Subscription
// ============================================================================

/// Server acknowledgement state of a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionState {
    /// `sub` sent, no `nosub` received.
    Requested,
    /// Server answered with `nosub`.
    Rejected(Option<ServerError>),
}

/// A subscription sent by this client.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Client-allocated id.
    pub id: SubscriptionId,
    /// Publication name.
    pub name: String,
    /// Publication arguments.
    pub params: Vec<Value>,
    /// Acknowledgement state.
    pub state: SubscriptionState,
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Allocates subscription ids and tracks what was sent.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    next_id: u64,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    pacing: Duration,
}

impl SubscriptionRegistry {
    /// Creates an empty registry that pauses `pacing` after each `sub`.
    #[must_use]
    pub fn new(pacing: Duration) -> Self {
        Self {
            next_id: 1,
            subscriptions: BTreeMap::new(),
            pacing,
        }
    }

    /// Sends a `sub` for `name` and waits one pacing interval.
    ///
    /// Repeated names produce distinct subscriptions. Completion is
    /// confirmed later by the server's `ready`; this call does not wait for
    /// it.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the frame cannot be sent. The id is
    /// consumed either way.
    pub async fn subscribe<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        name: &str,
        params: Vec<Value>,
    ) -> Result<SubscriptionId> {
        let id = SubscriptionId::new(self.next_id);
        self.next_id += 1;

        transport
            .send_message(&Message::sub(id, name, params.clone()))
            .await?;

        debug!(%id, name, "Subscription requested");

        self.subscriptions.insert(
            id,
            Subscription {
                id,
                name: name.to_owned(),
                params,
                state: SubscriptionState::Requested,
            },
        );

        tokio::time::sleep(self.pacing).await;
        Ok(id)
    }

    /// Records a `nosub` for the wire id `id`.
    ///
    /// Returns `false` if the id does not name a known subscription.
    pub fn reject(&mut self, id: &str, error: Option<ServerError>) -> bool {
        let subscription = match SubscriptionId::parse(id) {
            Some(key) => self.subscriptions.get_mut(&key),
            None => None,
        };
        let Some(subscription) = subscription else {
            warn!(id, "nosub for unknown subscription");
            return false;
        };

        let reason = error
            .as_ref()
            .map_or_else(|| "none".to_string(), ServerError::describe);
        warn!(id, name = %subscription.name, %reason, "Subscription rejected");

        subscription.state = SubscriptionState::Rejected(error);
        true
    }

    /// Fails if the subscription was rejected.
    ///
    /// # Errors
    ///
    /// - [`Error::SubscriptionRejected`] if the server sent `nosub`
    /// - [`Error::Protocol`] if `id` was never allocated by this registry
    pub fn ensure_accepted(&self, id: SubscriptionId) -> Result<()> {
        match self.subscriptions.get(&id).map(|s| &s.state) {
            Some(SubscriptionState::Requested) => Ok(()),
            Some(SubscriptionState::Rejected(error)) => Err(Error::subscription_rejected(
                id,
                error
                    .as_ref()
                    .map_or_else(|| "no reason given".to_string(), ServerError::describe),
            )),
            None => Err(Error::protocol(format!("unknown subscription {id}"))),
        }
    }

    /// Returns a subscription by id.
    #[inline]
    #[must_use]
    pub fn get(&self, id: SubscriptionId) -> Option<&Subscription> {
        self.subscriptions.get(&id)
    }

    /// Iterates subscriptions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    /// Number of subscriptions sent.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns `true` if nothing was subscribed yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    use crate::transport::{MemoryPeer, MemoryTransport};

    async fn connected() -> (MemoryTransport, MemoryPeer) {
        let (mut transport, peer) = MemoryTransport::pair();
        transport.connect("localhost", 3000).await.expect("connect");
        (transport, peer)
    }

    #[tokio::test]
    async fn test_subscribe_sends_sub() {
        let (mut transport, peer) = connected().await;
        let mut registry = SubscriptionRegistry::new(Duration::ZERO);

        let id = registry
            .subscribe(&mut transport, "tasks", vec![json!("open")])
            .await
            .expect("subscribe");

        assert_eq!(id, SubscriptionId::new(1));
        assert_eq!(
            peer.sent_messages(),
            vec![Message::Sub {
                id: "1".into(),
                name: "tasks".into(),
                params: vec![json!("open")],
            }]
        );
        assert_eq!(registry.get(id).map(|s| s.name.as_str()), Some("tasks"));
    }

    #[tokio::test]
    async fn test_same_name_gets_distinct_ids() {
        let (mut transport, _peer) = connected().await;
        let mut registry = SubscriptionRegistry::new(Duration::ZERO);

        let first = registry.subscribe(&mut transport, "tasks", Vec::new()).await.expect("first");
        let second = registry.subscribe(&mut transport, "tasks", Vec::new()).await.expect("second");

        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_send_consumes_id() {
        let (mut transport, peer) = connected().await;
        let mut registry = SubscriptionRegistry::new(Duration::ZERO);

        peer.set_connected(false);
        assert!(registry.subscribe(&mut transport, "a", Vec::new()).await.is_err());
        peer.set_connected(true);

        let id = registry.subscribe(&mut transport, "a", Vec::new()).await.expect("subscribe");
        assert_eq!(id, SubscriptionId::new(2));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_reject_marks_subscription() {
        let (mut transport, _peer) = connected().await;
        let mut registry = SubscriptionRegistry::new(Duration::ZERO);
        let id = registry.subscribe(&mut transport, "secret", Vec::new()).await.expect("subscribe");

        registry.ensure_accepted(id).expect("not rejected yet");

        let error = ServerError::from(json!({"error": 404, "reason": "Subscription not found"}));
        assert!(registry.reject("1", Some(error)));
        assert!(!registry.reject("99", None));

        let err = registry.ensure_accepted(id).expect_err("rejected");
        assert_eq!(err.to_string(), "Subscription 1 rejected: Subscription not found");
    }

    #[test]
    fn test_unknown_subscription() {
        let registry = SubscriptionRegistry::new(Duration::ZERO);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.ensure_accepted(SubscriptionId::new(1)),
            Err(Error::Protocol { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_ids_are_one_to_n(names in proptest::collection::vec("[a-z]{1,6}", 1..20)) {
            let ids = tokio_test::block_on(async {
                let (mut transport, _peer) = connected().await;
                let mut registry = SubscriptionRegistry::new(Duration::ZERO);
                let mut ids = Vec::new();
                for name in &names {
                    ids.push(registry.subscribe(&mut transport, name, Vec::new()).await.expect("subscribe"));
                }
                ids
            });

            let expected: Vec<_> = (1..=names.len() as u64).map(SubscriptionId::new).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}
