//! Method call correlation.
//!
//! Outstanding calls are correlated by name: the call id sent on the wire is
//! the method name, and the server echoes it in the `result`. Slots live in
//! a fixed-capacity arena addressed by their `used` flag and are never
//! compacted.
//!
//! # Duplicate Calls
//!
//! Registering a method whose name is still pending does not take a new
//! slot. Each such attempt advances the pending slot's collision counter
//! modulo [`THROTTLE_CYCLE`]; attempts 1 through 9 are refused with
//! [`Error::CallThrottled`] and the tenth reclaims the slot for the new
//! callback.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::ServerError;

// ============================================================================
// Constants
// ============================================================================

/// Default number of call slots.
pub const DEFAULT_CALL_SLOTS: usize = 5;

/// Collisions needed to reclaim a pending slot.
pub const THROTTLE_CYCLE: u8 = 10;

// ============================================================================
// Types
// ============================================================================

/// What a call callback receives.
pub type CallOutcome = std::result::Result<Value, ServerError>;

/// Callback invoked when a call's `result` arrives.
pub type CallCallback = Box<dyn FnMut(CallOutcome) + Send>;

/// Converts a call outcome into a crate [`Result`].
///
/// # Errors
///
/// Returns [`Error::ServerReported`] if the server answered with an error.
pub fn into_result(outcome: CallOutcome) -> Result<Value> {
    outcome.map_err(Error::ServerReported)
}

// ============================================================================
// CallSlot
// ============================================================================

struct CallSlot {
    /// Correlation key.
    name: String,
    callback: Option<CallCallback>,
    used: bool,
    method_call: bool,
    /// Collision counter, wraps at [`THROTTLE_CYCLE`].
    collisions: u8,
}

impl CallSlot {
    fn new(name: &str, callback: CallCallback, method_call: bool) -> Self {
        Self {
            name: name.to_owned(),
            callback: Some(callback),
            used: true,
            method_call,
            collisions: 0,
        }
    }

    fn occupy(&mut self, name: &str, callback: CallCallback, method_call: bool) {
        *self = Self::new(name, callback, method_call);
    }

    fn matches(&self, name: &str) -> bool {
        self.used && self.method_call && self.name == name
    }
}

impl fmt::Debug for CallSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSlot")
            .field("name", &self.name)
            .field("used", &self.used)
            .field("method_call", &self.method_call)
            .field("collisions", &self.collisions)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// CallRegistry
// ============================================================================

/// Fixed-capacity table of pending calls.
#[derive(Debug)]
pub struct CallRegistry {
    slots: Vec<CallSlot>,
    capacity: usize,
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_SLOTS)
    }
}

impl CallRegistry {
    /// Creates a registry with `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Registers a callback under `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::CallThrottled`] if a method call with this name is pending
    ///   and this attempt does not complete a throttle cycle
    /// - [`Error::CallbackCapacityExceeded`] if every slot is in use
    pub fn register(&mut self, name: &str, callback: CallCallback, is_method: bool) -> Result<()> {
        if is_method && let Some(index) = self.slots.iter().position(|s| s.matches(name)) {
            let slot = &mut self.slots[index];
            slot.collisions = (slot.collisions + 1) % THROTTLE_CYCLE;

            if slot.collisions != 0 {
                trace!(name, attempt = slot.collisions, "Call still pending");
                return Err(Error::call_throttled(name, slot.collisions));
            }

            debug!(name, index, "Pending call slot reclaimed");
            slot.occupy(name, callback, is_method);
            return Ok(());
        }

        if let Some(index) = self.slots.iter().position(|s| !s.used) {
            self.slots[index].occupy(name, callback, is_method);
            trace!(name, index, "Call slot reused");
            return Ok(());
        }

        if self.slots.len() < self.capacity {
            self.slots.push(CallSlot::new(name, callback, is_method));
            trace!(name, index = self.slots.len() - 1, "Call slot added");
            return Ok(());
        }

        warn!(name, capacity = self.capacity, "Too many pending calls");
        Err(Error::capacity_exceeded(self.capacity))
    }

    /// Delivers `outcome` to every pending method call named `name`.
    ///
    /// Slots are released before their callbacks run. Returns the number of
    /// callbacks invoked.
    pub fn notify(&mut self, name: &str, outcome: &CallOutcome) -> usize {
        let callbacks: Vec<CallCallback> = self
            .slots
            .iter_mut()
            .filter(|slot| slot.matches(name))
            .filter_map(|slot| {
                slot.used = false;
                slot.collisions = 0;
                slot.callback.take()
            })
            .collect();

        if callbacks.is_empty() {
            debug!(name, "Result for unknown call");
        }

        let count = callbacks.len();
        for mut callback in callbacks {
            callback(outcome.clone());
        }
        count
    }

    /// Frees every pending method call named `name` without running its
    /// callback. Returns the number of slots freed.
    pub fn release(&mut self, name: &str) -> usize {
        let mut released = 0;
        for slot in self.slots.iter_mut().filter(|slot| slot.matches(name)) {
            slot.used = false;
            slot.collisions = 0;
            slot.callback = None;
            released += 1;
        }
        if released > 0 {
            debug!(name, released, "Call slots released");
        }
        released
    }

    /// Returns `true` if a method call named `name` is pending.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.matches(name))
    }

    /// Number of slots in use.
    #[inline]
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.used).count()
    }

    /// Maximum number of slots.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
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

    fn noop() -> CallCallback {
        Box::new(|_| {})
    }

    fn recorder() -> (CallCallback, Arc<Mutex<Vec<CallOutcome>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (Box::new(move |outcome| sink.lock().push(outcome)), seen)
    }

    #[test]
    fn test_capacity() {
        let mut registry = CallRegistry::default();
        for name in ["a", "b", "c", "d", "e"] {
            registry.register(name, noop(), true).expect("free slot");
        }
        assert_eq!(registry.in_flight(), 5);

        let err = registry.register("f", noop(), true).expect_err("full");
        assert!(matches!(err, Error::CallbackCapacityExceeded { capacity: 5 }));

        assert_eq!(registry.notify("c", &Ok(json!(1))), 1);
        registry.register("f", noop(), true).expect("freed slot");
        assert!(registry.register("g", noop(), true).is_err());
    }

    #[test]
    fn test_duplicate_name_throttled() {
        let mut registry = CallRegistry::default();
        registry.register("add", noop(), true).expect("first");

        for attempt in 1..=9u8 {
            let err = registry.register("add", noop(), true).expect_err("throttled");
            assert!(matches!(err, Error::CallThrottled { attempt: a, .. } if a == attempt));
        }

        registry.register("add", noop(), true).expect("tenth attempt reclaims");
        assert_eq!(registry.in_flight(), 1);

        // Cycle restarts for the reclaimed slot.
        assert!(registry.register("add", noop(), true).is_err());
    }

    #[test]
    fn test_reclaimed_slot_gets_new_callback() {
        let mut registry = CallRegistry::default();
        let (first, first_seen) = recorder();
        let (second, second_seen) = recorder();

        registry.register("add", first, true).expect("first");
        for _ in 1..=9 {
            let _ = registry.register("add", noop(), true);
        }
        registry.register("add", second, true).expect("reclaim");

        registry.notify("add", &Ok(json!(3)));
        assert!(first_seen.lock().is_empty());
        assert_eq!(*second_seen.lock(), vec![Ok(json!(3))]);
    }

    #[test]
    fn test_non_method_slots_do_not_collide() {
        let mut registry = CallRegistry::default();
        registry.register("feed", noop(), false).expect("first");
        registry.register("feed", noop(), false).expect("second");
        assert_eq!(registry.in_flight(), 2);
        assert_eq!(registry.notify("feed", &Ok(Value::Null)), 0);
        assert!(!registry.is_pending("feed"));
    }

    #[test]
    fn test_notify_delivers_error_and_releases() {
        let mut registry = CallRegistry::default();
        let (callback, seen) = recorder();
        registry.register("add", callback, true).expect("register");

        let error = ServerError::from(json!({"error": 500, "reason": "boom"}));
        assert_eq!(registry.notify("add", &Err(error.clone())), 1);

        assert_eq!(*seen.lock(), vec![Err(error)]);
        assert_eq!(registry.in_flight(), 0);
        assert!(!registry.is_pending("add"));
    }

    #[test]
    fn test_notify_unknown_name() {
        let mut registry = CallRegistry::default();
        registry.register("add", noop(), true).expect("register");
        assert_eq!(registry.notify("sub", &Ok(Value::Null)), 0);
        assert!(registry.is_pending("add"));
    }

    #[test]
    fn test_into_result() {
        assert_eq!(into_result(Ok(json!(5))).expect("ok"), json!(5));

        let error = ServerError::from(json!({"error": 403, "reason": "Access denied"}));
        let err = into_result(Err(error)).expect_err("server error");
        assert!(matches!(&err, Error::ServerReported(e) if e.describe() == "Access denied"));
        assert_eq!(err.to_string(), "Server error: [403] Access denied");
    }

    #[test]
    fn test_release_skips_callback() {
        let mut registry = CallRegistry::default();
        let (callback, seen) = recorder();
        registry.register("add", callback, true).expect("register");

        assert_eq!(registry.release("add"), 1);
        assert_eq!(registry.release("add"), 0);
        assert_eq!(registry.notify("add", &Ok(Value::Null)), 0);
        assert!(seen.lock().is_empty());
        assert_eq!(registry.in_flight(), 0);
    }

    #[test]
    fn test_free_slot_reused_before_growing() {
        let mut registry = CallRegistry::new(2);
        registry.register("a", noop(), true).expect("a");
        registry.notify("a", &Ok(Value::Null));
        registry.register("b", noop(), true).expect("b");
        registry.register("c", noop(), true).expect("c");
        assert_eq!(registry.in_flight(), 2);
        assert!(registry.register("d", noop(), true).is_err());
    }
}
