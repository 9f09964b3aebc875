//! Local document cache.
//!
//! Mirrors server-pushed documents for collections the caller registered in
//! advance. Documents arrive through `added` and `changed` messages and are
//! never removed.
//!
//! # Merge Policy
//!
//! | Incoming | Unknown document | Known document |
//! |----------|------------------|----------------|
//! | `added` | Insert all fields | Merge |
//! | `changed` | Insert all fields | Merge |
//!
//! Merge updates only fields the cached document already has under
//! [`MergePolicy::ExistingOnly`] (the default). [`MergePolicy::CreateMissing`]
//! also adds new fields. Fields are never removed.
//!
//! # Byte Budget
//!
//! Each document is charged `id.len()` plus, per field, the key length and
//! the length of the value's JSON text. A change that would push the total
//! past the configured capacity is rejected whole.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::protocol::Fields;

// ============================================================================
// Constants
// ============================================================================

/// Default cache capacity in bytes.
pub const DEFAULT_CACHE_CAPACITY: usize = 5120;

// ============================================================================
// Types
// ============================================================================

/// Field name to value.
pub type Document = Fields;

/// Document id to document.
pub type Collection = FxHashMap<String, Document>;

// ============================================================================
// MergePolicy
// ============================================================================

/// How a change to a known document treats field names it does not have.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Drop fields the cached document lacks.
    #[default]
    ExistingOnly,
    /// Add fields the cached document lacks.
    CreateMissing,
}

// ============================================================================
// ApplyMode / ApplyOutcome
// ============================================================================

/// Which inbound message produced a change.
///
/// Informational only: both modes insert an unknown document and merge into
/// a known one. The mode is carried into the trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// From `added`.
    Insert,
    /// From `changed`.
    Merge,
}

/// Result of [`DocumentStore::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Collection not registered; change discarded.
    Ignored,
    /// New document created.
    Inserted,
    /// Existing document merged; number of fields written.
    Merged(usize),
    /// Change discarded because the cache is full.
    OverCapacity,
}

// ============================================================================
// DocumentStore
// ============================================================================

/// Collection → document → field cache.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    collections: FxHashMap<String, Collection>,
    policy: MergePolicy,
    capacity: usize,
    used: usize,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, MergePolicy::default())
    }
}

impl DocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(capacity: usize, policy: MergePolicy) -> Self {
        Self {
            collections: FxHashMap::default(),
            policy,
            capacity,
            used: 0,
        }
    }

    /// Registers a collection so inbound documents for it are kept.
    ///
    /// Returns `false` if it was already registered.
    pub fn register_collection(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.collections.contains_key(&name) {
            return false;
        }
        debug!(collection = %name, "Collection registered");
        self.collections.insert(name, Collection::default());
        true
    }

    /// Applies an inbound `added` or `changed`.
    ///
    /// `mode` does not change the outcome; see [`ApplyMode`].
    pub fn apply(
        &mut self,
        collection: &str,
        id: &str,
        fields: &Fields,
        mode: ApplyMode,
    ) -> ApplyOutcome {
        let Some(documents) = self.collections.get_mut(collection) else {
            trace!(collection, id, "Change for unregistered collection dropped");
            return ApplyOutcome::Ignored;
        };

        let Some(document) = documents.get_mut(id) else {
            let cost = document_cost(id, fields);
            if self.used + cost > self.capacity {
                warn!(
                    collection,
                    id,
                    cost,
                    used = self.used,
                    capacity = self.capacity,
                    "Cache full, document dropped"
                );
                return ApplyOutcome::OverCapacity;
            }

            documents.insert(id.to_owned(), fields.clone());
            self.used += cost;
            trace!(collection, id, ?mode, "Document inserted");
            return ApplyOutcome::Inserted;
        };

        let mut merged = document.clone();
        let mut written = 0;
        for (key, value) in fields {
            match merged.get_mut(key) {
                Some(slot) => {
                    *slot = value.clone();
                    written += 1;
                }
                None if self.policy == MergePolicy::CreateMissing => {
                    merged.insert(key.clone(), value.clone());
                    written += 1;
                }
                None => trace!(collection, id, field = %key, "Unknown field dropped"),
            }
        }

        let before = document_cost(id, document);
        let after = document_cost(id, &merged);
        let used = self.used - before + after;
        if used > self.capacity {
            warn!(collection, id, used, capacity = self.capacity, "Cache full, change dropped");
            return ApplyOutcome::OverCapacity;
        }

        *document = merged;
        self.used = used;
        trace!(collection, id, ?mode, written, "Document merged");
        ApplyOutcome::Merged(written)
    }

    /// Returns a registered collection.
    #[inline]
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// Returns a cached document.
    #[inline]
    #[must_use]
    pub fn document(&self, collection: &str, id: &str) -> Option<&Document> {
        self.collections.get(collection)?.get(id)
    }

    /// Returns a single cached field.
    #[inline]
    #[must_use]
    pub fn field(&self, collection: &str, id: &str, field: &str) -> Option<&Value> {
        self.document(collection, id)?.get(field)
    }

    /// Bytes charged against the capacity.
    #[inline]
    #[must_use]
    pub const fn used_bytes(&self) -> usize {
        self.used
    }

    /// Configured capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Active merge policy.
    #[inline]
    #[must_use]
    pub const fn policy(&self) -> MergePolicy {
        self.policy
    }
}

fn document_cost(id: &str, fields: &Fields) -> usize {
    id.len()
        + fields
            .iter()
            .map(|(key, value)| key.len() + value.to_string().len())
            .sum::<usize>()
}

// ============================================================================
// Tests
// ============================================================================
