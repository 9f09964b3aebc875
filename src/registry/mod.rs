//! Correlation registries.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `call` | Pending method calls and their callbacks |
//! | `subscription` | Subscription ids and rejection state |

/// Pending method calls.
pub mod call;

/// Subscriptions.
pub mod subscription;

pub use call::{CallCallback, CallOutcome, CallRegistry, into_result};
pub use subscription::{Subscription, SubscriptionRegistry, SubscriptionState};
