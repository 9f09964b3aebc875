//! Client facade and configuration.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Client`] struct and operations |
//! | `options` | [`ClientOptions`] builder and validation |

// ============================================================================
// Submodules
// ============================================================================

mod core;
mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::Client;
pub use options::{ClientOptions, DEFAULT_PACING, DEFAULT_PATH, DEFAULT_PORT, PROTOCOL_VERSION};
