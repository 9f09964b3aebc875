//! DDP protocol message types.
//!
//! This module defines the wire format spoken between the client and a DDP
//! server.
//!
//! # Protocol Overview
//!
//! | Kind | Direction | Fields |
//! |------|-----------|--------|
//! | `connect` | Client → Server | `version`, `support[]` |
//! | `connected` / `failed` | Server → Client | `session` / `version` |
//! | `ping` / `pong` | Both | `id?` |
//! | `sub` | Client → Server | `id`, `name`, `params[]` |
//! | `nosub` | Server → Client | `id`, `error?` |
//! | `added` / `changed` | Server → Client | `collection`, `id`, `fields` |
//! | `ready` | Server → Client | `subs[]` |
//! | `method` | Client → Server | `method`, `params[]`, `id` |
//! | `result` | Server → Client | `id`, `result?`, `error?` |
//! | `updated` | Server → Client | `methods[]` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Frame encode/decode |
//! | `message` | [`Message`] and related types |

// ============================================================================
// Submodules
// ============================================================================

/// Frame encode/decode.
pub mod codec;

/// Message definitions.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{decode, encode};
pub use message::{Fields, Message, MessageKind, ServerError};
