//! Wire codec.
//!
//! Converts between frame text and [`Message`]. Decoding never panics: any
//! frame that is not a JSON object with a `msg` field is reported as
//! [`Error::Protocol`] and left to the caller to discard.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, from_str, to_string};

use crate::error::{Error, Result};

use super::Message;

// ============================================================================
// Codec
// ============================================================================

/// Decodes one frame.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the frame is not a valid message.
pub fn decode(text: &str) -> Result<Message> {
    from_str(text).map_err(|e| Error::protocol(format!("undecodable frame: {e}")))
}

/// Encodes one message.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode(message: &Message) -> Result<String> {
    Ok(to_string(message)?)
}

/// Returns `true` for frames that carry no `msg` field but are otherwise
/// well-formed objects, such as the `{"server_id": "0"}` banner some servers
/// emit before answering the handshake.
#[must_use]
pub fn is_banner(text: &str) -> bool {
    matches!(
        from_str::<Value>(text),
        Ok(Value::Object(object)) if !object.contains_key("msg")
    )
}

// ============================================================================
// Tests
// ============================================================================
