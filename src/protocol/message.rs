//! DDP message types.
//!
//! Every frame on the wire is a JSON object whose `msg` field names the
//! message kind. [`Message`] is the tagged union over the kinds this client
//! sends or understands; anything else decodes as [`Message::Unknown`].
//!
//! # Format
//!
//! ```json
//! {"msg": "added", "collection": "tasks", "id": "a1", "fields": {"done": false}}
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identifiers::{SessionToken, SubscriptionId};

// ============================================================================
// Types
// ============================================================================

/// Field map carried by `added` and `changed` messages.
pub type Fields = Map<String, Value>;

// ============================================================================
// Message
// ============================================================================

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum Message {
    /// Client handshake request.
    Connect {
        /// Proposed protocol version.
        version: String,
        /// Versions the client supports, in preference order.
        support: Vec<String>,
    },

    /// Handshake accepted.
    Connected {
        /// Server-issued session token.
        session: SessionToken,
    },

    /// Handshake refused.
    Failed {
        /// Version the server would accept instead.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },

    /// Heartbeat request.
    Ping {
        /// Optional correlation id echoed by the pong.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Heartbeat reply.
    Pong {
        /// Id of the ping being answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Subscription request.
    Sub {
        /// Client-allocated subscription id.
        id: String,
        /// Publication name.
        name: String,
        /// Publication arguments.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        params: Vec<Value>,
    },

    /// Subscription refused or terminated by the server.
    Nosub {
        /// Subscription id.
        id: String,
        /// Reason, if the server supplied one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ServerError>,
    },

    /// Document added to a collection.
    Added {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// Initial field values.
        #[serde(default)]
        fields: Fields,
    },

    /// Fields of an existing document changed.
    Changed {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// Updated field values.
        #[serde(default)]
        fields: Fields,
        /// Field names the server cleared.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        cleared: Vec<String>,
    },

    /// Document removed from a collection.
    Removed {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },

    /// Initial data for the listed subscriptions has been sent.
    Ready {
        /// Subscription ids that became ready.
        #[serde(default)]
        subs: Vec<String>,
    },

    /// Outcome of a method call.
    Result {
        /// Method call id.
        id: String,
        /// Return value on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Error on failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ServerError>,
    },

    /// Remote procedure call.
    Method {
        /// Method name.
        method: String,
        /// Positional arguments.
        #[serde(default)]
        params: Vec<Value>,
        /// Call id, echoed in the `result`.
        id: String,
    },

    /// Server finished writing the effects of the listed methods.
    #[serde(rename = "updated", alias = "update")]
    Updated {
        /// Method ids whose writes are now visible.
        #[serde(default)]
        methods: Vec<String>,
        /// Single method id, as some servers send it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Server could not process a client message.
    Error {
        /// Human-readable reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        /// The message that caused the error.
        #[serde(
            default,
            rename = "offendingMessage",
            skip_serializing_if = "Option::is_none"
        )]
        offending_message: Option<Value>,
    },

    /// Any kind outside the catalogue above.
    #[serde(other)]
    Unknown,
}

// ============================================================================
// Constructors
// ============================================================================

impl Message {
    /// Creates the handshake request.
    #[must_use]
    pub fn connect(version: impl Into<String>, support: Vec<String>) -> Self {
        Self::Connect {
            version: version.into(),
            support,
        }
    }

    /// Creates a ping, carrying `id` only when non-empty.
    #[must_use]
    pub fn ping(id: Option<&str>) -> Self {
        Self::Ping {
            id: non_empty(id),
        }
    }

    /// Creates a pong, carrying `id` only when non-empty.
    #[must_use]
    pub fn pong(id: Option<&str>) -> Self {
        Self::Pong {
            id: non_empty(id),
        }
    }

    /// Creates a subscription request.
    #[must_use]
    pub fn sub(id: SubscriptionId, name: impl Into<String>, params: Vec<Value>) -> Self {
        Self::Sub {
            id: id.to_string(),
            name: name.into(),
            params,
        }
    }

    /// Creates a method call.
    #[must_use]
    pub fn method(method: impl Into<String>, params: Vec<Value>, id: impl Into<String>) -> Self {
        Self::Method {
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    /// Returns the kind discriminator.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Connect { .. } => MessageKind::Connect,
            Self::Connected { .. } => MessageKind::Connected,
            Self::Failed { .. } => MessageKind::Failed,
            Self::Ping { .. } => MessageKind::Ping,
            Self::Pong { .. } => MessageKind::Pong,
            Self::Sub { .. } => MessageKind::Sub,
            Self::Nosub { .. } => MessageKind::Nosub,
            Self::Added { .. } => MessageKind::Added,
            Self::Changed { .. } => MessageKind::Changed,
            Self::Removed { .. } => MessageKind::Removed,
            Self::Ready { .. } => MessageKind::Ready,
            Self::Result { .. } => MessageKind::Result,
            Self::Method { .. } => MessageKind::Method,
            Self::Updated { .. } => MessageKind::Updated,
            Self::Error { .. } => MessageKind::Error,
            Self::Unknown => MessageKind::Unknown,
        }
    }
}

fn non_empty(id: Option<&str>) -> Option<String> {
    id.filter(|id| !id.is_empty()).map(str::to_owned)
}

// ============================================================================
// MessageKind
// ============================================================================

/// Message kind without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `connect`
    Connect,
    /// `connected`
    Connected,
    /// `failed`
    Failed,
    /// `ping`
    Ping,
    /// `pong`
    Pong,
    /// `sub`
    Sub,
    /// `nosub`
    Nosub,
    /// `added`
    Added,
    /// `changed`
    Changed,
    /// `removed`
    Removed,
    /// `ready`
    Ready,
    /// `result`
    Result,
    /// `method`
    Method,
    /// `updated`
    Updated,
    /// `error`
    Error,
    /// Anything else.
    Unknown,
}

impl MessageKind {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Sub => "sub",
            Self::Nosub => "nosub",
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
            Self::Ready => "ready",
            Self::Result => "result",
            Self::Method => "method",
            Self::Updated => "updated",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ServerError
// ============================================================================

/// Error object carried by `result` and `nosub` messages.
///
/// Servers send either a structured object
/// (`{"error": 404, "reason": "...", "errorType": "Meteor.Error"}`) or a bare
/// value; both decode into this type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct ServerError {
    /// Error code (string or number).
    pub error: Value,

    /// Short reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Full message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Error class name.
    #[serde(rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    /// Extra details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ServerError {
    /// Returns the most descriptive text available.
    #[must_use]
    pub fn describe(&self) -> String {
        self.reason
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| match &self.error {
                Value::String(s) => s.clone(),
                Value::Null => "unknown error".to_string(),
                other => other.to_string(),
            })
    }
}

impl From<Value> for ServerError {
    fn from(value: Value) -> Self {
        let Value::Object(mut object) = value else {
            return Self {
                error: value,
                ..Self::default()
            };
        };

        let mut text = |key: &str| match object.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        let reason = text("reason");
        let message = text("message");
        let error_type = text("errorType");

        Self {
            error: object.remove("error").unwrap_or(Value::Null),
            reason,
            message,
            error_type,
            details: object.remove("details"),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Value::Null => f.write_str(&self.describe()),
            Value::String(code) => write!(f, "[{code}] {}", self.describe()),
            code => write!(f, "[{code}] {}", self.describe()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_connect_serialization() {
        let json = serde_json::to_value(Message::connect("1", vec!["1".into()])).expect("serialize");
        assert_eq!(json, json!({"msg": "connect", "version": "1", "support": ["1"]}));
    }

    #[test]
    fn test_ping_omits_empty_id() {
        let json = serde_json::to_value(Message::ping(Some(""))).expect("serialize");
        assert_eq!(json, json!({"msg": "ping"}));

        let json = serde_json::to_value(Message::pong(Some("7"))).expect("serialize");
        assert_eq!(json, json!({"msg": "pong", "id": "7"}));
    }

    #[test]
    fn test_sub_uses_string_id() {
        let msg = Message::sub(SubscriptionId::new(1), "tasks", Vec::new());
        let json = serde_json::to_value(msg).expect("serialize");
        assert_eq!(json, json!({"msg": "sub", "id": "1", "name": "tasks"}));
    }

    #[test]
    fn test_changed_defaults() {
        let msg: Message =
            serde_json::from_str(r#"{"msg":"changed","collection":"c","id":"1"}"#).expect("parse");
        assert_eq!(
            msg,
            Message::Changed {
                collection: "c".into(),
                id: "1".into(),
                fields: Fields::new(),
                cleared: Vec::new(),
            }
        );
    }

    #[test]
    fn test_update_alias() {
        let msg: Message = serde_json::from_str(r#"{"msg":"update","id":"add"}"#).expect("parse");
        assert_eq!(msg.kind(), MessageKind::Updated);

        let msg: Message =
            serde_json::from_str(r#"{"msg":"updated","methods":["1"]}"#).expect("parse");
        assert_eq!(msg.kind(), MessageKind::Updated);
    }

    #[test]
    fn test_unknown_kind() {
        let msg: Message = serde_json::from_str(r#"{"msg":"whatever","x":1}"#).expect("parse");
        assert_eq!(msg, Message::Unknown);
    }

    #[test]
    fn test_server_error_object() {
        let err = ServerError::from(json!({
            "error": 404,
            "reason": "Method not found",
            "errorType": "Meteor.Error"
        }));
        assert_eq!(err.error, json!(404));
        assert_eq!(err.reason.as_deref(), Some("Method not found"));
        assert_eq!(err.error_type.as_deref(), Some("Meteor.Error"));
        assert_eq!(err.to_string(), "[404] Method not found");
    }

    #[test]
    fn test_server_error_bare_string() {
        let err = ServerError::from(json!("too-many-requests"));
        assert_eq!(err.describe(), "too-many-requests");
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(MessageKind::Nosub.as_str(), "nosub");
        assert_eq!(Message::ping(None).kind().to_string(), "ping");
    }
}
