//! Outbound and inbound debugger message types.
//!
//! Command payloads are opaque to the server: it only reads and writes the
//! `command` and `messageId` fields and forwards everything else as-is.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;

// ============================================================================
// Constants
// ============================================================================

/// Field holding the command name.
pub const COMMAND_FIELD: &str = "command";

/// Field holding the correlation id.
pub const MESSAGE_ID_FIELD: &str = "messageId";

// ============================================================================
// DebuggerMessage
// ============================================================================

/// A message sent from the IDE to a running game.
///
/// # Format
///
/// ```json
/// {
///   "command": "hotReload",
///   "messageId": 3,
///   ...commandSpecificFields
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebuggerMessage(Map<String, Value>);

impl DebuggerMessage {
    /// Creates a message with the given `command`.
    #[inline]
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(COMMAND_FIELD.to_string(), Value::String(command.into()));
        Self(fields)
    }

    /// Adds a command-specific field.
    #[inline]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the command name, if any.
    #[inline]
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.0.get(COMMAND_FIELD).and_then(Value::as_str)
    }

    /// Returns the correlation id, if one was assigned.
    #[inline]
    #[must_use]
    pub fn message_id(&self) -> Option<MessageId> {
        self.0
            .get(MESSAGE_ID_FIELD)
            .and_then(Value::as_u64)
            .map(MessageId::new)
    }

    /// Returns a field by name.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns all fields.
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Overwrites `messageId`.
    pub(crate) fn set_message_id(&mut self, message_id: MessageId) {
        self.0.insert(
            MESSAGE_ID_FIELD.to_string(),
            Value::from(message_id.as_u64()),
        );
    }
}

impl From<Map<String, Value>> for DebuggerMessage {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for DebuggerMessage {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(Error::invalid_message(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }
}

// ============================================================================
// ParsedMessage
// ============================================================================

/// A message received from a running game, after JSON parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    /// The full parsed payload.
    payload: Value,
}

impl ParsedMessage {
    /// Parses the raw payload of a message event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `data` is not valid JSON.
    pub fn parse(data: &str) -> Result<Self> {
        let payload = serde_json::from_str(data)?;
        Ok(Self { payload })
    }

    /// Returns the command name, if any.
    #[inline]
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.payload.get(COMMAND_FIELD).and_then(Value::as_str)
    }

    /// Returns the correlation id this message answers, if any.
    #[inline]
    #[must_use]
    pub fn message_id(&self) -> Option<MessageId> {
        self.payload
            .get(MESSAGE_ID_FIELD)
            .and_then(Value::as_u64)
            .map(MessageId::new)
    }

    /// Returns a field by name.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Returns the full payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consumes the message, returning the payload.
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }
}

impl From<Value> for ParsedMessage {
    fn from(payload: Value) -> Self {
        Self { payload }
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
    fn test_message_serialization() {
        let message = DebuggerMessage::new("hotReload").with("projectDataOnlyExport", true);
        let json = serde_json::to_value(&message).expect("serialize");

        assert_eq!(
            json,
            json!({ "command": "hotReload", "projectDataOnlyExport": true })
        );
    }

    #[test]
    fn test_set_message_id() {
        let mut message = DebuggerMessage::new("ping");
        assert_eq!(message.message_id(), None);

        message.set_message_id(MessageId::new(7));
        assert_eq!(message.message_id(), Some(MessageId::new(7)));
        assert_eq!(message.get("messageId"), Some(&json!(7)));
        assert_eq!(message.command(), Some("ping"));
    }

    #[test]
    fn test_try_from_non_object() {
        let result = DebuggerMessage::try_from(json!(["ping"]));
        assert!(matches!(result, Err(Error::InvalidMessage { .. })));

        let message = DebuggerMessage::try_from(json!({ "command": "pause" })).expect("object");
        assert_eq!(message.command(), Some("pause"));
    }

    #[test]
    fn test_parse_reply() {
        let parsed = ParsedMessage::parse(r#"{"messageId":1,"ok":true}"#).expect("parse");
        assert_eq!(parsed.message_id(), Some(MessageId::new(1)));
        assert_eq!(parsed.command(), None);
        assert_eq!(parsed.get("ok"), Some(&json!(true)));
    }

    #[test]
    fn test_parse_non_numeric_message_id() {
        let parsed = ParsedMessage::parse(r#"{"command":"dump","messageId":"1"}"#).expect("parse");
        assert_eq!(parsed.message_id(), None);
        assert_eq!(parsed.command(), Some("dump"));
    }

    #[test]
    fn test_parse_invalid_json() {
        let result = ParsedMessage::parse("{not json");
        assert!(matches!(result, Err(Error::Json(_))));
    }
}
