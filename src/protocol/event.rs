//! Event types.
//!
//! [`MessageEvent`] is what the host delivers for every cross-window message
//! it receives. The remaining types are payloads handed to
//! [`DebuggerCallbacks`](crate::server::DebuggerCallbacks).

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::DebuggerId;
use crate::transport::HandleRef;

use super::ParsedMessage;

// ============================================================================
// MessageEvent
// ============================================================================

/// A raw inbound message, as seen by the host's message listener.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Serialized origin of the sender (`scheme://host[:port]`).
    pub origin: String,

    /// Handle of the sending window, if the host could identify it.
    pub source: Option<HandleRef>,

    /// JSON payload.
    pub data: String,
}

impl MessageEvent {
    /// Creates a new message event.
    #[inline]
    #[must_use]
    pub fn new(
        origin: impl Into<String>,
        source: Option<HandleRef>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            source,
            data: data.into(),
        }
    }
}

// ============================================================================
// Callback Payloads
// ============================================================================

/// A connection was opened or closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// The connection concerned.
    pub id: DebuggerId,

    /// All connections known after the change.
    pub debugger_ids: Vec<DebuggerId>,
}

/// Posting to a connection failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionErroredEvent {
    /// The connection concerned.
    pub id: DebuggerId,

    /// Description of the failure.
    pub error_message: String,
}

/// A message arrived from a known connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessageEvent {
    /// The sending connection.
    pub id: DebuggerId,

    /// The parsed payload.
    pub parsed_message: ParsedMessage,
}
