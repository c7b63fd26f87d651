//! Origin-checked message channel.
//!
//! [`MessageTransport`] is the single point of entry and exit for the wire
//! protocol: it remembers the origin previews are served from, filters
//! inbound events against it, and encodes and posts outbound messages.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use parking_lot::RwLock;
use serde_json::to_string;
use tracing::trace;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{DebuggerMessage, MessageEvent, ParsedMessage};

use super::handle::HandleRef;

// ============================================================================
// Origin
// ============================================================================

/// A serialized tuple origin, e.g. `https://game-previews.example.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin(String);

impl Origin {
    /// Parses an origin from an absolute URL.
    ///
    /// Paths, queries and fragments are dropped; default ports are elided.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrigin`] if `input` is not an absolute URL
    /// or has an opaque origin (e.g. `data:` URLs).
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input).map_err(|e| Error::invalid_origin(input, e.to_string()))?;

        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(Error::invalid_origin(input, "opaque origin"));
        }

        Ok(Self(origin.ascii_serialization()))
    }

    /// Returns the serialized origin.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// MessageTransport
// ============================================================================

/// Encodes, filters and posts debugger messages.
#[derive(Debug, Default)]
pub struct MessageTransport {
    /// Origin previews are served from. Set once the server starts.
    origin: RwLock<Option<Origin>>,
}

impl MessageTransport {
    /// Creates a transport with no origin yet.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers the preview origin.
    pub fn set_origin(&self, origin: Origin) {
        *self.origin.write() = Some(origin);
    }

    /// Returns the remembered origin.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<Origin> {
        self.origin.read().clone()
    }

    /// Returns `true` if `event` comes from the remembered origin.
    #[must_use]
    pub fn accepts(&self, event: &MessageEvent) -> bool {
        self.origin
            .read()
            .as_ref()
            .is_some_and(|origin| origin.as_str() == event.origin)
    }

    /// Parses the payload of an accepted event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload is not valid JSON.
    pub fn decode(&self, event: &MessageEvent) -> Result<ParsedMessage> {
        ParsedMessage::parse(&event.data)
    }

    /// Serializes an outbound message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self, message: &DebuggerMessage) -> Result<String> {
        Ok(to_string(message)?)
    }

    /// Posts an encoded message to `handle`, targeting the remembered origin.
    ///
    /// # Errors
    ///
    /// - [`Error::ServerNotStarted`] if no origin is set
    /// - Whatever the handle reports if posting fails
    pub fn post(&self, handle: &HandleRef, data: &str) -> Result<()> {
        let origin = self.origin().ok_or(Error::ServerNotStarted)?;
        handle.post_message(data, origin.as_str())?;
        trace!(%origin, len = data.len(), "Message posted");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
