//! Type-safe identifiers for debugger entities.
//!
//! Newtype wrappers keep connection ids, correlation ids and subscription
//! ids from being mixed up.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Id of the (single) embedded game frame.
const EMBEDDED_FRAME_ID: &str = "embedded-game-frame";

/// Prefix of ids allocated to detached preview windows.
const PREVIEW_WINDOW_PREFIX: &str = "preview-window-";

// ============================================================================
// DebuggerId
// ============================================================================

/// Identifies one live game instance connected to the debugger.
///
/// Either the fixed embedded-frame id or `preview-window-<n>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebuggerId(String);

impl DebuggerId {
    /// Returns the id used for the embedded game frame.
    #[inline]
    #[must_use]
    pub fn embedded_frame() -> Self {
        Self(EMBEDDED_FRAME_ID.to_string())
    }

    /// Returns the id of the `index`-th preview window.
    #[inline]
    #[must_use]
    pub fn preview_window(index: u64) -> Self {
        Self(format!("{PREVIEW_WINDOW_PREFIX}{index}"))
    }

    /// Returns `true` for the embedded game frame id.
    #[inline]
    #[must_use]
    pub fn is_embedded_frame(&self) -> bool {
        self.0 == EMBEDDED_FRAME_ID
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DebuggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DebuggerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ============================================================================
// MessageId
// ============================================================================

/// Correlation id carried as `messageId` by requests expecting a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Wraps a raw message id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Identifies one callback registration on the notification bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[inline]
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
