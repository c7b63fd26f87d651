//! Debugger server options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use preview_debugger::ServerOptions;
//!
//! let options = ServerOptions::new()
//!     .with_poll_interval(Duration::from_millis(500))
//!     .with_response_timeout(Duration::from_secs(5));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::transport::DEFAULT_POLL_INTERVAL;

// ============================================================================
// Constants
// ============================================================================

/// Default time to wait for a reply to `send_message_with_response`.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default maximum number of requests awaiting a reply.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// ServerOptions
// ============================================================================

/// Tunables of a [`DebuggerServer`](super::DebuggerServer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Delay between two probes of detached windows.
    pub poll_interval: Duration,

    /// Reply timeout used when a request does not specify one.
    pub response_timeout: Duration,

    /// Maximum number of requests awaiting a reply at once.
    pub max_pending_requests: usize,
}

// ============================================================================
// Constructors
// ============================================================================

impl ServerOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ServerOptions {
    /// Sets the window probe interval.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the default reply timeout.
    #[inline]
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Sets the pending request cap.
    #[inline]
    #[must_use]
    pub fn with_max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = max;
        self
    }
}

// ============================================================================
// StartOptions
// ============================================================================

/// Arguments of [`DebuggerServer::start`](super::DebuggerServer::start).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    /// URL (or bare origin) previews are served from.
    pub origin: String,
}

impl StartOptions {
    /// Creates start options for previews served from `origin`.
    #[inline]
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ServerOptions::default();
        assert_eq!(options.poll_interval, Duration::from_millis(1000));
        assert_eq!(options.response_timeout, Duration::from_millis(1000));
        assert_eq!(options.max_pending_requests, 100);
        assert_eq!(options, ServerOptions::new());
    }

    #[test]
    fn test_builder_chain() {
        let options = ServerOptions::new()
            .with_poll_interval(Duration::from_millis(250))
            .with_response_timeout(Duration::from_secs(3))
            .with_max_pending_requests(8);

        assert_eq!(options.poll_interval, Duration::from_millis(250));
        assert_eq!(options.response_timeout, Duration::from_secs(3));
        assert_eq!(options.max_pending_requests, 8);
    }

    #[test]
    fn test_start_options() {
        let start = StartOptions::new("https://game-previews.example.com");
        assert_eq!(start.origin, "https://game-previews.example.com");
    }
}
