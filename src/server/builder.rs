//! Builder pattern for server configuration.
//!
//! Provides a fluent API for configuring and creating [`DebuggerServer`]
//! instances.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use preview_debugger::DebuggerServer;
//!
//! let server = DebuggerServer::builder()
//!     .response_timeout(Duration::from_secs(2))
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{ConnectionWatcher, PollingWatcher};

use super::core::DebuggerServer;
use super::options::ServerOptions;

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for configuring a [`DebuggerServer`] instance.
///
/// Use [`DebuggerServer::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ServerBuilder {
    /// Server options.
    options: ServerOptions,
    /// Custom closed-window detection.
    watcher: Option<Arc<dyn ConnectionWatcher>>,
}

// ============================================================================
// ServerBuilder Implementation
// ============================================================================

impl ServerBuilder {
    /// Creates a new builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the window probe interval of the default watcher.
    #[inline]
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    /// Sets the default reply timeout.
    #[inline]
    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.options.response_timeout = timeout;
        self
    }

    /// Sets the pending request cap.
    #[inline]
    #[must_use]
    pub fn max_pending_requests(mut self, max: usize) -> Self {
        self.options.max_pending_requests = max;
        self
    }

    /// Uses a custom watcher instead of polling.
    ///
    /// The poll interval is ignored when a custom watcher is set.
    #[inline]
    #[must_use]
    pub fn watcher(mut self, watcher: Arc<dyn ConnectionWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Builds the server with validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a duration or the pending cap is zero.
    pub fn build(self) -> Result<DebuggerServer> {
        self.validate()?;

        let watcher = self
            .watcher
            .unwrap_or_else(|| Arc::new(PollingWatcher::new(self.options.poll_interval)));

        Ok(DebuggerServer::new(self.options, watcher))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ServerBuilder {
    /// Validates the options.
    fn validate(&self) -> Result<()> {
        if self.options.poll_interval.is_zero() && self.watcher.is_none() {
            return Err(Error::config("Poll interval must be greater than zero"));
        }

        if self.options.response_timeout.is_zero() {
            return Err(Error::config("Response timeout must be greater than zero"));
        }

        if self.options.max_pending_requests == 0 {
            return Err(Error::config(
                "Maximum pending requests must be greater than zero",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
