//! Debugger server and configuration.
//!
//! The [`DebuggerServer`] is the entry point of the crate. It tracks every
//! connected preview, routes messages to and from them, and notifies
//! subscribers about what happens.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use preview_debugger::{DebuggerServer, StartOptions};
//!
//! let server = DebuggerServer::builder().build()?;
//! let subscription = server.register_callbacks(Arc::new(MyPanel::default()));
//!
//! server
//!     .start(StartOptions::new("https://game-previews.example.com"))
//!     .await?;
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent server configuration |
//! | `callbacks` | Subscriber trait and notification bus |
//! | `core` | The server facade |
//! | `options` | Tunables and start arguments |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent server configuration.
pub mod builder;

/// Subscriber trait and notification bus.
pub mod callbacks;

/// The server facade.
pub mod core;

/// Server tunables.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ServerBuilder;
pub use callbacks::{CallbackBus, DebuggerCallbacks, Subscription};
pub use core::{DebuggerServer, MessageEvents, ServerState};
pub use options::{
    DEFAULT_MAX_PENDING_REQUESTS, DEFAULT_RESPONSE_TIMEOUT, ServerOptions, StartOptions,
};
