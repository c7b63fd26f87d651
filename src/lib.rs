//! Preview Debugger - IDE-side debugger server for live game previews.
//!
//! This library lets an IDE talk to running game previews, whether they run
//! in separate windows or in a frame embedded in the editor. It keeps track
//! of which previews are alive, sends them commands, correlates their
//! replies, and tells subscribers when previews come and go.
//!
//! # Architecture
//!
//! The server follows a host/preview model:
//!
//! - **Host (Rust)**: Owns the [`DebuggerServer`], posts JSON commands
//! - **Preview (game)**: Executes commands, posts JSON messages back
//!
//! Key design principles:
//!
//! - One [`DebuggerServer`] per IDE session, passed explicitly
//! - Previews are opaque [`PreviewHandle`]s compared by identity
//! - Every message is a JSON object with a `command` field
//! - Requests carry a `messageId`; the first echo wins
//! - Closed windows are detected by a pluggable [`ConnectionWatcher`]
//!
//! # Quick Start
//!
//! ```no_run
//! use preview_debugger::{DebuggerMessage, DebuggerServer, LocalHandle, Result, StartOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = DebuggerServer::builder().build()?;
//!     server
//!         .start(StartOptions::new("https://game-previews.example.com"))
//!         .await?;
//!
//!     // Register a preview window opened by the host
//!     let (window, _posted) = LocalHandle::channel();
//!     let id = server.register_new_preview_window(window.handle_ref());
//!
//!     // Fire-and-forget command
//!     server.send_message(&id, &DebuggerMessage::new("pause"))?;
//!
//!     // Request expecting a reply
//!     let status = server
//!         .send_message_with_response(DebuggerMessage::new("getStatus"), None)
//!         .await;
//!     println!("{status:?}");
//!
//!     server.close_all_connections();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Message and event types |
//! | [`server`] | Debugger server, configuration, callbacks |
//! | [`transport`] | Handles, registry, correlation, watcher |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for debugger entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Debugger protocol message types.
pub mod protocol;

/// Debugger server facade.
///
/// Use [`DebuggerServer::builder()`] to create a configured server instance.
pub mod server;

/// Preview transport layer.
///
/// Handles, connection registry, request correlation and window watching.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{DebuggerId, MessageId, SubscriptionId};

// Protocol types
pub use protocol::{
    ConnectionErroredEvent, ConnectionEvent, DebuggerMessage, MessageEvent, ParsedMessage,
    ParsedMessageEvent,
};

// Server types
pub use server::{
    DebuggerCallbacks, DebuggerServer, MessageEvents, ServerBuilder, ServerOptions, ServerState,
    StartOptions, Subscription,
};

// Transport types
pub use transport::{
    ConnectionWatcher, HandleRef, LocalHandle, PollingWatcher, PostedMessage, PreviewHandle,
    WatchTarget,
};
