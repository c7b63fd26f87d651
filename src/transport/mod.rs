//! Preview transport layer.
//!
//! This module handles the channel between the IDE (Rust) and running game
//! previews: who is connected, how messages reach them, how replies are
//! correlated, and how closed windows are noticed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌──────────────────┐
//! │  DebuggerServer      │      post_message       │  Preview window  │
//! │                      │────────────────────────►│  (game)          │
//! │  ConnectionRegistry  │                         │                  │
//! │  MessageTransport    │◄────────────────────────│                  │
//! │  PendingRequests     │      MessageEvent       └──────────────────┘
//! │  ConnectionWatcher   │
//! └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | Origin filtering, JSON encoding, posting |
//! | `correlation` | Request/response correlation by `messageId` |
//! | `handle` | `PreviewHandle` trait and identity-compared `HandleRef` |
//! | `local` | In-process, channel-backed preview handle |
//! | `registry` | Known windows and the embedded frame |
//! | `watcher` | Closed-window detection |

// ============================================================================
// Submodules
// ============================================================================

/// Origin-checked message channel.
pub mod channel;

/// Request/response correlation.
pub mod correlation;

/// Preview handle abstraction.
pub mod handle;

/// In-process preview handle.
pub mod local;

/// Registry of live connections.
pub mod registry;

/// Closed-window detection.
pub mod watcher;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{MessageTransport, Origin};
pub use correlation::{PendingReply, PendingRequests};
pub use handle::{HandleRef, PreviewHandle};
pub use local::{LocalHandle, PostedMessage};
pub use registry::{ConnectionRegistry, EmbeddedFrameRegistration};
pub use watcher::{ConnectionWatcher, DEFAULT_POLL_INTERVAL, PollingWatcher, WatchTarget};
