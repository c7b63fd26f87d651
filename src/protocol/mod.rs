//! Debugger protocol message types.
//!
//! This module defines the messages exchanged between the IDE (Rust) and
//! running game previews, and the event payloads handed to callbacks.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `DebuggerMessage` | IDE → Game | Command, optionally expecting a reply |
//! | `MessageEvent` | Game → IDE | Raw inbound message (origin, source, JSON) |
//! | `ParsedMessage` | Game → IDE | Parsed inbound payload |
//!
//! Every message is a JSON object with a `command` field. Requests expecting
//! a reply also carry a numeric `messageId`, which the game echoes back.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Inbound events and callback payloads |
//! | `message` | Outbound and parsed messages |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound events and callback payloads.
pub mod event;

/// Outbound and parsed message types.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{ConnectionErroredEvent, ConnectionEvent, MessageEvent, ParsedMessageEvent};
pub use message::{COMMAND_FIELD, DebuggerMessage, MESSAGE_ID_FIELD, ParsedMessage};
