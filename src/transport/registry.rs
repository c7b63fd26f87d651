//! Registry of live preview connections.
//!
//! Holds at most one embedded game frame and any number of detached preview
//! windows, each keyed by a [`DebuggerId`].
//!
//! # Layout
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          ConnectionRegistry             │
//! │  embedded-game-frame → frame handle     │
//! │  preview-window-0    → window handle    │
//! │  preview-window-1    → window handle    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The registry is plain data; the server wraps it in a lock.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, info, warn};

use crate::identifiers::DebuggerId;

use super::handle::HandleRef;

// ============================================================================
// EmbeddedFrameRegistration
// ============================================================================

/// Outcome of [`ConnectionRegistry::register_embedded_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedFrameRegistration {
    /// The same frame was already registered.
    Unchanged,
    /// The slot was empty and now holds the frame.
    Registered,
    /// A different frame was silently replaced.
    Replaced,
}

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Known preview endpoints.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// The embedded game frame, if attached.
    embedded_frame: Option<HandleRef>,

    /// Detached windows in registration order.
    windows: Vec<(DebuggerId, HandleRef)>,

    /// Index used for the next window id.
    next_window_index: u64,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a detached preview window.
    ///
    /// Returns the window's id and whether it was newly added. Registering a
    /// handle twice returns the id it already has.
    pub fn register_window(&mut self, handle: HandleRef) -> (DebuggerId, bool) {
        if let Some((id, _)) = self.windows.iter().find(|(_, known)| known.same(&handle)) {
            warn!(id = %id, "Preview window registered twice, keeping existing id");
            return (id.clone(), false);
        }

        let id = DebuggerId::preview_window(self.next_window_index);
        self.next_window_index += 1;
        self.windows.push((id.clone(), handle));

        debug!(id = %id, window_count = self.windows.len(), "Preview window registered");
        (id, true)
    }

    /// Registers the embedded game frame. Last registration wins.
    pub fn register_embedded_frame(&mut self, handle: HandleRef) -> EmbeddedFrameRegistration {
        match &self.embedded_frame {
            Some(current) if current.same(&handle) => EmbeddedFrameRegistration::Unchanged,
            Some(_) => {
                warn!("Replacing a different embedded game frame without closing it");
                self.embedded_frame = Some(handle);
                EmbeddedFrameRegistration::Replaced
            }
            None => {
                info!("Embedded game frame registered");
                self.embedded_frame = Some(handle);
                EmbeddedFrameRegistration::Registered
            }
        }
    }

    /// Clears the embedded frame slot if it holds `handle`.
    ///
    /// Returns `true` if the slot was cleared.
    pub fn unregister_embedded_frame(&mut self, handle: &HandleRef) -> bool {
        match &self.embedded_frame {
            Some(current) if current.same(handle) => {
                self.embedded_frame = None;
                info!("Embedded game frame unregistered");
                true
            }
            Some(_) => {
                warn!("Ignoring unregistration of an embedded frame that is not the current one");
                false
            }
            None => {
                warn!("Ignoring unregistration of an embedded frame, none is registered");
                false
            }
        }
    }

    /// Removes the endpoint `id`, returning its handle if it existed.
    pub fn remove(&mut self, id: &DebuggerId) -> Option<HandleRef> {
        if id.is_embedded_frame() {
            return self.embedded_frame.take();
        }

        let position = self.windows.iter().position(|(known, _)| known == id)?;
        let (_, handle) = self.windows.remove(position);
        Some(handle)
    }

    /// Returns every known id: the embedded frame first, then windows in
    /// registration order.
    #[must_use]
    pub fn list(&self) -> Vec<DebuggerId> {
        self.embedded_frame
            .as_ref()
            .map(|_| DebuggerId::embedded_frame())
            .into_iter()
            .chain(self.windows.iter().map(|(id, _)| id.clone()))
            .collect()
    }

    /// Finds the id a handle is registered under.
    #[must_use]
    pub fn find_id_by_handle(&self, handle: &HandleRef) -> Option<DebuggerId> {
        if self
            .embedded_frame
            .as_ref()
            .is_some_and(|frame| frame.same(handle))
        {
            return Some(DebuggerId::embedded_frame());
        }

        self.windows
            .iter()
            .find(|(_, known)| known.same(handle))
            .map(|(id, _)| id.clone())
    }

    /// Returns the handle registered under `id`.
    #[must_use]
    pub fn handle(&self, id: &DebuggerId) -> Option<HandleRef> {
        if id.is_embedded_frame() {
            return self.embedded_frame.clone();
        }

        self.windows
            .iter()
            .find(|(known, _)| known == id)
            .map(|(_, handle)| handle.clone())
    }

    /// Returns a snapshot of all window endpoints.
    #[must_use]
    pub fn windows(&self) -> Vec<(DebuggerId, HandleRef)> {
        self.windows.clone()
    }

    /// Returns a snapshot of every endpoint, embedded frame first.
    #[must_use]
    pub fn endpoints(&self) -> Vec<(DebuggerId, HandleRef)> {
        self.embedded_frame
            .as_ref()
            .map(|frame| (DebuggerId::embedded_frame(), frame.clone()))
            .into_iter()
            .chain(self.windows.iter().cloned())
            .collect()
    }

    /// Returns `true` if `id` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &DebuggerId) -> bool {
        self.handle(id).is_some()
    }

    /// Returns the number of registered windows.
    #[inline]
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Returns the number of registered endpoints.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len() + usize::from(self.embedded_frame.is_some())
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
