//! Handles to live game previews.
//!
//! A [`PreviewHandle`] is whatever the host uses to reach one running game:
//! a detached window or the embedded frame. The server never inspects the
//! handle beyond this trait and compares handles by identity through
//! [`HandleRef`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::Result;

// ============================================================================
// PreviewHandle
// ============================================================================

/// Transport endpoint of one running game preview.
///
/// Implemented by the host. All methods may be called from any task.
pub trait PreviewHandle: Send + Sync {
    /// Posts a serialized message to the preview, restricted to
    /// `target_origin`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) if the preview
    /// cannot be reached.
    fn post_message(&self, data: &str, target_origin: &str) -> Result<()>;

    /// Returns `true` once the preview was closed by the user or the OS.
    ///
    /// Only detached windows are probed.
    ///
    /// # Errors
    ///
    /// Returns an error if the liveness state cannot be read.
    fn is_closed(&self) -> Result<bool>;

    /// Asks the preview to close.
    ///
    /// # Errors
    ///
    /// Returns an error if the preview refuses or is already gone.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// HandleRef
// ============================================================================

/// Shared reference to a [`PreviewHandle`], compared by identity.
///
/// Two `HandleRef`s are equal only if they point to the same handle object,
/// never because two handles look alike.
#[derive(Clone)]
pub struct HandleRef(Arc<dyn PreviewHandle>);

impl HandleRef {
    /// Wraps a handle.
    #[inline]
    #[must_use]
    pub fn new(handle: impl PreviewHandle + 'static) -> Self {
        Self(Arc::new(handle))
    }

    /// Wraps an already shared handle.
    #[inline]
    #[must_use]
    pub fn from_arc(handle: Arc<dyn PreviewHandle>) -> Self {
        Self(handle)
    }

    /// Returns `true` if both references point to the same handle.
    #[inline]
    #[must_use]
    pub fn same(&self, other: &HandleRef) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl Deref for HandleRef {
    type Target = dyn PreviewHandle;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for HandleRef {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for HandleRef {}

impl fmt::Debug for HandleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandleRef")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

impl<T: PreviewHandle + 'static> From<Arc<T>> for HandleRef {
    fn from(handle: Arc<T>) -> Self {
        Self(handle)
    }
}

// ============================================================================
// Tests
// ============================================================================
