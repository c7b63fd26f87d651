//! In-process preview handle.
//!
//! [`LocalHandle`] delivers posted messages to a tokio channel instead of a
//! browser window. It backs game instances running in the same process and
//! is what tests and benches use to stand in for real previews.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};

use super::handle::{HandleRef, PreviewHandle};

// ============================================================================
// PostedMessage
// ============================================================================

/// A message posted to a [`LocalHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    /// Serialized JSON payload.
    pub data: String,
    /// Origin the sender restricted delivery to.
    pub target_origin: String,
}

// ============================================================================
// LocalHandle
// ============================================================================

/// Channel-backed [`PreviewHandle`].
#[derive(Debug)]
pub struct LocalHandle {
    /// Delivery channel.
    tx: mpsc::UnboundedSender<PostedMessage>,
    /// Set by `close` or `mark_closed`.
    closed: AtomicBool,
}

impl LocalHandle {
    /// Creates a handle and the receiver its posted messages arrive on.
    #[must_use]
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<PostedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(Self {
            tx,
            closed: AtomicBool::new(false),
        });
        (handle, rx)
    }

    /// Returns a [`HandleRef`] pointing at this handle.
    #[inline]
    #[must_use]
    pub fn handle_ref(self: &Arc<Self>) -> HandleRef {
        HandleRef::from(Arc::clone(self))
    }

    /// Marks the preview as closed, as if the user closed its window.
    #[inline]
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl PreviewHandle for LocalHandle {
    fn post_message(&self, data: &str, target_origin: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::transport("preview is closed"));
        }

        self.tx
            .send(PostedMessage {
                data: data.to_string(),
                target_origin: target_origin.to_string(),
            })
            .map_err(|_| Error::transport("preview receiver dropped"))?;

        trace!(len = data.len(), "Message posted to local preview");
        Ok(())
    }

    fn is_closed(&self) -> Result<bool> {
        Ok(self.closed.load(Ordering::SeqCst) || self.tx.is_closed())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::transport("preview already closed"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
