//! Request/response correlation.
//!
//! Requests expecting a reply get a fresh [`MessageId`]. The first inbound
//! message echoing that id settles the request; anything arriving later
//! for the same id is ignored.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;

// ============================================================================
// Types
// ============================================================================

/// Map of message IDs to reply channels.
type CorrelationMap = FxHashMap<MessageId, oneshot::Sender<Result<Value>>>;

// ============================================================================
// PendingRequests
// ============================================================================

/// Requests waiting for a reply.
#[derive(Debug)]
pub struct PendingRequests {
    /// Next id to hand out. Ids start at 1 and are never reused.
    next_id: AtomicU64,
    /// Pending reply channels.
    pending: Mutex<CorrelationMap>,
    /// Maximum number of simultaneously pending requests.
    max_pending: usize,
}

impl PendingRequests {
    /// Creates an empty set accepting at most `max_pending` requests.
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(CorrelationMap::default()),
            max_pending,
        }
    }

    /// Allocates a message id and registers a reply channel for it.
    ///
    /// The returned guard removes the entry when dropped, so a request
    /// abandoned by its caller does not linger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if too many requests are pending.
    pub fn register(&self) -> Result<PendingReply<'_>> {
        let mut pending = self.pending.lock();
        if pending.len() >= self.max_pending {
            warn!(
                pending = pending.len(),
                max = self.max_pending,
                "Too many pending requests"
            );
            return Err(Error::protocol(format!(
                "Too many pending requests: {}/{}",
                pending.len(),
                self.max_pending
            )));
        }

        let message_id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        pending.insert(message_id, tx);

        trace!(%message_id, "Pending request registered");

        Ok(PendingReply {
            message_id,
            rx: Some(rx),
            owner: self,
        })
    }

    /// Settles the request `message_id` with `reply`.
    ///
    /// Returns `false` if no such request is pending (already settled,
    /// timed out, or never issued).
    pub fn resolve(&self, message_id: MessageId, reply: Value) -> bool {
        let Some(tx) = self.pending.lock().remove(&message_id) else {
            return false;
        };

        if tx.send(Ok(reply)).is_err() {
            debug!(%message_id, "Reply arrived after the caller stopped waiting");
        }
        true
    }

    /// Drops the entry for `message_id` without settling it.
    pub fn remove(&self, message_id: MessageId) -> bool {
        self.pending.lock().remove(&message_id).is_some()
    }

    /// Rejects every pending request with the error built by `reason`.
    ///
    /// Returns how many requests were rejected.
    pub fn reject_all(&self, reason: impl Fn() -> Error) -> usize {
        let pending: Vec<_> = self.pending.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(reason()));
        }

        if count > 0 {
            debug!(count, "Rejected pending requests");
        }
        count
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// PendingReply
// ============================================================================

/// A registered request awaiting its reply.
#[derive(Debug)]
pub struct PendingReply<'a> {
    /// Id the reply must carry.
    message_id: MessageId,
    /// Reply channel, taken by `recv`.
    rx: Option<oneshot::Receiver<Result<Value>>>,
    /// Set the entry lives in.
    owner: &'a PendingRequests,
}

impl PendingReply<'_> {
    /// Returns the id the reply must carry.
    #[inline]
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Waits for the reply.
    ///
    /// # Errors
    ///
    /// - The rejection reason if the request was rejected
    /// - [`Error::ChannelClosed`] if the entry was dropped unsettled
    pub async fn recv(&mut self) -> Result<Value> {
        match self.rx.as_mut() {
            Some(rx) => {
                let result = rx.await;
                self.rx = None;
                result?
            }
            None => Err(Error::protocol(format!(
                "Reply for messageId {} already consumed",
                self.message_id
            ))),
        }
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        if self.owner.remove(self.message_id) {
            trace!(message_id = %self.message_id, "Abandoned pending request removed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
