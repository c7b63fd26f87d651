//! Callback notification bus.
//!
//! Any number of independent listeners (debugger panels, hot-reload
//! coordinators, in-game editors) subscribe to connection lifecycle events
//! and inbound messages. Each subscriber implements [`DebuggerCallbacks`]
//! and overrides only the events it cares about.
//!
//! # Example
//!
//! ```ignore
//! use preview_debugger::{ConnectionEvent, DebuggerCallbacks};
//!
//! struct Logger;
//!
//! impl DebuggerCallbacks for Logger {
//!     fn on_connection_closed(&self, event: &ConnectionEvent) {
//!         println!("{} left, {} remain", event.id, event.debugger_ids.len());
//!     }
//! }
//!
//! let subscription = server.register_callbacks(Arc::new(Logger));
//! // ...
//! subscription.unsubscribe();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::Error;
use crate::identifiers::SubscriptionId;
use crate::protocol::{ConnectionErroredEvent, ConnectionEvent, ParsedMessageEvent};

// ============================================================================
// Types
// ============================================================================

/// Ordered subscriber list.
type SubscriberList = Vec<(SubscriptionId, Arc<dyn DebuggerCallbacks>)>;

// ============================================================================
// DebuggerCallbacks
// ============================================================================

/// Listener for debugger server events.
///
/// Every method defaults to doing nothing.
pub trait DebuggerCallbacks: Send + Sync {
    /// A preview connected.
    fn on_connection_opened(&self, _event: &ConnectionEvent) {}

    /// A preview disconnected.
    fn on_connection_closed(&self, _event: &ConnectionEvent) {}

    /// Posting to a preview failed.
    fn on_connection_errored(&self, _event: &ConnectionErroredEvent) {}

    /// The server started.
    fn on_server_state_changed(&self) {}

    /// A preview sent a message.
    fn on_handle_parsed_message(&self, _event: &ParsedMessageEvent) {}

    /// An inbound message could not be processed.
    fn on_error_received(&self, _error: &Error) {}
}

// ============================================================================
// CallbackBus
// ============================================================================

/// Fans events out to every subscriber, in subscription order.
#[derive(Default)]
pub struct CallbackBus {
    /// Current subscribers.
    subscribers: Arc<Mutex<SubscriberList>>,
    /// Next subscription id.
    next_id: AtomicU64,
}

impl CallbackBus {
    /// Creates a bus with no subscribers.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber. The same callbacks may be subscribed several times.
    pub fn subscribe(&self, callbacks: Arc<dyn DebuggerCallbacks>) -> Subscription {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.lock().push((id, callbacks));

        debug!(subscription = %id, "Callbacks registered");

        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Returns the number of subscribers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Returns `true` if nobody is subscribed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes `notify` on every subscriber.
    ///
    /// Subscribers added or removed while emitting take effect for the next
    /// event. A panicking subscriber is logged and skipped.
    pub fn emit(&self, event: &'static str, notify: impl Fn(&dyn DebuggerCallbacks)) {
        let subscribers: Vec<_> = self.subscribers.lock().clone();

        for (id, callbacks) in subscribers {
            let outcome = catch_unwind(AssertUnwindSafe(|| notify(callbacks.as_ref())));
            if outcome.is_err() {
                warn!(subscription = %id, event, "Debugger callback panicked");
            }
        }
    }

    /// Emits `on_connection_opened`.
    pub fn connection_opened(&self, event: &ConnectionEvent) {
        self.emit("connection_opened", |callbacks| {
            callbacks.on_connection_opened(event)
        });
    }

    /// Emits `on_connection_closed`.
    pub fn connection_closed(&self, event: &ConnectionEvent) {
        self.emit("connection_closed", |callbacks| {
            callbacks.on_connection_closed(event)
        });
    }

    /// Emits `on_connection_errored`.
    pub fn connection_errored(&self, event: &ConnectionErroredEvent) {
        self.emit("connection_errored", |callbacks| {
            callbacks.on_connection_errored(event)
        });
    }

    /// Emits `on_server_state_changed`.
    pub fn server_state_changed(&self) {
        self.emit("server_state_changed", |callbacks| {
            callbacks.on_server_state_changed()
        });
    }

    /// Emits `on_handle_parsed_message`.
    pub fn parsed_message(&self, event: &ParsedMessageEvent) {
        self.emit("handle_parsed_message", |callbacks| {
            callbacks.on_handle_parsed_message(event)
        });
    }

    /// Emits `on_error_received`.
    pub fn error_received(&self, error: &Error) {
        self.emit("error_received", |callbacks| {
            callbacks.on_error_received(error)
        });
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle returned by [`CallbackBus::subscribe`].
///
/// Dropping it keeps the subscription alive; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Registration to remove.
    id: SubscriptionId,
    /// Bus the registration lives in.
    subscribers: Weak<Mutex<SubscriberList>>,
}

impl Subscription {
    /// Returns the subscription id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes this registration. Further calls do nothing.
    pub fn unsubscribe(&self) {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return;
        };

        let mut subscribers = subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(id, _)| *id != self.id);

        if subscribers.len() != before {
            debug!(subscription = %self.id, "Callbacks unregistered");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::DebuggerId;

    #[derive(Default)]
    struct Recorder {
        opened: Mutex<Vec<DebuggerId>>,
        state_changes: AtomicU64,
    }

    impl DebuggerCallbacks for Recorder {
        fn on_connection_opened(&self, event: &ConnectionEvent) {
            self.opened.lock().push(event.id.clone());
        }

        fn on_server_state_changed(&self) {
            self.state_changes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicker;

    impl DebuggerCallbacks for Panicker {
        fn on_connection_opened(&self, _event: &ConnectionEvent) {
            panic!("subscriber failure");
        }
    }

    fn opened(id: DebuggerId) -> ConnectionEvent {
        ConnectionEvent {
            debugger_ids: vec![id.clone()],
            id,
        }
    }

    #[test]
    fn test_emit_reaches_every_subscriber() {
        let bus = CallbackBus::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        bus.subscribe(first.clone());
        bus.subscribe(second.clone());

        bus.connection_opened(&opened(DebuggerId::preview_window(0)));

        assert_eq!(first.opened.lock().len(), 1);
        assert_eq!(second.opened.lock().len(), 1);
    }

    #[test]
    fn test_duplicates_are_allowed() {
        let bus = CallbackBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.subscribe(recorder.clone());
        bus.subscribe(recorder.clone());

        bus.server_state_changed();
        assert_eq!(recorder.state_changes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_registration() {
        let bus = CallbackBus::new();
        let recorder = Arc::new(Recorder::default());
        let first = bus.subscribe(recorder.clone());
        let _second = bus.subscribe(recorder.clone());

        first.unsubscribe();
        first.unsubscribe();
        assert_eq!(bus.len(), 1);

        bus.server_state_changed();
        assert_eq!(recorder.state_changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let bus = CallbackBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.subscribe(Arc::new(Panicker));
        bus.subscribe(recorder.clone());

        bus.connection_opened(&opened(DebuggerId::embedded_frame()));

        assert_eq!(
            *recorder.opened.lock(),
            vec![DebuggerId::embedded_frame()]
        );
    }

    #[test]
    fn test_unsubscribe_after_bus_dropped() {
        let bus = CallbackBus::new();
        let subscription = bus.subscribe(Arc::new(Recorder::default()));
        drop(bus);

        subscription.unsubscribe();
    }
}
