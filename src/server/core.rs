//! Debugger server facade.
//!
//! The [`DebuggerServer`] owns every piece of debugger state: the registry
//! of previews, the message transport, pending requests and subscribers.
//! One server is created per IDE session and passed to whoever needs it.
//!
//! # State Machine
//!
//! ```text
//! ┌─────────┐   start()   ┌─────────┐
//! │ Stopped │────────────►│ Started │
//! └─────────┘             └─────────┘
//! ```
//!
//! Previews may be registered in either state. Sending requires `Started`.
//! `close_all_connections` disconnects everything but leaves the server
//! started.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::DebuggerId;
use crate::protocol::{
    ConnectionErroredEvent, ConnectionEvent, DebuggerMessage, MessageEvent, ParsedMessageEvent,
};
use crate::transport::{
    ConnectionRegistry, ConnectionWatcher, EmbeddedFrameRegistration, HandleRef,
    MessageTransport, Origin, PendingRequests, WatchTarget,
};

use super::builder::ServerBuilder;
use super::callbacks::{CallbackBus, DebuggerCallbacks, Subscription};
use super::options::{ServerOptions, StartOptions};

// ============================================================================
// ServerState
// ============================================================================

/// Lifecycle state of a [`DebuggerServer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerState {
    /// `start` was not called yet.
    #[default]
    Stopped,
    /// The message listener is installed.
    Started,
}

impl ServerState {
    /// Returns `"started"` or `"stopped"`.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Started => "started",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the server.
pub(crate) struct ServerInner {
    /// Handle given to the watcher.
    this: Weak<ServerInner>,

    /// Tunables.
    options: ServerOptions,

    /// Lifecycle state.
    state: Mutex<ServerState>,

    /// Origin filter and codec.
    transport: MessageTransport,

    /// Known previews.
    registry: Mutex<ConnectionRegistry>,

    /// Requests awaiting a reply.
    pending: PendingRequests,

    /// Subscribers.
    callbacks: CallbackBus,

    /// Closed-window detection.
    watcher: Arc<dyn ConnectionWatcher>,

    /// Inbound event queue, drained by the listener task.
    events_tx: mpsc::UnboundedSender<MessageEvent>,

    /// Receiving side of the queue, taken by `start`.
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<MessageEvent>>>,
}

// ============================================================================
// DebuggerServer
// ============================================================================

/// Debugger server bridging the IDE and running game previews.
///
/// Cloning is cheap: clones share the same state.
///
/// # Example
///
/// ```ignore
/// use preview_debugger::{DebuggerMessage, DebuggerServer, StartOptions};
///
/// let server = DebuggerServer::builder().build()?;
/// server
///     .start(StartOptions::new("https://game-previews.example.com"))
///     .await?;
///
/// let id = server.register_new_preview_window(window_handle);
/// server.send_message(&id, &DebuggerMessage::new("pause"))?;
///
/// let dump = server
///     .send_message_with_response(DebuggerMessage::new("getStatus"), None)
///     .await?;
/// ```
#[derive(Clone)]
pub struct DebuggerServer {
    /// Shared inner state.
    pub(crate) inner: Arc<ServerInner>,
}

// ============================================================================
// DebuggerServer - Display
// ============================================================================

impl fmt::Debug for DebuggerServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebuggerServer")
            .field("state", &self.server_state())
            .field("connection_count", &self.connection_count())
            .field("pending_request_count", &self.pending_request_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DebuggerServer - Constructor
// ============================================================================

impl DebuggerServer {
    /// Creates a configuration builder for the server.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Creates a stopped server.
    pub(crate) fn new(options: ServerOptions, watcher: Arc<dyn ConnectionWatcher>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let inner = Arc::new_cyclic(|this| ServerInner {
            this: this.clone(),
            pending: PendingRequests::new(options.max_pending_requests),
            options,
            state: Mutex::new(ServerState::Stopped),
            transport: MessageTransport::new(),
            registry: Mutex::new(ConnectionRegistry::new()),
            callbacks: CallbackBus::new(),
            watcher,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        });

        Self { inner }
    }
}

// ============================================================================
// DebuggerServer - Lifecycle
// ============================================================================

impl DebuggerServer {
    /// Starts listening for messages from previews served from `origin`.
    ///
    /// Only the first call does anything: it installs the message listener,
    /// switches to [`ServerState::Started`] and notifies
    /// `on_server_state_changed`. Later calls return `Ok(())` untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrigin`] if `origin` is not an absolute URL.
    pub async fn start(&self, options: StartOptions) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state == ServerState::Started {
                debug!("Debugger server already started");
                return Ok(());
            }

            let origin = Origin::parse(&options.origin)?;
            let Some(events_rx) = self.inner.events_rx.lock().take() else {
                return Err(Error::protocol("Message listener already installed"));
            };

            info!(%origin, "Debugger server started");
            self.inner.transport.set_origin(origin);
            tokio::spawn(Self::listen(Arc::downgrade(&self.inner), events_rx));
            *state = ServerState::Started;
        }

        self.inner.callbacks.server_state_changed();
        Ok(())
    }

    /// Returns the lifecycle state.
    #[inline]
    #[must_use]
    pub fn server_state(&self) -> ServerState {
        *self.inner.state.lock()
    }

    /// Returns the origin given to `start`, once started.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<String> {
        self.inner.transport.origin().map(|origin| origin.to_string())
    }

    /// Returns the options the server was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ServerOptions {
        &self.inner.options
    }

    /// Returns the sender the host delivers inbound message events to.
    #[inline]
    #[must_use]
    pub fn message_events(&self) -> MessageEvents {
        MessageEvents {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Disconnects every preview.
    ///
    /// Windows are asked to close (failures are expected and ignored), the
    /// embedded frame slot is cleared, `on_connection_closed` fires once per
    /// endpoint, the watcher stops, and requests still awaiting a reply are
    /// rejected with [`Error::ServerClosing`]. The server stays started.
    pub fn close_all_connections(&self) {
        let inner = &self.inner;
        inner.watcher.stop();

        let windows = inner.registry.lock().windows();
        info!(count = windows.len(), "Closing all preview connections");

        for (id, _) in windows {
            let Some((handle, debugger_ids)) = inner.detach(&id) else {
                continue;
            };

            if let Err(e) = handle.close() {
                info!(id = %id, error = %e, "Preview window already gone while closing");
            }

            inner
                .callbacks
                .connection_closed(&ConnectionEvent { id, debugger_ids });
        }

        let frame_id = DebuggerId::embedded_frame();
        if let Some((_, debugger_ids)) = inner.detach(&frame_id) {
            debug!("Embedded game frame detached");
            inner.callbacks.connection_closed(&ConnectionEvent {
                id: frame_id,
                debugger_ids,
            });
        }

        inner.pending.reject_all(|| Error::ServerClosing);
    }

    /// Listener loop. Ends when the server is dropped.
    async fn listen(inner: Weak<ServerInner>, mut events_rx: mpsc::UnboundedReceiver<MessageEvent>) {
        while let Some(event) = events_rx.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.handle_message_event(event);
        }

        debug!("Message listener terminated");
    }
}

// ============================================================================
// DebuggerServer - Connections
// ============================================================================

impl DebuggerServer {
    /// Registers a freshly opened preview window and returns its id.
    ///
    /// Registering the same handle again returns its existing id. The first
    /// window starts the watcher.
    pub fn register_new_preview_window(&self, handle: HandleRef) -> DebuggerId {
        let (id, debugger_ids) = {
            let mut registry = self.inner.registry.lock();
            let (id, added) = registry.register_window(handle);
            (id, added.then(|| registry.list()))
        };

        if let Some(debugger_ids) = debugger_ids {
            info!(id = %id, connection_count = debugger_ids.len(), "Preview window connected");
            self.inner.callbacks.connection_opened(&ConnectionEvent {
                id: id.clone(),
                debugger_ids,
            });
        }

        self.inner.watcher.start(self.inner.watch_target());
        id
    }

    /// Attaches the embedded game frame. Last registration wins.
    ///
    /// Replacing a different frame does not send a close notification for
    /// the old one.
    pub fn register_embedded_game_frame(&self, handle: HandleRef) {
        let debugger_ids = {
            let mut registry = self.inner.registry.lock();
            match registry.register_embedded_frame(handle) {
                EmbeddedFrameRegistration::Unchanged => return,
                EmbeddedFrameRegistration::Registered | EmbeddedFrameRegistration::Replaced => {
                    registry.list()
                }
            }
        };

        self.inner.callbacks.connection_opened(&ConnectionEvent {
            id: DebuggerId::embedded_frame(),
            debugger_ids,
        });
    }

    /// Detaches the embedded game frame if `handle` is the registered one.
    pub fn unregister_embedded_game_frame(&self, handle: &HandleRef) {
        let debugger_ids = {
            let mut registry = self.inner.registry.lock();
            if !registry.unregister_embedded_frame(handle) {
                return;
            }
            registry.list()
        };

        self.inner.callbacks.connection_closed(&ConnectionEvent {
            id: DebuggerId::embedded_frame(),
            debugger_ids,
        });
    }

    /// Returns every connected id, embedded frame first.
    #[inline]
    #[must_use]
    pub fn existing_debugger_ids(&self) -> Vec<DebuggerId> {
        self.inner.registry.lock().list()
    }

    /// Returns the number of connected previews.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Returns `true` while closed windows are being watched for.
    #[inline]
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.inner.watcher.is_running()
    }
}

// ============================================================================
// DebuggerServer - Messaging
// ============================================================================

impl DebuggerServer {
    /// Sends a message to one preview.
    ///
    /// Unknown ids (for instance a window that just closed) are ignored, and
    /// delivery failures are reported through `on_connection_errored`.
    ///
    /// # Errors
    ///
    /// - [`Error::ServerNotStarted`] if `start` was not called
    /// - [`Error::Json`] if the message cannot be serialized
    pub fn send_message(&self, id: &DebuggerId, message: &DebuggerMessage) -> Result<()> {
        self.inner.ensure_started()?;

        let Some(handle) = self.inner.registry.lock().handle(id) else {
            debug!(id = %id, "Ignoring message to unknown preview");
            return Ok(());
        };

        let data = self.inner.transport.encode(message)?;
        self.inner.post(id, &handle, &data);
        Ok(())
    }

    /// Sends a message to every connected preview.
    ///
    /// Returns how many previews it was posted to.
    ///
    /// # Errors
    ///
    /// - [`Error::ServerNotStarted`] if `start` was not called
    /// - [`Error::Json`] if the message cannot be serialized
    pub fn broadcast_message(&self, message: &DebuggerMessage) -> Result<usize> {
        self.inner.ensure_started()?;
        self.inner.broadcast(message)
    }

    /// Sends a request to every connected preview and waits for a reply.
    ///
    /// The request gets a fresh `messageId`. The first inbound message
    /// echoing it settles the request; later ones are ignored. With no
    /// connected preview the request simply times out.
    ///
    /// # Arguments
    ///
    /// * `message` - Request to send
    /// * `request_timeout` - Overrides the configured response timeout
    ///
    /// # Errors
    ///
    /// - [`Error::ServerNotStarted`] if `start` was not called
    /// - [`Error::RequestTimeout`] if no reply arrives in time
    /// - [`Error::ServerClosing`] if all connections are closed meanwhile
    /// - [`Error::Protocol`] if too many requests are pending
    pub async fn send_message_with_response(
        &self,
        mut message: DebuggerMessage,
        request_timeout: Option<Duration>,
    ) -> Result<Value> {
        self.inner.ensure_started()?;
        let request_timeout = request_timeout.unwrap_or(self.inner.options.response_timeout);

        let mut reply = self.inner.pending.register()?;
        let message_id = reply.message_id();
        message.set_message_id(message_id);

        let targets = self.inner.broadcast(&message)?;
        debug!(%message_id, targets, "Request sent, awaiting reply");

        match timeout(request_timeout, reply.recv()).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = request_timeout.as_millis() as u64;
                warn!(%message_id, timeout_ms, "No reply received for request");
                Err(Error::request_timeout(message_id, timeout_ms))
            }
        }
    }

    /// Returns the number of requests awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_request_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Subscribes to server events.
    ///
    /// Call [`Subscription::unsubscribe`] to stop receiving them.
    pub fn register_callbacks(&self, callbacks: Arc<dyn DebuggerCallbacks>) -> Subscription {
        self.inner.callbacks.subscribe(callbacks)
    }
}

// ============================================================================
// ServerInner
// ============================================================================

impl ServerInner {
    /// Returns the server as a watch target.
    fn watch_target(&self) -> Weak<dyn WatchTarget> {
        let target: Weak<ServerInner> = self.this.clone();
        target
    }

    /// Fails unless the server was started.
    fn ensure_started(&self) -> Result<()> {
        match *self.state.lock() {
            ServerState::Started => Ok(()),
            ServerState::Stopped => Err(Error::ServerNotStarted),
        }
    }

    /// Encodes `message` once and posts it to every endpoint.
    fn broadcast(&self, message: &DebuggerMessage) -> Result<usize> {
        let data = self.transport.encode(message)?;
        let endpoints = self.registry.lock().endpoints();

        for (id, handle) in &endpoints {
            self.post(id, handle, &data);
        }
        Ok(endpoints.len())
    }

    /// Posts encoded data, reporting failures instead of returning them.
    fn post(&self, id: &DebuggerId, handle: &HandleRef, data: &str) {
        if let Err(e) = self.transport.post(handle, data) {
            warn!(id = %id, error = %e, "Failed to post message to preview");
            self.callbacks.connection_errored(&ConnectionErroredEvent {
                id: id.clone(),
                error_message: e.to_string(),
            });
        }
    }

    /// Removes `id`, returning its handle and the ids left afterwards.
    fn detach(&self, id: &DebuggerId) -> Option<(HandleRef, Vec<DebuggerId>)> {
        let mut registry = self.registry.lock();
        let handle = registry.remove(id)?;
        Some((handle, registry.list()))
    }

    /// Removes `id` and notifies `on_connection_closed`.
    fn remove_connection(&self, id: &DebuggerId) -> bool {
        let Some((_, debugger_ids)) = self.detach(id) else {
            return false;
        };

        info!(id = %id, connection_count = debugger_ids.len(), "Preview connection closed");
        self.callbacks.connection_closed(&ConnectionEvent {
            id: id.clone(),
            debugger_ids,
        });
        true
    }

    /// Routes one inbound event.
    fn handle_message_event(&self, event: MessageEvent) {
        if !self.transport.accepts(&event) {
            return;
        }

        let parsed_message = match self.transport.decode(&event) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Dropping unparsable message from preview");
                self.callbacks.error_received(&e);
                return;
            }
        };

        let id = event
            .source
            .as_ref()
            .and_then(|source| self.registry.lock().find_id_by_handle(source));

        let Some(id) = id else {
            trace!("Dropping message from unknown preview");
            return;
        };

        if let Some(message_id) = parsed_message.message_id()
            && self
                .pending
                .resolve(message_id, parsed_message.payload().clone())
        {
            trace!(%message_id, id = %id, "Reply matched a pending request");
        }

        self.callbacks
            .parsed_message(&ParsedMessageEvent { id, parsed_message });
    }
}

impl WatchTarget for ServerInner {
    fn poll_windows(&self) {
        let windows = self.registry.lock().windows();

        for (id, handle) in windows {
            match handle.is_closed() {
                Ok(true) => {
                    self.remove_connection(&id);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(id = %id, error = %e, "Could not probe preview window");
                }
            }
        }

        if self.registry.lock().window_count() > 0 {
            return;
        }
        self.watcher.stop();

        // A window registered between the count and the stop restarts it.
        if self.registry.lock().window_count() > 0 {
            self.watcher.start(self.watch_target());
        }
    }
}

// ============================================================================
// MessageEvents
// ============================================================================

/// Sender the host feeds inbound message events into.
///
/// Events dispatched before the server starts are dropped.
#[derive(Debug, Clone)]
pub struct MessageEvents {
    /// Server the events are for.
    inner: Weak<ServerInner>,
}

impl MessageEvents {
    /// Queues `event` for the server's listener.
    ///
    /// Returns `false` if the event was dropped because the server is not
    /// started or no longer exists.
    pub fn dispatch(&self, event: MessageEvent) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };

        if *inner.state.lock() == ServerState::Stopped {
            trace!("Dropping message received before start");
            return false;
        }
        inner.events_tx.send(event).is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::{Instant, sleep};
    use tracing_subscriber::EnvFilter;

    use crate::protocol::ParsedMessage;
    use crate::transport::{LocalHandle, PostedMessage, PreviewHandle};

    const ORIGIN: &str = "https://game-previews.example.com";

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[derive(Default)]
    struct Recorder {
        opened: Mutex<Vec<ConnectionEvent>>,
        closed: Mutex<Vec<ConnectionEvent>>,
        errored: Mutex<Vec<ConnectionErroredEvent>>,
        messages: Mutex<Vec<ParsedMessageEvent>>,
        errors: AtomicUsize,
        state_changes: AtomicUsize,
    }

    impl DebuggerCallbacks for Recorder {
        fn on_connection_opened(&self, event: &ConnectionEvent) {
            self.opened.lock().push(event.clone());
        }

        fn on_connection_closed(&self, event: &ConnectionEvent) {
            self.closed.lock().push(event.clone());
        }

        fn on_connection_errored(&self, event: &ConnectionErroredEvent) {
            self.errored.lock().push(event.clone());
        }

        fn on_server_state_changed(&self) {
            self.state_changes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_handle_parsed_message(&self, event: &ParsedMessageEvent) {
            self.messages.lock().push(event.clone());
        }

        fn on_error_received(&self, _error: &Error) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Handle with scripted liveness and a close counter.
    #[derive(Default)]
    struct ScriptedHandle {
        closed: AtomicBool,
        probe_fails: AtomicBool,
        post_fails: AtomicBool,
        close_attempts: AtomicUsize,
    }

    impl PreviewHandle for ScriptedHandle {
        fn post_message(&self, _data: &str, _target_origin: &str) -> Result<()> {
            if self.post_fails.load(Ordering::SeqCst) {
                return Err(Error::transport("blocked by the browser"));
            }
            Ok(())
        }

        fn is_closed(&self) -> Result<bool> {
            if self.probe_fails.load(Ordering::SeqCst) {
                return Err(Error::transport("cross-origin access denied"));
            }
            Ok(self.closed.load(Ordering::SeqCst))
        }

        fn close(&self) -> Result<()> {
            self.close_attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::transport("window already closed"))
        }
    }

    fn server() -> (DebuggerServer, Arc<Recorder>) {
        init_tracing();
        let server = DebuggerServer::builder().build().expect("build");
        let recorder = Arc::new(Recorder::default());
        server.register_callbacks(recorder.clone());
        (server, recorder)
    }

    async fn started_server() -> (DebuggerServer, Arc<Recorder>) {
        let (server, recorder) = server();
        server
            .start(StartOptions::new(ORIGIN))
            .await
            .expect("start");
        (server, recorder)
    }

    fn window() -> (Arc<LocalHandle>, UnboundedReceiver<PostedMessage>) {
        LocalHandle::channel()
    }

    fn event_from(source: &HandleRef, payload: Value) -> MessageEvent {
        MessageEvent::new(ORIGIN, Some(source.clone()), payload.to_string())
    }

    /// Lets the listener task drain queued events.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn sent_message_id(posted: &PostedMessage) -> u64 {
        let parsed = ParsedMessage::parse(&posted.data).expect("posted JSON");
        parsed.message_id().expect("messageId").as_u64()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (server, recorder) = server();
        assert_eq!(server.server_state(), ServerState::Stopped);

        server.start(StartOptions::new(ORIGIN)).await.expect("start");
        server
            .start(StartOptions::new("https://other.example.com"))
            .await
            .expect("second start");

        assert_eq!(server.server_state(), ServerState::Started);
        assert_eq!(server.server_state().to_string(), "started");
        assert_eq!(server.origin().as_deref(), Some(ORIGIN));
        assert_eq!(recorder.state_changes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_origin() {
        let (server, recorder) = server();

        let result = server.start(StartOptions::new("not a url")).await;
        assert!(matches!(result, Err(Error::InvalidOrigin { .. })));
        assert_eq!(server.server_state(), ServerState::Stopped);
        assert_eq!(recorder.state_changes.load(Ordering::SeqCst), 0);

        server.start(StartOptions::new(ORIGIN)).await.expect("retry");
        assert_eq!(server.server_state(), ServerState::Started);
    }

    #[tokio::test]
    async fn test_sending_before_start_fails() {
        let (server, _recorder) = server();
        let (w1, mut rx1) = window();
        let id = server.register_new_preview_window(w1.handle_ref());

        let result = server.send_message(&id, &DebuggerMessage::new("pause"));
        assert!(matches!(result, Err(Error::ServerNotStarted)));

        let result = server
            .send_message_with_response(DebuggerMessage::new("ping"), None)
            .await;
        assert!(matches!(result, Err(Error::ServerNotStarted)));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_events_before_start_are_discarded() {
        let (server, recorder) = server();
        let (w1, _rx1) = window();
        let handle = w1.handle_ref();
        server.register_new_preview_window(handle.clone());

        let events = server.message_events();
        assert!(!events.dispatch(event_from(&handle, json!({ "command": "early" }))));
        server.start(StartOptions::new(ORIGIN)).await.expect("start");
        assert!(events.dispatch(event_from(&handle, json!({ "command": "late" }))));
        settle().await;

        let messages = recorder.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].parsed_message.command(), Some("late"));
    }

    #[tokio::test]
    async fn test_dispatch_after_server_dropped() {
        let (server, _recorder) = started_server().await;
        let events = server.message_events();
        drop(server);

        assert!(!events.dispatch(MessageEvent::new(ORIGIN, None, "{}")));
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_windows_listed_in_registration_order() {
        let (server, recorder) = server();
        let (w1, _rx1) = window();
        let (w2, _rx2) = window();

        let p0 = server.register_new_preview_window(w1.handle_ref());
        let p1 = server.register_new_preview_window(w2.handle_ref());

        assert_eq!(p0, DebuggerId::preview_window(0));
        assert_eq!(p1, DebuggerId::preview_window(1));
        assert_eq!(server.existing_debugger_ids(), vec![p0.clone(), p1.clone()]);

        let opened = recorder.opened.lock();
        assert_eq!(opened.len(), 2);
        assert_eq!(opened[1].id, p1);
        assert_eq!(opened[1].debugger_ids, vec![p0, p1]);
    }

    #[tokio::test]
    async fn test_register_same_window_twice() {
        let (server, recorder) = server();
        let (w1, _rx1) = window();

        let first = server.register_new_preview_window(w1.handle_ref());
        let again = server.register_new_preview_window(w1.handle_ref());

        assert_eq!(first, again);
        assert_eq!(server.connection_count(), 1);
        assert_eq!(recorder.opened.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_replacing_embedded_frame_sends_no_close() {
        let (server, recorder) = started_server().await;
        let (f1, _rx1) = window();
        let (f2, _rx2) = window();
        let f1 = f1.handle_ref();
        let f2 = f2.handle_ref();

        server.register_embedded_game_frame(f1.clone());
        server.register_embedded_game_frame(f2.clone());
        server.register_embedded_game_frame(f2.clone());

        assert_eq!(
            server.existing_debugger_ids(),
            vec![DebuggerId::embedded_frame()]
        );
        assert_eq!(recorder.opened.lock().len(), 2);
        assert!(recorder.closed.lock().is_empty());

        server
            .message_events()
            .dispatch(event_from(&f1, json!({ "command": "stale" })));
        server
            .message_events()
            .dispatch(event_from(&f2, json!({ "command": "fresh" })));
        settle().await;

        let messages = recorder.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, DebuggerId::embedded_frame());
        assert_eq!(messages[0].parsed_message.command(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_unregister_embedded_frame() {
        let (server, recorder) = server();
        let (frame, _rx) = window();
        let (other, _other_rx) = window();
        let frame = frame.handle_ref();

        server.register_embedded_game_frame(frame.clone());
        server.unregister_embedded_game_frame(&other.handle_ref());
        assert_eq!(server.connection_count(), 1);
        assert!(recorder.closed.lock().is_empty());

        server.unregister_embedded_game_frame(&frame);
        assert!(server.existing_debugger_ids().is_empty());

        let closed = recorder.closed.lock();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, DebuggerId::embedded_frame());
        assert!(closed[0].debugger_ids.is_empty());
    }

    // ------------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_send_message_posts_to_target_only() {
        let (server, _recorder) = started_server().await;
        let (w1, mut rx1) = window();
        let (w2, mut rx2) = window();
        let id = server.register_new_preview_window(w1.handle_ref());
        server.register_new_preview_window(w2.handle_ref());

        server
            .send_message(&id, &DebuggerMessage::new("pause"))
            .expect("send");

        let posted = rx1.try_recv().expect("delivered");
        assert_eq!(posted.data, r#"{"command":"pause"}"#);
        assert_eq!(posted.target_origin, ORIGIN);
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_unknown_id_is_noop() {
        let (server, recorder) = started_server().await;

        server
            .send_message(&DebuggerId::preview_window(7), &DebuggerMessage::new("pause"))
            .expect("no-op");
        assert!(recorder.errored.lock().is_empty());
    }

    #[tokio::test]
    async fn test_post_failure_is_reported_not_returned() {
        let (server, recorder) = started_server().await;
        let scripted = Arc::new(ScriptedHandle::default());
        scripted.post_fails.store(true, Ordering::SeqCst);
        let id = server.register_new_preview_window(HandleRef::from(scripted));

        server
            .send_message(&id, &DebuggerMessage::new("pause"))
            .expect("swallowed");

        let errored = recorder.errored.lock();
        assert_eq!(errored.len(), 1);
        assert_eq!(errored[0].id, id);
        assert!(errored[0].error_message.contains("blocked"));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_preview() {
        let (server, _recorder) = started_server().await;
        let (w1, mut rx1) = window();
        let (frame, mut frame_rx) = window();
        server.register_new_preview_window(w1.handle_ref());
        server.register_embedded_game_frame(frame.handle_ref());

        let count = server
            .broadcast_message(&DebuggerMessage::new("hotReload"))
            .expect("broadcast");

        assert_eq!(count, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(frame_rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_resolves_with_first_reply() {
        let (server, recorder) = started_server().await;
        let (w1, mut rx1) = window();
        let handle = w1.handle_ref();
        server.register_new_preview_window(handle.clone());

        let requester = server.clone();
        let request = tokio::spawn(async move {
            requester
                .send_message_with_response(DebuggerMessage::new("ping"), None)
                .await
        });

        let posted = rx1.recv().await.expect("request posted");
        assert_eq!(sent_message_id(&posted), 1);

        sleep(Duration::from_millis(100)).await;
        let events = server.message_events();
        events.dispatch(event_from(&handle, json!({ "messageId": 1, "ok": true })));
        events.dispatch(event_from(&handle, json!({ "messageId": 1, "ok": false })));

        let reply = request.await.expect("join").expect("reply");
        assert_eq!(reply, json!({ "messageId": 1, "ok": true }));

        settle().await;
        assert_eq!(server.pending_request_count(), 0);
        assert_eq!(recorder.messages.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out_without_reply() {
        let (server, recorder) = started_server().await;
        let (w1, mut rx1) = window();
        let handle = w1.handle_ref();
        server.register_new_preview_window(handle.clone());

        let started_at = Instant::now();
        let result = server
            .send_message_with_response(DebuggerMessage::new("ping"), None)
            .await;

        assert!(started_at.elapsed() >= Duration::from_millis(1000));
        let err = result.expect_err("timeout");
        assert!(matches!(
            err,
            Error::RequestTimeout { message_id, timeout_ms: 1000 } if message_id.as_u64() == 1
        ));
        assert!(err.to_string().contains("messageId 1"));
        assert_eq!(server.pending_request_count(), 0);

        assert!(rx1.try_recv().is_ok());
        server
            .message_events()
            .dispatch(event_from(&handle, json!({ "messageId": 1, "ok": true })));
        settle().await;
        assert_eq!(recorder.messages.lock().len(), 1);
        assert_eq!(server.pending_request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_without_previews_times_out() {
        let (server, _recorder) = started_server().await;

        let result = server
            .send_message_with_response(
                DebuggerMessage::new("ping"),
                Some(Duration::from_millis(50)),
            )
            .await;

        assert!(matches!(
            result,
            Err(Error::RequestTimeout { timeout_ms: 50, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_of_several_previews_wins() {
        let (server, _recorder) = started_server().await;
        let (w1, mut rx1) = window();
        let (w2, mut rx2) = window();
        let h1 = w1.handle_ref();
        let h2 = w2.handle_ref();
        server.register_new_preview_window(h1.clone());
        server.register_new_preview_window(h2.clone());

        let requester = server.clone();
        let request = tokio::spawn(async move {
            requester
                .send_message_with_response(DebuggerMessage::new("getStatus"), None)
                .await
        });

        let id = sent_message_id(&rx1.recv().await.expect("posted to w1"));
        assert_eq!(sent_message_id(&rx2.recv().await.expect("posted to w2")), id);

        let events = server.message_events();
        events.dispatch(event_from(&h2, json!({ "messageId": id, "from": "w2" })));
        events.dispatch(event_from(&h1, json!({ "messageId": id, "from": "w1" })));

        let reply = request.await.expect("join").expect("reply");
        assert_eq!(reply["from"], "w2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_are_correlated() {
        let (server, _recorder) = started_server().await;
        let (w1, mut rx1) = window();
        let handle = w1.handle_ref();
        server.register_new_preview_window(handle.clone());

        let first = server.send_message_with_response(DebuggerMessage::new("a"), None);
        let second = server.send_message_with_response(DebuggerMessage::new("b"), None);

        let responder = async {
            let mut ids = Vec::new();
            for _ in 0..2 {
                ids.push(sent_message_id(&rx1.recv().await.expect("posted")));
            }
            for id in ids.into_iter().rev() {
                server
                    .message_events()
                    .dispatch(event_from(&handle, json!({ "messageId": id, "echo": id })));
            }
        };

        let (replies, ()) =
            tokio::join!(futures_util::future::join_all([first, second]), responder);

        assert_eq!(replies[0].as_ref().expect("first")["echo"], 1);
        assert_eq!(replies[1].as_ref().expect("second")["echo"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_request_frees_its_slot() {
        let (server, _recorder) = started_server().await;

        let request = server.send_message_with_response(DebuggerMessage::new("ping"), None);
        let mut request = tokio_test::task::spawn(request);
        tokio_test::assert_pending!(request.poll());
        assert_eq!(server.pending_request_count(), 1);

        drop(request);
        assert_eq!(server.pending_request_count(), 0);
    }

    // ------------------------------------------------------------------------
    // Inbound filtering
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_foreign_origin_is_ignored() {
        let (server, recorder) = started_server().await;
        let (w1, _rx1) = window();
        let handle = w1.handle_ref();
        server.register_new_preview_window(handle.clone());

        server.message_events().dispatch(MessageEvent::new(
            "https://ads.example.net",
            Some(handle.clone()),
            "not even json",
        ));
        settle().await;

        assert!(recorder.messages.lock().is_empty());
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unparsable_message_is_reported_and_dropped() {
        let (server, recorder) = started_server().await;
        let (w1, _rx1) = window();
        let handle = w1.handle_ref();
        server.register_new_preview_window(handle.clone());

        server
            .message_events()
            .dispatch(MessageEvent::new(ORIGIN, Some(handle), "{broken"));
        settle().await;

        assert!(recorder.messages.lock().is_empty());
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_from_unknown_source_is_ignored() {
        let (server, recorder) = started_server().await;

        let result = {
            let request = server.send_message_with_response(
                DebuggerMessage::new("ping"),
                Some(Duration::from_millis(200)),
            );
            let reply = async {
                settle().await;
                server.message_events().dispatch(MessageEvent::new(
                    ORIGIN,
                    None,
                    json!({ "messageId": 1 }).to_string(),
                ));
            };
            tokio::join!(request, reply).0
        };

        assert!(matches!(result, Err(Error::RequestTimeout { .. })));
        assert!(recorder.messages.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_frame_cannot_answer_requests() {
        let (server, recorder) = started_server().await;
        let (f1, _f1_rx) = window();
        let (f2, mut f2_rx) = window();
        let f1 = f1.handle_ref();
        let f2 = f2.handle_ref();
        server.register_embedded_game_frame(f1.clone());
        server.register_embedded_game_frame(f2.clone());

        let requester = server.clone();
        let request = tokio::spawn(async move {
            requester
                .send_message_with_response(DebuggerMessage::new("getStatus"), None)
                .await
        });

        let id = sent_message_id(&f2_rx.recv().await.expect("posted to f2"));
        let events = server.message_events();
        events.dispatch(event_from(&f1, json!({ "messageId": id, "from": "f1" })));
        settle().await;
        assert_eq!(server.pending_request_count(), 1);

        events.dispatch(event_from(&f2, json!({ "messageId": id, "from": "f2" })));

        let reply = request.await.expect("join").expect("reply");
        assert_eq!(reply["from"], "f2");
        assert_eq!(recorder.messages.lock().len(), 1);
    }

    // ------------------------------------------------------------------------
    // Watcher
    // ------------------------------------------------------------------------

    /// Watcher that probes as soon as it is started.
    #[derive(Default)]
    struct EagerWatcher {
        running: AtomicBool,
        stops: AtomicUsize,
    }

    impl ConnectionWatcher for EagerWatcher {
        fn start(&self, target: Weak<dyn WatchTarget>) {
            self.running.store(true, Ordering::SeqCst);
            if let Some(target) = target.upgrade() {
                target.poll_windows();
            }
        }

        fn stop(&self) {
            self.running.store(false, Ordering::SeqCst);
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_watcher_may_call_back_into_server() {
        init_tracing();
        let watcher = Arc::new(EagerWatcher::default());
        let server = DebuggerServer::builder()
            .watcher(watcher.clone())
            .build()
            .expect("build");
        let recorder = Arc::new(Recorder::default());
        server.register_callbacks(recorder.clone());

        let open = Arc::new(ScriptedHandle::default());
        let gone = Arc::new(ScriptedHandle::default());
        gone.closed.store(true, Ordering::SeqCst);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let worker = {
            let server = server.clone();
            let open = HandleRef::from(Arc::clone(&open));
            let gone = HandleRef::from(gone);
            std::thread::spawn(move || {
                let open_id = server.register_new_preview_window(open);
                server.register_new_preview_window(gone);
                let _ = done_tx.send(open_id);
            })
        };

        let open_id = done_rx
            .recv_timeout(Duration::from_secs(3))
            .expect("registration finished");
        worker.join().expect("worker");

        assert_eq!(server.existing_debugger_ids(), vec![open_id]);
        assert_eq!(recorder.closed.lock().len(), 1);
        assert!(server.is_watching());

        open.closed.store(true, Ordering::SeqCst);
        let (late, _rx) = window();
        late.mark_closed();
        server.register_new_preview_window(late.handle_ref());

        assert!(server.existing_debugger_ids().is_empty());
        assert_eq!(recorder.closed.lock().len(), 3);
        assert!(!server.is_watching());
        assert_eq!(watcher.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_window_detected_on_next_tick() {
        let (server, recorder) = started_server().await;
        let (w1, _rx1) = window();
        let (w2, _rx2) = window();
        let p0 = server.register_new_preview_window(w1.handle_ref());
        let p1 = server.register_new_preview_window(w2.handle_ref());
        assert!(server.is_watching());

        w1.mark_closed();
        sleep(Duration::from_millis(1001)).await;

        assert_eq!(server.existing_debugger_ids(), vec![p1.clone()]);
        {
            let closed = recorder.closed.lock();
            assert_eq!(closed.len(), 1);
            assert_eq!(closed[0].id, p0);
            assert_eq!(closed[0].debugger_ids, vec![p1]);
        }
        assert!(server.is_watching());

        w2.mark_closed();
        sleep(Duration::from_millis(1000)).await;

        assert!(server.existing_debugger_ids().is_empty());
        assert_eq!(recorder.closed.lock().len(), 2);
        assert!(!server.is_watching());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_probe_does_not_block_other_windows() {
        let (server, recorder) = started_server().await;
        let faulty = Arc::new(ScriptedHandle::default());
        faulty.probe_fails.store(true, Ordering::SeqCst);
        let closing = Arc::new(ScriptedHandle::default());
        closing.closed.store(true, Ordering::SeqCst);

        let faulty_id = server.register_new_preview_window(HandleRef::from(faulty));
        let closing_id = server.register_new_preview_window(HandleRef::from(closing));

        sleep(Duration::from_millis(1001)).await;

        assert_eq!(server.existing_debugger_ids(), vec![faulty_id]);
        let closed = recorder.closed.lock();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, closing_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_embedded_frame_is_not_polled() {
        let (server, recorder) = started_server().await;
        let frame = Arc::new(ScriptedHandle::default());
        frame.closed.store(true, Ordering::SeqCst);

        server.register_embedded_game_frame(HandleRef::from(frame));
        assert!(!server.is_watching());

        sleep(Duration::from_millis(3000)).await;
        assert_eq!(
            server.existing_debugger_ids(),
            vec![DebuggerId::embedded_frame()]
        );
        assert!(recorder.closed.lock().is_empty());
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_close_all_connections() {
        let (server, recorder) = started_server().await;
        let first = Arc::new(ScriptedHandle::default());
        let second = Arc::new(ScriptedHandle::default());
        let (frame, _frame_rx) = window();

        server.register_new_preview_window(HandleRef::from(Arc::clone(&first)));
        server.register_new_preview_window(HandleRef::from(Arc::clone(&second)));
        server.register_embedded_game_frame(frame.handle_ref());

        let requester = server.clone();
        let request = tokio::spawn(async move {
            requester
                .send_message_with_response(DebuggerMessage::new("ping"), None)
                .await
        });
        settle().await;
        assert_eq!(server.pending_request_count(), 1);

        server.close_all_connections();
        server.close_all_connections();

        assert!(server.existing_debugger_ids().is_empty());
        assert!(!server.is_watching());
        assert_eq!(server.server_state(), ServerState::Started);
        assert_eq!(first.close_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(second.close_attempts.load(Ordering::SeqCst), 1);

        {
            let closed = recorder.closed.lock();
            assert_eq!(closed.len(), 3);
            assert_eq!(closed[0].id, DebuggerId::preview_window(0));
            assert_eq!(
                closed[0].debugger_ids,
                vec![DebuggerId::embedded_frame(), DebuggerId::preview_window(1)]
            );
            assert_eq!(closed[2].id, DebuggerId::embedded_frame());
            assert!(closed[2].debugger_ids.is_empty());
        }

        let result = request.await.expect("join");
        assert!(matches!(result, Err(Error::ServerClosing)));
        assert_eq!(server.pending_request_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribed_callbacks_stop_receiving() {
        let (server, recorder) = server();
        let extra = Arc::new(Recorder::default());
        let subscription = server.register_callbacks(extra.clone());
        let (w1, _rx1) = window();
        let (w2, _rx2) = window();

        server.register_new_preview_window(w1.handle_ref());
        subscription.unsubscribe();
        subscription.unsubscribe();
        server.register_new_preview_window(w2.handle_ref());

        assert_eq!(extra.opened.lock().len(), 1);
        assert_eq!(recorder.opened.lock().len(), 2);
    }
}
