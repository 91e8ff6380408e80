//! The realtime channel: one logical always-on connection with auth,
//! bounded reconnects and named-event fan-out.
//!
//! All transport notifications and the reconnect timer arrive as
//! [`ChannelEvent`]s on a single queue, drained by one dispatcher task, so
//! state transitions happen strictly in delivery order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use carenet_shared::{
    events, AuthFailure, AuthRequest, AuthSuccess, Envelope, CLIENT_DISCONNECT_REASON,
    NORMAL_CLOSURE,
};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::registry::{Subscription, SubscriptionRegistry};
use super::state::ConnectionState;
use super::transport::{Connector, TransportEvent, TransportHandle, TransportSink, TungsteniteConnector};
use crate::config::ChannelConfig;

/// Work item for the dispatcher loop.
#[derive(Debug)]
pub(crate) enum ChannelEvent {
    Transport { generation: u64, event: TransportEvent },
    ReconnectDue { timer: u64 },
    Shutdown,
}

/// Aborts the wrapped task when dropped.
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The single pending reconnect. Replacing or clearing it cancels the sleep.
struct ReconnectTimer {
    id: u64,
    _task: TaskGuard,
}

struct ActiveTransport {
    generation: u64,
    handle: Box<dyn TransportHandle>,
}

#[derive(Default)]
struct Core {
    state: ConnectionState,
    transport: Option<ActiveTransport>,
    next_generation: u64,
    reconnect_attempts: u32,
    reconnect_timer: Option<ReconnectTimer>,
    next_timer_id: u64,
    token: Option<String>,
    session_task: Option<TaskGuard>,
    shut_down: bool,
}

impl Core {
    fn owns(&self, generation: u64) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }
}

struct Inner {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    registry: Arc<SubscriptionRegistry>,
    core: Mutex<Core>,
    status: watch::Sender<ConnectionState>,
    events: UnboundedSender<ChannelEvent>,
}

/// Cloneable handle to one realtime channel.
///
/// Creating a channel spawns its dispatcher on the current Tokio runtime, so
/// [`RealtimeChannel::new`] must be called from within one. No public
/// operation blocks or returns an error: failures are logged and reflected in
/// [`RealtimeChannel::state`].
#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Arc<Inner>,
}

impl RealtimeChannel {
    /// Create a channel over `connector`, connecting immediately when
    /// `config.auto_connect` is set.
    pub fn new(config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        let (events_tx, events_rx) = unbounded();
        let (status, _) = watch::channel(ConnectionState::Disconnected);
        let auto_connect = config.auto_connect;

        let inner = Arc::new(Inner {
            config,
            connector,
            registry: Arc::new(SubscriptionRegistry::new()),
            core: Mutex::new(Core::default()),
            status,
            events: events_tx,
        });
        tokio::spawn(run_dispatcher(Arc::downgrade(&inner), events_rx));

        let channel = Self { inner };
        if auto_connect {
            channel.connect();
        }
        channel
    }

    /// Create a channel over a native WebSocket.
    pub fn with_tungstenite(config: ChannelConfig) -> Self {
        Self::new(config, Arc::new(TungsteniteConnector::new()))
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Open a transport unless one is already open or opening.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Cancel any pending reconnect and close the transport with the
    /// client-initiated code, so no reconnect follows.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Disconnect and stop the dispatcher. The channel ignores `connect`
    /// afterwards.
    pub fn shutdown(&self) {
        self.inner.disconnect();
        {
            let mut core = self.inner.lock();
            core.shut_down = true;
            core.session_task = None;
        }
        let _ = self.inner.events.unbounded_send(ChannelEvent::Shutdown);
    }

    /// Write a timestamped envelope if the transport is open; otherwise drop it.
    pub fn send(&self, kind: &str, data: Option<Value>) {
        let core = self.inner.lock();
        self.inner.write(&core, &Envelope::new(kind, data));
    }

    /// Serialize `payload` and [`send`](Self::send) it.
    pub fn send_json<T: Serialize>(&self, kind: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(data) => self.send(kind, Some(data)),
            Err(e) => tracing::error!(kind, error = %e, "Failed to serialize outbound payload"),
        }
    }

    /// Register `handler` for envelopes whose `type` equals `event`.
    ///
    /// The handler receives the envelope's `data` (`null` when absent) and may
    /// itself call back into the channel.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.inner.registry.insert(event, Arc::new(handler));
        tracing::trace!(event, "Subscribed");
        Subscription::new(event.to_string(), id, &self.inner.registry)
    }

    /// Replace the credential presented on the next open.
    ///
    /// A new token arriving while the transport is up but not yet
    /// authenticated is presented immediately.
    pub fn set_token(&self, token: Option<String>) {
        self.inner.set_token(token);
    }

    /// Follow an external session source, applying every token change.
    ///
    /// Replaces any session previously being watched.
    pub fn watch_session(&self, mut session: watch::Receiver<Option<String>>) {
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            loop {
                let token = session.borrow_and_update().clone();
                match weak.upgrade() {
                    Some(inner) => inner.set_token(token),
                    None => break,
                }
                if session.changed().await.is_err() {
                    break;
                }
            }
        });
        self.inner.lock().session_task = Some(TaskGuard(task));
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().reconnect_attempts
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.lock().reconnect_timer.is_some()
    }

    /// Observe state transitions, e.g. for a connection status badge.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.status.subscribe()
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.inner.registry.handler_count(event)
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.lock();
        f.debug_struct("RealtimeChannel")
            .field("url", &self.inner.config.url)
            .field("state", &core.state)
            .field("reconnect_attempts", &core.reconnect_attempts)
            .finish()
    }
}

async fn run_dispatcher(inner: Weak<Inner>, mut events: UnboundedReceiver<ChannelEvent>) {
    while let Some(event) = events.next().await {
        if matches!(event, ChannelEvent::Shutdown) {
            break;
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle(event);
    }
    tracing::debug!("Realtime dispatcher stopped");
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, core: &mut Core, state: ConnectionState) {
        if core.state != state {
            tracing::debug!(from = %core.state, to = %state, "Channel state changed");
        }
        core.state = state;
        self.status.send_replace(state);
    }

    fn handle(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Transport { generation, event } => match event {
                TransportEvent::Opened => self.on_open(generation),
                TransportEvent::Message(text) => self.on_message(generation, &text),
                TransportEvent::Closed { code, reason } => self.on_close(generation, code, &reason),
                TransportEvent::Error(message) => {
                    if self.lock().owns(generation) {
                        tracing::warn!(generation, %message, "Transport error");
                    }
                }
            },
            ChannelEvent::ReconnectDue { timer } => self.on_reconnect_due(timer),
            ChannelEvent::Shutdown => {}
        }
    }

    fn connect(&self) {
        let mut core = self.lock();
        if core.shut_down {
            tracing::warn!("Ignoring connect on a shut down channel");
            return;
        }
        if core.transport.is_some() {
            tracing::debug!(state = %core.state, "Transport already open or opening");
            return;
        }

        // A manual connect supersedes any scheduled one.
        core.reconnect_timer = None;
        core.next_generation += 1;
        let generation = core.next_generation;
        let sink = TransportSink::new(generation, self.events.clone());

        match self.connector.open(&self.config.url, sink) {
            Ok(handle) => {
                core.transport = Some(ActiveTransport { generation, handle });
                tracing::info!(url = %self.config.url, generation, "Connecting");
                self.set_state(&mut core, ConnectionState::Connecting);
            }
            Err(e) => {
                tracing::error!(url = %self.config.url, error = %e, "Failed to open transport");
                self.set_state(&mut core, ConnectionState::Disconnected);
            }
        }
    }

    fn disconnect(&self) {
        let mut core = self.lock();
        if core.reconnect_timer.take().is_some() {
            tracing::debug!("Cancelled pending reconnect");
        }
        if let Some(active) = core.transport.take() {
            active.handle.close(NORMAL_CLOSURE, CLIENT_DISCONNECT_REASON);
            tracing::info!(generation = active.generation, "Disconnected by client");
        }
        self.set_state(&mut core, ConnectionState::Disconnected);
    }

    fn set_token(&self, token: Option<String>) {
        let mut core = self.lock();
        if core.token == token {
            return;
        }
        core.token = token;
        if core.token.is_some()
            && matches!(
                core.state,
                ConnectionState::Connected | ConnectionState::Authenticating
            )
        {
            tracing::debug!("Credential changed before authentication completed; re-authenticating");
            self.authenticate(&mut core);
        }
    }

    /// Present the current token, if any, on the open transport.
    fn authenticate(&self, core: &mut Core) {
        let Some(token) = core.token.clone() else {
            return;
        };
        let data = match serde_json::to_value(AuthRequest { token }) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode auth request");
                return;
            }
        };
        if self.write(core, &Envelope::new(events::AUTH, Some(data))) {
            self.set_state(core, ConnectionState::Authenticating);
        }
    }

    /// Returns true when the frame was handed to an open transport.
    fn write(&self, core: &Core, envelope: &Envelope) -> bool {
        let active = match core.transport.as_ref() {
            Some(active) if core.state.is_connected() => active,
            _ => {
                tracing::debug!(kind = %envelope.kind, state = %core.state, "Dropping frame; transport not open");
                return false;
            }
        };
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(kind = %envelope.kind, error = %e, "Failed to encode envelope");
                return false;
            }
        };
        match active.handle.send_text(text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(kind = %envelope.kind, error = %e, "Transport rejected frame");
                false
            }
        }
    }

    fn on_open(&self, generation: u64) {
        let mut core = self.lock();
        if !core.owns(generation) {
            tracing::debug!(generation, "Ignoring open from a discarded transport");
            return;
        }
        core.reconnect_attempts = 0;
        tracing::info!(generation, "Realtime channel connected");
        self.set_state(&mut core, ConnectionState::Connected);

        if core.token.is_some() {
            self.authenticate(&mut core);
        } else {
            tracing::debug!("No credential yet; waiting for a session token");
        }
    }

    fn on_message(&self, generation: u64, text: &str) {
        if !self.lock().owns(generation) {
            return;
        }

        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed frame");
                return;
            }
        };

        if events::is_auth_reply(&envelope.kind) {
            self.on_auth_reply(&envelope);
            return;
        }

        let data = envelope.data.as_ref().unwrap_or(&Value::Null);
        let delivered = self.registry.dispatch(&envelope.kind, data);
        if delivered == 0 {
            tracing::trace!(kind = %envelope.kind, "No subscribers for event");
        }
    }

    /// Handshake replies drive the state machine and are not dispatched.
    fn on_auth_reply(&self, envelope: &Envelope) {
        let mut core = self.lock();
        if envelope.kind == events::AUTH_SUCCESS {
            if core.state.is_connected() {
                self.set_state(&mut core, ConnectionState::Authenticated);
            }
            let user_id = envelope
                .data_as::<AuthSuccess>()
                .map(|payload| payload.user_id)
                .ok();
            tracing::info!(user_id = ?user_id, "Realtime channel authenticated");
        } else {
            if matches!(
                core.state,
                ConnectionState::Authenticating | ConnectionState::Authenticated
            ) {
                self.set_state(&mut core, ConnectionState::Connected);
            }
            let message = envelope
                .data_as::<AuthFailure>()
                .map(|failure| failure.message)
                .unwrap_or_default();
            tracing::error!(%message, "Realtime authentication failed");
        }
    }

    fn on_close(&self, generation: u64, code: u16, reason: &str) {
        let mut core = self.lock();
        if !core.owns(generation) {
            tracing::debug!(generation, code, "Ignoring close from a discarded transport");
            return;
        }
        core.transport = None;
        self.set_state(&mut core, ConnectionState::Disconnected);
        tracing::info!(generation, code, reason, "Realtime channel disconnected");

        if code == NORMAL_CLOSURE {
            return;
        }

        let policy = self.config.reconnect;
        if policy.allows(core.reconnect_attempts) {
            core.reconnect_attempts += 1;
            tracing::info!(
                attempt = core.reconnect_attempts,
                delay_ms = policy.delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            self.schedule_reconnect(&mut core);
        } else {
            tracing::warn!(
                attempts = core.reconnect_attempts,
                "Reconnect attempts exhausted; staying disconnected until connect() is called"
            );
        }
    }

    fn schedule_reconnect(&self, core: &mut Core) {
        core.next_timer_id += 1;
        let id = core.next_timer_id;
        let delay = self.config.reconnect.delay;
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.unbounded_send(ChannelEvent::ReconnectDue { timer: id });
        });
        core.reconnect_timer = Some(ReconnectTimer {
            id,
            _task: TaskGuard(task),
        });
    }

    fn on_reconnect_due(&self, timer: u64) {
        {
            let mut core = self.lock();
            if core.reconnect_timer.as_ref().map(|t| t.id) != Some(timer) {
                tracing::debug!(timer, "Ignoring cancelled reconnect timer");
                return;
            }
            core.reconnect_timer = None;
        }
        self.connect();
    }
}
