//! Event-name keyed subscription registry.
//!
//! Dispatch works on a snapshot of the handler list taken when the dispatch
//! starts, so handlers may subscribe or unsubscribe (themselves or others)
//! while running. A handler removed before its turn in the snapshot is skipped.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;

/// Callback invoked with the `data` of every matching envelope.
///
/// Envelopes without a payload are delivered as [`Value::Null`].
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identity of one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    handlers: HashMap<String, Vec<(SubscriptionId, Handler)>>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // Handlers never run under this lock, so a poisoned guard is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` under `event`.
    pub fn insert(&self, event: &str, handler: Handler) -> SubscriptionId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner
            .handlers
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove one handler, dropping the event key once it has no handlers left.
    ///
    /// Returns false when the handler was not registered.
    pub fn remove(&self, event: &str, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let Some(list) = inner.handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            inner.handlers.remove(event);
        }
        removed
    }

    pub fn contains(&self, event: &str, id: SubscriptionId) -> bool {
        self.lock()
            .handlers
            .get(event)
            .is_some_and(|list| list.iter().any(|(existing, _)| *existing == id))
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.lock().handlers.get(event).map_or(0, Vec::len)
    }

    /// Event names that currently have at least one handler.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().handlers.keys().cloned().collect();
        names.sort();
        names
    }

    fn snapshot(&self, event: &str) -> Vec<(SubscriptionId, Handler)> {
        self.lock().handlers.get(event).cloned().unwrap_or_default()
    }

    /// Deliver `data` to every handler registered for `event`.
    ///
    /// A panicking handler is logged and skipped; delivery continues with the
    /// remaining handlers. Returns how many handlers ran to completion.
    pub fn dispatch(&self, event: &str, data: &Value) -> usize {
        let mut delivered = 0;
        for (id, handler) in self.snapshot(event) {
            if !self.contains(event, id) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| handler(data))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    tracing::error!(event, %message, "Realtime handler panicked");
                }
            }
        }
        delivered
    }
}

/// Registration returned by [`RealtimeChannel::subscribe`](super::RealtimeChannel::subscribe).
///
/// Dropping a `Subscription` leaves the handler registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    event: String,
    id: SubscriptionId,
    registry: Weak<SubscriptionRegistry>,
}

impl Subscription {
    pub(crate) fn new(event: String, id: SubscriptionId, registry: &Arc<SubscriptionRegistry>) -> Self {
        Self {
            event,
            id,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(&self.event, self.id))
    }

    /// Remove exactly this handler. Other handlers are unaffected.
    pub fn unsubscribe(self) {
        self.cancel();
    }

    /// Same as [`Subscription::unsubscribe`] without consuming the handle,
    /// for handlers that remove themselves.
    pub fn cancel(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.event, self.id);
        }
    }
}
