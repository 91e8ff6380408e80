//! Notification store for the header bell.
//!
//! Keeps the newest-first list of notifications for the signed-in user and
//! follows three realtime events:
//! - `notification:new`: a complete notification, prepended
//! - `notification:broadcast`: a partial one, completed locally and prepended
//! - `notification:read`: marks one notification read

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use carenet_shared::{events, Notification, NotificationDraft, NotificationRead};
use serde_json::Value;

use crate::ws::{RealtimeChannel, Subscription};

type Shared = Arc<Mutex<Vec<Notification>>>;

fn lock(list: &Shared) -> MutexGuard<'_, Vec<Notification>> {
    list.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Notification list kept in sync with the realtime channel.
///
/// Listening stops when the store is dropped.
pub struct NotificationStore {
    list: Shared,
    subscriptions: Vec<Subscription>,
}

impl NotificationStore {
    /// Start following notification events on `channel`.
    pub fn attach(channel: &RealtimeChannel) -> Self {
        let list: Shared = Arc::default();

        let on_new = {
            let list = list.clone();
            channel.subscribe(events::NOTIFICATION_NEW, move |data: &Value| {
                match serde_json::from_value::<Notification>(data.clone()) {
                    Ok(notification) => {
                        tracing::info!(
                            kind = ?notification.kind,
                            title = %notification.title,
                            "Notification received"
                        );
                        lock(&list).insert(0, notification);
                    }
                    Err(e) => tracing::warn!(error = %e, "Ignoring malformed notification"),
                }
            })
        };

        let on_broadcast = {
            let list = list.clone();
            channel.subscribe(events::NOTIFICATION_BROADCAST, move |data: &Value| {
                match serde_json::from_value::<NotificationDraft>(data.clone()) {
                    Ok(draft) => {
                        let notification = draft.complete();
                        tracing::info!(
                            kind = ?notification.kind,
                            title = %notification.title,
                            "Broadcast notification received"
                        );
                        lock(&list).insert(0, notification);
                    }
                    Err(e) => tracing::warn!(error = %e, "Ignoring malformed broadcast"),
                }
            })
        };

        let on_read = {
            let list = list.clone();
            channel.subscribe(events::NOTIFICATION_READ, move |data: &Value| {
                match serde_json::from_value::<NotificationRead>(data.clone()) {
                    Ok(NotificationRead { id }) => {
                        set_read(&list, &id, true);
                    }
                    Err(e) => tracing::warn!(error = %e, "Ignoring malformed read receipt"),
                }
            })
        };

        Self {
            list,
            subscriptions: vec![on_new, on_broadcast, on_read],
        }
    }

    /// Snapshot of the list, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.list).clone()
    }

    pub fn unread_count(&self) -> usize {
        lock(&self.list).iter().filter(|n| !n.read).count()
    }

    /// Replace the list with an initial load, e.g. from the REST API.
    pub fn replace_all(&self, notifications: Vec<Notification>) {
        *lock(&self.list) = notifications;
    }

    /// Returns false when no notification has that id.
    pub fn mark_as_read(&self, id: &str) -> bool {
        set_read(&self.list, id, true)
    }

    /// Revert an optimistic [`mark_as_read`](Self::mark_as_read) whose server sync failed.
    pub fn mark_as_unread(&self, id: &str) -> bool {
        set_read(&self.list, id, false)
    }

    /// Mark everything read, returning the ids that were unread.
    pub fn mark_all_as_read(&self) -> Vec<String> {
        let mut list = lock(&self.list);
        let changed = list
            .iter_mut()
            .filter(|n| !n.read)
            .map(|n| {
                n.read = true;
                n.id.clone()
            })
            .collect();
        changed
    }

    pub fn delete(&self, id: &str) -> bool {
        let mut list = lock(&self.list);
        let before = list.len();
        list.retain(|n| n.id != id);
        list.len() != before
    }

    pub fn clear_all(&self) {
        lock(&self.list).clear();
    }

    /// Stop listening without waiting for the store to drop.
    pub fn detach(self) {}
}

impl Drop for NotificationStore {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

fn set_read(list: &Shared, id: &str, read: bool) -> bool {
    match lock(list).iter_mut().find(|n| n.id == id) {
        Some(notification) => {
            notification.read = read;
            true
        }
        None => false,
    }
}
