//! CareNet realtime watcher.
//!
//! Connects to the event service the way the dashboard does and logs every
//! live update until Ctrl-C. Configuration comes from the environment (see
//! [`ChannelConfig::from_env`]); the bearer token from `CARENET_TOKEN`.

use std::sync::Arc;

use anyhow::Context;
use carenet_client::{
    logging,
    ws::{ChannelHub, ConnectionIndicator, TungsteniteConnector},
    ChannelConfig, NotificationStore,
};
use carenet_shared::{events, SystemNotice};
use serde_json::Value;
use tokio::sync::watch;

/// Dashboard events logged verbatim.
const WATCHED_EVENTS: &[&str] = &[
    events::CONNECTION_ESTABLISHED,
    events::CONNECTION_LOST,
    events::PROVIDER_UPDATE,
    events::PROVIDER_COUNT,
    events::MATCH_NEW,
    events::MATCH_ACCEPTED,
    events::MATCH_SCORE,
    events::MATCHING_METRICS,
    events::MATCHING_ASSIGNMENT,
    events::MATCHING_QUEUE_UPDATE,
    events::ANALYTICS_UPDATE,
    events::DASHBOARD_STATS,
    events::REVENUE_UPDATE,
    events::PONG,
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::DEFAULT_FILTER);

    let config = ChannelConfig::from_env();
    let token = std::env::var("CARENET_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty());
    if token.is_none() {
        tracing::warn!("CARENET_TOKEN not set; the channel will stay unauthenticated");
    }
    let (_session, session_rx) = watch::channel(token);

    let hub = ChannelHub::with_session(config, Arc::new(TungsteniteConnector::new()), session_rx);
    let channel = hub.mount();
    let notifications = NotificationStore::attach(&channel);

    let mut subscriptions: Vec<_> = WATCHED_EVENTS
        .iter()
        .map(|&event| {
            channel.subscribe(event, move |data: &Value| {
                tracing::info!(event, %data, "Realtime event");
            })
        })
        .collect();

    subscriptions.push(channel.subscribe(events::NOTIFICATION, |data: &Value| {
        match serde_json::from_value::<SystemNotice>(data.clone()) {
            Ok(notice) => tracing::info!(kind = ?notice.kind, message = %notice.message, "System notice"),
            Err(e) => tracing::warn!(error = %e, "Ignoring malformed system notice"),
        }
    }));

    let mut status = channel.subscribe_state();
    let status_task = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let state = *status.borrow_and_update();
            tracing::info!(
                %state,
                indicator = ConnectionIndicator::from(state).label(),
                "Connection status"
            );
        }
    });

    if !channel.config().auto_connect {
        channel.connect();
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    tracing::info!(unread = notifications.unread_count(), "Shutting down");
    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    drop(notifications);
    drop(channel);
    status_task.abort();

    Ok(())
}
