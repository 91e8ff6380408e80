mod common;

use std::sync::Arc;

use carenet_client::ws::{ChannelHub, ConnectionState, MemoryConnector};
use carenet_shared::{events, CLIENT_DISCONNECT_REASON, NORMAL_CLOSURE};
use common::{config, settle, Recorder};
use serde_json::json;
use tokio::sync::watch;

fn hub() -> (ChannelHub, MemoryConnector) {
    let connector = MemoryConnector::new();
    let hub = ChannelHub::new(config(), Arc::new(connector.clone()));
    (hub, connector)
}

#[tokio::test(start_paused = true)]
async fn mounts_share_one_channel() {
    let (hub, connector) = hub();
    assert!(hub.current().is_none());

    let bell = hub.mount();
    let panel = hub.mount();
    assert_eq!(hub.lease_count(), 2);
    assert_eq!(connector.open_count(), 1);

    let bell_events = Recorder::default();
    let panel_events = Recorder::default();
    let _bell_sub = bell.subscribe(events::NOTIFICATION_NEW, bell_events.handler());
    let _panel_sub = panel.subscribe(events::MATCH_NEW, panel_events.handler());

    let server = connector.latest().unwrap();
    server.accept();
    server.push(events::MATCH_NEW, Some(json!({ "matchId": "m-1" })));
    settle().await;

    assert!(bell.is_connected());
    assert_eq!(panel_events.count(), 1);
    assert_eq!(bell_events.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn last_unmount_shuts_the_channel_down() {
    let (hub, connector) = hub();
    let first = hub.mount();
    let second = first.clone();
    assert_eq!(hub.lease_count(), 2);

    let server = connector.latest().unwrap();
    server.accept();
    settle().await;
    let channel = hub.current().unwrap();

    drop(first);
    assert_eq!(hub.lease_count(), 1);
    assert!(server.closed_with().is_none());

    drop(second);
    settle().await;
    assert_eq!(hub.lease_count(), 0);
    assert!(hub.current().is_none());
    assert_eq!(
        server.closed_with(),
        Some((NORMAL_CLOSURE, CLIENT_DISCONNECT_REASON.to_string()))
    );
    assert_eq!(channel.state(), ConnectionState::Disconnected);

    // A stray handle cannot revive a channel that was shut down.
    channel.connect();
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn remount_creates_a_fresh_channel() {
    let (hub, connector) = hub();
    drop(hub.mount());
    assert_eq!(connector.open_count(), 1);

    let lease = hub.mount();
    assert_eq!(connector.open_count(), 2);
    assert_eq!(lease.reconnect_attempts(), 0);
    assert_eq!(lease.state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn session_token_follows_sign_in() {
    let connector = MemoryConnector::new();
    let (session, session_rx) = watch::channel(None::<String>);
    let hub = ChannelHub::with_session(config(), Arc::new(connector.clone()), session_rx);

    let lease = hub.mount();
    let server = connector.latest().unwrap();
    server.accept();
    settle().await;
    assert_eq!(lease.state(), ConnectionState::Connected);
    assert!(server.sent().is_empty());

    session.send_replace(Some("signed-in-token".to_string()));
    settle().await;

    let sent = server.sent_envelopes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, events::AUTH);
    assert_eq!(sent[0].data, Some(json!({ "token": "signed-in-token" })));
    assert_eq!(lease.state(), ConnectionState::Authenticating);
}

#[tokio::test(start_paused = true)]
async fn session_token_present_before_mount_is_used_on_open() {
    let connector = MemoryConnector::new();
    let (_session, session_rx) = watch::channel(Some("stored-token".to_string()));
    let hub = ChannelHub::with_session(config(), Arc::new(connector.clone()), session_rx);

    let lease = hub.mount();
    settle().await;
    let server = connector.latest().unwrap();
    server.accept();
    settle().await;

    let sent = server.sent_envelopes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data, Some(json!({ "token": "stored-token" })));
    assert_eq!(lease.state(), ConnectionState::Authenticating);
}
