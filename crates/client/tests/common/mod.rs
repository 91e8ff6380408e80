//! Shared helpers for channel integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use carenet_client::ws::{MemoryConnector, RealtimeChannel};
use carenet_client::ChannelConfig;
use serde_json::Value;

pub const TEST_URL: &str = "ws://localhost:8080/ws";

/// Let the dispatcher drain everything queued so far.
///
/// Yields instead of sleeping so paused test clocks never auto-advance.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock and let woken tasks run.
pub async fn advance_ms(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

pub fn config() -> ChannelConfig {
    ChannelConfig::new(TEST_URL)
        .reconnect_delay(Duration::from_millis(100))
        .max_reconnect_attempts(3)
}

pub fn channel(config: ChannelConfig) -> (RealtimeChannel, MemoryConnector) {
    let connector = MemoryConnector::new();
    let channel = RealtimeChannel::new(config, Arc::new(connector.clone()));
    (channel, connector)
}

/// Records every payload delivered to a handler.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Value>>>,
}

impl Recorder {
    pub fn handler(&self) -> impl Fn(&Value) + Send + Sync + 'static {
        let seen = self.seen.clone();
        move |data: &Value| seen.lock().unwrap().push(data.clone())
    }

    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}
