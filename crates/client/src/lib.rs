//! CareNet realtime client.
//!
//! This crate contains the connection layer the CareNet dashboard uses for
//! live provider, matching and notification updates: a reconnecting,
//! authenticated event channel plus the stores built on top of it.

pub mod config;
pub mod logging;
pub mod stores;
pub mod ws;

pub use config::{ChannelConfig, ReconnectPolicy};
pub use stores::NotificationStore;
pub use ws::{
    ChannelHub, ChannelLease, ConnectionIndicator, ConnectionState, RealtimeChannel, Subscription,
};
