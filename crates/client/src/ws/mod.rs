//! Real-time channel to the CareNet event service.
//!
//! This module provides:
//! - One logical always-on connection with an auth handshake
//! - Bounded, fixed-delay reconnects after unplanned closures
//! - Named-event fan-out to any number of independent subscribers
//! - A hub that shares one channel across every mounted consumer
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     ChannelHub                       │
//! │      (lazily creates the channel, counts leases)     │
//! └──────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//!               ┌─────────────────────┐   open / write / close
//!               │   RealtimeChannel   │ ──────────────────────┐
//!               └─────────────────────┘                       ▼
//!                          ▲                       ┌────────────────────┐
//!                          │  ChannelEvent queue   │ Connector/Transport│
//!                          └────── dispatcher ◄────│ (tungstenite, mem) │
//!                                     │            └────────────────────┘
//!                  ┌──────────────────┼──────────────────┐
//!                  ▼                  ▼                  ▼
//!           ┌────────────┐     ┌────────────┐     ┌────────────┐
//!           │ match:new  │     │notification│     │dashboard:  │
//!           │ handlers   │     │  store     │     │ stats      │
//!           └────────────┘     └────────────┘     └────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let hub = ChannelHub::with_tungstenite(ChannelConfig::from_env());
//! let channel = hub.mount();
//! channel.set_token(Some(access_token));
//!
//! let matches = channel.subscribe("match:new", |data| {
//!     tracing::info!(?data, "new patient match");
//! });
//!
//! channel.send("match:accept", Some(json!({ "matchId": "m-42" })));
//! matches.unsubscribe();
//! ```

mod channel;
mod hub;
pub mod memory;
mod registry;
mod state;
pub mod transport;

pub use channel::RealtimeChannel;
pub use hub::{ChannelHub, ChannelLease};
pub use memory::{MemoryConnector, MemoryTransport};
pub use registry::{Handler, Subscription, SubscriptionId, SubscriptionRegistry};
pub use state::{ConnectionIndicator, ConnectionState};
pub use transport::{
    Connector, TransportError, TransportEvent, TransportHandle, TransportSink,
    TungsteniteConnector,
};
