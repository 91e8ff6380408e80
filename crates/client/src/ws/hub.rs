//! Shared channel registry tied to consumer mount lifetimes.
//!
//! The dashboard hands one channel to many unrelated consumers (notification
//! bell, matching panel, dashboard stats). [`ChannelHub::mount`] creates that
//! channel lazily on first use and returns a [`ChannelLease`]; the channel stays
//! up while any lease is alive and is shut down when the last one drops.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::channel::RealtimeChannel;
use super::transport::{Connector, TungsteniteConnector};
use crate::config::ChannelConfig;

struct Mounted {
    channel: RealtimeChannel,
    leases: usize,
}

struct HubInner {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    session: Option<watch::Receiver<Option<String>>>,
    slot: Mutex<Option<Mounted>>,
}

impl HubInner {
    fn slot(&self) -> MutexGuard<'_, Option<Mounted>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(self: &Arc<Self>) -> ChannelLease {
        let mut slot = self.slot();
        let mounted = slot.get_or_insert_with(|| {
            tracing::info!(url = %self.config.url, "Creating shared realtime channel");
            let channel = RealtimeChannel::new(self.config.clone(), self.connector.clone());
            if let Some(session) = &self.session {
                channel.watch_session(session.clone());
            }
            Mounted { channel, leases: 0 }
        });
        mounted.leases += 1;
        ChannelLease {
            hub: self.clone(),
            channel: mounted.channel.clone(),
        }
    }

    fn release(&self) {
        let unmounted = {
            let mut slot = self.slot();
            match slot.as_mut() {
                Some(mounted) if mounted.leases > 1 => {
                    mounted.leases -= 1;
                    None
                }
                Some(_) => slot.take(),
                None => None,
            }
        };
        if let Some(mounted) = unmounted {
            tracing::info!("Last consumer unmounted; shutting down realtime channel");
            mounted.channel.shutdown();
        }
    }
}

/// Owner of the application's single realtime channel.
#[derive(Clone)]
pub struct ChannelHub {
    inner: Arc<HubInner>,
}

impl ChannelHub {
    pub fn new(config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        Self::build(config, connector, None)
    }

    /// Hub whose channels follow the given session token.
    pub fn with_session(
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
        session: watch::Receiver<Option<String>>,
    ) -> Self {
        Self::build(config, connector, Some(session))
    }

    /// Hub over native WebSockets.
    pub fn with_tungstenite(config: ChannelConfig) -> Self {
        Self::new(config, Arc::new(TungsteniteConnector::new()))
    }

    fn build(
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
        session: Option<watch::Receiver<Option<String>>>,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                connector,
                session,
                slot: Mutex::new(None),
            }),
        }
    }

    /// Register a consumer, creating the channel if none is mounted.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn mount(&self) -> ChannelLease {
        self.inner.acquire()
    }

    /// The mounted channel, without registering a consumer.
    pub fn current(&self) -> Option<RealtimeChannel> {
        self.inner
            .slot()
            .as_ref()
            .map(|mounted| mounted.channel.clone())
    }

    /// Number of live leases.
    pub fn lease_count(&self) -> usize {
        self.inner.slot().as_ref().map_or(0, |mounted| mounted.leases)
    }
}

/// A consumer's hold on the shared channel. Derefs to [`RealtimeChannel`].
///
/// Cloning counts as another mount; dropping the last lease shuts the channel down.
pub struct ChannelLease {
    hub: Arc<HubInner>,
    channel: RealtimeChannel,
}

impl ChannelLease {
    pub fn channel(&self) -> &RealtimeChannel {
        &self.channel
    }
}

impl Deref for ChannelLease {
    type Target = RealtimeChannel;

    fn deref(&self) -> &Self::Target {
        &self.channel
    }
}

impl Clone for ChannelLease {
    fn clone(&self) -> Self {
        self.hub.acquire()
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.hub.release();
    }
}

impl std::fmt::Debug for ChannelLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ChannelLease").field(&self.channel).finish()
    }
}
