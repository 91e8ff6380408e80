//! In-memory transport for tests and offline demos.
//!
//! [`MemoryConnector`] records every transport the channel opens. Each
//! [`MemoryTransport`] plays the server side: it completes the handshake,
//! pushes frames, drops the connection and exposes everything the channel wrote.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use carenet_shared::Envelope;
use serde_json::Value;

use super::transport::{Connector, TransportError, TransportHandle, TransportSink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct ConnectorState {
    transports: Vec<MemoryTransport>,
    refuse_next: Option<String>,
}

/// Connector whose transports live entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many transports have been opened so far.
    pub fn open_count(&self) -> usize {
        lock(&self.state).transports.len()
    }

    pub fn transports(&self) -> Vec<MemoryTransport> {
        lock(&self.state).transports.clone()
    }

    /// Most recently opened transport.
    pub fn latest(&self) -> Option<MemoryTransport> {
        lock(&self.state).transports.last().cloned()
    }

    /// Make the next `open` fail synchronously with `reason`.
    pub fn refuse_next(&self, reason: impl Into<String>) {
        lock(&self.state).refuse_next = Some(reason.into());
    }
}

impl Connector for MemoryConnector {
    fn open(
        &self,
        url: &str,
        sink: TransportSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let mut state = lock(&self.state);
        if let Some(reason) = state.refuse_next.take() {
            return Err(TransportError::Refused(reason));
        }

        let log = Arc::new(Mutex::new(TransportLog::default()));
        state.transports.push(MemoryTransport {
            url: url.to_string(),
            sink: sink.clone(),
            log: log.clone(),
        });
        Ok(Box::new(MemoryHandle { sink, log }))
    }
}

#[derive(Default)]
struct TransportLog {
    sent: Vec<String>,
    closed: Option<(u16, String)>,
}

/// Server side of one in-memory connection.
#[derive(Clone)]
pub struct MemoryTransport {
    url: String,
    sink: TransportSink,
    log: Arc<Mutex<TransportLog>>,
}

impl MemoryTransport {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Complete the handshake.
    pub fn accept(&self) {
        self.sink.opened();
    }

    /// Deliver a raw text frame, well-formed or not.
    pub fn push_text(&self, text: impl Into<String>) {
        self.sink.message(text);
    }

    /// Deliver an envelope built from `kind` and `data`.
    pub fn push(&self, kind: &str, data: Option<Value>) {
        match Envelope::new(kind, data).to_json() {
            Ok(text) => self.sink.message(text),
            Err(e) => tracing::error!(kind, error = %e, "Failed to encode test frame"),
        }
    }

    /// Report a transport error without closing.
    pub fn fail(&self, message: &str) {
        self.sink.error(message);
    }

    /// Close from the server side with `code`.
    pub fn drop_connection(&self, code: u16, reason: &str) {
        lock(&self.log).closed.get_or_insert((code, reason.to_string()));
        self.sink.closed(code, reason);
    }

    /// Raw frames the channel wrote, in order.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.log).sent.clone()
    }

    /// Frames the channel wrote, decoded. Undecodable frames are skipped.
    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.sent()
            .iter()
            .filter_map(|text| Envelope::parse(text).ok())
            .collect()
    }

    /// Code and reason of the first close, from either side.
    pub fn closed_with(&self) -> Option<(u16, String)> {
        lock(&self.log).closed.clone()
    }
}

struct MemoryHandle {
    sink: TransportSink,
    log: Arc<Mutex<TransportLog>>,
}

impl TransportHandle for MemoryHandle {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut log = lock(&self.log);
        if log.closed.is_some() {
            return Err(TransportError::Closed);
        }
        log.sent.push(text);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        let first = {
            let mut log = lock(&self.log);
            let first = log.closed.is_none();
            log.closed.get_or_insert((code, reason.to_string()));
            first
        };
        if first {
            self.sink.closed(code, reason);
        }
    }
}
