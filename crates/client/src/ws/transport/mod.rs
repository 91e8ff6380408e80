//! Transport abstraction underneath the realtime channel.
//!
//! A [`Connector`] opens one physical connection per call and hands back a
//! [`TransportHandle`] for writes and closing. Everything the connection
//! observes (open, inbound text, close, errors) is reported through the
//! [`TransportSink`] it was given, which feeds the channel's event loop.

mod tungstenite;

pub use self::tungstenite::TungsteniteConnector;

use futures_channel::mpsc::UnboundedSender;
use thiserror::Error;

use super::channel::ChannelEvent;

/// Errors surfaced by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported endpoint scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("transport is closed")]
    Closed,
}

/// Notification raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed; writes are now accepted.
    Opened,
    /// One inbound text frame.
    Message(String),
    /// Connection ended. Always the last event of a transport.
    Closed { code: u16, reason: String },
    /// Non-fatal report; a `Closed` is expected to follow when the link is gone.
    Error(String),
}

/// Reporting end handed to a transport when it is opened.
///
/// Events are tagged with the generation of the transport they came from so
/// the channel can ignore anything a discarded transport still emits.
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: u64,
    events: UnboundedSender<ChannelEvent>,
}

impl TransportSink {
    pub(crate) fn new(generation: u64, events: UnboundedSender<ChannelEvent>) -> Self {
        Self { generation, events }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn message(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Message(text.into()));
    }

    pub fn closed(&self, code: u16, reason: impl Into<String>) {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(TransportEvent::Error(message.into()));
    }

    fn emit(&self, event: TransportEvent) {
        // The channel may already be gone; nothing left to notify then.
        let _ = self.events.unbounded_send(ChannelEvent::Transport {
            generation: self.generation,
            event,
        });
    }
}

/// Opens physical connections.
///
/// `open` must not block: it starts the handshake and returns immediately,
/// reporting progress through `sink`.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &str, sink: TransportSink)
        -> Result<Box<dyn TransportHandle>, TransportError>;
}

/// Write side of one open (or opening) connection.
pub trait TransportHandle: Send + 'static {
    /// Queue one text frame for delivery.
    fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Close the connection with the given code and reason.
    fn close(&self, code: u16, reason: &str);
}
