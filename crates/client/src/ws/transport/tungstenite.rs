//! Native WebSocket transport using tokio-tungstenite.

use std::time::Duration;

use carenet_shared::ABNORMAL_CLOSURE;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
};
use url::Url;

use super::{Connector, TransportError, TransportHandle, TransportSink};

/// Close code reported when the peer sent a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// How long the WebSocket handshake may take before the attempt is abandoned.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connector backed by `tokio-tungstenite`.
///
/// Each call to [`Connector::open`] spawns one task on the current Tokio
/// runtime that owns the socket until it closes.
#[derive(Debug, Clone, Copy)]
pub struct TungsteniteConnector {
    handshake_timeout: Duration,
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handshake that has not completed after `timeout` is reported as an
    /// abnormal closure.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Connector for TungsteniteConnector {
    fn open(
        &self,
        url: &str,
        sink: TransportSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let url = Url::parse(url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(TransportError::UnsupportedScheme(other.to_string())),
        }

        let (outbound_tx, outbound_rx) = unbounded_channel();
        tokio::spawn(run_connection(
            url,
            self.handshake_timeout,
            sink,
            outbound_rx,
        ));

        Ok(Box::new(TungsteniteHandle {
            outbound: outbound_tx,
        }))
    }
}

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

struct TungsteniteHandle {
    outbound: UnboundedSender<Outbound>,
}

impl TransportHandle for TungsteniteHandle {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

/// Drive one socket from handshake to close.
///
/// A close request or a dropped handle also ends a handshake still in flight.
async fn run_connection(
    url: Url,
    handshake_timeout: Duration,
    sink: TransportSink,
    mut outbound: UnboundedReceiver<Outbound>,
) {
    let generation = sink.generation();

    let handshake = tokio::time::timeout(handshake_timeout, connect_async(url.as_str()));
    tokio::pin!(handshake);
    let ws_stream = loop {
        tokio::select! {
            result = &mut handshake => match result {
                Ok(Ok((ws_stream, _response))) => break ws_stream,
                Ok(Err(e)) => {
                    tracing::warn!(%url, generation, error = %e, "WebSocket handshake failed");
                    sink.error(e.to_string());
                    sink.closed(ABNORMAL_CLOSURE, e.to_string());
                    return;
                }
                Err(_) => {
                    let message = format!(
                        "handshake timed out after {} ms",
                        handshake_timeout.as_millis()
                    );
                    tracing::warn!(%url, generation, "WebSocket handshake timed out");
                    sink.error(message.clone());
                    sink.closed(ABNORMAL_CLOSURE, message);
                    return;
                }
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(_)) => {
                    tracing::debug!(generation, "Dropping frame queued before handshake completed");
                }
                Some(Outbound::Close { code, reason }) => {
                    tracing::debug!(generation, code, "Handshake abandoned by client");
                    sink.closed(code, reason);
                    return;
                }
                None => return,
            }
        }
    };

    tracing::debug!(%url, generation, "WebSocket handshake complete");
    sink.opened();

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => sink.message(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    tracing::debug!(generation, code, %reason, "Received close frame");
                    sink.closed(code, reason);
                    return;
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(generation, len = data.len(), "Ignoring binary frame");
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite.
                }
                Some(Err(e)) => {
                    tracing::warn!(generation, error = %e, "WebSocket read error");
                    sink.error(e.to_string());
                    sink.closed(ABNORMAL_CLOSURE, e.to_string());
                    return;
                }
                None => {
                    sink.closed(ABNORMAL_CLOSURE, "stream ended");
                    return;
                }
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        tracing::warn!(generation, error = %e, "WebSocket write failed");
                        sink.error(e.to_string());
                        sink.closed(ABNORMAL_CLOSURE, e.to_string());
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        tracing::debug!(generation, error = %e, "Close frame not delivered");
                    }
                    sink.closed(code, reason);
                    return;
                }
                None => {
                    // Handle dropped without an explicit close.
                    let _ = write.close().await;
                    return;
                }
            }
        }
    }
}
