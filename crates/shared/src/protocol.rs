//! Real-time wire protocol shared by the dashboard and the event service.
//!
//! Every frame in both directions is a JSON [`Envelope`]:
//!
//! ```text
//! { "type": "match:new", "data": { ... }, "timestamp": 1718000000000 }
//! ```
//!
//! `type` routes the frame; `data` is opaque to the transport layer and
//! `timestamp` is advisory, stamped by whoever sent the frame.

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Close code sent by the client when it deliberately ends a connection.
///
/// Any other close code counts as an unplanned closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when a connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close reason paired with [`NORMAL_CLOSURE`].
pub const CLIENT_DISCONNECT_REASON: &str = "Client disconnect";

/// Event names carried in [`Envelope::kind`].
pub mod events {
    /// Outbound credential presentation (`{token}`).
    pub const AUTH: &str = "auth";
    /// Inbound handshake acknowledgement (`{userId}`).
    pub const AUTH_SUCCESS: &str = "auth:success";
    /// Inbound handshake rejection (`{message}`).
    pub const AUTH_ERROR: &str = "auth:error";

    pub const CONNECTION_ESTABLISHED: &str = "connection:established";
    pub const CONNECTION_LOST: &str = "connection:lost";

    pub const PROVIDER_UPDATE: &str = "provider:update";
    pub const PROVIDER_COUNT: &str = "provider:count";

    pub const MATCH_NEW: &str = "match:new";
    pub const MATCH_ACCEPTED: &str = "match:accepted";
    pub const MATCH_SCORE: &str = "match:score";
    /// Outbound: accept a proposed patient/provider match.
    pub const MATCH_ACCEPT: &str = "match:accept";
    pub const MATCHING_METRICS: &str = "matching:metrics";
    pub const MATCHING_ASSIGNMENT: &str = "matching:assignment";
    pub const MATCHING_QUEUE_UPDATE: &str = "matching:queue-update";

    pub const ANALYTICS_UPDATE: &str = "analytics:update";
    pub const DASHBOARD_STATS: &str = "dashboard:stats";
    pub const REVENUE_UPDATE: &str = "revenue:update";

    pub const NOTIFICATION: &str = "notification";
    pub const NOTIFICATION_NEW: &str = "notification:new";
    pub const NOTIFICATION_BROADCAST: &str = "notification:broadcast";
    pub const NOTIFICATION_READ: &str = "notification:read";

    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";

    /// Returns true for the handshake replies the channel consumes itself.
    pub fn is_auth_reply(kind: &str) -> bool {
        kind == AUTH_SUCCESS || kind == AUTH_ERROR
    }
}

/// A single frame on the real-time channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Sender wall clock in milliseconds since the Unix epoch.
    ///
    /// Advisory: fractional or string-encoded values are accepted, anything
    /// else decodes as `None` instead of rejecting the frame.
    #[serde(
        default,
        deserialize_with = "lenient_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
}

fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    })
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    pub fn new(kind: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Some(Utc::now().timestamp_millis()),
        }
    }

    /// Decode an inbound text frame.
    ///
    /// Frames that are not JSON objects with a string `type` are rejected.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        if !matches!(value.get("type"), Some(Value::String(_))) {
            return Err(ProtocolError::MissingType);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Encode for the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode `data` into a typed payload. A missing payload decodes as `null`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone().unwrap_or(Value::Null))
    }
}

/// Payload of the outbound `auth` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub token: String,
}

/// Payload of `auth:success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccess {
    pub user_id: String,
}

/// Payload of `auth:error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFailure {
    #[serde(default)]
    pub message: String,
}
