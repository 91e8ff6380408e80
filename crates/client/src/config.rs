//! Channel configuration from defaults and environment variables.

use std::time::Duration;

/// Endpoint used when nothing is configured.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";

/// Default delay before each reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Default ceiling on consecutive reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Options recognized by [`RealtimeChannel`](crate::ws::RealtimeChannel).
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Endpoint the transport connects to.
    pub url: String,
    /// Connect as soon as the channel is created.
    pub auto_connect: bool,
    /// Reconnect policy applied after unplanned closures.
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            auto_connect: true,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect.delay = delay;
        self
    }

    pub fn max_reconnect_attempts(mut self, max_attempts: u32) -> Self {
        self.reconnect.max_attempts = max_attempts;
        self
    }

    /// Build the configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CARENET_WS_URL`: full WebSocket endpoint (wins when set)
    /// - `CARENET_API_URL`: REST base URL; `http` becomes `ws` and `/ws` is appended
    /// - `CARENET_WS_AUTO_CONNECT`: "true" | "false" (default: "true")
    /// - `CARENET_WS_RECONNECT_DELAY_MS`: delay in milliseconds (default: 3000)
    /// - `CARENET_WS_MAX_RECONNECT_ATTEMPTS`: attempt ceiling (default: 5)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ChannelConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let url = lookup("CARENET_WS_URL")
            .filter(|url| !url.trim().is_empty())
            .or_else(|| lookup("CARENET_API_URL").map(|api| ws_url_from_api(&api)))
            .unwrap_or(defaults.url);

        let auto_connect = parse_var(&lookup, "CARENET_WS_AUTO_CONNECT", defaults.auto_connect);
        let delay_ms = parse_var(
            &lookup,
            "CARENET_WS_RECONNECT_DELAY_MS",
            defaults.reconnect.delay.as_millis() as u64,
        );
        let max_attempts = parse_var(
            &lookup,
            "CARENET_WS_MAX_RECONNECT_ATTEMPTS",
            defaults.reconnect.max_attempts,
        );

        Self {
            url,
            auto_connect,
            reconnect: ReconnectPolicy {
                delay: Duration::from_millis(delay_ms),
                max_attempts,
            },
        }
    }
}

/// Fixed-delay, bounded reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before each attempt.
    pub delay: Duration,
    /// Maximum consecutive attempts without a successful open.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Whether another attempt may be scheduled after `attempts_so_far`.
    pub fn allows(&self, attempts_so_far: u32) -> bool {
        attempts_so_far < self.max_attempts
    }
}

/// Derive the WebSocket endpoint from the REST base URL.
pub fn ws_url_from_api(api_url: &str) -> String {
    let trimmed = api_url.trim().trim_end_matches('/');
    let ws_base = match trimmed.strip_prefix("http") {
        Some(rest) => format!("ws{}", rest),
        None => trimmed.to_string(),
    };
    format!("{}/ws", ws_base)
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ChannelConfig::from_lookup(|_| None);
        assert_eq!(config.url, DEFAULT_WS_URL);
        assert!(config.auto_connect);
        assert_eq!(config.reconnect.delay, Duration::from_millis(3000));
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn api_url_is_rewritten_to_ws_endpoint() {
        assert_eq!(ws_url_from_api("https://api.carenet.io/"), "wss://api.carenet.io/ws");
        assert_eq!(ws_url_from_api("http://localhost:4000"), "ws://localhost:4000/ws");

        let config = ChannelConfig::from_lookup(lookup_from(&[(
            "CARENET_API_URL",
            "https://api.carenet.io",
        )]));
        assert_eq!(config.url, "wss://api.carenet.io/ws");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let config = ChannelConfig::from_lookup(lookup_from(&[
            ("CARENET_WS_URL", "ws://events.internal:9000/realtime"),
            ("CARENET_API_URL", "https://api.carenet.io"),
        ]));
        assert_eq!(config.url, "ws://events.internal:9000/realtime");
    }

    #[test]
    fn numeric_settings_fall_back_when_unparseable() {
        let config = ChannelConfig::from_lookup(lookup_from(&[
            ("CARENET_WS_AUTO_CONNECT", "false"),
            ("CARENET_WS_RECONNECT_DELAY_MS", "soon"),
            ("CARENET_WS_MAX_RECONNECT_ATTEMPTS", "2"),
        ]));
        assert!(!config.auto_connect);
        assert_eq!(config.reconnect.delay, DEFAULT_RECONNECT_DELAY);
        assert_eq!(config.reconnect.max_attempts, 2);
    }

    #[test]
    fn policy_allows_until_ceiling() {
        let policy = ReconnectPolicy {
            delay: Duration::from_millis(100),
            max_attempts: 3,
        };
        assert!(policy.allows(0));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }
}
