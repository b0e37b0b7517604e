use serde::Deserialize;

/// Endpoint used when `broker.url` is not configured anywhere.
///
/// Matches the broker's development default; production deployments are
/// expected to set `BROKER_URL` or a config file entry, and `load_config`
/// warns once at startup when they have not.
pub const DEFAULT_BROKER_URL: &str = "ws://127.0.0.1:8080/ws";

/// Top-level configuration for the roomsub client.
///
/// Covers the broker endpoint, the timing knobs of an established session,
/// and the reconnection backoff policy.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub session: SessionSettings,
    pub reconnect: ReconnectSettings,
}

/// Broker endpoint configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    /// WebSocket endpoint of the room broker (`ws://` or `wss://`).
    pub url: String,
}

/// Timing knobs for an established session.
#[derive(Debug, Deserialize, Clone)]
pub struct SessionSettings {
    /// Expected interval of broker traffic in milliseconds; silence longer
    /// than twice this window abandons the connection. `0` disables the
    /// watchdog.
    pub incoming_heartbeat_ms: u64,
    /// Interval between WebSocket pings sent to the broker, in milliseconds.
    /// `0` disables outgoing pings.
    pub outgoing_heartbeat_ms: u64,
    /// Time allowed for the WebSocket handshake, in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Reconnection backoff policy.
#[derive(Debug, Deserialize, Clone)]
pub struct ReconnectSettings {
    /// Delay table in milliseconds, indexed by attempt count. Attempts past
    /// the end of the table reuse its final entry, so retries plateau
    /// instead of growing forever.
    pub delays_ms: Vec<u64>,
}

/// Partial configuration loaded from files or the environment.
///
/// Every field is optional; missing values fall back to `Settings::default`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub session: Option<PartialSessionSettings>,
    pub reconnect: Option<PartialReconnectSettings>,
}

/// Partial broker endpoint settings.
#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub url: Option<String>,
}

/// Partial session timing settings.
#[derive(Debug, Deserialize)]
pub struct PartialSessionSettings {
    pub incoming_heartbeat_ms: Option<u64>,
    pub outgoing_heartbeat_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
}

/// Partial reconnection settings.
#[derive(Debug, Deserialize)]
pub struct PartialReconnectSettings {
    pub delays_ms: Option<Vec<u64>>,
}

/// Provides default values for `Settings`.
///
/// Ensures the client can run against a local development broker with no
/// configuration at all.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                url: DEFAULT_BROKER_URL.to_string(),
            },
            session: SessionSettings {
                incoming_heartbeat_ms: 10_000,
                outgoing_heartbeat_ms: 10_000,
                connect_timeout_ms: 8_000,
            },
            reconnect: ReconnectSettings {
                delays_ms: vec![1_000, 2_000, 5_000, 10_000, 30_000],
            },
        }
    }
}
