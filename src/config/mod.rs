//! Configuration loading for the roomsub client.
//!
//! Settings merge three layers: the optional `config/default` file,
//! environment variables (`BROKER_URL` and friends), and compiled-in
//! defaults.

pub mod settings;

#[cfg(test)]
mod tests;

use std::sync::Once;

use config::{Config, ConfigError, Environment, File};
use tracing::warn;
use url::Url;

use crate::config::settings::PartialSettings;

pub use settings::{
    BrokerSettings, DEFAULT_BROKER_URL, ReconnectSettings, SessionSettings, Settings,
};

static ENDPOINT_FALLBACK_WARNING: Once = Once::new();

/// Loads the configuration from the default file and environment variables,
/// merging partial values over `Settings::default()`.
///
/// Fails when the broker endpoint is supplied but is not a valid `ws://` or
/// `wss://` URL. An absent endpoint falls back to [`DEFAULT_BROKER_URL`]
/// with a one-time warning.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::default().separator("_"));

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();

    let url = match partial.broker.as_ref().and_then(|b| b.url.clone()) {
        Some(url) => url,
        None => {
            ENDPOINT_FALLBACK_WARNING.call_once(|| {
                warn!("broker.url is not configured; falling back to {DEFAULT_BROKER_URL}");
            });
            default.broker.url
        }
    };
    validate_endpoint(&url)?;

    let delays_ms = match partial.reconnect.as_ref().and_then(|r| r.delays_ms.clone()) {
        Some(table) if table.is_empty() => {
            warn!("reconnect.delays_ms is empty; using the default backoff table");
            default.reconnect.delays_ms
        }
        Some(table) => table,
        None => default.reconnect.delays_ms,
    };

    Ok(Settings {
        broker: BrokerSettings { url },
        session: SessionSettings {
            incoming_heartbeat_ms: partial
                .session
                .as_ref()
                .and_then(|s| s.incoming_heartbeat_ms)
                .unwrap_or(default.session.incoming_heartbeat_ms),
            outgoing_heartbeat_ms: partial
                .session
                .as_ref()
                .and_then(|s| s.outgoing_heartbeat_ms)
                .unwrap_or(default.session.outgoing_heartbeat_ms),
            connect_timeout_ms: partial
                .session
                .as_ref()
                .and_then(|s| s.connect_timeout_ms)
                .unwrap_or(default.session.connect_timeout_ms),
        },
        reconnect: ReconnectSettings { delays_ms },
    })
}

fn validate_endpoint(url: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url)
        .map_err(|e| ConfigError::Message(format!("invalid broker.url `{url}`: {e}")))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ConfigError::Message(format!(
            "broker.url must use the ws or wss scheme, got `{other}`"
        ))),
    }
}
