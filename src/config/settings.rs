use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::utils::{BridgeError, Result};

/// Port used when the broker URL does not name one.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Shortest MQTT keep-alive interval the bridge accepts.
pub const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Top-level configuration settings for the bridge.
///
/// Includes settings for the MQTT side, the WebSocket side, the relay and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub log: LogSettings,
}

/// Configuration settings for the inbound MQTT subscription.
///
/// `broker_url` has no default; an empty value fails validation.
#[derive(Debug, Deserialize, Clone)]
pub struct MqttSettings {
    pub broker_url: String,
    pub topic_pattern: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

/// Configuration settings for the WebSocket listener.
///
/// Defines the host and port the listener will bind to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the relay.
///
/// `max_connections` of 0 disables the limit.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    pub max_connections: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub mqtt: Option<PartialMqttSettings>,
    pub server: Option<PartialServerSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialMqttSettings {
    pub broker_url: Option<String>,
    pub topic_pattern: Option<String>,
    pub client_id: Option<String>,
    pub keep_alive_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialRelaySettings {
    pub max_connections: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
///
/// Everything except the broker URL has a usable default.
impl Default for Settings {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings {
                broker_url: String::new(),
                topic_pattern: "classroom/+/telemetry".to_string(),
                client_id: format!("telemetry-bridge-{}", uuid::Uuid::new_v4()),
                keep_alive_secs: 30,
            },
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            relay: RelaySettings {
                max_connections: 1000,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fills every missing field of `partial` from `Settings::default()`.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let mqtt = partial.mqtt.unwrap_or_default();
        let server = partial.server.unwrap_or_default();
        let relay = partial.relay.unwrap_or_default();
        let log = partial.log.unwrap_or_default();

        Settings {
            mqtt: MqttSettings {
                broker_url: mqtt.broker_url.unwrap_or(default.mqtt.broker_url),
                topic_pattern: mqtt.topic_pattern.unwrap_or(default.mqtt.topic_pattern),
                client_id: mqtt.client_id.unwrap_or(default.mqtt.client_id),
                keep_alive_secs: mqtt.keep_alive_secs.unwrap_or(default.mqtt.keep_alive_secs),
            },
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
            },
            relay: RelaySettings {
                max_connections: relay
                    .max_connections
                    .unwrap_or(default.relay.max_connections),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }

    /// Rejects settings the bridge cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.mqtt.endpoint()?;
        self.mqtt.keep_alive()?;

        if self.mqtt.topic_pattern.trim().is_empty() {
            return Err(BridgeError::Config(
                "MQTT topic pattern must not be empty".to_string(),
            ));
        }
        if self.mqtt.client_id.trim().is_empty() {
            return Err(BridgeError::Config(
                "MQTT client id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Address the WebSocket listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl MqttSettings {
    /// Keep-alive interval for the MQTT session. Values below
    /// [`MIN_KEEP_ALIVE_SECS`] are rejected rather than rounded up.
    pub fn keep_alive(&self) -> Result<Duration> {
        if self.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(BridgeError::Config(format!(
                "MQTT keep-alive must be at least {MIN_KEEP_ALIVE_SECS} seconds (got {})",
                self.keep_alive_secs
            )));
        }
        Ok(Duration::from_secs(self.keep_alive_secs))
    }

    /// Resolves the broker URL into the `(host, port)` pair the MQTT client needs.
    pub fn endpoint(&self) -> Result<(String, u16)> {
        let raw = self.broker_url.trim();
        if raw.is_empty() {
            return Err(BridgeError::Config(
                "MQTT broker URL is required (set MQTT_BROKER_URL)".to_string(),
            ));
        }

        let url = Url::parse(raw)
            .map_err(|e| BridgeError::Config(format!("invalid MQTT broker URL '{raw}': {e}")))?;

        match url.scheme() {
            "mqtt" | "tcp" => {}
            other => {
                return Err(BridgeError::Config(format!(
                    "unsupported MQTT broker scheme '{other}' (expected mqtt:// or tcp://)"
                )));
            }
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BridgeError::Config(format!("MQTT broker URL '{raw}' has no host")))?;

        Ok((host.to_string(), url.port().unwrap_or(DEFAULT_MQTT_PORT)))
    }
}
