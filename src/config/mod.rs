mod settings;

use crate::config::settings::PartialSettings;
use crate::utils::{BridgeError, Result};
use config::{Config, Environment, File};

pub use settings::{
    DEFAULT_MQTT_PORT, LogSettings, MqttSettings, RelaySettings, ServerSettings, Settings,
};

/// Environment variables the bridge has always been configured with.
pub const ENV_BROKER_URL: &str = "MQTT_BROKER_URL";
pub const ENV_TOPIC_PATTERN: &str = "MQTT_TOPIC_PATTERN";
pub const ENV_WS_PORT: &str = "WS_PORT";

/// Loads the configuration from the default file, `.env` and environment variables.
/// Merges the configuration with default values and validates the result, so a
/// missing or malformed broker URL is reported here rather than at connect time.
pub fn load_config() -> Result<Settings> {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("BRIDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("mqtt.broker_url", std::env::var(ENV_BROKER_URL).ok())?
        .set_override_option("mqtt.topic_pattern", std::env::var(ENV_TOPIC_PATTERN).ok())?
        .set_override_option("server.port", ws_port_from_env()?.map(i64::from))?;

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    let settings = Settings::merge(partial);
    settings.validate()?;
    Ok(settings)
}

fn ws_port_from_env() -> Result<Option<u16>> {
    match std::env::var(ENV_WS_PORT) {
        Ok(raw) => match raw.trim().parse::<u16>() {
            Ok(0) => Err(BridgeError::Config(format!(
                "invalid {ENV_WS_PORT} '{raw}': port must be between 1 and 65535"
            ))),
            Ok(port) => Ok(Some(port)),
            Err(e) => Err(BridgeError::Config(format!("invalid {ENV_WS_PORT} '{raw}': {e}"))),
        },
        Err(_) => Ok(None),
    }
}
