use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

const DEFAULT_BASE_URL: &str = "https://api.netatmo.com";
const DEFAULT_INTERVAL_SECS: u64 = 300;
const DEFAULT_TOPIC_PREFIX: &str = "netatmo";
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_MQTT_CLIENT_ID: &str = "netatmobridge";
const DEFAULT_TOKEN_FILE: &str = "token.json";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SAFETY_MARGIN_SECS: u64 = 800;

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Username and password, only when both are configured
    pub credentials: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Always ends with a slash so endpoint paths can be joined onto it
    pub base_url: Url,
    pub interval: Duration,
    pub topic_prefix: String,
    pub token_file: PathBuf,
    pub http_timeout: Duration,
    pub safety_margin: Duration,
    pub mqtt: MqttConfig,
}

impl BridgeConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let client_id = required("CLIENT_ID")?;
        let client_secret = required("CLIENT_SECRET")?;
        let mqtt_host = required("MQTT_HOST")?;

        let base_url = parse_base_url(
            &lookup("BASEURL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        )?;

        let interval = parse_secs(&lookup, "INTERVAL", DEFAULT_INTERVAL_SECS)?;
        if interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "INTERVAL",
                value: "0".into(),
                reason: "interval must be at least one second".into(),
            });
        }
        let http_timeout = parse_secs(&lookup, "HTTP_TIMEOUT", DEFAULT_HTTP_TIMEOUT_SECS)?;
        let safety_margin =
            parse_secs(&lookup, "TOKEN_SAFETY_MARGIN", DEFAULT_SAFETY_MARGIN_SECS)?;

        let port = match lookup("MQTT_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "MQTT_PORT",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_MQTT_PORT,
        };

        // Broker credentials are only used when both halves are present
        let credentials = match (lookup("MQTT_USER"), lookup("MQTT_PASSWORD")) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user, password))
            }
            _ => None,
        };

        Ok(BridgeConfig {
            client_id,
            client_secret,
            base_url,
            interval,
            topic_prefix: lookup("MQTT_TOPIC_PREFIX")
                .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string()),
            token_file: lookup("TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE)),
            http_timeout,
            safety_margin,
            mqtt: MqttConfig {
                host: mqtt_host,
                port,
                client_id: lookup("MQTT_CLIENT_ID")
                    .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
                credentials,
            },
        })
    }
}

fn parse_secs<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        None => Ok(Duration::from_secs(default)),
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        key: "BASEURL",
        value: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Configuration pointing the bridge at a mock API server
#[cfg(test)]
pub fn test_config(base_url: &str) -> BridgeConfig {
    let base = base_url.to_string();
    BridgeConfig::from_lookup(move |key| match key {
        "CLIENT_ID" => Some("test-client".into()),
        "CLIENT_SECRET" => Some("test-secret".into()),
        "MQTT_HOST" => Some("localhost".into()),
        "BASEURL" => Some(base.clone()),
        "HTTP_TIMEOUT" => Some("2".into()),
        _ => None,
    })
    .expect("test configuration is valid")
}
