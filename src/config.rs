//! Device configuration
//!
//! Loaded once from a TOML file at startup. Credential files referenced by the
//! `[mqtt]` section are read separately by [`DeviceCredentials::load`] so the
//! configuration itself stays printable.

use crate::protocol::validate_device_id;
use rumqttc::v5::mqttbytes::QoS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main device configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    pub device: DeviceSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub time_sync: TimeSyncSection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

/// Device identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device identifier (must match [A-Za-z0-9._:-]+)
    pub id: String,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL, `mqtt://` or `mqtts://`
    pub broker_url: String,
    /// Username presented to the broker; defaults to the device id
    pub username: Option<String>,
    /// Environment variable holding the broker password, if any
    pub password_env: Option<String>,
    /// PEM client certificate
    pub client_cert_path: Option<PathBuf>,
    /// PEM client private key
    pub client_key_path: Option<PathBuf>,
    /// PEM CA certificate of the broker
    pub broker_cert_path: Option<PathBuf>,
    /// QoS for all publishes and subscriptions (0, 1 or 2)
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Capacity of the request queue between client handle and event loop
    #[serde(default = "default_request_channel_capacity")]
    pub request_channel_capacity: usize,
}

fn default_qos() -> u8 {
    1
}

fn default_keep_alive() -> u64 {
    60
}

fn default_request_channel_capacity() -> usize {
    10
}

/// Wait for a plausible wall clock before the TLS handshake
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSyncSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for TimeSyncSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl TimeSyncSection {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    2000
}

/// Periodic telemetry of the device application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySection {
    #[serde(default = "default_telemetry_interval")]
    pub interval_secs: u64,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            interval_secs: default_telemetry_interval(),
        }
    }
}

fn default_telemetry_interval() -> u64 {
    10
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to read credential file {path}: {source}")]
    CredentialRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid device ID format: {0}")]
    InvalidDeviceId(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DeviceConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_id(&self.device.id).map_err(|e| {
            ConfigError::InvalidDeviceId(format!("Device ID '{}': {e}", self.device.id))
        })?;

        let url = url::Url::parse(&self.mqtt.broker_url)
            .map_err(|e| ConfigError::InvalidBrokerUrl(format!("{}: {e}", self.mqtt.broker_url)))?;
        if !matches!(url.scheme(), "mqtt" | "mqtts" | "tcp" | "ssl") {
            return Err(ConfigError::InvalidBrokerUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        if self.mqtt.qos > 2 {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.qos must be 0, 1 or 2, got {}",
                self.mqtt.qos
            )));
        }

        if self.mqtt.client_cert_path.is_some() != self.mqtt.client_key_path.is_some() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.client_cert_path and mqtt.client_key_path must be set together".to_string(),
            ));
        }

        if self.mqtt.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.keep_alive_secs must be at least 5, got {}",
                self.mqtt.keep_alive_secs
            )));
        }

        if self.mqtt.request_channel_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.request_channel_capacity must be at least 1".to_string(),
            ));
        }

        if self.time_sync.enabled && self.time_sync.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "time_sync.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.telemetry.interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "telemetry.interval_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Broker username, falling back to the device id
    pub fn mqtt_username(&self) -> &str {
        self.mqtt.username.as_deref().unwrap_or(&self.device.id)
    }

    /// Broker password from the configured environment variable
    pub fn mqtt_password(&self) -> Result<Option<String>, ConfigError> {
        match &self.mqtt.password_env {
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
            None => Ok(None),
        }
    }

    pub fn qos(&self) -> QoS {
        match self.mqtt.qos {
            0 => QoS::AtMostOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtLeastOnce,
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt.keep_alive_secs)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.interval_secs)
    }
}

/// Credential material, read once at startup and never rotated
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DeviceCredentials {
    pub client_cert: Option<Vec<u8>>,
    pub client_key: Option<Vec<u8>>,
    pub broker_ca: Option<Vec<u8>>,
}

impl std::fmt::Debug for DeviceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("DeviceCredentials")
            .field("client_cert", &self.client_cert.as_ref().map(Vec::len))
            .field("client_key", &self.client_key.as_ref().map(|_| "<redacted>"))
            .field("broker_ca", &self.broker_ca.as_ref().map(Vec::len))
            .finish()
    }
}

impl DeviceCredentials {
    /// Read every configured credential file
    pub fn load(mqtt: &MqttSection) -> Result<Self, ConfigError> {
        Ok(Self {
            client_cert: read_optional(mqtt.client_cert_path.as_deref())?,
            client_key: read_optional(mqtt.client_key_path.as_deref())?,
            broker_ca: read_optional(mqtt.broker_cert_path.as_deref())?,
        })
    }

    /// Client certificate and key, when both are present
    pub fn client_auth(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
            _ => None,
        }
    }
}

fn read_optional(path: Option<&Path>) -> Result<Option<Vec<u8>>, ConfigError> {
    path.map(|path| {
        std::fs::read(path).map_err(|source| ConfigError::CredentialRead {
            path: path.to_path_buf(),
            source,
        })
    })
    .transpose()
}
