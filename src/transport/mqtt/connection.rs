//! Connection configuration for the MQTT transport
//!
//! Pure functions turning a [`DeviceConfig`] plus credential bytes into
//! `rumqttc` options, and the reconnect backoff schedule used by the session
//! driver.

use crate::config::{ConfigError, DeviceConfig, DeviceCredentials};
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Backoff pattern in milliseconds, one entry per consecutive failure
    pub backoff_pattern: Vec<u64>,
    /// Delay once the pattern is exhausted; retries never stop
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![25, 50, 100, 250],
            sustained_delay: 250,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry number `attempt` (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        let millis = self
            .backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay);
        Duration::from_millis(millis)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid TLS configuration: {0}")]
    InvalidTlsConfig(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Disconnect failed")]
    DisconnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Transport already stopped")]
    Stopped,
}

/// Where and how to reach the broker, extracted from the broker URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse `mqtt://`, `mqtts://`, `tcp://` or `ssl://` URLs. Ports default to
/// 1883 and 8883 for TLS.
pub fn parse_broker_url(broker_url: &str) -> Result<BrokerAddress, MqttError> {
    let url = Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    let tls = match url.scheme() {
        "mqtts" | "ssl" => true,
        "mqtt" | "tcp" => false,
        _ => return Err(MqttError::InvalidBrokerUrl(broker_url.to_string())),
    };

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls,
    })
}

/// Pick the TLS setup for a `mqtts://` broker.
///
/// With a broker CA the client certificate (if any) is presented; without one
/// the platform roots are used and client authentication is impossible.
fn tls_transport(credentials: &DeviceCredentials) -> Result<RumqttcTransport, MqttError> {
    match (&credentials.broker_ca, credentials.client_auth()) {
        (Some(ca), client_auth) => Ok(RumqttcTransport::tls(ca.clone(), client_auth, None)),
        (None, None) => Ok(RumqttcTransport::tls_with_default_config()),
        (None, Some(_)) => Err(MqttError::InvalidTlsConfig(
            "client certificate requires mqtt.broker_cert_path".to_string(),
        )),
    }
}

/// Build `rumqttc` options for this device
pub fn configure_mqtt_options(
    config: &DeviceConfig,
    credentials: &DeviceCredentials,
) -> Result<MqttOptions, MqttError> {
    let address = parse_broker_url(&config.mqtt.broker_url)?;

    // The device id doubles as MQTT client id so a reconnecting device takes over its old session.
    let mut mqtt_options = MqttOptions::new(&config.device.id, &address.host, address.port);

    if address.tls {
        mqtt_options.set_transport(tls_transport(credentials)?);
    } else if credentials.client_auth().is_some() || credentials.broker_ca.is_some() {
        warn!(
            broker_url = %config.mqtt.broker_url,
            "Certificates configured for a plaintext broker URL, ignoring them"
        );
    }

    let password = config.mqtt_password()?.unwrap_or_default();
    mqtt_options.set_credentials(config.mqtt_username(), password);
    mqtt_options.set_keep_alive(config.keep_alive());

    debug!(
        host = %address.host,
        port = address.port,
        tls = address.tls,
        client_id = %config.device.id,
        "Configured MQTT options"
    );
    Ok(mqtt_options)
}
