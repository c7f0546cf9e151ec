//! `rumqttc`-backed implementation of [`Transport`]
//!
//! Requests are queued with the non-blocking `try_*` calls so the protocol
//! engine never awaits while it holds its lock. The paired [`EventLoop`] must be
//! polled (see [`super::session`]) for anything to reach the broker.

use super::connection::{configure_mqtt_options, MqttError};
use crate::config::{DeviceConfig, DeviceCredentials};
use crate::transport::Transport;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use tracing::{debug, info, warn};

/// MQTT transport handle
pub struct MqttClient {
    client: AsyncClient,
    device_id: String,
    stopped: bool,
}

impl MqttClient {
    /// Create the client handle and its event loop. Nothing connects until the
    /// event loop is polled.
    pub fn new(
        config: &DeviceConfig,
        credentials: &DeviceCredentials,
    ) -> Result<(Self, EventLoop), MqttError> {
        let mqtt_options = configure_mqtt_options(config, credentials)?;
        let (client, event_loop) =
            AsyncClient::new(mqtt_options, config.mqtt.request_channel_capacity);

        info!(
            device_id = %config.device.id,
            broker_url = %config.mqtt.broker_url,
            "MQTT transport initialized"
        );

        Ok((
            Self {
                client,
                device_id: config.device.id.clone(),
                stopped: false,
            },
            event_loop,
        ))
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Transport for MqttClient {
    type Error = MqttError;

    fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<(), MqttError> {
        if self.stopped {
            return Err(MqttError::Stopped);
        }

        self.client
            .try_publish(topic, qos, retain, payload.to_vec())
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;
        debug!(%topic, bytes = payload.len(), ?qos, "Publish queued");
        Ok(())
    }

    fn subscribe(&self, topic_filter: &str, qos: QoS) -> Result<(), MqttError> {
        if self.stopped {
            return Err(MqttError::Stopped);
        }

        self.client
            .try_subscribe(topic_filter, qos)
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))
    }

    fn stop(&mut self) -> Result<(), MqttError> {
        if self.stopped {
            return Ok(());
        }

        self.stopped = true;
        info!(device_id = %self.device_id, "Disconnecting from broker");
        self.client
            .try_disconnect()
            .map_err(|e| MqttError::DisconnectFailed(Box::new(e)))
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // Best effort; the event loop may already be gone.
        if !self.stopped {
            if let Err(e) = self.client.try_disconnect() {
                warn!(device_id = %self.device_id, error = %e, "Disconnect on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DeviceConfig {
        DeviceConfig::from_toml(
            "[device]\nid = \"dev1\"\n\n[mqtt]\nbroker_url = \"mqtt://localhost:1883\"\n",
        )
        .unwrap()
    }

    #[test]
    fn test_new_does_not_connect() {
        let (client, _event_loop) = MqttClient::new(&test_config(), &DeviceCredentials::default()).unwrap();
        assert_eq!(client.device_id(), "dev1");
        assert!(!client.is_stopped());
    }

    #[test]
    fn test_publish_is_queued_without_broker() {
        let (client, _event_loop) = MqttClient::new(&test_config(), &DeviceCredentials::default()).unwrap();
        assert!(client
            .publish("device/dev1/telemetry/temp", b"21", QoS::AtLeastOnce, false)
            .is_ok());
        assert!(client.subscribe("device/dev1/commands/#", QoS::AtLeastOnce).is_ok());
    }

    #[test]
    fn test_full_request_queue_is_an_error() {
        let config = DeviceConfig::from_toml(
            "[device]\nid = \"dev1\"\n\n[mqtt]\nbroker_url = \"mqtt://localhost:1883\"\nrequest_channel_capacity = 1\n",
        )
        .unwrap();
        let (client, _event_loop) = MqttClient::new(&config, &DeviceCredentials::default()).unwrap();

        assert!(client.publish("t/a", b"1", QoS::AtLeastOnce, false).is_ok());
        let result = client.publish("t/b", b"2", QoS::AtLeastOnce, false);
        assert!(matches!(result, Err(MqttError::PublishFailed(_))));
    }

    #[test]
    fn test_stopped_client_rejects_requests() {
        let (mut client, _event_loop) = MqttClient::new(&test_config(), &DeviceCredentials::default()).unwrap();

        client.stop().unwrap();

        assert!(client.is_stopped());
        assert!(matches!(
            client.publish("t", b"x", QoS::AtLeastOnce, false),
            Err(MqttError::Stopped)
        ));
        assert!(matches!(
            client.subscribe("t/#", QoS::AtLeastOnce),
            Err(MqttError::Stopped)
        ));
        // Second stop is a no-op
        assert!(client.stop().is_ok());
    }
}
