//! Transport layer for device-cloud communication
//!
//! The protocol engine only needs three primitives from a pub/sub client:
//! publish, subscribe and stop. Connection management, TLS, framing and
//! reconnection stay inside the implementation (see [`mqtt`]).

use rumqttc::v5::mqttbytes::QoS;

pub mod mqtt;

/// Transport trait for the protocol engine
///
/// Calls are synchronous and non-blocking: implementations enqueue the request
/// and return. Acknowledgements arrive later as [`crate::engine::TransportEvent`]s.
pub trait Transport: Send + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Publish `payload` to `topic`
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool)
        -> Result<(), Self::Error>;

    /// Subscribe to a topic filter (may contain wildcards)
    fn subscribe(&self, topic_filter: &str, qos: QoS) -> Result<(), Self::Error>;

    /// Stop the session and release the connection
    fn stop(&mut self) -> Result<(), Self::Error>;
}

/// Type alias for MQTT transport
pub type MqttTransport = mqtt::MqttClient;
