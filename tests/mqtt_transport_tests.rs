//! MQTT transport tests
//!
//! No broker is needed: options building and event routing are pure, and the
//! client handle only queues requests until its event loop is polled.


use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{ConnAck, ConnectReturnCode, Packet, Publish, SubAck};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{ConnectionError, Event};
use std::time::Duration;
use test_helpers::test_config;
use twinlink::config::DeviceCredentials;
use twinlink::engine::{Callbacks, EngineState, ProtocolEngine, TransportErrorKind, TransportEvent};
use twinlink::transport::mqtt::{
    classify_error, configure_mqtt_options, parse_broker_url, route_event, MqttClient, MqttError,
    ReconnectConfig,
};
use twinlink::transport::Transport;

#[test]
fn test_options_use_device_id_as_client_id() {
    let config = test_config();

    let options = configure_mqtt_options(&config, &DeviceCredentials::default()).unwrap();

    assert_eq!(options.client_id(), "dev1");
    assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
    assert_eq!(options.keep_alive(), Duration::from_secs(60));
}

#[test]
fn test_tls_urls_default_to_secure_port() {
    let address = parse_broker_url("mqtts://broker.example.com").unwrap();
    assert!(address.tls);
    assert_eq!(address.port, 8883);

    let address = parse_broker_url("tcp://10.0.0.5:1884").unwrap();
    assert!(!address.tls);
    assert_eq!(address.host, "10.0.0.5");
    assert_eq!(address.port, 1884);
}

#[test]
fn test_client_certificate_without_ca_is_rejected() {
    let mut config = test_config();
    config.mqtt.broker_url = "mqtts://broker.example.com".to_string();
    let credentials = DeviceCredentials {
        client_cert: Some(b"cert".to_vec()),
        client_key: Some(b"key".to_vec()),
        broker_ca: None,
    };

    let result = configure_mqtt_options(&config, &credentials);

    assert!(matches!(result, Err(MqttError::InvalidTlsConfig(_))));
}

#[test]
fn test_reconnect_backoff_schedule() {
    let reconnect = ReconnectConfig::default();
    let delays: Vec<u64> = (1..=6)
        .map(|attempt| reconnect.backoff_delay(attempt).as_millis() as u64)
        .collect();

    assert_eq!(delays, vec![25, 50, 100, 250, 250, 250]);
}

#[tokio::test]
async fn test_client_queues_requests_without_broker() {
    let config = test_config();
    let (client, _event_loop) = MqttClient::new(&config, &DeviceCredentials::default()).unwrap();

    assert_eq!(client.device_id(), "dev1");
    client
        .publish("device/dev1/telemetry/temp", b"21", QoS::AtLeastOnce, false)
        .unwrap();
    client
        .subscribe("device/dev1/commands/#", QoS::AtLeastOnce)
        .unwrap();
}

#[tokio::test]
async fn test_stopped_client_rejects_publishes() {
    let config = test_config();
    let (mut client, _event_loop) =
        MqttClient::new(&config, &DeviceCredentials::default()).unwrap();

    client.stop().unwrap();
    // Stopping twice is harmless
    client.stop().unwrap();

    assert!(client.is_stopped());
    let result = client.publish("device/dev1/telemetry/temp", b"21", QoS::AtMostOnce, false);
    assert!(matches!(result, Err(MqttError::Stopped)));
}

#[test]
fn test_routed_events_drive_the_engine() {
    // Arrange
    let transport = twinlink::testing::MockTransport::new();
    let callbacks = Callbacks::new().on_command(|_client, _name, _payload| Ok("{}".to_string()));
    let mut engine = ProtocolEngine::new("dev1", transport.clone(), callbacks);
    let connack = Event::Incoming(Packet::ConnAck(ConnAck {
        session_present: false,
        code: ConnectReturnCode::Success,
        properties: None,
    }));
    let suback = Event::Incoming(Packet::SubAck(SubAck {
        pkid: 7,
        return_codes: vec![],
        properties: None,
    }));
    let publish = Event::Incoming(Packet::Publish(Publish {
        dup: false,
        qos: QoS::AtLeastOnce,
        retain: false,
        topic: Bytes::from("device/dev1/commands/reset"),
        pkid: 3,
        payload: Bytes::from("{}"),
        properties: None,
    }));

    // Act
    for event in [connack, suback, publish] {
        if let Some(event) = route_event(&event) {
            engine.handle_event(event);
        }
    }

    // Assert
    assert_eq!(engine.state(), EngineState::Connected);
    assert_eq!(transport.subscriptions().len(), 3);
    let responses = transport.published_under("device/dev1/responses/reset");
    assert_eq!(responses.len(), 1);
}

#[tokio::test]
async fn test_network_timeout_is_a_tcp_error() {
    let elapsed = tokio::time::timeout(Duration::from_millis(1), std::future::pending::<()>())
        .await
        .unwrap_err();
    let error = ConnectionError::Timeout(elapsed);

    let event = classify_error(&error);

    assert!(matches!(
        event,
        TransportEvent::Error {
            kind: TransportErrorKind::TcpTransport,
            ..
        }
    ));
}
