//! MQTT transport built on `rumqttc`
//!
//! # Architecture
//!
//! - [`connection`] - Pure option building: broker URL, TLS, credentials, backoff
//! - [`event_router`] - Pure mapping from `rumqttc` events to engine events
//! - [`client`] - [`Transport`](crate::transport::Transport) implementation
//! - [`session`] - The spawned driver that polls the event loop
//!
//! # Usage
//!
//! ```rust,no_run
//! use twinlink::config::{DeviceConfig, DeviceCredentials};
//! use twinlink::engine::Callbacks;
//! use twinlink::transport::mqtt::DeviceSession;
//!
//! # tokio_test::block_on(async {
//! let config = DeviceConfig::load_from_file(std::path::Path::new("device.toml"))?;
//! let credentials = DeviceCredentials::load(&config.mqtt)?;
//!
//! let callbacks = Callbacks::new().on_command(|_client, _name, _payload| {
//!     Ok(r#"{"result":"OK"}"#.to_string())
//! });
//! let mut session = DeviceSession::start(&config, &credentials, callbacks)?;
//!
//! session.engine().lock().await.send_telemetry("temperature", "21.5");
//! session.shutdown().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod event_router;
pub mod session;

pub use client::MqttClient;
pub use connection::{configure_mqtt_options, parse_broker_url, BrokerAddress, MqttError, ReconnectConfig};
pub use event_router::{classify_error, route_event};
pub use session::{DeviceSession, SharedEngine};
