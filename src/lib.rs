//! twinlink - device-side cloud messaging over MQTT
//!
//! A device keeps one MQTT session to a broker and talks to the cloud through
//! five topics derived from its id:
//!
//! | Topic | Direction | Purpose |
//! |-------|-----------|---------|
//! | `device/{id}/telemetry/{sub}` | out | fire-and-forget readings |
//! | `device/{id}/twin/reported/{name}` | out | reported properties |
//! | `device/{id}/twin/desired/{name}` | in | desired properties |
//! | `device/{id}/commands/{name}` | in | command requests |
//! | `device/{id}/responses/{name}` | out | command responses |
//!
//! The [`engine::ProtocolEngine`] owns the topic set, the property caches and
//! the connection state; it routes every inbound message to the first
//! responsible [`engine::MessageHandler`]. [`transport::mqtt::DeviceSession`]
//! runs it over `rumqttc`.
//!
//! # Quick Start
//!
//! ```rust
//! use twinlink::engine::{Callbacks, ProtocolEngine, TransportEvent};
//! use twinlink::testing::MockTransport;
//!
//! let transport = MockTransport::new();
//! let callbacks = Callbacks::new().on_command(|_client, _name, _payload| {
//!     Ok(r#"{"result":"OK"}"#.to_string())
//! });
//! let mut engine = ProtocolEngine::new("dev1", transport.clone(), callbacks);
//!
//! engine.handle_event(TransportEvent::Connected);
//! engine.handle_event(TransportEvent::data("device/dev1/commands/light", r#"{"state":"on"}"#));
//!
//! let response = transport.published_under("device/dev1/responses/light");
//! assert_eq!(response[0].payload_str(), r#"{"status": 200, "payload": {"result":"OK"}}"#);
//! ```

pub mod app;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, DeviceConfig, DeviceCredentials};
pub use engine::{Callbacks, DeviceClient, EngineState, ProtocolEngine, TransportEvent};
pub use error::{CallbackError, DeviceError, DeviceResult};
pub use protocol::TopicSet;
pub use transport::mqtt::{DeviceSession, MqttClient};
pub use transport::Transport;
