//! Topic-routing and protocol-state engine
//!
//! [`ProtocolEngine`] consumes [`TransportEvent`]s one at a time. It subscribes to
//! the inbound topics on every connect, routes each inbound message to the first
//! responsible [`MessageHandler`], keeps the property caches and gates every
//! publish on the connection state.
//!
//! The engine is split so application callbacks can publish while a handler is
//! running: [`DeviceClient`] owns everything a callback may touch (topics, store,
//! transport, state), [`Callbacks`] owns the application closures and
//! [`EngineContext`] borrows both for the duration of one dispatch.

pub mod events;
pub mod handlers;
pub mod properties;
pub mod state;

pub use events::{TransportErrorKind, TransportEvent};
pub use handlers::{CommandHandler, DesiredPropertyHandler, HandlerSet, MessageHandler};
pub use properties::PropertyStore;
pub use state::{can_publish, next_state, EngineState, StateEvent};

use crate::dispatch_span;
use crate::error::{CallbackError, DeviceError, DeviceResult};
use crate::observability::EngineMetrics;
use crate::protocol::{
    error_envelope, TopicSet, COMMAND_CALLBACK_FAILED, COMMAND_CALLBACK_PANICKED,
    NO_COMMAND_CALLBACK,
};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use crate::transport::Transport;
use rumqttc::v5::mqttbytes::QoS;
use tracing::{debug, error, info, warn};

/// Application command callback: `(client, command_name, payload) -> result`.
///
/// An empty result means "no response". Errors become an error envelope.
pub type CommandCallback<T> = Box<
    dyn FnMut(&mut DeviceClient<T>, &str, &str) -> Result<String, CallbackError> + Send,
>;

/// Application desired-property callback: `(client, property_name, value)`.
pub type DesiredPropertyCallback<T> =
    Box<dyn FnMut(&mut DeviceClient<T>, &str, &str) -> Result<(), CallbackError> + Send>;

/// The publishing surface of the engine, handed to application callbacks.
pub struct DeviceClient<T: Transport> {
    device_id: String,
    topics: TopicSet,
    properties: PropertyStore,
    transport: T,
    state: EngineState,
    qos: QoS,
    metrics: EngineMetrics,
}

impl<T: Transport> DeviceClient<T> {
    fn new(device_id: String, transport: T) -> Self {
        let topics = TopicSet::new(&device_id);
        Self {
            device_id,
            topics,
            properties: PropertyStore::new(),
            transport,
            state: EngineState::default(),
            qos: QoS::AtLeastOnce,
            metrics: EngineMetrics::new(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        can_publish(self.state)
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Publish `payload` under the telemetry topic.
    ///
    /// Telemetry is fire-and-forget: when disconnected it is logged and dropped,
    /// nothing is queued for later.
    pub fn send_telemetry(&self, sub_topic: &str, payload: &str) {
        let topic = self.topics.telemetry_topic(sub_topic);
        if !self.is_connected() {
            error!(%topic, state = ?self.state, "Not connected, telemetry dropped");
            return;
        }

        info!(%topic, %payload, "Sending telemetry");
        if self.publish(&topic, payload.as_bytes()).is_ok() {
            self.metrics.telemetry_sent();
        }
    }

    /// Publish a reported property and, only once that succeeds, cache it.
    pub fn update_reported_property(&mut self, name: &str, value: &str) -> DeviceResult<()> {
        let topic = self.topics.reported_property_topic(name);
        info!(%topic, property = name, %value, "Updating reported property");

        self.publish(&topic, value.as_bytes())?;
        self.properties.set_reported(name, value);
        Ok(())
    }

    /// Latest desired value, `""` when never received.
    pub fn get_desired_property(&self, name: &str) -> String {
        self.properties.get_desired(name)
    }

    /// Latest reported value, `""` when never reported.
    pub fn get_reported_property(&self, name: &str) -> String {
        self.properties.get_reported(name)
    }

    pub fn desired_property(&self, name: &str) -> Option<&str> {
        self.properties.desired(name)
    }

    pub fn reported_property(&self, name: &str) -> Option<&str> {
        self.properties.reported(name)
    }

    /// Publish a command response body under `responses/{command_name}`.
    pub fn publish_response(&self, command_name: &str, body: &str) -> DeviceResult<()> {
        let topic = self.topics.response_topic(command_name);
        info!(%topic, %body, "Publishing command response");
        self.publish(&topic, body.as_bytes())
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> DeviceResult<()> {
        if !self.is_connected() {
            warn!(%topic, state = ?self.state, "Publish rejected, not connected");
            self.metrics.publish_failed();
            return Err(DeviceError::not_connected(self.state));
        }

        match self.transport.publish(topic, payload, self.qos, false) {
            Ok(()) => {
                self.metrics.message_published();
                Ok(())
            }
            Err(e) => {
                error!(%topic, error = %e, "Publish failed");
                self.metrics.publish_failed();
                Err(DeviceError::transport(e))
            }
        }
    }

    /// Subscribe to every inbound filter. Each call is independent; returns how
    /// many were accepted by the transport.
    fn subscribe_inbound(&self) -> usize {
        let mut accepted = 0;
        for filter in self.topics.subscription_filters() {
            match self.transport.subscribe(&filter, self.qos) {
                Ok(()) => {
                    info!(topic = %filter, "Subscribe sent");
                    accepted += 1;
                }
                Err(e) => error!(topic = %filter, error = %e, "Subscribe failed"),
            }
        }
        accepted
    }

    fn transition(&mut self, event: StateEvent) {
        self.state = next_state(self.state, event);
    }
}

/// Application callbacks, registered once before the session starts.
pub struct Callbacks<T: Transport> {
    command: Option<CommandCallback<T>>,
    desired_property: Option<DesiredPropertyCallback<T>>,
}

impl<T: Transport> Default for Callbacks<T> {
    fn default() -> Self {
        Self {
            command: None,
            desired_property: None,
        }
    }
}

impl<T: Transport> Callbacks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_command<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut DeviceClient<T>, &str, &str) -> Result<String, CallbackError>
            + Send
            + 'static,
    {
        self.command = Some(Box::new(callback));
        self
    }

    pub fn on_desired_property<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut DeviceClient<T>, &str, &str) -> Result<(), CallbackError> + Send + 'static,
    {
        self.desired_property = Some(Box::new(callback));
        self
    }
}

/// What a handler can do while processing one message
pub struct EngineContext<'a, T: Transport> {
    client: &'a mut DeviceClient<T>,
    callbacks: &'a mut Callbacks<T>,
}

impl<'a, T: Transport> EngineContext<'a, T> {
    pub fn new(client: &'a mut DeviceClient<T>, callbacks: &'a mut Callbacks<T>) -> Self {
        Self { client, callbacks }
    }

    pub fn client(&mut self) -> &mut DeviceClient<T> {
        self.client
    }

    /// Run the command callback. Never fails: a missing callback or a callback
    /// error is turned into an error envelope.
    pub fn activate_command(&mut self, command_name: &str, payload: &str) -> String {
        info!(command = command_name, %payload, "Activating command");

        let Some(callback) = self.callbacks.command.as_mut() else {
            warn!(command = command_name, "No command callback registered");
            self.client.metrics.command_failed();
            return error_envelope(NO_COMMAND_CALLBACK);
        };

        let client = &mut *self.client;
        let outcome = catch_unwind(AssertUnwindSafe(|| callback(client, command_name, payload)));
        match outcome {
            Ok(Ok(result)) => {
                debug!(command = command_name, %result, "Command completed");
                self.client.metrics.command_executed();
                result
            }
            Ok(Err(e)) => {
                error!(command = command_name, error = %e, "Command callback failed");
                self.client.metrics.command_failed();
                error_envelope(COMMAND_CALLBACK_FAILED)
            }
            Err(panic) => {
                error!(
                    command = command_name,
                    panic = panic_message(panic.as_ref()),
                    "Command callback panicked"
                );
                self.client.metrics.command_failed();
                error_envelope(COMMAND_CALLBACK_PANICKED)
            }
        }
    }

    /// Cache the desired value, then notify the application if it listens.
    pub fn on_desired_property_update(&mut self, property_name: &str, value: &str) {
        self.client.properties.set_desired(property_name, value);
        self.client.metrics.desired_update();

        let Some(callback) = self.callbacks.desired_property.as_mut() else {
            debug!(property = property_name, "No desired property callback registered");
            return;
        };

        let client = &mut *self.client;
        match catch_unwind(AssertUnwindSafe(|| callback(client, property_name, value))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(property = property_name, error = %e, "Desired property callback failed");
            }
            Err(panic) => {
                error!(
                    property = property_name,
                    panic = panic_message(panic.as_ref()),
                    "Desired property callback panicked"
                );
            }
        }
    }

    pub fn publish_response(&self, command_name: &str, body: &str) -> DeviceResult<()> {
        self.client.publish_response(command_name, body)
    }
}

/// Text of a caught panic payload, when it carries one
fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

/// Protocol engine for one device session
pub struct ProtocolEngine<T: Transport> {
    client: DeviceClient<T>,
    callbacks: Callbacks<T>,
    handlers: HandlerSet<T>,
}

impl<T: Transport> ProtocolEngine<T> {
    /// Create the engine over an already started transport.
    pub fn new(device_id: impl Into<String>, transport: T, callbacks: Callbacks<T>) -> Self {
        let mut client = DeviceClient::new(device_id.into(), transport);
        info!(device_id = %client.device_id, "Protocol engine created");
        client.transition(StateEvent::TransportStarted);

        let handlers = HandlerSet::builtin(&client.topics);
        Self {
            client,
            callbacks,
            handlers,
        }
    }

    /// QoS for every publish and subscribe. Defaults to at-least-once.
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.client.qos = qos;
        self
    }

    /// Append a handler; built-in handlers keep precedence.
    pub fn register_handler(&mut self, handler: Box<dyn MessageHandler<T>>) {
        info!(handler = handler.name(), prefix = handler.topic_prefix(), "Registering handler");
        self.handlers.push(handler);
    }

    pub fn client(&self) -> &DeviceClient<T> {
        &self.client
    }

    pub fn handlers(&self) -> &HandlerSet<T> {
        &self.handlers
    }

    /// Process one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!(device_id = %self.client.device_id, "Connected to broker");
                self.client.transition(StateEvent::ConnectionEstablished);
                self.client.metrics.connection_established();
                let accepted = self.client.subscribe_inbound();
                debug!(accepted, "Inbound subscriptions requested");
            }
            TransportEvent::Disconnected => {
                warn!(device_id = %self.client.device_id, "Disconnected from broker");
                self.client.transition(StateEvent::ConnectionLost);
                self.client.metrics.connection_lost();
            }
            TransportEvent::Reconnecting { attempt } => {
                info!(attempt, "Reconnecting to broker");
                self.client.transition(StateEvent::ReconnectAttempt);
            }
            TransportEvent::Subscribed { packet_id } => {
                info!(packet_id, "Subscription acknowledged");
            }
            TransportEvent::Unsubscribed { packet_id } => {
                info!(packet_id, "Unsubscription acknowledged");
            }
            TransportEvent::Published { packet_id } => {
                debug!(packet_id, "Publish acknowledged");
            }
            TransportEvent::DataReceived { topic, payload } => {
                self.dispatch(&topic, &payload);
            }
            TransportEvent::Error { kind, detail } => {
                self.client.metrics.transport_error();
                match kind {
                    TransportErrorKind::TcpTransport => {
                        error!(%kind, %detail, "Transport error from TCP layer")
                    }
                    TransportErrorKind::ConnectionRefused => {
                        error!(%kind, %detail, "Connection refused by broker")
                    }
                    TransportErrorKind::Other => warn!(%kind, %detail, "Transport error"),
                }
            }
        }
    }

    /// Route one inbound message. Returns whether a handler processed it cleanly.
    pub fn dispatch(&mut self, topic: &[u8], payload: &[u8]) -> bool {
        let topic = String::from_utf8_lossy(topic).into_owned();
        let payload = String::from_utf8_lossy(payload).into_owned();
        self.client.metrics.message_received();

        let Some(handler) = self.handlers.select(&topic) else {
            info!(%topic, "No handler for topic, message dropped");
            self.client.metrics.message_dropped();
            return false;
        };

        let span = dispatch_span!(handler = handler.name(), topic = %topic);
        let _guard = span.enter();

        let mut ctx = EngineContext::new(&mut self.client, &mut self.callbacks);
        match handler.handle(&mut ctx, &topic, &payload) {
            Ok(()) => {
                self.client.metrics.message_dispatched();
                true
            }
            Err(e) => {
                error!(%topic, error = %e, "Message handling failed");
                self.client.metrics.message_dropped();
                false
            }
        }
    }

    pub fn activate_command(&mut self, command_name: &str, payload: &str) -> String {
        EngineContext::new(&mut self.client, &mut self.callbacks)
            .activate_command(command_name, payload)
    }

    pub fn on_desired_property_update(&mut self, property_name: &str, value: &str) {
        EngineContext::new(&mut self.client, &mut self.callbacks)
            .on_desired_property_update(property_name, value)
    }

    pub fn send_telemetry(&self, sub_topic: &str, payload: &str) {
        self.client.send_telemetry(sub_topic, payload)
    }

    pub fn update_reported_property(&mut self, name: &str, value: &str) -> DeviceResult<()> {
        self.client.update_reported_property(name, value)
    }

    pub fn get_desired_property(&self, name: &str) -> String {
        self.client.get_desired_property(name)
    }

    pub fn get_reported_property(&self, name: &str) -> String {
        self.client.get_reported_property(name)
    }

    pub fn desired_property(&self, name: &str) -> Option<&str> {
        self.client.desired_property(name)
    }

    pub fn reported_property(&self, name: &str) -> Option<&str> {
        self.client.reported_property(name)
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn state(&self) -> EngineState {
        self.client.state
    }

    pub fn topics(&self) -> &TopicSet {
        &self.client.topics
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.client.metrics
    }

    /// Stop the transport. Later publishes are rejected.
    pub fn shutdown(&mut self) -> DeviceResult<()> {
        info!(device_id = %self.client.device_id, "Shutting down protocol engine");
        let stopped = self.client.transport.stop().map_err(DeviceError::transport);
        self.client.transition(StateEvent::ConnectionLost);
        if self.client.metrics.snapshot().connected {
            self.client.metrics.connection_lost();
        }
        stopped
    }
}
