//! Event-loop driver for one device session
//!
//! [`DeviceSession::start`] builds the MQTT transport, wraps it in a
//! [`ProtocolEngine`] and spawns a task that polls the `rumqttc` event loop,
//! feeding every mapped event to the engine under its mutex. `rumqttc`
//! reconnects on the next poll after a failure; the driver only spaces those
//! polls out with the backoff schedule and keeps the engine state in step.

use super::client::MqttClient;
use super::connection::ReconnectConfig;
use super::event_router::{classify_error, is_outgoing_disconnect, route_event};
use crate::config::{DeviceConfig, DeviceCredentials};
use crate::engine::{Callbacks, EngineState, ProtocolEngine, TransportEvent};
use crate::error::{DeviceError, DeviceResult};
use crate::mqtt_span;
use rumqttc::v5::{ConnectionError, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

/// Engine shared between the driver task and the application
pub type SharedEngine = Arc<Mutex<ProtocolEngine<MqttClient>>>;

/// How long shutdown waits for DISCONNECT to be flushed and the driver to exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A running device session
pub struct DeviceSession {
    engine: SharedEngine,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceSession {
    /// Initialize the transport, create the engine and start the driver.
    ///
    /// Must be called inside a Tokio runtime. An initialization failure
    /// returns an error and starts nothing.
    pub fn start(
        config: &DeviceConfig,
        credentials: &DeviceCredentials,
        callbacks: Callbacks<MqttClient>,
    ) -> DeviceResult<Self> {
        Self::start_with_reconnect(config, credentials, callbacks, ReconnectConfig::default())
    }

    pub fn start_with_reconnect(
        config: &DeviceConfig,
        credentials: &DeviceCredentials,
        callbacks: Callbacks<MqttClient>,
        reconnect: ReconnectConfig,
    ) -> DeviceResult<Self> {
        let (transport, event_loop) = MqttClient::new(config, credentials).map_err(|e| {
            error!(device_id = %config.device.id, error = %e, "Transport initialization failed");
            DeviceError::initialization_failed(e.to_string())
        })?;

        let engine = ProtocolEngine::new(config.device.id.clone(), transport, callbacks)
            .with_qos(config.qos());
        let engine: SharedEngine = Arc::new(Mutex::new(engine));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let span = mqtt_span!(device_id = %config.device.id);
        let handle = tokio::spawn(
            drive_event_loop(engine.clone(), event_loop, shutdown_rx, reconnect).instrument(span),
        );

        Ok(Self {
            engine,
            shutdown_tx,
            handle: Some(handle),
        })
    }

    /// Handle to the engine for publishing and reading properties
    pub fn engine(&self) -> SharedEngine {
        self.engine.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Disconnect from the broker and stop the driver.
    pub async fn shutdown(&mut self) -> DeviceResult<()> {
        let stopped = self.engine.lock().await.shutdown();
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.handle.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => info!("Event loop driver stopped"),
                Ok(Err(e)) if !e.is_cancelled() => warn!(error = %e, "Event loop driver panicked"),
                Err(_) => warn!("Event loop driver did not stop in time, aborting"),
                _ => {}
            }
        }

        stopped
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Sleep for `delay` unless shutdown is requested first.
/// Returns true if the sleep completed.
async fn interruptible_sleep(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => {
            if changed.is_err() || *shutdown_rx.borrow() {
                info!("Shutdown requested during reconnect delay");
                return false;
            }
            true
        }
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Keep polling until our DISCONNECT is written, bounded by the grace period.
async fn flush_disconnect(event_loop: &mut EventLoop) {
    let flushed = tokio::time::timeout(SHUTDOWN_GRACE, async {
        loop {
            match event_loop.poll().await {
                Ok(event) if is_outgoing_disconnect(&event) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    })
    .await;

    if flushed.is_err() {
        warn!("Timed out flushing DISCONNECT");
    }
}

async fn drive_event_loop(
    engine: SharedEngine,
    mut event_loop: EventLoop,
    mut shutdown_rx: watch::Receiver<bool>,
    reconnect: ReconnectConfig,
) {
    info!("Starting MQTT event loop driver");
    let mut attempts = 0u32;
    let mut connected = false;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received, stopping event loop driver");
                    if connected {
                        flush_disconnect(&mut event_loop).await;
                    }
                    break;
                }
            }

            polled = event_loop.poll() => match polled {
                Ok(event) => {
                    let Some(mapped) = route_event(&event) else {
                        continue;
                    };

                    match mapped {
                        TransportEvent::Connected => {
                            attempts = 0;
                            connected = true;
                        }
                        TransportEvent::Disconnected => connected = false,
                        _ => {}
                    }
                    engine.lock().await.handle_event(mapped);
                }
                Err(ConnectionError::RequestsDone) => {
                    info!("All client handles dropped, stopping event loop driver");
                    break;
                }
                Err(e) => {
                    attempts = attempts.saturating_add(1);
                    {
                        let mut engine = engine.lock().await;
                        engine.handle_event(classify_error(&e));
                        if connected {
                            engine.handle_event(TransportEvent::Disconnected);
                            connected = false;
                        }
                    }

                    let delay = reconnect.backoff_delay(attempts);
                    warn!(attempt = attempts, delay_ms = delay.as_millis() as u64, "Retrying broker connection");
                    if !interruptible_sleep(&mut shutdown_rx, delay).await {
                        break;
                    }

                    let mut engine = engine.lock().await;
                    if engine.state() == EngineState::Disconnected {
                        engine.handle_event(TransportEvent::Reconnecting { attempt: attempts });
                    }
                }
            }
        }
    }

    info!("MQTT event loop driver stopped");
}
