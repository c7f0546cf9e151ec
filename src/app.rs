//! Demo device application
//!
//! What the `twinlink-device` binary runs on top of the engine: a command
//! callback that acknowledges every command, a desired property that retunes
//! the telemetry period, and the periodic telemetry loop itself.

use crate::engine::{Callbacks, ProtocolEngine};
use crate::transport::Transport;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

/// Reported after every command
pub const COMMAND_STATUS_PROPERTY: &str = "commandStatus";
/// Desired property carrying the telemetry period in seconds
pub const TELEMETRY_INTERVAL_PROPERTY: &str = "delayBetweenTelemetry";
pub const MAX_TELEMETRY_INTERVAL_SECS: u64 = 3600;

/// Sub-topic of the periodic readings
pub const TEMPERATURE_SUB_TOPIC: &str = "temperature";
/// Sub-topic echoing received commands
pub const COMMAND_SUB_TOPIC: &str = "command";

/// Parse a telemetry period; accepts 1..=3600 whole seconds.
pub fn parse_telemetry_interval(value: &str) -> Option<Duration> {
    let secs: u64 = value.trim().trim_matches('"').parse().ok()?;
    (1..=MAX_TELEMETRY_INTERVAL_SECS)
        .contains(&secs)
        .then(|| Duration::from_secs(secs))
}

/// One simulated temperature reading
pub fn telemetry_sample(sequence: u64) -> String {
    let temperature = (210 + sequence % 20) as f64 / 10.0;
    json!({
        "temperature": temperature,
        "sequence": sequence,
        "timestamp": Utc::now().to_rfc3339(),
    })
    .to_string()
}

/// Callbacks of the demo device. Accepted interval changes are sent on `interval_tx`.
pub fn device_callbacks<T: Transport>(interval_tx: watch::Sender<Duration>) -> Callbacks<T> {
    Callbacks::new()
        .on_command(|client, name, payload| {
            info!(command = name, %payload, "Handling command");

            if let Err(e) = client.update_reported_property(COMMAND_STATUS_PROPERTY, "OK") {
                warn!(error = %e, "Could not report command status");
            }
            let echo = json!({ "command": name, "payload": payload }).to_string();
            client.send_telemetry(COMMAND_SUB_TOPIC, &echo);

            Ok(json!({ "result": "OK" }).to_string())
        })
        .on_desired_property(move |client, name, value| {
            if name != TELEMETRY_INTERVAL_PROPERTY {
                info!(property = name, %value, "Desired property has no local effect");
                return Ok(());
            }

            let Some(interval) = parse_telemetry_interval(value) else {
                return Err(format!(
                    "{name} must be 1..={MAX_TELEMETRY_INTERVAL_SECS} seconds, got '{value}'"
                )
                .into());
            };

            info!(interval_secs = interval.as_secs(), "Telemetry interval updated");
            interval_tx.send_replace(interval);
            client.update_reported_property(name, &interval.as_secs().to_string())?;
            Ok(())
        })
}

/// Send a reading every interval until shutdown. Interval changes apply to
/// the next wait.
pub async fn run_telemetry_loop<T: Transport>(
    engine: Arc<Mutex<ProtocolEngine<T>>>,
    mut interval_rx: watch::Receiver<Duration>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut sequence = 0u64;

    loop {
        let interval = *interval_rx.borrow();

        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                sequence += 1;
                engine
                    .lock()
                    .await
                    .send_telemetry(TEMPERATURE_SUB_TOPIC, &telemetry_sample(sequence));
            }
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!(samples = sequence, "Telemetry loop stopped");
}
