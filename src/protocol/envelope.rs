//! Command response envelopes
//!
//! Successful results are spliced verbatim into the `payload` slot: the
//! application returns a JSON text and the engine does not re-encode it.
//! Error bodies are built with `serde_json` so the message is always escaped.

use serde::Serialize;

/// Status code carried by every published command response.
pub const STATUS_OK: u16 = 200;

pub const NO_COMMAND_CALLBACK: &str = "No command callback registered";
pub const COMMAND_CALLBACK_FAILED: &str = "Exception occurred while processing command";
/// Sent when the command callback panics
pub const COMMAND_CALLBACK_PANICKED: &str = "Unknown exception occurred while processing command";

/// Wrap a raw command result as `{"status": 200, "payload": <result>}`.
pub fn response_envelope(result: &str) -> String {
    format!("{{\"status\": {STATUS_OK}, \"payload\": {result}}}")
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// Build `{"error": "<message>"}`.
pub fn error_envelope(message: &str) -> String {
    serde_json::to_string(&ErrorBody { error: message })
        .unwrap_or_else(|_| format!("{{\"error\": \"{NO_COMMAND_CALLBACK}\"}}"))
}

/// True when `body` is an error envelope produced by [`error_envelope`].
pub fn is_error_envelope(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error").map(|e| e.is_string()))
        .unwrap_or(false)
}
