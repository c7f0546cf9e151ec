//! Topic derivation and device ID validation
//!
//! Every device owns five topics under the common prefix `device/{id}/`.
//! Inbound topics are subscribed with a trailing multi-level wildcard; outbound
//! publications append a sub-topic (telemetry channel, property or command name).

use thiserror::Error;

/// Multi-level wildcard appended to inbound prefixes when subscribing.
pub const WILDCARD: &str = "#";

/// The five protocol topics derived from one device identity.
///
/// Computed once when the engine is built and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    telemetry: String,
    commands: String,
    responses: String,
    desired_properties: String,
    reported_properties: String,
}

impl TopicSet {
    /// Derive the topic set for `device_id`. Pure string construction.
    pub fn new(device_id: &str) -> Self {
        let prefix = device_prefix(device_id);
        Self {
            telemetry: format!("{prefix}telemetry/"),
            commands: format!("{prefix}commands/"),
            responses: format!("{prefix}responses/"),
            desired_properties: format!("{prefix}twin/desired/"),
            reported_properties: format!("{prefix}twin/reported/"),
        }
    }

    pub fn telemetry(&self) -> &str {
        &self.telemetry
    }

    pub fn commands(&self) -> &str {
        &self.commands
    }

    pub fn responses(&self) -> &str {
        &self.responses
    }

    pub fn desired_properties(&self) -> &str {
        &self.desired_properties
    }

    pub fn reported_properties(&self) -> &str {
        &self.reported_properties
    }

    /// `telemetry/{sub_topic}`
    pub fn telemetry_topic(&self, sub_topic: &str) -> String {
        format!("{}{sub_topic}", self.telemetry)
    }

    /// `responses/{command_name}`
    pub fn response_topic(&self, command_name: &str) -> String {
        format!("{}{command_name}", self.responses)
    }

    /// `twin/reported/{property_name}`
    pub fn reported_property_topic(&self, property_name: &str) -> String {
        format!("{}{property_name}", self.reported_properties)
    }

    /// Wildcard filters subscribed on every fresh connect, in subscription order.
    pub fn subscription_filters(&self) -> [String; 3] {
        [
            format!("{}{WILDCARD}", self.desired_properties),
            format!("{}{WILDCARD}", self.commands),
            format!("{}{WILDCARD}", self.responses),
        ]
    }
}

/// Common `device/{id}/` prefix shared by every topic of a device.
pub fn device_prefix(device_id: &str) -> String {
    format!("device/{device_id}/")
}

/// Extract the name carried in the last topic level (`.../commands/{name}`).
pub fn last_segment(topic: &str) -> Result<&str, TopicError> {
    let pos = topic
        .rfind('/')
        .ok_or_else(|| TopicError::NoSeparator(topic.to_string()))?;
    let segment = &topic[pos + 1..];
    if segment.is_empty() {
        return Err(TopicError::EmptySegment(topic.to_string()));
    }
    Ok(segment)
}

/// Device IDs end up inside topic levels, so separators and wildcards are rejected.
pub fn validate_device_id(device_id: &str) -> Result<(), ValidationError> {
    if device_id.is_empty() {
        return Err(ValidationError::EmptyDeviceId);
    }

    for ch in device_id.chars() {
        if !ch.is_ascii_alphanumeric() && !matches!(ch, '.' | '_' | '-' | ':') {
            return Err(ValidationError::InvalidDeviceIdChar(ch));
        }
    }

    Ok(())
}

/// Device ID validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Device ID cannot be empty")]
    EmptyDeviceId,
    #[error("Device ID contains invalid character: '{0}'")]
    InvalidDeviceIdChar(char),
}

/// Errors extracting a name from an inbound topic
#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("Topic has no '/' separator: {0}")]
    NoSeparator(String),
    #[error("Topic has an empty trailing level: {0}")]
    EmptySegment(String),
}
