//! Error types for the device client
//!
//! `DeviceError` is what public engine operations return. Application callbacks
//! report failures through [`CallbackError`]; the engine never lets those escape
//! into the transport's event loop.

use crate::engine::EngineState;
use crate::protocol::TopicError;
use thiserror::Error;

/// Error type returned by application command and desired-property callbacks
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for device client operations
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: EngineState },

    #[error("Transport error: {0}")]
    TransportError(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    #[error("Malformed topic: {0}")]
    MalformedTopic(#[from] TopicError),
}

impl DeviceError {
    /// Create not-connected error
    pub fn not_connected(state: EngineState) -> Self {
        Self::NotConnected { state }
    }

    /// Create initialization error
    pub fn initialization_failed<S: Into<String>>(message: S) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Wrap a transport-specific error
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TransportError(Box::new(error))
    }
}

/// Result type for device client operations
pub type DeviceResult<T> = Result<T, DeviceError>;
