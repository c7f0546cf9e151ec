//! Observability for the device client
//!
//! Structured logging setup and per-engine counters.

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{EngineMetrics, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{dispatch_span, mqtt_span};
