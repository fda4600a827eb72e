//! Telemetry: structured logging for the reconcilers.
//!
//! Metrics are emitted through the `metrics` facade at the point of decision;
//! installing an exporter is left to the embedding binary.

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig, SpanEventConfig};
