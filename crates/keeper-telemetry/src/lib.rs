//! Prometheus metrics and structured logging for the trigger keeper.
//!
//! - Prometheus metrics for scan cycles, lock contention, trigger outcomes
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
