//! Trigger keeper bot.
//!
//! Wires the keeper engine to the gateway client and runs it:
//! - TOML configuration with environment overrides
//! - Slot polling for scan and resync throttling
//! - Health and Prometheus metrics endpoint
//! - Graceful shutdown on Ctrl-C

pub mod app;
pub mod config;
pub mod error;
pub mod health;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
