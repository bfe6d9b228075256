//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Venue error: {0}")]
    Venue(#[from] keeper_venue::VenueError),

    #[error("Engine error: {0}")]
    Engine(#[from] keeper_engine::EngineError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] keeper_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
