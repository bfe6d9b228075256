//! Venue error types.

use keeper_core::AccountId;
use std::fmt;
use thiserror::Error;

/// Errors from reading venue state.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Snapshot build failed: {0}")]
    SnapshotBuild(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type VenueResult<T> = Result<T, VenueError>;

/// Errors from submitting a trigger transaction.
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    /// The on-chain program rejected the transaction with an error code.
    #[error("program error {code}: {message}")]
    Program {
        code: u32,
        message: String,
        logs: Vec<String>,
    },

    /// The transaction was not confirmed in time.
    #[error("transaction confirmation timed out")]
    Timeout,

    /// The transaction failed without an explicit code.
    #[error("transaction rejected: {message}")]
    Rejected { message: String, logs: Vec<String> },

    /// The request never reached the venue.
    #[error("transport error: {0}")]
    Transport(String),
}

impl SubmitError {
    /// Classify this error into a metrics error code.
    ///
    /// An explicit program code wins. Otherwise the program logs are
    /// scanned for `custom program error: 0x<hex>`.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Program { code, .. } => ErrorCode::Program(*code),
            Self::Rejected { logs, .. } => logs
                .iter()
                .find_map(|line| parse_custom_program_error(line))
                .map(ErrorCode::Program)
                .unwrap_or(ErrorCode::Unknown),
            Self::Timeout => ErrorCode::Timeout,
            Self::Transport(_) => ErrorCode::Transport,
        }
    }

    /// Program logs carried by the error, if any.
    #[must_use]
    pub fn logs(&self) -> &[String] {
        match self {
            Self::Program { logs, .. } | Self::Rejected { logs, .. } => logs,
            Self::Timeout | Self::Transport(_) => &[],
        }
    }
}

const CUSTOM_PROGRAM_ERROR: &str = "custom program error: 0x";

fn parse_custom_program_error(line: &str) -> Option<u32> {
    let start = line.find(CUSTOM_PROGRAM_ERROR)? + CUSTOM_PROGRAM_ERROR.len();
    let hex: String = line[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    u32::from_str_radix(&hex, 16).ok()
}

/// Error code recorded against the trigger error metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Program(u32),
    Timeout,
    Transport,
    Unknown,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Program(code) => write!(f, "{code}"),
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}
