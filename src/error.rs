// ===============================
// src/error.rs
// ===============================
use std::time::Duration;

use thiserror::Error;

/// Failure of one replay request. Every kind reaches the caller; none of them
/// degrades into an empty order book.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("engine invocation failed: {0}")]
    EngineInvocation(String),

    #[error("engine did not finish within {0:?}")]
    EngineTimeout(Duration),

    #[error("script staging failed: {0}")]
    ResourceStaging(#[source] std::io::Error),

    #[error("malformed engine report: {0}")]
    MalformedReport(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("session task is not running")]
    SessionClosed,
}

impl ReplayError {
    /// Stable label for metrics / JSON bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ReplayError::EngineInvocation(_) => "ENGINE_INVOCATION",
            ReplayError::EngineTimeout(_) => "ENGINE_TIMEOUT",
            ReplayError::ResourceStaging(_) => "RESOURCE_STAGING",
            ReplayError::MalformedReport(_) => "MALFORMED_REPORT",
            ReplayError::InvalidCommand(_) => "INVALID_COMMAND",
            ReplayError::SessionClosed => "SESSION_CLOSED",
        }
    }
}
