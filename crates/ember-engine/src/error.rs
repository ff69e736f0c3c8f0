use chrono::{DateTime, Utc};
use thiserror::Error;

use ember_shared::{AbuseSeverity, ParseError};
use ember_store::StoreError;

/// Every way an engine operation can fail.
///
/// Gates (`Unauthenticated`, `NotEligible`, `QuotaExceeded`,
/// `AbuseDetected`) abort a request before any decision or match is
/// written.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Not eligible: {reason}")]
    NotEligible { reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Swipe quota exceeded: {reason}")]
    QuotaExceeded {
        reason: String,
        next_refill_at: DateTime<Utc>,
    },

    #[error("Too many decisions, slow down until {next_allowed_at}")]
    AbuseDetected {
        severity: AbuseSeverity,
        next_allowed_at: DateTime<Utc>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable code for transports.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Unauthenticated => "unauthenticated",
            EngineError::NotEligible { .. } => "not_eligible",
            EngineError::InvalidArgument(_) => "invalid_argument",
            EngineError::QuotaExceeded { .. } => "quota_exceeded",
            EngineError::AbuseDetected { .. } => "abuse_detected",
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict(_) => "conflict",
            EngineError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => EngineError::NotFound("record".into()),
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(ref err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                EngineError::Conflict(e.to_string())
            }
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::from(e).into()
    }
}

impl From<ParseError> for EngineError {
    fn from(e: ParseError) -> Self {
        EngineError::InvalidArgument(e.to_string())
    }
}

/// Failure of a best-effort collaborator (analytics, notifications).
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink buffer full")]
    Full,

    #[error("sink closed")]
    Closed,

    #[error("no async runtime available")]
    NoRuntime,

    #[error("sink error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
