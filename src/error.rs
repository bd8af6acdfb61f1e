//! Caller-visible error taxonomy.
//!
//! # Responsibilities
//! - Define the small set of error values consumers pattern-match on
//! - Provide the `Classify` view the primitives use to decide retry/conflict
//! - Map errors onto HTTP status codes for the API layer above
//!
//! # Design Decisions
//! - Primitives are generic over the caller's error type `E`; they require
//!   `E: Classify` and, where they must produce their own error, `E: From<..>`
//! - Breaker and retry never wrap `E`; only saga and optimistic lock normalize

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error code carried by conflicting optimistic writes.
pub const VERSION_CONFLICT_CODE: &str = "VERSION_CONFLICT";

/// Error code reported by `CircuitOpenError`.
pub const CIRCUIT_OPEN_CODE: &str = "CIRCUIT_OPEN";

/// Classification view over an error.
///
/// Every error that flows through the retry executor, the resilient executor
/// or the optimistic lock helper implements this trait.
pub trait Classify: fmt::Display {
    /// Machine-readable code (e.g. `ECONNRESET`, `503`).
    fn code(&self) -> Option<String> {
        None
    }

    /// Explicit retry decision. `None` defers to the retry policy.
    fn retryable(&self) -> Option<bool> {
        None
    }

    /// True when the error was produced by an open circuit breaker.
    fn is_circuit_open(&self) -> bool {
        self.code().as_deref() == Some(CIRCUIT_OPEN_CODE)
    }

    /// True when the error signals an optimistic version conflict.
    fn is_version_conflict(&self) -> bool {
        self.code().as_deref() == Some(VERSION_CONFLICT_CODE)
            || self.to_string().to_lowercase().contains("version")
    }
}

/// A call was rejected because the named breaker is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker '{name}' is open, retry in {retry_after:?}")]
pub struct CircuitOpenError {
    /// Breaker name.
    pub name: String,
    /// Time left until a probe is allowed.
    pub retry_after: Duration,
}

/// All retry attempts failed; wraps the last underlying error.
#[derive(Debug, Error)]
#[error("retries exhausted after {attempts} attempts: {source}")]
pub struct RetriesExhaustedError<E: std::error::Error + 'static> {
    /// Number of attempts made.
    pub attempts: u32,
    /// The last error observed.
    #[source]
    pub source: E,
}

/// Optimistic update kept conflicting until the retry bound was reached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record was modified concurrently, gave up after {attempts} attempts; please retry")]
pub struct ConcurrentModificationError {
    /// Number of read-modify-write cycles attempted.
    pub attempts: u32,
}

/// The record to update does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0} not found")]
pub struct NotFoundError(pub String);

/// Typed version mismatch raised by store adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("version conflict: expected {expected}, found {actual}")]
pub struct VersionConflictError {
    pub expected: u64,
    pub actual: u64,
}

/// Untyped downstream failure with an optional machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OperationError {
    pub code: Option<String>,
    pub message: String,
}

impl OperationError {
    /// Error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Error with a machine-readable code.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// Aggregate error for callers that do not bring their own type.
#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ResilienceError>,
    },

    #[error(transparent)]
    ConcurrentModification(#[from] ConcurrentModificationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    VersionConflict(#[from] VersionConflictError),

    #[error(transparent)]
    Operation(#[from] OperationError),
}

/// Result alias for callers using the aggregate error.
pub type Result<T, E = ResilienceError> = std::result::Result<T, E>;

impl ResilienceError {
    /// HTTP status the API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ResilienceError::CircuitOpen(_) => 503,
            ResilienceError::RetriesExhausted { source, .. } => {
                if source.code().as_deref() == Some("ETIMEDOUT") {
                    504
                } else {
                    502
                }
            }
            ResilienceError::ConcurrentModification(_) | ResilienceError::VersionConflict(_) => 409,
            ResilienceError::NotFound(_) => 404,
            ResilienceError::Operation(_) => 500,
        }
    }
}

impl From<RetriesExhaustedError<ResilienceError>> for ResilienceError {
    fn from(err: RetriesExhaustedError<ResilienceError>) -> Self {
        ResilienceError::RetriesExhausted {
            attempts: err.attempts,
            source: Box::new(err.source),
        }
    }
}

impl Classify for CircuitOpenError {
    fn code(&self) -> Option<String> {
        Some(CIRCUIT_OPEN_CODE.to_string())
    }

    fn retryable(&self) -> Option<bool> {
        Some(false)
    }
}

impl Classify for VersionConflictError {
    fn code(&self) -> Option<String> {
        Some(VERSION_CONFLICT_CODE.to_string())
    }
}

impl Classify for OperationError {
    fn code(&self) -> Option<String> {
        self.code.clone()
    }
}

impl Classify for ResilienceError {
    fn code(&self) -> Option<String> {
        match self {
            ResilienceError::CircuitOpen(e) => e.code(),
            ResilienceError::VersionConflict(e) => e.code(),
            ResilienceError::Operation(e) => e.code(),
            ResilienceError::RetriesExhausted { source, .. } => source.code(),
            ResilienceError::ConcurrentModification(_) | ResilienceError::NotFound(_) => None,
        }
    }

    fn retryable(&self) -> Option<bool> {
        match self {
            ResilienceError::Operation(_) | ResilienceError::VersionConflict(_) => None,
            _ => Some(false),
        }
    }

    fn is_version_conflict(&self) -> bool {
        match self {
            ResilienceError::VersionConflict(_) => true,
            ResilienceError::Operation(e) => e.is_version_conflict(),
            _ => false,
        }
    }
}

impl Classify for std::io::Error {
    fn code(&self) -> Option<String> {
        use std::io::ErrorKind;
        let code = match self.kind() {
            ErrorKind::ConnectionReset => "ECONNRESET",
            ErrorKind::ConnectionRefused => "ECONNREFUSED",
            ErrorKind::TimedOut => "ETIMEDOUT",
            ErrorKind::ConnectionAborted => "ECONNABORTED",
            ErrorKind::BrokenPipe => "EPIPE",
            _ => return None,
        };
        Some(code.to_string())
    }
}

impl Classify for reqwest::Error {
    fn code(&self) -> Option<String> {
        if let Some(status) = self.status() {
            return Some(status.as_u16().to_string());
        }
        if self.is_timeout() {
            Some("ETIMEDOUT".to_string())
        } else if self.is_connect() {
            Some("ECONNREFUSED".to_string())
        } else {
            None
        }
    }

    fn is_version_conflict(&self) -> bool {
        self.status().map(|s| s.as_u16()) == Some(409)
    }
}
