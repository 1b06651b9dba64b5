use crate::circuit_breaker::BreakerState;
use thiserror::Error;

/// Result type for breaker operations
pub type Result<T> = std::result::Result<T, BreakerError>;

/// Admission refused: the breaker is open, or half-open with its trial limit used up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("circuit breaker '{name}' is {state}, call rejected")]
pub struct BreakerOpen {
    /// Name of the breaker that refused the call
    pub name: String,
    /// State the breaker was in when it refused
    pub state: BreakerState,
}

/// Error returned by [`Breaker::call`](crate::circuit_breaker::Breaker::call).
///
/// Either the breaker refused to run the operation, or the operation ran and
/// produced its own error, which is passed through untouched.
#[derive(Error, Debug)]
pub enum CallError<E> {
    #[error(transparent)]
    Open(#[from] BreakerOpen),

    #[error("{0}")]
    Inner(E),
}

impl<E> CallError<E> {
    /// Whether the operation was never invoked because the breaker rejected it
    pub fn is_open(&self) -> bool {
        matches!(self, CallError::Open(_))
    }

    /// The wrapped operation's own error, if it ran
    pub fn into_inner(self) -> Option<E> {
        match self {
            CallError::Inner(e) => Some(e),
            CallError::Open(_) => None,
        }
    }
}

/// Crate-level error types
#[derive(Error, Debug)]
pub enum BreakerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Open(#[from] BreakerOpen),
}
