//! Cognigate error types.
//!
//! Defines the error variants raised by the execution governance core:
//! context validation, admission denial, and tracker programmer errors.
//! Soft failures (unknown-id lookups, operations on terminal escalation
//! records, malformed rule durations) are not represented here — per the
//! governance contract they are logged and return `None`/no-op rather than
//! an `Err`.

use thiserror::Error;

pub type CognigateResult<T> = Result<T, CognigateError>;

#[derive(Debug, Error)]
pub enum CognigateError {
    /// C3 rejected a malformed intent/decision/tenant/handler before
    /// constructing an execution context.
    #[error("validation failed: {0}")]
    ValidationFailure(String),

    /// C2 denied admission for a tenant on one of the four rate horizons.
    #[error("admission denied: {reason} (retry after {retry_after_ms}ms)")]
    AdmissionDenied {
        reason: String,
        remaining: u64,
        reset_at_ms: i64,
        retry_after_ms: i64,
    },

    /// C4.track was called with an executionId that is already tracked.
    #[error("execution already tracked: {0}")]
    DuplicateTracking(String),

    /// C4.set_resource_monitor was called with an executionId that is not
    /// tracked.
    #[error("execution not tracked: {0}")]
    NotTracked(String),

    /// Propagated from the external repository. The core never retries;
    /// the circuit breaker at the host boundary decides fail-open/fail-fast.
    #[error("repository operation failed: {0}")]
    RepositoryFailure(String),
}
