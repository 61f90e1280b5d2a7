//! Error types for the cache service.

use thiserror::Error;

/// Result type alias for cache-service operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Error kinds produced by the cache service.
///
/// `Miss` is deliberately distinguished from every fault kind — callers that
/// conflate "absent" with "broken" lose the ability to treat a miss as a
/// normal outcome.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The requested key has no value (or has expired). Not a fault.
    #[error("cache miss: {key}")]
    Miss {
        /// The key that was looked up.
        key: String,
    },

    /// No tenant identifier was available in the evaluation context and
    /// `require_tenant_context` is enabled.
    #[error("no tenant context for key {key}")]
    NoTenantContext {
        /// The key the caller attempted to operate on.
        key: String,
    },

    /// An empty key was supplied.
    #[error("key cannot be empty")]
    EmptyKey,

    /// The circuit breaker is open or mid-trial and rejected the call.
    #[error("circuit open")]
    CircuitOpen,

    /// A nil value was written, or the read destination was absent.
    #[error("nil value rejected: {reason}")]
    NilValue {
        /// Human-readable reason.
        reason: String,
    },

    /// Serialization or decompression of a stored value failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing remote store returned an error.
    #[error("remote store error during {operation}: {source}")]
    Remote {
        /// The operation being attempted (`get`, `set`, `mget`, ...).
        operation: String,
        /// The underlying error, stringified.
        source: String,
    },

    /// The call's deadline elapsed, or the caller cancelled.
    #[error("operation timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed before the timeout/cancellation fired.
        elapsed_ms: u128,
    },
}

impl CacheError {
    /// Wrap an arbitrary remote-store error with the operation name that
    /// was in flight when it occurred.
    pub fn remote(operation: impl Into<String>, source: impl std::fmt::Display) -> Self {
        CacheError::Remote {
            operation: operation.into(),
            source: source.to_string(),
        }
    }

    /// True if this is the distinguished miss outcome, not a fault.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss { .. })
    }
}
