//! Error types for the pool cache.

use std::fmt;
use thiserror::Error;

/// Why an acquire could not produce an instance.
///
/// Both cases surface as [`ErrorKind::NotFound`]. Only
/// [`NotFoundReason::NoEligibleInstance`] means the pool still has room and
/// the caller should launch a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotFoundReason {
    /// Nothing has ever been registered for the function.
    UnknownFunction,

    /// The function is known but every instance is busy or over its CPU
    /// limit, and the pool is below its concurrency ceiling.
    NoEligibleInstance,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::UnknownFunction => write!(f, "not found"),
            NotFoundReason::NoEligibleInstance => write!(f, "all instances are busy"),
        }
    }
}

/// Coarse error classification, as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    TooManyRequests,
    InvalidArgument,
    Stopped,
}

/// Errors returned by [`PoolCache`](super::PoolCache) operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolCacheError {
    /// No instance is available (see [`NotFoundReason`]).
    #[error("function '{function}' {reason}")]
    NotFound {
        function: String,
        reason: NotFoundReason,
    },

    /// The pool for the function already has `concurrency` instances and
    /// none of them can take more work.
    #[error("function '{function}' concurrency '{concurrency}' limit reached")]
    TooManyRequests { function: String, concurrency: usize },

    /// The coordinator could not interpret the request. Request kinds are a
    /// closed enum, so the built-in coordinator never produces this.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The coordinator task is no longer running.
    #[error("pool cache coordinator has stopped")]
    Stopped,
}

impl PoolCacheError {
    pub(crate) fn unknown_function(function: impl Into<String>) -> Self {
        PoolCacheError::NotFound {
            function: function.into(),
            reason: NotFoundReason::UnknownFunction,
        }
    }

    pub(crate) fn no_eligible_instance(function: impl Into<String>) -> Self {
        PoolCacheError::NotFound {
            function: function.into(),
            reason: NotFoundReason::NoEligibleInstance,
        }
    }

    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolCacheError::NotFound { .. } => ErrorKind::NotFound,
            PoolCacheError::TooManyRequests { .. } => ErrorKind::TooManyRequests,
            PoolCacheError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            PoolCacheError::Stopped => ErrorKind::Stopped,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_too_many_requests(&self) -> bool {
        self.kind() == ErrorKind::TooManyRequests
    }

    /// Returns true if this is the scale-up signal: the function is known,
    /// nothing is eligible, and the pool may grow.
    pub fn should_scale_up(&self) -> bool {
        matches!(
            self,
            PoolCacheError::NotFound {
                reason: NotFoundReason::NoEligibleInstance,
                ..
            }
        )
    }
}
