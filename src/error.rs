//! Error types for the pool manager.
//!
//! Driver failures never reach callers raw: the manager wraps them in one of the
//! [`PoolError`] variants together with the target identity they occurred on.

use crate::config::TargetIdentity;
use thiserror::Error;

/// Boxed error carried out of a caller's session scope.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Failed to create an engine for postgres at {identity}: {message}")]
    EngineInitialization {
        identity: TargetIdentity,
        message: String,
    },

    #[error("Failed to connect to postgres at {identity}: {source}")]
    Connection {
        identity: TargetIdentity,
        #[source]
        source: DriverError,
    },

    #[error("Failed to create a postgres session at {identity}: {source}")]
    SessionCreation {
        identity: TargetIdentity,
        #[source]
        source: BoxError,
    },
}

impl PoolError {
    /// Create an engine initialization error.
    pub fn engine_initialization(identity: &TargetIdentity, message: impl Into<String>) -> Self {
        Self::EngineInitialization {
            identity: identity.clone(),
            message: message.into(),
        }
    }

    /// Create a connection error wrapping the probe failure.
    pub fn connection(identity: &TargetIdentity, source: DriverError) -> Self {
        Self::Connection {
            identity: identity.clone(),
            source,
        }
    }

    /// Create a session error wrapping whatever failed inside the scope.
    pub fn session_creation(identity: &TargetIdentity, source: impl Into<BoxError>) -> Self {
        Self::SessionCreation {
            identity: identity.clone(),
            source: source.into(),
        }
    }

    /// Target the failure occurred on.
    pub fn identity(&self) -> &TargetIdentity {
        match self {
            Self::EngineInitialization { identity, .. } => identity,
            Self::Connection { identity, .. } => identity,
            Self::SessionCreation { identity, .. } => identity,
        }
    }

    /// Check if retrying the operation could succeed.
    ///
    /// Only a failed probe qualifies; retry policy itself is left to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Errors reported by a [`Driver`](crate::driver::Driver) implementation.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("{message}")]
    Other { message: String },
}

impl DriverError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Errors raised while building a [`PostgresConfig`](crate::config::PostgresConfig).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid connection URL: {reason}")]
    InvalidUrl { reason: String },
}

impl ConfigError {
    pub fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            expected,
        }
    }

    pub fn invalid_url(reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            reason: reason.into(),
        }
    }
}

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
