//! Registry error definitions.

use thiserror::Error;

/// Malformed input supplied to a registry operation. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Service name was empty or made only of separators.
    #[error("name must not be empty")]
    EmptyName,

    /// Service name contains a character the key layout cannot carry.
    #[error("invalid name '{0}': names must not contain '/'")]
    InvalidName(String),

    /// Endpoint has no owning workload id.
    #[error("endpoint id must not be empty")]
    MissingEndpointId,

    /// Endpoint id contains a character the key layout cannot carry.
    #[error("invalid endpoint id '{0}': ids must not contain '/'")]
    InvalidEndpointId(String),

    /// Protocol outside the supported set.
    #[error("unsupported protocol '{0}', expected one of: http, https")]
    InvalidProtocol(String),

    /// Port missing, zero or not a number.
    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

/// Errors returned by registry backends.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Caller supplied malformed input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The store is unreachable, timed out or answered unexpectedly.
    #[error("store error during {op}: {message}")]
    Store { op: &'static str, message: String },

    /// An endpoint could not be serialized for storage.
    #[error("failed to encode endpoint: {0}")]
    Encode(#[from] serde_json::Error),

    /// Backend URL could not be parsed.
    #[error("invalid backend url '{0}'")]
    InvalidUrl(String),

    /// Backend URL names a store this build does not know.
    #[error("backend type '{0}' not supported")]
    UnsupportedScheme(String),
}

impl RegistryError {
    /// Build a store error for the given operation.
    pub fn store(op: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Store {
            op,
            message: message.to_string(),
        }
    }

    /// Returns true when the error is caused by caller input rather than the store.
    pub fn is_validation(&self) -> bool {
        matches!(self, RegistryError::Validation(_))
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
