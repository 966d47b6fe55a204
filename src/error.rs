//! Error types for status-buffer access.
//!
//! Backend failures (`Backend`, `Database`, `Io`) are passed through untouched;
//! nothing in this crate retries them except [`KeyValueStore::get_or_retry`],
//! which only retries absent values.
//!
//! [`KeyValueStore::get_or_retry`]: crate::store::KeyValueStore::get_or_retry

use thiserror::Error;

/// Errors that can occur while reading or writing status key-values.
#[derive(Debug, Error)]
pub enum KeyValueError {
    /// A property has no resolvable getter or setter path.
    #[error("configuration error for property '{property}': {reason}")]
    Configuration { property: String, reason: String },

    /// A hostname does not match the addressing pattern.
    #[error("'{hostname}' does not match r`{pattern}`")]
    PatternMismatch { hostname: String, pattern: String },

    /// The addressing pattern is not a valid regular expression.
    #[error("invalid hostname pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// `get_or_retry` ran out of attempts without seeing a value.
    #[error("value unavailable for {keys:?} after {attempts} attempts")]
    ValueUnavailable { keys: Vec<String>, attempts: u32 },

    /// Attempt to write a property registered without a setter.
    #[error("property '{0}' is read-only")]
    ReadOnly(String),

    /// Property name is not present in the store's registry.
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// A value cannot be written or interpreted for the given key.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// Address could not be resolved to a hostname.
    #[error("cannot resolve {address}: {reason}")]
    Resolution { address: String, reason: String },

    /// Transport failure reported by a status backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// Database error from SQLx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for key-value operations.
pub type Result<T> = std::result::Result<T, KeyValueError>;

impl KeyValueError {
    /// Returns true if this error came from the transport rather than from
    /// this crate's own checks.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            KeyValueError::Backend(_) | KeyValueError::Database(_) | KeyValueError::Io(_)
        )
    }

    pub(crate) fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        KeyValueError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for KeyValueError {
    fn from(err: serde_json::Error) -> Self {
        KeyValueError::Serialization(err.to_string())
    }
}
