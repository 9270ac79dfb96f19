//! Error types for change-watcher.

use std::fmt;

/// Result type alias for change-watcher operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors that can occur when building or driving a change watcher.
///
/// Misuse of the subscription protocol (unsubscribing something that was
/// never subscribed) is not represented here by default: it panics. Only
/// [`ChangeWatcher::try_unsubscribe`](crate::core::ChangeWatcher::try_unsubscribe)
/// reports it, as [`WatchError::UnknownKey`] or [`WatchError::KeyMismatch`].
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to load settings from a source.
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    /// Failed to deserialize settings.
    #[error("Failed to deserialize settings: {0}")]
    DeserializationError(String),

    /// Settings validation failed.
    #[error("Settings validation failed: {0}")]
    ValidationError(String),

    /// No worker is active for the given key.
    #[error("No active watcher for key '{key}'")]
    UnknownKey {
        /// The key that was looked up
        key: String,
    },

    /// A subscription was presented for a key it does not belong to.
    #[error("Subscription belongs to key '{subscribed}', not '{key}'")]
    KeyMismatch {
        /// The key the caller named
        key: String,
        /// The key the subscription was created for
        subscribed: String,
    },
}

/// Validation error for settings validation.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors into a single error.
    ///
    /// Returns `Ok(())` for an empty list and the sole error for a list of one.
    pub fn collect(mut errors: Vec<ValidationError>) -> std::result::Result<(), Self> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for WatchError {
    fn from(err: ValidationError) -> Self {
        WatchError::ValidationError(err.to_string())
    }
}

impl From<config::ConfigError> for WatchError {
    fn from(err: config::ConfigError) -> Self {
        WatchError::LoadError(err.to_string())
    }
}
