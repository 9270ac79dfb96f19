//! Settings validation support.

use crate::error::ValidationError;

/// Trait for settings validation.
///
/// The builder validates [`WatchSettings`](crate::settings::WatchSettings)
/// through this trait before any worker can start, so an invalid step or
/// ceiling is reported as an error instead of producing a busy loop.
///
/// # Examples
///
/// ```rust
/// use change_watcher::core::Validate;
/// use change_watcher::settings::WatchSettings;
///
/// let settings = WatchSettings {
///     step_ms: 0,
///     ..Default::default()
/// };
/// assert!(settings.validate().is_err());
/// ```
pub trait Validate {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
