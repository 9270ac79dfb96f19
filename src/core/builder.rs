//! Builder for constructing ChangeWatcher instances.

use crate::core::{ChangeWatcher, Check, Validate};
use crate::error::Result;
use crate::settings::{SettingsLoader, WatchSettings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;

/// Builder for constructing a `ChangeWatcher` instance.
///
/// Settings are layered: defaults, then settings files, then environment
/// variables, then the values set directly on the builder.
///
/// # Examples
///
/// ```rust,no_run
/// use change_watcher::prelude::*;
/// use std::time::Duration;
///
/// # fn example() -> Result<()> {
/// let watcher = ChangeWatcher::builder()
///     .with_settings_file("config/watch.yaml")
///     .with_env_overrides("WATCH", "__")
///     .with_step(Duration::from_millis(250))
///     .build(compare_fn(|key: &str| key.len()))?;
/// # Ok(())
/// # }
/// ```
pub struct ChangeWatcherBuilder {
    loader: SettingsLoader,
    base: Option<WatchSettings>,
    #[cfg(feature = "metrics")]
    metrics: Option<WatchMetrics>,
}

impl ChangeWatcherBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            loader: SettingsLoader::new(),
            base: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Set the poll interval step, which is also the shortest interval.
    ///
    /// Intervals have millisecond resolution.
    pub fn with_step(mut self, step: Duration) -> Self {
        self.loader.set_override("step_ms", millis(step));
        self
    }

    /// Set the longest poll interval.
    pub fn with_max_interval(mut self, max: Duration) -> Self {
        self.loader.set_override("max_interval_ms", millis(max));
        self
    }

    /// Set the interval before the first check of a newly watched key.
    pub fn with_initial_interval(mut self, initial: Duration) -> Self {
        self.loader.set_override("initial_interval_ms", millis(initial));
        self
    }

    /// Set the capacity of each worker's request queue.
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.loader
            .set_override("mailbox_capacity", i64::try_from(capacity).unwrap_or(i64::MAX));
        self
    }

    /// Use fully specified settings and skip files and environment variables.
    ///
    /// Values set with the other `with_*` methods are ignored.
    pub fn with_settings(mut self, settings: WatchSettings) -> Self {
        self.base = Some(settings);
        self
    }

    /// Add a settings file. Later files override earlier ones.
    ///
    /// Supported formats: YAML (.yaml, .yml), TOML (.toml), JSON (.json)
    pub fn with_settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader.add_file(path);
        self
    }

    /// Read settings from environment variables with the given prefix.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use change_watcher::prelude::*;
    ///
    /// // WATCH_STEP_MS=250 -> step_ms = 250
    /// let builder = ChangeWatcher::builder().with_env_overrides("WATCH", "__");
    /// ```
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.loader.set_env_prefix(prefix, separator);
        self
    }

    /// Record watcher metrics with the given meter.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(WatchMetrics::new(meter));
        self
    }

    /// Resolve and validate the settings without building a watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or validation fails.
    pub fn settings(&self) -> Result<WatchSettings> {
        let settings = match &self.base {
            Some(settings) => settings.clone(),
            None => self.loader.load()?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Names of the settings layers that will be merged, lowest first.
    pub fn sources(&self) -> Vec<String> {
        match &self.base {
            Some(_) => vec!["explicit".to_string()],
            None => self.loader.source_names(),
        }
    }

    /// Build the watcher around a change check.
    ///
    /// No worker starts until the first subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file or environment source cannot be loaded
    /// - Settings fail to deserialize
    /// - Settings fail validation
    pub fn build<T, C>(self, check: C) -> Result<ChangeWatcher<T>>
    where
        T: Clone + Default + Send + 'static,
        C: Check<T> + 'static,
    {
        let settings = self.settings()?;
        tracing::debug!(
            sources = ?self.sources(),
            step = ?settings.step(),
            max_interval = ?settings.max_interval(),
            mailbox_capacity = settings.mailbox_capacity,
            "Built change watcher"
        );

        #[cfg(feature = "metrics")]
        let watcher = ChangeWatcher::from_parts(Arc::new(check), settings, self.metrics);
        #[cfg(not(feature = "metrics"))]
        let watcher = ChangeWatcher::from_parts(Arc::new(check), settings);

        Ok(watcher)
    }
}

impl Default for ChangeWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
