//! Layered settings loading.

use crate::error::{Result, WatchError};
use crate::settings::WatchSettings;
use config::{Environment, File};
use std::path::{Path, PathBuf};

/// Loads [`WatchSettings`] from layered sources.
///
/// Layers are merged lowest first, so each later layer overrides the ones
/// before it:
///
/// 1. built-in defaults
/// 2. settings files, in the order they were added
/// 3. environment variables
/// 4. programmatic overrides
///
/// # Examples
///
/// ```rust,no_run
/// use change_watcher::settings::SettingsLoader;
///
/// # fn example() -> change_watcher::error::Result<()> {
/// let mut loader = SettingsLoader::new();
/// loader.add_file("config/watch.yaml");
/// loader.set_env_prefix("WATCH", "__"); // WATCH_STEP_MS=250
///
/// let settings = loader.load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    files: Vec<PathBuf>,
    env: Option<(String, String)>,
    overrides: Vec<(&'static str, i64)>,
}

impl SettingsLoader {
    /// Create a loader with no sources. Loading it yields the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a settings file. The format is taken from the extension
    /// (`.yaml`, `.yml`, `.toml` or `.json`).
    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    /// Read environment variables named `{prefix}_{FIELD}`.
    pub fn set_env_prefix(&mut self, prefix: impl Into<String>, separator: impl Into<String>) {
        self.env = Some((prefix.into(), separator.into()));
    }

    /// Force a field to a value, above every other layer.
    pub fn set_override(&mut self, field: &'static str, value: i64) {
        self.overrides.retain(|(existing, _)| *existing != field);
        self.overrides.push((field, value));
    }

    /// Merge all layers into settings.
    ///
    /// The result is not validated; see [`Validate`](crate::core::Validate).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file is missing or has an unsupported extension
    /// - A source cannot be parsed
    /// - The merged values do not deserialize into [`WatchSettings`]
    pub fn load(&self) -> Result<WatchSettings> {
        let mut builder = config::Config::builder();

        for path in &self.files {
            check_extension(path)?;
            if !path.exists() {
                return Err(WatchError::LoadError(format!(
                    "Settings file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.clone()).required(true));
        }

        if let Some((prefix, separator)) = &self.env {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator(separator)
                    .try_parsing(true),
            );
        }

        for (field, value) in &self.overrides {
            builder = builder.set_override(*field, *value)?;
        }

        let merged = builder
            .build()
            .map_err(|e| WatchError::LoadError(format!("Failed to build settings: {}", e)))?;

        merged.try_deserialize::<WatchSettings>().map_err(|e| {
            WatchError::DeserializationError(format!("Failed to deserialize settings: {}", e))
        })
    }

    /// Names of the configured layers, lowest precedence first.
    pub fn source_names(&self) -> Vec<String> {
        let mut names = vec!["defaults".to_string()];
        names.extend(self.files.iter().map(|p| format!("file:{}", p.display())));
        if let Some((prefix, _)) = &self.env {
            names.push(format!("env:{}*", prefix));
        }
        if !self.overrides.is_empty() {
            names.push("overrides".to_string());
        }
        names
    }
}

fn check_extension(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| {
            WatchError::LoadError(format!(
                "Unable to determine file format for: {}",
                path.display()
            ))
        })?;

    match extension {
        "yaml" | "yml" | "toml" | "json" => Ok(()),
        _ => Err(WatchError::LoadError(format!(
            "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
            extension
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_loader_yields_defaults() {
        let settings = SettingsLoader::new().load().unwrap();
        assert_eq!(settings, WatchSettings::default());
    }

    #[test]
    fn test_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("watch.yaml");
        fs::write(&path, "step_ms: 250\nmax_interval_ms: 5000\n").unwrap();

        let mut loader = SettingsLoader::new();
        loader.add_file(&path);
        let settings = loader.load().unwrap();

        assert_eq!(settings.step_ms, 250);
        assert_eq!(settings.max_interval_ms, 5000);
        assert_eq!(settings.mailbox_capacity, 16);
    }

    #[test]
    fn test_later_file_wins() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("base.toml");
        let local = temp_dir.path().join("local.json");
        fs::write(&base, "step_ms = 50\nmailbox_capacity = 8\n").unwrap();
        fs::write(&local, r#"{ "step_ms": 75 }"#).unwrap();

        let mut loader = SettingsLoader::new();
        loader.add_file(&base);
        loader.add_file(&local);
        let settings = loader.load().unwrap();

        assert_eq!(settings.step_ms, 75);
        assert_eq!(settings.mailbox_capacity, 8);
    }

    #[test]
    fn test_override_beats_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("watch.yaml");
        fs::write(&path, "step_ms: 250\n").unwrap();

        let mut loader = SettingsLoader::new();
        loader.add_file(&path);
        loader.set_override("step_ms", 10);
        loader.set_override("step_ms", 20);

        assert_eq!(loader.load().unwrap().step_ms, 20);
    }

    #[test]
    fn test_missing_file() {
        let mut loader = SettingsLoader::new();
        loader.add_file("/nonexistent/watch.yaml");
        assert!(matches!(loader.load(), Err(WatchError::LoadError(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let mut loader = SettingsLoader::new();
        loader.add_file("watch.ini");
        let err = loader.load().unwrap_err();
        assert!(err.to_string().contains("Unsupported file extension"));
    }

    #[test]
    fn test_bad_value_type() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("watch.yaml");
        fs::write(&path, "step_ms: fast\n").unwrap();

        let mut loader = SettingsLoader::new();
        loader.add_file(&path);
        assert!(matches!(
            loader.load(),
            Err(WatchError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_source_names() {
        let mut loader = SettingsLoader::new();
        loader.add_file("a.yaml");
        loader.set_env_prefix("WATCH", "__");
        loader.set_override("step_ms", 1);

        assert_eq!(
            loader.source_names(),
            vec!["defaults", "file:a.yaml", "env:WATCH*", "overrides"]
        );
    }
}
