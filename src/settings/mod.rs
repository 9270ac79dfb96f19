//! Watcher settings and their loading.

mod loader;
mod watch_settings;

pub use loader::SettingsLoader;
pub use watch_settings::WatchSettings;
