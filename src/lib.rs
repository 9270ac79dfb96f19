//! # change-watcher
//!
//! Keyed change notification with one adaptive polling worker per key.
//!
//! ## Overview
//!
//! `change-watcher` lets many consumers wait for changes to the same keys
//! while each key is checked by exactly one background worker:
//! - One worker per watched key, started on the first subscription
//! - Poll intervals that tighten while a key changes and relax while it is idle
//! - Non-blocking fan-out: a slow subscriber misses updates, it never stalls others
//! - Layered settings (defaults → files → env vars → builder)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use change_watcher::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<()> {
//! // Report the current length of a key as its value
//! let watcher = ChangeWatcher::builder()
//!     .with_step(Duration::from_millis(100))
//!     .with_max_interval(Duration::from_secs(5))
//!     .build(compare_fn(|key: &str| key.len()))?;
//!
//! let mut updates = watcher.subscribe("users").await;
//! if let Some(value) = updates.recv().await {
//!     println!("users changed: {}", value);
//! }
//!
//! assert_eq!(watcher.stats(), WatchStats { active_keys: 1, total_subscribers: 1 });
//! watcher.unsubscribe("users", &updates).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Checks
//!
//! A check is anything implementing [`Check`](core::Check). Closures are
//! adapted with [`check_fn`](core::check_fn), which receives the previous
//! value and decides itself whether the key changed, or with
//! [`compare_fn`](core::compare_fn), which fetches the current value and
//! compares it with the previous one:
//!
//! ```rust
//! use change_watcher::prelude::*;
//!
//! let counter = check_fn(|_key: &str, previous: u64| Observation::changed(previous + 1));
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics`: OpenTelemetry counters and gauges for polls, deliveries and subscribers

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod settings;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{
        ChangeWatcher, ChangeWatcherBuilder, Check, Observation, PollInterval, SubscriberId,
        Subscription, Validate, WatchStats, check_fn, compare_fn, fallible_fn,
    };
    pub use crate::error::{Result, ValidationError, WatchError};
    pub use crate::settings::WatchSettings;
}
