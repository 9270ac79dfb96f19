//! Built-in metrics for change watching.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Polls and detected changes
//! - Poll intervals
//! - Deliveries and dropped deliveries
//! - Active keys and subscribers
//!
//! # Examples
//!
//! ```rust,no_run
//! use change_watcher::prelude::*;
//! use opentelemetry::global;
//!
//! # fn example() -> Result<()> {
//! let meter = global::meter("my-app");
//!
//! let watcher = ChangeWatcher::builder()
//!     .with_metrics(meter)
//!     .build(compare_fn(|key: &str| key.len()))?;
//! # Ok(())
//! # }
//! ```

mod watch_metrics;

pub use watch_metrics::WatchMetrics;
