//! Watcher metrics tracking using OpenTelemetry.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::time::Duration;

/// Metrics collector for a change watcher.
///
/// Shared by the registry and every worker; clones record into the same
/// instruments.
///
/// # Examples
///
/// ```rust,no_run
/// use change_watcher::metrics::WatchMetrics;
/// use opentelemetry::global;
/// use std::time::Duration;
///
/// let metrics = WatchMetrics::new(global::meter("change-watcher"));
///
/// metrics.record_poll(true, Duration::from_millis(100));
/// metrics.record_fan_out(3, 1);
/// metrics.update_counts(1, 4);
/// ```
#[derive(Clone)]
pub struct WatchMetrics {
    polls: Counter<u64>,
    changes: Counter<u64>,
    poll_interval: Histogram<f64>,
    deliveries: Counter<u64>,
    dropped_deliveries: Counter<u64>,
    active_keys: Gauge<i64>,
    subscribers: Gauge<i64>,
}

impl WatchMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let polls = meter
            .u64_counter("change_watcher.polls")
            .with_description("Number of change checks performed")
            .build();

        let changes = meter
            .u64_counter("change_watcher.changes")
            .with_description("Number of checks that reported a change")
            .build();

        let poll_interval = meter
            .f64_histogram("change_watcher.poll.interval")
            .with_description("Poll interval chosen after each check, in seconds")
            .with_unit("s")
            .build();

        let deliveries = meter
            .u64_counter("change_watcher.deliveries")
            .with_description("Changed values handed to subscribers")
            .build();

        let dropped_deliveries = meter
            .u64_counter("change_watcher.deliveries.dropped")
            .with_description("Changed values dropped because a subscriber was not ready")
            .build();

        let active_keys = meter
            .i64_gauge("change_watcher.keys.active")
            .with_description("Number of keys being watched")
            .build();

        let subscribers = meter
            .i64_gauge("change_watcher.subscribers.active")
            .with_description("Number of active subscriptions")
            .build();

        Self {
            polls,
            changes,
            poll_interval,
            deliveries,
            dropped_deliveries,
            active_keys,
            subscribers,
        }
    }

    /// Record one check and the interval chosen after it.
    pub fn record_poll(&self, changed: bool, next_interval: Duration) {
        self.polls.add(1, &[]);
        if changed {
            self.changes.add(1, &[]);
        }
        self.poll_interval.record(next_interval.as_secs_f64(), &[]);
    }

    /// Record the outcome of relaying one change.
    pub fn record_fan_out(&self, delivered: usize, dropped: usize) {
        self.deliveries.add(delivered as u64, &[]);
        self.dropped_deliveries.add(dropped as u64, &[]);
    }

    /// Update the active key and subscriber gauges.
    pub fn update_counts(&self, active_keys: usize, subscribers: usize) {
        self.active_keys.record(active_keys as i64, &[]);
        self.subscribers.record(subscribers as i64, &[]);
    }
}
