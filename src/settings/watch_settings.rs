//! Tunables for a change watcher.

use crate::core::{PollInterval, Validate};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by every worker of a watcher.
///
/// All durations are in milliseconds. Missing fields take their defaults,
/// so a settings file only needs the values it changes:
///
/// ```yaml
/// step_ms: 250
/// max_interval_ms: 30000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Amount the poll interval moves per tick, and its lower bound.
    pub step_ms: u64,
    /// Upper bound of the poll interval.
    pub max_interval_ms: u64,
    /// Interval before the first check of a new key. Defaults to the step.
    pub initial_interval_ms: Option<u64>,
    /// Capacity of each worker's request queue.
    pub mailbox_capacity: usize,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            step_ms: 100,
            max_interval_ms: 10_000,
            initial_interval_ms: None,
            mailbox_capacity: 16,
        }
    }
}

impl WatchSettings {
    /// The poll interval step.
    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    /// The poll interval ceiling.
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    /// The interval before a new key's first check.
    pub fn initial_interval(&self) -> Duration {
        self.initial_interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.step())
    }

    /// The starting poll interval for a new worker.
    pub fn poll_interval(&self) -> PollInterval {
        PollInterval::new(self.initial_interval(), self.step(), self.max_interval())
    }
}

impl Validate for WatchSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.step_ms == 0 {
            errors.push(ValidationError::invalid_field(
                "step_ms",
                "must be greater than 0",
            ));
        }

        if self.max_interval_ms < self.step_ms {
            errors.push(ValidationError::invalid_field(
                "max_interval_ms",
                format!("must be >= step_ms ({})", self.step_ms),
            ));
        }

        if let Some(initial) = self.initial_interval_ms {
            if initial < self.step_ms || initial > self.max_interval_ms {
                errors.push(ValidationError::invalid_field(
                    "initial_interval_ms",
                    format!(
                        "must be between step_ms ({}) and max_interval_ms ({})",
                        self.step_ms, self.max_interval_ms
                    ),
                ));
            }
        }

        if self.mailbox_capacity == 0 {
            errors.push(ValidationError::invalid_field(
                "mailbox_capacity",
                "must be greater than 0",
            ));
        }

        ValidationError::collect(errors)
    }
}
