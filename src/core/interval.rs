//! Adaptive poll interval.

use std::time::Duration;

/// The delay between two checks of one key.
///
/// Moves by one `step` at a time and always stays within `[step, max]`:
/// a change pulls it down toward `step`, a quiet tick pushes it up toward
/// `max`.
///
/// # Examples
///
/// ```rust
/// use change_watcher::core::PollInterval;
/// use std::time::Duration;
///
/// let mut interval = PollInterval::new(
///     Duration::from_millis(100),
///     Duration::from_millis(100),
///     Duration::from_millis(300),
/// );
///
/// interval.relax();
/// interval.relax();
/// interval.relax();
/// assert_eq!(interval.current(), Duration::from_millis(300));
///
/// interval.tighten();
/// assert_eq!(interval.current(), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval {
    current: Duration,
    step: Duration,
    max: Duration,
}

impl PollInterval {
    /// Create an interval starting at `initial`, clamped into `[step, max]`.
    ///
    /// A `max` below `step` is raised to `step`.
    pub fn new(initial: Duration, step: Duration, max: Duration) -> Self {
        let max = max.max(step);
        Self {
            current: initial.clamp(step, max),
            step,
            max,
        }
    }

    /// The current interval.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// The step size, which is also the floor.
    pub fn step(&self) -> Duration {
        self.step
    }

    /// The ceiling.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Back off by one step after a tick without change.
    pub fn relax(&mut self) -> Duration {
        self.current = self.current.saturating_add(self.step).min(self.max);
        self.current
    }

    /// Speed up by one step after a tick that saw a change.
    pub fn tighten(&mut self) -> Duration {
        self.current = self.current.saturating_sub(self.step).max(self.step);
        self.current
    }
}
