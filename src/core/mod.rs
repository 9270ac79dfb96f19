//! Core change watching types.

mod builder;
mod check;
mod interval;
mod subscription;
mod validation;
mod watcher;
mod worker;

pub use builder::ChangeWatcherBuilder;
pub use check::{
    Check, CheckFn, CompareFn, FallibleFn, Observation, check_fn, compare_fn, fallible_fn,
};
pub use interval::PollInterval;
pub use subscription::{SubscriberId, Subscription};
pub use validation::Validate;
pub use watcher::{ChangeWatcher, WatchStats};
