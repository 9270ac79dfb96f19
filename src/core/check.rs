//! The injected change-detection strategy.

use async_trait::async_trait;
use std::fmt::Display;
use std::marker::PhantomData;

/// Outcome of a single check against a watched resource.
///
/// The `value` is always kept by the worker as the comparison baseline for
/// the next check, whether or not `changed` is set. Only changed values are
/// relayed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation<T> {
    /// Whether the resource changed since the previous observation.
    pub changed: bool,
    /// The value observed during this check.
    pub value: T,
}

impl<T> Observation<T> {
    /// An observation reporting a change to `value`.
    pub fn changed(value: T) -> Self {
        Self {
            changed: true,
            value,
        }
    }

    /// An observation reporting no change.
    pub fn unchanged(value: T) -> Self {
        Self {
            changed: false,
            value,
        }
    }
}

impl<T> From<(bool, T)> for Observation<T> {
    fn from((changed, value): (bool, T)) -> Self {
        Self { changed, value }
    }
}

/// Detects whether the resource identified by a key has changed.
///
/// A watcher invokes the check once per poll tick for every active key. For
/// any given key it is never invoked concurrently with itself, and the first
/// invocation receives `T::default()` as the previous value.
///
/// The worker for a key cannot process subscribe or unsubscribe requests
/// while a check is outstanding, so implementations should return promptly.
/// There is no timeout on this call.
///
/// Failures have no dedicated channel: report them as unchanged and the key
/// backs off toward the maximum interval like any quiescent resource. See
/// [`fallible_fn`] for an adapter that also logs them.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use change_watcher::core::{Check, Observation};
///
/// struct Version;
///
/// #[async_trait]
/// impl Check<u64> for Version {
///     async fn check(&self, _key: &str, previous: u64) -> Observation<u64> {
///         let current = 7; // look the resource up here
///         Observation { changed: current != previous, value: current }
///     }
/// }
/// ```
#[async_trait]
pub trait Check<T>: Send + Sync {
    /// Check the resource for `key`, given the value returned by the previous call.
    async fn check(&self, key: &str, previous: T) -> Observation<T>;
}

/// A [`Check`] backed by a synchronous closure. Created by [`check_fn`].
pub struct CheckFn<F> {
    f: F,
}

/// Wrap a synchronous closure as a [`Check`].
///
/// # Examples
///
/// ```rust
/// use change_watcher::core::{Observation, check_fn};
///
/// let check = check_fn(|_key: &str, previous: u32| Observation::changed(previous + 1));
/// # let _ = check;
/// ```
pub fn check_fn<T, F>(f: F) -> CheckFn<F>
where
    F: Fn(&str, T) -> Observation<T> + Send + Sync,
{
    CheckFn { f }
}

#[async_trait]
impl<T, F> Check<T> for CheckFn<F>
where
    T: Send + 'static,
    F: Fn(&str, T) -> Observation<T> + Send + Sync,
{
    async fn check(&self, key: &str, previous: T) -> Observation<T> {
        (self.f)(key, previous)
    }
}

/// A [`Check`] that fetches the current value and compares it with the
/// previous one. Created by [`compare_fn`].
pub struct CompareFn<F, T> {
    fetch: F,
    _value: PhantomData<fn() -> T>,
}

/// Build a [`Check`] from a fetch function, deriving `changed` by equality.
///
/// # Examples
///
/// ```rust
/// use change_watcher::core::compare_fn;
///
/// let check = compare_fn(|key: &str| key.len());
/// # let _ = check;
/// ```
pub fn compare_fn<T, F>(fetch: F) -> CompareFn<F, T>
where
    T: PartialEq,
    F: Fn(&str) -> T + Send + Sync,
{
    CompareFn {
        fetch,
        _value: PhantomData,
    }
}

#[async_trait]
impl<T, F> Check<T> for CompareFn<F, T>
where
    T: PartialEq + Send + 'static,
    F: Fn(&str) -> T + Send + Sync,
{
    async fn check(&self, key: &str, previous: T) -> Observation<T> {
        let current = (self.fetch)(key);
        if current == previous {
            Observation::unchanged(current)
        } else {
            Observation::changed(current)
        }
    }
}

/// Like [`CompareFn`], but the fetch may fail. Created by [`fallible_fn`].
pub struct FallibleFn<F, T, E> {
    fetch: F,
    _value: PhantomData<fn() -> (T, E)>,
}

/// Build a [`Check`] from a fallible fetch function.
///
/// An `Err` is logged and reported as unchanged, carrying the previous value
/// forward so the next successful fetch is compared against the last good one.
pub fn fallible_fn<T, E, F>(fetch: F) -> FallibleFn<F, T, E>
where
    T: PartialEq,
    E: Display,
    F: Fn(&str) -> std::result::Result<T, E> + Send + Sync,
{
    FallibleFn {
        fetch,
        _value: PhantomData,
    }
}

#[async_trait]
impl<T, E, F> Check<T> for FallibleFn<F, T, E>
where
    T: PartialEq + Send + 'static,
    E: Display,
    F: Fn(&str) -> std::result::Result<T, E> + Send + Sync,
{
    async fn check(&self, key: &str, previous: T) -> Observation<T> {
        match (self.fetch)(key) {
            Ok(current) if current == previous => Observation::unchanged(current),
            Ok(current) => Observation::changed(current),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Change check failed, treating as unchanged");
                Observation::unchanged(previous)
            }
        }
    }
}
