//! The registry of watched keys.

use crate::core::ChangeWatcherBuilder;
use crate::core::check::Check;
use crate::core::subscription::Subscription;
use crate::core::worker::{Command, WorkerHandle, WorkerOptions};
use crate::error::{Result, WatchError};
use crate::settings::WatchSettings;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error};

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;

/// Snapshot of a watcher's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Number of keys with at least one subscriber.
    pub active_keys: usize,
    /// Number of subscriptions across all keys.
    pub total_subscribers: usize,
}

/// Mutable registry state, guarded by a single lock.
struct Registry<T> {
    workers: HashMap<String, WorkerHandle<T>>,
    total_subscribers: usize,
}

struct Shared<T> {
    registry: Mutex<Registry<T>>,
    options: WorkerOptions<T>,
    settings: WatchSettings,
}

/// Polls keyed resources for changes and relays new values to subscribers.
///
/// Every key with at least one subscriber gets its own worker task. The
/// worker calls the injected [`Check`] on an adaptive schedule: each tick
/// without a change lengthens the interval by one step up to the maximum,
/// each change shortens it by one step down to the step itself. Changed
/// values are offered to every subscription of the key without waiting, so
/// a subscriber that is not ready misses that value.
///
/// The watcher is a cheap handle; clones share the same registry. Workers
/// stop when their last subscription is removed, or when every clone of the
/// watcher has been dropped.
///
/// # Examples
///
/// ```rust,no_run
/// use change_watcher::prelude::*;
/// use std::time::Duration;
///
/// # async fn example() -> Result<()> {
/// let watcher = ChangeWatcher::builder()
///     .with_step(Duration::from_millis(100))
///     .with_max_interval(Duration::from_secs(1))
///     .build(check_fn(|_key: &str, _previous: String| {
///         Observation::changed("v1".to_string())
///     }))?;
///
/// let mut subscription = watcher.subscribe("a").await;
/// assert_eq!(subscription.recv().await.as_deref(), Some("v1"));
///
/// watcher.unsubscribe("a", &subscription).await;
/// assert_eq!(watcher.stats(), WatchStats::default());
/// # Ok(())
/// # }
/// ```
pub struct ChangeWatcher<T> {
    shared: Arc<Shared<T>>,
}

impl ChangeWatcher<()> {
    /// Create a new builder for constructing a change watcher.
    pub fn builder() -> ChangeWatcherBuilder {
        ChangeWatcherBuilder::new()
    }
}

impl<T> ChangeWatcher<T>
where
    T: Clone + Default + Send + 'static,
{
    /// Create a watcher with the given step and maximum poll interval.
    ///
    /// All other settings take their defaults. Use [`ChangeWatcher::builder`]
    /// for settings files, environment overrides or metrics.
    ///
    /// # Errors
    ///
    /// Returns an error if the intervals are invalid (zero step, or a
    /// maximum below the step).
    pub fn new<C>(check: C, step: Duration, max_interval: Duration) -> Result<Self>
    where
        C: Check<T> + 'static,
    {
        ChangeWatcherBuilder::new()
            .with_step(step)
            .with_max_interval(max_interval)
            .build(check)
    }

    pub(crate) fn from_parts(
        check: Arc<dyn Check<T>>,
        settings: WatchSettings,
        #[cfg(feature = "metrics")] metrics: Option<WatchMetrics>,
    ) -> Self {
        let options = WorkerOptions {
            check,
            interval: settings.poll_interval(),
            mailbox_capacity: settings.mailbox_capacity,
            #[cfg(feature = "metrics")]
            metrics,
        };

        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    workers: HashMap::new(),
                    total_subscribers: 0,
                }),
                options,
                settings,
            }),
        }
    }

    /// Subscribe to changes of `key`.
    ///
    /// Starts a worker for the key if this is its first subscriber. The
    /// returned subscription yields every changed value the worker observes
    /// while the subscription is ready to receive.
    ///
    /// Do not drop the subscription to stop watching; pass it to
    /// [`unsubscribe`](Self::unsubscribe) so the key's count stays accurate.
    ///
    /// If the key's worker has died, the subscription comes back already
    /// closed and is not counted. Unsubscribing it is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn subscribe(&self, key: impl Into<String>) -> Subscription<T> {
        let key = key.into();
        let (mut subscription, sender) = Subscription::channel(key.clone());

        let mailbox = {
            let mut registry = self.shared.registry.lock();
            let worker = match registry.workers.entry(key.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let worker = WorkerHandle::spawn(key.clone(), self.shared.options.clone());
                    entry.insert(worker)
                }
            };
            worker.subscribers += 1;
            let mailbox = worker.mailbox();
            registry.total_subscribers += 1;
            self.record_counts(&registry);
            mailbox
        };

        // Enqueue outside the lock. If this future is dropped before the
        // message is sent, or the worker is gone, the guard gives the
        // count back.
        let mut guard = PendingSubscribe {
            watcher: self,
            key: &key,
            armed: true,
        };
        let command = Command::Subscribe {
            id: subscription.id(),
            sender,
        };
        match mailbox.send(command).await {
            Ok(()) => guard.armed = false,
            Err(_) => {
                error!(
                    key = %key,
                    subscriber = %subscription.id(),
                    "Watcher has stopped, subscription was not registered"
                );
                subscription.mark_unregistered();
            }
        }
        drop(guard);

        subscription
    }

    /// Remove a subscription from `key` and close it.
    ///
    /// When this was the key's last subscription, the key's worker is
    /// removed and stops after processing this request; any subscription
    /// still registered with it at that point is closed as well.
    ///
    /// # Panics
    ///
    /// Panics if no worker exists for `key`, or if the subscription was
    /// created for a different key. Either means the subscription protocol
    /// has already been broken elsewhere. Unsubscribing the same
    /// subscription twice while other subscribers keep the key alive makes
    /// the key's worker panic instead.
    pub async fn unsubscribe(&self, key: &str, subscription: &Subscription<T>) {
        if let Err(e) = self.try_unsubscribe(key, subscription).await {
            panic!(
                "Tried to unsubscribe {} from '{}': {}",
                subscription.id(),
                key,
                e
            );
        }
    }

    /// Like [`unsubscribe`](Self::unsubscribe), but reports an unknown key or
    /// a mismatched subscription as an error instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::KeyMismatch`] if the subscription belongs to a
    /// different key, and [`WatchError::UnknownKey`] if no worker exists for
    /// `key`. The registry is left untouched in both cases.
    pub async fn try_unsubscribe(&self, key: &str, subscription: &Subscription<T>) -> Result<()> {
        if subscription.key() != key {
            return Err(WatchError::KeyMismatch {
                key: key.to_string(),
                subscribed: subscription.key().to_string(),
            });
        }

        if !subscription.is_registered() {
            debug!(
                key = %key,
                subscriber = %subscription.id(),
                "Subscription was never registered, nothing to remove"
            );
            return Ok(());
        }

        let mailbox = {
            let mut registry = self.shared.registry.lock();
            let Some(worker) = registry.workers.get_mut(key) else {
                return Err(WatchError::UnknownKey {
                    key: key.to_string(),
                });
            };
            worker.subscribers -= 1;
            let remaining = worker.subscribers;
            let mailbox = worker.mailbox();
            registry.total_subscribers -= 1;

            if remaining == 0 {
                // Dropping the handle leaves `mailbox` as the last sender, so
                // the worker's queue closes right after this request.
                registry.workers.remove(key);
                debug!(
                    key = %key,
                    watchers = registry.workers.len(),
                    "No subscribers left, stopping watcher"
                );
            }
            self.record_counts(&registry);
            mailbox
        };

        let command = Command::Unsubscribe {
            id: subscription.id(),
        };
        match mailbox.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => deliver_detached(key, mailbox, command).await,
            Err(TrySendError::Closed(_)) => {
                error!(key = %key, subscriber = %subscription.id(), "Watcher has stopped");
            }
        }

        Ok(())
    }

    /// Number of active keys and total subscriptions.
    pub fn stats(&self) -> WatchStats {
        let registry = self.shared.registry.lock();
        WatchStats {
            active_keys: registry.workers.len(),
            total_subscribers: registry.total_subscribers,
        }
    }

    /// Number of subscriptions for `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.shared
            .registry
            .lock()
            .workers
            .get(key)
            .map_or(0, |worker| worker.subscribers)
    }

    /// Whether `key` currently has a worker.
    pub fn is_watching(&self, key: &str) -> bool {
        self.shared.registry.lock().workers.contains_key(key)
    }

    /// The current poll interval of `key`, if it is being watched.
    pub fn poll_interval(&self, key: &str) -> Option<Duration> {
        self.shared
            .registry
            .lock()
            .workers
            .get(key)
            .map(WorkerHandle::poll_interval)
    }

    /// The settings this watcher was built with.
    pub fn settings(&self) -> &WatchSettings {
        &self.shared.settings
    }
}

impl<T> ChangeWatcher<T> {
    /// Undo the registry side of a subscribe whose message never reached
    /// the worker.
    fn release(&self, key: &str) {
        let mut registry = self.shared.registry.lock();
        let Some(worker) = registry.workers.get_mut(key) else {
            return;
        };
        worker.subscribers -= 1;
        let remaining = worker.subscribers;
        registry.total_subscribers -= 1;
        if remaining == 0 {
            registry.workers.remove(key);
        }
        self.record_counts(&registry);
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record_counts(&self, registry: &Registry<T>) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.shared.options.metrics {
            metrics.update_counts(registry.workers.len(), registry.total_subscribers);
        }
    }
}

/// Finish a mailbox send on its own task, so it completes even if the
/// caller stops waiting.
async fn deliver_detached<T>(key: &str, mailbox: mpsc::Sender<Command<T>>, command: Command<T>)
where
    T: Send + 'static,
{
    let delivery = tokio::spawn(async move { mailbox.send(command).await.is_ok() });
    if !matches!(delivery.await, Ok(true)) {
        error!(key = %key, "Watcher has stopped");
    }
}

/// Rolls back a subscribe that was cancelled before its message was sent.
struct PendingSubscribe<'a, T> {
    watcher: &'a ChangeWatcher<T>,
    key: &'a str,
    armed: bool,
}

impl<T> Drop for PendingSubscribe<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            debug!(key = %self.key, "Subscribe cancelled before reaching the watcher");
            self.watcher.release(self.key);
        }
    }
}

impl<T> Clone for ChangeWatcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}
