//! Per-key polling worker.
//!
//! Each watched key is owned by one worker task. The task holds the key's
//! subscriber list, its adaptive poll interval and the last observed value,
//! and is reachable only through its mailbox:
//!
//! ```text
//! ChangeWatcher ──Command──► [mailbox] ──► Worker ──try_send──► Subscription 1
//!                                            │     ──try_send──► Subscription 2
//!                                            └── sleep(interval) → Check::check()
//! ```
//!
//! Closing the mailbox is the only way to stop a worker.

use crate::core::check::Check;
use crate::core::interval::PollInterval;
use crate::core::subscription::SubscriberId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;

/// A request for a worker, applied in mailbox order.
pub(crate) enum Command<T> {
    Subscribe {
        id: SubscriberId,
        sender: mpsc::Sender<T>,
    },
    Unsubscribe {
        id: SubscriberId,
    },
}

/// The registry's view of a running worker.
pub(crate) struct WorkerHandle<T> {
    /// Subscriptions counted against this key. Owned by the registry.
    pub(crate) subscribers: usize,
    mailbox: mpsc::Sender<Command<T>>,
    /// Current poll interval in nanoseconds, written only by the worker.
    interval: Arc<AtomicU64>,
}

/// Everything a worker needs besides its key.
pub(crate) struct WorkerOptions<T> {
    pub(crate) check: Arc<dyn Check<T>>,
    pub(crate) interval: PollInterval,
    pub(crate) mailbox_capacity: usize,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Option<WatchMetrics>,
}

impl<T> Clone for WorkerOptions<T> {
    fn clone(&self) -> Self {
        Self {
            check: Arc::clone(&self.check),
            interval: self.interval,
            mailbox_capacity: self.mailbox_capacity,
            #[cfg(feature = "metrics")]
            metrics: self.metrics.clone(),
        }
    }
}

impl<T> WorkerHandle<T>
where
    T: Clone + Default + Send + 'static,
{
    /// Spawn a worker task for `key` and return its handle.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(key: String, options: WorkerOptions<T>) -> Self {
        let (tx, rx) = mpsc::channel(options.mailbox_capacity.max(1));
        let published = Arc::new(AtomicU64::new(as_nanos(options.interval.current())));

        let worker = Worker {
            key,
            check: options.check,
            mailbox: rx,
            subscribers: Vec::new(),
            interval: options.interval,
            published: Arc::clone(&published),
            last: T::default(),
            #[cfg(feature = "metrics")]
            metrics: options.metrics,
        };
        tokio::spawn(worker.run());

        Self {
            subscribers: 0,
            mailbox: tx,
            interval: published,
        }
    }
}

impl<T> WorkerHandle<T> {
    /// A sender into the worker's mailbox.
    ///
    /// The mailbox closes once the handle and every sender cloned from it
    /// have been dropped.
    pub(crate) fn mailbox(&self) -> mpsc::Sender<Command<T>> {
        self.mailbox.clone()
    }

    /// The poll interval most recently published by the worker.
    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_nanos(self.interval.load(Ordering::Relaxed))
    }
}

struct Worker<T> {
    key: String,
    check: Arc<dyn Check<T>>,
    mailbox: mpsc::Receiver<Command<T>>,
    subscribers: Vec<(SubscriberId, mpsc::Sender<T>)>,
    interval: PollInterval,
    published: Arc<AtomicU64>,
    last: T,
    #[cfg(feature = "metrics")]
    metrics: Option<WatchMetrics>,
}

impl<T> Worker<T>
where
    T: Clone + Default + Send + 'static,
{
    async fn run(mut self) {
        debug!(key = %self.key, interval = ?self.interval.current(), "Watcher started");

        let sleep = time::sleep(self.interval.current());
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;

                command = self.mailbox.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                () = &mut sleep => {
                    self.poll().await;
                    sleep.as_mut().reset(Instant::now() + self.interval.current());
                }
            }
        }

        self.shutdown();
    }

    fn apply(&mut self, command: Command<T>) {
        match command {
            Command::Subscribe { id, sender } => {
                self.subscribers.push((id, sender));
                debug!(
                    key = %self.key,
                    subscriber = %id,
                    subscribers = self.subscribers.len(),
                    "Added subscriber"
                );
            }
            Command::Unsubscribe { id } => {
                let Some(index) = self.subscribers.iter().position(|(sub, _)| *sub == id) else {
                    panic!(
                        "Tried to remove subscriber {} from watcher '{}' but it doesn't exist",
                        id, self.key
                    );
                };

                // Dropping the sender closes the subscription.
                self.subscribers.remove(index);
                debug!(
                    key = %self.key,
                    subscriber = %id,
                    subscribers = self.subscribers.len(),
                    "Removed subscriber"
                );
            }
        }
    }

    async fn poll(&mut self) {
        let previous = std::mem::take(&mut self.last);
        let observation = self.check.check(&self.key, previous).await;
        self.last = observation.value;

        if observation.changed {
            self.interval.tighten();
        } else {
            self.interval.relax();
        }
        self.published
            .store(as_nanos(self.interval.current()), Ordering::Relaxed);

        trace!(
            key = %self.key,
            changed = observation.changed,
            interval = ?self.interval.current(),
            "Polled"
        );

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_poll(observation.changed, self.interval.current());
        }

        if observation.changed {
            self.fan_out();
        }
    }

    fn fan_out(&self) {
        let mut dropped = 0usize;
        for (id, sender) in &self.subscribers {
            match sender.try_send(self.last.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    trace!(key = %self.key, subscriber = %id, "Subscriber not ready, update dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    dropped += 1;
                    trace!(key = %self.key, subscriber = %id, "Subscription dropped by receiver");
                }
            }
        }
        let delivered = self.subscribers.len() - dropped;

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_fan_out(delivered, dropped);
        }

        trace!(key = %self.key, delivered, dropped, "Relayed change");
    }

    fn shutdown(self) {
        for (id, _sender) in &self.subscribers {
            warn!(key = %self.key, subscriber = %id, "Cleaned up orphan subscriber");
        }
        debug!(key = %self.key, "Watcher stopped");
    }
}

fn as_nanos(interval: Duration) -> u64 {
    u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::check::{Observation, check_fn};
    use crate::core::subscription::Subscription;

    const STEP: Duration = Duration::from_millis(100);
    const MAX: Duration = Duration::from_millis(1000);

    fn spawn_with<F>(f: F) -> WorkerHandle<String>
    where
        F: Fn(&str, String) -> Observation<String> + Send + Sync + 'static,
    {
        WorkerHandle::spawn(
            "a".to_string(),
            WorkerOptions {
                check: Arc::new(check_fn(f)),
                interval: PollInterval::new(STEP, STEP, MAX),
                mailbox_capacity: 4,
                #[cfg(feature = "metrics")]
                metrics: None,
            },
        )
    }

    async fn subscribe(handle: &WorkerHandle<String>) -> Subscription<String> {
        let (subscription, sender) = Subscription::channel("a".to_string());
        handle
            .mailbox()
            .send(Command::Subscribe {
                id: subscription.id(),
                sender,
            })
            .await
            .unwrap();
        subscription
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_value_is_delivered() {
        let handle = spawn_with(|_, _| Observation::changed("v1".to_string()));
        let mut sub = subscribe(&handle).await;

        let value = time::timeout(Duration::from_millis(150), sub.recv()).await;
        assert_eq!(value.unwrap(), Some("v1".to_string()));
        assert_eq!(handle.poll_interval(), STEP);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_backs_off_to_max() {
        let handle = spawn_with(|_, previous| Observation::unchanged(previous));
        let _sub = subscribe(&handle).await;

        // 100 + 200 + ... + 1000 ms covers the climb to the ceiling.
        time::sleep(Duration::from_millis(5_600)).await;
        assert_eq!(handle.poll_interval(), MAX);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.poll_interval(), MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_closes_subscription() {
        let handle = spawn_with(|_, previous| Observation::unchanged(previous));
        let mut sub = subscribe(&handle).await;

        handle
            .mailbox()
            .send(Command::Unsubscribe { id: sub.id() })
            .await
            .unwrap();

        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_unsubscribe_halts_worker() {
        let handle = spawn_with(|_, previous| Observation::unchanged(previous));
        let mut sub = subscribe(&handle).await;

        handle
            .mailbox()
            .send(Command::Unsubscribe {
                id: SubscriberId::next(),
            })
            .await
            .unwrap();

        time::timeout(Duration::from_secs(1), handle.mailbox().closed())
            .await
            .unwrap();
        let rejected = handle
            .mailbox()
            .send(Command::Unsubscribe { id: sub.id() })
            .await;
        assert!(rejected.is_err());
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_mailbox_closes_orphans() {
        let handle = spawn_with(|_, previous| Observation::unchanged(previous));
        let mut first = subscribe(&handle).await;
        let mut second = subscribe(&handle).await;

        drop(handle);

        assert_eq!(first.recv().await, None);
        assert_eq!(second.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_value_tracks_every_observation() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let handle = spawn_with(move |_, previous: String| {
            let mut seen = seen_clone.lock();
            seen.push(previous);
            let next = seen.len().to_string();
            // Only every third observation counts as a change.
            Observation {
                changed: seen.len() % 3 == 0,
                value: next,
            }
        });
        let _sub = subscribe(&handle).await;

        time::sleep(Duration::from_secs(3)).await;

        let seen = seen.lock();
        assert!(seen.len() >= 4);
        assert_eq!(seen[0], "");
        for (i, previous) in seen.iter().enumerate().skip(1) {
            assert_eq!(previous, &i.to_string());
        }
    }
}
