//! The subscriber side of a watch.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a subscription, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A subscription to changes of one key.
///
/// Holds a single-slot receiver. The worker for the key offers each new
/// value without waiting: if the previous value has not been received yet,
/// the new one is dropped for this subscription. Later values still arrive.
///
/// The channel is closed by the watcher, never by the caller: after
/// [`ChangeWatcher::unsubscribe`](crate::core::ChangeWatcher::unsubscribe)
/// is processed, [`recv`](Self::recv) returns `None`.
pub struct Subscription<T> {
    id: SubscriberId,
    key: String,
    rx: mpsc::Receiver<T>,
    registered: bool,
}

impl<T> Subscription<T> {
    /// Create a subscription and the sender half handed to the worker.
    pub(crate) fn channel(key: String) -> (Self, mpsc::Sender<T>) {
        let (tx, rx) = mpsc::channel(1);
        let subscription = Self {
            id: SubscriberId::next(),
            key,
            rx,
            registered: true,
        };
        (subscription, tx)
    }

    /// Mark a subscription that never reached a live worker.
    pub(crate) fn mark_unregistered(&mut self) {
        self.registered = false;
    }

    /// Whether the subscription is counted by the watcher.
    pub(crate) fn is_registered(&self) -> bool {
        self.registered
    }

    /// The identity of this subscription.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The key this subscription watches.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next changed value.
    ///
    /// Returns `None` once the watcher has closed this subscription.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take a pending value without waiting.
    pub fn try_recv(&mut self) -> std::result::Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    /// Whether the watcher has released its side of the channel.
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("registered", &self.registered)
            .finish()
    }
}
