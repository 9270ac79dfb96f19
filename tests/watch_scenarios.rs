//! Integration tests for subscribing, polling and fan-out.

use change_watcher::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{sleep, timeout};

fn watcher<T, C>(check: C) -> ChangeWatcher<T>
where
    T: Clone + Default + Send + 'static,
    C: Check<T> + 'static,
{
    ChangeWatcher::new(check, Duration::from_millis(100), Duration::from_millis(1000)).unwrap()
}

fn counter() -> impl Check<u64> {
    check_fn(|_: &str, previous: u64| Observation::changed(previous + 1))
}

#[tokio::test(start_paused = true)]
async fn test_changing_key_delivered_within_one_tick() {
    let watcher = watcher(check_fn(|_: &str, _: String| {
        Observation::changed("v1".to_string())
    }));

    let mut sub = watcher.subscribe("a").await;
    let value = timeout(Duration::from_millis(150), sub.recv())
        .await
        .expect("no update within one tick");
    assert_eq!(value.as_deref(), Some("v1"));

    // Keeps changing, so the interval stays at the floor
    sleep(Duration::from_secs(1)).await;
    assert_eq!(watcher.poll_interval("a"), Some(Duration::from_millis(100)));

    watcher.unsubscribe("a", &sub).await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_key_backs_off_to_max() {
    let watcher = watcher(check_fn(|_: &str, previous: String| {
        Observation::unchanged(previous)
    }));

    let sub = watcher.subscribe("a").await;

    // Ten idle ticks: 100 + 200 + ... + 1000, capped after the ninth
    sleep(Duration::from_millis(100 + (2..=10).map(|n| n * 100).sum::<u64>())).await;
    assert_eq!(watcher.poll_interval("a"), Some(Duration::from_millis(1000)));

    sleep(Duration::from_secs(5)).await;
    assert_eq!(watcher.poll_interval("a"), Some(Duration::from_millis(1000)));

    watcher.unsubscribe("a", &sub).await;
}

#[tokio::test(start_paused = true)]
async fn test_stats_follow_subscriptions() {
    let watcher = watcher(counter());

    let first = watcher.subscribe("a").await;
    let second = watcher.subscribe("a").await;
    assert_eq!(
        watcher.stats(),
        WatchStats {
            active_keys: 1,
            total_subscribers: 2
        }
    );

    watcher.unsubscribe("a", &first).await;
    assert_eq!(
        watcher.stats(),
        WatchStats {
            active_keys: 1,
            total_subscribers: 1
        }
    );

    watcher.unsubscribe("a", &second).await;
    assert_eq!(watcher.stats(), WatchStats::default());
    assert!(!watcher.is_watching("a"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_subscriber_does_not_stall_others() {
    let watcher = watcher(counter());

    let mut fast = watcher.subscribe("a").await;
    let mut slow = watcher.subscribe("a").await;

    for expected in 1..=3 {
        assert_eq!(fast.recv().await, Some(expected));
    }

    // The slow subscriber kept the first value and missed the rest
    assert_eq!(slow.try_recv(), Ok(1));
    assert_eq!(slow.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(slow.recv().await, Some(4));

    watcher.unsubscribe("a", &fast).await;
    watcher.unsubscribe("a", &slow).await;
}

#[tokio::test(start_paused = true)]
async fn test_last_unsubscribe_closes_subscription() {
    let watcher = watcher(counter());

    let mut sub = watcher.subscribe("a").await;
    assert_eq!(sub.recv().await, Some(1));

    watcher.unsubscribe("a", &sub).await;
    let end = timeout(Duration::from_secs(1), async {
        while sub.recv().await.is_some() {}
    })
    .await;
    assert!(end.is_ok(), "subscription was not closed");
    assert!(sub.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_key_restarts_from_default() {
    let watcher = watcher(counter());

    let mut sub = watcher.subscribe("a").await;
    assert_eq!(sub.recv().await, Some(1));
    assert_eq!(sub.recv().await, Some(2));
    watcher.unsubscribe("a", &sub).await;

    let mut sub = watcher.subscribe("a").await;
    assert_eq!(sub.recv().await, Some(1));
    watcher.unsubscribe("a", &sub).await;
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_checked_independently() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let watcher = watcher(check_fn(move |key: &str, _: String| {
        counted.fetch_add(1, Ordering::SeqCst);
        if key == "busy" {
            Observation::changed(key.to_uppercase())
        } else {
            Observation::unchanged(String::new())
        }
    }));

    let mut busy = watcher.subscribe("busy").await;
    let mut quiet = watcher.subscribe("quiet").await;

    assert_eq!(busy.recv().await.as_deref(), Some("BUSY"));
    sleep(Duration::from_secs(3)).await;

    assert_eq!(quiet.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(watcher.poll_interval("busy"), Some(Duration::from_millis(100)));
    assert!(watcher.poll_interval("quiet") > Some(Duration::from_millis(100)));
    assert!(calls.load(Ordering::SeqCst) > 2);

    watcher.unsubscribe("busy", &busy).await;
    watcher.unsubscribe("quiet", &quiet).await;
}

#[tokio::test(start_paused = true)]
async fn test_failing_check_backs_off() {
    let watcher = ChangeWatcher::new(
        fallible_fn(|_: &str| Err::<u64, _>("backend unavailable")),
        Duration::from_millis(100),
        Duration::from_millis(300),
    )
    .unwrap();

    let mut sub = watcher.subscribe("a").await;
    sleep(Duration::from_secs(2)).await;

    assert_eq!(watcher.poll_interval("a"), Some(Duration::from_millis(300)));
    assert_eq!(sub.try_recv(), Err(TryRecvError::Empty));

    watcher.unsubscribe("a", &sub).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscribe_unsubscribe() {
    let watcher = ChangeWatcher::new(
        check_fn(|_: &str, previous: u64| Observation::unchanged(previous)),
        Duration::from_millis(10),
        Duration::from_millis(50),
    )
    .unwrap();

    let mut tasks = Vec::new();
    for task in 0..8 {
        let watcher = watcher.clone();
        tasks.push(tokio::spawn(async move {
            let mut kept = Vec::new();
            for round in 0..50 {
                let key = format!("key-{}", (task + round) % 4);
                let sub = watcher.subscribe(key.clone()).await;
                if round % 2 == 0 {
                    kept.push(sub);
                } else {
                    watcher.unsubscribe(&key, &sub).await;
                }
            }
            kept
        }));
    }

    let mut kept = Vec::new();
    for task in tasks {
        kept.extend(task.await.unwrap());
    }

    assert_eq!(
        watcher.stats(),
        WatchStats {
            active_keys: 4,
            total_subscribers: 8 * 25
        }
    );
    let per_key: usize = (0..4)
        .map(|k| watcher.subscriber_count(&format!("key-{}", k)))
        .sum();
    assert_eq!(per_key, kept.len());

    for sub in &kept {
        watcher.unsubscribe(sub.key(), sub).await;
    }
    assert_eq!(watcher.stats(), WatchStats::default());
}
