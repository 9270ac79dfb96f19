//! Example demonstrating per-key change watching.
//!
//! This example shows how to:
//! - Build a watcher around a check function
//! - Subscribe several consumers to the same key
//! - Watch the poll interval back off once a key stops changing
//!
//! Run with: cargo run --example watch_counter

use change_watcher::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Change Watcher Example ===\n");

    // Shared "resource": a version number per key, bumped by a writer task
    let versions: Arc<parking_lot::Mutex<HashMap<String, u64>>> = Arc::default();

    let source = Arc::clone(&versions);
    let watcher = ChangeWatcher::builder()
        .with_step(Duration::from_millis(50))
        .with_max_interval(Duration::from_millis(500))
        .build(compare_fn(move |key: &str| {
            source.lock().get(key).copied().unwrap_or_default()
        }))?;

    let mut first = watcher.subscribe("orders").await;
    let mut second = watcher.subscribe("orders").await;
    println!("Subscribed: {:?}", watcher.stats());

    let writer = Arc::clone(&versions);
    tokio::spawn(async move {
        for version in 1..=5 {
            tokio::time::sleep(Duration::from_millis(120)).await;
            writer.lock().insert("orders".to_string(), version);
        }
    });

    for _ in 0..5 {
        tokio::select! {
            Some(version) = first.recv() => println!("[first]  orders -> v{}", version),
            Some(version) = second.recv() => println!("[second] orders -> v{}", version),
        }
    }

    // No more writes: the interval relaxes toward the maximum
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(300)).await;
        println!(
            "Idle poll interval: {:?}",
            watcher.poll_interval("orders").unwrap_or_default()
        );
    }

    watcher.unsubscribe("orders", &first).await;
    watcher.unsubscribe("orders", &second).await;
    println!("\nUnsubscribed: {:?}", watcher.stats());

    Ok(())
}
