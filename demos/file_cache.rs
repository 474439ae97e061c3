//! File metadata cache example
//!
//! A remote file provider keeps the last known metadata of every path in a
//! `ConcurrentMap`. A watcher thread applies change events as deferred writes
//! while UI threads keep browsing, and an expiry pass prunes stale entries
//! from inside a single read task.
//!
//! Run with `cargo run --example file_cache --features tracing` to see the
//! worker's log events.

use barriermap::{ConcurrentMap, MetricsCollector};
use crossbeam::channel::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct FileInfo {
    size: u64,
    modified: Instant,
}

#[derive(Debug)]
enum ChangeEvent {
    Created(String, u64),
    Modified(String, u64),
    Deleted(String),
    Resync(Vec<(String, u64)>),
}

fn run_watcher(cache: Arc<ConcurrentMap<String, FileInfo>>, events: Receiver<ChangeEvent>) {
    for event in events {
        match event {
            ChangeEvent::Created(path, size) | ChangeEvent::Modified(path, size) => {
                cache.set(path, FileInfo { size, modified: Instant::now() });
            }
            ChangeEvent::Deleted(path) => cache.update(path, None),
            ChangeEvent::Resync(listing) => {
                let now = Instant::now();
                cache.replace_all(
                    listing
                        .into_iter()
                        .map(|(path, size)| (path, FileInfo { size, modified: now }))
                        .collect(),
                );
            }
        }
    }
    cache.flush();
}

fn total_size(cache: &ConcurrentMap<String, FileInfo>, prefix: &str) -> u64 {
    cache
        .compact_map(|path, info| path.starts_with(prefix).then_some(info.size))
        .into_iter()
        .sum()
}

fn prune_older_than(cache: &ConcurrentMap<String, FileInfo>, max_age: Duration) -> usize {
    let mut pruned = 0;
    // Deletes queued from inside the read run right after it, in order.
    let _ = cache.for_each::<(), _>(|path, info| {
        if info.modified.elapsed() > max_age {
            cache.update(path.clone(), None);
            pruned += 1;
        }
        Ok(())
    });
    pruned
}

fn main() {
    barriermap::init_tracing();

    println!("File Metadata Cache Example");
    println!("===========================");

    let cache: Arc<ConcurrentMap<String, FileInfo>> = Arc::new(
        ConcurrentMap::builder()
            .label("file-cache")
            .capacity(1024)
            .build()
            .expect("failed to start cache worker"),
    );

    let (events_tx, events_rx) = channel::bounded(256);
    let watcher = thread::spawn({
        let cache = Arc::clone(&cache);
        move || run_watcher(cache, events_rx)
    });

    events_tx
        .send(ChangeEvent::Resync(
            (0..100).map(|i| (format!("/docs/file_{}.txt", i), 1024)).collect(),
        ))
        .unwrap();

    let start = Instant::now();
    let browsers: Vec<_> = (0..4)
        .map(|id| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let mut hits = 0;
                for i in 0..2_000 {
                    if cache.get(&format!("/docs/file_{}.txt", (id * 7 + i) % 150)).is_some() {
                        hits += 1;
                    }
                }
                hits
            })
        })
        .collect();

    for i in 100..150 {
        events_tx
            .send(ChangeEvent::Created(format!("/docs/file_{}.txt", i), 2048))
            .unwrap();
    }
    for i in 0..10 {
        events_tx
            .send(ChangeEvent::Modified(format!("/docs/file_{}.txt", i), 4096))
            .unwrap();
        events_tx
            .send(ChangeEvent::Deleted(format!("/docs/file_{}.txt", 140 + i)))
            .unwrap();
    }
    drop(events_tx);
    watcher.join().unwrap();

    let hits: usize = browsers.into_iter().map(|h| h.join().unwrap()).sum();
    println!("browser lookups hit {} times in {:?}", hits, start.elapsed());

    println!("entries: {}", cache.len());
    println!("bytes under /docs: {}", total_size(&cache, "/docs"));

    thread::sleep(Duration::from_millis(10));
    cache.set("/docs/fresh.txt".to_string(), FileInfo { size: 1, modified: Instant::now() });
    let pruned = prune_older_than(&cache, Duration::from_millis(5));
    println!("pruned {} stale entries, {} left", pruned, cache.len());

    let metrics = cache.metrics();
    println!("reads: {}", metrics.reads);
    println!("writes applied: {}", metrics.writes_applied);
    println!("contended reads: {:.1}%", metrics.contention_rate());
    println!("peak write backlog: {}", metrics.peak_pending_writes);
}
