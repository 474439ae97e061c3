//! Stress tests for the concurrent map

use super::*;
use crate::MetricsCollector;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_concurrent_map_distinct_keys() {
    let map = Arc::new(ConcurrentMap::new());
    let num_threads = 8;
    let keys_per_thread = 125;

    let mut handles = vec![];
    for thread_id in 0..num_threads {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for i in 0..keys_per_thread {
                let key = thread_id * keys_per_thread + i;
                map.set(key, key);
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let mut keys = map.keys();
    keys.sort_unstable();
    assert_eq!(keys, (0..1000).collect::<Vec<_>>());

    let snapshot = map.snapshot();
    assert_eq!(snapshot.len(), 1000);
    for i in 0..1000 {
        assert_eq!(snapshot.get(&i), Some(&i));
    }
}

#[test]
fn test_concurrent_map_program_order_per_thread() {
    let map = Arc::new(ConcurrentMap::new());
    let num_threads = 8;
    let operations_per_thread = 500;

    let mut handles = vec![];
    for thread_id in 0..num_threads {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for i in 0..operations_per_thread {
                map.set(thread_id, i);
                // No other thread touches this key.
                assert_eq!(map.get(&thread_id), Some(i));
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    for thread_id in 0..num_threads {
        assert_eq!(map.get(&thread_id), Some(operations_per_thread - 1));
    }
}

#[test]
fn test_concurrent_map_no_torn_replace() {
    const WIDTH: usize = 16;

    let map: Arc<ConcurrentMap<usize, usize>> = Arc::new(ConcurrentMap::new());
    let done = Arc::new(AtomicBool::new(false));

    let replacer = thread::spawn({
        let map = Arc::clone(&map);
        move || {
            for generation in 0..2000 {
                map.replace_all((0..WIDTH).map(|k| (k, generation)).collect());
            }
        }
    });

    let clearer = thread::spawn({
        let map = Arc::clone(&map);
        move || {
            for _ in 0..200 {
                map.clear();
                thread::yield_now();
            }
        }
    });

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let map = Arc::clone(&map);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut observed = 0;
                while !done.load(Ordering::Relaxed) {
                    let snapshot = map.snapshot();
                    assert!(
                        snapshot.is_empty() || snapshot.len() == WIDTH,
                        "partial store observed: {} entries",
                        snapshot.len()
                    );
                    let mut generations: Vec<_> = snapshot.values().copied().collect();
                    generations.dedup();
                    assert!(generations.len() <= 1, "mixed generations: {:?}", generations);
                    observed += 1;
                }
                observed
            })
        })
        .collect();

    replacer.join().unwrap();
    clearer.join().unwrap();
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
}

#[test]
fn test_concurrent_map_reads_run_in_parallel() {
    let num_readers = 4;
    let map = Arc::new(ConcurrentMap::from_map([(0, 0)].into_iter().collect()));
    let barrier = Arc::new(Barrier::new(num_readers));

    // Every visitor waits for all the others; serialized reads would never get past it.
    let handles: Vec<_> = (0..num_readers)
        .map(|_| {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                map.for_each::<(), _>(|_, _| {
                    barrier.wait();
                    Ok(())
                })
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
}

#[test]
fn test_concurrent_map_write_excludes_readers() {
    let map = Arc::new(ConcurrentMap::from_map([("a", 1)].into_iter().collect()));
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let reader = thread::spawn({
        let map = Arc::clone(&map);
        move || {
            map.compact_map(|_, v| {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Some(*v)
            })
        }
    });

    started_rx.recv().unwrap();

    // Returns at once even though the running read holds the write back.
    map.set("a", 2);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(map.pending_writes(), 1);

    release_tx.send(()).unwrap();
    assert_eq!(reader.join().unwrap(), vec![1]);
    assert_eq!(map.get(&"a"), Some(2));
}

#[test]
fn test_concurrent_map_writes_visible_across_threads() {
    let map = Arc::new(ConcurrentMap::new());
    let (done_tx, done_rx) = mpsc::channel();

    let writer = thread::spawn({
        let map = Arc::clone(&map);
        move || {
            for i in 0..500 {
                map.set(i, i * 3);
            }
            // Sent before the worker has necessarily applied anything.
            done_tx.send(map.pending_writes()).unwrap();
        }
    });

    let _backlog = done_rx.recv().unwrap();
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let map = Arc::clone(&map);
            thread::spawn(move || (map.get(&499), map.len()))
        })
        .collect();

    for reader in readers {
        assert_eq!(reader.join().unwrap(), (Some(1497), 500));
    }
    writer.join().unwrap();
}

#[test]
fn test_concurrent_map_remove_semantics() {
    let map = Arc::new(ConcurrentMap::new());
    let num_threads = 4;
    let keys_per_thread = 200;

    let mut handles = vec![];
    for thread_id in 0..num_threads {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for i in 0..keys_per_thread {
                let key = thread_id * keys_per_thread + i;
                map.set(key, key * 2);
                assert_eq!(map.remove(&key), Some(key * 2));
                assert_eq!(map.get(&key), None);
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(map.is_empty());
}

#[test]
fn test_concurrent_map_high_contention() {
    let map = Arc::new(ConcurrentMap::new());
    let num_threads = 16;
    let operations_per_thread = 500;

    let mut handles = vec![];
    for thread_id in 0..num_threads {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for i in 0..operations_per_thread {
                let key = i % 10;
                match i % 4 {
                    0 => map.set(key, format!("thread_{}_op_{}", thread_id, i)),
                    1 => {
                        let _ = map.get(&key);
                    }
                    2 => {
                        let _ = map.remove(&key);
                    }
                    3 => {
                        let _ = map.keys();
                    }
                    _ => unreachable!(),
                }
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    for key in 0..10 {
        map.set(key, format!("final_value_{}", key));
        assert_eq!(map.get(&key), Some(format!("final_value_{}", key)));
    }

    let metrics = map.metrics();
    assert_eq!(metrics.writes_submitted, metrics.writes_applied);
    assert_eq!(metrics.writes_failed, 0);
}

#[test]
fn test_concurrent_map_drop_applies_pending_writes() {
    static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct DropTracker;

    impl Drop for DropTracker {
        fn drop(&mut self) {
            DROP_COUNT.fetch_add(1, Ordering::SeqCst);
        }
    }

    let map: ConcurrentMap<usize, DropTracker> = ConcurrentMap::new();
    for i in 0..100 {
        map.set(i, DropTracker);
    }
    for i in 0..50 {
        map.update(i, None);
    }
    drop(map);

    assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 100);
}

#[test]
fn test_concurrent_map_survives_panicking_key() {
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Touchy(u32);

    impl std::hash::Hash for Touchy {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            assert_ne!(self.0, 13, "unlucky key");
            self.0.hash(state);
        }
    }

    let map = ConcurrentMap::new();
    map.set(Touchy(1), "one");
    map.set(Touchy(13), "thirteen");
    map.set(Touchy(2), "two");
    map.flush();

    let metrics = map.metrics();
    assert_eq!(metrics.writes_applied, 2);
    assert_eq!(metrics.writes_failed, 1);
    assert_eq!(map.len(), 2);
    assert_eq!(map.get(&Touchy(2)), Some("two"));
}

#[test]
fn test_concurrent_map_complex_keys() {
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct ComplexKey {
        id: u64,
        name: String,
        tags: Vec<u32>,
    }

    let map: Arc<ConcurrentMap<ComplexKey, Vec<String>>> = Arc::new(ConcurrentMap::new());
    let num_threads = 4;
    let items_per_thread = 100;

    let mut handles = vec![];
    for thread_id in 0..num_threads {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for i in 0..items_per_thread {
                let key = ComplexKey {
                    id: (thread_id * items_per_thread + i) as u64,
                    name: format!("item_{}", i),
                    tags: vec![i as u32, (i + 1) as u32],
                };
                let value = vec![format!("thread_{}", thread_id), format!("item_{}", i)];

                map.set(key.clone(), value.clone());
                assert_eq!(map.get(&key), Some(value));
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let mut by_thread: HashMap<String, usize> = HashMap::new();
    for owner in map.compact_map(|_, v| v.first().cloned()) {
        *by_thread.entry(owner).or_insert(0) += 1;
    }
    assert_eq!(by_thread.len(), num_threads);
    assert!(by_thread.values().all(|&count| count == items_per_thread));
}
