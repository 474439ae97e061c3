//! Per-instance task stream
//!
//! Every operation on a [`ConcurrentMap`](super::ConcurrentMap) is a task in one
//! FIFO stream. Write tasks are queued as [`Command`]s and applied one at a time
//! by a dedicated worker thread. Read tasks run on the calling thread once the
//! gate admits them.
//!
//! ## Epochs
//!
//! ```text
//! submitted writes:   W0        W1    W2
//! stream:         R R W0 R R R  W1 R  W2 R
//! read epoch:     0 0    1 1 1     2     3
//! ```
//!
//! A read submitted after `w` writes belongs to epoch `w`. It is admitted once
//! exactly `w` writes have finished, so it sees all of them and none of the
//! later ones. Write `w` starts only after every read of epoch `w` has
//! finished. Reads of one epoch run in parallel.
//!
//! The gate mutex is only held for bookkeeping. The store itself sits behind a
//! `RwLock` that the gate keeps uncontended: the worker never asks for the
//! write lock while an admitted read could still hold the read lock.

use super::command::Command;
use crate::metrics::AtomicMetrics;
use crate::trace::{debug, error, trace};
use crate::Result;
use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex, RwLock};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

thread_local! {
    // Instances whose read callback is running on this thread.
    static ACTIVE_READS: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    // Instance whose write worker is this thread.
    static WORKER_OF: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Bookkeeping guarded by the gate mutex
struct Gate<K, V> {
    queue: VecDeque<Command<K, V>>,
    /// Writes submitted so far; also the epoch of the next read
    submitted: u64,
    /// Writes finished so far, successfully or not
    finished: u64,
    /// Registered reads per epoch
    readers: BTreeMap<u64, usize>,
    shutdown: bool,
}

impl<K, V> Gate<K, V> {
    /// Whether the next queued write may start
    #[inline]
    fn write_ready(&self) -> bool {
        !self.queue.is_empty() && !self.readers.contains_key(&self.finished)
    }

    #[inline]
    fn backlog(&self) -> usize {
        (self.submitted - self.finished) as usize
    }
}

struct Shared<K, V> {
    gate: CachePadded<Mutex<Gate<K, V>>>,
    changed: Condvar,
    store: RwLock<HashMap<K, V>>,
    metrics: CachePadded<AtomicMetrics>,
    label: String,
}

impl<K, V> Shared<K, V> {
    #[inline]
    fn id(&self) -> usize {
        self as *const Self as usize
    }
}

/// Task gate plus the worker thread that applies writes
pub(crate) struct Scheduler<K, V> {
    shared: Arc<Shared<K, V>>,
    worker: Option<JoinHandle<()>>,
}

impl<K, V> Scheduler<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Take ownership of `store` and spawn the worker thread.
    pub(crate) fn start(label: String, store: HashMap<K, V>, metrics: bool) -> Result<Self> {
        let shared = Arc::new(Shared {
            gate: CachePadded::new(Mutex::new(Gate {
                queue: VecDeque::new(),
                submitted: 0,
                finished: 0,
                readers: BTreeMap::new(),
                shutdown: false,
            })),
            changed: Condvar::new(),
            store: RwLock::new(store),
            metrics: CachePadded::new(AtomicMetrics::new(metrics)),
            label,
        });

        let worker = thread::Builder::new().name(shared.label.clone()).spawn({
            let shared = Arc::clone(&shared);
            move || run_worker(shared)
        })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Run `task` as a read task and return its result.
    ///
    /// Blocks until every earlier write has finished. The task runs on the
    /// calling thread, possibly in parallel with other reads.
    pub(crate) fn read<R>(&self, task: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        self.assert_not_reentrant();
        let shared = &*self.shared;

        let (epoch, wait) = {
            let mut gate = shared.gate.lock();
            let epoch = gate.submitted;
            *gate.readers.entry(epoch).or_insert(0) += 1;

            let wait = if gate.finished < epoch {
                let started = Instant::now();
                while gate.finished < epoch {
                    shared.changed.wait(&mut gate);
                }
                Some(started.elapsed())
            } else {
                None
            };
            (epoch, wait)
        };
        shared.metrics.record_read(wait);

        // Declared before the store guard so the guard is released first.
        let _admitted = Admitted { shared, epoch };
        let _scope = ReadScope::enter(shared.id());
        let store = shared.store.read();
        task(&store)
    }

    /// Queue `command` behind every task submitted so far.
    ///
    /// Returns the ticket to pass to [`wait_for`](Self::wait_for).
    pub(crate) fn submit(&self, command: Command<K, V>) -> u64 {
        let shared = &*self.shared;
        let ticket = {
            let mut gate = shared.gate.lock();
            gate.queue.push_back(command);
            gate.submitted += 1;
            // Recorded under the gate so the worker's backlog update cannot be overtaken.
            shared.metrics.record_submit(gate.backlog());
            gate.submitted
        };
        shared.changed.notify_all();
        ticket
    }

    /// Block until the write holding `ticket` has finished.
    pub(crate) fn wait_for(&self, ticket: u64) {
        self.assert_not_reentrant();
        let mut gate = self.shared.gate.lock();
        while gate.finished < ticket {
            self.shared.changed.wait(&mut gate);
        }
    }

    /// Writes submitted but not yet finished.
    pub(crate) fn backlog(&self) -> usize {
        self.shared.gate.lock().backlog()
    }

    pub(crate) fn metrics(&self) -> &AtomicMetrics {
        &self.shared.metrics
    }

    pub(crate) fn label(&self) -> &str {
        &self.shared.label
    }

    /// Panic if called from inside one of this instance's read callbacks, or
    /// from its own worker thread.
    ///
    /// A read callback would wait on a write that itself waits on the running
    /// read. The worker would wait on a write that only it can finish.
    pub(crate) fn assert_not_reentrant(&self) {
        let id = self.shared.id();
        if ACTIVE_READS.with(|active| active.borrow().contains(&id)) {
            error!(label = %self.shared.label, "blocking call from inside a read callback");
            panic!(
                "barriermap `{}`: blocking call made from inside one of the map's own read callbacks",
                self.shared.label
            );
        }
        if WORKER_OF.with(Cell::get) == Some(id) {
            error!(label = %self.shared.label, "blocking call from the write worker");
            panic!(
                "barriermap `{}`: blocking call made from the map's own write worker",
                self.shared.label
            );
        }
    }
}

impl<K, V> Drop for Scheduler<K, V> {
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn drop(&mut self) {
        let backlog = {
            let mut gate = self.shared.gate.lock();
            gate.shutdown = true;
            gate.backlog()
        };
        debug!(label = %self.shared.label, backlog, "draining write worker");
        self.shared.changed.notify_all();

        if let Some(worker) = self.worker.take() {
            // The worker catches panics from commands; a join error has nothing left to clean up.
            let _ = worker.join();
        }
    }
}

impl<K, V> fmt::Debug for Scheduler<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = self.shared.gate.lock();
        f.debug_struct("Scheduler")
            .field("label", &self.shared.label)
            .field("submitted", &gate.submitted)
            .field("finished", &gate.finished)
            .field("readers", &gate.readers.values().sum::<usize>())
            .finish()
    }
}

/// Releases a read's registration, also when the read callback panics
struct Admitted<'a, K, V> {
    shared: &'a Shared<K, V>,
    epoch: u64,
}

impl<K, V> Drop for Admitted<'_, K, V> {
    fn drop(&mut self) {
        let last = {
            let mut gate = self.shared.gate.lock();
            match gate.readers.get_mut(&self.epoch) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                _ => {
                    gate.readers.remove(&self.epoch);
                    true
                }
            }
        };
        if last {
            self.shared.changed.notify_all();
        }
    }
}

/// Marks this thread as running a read callback for one instance
struct ReadScope {
    id: usize,
}

impl ReadScope {
    fn enter(id: usize) -> Self {
        ACTIVE_READS.with(|active| active.borrow_mut().push(id));
        Self { id }
    }
}

impl Drop for ReadScope {
    fn drop(&mut self) {
        ACTIVE_READS.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|&id| id == self.id) {
                active.remove(pos);
            }
        });
    }
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn run_worker<K, V>(shared: Arc<Shared<K, V>>)
where
    K: Eq + Hash,
{
    WORKER_OF.with(|worker| worker.set(Some(shared.id())));
    debug!(label = %shared.label, "write worker started");

    loop {
        let command = {
            let mut gate = shared.gate.lock();
            loop {
                if gate.write_ready() {
                    break gate.queue.pop_front();
                }
                if gate.shutdown && gate.queue.is_empty() {
                    break None;
                }
                shared.changed.wait(&mut gate);
            }
        };
        let Some(command) = command else { break };

        let name = command.name();
        let failed = {
            let mut store = shared.store.write();
            panic::catch_unwind(AssertUnwindSafe(|| command.apply(&mut store))).is_err()
        };
        if failed {
            error!(label = %shared.label, command = name, "write panicked; store left as the panic found it");
        } else {
            trace!(label = %shared.label, command = name, "write applied");
        }

        {
            let mut gate = shared.gate.lock();
            gate.finished += 1;
            shared.metrics.record_apply(failed, gate.backlog());
        }
        shared.changed.notify_all();
    }

    debug!(label = %shared.label, "write worker stopped");
}
