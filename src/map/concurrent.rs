//! Concurrent Map Implementation
//!
//! A `HashMap` owned by a per-instance task stream. Reads run in parallel on the
//! calling thread; writes are queued and applied one at a time by a worker
//! thread, strictly in submission order.
//!
//! ## Design
//!
//! The map uses:
//! - A FIFO task gate that groups reads into epochs between writes
//! - A dedicated worker thread that applies queued write commands
//! - Copies on every read, so the store never escapes the container
//!
//! ## Ordering Guarantees
//!
//! - A task observes every write submitted before it, from any thread
//! - A task observes no write submitted after it
//! - Writes never overlap any other task
//!
//! ## Performance Characteristics
//!
//! - **Get**: O(1) average, waits for earlier writes to drain
//! - **Set / Clear / Replace**: O(1) to submit, applied later by the worker
//! - **Keys / Snapshot**: O(n) copy
//!
//! ## Example
//!
//! ```rust
//! use barriermap::ConcurrentMap;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let map = Arc::new(ConcurrentMap::new());
//!
//! let writer = thread::spawn({
//!     let map = Arc::clone(&map);
//!     move || {
//!         for i in 0..1000 {
//!             map.set(i, i * 2);
//!         }
//!     }
//! });
//! writer.join().unwrap();
//!
//! // Submitted after every write above, so it sees all of them.
//! let sum: i32 = map.compact_map(|_, v| Some(*v)).into_iter().sum();
//! assert_eq!(sum, 999000);
//! ```

use super::builder::{MapBuilder, WriteMode};
use super::command::Command;
use super::scheduler::Scheduler;
use crate::metrics::{MapMetrics, MetricsCollector};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A thread-safe map with parallel reads and FIFO-ordered exclusive writes
///
/// # Type Parameters
///
/// * `K` - The key type, must implement `Hash + Eq + Send + Sync`
/// * `V` - The value type, must implement `Send + Sync`
///
/// # Blocking behavior
///
/// `get`, `keys`, `snapshot`, `for_each`, `compact_map`, `len`, `is_empty`,
/// `contains_key` and `flush` block until they have run. `set`, `update`,
/// `clear` and `replace_all` return as soon as the write is queued, unless the
/// map was built with [`WriteMode::Blocking`]. `remove` reads synchronously and
/// deletes like any other write.
///
/// # Re-entrancy
///
/// Callbacks passed to `for_each` and `compact_map` run inside a read task.
/// They may queue writes on the same map, but any blocking call on the same
/// map from inside the callback panics: it would wait for a write that is
/// itself waiting for the callback to return.
///
/// The same holds for code the worker thread runs while applying a write,
/// such as a `Drop` impl of an overwritten value or a key's `Hash` impl. A
/// blocking call on the same map from there panics; the panic is caught and
/// the write counted as failed unless the caller catches it first.
///
/// # Examples
///
/// ```rust
/// use barriermap::ConcurrentMap;
///
/// let map: ConcurrentMap<i32, String> = ConcurrentMap::new();
/// map.set(1, "hello".to_string());
/// assert_eq!(map.get(&1), Some("hello".to_string()));
/// ```
pub struct ConcurrentMap<K, V> {
    scheduler: Scheduler<K, V>,
    write_mode: WriteMode,
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create an empty map
    ///
    /// # Panics
    ///
    /// Panics if the worker thread cannot be spawned, like
    /// [`std::thread::spawn`]. Use [`builder`](Self::builder) to handle that
    /// case as an error.
    pub fn new() -> Self {
        Self::builder().build().unwrap_or_else(|err| panic!("{}", err))
    }

    /// Create an empty map with room for at least `capacity` entries
    ///
    /// # Panics
    ///
    /// Panics if the worker thread cannot be spawned.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::builder()
            .capacity(capacity)
            .build()
            .unwrap_or_else(|err| panic!("{}", err))
    }

    /// Create a map holding the entries of `initial`
    ///
    /// # Panics
    ///
    /// Panics if the worker thread cannot be spawned.
    pub fn from_map(initial: HashMap<K, V>) -> Self {
        Self::builder()
            .initial(initial)
            .build()
            .unwrap_or_else(|err| panic!("{}", err))
    }

    /// Start configuring a map
    pub fn builder() -> MapBuilder<K, V> {
        MapBuilder::new()
    }

    pub(crate) fn from_parts(scheduler: Scheduler<K, V>, write_mode: WriteMode) -> Self {
        Self {
            scheduler,
            write_mode,
        }
    }

    /// Get a copy of the value stored under `key`
    ///
    /// Blocks until every write submitted before this call has been applied.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use barriermap::ConcurrentMap;
    ///
    /// let map = ConcurrentMap::new();
    /// map.set("a", 1);
    /// assert_eq!(map.get(&"a"), Some(1));
    /// assert_eq!(map.get(&"b"), None);
    /// ```
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.scheduler.read(|store| store.get(key).cloned())
    }

    /// Check whether `key` is present
    pub fn contains_key(&self, key: &K) -> bool {
        self.scheduler.read(|store| store.contains_key(key))
    }

    /// Copy of the current key set, in unspecified order
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.scheduler.read(|store| store.keys().cloned().collect())
    }

    /// Copy of the whole store
    pub fn snapshot(&self) -> HashMap<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.scheduler.read(|store| store.clone())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.scheduler.read(|store| store.len())
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every entry inside one read task
    ///
    /// The visitor sees the store exactly as it was when the task started; no
    /// write runs until it returns. The first `Err` returned by `visit` stops
    /// the iteration and is handed back to the caller; remaining entries are
    /// not visited.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use barriermap::ConcurrentMap;
    ///
    /// let map = ConcurrentMap::from_map([("a", 1), ("b", -1)].into_iter().collect());
    /// let checked = map.for_each(|key, value| {
    ///     if *value < 0 {
    ///         return Err(format!("{} is negative", key));
    ///     }
    ///     Ok(())
    /// });
    /// assert_eq!(checked, Err("b is negative".to_string()));
    /// ```
    pub fn for_each<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&K, &V) -> Result<(), E>,
    {
        self.scheduler
            .read(|store| store.iter().try_for_each(|(key, value)| visit(key, value)))
    }

    /// Map every entry and keep the `Some` results
    ///
    /// Runs inside one read task, like [`for_each`](Self::for_each).
    pub fn compact_map<R, F>(&self, mut transform: F) -> Vec<R>
    where
        F: FnMut(&K, &V) -> Option<R>,
    {
        self.scheduler.read(|store| {
            store
                .iter()
                .filter_map(|(key, value)| transform(key, value))
                .collect()
        })
    }

    /// Wait until every task submitted before this call has run
    ///
    /// This is the completion signal for deferred writes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use barriermap::ConcurrentMap;
    ///
    /// let map = ConcurrentMap::new();
    /// for i in 0..100 {
    ///     map.set(i, i);
    /// }
    /// map.flush();
    /// assert_eq!(map.pending_writes(), 0);
    /// ```
    pub fn flush(&self) {
        self.scheduler.read(|_| ());
    }

    /// Insert or overwrite the value stored under `key`
    ///
    /// In [`WriteMode::Deferred`] this only queues the write: the caller may
    /// return before it is applied, but every task submitted afterwards sees it.
    pub fn set(&self, key: K, value: V) {
        self.write(Command::Set(key, value));
    }

    /// Set `key` to `value`, or delete it when `value` is `None`
    ///
    /// Unlike [`remove`](Self::remove) the delete does not read the old value
    /// first.
    pub fn update(&self, key: K, value: Option<V>) {
        match value {
            Some(value) => self.write(Command::Set(key, value)),
            None => self.write(Command::Remove(key)),
        }
    }

    /// Delete `key`, returning the value it held when this call read it
    ///
    /// The read runs synchronously; the delete is queued like any other write.
    /// In [`WriteMode::Deferred`] the delete may not have been applied yet when
    /// this returns, but every task submitted afterwards observes it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use barriermap::ConcurrentMap;
    ///
    /// let map = ConcurrentMap::new();
    /// map.set("a", 2);
    /// assert_eq!(map.remove(&"a"), Some(2));
    /// assert_eq!(map.get(&"a"), None);
    /// ```
    pub fn remove(&self, key: &K) -> Option<V>
    where
        K: Clone,
        V: Clone,
    {
        let value = self.get(key);
        self.write(Command::Remove(key.clone()));
        value
    }

    /// Delete every entry
    pub fn clear(&self) {
        self.write(Command::Clear);
    }

    /// Substitute the whole store with `map`
    ///
    /// No task observes a mix of old and new entries.
    pub fn replace_all(&self, map: HashMap<K, V>) {
        self.write(Command::Replace(map));
    }

    /// Writes queued but not yet applied
    ///
    /// Diagnostic only: the count may be stale by the time it is returned.
    pub fn pending_writes(&self) -> usize {
        self.scheduler.backlog()
    }

    /// Write mode chosen at construction
    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// Label given at construction
    pub fn label(&self) -> &str {
        self.scheduler.label()
    }

    fn write(&self, command: Command<K, V>) {
        match self.write_mode {
            WriteMode::Deferred => {
                self.scheduler.submit(command);
            }
            WriteMode::Blocking => {
                self.scheduler.assert_not_reentrant();
                let ticket = self.scheduler.submit(command);
                self.scheduler.wait_for(ticket);
            }
        }
    }
}

impl<K, V> MetricsCollector for ConcurrentMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn metrics(&self) -> MapMetrics {
        self.scheduler.metrics().snapshot()
    }

    fn reset_metrics(&self) {
        self.scheduler.metrics().reset();
    }

    fn set_metrics_enabled(&self, enabled: bool) {
        self.scheduler.metrics().set_enabled(enabled);
    }

    fn is_metrics_enabled(&self) -> bool {
        self.scheduler.metrics().is_enabled()
    }
}

impl<K, V> Default for ConcurrentMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> From<HashMap<K, V>> for ConcurrentMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn from(map: HashMap<K, V>) -> Self {
        Self::from_map(map)
    }
}

impl<K, V> FromIterator<(K, V)> for ConcurrentMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl<K, V> fmt::Debug for ConcurrentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("scheduler", &self.scheduler)
            .field("write_mode", &self.write_mode)
            .finish()
    }
}
