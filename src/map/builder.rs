//! Construction options for [`ConcurrentMap`].

use super::concurrent::ConcurrentMap;
use super::scheduler::Scheduler;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Default name for the worker thread
pub(crate) const DEFAULT_LABEL: &str = "barriermap";

/// How write calls return to their caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Writes return as soon as they are queued. Their effects are visible to
    /// every task submitted afterwards, but the caller gets no completion
    /// signal. Use [`ConcurrentMap::flush`] when one is needed.
    #[default]
    Deferred,
    /// Writes return only after they have been applied to the store.
    Blocking,
}

/// Builder for a [`ConcurrentMap`]
///
/// # Examples
///
/// ```rust
/// use barriermap::{ConcurrentMap, WriteMode};
///
/// let map: ConcurrentMap<String, u64> = ConcurrentMap::builder()
///     .label("sizes")
///     .capacity(128)
///     .write_mode(WriteMode::Blocking)
///     .build()?;
///
/// map.set("a.txt".to_string(), 42);
/// assert_eq!(map.pending_writes(), 0);
/// # Ok::<(), barriermap::Error>(())
/// ```
pub struct MapBuilder<K, V> {
    label: String,
    capacity: usize,
    initial: HashMap<K, V>,
    write_mode: WriteMode,
    metrics: bool,
}

impl<K, V> MapBuilder<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            capacity: 0,
            initial: HashMap::new(),
            write_mode: WriteMode::default(),
            metrics: true,
        }
    }

    /// Name used for the worker thread and in log events
    ///
    /// Must not contain a NUL byte; [`build`](Self::build) rejects such labels.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Reserve room for at least `capacity` entries up front
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Start from a copy of `initial` instead of an empty store
    pub fn initial(mut self, initial: HashMap<K, V>) -> Self {
        self.initial = initial;
        self
    }

    /// Choose whether writes wait to be applied
    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Enable or disable metrics collection from the start
    pub fn metrics(mut self, enabled: bool) -> Self {
        self.metrics = enabled;
        self
    }

    /// Create the map and start its worker thread
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLabel`] if the label contains a NUL byte, and
    /// [`Error::WorkerSpawn`] if the operating system refuses to create the
    /// thread.
    pub fn build(self) -> Result<ConcurrentMap<K, V>> {
        if self.label.contains('\0') {
            return Err(Error::InvalidLabel(self.label));
        }

        let mut store = self.initial;
        store.reserve(self.capacity.saturating_sub(store.len()));

        let scheduler = Scheduler::start(self.label, store, self.metrics)?;
        Ok(ConcurrentMap::from_parts(scheduler, self.write_mode))
    }
}

impl<K, V> fmt::Debug for MapBuilder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapBuilder")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .field("initial_len", &self.initial.len())
            .field("write_mode", &self.write_mode)
            .field("metrics", &self.metrics)
            .finish()
    }
}
