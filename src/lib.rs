//! # barriermap
//!
//! A thread-safe associative container that lets any number of readers run in
//! parallel while every write runs alone, in the exact order it was submitted.
//!
//! ## Features
//!
//! - **Parallel reads**: `get`, `keys`, `snapshot`, `for_each` and `compact_map`
//!   run concurrently with each other
//! - **Exclusive writes**: `set`, `remove`, `clear` and `replace_all` never overlap
//!   another task
//! - **FIFO ordering**: every task observes the effects of every task submitted
//!   before it
//! - **Fire-and-forget writes**: writers only wait for their command to be queued,
//!   unless the map is built with [`WriteMode::Blocking`]
//!
//! ## Quick Start
//!
//! ```rust
//! use barriermap::ConcurrentMap;
//!
//! let map = ConcurrentMap::new();
//! map.set("a", 1);
//! assert_eq!(map.get(&"a"), Some(1));
//!
//! map.replace_all([("b", 2)].into_iter().collect());
//! assert_eq!(map.keys(), vec!["b"]);
//! ```
//!
//! ## Thread Safety
//!
//! The store never escapes the container: every read hands back a copy. Share a
//! map between threads by wrapping it in an [`std::sync::Arc`].
//!
//! ## Logging
//!
//! With the `tracing` feature enabled the worker emits `tracing` events; call
//! [`init_tracing`] in a binary or test to print them.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

mod trace;

pub mod map;
pub mod metrics;

pub use crate::map::{ConcurrentMap, MapBuilder, WriteMode};
pub use crate::metrics::{MapMetrics, MetricsCollector};
pub use crate::trace::init_tracing;

/// Error types for barriermap operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The background write worker could not be started
    WorkerSpawn(std::io::ErrorKind),
    /// The label cannot be used as a thread name (it contains a NUL byte)
    InvalidLabel(String),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::WorkerSpawn(kind) => write!(f, "Failed to spawn write worker: {}", kind),
            Error::InvalidLabel(label) => write!(f, "Invalid map label: {:?}", label),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::WorkerSpawn(err.kind())
    }
}

/// Result type for barriermap operations
pub type Result<T> = core::result::Result<T, Error>;
