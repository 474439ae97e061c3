//! Map implementations
//!
//! - [`ConcurrentMap`]: a `HashMap` with parallel reads and FIFO-ordered
//!   exclusive writes
//! - [`MapBuilder`]: construction options, including the [`WriteMode`]

pub mod builder;
pub mod concurrent;

mod command;
mod scheduler;

pub use builder::{MapBuilder, WriteMode};
pub use concurrent::ConcurrentMap;

#[cfg(test)]
mod tests;

#[cfg(test)]
mod proptests;
