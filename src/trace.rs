//! Logging for the write worker and the task gate.
//!
//! Enabled with `--features tracing`. Without the feature every macro expands
//! to nothing.

/// Install a `tracing` subscriber that prints barriermap events to stderr.
///
/// The filter is read from `RUST_LOG` and defaults to `barriermap=trace`.
/// Calling it more than once is harmless. Does nothing unless the `tracing`
/// feature is enabled.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("barriermap=trace"));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init();
}

/// Install a `tracing` subscriber. No-op without the `tracing` feature.
#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, trace};

#[cfg(not(feature = "tracing"))]
macro_rules! trace_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! error_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use debug_noop as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use error_noop as error;
#[cfg(not(feature = "tracing"))]
pub(crate) use trace_noop as trace;
