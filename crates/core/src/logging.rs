//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor the configuration provide one.
pub const DEFAULT_LOG_FILTER: &str = "info,streak=debug";

/// Initialize the logging system with tracing.
///
/// This sets up tracing-subscriber with:
/// - Environment-based filtering (`RUST_LOG` wins over `default_filter`)
/// - Target and thread id on every line, so encoder workers are
///   distinguishable from the render thread
///
/// Calling this more than once is harmless; later calls are ignored.
///
/// # Example
/// ```
/// streak_core::init_logging(streak_core::DEFAULT_LOG_FILTER);
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
