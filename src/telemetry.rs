//! Tracing setup for embedding applications and tests.

use tracing_subscriber::EnvFilter;

/// Initialize console logging with an env-filter override.
///
/// The embedding process owns file logging; the engine only provides the
/// console layer. Safe to call more than once.
pub fn init_logging(default_level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,convoy={default_level}")));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init();
}
