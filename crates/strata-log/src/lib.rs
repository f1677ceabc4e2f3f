//! Logging setup for strata binaries.
//!
//! Libraries only emit `tracing` events; this crate installs the subscriber
//! that prints them. Console output is always on; debug builds additionally
//! write machine-readable JSON to `strata.log` for post-mortem analysis of
//! scheduling stalls.

use std::path::Path;

use strata_config::Config;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config says otherwise.
pub const DEFAULT_FILTER: &str = "info";

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE: &str = "strata.log";

/// Returns the filter directives for `config`, falling back to [`DEFAULT_FILTER`].
pub fn filter_directives(config: Option<&Config>) -> &str {
    match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => config.debug.log_level.trim(),
        _ => DEFAULT_FILTER,
    }
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the config's `debug.log_level`. With `debug_build`
/// and a usable `log_dir`, a JSON file layer writing [`LOG_FILE`] is added.
///
/// # Errors
///
/// Returns [`TryInitError`] if a global subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use strata_config::Config;
/// use strata_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), true, Some(&config)).ok();
/// ```
pub fn init_logging(
    log_dir: Option<&Path>,
    debug_build: bool,
    config: Option<&Config>,
) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true) // worker threads are named strata-mesh-N
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .with_timer(fmt::time::uptime())
            .json();

        return subscriber.with(file_layer).try_init();
    }

    subscriber.try_init()
}

/// Creates an [`EnvFilter`] from [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
