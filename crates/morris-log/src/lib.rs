//! Structured logging for the Morris server.
//!
//! Console output with uptime timestamps and module paths, plus optional JSON
//! file logging for post-mortem analysis. `RUST_LOG` overrides the configured
//! level.

use std::path::Path;

use morris_config::Config;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config names a level.
pub const DEFAULT_FILTER: &str = "info";

/// Name of the JSON log file written inside the log directory.
pub const LOG_FILE: &str = "morris-server.log";

/// Filter directives from the config, falling back to [`DEFAULT_FILTER`].
pub fn filter_directives(config: Option<&Config>) -> String {
    config
        .map(|c| c.debug.log_level.trim())
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

/// Install the global tracing subscriber.
///
/// The JSON file layer is added when `config.debug.log_to_file` is set and
/// `log_dir` can be created; otherwise only the console layer is used.
///
/// ```no_run
/// use morris_config::Config;
///
/// let config = Config::default();
/// morris_log::init_logging(Some(std::path::Path::new("./logs")), Some(&config))
///     .expect("logging already initialised");
/// ```
pub fn init_logging(log_dir: Option<&Path>, config: Option<&Config>) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    let wants_file = config.is_some_and(|c| c.debug.log_to_file);
    if wants_file
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        return subscriber.with(file_layer).try_init();
    }

    subscriber.try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_without_config() {
        assert_eq!(filter_directives(None), "info");
    }

    #[test]
    fn test_config_level_used() {
        let mut config = Config::default();
        config.debug.log_level = "debug,morris_server::lobby=trace".to_string();
        let directives = filter_directives(Some(&config));
        assert_eq!(directives, "debug,morris_server::lobby=trace");
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_blank_level_falls_back() {
        let mut config = Config::default();
        config.debug.log_level = "  ".to_string();
        assert_eq!(filter_directives(Some(&config)), DEFAULT_FILTER);
    }

    #[test]
    fn test_init_with_file_layer_creates_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let mut config = Config::default();
        config.debug.log_to_file = true;

        // Only one global subscriber per process; this is the only test that
        // installs one.
        init_logging(Some(&log_dir), Some(&config)).unwrap();
        tracing::info!("hello from the test");
        assert!(log_dir.join(LOG_FILE).exists());
    }
}
