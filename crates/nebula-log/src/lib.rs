//! Structured logging for the Nebula voxel runtime.
//!
//! Installs a `tracing` subscriber with an env filter, a console layer that
//! shows thread names (the IO and mesh pools name their workers), and in debug
//! builds a JSON file layer for post-mortem analysis of streaming sessions.
//! Records emitted through the `log` facade (config loading) are bridged in.

use nebula_config::Config;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config names a level.
const DEFAULT_FILTER: &str = "info,nebula_voxel=info,nebula_mesh=info,nebula_lighting=info";

/// Name of the JSON log inside the log directory.
pub const LOG_FILE_NAME: &str = "nebula.log";

/// Installs the global subscriber.
///
/// Filter precedence is `RUST_LOG`, then `config.debug.log_level`, then
/// [`default_env_filter`]. With `debug_build` and a `log_dir`, a JSON copy
/// of every event goes to `log_dir/nebula.log`; if the file cannot be
/// created, console logging still starts.
///
/// Returns `false` when a global subscriber was already installed, which
/// happens when several tests or an embedding host initialize logging.
///
/// ```no_run
/// use nebula_config::Config;
/// use nebula_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), true, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configured_filter(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true) // chunk-io-N / mesh-worker-N
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let file_layer = log_dir
        .filter(|_| debug_build)
        .and_then(open_log_file)
        .map(|file| {
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime())
                .json()
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok()
}

/// Filter string from the config, or the default when it names nothing.
fn configured_filter(config: Option<&Config>) -> &str {
    config
        .map(|c| c.debug.log_level.trim())
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_FILTER)
}

fn open_log_file(log_dir: &Path) -> Option<File> {
    std::fs::create_dir_all(log_dir).ok()?;
    File::create(log_dir.join(LOG_FILE_NAME)).ok()
}

/// `info` everywhere, with the streaming, meshing and lighting crates named
/// explicitly so they can be raised individually via `RUST_LOG`.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_level() {
        let filter_str = format!("{}", default_env_filter());
        assert!(filter_str.contains("nebula_voxel=info"));
        assert!(filter_str.contains("nebula_lighting=info"));
    }

    #[test]
    fn test_configured_filter_precedence() {
        assert_eq!(configured_filter(None), DEFAULT_FILTER);

        let mut config = Config::default();
        config.debug.log_level = "  debug,nebula_mesh=trace ".to_string();
        assert_eq!(configured_filter(Some(&config)), "debug,nebula_mesh=trace");

        config.debug.log_level = "   ".to_string();
        assert_eq!(configured_filter(Some(&config)), DEFAULT_FILTER);
    }

    #[test]
    fn test_env_filter_parsing() {
        for filter_str in [
            "info",
            "debug,nebula_voxel=trace",
            "warn,nebula_lighting=debug,nebula_mesh=trace",
            "error",
        ] {
            assert!(EnvFilter::try_from(filter_str).is_ok(), "rejected {filter_str}");
        }
    }

    #[test]
    fn test_config_level_is_valid_filter() {
        let config = Config::default();
        assert!(EnvFilter::try_from(configured_filter(Some(&config))).is_ok());
    }

    #[test]
    fn test_log_file_created_in_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs").join("session");
        assert!(open_log_file(&log_dir).is_some());
        assert!(log_dir.join(LOG_FILE_NAME).exists());
    }
}
