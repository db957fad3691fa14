//! Logging configuration using tracing

use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable controlling the log filter
pub const LOG_ENV: &str = "PDEMON_LOG";

/// System-wide log directory used when running as root
pub const SYSTEM_LOG_DIR: &str = "/var/log/pdemon";

const DEFAULT_FILTER: &str = "pdemon=info,pdemon_core=info,pdemon_daemon=info,pdemon_app=info,warn";

/// Initialize the logging subsystem for the daemon
///
/// Logs are written to `dir` (or `/var/log/pdemon`, falling back to
/// `~/.local/share/portage-demon/logs/` when that is not writable).
/// Log level is controlled by the `PDEMON_LOG` environment variable.
///
/// # Examples
/// ```bash
/// PDEMON_LOG=debug pdemon run
/// PDEMON_LOG=pdemon_core=trace pdemon run
/// ```
pub fn init(dir: Option<&Path>) -> Result<()> {
    let log_dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => get_log_directory(),
    };
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "pdemon.log");

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Portage Demon starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

/// Initialize stderr logging for one-shot commands (`scan`, `status`)
pub fn init_stderr() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .init();
}

fn env_filter() -> EnvFilter {
    // Default to info, allow override via PDEMON_LOG
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Get the log directory path
fn get_log_directory() -> PathBuf {
    let system = PathBuf::from(SYSTEM_LOG_DIR);
    if is_writable_dir(&system) {
        return system;
    }
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("portage-demon").join("logs")
}

fn is_writable_dir(path: &Path) -> bool {
    std::fs::create_dir_all(path).is_ok()
        && std::fs::metadata(path)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false)
}
