//! emerge.log change notifications
//!
//! Watches the directory holding the log rather than the file itself, so a
//! rotated or recreated log keeps producing events. Only events naming the
//! log file are forwarded, as [`Message::LogChanged`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use pdemon_core::prelude::{Error, Result};

use crate::message::Message;

/// Default debounce duration in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Configuration for the log watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Log file to watch
    pub log_path: PathBuf,
    /// Debounce duration
    pub debounce: Duration,
}

impl WatcherConfig {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }

    /// Set debounce duration in milliseconds
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce = Duration::from_millis(ms);
        self
    }

    /// Directory to watch and the file name to filter on
    fn target(&self) -> Result<(PathBuf, OsString)> {
        let file_name = self
            .log_path
            .file_name()
            .ok_or_else(|| Error::watcher(format!("{:?} names no file", self.log_path)))?
            .to_os_string();
        let dir = match self.log_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok((dir, file_name))
    }
}

/// Watches emerge.log
pub struct LogWatcher {
    config: WatcherConfig,
    /// Handle to stop the watcher
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl LogWatcher {
    pub fn new(config: WatcherConfig) -> Self {
        Self {
            config,
            stop_tx: None,
        }
    }

    /// Start watching. Sends `Message::LogChanged` to the channel.
    pub fn start(&mut self, message_tx: mpsc::Sender<Message>) -> Result<()> {
        if self.is_running() {
            return Err(Error::watcher("Watcher is already running"));
        }

        let (dir, file_name) = self.config.target()?;
        let debounce = self.config.debounce;
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);

        tokio::task::spawn_blocking(move || {
            run_watcher(dir, file_name, debounce, message_tx, stop_rx);
        });

        Ok(())
    }

    /// Stop the watcher
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }
}

impl Drop for LogWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn names_file(path: &Path, file_name: &OsString) -> bool {
    path.file_name() == Some(file_name.as_os_str())
}

fn run_watcher(
    dir: PathBuf,
    file_name: OsString,
    debounce: Duration,
    message_tx: mpsc::Sender<Message>,
    mut stop_rx: tokio::sync::oneshot::Receiver<()>,
) {
    let tx_clone = message_tx.clone();
    let watched_name = file_name.clone();

    let debouncer_result = new_debouncer(debounce, None, move |result: DebounceEventResult| {
        match result {
            Ok(events) => {
                let relevant = events
                    .iter()
                    .filter(|event| event.paths.iter().any(|p| names_file(p, &watched_name)))
                    .count();
                if relevant == 0 {
                    return;
                }
                debug!("Log watcher saw {} change(s)", relevant);
                let _ = tx_clone.blocking_send(Message::LogChanged);
            }
            Err(errors) => {
                for error in errors {
                    warn!("Log watcher error: {:?}", error);
                    let _ = tx_clone.blocking_send(Message::WatcherError {
                        message: error.to_string(),
                    });
                }
            }
        }
    });

    let mut debouncer = match debouncer_result {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to create log watcher: {}", e);
            let _ = message_tx.blocking_send(Message::WatcherError {
                message: format!("Failed to create watcher: {}", e),
            });
            return;
        }
    };

    if let Err(e) = debouncer.watch(&dir, RecursiveMode::NonRecursive) {
        warn!("Failed to watch {}: {}", dir.display(), e);
        let _ = message_tx.blocking_send(Message::WatcherError {
            message: format!("Failed to watch {}: {}", dir.display(), e),
        });
        return;
    }
    info!(
        "Watching {} in {}",
        Path::new(&file_name).display(),
        dir.display()
    );

    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(tokio::sync::oneshot::error::TryRecvError::Closed) => {
                info!("Log watcher stopping");
                break;
            }
            Err(tokio::sync::oneshot::error::TryRecvError::Empty) => {
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_watcher_config_defaults() {
        let config = WatcherConfig::new("/var/log/emerge.log");
        assert_eq!(config.debounce, Duration::from_millis(DEFAULT_DEBOUNCE_MS));

        let (dir, name) = config.target().unwrap();
        assert_eq!(dir, PathBuf::from("/var/log"));
        assert_eq!(name, OsString::from("emerge.log"));
    }

    #[test]
    fn test_bare_file_name_watches_current_dir() {
        let (dir, _) = WatcherConfig::new("emerge.log").target().unwrap();
        assert_eq!(dir, PathBuf::from("."));
    }

    #[test]
    fn test_path_without_file_name_is_rejected() {
        assert!(WatcherConfig::new("/").target().is_err());
    }

    #[test]
    fn test_names_file() {
        let name = OsString::from("emerge.log");
        assert!(names_file(Path::new("/var/log/emerge.log"), &name));
        assert!(!names_file(Path::new("/var/log/emerge-fetch.log"), &name));
    }

    #[tokio::test]
    async fn test_double_start_error() {
        let dir = TempDir::new().unwrap();
        let mut watcher = LogWatcher::new(WatcherConfig::new(dir.path().join("emerge.log")));
        let (tx, _rx) = mpsc::channel(32);

        assert!(watcher.start(tx.clone()).is_ok());
        assert!(watcher.is_running());
        assert!(watcher.start(tx).is_err());

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_append_sends_log_changed() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("emerge.log");
        std::fs::write(&log_path, "").unwrap();

        let mut watcher = LogWatcher::new(WatcherConfig::new(&log_path).with_debounce_ms(50));
        let (tx, mut rx) = mpsc::channel(32);
        watcher.start(tx).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Unrelated files in the same directory are ignored
        std::fs::write(dir.path().join("other.log"), "x").unwrap();
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&log_path)
            .unwrap();
        writeln!(file, "1000: === Sync completed for gentoo").unwrap();
        file.flush().unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("change within timeout")
            .expect("channel open");
        assert!(matches!(message, Message::LogChanged));

        watcher.stop();
    }
}
