//! Daemon signals
//!
//! SIGINT and SIGTERM stop the daemon through [`Message::Shutdown`]; the
//! engine then cancels running emerge commands and flushes state. SIGHUP
//! asks for a rescan of emerge.log, for logs rotated or edited behind the
//! watcher's back.

use std::fmt;

use tokio::sync::mpsc;

use pdemon_core::prelude::*;

use crate::message::Message;

/// Signals the daemon reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    Interrupt,
    Terminate,
    Hangup,
}

impl DaemonSignal {
    pub fn name(&self) -> &'static str {
        match self {
            DaemonSignal::Interrupt => "SIGINT",
            DaemonSignal::Terminate => "SIGTERM",
            DaemonSignal::Hangup => "SIGHUP",
        }
    }

    /// Message the engine receives for this signal
    pub fn message(self) -> Message {
        match self {
            DaemonSignal::Hangup => Message::LogChanged,
            signal => Message::Shutdown { signal },
        }
    }

    /// Whether the listener stops after this signal
    fn ends_listening(&self) -> bool {
        !matches!(self, DaemonSignal::Hangup)
    }
}

impl fmt::Display for DaemonSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Spawn the signal listener.
///
/// Hangups are forwarded for as long as the daemon runs; the first
/// interrupt or terminate ends the listener.
pub fn spawn_signal_handler(tx: mpsc::Sender<Message>) {
    tokio::spawn(async move {
        let mut signals = match SignalStream::new() {
            Ok(signals) => signals,
            Err(e) => {
                error!("Signal handler error: {}", e);
                return;
            }
        };

        while let Some(signal) = signals.next().await {
            debug!("Received {}", signal);
            if tx.send(signal.message()).await.is_err() || signal.ends_listening() {
                break;
            }
        }
    });
}

#[cfg(unix)]
struct SignalStream {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalStream {
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let listen = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| Error::signal(format!("Failed to listen for {}: {}", name, e)))
        };
        Ok(Self {
            interrupt: listen(SignalKind::interrupt(), "SIGINT")?,
            terminate: listen(SignalKind::terminate(), "SIGTERM")?,
            hangup: listen(SignalKind::hangup(), "SIGHUP")?,
        })
    }

    async fn next(&mut self) -> Option<DaemonSignal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(DaemonSignal::Interrupt),
            Some(()) = self.terminate.recv() => Some(DaemonSignal::Terminate),
            Some(()) = self.hangup.recv() => Some(DaemonSignal::Hangup),
            else => None,
        }
    }
}

#[cfg(not(unix))]
struct SignalStream;

#[cfg(not(unix))]
impl SignalStream {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> Option<DaemonSignal> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(DaemonSignal::Interrupt),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                None
            }
        }
    }
}
