// SPDX-License-Identifier: Apache-2.0

//! Turns backend events into discrete wake-ups for the pipeline.
//!
//! The backend runs on a dedicated OS thread and never touches the file
//! contents. It only tells the async side that something happened, through a
//! channel of depth one. `Changed` signals are coalesced: if one is already
//! queued the reader has not looked at the file yet, so a second one would add
//! nothing. Terminal signals are sent with a blocking send and never dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::traits::{FileEvent, FileEventKind, FileWatcher, WatcherError};
use super::{WatcherConfig, create_watcher, poll_watcher};
use crate::bounded_channel::{BoundedReceiver, BoundedSender, SendError, TrySendError, bounded};

/// Pause after a backend error before asking it for events again
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// The file may have new content
    Changed,
    /// The watched path was deleted
    Removed(PathBuf),
    /// The watched path was moved away
    Renamed(PathBuf),
    /// No backend can watch the file any more
    Failed(String),
}

/// Sending half of a wake-up channel.
#[derive(Clone)]
pub struct WakeupSender {
    tx: BoundedSender<Signal>,
}

impl WakeupSender {
    /// Queue a `Changed` signal unless one is already waiting.
    ///
    /// Returns false once the receiving side is gone.
    pub fn notify(&self) -> bool {
        match self.tx.try_send(Signal::Changed) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Deliver a signal, waiting for room in the channel.
    pub fn signal(&self, signal: Signal) -> Result<(), SendError> {
        self.tx.send_blocking(signal)
    }
}

/// Receiving half of a wake-up channel, owning the watcher thread.
pub struct WakeupSource {
    rx: BoundedReceiver<Signal>,
    stop: Arc<AtomicBool>,
    backend: &'static str,
}

impl WakeupSource {
    /// A connected sender and source without any watcher thread behind it.
    pub fn channel() -> (WakeupSender, WakeupSource) {
        let (tx, rx) = bounded(1);
        let source = WakeupSource {
            rx,
            stop: Arc::new(AtomicBool::new(false)),
            backend: "manual",
        };
        (WakeupSender { tx }, source)
    }

    /// Start watching `path` on a dedicated thread.
    ///
    /// A `Changed` signal is queued before the watcher starts so that content
    /// already in the file is read without waiting for the next write.
    pub fn spawn(path: &Path, config: &WatcherConfig) -> Result<Self, WatcherError> {
        let (sender, mut source) = Self::channel();
        sender.notify();

        let watcher = create_watcher(config, path)?;
        source.backend = watcher.backend_name();

        let pump = Pump {
            path: path.to_path_buf(),
            config: config.clone(),
            sender,
            stop: source.stop.clone(),
        };
        thread::Builder::new()
            .name("adif-watcher".to_string())
            .spawn(move || pump.run(watcher))?;

        Ok(source)
    }

    /// Wait for the next signal. Returns None if the watcher thread exited.
    pub async fn next(&mut self) -> Option<Signal> {
        self.rx.next().await
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
    }
}

impl Drop for WakeupSource {
    fn drop(&mut self) {
        // The thread notices on its next timeout
        self.stop.store(true, Ordering::SeqCst);
    }
}

struct Pump {
    path: PathBuf,
    config: WatcherConfig,
    sender: WakeupSender,
    stop: Arc<AtomicBool>,
}

impl Pump {
    fn run(self, mut watcher: Box<dyn FileWatcher>) {
        debug!(path = ?self.path, backend = watcher.backend_name(), "Watcher thread started");

        let mut first_error: Option<Instant> = None;

        while !self.stop.load(Ordering::SeqCst) {
            match watcher.recv_timeout(self.config.poll_interval) {
                Ok(events) => {
                    if first_error.take().is_some() {
                        debug!("Watcher recovered after previous errors");
                    }

                    if let Some(terminal) = self.classify(&events) {
                        info!(signal = ?terminal, "Watched file is gone");
                        let _ = self.sender.signal(terminal);
                        return;
                    }

                    if !events.is_empty() && !self.sender.notify() {
                        break;
                    }
                }
                Err(e) => {
                    // A spurious wake-up costs one stat and one empty read
                    if !self.sender.notify() {
                        break;
                    }

                    let since = *first_error.get_or_insert_with(Instant::now);
                    let error_duration = since.elapsed();

                    if error_duration < self.config.max_watcher_error_duration {
                        warn!(
                            "Watcher error (errors started {:?} ago): {}",
                            error_duration, e
                        );
                        thread::sleep(ERROR_BACKOFF);
                        continue;
                    }

                    if !watcher.is_native() {
                        error!("Poll watcher failed for {:?}: {}", error_duration, e);
                        let _ = self.sender.signal(Signal::Failed(e.to_string()));
                        return;
                    }

                    warn!(
                        "Watcher errors persisted for {:?}, falling back to polling mode: {}",
                        error_duration, e
                    );
                    match poll_watcher(&self.config, &self.path) {
                        Ok(poll) => {
                            watcher = poll;
                            first_error = None;
                            info!("Switched to polling mode");
                        }
                        Err(poll_err) => {
                            error!("Failed to create poll watcher: {}", poll_err);
                            let _ = self.sender.signal(Signal::Failed(format!(
                                "native watcher: {}; poll watcher: {}",
                                e, poll_err
                            )));
                            return;
                        }
                    }
                }
            }
        }

        debug!(path = ?self.path, "Watcher thread exiting");
    }

    fn classify(&self, events: &[FileEvent]) -> Option<Signal> {
        events.iter().find_map(|event| match event.kind {
            FileEventKind::Remove => Some(Signal::Removed(event.path.clone())),
            FileEventKind::Rename => Some(Signal::Renamed(event.path.clone())),
            _ => None,
        })
    }
}
