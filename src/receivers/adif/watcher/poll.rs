// SPDX-License-Identifier: Apache-2.0

//! Polling watcher for file systems where native notifications are
//! unavailable or unreliable (e.g., NFS).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use super::traits::{FileEvent, FileWatcher, WatcherError};
use crate::receivers::adif::file_id::FileId;

/// What we last saw at the watched path
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileState {
    id: FileId,
    modified: Option<SystemTime>,
    size: u64,
}

impl FileState {
    fn stat(path: &Path) -> io::Result<Option<Self>> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Some(Self {
            id: FileId::from_metadata(&metadata),
            modified: metadata.modified().ok(),
            size: metadata.len(),
        }))
    }
}

/// Stats the watched file every `poll_interval` and reports differences.
pub struct PollWatcher {
    path: Option<PathBuf>,
    state: Option<FileState>,
    poll_interval: Duration,
    last_poll: Instant,
    pending_events: Vec<FileEvent>,
}

impl PollWatcher {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            path: None,
            state: None,
            poll_interval,
            last_poll: Instant::now(),
            pending_events: Vec::new(),
        }
    }

    fn scan(&mut self) -> Result<(), WatcherError> {
        self.last_poll = Instant::now();

        let Some(path) = &self.path else {
            return Ok(());
        };

        let current = FileState::stat(path)?;
        match (&self.state, &current) {
            (None, Some(_)) => self.pending_events.push(FileEvent::create(path.clone())),
            (Some(_), None) => self.pending_events.push(FileEvent::remove(path.clone())),
            (Some(old), Some(new)) if old.id != new.id => {
                // A different file now lives at the path
                self.pending_events.push(FileEvent::remove(path.clone()));
                self.pending_events.push(FileEvent::create(path.clone()));
            }
            (Some(old), Some(new)) if old != new => {
                self.pending_events.push(FileEvent::modify(path.clone()))
            }
            _ => {}
        }
        self.state = current;

        Ok(())
    }

    fn poll_if_needed(&mut self) -> Result<(), WatcherError> {
        if self.last_poll.elapsed() >= self.poll_interval {
            self.scan()?;
        }
        Ok(())
    }
}

impl FileWatcher for PollWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError> {
        let state = FileState::stat(path)?;
        if state.is_none() {
            return Err(WatcherError::Watch(format!("{:?} does not exist", path)));
        }

        self.path = Some(path.to_path_buf());
        self.state = state;
        self.last_poll = Instant::now();
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), WatcherError> {
        if self.path.as_deref() == Some(path) {
            self.path = None;
            self.state = None;
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Vec<FileEvent>, WatcherError> {
        self.poll_if_needed()?;
        Ok(std::mem::take(&mut self.pending_events))
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<FileEvent>, WatcherError> {
        let deadline = Instant::now() + timeout;

        loop {
            self.poll_if_needed()?;

            if !self.pending_events.is_empty() {
                return Ok(std::mem::take(&mut self.pending_events));
            }

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            // Sleep until the next poll or the deadline, whichever is sooner
            let time_to_next_poll = self.poll_interval.saturating_sub(self.last_poll.elapsed());
            let time_to_deadline = deadline.saturating_duration_since(Instant::now());
            let sleep_duration = time_to_next_poll.min(time_to_deadline);

            if !sleep_duration.is_zero() {
                std::thread::sleep(sleep_duration);
            }
        }
    }

    fn is_native(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "poll"
    }
}
