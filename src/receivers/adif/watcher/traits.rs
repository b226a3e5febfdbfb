// SPDX-License-Identifier: Apache-2.0

//! Traits and types shared by the watcher backends.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Error type for watcher operations
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("watcher initialization failed: {0}")]
    Init(String),

    #[error("watch failed: {0}")]
    Watch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel error: {0}")]
    Channel(String),
}

/// Kind of file event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// The path appeared
    Create,
    /// Content changed
    Modify,
    /// The path was deleted
    Remove,
    /// The path was moved away
    Rename,
    /// Catch-all for events we cannot classify
    Other,
}

/// A file system event for the watched path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: PathBuf) -> Self {
        Self { kind, path }
    }

    pub fn create(path: PathBuf) -> Self {
        Self::new(FileEventKind::Create, path)
    }

    pub fn modify(path: PathBuf) -> Self {
        Self::new(FileEventKind::Modify, path)
    }

    pub fn remove(path: PathBuf) -> Self {
        Self::new(FileEventKind::Remove, path)
    }

    pub fn rename(path: PathBuf) -> Self {
        Self::new(FileEventKind::Rename, path)
    }
}

/// A source of change events for a single log file.
///
/// Implementations either use native OS notifications or stat the file at
/// an interval.
pub trait FileWatcher: Send {
    /// Start watching `path`.
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError>;

    /// Stop watching `path`.
    fn unwatch(&mut self, path: &Path) -> Result<(), WatcherError>;

    /// Return any events that are already available, or an empty vector.
    fn try_recv(&mut self) -> Result<Vec<FileEvent>, WatcherError>;

    /// Block until events arrive or `timeout` expires.
    ///
    /// Returns an empty vector on timeout.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<FileEvent>, WatcherError>;

    /// True for inotify/kqueue/FSEvents backends.
    fn is_native(&self) -> bool;

    /// Name of the backend, for logging.
    fn backend_name(&self) -> &'static str;
}
