// SPDX-License-Identifier: Apache-2.0

//! Native file watcher using the `notify` crate.
//!
//! Uses OS-level notifications: inotify on Linux, FSEvents on macOS and
//! ReadDirectoryChangesW on Windows.

use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError, channel};
use std::time::{Duration, Instant};

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::traits::{FileEvent, FileEventKind, FileWatcher, WatcherError};

pub struct NativeWatcher {
    watcher: RecommendedWatcher,
    receiver: Receiver<notify::Result<Event>>,
    debounce: Duration,
}

impl NativeWatcher {
    /// Create a native watcher. Events arriving within `debounce` of the first
    /// one are returned together.
    pub fn new(debounce: Duration) -> Result<Self, WatcherError> {
        let (tx, rx) = channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| WatcherError::Init(e.to_string()))?;

        Ok(Self {
            watcher,
            receiver: rx,
            debounce,
        })
    }

    fn convert_event(event: Event) -> Vec<FileEvent> {
        let kind = match event.kind {
            EventKind::Create(_) => FileEventKind::Create,
            EventKind::Modify(ModifyKind::Name(_)) => FileEventKind::Rename,
            // Unlinking a file we hold open only shows up as an attribute change
            EventKind::Modify(_) => FileEventKind::Modify,
            EventKind::Remove(_) => FileEventKind::Remove,
            EventKind::Access(_) => return Vec::new(),
            EventKind::Other | EventKind::Any => FileEventKind::Other,
        };

        event
            .paths
            .into_iter()
            .map(|path| FileEvent::new(kind, path))
            .collect()
    }

    fn handle(
        &self,
        msg: notify::Result<Event>,
        events: &mut Vec<FileEvent>,
    ) -> Result<(), WatcherError> {
        match msg {
            Ok(event) => {
                events.extend(Self::convert_event(event));
                Ok(())
            }
            Err(e) => Err(WatcherError::Watch(e.to_string())),
        }
    }
}

impl FileWatcher for NativeWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::Watch(e.to_string()))
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.watcher
            .unwatch(path)
            .map_err(|e| WatcherError::Watch(e.to_string()))
    }

    fn try_recv(&mut self) -> Result<Vec<FileEvent>, WatcherError> {
        let mut events = Vec::new();

        loop {
            match self.receiver.try_recv() {
                Ok(msg) => self.handle(msg, &mut events)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(WatcherError::Channel("watcher channel disconnected".into()));
                }
            }
        }

        Ok(events)
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<FileEvent>, WatcherError> {
        let mut events = Vec::new();

        match self.receiver.recv_timeout(timeout) {
            Ok(msg) => self.handle(msg, &mut events)?,
            Err(RecvTimeoutError::Timeout) => return Ok(events),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(WatcherError::Channel("watcher channel disconnected".into()));
            }
        }

        // Collect the burst that usually follows a single append
        let deadline = Instant::now() + self.debounce;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(msg) => self.handle(msg, &mut events)?,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(WatcherError::Channel("watcher channel disconnected".into()));
                }
            }
        }

        Ok(events)
    }

    fn is_native(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "linux")]
        {
            "inotify"
        }
        #[cfg(target_os = "macos")]
        {
            "FSEvents"
        }
        #[cfg(target_os = "windows")]
        {
            "ReadDirectoryChangesW"
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            "native"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_native_watcher_create() {
        let watcher = NativeWatcher::new(Duration::from_millis(100));
        assert!(watcher.is_ok());
    }

    #[test]
    fn test_watch_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut watcher = NativeWatcher::new(Duration::from_millis(50)).unwrap();

        let result = watcher.watch(&temp_dir.path().join("missing.adi"));
        assert!(matches!(result, Err(WatcherError::Watch(_))));
    }

    #[test]
    fn test_native_watcher_detects_append() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("wsjtx_log.adi");
        File::create(&file_path).unwrap();

        let mut watcher = NativeWatcher::new(Duration::from_millis(50)).unwrap();
        watcher.watch(&file_path).unwrap();

        let mut file = OpenOptions::new().append(true).open(&file_path).unwrap();
        file.write_all(b"<CALL:4>K1AB<EOR>\n").unwrap();
        file.flush().unwrap();
        drop(file);

        // FSEvents can have noticeable latency
        let events = watcher.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(
            events
                .iter()
                .any(|e| matches!(e.kind, FileEventKind::Modify | FileEventKind::Create)),
            "expected a modify event, got {:?}",
            events
        );
    }

    #[test]
    fn test_native_watcher_timeout_without_changes() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("quiet.adi");
        fs::write(&file_path, b"").unwrap();

        let mut watcher = NativeWatcher::new(Duration::from_millis(10)).unwrap();
        watcher.watch(&file_path).unwrap();

        let events = watcher.recv_timeout(Duration::from_millis(50)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_event_conversion() {
        use notify::event::{AccessKind, MetadataKind};

        let path = std::path::PathBuf::from("/tmp/log.adi");
        let chmod = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)))
            .add_path(path.clone());
        let access =
            Event::new(EventKind::Access(AccessKind::Any)).add_path(path.clone());
        let rename = Event::new(EventKind::Modify(ModifyKind::Name(
            notify::event::RenameMode::From,
        )))
        .add_path(path.clone());

        assert_eq!(
            NativeWatcher::convert_event(chmod),
            vec![FileEvent::modify(path.clone())]
        );
        assert!(NativeWatcher::convert_event(access).is_empty());
        assert_eq!(
            NativeWatcher::convert_event(rename),
            vec![FileEvent::rename(path)]
        );
    }
}
