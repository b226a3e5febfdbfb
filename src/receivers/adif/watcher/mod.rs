// SPDX-License-Identifier: Apache-2.0

//! Change notification for the watched log file.
//!
//! Two strategies are available:
//! - **Native watching** uses OS-level notifications for immediate wake-ups.
//! - **Poll watching** stats the file at an interval, for network file
//!   systems and other places where native events are unreliable.
//!
//! `auto` mode tries native watching first and falls back to polling if it
//! cannot be set up. Whatever backend is chosen runs on its own thread inside
//! a [`WakeupSource`].

mod native;
mod poll;
mod source;
mod traits;

pub use native::NativeWatcher;
pub use poll::PollWatcher;
pub use source::{Signal, WakeupSender, WakeupSource};
pub use traits::{FileEvent, FileEventKind, FileWatcher, WatcherError};

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

/// Watch mode configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchMode {
    /// Try native watching first, fall back to polling on failure.
    #[default]
    Auto,
    /// Force native watching. Fails if it is not supported.
    Native,
    /// Force polling. Use this for NFS or when native watching is unreliable.
    Poll,
}

/// Configuration for the file watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Watch mode: auto, native, or poll
    pub mode: WatchMode,
    /// How often the poll backend stats the file
    pub poll_interval: Duration,
    /// Window used to batch bursts of native events
    pub debounce_interval: Duration,
    /// How long native watcher errors may persist before switching to polling
    pub max_watcher_error_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Auto,
            poll_interval: Duration::from_millis(250),
            debounce_interval: Duration::from_millis(100),
            max_watcher_error_duration: Duration::from_secs(60),
        }
    }
}

/// Create a watcher for `path` based on the configuration.
///
/// In `Auto` mode a native watcher that fails to initialize, or fails to
/// watch the path, is replaced by a poll watcher.
pub fn create_watcher(
    config: &WatcherConfig,
    path: &Path,
) -> Result<Box<dyn FileWatcher>, WatcherError> {
    match config.mode {
        WatchMode::Native => native_watcher(config, path),
        WatchMode::Poll => poll_watcher(config, path),
        WatchMode::Auto => match native_watcher(config, path) {
            Ok(watcher) => Ok(watcher),
            Err(e) => {
                warn!(
                    "Native file watching unavailable ({}), falling back to polling",
                    e
                );
                poll_watcher(config, path)
            }
        },
    }
}

fn native_watcher(config: &WatcherConfig, path: &Path) -> Result<Box<dyn FileWatcher>, WatcherError> {
    let mut watcher = NativeWatcher::new(config.debounce_interval)?;
    watcher.watch(path)?;
    info!(backend = watcher.backend_name(), "Using native file system watcher");
    Ok(Box::new(watcher))
}

pub(crate) fn poll_watcher(
    config: &WatcherConfig,
    path: &Path,
) -> Result<Box<dyn FileWatcher>, WatcherError> {
    let mut watcher = PollWatcher::new(config.poll_interval);
    watcher.watch(path)?;
    info!(interval = ?config.poll_interval, "Using polling file watcher");
    Ok(Box::new(watcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert_eq!(config.mode, WatchMode::Auto);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.debounce_interval, Duration::from_millis(100));
        assert_eq!(config.max_watcher_error_duration, Duration::from_secs(60));
    }

    #[test]
    fn test_create_poll_watcher() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.adi");
        std::fs::write(&path, b"").unwrap();

        let config = WatcherConfig {
            mode: WatchMode::Poll,
            ..Default::default()
        };
        let watcher = create_watcher(&config, &path).unwrap();
        assert!(!watcher.is_native());
        assert_eq!(watcher.backend_name(), "poll");
    }

    #[test]
    fn test_create_watcher_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.adi");

        for mode in [WatchMode::Auto, WatchMode::Native, WatchMode::Poll] {
            let config = WatcherConfig {
                mode,
                ..Default::default()
            };
            assert!(create_watcher(&config, &path).is_err(), "{:?}", mode);
        }
    }
}
