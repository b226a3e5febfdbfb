// SPDX-License-Identifier: Apache-2.0

//! Configuration for tailing the ADIF log.

use std::path::PathBuf;

use crate::receivers::adif::watcher::WatcherConfig;

/// Where to begin reading the log when the process starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartAt {
    /// Upload everything already in the file
    #[default]
    Beginning,
    /// Only upload records appended after startup
    End,
}

/// Configuration for the tailer and its wake-up source
#[derive(Debug, Clone)]
pub struct TailConfig {
    /// The watched ADIF log file
    pub path: PathBuf,
    /// Where to start reading
    pub start_at: StartAt,
    /// Largest pending tail allowed to sit without a complete record
    pub max_pending_size: usize,
    /// Watcher backend selection and timing
    pub watcher: WatcherConfig,
}

impl TailConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            start_at: StartAt::default(),
            max_pending_size: DEFAULT_MAX_PENDING_SIZE,
            watcher: WatcherConfig::default(),
        }
    }

    pub fn with_start_at(mut self, start_at: StartAt) -> Self {
        self.start_at = start_at;
        self
    }

    pub fn with_max_pending_size(mut self, max_pending_size: usize) -> Self {
        self.max_pending_size = max_pending_size;
        self
    }

    pub fn with_watcher(mut self, watcher: WatcherConfig) -> Self {
        self.watcher = watcher;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("Log file path must not be empty".to_string());
        }

        if self.max_pending_size == 0 {
            return Err("Maximum pending size must be greater than zero".to_string());
        }

        if self.watcher.poll_interval.is_zero() {
            return Err("Poll interval must be greater than zero".to_string());
        }

        Ok(())
    }
}

/// 16 MiB, far beyond any sane single QSO record
pub const DEFAULT_MAX_PENDING_SIZE: usize = 16 * 1024 * 1024;
