// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log file {path:?} was truncated: size {size} is below read offset {offset}")]
    Truncated { path: PathBuf, offset: u64, size: u64 },

    #[error("log file {0:?} was removed")]
    FileRemoved(PathBuf),

    #[error("log file {0:?} was replaced by a different file")]
    FileReplaced(PathBuf),

    #[error("log file {0:?} was renamed")]
    FileRenamed(PathBuf),

    #[error("{size} bytes pending since offset {offset} without a complete record")]
    RecordTooLarge { offset: u64, size: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
