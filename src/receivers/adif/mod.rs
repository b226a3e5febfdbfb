// SPDX-License-Identifier: Apache-2.0

//! ADIF log receiver.
//!
//! Watches a single append-only ADIF file and turns newly written bytes into
//! complete [`Record`]s. The pieces are layered so that each can be tested in
//! isolation:
//!
//! - [`splitter`] finds record boundaries in a byte buffer, with no I/O.
//! - [`watcher`] turns OS notifications or polling into wake-up signals.
//! - [`tailer`] reads what was appended on each wake-up and feeds the splitter.

pub mod config;
pub mod error;
pub mod file_id;
pub mod record;
pub mod splitter;
pub mod tailer;
pub mod watcher;

pub use config::{StartAt, TailConfig};
pub use error::{Error, Result};
pub use record::Record;
pub use tailer::Tailer;
