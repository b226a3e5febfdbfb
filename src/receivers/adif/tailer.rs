// SPDX-License-Identifier: Apache-2.0

//! Incremental reader for the watched log file.
//!
//! The tailer owns the open file handle, the read offset and the bytes read
//! past the last complete record. Every wake-up reads whatever was appended
//! since the previous one and hands back the records that became complete.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tracing::{debug, trace};

use super::config::{StartAt, TailConfig};
use super::error::{Error, Result};
use super::file_id::FileId;
use super::record::Record;
use super::splitter;

/// Size of a single read from the file
pub const CHUNK_SIZE: usize = 256 * 1024;

pub struct Tailer {
    path: PathBuf,
    file: File,
    file_id: FileId,
    /// Offset of the next byte to read
    offset: u64,
    /// Bytes read but not yet part of a complete record
    pending: BytesMut,
    scratch: Vec<u8>,
    max_pending_size: usize,
}

impl Tailer {
    /// Open the log file read-only and position the read offset.
    pub fn open(config: &TailConfig) -> Result<Self> {
        config.validate().map_err(Error::Config)?;

        let file = File::open(&config.path)?;
        let file_id = FileId::from_file(&file)?;

        let offset = match config.start_at {
            StartAt::Beginning => 0,
            StartAt::End => file.metadata()?.len(),
        };

        debug!(
            path = ?config.path,
            file_id = %file_id,
            offset,
            "Opened log file"
        );

        Ok(Self {
            path: config.path.clone(),
            file,
            file_id,
            offset,
            pending: BytesMut::new(),
            scratch: vec![0; CHUNK_SIZE],
            max_pending_size: config.max_pending_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the next byte to be read
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes held back waiting for the rest of a record
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Read everything appended since the last call and return the records
    /// that are now complete, in file order.
    ///
    /// Records completed by this read are always returned. A pending tail
    /// over `max_pending_size` is reported on the call that finds no record
    /// to return, so nothing already read is lost.
    pub fn on_wakeup(&mut self) -> Result<Vec<Record>> {
        self.check_pending_size()?;
        self.check_identity()?;

        let size = self.file.metadata()?.len();
        if size < self.offset {
            return Err(Error::Truncated {
                path: self.path.clone(),
                offset: self.offset,
                size,
            });
        }
        if size == self.offset {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        loop {
            let read = self.read_available()?;
            if read == 0 {
                break;
            }
            trace!(read, offset = self.offset, "Read appended bytes");

            self.split_pending(&mut records);
            if self.pending.len() > self.max_pending_size {
                break;
            }
        }

        if records.is_empty() {
            self.check_pending_size()?;
        }
        Ok(records)
    }

    /// Split the pending buffer, appending complete records to `records`.
    fn split_pending(&mut self, records: &mut Vec<Record>) {
        // Everything before `base` has already been emitted as records
        let base = self.pending_offset();
        let buffered = self.pending.len();

        let split = splitter::split(std::mem::take(&mut self.pending));
        let emitted: usize = split.records.iter().map(|r| r.len()).sum();
        assert_eq!(
            emitted + split.remainder.len(),
            buffered,
            "record splitter lost or duplicated bytes"
        );
        self.pending = split.remainder;

        let mut at = base;
        for content in split.records {
            let record = Record::new(at, content);
            at = record.end_offset();
            records.push(record);
        }
    }

    /// File offset of the first pending byte
    fn pending_offset(&self) -> u64 {
        self.offset - self.pending.len() as u64
    }

    fn check_pending_size(&self) -> Result<()> {
        if self.pending.len() > self.max_pending_size {
            return Err(Error::RecordTooLarge {
                offset: self.pending_offset(),
                size: self.pending.len(),
            });
        }
        Ok(())
    }

    /// Make sure the path still names the file we have open.
    fn check_identity(&self) -> Result<()> {
        match FileId::from_path(&self.path) {
            Ok(id) if id == self.file_id => Ok(()),
            Ok(_) => Err(Error::FileReplaced(self.path.clone())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::FileRemoved(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read into the pending buffer until end of file, or until the buffer
    /// holds a chunk more than `max_pending_size`. Returns the count.
    fn read_available(&mut self) -> Result<usize> {
        self.file.seek(SeekFrom::Start(self.offset))?;

        let limit = self.max_pending_size.saturating_add(CHUNK_SIZE);
        let mut total = 0;
        while self.pending.len() <= limit {
            let n = match self.file.read(&mut self.scratch) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.pending.extend_from_slice(&self.scratch[..n]);
            self.offset += n as u64;
            total += n;
        }

        Ok(total)
    }
}
