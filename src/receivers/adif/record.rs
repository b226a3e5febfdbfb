// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use std::fmt;

/// One complete ADIF entry, up to and including its `<eor>` tag.
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    /// Byte offset in the watched file where this record begins
    offset: u64,
    content: Bytes,
}

impl Record {
    pub fn new(offset: u64, content: Bytes) -> Self {
        Self { offset, content }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Offset just past the end of this record.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.content.len() as u64
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 48;
        let shown = &self.content[..self.content.len().min(PREVIEW)];
        write!(
            f,
            "Record{{Offset={}, Len={}, Content={:?}{}}}",
            self.offset,
            self.content.len(),
            String::from_utf8_lossy(shown),
            if self.content.len() > PREVIEW { "..." } else { "" }
        )
    }
}
