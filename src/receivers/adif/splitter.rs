// SPDX-License-Identifier: Apache-2.0

//! Incremental ADIF record splitting.
//!
//! The splitter is a pure function over a growing buffer: it finds every
//! complete record, hands those back in file order and returns the bytes that
//! follow the last one untouched. It is safe to call again with the remainder
//! plus newly read bytes, no matter how the writer chunked its output.
//!
//! Scanning is tag-aware. A data specifier such as `<COMMENT:12>` is followed
//! by exactly twelve bytes of field data, and those bytes are skipped without
//! being inspected, so an `<eor>` that happens to sit inside a comment never
//! ends a record early.

use bytes::{Bytes, BytesMut};

/// Longest tag we are willing to wait for before treating a `<` as plain text.
pub const MAX_TAG_LEN: usize = 1024;

const END_OF_RECORD: &[u8] = b"eor";

/// Output of a single [`split`] call.
#[derive(Debug, Default)]
pub struct Split {
    /// Complete records, in the order they appear in the buffer.
    pub records: Vec<Bytes>,
    /// Bytes after the last complete record.
    pub remainder: BytesMut,
}

/// Split `buffer` into complete records and a remainder.
///
/// Every byte of the input ends up in exactly one record or in the remainder.
pub fn split(mut buffer: BytesMut) -> Split {
    let ends = record_ends(&buffer);

    let mut records = Vec::with_capacity(ends.len());
    let mut consumed = 0;
    for end in ends {
        records.push(buffer.split_to(end - consumed).freeze());
        consumed = end;
    }

    Split {
        records,
        remainder: buffer,
    }
}

/// Positions just past the terminator of every complete record in `buf`.
pub fn record_ends(buf: &[u8]) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut has_content = false;
    let mut pos = 0;

    while pos < buf.len() {
        if buf[pos] != b'<' {
            if !buf[pos].is_ascii_whitespace() {
                has_content = true;
            }
            pos += 1;
            continue;
        }

        match scan_tag(&buf[pos..]) {
            TagScan::Incomplete => break,
            TagScan::Text => {
                has_content = true;
                pos += 1;
            }
            TagScan::Tag {
                name,
                data_len,
                tag_len,
            } => {
                let data_start = pos + tag_len;

                if name.eq_ignore_ascii_case(END_OF_RECORD) {
                    pos = data_start;
                    // An empty record is folded into whatever follows it.
                    if has_content {
                        ends.push(pos);
                        has_content = false;
                    }
                    continue;
                }

                has_content = true;
                let data_end = match data_start.checked_add(data_len) {
                    Some(end) => end,
                    None => break,
                };
                if data_end > buf.len() {
                    // Field data has not been fully written yet.
                    break;
                }
                pos = data_end;
            }
        }
    }

    ends
}

#[derive(Debug, PartialEq, Eq)]
enum TagScan<'a> {
    /// A well formed tag: `<name[:len[:type]]>`.
    Tag {
        name: &'a [u8],
        data_len: usize,
        tag_len: usize,
    },
    /// The `<` does not open a tag.
    Text,
    /// Could still become a tag once more bytes arrive.
    Incomplete,
}

/// Inspect the bytes starting at a `<`.
fn scan_tag(buf: &[u8]) -> TagScan<'_> {
    debug_assert_eq!(buf.first(), Some(&b'<'));

    let limit = buf.len().min(MAX_TAG_LEN);
    let close = match buf[1..limit].iter().position(|&b| b == b'>') {
        Some(i) => i + 1,
        None => {
            let seen = &buf[1..limit];
            if buf.len() < MAX_TAG_LEN && could_be_tag_prefix(seen) {
                return TagScan::Incomplete;
            }
            return TagScan::Text;
        }
    };

    let inner = &buf[1..close];
    let mut parts = inner.splitn(3, |&b| b == b':');

    let name = parts.next().unwrap_or_default();
    if name.is_empty() || !name.iter().all(|&b| is_name_byte(b)) {
        return TagScan::Text;
    }

    let data_len = match parts.next() {
        None => 0,
        Some(len) => match parse_len(len) {
            Some(n) => n,
            None => return TagScan::Text,
        },
    };

    if let Some(kind) = parts.next() {
        if kind.iter().any(|&b| b == b'<') {
            return TagScan::Text;
        }
    }

    TagScan::Tag {
        name,
        data_len,
        tag_len: close + 1,
    }
}

fn could_be_tag_prefix(seen: &[u8]) -> bool {
    let mut parts = seen.splitn(3, |&b| b == b':');

    let name_ok = parts
        .next()
        .is_some_and(|name| name.iter().all(|&b| is_name_byte(b)));
    let len_ok = parts
        .next()
        .is_none_or(|len| len.iter().all(u8::is_ascii_digit));
    let kind_ok = parts.next().is_none_or(|kind| !kind.contains(&b'<'));

    name_ok && len_ok && kind_ok
}

fn is_name_byte(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b':' | b'<' | b'>' | b',' | b'{' | b'}')
}

fn parse_len(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0usize, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add(usize::from(b - b'0'))
    })
}
