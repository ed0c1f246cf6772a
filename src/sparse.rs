//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the tarstream project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Sparse file maps and payload reconstruction
//!
//! Sparse entries store only the non-zero regions of a file; a sparse
//! map of `(offset, length)` spans says where those regions sit in the
//! dense file. Four dialects carry the map:
//!
//! - **old-GNU**: up to 4 structs inline in the header, then 512-byte
//!   continuation records of 21 structs each while the `isextended`
//!   flag stays set
//! - **PAX 0.0**: repeated `GNU.sparse.offset`/`GNU.sparse.numbytes`
//!   keyword pairs in the extended header
//! - **PAX 0.1**: a single `GNU.sparse.map` keyword holding a
//!   comma-separated `offset,length,...` list
//! - **PAX 1.x**: a decimal map at the front of the payload itself:
//!   a count line, then an offset and a length line per span, padded
//!   out to a record boundary
//!
//! All dialects normalize to one canonical span list; the payload is
//! then reconstructed by interleaving synthetic zero runs with data
//! runs read from the source.

use crate::error::{TarError, TarResult};
use crate::header::parse_numeric;
use crate::record::RecordReader;
use std::io::Read;

const SPARSE_OFFSET_LEN: usize = 12;
const SPARSE_NUMBYTES_LEN: usize = 12;
const SPARSE_STRUCT_LEN: usize = SPARSE_OFFSET_LEN + SPARSE_NUMBYTES_LEN;

/// Sparse structs held in one old-GNU continuation record
const SPARSE_IN_CONTINUATION: usize = 21;
/// Offset of the continuation record's own isextended flag
const CONT_ISEXTENDED_OFF: usize = SPARSE_IN_CONTINUATION * SPARSE_STRUCT_LEN;

/// One non-zero region of a sparse file's dense payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseSpan {
    /// Offset of the region in the dense file
    pub offset: u64,
    /// Length of the region in bytes
    pub length: u64,
}

impl SparseSpan {
    fn is_terminator(&self) -> bool {
        self.offset == 0 && self.length == 0
    }
}

/// Parse up to `max` sparse structs out of a header region, stopping
/// at an all-zero terminator struct.
pub(crate) fn parse_sparse_structs(region: &[u8], max: usize) -> TarResult<Vec<SparseSpan>> {
    let mut spans = Vec::new();
    for i in 0..max {
        let base = i * SPARSE_STRUCT_LEN;
        let offset = parse_numeric(&region[base..base + SPARSE_OFFSET_LEN])?;
        let length =
            parse_numeric(&region[base + SPARSE_OFFSET_LEN..base + SPARSE_STRUCT_LEN])?;
        if offset < 0 || length < 0 {
            return Err(TarError::SparseMalformed(
                "negative sparse struct field".to_string(),
            ));
        }
        let span = SparseSpan {
            offset: offset as u64,
            length: length as u64,
        };
        if span.is_terminator() {
            break;
        }
        spans.push(span);
    }
    Ok(spans)
}

/// Span list carried by one old-GNU sparse continuation record
pub(crate) struct SparseContinuation {
    pub spans: Vec<SparseSpan>,
    /// Another continuation record follows this one
    pub is_extended: bool,
}

/// Parse an old-GNU sparse continuation record
pub(crate) fn parse_continuation(record: &[u8]) -> TarResult<SparseContinuation> {
    let spans = parse_sparse_structs(record, SPARSE_IN_CONTINUATION)?;
    Ok(SparseContinuation {
        spans,
        is_extended: record[CONT_ISEXTENDED_OFF] != 0,
    })
}

/// Parse a PAX 0.1 `GNU.sparse.map` value: comma-separated decimal
/// `offset,length` pairs.
pub(crate) fn parse_pax_01_sparse_map(map: &str) -> TarResult<Vec<SparseSpan>> {
    let values: Vec<&str> = map.split(',').collect();
    if values.len() % 2 != 0 {
        return Err(TarError::SparseMalformed(format!(
            "odd number of values in sparse map: {}",
            values.len()
        )));
    }
    let mut spans = Vec::new();
    for pair in values.chunks(2) {
        let offset: u64 = pair[0].parse().map_err(|_| {
            TarError::SparseMalformed(format!("invalid sparse offset: {}", pair[0]))
        })?;
        let length: u64 = pair[1].parse().map_err(|_| {
            TarError::SparseMalformed(format!("invalid sparse length: {}", pair[1]))
        })?;
        let span = SparseSpan { offset, length };
        if span.is_terminator() {
            break;
        }
        spans.push(span);
    }
    Ok(spans)
}

/// Read one newline-terminated decimal number of the PAX 1.x sparse
/// map; returns the value and the bytes consumed.
fn read_decimal_line<R: Read>(records: &mut RecordReader<R>) -> TarResult<(u64, u64)> {
    let mut value: u64 = 0;
    let mut bytes_read: u64 = 0;
    let mut byte = [0u8; 1];
    loop {
        if records.read(&mut byte)? == 0 {
            return Err(TarError::Truncated(
                "unexpected EOF while reading sparse map".to_string(),
            ));
        }
        bytes_read += 1;
        match byte[0] {
            b'\n' => return Ok((value, bytes_read)),
            d @ b'0'..=b'9' => {
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add((d - b'0') as u64))
                    .ok_or_else(|| {
                        TarError::SparseMalformed("sparse map value overflow".to_string())
                    })?;
            }
            other => {
                return Err(TarError::SparseMalformed(format!(
                    "unexpected byte {:#04x} in sparse map",
                    other
                )))
            }
        }
    }
}

/// Read the PAX 1.x in-payload sparse map: a span count line, then an
/// offset and a length line per span. The map region is padded out to
/// the next record boundary, which is skipped here as well.
pub(crate) fn read_pax_1x_sparse_map<R: Read>(
    records: &mut RecordReader<R>,
) -> TarResult<Vec<SparseSpan>> {
    let (count, mut bytes_read) = read_decimal_line(records)?;

    let mut spans = Vec::new();
    for _ in 0..count {
        let (offset, n) = read_decimal_line(records)?;
        bytes_read += n;
        let (length, n) = read_decimal_line(records)?;
        bytes_read += n;
        spans.push(SparseSpan { offset, length });
    }

    let record_size = records.record_size() as u64;
    records.skip(record_size - bytes_read % record_size)?;
    Ok(spans)
}

/// Normalize a raw span list into canonical form: cut at a terminator,
/// sort by offset, and check the span invariants against the dense
/// size.
pub(crate) fn normalize_spans(
    raw: &[SparseSpan],
    real_size: u64,
) -> TarResult<Vec<SparseSpan>> {
    let mut spans: Vec<SparseSpan> = raw
        .iter()
        .copied()
        .take_while(|s| !s.is_terminator())
        .collect();
    spans.sort_by_key(|s| s.offset);

    let mut prev_end: u64 = 0;
    for span in &spans {
        if span.offset < prev_end {
            return Err(TarError::SparseMalformed(format!(
                "overlapping spans at offset {}",
                span.offset
            )));
        }
        let end = span.offset.checked_add(span.length).ok_or_else(|| {
            TarError::SparseMalformed("sparse span overflows".to_string())
        })?;
        if end > real_size {
            return Err(TarError::SparseMalformed(format!(
                "span ending at {} exceeds real size {}",
                end, real_size
            )));
        }
        prev_end = end;
    }
    Ok(spans)
}

/// One stretch of the reconstructed payload
#[derive(Debug)]
enum SparseSegment {
    /// A hole: synthesized zeroes, consuming nothing from the source
    Zero { remaining: u64 },
    /// On-disk data read from the source
    Data { remaining: u64 },
}

/// Reconstructs a dense payload from a canonical span list.
///
/// Holds a plan of zero and data segments; reads and skips drain the
/// current segment and move on to the next until the request is
/// satisfied. Beyond the last segment only zeroes remain (a trailing
/// hole) - the cursor bounds every request at the entry's real size.
#[derive(Debug, Default)]
pub(crate) struct SparseReader {
    segments: Vec<SparseSegment>,
    index: usize,
}

impl SparseReader {
    pub(crate) fn new(spans: &[SparseSpan]) -> Self {
        let mut segments = Vec::new();
        let mut offset: u64 = 0;
        for span in spans {
            if span.offset > offset {
                segments.push(SparseSegment::Zero {
                    remaining: span.offset - offset,
                });
            }
            if span.length > 0 {
                segments.push(SparseSegment::Data {
                    remaining: span.length,
                });
            }
            offset = span.offset + span.length;
        }
        SparseReader { segments, index: 0 }
    }

    /// Read reconstructed payload bytes into `buf`.
    ///
    /// Returns less than the request only when the source runs dry
    /// inside a data segment; a zero return in that case lets the
    /// cursor flag the archive as truncated.
    pub(crate) fn read<R: Read>(
        &mut self,
        records: &mut RecordReader<R>,
        buf: &mut [u8],
    ) -> TarResult<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.segments.get_mut(self.index) {
                None => {
                    buf[total..].fill(0);
                    total = buf.len();
                }
                Some(SparseSegment::Zero { remaining }) => {
                    if *remaining == 0 {
                        self.index += 1;
                        continue;
                    }
                    let n = (*remaining).min((buf.len() - total) as u64) as usize;
                    buf[total..total + n].fill(0);
                    *remaining -= n as u64;
                    total += n;
                }
                Some(SparseSegment::Data { remaining }) => {
                    if *remaining == 0 {
                        self.index += 1;
                        continue;
                    }
                    let want = (*remaining).min((buf.len() - total) as u64) as usize;
                    let n = records.read(&mut buf[total..total + want])?;
                    if n == 0 {
                        break;
                    }
                    *remaining -= n as u64;
                    total += n;
                }
            }
        }
        Ok(total)
    }

    /// Skip reconstructed payload bytes, consuming source bytes only
    /// for data segments.
    pub(crate) fn skip<R: Read>(
        &mut self,
        records: &mut RecordReader<R>,
        n: u64,
    ) -> TarResult<u64> {
        let mut skipped = 0;
        while skipped < n {
            match self.segments.get_mut(self.index) {
                None => {
                    skipped = n;
                }
                Some(SparseSegment::Zero { remaining }) => {
                    if *remaining == 0 {
                        self.index += 1;
                        continue;
                    }
                    let m = (*remaining).min(n - skipped);
                    *remaining -= m;
                    skipped += m;
                }
                Some(SparseSegment::Data { remaining }) => {
                    if *remaining == 0 {
                        self.index += 1;
                        continue;
                    }
                    let want = (*remaining).min(n - skipped);
                    let got = records.skip(want)?;
                    if got == 0 {
                        break;
                    }
                    *remaining -= got;
                    skipped += got;
                }
            }
        }
        Ok(skipped)
    }
}
