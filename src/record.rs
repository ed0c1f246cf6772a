//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the tarstream project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Record-oriented I/O over the underlying byte source
//!
//! Tar archives are organized as:
//! - **record**: fixed-size framing unit (512 bytes by default); every
//!   header occupies one record and payloads are padded to record
//!   boundaries
//! - **block**: the padding unit of the archive tail (10 records by
//!   default); a finished archive is padded out to a block boundary
//!
//! The reader owns the source and counts every byte consumed from it;
//! the count drives block-alignment accounting at end of archive and is
//! exposed to callers as telemetry.

use crate::error::TarResult;
use std::io::Read;

/// Size of a single tar record in bytes
pub const DEFAULT_RECORD_SIZE: usize = 512;

/// Default blocking factor (number of records per block)
pub const DEFAULT_BLOCKING_FACTOR: usize = 10;

/// Default block size in bytes (blocking factor * record size)
pub const DEFAULT_BLOCK_SIZE: usize = DEFAULT_BLOCKING_FACTOR * DEFAULT_RECORD_SIZE;

const SKIP_BUFSZ: usize = 4096;

/// Reads fixed-size records from the underlying byte source.
///
/// Supports a single-record pushback so the end-of-archive check can
/// peek at the record following the first all-zero one and undo the
/// read when it turns out not to be the archive terminator.
pub struct RecordReader<R> {
    inner: R,
    record_size: usize,
    block_size: usize,
    /// Bytes consumed from the source, net of pushback
    bytes_read: u64,
    /// Pushed-back record, served before the source on the next read
    unread: Vec<u8>,
    unread_pos: usize,
}

impl<R: Read> RecordReader<R> {
    /// Create a record reader with the given record and block sizes
    pub fn new(inner: R, record_size: usize, block_size: usize) -> Self {
        RecordReader {
            inner,
            record_size,
            block_size,
            bytes_read: 0,
            unread: Vec::new(),
            unread_pos: 0,
        }
    }

    /// The record size this reader frames on
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// The block size used for tail padding
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Total bytes consumed from the underlying source
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Hand back the underlying source
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Counted read: a single read against the pushback buffer or the
    /// source. May return fewer bytes than requested.
    pub fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.unread_pos < self.unread.len() {
            let available = self.unread.len() - self.unread_pos;
            let to_copy = std::cmp::min(available, buf.len());
            buf[..to_copy]
                .copy_from_slice(&self.unread[self.unread_pos..self.unread_pos + to_copy]);
            self.unread_pos += to_copy;
            if self.unread_pos >= self.unread.len() {
                self.unread.clear();
                self.unread_pos = 0;
            }
            self.bytes_read += to_copy as u64;
            return Ok(to_copy);
        }

        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }

    /// Read until `buf` is full or the source is exhausted; returns the
    /// number of bytes actually placed.
    fn read_full(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Read the next record.
    ///
    /// Returns `None` if the source could not supply a full record; a
    /// short read at the tail is treated as end of archive, with the
    /// partial bytes still counted.
    pub fn read_record(&mut self) -> TarResult<Option<Vec<u8>>> {
        let mut record = vec![0u8; self.record_size];
        let n = self.read_full(&mut record)?;
        if n != self.record_size {
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Whether a record consists entirely of zero bytes
    pub fn is_eof_record(&self, record: &[u8]) -> bool {
        record[..self.record_size].iter().all(|&b| b == 0)
    }

    /// Consume the record following the first end-of-archive record if
    /// it is also all zeroes; push it back otherwise.
    ///
    /// Protects against writers that emit only one of the two required
    /// terminator records. The pushed-back bytes are subtracted from
    /// the byte count so block-tail accounting stays accurate.
    pub fn try_consume_second_eof_record(&mut self) -> TarResult<()> {
        if let Some(record) = self.read_record()? {
            if !self.is_eof_record(&record) {
                self.unread_record(record);
            }
        }
        Ok(())
    }

    fn unread_record(&mut self, record: Vec<u8>) {
        debug_assert!(self.unread_pos >= self.unread.len());
        self.bytes_read -= record.len() as u64;
        self.unread = record;
        self.unread_pos = 0;
    }

    /// Best-effort forward skip, emulated by draining reads.
    ///
    /// Returns the number of bytes actually skipped, which is less than
    /// `n` only when the source ends first.
    pub fn skip(&mut self, n: u64) -> TarResult<u64> {
        let mut remaining = n;
        let mut buf = [0u8; SKIP_BUFSZ];
        while remaining > 0 {
            let want = std::cmp::min(remaining, buf.len() as u64) as usize;
            let got = self.read(&mut buf[..want])?;
            if got == 0 {
                break;
            }
            remaining -= got as u64;
        }
        Ok(n - remaining)
    }

    /// Skip the zero padding that follows an entry payload, bringing
    /// the stream to the next record boundary.
    pub fn consume_entry_tail(&mut self, declared_size: u64) -> TarResult<()> {
        let record_size = self.record_size as u64;
        if declared_size > 0 && declared_size % record_size != 0 {
            let num_records = (declared_size / record_size) + 1;
            let padding = num_records * record_size - declared_size;
            self.skip(padding)?;
        }
        Ok(())
    }

    /// Skip forward to the next block boundary once the end of the
    /// archive has been seen; short skips at EOF are accepted.
    pub fn consume_block_tail(&mut self) -> TarResult<()> {
        let block_size = self.block_size as u64;
        let remainder = self.bytes_read % block_size;
        if remainder > 0 {
            self.skip(block_size - remainder)?;
        }
        Ok(())
    }
}
