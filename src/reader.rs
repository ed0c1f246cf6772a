//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the tarstream project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The entry cursor over a tar byte stream
//!
//! [`TarReader`] walks a forward-only byte source entry by entry:
//! [`TarReader::next_entry`] skips whatever is left of the current
//! payload, reads and decodes the next header, stitches together the
//! pseudo-entries that describe the following real entry (GNU
//! long-name/long-link, PAX local and global extended headers),
//! resolves sparse maps, and leaves the cursor positioned at the start
//! of the entry's logical payload. The payload is then read through
//! [`TarReader::read_data`] (or the [`Read`] impl), which reconstructs
//! sparse files transparently.

use crate::decode::{TextDecoder, Utf8Decoder};
use crate::entry::Entry;
use crate::error::{TarError, TarResult};
use crate::header;
use crate::pax;
use crate::record::{RecordReader, DEFAULT_BLOCK_SIZE, DEFAULT_RECORD_SIZE};
use crate::sparse::{self, SparseReader, SparseSpan};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::Read;

/// Buffer size for draining long-name payloads
const SMALL_BUFSZ: usize = 256;

/// Configures and builds a [`TarReader`].
pub struct TarReaderBuilder {
    record_size: usize,
    block_size: usize,
    lenient: bool,
    decoder: Box<dyn TextDecoder>,
}

impl Default for TarReaderBuilder {
    fn default() -> Self {
        TarReaderBuilder {
            record_size: DEFAULT_RECORD_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            lenient: false,
            decoder: Box::new(Utf8Decoder),
        }
    }
}

impl TarReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record size in bytes (default 512). Values smaller than the
    /// 512-byte header footprint are brought up to it.
    pub fn record_size(mut self, record_size: usize) -> Self {
        self.record_size = record_size;
        self
    }

    /// Block size in bytes (default 10 records). Rounded up to a
    /// record multiple.
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// In lenient mode, out-of-range numeric header fields decay to
    /// `None` instead of failing the decode.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// Decoder for name and link-name bytes (default UTF-8 lossy)
    pub fn text_decoder(mut self, decoder: impl TextDecoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    pub fn build<R: Read>(self, inner: R) -> TarReader<R> {
        let record_size = self.record_size.max(DEFAULT_RECORD_SIZE);
        let block_size = self
            .block_size
            .max(record_size)
            .div_ceil(record_size)
            * record_size;
        TarReader {
            records: RecordReader::new(inner, record_size, block_size),
            decoder: self.decoder,
            lenient: self.lenient,
            at_eof: false,
            current: None,
            entry_offset: 0,
            entry_size: 0,
            sparse: None,
            global_headers: HashMap::new(),
            global_sparse: Vec::new(),
        }
    }
}

/// Streaming reader over a tar archive.
///
/// The reader owns the byte source and is strictly forward-only: one
/// in-flight entry at a time, with [`TarReader::next_entry`]
/// invalidating the previous entry's payload stream.
pub struct TarReader<R: Read> {
    records: RecordReader<R>,
    decoder: Box<dyn TextDecoder>,
    lenient: bool,
    /// Latched once the end-of-archive terminator has been seen
    at_eof: bool,
    current: Option<Entry>,
    /// Logical bytes of the current payload already delivered
    entry_offset: u64,
    /// Declared on-disk size of the current payload
    entry_size: u64,
    /// Segment plan for the current entry when it is sparse
    sparse: Option<SparseReader>,
    /// Global PAX headers, inherited by every subsequent entry
    global_headers: HashMap<String, String>,
    /// Sparse spans collected from a global PAX header
    global_sparse: Vec<SparseSpan>,
}

impl<R: Read> TarReader<R> {
    /// Create a reader with default configuration
    pub fn new(inner: R) -> Self {
        TarReaderBuilder::new().build(inner)
    }

    /// Start building a reader with non-default configuration
    pub fn builder() -> TarReaderBuilder {
        TarReaderBuilder::new()
    }

    /// The record size this reader frames on
    pub fn record_size(&self) -> usize {
        self.records.record_size()
    }

    /// The block size used for end-of-archive padding
    pub fn block_size(&self) -> usize {
        self.records.block_size()
    }

    /// Total bytes consumed from the underlying source
    pub fn bytes_read(&self) -> u64 {
        self.records.bytes_read()
    }

    /// The entry the cursor is positioned at, if any
    pub fn current_entry(&self) -> Option<&Entry> {
        self.current.as_ref()
    }

    /// Release the underlying byte source
    pub fn close(self) {
        drop(self);
    }

    /// Hand back the underlying byte source
    pub fn into_inner(self) -> R {
        self.records.into_inner()
    }

    /// Advance to the next entry in the archive.
    ///
    /// Skips any unread remainder of the current entry's payload,
    /// returns `None` once the end-of-archive terminator (or a short
    /// read at the tail) has been seen. The returned reference is
    /// valid until the next call; the previous entry's payload stream
    /// is invalidated by advancing.
    pub fn next_entry(&mut self) -> TarResult<Option<&Entry>> {
        if self.at_eof {
            return Ok(None);
        }

        let draining = self
            .current
            .as_ref()
            .is_some_and(|entry| !entry.is_directory());
        if draining {
            // drain through the entry read path so sparse bookkeeping
            // stays accurate
            while self.skip(u64::MAX)? > 0 {}
            self.records.consume_entry_tail(self.entry_size)?;
        }

        let Some(record) = self.get_record()? else {
            self.current = None;
            return Ok(None);
        };

        let entry = header::decode(&record, self.decoder.as_ref(), self.lenient)?;
        self.entry_offset = 0;
        self.entry_size = entry.size;
        self.sparse = None;
        self.current = Some(entry);

        if self.current.as_ref().is_some_and(Entry::is_long_link) {
            let Some(data) = self.read_long_name_data()? else {
                warn!("long-link entry not followed by an entry, treating as end of archive");
                return Ok(None);
            };
            let link_name = self.decoder.decode(&data)?;
            self.current.as_mut().expect("entry after long link").link_name = link_name;
        }

        if self.current.as_ref().is_some_and(Entry::is_long_name) {
            let Some(data) = self.read_long_name_data()? else {
                warn!("long-name entry not followed by an entry, treating as end of archive");
                return Ok(None);
            };
            let mut name = self.decoder.decode(&data)?;
            let entry = self.current.as_mut().expect("entry after long name");
            if entry.is_directory() && !name.ends_with('/') {
                name.push('/');
            }
            entry.name = name;
        }

        if self.current.as_ref().is_some_and(Entry::is_pax_global) {
            self.read_global_pax_headers()?;
        }

        if self.current.as_ref().is_some_and(Entry::is_pax_local) {
            self.process_pax_headers()?;
        } else if self.current.is_some() && !self.global_headers.is_empty() {
            let headers = self.global_headers.clone();
            let spans = self.global_sparse.clone();
            let entry = self.current.as_mut().expect("current entry");
            entry.apply_pax_headers(&headers)?;
            if !spans.is_empty() {
                entry.sparse_spans = spans;
            }
        }

        if self.current.as_ref().is_some_and(Entry::is_old_gnu_sparse) {
            self.read_old_gnu_sparse()?;
        }

        // a PAX header may have changed the declared size
        let entry = self.current.as_mut().expect("current entry");
        self.entry_size = entry.size;

        if entry.is_sparse() {
            let real_size = entry.real_size();
            entry.sparse_spans = sparse::normalize_spans(&entry.sparse_spans, real_size)?;
            debug!(
                "sparse entry {:?}: {} spans, real size {}",
                entry.name,
                entry.sparse_spans.len(),
                real_size
            );
            self.sparse = Some(SparseReader::new(&entry.sparse_spans));
        }

        Ok(self.current.as_ref())
    }

    /// Read payload bytes of the current entry into `buf`.
    ///
    /// Returns `Ok(0)` at the end of the entry's logical payload (and
    /// always for directories). Sparse entries are reconstructed
    /// transparently: holes read as zeroes and only the data spans
    /// consume source bytes. A source that runs dry before the
    /// declared end of the payload is a truncated archive.
    pub fn read_data(&mut self, buf: &mut [u8]) -> TarResult<usize> {
        if buf.is_empty() || self.at_eof {
            return Ok(0);
        }
        let Some(entry) = self.current.as_ref() else {
            return Err(TarError::State("no current tar entry".to_string()));
        };
        if entry.is_directory() {
            return Ok(0);
        }

        let is_sparse = entry.is_sparse();
        let remaining = if is_sparse {
            entry.real_size().saturating_sub(self.entry_offset)
        } else {
            self.entry_size.saturating_sub(self.entry_offset)
        };
        if remaining == 0 {
            return Ok(0);
        }

        let want = remaining.min(buf.len() as u64) as usize;
        let n = match self.sparse.as_mut() {
            Some(sparse) if is_sparse => sparse.read(&mut self.records, &mut buf[..want])?,
            _ => self.records.read(&mut buf[..want])?,
        };
        if n == 0 {
            return Err(TarError::Truncated(
                "archive ended inside an entry payload".to_string(),
            ));
        }
        self.entry_offset += n as u64;
        Ok(n)
    }

    /// Skip up to `n` payload bytes of the current entry.
    ///
    /// Returns the number of bytes actually advanced: 0 for
    /// directories, at most the remaining logical payload otherwise.
    /// Sparse holes are skipped without touching the source.
    pub fn skip(&mut self, n: u64) -> TarResult<u64> {
        if n == 0 {
            return Ok(0);
        }
        let Some(entry) = self.current.as_ref() else {
            return Err(TarError::State("no current tar entry".to_string()));
        };
        if entry.is_directory() {
            return Ok(0);
        }

        let is_sparse = entry.is_sparse();
        let available = entry.real_size().saturating_sub(self.entry_offset);
        let want = n.min(available);
        if want == 0 {
            return Ok(0);
        }

        let skipped = match self.sparse.as_mut() {
            Some(sparse) if is_sparse => sparse.skip(&mut self.records, want)?,
            _ => self.records.skip(want)?,
        };
        self.entry_offset += skipped;
        Ok(skipped)
    }

    /// Remaining logical bytes of the current entry's payload; 0 for
    /// directories and when no entry is current.
    pub fn available(&self) -> u64 {
        match &self.current {
            Some(entry) if !entry.is_directory() => {
                entry.real_size().saturating_sub(self.entry_offset)
            }
            _ => 0,
        }
    }

    /// Read the next record, handling the end-of-archive terminator:
    /// on the first all-zero record the EOF flag latches, a second
    /// terminator record is consumed when present, and the stream is
    /// advanced past the block-alignment tail.
    fn get_record(&mut self) -> TarResult<Option<Vec<u8>>> {
        match self.records.read_record()? {
            Some(record) if !self.records.is_eof_record(&record) => Ok(Some(record)),
            Some(_) => {
                self.at_eof = true;
                self.records.try_consume_second_eof_record()?;
                self.records.consume_block_tail()?;
                Ok(None)
            }
            None => {
                self.at_eof = true;
                Ok(None)
            }
        }
    }

    /// Drain the payload of a long-name/long-link pseudo-entry, fetch
    /// the entry it describes, and return the payload with trailing
    /// NULs stripped. `None` when the archive ends instead.
    fn read_long_name_data(&mut self) -> TarResult<Option<Vec<u8>>> {
        let mut data = Vec::new();
        let mut buf = [0u8; SMALL_BUFSZ];
        loop {
            let n = self.read_data(&mut buf)?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }

        self.next_entry()?;
        if self.current.is_none() {
            return Ok(None);
        }

        while data.last() == Some(&0) {
            data.pop();
        }
        Ok(Some(data))
    }

    /// Parse a global PAX header payload into the cursor's global
    /// state and fetch the entry that follows it.
    fn read_global_pax_headers(&mut self) -> TarResult<()> {
        let seed = self.global_headers.clone();
        let mut spans = Vec::new();
        let headers = pax::parse_pax_headers(&mut *self, &seed, &mut spans)?;
        debug!("global PAX header replaced, {} keywords", headers.len());
        self.global_headers = headers;
        self.global_sparse = spans;

        self.next_entry()?;
        if self.current.is_none() {
            return Err(TarError::Truncated(
                "no entry after global PAX header".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a local PAX header payload, fetch the entry it belongs
    /// to, and apply the merged keyword map to it. For PAX 1.x sparse
    /// entries the in-payload sparse map is consumed here as well.
    fn process_pax_headers(&mut self) -> TarResult<()> {
        let seed = self.global_headers.clone();
        let mut spans = Vec::new();
        let headers = pax::parse_pax_headers(&mut *self, &seed, &mut spans)?;

        // PAX 0.1 stores the whole map in a single keyword
        if let Some(map) = headers.get("GNU.sparse.map") {
            spans = sparse::parse_pax_01_sparse_map(map)?;
        }

        self.next_entry()?;
        if self.current.is_none() {
            return Err(TarError::Truncated(
                "no entry after PAX header".to_string(),
            ));
        }

        let is_1x = {
            let entry = self.current.as_mut().expect("current entry");
            entry.apply_pax_headers(&headers)?;
            if !spans.is_empty() {
                entry.sparse_spans = spans;
            }
            entry.is_pax_gnu_1x_sparse()
        };

        if is_1x {
            let spans = sparse::read_pax_1x_sparse_map(&mut self.records)?;
            self.current.as_mut().expect("current entry").sparse_spans = spans;
        }
        Ok(())
    }

    /// Collect the sparse continuation records that follow an old-GNU
    /// sparse header while its isextended flag stays set.
    fn read_old_gnu_sparse(&mut self) -> TarResult<()> {
        if !self.current.as_ref().expect("current entry").is_extended {
            return Ok(());
        }
        loop {
            let Some(record) = self.get_record()? else {
                return Err(TarError::Truncated(
                    "archive ended inside sparse continuation records".to_string(),
                ));
            };
            let continuation = sparse::parse_continuation(&record)?;
            self.current
                .as_mut()
                .expect("current entry")
                .sparse_spans
                .extend(continuation.spans);
            if !continuation.is_extended {
                return Ok(());
            }
        }
    }
}

impl<R: Read> Read for TarReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read_data(buf).map_err(std::io::Error::from)
    }
}
