//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the tarstream project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! PAX extended header parsing
//!
//! A PAX extended header payload is a sequence of records of the form
//! `"length keyword=value\n"`, where `length` is the decimal byte
//! count of the whole record including itself. Keywords and values are
//! UTF-8 per POSIX. A record whose value is empty (the length leaves
//! room for only the trailing newline) deletes the keyword from the
//! map being built.
//!
//! While parsing, the PAX 0.0 sparse keywords
//! `GNU.sparse.offset`/`GNU.sparse.numbytes` are additionally folded
//! into a span list through a small side channel, since they repeat
//! per span and a map can hold each keyword only once.

use crate::error::{TarError, TarResult};
use crate::sparse::SparseSpan;
use std::collections::HashMap;
use std::io::Read;

const SPARSE_OFFSET_KEY: &str = "GNU.sparse.offset";
const SPARSE_NUMBYTES_KEY: &str = "GNU.sparse.numbytes";

fn read_byte<R: Read>(reader: &mut R) -> TarResult<Option<u8>> {
    let mut byte = [0u8; 1];
    if reader.read(&mut byte)? == 0 {
        return Ok(None);
    }
    Ok(Some(byte[0]))
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> TarResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(TarError::PaxMalformed(format!(
                "expected {} value bytes, got {}",
                buf.len(),
                filled
            )));
        }
        filled += n;
    }
    Ok(())
}

/// Parse a PAX extended header payload into a keyword map.
///
/// The map starts out as a copy of `seed` (the cursor's global
/// headers); parsed records override or delete entries in it.
/// PAX 0.0 sparse spans encountered along the way are appended to
/// `sparse_spans`. Parsing ends at the end of the stream or at a
/// blank record.
pub(crate) fn parse_pax_headers<R: Read>(
    reader: &mut R,
    seed: &HashMap<String, String>,
    sparse_spans: &mut Vec<SparseSpan>,
) -> TarResult<HashMap<String, String>> {
    let mut headers = seed.clone();
    let mut pending_offset: Option<u64> = None;

    'records: loop {
        // decimal record length, terminated by a space
        let mut length: u64 = 0;
        let mut consumed: u64 = 0;
        loop {
            let Some(byte) = read_byte(reader)? else {
                break 'records;
            };
            consumed += 1;
            match byte {
                b' ' => break,
                b'\n' => break 'records, // blank record
                digit @ b'0'..=b'9' => {
                    length = length
                        .checked_mul(10)
                        .and_then(|l| l.checked_add((digit - b'0') as u64))
                        .ok_or_else(|| {
                            TarError::PaxMalformed("record length overflow".to_string())
                        })?;
                }
                other => {
                    return Err(TarError::PaxMalformed(format!(
                        "unexpected byte {:#04x} in record length",
                        other
                    )))
                }
            }
        }

        // keyword, terminated by '='
        let mut keyword_bytes = Vec::new();
        loop {
            let Some(byte) = read_byte(reader)? else {
                return Err(TarError::PaxMalformed(
                    "record ended before '='".to_string(),
                ));
            };
            consumed += 1;
            if byte == b'=' {
                break;
            }
            keyword_bytes.push(byte);
        }
        let keyword = String::from_utf8_lossy(&keyword_bytes).into_owned();

        let rest = length.checked_sub(consumed).ok_or_else(|| {
            TarError::PaxMalformed(format!("record length {} too short", length))
        })?;
        if rest == 0 {
            return Err(TarError::PaxMalformed(format!(
                "record length {} leaves no room for the newline",
                length
            )));
        }

        if rest == 1 {
            // only the trailing newline: delete the keyword
            match read_byte(reader)? {
                Some(b'\n') => {}
                _ => {
                    return Err(TarError::PaxMalformed(
                        "record not terminated by newline".to_string(),
                    ))
                }
            }
            headers.remove(&keyword);
            continue;
        }

        let mut rest_bytes = vec![0u8; rest as usize];
        read_exact(reader, &mut rest_bytes)?;
        let value = String::from_utf8_lossy(&rest_bytes[..rest_bytes.len() - 1]).into_owned();

        match keyword.as_str() {
            SPARSE_OFFSET_KEY => {
                // a previous offset without numbytes flushes as a
                // zero-length span
                if let Some(offset) = pending_offset.take() {
                    sparse_spans.push(SparseSpan { offset, length: 0 });
                }
                pending_offset = Some(value.parse().map_err(|_| {
                    TarError::PaxMalformed(format!("invalid sparse offset: {}", value))
                })?);
            }
            SPARSE_NUMBYTES_KEY => {
                let offset = pending_offset.take().ok_or_else(|| {
                    TarError::PaxMalformed(format!(
                        "{} without a preceding {}",
                        SPARSE_NUMBYTES_KEY, SPARSE_OFFSET_KEY
                    ))
                })?;
                let numbytes = value.parse().map_err(|_| {
                    TarError::PaxMalformed(format!("invalid sparse length: {}", value))
                })?;
                sparse_spans.push(SparseSpan {
                    offset,
                    length: numbytes,
                });
            }
            _ => {}
        }

        headers.insert(keyword, value);
    }

    if let Some(offset) = pending_offset {
        sparse_spans.push(SparseSpan { offset, length: 0 });
    }

    Ok(headers)
}
