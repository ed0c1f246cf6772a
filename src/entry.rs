//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the tarstream project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use crate::error::{TarError, TarResult};
use crate::sparse::SparseSpan;
use std::collections::HashMap;

/// Type of archive entry, as identified by the header typeflag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryType {
    /// Regular file
    #[default]
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Hard link to another file
    Hardlink,
    /// Character device
    CharDevice,
    /// Block device
    BlockDevice,
    /// FIFO (named pipe)
    Fifo,
    /// GNU long-name pseudo-entry; payload names the next real entry
    LongName,
    /// GNU long-link pseudo-entry; payload is the next entry's link target
    LongLink,
    /// Old-GNU sparse file
    OldGnuSparse,
    /// PAX per-file extended header pseudo-entry
    PaxLocal,
    /// PAX global extended header pseudo-entry
    PaxGlobal,
    /// Unrecognized typeflag
    Other(u8),
}

/// Metadata for one archive member.
///
/// Produced by the header decoder and refined by long-name/long-link
/// stitching, PAX header application and sparse map resolution. Numeric
/// fields are `None` when a lenient decode decayed an out-of-range
/// value to the unknown sentinel.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    /// Member name; ends in `/` for directories
    pub name: String,
    /// Link target for symlinks and hard links, empty otherwise
    pub link_name: String,
    /// Declared on-disk byte count of the payload following the header
    pub size: u64,
    /// Type of entry
    pub entry_type: EntryType,
    /// File mode (permissions)
    pub mode: Option<u32>,
    /// User ID
    pub uid: Option<u64>,
    /// Group ID
    pub gid: Option<u64>,
    /// Modification time (seconds since epoch)
    pub mtime: Option<i64>,
    /// Access time (seconds since epoch, PAX)
    pub atime: Option<i64>,
    /// Status change time (seconds since epoch, PAX)
    pub ctime: Option<i64>,
    /// User name
    pub uname: Option<String>,
    /// Group name
    pub gname: Option<String>,
    /// Device major number (for block/char devices)
    pub devmajor: Option<u32>,
    /// Device minor number (for block/char devices)
    pub devminor: Option<u32>,
    /// Old-GNU flag: sparse continuation records follow the header
    pub is_extended: bool,
    /// Logical dense size, when it differs from `size` (sparse entries)
    pub(crate) real_size: Option<u64>,
    /// Sparse spans; raw while stitching, canonical once resolved
    pub(crate) sparse_spans: Vec<SparseSpan>,
    /// Entry is sparse in one of the PAX GNU dialects (0.0/0.1/1.x)
    pub(crate) pax_gnu_sparse: bool,
    /// Entry is sparse in the PAX GNU 1.x dialect: the sparse map
    /// precedes the data in the payload itself
    pub(crate) pax_gnu_1x_sparse: bool,
}

impl Entry {
    /// Logical dense size of the payload; equals `size` unless the
    /// entry is sparse.
    pub fn real_size(&self) -> u64 {
        self.real_size.unwrap_or(self.size)
    }

    /// Canonical sparse spans: non-overlapping, sorted by offset.
    /// Empty for non-sparse entries.
    pub fn sparse_spans(&self) -> &[SparseSpan] {
        &self.sparse_spans
    }

    /// Check if this is a directory
    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    /// Check if this is a GNU long-name pseudo-entry
    pub fn is_long_name(&self) -> bool {
        self.entry_type == EntryType::LongName
    }

    /// Check if this is a GNU long-link pseudo-entry
    pub fn is_long_link(&self) -> bool {
        self.entry_type == EntryType::LongLink
    }

    /// Check if this is an old-GNU sparse entry
    pub fn is_old_gnu_sparse(&self) -> bool {
        self.entry_type == EntryType::OldGnuSparse
    }

    /// Check if this is a PAX per-file extended header
    pub fn is_pax_local(&self) -> bool {
        self.entry_type == EntryType::PaxLocal
    }

    /// Check if this is a PAX global extended header
    pub fn is_pax_global(&self) -> bool {
        self.entry_type == EntryType::PaxGlobal
    }

    /// Check if this entry carries its sparse map in the payload
    /// (PAX GNU 1.x)
    pub fn is_pax_gnu_1x_sparse(&self) -> bool {
        self.pax_gnu_1x_sparse
    }

    /// Check if this entry is sparse in any supported dialect
    pub fn is_sparse(&self) -> bool {
        self.is_old_gnu_sparse() || self.pax_gnu_sparse
    }

    /// Apply a merged PAX keyword map to this entry, overriding the
    /// fields the keywords name.
    ///
    /// `GNU.sparse.*` size/version keywords mark the entry sparse and
    /// record the dense size; the map itself (PAX 0.x side channels,
    /// 1.x in-payload map) is resolved by the caller.
    pub(crate) fn apply_pax_headers(
        &mut self,
        headers: &HashMap<String, String>,
    ) -> TarResult<()> {
        for (keyword, value) in headers {
            match keyword.as_str() {
                "path" => self.name = value.clone(),
                "linkpath" => self.link_name = value.clone(),
                "size" => self.size = parse_pax_number(keyword, value)?,
                "uid" => self.uid = Some(parse_pax_number(keyword, value)?),
                "gid" => self.gid = Some(parse_pax_number(keyword, value)?),
                "mtime" => self.mtime = Some(parse_pax_time(keyword, value)?),
                "atime" => self.atime = Some(parse_pax_time(keyword, value)?),
                "ctime" => self.ctime = Some(parse_pax_time(keyword, value)?),
                "uname" => self.uname = Some(value.clone()),
                "gname" => self.gname = Some(value.clone()),
                "SCHILY.devmajor" => {
                    self.devmajor = Some(parse_pax_number(keyword, value)?)
                }
                "SCHILY.devminor" => {
                    self.devminor = Some(parse_pax_number(keyword, value)?)
                }
                "GNU.sparse.size" => {
                    self.real_size = Some(parse_pax_number(keyword, value)?);
                    self.pax_gnu_sparse = true;
                }
                "GNU.sparse.realsize" => {
                    self.real_size = Some(parse_pax_number(keyword, value)?);
                    self.pax_gnu_sparse = true;
                    self.pax_gnu_1x_sparse = true;
                }
                "GNU.sparse.major" => {
                    let major: u64 = parse_pax_number(keyword, value)?;
                    self.pax_gnu_sparse = true;
                    if major >= 1 {
                        self.pax_gnu_1x_sparse = true;
                    }
                }
                "GNU.sparse.minor" => {
                    let _: u64 = parse_pax_number(keyword, value)?;
                    self.pax_gnu_sparse = true;
                }
                "GNU.sparse.numblocks" => {
                    let _: u64 = parse_pax_number(keyword, value)?;
                    self.pax_gnu_sparse = true;
                }
                // span keywords are collected by the PAX parser's side
                // channel; the name override is applied below so it
                // cannot lose to a plain `path` in map order
                "GNU.sparse.offset" | "GNU.sparse.numbytes" | "GNU.sparse.map"
                | "GNU.sparse.name" => {}
                _ => {}
            }
        }

        if let Some(name) = headers.get("GNU.sparse.name") {
            self.name = name.clone();
        }

        Ok(())
    }
}

fn parse_pax_number<T: std::str::FromStr>(keyword: &str, value: &str) -> TarResult<T> {
    value.parse().map_err(|_| {
        TarError::PaxMalformed(format!("invalid {} value: {}", keyword, value))
    })
}

/// Parse a PAX time value (decimal seconds with optional fractional
/// part); fractional seconds are truncated.
fn parse_pax_time(keyword: &str, value: &str) -> TarResult<i64> {
    let seconds: f64 = value.parse().map_err(|_| {
        TarError::PaxMalformed(format!("invalid {} value: {}", keyword, value))
    })?;
    Ok(seconds as i64)
}
