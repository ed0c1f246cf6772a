//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the tarstream project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Tar header decoding
//!
//! Header format (512 bytes):
//! - name:     100 bytes (offset 0)
//! - mode:       8 bytes (offset 100)
//! - uid:        8 bytes (offset 108)
//! - gid:        8 bytes (offset 116)
//! - size:      12 bytes (offset 124)
//! - mtime:     12 bytes (offset 136)
//! - chksum:     8 bytes (offset 148)
//! - typeflag:   1 byte  (offset 156)
//! - linkname: 100 bytes (offset 157)
//! - magic:      6 bytes (offset 257)
//! - version:    2 bytes (offset 263)
//! - uname:     32 bytes (offset 265)
//! - gname:     32 bytes (offset 297)
//! - devmajor:   8 bytes (offset 329)
//! - devminor:   8 bytes (offset 337)
//! - prefix:   155 bytes (offset 345, POSIX only)
//!
//! The old-GNU dialect reuses the prefix region for its sparse-file
//! extension:
//! - sparse structs: 4 x 24 bytes (offset 386)
//! - isextended:     1 byte       (offset 482)
//! - realsize:      12 bytes      (offset 483)
//!
//! Numeric fields are octal ASCII with optional leading spaces and a
//! trailing space/NUL; a set high bit in the first byte selects the
//! GNU base-256 encoding (big-endian two's complement) used for values
//! that do not fit the octal field width.

use crate::decode::TextDecoder;
use crate::entry::{Entry, EntryType};
use crate::error::{TarError, TarResult};
use crate::sparse;

const NAME_LEN: usize = 100;
const PREFIX_LEN: usize = 155;
const LINKNAME_LEN: usize = 100;
const UNAME_LEN: usize = 32;
const GNAME_LEN: usize = 32;
const MAGIC_LEN: usize = 6;
const VERSION_LEN: usize = 2;

// Header field offsets
const NAME_OFF: usize = 0;
const MODE_OFF: usize = 100;
const UID_OFF: usize = 108;
const GID_OFF: usize = 116;
const SIZE_OFF: usize = 124;
const MTIME_OFF: usize = 136;
const CHKSUM_OFF: usize = 148;
const TYPEFLAG_OFF: usize = 156;
const LINKNAME_OFF: usize = 157;
const MAGIC_OFF: usize = 257;
const VERSION_OFF: usize = 263;
const UNAME_OFF: usize = 265;
const GNAME_OFF: usize = 297;
const DEVMAJOR_OFF: usize = 329;
const DEVMINOR_OFF: usize = 337;
const PREFIX_OFF: usize = 345;

// Old-GNU sparse extension region
const GNU_SPARSE_OFF: usize = 386;
const GNU_SPARSE_IN_HEADER: usize = 4;
const GNU_ISEXTENDED_OFF: usize = 482;
const GNU_REALSIZE_OFF: usize = 483;
const GNU_REALSIZE_LEN: usize = 12;

// Type flags
const REGTYPE: u8 = b'0';
const AREGTYPE: u8 = b'\0';
const LNKTYPE: u8 = b'1';
const SYMTYPE: u8 = b'2';
const CHRTYPE: u8 = b'3';
const BLKTYPE: u8 = b'4';
const DIRTYPE: u8 = b'5';
const FIFOTYPE: u8 = b'6';
const CONTTYPE: u8 = b'7';
const GNUTYPE_LONGLINK: u8 = b'K';
const GNUTYPE_LONGNAME: u8 = b'L';
const GNUTYPE_SPARSE: u8 = b'S';
const XHDRTYPE: u8 = b'x';
const XHDRTYPE_UC: u8 = b'X';
const XGLTYPE: u8 = b'g';

// Magic/version pairs of the recognized dialects
const MAGIC_POSIX: &[u8; 6] = b"ustar\0";
const VERSION_POSIX: &[u8; 2] = b"00";
const MAGIC_GNU: &[u8; 6] = b"ustar ";
const VERSION_GNU_SPACE: &[u8; 2] = b" \0";
const VERSION_GNU_ZERO: &[u8; 2] = b"0\0";
const VERSION_ANT: &[u8; 2] = b"\0\0";

/// Header dialect, as identified by the magic/version bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    /// POSIX ustar
    Posix,
    /// GNU tar
    Gnu,
    /// Ant's tar writer (POSIX magic, NUL version)
    Ant,
}

fn classify(record: &[u8]) -> Option<Dialect> {
    let magic = &record[MAGIC_OFF..MAGIC_OFF + MAGIC_LEN];
    let version = &record[VERSION_OFF..VERSION_OFF + VERSION_LEN];
    if magic == MAGIC_POSIX && version == VERSION_POSIX {
        Some(Dialect::Posix)
    } else if magic == MAGIC_GNU
        && (version == VERSION_GNU_SPACE || version == VERSION_GNU_ZERO)
    {
        Some(Dialect::Gnu)
    } else if magic == MAGIC_POSIX && version == VERSION_ANT {
        Some(Dialect::Ant)
    } else {
        None
    }
}

/// Check if the signature bytes look like the start of a tar archive.
///
/// Recognizes the POSIX, GNU and Ant magic/version pairs. Meant for
/// format sniffing; slices too short to hold the version field never
/// match.
pub fn matches(signature: &[u8]) -> bool {
    if signature.len() < VERSION_OFF + VERSION_LEN {
        return false;
    }
    classify(signature).is_some()
}

/// Truncate a field at its first NUL byte
fn truncate_at_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// Parse an octal field: optional leading spaces, octal digits,
/// trailing space/NUL padding. An all-blank field is zero.
fn parse_octal(bytes: &[u8]) -> TarResult<i64> {
    let s = String::from_utf8_lossy(truncate_at_nul(bytes));
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }
    if s.starts_with('+') || s.starts_with('-') {
        return Err(TarError::HeaderMalformed(format!("invalid octal: {}", s)));
    }
    let val = u64::from_str_radix(s, 8)
        .map_err(|_| TarError::HeaderMalformed(format!("invalid octal: {}", s)))?;
    i64::try_from(val)
        .map_err(|_| TarError::HeaderMalformed(format!("octal out of range: {}", s)))
}

/// Parse a base-256 field: big-endian two's complement with the
/// marker bit cleared in the leading byte.
fn parse_base256(bytes: &[u8]) -> TarResult<i64> {
    let negative = bytes[0] & 0x40 != 0;
    let mut val: i64 = if negative { -1 } else { 0 };
    val = (val << 6) | (bytes[0] & 0x3f) as i64;
    for &b in &bytes[1..] {
        if val > (i64::MAX >> 8) || val < (i64::MIN >> 8) {
            return Err(TarError::HeaderMalformed(
                "base-256 value out of range".to_string(),
            ));
        }
        val = (val << 8) | b as i64;
    }
    Ok(val)
}

/// Parse a numeric header field, octal or base-256
pub(crate) fn parse_numeric(bytes: &[u8]) -> TarResult<i64> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes[0] & 0x80 != 0 {
        parse_base256(bytes)
    } else {
        parse_octal(bytes)
    }
}

/// Parse a numeric field that may decay to the unknown sentinel.
///
/// In lenient mode, parse failures and out-of-range values yield
/// `None`; otherwise they are decode errors.
fn parse_decayable<T: TryFrom<i64>>(
    bytes: &[u8],
    lenient: bool,
    what: &str,
) -> TarResult<Option<T>> {
    match parse_numeric(bytes) {
        Ok(v) => match T::try_from(v) {
            Ok(v) => Ok(Some(v)),
            Err(_) if lenient => Ok(None),
            Err(_) => Err(TarError::HeaderMalformed(format!(
                "{} out of range",
                what
            ))),
        },
        Err(_) if lenient => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_typeflag(flag: u8) -> EntryType {
    match flag {
        REGTYPE | AREGTYPE | CONTTYPE => EntryType::Regular,
        LNKTYPE => EntryType::Hardlink,
        SYMTYPE => EntryType::Symlink,
        CHRTYPE => EntryType::CharDevice,
        BLKTYPE => EntryType::BlockDevice,
        DIRTYPE => EntryType::Directory,
        FIFOTYPE => EntryType::Fifo,
        GNUTYPE_LONGNAME => EntryType::LongName,
        GNUTYPE_LONGLINK => EntryType::LongLink,
        GNUTYPE_SPARSE => EntryType::OldGnuSparse,
        XHDRTYPE | XHDRTYPE_UC => EntryType::PaxLocal,
        XGLTYPE => EntryType::PaxGlobal,
        other => EntryType::Other(other),
    }
}

/// Calculate the header checksum with the checksum field itself taken
/// as spaces. Returns the unsigned and the signed-byte sum; historical
/// writers produced either.
fn calculate_checksums(header: &[u8]) -> (i64, i64) {
    let mut unsigned: i64 = 0;
    let mut signed: i64 = 0;
    for (i, &byte) in header.iter().enumerate() {
        let byte = if (CHKSUM_OFF..CHKSUM_OFF + 8).contains(&i) {
            b' '
        } else {
            byte
        };
        unsigned += byte as i64;
        signed += (byte as i8) as i64;
    }
    (unsigned, signed)
}

fn verify_checksum(header: &[u8]) -> bool {
    let stored = match parse_numeric(&header[CHKSUM_OFF..CHKSUM_OFF + 8]) {
        Ok(v) => v,
        Err(_) => return false,
    };
    let (unsigned, signed) = calculate_checksums(header);
    stored == unsigned || stored == signed
}

/// Decode a raw header record into an [`Entry`].
///
/// Fails with `HeaderMalformed` when the magic/version bytes match no
/// known dialect, the checksum does not verify, or (in strict mode) a
/// numeric field is out of range.
pub(crate) fn decode(
    record: &[u8],
    decoder: &dyn TextDecoder,
    lenient: bool,
) -> TarResult<Entry> {
    let dialect = classify(record).ok_or_else(|| {
        TarError::HeaderMalformed("unrecognized magic/version".to_string())
    })?;
    if !verify_checksum(record) {
        return Err(TarError::HeaderMalformed("checksum mismatch".to_string()));
    }

    let mut name = decoder.decode(truncate_at_nul(&record[NAME_OFF..NAME_OFF + NAME_LEN]))?;
    if dialect == Dialect::Posix {
        let prefix_raw = truncate_at_nul(&record[PREFIX_OFF..PREFIX_OFF + PREFIX_LEN]);
        if !prefix_raw.is_empty() {
            let prefix = decoder.decode(prefix_raw)?;
            name = format!("{}/{}", prefix, name);
        }
    }

    let size = parse_numeric(&record[SIZE_OFF..SIZE_OFF + 12])?;
    if size < 0 {
        return Err(TarError::HeaderMalformed(format!(
            "negative entry size: {}",
            size
        )));
    }

    let typeflag = record[TYPEFLAG_OFF];
    let mut entry_type = parse_typeflag(typeflag);
    // pre-POSIX writers marked directories with a trailing slash only
    if entry_type == EntryType::Regular && name.ends_with('/') {
        entry_type = EntryType::Directory;
    }
    if entry_type == EntryType::Directory && !name.ends_with('/') {
        name.push('/');
    }

    let link_name =
        decoder.decode(truncate_at_nul(&record[LINKNAME_OFF..LINKNAME_OFF + LINKNAME_LEN]))?;

    let uname = parse_string(&record[UNAME_OFF..UNAME_OFF + UNAME_LEN]);
    let gname = parse_string(&record[GNAME_OFF..GNAME_OFF + GNAME_LEN]);

    let mut entry = Entry {
        name,
        link_name,
        size: size as u64,
        entry_type,
        mode: parse_decayable(&record[MODE_OFF..MODE_OFF + 8], lenient, "mode")?,
        uid: parse_decayable(&record[UID_OFF..UID_OFF + 8], lenient, "uid")?,
        gid: parse_decayable(&record[GID_OFF..GID_OFF + 8], lenient, "gid")?,
        mtime: parse_decayable(&record[MTIME_OFF..MTIME_OFF + 12], lenient, "mtime")?,
        devmajor: parse_decayable(&record[DEVMAJOR_OFF..DEVMAJOR_OFF + 8], lenient, "devmajor")?,
        devminor: parse_decayable(&record[DEVMINOR_OFF..DEVMINOR_OFF + 8], lenient, "devminor")?,
        uname: if uname.is_empty() { None } else { Some(uname) },
        gname: if gname.is_empty() { None } else { Some(gname) },
        ..Default::default()
    };

    if dialect == Dialect::Gnu && entry.entry_type == EntryType::OldGnuSparse {
        entry.sparse_spans = sparse::parse_sparse_structs(
            &record[GNU_SPARSE_OFF..GNU_ISEXTENDED_OFF],
            GNU_SPARSE_IN_HEADER,
        )?;
        entry.is_extended = record[GNU_ISEXTENDED_OFF] != 0;
        let real_size = parse_numeric(
            &record[GNU_REALSIZE_OFF..GNU_REALSIZE_OFF + GNU_REALSIZE_LEN],
        )?;
        entry.real_size = Some(real_size.max(0) as u64);
    }

    Ok(entry)
}

/// Parse a NUL-terminated or space-padded string field
fn parse_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(truncate_at_nul(bytes))
        .trim_end()
        .to_string()
}
