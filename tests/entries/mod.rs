//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the tarstream project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Entry iteration, framing and header decoding tests

use crate::common::*;
use std::io::Read;
use tarstream::{EntryType, TarError, TarReader};

#[test]
fn test_two_entries_and_block_alignment() {
    let mut archive = Vec::new();
    archive.extend_from_slice(&ustar_header("a.txt", 5, b'0'));
    push_data(&mut archive, b"hello");
    archive.extend_from_slice(&ustar_header("b/", 0, b'5'));
    finish(&mut archive);

    let mut r = reader(archive);

    let entry = r.next_entry().unwrap().unwrap();
    assert_eq!(entry.name, "a.txt");
    assert_eq!(entry.size, 5);
    assert_eq!(entry.real_size(), 5);
    assert_eq!(entry.entry_type, EntryType::Regular);
    assert_eq!(entry.uid, Some(TEST_UID));
    assert_eq!(r.available(), 5);
    assert_eq!(read_all(&mut r).unwrap(), b"hello");
    assert_eq!(r.available(), 0);

    let entry = r.next_entry().unwrap().unwrap();
    assert_eq!(entry.name, "b/");
    assert!(entry.is_directory());
    assert_eq!(r.available(), 0);
    assert_eq!(read_all(&mut r).unwrap(), b"");

    assert!(r.next_entry().unwrap().is_none());
    assert!(r.current_entry().is_none());
    // EOF latches
    assert!(r.next_entry().unwrap().is_none());
    // everything consumed, down to the block-padded tail
    assert_eq!(r.bytes_read() % BLOCK_SIZE as u64, 0);
}

#[test]
fn test_read_impl_matches_real_size() {
    let mut archive = Vec::new();
    archive.extend_from_slice(&ustar_header("data.bin", 700, b'0'));
    push_data(&mut archive, &vec![0x5au8; 700]);
    finish(&mut archive);

    let mut r = reader(archive);
    let entry = r.next_entry().unwrap().unwrap();
    let real_size = entry.real_size();
    let mut contents = Vec::new();
    r.read_to_end(&mut contents).unwrap();
    assert_eq!(contents.len() as u64, real_size);
    assert!(contents.iter().all(|&b| b == 0x5a));
}

#[test]
fn test_gnu_long_name() {
    let long_name: String = std::iter::repeat('d').take(150).collect::<String>() + "/file.txt";
    assert!(long_name.len() > 100);

    let mut name_data = long_name.clone().into_bytes();
    name_data.push(0);

    let mut archive = Vec::new();
    archive.extend_from_slice(&gnu_header("././@LongLink", name_data.len() as u64, b'L'));
    push_data(&mut archive, &name_data);
    archive.extend_from_slice(&ustar_header("truncated-name", 3, b'0'));
    push_data(&mut archive, b"abc");
    finish(&mut archive);

    let mut r = reader(archive);
    let entry = r.next_entry().unwrap().unwrap();
    assert_eq!(entry.name, long_name);
    assert_eq!(entry.entry_type, EntryType::Regular);
    assert_eq!(read_all(&mut r).unwrap(), b"abc");
    assert!(r.next_entry().unwrap().is_none());
}

#[test]
fn test_gnu_long_name_directory_gets_slash() {
    let long_name: String = std::iter::repeat('d').take(120).collect();

    let mut name_data = long_name.clone().into_bytes();
    name_data.push(0);

    let mut archive = Vec::new();
    archive.extend_from_slice(&gnu_header("././@LongLink", name_data.len() as u64, b'L'));
    push_data(&mut archive, &name_data);
    archive.extend_from_slice(&ustar_header("truncated-name/", 0, b'5'));
    finish(&mut archive);

    let mut r = reader(archive);
    let entry = r.next_entry().unwrap().unwrap();
    assert_eq!(entry.name, format!("{}/", long_name));
    assert!(entry.is_directory());
}

#[test]
fn test_gnu_long_link() {
    let long_target: String = std::iter::repeat('t').take(140).collect();

    let mut link_data = long_target.clone().into_bytes();
    link_data.push(0);

    let mut archive = Vec::new();
    archive.extend_from_slice(&gnu_header("././@LongLink", link_data.len() as u64, b'K'));
    push_data(&mut archive, &link_data);
    archive.extend_from_slice(&ustar_header("link", 0, b'2'));
    finish(&mut archive);

    let mut r = reader(archive);
    let entry = r.next_entry().unwrap().unwrap();
    assert_eq!(entry.name, "link");
    assert_eq!(entry.entry_type, EntryType::Symlink);
    assert_eq!(entry.link_name, long_target);
}

#[test]
fn test_long_name_at_eof_is_end_of_archive() {
    let mut archive = Vec::new();
    archive.extend_from_slice(&gnu_header("././@LongLink", 10, b'L'));
    push_data(&mut archive, b"orphaned\0\0");
    finish(&mut archive);

    let mut r = reader(archive);
    assert!(r.next_entry().unwrap().is_none());
}

#[test]
fn test_bad_magic_is_header_malformed() {
    let mut header = ustar_header("a.txt", 0, b'0');
    header[MAGIC_OFF..MAGIC_OFF + 6].copy_from_slice(b"bogus\0");
    finalize_checksum(&mut header);

    let mut archive = Vec::new();
    archive.extend_from_slice(&header);
    finish(&mut archive);

    let mut r = reader(archive);
    let err = r.next_entry().unwrap_err();
    assert!(matches!(err, TarError::HeaderMalformed(_)));
    // errors do not latch: the cursor can look at the next record
    assert!(r.next_entry().unwrap().is_none());
}

#[test]
fn test_bad_checksum_is_header_malformed() {
    let mut header = ustar_header("a.txt", 0, b'0');
    write_octal(&mut header[CHKSUM_OFF..], 0o1234, 8);

    let mut archive = Vec::new();
    archive.extend_from_slice(&header);
    finish(&mut archive);

    let err = reader(archive).next_entry().unwrap_err();
    assert!(matches!(err, TarError::HeaderMalformed(_)));
}

#[test]
fn test_lenient_mode_decays_bad_uid() {
    let mut header = ustar_header("a.txt", 0, b'0');
    header[UID_OFF..UID_OFF + 8].copy_from_slice(b"zzzzzzz\0");
    finalize_checksum(&mut header);

    let mut strict_archive = Vec::new();
    strict_archive.extend_from_slice(&header);
    finish(&mut strict_archive);
    let lenient_archive = strict_archive.clone();

    let err = reader(strict_archive).next_entry().unwrap_err();
    assert!(matches!(err, TarError::HeaderMalformed(_)));

    let mut r = TarReader::<std::io::Cursor<Vec<u8>>>::builder()
        .lenient(true)
        .build(std::io::Cursor::new(lenient_archive));
    let entry = r.next_entry().unwrap().unwrap();
    assert_eq!(entry.uid, None);
    assert_eq!(entry.gid, Some(TEST_UID));
}

#[test]
fn test_base256_size_field() {
    let mut header = ustar_header("big", 0, b'0');
    header[SIZE_OFF..SIZE_OFF + 12].fill(0);
    header[SIZE_OFF] = 0x80;
    header[SIZE_OFF + 10] = 1; // 256
    header[SIZE_OFF + 11] = 4; // + 4
    finalize_checksum(&mut header);

    let mut archive = Vec::new();
    archive.extend_from_slice(&header);
    push_data(&mut archive, &vec![0x7fu8; 260]);
    finish(&mut archive);

    let mut r = reader(archive);
    let entry = r.next_entry().unwrap().unwrap();
    assert_eq!(entry.size, 260);
    assert_eq!(read_all(&mut r).unwrap().len(), 260);
}

#[test]
fn test_truncated_payload() {
    let mut archive = Vec::new();
    archive.extend_from_slice(&ustar_header("a.txt", 100, b'0'));
    archive.extend_from_slice(b"only ten b");
    // no padding, no terminator: the source just stops

    let mut r = reader(archive);
    r.next_entry().unwrap().unwrap();
    let mut contents = Vec::new();
    let mut buf = [0u8; 32];
    let err = loop {
        match r.read_data(&mut buf) {
            Ok(n) => contents.extend_from_slice(&buf[..n]),
            Err(e) => break e,
        }
    };
    assert!(matches!(err, TarError::Truncated(_)));
    assert_eq!(contents, b"only ten b");
}

#[test]
fn test_skip_then_read_matches_read_discarding() {
    let mut archive = Vec::new();
    archive.extend_from_slice(&ustar_header("a.txt", 11, b'0'));
    push_data(&mut archive, b"hello world");
    finish(&mut archive);

    let mut skipping = reader(archive.clone());
    skipping.next_entry().unwrap().unwrap();
    assert_eq!(skipping.skip(6).unwrap(), 6);
    let suffix = read_all(&mut skipping).unwrap();

    let mut straight = reader(archive);
    straight.next_entry().unwrap().unwrap();
    let all = read_all(&mut straight).unwrap();

    assert_eq!(suffix, &all[6..]);
    assert_eq!(suffix, b"world");
}

#[test]
fn test_skip_clamps_to_remaining() {
    let mut archive = Vec::new();
    archive.extend_from_slice(&ustar_header("a.txt", 5, b'0'));
    push_data(&mut archive, b"hello");
    finish(&mut archive);

    let mut r = reader(archive);
    r.next_entry().unwrap().unwrap();
    assert_eq!(r.skip(1000).unwrap(), 5);
    assert_eq!(r.skip(1).unwrap(), 0);
    assert!(r.next_entry().unwrap().is_none());
}

#[test]
fn test_available_never_exceeds_remaining() {
    let mut archive = Vec::new();
    archive.extend_from_slice(&ustar_header("a.txt", 300, b'0'));
    push_data(&mut archive, &vec![1u8; 300]);
    finish(&mut archive);

    let mut r = reader(archive);
    let entry = r.next_entry().unwrap().unwrap();
    let real_size = entry.real_size();
    let mut buf = [0u8; 64];
    let mut delivered = 0u64;
    loop {
        assert!(r.available() <= real_size - delivered);
        let n = r.read_data(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        delivered += n as u64;
    }
    assert_eq!(delivered, 300);
}

#[test]
fn test_unconsumed_entry_is_skipped_on_advance() {
    let mut archive = Vec::new();
    archive.extend_from_slice(&ustar_header("a.txt", 600, b'0'));
    push_data(&mut archive, &vec![9u8; 600]);
    archive.extend_from_slice(&ustar_header("b.txt", 2, b'0'));
    push_data(&mut archive, b"ok");
    finish(&mut archive);

    let mut r = reader(archive);
    r.next_entry().unwrap().unwrap();
    // read only part of a.txt, then advance
    let mut buf = [0u8; 10];
    r.read_data(&mut buf).unwrap();

    let entry = r.next_entry().unwrap().unwrap();
    assert_eq!(entry.name, "b.txt");
    assert_eq!(read_all(&mut r).unwrap(), b"ok");
}

#[test]
fn test_signature_matches_archive_bytes() {
    let mut archive = Vec::new();
    archive.extend_from_slice(&ustar_header("a.txt", 0, b'0'));
    finish(&mut archive);
    assert!(tarstream::matches(&archive));

    let gnu = gnu_header("a.txt", 0, b'0');
    assert!(tarstream::matches(&gnu));

    assert!(!tarstream::matches(&archive[..100]));
    assert!(!tarstream::matches(&[0x11u8; 512]));
}

#[test]
fn test_file_backed_source() {
    let mut archive = Vec::new();
    archive.extend_from_slice(&ustar_header("from-disk.txt", 9, b'0'));
    push_data(&mut archive, b"file data");
    finish(&mut archive);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.tar");
    std::fs::write(&path, &archive).unwrap();

    let mut r = TarReader::new(std::fs::File::open(&path).unwrap());
    let entry = r.next_entry().unwrap().unwrap();
    assert_eq!(entry.name, "from-disk.txt");
    assert_eq!(read_all(&mut r).unwrap(), b"file data");
    assert!(r.next_entry().unwrap().is_none());
}

#[test]
fn test_device_entry_fields() {
    let mut header = ustar_header("dev/sda", 0, b'4');
    write_octal(&mut header[329..], 8, 8);
    write_octal(&mut header[337..], 1, 8);
    finalize_checksum(&mut header);

    let mut archive = Vec::new();
    archive.extend_from_slice(&header);
    finish(&mut archive);

    let mut r = reader(archive);
    let entry = r.next_entry().unwrap().unwrap();
    assert_eq!(entry.entry_type, EntryType::BlockDevice);
    assert_eq!(entry.devmajor, Some(8));
    assert_eq!(entry.devminor, Some(1));
}

#[test]
fn test_hardlink_linkname() {
    let mut header = ustar_header("copy", 0, b'1');
    header[LINKNAME_OFF..LINKNAME_OFF + 8].copy_from_slice(b"original");
    finalize_checksum(&mut header);

    let mut archive = Vec::new();
    archive.extend_from_slice(&header);
    finish(&mut archive);

    let mut r = reader(archive);
    let entry = r.next_entry().unwrap().unwrap();
    assert_eq!(entry.entry_type, EntryType::Hardlink);
    assert_eq!(entry.link_name, "original");
}
