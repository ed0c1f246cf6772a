//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the tarstream project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Pluggable decoding of raw header byte fields into strings.
//!
//! Tar stores names, link targets and PAX values as raw bytes whose
//! character set the format does not pin down. The reader hands those
//! buffers (already truncated at the first NUL) to a [`TextDecoder`];
//! the default decoder treats them as UTF-8 and replaces invalid
//! sequences rather than failing.

use crate::error::TarResult;

/// Capability for decoding raw name/linkname/value bytes into strings.
///
/// Invalid sequences are the decoder's responsibility: a decoder that
/// chooses to substitute or strip them must return `Ok`, and the reader
/// will not second-guess it.
pub trait TextDecoder {
    /// Decode a raw byte field into a string.
    fn decode(&self, bytes: &[u8]) -> TarResult<String>;
}

/// Default decoder: UTF-8 with invalid sequences replaced by U+FFFD.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Decoder;

impl TextDecoder for Utf8Decoder {
    fn decode(&self, bytes: &[u8]) -> TarResult<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
