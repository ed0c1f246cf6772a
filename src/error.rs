//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the tarstream project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use std::fmt;
use std::io;

/// Error type for tar stream operations
#[derive(Debug)]
pub enum TarError {
    /// I/O error
    Io(io::Error),
    /// Archive ended mid-record, mid-payload or mid-header
    Truncated(String),
    /// Magic/version/checksum mismatch or invalid numeric header field
    HeaderMalformed(String),
    /// Malformed PAX extended header record
    PaxMalformed(String),
    /// Malformed sparse map
    SparseMalformed(String),
    /// Operation invoked in the wrong cursor state
    State(String),
}

impl fmt::Display for TarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TarError::Io(e) => write!(f, "I/O error: {}", e),
            TarError::Truncated(msg) => write!(f, "Truncated tar archive: {}", msg),
            TarError::HeaderMalformed(msg) => write!(f, "Invalid header: {}", msg),
            TarError::PaxMalformed(msg) => write!(f, "Invalid PAX header: {}", msg),
            TarError::SparseMalformed(msg) => write!(f, "Invalid sparse map: {}", msg),
            TarError::State(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for TarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TarError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TarError {
    fn from(err: io::Error) -> Self {
        // Recover a TarError that crossed the `io::Error` boundary of the
        // `Read` impl, so the original kind survives the round trip.
        match err.downcast::<TarError>() {
            Ok(inner) => inner,
            Err(err) => TarError::Io(err),
        }
    }
}

impl From<TarError> for io::Error {
    fn from(err: TarError) -> Self {
        match err {
            TarError::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

/// Result type for tar stream operations
pub type TarResult<T> = Result<T, TarError>;
