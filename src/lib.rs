//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the tarstream project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Streaming reader for UNIX tar archives
//!
//! `tarstream` walks a forward-only byte source entry by entry,
//! without seeking and without buffering whole payloads. It handles
//! the POSIX ustar, old-GNU and PAX dialects, including:
//!
//! - GNU long-name and long-link pseudo-entries (typeflags `L`/`K`)
//! - PAX extended headers, local (`x`) and global (`g`), with
//!   global-header inheritance and empty-value keyword deletion
//! - sparse files in the old-GNU, PAX 0.0, PAX 0.1 and PAX 1.x
//!   dialects, reconstructed transparently on read
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//! use tarstream::TarReader;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut reader = TarReader::new(File::open("archive.tar")?);
//!     while let Some(entry) = reader.next_entry()? {
//!         println!("{} ({} bytes)", entry.name, entry.real_size());
//!         let mut contents = Vec::new();
//!         reader.read_to_end(&mut contents)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Decompression is out of scope: wrap the source in a decoder first
//! when the archive is compressed. Writing archives is likewise not
//! provided.

mod decode;
mod entry;
mod error;
mod header;
mod pax;
mod reader;
mod record;
mod sparse;

pub use decode::{TextDecoder, Utf8Decoder};
pub use entry::{Entry, EntryType};
pub use error::{TarError, TarResult};
pub use header::matches;
pub use reader::{TarReader, TarReaderBuilder};
pub use record::{DEFAULT_BLOCKING_FACTOR, DEFAULT_BLOCK_SIZE, DEFAULT_RECORD_SIZE};
pub use sparse::SparseSpan;
