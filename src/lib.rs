/*
   Zip file reader and writer, in pure Rust.
   Copyright (C) 2022 Matheus Xavier <mxavier@neonimp.com>

   This program is free software: you can redistribute it and/or modify
   it under the terms of the GNU Lesser General Public License as published by
   the Free Software Foundation, either version 3 of the License, or
   (at your option) any later version.

   This program is distributed in the hope that it will be useful,
   but WITHOUT ANY WARRANTY; without even the implied warranty of
   MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
   GNU General Public License for more details.

   You should have received a copy of the GNU Lesser General Public License
   along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! In-memory ZIP archive codec.
//!
//! [`ZipReader`] parses a complete archive buffer (EOCD, central directory,
//! local headers) and extracts members on demand, verifying their CRC-32.
//! [`ZipWriter`] appends members one at a time and emits the central
//! directory and end of central directory record on [`ZipWriter::finalize`].
//!
//! ```no_run
//! use memzip::{FileOptions, ZipReader, ZipWriter};
//!
//! # fn main() -> memzip::Result<()> {
//! let mut writer = ZipWriter::new();
//! writer.add_file("a.txt", b"hi", FileOptions::default())?;
//! writer.add_directory("d")?;
//! let bytes = writer.finalize()?;
//!
//! let reader = ZipReader::new(bytes)?;
//! for entry in reader.entries() {
//!     let data = reader.read_entry(entry)?;
//!     println!("{}: {} bytes", entry.file_name, data.len());
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod codecs;
pub mod compression_codecs;
pub mod crc32;
pub mod reader;
pub mod structures;
pub mod writer;

pub use reader::{ArchiveEntry, ReaderOptions, ZipReader};
pub use structures::{CompressionMethod, DosDateTime};
pub use writer::{FileOptions, WriterOptions, ZipWriter};

pub const EOCD_SIG: u32 = 0x06054b50;
pub const CD_SIG: u32 = 0x02014b50;
pub const LFH_SIG: u32 = 0x04034b50;

/// Fixed part of a local file header, in bytes.
pub const LFH_SIZE: usize = 30;
/// Fixed part of a central directory record, in bytes.
pub const CD_SIZE: usize = 46;
/// End of central directory record without its comment, in bytes.
pub const EOCD_SIZE: usize = 22;
/// Largest comment the EOCD can declare, which bounds the backward scan.
pub const MAX_COMMENT_SIZE: usize = u16::MAX as usize;

/// General purpose flag bit 11: file name is UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;
pub const VERSION_NEEDED: u16 = 20;
pub const VERSION_MADE_BY: u16 = 20;
/// MS-DOS directory attribute, stored in the external attributes.
pub const DIR_ATTRIBUTE: u32 = 0x10;

#[derive(Debug, Error)]
pub enum ZipError {
    #[error("IO exception: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid archive: {reason} at offset {offset}")]
    InvalidArchive { reason: &'static str, offset: u64 },
    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u16),
    #[error("CRC-32 mismatch for \"{name}\": expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },
    #[error("Codec failure: {0}")]
    CodecError(std::io::Error),
    #[error("Invalid compression level: {0}")]
    InvalidCompressionLevel(i32),
    #[error("Archive has already been finalized")]
    WriterFinalized,
    #[error("{0} exceeds the limits of a non-ZIP64 archive")]
    LimitExceeded(&'static str),
}

impl ZipError {
    pub(crate) fn invalid(reason: &'static str, offset: usize) -> Self {
        ZipError::InvalidArchive {
            reason,
            offset: offset as u64,
        }
    }

    /// Stable numeric code for each kind of error.
    pub fn error_code(&self) -> u32 {
        match self {
            ZipError::IOError(_) => 0x01,
            ZipError::InvalidArchive { .. } => 0x10,
            ZipError::UnsupportedCompression(_) => 0x11,
            ZipError::ChecksumMismatch { .. } => 0x12,
            ZipError::CodecError(_) => 0x20,
            ZipError::InvalidCompressionLevel(_) => 0x21,
            ZipError::WriterFinalized => 0x30,
            ZipError::LimitExceeded(_) => 0x31,
        }
    }
}

impl PartialEq for ZipError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ZipError::IOError(a), ZipError::IOError(b)) => a.kind() == b.kind(),
            (ZipError::CodecError(a), ZipError::CodecError(b)) => a.kind() == b.kind(),
            (
                ZipError::InvalidArchive { reason: a, offset: b },
                ZipError::InvalidArchive { reason: c, offset: d },
            ) => a == c && b == d,
            (ZipError::UnsupportedCompression(a), ZipError::UnsupportedCompression(b)) => a == b,
            (
                ZipError::ChecksumMismatch { name: a, expected: b, actual: c },
                ZipError::ChecksumMismatch { name: d, expected: e, actual: f },
            ) => a == d && b == e && c == f,
            (ZipError::InvalidCompressionLevel(a), ZipError::InvalidCompressionLevel(b)) => a == b,
            (ZipError::WriterFinalized, ZipError::WriterFinalized) => true,
            (ZipError::LimitExceeded(a), ZipError::LimitExceeded(b)) => a == b,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ZipError>;
