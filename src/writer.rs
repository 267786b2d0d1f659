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

use log::{debug, trace};
use std::io::Write;
use time::PrimitiveDateTime;

use crate::compression_codecs::codec_for;
use crate::crc32::crc32;
use crate::structures::{CentralDirectory, CompressionMethod, DosDateTime, EndOfCentralDirectory, LocalFileHeader};
use crate::{
    Result, ZipError, CD_SIZE, DIR_ATTRIBUTE, FLAG_UTF8, LFH_SIZE, VERSION_MADE_BY, VERSION_NEEDED,
};

/// Defaults applied to every member added to a [`ZipWriter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterOptions {
    pub compression: CompressionMethod,
    /// Codec specific level, `None` for the codec default.
    pub level: Option<i32>,
    /// Archive comment written after the EOCD record.
    pub comment: Vec<u8>,
}

impl WriterOptions {
    pub fn compression(mut self, method: CompressionMethod) -> Self {
        self.compression = method;
        self
    }

    pub fn level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn comment<C: Into<Vec<u8>>>(mut self, comment: C) -> Self {
        self.comment = comment.into();
        self
    }
}

/// Per member overrides of the writer defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileOptions {
    pub compression: Option<CompressionMethod>,
    /// Modification time, the current local time when `None`.
    pub last_modified: Option<PrimitiveDateTime>,
    pub level: Option<i32>,
}

impl FileOptions {
    pub fn compression(mut self, method: CompressionMethod) -> Self {
        self.compression = Some(method);
        self
    }

    pub fn last_modified(mut self, modified: PrimitiveDateTime) -> Self {
        self.last_modified = Some(modified);
        self
    }

    pub fn level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }
}

/// Everything the central directory needs to know about an appended member.
#[derive(Debug, Clone)]
struct PendingEntry {
    file_name: Vec<u8>,
    compression: CompressionMethod,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    modified: DosDateTime,
    local_header_offset: u32,
    external_attributes: u32,
}

impl PendingEntry {
    fn central_directory(&self) -> CentralDirectory {
        CentralDirectory {
            version_made_by: VERSION_MADE_BY,
            version_needed_to_extract: VERSION_NEEDED,
            flags: FLAG_UTF8,
            compression: self.compression.as_u16(),
            modified: self.modified,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            file_name: self.file_name.clone(),
            extra_field_len: 0,
            file_comment_len: 0,
            disk_number_start: 0,
            internal_file_attributes: 0,
            external_file_attributes: self.external_attributes,
            local_header_rel_offset: self.local_header_offset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Building,
    Finalized,
}

/// Builds an archive in memory.
///
/// Each member is compressed and its local header, name and data are
/// appended as soon as it is added. [`ZipWriter::finalize`] then derives the
/// central directory and EOCD from the recorded entries.
#[derive(Debug)]
pub struct ZipWriter {
    options: WriterOptions,
    chunks: Vec<Vec<u8>>,
    entries: Vec<PendingEntry>,
    /// Offset the next local header will be written at.
    offset: u32,
    state: WriterState,
}

impl Default for ZipWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipWriter {
    pub fn new() -> Self {
        Self::with_options(WriterOptions::default())
    }

    pub fn with_options(options: WriterOptions) -> Self {
        ZipWriter {
            options,
            chunks: Vec::new(),
            entries: Vec::new(),
            offset: 0,
            state: WriterState::Building,
        }
    }

    /// Number of members added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.state == WriterState::Finalized
    }

    /// Compress `data` and append it as member `name`.
    pub fn add_file(&mut self, name: &str, data: &[u8], options: FileOptions) -> Result<()> {
        let method = options.compression.unwrap_or(self.options.compression);
        let level = options.level.or(self.options.level);
        let modified = options
            .last_modified
            .map(DosDateTime::from_datetime)
            .unwrap_or_else(DosDateTime::now);
        self.append(name, data, method, level, modified, 0)
    }

    /// Append an empty stored member named `name`, with a trailing `/` added
    /// if missing, and the directory attribute set.
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{}/", name)
        };
        self.append(&name, &[], CompressionMethod::Stored, None, DosDateTime::now(), DIR_ATTRIBUTE)
    }

    /// Nothing is recorded unless every step succeeds, so a failed call
    /// leaves the writer as it was.
    fn append(
        &mut self,
        name: &str,
        data: &[u8],
        method: CompressionMethod,
        level: Option<i32>,
        modified: DosDateTime,
        external_attributes: u32,
    ) -> Result<()> {
        if self.state == WriterState::Finalized {
            return Err(ZipError::WriterFinalized);
        }
        if self.entries.len() >= u16::MAX as usize {
            return Err(ZipError::LimitExceeded("entry count"));
        }
        let file_name = name.as_bytes().to_vec();
        let file_name_len =
            u16::try_from(file_name.len()).map_err(|_| ZipError::LimitExceeded("file name"))?;
        let uncompressed_size =
            u32::try_from(data.len()).map_err(|_| ZipError::LimitExceeded("file size"))?;

        // The local header precedes the data, so the checksum has to be known
        // before anything is written.
        let crc32 = crc32(data);
        let codec = codec_for(method, level)?;
        let compressed = codec.compress((data, data.len()))?;
        let compressed_size =
            u32::try_from(compressed.len()).map_err(|_| ZipError::LimitExceeded("file size"))?;

        let next_offset = (LFH_SIZE as u64)
            .checked_add(file_name.len() as u64)
            .and_then(|n| n.checked_add(compressed.len() as u64))
            .and_then(|n| n.checked_add(self.offset as u64))
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(ZipError::LimitExceeded("archive size"))?;

        let header = LocalFileHeader {
            version: VERSION_NEEDED,
            flags: FLAG_UTF8,
            compression: method.as_u16(),
            modified,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name_len,
            extra_field_len: 0,
        };

        trace!(
            "Adding {:?} at {} ({:?}, {} -> {} bytes)",
            name,
            self.offset,
            method,
            uncompressed_size,
            compressed_size
        );

        self.chunks.push(header.to_bytes());
        self.chunks.push(file_name.clone());
        self.chunks.push(compressed);
        self.entries.push(PendingEntry {
            file_name,
            compression: method,
            crc32,
            compressed_size,
            uncompressed_size,
            modified,
            local_header_offset: self.offset,
            external_attributes,
        });
        self.offset = next_offset;
        Ok(())
    }

    /// Central directory records followed by the EOCD and comment, computed
    /// only from the recorded entries.
    fn trailer(&self) -> Result<Vec<Vec<u8>>> {
        let comment_len = u16::try_from(self.options.comment.len())
            .map_err(|_| ZipError::LimitExceeded("archive comment"))?;
        let mut chunks = Vec::with_capacity(self.entries.len() * 2 + 2);
        let mut cd_size = 0u64;

        for entry in &self.entries {
            chunks.push(entry.central_directory().to_bytes()?);
            chunks.push(entry.file_name.clone());
            cd_size += (CD_SIZE + entry.file_name.len()) as u64;
        }
        let cd_size =
            u32::try_from(cd_size).map_err(|_| ZipError::LimitExceeded("central directory"))?;
        if self.offset as u64 + cd_size as u64 > u32::MAX as u64 {
            return Err(ZipError::LimitExceeded("archive size"));
        }

        // Single disk, so both entry counts are the same.
        let count = self.entries.len() as u16;
        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_central_directory: 0,
            number_of_central_directory_records_on_this_disk: count,
            total_number_of_central_directory_records: count,
            size_of_central_directory: cd_size,
            offset_of_start_of_central_directory: self.offset,
            comment_len,
        };
        chunks.push(eocd.to_bytes());
        chunks.push(self.options.comment.clone());

        debug!(
            "Finalizing archive with {} entries (central directory {} bytes at {})",
            count, cd_size, self.offset
        );
        Ok(chunks)
    }

    /// Emit the complete archive.
    ///
    /// Further additions are rejected afterwards. Calling this again returns
    /// the same bytes.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        let trailer = self.trailer()?;
        self.state = WriterState::Finalized;
        let len = self.chunks.iter().chain(&trailer).map(Vec::len).sum();
        let mut out = Vec::with_capacity(len);
        for chunk in self.chunks.iter().chain(&trailer) {
            out.extend_from_slice(chunk);
        }
        Ok(out)
    }

    /// Same bytes as [`ZipWriter::finalize`], written chunk by chunk to `writer`.
    pub fn finalize_into<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        let trailer = self.trailer()?;
        self.state = WriterState::Finalized;
        for chunk in self.chunks.iter().chain(&trailer) {
            writer.write_all(chunk)?;
        }
        writer.flush()?;
        Ok(())
    }
}
