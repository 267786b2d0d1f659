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

use log::{debug, trace, warn};
#[cfg(feature = "multi-thread")]
use rayon::prelude::*;
use std::collections::BTreeMap;
use time::PrimitiveDateTime;

use crate::compression_codecs::codec_for;
use crate::crc32::crc32;
use crate::structures::{CentralDirectory, CompressionMethod, EndOfCentralDirectory, LocalFileHeader};
use crate::{Result, ZipError, EOCD_SIG, EOCD_SIZE, MAX_COMMENT_SIZE};

/// Options that change how strictly an archive is located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Only accept an EOCD whose comment ends exactly at the end of the buffer
    /// and whose central directory lies before it. Rejected candidates are
    /// skipped and the backward scan continues.
    pub validate_eocd: bool,
}

impl ReaderOptions {
    pub fn validate_eocd(mut self, validate: bool) -> Self {
        self.validate_eocd = validate;
        self
    }
}

/// A member of the archive, as described by its central directory record.
///
/// Holds no data of its own; `local_header_offset` points into the buffer of
/// the reader that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub crc32: u32,
    pub is_directory: bool,
    /// `None` when the stored DOS date is not a valid calendar date.
    pub last_modified: Option<PrimitiveDateTime>,
    pub local_header_offset: u32,
    pub external_attributes: u32,
}

impl ArchiveEntry {
    pub(crate) fn from_central_dir(cd: &CentralDirectory) -> Self {
        let file_name = String::from_utf8_lossy(&cd.file_name).into_owned();
        ArchiveEntry {
            is_directory: file_name.ends_with('/'),
            file_name,
            compression_method: CompressionMethod::from_u16(cd.compression),
            compressed_size: cd.compressed_size,
            uncompressed_size: cd.uncompressed_size,
            crc32: cd.crc32,
            last_modified: cd.modified.to_datetime(),
            local_header_offset: cd.local_header_rel_offset,
            external_attributes: cd.external_file_attributes,
        }
    }
}

/// Scan backwards from the last position an EOCD could start at, bounded by
/// the largest comment the format allows. The match closest to the end wins.
fn find_eocd(buf: &[u8], options: ReaderOptions) -> Result<(usize, EndOfCentralDirectory)> {
    if buf.len() < EOCD_SIZE {
        return Err(ZipError::invalid("end of central directory not found", 0));
    }
    let last = buf.len() - EOCD_SIZE;
    let first = last.saturating_sub(MAX_COMMENT_SIZE);
    let sig = EOCD_SIG.to_le_bytes();

    for offset in (first..=last).rev() {
        if buf[offset..offset + 4] != sig {
            continue;
        }
        let eocd = EndOfCentralDirectory::parse(buf, offset)?;
        if options.validate_eocd && !eocd_is_consistent(&eocd, offset, buf.len()) {
            warn!("Skipping inconsistent end of central directory candidate at {}", offset);
            continue;
        }
        return Ok((offset, eocd));
    }

    Err(ZipError::invalid("end of central directory not found", first))
}

fn eocd_is_consistent(eocd: &EndOfCentralDirectory, offset: usize, len: usize) -> bool {
    let comment_fits = offset + EOCD_SIZE + eocd.comment_len as usize == len;
    let cd_end = eocd.offset_of_start_of_central_directory as u64
        + eocd.size_of_central_directory as u64;
    comment_fits && cd_end <= offset as u64
}

/// Read-only view over a complete archive held in memory.
///
/// The buffer is never mutated, so entries may be read concurrently through
/// a shared reference.
pub struct ZipReader<B: AsRef<[u8]>> {
    buffer: B,
    entries: Vec<ArchiveEntry>,
    index: BTreeMap<String, usize>,
    comment: (usize, usize),
}

impl<B: AsRef<[u8]>> ZipReader<B> {
    /// Locate the EOCD and parse the central directory.
    pub fn new(buffer: B) -> Result<Self> {
        Self::with_options(buffer, ReaderOptions::default())
    }

    pub fn with_options(buffer: B, options: ReaderOptions) -> Result<Self> {
        let buf = buffer.as_ref();
        let (eocd_offset, eocd) = find_eocd(buf, options)?;

        let count = eocd.total_number_of_central_directory_records as usize;
        let mut offset = eocd.offset_of_start_of_central_directory as usize;
        let mut entries = Vec::with_capacity(count);
        let mut index = BTreeMap::new();

        for i in 0..count {
            let record = CentralDirectory::parse(buf, offset)?;
            offset += record.len();
            let entry = ArchiveEntry::from_central_dir(&record);
            index.entry(entry.file_name.clone()).or_insert(i);
            entries.push(entry);
        }

        let comment_start = eocd_offset + EOCD_SIZE;
        let comment_end = (comment_start + eocd.comment_len as usize).min(buf.len());

        debug!(
            "Parsed {} central directory entries (offset {}, eocd at {})",
            entries.len(),
            eocd.offset_of_start_of_central_directory,
            eocd_offset
        );

        Ok(ZipReader {
            buffer,
            entries,
            index,
            comment: (comment_start, comment_end),
        })
    }

    /// Entries in central directory order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn files(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter().filter(|entry| !entry.is_directory)
    }

    pub fn dirs(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter().filter(|entry| entry.is_directory)
    }

    /// First entry stored under exactly `name`.
    pub fn by_name(&self, name: &str) -> Option<&ArchiveEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The archive comment that follows the EOCD record.
    pub fn comment(&self) -> &[u8] {
        &self.buffer.as_ref()[self.comment.0..self.comment.1]
    }

    /// The member data as stored, without decompressing or checking it.
    pub fn read_raw(&self, entry: &ArchiveEntry) -> Result<&[u8]> {
        let buf = self.buffer.as_ref();
        let offset = entry.local_header_offset as usize;
        // The local header's own name and extra lengths locate the data; its
        // extra field may differ from the central directory copy.
        let header = LocalFileHeader::parse(buf, offset)?;
        let start = offset + header.data_offset();
        let end = start + entry.compressed_size as usize;
        buf.get(start..end)
            .ok_or_else(|| ZipError::invalid("entry data out of bounds", start))
    }

    /// Decompress a member and verify its CRC-32 against the central directory.
    pub fn read_entry(&self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        let raw = self.read_raw(entry)?;
        let codec = codec_for(entry.compression_method, None)?;
        let data = codec.expand((raw, entry.uncompressed_size as usize))?;

        let actual = crc32(&data);
        if actual != entry.crc32 {
            return Err(ZipError::ChecksumMismatch {
                name: entry.file_name.clone(),
                expected: entry.crc32,
                actual,
            });
        }

        trace!(
            "Read {:?} ({:?}, {} -> {} bytes)",
            entry.file_name,
            entry.compression_method,
            raw.len(),
            data.len()
        );
        Ok(data)
    }

    /// Read every entry, keyed by name, one at a time in central directory
    /// order. Stops at the first entry that fails and returns its error;
    /// nothing partial is kept.
    pub fn extract_all(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut files = BTreeMap::new();
        for entry in &self.entries {
            files.insert(entry.file_name.clone(), self.read_entry(entry)?);
        }
        Ok(files)
    }

    /// Same result as [`ZipReader::extract_all`] on success, but entries are
    /// decoded on the rayon pool. Once any entry fails, entries not yet
    /// started are skipped. If several entries are broken, which one's error
    /// comes back is not fixed.
    #[cfg(feature = "multi-thread")]
    pub fn par_extract_all(&self) -> Result<BTreeMap<String, Vec<u8>>>
    where
        B: Sync,
    {
        let decoded = self
            .entries
            .par_iter()
            .map(|entry| {
                self.read_entry(entry)
                    .map(|data| (entry.file_name.clone(), data))
            })
            .collect::<Result<Vec<(String, Vec<u8>)>>>()?;

        Ok(decoded.into_iter().collect())
    }

    pub fn into_inner(self) -> B {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::DosDateTime;
    use crate::{CD_SIG, LFH_SIG, LFH_SIZE};

    /// Build a single stored entry by hand so the reader is tested without
    /// the writer.
    fn stored_archive(name: &[u8], data: &[u8], method: u16) -> Vec<u8> {
        fn u16le(out: &mut Vec<u8>, v: u16) {
            out.extend_from_slice(&v.to_le_bytes());
        }
        fn u32le(out: &mut Vec<u8>, v: u32) {
            out.extend_from_slice(&v.to_le_bytes());
        }
        let crc = crc32(data);
        let dos = DosDateTime {
            time: (10 << 11) | (30 << 5),
            date: (43 << 9) | (6 << 5) | 15,
        };

        let mut out = Vec::new();
        u32le(&mut out, LFH_SIG);
        u16le(&mut out, 20);
        u16le(&mut out, 0x0800);
        u16le(&mut out, method);
        u16le(&mut out, dos.time);
        u16le(&mut out, dos.date);
        u32le(&mut out, crc);
        u32le(&mut out, data.len() as u32);
        u32le(&mut out, data.len() as u32);
        u16le(&mut out, name.len() as u16);
        // 4 bytes of extra field only in the local header
        u16le(&mut out, 4);
        out.extend_from_slice(name);
        out.extend_from_slice(&[0xca, 0xfe, 0x00, 0x00]);
        out.extend_from_slice(data);

        let cd_offset = out.len();
        u32le(&mut out, CD_SIG);
        u16le(&mut out, 20);
        u16le(&mut out, 20);
        u16le(&mut out, 0x0800);
        u16le(&mut out, method);
        u16le(&mut out, dos.time);
        u16le(&mut out, dos.date);
        u32le(&mut out, crc);
        u32le(&mut out, data.len() as u32);
        u32le(&mut out, data.len() as u32);
        u16le(&mut out, name.len() as u16);
        u16le(&mut out, 0);
        u16le(&mut out, 3);
        u16le(&mut out, 0);
        u16le(&mut out, 0);
        u32le(&mut out, 0);
        u32le(&mut out, 0);
        out.extend_from_slice(name);
        out.extend_from_slice(b"hey");
        let cd_size = out.len() - cd_offset;

        u32le(&mut out, EOCD_SIG);
        u16le(&mut out, 0);
        u16le(&mut out, 0);
        u16le(&mut out, 1);
        u16le(&mut out, 1);
        u32le(&mut out, cd_size as u32);
        u32le(&mut out, cd_offset as u32);
        u16le(&mut out, 0);
        out
    }

    #[test]
    fn test_read_handcrafted_entry() {
        let archive = stored_archive(b"hello.txt", b"Hello, World!", 0);
        let zip = ZipReader::new(&archive[..]).unwrap();
        assert_eq!(zip.len(), 1);

        let entry = &zip.entries()[0];
        assert_eq!(entry.file_name, "hello.txt");
        assert_eq!(entry.compression_method, CompressionMethod::Stored);
        assert_eq!(entry.uncompressed_size, 13);
        assert_eq!(entry.local_header_offset, 0);
        assert!(!entry.is_directory);
        assert_eq!(
            entry.last_modified,
            Some(time::macros::datetime!(2023-06-15 10:30:00))
        );
        assert_eq!(zip.read_entry(entry).unwrap(), b"Hello, World!");
        assert_eq!(zip.read_raw(entry).unwrap().len(), 13);
        assert!(zip.comment().is_empty());
    }

    #[test]
    fn test_find_eocd_without_comment() {
        let archive = stored_archive(b"a", b"b", 0);
        let (offset, eocd) = find_eocd(&archive, ReaderOptions::default()).unwrap();
        assert_eq!(offset, archive.len() - EOCD_SIZE);
        assert_eq!(eocd.total_number_of_central_directory_records, 1);
    }

    #[test]
    fn test_buffer_shorter_than_eocd() {
        let err = ZipReader::new(vec![0x50u8, 0x4b, 0x05, 0x06]).err().unwrap();
        assert_eq!(err, ZipError::invalid("end of central directory not found", 0));
    }

    #[test]
    fn test_no_eocd() {
        let err = ZipReader::new(vec![0u8; 1000]).err().unwrap();
        assert!(matches!(err, ZipError::InvalidArchive { .. }));
    }

    #[test]
    fn test_signature_beyond_comment_range_is_not_found() {
        let mut archive = stored_archive(b"a", b"b", 0);
        let len = archive.len();
        archive[len - 2..].copy_from_slice(&u16::MAX.to_le_bytes());
        // One byte more than the largest comment pushes the EOCD out of range.
        archive.extend(std::iter::repeat(0u8).take(MAX_COMMENT_SIZE + 1));
        assert!(matches!(
            ZipReader::new(&archive[..]).err(),
            Some(ZipError::InvalidArchive { .. })
        ));
    }

    #[test]
    fn test_corrupt_central_directory() {
        let mut archive = stored_archive(b"a.txt", b"data", 0);
        let cd_offset = LFH_SIZE + 5 + 4 + 4;
        archive[cd_offset] = 0;
        assert_eq!(
            ZipReader::new(&archive[..]).err(),
            Some(ZipError::invalid("corrupt central directory", cd_offset))
        );
    }

    #[test]
    fn test_central_directory_past_end() {
        let mut archive = stored_archive(b"a.txt", b"data", 0);
        let len = archive.len();
        archive[len - 6..len - 2].copy_from_slice(&(len as u32).to_le_bytes());
        assert_eq!(
            ZipReader::new(&archive[..]).err(),
            Some(ZipError::invalid("truncated central directory", len))
        );
    }

    #[test]
    fn test_corrupt_local_header() {
        let mut archive = stored_archive(b"a.txt", b"data", 0);
        archive[1] = b'X';
        let zip = ZipReader::new(&archive[..]).unwrap();
        assert_eq!(
            zip.read_entry(&zip.entries()[0]),
            Err(ZipError::invalid("corrupt local header", 0))
        );
    }

    #[test]
    fn test_unsupported_method() {
        let archive = stored_archive(b"weird.bin", b"data", 99);
        let zip = ZipReader::new(&archive[..]).unwrap();
        let entry = &zip.entries()[0];
        assert_eq!(entry.compression_method, CompressionMethod::Unknown(99));
        assert_eq!(
            zip.read_entry(entry),
            Err(ZipError::UnsupportedCompression(99))
        );
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut archive = stored_archive(b"a.txt", b"data", 0);
        let data_offset = LFH_SIZE + 5 + 4;
        archive[data_offset] ^= 0xff;
        let zip = ZipReader::new(&archive[..]).unwrap();
        let entry = zip.entries()[0].clone();
        let err = zip.read_entry(&entry).unwrap_err();
        assert_eq!(
            err,
            ZipError::ChecksumMismatch {
                name: "a.txt".into(),
                expected: crc32(b"data"),
                actual: crc32(&archive[data_offset..data_offset + 4]),
            }
        );
        assert!(zip.extract_all().is_err());
    }

    #[test]
    fn test_validated_eocd_skips_spurious_signature() {
        let mut archive = stored_archive(b"a", b"b", 0);
        let len = archive.len();
        let mut comment = EOCD_SIG.to_le_bytes().to_vec();
        comment.extend_from_slice(&[0u8; 26]);
        archive[len - 2..].copy_from_slice(&(comment.len() as u16).to_le_bytes());
        archive.extend_from_slice(&comment);

        // The spurious record closest to the end wins by default.
        let loose = ZipReader::new(&archive[..]).unwrap();
        assert!(loose.is_empty());

        let strict =
            ZipReader::with_options(&archive[..], ReaderOptions::default().validate_eocd(true))
                .unwrap();
        assert_eq!(strict.len(), 1);
        assert_eq!(strict.comment(), &comment[..]);
    }

    #[test]
    fn test_lossy_file_name() {
        let archive = stored_archive(b"caf\xe9/", b"", 0);
        let zip = ZipReader::new(archive).unwrap();
        let entry = &zip.entries()[0];
        assert_eq!(entry.file_name, "caf\u{fffd}/");
        assert!(entry.is_directory);
        assert_eq!(zip.dirs().count(), 1);
        assert_eq!(zip.files().count(), 0);
        assert!(zip.by_name("caf\u{fffd}/").is_some());
        assert!(zip.by_name("cafe/").is_none());
    }
}
