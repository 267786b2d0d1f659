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

use neoncore::int_util::Endianness::LittleEndian;
use neoncore::int_util::StreamReadInt;
use std::io::Cursor;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::{Result, ZipError, CD_SIG, CD_SIZE, EOCD_SIG, EOCD_SIZE, LFH_SIG, LFH_SIZE};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionMethod {
    Stored,
    #[default]
    Deflate,
    Zstd,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            93 => CompressionMethod::Zstd,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Zstd => 93,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// MS-DOS packed modification time, 2 second resolution.
///
/// time: `hour:5 | minute:6 | second/2:5`
/// date: `(year - 1980):7 | month:4 | day:5`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00
    pub const MIN: DosDateTime = DosDateTime {
        time: 0,
        date: (1 << 5) | 1,
    };
    /// 2107-12-31 23:59:58
    pub const MAX: DosDateTime = DosDateTime {
        time: (23 << 11) | (59 << 5) | 29,
        date: (127 << 9) | (12 << 5) | 31,
    };

    /// Pack a calendar timestamp, truncating odd seconds and clamping to the
    /// range DOS dates can hold.
    pub fn from_datetime(dt: PrimitiveDateTime) -> Self {
        let year = dt.year();
        if year < 1980 {
            return Self::MIN;
        }
        if year > 2107 {
            return Self::MAX;
        }
        let time = ((dt.hour() as u16) << 11)
            | ((dt.minute() as u16) << 5)
            | ((dt.second() as u16) >> 1);
        let date = (((year - 1980) as u16) << 9)
            | ((u8::from(dt.month()) as u16) << 5)
            | dt.day() as u16;
        DosDateTime { time, date }
    }

    /// Unpack into a calendar timestamp, `None` when the fields do not name
    /// a real instant (the all-zero date for instance).
    pub fn to_datetime(self) -> Option<PrimitiveDateTime> {
        let seconds = ((self.time & 0x1f) * 2) as u8;
        let minutes = ((self.time >> 5) & 0x3f) as u8;
        let hours = ((self.time >> 11) & 0x1f) as u8;
        let day = (self.date & 0x1f) as u8;
        let month = ((self.date >> 5) & 0x0f) as u8;
        let year = ((self.date >> 9) & 0x7f) as i32 + 1980;

        let month = Month::try_from(month).ok()?;
        let date = Date::from_calendar_date(year, month, day).ok()?;
        let time = Time::from_hms(hours, minutes, seconds).ok()?;
        Some(PrimitiveDateTime::new(date, time))
    }

    /// Current local time, or UTC if the local offset can't be determined.
    pub fn now() -> Self {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Self::from_datetime(PrimitiveDateTime::new(now.date(), now.time()))
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Describes a file in the zip archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    /// The version needed to extract the file.
    pub version: u16,
    /// The flags that are set for the file.
    pub flags: u16,
    /// The compression method used for the file.
    pub compression: u16,
    /// The last modified time and date of the file.
    pub modified: DosDateTime,
    /// The crc32 checksum of the file.
    pub crc32: u32,
    /// The size of the file after compression.
    pub compressed_size: u32,
    /// The size of the file before compression.
    pub uncompressed_size: u32,
    pub file_name_len: u16,
    pub extra_field_len: u16,
}

impl LocalFileHeader {
    /// Parse the fixed part of a local file header at `offset` in `buf`.
    pub fn parse(buf: &[u8], offset: usize) -> Result<Self> {
        let fixed = offset
            .checked_add(LFH_SIZE)
            .and_then(|end| buf.get(offset..end))
            .ok_or_else(|| ZipError::invalid("truncated local header", offset))?;
        let mut data = Cursor::new(fixed);
        if data.read_u32(LittleEndian)? != LFH_SIG {
            return Err(ZipError::invalid("corrupt local header", offset));
        }

        Ok(LocalFileHeader {
            version: data.read_u16(LittleEndian)?,
            flags: data.read_u16(LittleEndian)?,
            compression: data.read_u16(LittleEndian)?,
            modified: DosDateTime {
                time: data.read_u16(LittleEndian)?,
                date: data.read_u16(LittleEndian)?,
            },
            crc32: data.read_u32(LittleEndian)?,
            compressed_size: data.read_u32(LittleEndian)?,
            uncompressed_size: data.read_u32(LittleEndian)?,
            file_name_len: data.read_u16(LittleEndian)?,
            extra_field_len: data.read_u16(LittleEndian)?,
        })
    }

    /// Offset of the member data relative to the start of the header.
    pub fn data_offset(&self) -> usize {
        LFH_SIZE + self.file_name_len as usize + self.extra_field_len as usize
    }

    /// The fixed 30 bytes of the header; name and extra field follow it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LFH_SIZE);
        put_u32(&mut out, LFH_SIG);
        put_u16(&mut out, self.version);
        put_u16(&mut out, self.flags);
        put_u16(&mut out, self.compression);
        put_u16(&mut out, self.modified.time);
        put_u16(&mut out, self.modified.date);
        put_u32(&mut out, self.crc32);
        put_u32(&mut out, self.compressed_size);
        put_u32(&mut out, self.uncompressed_size);
        put_u16(&mut out, self.file_name_len);
        put_u16(&mut out, self.extra_field_len);
        out
    }
}

/// One record of the central directory, which is placed towards the end of
/// the file. Its sizes and crc are the ones trusted when reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectory {
    pub version_made_by: u16,
    pub version_needed_to_extract: u16,
    pub flags: u16,
    pub compression: u16,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: Vec<u8>,
    pub extra_field_len: u16,
    pub file_comment_len: u16,
    pub disk_number_start: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub local_header_rel_offset: u32,
}

impl CentralDirectory {
    /// Parse the record starting at `offset`, name included.
    pub fn parse(buf: &[u8], offset: usize) -> Result<Self> {
        let fixed = offset
            .checked_add(CD_SIZE)
            .and_then(|end| buf.get(offset..end))
            .ok_or_else(|| ZipError::invalid("truncated central directory", offset))?;
        let mut data = Cursor::new(fixed);
        if data.read_u32(LittleEndian)? != CD_SIG {
            return Err(ZipError::invalid("corrupt central directory", offset));
        }

        let version_made_by = data.read_u16(LittleEndian)?;
        let version_needed_to_extract = data.read_u16(LittleEndian)?;
        let flags = data.read_u16(LittleEndian)?;
        let compression = data.read_u16(LittleEndian)?;
        let modified = DosDateTime {
            time: data.read_u16(LittleEndian)?,
            date: data.read_u16(LittleEndian)?,
        };
        let crc32 = data.read_u32(LittleEndian)?;
        let compressed_size = data.read_u32(LittleEndian)?;
        let uncompressed_size = data.read_u32(LittleEndian)?;
        // The lengths are stored here but the data is at the end of the structure.
        let fname_len = data.read_u16(LittleEndian)? as usize;
        let extra_field_len = data.read_u16(LittleEndian)?;
        let file_comment_len = data.read_u16(LittleEndian)?;
        let disk_number_start = data.read_u16(LittleEndian)?;
        let internal_file_attributes = data.read_u16(LittleEndian)?;
        let external_file_attributes = data.read_u32(LittleEndian)?;
        let local_header_rel_offset = data.read_u32(LittleEndian)?;

        let name_start = offset + CD_SIZE;
        let file_name = buf
            .get(name_start..name_start + fname_len)
            .ok_or_else(|| ZipError::invalid("truncated central directory", offset))?
            .to_vec();

        Ok(CentralDirectory {
            version_made_by,
            version_needed_to_extract,
            flags,
            compression,
            modified,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            extra_field_len,
            file_comment_len,
            disk_number_start,
            internal_file_attributes,
            external_file_attributes,
            local_header_rel_offset,
        })
    }

    /// Total length of the record including its variable fields, i.e. the
    /// distance to the next record.
    pub fn len(&self) -> usize {
        CD_SIZE
            + self.file_name.len()
            + self.extra_field_len as usize
            + self.file_comment_len as usize
    }

    /// The fixed 46 bytes of the record; the name follows it.
    /// A name longer than the 16-bit length field is refused.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let file_name_len = u16::try_from(self.file_name.len())
            .map_err(|_| ZipError::LimitExceeded("file name"))?;
        let mut out = Vec::with_capacity(CD_SIZE);
        put_u32(&mut out, CD_SIG);
        put_u16(&mut out, self.version_made_by);
        put_u16(&mut out, self.version_needed_to_extract);
        put_u16(&mut out, self.flags);
        put_u16(&mut out, self.compression);
        put_u16(&mut out, self.modified.time);
        put_u16(&mut out, self.modified.date);
        put_u32(&mut out, self.crc32);
        put_u32(&mut out, self.compressed_size);
        put_u32(&mut out, self.uncompressed_size);
        put_u16(&mut out, file_name_len);
        put_u16(&mut out, self.extra_field_len);
        put_u16(&mut out, self.file_comment_len);
        put_u16(&mut out, self.disk_number_start);
        put_u16(&mut out, self.internal_file_attributes);
        put_u32(&mut out, self.external_file_attributes);
        put_u32(&mut out, self.local_header_rel_offset);
        Ok(out)
    }
}

/// Very last structure in a zip archive, it has information that
/// helps the reader find the central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub number_of_central_directory_records_on_this_disk: u16,
    pub total_number_of_central_directory_records: u16,
    pub size_of_central_directory: u32,
    pub offset_of_start_of_central_directory: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    /// Parse the record at `offset`; the comment is left in the buffer.
    pub fn parse(buf: &[u8], offset: usize) -> Result<Self> {
        let fixed = offset
            .checked_add(EOCD_SIZE)
            .and_then(|end| buf.get(offset..end))
            .ok_or_else(|| ZipError::invalid("truncated end of central directory", offset))?;
        let mut data = Cursor::new(fixed);
        if data.read_u32(LittleEndian)? != EOCD_SIG {
            return Err(ZipError::invalid("end of central directory not found", offset));
        }

        Ok(EndOfCentralDirectory {
            disk_number: data.read_u16(LittleEndian)?,
            disk_with_central_directory: data.read_u16(LittleEndian)?,
            number_of_central_directory_records_on_this_disk: data.read_u16(LittleEndian)?,
            total_number_of_central_directory_records: data.read_u16(LittleEndian)?,
            size_of_central_directory: data.read_u32(LittleEndian)?,
            offset_of_start_of_central_directory: data.read_u32(LittleEndian)?,
            comment_len: data.read_u16(LittleEndian)?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(EOCD_SIZE);
        put_u32(&mut out, EOCD_SIG);
        put_u16(&mut out, self.disk_number);
        put_u16(&mut out, self.disk_with_central_directory);
        put_u16(&mut out, self.number_of_central_directory_records_on_this_disk);
        put_u16(&mut out, self.total_number_of_central_directory_records);
        put_u32(&mut out, self.size_of_central_directory);
        put_u32(&mut out, self.offset_of_start_of_central_directory);
        put_u16(&mut out, self.comment_len);
        out
    }
}
