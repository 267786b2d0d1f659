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

use std::io::{Read, Write};
use zstd::{Decoder, Encoder};

use crate::compression_codecs::{CompressionCodec, MemoryStream};
use crate::structures::CompressionMethod;
use crate::{Result, ZipError};

/// Zstandard members, method 93 in APPNOTE 6.3.8.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    pub level: i32,
}

impl ZstdCodec {
    pub fn new(level: i32) -> Result<Self> {
        if !zstd::compression_level_range().contains(&level) {
            return Err(ZipError::InvalidCompressionLevel(level));
        }
        Ok(Self { level })
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self {
            level: zstd::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl CompressionCodec for ZstdCodec {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zstd
    }

    fn compress(&self, data: MemoryStream) -> Result<Vec<u8>> {
        let mut encoder =
            Encoder::new(Vec::with_capacity(data.1), self.level).map_err(ZipError::CodecError)?;
        encoder.write_all(data.0).map_err(ZipError::CodecError)?;
        encoder.finish().map_err(ZipError::CodecError)
    }

    fn expand(&self, data: MemoryStream) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(data.1);
        let mut decoder = Decoder::new(data.0).map_err(ZipError::CodecError)?;
        decoder.read_to_end(&mut buf).map_err(ZipError::CodecError)?;
        Ok(buf)
    }
}
