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

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::compression_codecs::{CompressionCodec, MemoryStream};
use crate::structures::CompressionMethod;
use crate::{Result, ZipError};

/// Raw DEFLATE streams, without zlib or gzip framing.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCodec {
    pub level: u32,
}

impl DeflateCodec {
    pub fn new(level: i32) -> Result<Self> {
        if !(0..=9).contains(&level) {
            return Err(ZipError::InvalidCompressionLevel(level));
        }
        Ok(Self {
            level: level as u32,
        })
    }
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self {
            level: Compression::default().level(),
        }
    }
}

impl CompressionCodec for DeflateCodec {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Deflate
    }

    fn compress(&self, data: MemoryStream) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(
            Vec::with_capacity(data.1),
            Compression::new(self.level),
        );
        encoder.write_all(data.0).map_err(ZipError::CodecError)?;
        encoder.finish().map_err(ZipError::CodecError)
    }

    fn expand(&self, data: MemoryStream) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(data.1);
        DeflateDecoder::new(data.0)
            .read_to_end(&mut buf)
            .map_err(ZipError::CodecError)?;
        Ok(buf)
    }
}
