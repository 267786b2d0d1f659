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

use crate::codecs::deflate_codec::DeflateCodec;
#[cfg(feature = "zstd_codec")]
use crate::codecs::zstd_codec::ZstdCodec;
use crate::structures::CompressionMethod;
use crate::{Result, ZipError};

/// A byte slice together with the size the other side of the transform is
/// expected to have (used only as a capacity hint).
pub type MemoryStream<'stream> = (&'stream [u8], usize);

/// Trait for valid compression codecs.
/// Compression codecs are used to compress and decompress data.
pub trait CompressionCodec: Sync + Send {
    /// The method this codec implements, as written in the headers.
    fn method(&self) -> CompressionMethod;

    /// Returns the int identifier for the compression codec.
    fn int_id(&self) -> u16 {
        self.method().as_u16()
    }

    fn compress(&self, data: MemoryStream) -> Result<Vec<u8>>;
    fn expand(&self, data: MemoryStream) -> Result<Vec<u8>>;
}

/// No compression codec.
/// Just returns the data as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompressionCodec;

impl CompressionCodec for NoCompressionCodec {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Stored
    }

    fn compress(&self, data: MemoryStream) -> Result<Vec<u8>> {
        Ok(data.0.to_vec())
    }

    fn expand(&self, data: MemoryStream) -> Result<Vec<u8>> {
        Ok(data.0.to_vec())
    }
}

/// Pick the codec for `method`. `level` is only meaningful for codecs that
/// compress; `None` selects the codec's default.
pub fn codec_for(method: CompressionMethod, level: Option<i32>) -> Result<Box<dyn CompressionCodec>> {
    match method {
        CompressionMethod::Stored => Ok(Box::new(NoCompressionCodec)),
        CompressionMethod::Deflate => Ok(Box::new(match level {
            Some(level) => DeflateCodec::new(level)?,
            None => DeflateCodec::default(),
        })),
        #[cfg(feature = "zstd_codec")]
        CompressionMethod::Zstd => Ok(Box::new(match level {
            Some(level) => ZstdCodec::new(level)?,
            None => ZstdCodec::default(),
        })),
        other => Err(ZipError::UnsupportedCompression(other.as_u16())),
    }
}
