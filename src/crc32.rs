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

//! CRC-32 as used by ZIP (reflected polynomial 0xEDB88320, init and final
//! xor 0xFFFFFFFF). The 256-entry table is built at compile time and is
//! read-only, so the checksum can be shared freely between threads.

use crc::{Crc, CRC_32_ISO_HDLC};

static ZIP_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Checksum of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    ZIP_CRC.checksum(data)
}
