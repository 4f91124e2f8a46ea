// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Shared byte-level codec primitives used by every sketch's wire format.
//!
//! A serialized sketch is a small fixed-layout preamble (one or two 8-byte
//! words) followed by a payload. [`SketchWriter`] accumulates the bytes on
//! the way out; [`PositionalCursor`] walks them back in on the way in, in
//! the same field order the writer used.

use std::io;
use std::io::Cursor;
use std::io::Read;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

use crate::error::Error;

/// Identifies which sketch family a serialized blob belongs to, and bounds
/// the number of preamble words a conforming deserializer should expect.
pub struct Family {
    /// The byte ID for this family, written into preamble byte 2.
    pub id: u8,
    /// Human-readable family name, used in error messages.
    pub name: &'static str,
    /// Minimum preamble size for this family, in 8-byte words.
    pub min_pre_longs: u8,
    /// Maximum preamble size for this family, in 8-byte words.
    pub max_pre_longs: u8,
}

impl Family {
    /// Bloom filter family.
    pub const BLOOM_FILTER: Family = Family {
        id: 24,
        name: "BLOOMFILTER",
        min_pre_longs: 3,
        max_pre_longs: 4,
    };

    /// Quotient filter family. Not part of the upstream DataSketches family
    /// table; assigned the next unused ID after `BLOOMFILTER`.
    pub const QUOTIENT_FILTER: Family = Family {
        id: 25,
        name: "QUOTIENTFILTER",
        min_pre_longs: 4,
        max_pre_longs: 4,
    };

    /// Frequent-items family. Preamble is always 2 words: `maxSize` must be
    /// present even for an empty sketch, so there is no shorter empty-case
    /// encoding the way `BLOOM_FILTER` has.
    pub const FREQUENCY: Family = Family {
        id: 10,
        name: "FREQUENCY",
        min_pre_longs: 2,
        max_pre_longs: 2,
    };

    /// Returns `Ok(())` if `family_id` matches this family, else a
    /// [`crate::error::ErrorKind::CorruptState`] error naming both IDs.
    pub fn validate_id(&self, family_id: u8) -> Result<(), Error> {
        if family_id != self.id {
            Err(Error::invalid_family(self.id, family_id, self.name))
        } else {
            Ok(())
        }
    }
}

/// Accumulates bytes for a serialized sketch.
///
/// Thin wrapper over a growable `Vec<u8>`; every multi-byte write goes
/// through `byteorder` so the wire format stays little-endian regardless
/// of host platform endianness.
pub(crate) struct SketchWriter {
    bytes: Vec<u8>,
}

impl SketchWriter {
    /// Constructs an empty writer with at least the given byte capacity
    /// pre-reserved.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Consumes the writer, returning the accumulated bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Appends a single byte.
    pub fn write_u8(&mut self, n: u8) {
        self.bytes.push(n);
    }

    /// Appends a little-endian `u16`.
    pub fn write_u16_le(&mut self, n: u16) {
        self.bytes
            .write_u16::<LittleEndian>(n)
            .expect("Vec<u8> write is infallible");
    }

    /// Appends a little-endian `u32`.
    pub fn write_u32_le(&mut self, n: u32) {
        self.bytes
            .write_u32::<LittleEndian>(n)
            .expect("Vec<u8> write is infallible");
    }

    /// Appends a little-endian `u64`.
    pub fn write_u64_le(&mut self, n: u64) {
        self.bytes
            .write_u64::<LittleEndian>(n)
            .expect("Vec<u8> write is infallible");
    }

    /// Appends a raw byte slice verbatim.
    pub fn write_bytes(&mut self, buf: &[u8]) {
        self.bytes.extend_from_slice(buf);
    }
}

/// A read-only, positional view over a byte segment.
///
/// Deserialization consumes fields from a `PositionalCursor` in the exact
/// order the corresponding `SketchWriter` wrote them; the cursor tracks its
/// own read position so callers never juggle offsets by hand.
pub(crate) struct PositionalCursor<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> PositionalCursor<'a> {
    /// Wraps `bytes` for sequential reading starting at position 0.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(bytes),
        }
    }

    /// Current byte offset into the wrapped segment.
    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    /// Reads a single byte, advancing the cursor by one.
    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.inner.read_u8()
    }

    /// Reads a little-endian `u16`, advancing the cursor by two.
    pub fn read_u16_le(&mut self) -> io::Result<u16> {
        self.inner.read_u16::<LittleEndian>()
    }

    /// Reads a little-endian `u32`, advancing the cursor by four.
    pub fn read_u32_le(&mut self) -> io::Result<u32> {
        self.inner.read_u32::<LittleEndian>()
    }

    /// Reads a little-endian `u64`, advancing the cursor by eight.
    pub fn read_u64_le(&mut self) -> io::Result<u64> {
        self.inner.read_u64::<LittleEndian>()
    }

    /// Reads `buf.len()` raw bytes.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf)
    }

    /// Number of bytes remaining from the current position to the end of
    /// the wrapped segment.
    pub fn remaining(&self) -> u64 {
        let len = self.inner.get_ref().len() as u64;
        len.saturating_sub(self.inner.position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_fields() {
        let mut w = SketchWriter::with_capacity(16);
        w.write_u8(7);
        w.write_u16_le(1000);
        w.write_u32_le(70_000);
        w.write_u64_le(u64::MAX - 1);
        let bytes = w.into_bytes();

        let mut c = PositionalCursor::new(&bytes);
        assert_eq!(c.read_u8().unwrap(), 7);
        assert_eq!(c.read_u16_le().unwrap(), 1000);
        assert_eq!(c.read_u32_le().unwrap(), 70_000);
        assert_eq!(c.read_u64_le().unwrap(), u64::MAX - 1);
    }

    #[test]
    fn family_validates_id() {
        assert!(Family::BLOOM_FILTER.validate_id(24).is_ok());
        assert!(Family::BLOOM_FILTER.validate_id(10).is_err());
    }

    #[test]
    fn remaining_tracks_position() {
        let bytes = [0u8; 10];
        let mut c = PositionalCursor::new(&bytes);
        assert_eq!(c.remaining(), 10);
        c.read_u32_le().unwrap();
        assert_eq!(c.remaining(), 6);
    }
}
