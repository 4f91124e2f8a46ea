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

//! MurmurHash3 x64-128 and xxHash64: bit-exact, seeded, non-cryptographic
//! hashing over arbitrary byte ranges.
//!
//! Every sketch in this crate derives its hash values from one of the two
//! primitives here. Seeds are always explicit parameters; there is no
//! module-level default seed.

mod xxhash;

pub use xxhash::XxHash64;

use std::hash::Hasher;

use crate::error::Error;

/// Default hash seed used by every sketch builder that does not take an
/// explicit seed. Matches the upstream DataSketches default.
pub const DEFAULT_UPDATE_SEED: u64 = 9001;

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

/// Reads a little-endian `u64` from the first 8 bytes of `bytes`.
///
/// # Panics
///
/// Panics if `bytes` has fewer than 8 bytes.
pub(crate) fn read_u64_le(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(bytes[..8].try_into().expect("at least 8 bytes"))
}

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

/// MurmurHash3 x64-128, exposed behind the `Hasher` trait so any `T: Hash`
/// can be hashed the same way [`XxHash64`] hashes it.
///
/// Unlike a streaming hasher, the x64-128 tail schedule depends on the total
/// input length, so bytes are buffered until [`Self::finish128`] is called
/// rather than mixed incrementally.
#[derive(Debug, Default)]
pub struct MurmurHash3X64128 {
    seed: u64,
    buffer: Vec<u8>,
}

impl MurmurHash3X64128 {
    /// Creates a hasher that will mix with the given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            buffer: Vec::new(),
        }
    }

    /// Returns the full 128-bit digest as `(h1, h2)`.
    pub fn finish128(&self) -> (u64, u64) {
        murmur3_x64_128(&self.buffer, self.seed)
    }
}

impl Hasher for MurmurHash3X64128 {
    fn finish(&self) -> u64 {
        self.finish128().0
    }

    fn write(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }
}

fn murmur3_x64_128(data: &[u8], seed: u64) -> (u64, u64) {
    let mut h1 = seed;
    let mut h2 = seed;
    let nblocks = data.len() / 16;

    for i in 0..nblocks {
        let block = &data[i * 16..i * 16 + 16];
        let mut k1 = read_u64_le(&block[0..8]);
        let mut k2 = read_u64_le(&block[8..16]);

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(27).wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
        h2 = h2.rotate_left(31).wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1: u64 = 0;
    let mut k2: u64 = 0;

    if tail.len() > 8 {
        for (i, &b) in tail[8..].iter().enumerate() {
            k2 ^= (b as u64) << (8 * i);
        }
        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
    }

    if !tail.is_empty() {
        for (i, &b) in tail[..tail.len().min(8)].iter().enumerate() {
            k1 ^= (b as u64) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    let len = data.len() as u64;
    h1 ^= len;
    h2 ^= len;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

/// Folds `-0.0` to `+0.0` and every NaN bit pattern to a single canonical
/// NaN, so that hashing a `f64` is independent of which of the many bit
/// patterns encoding "negative zero" or "not a number" was produced.
pub fn canonicalize_f64(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else if x.is_nan() {
        f64::NAN
    } else {
        x
    }
}

/// Canonicalizes a `f32` the same way [`canonicalize_f64`] does for `f64`.
pub fn canonicalize_f32(x: f32) -> f32 {
    if x == 0.0 {
        0.0
    } else if x.is_nan() {
        f32::NAN
    } else {
        x
    }
}

fn validate_range(total_len: usize, offset: usize, length: usize) -> Result<(), Error> {
    if length == 0 {
        return Err(Error::invalid_argument("hash input must not be null or empty"));
    }
    let end = offset
        .checked_add(length)
        .ok_or_else(|| Error::invalid_argument("offset + length overflows usize"))?;
    if end > total_len {
        return Err(Error::invalid_argument(format!(
            "range [{offset}, {end}) exceeds buffer of length {total_len}"
        )));
    }
    Ok(())
}

/// MurmurHash3 x64-128 over `bytes[offset..offset+length]`.
///
/// Blocks of 16 bytes are consumed little-endian as two 64-bit words; tail
/// bytes follow the canonical MurmurHash3 tail schedule; the final mix is
/// `fmix64` applied to each half.
pub fn murmur3_128(
    bytes: &[u8],
    offset: usize,
    length: usize,
    seed: u64,
) -> Result<(u64, u64), Error> {
    validate_range(bytes.len(), offset, length)?;
    Ok(murmur3_x64_128(&bytes[offset..offset + length], seed))
}

/// xxHash64 over `bytes[offset..offset+length]`.
pub fn xxhash64(bytes: &[u8], offset: usize, length: usize, seed: u64) -> Result<u64, Error> {
    validate_range(bytes.len(), offset, length)?;
    let mut hasher = XxHash64::with_seed(seed);
    hasher.write(&bytes[offset..offset + length]);
    Ok(hasher.finish64())
}

/// Hashes a single `u64`, identically to the 8-byte little-endian encoding
/// of that integer.
pub fn murmur3_128_u64(value: u64, seed: u64) -> (u64, u64) {
    murmur3_x64_128(&value.to_le_bytes(), seed)
}

/// Hashes a single `u64` with xxHash64, identically to its little-endian
/// byte encoding.
pub fn xxhash64_u64(value: u64, seed: u64) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    hasher.write(&value.to_le_bytes());
    hasher.finish64()
}

/// Hashes the UTF-8 bytes of `s`. An empty string is an invalid-argument
/// error, matching the byte-range primitive.
pub fn murmur3_128_str(s: &str, seed: u64) -> Result<(u64, u64), Error> {
    murmur3_128(s.as_bytes(), 0, s.len(), seed)
}

/// Hashes the UTF-8 bytes of `s` with xxHash64.
pub fn xxhash64_str(s: &str, seed: u64) -> Result<u64, Error> {
    xxhash64(s.as_bytes(), 0, s.len(), seed)
}

/// Hashes an array of `i16` ("short"): concatenated little-endian encoding
/// of each element.
pub fn murmur3_128_shorts(values: &[i16], seed: u64) -> Result<(u64, u64), Error> {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    murmur3_128(&bytes, 0, bytes.len(), seed)
}

/// Hashes an array of UTF-16 code units ("char").
pub fn murmur3_128_chars(values: &[u16], seed: u64) -> Result<(u64, u64), Error> {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    murmur3_128(&bytes, 0, bytes.len(), seed)
}

/// Hashes an array of `i32` ("int").
pub fn murmur3_128_ints(values: &[i32], seed: u64) -> Result<(u64, u64), Error> {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    murmur3_128(&bytes, 0, bytes.len(), seed)
}

/// Hashes an array of `i64` ("long").
pub fn murmur3_128_longs(values: &[i64], seed: u64) -> Result<(u64, u64), Error> {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    murmur3_128(&bytes, 0, bytes.len(), seed)
}

/// Hashes an array of `f32` ("float"), canonicalizing each element first.
pub fn murmur3_128_floats(values: &[f32], seed: u64) -> Result<(u64, u64), Error> {
    let bytes: Vec<u8> = values
        .iter()
        .flat_map(|&v| canonicalize_f32(v).to_le_bytes())
        .collect();
    murmur3_128(&bytes, 0, bytes.len(), seed)
}

/// Hashes an array of `f64` ("double"), canonicalizing each element first.
pub fn murmur3_128_doubles(values: &[f64], seed: u64) -> Result<(u64, u64), Error> {
    let bytes: Vec<u8> = values
        .iter()
        .flat_map(|&v| canonicalize_f64(v).to_le_bytes())
        .collect();
    murmur3_128(&bytes, 0, bytes.len(), seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mm3(s: &str, seed: u64) -> (u64, u64) {
        murmur3_128_str(s, seed).unwrap()
    }

    #[test]
    fn matches_known_vector_remainder_gt_8() {
        assert_eq!(
            mm3("The quick brown fox jumps over the lazy dog", 0),
            (0xe34b_bc7b_bc07_1b6c, 0x7a43_3ca9_c49a_9347)
        );
    }

    #[test]
    fn matches_known_vector_one_bit_changed() {
        assert_eq!(
            mm3("The quick brown fox jumps over the lazy eog", 0),
            (0x3621_0810_2c62_d1c9, 0x3285_cd10_0292_b305)
        );
    }

    #[test]
    fn matches_known_vector_remainder_lt_8() {
        assert_eq!(
            mm3("The quick brown fox jumps over the lazy dogdogdog", 0),
            (0x9c82_0530_0e61_2fc4, 0xcbc0_af61_36aa_3df9)
        );
    }

    #[test]
    fn matches_known_vector_remainder_eq_8() {
        assert_eq!(
            mm3("The quick brown fox jumps over the lazy1", 0),
            (0xe330_1a82_7e5c_dfe3, 0xbdbf_05f8_da0f_0392)
        );
    }

    #[test]
    fn matches_known_vector_remainder_eq_0() {
        assert_eq!(
            mm3("The quick brown fox jumps over t", 0),
            (0xdf6a_f91b_b29b_dacf, 0x91a3_41c5_8df1_f3a6)
        );
    }

    #[test]
    fn matches_known_vector_raw_bytes_with_extrema() {
        let key: [u8; 47] = [
            0x54, 0x68, 0x65, 0x20, 0x71, 0x75, 0x69, 0x63, 0x6b, 0x20, 0x62, 0x72, 0x6f, 0x77,
            0x6e, 0x20, 0x66, 0x6f, 0x78, 0x20, 0x6a, 0x75, 0x6d, 0x70, 0x73, 0x20, 0x6f, 0x76,
            0x65, 0x72, 0x20, 0x74, 0x68, 0x65, 0x20, 0x6c, 0x61, 0x7a, 0x79, 0x20, 0x64, 0x6f,
            0x67, 0xff, 0x64, 0x6f, 0x67, 0x00,
        ];
        let (h1, h2) = murmur3_128(&key, 0, key.len(), 0).unwrap();
        assert_eq!((h1, h2), (0xe88a_bda7_8592_9c9e, 0x96b9_8587_cacc_83d6));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(murmur3_128_str("", 0).is_err());
        assert!(xxhash64_str("", 0).is_err());
    }

    #[test]
    fn rejects_out_of_range_segment() {
        let bytes = [1u8, 2, 3];
        assert!(murmur3_128(&bytes, 2, 5, 0).is_err());
    }

    #[test]
    fn hasher_trait_matches_free_function() {
        let mut hasher = MurmurHash3X64128::with_seed(0);
        hasher.write(b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            hasher.finish128(),
            (0xe34b_bc7b_bc07_1b6c, 0x7a43_3ca9_c49a_9347)
        );
    }

    #[test]
    fn u64_overload_matches_byte_encoding() {
        let value: u64 = 0x1122_3344_5566_7788;
        let direct = murmur3_128(&value.to_le_bytes(), 0, 8, 42).unwrap();
        assert_eq!(murmur3_128_u64(value, 42), direct);
    }

    #[test]
    fn canonicalizes_negative_zero_and_nan() {
        assert_eq!(canonicalize_f64(-0.0).to_bits(), 0.0f64.to_bits());
        assert!(canonicalize_f64(f64::NAN).is_nan());
        assert_eq!(
            canonicalize_f64(f64::from_bits(0x7ff8_0000_0000_0001)).to_bits(),
            f64::NAN.to_bits()
        );
    }

    #[test]
    fn doubles_overload_canonicalizes_each_element() {
        let a = murmur3_128_doubles(&[-0.0, 1.5], 0).unwrap();
        let b = murmur3_128_doubles(&[0.0, 1.5], 0).unwrap();
        assert_eq!(a, b);
    }
}
