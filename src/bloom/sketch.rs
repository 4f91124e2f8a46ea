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

use crate::bitarray::BitArray;
use crate::bitarray::BitStorage;
use crate::bitarray::ExternalMutStorage;
use crate::bitarray::ExternalStorage;
use crate::bitarray::HeapStorage;
use crate::codec::Family;
use crate::codec::PositionalCursor;
use crate::codec::SketchWriter;
use crate::error::Error;
use crate::hash::canonicalize_f64;
use crate::hash::murmur3_128;

const SERIAL_VERSION: u8 = 1;
const PREAMBLE_LONGS_EMPTY: u8 = 3;
const PREAMBLE_LONGS_STANDARD: u8 = 4;
const EMPTY_FLAG_MASK: u8 = 1;

const MIN_NUM_BITS: u64 = 64;
const MAX_NUM_BITS: u64 = (1u64 << 35) - 64;

/// Top bit cleared before the modulo, so the intermediate sum is always
/// treated as non-negative regardless of wraparound.
const NON_NEGATIVE_MASK: u64 = 0x7fff_ffff_ffff_ffff;

/// A value that can be canonically encoded to bytes for Bloom filter
/// hashing, per the filter's canonical-encoding table.
///
/// `canonical_bytes` returns `None` for inputs the filter treats as a
/// no-op (an empty string, an empty array); `update`/`query` on such an
/// input do nothing and report `false`.
pub trait HashableInput {
    /// Returns the canonical byte encoding of this value, or `None` if it
    /// is a no-op input.
    fn canonical_bytes(&self) -> Option<Vec<u8>>;
}

impl HashableInput for &str {
    fn canonical_bytes(&self) -> Option<Vec<u8>> {
        if self.is_empty() {
            None
        } else {
            Some(self.as_bytes().to_vec())
        }
    }
}

impl HashableInput for u64 {
    fn canonical_bytes(&self) -> Option<Vec<u8>> {
        Some(self.to_le_bytes().to_vec())
    }
}

impl HashableInput for f64 {
    fn canonical_bytes(&self) -> Option<Vec<u8>> {
        Some(canonicalize_f64(*self).to_le_bytes().to_vec())
    }
}

impl HashableInput for &[u8] {
    fn canonical_bytes(&self) -> Option<Vec<u8>> {
        if self.is_empty() { None } else { Some(self.to_vec()) }
    }
}

macro_rules! impl_hashable_array {
    ($elem:ty) => {
        impl HashableInput for &[$elem] {
            fn canonical_bytes(&self) -> Option<Vec<u8>> {
                if self.is_empty() {
                    None
                } else {
                    Some(self.iter().flat_map(|v| v.to_le_bytes()).collect())
                }
            }
        }
    };
}

impl_hashable_array!(i32);
impl_hashable_array!(i64);
impl_hashable_array!(i16);
impl_hashable_array!(f32);

/// A Bloom filter for probabilistic set membership testing.
///
/// No false negatives: every item ever passed to `update` (or the
/// update-half of `query_and_update`) always answers `query` with `true`
/// afterwards. False positives occur at a rate governed by `num_hashes`
/// and the bit array's load factor. Use [`BloomFilterBuilder`] to
/// construct instances.
///
/// Generic over its backing [`BitStorage`] so a filter can own its bits on
/// the heap (the common case, `BloomFilter<HeapStorage>` aka the `BloomFilter`
/// alias) or be built directly over a caller-supplied word buffer
/// (`BloomFilterBuilder::build_over_external_mut`/`build_over_external`) for
/// off-heap construction; the buffer must outlive the filter.
#[derive(Debug)]
pub struct BloomFilter<S: BitStorage = HeapStorage> {
    seed: u64,
    num_hashes: u16,
    bits: BitArray<S>,
}

impl<S: BitStorage> BloomFilter<S> {
    /// Total number of bits in the filter.
    pub fn capacity(&self) -> u64 {
        self.bits.capacity()
    }

    /// Number of hash functions (`k`) applied per update/query.
    pub fn num_hashes(&self) -> u16 {
        self.num_hashes
    }

    /// The hash seed shared by every hash function in this filter.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// True iff no bit has ever been set.
    pub fn is_empty(&self) -> bool {
        self.bits.cached_num_bits_set() == 0 && !self.bits.is_dirty()
    }

    /// Number of bits currently set to 1.
    pub fn num_bits_set(&mut self) -> u64 {
        self.bits.get_num_bits_set()
    }

    /// Fraction of bits set to 1.
    pub fn load_factor(&mut self) -> f64 {
        self.num_bits_set() as f64 / self.bits.capacity() as f64
    }

    /// Estimated current false-positive probability, derived from the
    /// load factor: `(1 - e^(-k * loadFactor))^k`.
    pub fn estimated_fpp(&mut self) -> f64 {
        let k = self.num_hashes as f64;
        let load = self.load_factor();
        (1.0 - (-k * load).exp()).powf(k)
    }

    /// Sets each of the `k` derived bits for `input`. A no-op input
    /// (empty string or array) leaves the filter unchanged.
    pub fn update<I: HashableInput>(&mut self, input: I) {
        let Some(bytes) = input.canonical_bytes() else {
            return;
        };
        let (h1, h2) = self.compute_hash(&bytes);
        self.set_bits(h1, h2);
    }

    /// Returns true iff all `k` derived bits for `input` are set. A no-op
    /// input always reports `false`.
    pub fn query<I: HashableInput>(&self, input: I) -> bool {
        let Some(bytes) = input.canonical_bytes() else {
            return false;
        };
        if self.is_empty() {
            return false;
        }
        let (h1, h2) = self.compute_hash(&bytes);
        self.check_bits(h1, h2)
    }

    /// Returns the pre-update `query` result while also performing
    /// `update`, in one hash computation. A no-op input reports `false`
    /// and performs no update.
    pub fn query_and_update<I: HashableInput>(&mut self, input: I) -> bool {
        let Some(bytes) = input.canonical_bytes() else {
            return false;
        };
        let (h1, h2) = self.compute_hash(&bytes);
        let was_present = self.check_bits(h1, h2);
        self.set_bits(h1, h2);
        was_present
    }

    /// Whether `self` and `other` share capacity, hash count, and seed and
    /// can therefore be merged.
    pub fn is_compatible<T: BitStorage>(&self, other: &BloomFilter<T>) -> bool {
        self.bits.capacity() == other.bits.capacity()
            && self.num_hashes == other.num_hashes
            && self.seed == other.seed
    }

    fn require_compatible<T: BitStorage>(&self, other: &BloomFilter<T>) -> Result<(), Error> {
        if self.is_compatible(other) {
            Ok(())
        } else {
            Err(Error::invalid_argument(
                "union/intersect requires equal capacity, num_hashes, and seed",
            ))
        }
    }

    /// Bitwise-ORs `other`'s bits into `self`. Requires equal capacity,
    /// `num_hashes`, and seed.
    pub fn union<T: BitStorage>(&mut self, other: &BloomFilter<T>) -> Result<(), Error> {
        self.require_compatible(other)?;
        self.bits.union(&other.bits)
    }

    /// Bitwise-ANDs `other`'s bits into `self`. Requires equal capacity,
    /// `num_hashes`, and seed.
    pub fn intersect<T: BitStorage>(&mut self, other: &BloomFilter<T>) -> Result<(), Error> {
        self.require_compatible(other)?;
        self.bits.intersect(&other.bits)
    }

    /// Flips every bit.
    pub fn invert(&mut self) -> Result<(), Error> {
        self.bits.invert()
    }

    /// Serializes the filter to bytes. An empty filter omits the payload
    /// entirely.
    pub fn serialize(&self) -> Vec<u8> {
        let is_empty = self.bits.cached_num_bits_set() == 0 && !self.bits.is_dirty();
        let preamble_longs = if is_empty {
            PREAMBLE_LONGS_EMPTY
        } else {
            PREAMBLE_LONGS_STANDARD
        };
        let payload_words = if is_empty { 0 } else { self.bits.num_words() + 1 };
        let mut w = SketchWriter::with_capacity(8 * (preamble_longs as usize + payload_words));

        w.write_u8(preamble_longs);
        w.write_u8(SERIAL_VERSION);
        w.write_u8(Family::BLOOM_FILTER.id);
        w.write_u8(if is_empty { EMPTY_FLAG_MASK } else { 0 });
        w.write_u16_le(self.num_hashes);
        w.write_u16_le(0); // reserved

        w.write_u64_le(self.seed);
        w.write_u64_le(self.bits.capacity());

        if !is_empty {
            w.write_u64_le(self.bits.cached_num_bits_set());
            for word in self.bits.to_words() {
                w.write_u64_le(word);
            }
        }

        w.into_bytes()
    }

    fn compute_hash(&self, bytes: &[u8]) -> (u64, u64) {
        murmur3_128(bytes, 0, bytes.len(), self.seed).expect("bytes is non-empty by construction")
    }

    fn check_bits(&self, h1: u64, h2: u64) -> bool {
        (0..self.num_hashes).all(|j| {
            let idx = self.compute_bit_index(h1, h2, j);
            self.bits.get_bit(idx).unwrap_or(false)
        })
    }

    fn set_bits(&mut self, h1: u64, h2: u64) {
        for j in 0..self.num_hashes {
            let idx = self.compute_bit_index(h1, h2, j);
            let _ = self.bits.set_bit(idx);
        }
    }

    fn compute_bit_index(&self, h1: u64, h2: u64, j: u16) -> u64 {
        let combined = h1.wrapping_add(u64::from(j).wrapping_mul(h2));
        (combined & NON_NEGATIVE_MASK) % self.bits.capacity()
    }
}

impl BloomFilter<HeapStorage> {
    /// Deserializes a filter previously produced by [`Self::serialize`].
    ///
    /// Always reconstructs a heap-owned filter; a caller that wants the
    /// restored bits to live in a specific external buffer should
    /// deserialize the payload bit-by-bit into that buffer itself rather
    /// than through this entry point.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut c = PositionalCursor::new(bytes);

        let preamble_longs = c.read_u8().map_err(|_| Error::insufficient_data("preamble_longs"))?;
        let serial_version = c.read_u8().map_err(|_| Error::insufficient_data("serial_version"))?;
        let family_id = c.read_u8().map_err(|_| Error::insufficient_data("family_id"))?;
        Family::BLOOM_FILTER.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, serial_version));
        }
        if preamble_longs != PREAMBLE_LONGS_EMPTY && preamble_longs != PREAMBLE_LONGS_STANDARD {
            return Err(Error::invalid_preamble_longs(PREAMBLE_LONGS_STANDARD, preamble_longs));
        }

        let flags = c.read_u8().map_err(|_| Error::insufficient_data("flags"))?;
        let is_empty = flags & EMPTY_FLAG_MASK != 0;

        let num_hashes = c.read_u16_le().map_err(|_| Error::insufficient_data("num_hashes"))?;
        let _reserved = c.read_u16_le().map_err(|_| Error::insufficient_data("reserved"))?;
        let seed = c.read_u64_le().map_err(|_| Error::insufficient_data("seed"))?;
        let capacity_bits = c.read_u64_le().map_err(|_| Error::insufficient_data("capacity_bits"))?;

        let num_words = capacity_bits.div_ceil(64) as usize;
        let mut bits = BitArray::new(capacity_bits);

        if !is_empty {
            let num_bits_set = c
                .read_u64_le()
                .map_err(|_| Error::insufficient_data("num_bits_set"))?;
            for w in 0..num_words {
                let word = c.read_u64_le().map_err(|_| Error::insufficient_data("bit_array"))?;
                bits.set_long(w as u64, word)?;
            }
            let actual = bits.get_num_bits_set();
            if actual != num_bits_set {
                return Err(Error::corrupt(format!(
                    "declared num_bits_set {num_bits_set} does not match actual {actual}"
                )));
            }
        }

        Ok(BloomFilter { seed, num_hashes, bits })
    }
}

/// Builder for [`BloomFilter`] instances: either size the filter directly
/// (`with_size`) or derive bit/hash counts from a target accuracy
/// (`with_accuracy`). `build` allocates the bit array on the heap;
/// `build_over_external_mut`/`build_over_external` place it in a
/// caller-supplied word buffer instead.
#[derive(Debug, Clone)]
pub struct BloomFilterBuilder {
    num_bits: u64,
    num_hashes: u16,
    seed: u64,
}

impl BloomFilterBuilder {
    /// Derives `numBits`/`numHashes` from a target false-positive
    /// probability and expected distinct-item count.
    pub fn with_accuracy(num_distinct: u64, fpp: f64) -> Result<Self, Error> {
        if num_distinct == 0 {
            return Err(Error::invalid_argument("num_distinct must be greater than 0"));
        }
        if !(fpp > 0.0 && fpp < 1.0) {
            return Err(Error::invalid_argument("fpp must be in (0.0, 1.0)"));
        }
        let num_bits = Self::suggest_num_bits(num_distinct, fpp);
        let num_hashes = Self::suggest_num_hashes_from_accuracy(num_distinct, num_bits);
        Ok(Self { num_bits, num_hashes, seed: crate::hash::DEFAULT_UPDATE_SEED })
    }

    /// Builds with an explicit bit count and hash-function count.
    pub fn with_size(num_bits: u64, num_hashes: u16) -> Result<Self, Error> {
        Self::validate_params(num_bits, num_hashes)?;
        Ok(Self { num_bits, num_hashes, seed: crate::hash::DEFAULT_UPDATE_SEED })
    }

    /// Overrides the default hash seed. Filters with different seeds are
    /// never mergeable.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Constructs the configured, empty [`BloomFilter`].
    pub fn build(self) -> BloomFilter {
        BloomFilter {
            seed: self.seed,
            num_hashes: self.num_hashes,
            bits: BitArray::new(self.num_bits),
        }
    }

    fn required_words(&self) -> usize {
        self.num_bits.div_ceil(64) as usize
    }

    /// Constructs the configured, empty [`BloomFilter`] directly over a
    /// caller-supplied mutable word buffer instead of the heap.
    ///
    /// `words` must already be zeroed and must outlive the returned filter;
    /// this crate never frees it. Fails with
    /// [`crate::error::ErrorKind::TooSmallBuffer`] if `words` has fewer
    /// words than the configured `num_bits` requires.
    pub fn build_over_external_mut(
        self,
        words: &mut [u64],
    ) -> Result<BloomFilter<ExternalMutStorage<'_>>, Error> {
        let needed = self.required_words();
        if words.len() < needed {
            return Err(Error::too_small_buffer(needed * 8, words.len() * 8));
        }
        Ok(BloomFilter {
            seed: self.seed,
            num_hashes: self.num_hashes,
            bits: BitArray::over_external_mut(words, 0),
        })
    }

    /// Builds a read-only [`BloomFilter`] view over a previously-serialized
    /// (or otherwise already-populated) word buffer. Every mutator on the
    /// result fails with a read-only error; queries work normally.
    pub fn build_over_external(
        self,
        words: &[u64],
        num_bits_set: u64,
    ) -> Result<BloomFilter<ExternalStorage<'_>>, Error> {
        let needed = self.required_words();
        if words.len() < needed {
            return Err(Error::too_small_buffer(needed * 8, words.len() * 8));
        }
        Ok(BloomFilter {
            seed: self.seed,
            num_hashes: self.num_hashes,
            bits: BitArray::over_external(words, num_bits_set),
        })
    }

    /// `ceil(-n * ln(p) / (ln 2)^2)`, rounded up to a multiple of 64 and
    /// clamped to an engineering-reasonable range.
    pub fn suggest_num_bits(num_distinct: u64, fpp: f64) -> u64 {
        let n = num_distinct as f64;
        let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        let bits = (-n * fpp.ln() / ln2_sq).ceil() as u64;
        bits.div_ceil(64).saturating_mul(64).clamp(MIN_NUM_BITS, MAX_NUM_BITS)
    }

    /// `max(1, round((m/n) * ln 2))`.
    pub fn suggest_num_hashes_from_accuracy(num_distinct: u64, num_bits: u64) -> u16 {
        let k = (num_bits as f64 / num_distinct as f64 * std::f64::consts::LN_2).round();
        (k as u16).max(1)
    }

    /// `ceil(-log2(p))`, clamped to `[1, 65535]`.
    pub fn suggest_num_hashes_from_fpp(fpp: f64) -> u16 {
        let k = (-fpp.log2()).ceil();
        (k as i64).clamp(1, u16::MAX as i64) as u16
    }

    fn validate_params(num_bits: u64, num_hashes: u16) -> Result<(), Error> {
        if !(MIN_NUM_BITS..=MAX_NUM_BITS).contains(&num_bits) {
            return Err(Error::invalid_argument(format!(
                "num_bits must be in [{MIN_NUM_BITS}, {MAX_NUM_BITS}]"
            )));
        }
        if num_hashes == 0 {
            return Err(Error::invalid_argument("num_hashes must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggest_num_bits_matches_reference_ballpark() {
        let bits = BloomFilterBuilder::suggest_num_bits(1000, 0.01);
        assert!(bits > 9000 && bits < 10000, "got {bits}");
    }

    #[test]
    fn suggest_num_hashes_from_fpp_matches_known_value() {
        assert_eq!(BloomFilterBuilder::suggest_num_hashes_from_fpp(0.01), 7);
    }

    #[test]
    fn suggest_num_hashes_from_accuracy_matches_known_value() {
        assert_eq!(
            BloomFilterBuilder::suggest_num_hashes_from_accuracy(1000, 10_000),
            7
        );
    }

    #[test]
    fn basic_membership_no_false_negatives() {
        let mut f = BloomFilterBuilder::with_size(8192, 3).unwrap().build();
        for i in 0..1000u64 {
            f.update(i);
        }
        assert!(!f.is_empty());
        for i in 0..1000u64 {
            assert!(f.query(i), "expected {i} to be present");
        }
    }

    #[test]
    fn scenario_s1_bloom_basic_membership() {
        let mut f = BloomFilterBuilder::with_size(8192, 3).unwrap().seed(0).build();
        for i in 0..1000u64 {
            f.query_and_update(i);
        }
        assert!(!f.is_empty());
        let n = 1000u64;
        let k = 3u64;
        let bits_set = f.num_bits_set();
        assert!(bits_set >= n * (k - 1) && bits_set <= n * k, "got {bits_set}");

        let hits = (0..2000u64).filter(|&i| f.query(i)).count();
        assert!((1000..1100).contains(&hits), "got {hits}");
    }

    #[test]
    fn query_and_update_reports_pre_update_state() {
        let mut f = BloomFilterBuilder::with_size(1024, 4).unwrap().build();
        assert!(!f.query_and_update("apple"));
        assert!(f.query_and_update("apple"));
    }

    #[test]
    fn empty_string_and_empty_array_are_no_ops() {
        let mut f = BloomFilterBuilder::with_size(1024, 4).unwrap().build();
        f.update("");
        assert!(f.is_empty());
        let empty: &[i32] = &[];
        assert!(!f.query_and_update(empty));
        assert!(f.is_empty());
    }

    #[test]
    fn union_requires_matching_parameters() {
        let a = BloomFilterBuilder::with_size(1024, 4).unwrap().build();
        let b = BloomFilterBuilder::with_size(2048, 4).unwrap().build();
        let mut a = a;
        assert!(a.union(&b).is_err());
    }

    #[test]
    fn union_is_commutative_on_set_bits() {
        let mut a = BloomFilterBuilder::with_size(1024, 4).unwrap().seed(7).build();
        let mut b = BloomFilterBuilder::with_size(1024, 4).unwrap().seed(7).build();
        a.update("x");
        b.update("y");

        let mut ab = BloomFilterBuilder::with_size(1024, 4).unwrap().seed(7).build();
        ab.update("x");
        ab.union(&b).unwrap();

        let mut ba = BloomFilterBuilder::with_size(1024, 4).unwrap().seed(7).build();
        ba.update("y");
        ba.union(&a).unwrap();

        assert_eq!(ab.bits.to_words(), ba.bits.to_words());
    }

    #[test]
    fn double_invert_restores_state() {
        let mut f = BloomFilterBuilder::with_size(1024, 4).unwrap().build();
        f.update("a");
        f.update("b");
        let before = f.bits.to_words();
        f.invert().unwrap();
        f.invert().unwrap();
        assert_eq!(f.bits.to_words(), before);
    }

    #[test]
    fn serialization_round_trips_non_empty_filter() {
        let mut f = BloomFilterBuilder::with_size(32768, 5).unwrap().seed(0).build();
        for i in 0..2500u64 {
            f.update(0.5 + i as f64);
        }
        let bytes = f.serialize();
        let mut restored = BloomFilter::deserialize(&bytes).unwrap();
        assert_eq!(restored.num_bits_set(), f.num_bits_set());
        for i in 0..32768u64 {
            let v = 0.5 + i as f64;
            assert_eq!(restored.query(v), f.query(v));
        }
    }

    #[test]
    fn serialization_round_trips_empty_filter() {
        let f = BloomFilterBuilder::with_size(1024, 4).unwrap().build();
        let bytes = f.serialize();
        let restored = BloomFilter::deserialize(&bytes).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.capacity(), f.capacity());
    }

    #[test]
    fn deserialize_rejects_wrong_family() {
        let f = BloomFilterBuilder::with_size(1024, 4).unwrap().build();
        let mut bytes = f.serialize();
        bytes[2] = Family::FREQUENCY.id;
        assert!(BloomFilter::deserialize(&bytes).is_err());
    }

    #[test]
    fn external_mut_buffer_filter_behaves_like_heap_filter() {
        let mut words = [0u64; 16]; // 1024 bits
        let mut f = BloomFilterBuilder::with_size(1024, 4)
            .unwrap()
            .build_over_external_mut(&mut words)
            .unwrap();
        for i in 0u64..20 {
            f.update(i);
        }
        for i in 0u64..20 {
            assert!(f.query(i));
        }
    }

    #[test]
    fn external_mut_buffer_too_small_is_rejected() {
        let mut words = [0u64; 4]; // only 256 bits, needs 16
        let err = BloomFilterBuilder::with_size(1024, 4)
            .unwrap()
            .build_over_external_mut(&mut words)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TooSmallBuffer);
    }

    #[test]
    fn external_read_only_buffer_rejects_mutation_but_allows_query() {
        let mut words = [0u64; 16];
        let num_bits_set;
        {
            let mut heap = BloomFilterBuilder::with_size(1024, 4).unwrap().build();
            heap.update("a");
            num_bits_set = heap.num_bits_set();
            words.copy_from_slice(&heap.bits.to_words());
        }

        let view = BloomFilterBuilder::with_size(1024, 4)
            .unwrap()
            .build_over_external(&words, num_bits_set)
            .unwrap();
        assert!(view.query("a"));
        assert!(!view.bits.is_writable());
    }

    #[test]
    fn known_vector_s6_murmurhash3() {
        let (h1, h2) =
            murmur3_128(b"The quick brown fox jumps over the lazy dog", 0, 43, 0).unwrap();
        assert_eq!(h1, 0xe34b_bc7b_bc07_1b6c);
        assert_eq!(h2, 0x7a43_3ca9_c49a_9347);
    }
}
