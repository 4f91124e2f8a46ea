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

//! A fixed-capacity bit vector with three storage representations: a
//! heap-owned mutable backing, a mutable view over externally-supplied
//! words, and a read-only view over externally-supplied words.
//!
//! [`BitArray`] is a single generic type parameterized by a small
//! [`BitStorage`] abstraction rather than three duck-typed variants, so the
//! read-only representation's `write_word` is simply the error path instead
//! of a separate code path callers must remember to avoid.

use crate::error::Error;

/// A word-addressable backing store for a [`BitArray`].
///
/// Implementations own (or borrow) a sequence of 64-bit words and expose
/// them positionally; [`BitArray`] never reaches past `num_words()`.
pub trait BitStorage {
    /// Number of 64-bit words backing the array.
    fn num_words(&self) -> usize;

    /// Reads word `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.num_words()`.
    fn read_word(&self, index: usize) -> u64;

    /// Writes `value` into word `index`.
    ///
    /// # Errors
    ///
    /// Returns a read-only error if this storage does not permit mutation.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.num_words()`.
    fn write_word(&mut self, index: usize, value: u64) -> Result<(), Error>;

    /// Whether this storage accepts `write_word`.
    fn is_writable(&self) -> bool;
}

/// Heap-allocated, owned, always-writable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStorage {
    words: Vec<u64>,
}

impl HeapStorage {
    /// Allocates `num_words` zeroed words.
    pub fn new(num_words: usize) -> Self {
        Self {
            words: vec![0u64; num_words],
        }
    }
}

impl BitStorage for HeapStorage {
    fn num_words(&self) -> usize {
        self.words.len()
    }

    fn read_word(&self, index: usize) -> u64 {
        self.words[index]
    }

    fn write_word(&mut self, index: usize, value: u64) -> Result<(), Error> {
        self.words[index] = value;
        Ok(())
    }

    fn is_writable(&self) -> bool {
        true
    }
}

/// A mutable view over a caller-supplied, non-owned word slice.
///
/// The referenced buffer must outlive the `BitArray` built over it; this
/// type never frees it.
#[derive(Debug, PartialEq, Eq)]
pub struct ExternalMutStorage<'a> {
    words: &'a mut [u64],
}

impl<'a> ExternalMutStorage<'a> {
    /// Wraps `words` for mutable access.
    pub fn new(words: &'a mut [u64]) -> Self {
        Self { words }
    }
}

impl BitStorage for ExternalMutStorage<'_> {
    fn num_words(&self) -> usize {
        self.words.len()
    }

    fn read_word(&self, index: usize) -> u64 {
        self.words[index]
    }

    fn write_word(&mut self, index: usize, value: u64) -> Result<(), Error> {
        self.words[index] = value;
        Ok(())
    }

    fn is_writable(&self) -> bool {
        true
    }
}

/// A read-only view over a caller-supplied word slice.
///
/// Every mutator on a `BitArray<ExternalStorage>` fails with
/// [`crate::error::ErrorKind::ReadOnly`]; every reader works normally.
#[derive(Debug, PartialEq, Eq)]
pub struct ExternalStorage<'a> {
    words: &'a [u64],
}

impl<'a> ExternalStorage<'a> {
    /// Wraps `words` for read-only access.
    pub fn new(words: &'a [u64]) -> Self {
        Self { words }
    }
}

impl BitStorage for ExternalStorage<'_> {
    fn num_words(&self) -> usize {
        self.words.len()
    }

    fn read_word(&self, index: usize) -> u64 {
        self.words[index]
    }

    fn write_word(&mut self, _index: usize, _value: u64) -> Result<(), Error> {
        Err(Error::read_only("write to BitArray word"))
    }

    fn is_writable(&self) -> bool {
        false
    }
}

/// A fixed-capacity sequence of bits over a pluggable [`BitStorage`] backing.
///
/// `capacity` bits are always rounded up to a multiple of 64 at construction;
/// words past the last bit of `capacity` are always zero and stay that way,
/// since every mutator that can touch the tail word masks it.
#[derive(Debug)]
pub struct BitArray<S: BitStorage> {
    storage: S,
    capacity: u64,
    num_bits_set: u64,
    is_dirty: bool,
}

fn word_count_for(capacity: u64) -> usize {
    capacity.div_ceil(64) as usize
}

impl BitArray<HeapStorage> {
    /// Creates a heap-backed, all-zero `BitArray` of at least `n` bits.
    ///
    /// Effective capacity is `ceil(n/64)*64`; `n == 0` yields a
    /// zero-capacity array (no words, every operation out-of-range).
    pub fn new(n: u64) -> Self {
        let capacity = word_count_for(n) as u64 * 64;
        Self {
            storage: HeapStorage::new(word_count_for(n)),
            capacity,
            num_bits_set: 0,
            is_dirty: false,
        }
    }
}

impl<'a> BitArray<ExternalMutStorage<'a>> {
    /// Builds a writable view over `words`, each bit of which is assumed
    /// zeroed by the caller when starting from empty.
    pub fn over_external_mut(words: &'a mut [u64], num_bits_set: u64) -> Self {
        let capacity = words.len() as u64 * 64;
        Self {
            storage: ExternalMutStorage::new(words),
            capacity,
            num_bits_set,
            is_dirty: false,
        }
    }
}

impl<'a> BitArray<ExternalStorage<'a>> {
    /// Builds a read-only view over `words`.
    pub fn over_external(words: &'a [u64], num_bits_set: u64) -> Self {
        let capacity = words.len() as u64 * 64;
        Self {
            storage: ExternalStorage::new(words),
            capacity,
            num_bits_set,
            is_dirty: false,
        }
    }
}

impl<S: BitStorage> BitArray<S> {
    /// Total addressable bit capacity (always a multiple of 64).
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of 64-bit words backing this array.
    pub fn num_words(&self) -> usize {
        self.storage.num_words()
    }

    /// Whether this array's storage accepts mutation.
    pub fn is_writable(&self) -> bool {
        self.storage.is_writable()
    }

    fn check_index(&self, i: u64) -> Result<(), Error> {
        if i >= self.capacity {
            Err(Error::out_of_range(i, self.capacity))
        } else {
            Ok(())
        }
    }

    /// Returns the bit at index `i`.
    pub fn get_bit(&self, i: u64) -> Result<bool, Error> {
        self.check_index(i)?;
        let word = self.storage.read_word((i / 64) as usize);
        Ok((word >> (i % 64)) & 1 == 1)
    }

    /// Returns the prior value of bit `i` and sets it to 1, maintaining
    /// `num_bits_set` exactly without marking the array dirty.
    pub fn get_and_set_bit(&mut self, i: u64) -> Result<bool, Error> {
        self.check_index(i)?;
        let word_idx = (i / 64) as usize;
        let mask = 1u64 << (i % 64);
        let word = self.storage.read_word(word_idx);
        let was_set = word & mask != 0;
        if !was_set {
            self.storage.write_word(word_idx, word | mask)?;
            self.num_bits_set += 1;
        }
        Ok(was_set)
    }

    /// Sets bit `i` to 1 and marks the array dirty.
    pub fn set_bit(&mut self, i: u64) -> Result<(), Error> {
        self.check_index(i)?;
        let word_idx = (i / 64) as usize;
        let mask = 1u64 << (i % 64);
        let word = self.storage.read_word(word_idx);
        self.storage.write_word(word_idx, word | mask)?;
        self.is_dirty = true;
        Ok(())
    }

    /// Clears bit `i` to 0 and marks the array dirty.
    pub fn clear_bit(&mut self, i: u64) -> Result<(), Error> {
        self.check_index(i)?;
        let word_idx = (i / 64) as usize;
        let mask = 1u64 << (i % 64);
        let word = self.storage.read_word(word_idx);
        self.storage.write_word(word_idx, word & !mask)?;
        self.is_dirty = true;
        Ok(())
    }

    /// Writes `b` at bit `i` and marks the array dirty.
    pub fn assign_bit(&mut self, i: u64, b: bool) -> Result<(), Error> {
        if b { self.set_bit(i) } else { self.clear_bit(i) }
    }

    /// Reads `n` bits (`n <= 64`) starting at bit `i`, spanning at most two
    /// words, returned as the low `n` bits of the result.
    pub fn get_bits(&self, i: u64, n: u32) -> Result<u64, Error> {
        if n == 0 {
            return Ok(0);
        }
        self.check_index(i)?;
        self.check_index(i + u64::from(n) - 1)?;

        let word_idx = (i / 64) as usize;
        let bit_off = i % 64;
        let lo = self.storage.read_word(word_idx);
        let mut value = lo >> bit_off;

        let bits_from_lo = 64 - bit_off;
        if u64::from(n) > bits_from_lo && word_idx + 1 < self.storage.num_words() {
            let hi = self.storage.read_word(word_idx + 1);
            value |= hi << bits_from_lo;
        }

        if n == 64 {
            Ok(value)
        } else {
            Ok(value & ((1u64 << n) - 1))
        }
    }

    /// Writes the low `n` bits (`n <= 64`) of `v` starting at bit `i`, and
    /// marks the array dirty.
    pub fn set_bits(&mut self, i: u64, n: u32, v: u64) -> Result<(), Error> {
        if n == 0 {
            return Ok(());
        }
        self.check_index(i)?;
        self.check_index(i + u64::from(n) - 1)?;

        let masked = if n == 64 { v } else { v & ((1u64 << n) - 1) };

        let word_idx = (i / 64) as usize;
        let bit_off = i % 64;
        let lo = self.storage.read_word(word_idx);
        let lo_mask = if n == 64 && bit_off == 0 {
            u64::MAX
        } else {
            ((1u64 << n.min(64 - bit_off as u32)) - 1) << bit_off
        };
        let new_lo = (lo & !lo_mask) | ((masked << bit_off) & lo_mask);
        self.storage.write_word(word_idx, new_lo)?;

        let bits_from_lo = 64 - bit_off;
        if u64::from(n) > bits_from_lo {
            let hi = self.storage.read_word(word_idx + 1);
            let hi_bits = n - bits_from_lo as u32;
            let hi_mask = (1u64 << hi_bits) - 1;
            let new_hi = (hi & !hi_mask) | ((masked >> bits_from_lo) & hi_mask);
            self.storage.write_word(word_idx + 1, new_hi)?;
        }

        self.is_dirty = true;
        Ok(())
    }

    /// Reads word `w` in full.
    pub fn get_long(&self, w: u64) -> Result<u64, Error> {
        if w >= self.storage.num_words() as u64 {
            return Err(Error::out_of_range(w, self.storage.num_words()));
        }
        Ok(self.storage.read_word(w as usize))
    }

    /// Writes word `w` in full and marks the array dirty.
    pub fn set_long(&mut self, w: u64, v: u64) -> Result<(), Error> {
        if w >= self.storage.num_words() as u64 {
            return Err(Error::out_of_range(w, self.storage.num_words()));
        }
        self.storage.write_word(w as usize, v)?;
        self.is_dirty = true;
        Ok(())
    }

    fn tail_mask(&self) -> u64 {
        let excess = self.capacity % 64;
        if excess == 0 { u64::MAX } else { (1u64 << excess) - 1 }
    }

    /// Bitwise NOT over all `capacity` bits. `num_bits_set` is maintained
    /// exactly (`capacity - num_bits_set`) without a popcount scan.
    pub fn invert(&mut self) -> Result<(), Error> {
        if !self.storage.is_writable() {
            return Err(Error::read_only("invert BitArray"));
        }
        let n = self.storage.num_words();
        for idx in 0..n {
            let word = self.storage.read_word(idx);
            let inverted = if idx + 1 == n {
                !word & self.tail_mask()
            } else {
                !word
            };
            self.storage.write_word(idx, inverted)?;
        }
        self.num_bits_set = self.capacity - self.num_bits_set;
        self.is_dirty = false;
        Ok(())
    }

    /// Zeroes every bit. `num_bits_set` is maintained exactly as 0.
    pub fn reset(&mut self) -> Result<(), Error> {
        if !self.storage.is_writable() {
            return Err(Error::read_only("reset BitArray"));
        }
        for idx in 0..self.storage.num_words() {
            self.storage.write_word(idx, 0)?;
        }
        self.num_bits_set = 0;
        self.is_dirty = false;
        Ok(())
    }

    /// ORs `other` into `self`, word by word. Requires equal capacity.
    pub fn union<T: BitStorage>(&mut self, other: &BitArray<T>) -> Result<(), Error> {
        if !self.storage.is_writable() {
            return Err(Error::read_only("union into BitArray"));
        }
        if self.capacity != other.capacity {
            return Err(Error::invalid_argument(format!(
                "union requires equal capacity: {} vs {}",
                self.capacity, other.capacity
            )));
        }
        for idx in 0..self.storage.num_words() {
            let merged = self.storage.read_word(idx) | other.storage.read_word(idx);
            self.storage.write_word(idx, merged)?;
        }
        self.is_dirty = true;
        Ok(())
    }

    /// ANDs `other` into `self`, word by word. Requires equal capacity.
    pub fn intersect<T: BitStorage>(&mut self, other: &BitArray<T>) -> Result<(), Error> {
        if !self.storage.is_writable() {
            return Err(Error::read_only("intersect into BitArray"));
        }
        if self.capacity != other.capacity {
            return Err(Error::invalid_argument(format!(
                "intersect requires equal capacity: {} vs {}",
                self.capacity, other.capacity
            )));
        }
        for idx in 0..self.storage.num_words() {
            let merged = self.storage.read_word(idx) & other.storage.read_word(idx);
            self.storage.write_word(idx, merged)?;
        }
        self.is_dirty = true;
        Ok(())
    }

    /// If dirty, scans and recaches the exact population count; otherwise
    /// returns the cached value.
    pub fn get_num_bits_set(&mut self) -> u64 {
        if self.is_dirty {
            let mut count = 0u64;
            for idx in 0..self.storage.num_words() {
                count += self.storage.read_word(idx).count_ones() as u64;
            }
            self.num_bits_set = count;
            self.is_dirty = false;
        }
        self.num_bits_set
    }

    /// Returns the cached population count without reconciling a dirty
    /// array. Prefer [`Self::get_num_bits_set`] unless a stale-but-fast
    /// read is explicitly acceptable.
    pub fn cached_num_bits_set(&self) -> u64 {
        self.num_bits_set
    }

    /// Whether the cached population count may be stale.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Copies every word out as an owned vector, e.g. for serialization.
    pub fn to_words(&self) -> Vec<u64> {
        (0..self.storage.num_words())
            .map(|idx| self.storage.read_word(idx))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rounds_up_to_multiple_of_64() {
        let a = BitArray::new(1);
        assert_eq!(a.capacity(), 64);
        let b = BitArray::new(65);
        assert_eq!(b.capacity(), 128);
        let c = BitArray::new(128);
        assert_eq!(c.capacity(), 128);
    }

    #[test]
    fn set_get_clear_round_trip() {
        let mut a = BitArray::new(128);
        assert!(!a.get_bit(10).unwrap());
        a.set_bit(10).unwrap();
        assert!(a.get_bit(10).unwrap());
        a.clear_bit(10).unwrap();
        assert!(!a.get_bit(10).unwrap());
    }

    #[test]
    fn get_and_set_bit_maintains_count_without_dirtying() {
        let mut a = BitArray::new(64);
        assert!(!a.is_dirty());
        assert!(!a.get_and_set_bit(5).unwrap());
        assert_eq!(a.cached_num_bits_set(), 1);
        assert!(!a.is_dirty());
        assert!(a.get_and_set_bit(5).unwrap());
        assert_eq!(a.cached_num_bits_set(), 1);
    }

    #[test]
    fn out_of_range_rejected() {
        let a = BitArray::new(64);
        assert!(a.get_bit(64).is_err());
        assert!(a.get_bit(1000).is_err());
    }

    #[test]
    fn get_bits_spans_two_words() {
        let mut a = BitArray::new(128);
        a.set_long(0, 0xffff_ffff_ffff_ffff).unwrap();
        a.set_long(1, 0x0000_0000_0000_000f).unwrap();
        // bits [60, 68) straddle word 0 (top 4 bits) and word 1 (bottom 4 bits).
        let v = a.get_bits(60, 8).unwrap();
        assert_eq!(v, 0xff);
    }

    #[test]
    fn set_bits_spans_two_words_and_preserves_neighbors() {
        let mut a = BitArray::new(128);
        a.set_bits(60, 8, 0xab).unwrap();
        assert_eq!(a.get_bits(60, 8).unwrap(), 0xab);
        assert_eq!(a.get_bits(0, 60).unwrap(), 0);
        assert_eq!(a.get_bits(68, 60).unwrap(), 0);
    }

    #[test]
    fn invert_maintains_count_exactly() {
        let mut a = BitArray::new(64);
        a.set_bit(0).unwrap();
        a.set_bit(1).unwrap();
        a.get_num_bits_set();
        a.invert().unwrap();
        assert_eq!(a.get_num_bits_set(), 62);
        assert!(!a.get_bit(0).unwrap());
        assert!(a.get_bit(2).unwrap());
    }

    #[test]
    fn invert_masks_tail_bits_beyond_capacity_for_partial_word() {
        let mut a = BitArray::new(70); // rounds to 128 bits, 2 words
        a.invert().unwrap();
        assert_eq!(a.get_num_bits_set(), 128);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut a = BitArray::new(64);
        a.set_bit(3).unwrap();
        a.reset().unwrap();
        assert_eq!(a.get_num_bits_set(), 0);
        assert!(!a.get_bit(3).unwrap());
    }

    #[test]
    fn union_and_intersect_require_equal_capacity() {
        let mut a = BitArray::new(64);
        let b = BitArray::new(128);
        assert!(a.union(&b).is_err());
        assert!(a.intersect(&b).is_err());
    }

    #[test]
    fn union_ors_words() {
        let mut a = BitArray::new(64);
        let mut b = BitArray::new(64);
        a.set_bit(0).unwrap();
        b.set_bit(1).unwrap();
        a.union(&b).unwrap();
        assert!(a.get_bit(0).unwrap());
        assert!(a.get_bit(1).unwrap());
    }

    #[test]
    fn intersect_ands_words() {
        let mut a = BitArray::new(64);
        let mut b = BitArray::new(64);
        a.set_bit(0).unwrap();
        a.set_bit(1).unwrap();
        b.set_bit(1).unwrap();
        a.intersect(&b).unwrap();
        assert!(!a.get_bit(0).unwrap());
        assert!(a.get_bit(1).unwrap());
    }

    #[test]
    fn read_only_external_storage_rejects_mutation() {
        let words = [0u64; 2];
        let mut view = BitArray::over_external(&words, 0);
        assert!(!view.is_writable());
        assert!(!view.get_bit(0).unwrap());
        assert!(view.set_bit(0).is_err());
        assert!(view.reset().is_err());
        assert!(view.invert().is_err());
    }

    #[test]
    fn external_mut_storage_writes_through() {
        let mut words = [0u64; 2];
        {
            let mut view = BitArray::over_external_mut(&mut words, 0);
            view.set_bit(65).unwrap();
        }
        assert_eq!(words[1], 0b10);
    }

    #[test]
    fn dirty_tracking_forces_rescan() {
        let mut a = BitArray::new(64);
        a.set_bit(0).unwrap();
        assert!(a.is_dirty());
        assert_eq!(a.get_num_bits_set(), 1);
        assert!(!a.is_dirty());
    }
}
