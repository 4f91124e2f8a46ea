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

//! Quotient filter: an approximate set over a single flat array of slots,
//! each carrying three metadata bits (`is_occupied`, `is_continuation`,
//! `is_shifted`) alongside a fingerprint, supporting deletion and doubling
//! expansion without rehashing the stored items.
//!
//! Slots live in a [`crate::bitarray::BitArray`] rather than a bespoke
//! bit-packed vector: `bits_per_slot = fingerprint_bits + 3` always fits the
//! two-word span `get_bits`/`set_bits` already handle.

use std::collections::VecDeque;
use std::hash::Hash;
use std::hash::Hasher;

use crate::bitarray::BitArray;
use crate::bitarray::HeapStorage;
use crate::codec::Family;
use crate::codec::PositionalCursor;
use crate::codec::SketchWriter;
use crate::error::Error;
use crate::hash::MurmurHash3X64128;

const OCCUPIED_MASK: u64 = 0b001;
const CONTINUATION_MASK: u64 = 0b010;
const SHIFTED_MASK: u64 = 0b100;
const METADATA_BITS: u32 = 3;
const METADATA_MASK: u64 = 0b111;

const MIN_LG_NUM_SLOTS: u8 = 1;
const MAX_LG_NUM_SLOTS: u8 = 31;
const MIN_FINGERPRINT_BITS: u8 = 1;
const MAX_FINGERPRINT_BITS: u8 = 61;
const DEFAULT_MAX_LOAD_FACTOR: f64 = 0.8;

/// An approximate set supporting insert, lookup and delete with a bounded
/// false-positive rate, backed by a single bit-packed slot array.
#[derive(Debug)]
pub struct QuotientFilter {
    lg_num_slots: u8,
    fingerprint_bits: u8,
    num_entries: u64,
    num_expansions: u32,
    max_load_factor: f64,
    seed: u64,
    slots: BitArray<HeapStorage>,
}

fn check_lg_num_slots(lg_num_slots: u8) -> Result<(), Error> {
    if !(MIN_LG_NUM_SLOTS..=MAX_LG_NUM_SLOTS).contains(&lg_num_slots) {
        return Err(Error::invalid_argument(format!(
            "lgNumSlots must be in [{MIN_LG_NUM_SLOTS}, {MAX_LG_NUM_SLOTS}], got {lg_num_slots}"
        )));
    }
    Ok(())
}

fn check_fingerprint_bits(fingerprint_bits: u8) -> Result<(), Error> {
    if !(MIN_FINGERPRINT_BITS..=MAX_FINGERPRINT_BITS).contains(&fingerprint_bits) {
        return Err(Error::invalid_argument(format!(
            "fingerprintBits must be in [{MIN_FINGERPRINT_BITS}, {MAX_FINGERPRINT_BITS}], got {fingerprint_bits}"
        )));
    }
    Ok(())
}

impl QuotientFilter {
    /// Builds an empty filter with `2^lg_num_slots` slots, each carrying a
    /// `fingerprint_bits`-wide fingerprint, hashing items with `seed`.
    pub fn new(lg_num_slots: u8, fingerprint_bits: u8, seed: u64) -> Result<Self, Error> {
        check_lg_num_slots(lg_num_slots)?;
        check_fingerprint_bits(fingerprint_bits)?;
        let num_slots = 1u64 << lg_num_slots;
        let bits_per_slot = u32::from(fingerprint_bits) + METADATA_BITS;
        Ok(Self {
            lg_num_slots,
            fingerprint_bits,
            num_entries: 0,
            num_expansions: 0,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            seed,
            slots: BitArray::new(num_slots * u64::from(bits_per_slot)),
        })
    }

    /// Overrides the default load factor (0.8) that triggers expansion.
    pub fn with_max_load_factor(mut self, max_load_factor: f64) -> Result<Self, Error> {
        if !(max_load_factor > 0.0 && max_load_factor <= 1.0) {
            return Err(Error::invalid_argument(format!(
                "maxLoadFactor must be in (0, 1], got {max_load_factor}"
            )));
        }
        self.max_load_factor = max_load_factor;
        Ok(self)
    }

    fn num_slots(&self) -> usize {
        1usize << self.lg_num_slots
    }

    fn bits_per_slot(&self) -> u32 {
        u32::from(self.fingerprint_bits) + METADATA_BITS
    }

    fn slot_offset(&self, index: usize) -> u64 {
        index as u64 * u64::from(self.bits_per_slot())
    }

    fn get_slot(&self, index: usize) -> u64 {
        self.slots
            .get_bits(self.slot_offset(index), self.bits_per_slot())
            .expect("index within num_slots is always in range")
    }

    fn set_slot(&mut self, index: usize, value: u64) {
        self.slots
            .set_bits(self.slot_offset(index), self.bits_per_slot(), value)
            .expect("index within num_slots is always in range");
    }

    fn increment_index(&self, index: usize) -> usize {
        (index + 1) % self.num_slots()
    }

    fn decrement_index(&self, index: usize) -> usize {
        (index + self.num_slots() - 1) % self.num_slots()
    }

    fn slot_fingerprint(&self, slot: u64) -> u64 {
        slot >> METADATA_BITS
    }

    /// Number of entries currently stored.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Number of times this filter has doubled its slot count.
    pub fn num_expansions(&self) -> u32 {
        self.num_expansions
    }

    /// `log2` of the current slot count.
    pub fn lg_num_slots(&self) -> u8 {
        self.lg_num_slots
    }

    /// Width, in bits, of each slot's fingerprint.
    pub fn fingerprint_bits(&self) -> u8 {
        self.fingerprint_bits
    }

    /// Fraction of slots currently holding an entry.
    pub fn load_factor(&self) -> f64 {
        self.num_entries as f64 / self.num_slots() as f64
    }

    fn should_expand(&self) -> bool {
        (self.num_entries + 1) as f64 / self.num_slots() as f64 > self.max_load_factor
    }

    fn hash_to_quotient_fingerprint<T: Hash + ?Sized>(&self, item: &T) -> (usize, u64) {
        let mut hasher = MurmurHash3X64128::with_seed(self.seed);
        item.hash(&mut hasher);
        let (h1, _h2) = hasher.finish128();
        let quotient = (h1 >> (64 - u32::from(self.lg_num_slots))) as usize;
        let remainder_space = h1 << u32::from(self.lg_num_slots);
        let mut fingerprint = remainder_space >> (64 - u32::from(self.fingerprint_bits));
        if fingerprint == 0 {
            fingerprint = 1;
        }
        (quotient, fingerprint)
    }

    /// Returns `(cluster_start, run_start, occupied_count)` for the run that
    /// canonically belongs to `quotient`, walking back to the start of its
    /// cluster and then forward to the first slot of its own run.
    fn get_run_start(&self, quotient: usize) -> usize {
        let mut index = quotient;
        let mut occupied_count = 0u64;
        loop {
            let slot = self.get_slot(index);
            if slot & OCCUPIED_MASK != 0 {
                occupied_count += 1;
            }
            if slot & SHIFTED_MASK == 0 {
                break;
            }
            index = self.decrement_index(index);
        }

        let mut runs_count = 0u64;
        loop {
            let slot = self.get_slot(index);
            if slot & CONTINUATION_MASK == 0 {
                runs_count += 1;
            }
            if runs_count == occupied_count {
                break;
            }
            index = self.increment_index(index);
        }
        index
    }

    /// Inserts `new_slot`'s metadata/fingerprint at `index`, shifting every
    /// subsequent occupied slot one position to the right until an empty
    /// slot absorbs the tail. The `is_occupied` bit is positional: it stays
    /// with the slot index it describes rather than traveling with the
    /// fingerprint being shifted.
    fn insert_and_shift_right(&mut self, mut index: usize, mut new_slot: u64) {
        loop {
            let curr = self.get_slot(index);
            // `is_occupied` is positional, not content: a slot can carry it
            // while storing nothing of its own (e.g. the slot we just
            // marked occupied for a brand-new run, right before writing
            // its first entry). Emptiness is about the other three fields.
            let is_empty = curr & !OCCUPIED_MASK == 0;
            let occupied_bit = curr & OCCUPIED_MASK;
            let carried = (curr & !OCCUPIED_MASK) | (new_slot & OCCUPIED_MASK);
            self.set_slot(index, (new_slot & !OCCUPIED_MASK) | occupied_bit);
            if is_empty {
                break;
            }
            new_slot = carried | SHIFTED_MASK;
            index = self.increment_index(index);
        }
    }

    fn contains_qfp(&self, quotient: usize, fingerprint: u64) -> bool {
        let head = self.get_slot(quotient);
        if head & OCCUPIED_MASK == 0 {
            return false;
        }
        let run_start = self.get_run_start(quotient);
        let mut index = run_start;
        loop {
            let slot = self.get_slot(index);
            if self.slot_fingerprint(slot) == fingerprint {
                return true;
            }
            index = self.increment_index(index);
            let next = self.get_slot(index);
            if next & CONTINUATION_MASK == 0 {
                break;
            }
        }
        false
    }

    fn insert_qfp(&mut self, quotient: usize, fingerprint: u64) -> bool {
        if self.contains_qfp(quotient, fingerprint) {
            return false;
        }

        let head = self.get_slot(quotient);
        let new_run = head & OCCUPIED_MASK == 0;
        if new_run {
            self.set_slot(quotient, head | OCCUPIED_MASK);
        }

        let run_start = self.get_run_start(quotient);
        let mut index = run_start;
        let mut new_slot = fingerprint << METADATA_BITS;

        if !new_run {
            loop {
                let slot = self.get_slot(index);
                if self.slot_fingerprint(slot) > fingerprint {
                    break;
                }
                let next = self.increment_index(index);
                let next_slot = self.get_slot(next);
                if next_slot & CONTINUATION_MASK == 0 {
                    index = next;
                    break;
                }
                index = next;
            }

            if index == run_start {
                let mut run_start_slot = self.get_slot(run_start);
                run_start_slot |= CONTINUATION_MASK;
                self.set_slot(run_start, run_start_slot);
            } else {
                new_slot |= CONTINUATION_MASK;
            }
        }

        if index != quotient {
            new_slot |= SHIFTED_MASK;
        }

        self.insert_and_shift_right(index, new_slot);
        self.num_entries += 1;
        true
    }

    /// First physical slot of the cluster containing `index`: walks
    /// backward while `isShifted` is set, same traversal `get_run_start`
    /// performs before it starts counting runs forward.
    fn cluster_start(&self, index: usize) -> usize {
        let mut i = index;
        loop {
            if self.get_slot(i) & SHIFTED_MASK == 0 {
                return i;
            }
            i = self.decrement_index(i);
        }
    }

    /// Decodes every stored `(canonical_quotient, fingerprint)` pair in the
    /// cluster starting at physical slot `start`, in ascending physical-slot
    /// order, alongside the number of physical slots the cluster spans.
    /// Canonical quotients are recovered the same way [`QuotientFilterIter`]
    /// recovers them: `isOccupied` bits are queued as they are passed over
    /// and handed out to runs (identified by `isContinuation=0`) in the
    /// order both appear, per the "runs appear in canonical-slot order"
    /// invariant.
    fn cluster_entries(&self, start: usize) -> (Vec<(usize, u64)>, usize) {
        let mut entries = Vec::new();
        let mut pending_quotients = VecDeque::new();
        let mut current_quotient = None;
        let mut index = start;
        let mut len = 0usize;
        loop {
            let slot = self.get_slot(index);
            if slot & OCCUPIED_MASK != 0 {
                pending_quotients.push_back(index);
            }
            let fp = self.slot_fingerprint(slot);
            if fp != 0 {
                if slot & CONTINUATION_MASK == 0 {
                    current_quotient = pending_quotients.pop_front();
                }
                let q = current_quotient.expect("a run always has a pending canonical quotient");
                entries.push((q, fp));
            }
            len += 1;
            let next = self.increment_index(index);
            if self.get_slot(next) & SHIFTED_MASK == 0 {
                break;
            }
            index = next;
        }
        (entries, len)
    }

    /// Removes `(quotient, fingerprint)` by decoding the whole cluster it
    /// lives in, dropping that one entry, and repacking the remainder
    /// (plus `isOccupied`) from the cluster's start. This keeps the
    /// metadata invariants (sorted runs, `isShifted`/`isContinuation`
    /// consistent with physical position) correct by construction instead
    /// of hand-maintaining them through an in-place left-shift, at the
    /// cost of touching the whole cluster rather than just the tail after
    /// the removed slot — still O(cluster length), per §4.4.3's bound.
    fn delete_qfp(&mut self, quotient: usize, fingerprint: u64) -> bool {
        if self.get_slot(quotient) & OCCUPIED_MASK == 0 {
            return false;
        }

        let start = self.cluster_start(quotient);
        let (entries, cluster_len) = self.cluster_entries(start);
        let Some(target_pos) = entries.iter().position(|&(q, fp)| q == quotient && fp == fingerprint)
        else {
            return false;
        };

        let mut remaining = entries;
        remaining.remove(target_pos);

        for i in 0..cluster_len {
            let idx = (start + i) % self.num_slots();
            self.set_slot(idx, 0);
        }

        for (i, &(home_quotient, fp)) in remaining.iter().enumerate() {
            let idx = (start + i) % self.num_slots();
            let is_first_of_run = i == 0 || remaining[i - 1].0 != home_quotient;
            let mut value = fp << METADATA_BITS;
            if !is_first_of_run {
                value |= CONTINUATION_MASK;
            }
            if idx != home_quotient {
                value |= SHIFTED_MASK;
            }
            self.set_slot(idx, value);
        }

        let mut prev_quotient = None;
        for &(home_quotient, _) in &remaining {
            if prev_quotient != Some(home_quotient) {
                let slot = self.get_slot(home_quotient) | OCCUPIED_MASK;
                self.set_slot(home_quotient, slot);
                prev_quotient = Some(home_quotient);
            }
        }

        self.num_entries -= 1;
        true
    }

    /// Inserts `item`, expanding first if the load factor would exceed the
    /// configured maximum and expansion is possible. Returns `true` if the
    /// item was newly inserted, `false` if it (or a colliding fingerprint at
    /// the same quotient) was already present.
    pub fn insert<T: Hash + ?Sized>(&mut self, item: &T) -> Result<bool, Error> {
        if self.should_expand() {
            if self.fingerprint_bits <= MIN_FINGERPRINT_BITS {
                return Err(Error::capacity_exhausted(
                    "quotient filter cannot expand further: fingerprintBits would drop below 1",
                ));
            }
            self.expand()?;
        }
        let (quotient, fingerprint) = self.hash_to_quotient_fingerprint(item);
        Ok(self.insert_qfp(quotient, fingerprint))
    }

    /// Returns whether `item` (or a fingerprint collision) is present.
    pub fn contains<T: Hash + ?Sized>(&self, item: &T) -> bool {
        let (quotient, fingerprint) = self.hash_to_quotient_fingerprint(item);
        self.contains_qfp(quotient, fingerprint)
    }

    /// Removes `item` if present. Returns `true` if an entry was removed.
    pub fn remove<T: Hash + ?Sized>(&mut self, item: &T) -> bool {
        let (quotient, fingerprint) = self.hash_to_quotient_fingerprint(item);
        self.delete_qfp(quotient, fingerprint)
    }

    /// Doubles the slot count and drops the fingerprint width by one bit,
    /// re-deriving every stored `(quotient, fingerprint)` pair from its
    /// existing bits: the fingerprint's high bit becomes the new low bit of
    /// the quotient, so no rehash against the original item is needed.
    fn expand(&mut self) -> Result<(), Error> {
        let new_fingerprint_bits = self.fingerprint_bits - 1;
        check_fingerprint_bits(new_fingerprint_bits)?;
        let new_lg_num_slots = self.lg_num_slots + 1;
        check_lg_num_slots(new_lg_num_slots)?;

        let entries: Vec<(usize, u64)> = self.iter().collect();
        let old_fingerprint_bits = self.fingerprint_bits;

        let mut expanded = Self::new(new_lg_num_slots, new_fingerprint_bits, self.seed)?;
        expanded.max_load_factor = self.max_load_factor;
        expanded.num_expansions = self.num_expansions + 1;

        for (quotient, fingerprint) in entries {
            let top_bit = (fingerprint >> (old_fingerprint_bits - 1)) & 1;
            let new_quotient = (quotient << 1) | top_bit as usize;
            let mask = (1u64 << (old_fingerprint_bits - 1)) - 1;
            let mut new_fingerprint = fingerprint & mask;
            if new_fingerprint == 0 {
                new_fingerprint = 1;
            }
            expanded.insert_qfp(new_quotient, new_fingerprint);
        }

        *self = expanded;
        Ok(())
    }

    /// Iterates over every stored entry as `(canonical_quotient,
    /// fingerprint)` pairs, in ascending physical slot order.
    pub fn iter(&self) -> QuotientFilterIter<'_> {
        QuotientFilterIter {
            filter: self,
            index: 0,
            pending_quotients: VecDeque::new(),
            current_quotient: None,
        }
    }

    /// Serializes this filter to its wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let payload_words = self.slots.num_words();
        let mut w = SketchWriter::with_capacity(32 + payload_words * 8);
        w.write_u8(Family::QUOTIENT_FILTER.min_pre_longs);
        w.write_u8(1); // serial version
        w.write_u8(Family::QUOTIENT_FILTER.id);
        w.write_u8(if self.num_entries == 0 { 1 } else { 0 });
        w.write_u8(self.lg_num_slots);
        w.write_u8(self.fingerprint_bits);
        w.write_u16_le(0);
        w.write_u64_le(self.num_entries);
        w.write_u32_le(self.num_expansions);
        w.write_u32_le((self.max_load_factor * 1_000_000.0).round() as u32);
        w.write_u64_le(self.seed);
        if self.num_entries > 0 {
            for word in self.slots.to_words() {
                w.write_u64_le(word);
            }
        }
        w.into_bytes()
    }

    /// Deserializes a filter previously produced by [`Self::serialize`].
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut c = PositionalCursor::new(bytes);
        let preamble_longs = c.read_u8().map_err(|_| Error::insufficient_data("preambleLongs"))?;
        let _serial_version = c.read_u8().map_err(|_| Error::insufficient_data("serialVersion"))?;
        let family_id = c.read_u8().map_err(|_| Error::insufficient_data("familyId"))?;
        Family::QUOTIENT_FILTER.validate_id(family_id)?;
        if preamble_longs != Family::QUOTIENT_FILTER.min_pre_longs {
            return Err(Error::invalid_preamble_longs(
                Family::QUOTIENT_FILTER.min_pre_longs,
                preamble_longs,
            ));
        }
        let flags = c.read_u8().map_err(|_| Error::insufficient_data("flags"))?;
        let is_empty = flags & 1 != 0;
        let lg_num_slots = c.read_u8().map_err(|_| Error::insufficient_data("lgNumSlots"))?;
        let fingerprint_bits = c
            .read_u8()
            .map_err(|_| Error::insufficient_data("fingerprintBits"))?;
        let _reserved = c.read_u16_le().map_err(|_| Error::insufficient_data("reserved"))?;
        let num_entries = c.read_u64_le().map_err(|_| Error::insufficient_data("numEntries"))?;
        let num_expansions = c
            .read_u32_le()
            .map_err(|_| Error::insufficient_data("numExpansions"))?;
        let load_factor_milli = c
            .read_u32_le()
            .map_err(|_| Error::insufficient_data("maxLoadFactor"))?;
        let seed = c.read_u64_le().map_err(|_| Error::insufficient_data("seed"))?;

        let mut filter = Self::new(lg_num_slots, fingerprint_bits, seed)?;
        filter.max_load_factor = f64::from(load_factor_milli) / 1_000_000.0;
        filter.num_expansions = num_expansions;
        filter.num_entries = num_entries;

        if !is_empty {
            let num_words = filter.slots.num_words();
            for idx in 0..num_words {
                let word = c
                    .read_u64_le()
                    .map_err(|_| Error::insufficient_data("slotWord"))?;
                filter.slots.set_long(idx as u64, word)?;
            }
        }
        Ok(filter)
    }
}

/// Largest `1/p` a fingerprint of `bits` width can resolve: `ceil(log2(1/p))`.
pub fn suggest_fingerprint_length(target_false_positive_prob: f64) -> Result<u8, Error> {
    if !(target_false_positive_prob > 0.0 && target_false_positive_prob < 1.0) {
        return Err(Error::invalid_argument(
            "target false-positive probability must be in (0, 1)",
        ));
    }
    let bits = (-target_false_positive_prob.log2()).ceil();
    Ok((bits as u64).clamp(1, u64::from(MAX_FINGERPRINT_BITS)) as u8)
}

/// Smallest `lgNumSlots` such that `(1 << lgNumSlots) * load_factor >= n`.
pub fn suggest_lg_num_slots(n: u64, load_factor: f64) -> Result<u8, Error> {
    if n == 0 {
        return Err(Error::invalid_argument("n must be positive"));
    }
    if !(load_factor > 0.0 && load_factor <= 1.0) {
        return Err(Error::invalid_argument("loadFactor must be in (0, 1]"));
    }
    for lg in MIN_LG_NUM_SLOTS..=MAX_LG_NUM_SLOTS {
        let capacity = (1u64 << lg) as f64 * load_factor;
        if capacity >= n as f64 {
            return Ok(lg);
        }
    }
    Err(Error::capacity_exhausted(
        "no lgNumSlots in range accommodates the requested item count",
    ))
}

/// Maximum number of distinct items `2^lg_num_slots` slots can hold at
/// `load_factor` before expansion is triggered.
pub fn suggest_max_num_items_from_num_slots(lg_num_slots: u8, load_factor: f64) -> u64 {
    ((1u64 << lg_num_slots) as f64 * load_factor).floor() as u64
}

/// Derives `(lgNumSlots, fingerprintBits)` for an expected `max_distinct_items`
/// at a target false-positive probability `p`, at the default load factor.
pub fn suggest_params_from_max_distincts_fpp(
    max_distinct_items: u64,
    target_false_positive_prob: f64,
) -> Result<(u8, u8), Error> {
    let lg_num_slots = suggest_lg_num_slots(max_distinct_items, DEFAULT_MAX_LOAD_FACTOR)?;
    let fingerprint_bits = suggest_fingerprint_length(target_false_positive_prob)?;
    Ok((lg_num_slots, fingerprint_bits))
}

/// Yields every stored `(canonical_quotient, fingerprint)` pair, in
/// ascending physical slot order.
pub struct QuotientFilterIter<'a> {
    filter: &'a QuotientFilter,
    index: usize,
    pending_quotients: VecDeque<usize>,
    current_quotient: Option<usize>,
}

impl Iterator for QuotientFilterIter<'_> {
    type Item = (usize, u64);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.filter.num_slots() {
            let i = self.index;
            self.index += 1;
            let slot = self.filter.get_slot(i);
            if slot & OCCUPIED_MASK != 0 {
                self.pending_quotients.push_back(i);
            }
            if slot & METADATA_MASK == 0 {
                continue;
            }
            if slot & CONTINUATION_MASK == 0 {
                self.current_quotient = self.pending_quotients.pop_front();
            }
            let quotient = self
                .current_quotient
                .expect("a run always has a pending canonical quotient");
            return Some((quotient, self.filter.slot_fingerprint(slot)));
        }
        None
    }
}
