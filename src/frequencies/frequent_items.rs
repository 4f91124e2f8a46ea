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

//! Frequent-items sketch: bounded-memory heavy-hitter tracking over a
//! stream of `u64` keys, built on the classic Misra-Gries algorithm.
//!
//! Unlike the upstream sample-median purge, this implementation decrements
//! every stored counter by exactly one per overflow (and purges the
//! resulting zeros), which keeps the error bound exact: for every key `k`,
//! `get(k) <= true_count(k) <= get(k) + get_max_error()`, and after `n`
//! increments `get_max_error() <= n / max_size`.

use crate::codec::Family;
use crate::codec::PositionalCursor;
use crate::codec::SketchWriter;
use crate::error::Error;

use super::reverse_purge_long_hash_map::ReversePurgeLongHashMap;

const SERIAL_VERSION: u8 = 1;
const PREAMBLE_LONGS: u8 = 2;

/// Selects which error bound `frequent_items` reports a key against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// No false positives: every returned key is guaranteed to clear
    /// `threshold`, but some heavy keys may be omitted.
    NoFalsePositives,
    /// No false negatives: every key that actually clears `threshold` is
    /// guaranteed to be returned, but some lighter keys may be included.
    NoFalseNegatives,
}

/// One row of a [`FrequentItems::frequent_items`] report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub key: u64,
    pub estimate: u64,
    pub lower_bound: u64,
    pub upper_bound: u64,
}

/// Bounded-memory frequent-items sketch over `u64` keys.
pub struct FrequentItems {
    max_size: u64,
    offset: u64,
    map: ReversePurgeLongHashMap,
}

impl FrequentItems {
    /// Constructs a sketch that tracks at most `max_size` distinct keys at
    /// once. `max_size` must be at least 1.
    pub fn new(max_size: u64) -> Result<Self, Error> {
        if max_size < 1 {
            return Err(Error::invalid_argument(format!(
                "max_size must be >= 1, got {max_size}"
            )));
        }
        // Misra-Gries needs strictly more than max_size slots to guarantee a
        // free (or zeroable) slot exists before every overflow; size the
        // backing table generously and round up to a power of two.
        let min_capacity = ((max_size + 1) as f64 / 0.75).ceil() as u64;
        let capacity = min_capacity.max(16).next_power_of_two() as usize;
        Ok(Self {
            max_size,
            offset: 0,
            map: ReversePurgeLongHashMap::new(capacity),
        })
    }

    /// Maximum number of distinct keys this sketch can track at once.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Adds one occurrence of `key`.
    pub fn increment(&mut self, key: u64) {
        self.increment_by(key, 1);
    }

    /// Adds `count` occurrences of `key` in one step.
    pub fn increment_by(&mut self, key: u64, count: u64) {
        if count == 0 {
            return;
        }
        self.map.adjust_or_put_value(key as i64, count as i64);
        while self.map.get_num_active() as u64 > self.max_size {
            self.map.adjust_all_values_by(1);
            self.map.keep_only_positive_counts();
            self.offset += 1;
        }
    }

    /// Returns the estimated count for `key`: a lower bound on its true
    /// count, never more than [`Self::get_max_error`] below it.
    pub fn get(&self, key: u64) -> u64 {
        let v = self.map.get(key as i64);
        if v > 0 {
            v as u64
        } else {
            0
        }
    }

    /// Upper bound on `key`'s true count: `get(key) + get_max_error()`.
    pub fn upper_bound(&self, key: u64) -> u64 {
        self.get(key) + self.get_max_error()
    }

    /// Lower bound on `key`'s true count. Equal to `get(key)` for this exact
    /// decrement scheme.
    pub fn lower_bound(&self, key: u64) -> u64 {
        self.get(key)
    }

    /// Upper bound on the estimation error for any key's count: the total
    /// amount this sketch has implicitly decremented off every counter so
    /// far.
    pub fn get_max_error(&self) -> u64 {
        self.offset
    }

    /// Number of distinct keys currently tracked (non-zero counters).
    pub fn nnz(&self) -> usize {
        self.map.get_num_active()
    }

    /// Reports `true` if no keys are currently tracked.
    pub fn is_empty(&self) -> bool {
        self.nnz() == 0
    }

    /// Subtracts `amount` from the implicit decrement offset's effect by
    /// decrementing every currently tracked key's counter by `amount`,
    /// purging any that drop to zero or below, and advancing the error
    /// bound by `amount`.
    pub fn decrement_all(&mut self, amount: u64) {
        if amount == 0 {
            return;
        }
        self.map.adjust_all_values_by(amount as i64);
        self.map.keep_only_positive_counts();
        self.offset += amount;
    }

    /// Returns rows whose count estimate clears `threshold`, with bounds
    /// selected according to `error_type`.
    ///
    /// For [`ErrorType::NoFalseNegatives`], a key is included if its upper
    /// bound clears the threshold (possibly including some that don't
    /// truly clear it). For [`ErrorType::NoFalsePositives`], a key is
    /// included only if its lower bound (the raw estimate) clears the
    /// threshold (possibly omitting some that do).
    pub fn frequent_items(&self, error_type: ErrorType, threshold: u64) -> Vec<Row> {
        let mut rows = Vec::new();
        for (key, value) in self.map.iter() {
            if value <= 0 {
                continue;
            }
            let estimate = value as u64;
            let lower_bound = estimate;
            let upper_bound = estimate + self.offset;
            let passes = match error_type {
                ErrorType::NoFalseNegatives => upper_bound >= threshold,
                ErrorType::NoFalsePositives => lower_bound >= threshold,
            };
            if passes {
                rows.push(Row {
                    key: key as u64,
                    estimate,
                    lower_bound,
                    upper_bound,
                });
            }
        }
        rows
    }

    /// Merges `other` into `self`, as if every increment applied to `other`
    /// had instead been applied directly to `self`.
    ///
    /// The combined error bound is the sum of both sketches' offsets, which
    /// stays a valid (if not maximally tight) bound on the true error.
    pub fn union(&mut self, other: &Self) -> Result<(), Error> {
        for (key, value) in other.map.iter() {
            if value > 0 {
                self.map.adjust_or_put_value(key, value);
            }
        }
        self.offset += other.offset;
        while self.map.get_num_active() as u64 > self.max_size {
            self.map.adjust_all_values_by(1);
            self.map.keep_only_positive_counts();
            self.offset += 1;
        }
        Ok(())
    }

    /// Serializes this sketch. An empty sketch omits the payload entirely.
    pub fn serialize(&self) -> Vec<u8> {
        let is_empty = self.nnz() == 0;
        let num_active = self.map.get_num_active();
        let mut w = SketchWriter::with_capacity(16 + if is_empty { 0 } else { num_active * 16 });

        w.write_u8(PREAMBLE_LONGS);
        w.write_u8(SERIAL_VERSION);
        w.write_u8(Family::FREQUENCY.id);
        w.write_u8(if is_empty { 1 } else { 0 });
        w.write_u32_le(self.max_size as u32);

        w.write_u64_le(self.offset);

        if !is_empty {
            for (key, value) in self.map.iter() {
                if value > 0 {
                    w.write_u64_le(key as u64);
                    w.write_u64_le(value as u64);
                }
            }
        }

        w.into_bytes()
    }

    /// Deserializes a sketch previously produced by [`Self::serialize`].
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut c = PositionalCursor::new(bytes);

        let preamble_longs = c
            .read_u8()
            .map_err(|_| Error::insufficient_data("preamble_longs"))?;
        let serial_version = c
            .read_u8()
            .map_err(|_| Error::insufficient_data("serial_version"))?;
        let family_id = c.read_u8().map_err(|_| Error::insufficient_data("family_id"))?;
        Family::FREQUENCY.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, serial_version));
        }
        if preamble_longs != PREAMBLE_LONGS {
            return Err(Error::invalid_preamble_longs(PREAMBLE_LONGS, preamble_longs));
        }

        let flags = c.read_u8().map_err(|_| Error::insufficient_data("flags"))?;
        let is_empty = flags & 1 != 0;

        let max_size = c
            .read_u32_le()
            .map_err(|_| Error::insufficient_data("max_size"))? as u64;
        let offset = c.read_u64_le().map_err(|_| Error::insufficient_data("offset"))?;

        let mut sketch = FrequentItems::new(max_size)?;
        sketch.offset = offset;

        if !is_empty {
            let count = (c.remaining() / 16) as usize;
            for _ in 0..count {
                let key = c.read_u64_le().map_err(|_| Error::insufficient_data("key"))?;
                let value = c.read_u64_le().map_err(|_| Error::insufficient_data("value"))?;
                sketch.map.adjust_or_put_value(key as i64, value as i64);
            }
        }

        Ok(sketch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_increment_and_get() {
        let mut fi = FrequentItems::new(10).unwrap();
        for _ in 0..5 {
            fi.increment(42);
        }
        assert_eq!(fi.get(42), 5);
        assert_eq!(fi.get(99), 0);
        assert_eq!(fi.get_max_error(), 0);
        assert_eq!(fi.nnz(), 1);
    }

    #[test]
    fn exact_error_bound_holds_under_overflow() {
        let max_size = 5u64;
        let mut fi = FrequentItems::new(max_size).unwrap();
        let mut true_counts = std::collections::HashMap::new();

        for i in 0..2000u64 {
            let key = i % 37;
            fi.increment(key);
            *true_counts.entry(key).or_insert(0u64) += 1;
        }

        for (&key, &true_count) in &true_counts {
            let lower = fi.get(key);
            let upper = fi.upper_bound(key);
            assert!(
                lower <= true_count && true_count <= upper,
                "key {key}: lower {lower} <= true {true_count} <= upper {upper} failed"
            );
        }
        assert!(fi.nnz() as u64 <= max_size);
    }

    #[test]
    fn error_bound_respects_n_over_max_size() {
        let max_size = 100u64;
        let mut fi = FrequentItems::new(max_size).unwrap();
        let n = 50_000u64;
        for i in 0..n {
            fi.increment(i % 5000);
        }
        assert!(fi.get_max_error() <= n / max_size);
    }

    #[test]
    fn decrement_all_advances_offset_and_purges() {
        let mut fi = FrequentItems::new(10).unwrap();
        fi.increment_by(1, 3);
        fi.increment_by(2, 1);
        fi.decrement_all(2);
        assert_eq!(fi.get(1), 1);
        assert_eq!(fi.get(2), 0);
        assert_eq!(fi.get_max_error(), 2);
        assert_eq!(fi.nnz(), 1);
    }

    #[test]
    fn union_combines_counts_and_offsets() {
        let mut a = FrequentItems::new(20).unwrap();
        a.increment_by(1, 5);
        a.increment_by(2, 3);

        let mut b = FrequentItems::new(20).unwrap();
        b.increment_by(1, 2);
        b.increment_by(3, 4);

        a.union(&b).unwrap();
        assert_eq!(a.get(1), 7);
        assert_eq!(a.get(2), 3);
        assert_eq!(a.get(3), 4);
        assert_eq!(a.get_max_error(), 0);
    }

    #[test]
    fn frequent_items_reports_by_threshold() {
        let mut fi = FrequentItems::new(10).unwrap();
        fi.increment_by(1, 100);
        fi.increment_by(2, 5);
        fi.increment_by(3, 1);

        let rows = fi.frequent_items(ErrorType::NoFalseNegatives, 10);
        let keys: Vec<u64> = rows.iter().map(|r| r.key).collect();
        assert!(keys.contains(&1));
        assert!(!keys.contains(&2));
        assert!(!keys.contains(&3));
    }

    #[test]
    fn rejects_zero_max_size() {
        assert!(FrequentItems::new(0).is_err());
    }

    #[test]
    fn serialization_round_trips_nonempty_sketch() {
        let mut fi = FrequentItems::new(50).unwrap();
        for i in 0..10_000u64 {
            fi.increment(i % 80);
        }
        let bytes = fi.serialize();
        let restored = FrequentItems::deserialize(&bytes).unwrap();

        assert_eq!(restored.max_size(), fi.max_size());
        assert_eq!(restored.get_max_error(), fi.get_max_error());
        assert_eq!(restored.nnz(), fi.nnz());
        for key in 0..80u64 {
            assert_eq!(restored.get(key), fi.get(key));
        }
    }

    #[test]
    fn serialization_round_trips_empty_sketch() {
        let fi = FrequentItems::new(64).unwrap();
        let bytes = fi.serialize();
        let restored = FrequentItems::deserialize(&bytes).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.max_size(), 64);
        assert_eq!(restored.get_max_error(), 0);
    }

    #[test]
    fn deserialize_rejects_wrong_family() {
        let mut w = SketchWriter::with_capacity(16);
        w.write_u8(PREAMBLE_LONGS);
        w.write_u8(SERIAL_VERSION);
        w.write_u8(Family::BLOOM_FILTER.id);
        w.write_u8(1);
        w.write_u32_le(10);
        w.write_u64_le(0);
        let bytes = w.into_bytes();
        assert!(FrequentItems::deserialize(&bytes).is_err());
    }

    #[test]
    fn geometric_stream_satisfies_error_bound() {
        // Deterministic stand-in for a geometric(p=0.04) distribution:
        // weight key i proportionally to (1-p)^i so low keys dominate.
        let max_size = 100u64;
        let mut fi = FrequentItems::new(max_size).unwrap();
        let mut true_counts = std::collections::HashMap::new();
        let mut n = 0u64;

        for key in 0u64..200 {
            let weight = 1 + (10_000.0 * 0.96f64.powi(key as i32)) as u64;
            fi.increment_by(key, weight);
            true_counts.insert(key, weight);
            n += weight;
        }

        for (&key, &true_count) in &true_counts {
            let lower = fi.get(key);
            let upper = fi.upper_bound(key);
            assert!(lower <= true_count);
            assert!(true_count <= upper);
        }
        assert!(fi.nnz() as u64 <= max_size);
        assert!(fi.get_max_error() <= n / max_size);
    }
}
