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

//! Open-addressed hash map from `i64` keys to `i64` counts, with a
//! "reverse purge" deletion scheme: on delete, entries that probed past
//! the freed slot are shifted back by their own drift rather than
//! tombstoned, so lookups never have to skip tombstones.
//!
//! Fixed capacity, chosen once at construction time: [`FrequentItems`](
//! super::frequent_items::FrequentItems) sizes the table with enough
//! headroom over its `max_size` bound that the implicit global decrement
//! always frees a slot before the table fills.

const DRIFT_LIMIT: usize = 1024;

#[derive(Debug, Clone)]
pub struct ReversePurgeLongHashMap {
    keys: Vec<i64>,
    values: Vec<i64>,
    states: Vec<u16>,
    num_active: usize,
}

impl ReversePurgeLongHashMap {
    /// Allocates a table with `capacity` slots. `capacity` must be a power
    /// of two.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "capacity must be power of 2");
        Self {
            keys: vec![0; capacity],
            values: vec![0; capacity],
            states: vec![0; capacity],
            num_active: 0,
        }
    }

    pub fn get(&self, key: i64) -> i64 {
        let probe = self.hash_probe(key);
        if self.states[probe] > 0 {
            self.values[probe]
        } else {
            0
        }
    }

    /// Adds `adjust_amount` to `key`'s count, inserting it at `adjust_amount`
    /// if absent.
    ///
    /// # Panics
    ///
    /// Panics if the table has no free slot for a new key (callers must
    /// keep `num_active` below capacity, e.g. via [`Self::keep_only_positive_counts`]).
    pub fn adjust_or_put_value(&mut self, key: i64, adjust_amount: i64) {
        let mask = self.keys.len() - 1;
        let mut probe = (hash_long(key) as usize) & mask;
        let mut drift: usize = 1;
        while self.states[probe] != 0 && self.keys[probe] != key {
            probe = (probe + 1) & mask;
            drift += 1;
            assert!(drift < DRIFT_LIMIT, "drift limit exceeded: table is full");
        }
        if self.states[probe] == 0 {
            self.keys[probe] = key;
            self.values[probe] = adjust_amount;
            self.states[probe] = drift as u16;
            self.num_active += 1;
        } else {
            self.values[probe] += adjust_amount;
        }
    }

    /// Removes every entry whose value has dropped to zero or below.
    pub fn keep_only_positive_counts(&mut self) {
        let len = self.keys.len();
        let mut first_probe = len - 1;
        while self.states[first_probe] > 0 {
            first_probe -= 1;
        }
        for probe in (0..first_probe).rev() {
            if self.states[probe] > 0 && self.values[probe] <= 0 {
                self.hash_delete(probe);
                self.num_active -= 1;
            }
        }
        for probe in (first_probe..len).rev() {
            if self.states[probe] > 0 && self.values[probe] <= 0 {
                self.hash_delete(probe);
                self.num_active -= 1;
            }
        }
    }

    /// Subtracts `adjust_amount` from every stored value, active or not.
    pub fn adjust_all_values_by(&mut self, adjust_amount: i64) {
        for (i, value) in self.values.iter_mut().enumerate() {
            if self.states[i] > 0 {
                *value -= adjust_amount;
            }
        }
    }

    pub fn get_num_active(&self) -> usize {
        self.num_active
    }

    pub fn get_capacity(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> ReversePurgeLongIter<'_> {
        ReversePurgeLongIter::new(self)
    }

    fn hash_probe(&self, key: i64) -> usize {
        let mask = self.keys.len() - 1;
        let mut probe = (hash_long(key) as usize) & mask;
        while self.states[probe] > 0 && self.keys[probe] != key {
            probe = (probe + 1) & mask;
        }
        probe
    }

    fn hash_delete(&mut self, mut delete_probe: usize) {
        self.states[delete_probe] = 0;
        let mut drift: usize = 1;
        let mask = self.keys.len() - 1;
        let mut probe = (delete_probe + drift) & mask;
        while self.states[probe] != 0 {
            if self.states[probe] as usize > drift {
                self.keys[delete_probe] = self.keys[probe];
                self.values[delete_probe] = self.values[probe];
                self.states[delete_probe] = self.states[probe] - drift as u16;
                self.states[probe] = 0;
                drift = 0;
                delete_probe = probe;
            }
            probe = (probe + 1) & mask;
            drift += 1;
            debug_assert!(drift < DRIFT_LIMIT, "drift limit exceeded");
        }
    }
}

pub struct ReversePurgeLongIter<'a> {
    map: &'a ReversePurgeLongHashMap,
    index: usize,
    count: usize,
    stride: usize,
    mask: usize,
}

impl<'a> ReversePurgeLongIter<'a> {
    /// Golden-ratio stride traversal so entries come out well-mixed
    /// rather than in bucket order.
    fn new(map: &'a ReversePurgeLongHashMap) -> Self {
        let size = map.keys.len();
        let stride = ((size as f64 * 0.6180339887498949) as usize) | 1;
        let mask = size - 1;
        let index = 0usize.wrapping_sub(stride);
        Self {
            map,
            index,
            count: 0,
            stride,
            mask,
        }
    }
}

impl<'a> Iterator for ReversePurgeLongIter<'a> {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.count >= self.map.num_active {
            return None;
        }
        loop {
            self.index = self.index.wrapping_add(self.stride) & self.mask;
            if self.map.states[self.index] > 0 {
                self.count += 1;
                return Some((self.map.keys[self.index], self.map.values[self.index]));
            }
        }
    }
}

#[inline]
fn hash_long(key: i64) -> u64 {
    fmix64(key as u64)
}

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51afd7ed558ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ceb9fe1a85ec53);
    k ^ (k >> 33)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trip() {
        let mut m = ReversePurgeLongHashMap::new(16);
        m.adjust_or_put_value(42, 3);
        assert_eq!(m.get(42), 3);
        assert_eq!(m.get(7), 0);
        assert_eq!(m.get_num_active(), 1);
    }

    #[test]
    fn adjust_accumulates() {
        let mut m = ReversePurgeLongHashMap::new(16);
        m.adjust_or_put_value(1, 5);
        m.adjust_or_put_value(1, 2);
        assert_eq!(m.get(1), 7);
        assert_eq!(m.get_num_active(), 1);
    }

    #[test]
    fn keep_only_positive_counts_prunes_zero_and_negative() {
        let mut m = ReversePurgeLongHashMap::new(16);
        m.adjust_or_put_value(1, 5);
        m.adjust_or_put_value(2, 1);
        m.adjust_all_values_by(1);
        assert_eq!(m.get(1), 4);
        assert_eq!(m.get(2), 0);
        m.keep_only_positive_counts();
        assert_eq!(m.get_num_active(), 1);
        assert_eq!(m.get(1), 4);
        assert_eq!(m.get(2), 0);
    }

    #[test]
    fn iter_visits_every_active_entry_once() {
        let mut m = ReversePurgeLongHashMap::new(64);
        for i in 0..20i64 {
            m.adjust_or_put_value(i, i + 1);
        }
        let mut seen: Vec<i64> = m.iter().map(|(k, _)| k).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..20i64).collect::<Vec<_>>());
    }

    #[test]
    fn handles_collisions_via_drift() {
        let mut m = ReversePurgeLongHashMap::new(8);
        for i in 0..6i64 {
            m.adjust_or_put_value(i, 1);
        }
        for i in 0..6i64 {
            assert_eq!(m.get(i), 1);
        }
    }
}
