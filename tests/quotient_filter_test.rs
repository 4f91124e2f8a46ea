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

use googletest::assert_that;
use googletest::prelude::eq;
use sketch_core::quotient::QuotientFilter;

#[test]
fn no_false_negatives_across_many_inserts() {
    let mut f = QuotientFilter::new(10, 12, 42).unwrap();
    for i in 0..600u64 {
        f.insert(&i).unwrap();
    }
    for i in 0..600u64 {
        assert!(f.contains(&i), "missing {i}");
    }
}

#[test]
fn delete_then_reinsert_is_found_again() {
    let mut f = QuotientFilter::new(6, 10, 0).unwrap();
    for i in 0..40u64 {
        f.insert(&i).unwrap();
    }
    assert!(f.remove(&17));
    assert!(!f.contains(&17));
    for i in 0..40u64 {
        if i != 17 {
            assert!(f.contains(&i));
        }
    }
    assert!(f.insert(&17).unwrap());
    assert!(f.contains(&17));
}

#[test]
fn expansion_triggers_past_load_factor_and_preserves_entries() {
    let mut f = QuotientFilter::new(4, 12, 5).unwrap();
    for i in 0..30u64 {
        f.insert(&i).unwrap();
    }
    assert!(f.num_expansions() > 0);
    for i in 0..30u64 {
        assert!(f.contains(&i), "lost {i} across expansion");
    }
}

#[test]
fn serialization_round_trips_nonempty_filter() {
    let mut f = QuotientFilter::new(8, 14, 99).unwrap();
    for i in 0..150u64 {
        f.insert(&i).unwrap();
    }
    let bytes = f.serialize();
    let restored = QuotientFilter::deserialize(&bytes).unwrap();

    assert_that!(restored.num_entries(), eq(f.num_entries()));
    assert_that!(restored.lg_num_slots(), eq(f.lg_num_slots()));
    assert_that!(restored.fingerprint_bits(), eq(f.fingerprint_bits()));
    for i in 0..150u64 {
        assert!(restored.contains(&i));
    }
}

#[test]
fn serialization_round_trips_empty_filter() {
    let f = QuotientFilter::new(5, 8, 1).unwrap();
    let bytes = f.serialize();
    let restored = QuotientFilter::deserialize(&bytes).unwrap();
    assert_that!(restored.num_entries(), eq(0));
    assert_that!(restored.lg_num_slots(), eq(f.lg_num_slots()));
}

#[test]
fn iter_yields_every_stored_entry_exactly_once() {
    let mut f = QuotientFilter::new(8, 10, 3).unwrap();
    for i in 0..64u64 {
        f.insert(&i).unwrap();
    }
    assert_that!(f.iter().count(), eq(f.num_entries() as usize));
}

#[test]
fn rejects_expansion_below_minimum_fingerprint_width() {
    // A 1-bit fingerprint filter has nowhere left to shrink to on expansion.
    let mut f = QuotientFilter::new(4, 1, 0).unwrap().with_max_load_factor(0.01).unwrap();
    let mut hit_capacity_exhausted = false;
    for i in 0..40u64 {
        if f.insert(&i).is_err() {
            hit_capacity_exhausted = true;
            break;
        }
    }
    assert!(hit_capacity_exhausted);
}
