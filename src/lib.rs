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

//! Core probabilistic sketches for streaming data summarization.
//!
//! This crate provides small, dependency-light building blocks for
//! approximate set-membership and heavy-hitter queries over large or
//! unbounded data streams:
//!
//! - [`bloom`]: a classic Bloom filter with tunable size/accuracy, set
//!   algebra (union/intersect/invert), and a compact wire format.
//! - [`quotient`]: a quotient filter, offering the same approximate
//!   membership query as a Bloom filter plus deletion and enumeration of
//!   stored fingerprints.
//! - [`frequencies`]: a frequent-items (heavy-hitters) sketch built on the
//!   Misra-Gries algorithm, with an exact error bound.
//! - [`hash`]: the seeded, bit-exact hash functions (MurmurHash3 x64-128,
//!   xxHash64) shared by every sketch above.
//! - [`bitarray`]: the bit-packed storage layer shared by [`bloom`] and
//!   [`quotient`].
//! - [`codec`]: shared preamble/payload primitives for sketch wire formats.
//! - [`error`]: the error type returned by all fallible operations in this
//!   crate.

pub mod bitarray;
pub mod bloom;
pub mod codec;
pub mod error;
pub mod frequencies;
pub mod hash;
pub mod quotient;
