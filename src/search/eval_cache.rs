/*
 *  gomoku-core, a Gomoku/Ninuki-style search engine core.
 *  Copyright (C) 2024 ToTheAnd
 *
 *  gomoku-core is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  gomoku-core is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with gomoku-core. If not, see <https://www.gnu.org/licenses/>.
 */

//! Optional cache of evaluator outputs. Same layout and associativity
//! discipline as the TT — multi-way buckets with an oldest-by-generation
//! victim policy — but simple enough (one `f64` value, no depth/flag/best
//! move) that it doesn't need the TT's cross-bucket stripe locking: a
//! single mutex per bucket is plenty since nothing here gates alpha-beta
//! correctness — the evaluator is never correctness-critical, only the TT
//! is.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::board::Player;
use crate::config::splitmix64;

#[derive(Debug, Clone, Copy)]
struct EvalCacheEntry {
    key: u64,
    value: f64,
    gen_written: u32,
    gen_last_used: u32,
    valid: bool,
}

impl Default for EvalCacheEntry {
    fn default() -> Self {
        Self { key: 0, value: 0.0, gen_written: 0, gen_last_used: 0, valid: false }
    }
}

struct EvalCacheBucket {
    slots: Vec<EvalCacheEntry>,
}

impl EvalCacheBucket {
    fn new(associativity: usize) -> Self {
        Self { slots: (0..associativity).map(|_| EvalCacheEntry::default()).collect() }
    }
}

pub struct EvalCache {
    mask: u64,
    buckets: Vec<Mutex<EvalCacheBucket>>,
    generation: AtomicU32,
}

const DEFAULT_ASSOCIATIVITY: usize = 4;

impl EvalCache {
    #[must_use]
    pub fn new(size_hint: usize) -> Self {
        let num_buckets = size_hint.next_power_of_two().max(1);
        Self {
            mask: (num_buckets - 1) as u64,
            buckets: (0..num_buckets).map(|_| Mutex::new(EvalCacheBucket::new(DEFAULT_ASSOCIATIVITY))).collect(),
            generation: AtomicU32::new(1),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buckets.len() * DEFAULT_ASSOCIATIVITY
    }

    pub fn next_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// `mix(state_hash, board_size, side_to_move)`: a SplitMix64 avalanche
    /// over the three components.
    #[must_use]
    pub fn key_for(state_hash: u64, board_size: usize, side_to_move: Player) -> u64 {
        let mut h = state_hash;
        h = splitmix64(h ^ (board_size as u64));
        h = splitmix64(h ^ (side_to_move.index() as u64).wrapping_add(0x9E37));
        h
    }

    #[must_use]
    pub fn get(&self, key: u64) -> Option<f64> {
        let bucket = &self.buckets[(key & self.mask) as usize];
        let mut guard = bucket.lock().unwrap();
        let gen = self.generation.load(Ordering::Acquire);
        for slot in &mut guard.slots {
            if slot.valid && slot.key == key {
                slot.gen_last_used = gen;
                return Some(slot.value);
            }
        }
        None
    }

    /// Only stores values at or above `min_abs` magnitude, filtering cheap
    /// low-signal evaluations. Within the bucket's way, prefers an empty
    /// slot, otherwise evicts whichever way is oldest by `gen_last_used`.
    pub fn put(&self, key: u64, value: f64, min_abs: f64) {
        if value.abs() < min_abs {
            return;
        }
        let gen = self.generation.load(Ordering::Acquire);
        let bucket = &self.buckets[(key & self.mask) as usize];
        let mut guard = bucket.lock().unwrap();

        if let Some(slot) = guard.slots.iter_mut().find(|s| s.valid && s.key == key) {
            *slot = EvalCacheEntry { key, value, gen_written: gen, gen_last_used: gen, valid: true };
            return;
        }
        if let Some(slot) = guard.slots.iter_mut().find(|s| !s.valid) {
            *slot = EvalCacheEntry { key, value, gen_written: gen, gen_last_used: gen, valid: true };
            return;
        }
        let victim = guard.slots.iter_mut().min_by_key(|s| s.gen_last_used).expect("bucket always has at least one way");
        *victim = EvalCacheEntry { key, value, gen_written: gen, gen_last_used: gen, valid: true };
    }

    pub fn clear(&self) {
        for bucket in &self.buckets {
            for slot in &mut bucket.lock().unwrap().slots {
                *slot = EvalCacheEntry::default();
            }
        }
        self.generation.store(1, Ordering::Release);
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.buckets.iter().map(|b| b.lock().unwrap().slots.iter().filter(|s| s.valid).count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let cache = EvalCache::new(16);
        cache.put(5, 42.0, 1.0);
        assert_eq!(cache.get(5), Some(42.0));
    }

    #[test]
    fn values_below_min_abs_are_not_stored() {
        let cache = EvalCache::new(16);
        cache.put(5, 0.1, 1.0);
        assert_eq!(cache.get(5), None);
    }

    #[test]
    fn key_derivation_depends_on_side_to_move() {
        let a = EvalCache::key_for(123, 15, Player::Black);
        let b = EvalCache::key_for(123, 15, Player::White);
        assert_ne!(a, b);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = EvalCache::new(16);
        cache.put(5, 42.0, 1.0);
        cache.clear();
        assert_eq!(cache.count(), 0);
    }
}
