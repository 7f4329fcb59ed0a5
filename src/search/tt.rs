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

//! The transposition table: the only cache allowed to influence
//! alpha-beta pruning. Bucketed, set-associative, generation-aged, with
//! striped locking so probes (which also write, to refresh `gen_last_used`
//! and `hits`) don't serialize the whole table on one lock.
//!
//! `motors/src/search/tt.rs` packs a whole entry
//! into two atomically-updated `u64`s per slot, aligned to a cache line.
//! This entry is wider (score, depth, flag, best move, hit counter, two
//! generation fields, an optional shape-metadata blob) than a `u64` pair,
//! so slots here are plain structs behind the stripe's `Mutex` rather than
//! atomics — the bucket/alignment/striping *idea* is still grounded in
//! that file, just not the single-CAS entry encoding.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::board::Move;
use crate::error::{EngineError, Res};

pub const DEFAULT_VERY_OLD_THRESHOLD: u32 = 8;
const MAX_STRIPES: usize = 64;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Flag {
    Exact,
    Lower,
    Upper,
}

/// Geometric metadata for the optional root-shape translation cache:
/// disabled unless `ai_enable_root_transpose` *and* the translation guard
/// holds on probe.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RootShapeMeta {
    pub dx: i16,
    pub dy: i16,
    pub symmetry_index: u8,
}

impl RootShapeMeta {
    /// Whether this shape-shifted entry may be trusted for the board
    /// currently being probed. Guards against applying a translation whose
    /// margin would run the shape off the edge of a smaller or
    /// differently-shaped board.
    #[must_use]
    pub fn translation_guard_satisfied(&self, board_size: usize, margin: i16) -> bool {
        let shift = self.dx.unsigned_abs().max(self.dy.unsigned_abs());
        i32::from(shift) + i32::from(margin) < board_size as i32
    }
}

#[derive(Debug, Clone)]
pub struct TTEntry {
    pub key: u64,
    pub heuristic_hash: u64,
    pub depth: i16,
    pub score: i32,
    pub flag: Flag,
    pub best_move: Option<Move>,
    pub hits: u32,
    pub gen_written: u32,
    pub gen_last_used: u32,
    pub valid: bool,
    pub meta: Option<RootShapeMeta>,
}

impl Default for TTEntry {
    fn default() -> Self {
        Self {
            key: 0,
            heuristic_hash: 0,
            depth: -1,
            score: 0,
            flag: Flag::Exact,
            best_move: None,
            hits: 0,
            gen_written: 0,
            gen_last_used: 0,
            valid: false,
            meta: None,
        }
    }
}

/// Replacement classes, smallest-wins: 0 means "never replace via this
/// path" (rule 1's own-key case is handled separately before this is
/// consulted), larger numbers are increasingly disposable.
fn replacement_class(entry: &TTEntry, new_depth: i16, new_flag: Flag) -> u8 {
    if !entry.valid {
        return 3;
    }
    if entry.depth > new_depth {
        0
    } else if entry.depth == new_depth && entry.flag == Flag::Exact && new_flag != Flag::Exact {
        0
    } else if entry.depth < new_depth {
        1
    } else if entry.flag != Flag::Exact && new_flag == Flag::Exact {
        2
    } else {
        3
    }
}

#[derive(Debug, Clone)]
struct TTBucket {
    slots: Vec<TTEntry>,
}

impl TTBucket {
    fn new(associativity: usize) -> Self {
        Self { slots: (0..associativity).map(|_| TTEntry::default()).collect() }
    }
}

pub struct TT {
    num_buckets: usize,
    bucket_mask: u64,
    associativity: usize,
    stripe_count: usize,
    stripe_mask: u64,
    stripes: Vec<Mutex<Vec<TTBucket>>>,
    generation: AtomicU32,
    very_old_threshold: u32,
}

impl TT {
    #[must_use]
    pub fn new(size_hint: usize, associativity: usize) -> Self {
        let num_buckets = size_hint.next_power_of_two().max(1);
        let stripe_count = num_buckets.min(MAX_STRIPES).next_power_of_two();
        let mut per_stripe_counts = vec![0usize; stripe_count];
        for bucket_index in 0..num_buckets {
            per_stripe_counts[bucket_index % stripe_count] += 1;
        }
        let stripes = per_stripe_counts
            .into_iter()
            .map(|count| Mutex::new((0..count).map(|_| TTBucket::new(associativity)).collect()))
            .collect();
        Self {
            num_buckets,
            bucket_mask: (num_buckets - 1) as u64,
            associativity,
            stripe_count,
            stripe_mask: (stripe_count - 1) as u64,
            stripes,
            generation: AtomicU32::new(1),
            very_old_threshold: DEFAULT_VERY_OLD_THRESHOLD,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.num_buckets * self.associativity
    }

    #[must_use]
    pub fn current_generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Increments the generation once per root search; wraparound skips 0
    /// since 0 is reserved to mean "never written".
    pub fn next_generation(&self) {
        loop {
            let prev = self.generation.fetch_add(1, Ordering::AcqRel);
            if prev.wrapping_add(1) != 0 {
                break;
            }
        }
    }

    fn bucket_location(&self, key: u64) -> (usize, usize) {
        let bucket_index = (key & self.bucket_mask) as usize;
        let stripe_index = (key & self.stripe_mask) as usize;
        let local_index = bucket_index / self.stripe_count;
        (stripe_index, local_index)
    }

    pub fn probe(&self, key: u64, heuristic_hash: u64) -> Option<TTEntry> {
        let (stripe_index, local_index) = self.bucket_location(key);
        let mut stripe = self.stripes[stripe_index].lock().unwrap();
        let bucket = &mut stripe[local_index];
        let gen = self.current_generation();
        for slot in &mut bucket.slots {
            if slot.valid && slot.key == key && slot.heuristic_hash == heuristic_hash {
                slot.hits += 1;
                slot.gen_last_used = gen;
                return Some(slot.clone());
            }
        }
        None
    }

    /// Returns `(replaced, overwrote)`: `replaced` is whether the new
    /// entry was actually written anywhere; `overwrote` is whether that
    /// slot held a valid entry beforehand.
    pub fn store(&self, key: u64, heuristic_hash: u64, depth: i16, score: i32, flag: Flag, best_move: Option<Move>, meta: Option<RootShapeMeta>) -> (bool, bool) {
        let (stripe_index, local_index) = self.bucket_location(key);
        let gen = self.current_generation();
        let mut stripe = self.stripes[stripe_index].lock().unwrap();
        let bucket = &mut stripe[local_index];

        // Rule 1: an existing entry for the same (key, heuristic_hash).
        if let Some(slot) = bucket.slots.iter_mut().find(|s| s.valid && s.key == key && s.heuristic_hash == heuristic_hash) {
            let age = gen.wrapping_sub(slot.gen_last_used);
            let should_replace = depth > slot.depth
                || (depth == slot.depth && flag == Flag::Exact && slot.flag != Flag::Exact)
                || (depth == slot.depth && flag == slot.flag && age >= self.very_old_threshold);
            if should_replace {
                *slot = TTEntry { key, heuristic_hash, depth, score, flag, best_move, hits: slot.hits, gen_written: gen, gen_last_used: gen, valid: true, meta };
                return (true, true);
            }
            return (false, true);
        }

        // Rule 2: an empty slot.
        if let Some(slot) = bucket.slots.iter_mut().find(|s| !s.valid) {
            *slot = TTEntry { key, heuristic_hash, depth, score, flag, best_move, hits: 0, gen_written: gen, gen_last_used: gen, valid: true, meta };
            return (true, false);
        }

        // Rule 3: scan for the best victim by replacement class (smallest
        // nonzero class wins), ties broken by largest age.
        let victim = bucket
            .slots
            .iter_mut()
            .filter(|s| replacement_class(s, depth, flag) > 0)
            .min_by_key(|s| {
                let class = replacement_class(s, depth, flag);
                let age = gen.wrapping_sub(s.gen_last_used);
                (class, u32::MAX - age)
            });

        if let Some(slot) = victim {
            let overwrote = slot.valid;
            *slot = TTEntry { key, heuristic_hash, depth, score, flag, best_move, hits: 0, gen_written: gen, gen_last_used: gen, valid: true, meta };
            return (true, overwrote);
        }

        // Rule 4: no qualifying victim, drop the write.
        (false, false)
    }

    pub fn clear(&self) {
        for stripe in &self.stripes {
            let mut guard = stripe.lock().unwrap();
            for bucket in guard.iter_mut() {
                for slot in &mut bucket.slots {
                    *slot = TTEntry::default();
                }
            }
        }
        self.generation.store(1, Ordering::Release);
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.stripes.iter().map(|s| s.lock().unwrap().iter().map(|b| b.slots.iter().filter(|s| s.valid).count()).sum::<usize>()).sum()
    }

    pub fn delete_by_key(&self, key: u64) {
        let (stripe_index, local_index) = self.bucket_location(key);
        let mut stripe = self.stripes[stripe_index].lock().unwrap();
        for slot in &mut stripe[local_index].slots {
            if slot.valid && slot.key == key {
                *slot = TTEntry::default();
            }
        }
    }

    pub fn delete_by_heuristic_hash(&self, heuristic_hash: u64) {
        for stripe in &self.stripes {
            let mut guard = stripe.lock().unwrap();
            for bucket in guard.iter_mut() {
                for slot in &mut bucket.slots {
                    if slot.valid && slot.heuristic_hash == heuristic_hash {
                        *slot = TTEntry::default();
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn top_entries_by_hits(&self, offset: usize, limit: usize) -> Vec<TTEntry> {
        let mut all: Vec<TTEntry> = self
            .stripes
            .iter()
            .flat_map(|s| {
                let guard = s.lock().unwrap();
                guard.iter().flat_map(|b| b.slots.iter().filter(|s| s.valid).cloned().collect::<Vec<_>>()).collect::<Vec<_>>()
            })
            .collect();
        all.sort_by(|a, b| b.hits.cmp(&a.hits));
        all.into_iter().skip(offset).take(limit).collect()
    }

    /// Hand-rolled length-prefixed binary format: no wall-clock timestamps,
    /// no external serialization crate. Format: magic, version, num_buckets,
    /// associativity, entry count, then fixed-width records.
    #[must_use]
    pub fn persist(&self) -> Vec<u8> {
        const MAGIC: u32 = 0x474F_4D4B; // "GOMK"
        const VERSION: u32 = 1;
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.num_buckets as u64).to_le_bytes());
        buf.extend_from_slice(&(self.associativity as u64).to_le_bytes());

        let entries: Vec<TTEntry> = self
            .stripes
            .iter()
            .flat_map(|s| {
                let guard = s.lock().unwrap();
                guard.iter().flat_map(|b| b.slots.iter().filter(|s| s.valid).cloned().collect::<Vec<_>>()).collect::<Vec<_>>()
            })
            .collect();
        buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        for e in &entries {
            buf.extend_from_slice(&e.key.to_le_bytes());
            buf.extend_from_slice(&e.heuristic_hash.to_le_bytes());
            buf.extend_from_slice(&e.depth.to_le_bytes());
            buf.extend_from_slice(&e.score.to_le_bytes());
            buf.push(match e.flag {
                Flag::Exact => 0,
                Flag::Lower => 1,
                Flag::Upper => 2,
            });
            match e.best_move {
                Some(m) => {
                    buf.push(1);
                    buf.push(m.x);
                    buf.push(m.y);
                }
                None => {
                    buf.push(0);
                    buf.push(0);
                    buf.push(0);
                }
            }
            buf.extend_from_slice(&e.hits.to_le_bytes());
            buf.extend_from_slice(&e.gen_written.to_le_bytes());
            buf.extend_from_slice(&e.gen_last_used.to_le_bytes());
        }
        buf
    }

    /// Loads a blob produced by [`Self::persist`]. Size mismatches (a
    /// different `num_buckets`/`associativity`) cause a fresh, empty table
    /// rather than an attempt to reshape the data, per the persistence
    /// format's documented behavior.
    pub fn load(&self, blob: &[u8]) -> Res<()> {
        let bad = || EngineError::PersistenceIo("truncated or corrupt TT blob".to_string());
        let mut cursor = 0usize;
        let read_u32 = |buf: &[u8], at: usize| -> Res<u32> {
            let bytes: [u8; 4] = buf.get(at..at + 4).ok_or_else(bad)?.try_into().unwrap();
            Ok(u32::from_le_bytes(bytes))
        };
        let read_u64 = |buf: &[u8], at: usize| -> Res<u64> {
            let bytes: [u8; 8] = buf.get(at..at + 8).ok_or_else(bad)?.try_into().unwrap();
            Ok(u64::from_le_bytes(bytes))
        };

        let magic = read_u32(blob, cursor)?;
        cursor += 4;
        if magic != 0x474F_4D4B {
            return Err(bad().into());
        }
        let _version = read_u32(blob, cursor)?;
        cursor += 4;
        let num_buckets = read_u64(blob, cursor)? as usize;
        cursor += 8;
        let associativity = read_u64(blob, cursor)? as usize;
        cursor += 8;
        let entry_count = read_u64(blob, cursor)? as usize;
        cursor += 8;

        if num_buckets != self.num_buckets || associativity != self.associativity {
            self.clear();
            return Ok(());
        }

        self.clear();
        for _ in 0..entry_count {
            let key = read_u64(blob, cursor)?;
            cursor += 8;
            let heuristic_hash = read_u64(blob, cursor)?;
            cursor += 8;
            let depth = i16::from_le_bytes(blob.get(cursor..cursor + 2).ok_or_else(bad)?.try_into().unwrap());
            cursor += 2;
            let score = i32::from_le_bytes(blob.get(cursor..cursor + 4).ok_or_else(bad)?.try_into().unwrap());
            cursor += 4;
            let flag = match *blob.get(cursor).ok_or_else(bad)? {
                0 => Flag::Exact,
                1 => Flag::Lower,
                2 => Flag::Upper,
                _ => return Err(bad().into()),
            };
            cursor += 1;
            let has_move = *blob.get(cursor).ok_or_else(bad)?;
            cursor += 1;
            let mx = *blob.get(cursor).ok_or_else(bad)?;
            cursor += 1;
            let my = *blob.get(cursor).ok_or_else(bad)?;
            cursor += 1;
            let best_move = (has_move == 1).then(|| Move::new(mx, my));
            let hits = read_u32(blob, cursor)?;
            cursor += 4;
            let gen_written = read_u32(blob, cursor)?;
            cursor += 4;
            let gen_last_used = read_u32(blob, cursor)?;
            cursor += 4;

            self.store(key, heuristic_hash, depth, score, flag, best_move, None);
            // `store` always stamps the current generation; overwrite with
            // the persisted generations so relative ages survive a reload.
            let (stripe_index, local_index) = self.bucket_location(key);
            let mut stripe = self.stripes[stripe_index].lock().unwrap();
            if let Some(slot) = stripe[local_index].slots.iter_mut().find(|s| s.valid && s.key == key && s.heuristic_hash == heuristic_hash) {
                slot.hits = hits;
                slot.gen_written = gen_written;
                slot.gen_last_used = gen_last_used;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_store_then_probe() {
        let tt = TT::new(16, 4);
        let (replaced, overwrote) = tt.store(42, 7, 5, 123, Flag::Exact, Some(Move::new(1, 2)), None);
        assert!(replaced);
        assert!(!overwrote);
        let entry = tt.probe(42, 7).expect("entry must be present");
        assert_eq!(entry.depth, 5);
        assert_eq!(entry.score, 123);
        assert_eq!(entry.flag, Flag::Exact);
        assert_eq!(entry.hits, 1);
        assert_eq!(entry.gen_last_used, tt.current_generation());
    }

    #[test]
    fn deeper_store_always_replaces() {
        let tt = TT::new(16, 4);
        tt.store(42, 7, 3, 1, Flag::Upper, None, None);
        let (replaced, overwrote) = tt.store(42, 7, 5, 2, Flag::Upper, None, None);
        assert!(replaced && overwrote);
        assert_eq!(tt.probe(42, 7).unwrap().depth, 5);
    }

    #[test]
    fn shallower_store_does_not_replace_unless_very_old() {
        let tt = TT::new(16, 4);
        tt.store(42, 7, 5, 1, Flag::Upper, None, None);
        let (replaced, _) = tt.store(42, 7, 3, 2, Flag::Upper, None, None);
        assert!(!replaced);
        assert_eq!(tt.probe(42, 7).unwrap().depth, 5);
    }

    #[test]
    fn different_heuristic_hash_is_treated_as_absent() {
        let tt = TT::new(16, 4);
        tt.store(42, 7, 5, 1, Flag::Exact, None, None);
        assert!(tt.probe(42, 8).is_none());
    }

    #[test]
    fn clear_resets_generation_and_empties_table() {
        let tt = TT::new(16, 4);
        tt.store(42, 7, 5, 1, Flag::Exact, None, None);
        tt.next_generation();
        tt.clear();
        assert_eq!(tt.current_generation(), 1);
        assert_eq!(tt.count(), 0);
    }

    #[test]
    fn persist_and_load_roundtrip() {
        let tt = TT::new(16, 4);
        tt.store(42, 7, 5, 123, Flag::Exact, Some(Move::new(1, 2)), None);
        tt.store(99, 7, 2, -5, Flag::Lower, None, None);
        let blob = tt.persist();

        let reloaded = TT::new(16, 4);
        reloaded.load(&blob).unwrap();
        assert_eq!(reloaded.count(), 2);
        let entry = reloaded.probe(42, 7).unwrap();
        assert_eq!(entry.score, 123);
        assert_eq!(entry.best_move, Some(Move::new(1, 2)));
    }

    #[test]
    fn load_with_mismatched_shape_yields_fresh_table() {
        let tt = TT::new(16, 4);
        tt.store(42, 7, 5, 123, Flag::Exact, None, None);
        let blob = tt.persist();

        let reloaded = TT::new(32, 4);
        reloaded.load(&blob).unwrap();
        assert_eq!(reloaded.count(), 0);
    }
}
