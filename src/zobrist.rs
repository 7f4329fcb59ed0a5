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

//! Zobrist keys and the 8-way dihedral symmetry table used to build
//! `CanonHash`. Keys are generated from a fixed seed with `rand_chacha` so
//! hashes are reproducible across restarts and across machines, unlike
//! `mnk.rs` which just hashes the board struct with
//! `std::hash::DefaultHasher` (fine for a transient in-memory key, not for
//! a TT that gets persisted to disk).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::splitmix64;

/// Fixed so `ZobristTable::new(size)` is deterministic across runs.
const ZOBRIST_SEED: u64 = 0x5A_0B_B1_57_0000_0001;

/// One of the 8 elements of the dihedral group D4, applied to board
/// coordinates. Index order matches `HashSym[0..8]` in the data model.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Symmetry {
    Identity,
    Rot90,
    Rot180,
    Rot270,
    FlipHorizontal,
    FlipVertical,
    FlipDiag,
    FlipAntiDiag,
}

pub const ALL_SYMMETRIES: [Symmetry; 8] = [
    Symmetry::Identity,
    Symmetry::Rot90,
    Symmetry::Rot180,
    Symmetry::Rot270,
    Symmetry::FlipHorizontal,
    Symmetry::FlipVertical,
    Symmetry::FlipDiag,
    Symmetry::FlipAntiDiag,
];

impl Symmetry {
    /// Maps `(x, y)` on a `size x size` board to its image under this
    /// transform. `size` is always the same board's side length for both
    /// coordinates since the board is square.
    #[must_use]
    pub fn apply(self, x: usize, y: usize, size: usize) -> (usize, usize) {
        let last = size - 1;
        match self {
            Symmetry::Identity => (x, y),
            Symmetry::Rot90 => (last - y, x),
            Symmetry::Rot180 => (last - x, last - y),
            Symmetry::Rot270 => (y, last - x),
            Symmetry::FlipHorizontal => (last - x, y),
            Symmetry::FlipVertical => (x, last - y),
            Symmetry::FlipDiag => (y, x),
            Symmetry::FlipAntiDiag => (last - y, last - x),
        }
    }
}

/// Per-board-size table of random keys: one per `(square, player)` pair,
/// one side-to-move key, and a small bank of per-capture-count keys.
#[derive(Debug, Clone)]
pub struct ZobristTable {
    size: usize,
    /// Indexed `[square * 2 + player_index]`.
    piece_keys: Vec<u64>,
    side_to_move: u64,
    /// Indexed `[player_index][min(count, CAPTURE_KEY_BANK - 1)]`.
    capture_keys: [[u64; Self::CAPTURE_KEY_BANK]; 2],
}

impl ZobristTable {
    const CAPTURE_KEY_BANK: usize = 32;

    #[must_use]
    pub fn new(size: usize) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(ZOBRIST_SEED ^ splitmix64(size as u64));
        let piece_keys = (0..size * size * 2).map(|_| rng.gen::<u64>()).collect();
        let side_to_move = rng.gen();
        let mut capture_keys = [[0u64; Self::CAPTURE_KEY_BANK]; 2];
        for player_keys in &mut capture_keys {
            for key in player_keys.iter_mut() {
                *key = rng.gen();
            }
        }
        Self { size, piece_keys, side_to_move, capture_keys }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn piece_key(&self, x: usize, y: usize, player_index: usize) -> u64 {
        debug_assert!(x < self.size && y < self.size && player_index < 2);
        self.piece_keys[(y * self.size + x) * 2 + player_index]
    }

    #[must_use]
    pub fn side_to_move_key(&self) -> u64 {
        self.side_to_move
    }

    #[must_use]
    pub fn capture_key(&self, player_index: usize, count: u32) -> u64 {
        let bucket = (count as usize).min(Self::CAPTURE_KEY_BANK - 1);
        self.capture_keys[player_index][bucket]
    }

    /// `piece_key` under one of the 8 symmetry transforms: the key bank is
    /// indexed by the transformed square so the plain XOR-incremental
    /// update works identically for every `HashSym` slot.
    #[must_use]
    pub fn piece_key_under(&self, sym: Symmetry, x: usize, y: usize, player_index: usize) -> u64 {
        let (tx, ty) = sym.apply(x, y, self.size);
        self.piece_key(tx, ty, player_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_instances() {
        let a = ZobristTable::new(15);
        let b = ZobristTable::new(15);
        assert_eq!(a.piece_key(3, 4, 0), b.piece_key(3, 4, 0));
        assert_eq!(a.side_to_move_key(), b.side_to_move_key());
    }

    #[test]
    fn different_sizes_differ() {
        let a = ZobristTable::new(15);
        let b = ZobristTable::new(19);
        assert_ne!(a.side_to_move_key(), b.side_to_move_key());
    }

    #[test]
    fn identity_symmetry_is_a_no_op() {
        let size = 9;
        for x in 0..size {
            for y in 0..size {
                assert_eq!(Symmetry::Identity.apply(x, y, size), (x, y));
            }
        }
    }

    #[test]
    fn rot90_four_times_is_identity() {
        let size = 11;
        for x in 0..size {
            for y in 0..size {
                let mut cur = (x, y);
                for _ in 0..4 {
                    cur = Symmetry::Rot90.apply(cur.0, cur.1, size);
                }
                assert_eq!(cur, (x, y));
            }
        }
    }

    #[test]
    fn all_eight_symmetries_are_bijections_on_the_grid() {
        let size = 7;
        for sym in ALL_SYMMETRIES {
            let mut seen = vec![vec![false; size]; size];
            for x in 0..size {
                for y in 0..size {
                    let (tx, ty) = sym.apply(x, y, size);
                    assert!(!seen[ty][tx], "symmetry {sym:?} collided at ({tx},{ty})");
                    seen[ty][tx] = true;
                }
            }
        }
    }
}
