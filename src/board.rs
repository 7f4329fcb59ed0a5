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

//! The board, its cells, and `GameState`: the plain, incrementally-hashed
//! state the rest of the crate searches over. `Board` here is a flat
//! `size x size` grid of [`Cell`], unlike `mnk.rs`'s `MNKBoard` which
//! keeps two `ExtendedRawBitboard`s — a row-major `Vec<Cell>` is the
//! natural fit for a board with captures and arbitrary `size in [5, 25]`,
//! where a fixed-width bitboard would need per-size specialization.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use anyhow::{bail, ensure};

use crate::error::{EngineError, Res};
use crate::zobrist::{ALL_SYMMETRIES, ZobristTable};

pub const MIN_SIZE: usize = 5;
pub const MAX_SIZE: usize = 25;
pub const DEFAULT_WIN_LENGTH: usize = 5;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Black,
    White,
}

impl Cell {
    #[must_use]
    pub fn player(self) -> Option<Player> {
        match self {
            Cell::Empty => None,
            Cell::Black => Some(Player::Black),
            Cell::White => Some(Player::White),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Player {
    Black,
    White,
}

impl Player {
    #[must_use]
    pub fn opposite(self) -> Player {
        match self {
            Player::Black => Player::White,
            Player::White => Player::Black,
        }
    }

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Player::Black => 0,
            Player::White => 1,
        }
    }

    #[must_use]
    pub fn as_cell(self) -> Cell {
        match self {
            Player::Black => Cell::Black,
            Player::White => Cell::White,
        }
    }
}

impl Display for Player {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Player::Black => write!(f, "Black"),
            Player::White => write!(f, "White"),
        }
    }
}

/// A candidate or played move. `depth` is telemetry only: the completed
/// search depth that produced this move, not part of its identity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Move {
    pub x: u8,
    pub y: u8,
    pub depth: i16,
}

// A `Move` rides through every candidate list and killer/history table in
// the hot search path; if a future field addition grows it past a cache
// line's worth of copies per ply, that's worth noticing at compile time
// rather than in a profiler.
static_assertions::const_assert!(std::mem::size_of::<Move>() <= 8);

impl Move {
    #[must_use]
    pub fn new(x: u8, y: u8) -> Self {
        Self { x, y, depth: 0 }
    }

    #[must_use]
    pub fn with_depth(x: u8, y: u8, depth: i16) -> Self {
        Self { x, y, depth }
    }

    #[must_use]
    pub fn is_in_bounds(self, size: usize) -> bool {
        (self.x as usize) < size && (self.y as usize) < size
    }
}

impl Display for Move {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone)]
pub struct Board {
    size: usize,
    cells: Vec<Cell>,
}

impl Board {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { size, cells: vec![Cell::Empty; size * size] }
    }

    pub fn checked_new(size: usize) -> Res<Self> {
        ensure!(
            (MIN_SIZE..=MAX_SIZE).contains(&size),
            EngineError::InvalidSettings(format!("board size {size} outside [{MIN_SIZE}, {MAX_SIZE}]"))
        );
        Ok(Self::new(size))
    }

    pub fn reset(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = Cell::Empty);
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn in_bounds(&self, x: usize, y: usize) -> bool {
        x < self.size && y < self.size
    }

    #[must_use]
    pub fn at(&self, x: usize, y: usize) -> Cell {
        debug_assert!(self.in_bounds(x, y));
        self.cells[y * self.size + x]
    }

    #[must_use]
    pub fn is_empty(&self, x: usize, y: usize) -> bool {
        self.at(x, y) == Cell::Empty
    }

    pub fn set(&mut self, x: usize, y: usize, value: Cell) {
        debug_assert!(self.in_bounds(x, y));
        let idx = y * self.size + x;
        self.cells[idx] = value;
    }

    pub fn remove(&mut self, x: usize, y: usize) {
        self.set(x, y, Cell::Empty);
    }

    #[must_use]
    pub fn count_empty(&self) -> usize {
        self.cells.iter().filter(|&&c| c == Cell::Empty).count()
    }

    #[must_use]
    pub fn count_stones(&self) -> usize {
        self.cells.len() - self.count_empty()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

impl Display for Board {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for y in 0..self.size {
            for x in 0..self.size {
                let c = match self.at(x, y) {
                    Cell::Empty => '.',
                    Cell::Black => 'X',
                    Cell::White => 'O',
                };
                write!(f, "{c}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    NotStarted,
    Running,
    BlackWon,
    WhiteWon,
    Draw,
}

impl Status {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::NotStarted | Status::Running)
    }
}

/// Everything the search needs about a position: the board, whose turn it
/// is, capture counts, and the three running hashes from the data model
/// (`hash`, `hash_sym[0..8]`, `canon_hash`).
#[derive(Debug, Clone)]
pub struct GameState {
    pub board: Board,
    pub to_move: Player,
    pub captured_black: u32,
    pub captured_white: u32,
    pub status: Status,
    pub last_move: Option<Move>,
    pub must_capture: bool,
    pub forced_moves: Vec<Move>,
    pub capture_win_stones: u32,

    hash: u64,
    hash_sym: [u64; 8],
    canon_hash: u64,

    zobrist: Arc<ZobristTable>,
}

impl GameState {
    #[must_use]
    pub fn new(size: usize, zobrist: Arc<ZobristTable>, capture_win_stones: u32) -> Self {
        assert_eq!(zobrist.size(), size, "zobrist table built for a different board size");
        let board = Board::new(size);
        let mut state = Self {
            board,
            to_move: Player::Black,
            captured_black: 0,
            captured_white: 0,
            status: Status::NotStarted,
            last_move: None,
            must_capture: false,
            forced_moves: Vec::new(),
            capture_win_stones,
            hash: 0,
            hash_sym: [0; 8],
            canon_hash: 0,
            zobrist,
        };
        state.recompute_hashes();
        state
    }

    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    #[must_use]
    pub fn hash_sym(&self) -> &[u64; 8] {
        &self.hash_sym
    }

    #[must_use]
    pub fn canon_hash(&self) -> u64 {
        self.canon_hash
    }

    #[must_use]
    pub fn zobrist(&self) -> &Arc<ZobristTable> {
        &self.zobrist
    }

    /// `O(size^2)` full recompute. Used on reset and to cross-check the
    /// incremental update in property tests.
    pub fn recompute_hashes(&mut self) {
        let mut hash = 0u64;
        let mut hash_sym = [0u64; 8];
        for y in 0..self.board.size() {
            for x in 0..self.board.size() {
                if let Some(player) = self.board.at(x, y).player() {
                    hash ^= self.zobrist.piece_key(x, y, player.index());
                    for (i, sym) in ALL_SYMMETRIES.into_iter().enumerate() {
                        hash_sym[i] ^= self.zobrist.piece_key_under(sym, x, y, player.index());
                    }
                }
            }
        }
        if self.to_move == Player::White {
            hash ^= self.zobrist.side_to_move_key();
            for h in &mut hash_sym {
                *h ^= self.zobrist.side_to_move_key();
            }
        }
        hash ^= self.zobrist.capture_key(Player::Black.index(), self.captured_black);
        hash ^= self.zobrist.capture_key(Player::White.index(), self.captured_white);
        for h in &mut hash_sym {
            *h ^= self.zobrist.capture_key(Player::Black.index(), self.captured_black);
            *h ^= self.zobrist.capture_key(Player::White.index(), self.captured_white);
        }
        self.hash = hash;
        self.hash_sym = hash_sym;
        self.canon_hash = hash_sym.into_iter().min().unwrap();
    }

    /// Applies `mov` for `player`, removing `captures` (stones flipped off
    /// the board) and updating all three hashes incrementally by XORing out
    /// the keys that changed and back in the new ones, under every
    /// symmetry transform at once.
    pub fn apply_move(&mut self, mov: Move, player: Player, captures: &[(u8, u8)]) {
        debug_assert!(mov.is_in_bounds(self.board.size()));
        debug_assert!(self.board.is_empty(mov.x as usize, mov.y as usize));

        let prev_captured_black = self.captured_black;
        let prev_captured_white = self.captured_white;

        self.board.set(mov.x as usize, mov.y as usize, player.as_cell());
        self.xor_piece_everywhere(mov.x as usize, mov.y as usize, player);

        for &(cx, cy) in captures {
            let captured_player = self.board.at(cx as usize, cy as usize).player().expect("capture target must be occupied");
            self.board.remove(cx as usize, cy as usize);
            self.xor_piece_everywhere(cx as usize, cy as usize, captured_player);
            match captured_player {
                Player::Black => self.captured_white += 1,
                Player::White => self.captured_black += 1,
            }
        }

        self.xor_side_to_move();
        self.xor_capture_keys(Player::Black, prev_captured_black, self.captured_black);
        self.xor_capture_keys(Player::White, prev_captured_white, self.captured_white);

        self.last_move = Some(mov);
        self.to_move = self.to_move.opposite();
    }

    fn xor_piece_everywhere(&mut self, x: usize, y: usize, player: Player) {
        self.hash ^= self.zobrist.piece_key(x, y, player.index());
        for (i, sym) in ALL_SYMMETRIES.into_iter().enumerate() {
            self.hash_sym[i] ^= self.zobrist.piece_key_under(sym, x, y, player.index());
        }
        self.canon_hash = self.hash_sym.into_iter().min().unwrap();
    }

    fn xor_side_to_move(&mut self) {
        self.hash ^= self.zobrist.side_to_move_key();
        for h in &mut self.hash_sym {
            *h ^= self.zobrist.side_to_move_key();
        }
        self.canon_hash = self.hash_sym.into_iter().min().unwrap();
    }

    fn xor_capture_keys(&mut self, player: Player, old_count: u32, new_count: u32) {
        if old_count == new_count {
            return;
        }
        let old_key = self.zobrist.capture_key(player.index(), old_count);
        let new_key = self.zobrist.capture_key(player.index(), new_count);
        self.hash ^= old_key ^ new_key;
        for h in &mut self.hash_sym {
            *h ^= old_key ^ new_key;
        }
        self.canon_hash = self.hash_sym.into_iter().min().unwrap();
    }
}

/// Builder-style construction with validation, mirroring `mnk.rs`'s
/// `UnverifiedMnkBoard` split between "parse into a plain struct" and
/// "validate invariants before calling it a real board".
#[derive(Debug, Clone)]
pub struct GameStateBuilder {
    size: usize,
    capture_win_stones: u32,
}

impl GameStateBuilder {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { size, capture_win_stones: 10 }
    }

    #[must_use]
    pub fn capture_win_stones(mut self, stones: u32) -> Self {
        self.capture_win_stones = stones;
        self
    }

    pub fn build(self) -> Res<GameState> {
        if !(MIN_SIZE..=MAX_SIZE).contains(&self.size) {
            bail!(EngineError::InvalidSettings(format!("board size {} outside [{MIN_SIZE}, {MAX_SIZE}]", self.size)));
        }
        let zobrist = Arc::new(ZobristTable::new(self.size));
        Ok(GameState::new(self.size, zobrist, self.capture_win_stones))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(size: usize) -> GameState {
        GameStateBuilder::new(size).build().unwrap()
    }

    #[test]
    fn empty_board_has_zero_hash() {
        let state = fresh(9);
        assert_eq!(state.hash(), 0);
        assert_eq!(state.canon_hash(), 0);
    }

    #[test]
    fn incremental_hash_matches_full_recompute() {
        let mut state = fresh(9);
        state.apply_move(Move::new(4, 4), Player::Black, &[]);
        state.apply_move(Move::new(3, 3), Player::White, &[]);
        let incremental = state.hash();
        let incremental_canon = state.canon_hash();
        state.recompute_hashes();
        assert_eq!(state.hash(), incremental);
        assert_eq!(state.canon_hash(), incremental_canon);
    }

    #[test]
    fn canon_hash_is_min_of_symmetries() {
        let mut state = fresh(9);
        state.apply_move(Move::new(4, 4), Player::Black, &[]);
        state.apply_move(Move::new(2, 6), Player::White, &[]);
        assert_eq!(state.canon_hash(), *state.hash_sym().iter().min().unwrap());
    }

    #[test]
    fn center_opening_is_its_own_symmetric_image() {
        // A single center stone on an odd-sized board is invariant under
        // every symmetry, so all 8 hash_sym entries must agree.
        let mut state = fresh(9);
        state.apply_move(Move::new(4, 4), Player::Black, &[]);
        let first = state.hash_sym()[0];
        assert!(state.hash_sym().iter().all(|&h| h == first));
    }

    #[test]
    fn capture_updates_hash_and_counts() {
        let mut state = fresh(9);
        state.apply_move(Move::new(4, 4), Player::Black, &[]);
        let before = state.hash();
        state.apply_move(Move::new(5, 5), Player::White, &[(4, 4)]);
        assert_ne!(state.hash(), before);
        assert_eq!(state.captured_white, 1);
        assert_eq!(state.board.at(4, 4), Cell::Empty);
    }

    #[test]
    fn rejects_out_of_range_size() {
        assert!(GameStateBuilder::new(3).build().is_err());
        assert!(GameStateBuilder::new(26).build().is_err());
    }
}
