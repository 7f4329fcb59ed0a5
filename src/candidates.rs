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

//! Candidate move generation: bounding-box growth around the occupied
//! stones, then a priority bucket per empty cell inside it.

use crate::board::{Board, Cell, Move, Player};

#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, derive_more::Display)]
#[repr(u8)]
pub enum Priority {
    Win = 0,
    BlockWin = 1,
    CreateFour = 2,
    BlockFour = 3,
    CreateOpen3 = 4,
    BlockOpen3 = 5,
    LastMoveNeighborhood = 10,
    Proximity = 20,
    Default = 50,
}

#[derive(Debug, Copy, Clone)]
pub struct Candidate {
    pub mov: Move,
    pub priority: Priority,
}

const BASE_MARGIN: i32 = 2;
const MAX_MARGIN: i32 = 4;
const LOW_DENSITY_THRESHOLD: f64 = 0.15;

/// The occupied bounding box, inclusive, or `None` on an empty board.
fn bounding_box(board: &Board) -> Option<(usize, usize, usize, usize)> {
    let mut min_x = usize::MAX;
    let mut min_y = usize::MAX;
    let mut max_x = 0usize;
    let mut max_y = 0usize;
    let mut any = false;
    for y in 0..board.size() {
        for x in 0..board.size() {
            if board.at(x, y) != Cell::Empty {
                any = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }
    any.then_some((min_x, min_y, max_x, max_y))
}

/// Counts a contiguous run of `mine`/`opponent` stones through an empty
/// cell along one of the four board directions, in both directions from
/// the cell (the cell itself is empty and not counted).
fn run_lengths(board: &Board, x: usize, y: usize, dx: isize, dy: isize, player: Player) -> (u32, u32) {
    let size = board.size() as isize;
    let mut mine = 0u32;
    let mut opp = 0u32;
    for step in [1isize, -1] {
        let mut cx = x as isize + dx * step;
        let mut cy = y as isize + dy * step;
        while cx >= 0 && cy >= 0 && cx < size && cy < size {
            match board.at(cx as usize, cy as usize).player() {
                Some(p) if p == player => mine += 1,
                Some(_) => {
                    opp += 1;
                    break;
                }
                None => break,
            }
            cx += dx * step;
            cy += dy * step;
        }
    }
    (mine, opp)
}

const DIRECTIONS: [(isize, isize); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

/// Per-candidate threat summary: best contiguous run achievable by `player`
/// and by its opponent through this empty cell, across all four
/// directions, plus whether either side would reach an open three.
struct CellThreats {
    best_mine_run: u32,
    best_opp_run: u32,
    mine_open3: bool,
    opp_open3: bool,
}

fn cell_threats(board: &Board, x: usize, y: usize, player: Player, win_length: usize) -> CellThreats {
    let mut best_mine_run = 0;
    let mut best_opp_run = 0;
    let mut mine_open3 = false;
    let mut opp_open3 = false;
    for &(dx, dy) in &DIRECTIONS {
        let (mine, _) = run_lengths(board, x, y, dx, dy, player);
        let (opp, _) = run_lengths(board, x, y, dx, dy, player.opposite());
        best_mine_run = best_mine_run.max(mine + 1);
        best_opp_run = best_opp_run.max(opp + 1);
        if mine + 1 == win_length.saturating_sub(2) as u32 {
            mine_open3 = true;
        }
        if opp + 1 == win_length.saturating_sub(2) as u32 {
            opp_open3 = true;
        }
    }
    CellThreats { best_mine_run, best_opp_run, mine_open3, opp_open3 }
}

fn priority_for(threats: &CellThreats, win_length: usize, last_move: Option<Move>, x: usize, y: usize) -> Priority {
    let win_run = win_length as u32 - 1;
    if threats.best_mine_run >= win_run {
        return Priority::Win;
    }
    if threats.best_opp_run >= win_run {
        return Priority::BlockWin;
    }
    if threats.best_mine_run + 1 >= win_run {
        return Priority::CreateFour;
    }
    if threats.best_opp_run + 1 >= win_run {
        return Priority::BlockFour;
    }
    if threats.mine_open3 {
        return Priority::CreateOpen3;
    }
    if threats.opp_open3 {
        return Priority::BlockOpen3;
    }
    if let Some(last) = last_move {
        let dx = (x as i32 - last.x as i32).abs();
        let dy = (y as i32 - last.y as i32).abs();
        if dx <= 2 && dy <= 2 {
            return Priority::LastMoveNeighborhood;
        }
    }
    Priority::Proximity
}

/// Whether any empty cell in the current (ungrown) bounding box already
/// carries a four-threat or open-three for `player` or its opponent. Used
/// ahead of candidate generation to decide whether the margin should widen
/// before the real candidate scan runs.
#[must_use]
pub fn has_urgent_threat(board: &Board, player: Player, win_length: usize) -> bool {
    let Some((min_x, min_y, max_x, max_y)) = bounding_box(board) else {
        return false;
    };
    let four_run = win_length as u32 - 2;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            if !board.is_empty(x, y) {
                continue;
            }
            let threats = cell_threats(board, x, y, player, win_length);
            if threats.best_mine_run >= four_run || threats.best_opp_run >= four_run || threats.mine_open3 || threats.opp_open3 {
                return true;
            }
        }
    }
    false
}

/// Produces legal, locally-relevant candidates: on an empty board, just
/// the center cell; otherwise every empty cell inside the grown bounding
/// box, each tagged with its priority. Stable sort keeps ties in `(y, x)`
/// order, matching the deterministic sort the search driver relies on for
/// reproducible move ordering.
#[must_use]
pub fn generate_candidates(board: &Board, player: Player, win_length: usize, last_move: Option<Move>, has_urgent_threat: bool) -> Vec<Candidate> {
    let size = board.size();
    let Some((min_x, min_y, max_x, max_y)) = bounding_box(board) else {
        let center = (size / 2) as u8;
        return vec![Candidate { mov: Move::new(center, center), priority: Priority::Default }];
    };

    let density = board.count_stones() as f64 / (size * size) as f64;
    let mut margin = BASE_MARGIN;
    if density < LOW_DENSITY_THRESHOLD {
        margin += 1;
    }
    if has_urgent_threat {
        margin += 1;
    }
    margin = margin.min(MAX_MARGIN);

    let lo_x = min_x.saturating_sub(margin as usize);
    let lo_y = min_y.saturating_sub(margin as usize);
    let hi_x = (max_x + margin as usize).min(size - 1);
    let hi_y = (max_y + margin as usize).min(size - 1);

    let mut candidates = Vec::new();
    for y in lo_y..=hi_y {
        for x in lo_x..=hi_x {
            if !board.is_empty(x, y) {
                continue;
            }
            let threats = cell_threats(board, x, y, player, win_length);
            let priority = priority_for(&threats, win_length, last_move, x, y);
            candidates.push(Candidate { mov: Move::new(x as u8, y as u8), priority });
        }
    }
    candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then((a.mov.y, a.mov.x).cmp(&(b.mov.y, b.mov.x))));
    candidates
}

/// True if `mov` lies inside the grown bounding box around `board`'s
/// occupied cells — used by property tests.
#[must_use]
pub fn is_inside_grown_box(board: &Board, mov: Move, margin: i32) -> bool {
    let Some((min_x, min_y, max_x, max_y)) = bounding_box(board) else {
        return true;
    };
    let size = board.size();
    let lo_x = min_x.saturating_sub(margin as usize);
    let lo_y = min_y.saturating_sub(margin as usize);
    let hi_x = (max_x + margin as usize).min(size - 1);
    let hi_y = (max_y + margin as usize).min(size - 1);
    (mov.x as usize) >= lo_x && (mov.x as usize) <= hi_x && (mov.y as usize) >= lo_y && (mov.y as usize) <= hi_y
}

#[cfg(test)]
mod tests {
    use proptest::proptest;

    use super::*;
    use crate::board::GameStateBuilder;

    #[test]
    fn empty_board_yields_only_center() {
        let state = GameStateBuilder::new(9).build().unwrap();
        let candidates = generate_candidates(&state.board, Player::Black, 5, None, false);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].mov, Move::new(4, 4));
    }

    #[test]
    fn all_candidates_are_inside_grown_box() {
        let mut state = GameStateBuilder::new(15).build().unwrap();
        state.apply_move(Move::new(7, 7), Player::Black, &[]);
        state.apply_move(Move::new(8, 8), Player::White, &[]);
        let candidates = generate_candidates(&state.board, Player::Black, 5, None, false);
        for c in &candidates {
            assert!(is_inside_grown_box(&state.board, c.mov, MAX_MARGIN));
        }
    }

    #[test]
    fn sort_order_is_deterministic() {
        let mut state = GameStateBuilder::new(9).build().unwrap();
        state.apply_move(Move::new(4, 4), Player::Black, &[]);
        let a = generate_candidates(&state.board, Player::White, 5, None, false);
        let b = generate_candidates(&state.board, Player::White, 5, None, false);
        let a_moves: Vec<_> = a.iter().map(|c| c.mov).collect();
        let b_moves: Vec<_> = b.iter().map(|c| c.mov).collect();
        assert_eq!(a_moves, b_moves);
    }

    #[test]
    fn an_immediate_win_is_flagged_priority_win() {
        let mut state = GameStateBuilder::new(9).build().unwrap();
        for x in [2u8, 3, 4, 5] {
            state.apply_move(Move::new(x, 4), Player::Black, &[]);
            state.apply_move(Move::new(x, 0), Player::White, &[]);
        }
        let candidates = generate_candidates(&state.board, Player::Black, 5, None, true);
        let win_cell = candidates.iter().find(|c| c.mov == Move::new(6, 4)).expect("winning cell must be a candidate");
        assert_eq!(win_cell.priority, Priority::Win);
    }

    #[test]
    fn must_block_cell_is_flagged_block_win() {
        let mut state = GameStateBuilder::new(9).build().unwrap();
        for x in [2u8, 3, 4, 5] {
            state.apply_move(Move::new(x, 4), Player::White, &[]);
            state.apply_move(Move::new(x, 0), Player::Black, &[]);
        }
        let candidates = generate_candidates(&state.board, Player::Black, 5, None, true);
        let block_cell = candidates.iter().find(|c| c.mov == Move::new(6, 4)).expect("blocking cell must be a candidate");
        assert_eq!(block_cell.priority, Priority::BlockWin);
    }

    proptest! {
        #[test]
        fn every_candidate_stays_inside_the_grown_box(ax in 0u8..13, ay in 0u8..13, bx in 0u8..13, by in 0u8..13) {
            let mut state = GameStateBuilder::new(13).build().unwrap();
            state.apply_move(Move::new(ax, ay), Player::Black, &[]);
            if Move::new(bx, by) != Move::new(ax, ay) {
                state.apply_move(Move::new(bx, by), Player::White, &[]);
            }
            let candidates = generate_candidates(&state.board, Player::Black, 5, Some(Move::new(bx, by)), false);
            for c in &candidates {
                assert!(is_inside_grown_box(&state.board, c.mov, MAX_MARGIN));
            }
        }
    }
}
