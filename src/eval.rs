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

//! Line-scan threat evaluator: Black-positive, fixed pattern table, same
//! shape as `SimpleMnkEval` (sum a per-direction run-length
//! score over bitboards) but reworked into an explicit token-string scan
//! since captures and open/closed/broken distinctions need more than a
//! popcount of ray attacks.

use smallvec::SmallVec;

use crate::board::{Board, Cell, Player};
use crate::config::Heuristics;
use crate::score::WIN_SCORE;

/// A line's tokens never exceed the largest supported board side (25) plus
/// the two sentinel `THEIRS` bytes, so this never spills to the heap.
type TokenLine = SmallVec<[u8; 32]>;

const MINE: u8 = b'M';
const THEIRS: u8 = b'O';
const EMPTY: u8 = b'.';

/// One line's worth of per-player pattern counts.
#[derive(Debug, Default, Clone, Copy)]
struct ThreatCounts {
    win: u32,
    open4: u32,
    closed4: u32,
    broken4: u32,
    open3: u32,
    broken3: u32,
    closed3: u32,
    open2: u32,
    broken2: u32,
}

impl ThreatCounts {
    fn weighted_sum(&self, h: &Heuristics) -> f64 {
        let mut sum = h.open4 * f64::from(self.open4)
            + h.closed4 * f64::from(self.closed4)
            + h.broken4 * f64::from(self.broken4)
            + h.open3 * f64::from(self.open3)
            + h.broken3 * f64::from(self.broken3)
            + h.closed3 * f64::from(self.closed3)
            + h.open2 * f64::from(self.open2)
            + h.broken2 * f64::from(self.broken2);
        if self.open3 >= 2 {
            sum += h.fork_open3;
        }
        if self.closed4 + self.broken4 >= 2 {
            sum += h.fork_four_plus;
        }
        sum
    }
}

/// Scans a token string (sentinel `O` already appended at both ends) for
/// every pattern in the fixed, ordered table, longest/strongest first,
/// advancing the scan index by `pattern_len - 1` on a match exactly as the
/// line-scan algorithm specifies.
fn scan_tokens(tokens: &[u8]) -> ThreatCounts {
    let mut counts = ThreatCounts::default();
    let mut i = 0usize;
    while i < tokens.len() {
        if let Some(len) = match_at(tokens, i, &mut counts) {
            i += len.saturating_sub(1).max(1);
        } else {
            i += 1;
        }
    }
    counts
}

/// Tries every pattern at position `i`, longest first; returns the matched
/// pattern's length so the caller can advance the scan index.
fn match_at(tokens: &[u8], i: usize, counts: &mut ThreatCounts) -> Option<usize> {
    let rest = &tokens[i..];

    if starts_with(rest, b"MMMMM") {
        counts.win += 1;
        return Some(5);
    }
    if starts_with(rest, b".MMMM.") {
        counts.open4 += 1;
        return Some(6);
    }
    if starts_with(rest, b"OMMMM.") || starts_with(rest, b".MMMMO") {
        counts.closed4 += 1;
        return Some(6);
    }
    for pattern in [&b"MM.MM"[..], b"M.MMM", b"MMM.M"] {
        if starts_with(rest, pattern) {
            counts.broken4 += 1;
            return Some(pattern.len());
        }
    }
    if starts_with(rest, b".MMM.") {
        counts.open3 += 1;
        return Some(5);
    }
    for pattern in [&b".MM.M."[..], b".M.MM."] {
        if starts_with(rest, pattern) {
            counts.broken3 += 1;
            return Some(pattern.len());
        }
    }
    if starts_with(rest, b"OMMM.") || starts_with(rest, b".MMMO") {
        counts.closed3 += 1;
        return Some(5);
    }
    if starts_with(rest, b".MM.") {
        counts.open2 += 1;
        return Some(4);
    }
    if starts_with(rest, b".M.M.") {
        counts.broken2 += 1;
        return Some(5);
    }
    None
}

fn starts_with(haystack: &[u8], pattern: &[u8]) -> bool {
    haystack.len() >= pattern.len() && &haystack[..pattern.len()] == pattern
}

/// All rows, columns, and both diagonal families of length `>= win_length`,
/// as sequences of `(x, y)` coordinates.
fn lines(size: usize, win_length: usize) -> Vec<Vec<(usize, usize)>> {
    let mut result = Vec::new();
    for y in 0..size {
        result.push((0..size).map(|x| (x, y)).collect());
    }
    for x in 0..size {
        result.push((0..size).map(|y| (x, y)).collect());
    }
    let size_i = size as isize;
    for offset in -(size_i - 1)..size_i {
        let line: Vec<(usize, usize)> = (0..size_i)
            .filter_map(|x| {
                let y = x + offset;
                (y >= 0 && y < size_i).then_some((x as usize, y as usize))
            })
            .collect();
        if line.len() >= win_length {
            result.push(line);
        }
        let anti: Vec<(usize, usize)> = (0..size_i)
            .filter_map(|x| {
                let y = offset + (size_i - 1 - x);
                (y >= 0 && y < size_i).then_some((x as usize, y as usize))
            })
            .collect();
        if anti.len() >= win_length {
            result.push(anti);
        }
    }
    result.retain(|l| l.len() >= win_length);
    result
}

fn tokens_for(board: &Board, line: &[(usize, usize)], mine: Player) -> TokenLine {
    let mut tokens = TokenLine::with_capacity(line.len() + 2);
    tokens.push(THEIRS);
    for &(x, y) in line {
        tokens.push(match board.at(x, y) {
            Cell::Empty => EMPTY,
            c if c.player() == Some(mine) => MINE,
            _ => THEIRS,
        });
    }
    tokens.push(THEIRS);
    tokens
}

fn scan_player(board: &Board, player: Player, win_length: usize) -> ThreatCounts {
    let mut total = ThreatCounts::default();
    for line in lines(board.size(), win_length) {
        let tokens = tokens_for(board, &line, player);
        let line_counts = scan_tokens(&tokens);
        total.win += line_counts.win;
        total.open4 += line_counts.open4;
        total.closed4 += line_counts.closed4;
        total.broken4 += line_counts.broken4;
        total.open3 += line_counts.open3;
        total.broken3 += line_counts.broken3;
        total.closed3 += line_counts.closed3;
        total.open2 += line_counts.open2;
        total.broken2 += line_counts.broken2;
    }
    total
}

fn capture_term(h: &Heuristics, captured_black: u32, captured_white: u32) -> f64 {
    h.capture_pair * (f64::from(captured_black) - f64::from(captured_white))
}

/// Black-positive static evaluation. Magnitude never depends on whose turn
/// it is; callers fold side-to-move into their cache key, not into this
/// function's result.
#[must_use]
pub fn evaluate(board: &Board, heuristics: &Heuristics, win_length: usize, captured_black: u32, captured_white: u32) -> f64 {
    let black = scan_player(board, Player::Black, win_length);
    let white = scan_player(board, Player::White, win_length);

    let black_score = if black.win > 0 { WIN_SCORE } else { black.weighted_sum(heuristics) };
    let white_score = if white.win > 0 { WIN_SCORE } else { white.weighted_sum(heuristics) };

    black_score - white_score + capture_term(heuristics, captured_black, captured_white)
}

/// [`evaluate`] plus the sharp override: an open-4 for the side that is
/// NOT about to move is (barring a block) an unstoppable win, so the
/// score is pushed close to the win sentinel in that side's favor. This
/// is the only place `to_move` affects magnitude; the pattern-scan core
/// stays anti-symmetric under board-flip + color-swap.
#[must_use]
pub fn evaluate_with_to_move(
    board: &Board,
    heuristics: &Heuristics,
    win_length: usize,
    captured_black: u32,
    captured_white: u32,
    to_move: Player,
) -> f64 {
    let base = evaluate(board, heuristics, win_length, captured_black, captured_white);
    let threatening = to_move.opposite();
    let threat_open4 = scan_player(board, threatening, win_length).open4 > 0;
    if !threat_open4 {
        return base;
    }
    let sharp = WIN_SCORE * 0.9;
    match threatening {
        Player::Black => base.max(sharp),
        Player::White => base.min(-sharp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{GameStateBuilder, Move};

    #[test]
    fn empty_board_is_neutral() {
        let state = GameStateBuilder::new(9).build().unwrap();
        let h = Heuristics::default();
        assert_eq!(evaluate(&state.board, &h, 5, 0, 0), 0.0);
    }

    #[test]
    fn black_open_three_scores_positive() {
        let mut state = GameStateBuilder::new(9).build().unwrap();
        for x in [3u8, 4, 5] {
            state.apply_move(Move::new(x, 4), Player::Black, &[]);
        }
        let h = Heuristics::default();
        assert!(evaluate(&state.board, &h, 5, 0, 0) > 0.0);
    }

    #[test]
    fn five_in_a_row_hits_win_sentinel() {
        let mut state = GameStateBuilder::new(9).build().unwrap();
        for x in [2u8, 3, 4, 5, 6] {
            state.apply_move(Move::new(x, 4), Player::Black, &[]);
            if x < 6 {
                state.apply_move(Move::new(x, 7), Player::White, &[]);
            }
        }
        let h = Heuristics::default();
        assert!(evaluate(&state.board, &h, 5, 0, 0) >= WIN_SCORE);
    }

    #[test]
    fn anti_symmetric_under_flip_and_color_swap() {
        let mut black_heavy = GameStateBuilder::new(9).build().unwrap();
        black_heavy.apply_move(Move::new(3, 4), Player::Black, &[]);
        black_heavy.apply_move(Move::new(4, 4), Player::Black, &[]);

        let mut white_heavy = GameStateBuilder::new(9).build().unwrap();
        white_heavy.apply_move(Move::new(3, 4), Player::White, &[]);
        white_heavy.apply_move(Move::new(4, 4), Player::White, &[]);

        let h = Heuristics::default();
        let black_view = evaluate(&black_heavy.board, &h, 5, 0, 0);
        let white_view = evaluate(&white_heavy.board, &h, 5, 0, 0);
        assert_eq!(black_view, -white_view);
    }

    #[test]
    fn captures_shift_score_toward_the_capturing_side() {
        let state = GameStateBuilder::new(9).build().unwrap();
        let h = Heuristics::default();
        let with_black_captures = evaluate(&state.board, &h, 5, 3, 0);
        let with_white_captures = evaluate(&state.board, &h, 5, 0, 3);
        assert!(with_black_captures > 0.0);
        assert!(with_white_captures < 0.0);
    }

    #[test]
    fn sharp_override_punishes_side_to_move_facing_open_four() {
        let mut state = GameStateBuilder::new(9).build().unwrap();
        for x in [3u8, 4, 5, 6] {
            state.apply_move(Move::new(x, 4), Player::White, &[]);
            state.apply_move(Move::new(x, 0), Player::Black, &[]);
        }
        let h = Heuristics::default();
        // It's Black to move (4 plies each played in lockstep above leaves
        // White having just moved last), and White holds an open four.
        let scored = evaluate_with_to_move(&state.board, &h, 5, 0, 0, Player::Black);
        assert!(scored < -(WIN_SCORE * 0.5));
    }
}
