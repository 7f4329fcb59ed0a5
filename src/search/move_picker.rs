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

//! Move ordering: killer/history tables plus the function that folds
//! candidate priority, PV hints, and those tables into one order. The
//! `MovePicker` in `motors/src/search/move_picker.rs` lazily pops the
//! highest-scored remaining move out of an `ArrayVec` each call; this
//! crate's candidate lists are short enough (a capped, locally-relevant
//! set, not a whole legal-move list) that sorting once up front reads more
//! plainly, so [`MovePicker`] here just wraps a pre-sorted `Vec` and yields
//! from the front.

use arrayvec::ArrayVec;
use itertools::Itertools;

use crate::board::Move;
use crate::candidates::{Candidate, Priority};

/// Two killer moves per ply, most-recent first — a non-capture move that
/// caused a beta cutoff at this ply in a sibling subtree. `ArrayVec`
/// mirrors `MovePicker`'s own backing store, just sized to 2 instead of a
/// whole move list.
#[derive(Debug, Clone)]
pub struct KillerTable {
    slots: Vec<ArrayVec<Move, 2>>,
}

impl KillerTable {
    #[must_use]
    pub fn new(max_ply: usize) -> Self {
        Self { slots: vec![ArrayVec::new(); max_ply + 1] }
    }

    pub fn record(&mut self, ply: usize, mov: Move) {
        if ply >= self.slots.len() {
            return;
        }
        let slot = &mut self.slots[ply];
        if slot.first() == Some(&mov) {
            return;
        }
        if slot.is_full() {
            slot.pop();
        }
        slot.insert(0, mov);
    }

    #[must_use]
    pub fn is_killer(&self, ply: usize, mov: Move) -> bool {
        self.slots.get(ply).is_some_and(|slot| slot.contains(&mov))
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
    }
}

/// History heuristic: a `size*size` table of cutoff-weighted scores per
/// destination square, indexed `y*size + x` as the design notes specify.
#[derive(Debug, Clone)]
pub struct HistoryTable {
    size: usize,
    scores: Vec<f64>,
}

impl HistoryTable {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { size, scores: vec![0.0; size * size] }
    }

    fn index(&self, mov: Move) -> usize {
        mov.y as usize * self.size + mov.x as usize
    }

    pub fn bump(&mut self, mov: Move, depth: i16) {
        let idx = self.index(mov);
        self.scores[idx] += f64::from(depth) * f64::from(depth);
    }

    #[must_use]
    pub fn score(&self, mov: Move) -> f64 {
        self.scores[self.index(mov)]
    }

    pub fn clear(&mut self) {
        self.scores.iter_mut().for_each(|s| *s = 0.0);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScoredMove {
    pub mov: Move,
    pub priority: Priority,
    pub order_score: f64,
}

/// Folds PV hints, priority buckets, killer moves, and history scores into
/// a single descending order: PV first, then ascending priority bucket,
/// killer/history only perturbing the score *within* a bucket.
#[must_use]
pub fn order_moves(candidates: &[Candidate], pv_move: Option<Move>, killers: &KillerTable, ply: usize, history: &HistoryTable, killer_boost: f64, history_boost: f64) -> Vec<ScoredMove> {
    candidates
        .iter()
        .map(|c| {
            let mut order_score = -(c.priority as i32 as f64) * 1.0e7;
            if killers.is_killer(ply, c.mov) {
                order_score += killer_boost;
            }
            order_score += history.score(c.mov) * history_boost;
            if pv_move == Some(c.mov) {
                order_score += 1.0e9;
            }
            ScoredMove { mov: c.mov, priority: c.priority, order_score }
        })
        .sorted_by(|a, b| b.order_score.partial_cmp(&a.order_score).unwrap_or(std::cmp::Ordering::Equal))
        .collect()
}

/// A thin iterator wrapper mirroring the `MovePicker`/`MovePickIter` split,
/// so callers can `for (mov, _) in MovePicker::new(...)`.
pub struct MovePicker {
    moves: std::vec::IntoIter<ScoredMove>,
}

impl MovePicker {
    #[must_use]
    pub fn new(scored: Vec<ScoredMove>) -> Self {
        Self { moves: scored.into_iter() }
    }
}

impl Iterator for MovePicker {
    type Item = ScoredMove;

    fn next(&mut self) -> Option<Self::Item> {
        self.moves.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(x: u8, y: u8, priority: Priority) -> Candidate {
        Candidate { mov: Move::new(x, y), priority }
    }

    #[test]
    fn pv_move_is_promoted_to_front() {
        let candidates = vec![candidate(1, 1, Priority::Win), candidate(2, 2, Priority::Proximity)];
        let killers = KillerTable::new(4);
        let history = HistoryTable::new(9);
        let ordered = order_moves(&candidates, Some(Move::new(2, 2)), &killers, 0, &history, 10.0, 1.0);
        assert_eq!(ordered[0].mov, Move::new(2, 2));
    }

    #[test]
    fn priority_buckets_sort_ascending_by_default() {
        let candidates = vec![candidate(1, 1, Priority::Proximity), candidate(2, 2, Priority::Win), candidate(3, 3, Priority::BlockFour)];
        let killers = KillerTable::new(4);
        let history = HistoryTable::new(9);
        let ordered = order_moves(&candidates, None, &killers, 0, &history, 10.0, 1.0);
        assert_eq!(ordered[0].mov, Move::new(2, 2));
        assert_eq!(ordered[1].mov, Move::new(3, 3));
        assert_eq!(ordered[2].mov, Move::new(1, 1));
    }

    #[test]
    fn killer_move_is_boosted_within_its_bucket() {
        let candidates = vec![candidate(1, 1, Priority::Proximity), candidate(2, 2, Priority::Proximity)];
        let mut killers = KillerTable::new(4);
        killers.record(0, Move::new(1, 1));
        let history = HistoryTable::new(9);
        let ordered = order_moves(&candidates, None, &killers, 0, &history, 10.0, 1.0);
        assert_eq!(ordered[0].mov, Move::new(1, 1));
    }

    #[test]
    fn killer_never_outranks_a_higher_priority_bucket() {
        let candidates = vec![candidate(1, 1, Priority::Proximity), candidate(2, 2, Priority::Win)];
        let mut killers = KillerTable::new(4);
        killers.record(0, Move::new(1, 1));
        let history = HistoryTable::new(9);
        let ordered = order_moves(&candidates, None, &killers, 0, &history, 10.0, 1.0);
        assert_eq!(ordered[0].mov, Move::new(2, 2));
    }
}
