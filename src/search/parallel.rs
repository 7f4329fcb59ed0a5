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

//! Root-parallel (YBWC) search: the first ordered root move runs on the
//! calling thread to seed the shared root bound, then the remaining moves
//! fan out over a `rayon` thread pool that shares the TT and eval cache.
//! Each worker gets its own killer/history tables and its own `Stats`
//! buffer, merged into the caller's on return. Grounded in the sole
//! `rayon` usage site (`motors/src/search/tt.rs`'s `par_iter_mut` bulk
//! mutation) and in the atomic-flag idiom of
//! `motors/src/search/multithreading.rs`'s `AtomicSearchState`.

use std::sync::Instant;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rayon::ThreadPoolBuilder;

use crate::board::{GameState, Move, Player};
use crate::candidates::{self, Priority};
use crate::config::Config;
use crate::rules::Rules;
use crate::score::ILLEGAL_SCORE;
use crate::search::driver::{self, NodeContext, SearchSettings};
use crate::search::eval_cache::EvalCache;
use crate::search::move_picker::{self, HistoryTable, KillerTable};
use crate::search::statistics::Stats;
use crate::search::tt::TT;

/// Bit-reinterprets an `f64` into a `u64` that preserves the float's
/// ordering, so `AtomicU64::fetch_max`/`fetch_min` can serve as a racy but
/// monotone shared bound.
fn encode_order_preserving(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & (1 << 63) != 0 { !bits } else { bits | (1 << 63) }
}

fn decode_order_preserving(bits: u64) -> f64 {
    if bits & (1 << 63) != 0 { f64::from_bits(bits & !(1u64 << 63)) } else { f64::from_bits(!bits) }
}

/// The root's current best-known value, shared across workers so a late
/// sibling can prune against a bound an earlier sibling already proved,
/// without any worker blocking on another's completion.
struct SharedBound {
    maximizing: bool,
    value: AtomicU64,
}

impl SharedBound {
    fn new(maximizing: bool) -> Self {
        let initial = if maximizing { f64::NEG_INFINITY } else { f64::INFINITY };
        Self { maximizing, value: AtomicU64::new(encode_order_preserving(initial)) }
    }

    fn load(&self) -> f64 {
        decode_order_preserving(self.value.load(Ordering::Acquire))
    }

    fn advance(&self, candidate: f64) {
        let encoded = encode_order_preserving(candidate);
        if self.maximizing {
            self.value.fetch_max(encoded, Ordering::AcqRel);
        } else {
            self.value.fetch_min(encoded, Ordering::AcqRel);
        }
    }
}

/// One root move's outcome, collected back on the calling thread.
struct RootOutcome {
    mov: Move,
    value: f64,
    stats: Stats,
}

fn search_one_root_move(state: &GameState, rules: &dyn Rules, config: &Config, tt: &TT, eval_cache: Option<&EvalCache>, heuristic_hash: u64, depth: u32, settings: &SearchSettings, deadline: Instant, mov: Move, alpha: f64, beta: f64) -> RootOutcome {
    let player = settings.player;
    let mut child = state.clone();
    driver::apply_and_update_status(&mut child, rules, mov, player);

    let size = state.board.size();
    let mut ctx = NodeContext {
        rules,
        config,
        tt,
        eval_cache,
        heuristic_hash,
        settings,
        deadline,
        killers: KillerTable::new((depth as usize) + 4),
        history: HistoryTable::new(size),
        nodes_since_check: 0,
        nodes_since_progress: 0,
        timed_out: false,
    };
    let mut stats = Stats::new();
    let value = driver::minimax(&child, &mut ctx, depth.saturating_sub(1), 1, alpha, beta, &mut stats);
    RootOutcome { mov, value, stats }
}

/// Root-parallel counterpart to `score_board_at_depth`: the first ordered
/// root move is searched sequentially on the caller's thread (the "young
/// brother" that establishes the initial bound), then the rest are handed
/// to a fixed-size `rayon` pool. Returns the Black-positive score per cell
/// (illegal cells hold [`ILLEGAL_SCORE`]) and whether every move completed
/// before the deadline/stop signal.
#[allow(clippy::too_many_arguments)]
pub fn score_board_direct_depth_parallel(state: &GameState, rules: &dyn Rules, config: &Config, tt: &TT, eval_cache: Option<&EvalCache>, heuristic_hash: u64, depth: u32, settings: &SearchSettings, deadline: Instant, stats: &mut Stats, workers: usize) -> (Vec<f64>, Option<Move>, bool) {
    let size = state.board.size();
    let mut scores = vec![ILLEGAL_SCORE; size * size];
    tt.next_generation();

    let player = settings.player;
    let (root_moves, _tactical) = driver::select_candidates(state, rules, config, player, 0);
    if root_moves.is_empty() {
        let center = (size / 2) as u8;
        scores[size / 2 * size + size / 2] = 0.0;
        return (scores, Some(Move::new(center, center)), true);
    }

    let win_length = rules.win_length();
    let has_urgent = candidates::has_urgent_threat(&state.board, player, win_length);
    let generated = candidates::generate_candidates(&state.board, player, win_length, state.last_move, has_urgent);
    let synthetic: Vec<candidates::Candidate> = root_moves
        .iter()
        .map(|&mov| candidates::Candidate { mov, priority: generated.iter().find(|c| c.mov == mov).map_or(Priority::Default, |c| c.priority) })
        .collect();
    let pv_move = tt.probe(driver::tt_key(state), heuristic_hash).and_then(|e| e.best_move);
    let killers = KillerTable::new(4);
    let history = HistoryTable::new(size);
    let killer_boost = if config.ai_enable_killer_moves { config.ai_killer_boost } else { 0.0 };
    let history_boost = if config.ai_enable_history_moves { config.ai_history_boost } else { 0.0 };
    let ordered = move_picker::order_moves(&synthetic, pv_move, &killers, 0, &history, killer_boost, history_boost);

    let maximizing = player == Player::Black;
    let bound = SharedBound::new(maximizing);

    let mut moves = ordered.iter();
    let Some(first) = moves.next() else {
        scores[size / 2 * size + size / 2] = 0.0;
        return (scores, Some(Move::new((size / 2) as u8, (size / 2) as u8)), true);
    };

    let alpha = if maximizing { bound.load() } else { f64::NEG_INFINITY };
    let beta = if maximizing { f64::INFINITY } else { bound.load() };
    let first_outcome = search_one_root_move(state, rules, config, tt, eval_cache, heuristic_hash, depth, settings, deadline, first.mov, alpha, beta);
    bound.advance(first_outcome.value);
    stats.merge(&first_outcome.stats);
    scores[first_outcome.mov.y as usize * size + first_outcome.mov.x as usize] = first_outcome.value;
    let mut best_move = Some(first_outcome.mov);
    let mut best_value = first_outcome.value;
    let mut timed_out = (settings.should_stop)() || Instant::now() >= deadline;

    let remaining: Vec<Move> = moves.map(|s| s.mov).collect();
    if !remaining.is_empty() && !timed_out {
        let pool = ThreadPoolBuilder::new().num_threads(workers.max(1)).build().expect("failed to build root-parallel thread pool");
        let outcomes: Vec<RootOutcome> = pool.install(|| {
            use rayon::iter::{IntoParallelIterator, ParallelIterator};
            remaining
                .into_par_iter()
                .map(|mov| {
                    let a = if maximizing { bound.load() } else { f64::NEG_INFINITY };
                    let b = if maximizing { f64::INFINITY } else { bound.load() };
                    let outcome = search_one_root_move(state, rules, config, tt, eval_cache, heuristic_hash, depth, settings, deadline, mov, a, b);
                    bound.advance(outcome.value);
                    outcome
                })
                .collect()
        });

        for outcome in outcomes {
            stats.merge(&outcome.stats);
            scores[outcome.mov.y as usize * size + outcome.mov.x as usize] = outcome.value;
            let improves = if maximizing { outcome.value > best_value } else { outcome.value < best_value };
            if improves {
                best_value = outcome.value;
                best_move = Some(outcome.mov);
            }
        }
        timed_out = timed_out || (settings.should_stop)() || Instant::now() >= deadline;
    }

    stats.max_depth_completed = stats.max_depth_completed.max(depth);
    (scores, best_move, !timed_out)
}

/// How long a root-parallel split waits for its pool to build before
/// falling back would be surprising; kept as a documented constant rather
/// than a magic number at the call site.
pub const DEFAULT_POOL_BUILD_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::GameStateBuilder;
    use crate::rules::SimpleFiveInARowRules;

    #[test]
    fn order_preserving_roundtrip_keeps_relative_order() {
        let values = [f64::NEG_INFINITY, -100.0, -1.0, 0.0, 1.0, 100.0, f64::INFINITY];
        let encoded: Vec<u64> = values.iter().map(|&v| encode_order_preserving(v)).collect();
        for w in encoded.windows(2) {
            assert!(w[0] < w[1]);
        }
        for (&v, &e) in values.iter().zip(encoded.iter()) {
            assert_eq!(decode_order_preserving(e), v);
        }
    }

    #[test]
    fn parallel_root_search_matches_sequential_best_move_on_an_immediate_win() {
        let mut state = GameStateBuilder::new(9).build().unwrap();
        for x in [2u8, 3, 4, 5] {
            state.apply_move(Move::new(x, 4), Player::Black, &[]);
        }
        state.to_move = Player::Black;
        let rules = SimpleFiveInARowRules::default();
        let config = Config::default();
        let tt = TT::new(1024, 4);
        let stop = || false;
        let settings = SearchSettings::new(Player::Black, &stop);
        let mut stats = Stats::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        let (scores, best_move, completed) = score_board_direct_depth_parallel(&state, &rules, &config, &tt, None, config.heuristics.fingerprint(), 2, &settings, deadline, &mut stats, 2);
        assert!(completed);
        let best = best_move.expect("a move must be chosen");
        assert!(best == Move::new(1, 4) || best == Move::new(6, 4));
        assert!(scores.iter().any(|&s| s != ILLEGAL_SCORE));
    }
}
