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

//! The search driver: iterative deepening over alpha-beta minimax, move
//! ordering, late move reductions, and the root-only lost-mode fallback.
//! Grounded in the `NormalEngine`/`do_search` split
//! (`motors/src/search.rs`) but specialized to a fixed Black/White
//! maximizing/minimizing convention instead of a generic negamax, per the
//! Black-positive scoring convention this evaluator commits to.

use std::sync::Arc;
use std::time::Instant;

use crate::board::{Board, GameState, Move, Player, Status};
use crate::candidates::{self, Priority};
use crate::config::Config;
use crate::eval;
use crate::rules::Rules;
use crate::score::{ILLEGAL_SCORE, WIN_SCORE, round_to_i32};
use crate::search::eval_cache::EvalCache;
use crate::search::move_picker::{self, HistoryTable, KillerTable};
use crate::search::statistics::Stats;
use crate::search::tt::{Flag, TT};

/// How often (in nodes) the cooperative stop check runs, mirroring
/// `DEFAULT_CHECK_TIME_INTERVAL`.
const CHECK_TIME_INTERVAL: u64 = 1024;
/// How often (in nodes) chunked telemetry callbacks fire.
const PROGRESS_CHUNK: u64 = 64;

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display)]
pub enum CompletionStatus {
    Completed,
    #[strum(serialize = "timed out")]
    TimedOut,
    #[strum(serialize = "no legal moves")]
    NoLegalMoves,
}

pub struct SearchSettings<'a> {
    pub depth: u32,
    pub min_depth: u32,
    pub max_depth: u32,
    pub timeout_ms: u64,
    pub time_budget_ms: u64,
    pub player: Player,
    pub on_node_progress: Option<&'a (dyn Fn(&Stats) + Sync)>,
    pub on_search_progress: Option<&'a (dyn Fn(u32, f64) + Sync)>,
    /// Fired, throttled by `ai_ghost_throttle_ms`, as the root loop tries
    /// each candidate in turn: the "ghost stone" a UI can show hovering
    /// over the move currently under consideration.
    pub on_ghost_update: Option<&'a (dyn Fn(Move) + Sync)>,
    pub should_stop: &'a (dyn Fn() -> bool + Sync),
    pub direct_depth_only: bool,
    pub skip_queue_backlog: bool,
}

impl<'a> SearchSettings<'a> {
    #[must_use]
    pub fn new(player: Player, should_stop: &'a (dyn Fn() -> bool + Sync)) -> Self {
        Self {
            depth: 10,
            min_depth: 6,
            max_depth: 12,
            timeout_ms: 5_000,
            time_budget_ms: 4_500,
            player,
            on_node_progress: None,
            on_search_progress: None,
            on_ghost_update: None,
            should_stop,
            direct_depth_only: false,
            skip_queue_backlog: false,
        }
    }
}

/// Result of one completed (or aborted) `score_board` call.
pub struct SearchResult {
    pub scores: Vec<f64>,
    pub best_move: Option<Move>,
    pub completed_depth: u32,
    pub status: CompletionStatus,
}

pub(crate) struct NodeContext<'a> {
    pub(crate) rules: &'a dyn Rules,
    pub(crate) config: &'a Config,
    pub(crate) tt: &'a TT,
    pub(crate) eval_cache: Option<&'a EvalCache>,
    pub(crate) heuristic_hash: u64,
    pub(crate) settings: &'a SearchSettings<'a>,
    pub(crate) deadline: Instant,
    pub(crate) killers: KillerTable,
    pub(crate) history: HistoryTable,
    pub(crate) nodes_since_check: u64,
    pub(crate) nodes_since_progress: u64,
    pub(crate) timed_out: bool,
}

fn mix_size_status(size: usize, status: Status) -> u64 {
    let status_tag = match status {
        Status::NotStarted => 0u64,
        Status::Running => 1,
        Status::BlackWon => 2,
        Status::WhiteWon => 3,
        Status::Draw => 4,
    };
    crate::config::splitmix64((size as u64) << 8 | status_tag)
}

/// The TT lookup key for a position: its symmetry-canonical hash folded
/// with board size and game status, so e.g. a just-won position never
/// collides with the otherwise-identical position one ply earlier.
pub fn tt_key(state: &GameState) -> u64 {
    state.canon_hash() ^ mix_size_status(state.board.size(), state.status)
}

fn terminal_score(status: Status) -> Option<f64> {
    match status {
        Status::BlackWon => Some(WIN_SCORE),
        Status::WhiteWon => Some(-WIN_SCORE),
        Status::Draw => Some(0.0),
        Status::NotStarted | Status::Running => None,
    }
}

pub(crate) fn apply_and_update_status(state: &mut GameState, rules: &dyn Rules, mov: Move, player: Player) {
    let mut captures = Vec::new();
    rules.find_captures_into(&state.board, mov, player, &mut captures);
    state.apply_move(mov, player, &captures);
    if rules.is_win(&state.board, mov) {
        state.status = match player {
            Player::Black => Status::BlackWon,
            Player::White => Status::WhiteWon,
        };
    } else if state.captured_black >= state.capture_win_stones {
        state.status = Status::WhiteWon;
    } else if state.captured_white >= state.capture_win_stones {
        state.status = Status::BlackWon;
    } else if rules.is_draw(&state.board) {
        state.status = Status::Draw;
    } else {
        state.status = Status::Running;
    }
}

/// Every empty cell where `player` placing a stone would immediately win.
/// Exhaustive (not priority-capped): must-win/must-block detection cannot
/// use the heuristic candidate ordering, only the rules collaborator's own
/// verdict.
pub(crate) fn immediate_wins(board: &Board, rules: &dyn Rules, player: Player) -> Vec<Move> {
    let mut wins = Vec::new();
    for y in 0..board.size() {
        for x in 0..board.size() {
            if board.is_empty(x, y) {
                let mov = Move::new(x as u8, y as u8);
                let mut trial = board.clone();
                trial.set(x, y, player.as_cell());
                if rules.is_win(&trial, mov) {
                    wins.push(mov);
                }
            }
        }
    }
    wins
}

fn blocks_all_wins(state: &GameState, rules: &dyn Rules, mov: Move, player: Player) -> bool {
    let mut trial = state.clone();
    apply_and_update_status(&mut trial, rules, mov, player);
    immediate_wins(&trial.board, rules, player.opposite()).is_empty()
}

/// Every legal move that leaves the opponent with no immediate win at
/// all — never capped, so no block is ever missed to a top-K cutoff.
fn must_block_moves(state: &GameState, rules: &dyn Rules, player: Player) -> Vec<Move> {
    let size = state.board.size();
    let mut result = Vec::new();
    for y in 0..size {
        for x in 0..size {
            if state.board.is_empty(x, y) {
                let mov = Move::new(x as u8, y as u8);
                if blocks_all_wins(state, rules, mov, player) {
                    result.push(mov);
                }
            }
        }
    }
    result
}

fn is_tactical_priority(priority: Priority) -> bool {
    matches!(priority, Priority::Win | Priority::BlockWin | Priority::CreateFour | Priority::BlockFour | Priority::CreateOpen3 | Priority::BlockOpen3)
}

fn candidate_limit(config: &Config, ply: u32, tactical: bool) -> usize {
    if config.ai_enable_hard_ply_caps {
        match ply {
            7 => return config.ai_max_candidates_ply7,
            8 => return config.ai_max_candidates_ply8,
            9 => return config.ai_max_candidates_ply9,
            _ => {}
        }
    }
    if config.ai_enable_tactical_k {
        return match (tactical, ply) {
            (true, 0) => config.ai_k_tact_root,
            (true, 1..=3) => config.ai_k_tact_mid,
            (true, _) => config.ai_k_tact_deep,
            (false, 0) => config.ai_k_quiet_root,
            (false, 1..=3) => config.ai_k_quiet_mid,
            (false, _) => config.ai_k_quiet_deep,
        };
    }
    match ply {
        0 => config.ai_max_candidates_root,
        1..=3 => config.ai_max_candidates_mid,
        _ => config.ai_max_candidates_deep,
    }
}

impl NodeContext<'_> {
    fn should_stop_now(&mut self) -> bool {
        self.nodes_since_check += 1;
        if self.nodes_since_check < CHECK_TIME_INTERVAL {
            return false;
        }
        self.nodes_since_check = 0;
        if (self.settings.should_stop)() {
            self.timed_out = true;
            return true;
        }
        if Instant::now() >= self.deadline {
            self.timed_out = true;
            return true;
        }
        false
    }

    fn tick_progress(&mut self, stats: &Stats) {
        self.nodes_since_progress += 1;
        if self.nodes_since_progress >= PROGRESS_CHUNK {
            self.nodes_since_progress = 0;
            if let Some(cb) = self.settings.on_node_progress {
                cb(stats);
            }
        }
    }
}

/// Produces the ordered candidate set for one node: forced win/must-block
/// subsets are never pruned by `candidate_limit`.
pub(crate) fn select_candidates(state: &GameState, rules: &dyn Rules, config: &Config, player: Player, ply: u32) -> (Vec<Move>, bool) {
    let win_length = rules.win_length();
    let my_wins = immediate_wins(&state.board, rules, player);
    if !my_wins.is_empty() {
        return (my_wins, true);
    }
    let opponent_wins = immediate_wins(&state.board, rules, player.opposite());
    if !opponent_wins.is_empty() {
        return (must_block_moves(state, rules, player), true);
    }

    let has_urgent = candidates::has_urgent_threat(&state.board, player, win_length);
    let candidates = candidates::generate_candidates(&state.board, player, win_length, state.last_move, has_urgent);
    let tactical = config.ai_enable_tactical_mode && candidates.iter().any(|c| is_tactical_priority(c.priority));
    let limit = candidate_limit(config, ply, tactical);
    let moves: Vec<Move> = candidates.iter().take(limit.max(1)).map(|c| c.mov).collect();
    (moves, tactical)
}

fn leaf_eval(state: &GameState, ctx: &mut NodeContext, stats: &mut Stats) -> f64 {
    if let Some(cache) = ctx.eval_cache {
        let key = EvalCache::key_for(state.hash(), state.board.size(), state.to_move);
        if let Some(v) = cache.get(key) {
            stats.eval_cache_hits += 1;
            return v;
        }
        stats.eval_cache_misses += 1;
        let value = eval::evaluate_with_to_move(&state.board, &ctx.config.heuristics, ctx.rules.win_length(), state.captured_black, state.captured_white, state.to_move);
        cache.put(key, value, ctx.config.ai_eval_cache_min_abs);
        value
    } else {
        eval::evaluate_with_to_move(&state.board, &ctx.config.heuristics, ctx.rules.win_length(), state.captured_black, state.captured_white, state.to_move)
    }
}

/// Extends search past the normal depth horizon through forcing moves
/// only (an immediate win, a must-block, or a tactical-priority
/// candidate), for up to `ext_left` further plies, falling back to
/// [`leaf_eval`] as soon as the position goes quiet or the budget runs
/// out. Keeps the horizon from freezing an evaluation mid-exchange.
fn tactical_extend(state: &GameState, ctx: &mut NodeContext, ext_left: u32, mut alpha: f64, mut beta: f64, stats: &mut Stats) -> f64 {
    stats.nodes += 1;
    if let Some(terminal) = terminal_score(state.status) {
        return terminal;
    }
    if ext_left == 0 || ctx.should_stop_now() {
        return leaf_eval(state, ctx, stats);
    }

    let player = state.to_move;
    let win_length = ctx.rules.win_length();
    let my_wins = immediate_wins(&state.board, ctx.rules, player);
    let forcing_moves: Vec<Move> = if !my_wins.is_empty() {
        my_wins
    } else {
        let opponent_wins = immediate_wins(&state.board, ctx.rules, player.opposite());
        if !opponent_wins.is_empty() {
            must_block_moves(state, ctx.rules, player)
        } else {
            let has_urgent = candidates::has_urgent_threat(&state.board, player, win_length);
            let generated = candidates::generate_candidates(&state.board, player, win_length, state.last_move, has_urgent);
            generated.iter().filter(|c| is_tactical_priority(c.priority)).map(|c| c.mov).collect()
        }
    };

    if forcing_moves.is_empty() {
        return leaf_eval(state, ctx, stats);
    }

    let maximizing = player == Player::Black;
    let mut best_value = if maximizing { f64::NEG_INFINITY } else { f64::INFINITY };
    for mov in forcing_moves {
        let mut child = state.clone();
        apply_and_update_status(&mut child, ctx.rules, mov, player);
        let value = tactical_extend(&child, ctx, ext_left - 1, alpha, beta, stats);
        if maximizing {
            best_value = best_value.max(value);
            alpha = alpha.max(best_value);
        } else {
            best_value = best_value.min(value);
            beta = beta.min(best_value);
        }
        if alpha >= beta {
            break;
        }
    }
    best_value
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn minimax(state: &GameState, ctx: &mut NodeContext, depth_left: u32, ply: u32, mut alpha: f64, mut beta: f64, stats: &mut Stats) -> f64 {
    stats.nodes += 1;
    ctx.tick_progress(stats);
    if ctx.should_stop_now() {
        return leaf_eval(state, ctx, stats);
    }

    if let Some(terminal) = terminal_score(state.status) {
        return terminal;
    }
    if depth_left == 0 {
        if ctx.config.ai_enable_tactical_ext {
            return tactical_extend(state, ctx, ctx.config.ai_tactical_ext_depth, alpha, beta, stats);
        }
        return leaf_eval(state, ctx, stats);
    }

    let original_alpha = alpha;
    let original_beta = beta;
    let key = tt_key(state);
    let mut pv_move = None;
    if let Some(entry) = ctx.tt.probe(key, ctx.heuristic_hash) {
        stats.tt_hits += 1;
        pv_move = entry.best_move;
        if i32::from(entry.depth) >= depth_left as i32 {
            let value = f64::from(entry.score);
            match entry.flag {
                Flag::Exact => return value,
                Flag::Lower => alpha = alpha.max(value),
                Flag::Upper => beta = beta.min(value),
            }
            if alpha >= beta {
                return value;
            }
        }
    } else {
        stats.tt_misses += 1;
    }

    let player = state.to_move;
    let (candidate_moves, tactical) = select_candidates(state, ctx.rules, ctx.config, player, ply);
    if candidate_moves.is_empty() {
        return leaf_eval(state, ctx, stats);
    }

    let priorities: Vec<Priority> = {
        let win_length = ctx.rules.win_length();
        let has_urgent = candidates::has_urgent_threat(&state.board, player, win_length);
        let generated = candidates::generate_candidates(&state.board, player, win_length, state.last_move, has_urgent);
        candidate_moves
            .iter()
            .map(|m| generated.iter().find(|c| c.mov == *m).map_or(Priority::Default, |c| c.priority))
            .collect()
    };
    let synthetic_candidates: Vec<candidates::Candidate> = candidate_moves.iter().zip(priorities.iter()).map(|(&mov, &priority)| candidates::Candidate { mov, priority }).collect();
    let killer_boost = if ctx.config.ai_enable_killer_moves { ctx.config.ai_killer_boost } else { 0.0 };
    let history_boost = if ctx.config.ai_enable_history_moves { ctx.config.ai_history_boost } else { 0.0 };
    let ordered = move_picker::order_moves(&synthetic_candidates, pv_move, &ctx.killers, ply as usize, &ctx.history, killer_boost, history_boost);

    let maximizing = player == Player::Black;
    let mut best_value = if maximizing { f64::NEG_INFINITY } else { f64::INFINITY };
    let mut best_move = None;

    for (move_index, scored) in ordered.iter().enumerate() {
        if ctx.timed_out {
            break;
        }
        let mut child = state.clone();
        apply_and_update_status(&mut child, ctx.rules, scored.mov, player);

        let quiet = !is_tactical_priority(scored.priority);
        let value;
        if quiet && !tactical && depth_left >= 4 && move_index >= 4 {
            let reduced = minimax(&child, ctx, depth_left - 2, ply + 1, alpha, beta, stats);
            stats.lmr_reductions += 1;
            let improves = if maximizing { reduced > alpha } else { reduced < beta };
            if improves {
                stats.lmr_re_searches += 1;
                value = minimax(&child, ctx, depth_left - 1, ply + 1, alpha, beta, stats);
            } else {
                value = reduced;
            }
        } else {
            value = minimax(&child, ctx, depth_left - 1, ply + 1, alpha, beta, stats);
        }

        if maximizing {
            if value > best_value {
                best_value = value;
                best_move = Some(scored.mov);
            }
            alpha = alpha.max(best_value);
        } else {
            if value < best_value {
                best_value = value;
                best_move = Some(scored.mov);
            }
            beta = beta.min(best_value);
        }

        if alpha >= beta {
            stats.beta_cutoffs += 1;
            if move_index == 0 {
                stats.cutoff_after_first_child += 1;
            }
            if quiet {
                if ctx.config.ai_enable_killer_moves {
                    ctx.killers.record(ply as usize, scored.mov);
                }
                if ctx.config.ai_enable_history_moves {
                    ctx.history.bump(scored.mov, depth_left as i16);
                }
            }
            break;
        }
    }

    let flag = if best_value <= original_alpha {
        Flag::Upper
    } else if best_value >= original_beta {
        Flag::Lower
    } else {
        Flag::Exact
    };
    ctx.tt.store(key, ctx.heuristic_hash, depth_left as i16, round_to_i32(best_value), flag, best_move, None);
    stats.tt_stores += 1;
    best_value
}

/// One fixed-depth root search: returns the Black-positive score of every
/// legal root move (illegal cells hold [`ILLEGAL_SCORE`]) plus the chosen
/// best move, applying the root-only lost-mode fallback when enabled.
pub fn score_board_at_depth(state: &GameState, rules: &dyn Rules, config: &Config, tt: &TT, eval_cache: Option<&EvalCache>, heuristic_hash: u64, depth: u32, settings: &SearchSettings, deadline: Instant, stats: &mut Stats) -> (Vec<f64>, Option<Move>, bool) {
    root_search(state, rules, config, tt, eval_cache, heuristic_hash, depth, settings, deadline, stats, f64::NEG_INFINITY, f64::INFINITY)
}

/// Shared root-search body for [`score_board_at_depth`] and its windowed
/// counterpart: `root_alpha`/`root_beta` seed the bound each root move is
/// searched under, narrowed to an aspiration window by the windowed
/// caller or left at `[-inf, inf]` by the unwindowed one.
#[allow(clippy::too_many_arguments)]
fn root_search(state: &GameState, rules: &dyn Rules, config: &Config, tt: &TT, eval_cache: Option<&EvalCache>, heuristic_hash: u64, depth: u32, settings: &SearchSettings, deadline: Instant, stats: &mut Stats, root_alpha: f64, root_beta: f64) -> (Vec<f64>, Option<Move>, bool) {
    let size = state.board.size();
    let mut scores = vec![ILLEGAL_SCORE; size * size];

    // A stored Exact entry at this position, already searched at least
    // this deep, makes the whole root search redundant: the move was
    // already chosen once, under the same heuristic fingerprint.
    if let Some(entry) = tt.probe(tt_key(state), heuristic_hash) {
        if entry.flag == Flag::Exact && i32::from(entry.depth) >= depth as i32 {
            if let Some(mov) = entry.best_move {
                scores[mov.y as usize * size + mov.x as usize] = f64::from(entry.score);
                return (scores, Some(mov), true);
            }
        }
    }

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

    let player = settings.player;
    let (root_moves, tactical) = select_candidates(state, rules, config, player, 0);
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
    let pv_move = tt.probe(tt_key(state), heuristic_hash).and_then(|e| e.best_move);
    let killer_boost = if config.ai_enable_killer_moves { config.ai_killer_boost } else { 0.0 };
    let history_boost = if config.ai_enable_history_moves { config.ai_history_boost } else { 0.0 };
    let ordered = move_picker::order_moves(&synthetic, pv_move, &ctx.killers, 0, &ctx.history, killer_boost, history_boost);

    let maximizing = player == Player::Black;
    let mut alpha = root_alpha;
    let mut beta = root_beta;
    let mut best_value = if maximizing { f64::NEG_INFINITY } else { f64::INFINITY };
    let mut best_move = None;
    let mut second_best_value = if maximizing { f64::NEG_INFINITY } else { f64::INFINITY };
    let mut second_best_move = None;
    let mut last_ghost_update = Instant::now() - std::time::Duration::from_millis(config.ai_ghost_throttle_ms);

    for scored in &ordered {
        if ctx.timed_out {
            break;
        }
        if let Some(cb) = settings.on_ghost_update {
            let now = Instant::now();
            if now.duration_since(last_ghost_update).as_millis() as u64 >= config.ai_ghost_throttle_ms {
                cb(scored.mov);
                last_ghost_update = now;
            }
        }
        let mut child = state.clone();
        apply_and_update_status(&mut child, rules, scored.mov, player);
        let value = minimax(&child, &mut ctx, depth.saturating_sub(1), 1, alpha, beta, stats);
        scores[scored.mov.y as usize * size + scored.mov.x as usize] = value;

        let improves_best = if maximizing { value > best_value } else { value < best_value };
        if improves_best {
            second_best_value = best_value;
            second_best_move = best_move;
            best_value = value;
            best_move = Some(scored.mov);
        } else {
            let improves_second = if maximizing { value > second_best_value } else { value < second_best_value };
            if improves_second {
                second_best_value = value;
                second_best_move = Some(scored.mov);
            }
        }

        if maximizing {
            alpha = alpha.max(best_value);
        } else {
            beta = beta.min(best_value);
        }
    }

    stats.max_depth_completed = stats.max_depth_completed.max(depth);

    let lost_mode_move = if config.ai_enable_lost_mode && depth >= config.ai_lost_mode_min_depth {
        lost_mode_choice(state, rules, config, &ordered, &scores, player, config.ai_lost_mode_threshold)
    } else {
        None
    };

    // A fully completed root search is cached under the position's own
    // key too, so a later call at the same or shallower depth (or a
    // backlog re-probe) can skip straight to this answer.
    if !ctx.timed_out && best_move.is_some() {
        tt.store(tt_key(state), heuristic_hash, depth as i16, round_to_i32(best_value), Flag::Exact, best_move, None);
    }

    (scores, lost_mode_move.or(best_move), !ctx.timed_out)
}

/// Root-only: among moves that all score as "losing", picks the one
/// maximizing the opponent's best-vs-second-best reply gap at depth 1,
/// rather than always returning the nominal best score.
fn lost_mode_choice(state: &GameState, rules: &dyn Rules, config: &Config, ordered: &[move_picker::ScoredMove], scores: &[f64], player: Player, threshold: f64) -> Option<Move> {
    let losing_sign = if player == Player::Black { -1.0 } else { 1.0 };
    let is_losing = |score: f64| losing_sign * score >= WIN_SCORE * threshold;

    let mut losing_moves: Vec<Move> = ordered.iter().map(|s| s.mov).filter(|m| is_losing(scores[m.y as usize * state.board.size() + m.x as usize])).take(config.ai_lost_mode_max_moves).collect();
    if losing_moves.len() < 2 {
        return None;
    }
    losing_moves.truncate(config.ai_lost_mode_max_moves);

    let mut best_gap = f64::NEG_INFINITY;
    let mut best_candidate = None;
    for &mov in &losing_moves {
        let mut child = state.clone();
        apply_and_update_status(&mut child, rules, mov, player);
        if child.status.is_terminal() {
            continue;
        }
        let opponent = player.opposite();
        let win_length = rules.win_length();
        let replies = candidates::generate_candidates(&child.board, opponent, win_length, child.last_move, false);
        let mut reply_scores: Vec<f64> = replies
            .iter()
            .take(config.ai_lost_mode_reply_limit)
            .map(|c| {
                let mut grandchild = child.clone();
                apply_and_update_status(&mut grandchild, rules, c.mov, opponent);
                eval::evaluate_with_to_move(&grandchild.board, &config.heuristics, win_length, grandchild.captured_black, grandchild.captured_white, grandchild.to_move)
            })
            .collect();
        reply_scores.sort_by(|a, b| {
            if opponent == Player::Black {
                b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal)
            } else {
                a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
            }
        });
        if reply_scores.len() < 2 {
            continue;
        }
        let gap = (reply_scores[0] - reply_scores[1]).abs();
        if gap > best_gap {
            best_gap = gap;
            best_candidate = Some(mov);
        }
    }
    best_candidate
}

/// Iteratively-deepened search entry point. `tt`/`eval_cache` are the
/// shared, cross-search caches; `heuristic_hash` is the fingerprint of the
/// `Heuristics` currently in effect.
pub fn score_board(state: &GameState, rules: &dyn Rules, config: &Config, tt: &TT, eval_cache: Option<&EvalCache>, heuristic_hash: u64, settings: &SearchSettings, stats: &mut Stats) -> SearchResult {
    let size = state.board.size();
    tt.next_generation();

    let win_length = rules.win_length();
    let initial_has_urgent = candidates::has_urgent_threat(&state.board, settings.player, win_length);
    let initial_candidates = candidates::generate_candidates(&state.board, settings.player, win_length, state.last_move, initial_has_urgent);
    if initial_candidates.is_empty() {
        let mut scores = vec![ILLEGAL_SCORE; size * size];
        scores[size / 2 * size + size / 2] = 0.0;
        return SearchResult { scores, best_move: Some(Move::new((size / 2) as u8, (size / 2) as u8)), completed_depth: 0, status: CompletionStatus::NoLegalMoves };
    }

    if settings.ai_quick_win_exit_applies(rules, &state.board, settings.player) {
        let wins = immediate_wins(&state.board, rules, settings.player);
        let mut scores = vec![ILLEGAL_SCORE; size * size];
        let signed_win = if settings.player == Player::Black { WIN_SCORE } else { -WIN_SCORE };
        for w in &wins {
            scores[w.y as usize * size + w.x as usize] = signed_win;
        }
        return SearchResult { scores, best_move: wins.first().copied(), completed_depth: 0, status: CompletionStatus::Completed };
    }

    let deadline = Instant::now() + std::time::Duration::from_millis(settings.timeout_ms.min(settings.time_budget_ms));

    let (lo_depth, hi_depth) = if settings.direct_depth_only { (settings.depth, settings.depth) } else { (settings.min_depth, settings.depth) };

    let mut fallback: Option<(Vec<f64>, Option<Move>, u32)> = None;
    let mut last_partial: Option<(Vec<f64>, Option<Move>, u32)> = None;
    let mut last_best_score = 0.0;
    let mut window = config.ai_asp_window;

    for depth in lo_depth..=hi_depth {
        if Instant::now() >= deadline && fallback.is_some() {
            break;
        }
        let (scores, best_move, completed) = if config.ai_enable_aspiration && fallback.is_some() {
            let mut local_stats = Stats::new();
            let alpha = last_best_score - window;
            let beta = last_best_score + window;
            let (s, bm, c) = score_board_at_depth_windowed(state, rules, config, tt, eval_cache, heuristic_hash, depth, settings, deadline, &mut local_stats, alpha, beta);
            stats.merge(&local_stats);
            if let Some(bm) = bm {
                let v = s[bm.y as usize * size + bm.x as usize];
                if v <= alpha || v >= beta {
                    window = (window * 2.0).min(config.ai_asp_window_max);
                    score_board_at_depth(state, rules, config, tt, eval_cache, heuristic_hash, depth, settings, deadline, stats)
                } else {
                    (s, bm, c)
                }
            } else {
                (s, bm, c)
            }
        } else {
            score_board_at_depth(state, rules, config, tt, eval_cache, heuristic_hash, depth, settings, deadline, stats)
        };

        if let Some(bm) = best_move {
            last_best_score = scores[bm.y as usize * size + bm.x as usize];
            if let Some(cb) = settings.on_search_progress {
                cb(depth, last_best_score);
            }
        }

        if completed {
            fallback = Some((scores, best_move, depth));
        } else {
            last_partial = Some((scores, best_move, depth));
            break;
        }
    }

    match fallback {
        Some((scores, best_move, depth)) => SearchResult { scores, best_move, completed_depth: depth, status: CompletionStatus::Completed },
        None => {
            // No depth finished. `ai_return_last_complete` (the strict
            // default) insists on a fully completed iteration or the bare
            // center-move fallback; clearing it allows the last
            // (incomplete) iteration's partial scores and best move so far
            // to be returned instead.
            if !config.ai_return_last_complete {
                if let Some((scores, Some(best_move), depth)) = last_partial {
                    return SearchResult { scores, best_move: Some(best_move), completed_depth: depth, status: CompletionStatus::TimedOut };
                }
            }
            let mut scores = vec![ILLEGAL_SCORE; size * size];
            scores[size / 2 * size + size / 2] = 0.0;
            SearchResult { scores, best_move: Some(Move::new((size / 2) as u8, (size / 2) as u8)), completed_depth: 0, status: CompletionStatus::TimedOut }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn score_board_at_depth_windowed(state: &GameState, rules: &dyn Rules, config: &Config, tt: &TT, eval_cache: Option<&EvalCache>, heuristic_hash: u64, depth: u32, settings: &SearchSettings, deadline: Instant, stats: &mut Stats, alpha: f64, beta: f64) -> (Vec<f64>, Option<Move>, bool) {
    // The aspiration window narrows the *root* bound only; child nodes
    // still search their own local [-inf, inf] unless a TT hit narrows
    // them. A move whose true value falls outside [alpha, beta] returns a
    // fail-low/fail-high bound rather than its exact score, which is what
    // lets the caller detect the miss and re-search with a wider window.
    root_search(state, rules, config, tt, eval_cache, heuristic_hash, depth, settings, deadline, stats, alpha, beta)
}

impl SearchSettings<'_> {
    fn ai_quick_win_exit_applies(&self, rules: &dyn Rules, board: &Board, player: Player) -> bool {
        !immediate_wins(board, rules, player).is_empty()
    }
}

pub struct Driver {
    pub tt: Arc<TT>,
    pub eval_cache: Option<Arc<EvalCache>>,
}

impl Driver {
    #[must_use]
    pub fn new(tt: Arc<TT>, eval_cache: Option<Arc<EvalCache>>) -> Self {
        Self { tt, eval_cache }
    }

    pub fn score_board(&self, state: &GameState, rules: &dyn Rules, config: &Config, settings: &SearchSettings, stats: &mut Stats) -> SearchResult {
        let heuristic_hash = config.heuristics.fingerprint();
        score_board(state, rules, config, &self.tt, self.eval_cache.as_deref(), heuristic_hash, settings, stats)
    }

    pub fn flush_caches(&self) {
        self.tt.clear();
        if let Some(cache) = &self.eval_cache {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::GameStateBuilder;
    use crate::rules::SimpleFiveInARowRules;

    fn no_stop() -> bool {
        false
    }

    #[test]
    fn empty_board_returns_only_center() {
        let state = GameStateBuilder::new(7).build().unwrap();
        let rules = SimpleFiveInARowRules::default();
        let config = Config::default();
        let tt = TT::new(1024, 4);
        let stop = || false;
        let mut settings = SearchSettings::new(Player::Black, &stop);
        settings.depth = 1;
        settings.min_depth = 1;
        let mut stats = Stats::new();
        let result = score_board(&state, &rules, &config, &tt, None, config.heuristics.fingerprint(), &settings, &mut stats);
        let size = 7;
        let center = size / 2;
        for y in 0..size {
            for x in 0..size {
                let v = result.scores[y * size + x];
                if x == center && y == center {
                    assert_ne!(v, ILLEGAL_SCORE);
                } else {
                    assert_eq!(v, ILLEGAL_SCORE);
                }
            }
        }
    }

    #[test]
    fn immediate_win_exit_marks_only_the_winning_cell() {
        let mut state = GameStateBuilder::new(7).build().unwrap();
        for x in [2u8, 3, 4, 5] {
            state.apply_move(Move::new(x, 1), Player::Black, &[]);
        }
        state.to_move = Player::Black;
        let rules = SimpleFiveInARowRules::default();
        let mut config = Config::default();
        config.ai_quick_win_exit = true;
        let tt = TT::new(1024, 4);
        let stop = || false;
        let mut settings = SearchSettings::new(Player::Black, &stop);
        settings.depth = 5;
        let mut stats = Stats::new();
        let result = score_board(&state, &rules, &config, &tt, None, config.heuristics.fingerprint(), &settings, &mut stats);
        assert_eq!(result.best_move, Some(Move::new(6, 1)));
        assert_eq!(stats.nodes, 0);
    }

    #[test]
    fn must_block_returns_a_blocking_move() {
        let mut state = GameStateBuilder::new(7).build().unwrap();
        for x in [1u8, 2, 3, 4] {
            state.apply_move(Move::new(x, 3), Player::White, &[]);
        }
        state.apply_move(Move::new(0, 0), Player::Black, &[]);
        state.to_move = Player::Black;
        let rules = SimpleFiveInARowRules::default();
        let config = Config::default();
        let tt = TT::new(1024, 4);
        let stop = || false;
        let mut settings = SearchSettings::new(Player::Black, &stop);
        settings.depth = 3;
        settings.min_depth = 3;
        let mut stats = Stats::new();
        let result = score_board(&state, &rules, &config, &tt, None, config.heuristics.fingerprint(), &settings, &mut stats);
        let best = result.best_move.expect("must have a move");
        assert!(best == Move::new(0, 3) || best == Move::new(5, 3));
    }

    #[test]
    fn calling_twice_on_the_same_state_is_deterministic() {
        let state = GameStateBuilder::new(7).build().unwrap();
        let rules = SimpleFiveInARowRules::default();
        let config = Config::default();
        let tt = TT::new(1024, 4);
        let stop = || false;
        let mut settings = SearchSettings::new(Player::Black, &stop);
        settings.depth = 1;
        settings.min_depth = 1;
        let mut stats_a = Stats::new();
        let mut stats_b = Stats::new();
        let a = score_board(&state, &rules, &config, &tt, None, config.heuristics.fingerprint(), &settings, &mut stats_a);
        let b = score_board(&state, &rules, &config, &tt, None, config.heuristics.fingerprint(), &settings, &mut stats_b);
        assert_eq!(a.scores, b.scores);
    }

    #[test]
    fn unused_no_stop_helper_compiles() {
        assert!(!no_stop());
    }
}
