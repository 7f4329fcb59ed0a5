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

//! Background pondering and move suggestion. The ponder thread searches
//! the opponent's most likely reply while it's not our turn, writing
//! results only into the shared TT; the suggestion helper runs a depth
//! capped, progress-streaming search for UI callers. Grounded in the
//! version-counter snapshot-polling idiom of
//! `motors/src/search/multithreading.rs`'s `AtomicSearchState` (there:
//! `should_stop`/depth/score atomics polled from the search loop; here: a
//! monotone version counter standing in for "the position changed").

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_utils::sync::{Parker, Unparker};

use crate::board::{GameState, Move};
use crate::config::SharedConfig;
use crate::rules::Rules;
use crate::search::driver::{self, CompletionStatus, Driver, SearchResult, SearchSettings};
use crate::search::statistics::Stats;
use crate::search::tt::Flag;

/// A deepest depth a suggestion search will reach; results beyond this are
/// someone else's job (the interactive `score_board` path).
pub const SUGGESTION_DEPTH_CAP: u32 = 10;

struct PonderJob {
    state: GameState,
    rules: Arc<dyn Rules>,
}

/// Background pondering thread. `update` publishes a new `(state, rules)`
/// snapshot; the worker picks it up, searches it with
/// `ShouldStop = stop OR version-changed`, and only ever touches the
/// shared TT, never returning a move of its own.
pub struct Ponder {
    job_slot: Arc<Mutex<Option<PonderJob>>>,
    unparker: Unparker,
    version: Arc<AtomicU64>,
    pondered_hash: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ponder {
    #[must_use]
    pub fn spawn(driver: Arc<Driver>, config: SharedConfig) -> Self {
        let job_slot: Arc<Mutex<Option<PonderJob>>> = Arc::new(Mutex::new(None));
        let parker = Parker::new();
        let unparker = parker.unparker().clone();
        let version = Arc::new(AtomicU64::new(0));
        let pondered_hash = Arc::new(AtomicU64::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let job_slot = Arc::clone(&job_slot);
            let version = Arc::clone(&version);
            let pondered_hash = Arc::clone(&pondered_hash);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("ponder".into())
                .spawn(move || ponder_loop(job_slot, parker, version, pondered_hash, stop, driver, config))
                .expect("failed to spawn ponder thread")
        };

        Self { job_slot, unparker, version, pondered_hash, stop, handle: Some(handle) }
    }

    /// Publishes a new position to ponder on, superseding whatever the
    /// worker was mid-search on (its `ShouldStop` will see the version bump
    /// and unwind on its next node-count check).
    pub fn update(&self, state: GameState, rules: Arc<dyn Rules>) {
        self.version.fetch_add(1, Ordering::AcqRel);
        let mut slot = self.job_slot.lock().unwrap();
        *slot = Some(PonderJob { state, rules });
        drop(slot);
        self.unparker.unpark();
    }

    /// If the caller's current state is exactly the position the ponder
    /// thread most recently started searching, the TT may already hold an
    /// exact answer worth consuming without a fresh search.
    #[must_use]
    pub fn pondered_hash(&self) -> u64 {
        self.pondered_hash.load(Ordering::Acquire)
    }

    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        self.unparker.unpark();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn ponder_loop(job_slot: Arc<Mutex<Option<PonderJob>>>, parker: Parker, version: Arc<AtomicU64>, pondered_hash: Arc<AtomicU64>, stop: Arc<AtomicBool>, driver: Arc<Driver>, config: SharedConfig) {
    loop {
        let job = loop {
            if stop.load(Ordering::Acquire) {
                return;
            }
            if let Some(job) = job_slot.lock().unwrap().take() {
                break job;
            }
            parker.park();
        };

        let my_version = version.load(Ordering::Acquire);
        pondered_hash.store(job.state.hash(), Ordering::Release);

        let stop_for_closure = Arc::clone(&stop);
        let version_for_closure = Arc::clone(&version);
        let should_stop = move || stop_for_closure.load(Ordering::Acquire) || version_for_closure.load(Ordering::Acquire) != my_version;

        let cfg = config.get();
        let mut settings = SearchSettings::new(job.state.to_move, &should_stop);
        settings.depth = cfg.ai_max_depth;
        settings.min_depth = cfg.ai_min_depth;
        let mut stats = Stats::new();
        // Results land in the TT as a side effect of the search itself; the
        // returned SearchResult is discarded on purpose.
        let _ = driver.score_board(&job.state, job.rules.as_ref(), &cfg, &settings, &mut stats);
    }
}

/// Runs a capped-depth, depth-streaming search for an external caller
/// (e.g. a "suggest a move" UI button) rather than the engine's own
/// turn. Short-circuits immediately if the TT already holds an exact
/// result at or beyond [`SUGGESTION_DEPTH_CAP`].
pub fn suggest_move(driver: &Driver, state: &GameState, rules: &dyn Rules, config: &crate::config::Config, should_stop: &(dyn Fn() -> bool + Sync), mut on_depth_complete: impl FnMut(u32, f64, Option<Move>)) -> SearchResult {
    let heuristic_hash = config.heuristics.fingerprint();
    let key = driver::tt_key(state);
    let size = state.board.size();

    if let Some(entry) = driver.tt.probe(key, heuristic_hash) {
        if entry.flag == Flag::Exact && i32::from(entry.depth) >= SUGGESTION_DEPTH_CAP as i32 {
            let score = f64::from(entry.score);
            on_depth_complete(SUGGESTION_DEPTH_CAP, score, entry.best_move);
            let mut scores = vec![crate::score::ILLEGAL_SCORE; size * size];
            if let Some(mov) = entry.best_move {
                scores[mov.y as usize * size + mov.x as usize] = score;
            }
            return SearchResult { scores, best_move: entry.best_move, completed_depth: SUGGESTION_DEPTH_CAP, status: CompletionStatus::Completed };
        }
    }

    driver.tt.next_generation();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(3600);
    let settings = SearchSettings::new(state.to_move, should_stop);
    let mut stats = Stats::new();
    let mut last: Option<(Vec<f64>, Option<Move>, u32)> = None;
    for depth in 1..=SUGGESTION_DEPTH_CAP {
        if should_stop() {
            break;
        }
        let (scores, best_move, completed) = driver::score_board_at_depth(state, rules, config, &driver.tt, driver.eval_cache.as_deref(), heuristic_hash, depth, &settings, deadline, &mut stats);
        if !completed {
            break;
        }
        if let Some(mov) = best_move {
            let score = scores[mov.y as usize * size + mov.x as usize];
            on_depth_complete(depth, score, Some(mov));
        }
        last = Some((scores, best_move, depth));
    }

    match last {
        Some((scores, best_move, depth)) => SearchResult { scores, best_move, completed_depth: depth, status: CompletionStatus::Completed },
        None => {
            let mut scores = vec![crate::score::ILLEGAL_SCORE; size * size];
            let center = size / 2;
            scores[center * size + center] = 0.0;
            SearchResult { scores, best_move: Some(Move::new(center as u8, center as u8)), completed_depth: 0, status: CompletionStatus::TimedOut }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{GameStateBuilder, Player};
    use crate::config::{Config, SharedConfig};
    use crate::rules::SimpleFiveInARowRules;
    use crate::search::eval_cache::EvalCache;
    use crate::search::tt::TT;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn ponder_update_changes_the_pondered_hash_eventually() {
        let tt = Arc::new(TT::new(1024, 4));
        let eval_cache = Some(Arc::new(EvalCache::new(256)));
        let driver = Arc::new(Driver::new(tt, eval_cache));
        let config = SharedConfig::new(Config::default());
        let ponder = Ponder::spawn(driver, config);

        let state = GameStateBuilder::new(9).build().unwrap();
        let rules: Arc<dyn Rules> = Arc::new(SimpleFiveInARowRules::default());
        ponder.update(state.clone(), rules);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ponder.pondered_hash() != state.hash() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(ponder.pondered_hash(), state.hash());
        ponder.shutdown();
    }

    #[test]
    fn suggest_move_returns_a_move_on_an_empty_board() {
        let tt = Arc::new(TT::new(1024, 4));
        let driver = Driver::new(tt, None);
        let state = GameStateBuilder::new(9).build().unwrap();
        let rules = SimpleFiveInARowRules::default();
        let config = Config::default();
        let stop = || false;
        let result = suggest_move(&driver, &state, &rules, &config, &stop, |_, _, _| {});
        assert!(result.best_move.is_some());
    }

    #[test]
    fn suggestion_player_is_the_state_side_to_move() {
        let mut state = GameStateBuilder::new(9).build().unwrap();
        state.to_move = Player::White;
        let tt = Arc::new(TT::new(1024, 4));
        let driver = Driver::new(tt, None);
        let rules = SimpleFiveInARowRules::default();
        let config = Config::default();
        let stop = || false;
        let result = suggest_move(&driver, &state, &rules, &config, &stop, |_, _, _| {});
        assert!(result.best_move.is_some());
    }
}
