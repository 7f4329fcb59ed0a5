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

//! A Gomoku/Ninuki-style search engine core: board representation with
//! dihedral-symmetry Zobrist hashing, a pluggable rules adapter, threat
//! evaluation, candidate-move generation, a generation-aged transposition
//! table, iterative-deepening alpha-beta search with a root-only "lost
//! mode" fallback, root-parallel (YBWC) search, an off-game analysis
//! backlog, and background pondering.
//!
//! [`Engine`] is the facade external callers use; the individual modules
//! are public so a caller can also wire the pieces together by hand.

pub mod backlog;
pub mod board;
pub mod candidates;
pub mod config;
pub mod error;
pub mod eval;
pub mod logging;
pub mod ponder;
pub mod rules;
pub mod score;
pub mod search;
pub mod zobrist;

use std::sync::Arc;

use backlog::{BacklogPool, BacklogQueue, BacklogTask};
use board::{GameState, Move};
use config::{Config, SharedConfig};
use ponder::Ponder;
use rules::Rules;
use search::driver::{Driver, SearchResult, SearchSettings};
use search::eval_cache::EvalCache;
use search::statistics::Stats;
use search::tt::TT;

/// Top-level facade wiring the TT, eval cache, search driver, backlog
/// queue, and ponder thread together: one TT and eval cache, touched by
/// the interactive search, the backlog workers, and the ponder thread
/// alike, behind one [`SharedConfig`].
pub struct Engine {
    driver: Arc<Driver>,
    config: SharedConfig,
    backlog: Arc<BacklogQueue>,
    backlog_pool: Option<BacklogPool>,
    ponder: Option<Ponder>,
}

impl Engine {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let tt = Arc::new(TT::new(config.tt_size_pow2(), config.ai_tt_buckets));
        let eval_cache = if config.ai_eval_cache_size > 0 { Some(Arc::new(EvalCache::new(config.ai_eval_cache_size))) } else { None };
        let driver = Arc::new(Driver::new(tt, eval_cache));
        let backlog = Arc::new(BacklogQueue::new());
        let shared_config = SharedConfig::new(config);
        Self { driver, config: shared_config, backlog, backlog_pool: None, ponder: None }
    }

    #[must_use]
    pub fn config(&self) -> Config {
        self.config.get()
    }

    pub fn replace_config(&self, config: Config) -> error::Res<Config> {
        let previous = self.config.replace(config)?;
        self.flush_global_caches();
        Ok(previous)
    }

    /// Iteratively-deepened search. The returned [`SearchResult`]'s
    /// `scores` is `size*size`, row-major, Black-positive, with illegal
    /// cells holding [`score::ILLEGAL_SCORE`].
    pub fn score_board(&self, state: &GameState, rules: &dyn Rules, settings: &SearchSettings, stats: &mut Stats) -> SearchResult {
        let config = self.config.get();
        self.driver.score_board(state, rules, &config, settings, stats)
    }

    /// Fixed-depth root-parallel search. Returns the score array
    /// plus whether the search completed before `settings.should_stop`
    /// fired or the deadline passed.
    pub fn score_board_direct_depth_parallel(&self, state: &GameState, rules: &dyn Rules, settings: &SearchSettings, workers: usize, stats: &mut Stats) -> (Vec<f64>, Option<Move>, bool) {
        let config = self.config.get();
        let heuristic_hash = config.heuristics.fingerprint();
        let deadline = std::time::Instant::now() + std::time::Duration::from_millis(settings.timeout_ms.min(settings.time_budget_ms));
        search::parallel::score_board_direct_depth_parallel(state, rules, &config, &self.driver.tt, self.driver.eval_cache.as_deref(), heuristic_hash, settings.depth, settings, deadline, stats, workers)
    }

    /// Zeroes the TT and eval cache. A config update flushes both
    /// atomically; this is also reachable standalone.
    pub fn flush_global_caches(&self) {
        self.driver.flush_caches();
    }

    /// Writes the TT to `ai_tt_persistence_path`. A no-op (returning `Ok`)
    /// if `ai_enable_tt_persistence` is off or no path is configured.
    pub fn persist_tt(&self) -> error::Res<()> {
        let config = self.config.get();
        if !config.ai_enable_tt_persistence {
            return Ok(());
        }
        let Some(path) = config.ai_tt_persistence_path.as_ref() else {
            return Ok(());
        };
        let blob = self.driver.tt.persist();
        std::fs::write(path, blob).map_err(|e| error::EngineError::PersistenceIo(e.to_string()))?;
        Ok(())
    }

    /// Loads the TT from `ai_tt_persistence_path`, if it exists. A no-op
    /// if `ai_enable_tt_persistence` is off, no path is configured, or the
    /// file doesn't exist yet.
    pub fn load_tt(&self) -> error::Res<()> {
        let config = self.config.get();
        if !config.ai_enable_tt_persistence {
            return Ok(());
        }
        let Some(path) = config.ai_tt_persistence_path.as_ref() else {
            return Ok(());
        };
        let blob = match std::fs::read(path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(error::EngineError::PersistenceIo(e.to_string()).into()),
        };
        self.driver.tt.load(&blob)
    }

    #[must_use]
    pub fn transposition_size(&self) -> usize {
        self.driver.tt.count()
    }

    /// Non-blocking enqueue onto the off-game backlog; returns `false` if
    /// the position's `CanonHash` was already queued or in progress.
    pub fn enqueue_search_backlog_task(&self, state: GameState, rules: Arc<dyn Rules>) -> bool {
        let config = self.config.get();
        let target_depth = config.ai_depth.min(config.ai_max_depth);
        self.backlog.enqueue(BacklogTask::new(state, rules, target_depth))
    }

    #[must_use]
    pub fn top_analytics_queue(&self, limit: usize) -> Vec<u64> {
        self.backlog.top_analytics_queue(limit)
    }

    #[must_use]
    pub fn total_analytics_queue(&self) -> usize {
        self.backlog.total_analytics_queue()
    }

    /// Pauses the backlog workers: called when a live game starts.
    pub fn request_stop(&self) {
        self.backlog.request_stop();
    }

    /// Resumes the backlog workers: called when a live game ends.
    pub fn reset_stop(&self) {
        self.backlog.reset_stop();
    }

    /// Spawns the fixed backlog worker pool, sized from
    /// `ai_queue_workers`. A no-op if the pool is already running or the
    /// backlog is disabled in config.
    pub fn start_backlog_workers(&mut self) {
        if self.backlog_pool.is_some() {
            return;
        }
        let config = self.config.get();
        if !config.ai_queue_enabled {
            return;
        }
        self.backlog_pool = Some(BacklogPool::spawn(Arc::clone(&self.backlog), Arc::clone(&self.driver), self.config.clone(), config.ai_queue_workers));
    }

    pub fn stop_backlog_workers(&mut self) {
        if let Some(pool) = self.backlog_pool.take() {
            pool.shutdown();
        }
    }

    /// Starts the background ponder thread. A no-op if already running.
    pub fn start_pondering(&mut self) {
        if self.ponder.is_some() {
            return;
        }
        self.ponder = Some(Ponder::spawn(Arc::clone(&self.driver), self.config.clone()));
    }

    /// Publishes a new position for the ponder thread to deepen. No-op if
    /// pondering hasn't been started.
    pub fn update_ponder(&self, state: GameState, rules: Arc<dyn Rules>) {
        if let Some(ponder) = &self.ponder {
            ponder.update(state, rules);
        }
    }

    pub fn stop_pondering(&mut self) {
        if let Some(ponder) = self.ponder.take() {
            ponder.shutdown();
        }
    }

    /// A depth-capped, depth-streaming search for a "suggest a move" UI
    /// affordance, short-circuiting on an already-exact TT entry.
    pub fn suggest_move(&self, state: &GameState, rules: &dyn Rules, should_stop: &(dyn Fn() -> bool + Sync), on_depth_complete: impl FnMut(u32, f64, Option<Move>)) -> SearchResult {
        let config = self.config.get();
        ponder::suggest_move(&self.driver, state, rules, &config, should_stop, on_depth_complete)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop_backlog_workers();
        self.stop_pondering();
    }
}
