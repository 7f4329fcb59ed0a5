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

//! The engine's single configuration record and the heuristic weight bundle
//! the evaluator reads. No UGI protocol sits on top of this the way
//! `gears::ugi::EngineOptionType` drives engine options elsewhere; this is
//! just the plain struct plus a `RwLock` handle for concurrent readers.

use std::sync::{Arc, RwLock};

use crate::error::{EngineError, Res};

/// Evaluator weights, tunable independently of search settings. Changing
/// any field changes [`Heuristics::fingerprint`], which the TT uses to
/// invalidate stale entries via its heuristic-weights hash.
#[derive(Debug, Clone, PartialEq)]
pub struct Heuristics {
    pub open4: f64,
    pub closed4: f64,
    pub broken4: f64,
    pub open3: f64,
    pub broken3: f64,
    pub closed3: f64,
    pub open2: f64,
    pub broken2: f64,
    pub fork_open3: f64,
    pub fork_four_plus: f64,
    pub capture_pair: f64,
    pub capture_threat: f64,
}

impl Default for Heuristics {
    fn default() -> Self {
        Self {
            open4: 100_000.0,
            closed4: 8_000.0,
            broken4: 7_500.0,
            open3: 2_000.0,
            broken3: 600.0,
            closed3: 250.0,
            open2: 80.0,
            broken2: 30.0,
            fork_open3: 5_000.0,
            fork_four_plus: 50_000.0,
            capture_pair: 150.0,
            capture_threat: 400.0,
        }
    }
}

impl Heuristics {
    /// A 64-bit fingerprint mixed into every TT key (see [`crate::search::tt`]).
    /// Built the same way the eval cache's key is: bit-cast every field and
    /// fold it through a SplitMix64 avalanche.
    pub fn fingerprint(&self) -> u64 {
        let fields = [
            self.open4,
            self.closed4,
            self.broken4,
            self.open3,
            self.broken3,
            self.closed3,
            self.open2,
            self.broken2,
            self.fork_open3,
            self.fork_four_plus,
            self.capture_pair,
            self.capture_threat,
        ];
        let mut h = 0x9E3779B97F4A7C15u64;
        for (i, v) in fields.iter().enumerate() {
            h ^= v.to_bits().rotate_left((i as u32) * 7 + 1);
            h = splitmix64(h);
        }
        h
    }
}

/// Single avalanche step of the SplitMix64 generator, used wherever this
/// crate needs to mix an arbitrary u64 into another (TT keys, eval cache
/// keys, heuristic fingerprints).
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Search bounds
    pub ai_depth: u32,
    pub ai_min_depth: u32,
    pub ai_max_depth: u32,
    pub ai_timeout_ms: u64,
    pub ai_time_budget_ms: u64,
    pub ai_return_last_complete: bool,

    // Branching
    pub ai_top_candidates: usize,
    pub ai_enable_dynamic_top_k: bool,
    pub ai_enable_hard_ply_caps: bool,
    pub ai_max_candidates_root: usize,
    pub ai_max_candidates_mid: usize,
    pub ai_max_candidates_deep: usize,
    pub ai_max_candidates_ply7: usize,
    pub ai_max_candidates_ply8: usize,
    pub ai_max_candidates_ply9: usize,

    // Tactical
    pub ai_enable_tactical_k: bool,
    pub ai_k_quiet_root: usize,
    pub ai_k_quiet_mid: usize,
    pub ai_k_quiet_deep: usize,
    pub ai_k_tact_root: usize,
    pub ai_k_tact_mid: usize,
    pub ai_k_tact_deep: usize,
    pub ai_enable_tactical_mode: bool,
    pub ai_enable_tactical_ext: bool,
    pub ai_tactical_ext_depth: u32,

    // Shortcuts
    pub ai_quick_win_exit: bool,
    pub ai_use_scan_win_in1: bool,
    pub ai_enable_aspiration: bool,
    pub ai_asp_window: f64,
    pub ai_asp_window_max: f64,

    // TT
    pub ai_tt_size: usize,
    pub ai_tt_buckets: usize,
    pub ai_tt_use_set_assoc: bool,
    pub ai_use_tt_cache: bool,
    pub ai_tt_max_memory_bytes: usize,
    pub ai_enable_tt_persistence: bool,
    pub ai_tt_persistence_path: Option<String>,
    pub ai_enable_root_transpose: bool,
    pub ai_root_transpose_size: usize,

    // Eval cache
    pub ai_enable_eval_cache: bool,
    pub ai_eval_cache_size: usize,
    pub ai_eval_cache_min_abs: f64,

    // Ordering
    pub ai_enable_killer_moves: bool,
    pub ai_enable_history_moves: bool,
    pub ai_killer_boost: f64,
    pub ai_history_boost: f64,

    // Lost mode
    pub ai_enable_lost_mode: bool,
    pub ai_lost_mode_threshold: f64,
    pub ai_lost_mode_max_moves: usize,
    pub ai_lost_mode_reply_limit: usize,
    pub ai_lost_mode_min_depth: u32,

    // Backlog
    pub ai_queue_enabled: bool,
    pub ai_queue_workers: usize,
    pub ai_queue_analyze_threads: usize,
    pub ai_backlog_estimate_ms: u64,
    pub ai_minmax_cache_limit: usize,

    // Ponder
    pub ai_pondering_enabled: bool,
    pub ai_ghost_throttle_ms: u64,

    // Observability
    pub ai_log_search_stats: bool,
    pub log_depth_scores: bool,

    pub heuristics: Heuristics,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai_depth: 10,
            ai_min_depth: 6,
            ai_max_depth: 12,
            ai_timeout_ms: 5_000,
            ai_time_budget_ms: 4_500,
            ai_return_last_complete: true,

            ai_top_candidates: 24,
            ai_enable_dynamic_top_k: true,
            ai_enable_hard_ply_caps: true,
            ai_max_candidates_root: 24,
            ai_max_candidates_mid: 16,
            ai_max_candidates_deep: 10,
            ai_max_candidates_ply7: 16,
            ai_max_candidates_ply8: 12,
            ai_max_candidates_ply9: 8,

            ai_enable_tactical_k: true,
            ai_k_quiet_root: 16,
            ai_k_quiet_mid: 10,
            ai_k_quiet_deep: 6,
            ai_k_tact_root: 8,
            ai_k_tact_mid: 6,
            ai_k_tact_deep: 4,
            ai_enable_tactical_mode: true,
            ai_enable_tactical_ext: true,
            ai_tactical_ext_depth: 2,

            ai_quick_win_exit: true,
            ai_use_scan_win_in1: true,
            ai_enable_aspiration: true,
            ai_asp_window: 500.0,
            ai_asp_window_max: 50_000.0,

            ai_tt_size: 1 << 20,
            ai_tt_buckets: 4,
            ai_tt_use_set_assoc: true,
            ai_use_tt_cache: true,
            ai_tt_max_memory_bytes: 256 * 1024 * 1024,
            ai_enable_tt_persistence: false,
            ai_tt_persistence_path: None,
            ai_enable_root_transpose: false,
            ai_root_transpose_size: 1 << 14,

            ai_enable_eval_cache: true,
            ai_eval_cache_size: 1 << 18,
            ai_eval_cache_min_abs: 1.0,

            ai_enable_killer_moves: true,
            ai_enable_history_moves: true,
            ai_killer_boost: 10_000.0,
            ai_history_boost: 1.0,

            ai_enable_lost_mode: true,
            ai_lost_mode_threshold: 0.5,
            ai_lost_mode_max_moves: 6,
            ai_lost_mode_reply_limit: 6,
            ai_lost_mode_min_depth: 4,

            ai_queue_enabled: true,
            ai_queue_workers: 2,
            ai_queue_analyze_threads: 1,
            ai_backlog_estimate_ms: 2_000,
            ai_minmax_cache_limit: 1 << 16,

            ai_pondering_enabled: false,
            ai_ghost_throttle_ms: 250,

            ai_log_search_stats: false,
            log_depth_scores: false,

            heuristics: Heuristics::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Res<()> {
        if self.ai_min_depth == 0 {
            return Err(EngineError::InvalidSettings("ai_min_depth must be >= 1".into()).into());
        }
        if self.ai_min_depth > self.ai_max_depth {
            return Err(EngineError::InvalidSettings("ai_min_depth must be <= ai_max_depth".into()).into());
        }
        if self.ai_depth > self.ai_max_depth {
            return Err(EngineError::InvalidSettings("ai_depth must be <= ai_max_depth".into()).into());
        }
        if self.ai_tt_buckets != 2 && self.ai_tt_buckets != 4 {
            return Err(EngineError::InvalidSettings("ai_tt_buckets must be 2 or 4".into()).into());
        }
        if self.ai_tt_size == 0 {
            return Err(EngineError::InvalidSettings("ai_tt_size must be nonzero".into()).into());
        }
        if self.ai_queue_workers == 0 && self.ai_queue_enabled {
            return Err(EngineError::InvalidSettings("ai_queue_workers must be >= 1 when the backlog is enabled".into()).into());
        }
        Ok(())
    }

    /// Rounds `ai_tt_size` up to the next power of two.
    pub fn tt_size_pow2(&self) -> usize {
        self.ai_tt_size.next_power_of_two()
    }
}

/// A `Config` shared across the search driver, backlog workers, and ponder
/// threads. Updating it flushes the TT and eval cache atomically.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self { inner: Arc::new(RwLock::new(config)) }
    }

    pub fn get(&self) -> Config {
        self.inner.read().unwrap().clone()
    }

    pub fn heuristic_fingerprint(&self) -> u64 {
        self.inner.read().unwrap().heuristics.fingerprint()
    }

    /// Replaces the configuration wholesale, returning the previous value so
    /// callers can decide whether anything cache-relevant actually changed.
    pub fn replace(&self, config: Config) -> Res<Config> {
        config.validate()?;
        let mut guard = self.inner.write().unwrap();
        Ok(std::mem::replace(&mut *guard, config))
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn fingerprint_changes_with_weights() {
        let a = Heuristics::default();
        let mut b = a.clone();
        b.open4 += 1.0;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_stable_across_clones() {
        let a = Heuristics::default();
        let b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn invalid_depth_bounds_rejected() {
        let mut cfg = Config::default();
        cfg.ai_min_depth = 20;
        cfg.ai_max_depth = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tt_size_rounds_to_power_of_two() {
        let mut cfg = Config::default();
        cfg.ai_tt_size = 100;
        assert_eq!(cfg.tt_size_pow2(), 128);
    }
}
