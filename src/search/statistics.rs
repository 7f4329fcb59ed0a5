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

//! Mutable stats sink threaded through a search, one per worker thread,
//! merged into the caller's totals after a root-parallel split.

#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub nodes: u64,
    pub tt_hits: u64,
    pub tt_misses: u64,
    pub tt_stores: u64,
    pub beta_cutoffs: u64,
    pub cutoff_after_first_child: u64,
    pub lmr_reductions: u64,
    pub lmr_re_searches: u64,
    pub eval_cache_hits: u64,
    pub eval_cache_misses: u64,
    pub max_depth_completed: u32,
    pub max_seldepth: u32,
}

impl Stats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: &Stats) {
        self.nodes += other.nodes;
        self.tt_hits += other.tt_hits;
        self.tt_misses += other.tt_misses;
        self.tt_stores += other.tt_stores;
        self.beta_cutoffs += other.beta_cutoffs;
        self.cutoff_after_first_child += other.cutoff_after_first_child;
        self.lmr_reductions += other.lmr_reductions;
        self.lmr_re_searches += other.lmr_re_searches;
        self.eval_cache_hits += other.eval_cache_hits;
        self.eval_cache_misses += other.eval_cache_misses;
        self.max_depth_completed = self.max_depth_completed.max(other.max_depth_completed);
        self.max_seldepth = self.max_seldepth.max(other.max_seldepth);
    }

    #[must_use]
    pub fn tt_hit_rate(&self) -> f64 {
        let total = self.tt_hits + self.tt_misses;
        if total == 0 {
            0.0
        } else {
            self.tt_hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_counters_and_maxes_depths() {
        let mut a = Stats { nodes: 10, max_depth_completed: 4, ..Stats::default() };
        let b = Stats { nodes: 5, max_depth_completed: 6, ..Stats::default() };
        a.merge(&b);
        assert_eq!(a.nodes, 15);
        assert_eq!(a.max_depth_completed, 6);
    }

    #[test]
    fn hit_rate_is_zero_with_no_probes() {
        assert_eq!(Stats::new().tt_hit_rate(), 0.0);
    }
}
