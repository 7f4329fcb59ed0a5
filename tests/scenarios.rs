//! End-to-end scenarios spanning multiple modules: the TT Exact shortcut,
//! backlog deepening through a real worker pool, and the root-only lost
//! mode fallback. Single-module behavior (hash/symmetry invariants, TT
//! replacement rules, candidate locality, the evaluator's anti-symmetry)
//! is covered by each module's own `#[cfg(test)]` block instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gomoku_core::backlog::{BacklogPool, BacklogQueue, BacklogTask};
use gomoku_core::board::{GameStateBuilder, Move, Player};
use gomoku_core::config::{Config, SharedConfig};
use gomoku_core::rules::{Rules, SimpleFiveInARowRules};
use gomoku_core::score::{ILLEGAL_SCORE, WIN_SCORE};
use gomoku_core::search::driver::{self, CompletionStatus, Driver, SearchSettings};
use gomoku_core::search::statistics::Stats;
use gomoku_core::search::tt::{Flag, TT};

fn no_stop() -> bool {
    false
}

/// Precomputing and storing an Exact TT entry at the target depth means
/// the next `score_board` call at that depth returns it without
/// descending past the root.
#[test]
fn tt_exact_entry_short_circuits_the_search() {
    let state = GameStateBuilder::new(7).build().unwrap();
    let rules = SimpleFiveInARowRules::default();
    let config = Config::default();
    let tt = TT::new(1024, 4);
    let heuristic_hash = config.heuristics.fingerprint();

    let key = driver::tt_key(&state);
    let precomputed = Move::new(3, 3);
    tt.store(key, heuristic_hash, 10, 123, Flag::Exact, Some(precomputed), None);

    let stop = no_stop;
    let mut settings = SearchSettings::new(Player::Black, &stop);
    settings.depth = 10;
    settings.min_depth = 10;
    let mut stats = Stats::new();
    let result = driver::score_board(&state, &rules, &config, &tt, None, heuristic_hash, &settings, &mut stats);

    assert_eq!(result.completed_depth, 10);
    assert_eq!(result.best_move, Some(precomputed));
    assert_eq!(stats.nodes, 0);
}

/// A differing heuristic fingerprint makes the stored entry invisible,
/// forcing a real re-search.
#[test]
fn tt_entry_from_a_different_heuristic_hash_is_invisible() {
    let state = GameStateBuilder::new(7).build().unwrap();
    let rules = SimpleFiveInARowRules::default();
    let config = Config::default();
    let tt = TT::new(1024, 4);
    let stale_hash = config.heuristics.fingerprint() ^ 0xDEAD_BEEF;

    let key = driver::tt_key(&state);
    tt.store(key, stale_hash, 10, 123, Flag::Exact, Some(Move::new(3, 3)), None);

    let stop = no_stop;
    let mut settings = SearchSettings::new(Player::Black, &stop);
    settings.depth = 2;
    settings.min_depth = 2;
    let mut stats = Stats::new();
    let result = driver::score_board(&state, &rules, &config, &tt, None, config.heuristics.fingerprint(), &settings, &mut stats);

    assert_eq!(result.status, CompletionStatus::Completed);
    assert!(stats.nodes > 0, "a stale-hash entry must not short-circuit the search");
}

/// An enqueued opening state, once drained by a real worker pool, leaves
/// an Exact TT entry for its canonical hash at the target depth.
#[test]
fn backlog_worker_pool_deepens_a_queued_position_into_the_tt() {
    let tt = Arc::new(TT::new(1 << 14, 4));
    let driver = Arc::new(Driver::new(tt, None));
    let mut config = Config::default();
    // The backlog worker never starts shallower than depth 6 regardless of
    // `ai_min_depth` (see `process_task`), so the target depth must clear
    // that floor for the task to actually run instead of being dropped.
    config.ai_depth = 6;
    config.ai_min_depth = 6;
    config.ai_max_depth = 6;
    let shared_config = SharedConfig::new(config);

    let queue = Arc::new(BacklogQueue::new());
    let state = GameStateBuilder::new(7).build().unwrap();
    let probe_key = driver::tt_key(&state);
    let rules: Arc<dyn Rules> = Arc::new(SimpleFiveInARowRules::default());
    queue.enqueue(BacklogTask::new(state, rules, 6));

    let pool = BacklogPool::spawn(Arc::clone(&queue), Arc::clone(&driver), shared_config.clone(), 2);

    let deadline = Instant::now() + Duration::from_secs(10);
    while queue.total_analytics_queue() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    pool.shutdown();

    assert_eq!(queue.total_analytics_queue(), 0, "the task must be fully drained, not stuck mid-depth");

    let heuristic_hash = shared_config.get().heuristics.fingerprint();
    let entry = driver.tt.probe(probe_key, heuristic_hash);
    let entry = entry.expect("the backlog must have left an entry for the starting position");
    assert_eq!(entry.flag, Flag::Exact);
    assert!(i32::from(entry.depth) >= 6);
}

/// With lost mode disabled, `score_board` always returns the
/// argmax-scoring move (Black-positive convention). This is the baseline
/// the fragility tie-break is only ever allowed to override, never
/// contradict in direction.
#[test]
fn without_lost_mode_the_best_move_is_the_top_scoring_cell() {
    let mut state = GameStateBuilder::new(7).build().unwrap();
    for x in [2u8, 3, 4, 5] {
        state.apply_move(Move::new(x, 3), Player::White, &[]);
    }
    assert_eq!(state.to_move, Player::Black);
    let rules = SimpleFiveInARowRules::default();
    let mut config = Config::default();
    config.ai_enable_lost_mode = false;
    let tt = TT::new(1024, 4);
    let stop = no_stop;
    let mut settings = SearchSettings::new(Player::Black, &stop);
    settings.depth = 4;
    settings.min_depth = 4;
    let mut stats = Stats::new();
    let result = driver::score_board(&state, &rules, &config, &tt, None, config.heuristics.fingerprint(), &settings, &mut stats);

    let best = result.best_move.expect("a losing position still has a best move");
    let size = 7;
    let best_score = result.scores[best.y as usize * size + best.x as usize];
    let max_score = result.scores.iter().copied().filter(|&s| s != ILLEGAL_SCORE).fold(f64::NEG_INFINITY, f64::max);
    assert!((best_score - max_score).abs() < 1e-9);
}

/// Lost mode only ever changes the *choice* among root moves; it never
/// invents new scores or touches non-root nodes.
#[test]
fn lost_mode_choice_always_comes_from_the_scored_root_moves() {
    let mut state = GameStateBuilder::new(7).build().unwrap();
    for x in [2u8, 3, 4, 5] {
        state.apply_move(Move::new(x, 3), Player::White, &[]);
    }
    assert_eq!(state.to_move, Player::Black);
    let rules = SimpleFiveInARowRules::default();
    let mut config = Config::default();
    config.ai_enable_lost_mode = true;
    config.ai_lost_mode_min_depth = 4;
    config.ai_lost_mode_threshold = 0.1;
    let tt = TT::new(1024, 4);
    let stop = no_stop;
    let mut settings = SearchSettings::new(Player::Black, &stop);
    settings.depth = 4;
    settings.min_depth = 4;
    let mut stats = Stats::new();
    let result = driver::score_board(&state, &rules, &config, &tt, None, config.heuristics.fingerprint(), &settings, &mut stats);

    let best = result.best_move.expect("a losing position still has a best move");
    let size = 7;
    assert_ne!(result.scores[best.y as usize * size + best.x as usize], ILLEGAL_SCORE);
    assert!(result.scores[best.y as usize * size + best.x as usize] > -WIN_SCORE - 1.0);
}
