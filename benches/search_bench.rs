use std::time::Duration;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use gomoku_core::board::{GameStateBuilder, Move, Player};
use gomoku_core::config::Config;
use gomoku_core::rules::SimpleFiveInARowRules;
use gomoku_core::search::driver::{SearchSettings, score_board};
use gomoku_core::search::eval_cache::EvalCache;
use gomoku_core::search::statistics::Stats;
use gomoku_core::search::tt::TT;

fn opening_state(size: usize) -> gomoku_core::board::GameState {
    let mut state = GameStateBuilder::new(size).build().unwrap();
    let center = (size / 2) as u8;
    state.apply_move(Move::new(center, center), Player::Black, &[]);
    state.apply_move(Move::new(center + 1, center), Player::White, &[]);
    state
}

fn search_empty_board_bench(c: &mut Criterion) {
    c.bench_function("score_board empty 15x15 depth 4", |b| {
        let state = GameStateBuilder::new(15).build().unwrap();
        let rules = SimpleFiveInARowRules::default();
        let config = Config::default();
        let stop = || false;
        b.iter(|| {
            let tt = TT::new(1 << 16, 4);
            let mut settings = SearchSettings::new(Player::Black, &stop);
            settings.depth = 4;
            settings.min_depth = 4;
            let mut stats = Stats::new();
            black_box(score_board(black_box(&state), &rules, &config, &tt, None, config.heuristics.fingerprint(), &settings, &mut stats))
        });
    });
}

fn search_midgame_bench(c: &mut Criterion) {
    c.bench_function("score_board midgame 15x15 depth 4", |b| {
        let state = opening_state(15);
        let rules = SimpleFiveInARowRules::default();
        let config = Config::default();
        let stop = || false;
        b.iter(|| {
            let tt = TT::new(1 << 16, 4);
            let mut settings = SearchSettings::new(Player::Black, &stop);
            settings.depth = 4;
            settings.min_depth = 4;
            let mut stats = Stats::new();
            black_box(score_board(black_box(&state), &rules, &config, &tt, None, config.heuristics.fingerprint(), &settings, &mut stats))
        });
    });
}

fn search_with_eval_cache_bench(c: &mut Criterion) {
    c.bench_function("score_board midgame 15x15 depth 4 with eval cache", |b| {
        let state = opening_state(15);
        let rules = SimpleFiveInARowRules::default();
        let config = Config::default();
        let stop = || false;
        b.iter(|| {
            let tt = TT::new(1 << 16, 4);
            let eval_cache = EvalCache::new(1 << 14);
            let mut settings = SearchSettings::new(Player::Black, &stop);
            settings.depth = 4;
            settings.min_depth = 4;
            let mut stats = Stats::new();
            black_box(score_board(black_box(&state), &rules, &config, &tt, Some(&eval_cache), config.heuristics.fingerprint(), &settings, &mut stats))
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10)).sample_size(20);
    targets = search_empty_board_bench, search_midgame_bench, search_with_eval_cache_bench,
}

criterion_main!(benches);
