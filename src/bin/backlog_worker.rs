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

//! Standalone driver for the off-game analysis backlog: builds an
//! [`Engine`], seeds it with an empty-board task for the requested board
//! size, spawns the worker pool, and lets it deepen until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use gomoku_core::board::GameStateBuilder;
use gomoku_core::config::Config;
use gomoku_core::logging::{LogLevel, Logger};
use gomoku_core::rules::SimpleFiveInARowRules;
use gomoku_core::Engine;

/// Runs the off-game backlog analysis worker pool standalone.
#[derive(Parser, Debug)]
#[command(author = "ToTheAnd", version, about, long_about = None)]
struct CommandLineArgs {
    /// Board side length to seed the backlog with.
    #[arg(long, short, default_value_t = 15)]
    size: usize,

    /// Number of backlog worker threads.
    #[arg(long, short, default_value_t = 2)]
    workers: usize,

    /// Target search depth for each backlog task.
    #[arg(long, short, default_value_t = 12)]
    depth: u32,

    /// How long to let the pool run before exiting, in seconds.
    #[arg(long, default_value_t = 60)]
    run_seconds: u64,
}

fn main() {
    let args = CommandLineArgs::parse();
    let logger = Logger::new(LogLevel::Info);
    logger.info(&format!("starting backlog worker: size={} workers={} depth={}", args.size, args.workers, args.depth));

    let mut config = Config::default();
    config.ai_max_depth = config.ai_max_depth.max(args.depth);
    config.ai_queue_workers = args.workers;
    let mut engine = Engine::new(config);

    let state = GameStateBuilder::new(args.size).build().expect("invalid board size");
    let rules: Arc<dyn gomoku_core::rules::Rules> = Arc::new(SimpleFiveInARowRules::default());
    engine.enqueue_search_backlog_task(state, rules);
    engine.start_backlog_workers();

    std::thread::sleep(Duration::from_secs(args.run_seconds));

    logger.info(&format!("stopping after {} queued positions remaining", engine.total_analytics_queue()));
    engine.stop_backlog_workers();
}
