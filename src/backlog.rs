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

//! Off-game analysis backlog: a deduplicated, priority-ordered queue of
//! positions to deepen while nothing is waiting on a move, plus the worker
//! pool that drains it. Simplified from a command-dispatch loop
//! (`motors/src/search/multithreading.rs`'s `EngineReceives`/`EngineThread`)
//! down to the one command this queue actually needs — `Shutdown` — since
//! there is no protocol layer underneath this crate, only the search core.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::board::GameState;
use crate::config::SharedConfig;
use crate::rules::Rules;
use crate::search::driver::{Driver, SearchSettings};
use crate::search::statistics::Stats;
use crate::search::tt::Flag;

/// One position queued for off-game deepening. Identity (for dedup and for
/// the worker's TT probe) is the position's `CanonHash`, not this struct's
/// address, so two enqueues of the same position collapse into one entry.
#[derive(Clone)]
pub struct BacklogTask {
    pub state: GameState,
    pub rules: Arc<dyn Rules>,
    /// Logical enqueue order, not a wall-clock timestamp — ties break on
    /// this rather than `SystemTime`, so ordering stays deterministic
    /// under test.
    created_at: u64,
    /// Deepest depth this task is already known to have completed, if any.
    known_depth: Option<u32>,
    /// Depth this task is being deepened towards.
    target_depth: u32,
}

impl BacklogTask {
    #[must_use]
    pub fn new(state: GameState, rules: Arc<dyn Rules>, target_depth: u32) -> Self {
        Self { state, rules, created_at: 0, known_depth: None, target_depth }
    }

    #[must_use]
    pub fn canon_hash(&self) -> u64 {
        self.state.canon_hash()
    }
}

struct HeapItem {
    stones: usize,
    remaining_depth: u32,
    created_at: u64,
    task: BacklogTask,
}

impl HeapItem {
    fn new(task: BacklogTask) -> Self {
        let stones = task.state.board.count_stones();
        let remaining_depth = task.target_depth.saturating_sub(task.known_depth.unwrap_or(0));
        let created_at = task.created_at;
        Self { stones, remaining_depth, created_at, task }
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// More stones first, then more remaining depth-to-target, then older
/// (smaller `created_at`) first — matches a max-heap pop order directly.
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stones.cmp(&other.stones).then(self.remaining_depth.cmp(&other.remaining_depth)).then(other.created_at.cmp(&self.created_at))
    }
}

struct QueueState {
    /// Tasks bumped back to the very front after an interruption — served
    /// before anything in `heap`, in the order they were bumped.
    front: VecDeque<BacklogTask>,
    heap: BinaryHeap<HeapItem>,
    /// Every `CanonHash` either queued or currently being processed by a
    /// worker; a position is a member of exactly this set or neither `front`
    /// nor `heap` nor any worker — never both in and out.
    known: HashSet<u64>,
}

/// The shared, deduplicated backlog. Cheap to clone via `Arc`; every method
/// takes `&self` so many worker threads can share one instance.
pub struct BacklogQueue {
    state: Mutex<QueueState>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    sequence: AtomicU64,
    /// Set while a live game is running: workers treat this the same as a
    /// stop request and requeue whatever they're mid-depth on.
    paused: AtomicBool,
}

impl Default for BacklogQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl BacklogQueue {
    #[must_use]
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self { state: Mutex::new(QueueState { front: VecDeque::new(), heap: BinaryHeap::new(), known: HashSet::new() }), wake_tx, wake_rx, sequence: AtomicU64::new(0), paused: AtomicBool::new(false) }
    }

    fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    /// Enqueues a task; returns `false` (and drops it) if its `CanonHash`
    /// is already queued or being processed.
    pub fn enqueue(&self, mut task: BacklogTask) -> bool {
        let mut state = self.state.lock().unwrap();
        let hash = task.canon_hash();
        if !state.known.insert(hash) {
            return false;
        }
        task.created_at = self.sequence.fetch_add(1, AtomicOrdering::Relaxed);
        state.heap.push(HeapItem::new(task));
        drop(state);
        self.wake();
        true
    }

    /// Puts an interrupted task back ahead of everything else in the
    /// normal priority order.
    fn requeue_front(&self, task: BacklogTask) {
        let mut state = self.state.lock().unwrap();
        state.front.push_back(task);
        drop(state);
        self.wake();
    }

    /// Puts a task that exceeded its soft time budget back into normal
    /// priority rotation rather than jumping the queue.
    fn requeue_later(&self, task: BacklogTask) {
        let mut state = self.state.lock().unwrap();
        state.heap.push(HeapItem::new(task));
        drop(state);
        self.wake();
    }

    fn drop_task(&self, canon_hash: u64) {
        let mut state = self.state.lock().unwrap();
        state.known.remove(&canon_hash);
    }

    fn pop_front_locked(state: &mut QueueState) -> Option<BacklogTask> {
        state.front.pop_front().or_else(|| state.heap.pop().map(|item| item.task))
    }

    /// Blocks until a task is available, the queue is paused throughout,
    /// or `shutdown` is observed, whichever happens first.
    fn pop_blocking(&self, shutdown: &AtomicBool) -> Option<BacklogTask> {
        loop {
            if shutdown.load(AtomicOrdering::Acquire) {
                return None;
            }
            if !self.paused.load(AtomicOrdering::Acquire) {
                let mut state = self.state.lock().unwrap();
                if let Some(task) = Self::pop_front_locked(&mut state) {
                    return Some(task);
                }
            }
            let _ = self.wake_rx.recv_timeout(Duration::from_millis(100));
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(AtomicOrdering::Acquire)
    }

    /// A live game has started: workers finish their current depth and
    /// requeue, per the level-triggered stop discipline.
    pub fn request_stop(&self) {
        self.paused.store(true, AtomicOrdering::Release);
        self.wake();
    }

    /// The live game ended: workers may resume draining the backlog.
    pub fn reset_stop(&self) {
        self.paused.store(false, AtomicOrdering::Release);
        self.wake();
    }

    #[must_use]
    pub fn total_analytics_queue(&self) -> usize {
        self.state.lock().unwrap().known.len()
    }

    /// Up to `limit` queued tasks' canon hashes in priority order, without
    /// removing them. Front-queued (interrupted) tasks are reported first.
    #[must_use]
    pub fn top_analytics_queue(&self, limit: usize) -> Vec<u64> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<u64> = state.front.iter().map(BacklogTask::canon_hash).collect();
        let mut rest: Vec<&HeapItem> = state.heap.iter().collect();
        rest.sort_by(|a, b| b.cmp(a));
        out.extend(rest.iter().map(|item| item.task.canon_hash()));
        out.truncate(limit);
        out
    }
}

/// Runs one task's deepening: probes the TT for an already-exact solution,
/// otherwise direct-depth-searches each missing depth in turn, requeueing
/// (at the front) on interruption or (for later) on a soft budget overrun.
fn process_task(queue: &BacklogQueue, driver: &Driver, config: &SharedConfig, mut task: BacklogTask, shutdown: &AtomicBool) {
    let cfg = config.get();
    let heuristic_hash = cfg.heuristics.fingerprint();
    let target_depth = task.target_depth.min(cfg.ai_max_depth);

    let mut start_depth = cfg.ai_min_depth.max(6);
    if let Some(known) = task.known_depth {
        start_depth = start_depth.max(known + 1);
    }
    if start_depth > target_depth {
        queue.drop_task(task.canon_hash());
        return;
    }

    let key = crate::search::driver::tt_key(&task.state);
    if let Some(entry) = driver.tt.probe(key, heuristic_hash) {
        if entry.flag == Flag::Exact && i32::from(entry.depth) >= target_depth as i32 {
            queue.drop_task(task.canon_hash());
            return;
        }
    }

    let budget = Duration::from_millis(cfg.ai_backlog_estimate_ms);
    let started = Instant::now();
    let should_stop = || shutdown.load(AtomicOrdering::Acquire) || queue.is_paused();

    for depth in start_depth..=target_depth {
        if should_stop() {
            queue.requeue_front(task);
            return;
        }
        let mut settings = SearchSettings::new(task.state.to_move, &should_stop);
        settings.depth = depth;
        settings.min_depth = depth;
        settings.max_depth = depth;
        settings.direct_depth_only = true;
        settings.skip_queue_backlog = true;

        let mut stats = Stats::new();
        let result = driver.score_board(&task.state, task.rules.as_ref(), &cfg, &settings, &mut stats);
        if result.status != crate::search::driver::CompletionStatus::Completed {
            task.known_depth = depth.checked_sub(1).or(task.known_depth);
            queue.requeue_front(task);
            return;
        }
        task.known_depth = Some(depth);

        if started.elapsed() >= budget {
            queue.requeue_later(task);
            return;
        }
    }

    queue.drop_task(task.canon_hash());
}

fn worker_loop(queue: Arc<BacklogQueue>, driver: Arc<Driver>, config: SharedConfig, shutdown: Arc<AtomicBool>) {
    while let Some(task) = queue.pop_blocking(&shutdown) {
        process_task(&queue, &driver, &config, task, &shutdown);
    }
}

/// A fixed pool of worker threads draining one [`BacklogQueue`]. Dropping
/// this without calling [`BacklogPool::shutdown`] leaks the threads (they
/// keep running detached); `shutdown` is the normal, join-and-stop exit.
pub struct BacklogPool {
    shutdown: Arc<AtomicBool>,
    queue: Arc<BacklogQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl BacklogPool {
    #[must_use]
    pub fn spawn(queue: Arc<BacklogQueue>, driver: Arc<Driver>, config: SharedConfig, workers: usize) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let handles = (0..workers.max(1))
            .map(|id| {
                let queue = Arc::clone(&queue);
                let driver = Arc::clone(&driver);
                let config = config.clone();
                let shutdown = Arc::clone(&shutdown);
                thread::Builder::new().name(format!("backlog-worker-{id}")).spawn(move || worker_loop(queue, driver, config, shutdown)).expect("failed to spawn backlog worker thread")
            })
            .collect();
        Self { shutdown, queue, handles }
    }

    pub fn shutdown(mut self) {
        self.shutdown.store(true, AtomicOrdering::Release);
        self.queue.wake();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::GameStateBuilder;
    use crate::rules::SimpleFiveInARowRules;

    fn task(seed: u8) -> BacklogTask {
        let mut state = GameStateBuilder::new(9).build().unwrap();
        state.apply_move(crate::board::Move::new(seed % 9, seed / 9), crate::board::Player::Black, &[]);
        BacklogTask::new(state, Arc::new(SimpleFiveInARowRules::default()), 6)
    }

    #[test]
    fn duplicate_enqueue_does_not_grow_the_queue() {
        let queue = BacklogQueue::new();
        let t1 = task(3);
        let t2 = task(3);
        assert!(queue.enqueue(t1));
        assert!(!queue.enqueue(t2));
        assert_eq!(queue.total_analytics_queue(), 1);
    }

    #[test]
    fn distinct_positions_both_enqueue() {
        let queue = BacklogQueue::new();
        assert!(queue.enqueue(task(3)));
        assert!(queue.enqueue(task(20)));
        assert_eq!(queue.total_analytics_queue(), 2);
    }

    #[test]
    fn pop_prefers_more_stones_then_older() {
        let queue = BacklogQueue::new();
        let sparse = task(1);
        let mut dense_state = GameStateBuilder::new(9).build().unwrap();
        for i in 0..4u8 {
            dense_state.apply_move(crate::board::Move::new(i, 0), crate::board::Player::Black, &[]);
        }
        let dense = BacklogTask::new(dense_state, Arc::new(SimpleFiveInARowRules::default()), 6);
        queue.enqueue(sparse);
        queue.enqueue(dense);
        let shutdown = AtomicBool::new(false);
        let popped = queue.pop_blocking(&shutdown).unwrap();
        assert!(popped.state.board.count_stones() >= 4);
    }

    #[test]
    fn pop_returns_none_once_shutdown_is_observed() {
        let queue = BacklogQueue::new();
        let shutdown = AtomicBool::new(true);
        assert!(queue.pop_blocking(&shutdown).is_none());
    }

    #[test]
    fn pause_blocks_pop_until_reset() {
        let queue = BacklogQueue::new();
        queue.enqueue(task(7));
        queue.request_stop();
        assert!(queue.is_paused());
        queue.reset_stop();
        let shutdown = AtomicBool::new(false);
        assert!(queue.pop_blocking(&shutdown).is_some());
    }

    #[test]
    fn top_analytics_queue_reports_front_tasks_first() {
        let queue = BacklogQueue::new();
        queue.enqueue(task(3));
        let requeued = task(20);
        let hash = requeued.canon_hash();
        queue.requeue_front(requeued);
        let top = queue.top_analytics_queue(10);
        assert_eq!(top[0], hash);
    }
}
