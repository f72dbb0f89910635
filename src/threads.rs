//! The search thread pool.
//!
//! A fixed set of OS workers, each parked on a condition variable between
//! `go` commands. On `go` every worker receives a snapshot of the root
//! position and runs an independent iterative-deepening search (Lazy SMP);
//! the only cross-thread state is the transposition table, the NUMA-local
//! histories and a handful of relaxed atomics. The main worker enforces
//! clocks, collects the deepest completed result across workers after
//! `stop`, and publishes `bestmove`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::history::SharedHistories;
use crate::nnue::NnueNetwork;
use crate::numa::NumaConfig;
use crate::position::Position;
use crate::search::{
    Limits, SearchCallbacks, SearchWorker, TimeManager, WorkerShared,
};
use crate::tt::TranspositionTable;
use crate::types::{is_mate_value, Move, Value, VALUE_INFINITE};

/// Search thread stack size; deep PV lines recurse far.
const SEARCH_STACK_SIZE: usize = 32 * 1024 * 1024;

enum Job {
    Search(Box<SearchJob>),
    Quit,
}

struct SearchJob {
    pos: Position,
    limits: Limits,
    time: TimeManager,
    callbacks: SearchCallbacks,
}

struct Mailbox {
    slot: Mutex<Option<Job>>,
    signal: Condvar,
}

/// What each worker leaves behind for best-thread selection.
#[derive(Clone)]
struct WorkerResult {
    best: Move,
    ponder: Move,
    value: Value,
    depth: i32,
}

impl Default for WorkerResult {
    fn default() -> Self {
        WorkerResult {
            best: Move::NONE,
            ponder: Move::NONE,
            value: -VALUE_INFINITE,
            depth: 0,
        }
    }
}

/// Coordination hub shared by the pool handle and all workers.
struct PoolShared {
    shared: Arc<WorkerShared>,
    /// Number of workers still inside `run` for the current `go`.
    active: Mutex<usize>,
    idle_signal: Condvar,
    /// Lets the main worker sleep through `infinite`/`ponder` holds.
    hold: Mutex<bool>,
    hold_signal: Condvar,
    results: Vec<Mutex<WorkerResult>>,
}

impl PoolShared {
    fn new(threads: usize) -> Self {
        PoolShared {
            shared: Arc::new(WorkerShared::new()),
            active: Mutex::new(0),
            idle_signal: Condvar::new(),
            hold: Mutex::new(false),
            hold_signal: Condvar::new(),
            results: (0..threads).map(|_| Mutex::new(WorkerResult::default())).collect(),
        }
    }
}

pub struct ThreadPool {
    handles: Vec<JoinHandle<()>>,
    mailboxes: Vec<Arc<Mailbox>>,
    pool: Arc<PoolShared>,
    tt: Arc<TranspositionTable>,
    network: Arc<NnueNetwork>,
    numa: NumaConfig,
    node_histories: Vec<Arc<SharedHistories>>,
    threads: usize,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.threads)
            .field("numa", &self.numa)
            .finish()
    }
}

impl ThreadPool {
    /// Spawn `threads` workers bound per the NUMA config, sharing `tt` and
    /// per-node history replicas.
    #[must_use]
    pub fn new(
        threads: usize,
        tt: Arc<TranspositionTable>,
        network: Arc<NnueNetwork>,
        numa: NumaConfig,
    ) -> Self {
        let threads = threads.max(1);
        let pool = Arc::new(PoolShared::new(threads));

        // One history replica per NUMA node (workers write to the local
        // copy only) and one read-only network replica per node so weight
        // reads never cross the interconnect.
        let node_count = numa.binder.node_count();
        let node_histories: Vec<Arc<SharedHistories>> = (0..node_count)
            .map(|_| Arc::new(SharedHistories::new()))
            .collect();
        let node_networks: Vec<Arc<NnueNetwork>> = (0..node_count)
            .map(|node| {
                if node == 0 {
                    Arc::clone(&network)
                } else {
                    Arc::new((*network).clone())
                }
            })
            .collect();

        let mut handles = Vec::with_capacity(threads);
        let mut mailboxes = Vec::with_capacity(threads);

        for id in 0..threads {
            let mailbox = Arc::new(Mailbox {
                slot: Mutex::new(None),
                signal: Condvar::new(),
            });
            mailboxes.push(Arc::clone(&mailbox));

            let node = numa.binder.node_of(id);
            let histories = Arc::clone(&node_histories[node]);
            let tt = Arc::clone(&tt);
            let network = Arc::clone(&node_networks[node]);
            let pool = Arc::clone(&pool);
            let binder = Arc::clone(&numa.binder);
            let total = threads;

            let handle = std::thread::Builder::new()
                .name(format!("search-{id}"))
                .stack_size(SEARCH_STACK_SIZE)
                .spawn(move || {
                    binder.bind_current(id);
                    let shared = Arc::clone(&pool.shared);
                    let worker = SearchWorker::new(id, tt, histories, network, shared);
                    worker_loop(worker, &mailbox, &pool, total);
                })
                .expect("failed to spawn search worker");
            handles.push(handle);
        }

        ThreadPool {
            handles,
            mailboxes,
            pool,
            tt,
            network,
            numa,
            node_histories,
            threads,
        }
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    #[must_use]
    pub fn numa_config(&self) -> &NumaConfig {
        &self.numa
    }

    #[must_use]
    pub fn is_searching(&self) -> bool {
        *self.pool.active.lock() > 0
    }

    /// Total nodes of the ongoing (or last) search.
    #[must_use]
    pub fn nodes(&self) -> u64 {
        self.pool.shared.nodes.load(Ordering::Relaxed)
    }

    /// Dispatch a search. Non-blocking; results arrive via callbacks.
    pub fn go(&self, pos: &Position, limits: Limits, callbacks: SearchCallbacks) {
        debug_assert!(!self.is_searching());

        self.tt.new_search();
        self.pool.shared.stop.store(false, Ordering::Relaxed);
        self.pool
            .shared
            .ponder
            .store(limits.ponder, Ordering::Relaxed);
        self.pool.shared.nodes.store(0, Ordering::Relaxed);
        *self.pool.hold.lock() = false;

        let time = TimeManager::new(&limits, pos.side_to_move(), pos.game_ply());

        *self.pool.active.lock() = self.threads;

        for (id, mailbox) in self.mailboxes.iter().enumerate() {
            let job = SearchJob {
                pos: pos.clone(),
                limits: limits.clone(),
                time: time.clone(),
                // Helpers never talk to the GUI.
                callbacks: if id == 0 {
                    callbacks.clone()
                } else {
                    SearchCallbacks::default()
                },
            };
            let mut slot = mailbox.slot.lock();
            *slot = Some(Job::Search(Box::new(job)));
            mailbox.signal.notify_one();
        }
    }

    /// Request the search to wind down. Non-blocking.
    pub fn stop(&self) {
        self.pool.shared.stop.store(true, Ordering::Relaxed);
        self.release_hold();
    }

    /// The pondered move was played: clocks apply from here on.
    pub fn ponderhit(&self) {
        self.pool.shared.ponder.store(false, Ordering::Relaxed);
        self.release_hold();
    }

    fn release_hold(&self) {
        let mut hold = self.pool.hold.lock();
        *hold = true;
        self.pool.hold_signal.notify_all();
    }

    /// Block until every worker is idle again.
    pub fn wait_for_search_finished(&self) {
        let mut active = self.pool.active.lock();
        while *active > 0 {
            self.pool.idle_signal.wait(&mut active);
        }
    }

    /// Clear per-node histories and the TT (new game).
    pub fn clear(&self) {
        debug_assert!(!self.is_searching());
        for histories in &self.node_histories {
            histories.clear();
        }
        self.tt.clear();
    }

    #[must_use]
    pub fn transposition_table(&self) -> &Arc<TranspositionTable> {
        &self.tt
    }

    #[must_use]
    pub fn network(&self) -> &Arc<NnueNetwork> {
        &self.network
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
        for mailbox in &self.mailboxes {
            let mut slot = mailbox.slot.lock();
            *slot = Some(Job::Quit);
            mailbox.signal.notify_one();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    mut worker: SearchWorker,
    mailbox: &Mailbox,
    pool: &Arc<PoolShared>,
    total_threads: usize,
) {
    loop {
        let job = {
            let mut slot = mailbox.slot.lock();
            while slot.is_none() {
                mailbox.signal.wait(&mut slot);
            }
            slot.take().expect("checked above")
        };

        match job {
            Job::Quit => break,
            Job::Search(job) => {
                let is_main = worker.is_main();
                let infinite_hold = job.limits.infinite || job.limits.ponder;

                worker.prepare(job.pos, job.limits, job.time, job.callbacks);
                worker.run();

                // Publish this worker's view of the result.
                {
                    let mut result = pool.results[worker.id].lock();
                    *result = if worker.root_moves.is_empty() {
                        WorkerResult::default()
                    } else {
                        let rm = &worker.root_moves[0];
                        WorkerResult {
                            best: rm.mv,
                            ponder: rm.pv.get(1).copied().unwrap_or(Move::NONE),
                            value: rm.value,
                            depth: worker.completed_depth,
                        }
                    };
                }

                if is_main {
                    finalize_search(&mut worker, pool, total_threads, infinite_hold);
                }

                let mut active = pool.active.lock();
                *active -= 1;
                // The main worker also waits on this signal for the
                // helpers, so every decrement must wake the waiters.
                pool.idle_signal.notify_all();
            }
        }
    }
}

/// Main-worker epilogue: hold for `infinite`/`ponder`, stop the helpers,
/// wait for them, pick the best result and publish `bestmove`.
fn finalize_search(
    worker: &mut SearchWorker,
    pool: &Arc<PoolShared>,
    total_threads: usize,
    infinite_hold: bool,
) {
    // In infinite or ponder mode the protocol owns the end of the search:
    // nothing may be printed until `stop` or `ponderhit` arrives.
    if infinite_hold {
        let mut hold = pool.hold.lock();
        while !*hold && !pool.shared.stop.load(Ordering::Relaxed) {
            let _ = pool
                .hold_signal
                .wait_for(&mut hold, Duration::from_millis(10));
        }
    }

    pool.shared.stop.store(true, Ordering::Relaxed);

    // Wait until every helper has deposited its result (active drops to 1:
    // only this worker is still accounted for).
    {
        let mut active = pool.active.lock();
        while *active > 1 {
            pool.idle_signal.wait(&mut active);
        }
    }
    let _ = total_threads;

    // Deepest completed iteration wins; mate scores trump depth; the main
    // worker wins ties.
    let mut best = pool.results[0].lock().clone();
    for slot in &pool.results[1..] {
        let candidate = slot.lock().clone();
        if candidate.best == Move::NONE {
            continue;
        }
        let better = if is_mate_value(candidate.value) || is_mate_value(best.value) {
            candidate.value > best.value
        } else {
            candidate.depth > best.depth
                || (candidate.depth == best.depth && candidate.value > best.value)
        };
        if best.best == Move::NONE || better {
            best = candidate;
        }
    }

    if let Some(cb) = worker.callbacks_on_bestmove() {
        let chess960 = worker.pos.is_chess960();
        let best_uci = if best.best.is_some() {
            best.best.to_uci(chess960)
        } else {
            "(none)".to_string()
        };
        let ponder_uci = if best.ponder.is_some() {
            best.ponder.to_uci(chess960)
        } else {
            String::new()
        };
        cb(&best_uci, &ponder_uci);
    }
}
