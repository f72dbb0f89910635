//! The engine facade consumed by the UCI layer.
//!
//! Owns the thread pool, the current root position, the loaded network and
//! the callback set. Control-command errors come back as structured
//! values and never disturb the previous state; nothing here is called on
//! the search hot path.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::nnue::{NetworkLoadError, NnueNetwork};
use crate::numa::NumaConfig;
use crate::perft::perft;
use crate::position::{FenError, Position, UciMoveError};
use crate::search::{InfoFull, InfoIter, InfoShort, Limits, SearchCallbacks};
use crate::threads::ThreadPool;
use crate::tt::TranspositionTable;

/// Default network file name looked up next to the binary.
pub const DEFAULT_NETWORK_NAME: &str = "basalt.nnue";

/// Largest accepted transposition table size.
const MAX_TT_MB: usize = 1 << 20;
const MAX_THREADS: usize = 512;

/// Errors surfaced by engine control commands.
#[derive(Debug)]
pub enum EngineError {
    /// FEN parsing failure or illegal resulting position; the engine
    /// keeps its previous position.
    InvalidFen(FenError),
    /// A move in a `set_position` move list is not legal where it occurs.
    IllegalMove { index: usize, source: UciMoveError },
    /// Missing, truncated or mismatched network file.
    NetworkLoad(NetworkLoadError),
    /// A reconfiguration could not be satisfied; prior state is kept.
    Resource { what: &'static str },
    /// Structural reconfiguration attempted while a search is running.
    SearchActive,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidFen(e) => write!(f, "invalid position: {e}"),
            EngineError::IllegalMove { index, source } => {
                write!(f, "move {} in the move list: {source}", index + 1)
            }
            EngineError::NetworkLoad(e) => write!(f, "network: {e}"),
            EngineError::Resource { what } => {
                write!(f, "cannot allocate {what}; keeping previous configuration")
            }
            EngineError::SearchActive => {
                write!(f, "configuration change rejected while a search is active")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<FenError> for EngineError {
    fn from(e: FenError) -> Self {
        EngineError::InvalidFen(e)
    }
}

impl From<NetworkLoadError> for EngineError {
    fn from(e: NetworkLoadError) -> Self {
        EngineError::NetworkLoad(e)
    }
}

pub struct Engine {
    pool: ThreadPool,
    root: Position,
    network: Arc<NnueNetwork>,
    callbacks: SearchCallbacks,
    tt_mb: usize,
    threads: usize,
    numa: NumaConfig,
    chess960: bool,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("pool", &self.pool)
            .field("root", &self.root)
            .field("callbacks", &self.callbacks)
            .field("tt_mb", &self.tt_mb)
            .field("threads", &self.threads)
            .field("numa", &self.numa)
            .field("chess960", &self.chess960)
            .finish()
    }
}

impl Engine {
    /// Construct an engine, loading the default network file from
    /// `binary_dir`. Refuses to come up without a valid network.
    pub fn new<P: AsRef<Path>>(binary_dir: P) -> Result<Self, EngineError> {
        let network = NnueNetwork::load(binary_dir.as_ref().join(DEFAULT_NETWORK_NAME))?;
        Ok(Self::with_network(network))
    }

    /// Construct around an already-loaded network (embedded weights,
    /// tests).
    #[must_use]
    pub fn with_network(network: NnueNetwork) -> Self {
        crate::bitboard::init();
        let network = Arc::new(network);
        let tt_mb = TranspositionTable::DEFAULT_SIZE_MB;
        let tt = Arc::new(TranspositionTable::new(tt_mb));
        let numa = NumaConfig::default();
        let pool = ThreadPool::new(1, tt, Arc::clone(&network), numa.clone());

        Engine {
            pool,
            root: Position::startpos(),
            network,
            callbacks: SearchCallbacks::default(),
            tt_mb,
            threads: 1,
            numa,
            chess960: false,
        }
    }

    // ------------------------------------------------------------------
    // Position management
    // ------------------------------------------------------------------

    /// Set the root from a FEN plus a UCI move list. On any error the
    /// previous position is kept.
    pub fn set_position(&mut self, fen: &str, moves: &[&str]) -> Result<(), EngineError> {
        let mut pos = Position::from_fen(fen, self.chess960)?;
        for (index, uci) in moves.iter().enumerate() {
            let m = pos
                .parse_uci_move(uci)
                .map_err(|source| EngineError::IllegalMove { index, source })?;
            pos.do_move(m);
        }
        self.root = pos;
        Ok(())
    }

    #[must_use]
    pub fn position(&self) -> &Position {
        &self.root
    }

    pub fn set_chess960(&mut self, enabled: bool) {
        self.chess960 = enabled;
    }

    #[must_use]
    pub fn is_chess960(&self) -> bool {
        self.chess960
    }

    // ------------------------------------------------------------------
    // Search control
    // ------------------------------------------------------------------

    /// Dispatch the workers. Non-blocking; progress and the final best
    /// move arrive through the registered callbacks.
    pub fn go(&self, limits: Limits) {
        if self.pool.is_searching() {
            log::warn!("go received while searching; command dropped");
            return;
        }
        self.pool.go(&self.root, limits, self.callbacks.clone());
    }

    /// Request the running search to stop. Non-blocking.
    pub fn stop(&self) {
        self.pool.stop();
    }

    /// The predicted move was played; switch the ponder search to normal
    /// time management.
    pub fn ponderhit(&self) {
        self.pool.ponderhit();
    }

    /// Block until all workers are idle.
    pub fn wait_for_search_finished(&self) {
        self.pool.wait_for_search_finished();
    }

    #[must_use]
    pub fn is_searching(&self) -> bool {
        self.pool.is_searching()
    }

    /// Nodes visited by the current or last search.
    #[must_use]
    pub fn nodes(&self) -> u64 {
        self.pool.nodes()
    }

    /// Reset transposition table and histories for a new game.
    pub fn new_game(&self) -> Result<(), EngineError> {
        if self.pool.is_searching() {
            return Err(EngineError::SearchActive);
        }
        self.pool.clear();
        Ok(())
    }

    /// Move-path enumeration used by the test harness.
    pub fn perft(fen: &str, depth: u32, chess960: bool) -> Result<u64, EngineError> {
        let mut pos = Position::from_fen(fen, chess960)?;
        Ok(perft(&mut pos, depth))
    }

    // ------------------------------------------------------------------
    // Structural reconfiguration (rejected while searching)
    // ------------------------------------------------------------------

    pub fn set_tt_size_mb(&mut self, size_mb: usize) -> Result<(), EngineError> {
        if self.pool.is_searching() {
            return Err(EngineError::SearchActive);
        }
        if size_mb == 0 || size_mb > MAX_TT_MB {
            return Err(EngineError::Resource {
                what: "transposition table",
            });
        }
        self.tt_mb = size_mb;
        let tt = Arc::new(TranspositionTable::new(size_mb));
        self.rebuild_pool(tt);
        Ok(())
    }

    pub fn resize_threads(&mut self, threads: usize) -> Result<(), EngineError> {
        if self.pool.is_searching() {
            return Err(EngineError::SearchActive);
        }
        if threads == 0 || threads > MAX_THREADS {
            return Err(EngineError::Resource { what: "threads" });
        }
        self.threads = threads;
        let tt = Arc::clone(self.pool.transposition_table());
        self.rebuild_pool(tt);
        Ok(())
    }

    pub fn set_numa_config(&mut self, numa: NumaConfig) -> Result<(), EngineError> {
        if self.pool.is_searching() {
            return Err(EngineError::SearchActive);
        }
        self.numa = numa;
        let tt = Arc::clone(self.pool.transposition_table());
        self.rebuild_pool(tt);
        Ok(())
    }

    fn rebuild_pool(&mut self, tt: Arc<TranspositionTable>) {
        log::debug!(
            "rebuilding pool: {} threads, {} MB hash, {:?}",
            self.threads,
            self.tt_mb,
            self.numa
        );
        self.pool = ThreadPool::new(
            self.threads,
            tt,
            Arc::clone(&self.network),
            self.numa.clone(),
        );
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.pool.thread_count()
    }

    // ------------------------------------------------------------------
    // Callbacks
    // ------------------------------------------------------------------

    pub fn on_update_full(&mut self, f: impl Fn(&InfoFull) + Send + Sync + 'static) {
        self.callbacks.on_update_full = Some(Arc::new(f));
    }

    pub fn on_update_no_moves(&mut self, f: impl Fn(&InfoShort) + Send + Sync + 'static) {
        self.callbacks.on_update_no_moves = Some(Arc::new(f));
    }

    pub fn on_iter(&mut self, f: impl Fn(&InfoIter) + Send + Sync + 'static) {
        self.callbacks.on_iter = Some(Arc::new(f));
    }

    pub fn on_bestmove(&mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) {
        self.callbacks.on_bestmove = Some(Arc::new(f));
    }

    pub fn on_verify_networks(&mut self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks.on_verify_networks = Some(Arc::new(f));
    }

    /// Report the loaded network through the verification callback.
    pub fn verify_networks(&self) {
        if let Some(cb) = &self.callbacks.on_verify_networks {
            let desc = if self.network.description.is_empty() {
                "network loaded".to_string()
            } else {
                format!("network loaded: {}", self.network.description)
            };
            cb(&desc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn engine() -> Engine {
        Engine::with_network(NnueNetwork::zeroed())
    }

    #[test]
    fn test_set_position_and_reject_bad_input() {
        let mut e = engine();
        e.set_position(crate::position::START_FEN, &["e2e4", "e7e5"])
            .unwrap();
        let good_fen = e.position().fen();

        assert!(matches!(
            e.set_position("8/8/8/8/8/8/8/8 w - - 0 1", &[]),
            Err(EngineError::InvalidFen(_))
        ));
        assert!(matches!(
            e.set_position(crate::position::START_FEN, &["e2e4", "e2e4"]),
            Err(EngineError::IllegalMove { index: 1, .. })
        ));
        // Prior position survived both failures.
        assert_eq!(e.position().fen(), good_fen);
    }

    #[test]
    fn test_perft_facade() {
        assert_eq!(
            Engine::perft(crate::position::START_FEN, 3, false).unwrap(),
            8_902
        );
        assert!(Engine::perft("not a fen", 1, false).is_err());
    }

    #[test]
    fn test_movetime_search_returns_legal_bestmove() {
        let mut e = engine();
        let (tx, rx) = mpsc::channel::<String>();
        e.on_bestmove(move |best, _ponder| {
            let _ = tx.send(best.to_string());
        });
        e.set_position(crate::position::START_FEN, &[]).unwrap();
        e.go(Limits::movetime(100));
        e.wait_for_search_finished();

        let best = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("bestmove callback fired");
        assert!(e.position().parse_uci_move(&best).is_ok(), "bestmove {best}");
    }

    #[test]
    fn test_depth_search_with_infos() {
        let mut e = engine();
        let (tx, rx) = mpsc::channel::<i32>();
        e.on_update_full(move |info| {
            let _ = tx.send(info.depth);
        });
        e.go(Limits::depth(4));
        e.wait_for_search_finished();
        let depths: Vec<i32> = rx.try_iter().collect();
        assert!(depths.contains(&1) && depths.contains(&4));
    }

    #[test]
    fn test_stop_interrupts_infinite_search() {
        let mut e = engine();
        let (tx, rx) = mpsc::channel::<String>();
        e.on_bestmove(move |best, _| {
            let _ = tx.send(best.to_string());
        });
        e.go(Limits::infinite());
        std::thread::sleep(Duration::from_millis(50));
        assert!(e.is_searching());
        e.stop();
        e.wait_for_search_finished();
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_no_moves_callback_on_mated_root() {
        let mut e = engine();
        let (tx, rx) = mpsc::channel::<crate::types::Value>();
        e.on_update_no_moves(move |info| {
            let _ = tx.send(info.value);
        });
        // Black is checkmated; it is black to move.
        e.set_position("R6k/6pp/8/8/8/8/8/6K1 b - - 0 1", &[]).unwrap();
        e.go(Limits::depth(2));
        e.wait_for_search_finished();
        let value = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(value, crate::types::mated_in(0));
    }

    #[test]
    fn test_reconfiguration_when_idle() {
        let mut e = engine();
        e.set_tt_size_mb(8).unwrap();
        e.resize_threads(2).unwrap();
        assert_eq!(e.thread_count(), 2);
        e.set_numa_config(NumaConfig::new(Arc::new(crate::numa::RoundRobin::new(2))))
            .unwrap();
        assert!(e.set_tt_size_mb(0).is_err());
        assert!(e.resize_threads(0).is_err());
        e.new_game().unwrap();
    }

    #[test]
    fn test_reconfiguration_rejected_while_searching() {
        let mut e = engine();
        e.go(Limits::infinite());
        std::thread::sleep(Duration::from_millis(20));
        assert!(matches!(
            e.set_tt_size_mb(8),
            Err(EngineError::SearchActive)
        ));
        assert!(matches!(e.resize_threads(2), Err(EngineError::SearchActive)));
        assert!(matches!(e.new_game(), Err(EngineError::SearchActive)));
        e.stop();
        e.wait_for_search_finished();
    }

    #[test]
    fn test_smp_search_completes() {
        let mut e = engine();
        e.resize_threads(4).unwrap();
        let (tx, rx) = mpsc::channel::<String>();
        e.on_bestmove(move |best, _| {
            let _ = tx.send(best.to_string());
        });
        e.set_position(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            &[],
        )
        .unwrap();
        e.go(Limits::depth(6));
        e.wait_for_search_finished();
        let best = rx.recv_timeout(Duration::from_secs(30)).unwrap();
        assert!(e.position().parse_uci_move(&best).is_ok());
    }

    #[test]
    fn test_missing_network_file_fails_startup() {
        let err = Engine::new("/nonexistent-directory-for-tests").unwrap_err();
        assert!(matches!(err, EngineError::NetworkLoad(_)));
    }
}
