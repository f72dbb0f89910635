//! Search: iterative deepening, the negamax worker and time management.
//!
//! Workers run independent searches that share only the transposition
//! table and the NUMA-local history tables (Lazy SMP). The thread pool in
//! `crate::threads` owns the workers; this module defines the per-worker
//! algorithm and the types crossing the facade boundary.

mod time;
mod worker;

pub use time::TimeManager;
pub use worker::{RootMove, SearchWorker, WorkerShared};

use std::sync::Arc;

use crate::tt::Bound;
use crate::types::{Move, Value};

/// Resource limits of one `go` command.
#[derive(Clone, Debug, Default)]
pub struct Limits {
    /// Remaining clock per side, milliseconds.
    pub wtime: Option<u64>,
    pub btime: Option<u64>,
    /// Increment per move, milliseconds.
    pub winc: u64,
    pub binc: u64,
    /// Moves until the next time control.
    pub movestogo: Option<u32>,
    /// Fixed time for this move, milliseconds.
    pub movetime: Option<u64>,
    pub depth: Option<i32>,
    /// Aggregate node budget across all workers.
    pub nodes: Option<u64>,
    /// Stop as soon as a mate in at most this many moves is proven.
    pub mate: Option<u32>,
    pub infinite: bool,
    /// Started in ponder mode; time limits apply only after `ponderhit`.
    pub ponder: bool,
}

impl Limits {
    /// Builder-style helpers for the common cases.
    #[must_use]
    pub fn depth(depth: i32) -> Self {
        Limits {
            depth: Some(depth),
            ..Limits::default()
        }
    }

    #[must_use]
    pub fn movetime(ms: u64) -> Self {
        Limits {
            movetime: Some(ms),
            ..Limits::default()
        }
    }

    #[must_use]
    pub fn nodes(nodes: u64) -> Self {
        Limits {
            nodes: Some(nodes),
            ..Limits::default()
        }
    }

    #[must_use]
    pub fn infinite() -> Self {
        Limits {
            infinite: true,
            ..Limits::default()
        }
    }

    /// True when the clock decides how long to think.
    #[must_use]
    pub fn use_time_management(&self) -> bool {
        self.wtime.is_some() || self.btime.is_some() || self.movetime.is_some()
    }
}

/// Per-aspiration-iteration notification.
#[derive(Clone, Debug)]
pub struct InfoIter {
    pub depth: i32,
    pub sel_depth: i32,
}

/// Full periodic search report.
#[derive(Clone, Debug)]
pub struct InfoFull {
    pub depth: i32,
    pub sel_depth: i32,
    pub value: Value,
    /// Set when the value is only a bound (aspiration fail).
    pub bound: Option<Bound>,
    pub time_ms: u64,
    pub nodes: u64,
    pub nps: u64,
    pub hashfull: u32,
    pub tb_hits: u64,
    pub pv: Vec<Move>,
}

/// Report for a root without legal moves.
#[derive(Clone, Debug)]
pub struct InfoShort {
    pub depth: i32,
    pub value: Value,
}

/// Callback bundle surfaced through the engine facade. All callbacks run
/// on search threads; implementations must be quick and `Send + Sync`.
#[derive(Clone, Default)]
pub struct SearchCallbacks {
    pub on_iter: Option<Arc<dyn Fn(&InfoIter) + Send + Sync>>,
    pub on_update_full: Option<Arc<dyn Fn(&InfoFull) + Send + Sync>>,
    pub on_update_no_moves: Option<Arc<dyn Fn(&InfoShort) + Send + Sync>>,
    pub on_bestmove: Option<Arc<dyn Fn(&str, &str) + Send + Sync>>,
    pub on_verify_networks: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl std::fmt::Debug for SearchCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCallbacks")
            .field("on_iter", &self.on_iter.is_some())
            .field("on_update_full", &self.on_update_full.is_some())
            .field("on_update_no_moves", &self.on_update_no_moves.is_some())
            .field("on_bestmove", &self.on_bestmove.is_some())
            .field("on_verify_networks", &self.on_verify_networks.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_builders() {
        assert_eq!(Limits::depth(7).depth, Some(7));
        assert_eq!(Limits::movetime(250).movetime, Some(250));
        assert!(Limits::infinite().infinite);
        assert!(!Limits::depth(7).use_time_management());
        assert!(Limits::movetime(250).use_time_management());
    }
}
