//! Search time allocation.
//!
//! The main worker computes a soft (optimum) and hard (maximum) budget
//! before dispatch and refines the effective soft limit while searching:
//! an unstable or failing-low root earns more time, a long-stable best
//! move gives some back.

use std::time::{Duration, Instant};

use super::Limits;
use crate::types::Color;

/// Reserve subtracted from every clock reading to cover I/O latency.
const MOVE_OVERHEAD_MS: u64 = 30;

#[derive(Clone, Debug)]
pub struct TimeManager {
    start: Instant,
    optimum: Option<Duration>,
    maximum: Option<Duration>,
}

impl TimeManager {
    /// Plan the budgets for one search.
    #[must_use]
    pub fn new(limits: &Limits, side: Color, game_ply: u32) -> Self {
        let start = Instant::now();

        if let Some(movetime) = limits.movetime {
            let budget = Duration::from_millis(movetime.saturating_sub(MOVE_OVERHEAD_MS).max(1));
            return TimeManager {
                start,
                optimum: Some(budget),
                maximum: Some(budget),
            };
        }

        let my_time = match side {
            Color::White => limits.wtime,
            Color::Black => limits.btime,
        };
        let Some(my_time) = my_time else {
            // Depth/node/infinite searches run without a clock.
            return TimeManager {
                start,
                optimum: None,
                maximum: None,
            };
        };

        let inc = match side {
            Color::White => limits.winc,
            Color::Black => limits.binc,
        };

        // Horizon: either the moves to the next control or a slice that
        // shrinks as the game goes on.
        let mtg = limits
            .movestogo
            .map_or(40, |n| n.clamp(2, 40)) as u64;
        let opening_taper = 10 + (game_ply as u64).min(40) / 2;
        let mtg = mtg.min(opening_taper.max(20));

        let usable = my_time
            .saturating_sub(MOVE_OVERHEAD_MS)
            .saturating_add(inc.saturating_mul(mtg - 1))
            .max(1);

        let optimum = (usable / mtg).max(1);
        let maximum = (optimum * 5 / 2).min(my_time.saturating_sub(MOVE_OVERHEAD_MS).max(1) * 4 / 5).max(optimum);

        TimeManager {
            start,
            optimum: Some(Duration::from_millis(optimum)),
            maximum: Some(Duration::from_millis(maximum)),
        }
    }

    /// A manager with no deadline (helpers, tests).
    #[must_use]
    pub fn unlimited() -> Self {
        TimeManager {
            start: Instant::now(),
            optimum: None,
            maximum: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    #[inline]
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Hard deadline reached: abort no matter what.
    #[inline]
    #[must_use]
    pub fn hard_limit_reached(&self) -> bool {
        self.maximum.is_some_and(|max| self.start.elapsed() >= max)
    }

    /// Soft check between iterations: `stability` counts consecutive
    /// iterations with the same best move, `failing_low` marks a root
    /// fail-low in the last aspiration loop.
    #[must_use]
    pub fn should_stop_iterating(&self, stability: u32, failing_low: bool) -> bool {
        let Some(optimum) = self.optimum else {
            return false;
        };
        let mut budget = optimum.as_millis() as i64;
        if failing_low {
            budget = budget * 150 / 100;
        }
        if stability < 3 {
            budget = budget * 130 / 100;
        } else if stability >= 8 {
            budget = budget * 75 / 100;
        }
        (self.start.elapsed().as_millis() as i64) >= budget
    }

    #[must_use]
    pub fn has_deadline(&self) -> bool {
        self.maximum.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movetime_sets_equal_budgets() {
        let tm = TimeManager::new(&Limits::movetime(500), Color::White, 0);
        assert!(tm.has_deadline());
        assert!(!tm.hard_limit_reached());
    }

    #[test]
    fn test_depth_search_has_no_deadline() {
        let tm = TimeManager::new(&Limits::depth(9), Color::White, 0);
        assert!(!tm.has_deadline());
        assert!(!tm.should_stop_iterating(0, false));
    }

    #[test]
    fn test_clock_allocation_is_a_fraction() {
        let limits = Limits {
            wtime: Some(60_000),
            winc: 1000,
            ..Limits::default()
        };
        let tm = TimeManager::new(&limits, Color::White, 20);
        let optimum = tm.optimum.unwrap().as_millis() as u64;
        let maximum = tm.maximum.unwrap().as_millis() as u64;
        assert!(optimum > 500, "optimum {optimum}ms too small");
        assert!(optimum < 60_000 / 4);
        assert!(maximum >= optimum);
        assert!(maximum < 60_000);
    }

    #[test]
    fn test_stability_shrinks_budget() {
        let tm = TimeManager {
            start: Instant::now() - Duration::from_millis(80),
            optimum: Some(Duration::from_millis(100)),
            maximum: Some(Duration::from_millis(250)),
        };
        // 80ms elapsed: unstable root (130ms budget) keeps going, very
        // stable root (75ms budget) stops.
        assert!(!tm.should_stop_iterating(0, false));
        assert!(tm.should_stop_iterating(10, false));
    }
}
