//! Search statistics tables.
//!
//! Every table is an array of saturating signed counters updated with the
//! gravity operator `v += bonus - v * |bonus| / D`, which keeps each cell
//! inside [-D, D] and makes recent results dominate old ones. Cells are
//! relaxed atomics: workers on one NUMA node share a replica and write
//! concurrently without synchronization, and a lost update is harmless.

use std::sync::atomic::{AtomicI16, Ordering};

use crate::position::Position;
use crate::types::{Color, Move, Piece, PieceType, Square, Value};

const BUTTERFLY_D: i32 = 7183;
const LOW_PLY_D: i32 = 7183;
const CAPTURE_D: i32 = 10692;
const PIECE_TO_D: i32 = 30000;
const PAWN_D: i32 = 8192;
const CORRECTION_D: i32 = 1024;

/// Plies near the root covered by the low-ply history.
pub const LOW_PLY_SIZE: usize = 5;

const FROM_TO: usize = 64 * 64;
const PAWN_HISTORY_SIZE: usize = 8192;
const CORRHIST_SIZE: usize = 16384;

/// Continuation-history ply offsets blended for quiet ordering and
/// updated on beta cutoffs.
pub const CONT_HIST_OFFSETS: [usize; 5] = [1, 2, 3, 4, 6];

/// One table: a flat vector of atomic cells with a per-table gravity bound.
struct Stats {
    cells: Vec<AtomicI16>,
    bound: i32,
}

impl Stats {
    fn new(len: usize, bound: i32) -> Self {
        let mut cells = Vec::new();
        cells.resize_with(len, || AtomicI16::new(0));
        Stats { cells, bound }
    }

    #[inline]
    fn get(&self, idx: usize) -> i32 {
        i32::from(self.cells[idx].load(Ordering::Relaxed))
    }

    /// The gravity update. Clamps the bonus to [-D, D] first so a single
    /// update can never overshoot the bound.
    #[inline]
    fn update(&self, idx: usize, bonus: i32) {
        let d = self.bound;
        let clamped = bonus.clamp(-d, d);
        let old = i32::from(self.cells[idx].load(Ordering::Relaxed));
        let new = old + clamped - old * clamped.abs() / d;
        debug_assert!(new.abs() <= d);
        self.cells[idx].store(new as i16, Ordering::Relaxed);
    }

    fn clear(&self) {
        for cell in &self.cells {
            cell.store(0, Ordering::Relaxed);
        }
    }
}

/// Quiet-move history indexed by (side, from, to).
pub struct ButterflyHistory(Stats);

impl ButterflyHistory {
    #[inline]
    #[must_use]
    pub fn get(&self, side: Color, m: Move) -> i32 {
        self.0.get(side.index() * FROM_TO + m.from_to())
    }

    #[inline]
    pub fn update(&self, side: Color, m: Move, bonus: i32) {
        self.0.update(side.index() * FROM_TO + m.from_to(), bonus);
    }
}

/// Root-near quiet ordering, indexed by (ply < 5, from, to).
pub struct LowPlyHistory(Stats);

impl LowPlyHistory {
    #[inline]
    #[must_use]
    pub fn get(&self, ply: usize, m: Move) -> i32 {
        debug_assert!(ply < LOW_PLY_SIZE);
        self.0.get(ply * FROM_TO + m.from_to())
    }

    #[inline]
    pub fn update(&self, ply: usize, m: Move, bonus: i32) {
        self.0.update(ply * FROM_TO + m.from_to(), bonus);
    }
}

/// Capture ordering history indexed by (piece, to, captured type).
pub struct CaptureHistory(Stats);

impl CaptureHistory {
    #[inline]
    fn index(piece: Piece, to: Square, captured: PieceType) -> usize {
        (piece.index() * 64 + to.index()) * PieceType::COUNT + captured.index()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, piece: Piece, to: Square, captured: PieceType) -> i32 {
        self.0.get(Self::index(piece, to, captured))
    }

    #[inline]
    pub fn update(&self, piece: Piece, to: Square, captured: PieceType, bonus: i32) {
        self.0.update(Self::index(piece, to, captured), bonus);
    }
}

/// Counter-move style history: a (piece, to) pair some plies back selects
/// a nested (piece, to) table for the current move.
pub struct ContinuationHistory(Stats);

const PIECE_TO: usize = Piece::COUNT * 64;

impl ContinuationHistory {
    #[inline]
    fn index(prev: (Piece, Square), piece: Piece, to: Square) -> usize {
        (prev.0.index() * 64 + prev.1.index()) * PIECE_TO + piece.index() * 64 + to.index()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, prev: (Piece, Square), piece: Piece, to: Square) -> i32 {
        self.0.get(Self::index(prev, piece, to))
    }

    #[inline]
    pub fn update(&self, prev: (Piece, Square), piece: Piece, to: Square, bonus: i32) {
        self.0.update(Self::index(prev, piece, to), bonus);
    }
}

/// Pawn-structure-aware quiet history indexed by (pawn-key hash, piece, to).
pub struct PawnHistory(Stats);

impl PawnHistory {
    #[inline]
    fn index(pawn_key: u64, piece: Piece, to: Square) -> usize {
        (pawn_key as usize & (PAWN_HISTORY_SIZE - 1)) * PIECE_TO
            + piece.index() * 64
            + to.index()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, pawn_key: u64, piece: Piece, to: Square) -> i32 {
        self.0.get(Self::index(pawn_key, piece, to))
    }

    #[inline]
    pub fn update(&self, pawn_key: u64, piece: Piece, to: Square, bonus: i32) {
        self.0.update(Self::index(pawn_key, piece, to), bonus);
    }
}

/// Residuals between static evaluation and search values, bucketed by
/// several position keys. Added back onto the raw evaluation.
pub struct CorrectionHistories {
    pawn: Stats,
    minor: Stats,
    non_pawn: Stats,
    continuation: Stats,
}

impl CorrectionHistories {
    #[inline]
    fn bucket(key: u64) -> usize {
        key as usize & (CORRHIST_SIZE - 1)
    }

    #[inline]
    fn non_pawn_index(key: u64, key_color: usize, us: usize) -> usize {
        (Self::bucket(key) * 2 + key_color) * 2 + us
    }

    /// Blend of all correction terms for the position, given the previous
    /// move's (piece, to) for the continuation component.
    #[must_use]
    pub fn correction(&self, pos: &Position, prev: Option<(Piece, Square)>) -> Value {
        let us = pos.side_to_move().index();
        let pawn = self
            .pawn
            .get(Self::bucket(pos.pawn_key()) * 2 + us);
        let minor = self
            .minor
            .get(Self::bucket(pos.minor_key()) * 2 + us);
        let non_pawn_w = self
            .non_pawn
            .get(Self::non_pawn_index(pos.non_pawn_key(Color::White), 0, us));
        let non_pawn_b = self
            .non_pawn
            .get(Self::non_pawn_index(pos.non_pawn_key(Color::Black), 1, us));
        let cont = prev.map_or(0, |(piece, to)| {
            self.continuation.get(piece.index() * 64 + to.index())
        });

        (6 * pawn + 4 * minor + 3 * (non_pawn_w + non_pawn_b) + 3 * cont) / 128
    }

    /// Feed the residual between the search result and the static eval
    /// back into every component.
    pub fn update(
        &self,
        pos: &Position,
        prev: Option<(Piece, Square)>,
        depth: i32,
        diff: Value,
    ) {
        let us = pos.side_to_move().index();
        let bonus = (diff * depth / 8).clamp(-CORRECTION_D / 4, CORRECTION_D / 4);

        self.pawn
            .update(Self::bucket(pos.pawn_key()) * 2 + us, bonus);
        self.minor
            .update(Self::bucket(pos.minor_key()) * 2 + us, bonus);
        self.non_pawn
            .update(Self::non_pawn_index(pos.non_pawn_key(Color::White), 0, us), bonus);
        self.non_pawn
            .update(Self::non_pawn_index(pos.non_pawn_key(Color::Black), 1, us), bonus);
        if let Some((piece, to)) = prev {
            self.continuation
                .update(piece.index() * 64 + to.index(), bonus);
        }
    }
}

/// The full history set shared by the workers of one NUMA node.
pub struct SharedHistories {
    pub butterfly: ButterflyHistory,
    pub low_ply: LowPlyHistory,
    pub capture: CaptureHistory,
    pub continuation: ContinuationHistory,
    pub pawn: PawnHistory,
    pub corrections: CorrectionHistories,
}

impl SharedHistories {
    #[must_use]
    pub fn new() -> Self {
        SharedHistories {
            butterfly: ButterflyHistory(Stats::new(2 * FROM_TO, BUTTERFLY_D)),
            low_ply: LowPlyHistory(Stats::new(LOW_PLY_SIZE * FROM_TO, LOW_PLY_D)),
            capture: CaptureHistory(Stats::new(
                Piece::COUNT * 64 * PieceType::COUNT,
                CAPTURE_D,
            )),
            continuation: ContinuationHistory(Stats::new(PIECE_TO * PIECE_TO, PIECE_TO_D)),
            pawn: PawnHistory(Stats::new(PAWN_HISTORY_SIZE * PIECE_TO, PAWN_D)),
            corrections: CorrectionHistories {
                pawn: Stats::new(CORRHIST_SIZE * 2, CORRECTION_D),
                minor: Stats::new(CORRHIST_SIZE * 2, CORRECTION_D),
                non_pawn: Stats::new(CORRHIST_SIZE * 2 * 2, CORRECTION_D),
                continuation: Stats::new(PIECE_TO, CORRECTION_D),
            },
        }
    }

    /// Reset everything; `ucinewgame`.
    pub fn clear(&self) {
        self.butterfly.0.clear();
        self.low_ply.0.clear();
        self.capture.0.clear();
        self.continuation.0.clear();
        self.pawn.0.clear();
        self.corrections.pawn.clear();
        self.corrections.minor.clear();
        self.corrections.non_pawn.clear();
        self.corrections.continuation.clear();
    }
}

impl Default for SharedHistories {
    fn default() -> Self {
        SharedHistories::new()
    }
}

/// History bonus for a move that proved itself at `depth`.
#[inline]
#[must_use]
pub fn stat_bonus(depth: i32) -> i32 {
    (20 * depth * depth + 40 * depth).min(2400)
}

/// Penalty for moves that were tried before the cutoff move.
#[inline]
#[must_use]
pub fn stat_malus(depth: i32) -> i32 {
    (18 * depth * depth + 32 * depth).min(2000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Square;

    #[test]
    fn test_gravity_stays_bounded() {
        let hist = SharedHistories::new();
        let m = Move::new(Square::new(1, 4), Square::new(3, 4));
        for _ in 0..1000 {
            hist.butterfly.update(Color::White, m, 2400);
        }
        assert!(hist.butterfly.get(Color::White, m) <= BUTTERFLY_D);
        for _ in 0..2000 {
            hist.butterfly.update(Color::White, m, -2400);
        }
        assert!(hist.butterfly.get(Color::White, m) >= -BUTTERFLY_D);
    }

    #[test]
    fn test_update_moves_towards_bonus() {
        let hist = SharedHistories::new();
        let m = Move::new(Square::new(0, 1), Square::new(2, 2));
        assert_eq!(hist.butterfly.get(Color::Black, m), 0);
        hist.butterfly.update(Color::Black, m, 500);
        let first = hist.butterfly.get(Color::Black, m);
        assert!(first > 0);
        hist.butterfly.update(Color::Black, m, 500);
        assert!(hist.butterfly.get(Color::Black, m) > first);
    }

    #[test]
    fn test_tables_are_independent_per_index() {
        let hist = SharedHistories::new();
        let a = Move::new(Square::new(0, 1), Square::new(2, 2));
        let b = Move::new(Square::new(0, 1), Square::new(2, 0));
        hist.butterfly.update(Color::White, a, 1000);
        assert_eq!(hist.butterfly.get(Color::White, b), 0);
        assert_eq!(hist.butterfly.get(Color::Black, a), 0);
    }

    #[test]
    fn test_capture_history_indexing() {
        let hist = SharedHistories::new();
        let piece = Piece::new(Color::White, PieceType::Knight);
        hist.capture.update(piece, Square::new(4, 4), PieceType::Pawn, 700);
        assert!(hist.capture.get(piece, Square::new(4, 4), PieceType::Pawn) > 0);
        assert_eq!(hist.capture.get(piece, Square::new(4, 4), PieceType::Rook), 0);
    }

    #[test]
    fn test_correction_shifts_towards_residual() {
        let hist = SharedHistories::new();
        let pos = crate::position::Position::startpos();
        assert_eq!(hist.corrections.correction(&pos, None), 0);
        for _ in 0..50 {
            hist.corrections.update(&pos, None, 10, 300);
        }
        assert!(hist.corrections.correction(&pos, None) > 0);
    }

    #[test]
    fn test_clear_resets_everything() {
        let hist = SharedHistories::new();
        let m = Move::new(Square::new(1, 4), Square::new(3, 4));
        hist.butterfly.update(Color::White, m, 1000);
        hist.clear();
        assert_eq!(hist.butterfly.get(Color::White, m), 0);
    }

    #[test]
    fn test_stat_bonus_monotone_and_capped() {
        assert!(stat_bonus(1) < stat_bonus(2));
        assert!(stat_bonus(3) < stat_bonus(6));
        assert_eq!(stat_bonus(40), 2400);
    }
}
