//! Staged, lazy move ordering.
//!
//! Moves are generated in batches only when the previous batch is
//! exhausted: TT move first, then scored captures (good ones before the
//! SEE losers), then scored quiets. A caller that fails high early never
//! pays for quiet generation, and `skip_quiets` lets the search preempt
//! the quiet stages after enough late moves.

use crate::history::{
    ButterflyHistory, CaptureHistory, ContinuationHistory, LowPlyHistory, PawnHistory,
    LOW_PLY_SIZE,
};
use crate::position::{generate, GenType, Position};
use crate::types::{piece_value, Move, MoveList, Piece, PieceType, Square, Value, MAX_MOVES};

/// Quiets scoring below this stay for the bad-quiet stage.
const GOOD_QUIET_THRESHOLD: i32 = -14000;

/// Bonus for a quiet move that gives a safe check.
const CHECK_BONUS: i32 = 16384;

/// Bonus for pushing a pawn deep into enemy territory.
const ADVANCED_PAWN_BONUS: i32 = 4000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    MainTt,
    CaptureInit,
    GoodCapture,
    QuietInit,
    GoodQuiet,
    BadCapture,
    BadQuiet,

    EvasionTt,
    EvasionInit,
    Evasion,

    ProbcutTt,
    ProbcutInit,
    Probcut,

    QsearchTt,
    QcaptureInit,
    Qcapture,
    QcheckInit,
    Qcheck,

    Done,
}

#[derive(Clone, Copy)]
struct ScoredMove {
    mv: Move,
    score: i32,
}

/// History views the picker scores with. `cont_prev` holds the (piece, to)
/// pairs of the moves 1, 2, 3, 4 and 6 plies back.
pub struct PickerHistories<'a> {
    pub butterfly: &'a ButterflyHistory,
    pub low_ply: &'a LowPlyHistory,
    pub capture: &'a CaptureHistory,
    pub pawn: &'a PawnHistory,
    pub continuation: &'a ContinuationHistory,
    pub cont_prev: [Option<(Piece, Square)>; 5],
}

pub struct MovePicker<'a> {
    hist: PickerHistories<'a>,
    tt_move: Move,
    stage: Stage,
    moves: [ScoredMove; MAX_MOVES],
    cur: usize,
    end: usize,
    end_bad_captures: usize,
    end_captures: usize,
    end_generated: usize,
    depth: i32,
    ply: usize,
    threshold: Value,
    skip_quiets: bool,
    gen_checks: bool,
}

impl<'a> MovePicker<'a> {
    /// Picker for main search (`depth > 0`) and quiescence (`depth <= 0`).
    /// At the quiescence horizon (`depth == 0`) quiet checks are emitted
    /// after the captures.
    #[must_use]
    pub fn new(
        pos: &Position,
        tt_move: Move,
        depth: i32,
        ply: usize,
        hist: PickerHistories<'a>,
    ) -> Self {
        let tt_ok = tt_move.is_some() && pos.pseudo_legal(tt_move);
        let stage = if pos.in_check() {
            if tt_ok { Stage::EvasionTt } else { Stage::EvasionInit }
        } else if depth > 0 {
            if tt_ok { Stage::MainTt } else { Stage::CaptureInit }
        } else if tt_ok {
            Stage::QsearchTt
        } else {
            Stage::QcaptureInit
        };

        MovePicker {
            hist,
            tt_move: if tt_ok { tt_move } else { Move::NONE },
            stage,
            moves: [ScoredMove { mv: Move::NONE, score: 0 }; MAX_MOVES],
            cur: 0,
            end: 0,
            end_bad_captures: 0,
            end_captures: 0,
            end_generated: 0,
            depth,
            ply,
            threshold: 0,
            skip_quiets: false,
            gen_checks: depth == 0,
        }
    }

    /// ProbCut picker: only captures whose SEE clears `threshold`.
    #[must_use]
    pub fn probcut(
        pos: &Position,
        tt_move: Move,
        threshold: Value,
        hist: PickerHistories<'a>,
    ) -> Self {
        debug_assert!(!pos.in_check());
        let tt_ok = tt_move.is_some()
            && pos.is_capture_stage(tt_move)
            && pos.pseudo_legal(tt_move)
            && pos.see_ge(tt_move, threshold);
        MovePicker {
            hist,
            tt_move: if tt_ok { tt_move } else { Move::NONE },
            stage: if tt_ok { Stage::ProbcutTt } else { Stage::ProbcutInit },
            moves: [ScoredMove { mv: Move::NONE, score: 0 }; MAX_MOVES],
            cur: 0,
            end: 0,
            end_bad_captures: 0,
            end_captures: 0,
            end_generated: 0,
            depth: 0,
            ply: 0,
            threshold,
            skip_quiets: false,
            gen_checks: false,
        }
    }

    /// Stop emitting quiet moves (late-move preemption after a fail-high
    /// becomes likely).
    pub fn skip_quiets(&mut self) {
        self.skip_quiets = true;
    }

    /// Emit the next move, or `None` when the position is exhausted.
    /// Emitted moves are pseudo-legal; the caller still checks `legal`.
    pub fn next(&mut self, pos: &Position) -> Option<Move> {
        loop {
            match self.stage {
                Stage::MainTt | Stage::EvasionTt | Stage::QsearchTt | Stage::ProbcutTt => {
                    self.stage = match self.stage {
                        Stage::MainTt => Stage::CaptureInit,
                        Stage::EvasionTt => Stage::EvasionInit,
                        Stage::QsearchTt => Stage::QcaptureInit,
                        _ => Stage::ProbcutInit,
                    };
                    return Some(self.tt_move);
                }

                Stage::CaptureInit | Stage::ProbcutInit | Stage::QcaptureInit => {
                    self.generate_and_score_captures(pos);
                    self.stage = match self.stage {
                        Stage::CaptureInit => Stage::GoodCapture,
                        Stage::ProbcutInit => Stage::Probcut,
                        _ => Stage::Qcapture,
                    };
                }

                Stage::GoodCapture => {
                    while self.cur < self.end {
                        let sm = self.moves[self.cur];
                        if sm.mv == self.tt_move {
                            self.cur += 1;
                            continue;
                        }
                        // SEE margin scales with the capture's history
                        // score; losers are stashed for the late stage.
                        if pos.see_ge(sm.mv, -sm.score / 18) {
                            self.cur += 1;
                            return Some(sm.mv);
                        }
                        self.moves.swap(self.end_bad_captures, self.cur);
                        self.end_bad_captures += 1;
                        self.cur += 1;
                    }
                    self.stage = Stage::QuietInit;
                }

                Stage::QuietInit => {
                    if !self.skip_quiets {
                        let mut list = MoveList::new();
                        generate(pos, GenType::Quiets, &mut list);
                        self.end_generated = self.end_captures + list.len();
                        let mut idx = self.end_captures;
                        for &m in &list {
                            self.moves[idx] = ScoredMove {
                                mv: m,
                                score: self.score_quiet(pos, m),
                            };
                            idx += 1;
                        }
                        partial_insertion_sort(
                            &mut self.moves[self.end_captures..self.end_generated],
                            -3560 * self.depth,
                        );
                        self.cur = self.end_captures;
                        self.end = self.end_generated;
                    }
                    self.stage = Stage::GoodQuiet;
                }

                Stage::GoodQuiet => {
                    if !self.skip_quiets {
                        if let Some(m) = self.select(|sm| sm.score > GOOD_QUIET_THRESHOLD) {
                            return Some(m);
                        }
                    }
                    // Loop over the stashed SEE losers next.
                    self.cur = 0;
                    self.end = self.end_bad_captures;
                    self.stage = Stage::BadCapture;
                }

                Stage::BadCapture => {
                    if let Some(m) = self.select(|_| true) {
                        return Some(m);
                    }
                    self.cur = self.end_captures;
                    self.end = self.end_generated;
                    self.stage = Stage::BadQuiet;
                }

                Stage::BadQuiet => {
                    if !self.skip_quiets {
                        if let Some(m) = self.select(|sm| sm.score <= GOOD_QUIET_THRESHOLD) {
                            return Some(m);
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::EvasionInit => {
                    let mut list = MoveList::new();
                    generate(pos, GenType::Evasions, &mut list);
                    self.end_generated = list.len();
                    for (idx, &m) in list.iter().enumerate() {
                        self.moves[idx] = ScoredMove {
                            mv: m,
                            score: self.score_evasion(pos, m),
                        };
                    }
                    partial_insertion_sort(&mut self.moves[..self.end_generated], i32::MIN);
                    self.cur = 0;
                    self.end = self.end_generated;
                    self.stage = Stage::Evasion;
                }

                Stage::Evasion => {
                    if let Some(m) = self.select(|_| true) {
                        return Some(m);
                    }
                    self.stage = Stage::Done;
                }

                Stage::Qcapture => {
                    if let Some(m) = self.select(|_| true) {
                        return Some(m);
                    }
                    if self.gen_checks {
                        self.stage = Stage::QcheckInit;
                    } else {
                        self.stage = Stage::Done;
                    }
                }

                Stage::QcheckInit => {
                    // Horizon node: try quiet checking moves after the
                    // captures are spent.
                    let mut list = MoveList::new();
                    generate(pos, GenType::Quiets, &mut list);
                    let mut idx = self.end_captures;
                    for &m in &list {
                        if pos.gives_check(m) {
                            self.moves[idx] = ScoredMove {
                                mv: m,
                                score: self.score_quiet(pos, m),
                            };
                            idx += 1;
                        }
                    }
                    self.end_generated = idx;
                    partial_insertion_sort(
                        &mut self.moves[self.end_captures..self.end_generated],
                        i32::MIN,
                    );
                    self.cur = self.end_captures;
                    self.end = self.end_generated;
                    self.stage = Stage::Qcheck;
                }

                Stage::Qcheck => {
                    if let Some(m) = self.select(|_| true) {
                        return Some(m);
                    }
                    self.stage = Stage::Done;
                }

                Stage::Probcut => {
                    loop {
                        let Some(m) = self.select(|_| true) else {
                            self.stage = Stage::Done;
                            break;
                        };
                        if pos.see_ge(m, self.threshold) {
                            return Some(m);
                        }
                    }
                }

                Stage::Done => return None,
            }
        }
    }

    /// Emit the next move of the current range passing `filter`, skipping
    /// the already-emitted TT move.
    fn select(&mut self, filter: impl Fn(&ScoredMove) -> bool) -> Option<Move> {
        while self.cur < self.end {
            let sm = self.moves[self.cur];
            self.cur += 1;
            if sm.mv != self.tt_move && filter(&sm) {
                return Some(sm.mv);
            }
        }
        None
    }

    fn generate_and_score_captures(&mut self, pos: &Position) {
        let mut list = MoveList::new();
        generate(pos, GenType::Captures, &mut list);
        self.end_generated = list.len();
        for (idx, &m) in list.iter().enumerate() {
            self.moves[idx] = ScoredMove {
                mv: m,
                score: self.score_capture(pos, m),
            };
        }
        self.cur = 0;
        self.end_bad_captures = 0;
        self.end = self.end_generated;
        self.end_captures = self.end_generated;
        partial_insertion_sort(&mut self.moves[..self.end_generated], i32::MIN);
    }

    /// Most valuable victim, boosted by capture history.
    fn score_capture(&self, pos: &Position, m: Move) -> i32 {
        let captured = captured_type(pos, m);
        let piece = pos.moved_piece(m).expect("capture has a mover");
        7 * piece_value(captured) + self.hist.capture.get(piece, m.to(), captured)
    }

    /// Blended quiet-history score plus tactical bonuses.
    fn score_quiet(&self, pos: &Position, m: Move) -> i32 {
        let piece = pos.moved_piece(m).expect("quiet has a mover");
        let to = m.to();
        let us = pos.side_to_move();

        let mut score = 2 * self.hist.butterfly.get(us, m);
        score += 2 * self.hist.pawn.get(pos.pawn_key(), piece, to);
        for prev in self.hist.cont_prev.into_iter().flatten() {
            score += self.hist.continuation.get(prev, piece, to);
        }

        // A safe check is usually worth trying early.
        if pos.check_squares(piece.piece_type()).contains(to) && pos.see_ge(m, -75) {
            score += CHECK_BONUS;
        }

        if piece.piece_type() == PieceType::Pawn && to.relative_rank(us.is_white()) >= 5 {
            score += ADVANCED_PAWN_BONUS;
        }

        if self.ply < LOW_PLY_SIZE {
            score += 8 * self.hist.low_ply.get(self.ply, m) / (1 + self.ply as i32);
        }
        score
    }

    /// Evasion order: captures of the checker by value, then history.
    fn score_evasion(&self, pos: &Position, m: Move) -> i32 {
        if pos.is_capture(m) {
            return piece_value(captured_type(pos, m)) + (1 << 28);
        }
        let piece = pos.moved_piece(m).expect("evasion has a mover");
        let mut score = self.hist.butterfly.get(pos.side_to_move(), m);
        if let Some(prev) = self.hist.cont_prev[0] {
            score += self.hist.continuation.get(prev, piece, m.to());
        }
        if self.ply < LOW_PLY_SIZE {
            score += self.hist.low_ply.get(self.ply, m);
        }
        score
    }
}

fn captured_type(pos: &Position, m: Move) -> PieceType {
    if m.is_en_passant() {
        PieceType::Pawn
    } else {
        pos.piece_on(m.to())
            .map_or(PieceType::Pawn, |p| p.piece_type())
    }
}

/// Sort the slice in descending score order down to and including `limit`;
/// the relative order of entries below the limit is unspecified.
fn partial_insertion_sort(moves: &mut [ScoredMove], limit: i32) {
    let mut sorted_end = 0;
    for p in 1..moves.len() {
        if moves[p].score >= limit {
            let tmp = moves[p];
            sorted_end += 1;
            moves[p] = moves[sorted_end];
            let mut q = sorted_end;
            while q > 0 && moves[q - 1].score < tmp.score {
                moves[q] = moves[q - 1];
                q -= 1;
            }
            moves[q] = tmp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::SharedHistories;
    use crate::position::Position;

    fn histories(shared: &SharedHistories) -> PickerHistories<'_> {
        PickerHistories {
            butterfly: &shared.butterfly,
            low_ply: &shared.low_ply,
            capture: &shared.capture,
            pawn: &shared.pawn,
            continuation: &shared.continuation,
            cont_prev: [None; 5],
        }
    }

    fn drain(picker: &mut MovePicker, pos: &Position) -> Vec<Move> {
        let mut out = Vec::new();
        while let Some(m) = picker.next(pos) {
            out.push(m);
        }
        out
    }

    #[test]
    fn test_emits_every_pseudo_legal_move_once() {
        let shared = SharedHistories::new();
        let pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            false,
        )
        .unwrap();

        let mut picker = MovePicker::new(&pos, Move::NONE, 8, 0, histories(&shared));
        let emitted = drain(&mut picker, &pos);

        let mut expected = crate::types::MoveList::new();
        generate(&pos, GenType::NonEvasions, &mut expected);
        assert_eq!(emitted.len(), expected.len());
        for &m in &expected {
            assert!(emitted.contains(&m), "missing {m}");
        }
        let mut dedup = emitted.clone();
        dedup.sort_by_key(|m| m.raw());
        dedup.dedup();
        assert_eq!(dedup.len(), emitted.len(), "duplicate emissions");
    }

    #[test]
    fn test_tt_move_first_and_not_repeated() {
        let shared = SharedHistories::new();
        let pos = Position::startpos();
        let tt_move = pos.parse_uci_move("e2e4").unwrap();

        let mut picker = MovePicker::new(&pos, tt_move, 6, 0, histories(&shared));
        let emitted = drain(&mut picker, &pos);
        assert_eq!(emitted[0], tt_move);
        assert_eq!(emitted.iter().filter(|&&m| m == tt_move).count(), 1);
    }

    #[test]
    fn test_bogus_tt_move_is_dropped() {
        let shared = SharedHistories::new();
        let pos = Position::startpos();
        // e2e5 is not a legal pawn move.
        let bogus = Move::new(
            crate::types::Square::new(1, 4),
            crate::types::Square::new(4, 4),
        );
        let mut picker = MovePicker::new(&pos, bogus, 6, 0, histories(&shared));
        let emitted = drain(&mut picker, &pos);
        assert!(!emitted.contains(&bogus));
        assert_eq!(emitted.len(), 20);
    }

    #[test]
    fn test_winning_captures_before_quiets() {
        let shared = SharedHistories::new();
        // White can win a queen with a pawn.
        let pos = Position::from_fen("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1", false).unwrap();
        let mut picker = MovePicker::new(&pos, Move::NONE, 6, 0, histories(&shared));
        let first = picker.next(&pos).unwrap();
        assert_eq!(first.to_uci(false), "e4d5");
    }

    #[test]
    fn test_skip_quiets_suppresses_quiet_stages() {
        let shared = SharedHistories::new();
        let pos = Position::startpos();
        let mut picker = MovePicker::new(&pos, Move::NONE, 6, 0, histories(&shared));
        picker.skip_quiets();
        let emitted = drain(&mut picker, &pos);
        assert!(emitted.is_empty(), "startpos has no captures");
    }

    #[test]
    fn test_evasion_picker_in_check() {
        let shared = SharedHistories::new();
        let pos = Position::from_fen("4k3/8/8/8/4r3/8/3N4/4K3 w - - 0 1", false).unwrap();
        assert!(pos.in_check());
        let mut picker = MovePicker::new(&pos, Move::NONE, 6, 0, histories(&shared));
        let emitted = drain(&mut picker, &pos);
        assert!(!emitted.is_empty());
        // The capture of the checking rook must come first.
        assert_eq!(emitted[0].to_uci(false), "d2e4");
    }

    #[test]
    fn test_qsearch_picker_captures_only_below_horizon() {
        let shared = SharedHistories::new();
        let pos = Position::from_fen("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1", false).unwrap();
        let mut picker = MovePicker::new(&pos, Move::NONE, -1, 4, histories(&shared));
        let emitted = drain(&mut picker, &pos);
        assert!(emitted.iter().all(|&m| pos.is_capture(m)));
    }

    #[test]
    fn test_probcut_only_strong_captures() {
        let shared = SharedHistories::new();
        // Queen takes defended pawn (bad), pawn takes queen (good).
        let pos =
            Position::from_fen("4k3/4p3/3p4/3q4/4P3/8/3Q4/4K3 w - - 0 1", false).unwrap();
        let mut picker =
            MovePicker::probcut(&pos, Move::NONE, piece_value(PieceType::Rook), histories(&shared));
        let emitted = drain(&mut picker, &pos);
        for m in &emitted {
            assert!(pos.see_ge(*m, piece_value(PieceType::Rook)));
        }
        assert!(emitted.iter().any(|m| m.to_uci(false) == "e4d5"));
    }
}
