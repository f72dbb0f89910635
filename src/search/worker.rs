//! The per-thread search worker: iterative deepening with aspiration
//! windows around a negamax alpha-beta with quiescence.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::OnceLock;

use super::{InfoFull, InfoIter, InfoShort, Limits, SearchCallbacks, TimeManager};
use crate::history::{
    stat_bonus, stat_malus, SharedHistories, CONT_HIST_OFFSETS, LOW_PLY_SIZE,
};
use crate::movepick::{MovePicker, PickerHistories};
use crate::nnue::{self, AccumulatorCache, NnueNetwork};
use crate::position::{generate, GenType, Position};
use crate::tt::{Bound, TranspositionTable};
use crate::types::{
    is_mate_value, mate_in, mated_in, Move, MoveList, Piece, PieceType, Square, Value, MAX_PLY,
    VALUE_DRAW, VALUE_INFINITE, VALUE_MATED_IN_MAX_PLY, VALUE_MATE_IN_MAX_PLY, VALUE_NONE,
};

/// Stack slots before ply 0, so continuation lookups six plies back never
/// leave the array.
const STACK_OFFSET: usize = 7;
const STACK_SIZE: usize = MAX_PLY + STACK_OFFSET + 2;

/// Poll the stop flag and clocks every this many nodes.
const CHECK_NODES: u64 = 1024;

/// One root move with its running score and principal variation.
#[derive(Clone, Debug)]
pub struct RootMove {
    pub mv: Move,
    pub value: Value,
    pub prev_value: Value,
    pub sel_depth: i32,
    pub pv: Vec<Move>,
}

impl RootMove {
    fn new(mv: Move) -> Self {
        RootMove {
            mv,
            value: -VALUE_INFINITE,
            prev_value: -VALUE_INFINITE,
            sel_depth: 0,
            pv: vec![mv],
        }
    }
}

/// State shared between all workers of a pool.
pub struct WorkerShared {
    pub stop: AtomicBool,
    pub ponder: AtomicBool,
    pub nodes: AtomicU64,
    pub tb_hits: AtomicU64,
}

impl WorkerShared {
    #[must_use]
    pub fn new() -> Self {
        WorkerShared {
            stop: AtomicBool::new(false),
            ponder: AtomicBool::new(false),
            nodes: AtomicU64::new(0),
            tb_hits: AtomicU64::new(0),
        }
    }
}

impl Default for WorkerShared {
    fn default() -> Self {
        WorkerShared::new()
    }
}

#[derive(Clone, Copy)]
struct StackEntry {
    current_move: Move,
    piece_to: Option<(Piece, Square)>,
    static_eval: Value,
    in_check: bool,
    tt_pv: bool,
    cutoff_count: u32,
}

impl Default for StackEntry {
    fn default() -> Self {
        StackEntry {
            current_move: Move::NONE,
            piece_to: None,
            static_eval: VALUE_NONE,
            in_check: false,
            tt_pv: false,
            cutoff_count: 0,
        }
    }
}

/// A search thread's whole private state. One per worker; reused across
/// `go` commands so histories of the position stay warm.
pub struct SearchWorker {
    pub id: usize,
    pub pos: Position,
    pub root_moves: Vec<RootMove>,
    pub completed_depth: i32,
    pub sel_depth: i32,
    pub nodes: u64,

    tt: Arc<TranspositionTable>,
    histories: Arc<SharedHistories>,
    network: Arc<NnueNetwork>,
    shared: Arc<WorkerShared>,
    cache: AccumulatorCache,

    limits: Limits,
    time: TimeManager,
    callbacks: SearchCallbacks,

    stack: [StackEntry; STACK_SIZE],
    flushed_nodes: u64,
}

impl SearchWorker {
    #[must_use]
    pub fn new(
        id: usize,
        tt: Arc<TranspositionTable>,
        histories: Arc<SharedHistories>,
        network: Arc<NnueNetwork>,
        shared: Arc<WorkerShared>,
    ) -> Self {
        let cache = AccumulatorCache::new(&network);
        SearchWorker {
            id,
            pos: Position::startpos(),
            root_moves: Vec::new(),
            completed_depth: 0,
            sel_depth: 0,
            nodes: 0,
            tt,
            histories,
            network,
            shared,
            cache,
            limits: Limits::default(),
            time: TimeManager::unlimited(),
            callbacks: SearchCallbacks::default(),
            stack: [StackEntry::default(); STACK_SIZE],
            flushed_nodes: 0,
        }
    }

    #[must_use]
    pub fn is_main(&self) -> bool {
        self.id == 0
    }

    /// Bestmove callback, used by the pool's finalize step.
    #[must_use]
    pub fn callbacks_on_bestmove(
        &self,
    ) -> Option<Arc<dyn Fn(&str, &str) + Send + Sync>> {
        self.callbacks.on_bestmove.clone()
    }

    /// Install the root position and limits for the next `run`.
    pub fn prepare(
        &mut self,
        pos: Position,
        limits: Limits,
        time: TimeManager,
        callbacks: SearchCallbacks,
    ) {
        self.pos = pos;
        self.limits = limits;
        self.time = time;
        self.callbacks = callbacks;
        self.nodes = 0;
        self.flushed_nodes = 0;
        self.completed_depth = 0;
        self.sel_depth = 0;
        self.stack = [StackEntry::default(); STACK_SIZE];
        self.cache.clear(&self.network);

        self.root_moves.clear();
        let mut list = MoveList::new();
        generate(&self.pos, GenType::Legal, &mut list);
        for &m in &list {
            self.root_moves.push(RootMove::new(m));
        }
    }

    /// Iterative deepening. Returns when the depth budget is exhausted or
    /// the stop flag fires; results stay in `root_moves`/`completed_depth`.
    pub fn run(&mut self) {
        if self.root_moves.is_empty() {
            if self.is_main() {
                let value = if self.pos.in_check() {
                    mated_in(0)
                } else {
                    VALUE_DRAW
                };
                if let Some(cb) = &self.callbacks.on_update_no_moves {
                    cb(&InfoShort { depth: 0, value });
                }
            }
            return;
        }

        let max_depth = self.limits.depth.unwrap_or(MAX_PLY as i32 - 1);
        // Helpers search staggered depths so the shared TT fills with a
        // mix of horizons (Lazy SMP).
        let depth_skip = if self.id % 2 == 1 { 1 } else { 0 };

        let mut value = VALUE_DRAW;
        let mut stability = 0u32;
        let mut last_best = Move::NONE;

        let mut root_depth = 1;
        while root_depth <= max_depth {
            if self.should_stop() {
                break;
            }

            for rm in &mut self.root_moves {
                rm.prev_value = rm.value;
            }
            self.sel_depth = 0;

            value = self.aspiration(root_depth + depth_skip, value);

            if self.stopped() {
                break;
            }

            self.root_moves
                .sort_by(|a, b| b.value.cmp(&a.value));
            self.completed_depth = root_depth;
            self.extract_root_pv();

            if self.is_main() {
                self.report_full(root_depth, self.root_moves[0].value, None);

                // Mate-in-N limit satisfied?
                if let Some(mate) = self.limits.mate {
                    if self.root_moves[0].value >= mate_in(2 * mate as usize) {
                        self.shared.stop.store(true, Ordering::Relaxed);
                    }
                }

                if self.root_moves[0].mv == last_best {
                    stability = stability.saturating_add(1);
                } else {
                    stability = 0;
                }
                last_best = self.root_moves[0].mv;

                if !self.pondering()
                    && self.time.should_stop_iterating(stability, false)
                {
                    self.shared.stop.store(true, Ordering::Relaxed);
                }
            }

            // With a forced mate on the board and no explicit limits,
            // deeper iterations cannot change the outcome.
            if is_mate_value(value) && self.limits.use_time_management() {
                break;
            }

            root_depth += 1;
        }

        self.flush_nodes();
    }

    /// One aspiration-window loop around the root search.
    fn aspiration(&mut self, depth: i32, previous: Value) -> Value {
        let mut delta = 18 + previous.abs() / 256;
        let mut alpha = (-VALUE_INFINITE).max(previous - delta);
        let mut beta = VALUE_INFINITE.min(previous + delta);
        let mut value;
        let mut failing_low = false;

        loop {
            value = self.search(true, alpha, beta, depth.max(1), false, 0, Move::NONE, true);

            self.root_moves.sort_by(|a, b| b.value.cmp(&a.value));

            if self.stopped() {
                return value;
            }

            if self.is_main() {
                if let Some(cb) = &self.callbacks.on_iter {
                    cb(&InfoIter {
                        depth,
                        sel_depth: self.sel_depth,
                    });
                }
            }

            if value <= alpha {
                // Fail low: pull beta along and retry with more room.
                beta = (alpha + beta) / 2;
                alpha = (-VALUE_INFINITE).max(value - delta);
                failing_low = true;
                if self.is_main() && self.time.elapsed_ms() > 2500 {
                    self.report_full(depth, value, Some(Bound::Upper));
                }
            } else if value >= beta {
                beta = VALUE_INFINITE.min(value + delta);
                if self.is_main() && self.time.elapsed_ms() > 2500 {
                    self.report_full(depth, value, Some(Bound::Lower));
                }
            } else {
                break;
            }

            if is_mate_value(value) {
                break;
            }
            delta += delta / 3;

            if self.is_main()
                && failing_low
                && !self.pondering()
                && self.time.should_stop_iterating(0, true)
            {
                // Out of time while resolving a fail low: accept what we
                // have rather than burn the remaining clock.
                break;
            }
        }
        value
    }

    // ------------------------------------------------------------------
    // Negamax
    // ------------------------------------------------------------------

    /// Alpha-beta. Returns a value in `[alpha, beta]` or a bound outside
    /// the window; `excluded` carries the singular-search exclusion.
    #[allow(clippy::too_many_arguments, clippy::too_many_lines)]
    fn search(
        &mut self,
        is_pv: bool,
        mut alpha: Value,
        mut beta: Value,
        mut depth: i32,
        cut_node: bool,
        ply: usize,
        excluded: Move,
        allow_null: bool,
    ) -> Value {
        let is_root = ply == 0;
        debug_assert!(-VALUE_INFINITE <= alpha && alpha < beta && beta <= VALUE_INFINITE);

        if depth <= 0 {
            return self.qsearch(is_pv, alpha, beta, ply, 0);
        }

        if self.should_stop() {
            return VALUE_DRAW;
        }

        self.nodes += 1;
        self.sel_depth = self.sel_depth.max(ply as i32 + 1);

        let in_check = self.pos.in_check();
        let excluded_active = excluded.is_some();

        if !is_root {
            if self.pos.is_draw(ply) {
                return VALUE_DRAW;
            }
            if ply >= MAX_PLY - 1 {
                return if in_check { VALUE_DRAW } else { self.evaluate(ply) };
            }

            // Mate distance pruning: a shorter mate elsewhere bounds what
            // this subtree can achieve.
            alpha = alpha.max(mated_in(ply));
            beta = beta.min(mate_in(ply + 1));
            if alpha >= beta {
                return alpha;
            }
        }

        let ss = ply + STACK_OFFSET;
        self.stack[ss].in_check = in_check;
        self.stack[ss + 1].cutoff_count = 0;

        // ------------------------------------------------------------------
        // Transposition table
        // ------------------------------------------------------------------
        let key = self.pos.key();
        let tt_data = if excluded_active {
            None
        } else {
            self.tt.probe(key, ply)
        };
        let tt_move = if is_root {
            self.root_moves[0].mv
        } else {
            tt_data.map_or(Move::NONE, |d| d.mv)
        };
        let tt_pv = is_pv || tt_data.is_some_and(|d| d.pv);
        self.stack[ss].tt_pv = tt_pv;

        if let Some(data) = tt_data {
            if !is_pv
                && data.depth >= depth
                && data.value != VALUE_NONE
                && self.pos.rule50() < 90
            {
                let cutoff = match data.bound {
                    Bound::Exact => true,
                    Bound::Lower => data.value >= beta,
                    Bound::Upper => data.value <= alpha,
                };
                if cutoff {
                    return data.value;
                }
            }
        }

        // ------------------------------------------------------------------
        // Static evaluation, corrected by the eval-residual histories
        // ------------------------------------------------------------------
        let raw_eval;
        let mut eval;
        if in_check {
            raw_eval = VALUE_NONE;
            eval = VALUE_NONE;
            self.stack[ss].static_eval = VALUE_NONE;
        } else if excluded_active {
            // Same node as the enclosing search: reuse its eval.
            raw_eval = self.stack[ss].static_eval;
            eval = raw_eval;
        } else {
            raw_eval = match tt_data {
                Some(data) if data.eval != VALUE_NONE => data.eval,
                _ => self.evaluate(ply),
            };
            eval = (raw_eval + self.correction(ply))
                .clamp(VALUE_MATED_IN_MAX_PLY + 1, VALUE_MATE_IN_MAX_PLY - 1);
            self.stack[ss].static_eval = eval;

            // A TT value is a better guess than the static eval when its
            // bound points the right way.
            if let Some(data) = tt_data {
                if data.value != VALUE_NONE {
                    let usable = match data.bound {
                        Bound::Exact => true,
                        Bound::Lower => data.value > eval,
                        Bound::Upper => data.value < eval,
                    };
                    if usable {
                        eval = data.value;
                    }
                }
            }
        }

        let improving = !in_check
            && self.stack[ss].static_eval != VALUE_NONE
            && (self.stack[ss - 2].static_eval == VALUE_NONE
                || self.stack[ss].static_eval > self.stack[ss - 2].static_eval);

        // ------------------------------------------------------------------
        // Whole-node pruning (non-PV, not in check, no exclusion)
        // ------------------------------------------------------------------
        if !is_pv && !in_check && !excluded_active {
            // Razoring: hopeless static eval drops straight to quiescence.
            if depth <= 4 && eval + 300 + 250 * depth < alpha {
                let v = self.qsearch(false, alpha - 1, alpha, ply, 0);
                if v < alpha && !is_mate_value(v) {
                    return v;
                }
            }

            // Reverse futility: a comfortable margin above beta fails high
            // without searching.
            if depth <= 8
                && eval.abs() < VALUE_MATE_IN_MAX_PLY
                && eval - (90 - 25 * i32::from(improving)) * depth >= beta
            {
                return (eval + beta) / 2;
            }

            // Null move: hand over the move and search reduced. Fails high
            // only if the position is strong even after passing.
            if allow_null
                && eval >= beta
                && self.stack[ss - 1].current_move != Move::NULL
                && beta > VALUE_MATED_IN_MAX_PLY
                && self.pos.non_pawn_material(self.pos.side_to_move()) > 0
            {
                let r = 3 + depth / 3 + ((eval - beta) / 200).min(3);
                let null_depth = depth - r;

                self.stack[ss].current_move = Move::NULL;
                self.stack[ss].piece_to = None;
                self.pos.do_null_move();
                let v = -self.search(
                    false,
                    -beta,
                    -beta + 1,
                    null_depth,
                    !cut_node,
                    ply + 1,
                    Move::NONE,
                    false,
                );
                self.pos.undo_null_move();

                if self.stopped() {
                    return VALUE_DRAW;
                }

                if v >= beta && !is_mate_value(v) {
                    if depth < 14 {
                        return v;
                    }
                    // Zugzwang guard: verify with a reduced real search.
                    let verified = self.search(
                        false,
                        beta - 1,
                        beta,
                        null_depth,
                        false,
                        ply,
                        Move::NONE,
                        false,
                    );
                    if verified >= beta {
                        return v;
                    }
                }
            }

            // ProbCut: a capture clearing a wide margin at reduced depth
            // almost always holds at full depth.
            let probcut_beta = beta + 180 - 60 * i32::from(improving);
            if depth >= 6
                && beta.abs() < VALUE_MATE_IN_MAX_PLY
                && !tt_data.is_some_and(|d| d.depth >= depth - 3 && d.value < probcut_beta)
            {
                if let Some(v) = self.probcut(probcut_beta, depth, ply, tt_move) {
                    return v;
                }
            }
        }

        // Internal iterative reduction: no TT move at high depth means the
        // first pass is mostly for ordering.
        if !excluded_active && !tt_move.is_some() && depth >= 4 && (is_pv || cut_node) {
            depth -= 1;
        }

        // ------------------------------------------------------------------
        // Singular extension scouting
        // ------------------------------------------------------------------
        let mut singular_extension = 0;
        if !is_root
            && !excluded_active
            && depth >= 6
            && tt_move.is_some()
            && tt_data.is_some_and(|d| {
                d.depth >= depth - 3
                    && matches!(d.bound, Bound::Lower | Bound::Exact)
                    && d.value != VALUE_NONE
                    && !is_mate_value(d.value)
            })
        {
            let tt_value = tt_data.map_or(0, |d| d.value);
            let singular_beta = tt_value - 2 * depth;
            let singular_depth = (depth - 1) / 2;

            let v = self.search(
                false,
                singular_beta - 1,
                singular_beta,
                singular_depth,
                cut_node,
                ply,
                tt_move,
                false,
            );
            if self.stopped() {
                return VALUE_DRAW;
            }
            if v < singular_beta {
                singular_extension = 1;
            } else if singular_beta >= beta {
                // Multi-cut: even with the TT move excluded the node
                // fails high.
                return singular_beta;
            }
        }

        // ------------------------------------------------------------------
        // Move loop
        // ------------------------------------------------------------------
        let hist = Arc::clone(&self.histories);
        let mut picker = MovePicker::new(
            &self.pos,
            tt_move,
            depth,
            ply,
            PickerHistories {
                butterfly: &hist.butterfly,
                low_ply: &hist.low_ply,
                capture: &hist.capture,
                pawn: &hist.pawn,
                continuation: &hist.continuation,
                cont_prev: self.cont_prev(ply),
            },
        );

        let mut best_value = -VALUE_INFINITE;
        let mut best_move = Move::NONE;
        let mut move_count = 0u32;
        let mut quiets_tried: Vec<Move> = Vec::with_capacity(32);
        let mut captures_tried: Vec<Move> = Vec::with_capacity(16);
        let mut skipped_quiets = false;

        while let Some(m) = picker.next(&self.pos) {
            if m == excluded {
                continue;
            }
            if is_root && !self.root_moves.iter().any(|rm| rm.mv == m) {
                continue;
            }
            if !self.pos.legal(m) {
                continue;
            }

            move_count += 1;
            let is_capture = self.pos.is_capture_stage(m);
            let gives_check = self.pos.gives_check(m);
            let piece = self.pos.moved_piece(m).expect("legal move has a mover");

            // Shallow-depth move pruning once a real score is on the board.
            if !is_root && best_value > VALUE_MATED_IN_MAX_PLY {
                // Late move pruning: quiet tails of long move lists.
                if !skipped_quiets
                    && move_count as i32 >= (3 + depth * depth) / (2 - i32::from(improving))
                {
                    picker.skip_quiets();
                    skipped_quiets = true;
                }

                if !is_capture && !gives_check {
                    // Futility: quiet moves cannot recover a lost eval.
                    if depth <= 10
                        && !in_check
                        && self.stack[ss].static_eval + 100 + 120 * depth <= alpha
                    {
                        continue;
                    }
                    // Quiet SEE pruning.
                    if depth <= 8 && !self.pos.see_ge(m, -20 * depth * depth) {
                        continue;
                    }
                } else if depth <= 8 && !self.pos.see_ge(m, -185 * depth) {
                    continue;
                }
            }

            let mut extension = 0;
            if m == tt_move && singular_extension > 0 {
                extension = singular_extension;
            } else if gives_check && depth > 6 {
                extension = 1;
            }

            self.stack[ss].current_move = m;
            self.stack[ss].piece_to = Some((piece, m.to()));
            self.pos.do_move(m);
            self.tt.prefetch(self.pos.key());

            let new_depth = depth - 1 + extension;
            let mut v;

            // Late move reductions with the usual verification ladder.
            let do_lmr = depth >= 2
                && move_count > 1 + u32::from(is_root)
                && (!is_capture || cut_node);
            if do_lmr {
                let mut r = reduction(depth, move_count) as i32;
                r += i32::from(cut_node);
                r += i32::from(!improving);
                r -= i32::from(tt_pv);
                r -= i32::from(gives_check);
                r -= i32::from(is_capture);
                r += i32::from(self.stack[ss + 1].cutoff_count > 3);

                let d = (new_depth - r.max(0)).clamp(1, new_depth.max(1));
                v = -self.search(false, -alpha - 1, -alpha, d, true, ply + 1, Move::NONE, true);
                if v > alpha && d < new_depth {
                    v = -self.search(
                        false,
                        -alpha - 1,
                        -alpha,
                        new_depth,
                        !cut_node,
                        ply + 1,
                        Move::NONE,
                        true,
                    );
                }
            } else if !is_pv || move_count > 1 {
                v = -self.search(
                    false,
                    -alpha - 1,
                    -alpha,
                    new_depth,
                    !cut_node,
                    ply + 1,
                    Move::NONE,
                    true,
                );
            } else {
                v = alpha + 1; // force the PV search below
            }

            // Full-window re-search for the PV.
            if is_pv && (move_count == 1 || (v > alpha && (is_root || v < beta))) {
                v = -self.search(
                    true,
                    -beta,
                    -alpha,
                    new_depth,
                    false,
                    ply + 1,
                    Move::NONE,
                    true,
                );
            }

            self.pos.undo_move(m);

            if self.stopped() {
                return VALUE_DRAW;
            }

            if is_root {
                let rm = self
                    .root_moves
                    .iter_mut()
                    .find(|rm| rm.mv == m)
                    .expect("root move exists");
                if move_count == 1 || v > alpha {
                    rm.value = v;
                    rm.sel_depth = self.sel_depth;
                } else {
                    rm.value = -VALUE_INFINITE;
                }
            }

            if v > best_value {
                best_value = v;
                if v > alpha {
                    best_move = m;
                    if v >= beta {
                        self.stack[ss].cutoff_count += 1;
                        break;
                    }
                    alpha = v;
                }
            }

            if m != best_move {
                if is_capture {
                    if captures_tried.len() < 16 {
                        captures_tried.push(m);
                    }
                } else if quiets_tried.len() < 32 {
                    quiets_tried.push(m);
                }
            }
        }

        // ------------------------------------------------------------------
        // Conclusion: mate/stalemate, statistics, TT store
        // ------------------------------------------------------------------
        if move_count == 0 {
            if excluded_active {
                // Everything except the excluded move was illegal: the
                // exclusion search learns nothing here.
                return alpha;
            }
            return if in_check { mated_in(ply) } else { VALUE_DRAW };
        }

        if best_value >= beta {
            self.update_cutoff_stats(best_move, depth, ply, &quiets_tried, &captures_tried);
        }

        let bound = if best_value >= beta {
            Bound::Lower
        } else if is_pv && best_move.is_some() {
            Bound::Exact
        } else {
            Bound::Upper
        };

        if !excluded_active {
            self.tt.store(
                key,
                depth,
                best_value,
                raw_eval,
                bound,
                tt_pv,
                best_move,
                ply,
            );

            // Teach the correction history the residual between static
            // eval and the search outcome, when the outcome is trustworthy.
            if !in_check
                && (!best_move.is_some() || !self.pos.is_capture(best_move))
                && !(bound == Bound::Lower && best_value <= self.stack[ss].static_eval)
                && !(bound == Bound::Upper && best_value >= self.stack[ss].static_eval)
                && self.stack[ss].static_eval != VALUE_NONE
            {
                let diff = best_value - self.stack[ss].static_eval;
                let prev = self.stack[ss - 1].piece_to;
                self.histories.corrections.update(&self.pos, prev, depth, diff);
            }
        }

        best_value
    }

    /// Quiescence: captures, plus quiet checks at the horizon ply
    /// (`depth == 0`), until the position stands still.
    fn qsearch(
        &mut self,
        is_pv: bool,
        mut alpha: Value,
        beta: Value,
        ply: usize,
        depth: i32,
    ) -> Value {
        if self.should_stop() {
            return VALUE_DRAW;
        }

        self.nodes += 1;
        self.sel_depth = self.sel_depth.max(ply as i32 + 1);

        if self.pos.is_draw(ply) {
            return VALUE_DRAW;
        }

        let in_check = self.pos.in_check();
        if ply >= MAX_PLY - 1 {
            return if in_check { VALUE_DRAW } else { self.evaluate(ply) };
        }

        let ss = ply + STACK_OFFSET;
        self.stack[ss].in_check = in_check;

        // Two quiescence depth classes: the check-generating horizon ply
        // and everything below it.
        let tt_depth = if in_check || depth == 0 { 0 } else { -1 };

        let key = self.pos.key();
        let tt_data = self.tt.probe(key, ply);
        if let Some(data) = tt_data {
            if !is_pv && data.depth >= tt_depth && data.value != VALUE_NONE {
                let cutoff = match data.bound {
                    Bound::Exact => true,
                    Bound::Lower => data.value >= beta,
                    Bound::Upper => data.value <= alpha,
                };
                if cutoff {
                    return data.value;
                }
            }
        }
        let tt_move = tt_data.map_or(Move::NONE, |d| d.mv);

        // Stand pat.
        let raw_eval;
        let mut best_value;
        if in_check {
            raw_eval = VALUE_NONE;
            best_value = -VALUE_INFINITE;
            self.stack[ss].static_eval = VALUE_NONE;
        } else {
            raw_eval = match tt_data {
                Some(data) if data.eval != VALUE_NONE => data.eval,
                _ => self.evaluate(ply),
            };
            best_value = (raw_eval + self.correction(ply))
                .clamp(VALUE_MATED_IN_MAX_PLY + 1, VALUE_MATE_IN_MAX_PLY - 1);
            self.stack[ss].static_eval = best_value;

            if best_value >= beta {
                self.tt.store(
                    key,
                    tt_depth,
                    best_value,
                    raw_eval,
                    Bound::Lower,
                    false,
                    Move::NONE,
                    ply,
                );
                return best_value;
            }
            if best_value > alpha {
                alpha = best_value;
            }
        }

        let futility_base = if in_check {
            -VALUE_INFINITE
        } else {
            self.stack[ss].static_eval + 280
        };

        let hist = Arc::clone(&self.histories);
        let mut picker = MovePicker::new(
            &self.pos,
            tt_move,
            depth.min(0),
            ply,
            PickerHistories {
                butterfly: &hist.butterfly,
                low_ply: &hist.low_ply,
                capture: &hist.capture,
                pawn: &hist.pawn,
                continuation: &hist.continuation,
                cont_prev: self.cont_prev(ply),
            },
        );

        let mut best_move = Move::NONE;
        let mut move_count = 0u32;

        while let Some(m) = picker.next(&self.pos) {
            if !self.pos.legal(m) {
                continue;
            }
            move_count += 1;
            let gives_check = self.pos.gives_check(m);
            let is_capture = self.pos.is_capture(m);

            if !in_check && best_value > VALUE_MATED_IN_MAX_PLY {
                // Delta pruning: even winning this piece cannot reach alpha.
                if is_capture && !gives_check && !m.is_promotion() {
                    let captured = if m.is_en_passant() {
                        PieceType::Pawn
                    } else {
                        self.pos
                            .piece_on(m.to())
                            .map_or(PieceType::Pawn, |p| p.piece_type())
                    };
                    if futility_base + crate::types::piece_value(captured) <= alpha {
                        best_value = best_value.max(
                            futility_base + crate::types::piece_value(captured),
                        );
                        continue;
                    }
                }
                // Losing exchanges are not worth resolving here.
                if !self.pos.see_ge(m, -80) {
                    continue;
                }
            }

            let piece = self.pos.moved_piece(m).expect("legal move has a mover");
            self.stack[ss].current_move = m;
            self.stack[ss].piece_to = Some((piece, m.to()));

            self.pos.do_move(m);
            self.tt.prefetch(self.pos.key());
            let v = -self.qsearch(is_pv, -beta, -alpha, ply + 1, depth - 1);
            self.pos.undo_move(m);

            if self.stopped() {
                return VALUE_DRAW;
            }

            if v > best_value {
                best_value = v;
                if v > alpha {
                    best_move = m;
                    if v >= beta {
                        break;
                    }
                    alpha = v;
                }
            }
        }

        if in_check && move_count == 0 {
            return mated_in(ply);
        }

        let bound = if best_value >= beta {
            Bound::Lower
        } else {
            Bound::Upper
        };
        self.tt
            .store(key, tt_depth, best_value, raw_eval, bound, false, best_move, ply);

        best_value
    }

    /// ProbCut driver: returns a proven cutoff value, if any.
    fn probcut(
        &mut self,
        probcut_beta: Value,
        depth: i32,
        ply: usize,
        tt_move: Move,
    ) -> Option<Value> {
        let ss = ply + STACK_OFFSET;
        let threshold = probcut_beta - self.stack[ss].static_eval;

        let hist = Arc::clone(&self.histories);
        let mut picker = MovePicker::probcut(
            &self.pos,
            tt_move,
            threshold,
            PickerHistories {
                butterfly: &hist.butterfly,
                low_ply: &hist.low_ply,
                capture: &hist.capture,
                pawn: &hist.pawn,
                continuation: &hist.continuation,
                cont_prev: self.cont_prev(ply),
            },
        );

        while let Some(m) = picker.next(&self.pos) {
            if !self.pos.legal(m) {
                continue;
            }
            let piece = self.pos.moved_piece(m).expect("legal move has a mover");
            self.stack[ss].current_move = m;
            self.stack[ss].piece_to = Some((piece, m.to()));

            self.pos.do_move(m);

            // Cheap qualification before the real reduced search.
            let mut v = -self.qsearch(false, -probcut_beta, -probcut_beta + 1, ply + 1, 0);
            if v >= probcut_beta && depth - 4 > 0 {
                v = -self.search(
                    false,
                    -probcut_beta,
                    -probcut_beta + 1,
                    depth - 4,
                    false,
                    ply + 1,
                    Move::NONE,
                    true,
                );
            }
            self.pos.undo_move(m);

            if self.stopped() {
                return None;
            }
            if v >= probcut_beta {
                self.tt.store(
                    self.pos.key(),
                    depth - 3,
                    v,
                    self.stack[ss].static_eval,
                    Bound::Lower,
                    false,
                    m,
                    ply,
                );
                return Some(v);
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn evaluate(&mut self, _ply: usize) -> Value {
        nnue::evaluate(&mut self.pos, &self.network, &mut self.cache)
    }

    /// Correction-history adjustment for the current position.
    fn correction(&self, ply: usize) -> Value {
        let prev = self.stack[ply + STACK_OFFSET - 1].piece_to;
        self.histories.corrections.correction(&self.pos, prev)
    }

    /// Prior (piece, to) pairs at the continuation offsets.
    fn cont_prev(&self, ply: usize) -> [Option<(Piece, Square)>; 5] {
        let ss = ply + STACK_OFFSET;
        let mut out = [None; 5];
        for (slot, &off) in out.iter_mut().zip(CONT_HIST_OFFSETS.iter()) {
            *slot = self.stack[ss - off].piece_to;
        }
        out
    }

    /// History bookkeeping after a beta cutoff: reward the cutoff move,
    /// penalize everything tried before it.
    fn update_cutoff_stats(
        &mut self,
        best_move: Move,
        depth: i32,
        ply: usize,
        quiets_tried: &[Move],
        captures_tried: &[Move],
    ) {
        let us = self.pos.side_to_move();
        let bonus = stat_bonus(depth);
        let malus = stat_malus(depth);
        let hist = &self.histories;

        if !self.pos.is_capture(best_move) {
            let piece = self.pos.moved_piece(best_move).expect("mover exists");
            hist.butterfly.update(us, best_move, bonus);
            hist.pawn
                .update(self.pos.pawn_key(), piece, best_move.to(), bonus);
            if ply < LOW_PLY_SIZE {
                hist.low_ply.update(ply, best_move, bonus);
            }
            self.update_continuation(ply, piece, best_move.to(), bonus);

            for &q in quiets_tried {
                let q_piece = self.pos.moved_piece(q).expect("mover exists");
                hist.butterfly.update(us, q, -malus);
                hist.pawn.update(self.pos.pawn_key(), q_piece, q.to(), -malus);
                if ply < LOW_PLY_SIZE {
                    hist.low_ply.update(ply, q, -malus);
                }
                self.update_continuation(ply, q_piece, q.to(), -malus);
            }
        } else {
            let piece = self.pos.moved_piece(best_move).expect("mover exists");
            let captured = if best_move.is_en_passant() {
                PieceType::Pawn
            } else {
                self.pos
                    .piece_on(best_move.to())
                    .map_or(PieceType::Pawn, |p| p.piece_type())
            };
            hist.capture.update(piece, best_move.to(), captured, bonus);
        }

        for &c in captures_tried {
            let c_piece = self.pos.moved_piece(c).expect("mover exists");
            let captured = if c.is_en_passant() {
                PieceType::Pawn
            } else {
                self.pos
                    .piece_on(c.to())
                    .map_or(PieceType::Pawn, |p| p.piece_type())
            };
            hist.capture.update(c_piece, c.to(), captured, -malus);
        }
    }

    fn update_continuation(&self, ply: usize, piece: Piece, to: Square, bonus: i32) {
        let ss = ply + STACK_OFFSET;
        for &off in &CONT_HIST_OFFSETS {
            if let Some(prev) = self.stack[ss - off].piece_to {
                // Fade the signal for the longer-range pairings.
                let scaled = if off <= 2 { bonus } else { bonus / 2 };
                self.histories.continuation.update(prev, piece, to, scaled);
            }
        }
    }

    /// Walk the TT to rebuild the best root line for reporting.
    fn extract_root_pv(&mut self) {
        let best = self.root_moves[0].mv;
        let mut pv = vec![best];
        let mut seen_keys = Vec::with_capacity(MAX_PLY);

        self.pos.do_move(best);
        seen_keys.push(self.pos.key());
        while pv.len() < MAX_PLY / 2 {
            let Some(data) = self.tt.probe(self.pos.key(), pv.len()) else {
                break;
            };
            let m = data.mv;
            if !m.is_some() || !self.pos.pseudo_legal(m) || !self.pos.legal(m) {
                break;
            }
            self.pos.do_move(m);
            if seen_keys.contains(&self.pos.key()) {
                // TT cycles are possible; a repetition ends the line.
                self.pos.undo_move(m);
                break;
            }
            seen_keys.push(self.pos.key());
            pv.push(m);
        }
        for &m in pv.iter().rev() {
            self.pos.undo_move(m);
        }
        self.root_moves[0].pv = pv;
    }

    fn report_full(&self, depth: i32, value: Value, bound: Option<Bound>) {
        let Some(cb) = &self.callbacks.on_update_full else {
            return;
        };
        let time_ms = self.time.elapsed_ms().max(1);
        let nodes =
            self.shared.nodes.load(Ordering::Relaxed) + (self.nodes - self.flushed_nodes);
        cb(&InfoFull {
            depth,
            sel_depth: self.sel_depth,
            value,
            bound,
            time_ms,
            nodes,
            nps: nodes * 1000 / time_ms,
            hashfull: self.tt.hashfull(),
            tb_hits: self.shared.tb_hits.load(Ordering::Relaxed),
            pv: self.root_moves[0].pv.clone(),
        });
    }

    #[inline]
    fn pondering(&self) -> bool {
        self.shared.ponder.load(Ordering::Relaxed)
    }

    #[inline]
    fn stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Relaxed)
    }

    /// Periodic stop check: flushes the node counter and lets the main
    /// worker enforce clocks and node budgets.
    fn should_stop(&mut self) -> bool {
        if self.stopped() {
            return true;
        }
        if self.nodes % CHECK_NODES == 0 && self.nodes > 0 {
            self.flush_nodes();

            if let Some(limit) = self.limits.nodes {
                if self.shared.nodes.load(Ordering::Relaxed) >= limit {
                    self.shared.stop.store(true, Ordering::Relaxed);
                    return true;
                }
            }
            if self.is_main() && !self.pondering() && self.time.hard_limit_reached() {
                self.shared.stop.store(true, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    fn flush_nodes(&mut self) {
        let delta = self.nodes - self.flushed_nodes;
        if delta > 0 {
            self.shared.nodes.fetch_add(delta, Ordering::Relaxed);
            self.flushed_nodes = self.nodes;
        }
    }
}

static REDUCTIONS: OnceLock<[[u8; 64]; 64]> = OnceLock::new();

/// Log-log late move reduction table.
fn reduction(depth: i32, move_count: u32) -> u8 {
    let table = REDUCTIONS.get_or_init(|| {
        let mut t = [[0u8; 64]; 64];
        for (d, row) in t.iter_mut().enumerate().skip(1) {
            for (m, cell) in row.iter_mut().enumerate().skip(1) {
                let r = 0.25 + (d as f64).ln() * (m as f64).ln() / 2.25;
                *cell = r.max(0.0) as u8;
            }
        }
        t
    });
    table[depth.clamp(0, 63) as usize][move_count.min(63) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_worker() -> SearchWorker {
        let tt = Arc::new(TranspositionTable::new(4));
        let histories = Arc::new(SharedHistories::new());
        let network = Arc::new(NnueNetwork::zeroed());
        let shared = Arc::new(WorkerShared::new());
        SearchWorker::new(0, tt, histories, network, shared)
    }

    fn search_fen(worker: &mut SearchWorker, fen: &str, limits: Limits) {
        let pos = Position::from_fen(fen, false).unwrap();
        worker.prepare(pos, limits, TimeManager::unlimited(), SearchCallbacks::default());
        worker.run();
    }

    #[test]
    fn test_finds_mate_in_one() {
        let mut worker = make_worker();
        search_fen(&mut worker, "6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1", Limits::depth(3));
        assert_eq!(worker.root_moves[0].mv.to_uci(false), "a1a8");
        assert_eq!(worker.root_moves[0].value, mate_in(1));
    }

    #[test]
    fn test_finds_short_mate_in_queen_endgame() {
        let mut worker = make_worker();
        search_fen(&mut worker, "6k1/8/6K1/8/8/8/8/Q7 w - - 0 1", Limits::depth(6));
        let value = worker.root_moves[0].value;
        assert!(value >= mate_in(3), "expected a short mate, got {value}");
    }

    #[test]
    fn test_rook_endgame_reports_mate_distance() {
        let mut worker = make_worker();
        search_fen(&mut worker, "7k/8/8/8/8/8/8/R6K w - - 0 1", Limits::depth(5));
        // KR vs K is a forced mate; by depth 5 the score must already be
        // decisively winning even if the mate is not fully proven.
        assert!(worker.root_moves[0].value >= mate_in(11) || worker.completed_depth == 5);
        assert!(worker.root_moves[0].mv.is_some());
    }

    #[test]
    fn test_bare_kings_is_draw() {
        let mut worker = make_worker();
        search_fen(&mut worker, "8/8/8/4k3/8/8/4K3/8 w - - 0 1", Limits::depth(6));
        assert_eq!(worker.root_moves[0].value, VALUE_DRAW);
    }

    #[test]
    fn test_stalemate_root_has_no_moves() {
        let mut worker = make_worker();
        // Black to move, stalemated.
        search_fen(&mut worker, "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", Limits::depth(4));
        assert!(worker.root_moves.is_empty());
    }

    #[test]
    fn test_node_limit_bounds_search() {
        let mut worker = make_worker();
        search_fen(
            &mut worker,
            crate::position::START_FEN,
            Limits::nodes(20_000),
        );
        // Bounded overshoot: one polling interval at most.
        assert!(worker.nodes <= 20_000 + 2 * CHECK_NODES);
        assert!(worker.root_moves[0].mv.is_some());
    }

    #[test]
    fn test_stop_flag_aborts_quickly() {
        let mut worker = make_worker();
        let pos = Position::startpos();
        worker.prepare(
            pos,
            Limits::depth(4),
            TimeManager::unlimited(),
            SearchCallbacks::default(),
        );
        worker.shared.stop.store(true, Ordering::Relaxed);
        worker.run();
        assert_eq!(worker.completed_depth, 0);
    }

    #[test]
    fn test_startpos_best_move_is_sensible() {
        let mut worker = make_worker();
        search_fen(&mut worker, crate::position::START_FEN, Limits::depth(4));
        let best = worker.root_moves[0].mv;
        let pos = Position::startpos();
        assert!(pos.parse_uci_move(&best.to_uci(false)).is_ok());
        assert!(worker.completed_depth == 4);
        // PV starts with the best move.
        assert_eq!(worker.root_moves[0].pv[0], best);
    }

    #[test]
    fn test_deeper_search_does_not_lose_tt_consistency() {
        let mut worker = make_worker();
        search_fen(
            &mut worker,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            Limits::depth(5),
        );
        assert!(worker.completed_depth >= 5);
        // The search must leave the worker's position untouched.
        assert_eq!(
            worker.pos.fen(),
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1"
        );
    }
}
