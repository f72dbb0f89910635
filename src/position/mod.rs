//! Board state and game rules.
//!
//! `Position` owns the piece placement, the side to move and a stack of
//! `StateInfo` records carrying all per-ply incremental data: Zobrist key
//! family, castling rights, en-passant square, rule-50 counter, check and
//! pin masks, and the NNUE accumulator. `do_move` pushes a state,
//! `undo_move` pops it; nothing else mutates a position.

mod error;
mod fen;
mod make_unmake;
mod movegen;
mod see;


pub use error::{FenError, UciMoveError};
pub use movegen::{generate, GenType};

use crate::bitboard::{self, between};
use crate::nnue::{Accumulator, DirtyPieces};
use crate::types::{
    Bitboard, CastleSide, CastlingRights, Color, Move, MoveList, MoveType, Piece, PieceType,
    Square, Value, PIECE_VALUES,
};

/// Per-ply incremental state. One record per made move, stacked inside the
/// owning `Position`.
#[derive(Clone)]
pub struct StateInfo {
    // Copied from the parent state on do_move, then updated incrementally.
    pub key: u64,
    pub pawn_key: u64,
    pub minor_key: u64,
    pub non_pawn_key: [u64; 2],
    pub material_key: u64,
    pub castling_rights: CastlingRights,
    pub rule50: u32,
    pub plies_from_null: u32,
    pub ep_square: Option<Square>,

    // Recomputed after the move is applied.
    pub captured: Option<Piece>,
    pub checkers: Bitboard,
    pub blockers_for_king: [Bitboard; 2],
    pub pinners: [Bitboard; 2],
    pub check_squares: [Bitboard; PieceType::COUNT],

    // NNUE bookkeeping: what changed relative to the parent, and the lazily
    // maintained accumulator.
    pub dirty: DirtyPieces,
    pub accumulator: Accumulator,
}

impl StateInfo {
    fn root() -> Self {
        StateInfo {
            key: 0,
            pawn_key: 0,
            minor_key: 0,
            non_pawn_key: [0; 2],
            material_key: 0,
            castling_rights: CastlingRights::NONE,
            rule50: 0,
            plies_from_null: 0,
            ep_square: None,
            captured: None,
            checkers: Bitboard::EMPTY,
            blockers_for_king: [Bitboard::EMPTY; 2],
            pinners: [Bitboard::EMPTY; 2],
            check_squares: [Bitboard::EMPTY; PieceType::COUNT],
            dirty: DirtyPieces::default(),
            accumulator: Accumulator::default(),
        }
    }
}

/// A chess position: board, side to move, and the `StateInfo` stack.
#[derive(Clone)]
pub struct Position {
    board: [Option<Piece>; 64],
    by_type: [Bitboard; PieceType::COUNT],
    by_color: [Bitboard; 2],
    piece_counts: [u8; Piece::COUNT],
    side: Color,
    game_ply: u32,
    chess960: bool,

    // Castling geometry, resolved at FEN time so Chess960 arrays work.
    castling_rook_sq: [Option<Square>; 4],
    castling_path: [Bitboard; 4],
    castling_king_path: [Bitboard; 4],
    rights_mask: [u8; 64],

    states: Vec<StateInfo>,
}

/// Standard starting position FEN.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl Position {
    /// The standard starting position.
    #[must_use]
    pub fn startpos() -> Self {
        Position::from_fen(START_FEN, false).expect("startpos FEN is valid")
    }

    fn empty() -> Self {
        let mut states = Vec::with_capacity(crate::types::MAX_PLY + 64);
        states.push(StateInfo::root());
        Position {
            board: [None; 64],
            by_type: [Bitboard::EMPTY; PieceType::COUNT],
            by_color: [Bitboard::EMPTY; 2],
            piece_counts: [0; Piece::COUNT],
            side: Color::White,
            game_ply: 0,
            chess960: false,
            castling_rook_sq: [None; 4],
            castling_path: [Bitboard::EMPTY; 4],
            castling_king_path: [Bitboard::EMPTY; 4],
            rights_mask: [0; 64],
            states,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn side_to_move(&self) -> Color {
        self.side
    }

    #[inline]
    #[must_use]
    pub fn is_chess960(&self) -> bool {
        self.chess960
    }

    #[inline]
    #[must_use]
    pub fn game_ply(&self) -> u32 {
        self.game_ply
    }

    #[inline]
    #[must_use]
    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.board[sq.index()]
    }

    #[inline]
    #[must_use]
    pub fn occupied(&self) -> Bitboard {
        self.by_color[0] | self.by_color[1]
    }

    #[inline]
    #[must_use]
    pub fn pieces_of(&self, color: Color) -> Bitboard {
        self.by_color[color.index()]
    }

    #[inline]
    #[must_use]
    pub fn pieces(&self, pt: PieceType) -> Bitboard {
        self.by_type[pt.index()]
    }

    #[inline]
    #[must_use]
    pub fn pieces2(&self, a: PieceType, b: PieceType) -> Bitboard {
        self.by_type[a.index()] | self.by_type[b.index()]
    }

    #[inline]
    #[must_use]
    pub fn colored(&self, color: Color, pt: PieceType) -> Bitboard {
        self.by_color[color.index()] & self.by_type[pt.index()]
    }

    #[inline]
    #[must_use]
    pub fn count(&self, piece: Piece) -> u32 {
        u32::from(self.piece_counts[piece.index()])
    }

    #[inline]
    #[must_use]
    pub fn king_square(&self, color: Color) -> Square {
        self.colored(color, PieceType::King)
            .lsb()
            .expect("position always has both kings")
    }

    #[inline]
    pub(crate) fn st(&self) -> &StateInfo {
        self.states.last().expect("state stack is never empty")
    }

    #[inline]
    pub(crate) fn st_mut(&mut self) -> &mut StateInfo {
        self.states.last_mut().expect("state stack is never empty")
    }

    #[inline]
    pub(crate) fn state_stack(&self) -> &[StateInfo] {
        &self.states
    }

    #[inline]
    pub(crate) fn state_stack_mut(&mut self) -> &mut [StateInfo] {
        &mut self.states
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> u64 {
        self.st().key
    }

    #[inline]
    #[must_use]
    pub fn pawn_key(&self) -> u64 {
        self.st().pawn_key
    }

    #[inline]
    #[must_use]
    pub fn minor_key(&self) -> u64 {
        self.st().minor_key
    }

    #[inline]
    #[must_use]
    pub fn non_pawn_key(&self, color: Color) -> u64 {
        self.st().non_pawn_key[color.index()]
    }

    #[inline]
    #[must_use]
    pub fn material_key(&self) -> u64 {
        self.st().material_key
    }

    #[inline]
    #[must_use]
    pub fn castling_rights(&self) -> CastlingRights {
        self.st().castling_rights
    }

    #[inline]
    #[must_use]
    pub fn ep_square(&self) -> Option<Square> {
        self.st().ep_square
    }

    #[inline]
    #[must_use]
    pub fn rule50(&self) -> u32 {
        self.st().rule50
    }

    /// Pieces giving check to the side to move.
    #[inline]
    #[must_use]
    pub fn checkers(&self) -> Bitboard {
        self.st().checkers
    }

    #[inline]
    #[must_use]
    pub fn in_check(&self) -> bool {
        self.st().checkers.any()
    }

    #[inline]
    #[must_use]
    pub fn blockers_for_king(&self, color: Color) -> Bitboard {
        self.st().blockers_for_king[color.index()]
    }

    /// Squares from which a piece of the given type (of the side to move)
    /// would deliver check.
    #[inline]
    #[must_use]
    pub fn check_squares(&self, pt: PieceType) -> Bitboard {
        self.st().check_squares[pt.index()]
    }

    /// Rook home square for a castling right, if the right exists.
    #[inline]
    #[must_use]
    pub fn castling_rook_square(&self, color: Color, side: CastleSide) -> Option<Square> {
        self.castling_rook_sq[CastlingRights::right_index(color, side)]
    }

    #[inline]
    pub(crate) fn castling_blocked(&self, color: Color, side: CastleSide) -> bool {
        let idx = CastlingRights::right_index(color, side);
        (self.castling_path[idx] & self.occupied()).any()
    }

    #[inline]
    pub(crate) fn castling_king_path(&self, color: Color, side: CastleSide) -> Bitboard {
        self.castling_king_path[CastlingRights::right_index(color, side)]
    }

    /// Non-pawn material value for one side; drives null-move gating and
    /// the NNUE output scaling phase.
    #[must_use]
    pub fn non_pawn_material(&self, color: Color) -> Value {
        let mut total = 0;
        for pt in [
            PieceType::Knight,
            PieceType::Bishop,
            PieceType::Rook,
            PieceType::Queen,
        ] {
            total += PIECE_VALUES[pt.index()] * self.colored(color, pt).count() as Value;
        }
        total
    }

    // ------------------------------------------------------------------
    // Attack queries
    // ------------------------------------------------------------------

    /// All pieces of both colors attacking `sq` under the given occupancy.
    #[must_use]
    pub fn attackers_to(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        (bitboard::pawn_attacks(Color::Black, sq) & self.colored(Color::White, PieceType::Pawn))
            | (bitboard::pawn_attacks(Color::White, sq)
                & self.colored(Color::Black, PieceType::Pawn))
            | (bitboard::knight_attacks(sq) & self.pieces(PieceType::Knight))
            | (bitboard::bishop_attacks(sq, occupied)
                & self.pieces2(PieceType::Bishop, PieceType::Queen))
            | (bitboard::rook_attacks(sq, occupied)
                & self.pieces2(PieceType::Rook, PieceType::Queen))
            | (bitboard::king_attacks(sq) & self.pieces(PieceType::King))
    }

    /// True when `sq` is attacked by any piece of `by`.
    #[must_use]
    pub fn attacked_by(&self, by: Color, sq: Square, occupied: Bitboard) -> bool {
        (self.attackers_to(sq, occupied) & self.pieces_of(by)).any()
    }

    /// Sliders of `sliders` that would attack `sq` if blockers were
    /// removed; returns the blocker set and the attacking sliders
    /// (pinners when the blocker belongs to the king's side).
    #[must_use]
    pub fn slider_blockers(&self, sliders: Bitboard, sq: Square) -> (Bitboard, Bitboard) {
        let mut blockers = Bitboard::EMPTY;
        let mut pinners = Bitboard::EMPTY;

        let snipers = ((bitboard::rook_attacks(sq, Bitboard::EMPTY)
            & self.pieces2(PieceType::Rook, PieceType::Queen))
            | (bitboard::bishop_attacks(sq, Bitboard::EMPTY)
                & self.pieces2(PieceType::Bishop, PieceType::Queen)))
            & sliders;
        let occupancy = self.occupied() ^ snipers;

        for sniper in snipers {
            let b = between(sq, sniper) & occupancy & !Bitboard::from_square(sniper);
            if b.any() && !b.more_than_one() {
                blockers |= b;
                if (b & self.pieces_of(self.piece_on(sq).map_or(self.side, Piece::color))).any() {
                    pinners.set(sniper);
                }
            }
        }
        (blockers, pinners)
    }

    /// Recompute checkers, pin and check-square masks for the current
    /// state. Called at the end of make/unmake and FEN setup.
    pub(crate) fn update_check_info(&mut self) {
        let us = self.side;
        let them = us.opponent();
        let our_ksq = self.king_square(us);
        let their_ksq = self.king_square(them);
        let occupied = self.occupied();

        let checkers = self.attackers_to(our_ksq, occupied) & self.pieces_of(them);

        let (white_blockers, black_pinners) = self.slider_blockers(
            self.pieces_of(Color::Black),
            self.king_square(Color::White),
        );
        let (black_blockers, white_pinners) = self.slider_blockers(
            self.pieces_of(Color::White),
            self.king_square(Color::Black),
        );

        let mut check_squares = [Bitboard::EMPTY; PieceType::COUNT];
        check_squares[PieceType::Pawn.index()] = bitboard::pawn_attacks(them, their_ksq);
        check_squares[PieceType::Knight.index()] = bitboard::knight_attacks(their_ksq);
        check_squares[PieceType::Bishop.index()] = bitboard::bishop_attacks(their_ksq, occupied);
        check_squares[PieceType::Rook.index()] = bitboard::rook_attacks(their_ksq, occupied);
        check_squares[PieceType::Queen.index()] = check_squares[PieceType::Bishop.index()]
            | check_squares[PieceType::Rook.index()];

        let st = self.st_mut();
        st.checkers = checkers;
        st.blockers_for_king = [white_blockers, black_blockers];
        st.pinners = [white_pinners, black_pinners];
        st.check_squares = check_squares;
    }

    // ------------------------------------------------------------------
    // Move properties
    // ------------------------------------------------------------------

    /// The piece sitting on the from-square of a move.
    #[inline]
    #[must_use]
    pub fn moved_piece(&self, m: Move) -> Option<Piece> {
        self.piece_on(m.from())
    }

    /// Captures include en passant; castling never captures.
    #[inline]
    #[must_use]
    pub fn is_capture(&self, m: Move) -> bool {
        match m.move_type() {
            MoveType::Castle => false,
            MoveType::EnPassant => true,
            _ => self.piece_on(m.to()).is_some(),
        }
    }

    /// Captures and queen promotions: the moves the capture stages of the
    /// move picker deal in.
    #[inline]
    #[must_use]
    pub fn is_capture_stage(&self, m: Move) -> bool {
        self.is_capture(m) || (m.is_promotion() && m.promotion_piece() == PieceType::Queen)
    }

    /// Full legality for a pseudo-legal move: king safety, en-passant
    /// discovered checks, and absolute pins.
    #[must_use]
    pub fn legal(&self, m: Move) -> bool {
        let us = self.side;
        let them = us.opponent();
        let from = m.from();
        let ksq = self.king_square(us);

        match m.move_type() {
            MoveType::EnPassant => {
                // Replay the capture on a scratch occupancy and look for
                // sliders on the newly opened lines.
                let to = m.to();
                let captured_sq = to.offset(-us.forward());
                let occupied = (self.occupied()
                    ^ Bitboard::from_square(from)
                    ^ Bitboard::from_square(captured_sq))
                    | Bitboard::from_square(to);
                let enemy_rooks = self.pieces2(PieceType::Rook, PieceType::Queen)
                    & self.pieces_of(them);
                let enemy_bishops = self.pieces2(PieceType::Bishop, PieceType::Queen)
                    & self.pieces_of(them);
                (bitboard::rook_attacks(ksq, occupied) & enemy_rooks).is_empty()
                    && (bitboard::bishop_attacks(ksq, occupied) & enemy_bishops).is_empty()
            }
            MoveType::Castle => {
                // King path already verified attack-free during generation;
                // in Chess960 the rook may additionally be pinned against
                // the king.
                !self.chess960 || !self.blockers_for_king(us).contains(m.to())
            }
            _ if from == ksq => {
                // King moves: destination must not be attacked with the
                // king lifted off the board (slider rays pass through it).
                let occupied = self.occupied() ^ Bitboard::from_square(from);
                (self.attackers_to(m.to(), occupied) & self.pieces_of(them)).is_empty()
            }
            _ => {
                // A pinned piece may only move along the pin line.
                !self.blockers_for_king(us).contains(from)
                    || bitboard::aligned(from, m.to(), ksq)
            }
        }
    }

    /// Cheap sanity test for moves coming from the TT or the caller:
    /// does this move make structural sense in the current position?
    #[must_use]
    pub fn pseudo_legal(&self, m: Move) -> bool {
        if !m.is_some() {
            return false;
        }
        let mut list = MoveList::new();
        if self.in_check() {
            generate(self, GenType::Evasions, &mut list);
        } else {
            generate(self, GenType::NonEvasions, &mut list);
        }
        list.contains(m)
    }

    /// Does the move give check? Uses the precomputed check squares for
    /// direct checks and the pin masks for discovered ones; special move
    /// kinds recompute on a scratch occupancy.
    #[must_use]
    pub fn gives_check(&self, m: Move) -> bool {
        let us = self.side;
        let them = us.opponent();
        let from = m.from();
        let to = m.to();
        let their_ksq = self.king_square(them);
        let Some(piece) = self.piece_on(from) else {
            return false;
        };

        // Direct check from the destination square.
        if m.move_type() != MoveType::Castle
            && self.check_squares(piece.piece_type()).contains(to)
        {
            return true;
        }

        // Discovered check: the mover was blocking an enemy-king ray and
        // steps off the line.
        if self.blockers_for_king(them).contains(from) && !bitboard::aligned(from, to, their_ksq) {
            return true;
        }

        match m.move_type() {
            MoveType::Promotion => {
                let occupied = self.occupied() ^ Bitboard::from_square(from);
                bitboard::attacks(m.promotion_piece(), to, occupied).contains(their_ksq)
            }
            MoveType::EnPassant => {
                let captured_sq = to.offset(-us.forward());
                let occupied = (self.occupied()
                    ^ Bitboard::from_square(from)
                    ^ Bitboard::from_square(captured_sq))
                    | Bitboard::from_square(to);
                (self.attackers_to(their_ksq, occupied) & self.pieces_of(us)).any()
            }
            MoveType::Castle => {
                let rook_to = self.castle_rook_destination(us, to);
                bitboard::rook_attacks(rook_to, self.occupied()).contains(their_ksq)
            }
            MoveType::Normal => false,
        }
    }

    /// King and rook destination squares for a castle move (`to` holds the
    /// rook's home square in our encoding).
    #[inline]
    pub(crate) fn castle_king_destination(&self, color: Color, rook_from: Square) -> Square {
        let kingside = rook_from.index() > self.king_square(color).index();
        let rank = if color.is_white() { 0 } else { 7 };
        Square::new(rank, if kingside { 6 } else { 2 })
    }

    #[inline]
    pub(crate) fn castle_rook_destination(&self, color: Color, rook_from: Square) -> Square {
        let kingside = rook_from.index() > self.king_square(color).index();
        let rank = if color.is_white() { 0 } else { 7 };
        Square::new(rank, if kingside { 5 } else { 3 })
    }

    // ------------------------------------------------------------------
    // Draw detection
    // ------------------------------------------------------------------

    /// Draw by the fifty-move rule or by repetition. `ply` is the distance
    /// from the search root: repetitions inside the search stem count as
    /// draws at the second occurrence, repetitions against the game prefix
    /// need a third.
    #[must_use]
    pub fn is_draw(&self, ply: usize) -> bool {
        let st = self.st();
        if st.rule50 >= 100 && (st.checkers.is_empty() || self.has_legal_move()) {
            return true;
        }
        self.is_repetition(ply)
    }

    fn is_repetition(&self, ply: usize) -> bool {
        let st = self.st();
        let horizon = st.rule50.min(st.plies_from_null) as usize;
        if horizon < 4 {
            return false;
        }
        let cur = self.states.len() - 1;
        let mut count = 0;
        let mut back = 4;
        while back <= horizon && back <= cur {
            if self.states[cur - back].key == st.key {
                if back <= ply {
                    return true;
                }
                count += 1;
                if count >= 2 {
                    return true;
                }
            }
            back += 2;
        }
        false
    }

    #[must_use]
    pub fn has_legal_move(&self) -> bool {
        let mut list = MoveList::new();
        generate(self, GenType::Legal, &mut list);
        !list.is_empty()
    }

    // ------------------------------------------------------------------
    // UCI move interchange
    // ------------------------------------------------------------------

    /// Resolve a UCI move string against the legal moves of this position.
    pub fn parse_uci_move(&self, s: &str) -> Result<Move, UciMoveError> {
        if !(4..=5).contains(&s.len()) {
            return Err(UciMoveError::InvalidLength { len: s.len() });
        }
        if !s.is_ascii()
            || s[0..2].parse::<Square>().is_err()
            || s[2..4].parse::<Square>().is_err()
        {
            return Err(UciMoveError::InvalidSquare {
                notation: s.to_string(),
            });
        }
        if s.len() == 5 {
            let suffix = s.as_bytes()[4] as char;
            if !"nbrq".contains(suffix) {
                return Err(UciMoveError::InvalidPromotion { char: suffix });
            }
        }

        let mut list = MoveList::new();
        generate(self, GenType::Legal, &mut list);
        for &m in &list {
            if m.to_uci(self.chess960) == s || m.to_uci(!self.chess960) == s {
                return Ok(m);
            }
        }
        Err(UciMoveError::IllegalMove {
            notation: s.to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Board surgery shared by make/unmake and FEN setup
    // ------------------------------------------------------------------

    #[inline]
    pub(crate) fn put_piece(&mut self, piece: Piece, sq: Square) {
        debug_assert!(self.board[sq.index()].is_none());
        self.board[sq.index()] = Some(piece);
        self.by_type[piece.piece_type().index()].set(sq);
        self.by_color[piece.color().index()].set(sq);
        self.piece_counts[piece.index()] += 1;
    }

    #[inline]
    pub(crate) fn remove_piece(&mut self, sq: Square) -> Piece {
        let piece = self.board[sq.index()].take().expect("remove from empty square");
        self.by_type[piece.piece_type().index()].clear(sq);
        self.by_color[piece.color().index()].clear(sq);
        self.piece_counts[piece.index()] -= 1;
        piece
    }
}

impl std::fmt::Debug for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Position {{ fen: \"{}\" }}", self.fen())
    }
}
