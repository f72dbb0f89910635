//! Applying and retracting moves.
//!
//! `do_move` pushes a fresh `StateInfo`, applies the move to the board while
//! updating every Zobrist key incrementally, records the dirty pieces for
//! the NNUE accumulator, and recomputes the check/pin masks. `undo_move`
//! pops the state and reverses the board surgery using the information the
//! popped state preserved.

use super::{Position, StateInfo};
use crate::bitboard::pawn_attacks;
use crate::nnue::DirtyPieces;
use crate::types::{
    Bitboard, CastlingRights, Move, MoveType, Piece, PieceType, Square,
};
use crate::zobrist::ZOBRIST;

impl Position {
    /// Make a move. The move must be legal.
    pub fn do_move(&mut self, m: Move) {
        debug_assert!(m.is_some());

        let us = self.side;
        let them = us.opponent();
        let from = m.from();
        let to = m.to();

        let parent = self.st();
        let mut st = StateInfo {
            key: parent.key,
            pawn_key: parent.pawn_key,
            minor_key: parent.minor_key,
            non_pawn_key: parent.non_pawn_key,
            material_key: parent.material_key,
            castling_rights: parent.castling_rights,
            rule50: parent.rule50 + 1,
            plies_from_null: parent.plies_from_null + 1,
            ep_square: None,
            captured: None,
            checkers: Bitboard::EMPTY,
            blockers_for_king: [Bitboard::EMPTY; 2],
            pinners: [Bitboard::EMPTY; 2],
            check_squares: [Bitboard::EMPTY; PieceType::COUNT],
            dirty: DirtyPieces::default(),
            accumulator: crate::nnue::Accumulator::default(),
        };

        // The parent's en-passant file leaves the key.
        if let Some(ep) = parent.ep_square {
            st.key ^= ZOBRIST.ep_file(ep.file());
        }

        match m.move_type() {
            MoveType::Castle => {
                // to = rook home square; relocate both pieces.
                let king_to = self.castle_king_destination(us, to);
                let rook_to = self.castle_rook_destination(us, to);
                let king = self.remove_piece(from);
                let rook = self.remove_piece(to);
                self.put_piece(king, king_to);
                self.put_piece(rook, rook_to);
                xor_piece(&mut st, king, from);
                xor_piece(&mut st, king, king_to);
                xor_piece(&mut st, rook, to);
                xor_piece(&mut st, rook, rook_to);
                st.dirty.push(king, Some(from), Some(king_to));
                st.dirty.push(rook, Some(to), Some(rook_to));
            }
            MoveType::EnPassant => {
                let captured_sq = to.offset(-us.forward());
                let captured = self.remove_piece(captured_sq);
                xor_piece(&mut st, captured, captured_sq);
                self.xor_material(&mut st, captured, false);
                st.captured = Some(captured);
                st.rule50 = 0;
                st.dirty.push(captured, Some(captured_sq), None);

                let pawn = self.remove_piece(from);
                self.put_piece(pawn, to);
                xor_piece(&mut st, pawn, from);
                xor_piece(&mut st, pawn, to);
                st.dirty.push(pawn, Some(from), Some(to));
            }
            MoveType::Promotion => {
                if let Some(captured) = self.piece_on(to) {
                    self.remove_piece(to);
                    xor_piece(&mut st, captured, to);
                    self.xor_material(&mut st, captured, false);
                    st.captured = Some(captured);
                    st.dirty.push(captured, Some(to), None);
                }
                let pawn = self.remove_piece(from);
                let promoted = Piece::new(us, m.promotion_piece());
                self.put_piece(promoted, to);
                xor_piece(&mut st, pawn, from);
                xor_piece(&mut st, promoted, to);
                self.xor_material(&mut st, pawn, false);
                self.xor_material(&mut st, promoted, true);
                st.rule50 = 0;
                st.dirty.push(pawn, Some(from), None);
                st.dirty.push(promoted, None, Some(to));
            }
            MoveType::Normal => {
                if let Some(captured) = self.piece_on(to) {
                    self.remove_piece(to);
                    xor_piece(&mut st, captured, to);
                    self.xor_material(&mut st, captured, false);
                    st.captured = Some(captured);
                    st.rule50 = 0;
                    st.dirty.push(captured, Some(to), None);
                }
                let piece = self.remove_piece(from);
                self.put_piece(piece, to);
                xor_piece(&mut st, piece, from);
                xor_piece(&mut st, piece, to);
                st.dirty.push(piece, Some(from), Some(to));

                if piece.piece_type() == PieceType::Pawn {
                    st.rule50 = 0;
                    // Double push: expose the en-passant square only when an
                    // enemy pawn could actually take it.
                    let from_idx = from.index() as i32;
                    let to_idx = to.index() as i32;
                    if (from_idx - to_idx).abs() == 16 {
                        let ep = from.offset(us.forward());
                        if (pawn_attacks(us, ep) & self.colored(them, PieceType::Pawn)).any() {
                            st.ep_square = Some(ep);
                            st.key ^= ZOBRIST.ep_file(ep.file());
                        }
                    }
                }
            }
        }

        // Castling rights touched by either endpoint of the move.
        let touched = self.rights_mask[from.index()] | self.rights_mask[to.index()];
        if st.castling_rights.bits() & touched != 0 {
            st.key ^= ZOBRIST.castling_rights(st.castling_rights);
            st.castling_rights
                .remove_mask(CastlingRights::from_bits(touched));
            st.key ^= ZOBRIST.castling_rights(st.castling_rights);
        }

        st.key ^= ZOBRIST.side_to_move;
        self.side = them;
        self.game_ply += 1;
        self.states.push(st);
        self.update_check_info();
    }

    /// Retract the last move made by `do_move`.
    pub fn undo_move(&mut self, m: Move) {
        let st = self.states.pop().expect("undo without a made move");
        let us = self.side.opponent(); // the side that made the move
        let from = m.from();
        let to = m.to();

        match m.move_type() {
            MoveType::Castle => {
                let king_to = self.castle_king_destination(us, to);
                let rook_to = self.castle_rook_destination(us, to);
                let rook = self.remove_piece(rook_to);
                let king = self.remove_piece(king_to);
                self.put_piece(king, from);
                self.put_piece(rook, to);
            }
            MoveType::EnPassant => {
                let pawn = self.remove_piece(to);
                self.put_piece(pawn, from);
                let captured_sq = to.offset(-us.forward());
                self.put_piece(st.captured.expect("en passant captures a pawn"), captured_sq);
            }
            MoveType::Promotion => {
                self.remove_piece(to);
                self.put_piece(Piece::new(us, PieceType::Pawn), from);
                if let Some(captured) = st.captured {
                    self.put_piece(captured, to);
                }
            }
            MoveType::Normal => {
                let piece = self.remove_piece(to);
                self.put_piece(piece, from);
                if let Some(captured) = st.captured {
                    self.put_piece(captured, to);
                }
            }
        }

        self.side = us;
        self.game_ply -= 1;
    }

    /// Pass the turn. Only valid when not in check.
    pub fn do_null_move(&mut self) {
        debug_assert!(!self.in_check());

        let parent = self.st();
        let mut st = StateInfo {
            key: parent.key ^ ZOBRIST.side_to_move,
            pawn_key: parent.pawn_key,
            minor_key: parent.minor_key,
            non_pawn_key: parent.non_pawn_key,
            material_key: parent.material_key,
            castling_rights: parent.castling_rights,
            rule50: parent.rule50 + 1,
            plies_from_null: 0,
            ep_square: None,
            captured: None,
            checkers: Bitboard::EMPTY,
            blockers_for_king: [Bitboard::EMPTY; 2],
            pinners: [Bitboard::EMPTY; 2],
            check_squares: [Bitboard::EMPTY; PieceType::COUNT],
            dirty: DirtyPieces::default(),
            accumulator: parent.accumulator.clone(),
        };
        if let Some(ep) = parent.ep_square {
            st.key ^= ZOBRIST.ep_file(ep.file());
        }

        self.side = self.side.opponent();
        self.game_ply += 1;
        self.states.push(st);
        self.update_check_info();
    }

    pub fn undo_null_move(&mut self) {
        self.states.pop().expect("undo_null without do_null");
        self.side = self.side.opponent();
        self.game_ply -= 1;
    }
}

/// XOR one piece-square into the key family.
fn xor_piece(st: &mut StateInfo, piece: Piece, sq: Square) {
    let k = ZOBRIST.piece(piece, sq);
    st.key ^= k;
    match piece.piece_type() {
        PieceType::Pawn => st.pawn_key ^= k,
        PieceType::Knight | PieceType::Bishop | PieceType::King => {
            st.minor_key ^= k;
            st.non_pawn_key[piece.color().index()] ^= k;
        }
        PieceType::Rook | PieceType::Queen => {
            st.non_pawn_key[piece.color().index()] ^= k;
        }
    }
}

impl Position {
    /// Update the material key for a piece-count change. `added` tells
    /// whether the count just went up (the board is already updated).
    fn xor_material(&self, st: &mut StateInfo, piece: Piece, added: bool) {
        let count = self.piece_counts[piece.index()] as usize;
        // After an add the new count is `count`; after a removal the old
        // count was `count + 1`. Both XOR the same word.
        let step = if added { count - 1 } else { count };
        st.material_key ^= ZOBRIST.material[piece.index()][step.min(10)];
    }
}

#[cfg(test)]
mod tests {
    use crate::position::{generate, GenType, Position};
    use crate::types::MoveList;

    #[test]
    fn test_do_undo_restores_startpos() {
        let mut pos = Position::startpos();
        let fen_before = pos.fen();
        let key_before = pos.key();

        let mut list = MoveList::new();
        generate(&pos, GenType::Legal, &mut list);
        for &m in &list {
            pos.do_move(m);
            pos.undo_move(m);
            assert_eq!(pos.fen(), fen_before, "board differs after {m}");
            assert_eq!(pos.key(), key_before, "key differs after {m}");
        }
    }

    #[test]
    fn test_incremental_keys_match_recomputed() {
        let mut pos = Position::startpos();
        for uci in ["e2e4", "c7c5", "g1f3", "d7d6", "f1b5", "c8d7", "e1g1"] {
            let m = pos.parse_uci_move(uci).unwrap();
            pos.do_move(m);

            let mut fresh = Position::from_fen(&pos.fen(), false).unwrap();
            fresh.init_state_keys();
            assert_eq!(pos.key(), fresh.key(), "after {uci}");
            assert_eq!(pos.pawn_key(), fresh.pawn_key(), "pawn key after {uci}");
            assert_eq!(pos.minor_key(), fresh.minor_key(), "minor key after {uci}");
            assert_eq!(
                pos.material_key(),
                fresh.material_key(),
                "material key after {uci}"
            );
        }
    }

    #[test]
    fn test_null_move_roundtrip() {
        let mut pos =
            Position::from_fen("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3", false)
                .unwrap();
        let key = pos.key();
        let fen = pos.fen();
        pos.do_null_move();
        assert_ne!(pos.key(), key);
        pos.undo_null_move();
        assert_eq!(pos.key(), key);
        assert_eq!(pos.fen(), fen);
    }

    #[test]
    fn test_castle_roundtrip_and_rights() {
        let mut pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            false,
        )
        .unwrap();
        let fen = pos.fen();
        let m = pos.parse_uci_move("e1g1").unwrap();
        assert!(m.is_castle());
        pos.do_move(m);
        assert!(!pos.castling_rights().has_any(crate::types::Color::White));
        pos.undo_move(m);
        assert_eq!(pos.fen(), fen);
    }

    #[test]
    fn test_en_passant_roundtrip() {
        let mut pos = Position::from_fen(
            "rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3",
            false,
        )
        .unwrap();
        let fen = pos.fen();
        let m = pos.parse_uci_move("e5f6").unwrap();
        assert!(m.is_en_passant());
        pos.do_move(m);
        pos.undo_move(m);
        assert_eq!(pos.fen(), fen);
    }

    #[test]
    fn test_promotion_roundtrip() {
        let mut pos =
            Position::from_fen("n1n5/PPPk4/8/8/8/8/4Kppp/5N1N b - - 0 1", false).unwrap();
        let fen = pos.fen();
        let mut list = MoveList::new();
        generate(&pos, GenType::Legal, &mut list);
        for &m in &list {
            pos.do_move(m);
            pos.undo_move(m);
        }
        assert_eq!(pos.fen(), fen);
    }
}
