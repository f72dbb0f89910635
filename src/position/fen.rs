//! FEN input and output, including Shredder-FEN castling files for
//! Chess960.

use super::{FenError, Position};
use crate::types::{
    Bitboard, CastleSide, CastlingRights, Color, Piece, PieceType, Square,
};
use crate::zobrist::ZOBRIST;

impl Position {
    /// Parse a FEN string. The resulting position is validated: exactly one
    /// king per side, no pawns on back ranks, plausible piece counts, and
    /// the side not to move may not be in check.
    pub fn from_fen(fen: &str, chess960: bool) -> Result<Self, FenError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(FenError::TooFewParts {
                found: fields.len(),
            });
        }

        let mut pos = Position::empty();
        pos.chess960 = chess960;

        // Field 1: piece placement, rank 8 first.
        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(FenError::BadRank { rank: 0 });
        }
        for (i, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - i;
            let mut file = 0usize;
            for c in rank_str.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as usize;
                } else {
                    let piece = Piece::from_char(c).ok_or(FenError::InvalidPiece { char: c })?;
                    if file >= 8 {
                        return Err(FenError::BadRank { rank });
                    }
                    pos.put_piece(piece, Square::new(rank, file));
                    file += 1;
                }
            }
            if file != 8 {
                return Err(FenError::BadRank { rank });
            }
        }

        // Field 2: side to move.
        pos.side = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => {
                return Err(FenError::InvalidSideToMove {
                    found: other.to_string(),
                })
            }
        };

        pos.validate_material()?;

        // Field 3: castling rights, either KQkq or Shredder file letters.
        if fields[2] != "-" {
            for c in fields[2].chars() {
                let color = if c.is_ascii_uppercase() {
                    Color::White
                } else {
                    Color::Black
                };
                let rook_sq = match c.to_ascii_lowercase() {
                    'k' => pos.outermost_rook(color, true),
                    'q' => pos.outermost_rook(color, false),
                    file @ 'a'..='h' => {
                        let rank = if color.is_white() { 0 } else { 7 };
                        let sq = Square::new(rank, file as usize - 'a' as usize);
                        (pos.piece_on(sq) == Some(Piece::new(color, PieceType::Rook)))
                            .then_some(sq)
                    }
                    _ => return Err(FenError::InvalidCastling { char: c }),
                };
                let rook_sq = rook_sq.ok_or(FenError::InvalidCastling { char: c })?;
                pos.set_castling_right(color, rook_sq);
            }
        }

        // Field 4: en passant target. Kept only when a capturing pawn
        // actually stands next to it.
        if fields[3] != "-" {
            let sq: Square = fields[3].parse().map_err(|_| FenError::InvalidEnPassant {
                found: fields[3].to_string(),
            })?;
            let expected_rank = if pos.side.is_white() { 5 } else { 2 };
            if sq.rank() != expected_rank {
                return Err(FenError::InvalidEnPassant {
                    found: fields[3].to_string(),
                });
            }
            if pos.ep_capture_possible(sq) {
                pos.st_mut().ep_square = Some(sq);
            }
        }

        // Fields 5-6: halfmove clock and fullmove number (optional).
        let rule50 = fields
            .get(4)
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0);
        let fullmove = fields
            .get(5)
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(1);
        pos.st_mut().rule50 = rule50;
        pos.game_ply =
            (2 * fullmove.saturating_sub(1)) + u32::from(!pos.side.is_white());

        pos.init_state_keys();
        pos.update_check_info();

        // The side that just moved must not have left its king en prise.
        let them = pos.side.opponent();
        let their_ksq = pos.king_square(them);
        if pos.attacked_by(pos.side, their_ksq, pos.occupied()) {
            return Err(FenError::OpponentInCheck);
        }

        Ok(pos)
    }

    fn validate_material(&self) -> Result<(), FenError> {
        for color in [Color::White, Color::Black] {
            let kings = self.colored(color, PieceType::King).count() as usize;
            if kings != 1 {
                return Err(FenError::WrongKingCount {
                    color_white: color.is_white(),
                    count: kings,
                });
            }
            let total = self.pieces_of(color).count() as usize;
            if total > 16 {
                return Err(FenError::TooManyPieces {
                    color_white: color.is_white(),
                    count: total,
                });
            }
        }
        let back_ranks = crate::types::RANK_1 | crate::types::RANK_8;
        if (self.pieces(PieceType::Pawn) & back_ranks).any() {
            return Err(FenError::PawnOnBackRank);
        }
        Ok(())
    }

    fn outermost_rook(&self, color: Color, kingside: bool) -> Option<Square> {
        let rank = if color.is_white() { 0 } else { 7 };
        let king_file = self.king_square(color).file();
        let rooks = self.colored(color, PieceType::Rook) & Bitboard(0xFF << (rank * 8));
        let mut best: Option<Square> = None;
        for sq in rooks {
            if kingside && sq.file() > king_file {
                if best.map_or(true, |b| sq.file() > b.file()) {
                    best = Some(sq);
                }
            } else if !kingside && sq.file() < king_file {
                if best.map_or(true, |b| sq.file() < b.file()) {
                    best = Some(sq);
                }
            }
        }
        best
    }

    /// Register one castling right and precompute its path masks.
    pub(super) fn set_castling_right(&mut self, color: Color, rook_from: Square) {
        let king_from = self.king_square(color);
        let side = if rook_from.index() > king_from.index() {
            CastleSide::King
        } else {
            CastleSide::Queen
        };
        let idx = CastlingRights::right_index(color, side);

        let king_to = self.castle_king_destination(color, rook_from);
        let rook_to = self.castle_rook_destination(color, rook_from);

        self.st_mut().castling_rights.add(color, side);
        self.castling_rook_sq[idx] = Some(rook_from);

        let travel = crate::bitboard::between(king_from, king_to)
            | crate::bitboard::between(rook_from, rook_to)
            | Bitboard::from_square(king_to)
            | Bitboard::from_square(rook_to);
        self.castling_path[idx] = travel
            & !Bitboard::from_square(king_from)
            & !Bitboard::from_square(rook_from);
        self.castling_king_path[idx] = crate::bitboard::between(king_from, king_to);

        let bit = CastlingRights::single(color, side).bits();
        self.rights_mask[king_from.index()] |= bit;
        self.rights_mask[rook_from.index()] |= bit;
    }

    fn ep_capture_possible(&self, ep_sq: Square) -> bool {
        let us = self.side;
        let attackers = crate::bitboard::pawn_attacks(us.opponent(), ep_sq)
            & self.colored(us, PieceType::Pawn);
        if attackers.is_empty() {
            return false;
        }
        // The captured pawn must actually be there and the push square empty.
        let captured_sq = ep_sq.offset(-us.forward());
        self.piece_on(captured_sq) == Some(Piece::new(us.opponent(), PieceType::Pawn))
            && self.piece_on(ep_sq).is_none()
    }

    /// Recompute the whole Zobrist key family from the board. Used at FEN
    /// time and by the make/unmake consistency tests.
    pub(crate) fn init_state_keys(&mut self) {
        let side = self.side;
        let board = self.board;
        let counts = self.piece_counts;
        let ep = self.st().ep_square;
        let rights = self.st().castling_rights;

        let st = self.st_mut();
        st.key = 0;
        st.pawn_key = 0;
        st.minor_key = 0;
        st.non_pawn_key = [0; 2];
        st.material_key = 0;

        for (idx, slot) in board.iter().enumerate() {
            let Some(piece) = slot else { continue };
            let sq = Square::from_index(idx);
            let k = ZOBRIST.piece(*piece, sq);
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

        for piece_idx in 0..Piece::COUNT {
            for n in 0..counts[piece_idx] {
                st.material_key ^= ZOBRIST.material[piece_idx][n as usize];
            }
        }

        if !side.is_white() {
            st.key ^= ZOBRIST.side_to_move;
        }
        st.key ^= ZOBRIST.castling_rights(rights);
        if let Some(sq) = ep {
            st.key ^= ZOBRIST.ep_file(sq.file());
        }
    }

    /// Format the position as a FEN string. Castling uses `KQkq` for
    /// standard chess and Shredder file letters for Chess960.
    #[must_use]
    pub fn fen(&self) -> String {
        let mut out = String::with_capacity(90);

        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.piece_on(Square::new(rank, file)) {
                    Some(piece) => {
                        if empty > 0 {
                            out.push(char::from_digit(empty, 10).unwrap());
                            empty = 0;
                        }
                        out.push(piece.to_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                out.push(char::from_digit(empty, 10).unwrap());
            }
            if rank > 0 {
                out.push('/');
            }
        }

        out.push(' ');
        out.push(if self.side.is_white() { 'w' } else { 'b' });
        out.push(' ');

        let rights = self.castling_rights();
        if rights.is_empty() {
            out.push('-');
        } else {
            for color in [Color::White, Color::Black] {
                for side in [CastleSide::King, CastleSide::Queen] {
                    if !rights.has(color, side) {
                        continue;
                    }
                    let c = if self.chess960 {
                        let rook = self.castling_rook_square(color, side)
                            .expect("right implies rook square");
                        (b'a' + rook.file() as u8) as char
                    } else if matches!(side, CastleSide::King) {
                        'k'
                    } else {
                        'q'
                    };
                    out.push(if color.is_white() {
                        c.to_ascii_uppercase()
                    } else {
                        c
                    });
                }
            }
        }

        out.push(' ');
        match self.ep_square() {
            Some(sq) => out.push_str(&sq.to_string()),
            None => out.push('-'),
        }

        out.push_str(&format!(
            " {} {}",
            self.rule50(),
            1 + (self.game_ply - u32::from(!self.side.is_white())) / 2
        ));
        out
    }
}
