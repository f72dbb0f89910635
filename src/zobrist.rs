//! Zobrist hashing for chess positions.
//!
//! Independent random words per board feature, XOR-combined into the
//! position key and the derived keys (pawn, minor-piece, non-pawn,
//! material) used for TT indexing, repetition detection and the
//! correction-history buckets.

use once_cell::sync::Lazy;
use rand::prelude::*;

use crate::types::{CastlingRights, Piece, Square};

pub struct ZobristKeys {
    /// `piece_square[piece][square]`
    pub piece_square: [[u64; 64]; Piece::COUNT],
    pub side_to_move: u64,
    /// One word per castling-rights bitmap value.
    pub castling: [u64; 16],
    /// Only the file of the en-passant square matters.
    pub en_passant_file: [u64; 8],
    /// `material[piece][count]`, XOR-ed per piece-count step.
    pub material: [[u64; 11]; Piece::COUNT],
}

impl ZobristKeys {
    fn new() -> Self {
        // Fixed seed: keys must be identical across runs and threads.
        let mut rng = StdRng::seed_from_u64(0x0C0B_1ED8_25F7_64D3);

        let mut piece_square = [[0u64; 64]; Piece::COUNT];
        for square_keys in &mut piece_square {
            for key in square_keys.iter_mut() {
                *key = rng.gen();
            }
        }

        let side_to_move = rng.gen();

        let mut castling = [0u64; 16];
        for key in &mut castling[1..] {
            *key = rng.gen();
        }

        let mut en_passant_file = [0u64; 8];
        for key in &mut en_passant_file {
            *key = rng.gen();
        }

        let mut material = [[0u64; 11]; Piece::COUNT];
        for count_keys in &mut material {
            for key in count_keys.iter_mut() {
                *key = rng.gen();
            }
        }

        ZobristKeys {
            piece_square,
            side_to_move,
            castling,
            en_passant_file,
            material,
        }
    }

    #[inline]
    #[must_use]
    pub fn piece(&self, piece: Piece, sq: Square) -> u64 {
        self.piece_square[piece.index()][sq.index()]
    }

    #[inline]
    #[must_use]
    pub fn castling_rights(&self, rights: CastlingRights) -> u64 {
        self.castling[rights.bits() as usize]
    }

    #[inline]
    #[must_use]
    pub fn ep_file(&self, file: usize) -> u64 {
        self.en_passant_file[file]
    }
}

pub static ZOBRIST: Lazy<ZobristKeys> = Lazy::new(ZobristKeys::new);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, PieceType};

    #[test]
    fn test_keys_are_stable() {
        let a = ZobristKeys::new();
        let b = ZobristKeys::new();
        assert_eq!(a.side_to_move, b.side_to_move);
        assert_eq!(a.piece_square[3][17], b.piece_square[3][17]);
    }

    #[test]
    fn test_keys_are_distinct() {
        let keys = &*ZOBRIST;
        let wp = Piece::new(Color::White, PieceType::Pawn);
        let bp = Piece::new(Color::Black, PieceType::Pawn);
        assert_ne!(keys.piece(wp, Square::E1), keys.piece(bp, Square::E1));
        assert_ne!(keys.piece(wp, Square::E1), keys.piece(wp, Square::E8));
        assert_ne!(keys.ep_file(0), keys.ep_file(7));
    }

    #[test]
    fn test_empty_castling_key_is_zero() {
        // XOR-ing in "no rights" must be a no-op.
        assert_eq!(ZOBRIST.castling_rights(CastlingRights::NONE), 0);
    }
}
