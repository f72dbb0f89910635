//! Static exchange evaluation.
//!
//! `see_ge` answers whether initiating the exchange on a move's target
//! square nets at least `threshold` centipawns assuming both sides keep
//! recapturing with their least valuable attacker. The swap runs on a
//! scratch occupancy so x-ray attackers behind the pieces already traded
//! enter the battery as they are uncovered.

use super::Position;
use crate::bitboard::{bishop_attacks, rook_attacks};
use crate::types::{piece_value, Bitboard, Move, MoveType, PieceType, Value};

impl Position {
    /// True when the static exchange started by `m` is worth at least
    /// `threshold`. Castling, promotion and en passant are approximated as
    /// value zero exchanges.
    #[must_use]
    pub fn see_ge(&self, m: Move, threshold: Value) -> bool {
        if m.move_type() != MoveType::Normal {
            return 0 >= threshold;
        }

        let from = m.from();
        let to = m.to();

        // Winning the target piece outright might already be too little.
        let mut swap = self.piece_on(to).map_or(0, |p| piece_value(p.piece_type())) - threshold;
        if swap < 0 {
            return false;
        }

        // And losing the mover to the first recapture might still be enough.
        let mover = match self.piece_on(from) {
            Some(p) => p.piece_type(),
            None => return false,
        };
        swap = piece_value(mover) - swap;
        if swap <= 0 {
            return true;
        }

        let mut occupied =
            self.occupied() ^ Bitboard::from_square(from) ^ Bitboard::from_square(to);
        let mut stm = self.side_to_move();
        let mut attackers = self.attackers_to(to, occupied);
        let mut result = true;

        loop {
            stm = stm.opponent();
            attackers &= occupied;

            let stm_attackers = attackers & self.pieces_of(stm);
            if stm_attackers.is_empty() {
                break;
            }

            result = !result;

            // Pick the least valuable attacker and put it on the square.
            // Diagonal movers may reveal bishops/queens behind them,
            // orthogonal movers rooks/queens.
            let (pt, from_bb) = self.least_valuable(stm_attackers);
            swap = piece_value(pt) - swap;
            if swap < i32::from(result) {
                break;
            }
            occupied ^= from_bb;
            match pt {
                PieceType::Pawn | PieceType::Bishop => {
                    attackers |= bishop_attacks(to, occupied)
                        & self.pieces2(PieceType::Bishop, PieceType::Queen);
                }
                PieceType::Rook => {
                    attackers |= rook_attacks(to, occupied)
                        & self.pieces2(PieceType::Rook, PieceType::Queen);
                }
                PieceType::Queen => {
                    attackers |= (bishop_attacks(to, occupied)
                        & self.pieces2(PieceType::Bishop, PieceType::Queen))
                        | (rook_attacks(to, occupied)
                            & self.pieces2(PieceType::Rook, PieceType::Queen));
                }
                PieceType::King => {
                    // The king recaptures only when the opponent has no
                    // attacker left to answer with.
                    if (attackers & self.pieces_of(stm.opponent()) & occupied).any() {
                        result = !result;
                    }
                    break;
                }
                PieceType::Knight => {}
            }
        }

        result
    }

    /// Least valuable piece type among `set`, with a one-square bitboard
    /// locating it.
    fn least_valuable(&self, set: Bitboard) -> (PieceType, Bitboard) {
        for pt in PieceType::ALL {
            let subset = set & self.pieces(pt);
            if let Some(sq) = subset.lsb() {
                return (pt, Bitboard::from_square(sq));
            }
        }
        unreachable!("least_valuable called with an empty attacker set")
    }
}
