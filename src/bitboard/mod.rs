//! Precomputed attack tables.
//!
//! Leaper attacks (pawn, knight, king) are direct per-square lookups.
//! Sliding attacks (bishop, rook, queen) use magic bitboards: for each
//! square a relevant-blocker mask, a magic multiplier and a shift hash the
//! occupancy into a slice of a single flat attack array. Magics are found
//! once at startup by a seeded random search verified over every blocker
//! subset.

mod magics;

use once_cell::sync::Lazy;

use crate::types::{Bitboard, Color, Direction, PieceType, Square};

pub use magics::SliderAttacks;

/// Pawn capture targets, indexed `[color][square]`.
static PAWN_ATTACKS: Lazy<[[Bitboard; 64]; 2]> = Lazy::new(|| {
    let mut table = [[Bitboard::EMPTY; 64]; 2];
    for sq in Square::all() {
        let bb = Bitboard::from_square(sq);
        table[Color::White.index()][sq.index()] =
            bb.shift(Direction::NorthEast) | bb.shift(Direction::NorthWest);
        table[Color::Black.index()][sq.index()] =
            bb.shift(Direction::SouthEast) | bb.shift(Direction::SouthWest);
    }
    table
});

static KNIGHT_ATTACKS: Lazy<[Bitboard; 64]> = Lazy::new(|| {
    let mut table = [Bitboard::EMPTY; 64];
    let jumps: [(i32, i32); 8] = [
        (1, 2),
        (2, 1),
        (2, -1),
        (1, -2),
        (-1, -2),
        (-2, -1),
        (-2, 1),
        (-1, 2),
    ];
    for sq in Square::all() {
        let mut attacks = Bitboard::EMPTY;
        for (dr, df) in jumps {
            let rank = sq.rank() as i32 + dr;
            let file = sq.file() as i32 + df;
            if (0..8).contains(&rank) && (0..8).contains(&file) {
                attacks.set(Square::new(rank as usize, file as usize));
            }
        }
        table[sq.index()] = attacks;
    }
    table
});

static KING_ATTACKS: Lazy<[Bitboard; 64]> = Lazy::new(|| {
    let mut table = [Bitboard::EMPTY; 64];
    for sq in Square::all() {
        let bb = Bitboard::from_square(sq);
        let horizontal = bb | bb.shift(Direction::East) | bb.shift(Direction::West);
        table[sq.index()] =
            (horizontal | horizontal.shift(Direction::North) | horizontal.shift(Direction::South))
                ^ bb;
    }
    table
});

/// Shared rook and bishop magic tables.
static SLIDERS: Lazy<SliderAttacks> = Lazy::new(SliderAttacks::init);

/// Squares strictly between two squares on a shared line, plus the second
/// square itself. For unaligned pairs (knight checks) only the second
/// square is set, so `between(ksq, checker)` always covers both blocking
/// and capturing the checker.
static BETWEEN: Lazy<Box<[[Bitboard; 64]; 64]>> = Lazy::new(|| {
    let mut table = Box::new([[Bitboard::EMPTY; 64]; 64]);
    for a in Square::all() {
        for b in Square::all() {
            if a == b {
                continue;
            }
            table[a.index()][b.index()] = Bitboard::from_square(b);
            for bishop in [false, true] {
                let ray = slider_ray(a, bishop);
                if ray.contains(b) {
                    let span = slider_attacks_for(a, Bitboard::from_square(b), bishop)
                        & slider_attacks_for(b, Bitboard::from_square(a), bishop);
                    table[a.index()][b.index()] = span | Bitboard::from_square(b);
                }
            }
        }
    }
    table
});

/// The full line through two aligned squares (both endpoints included);
/// empty otherwise.
static LINE: Lazy<Box<[[Bitboard; 64]; 64]>> = Lazy::new(|| {
    let mut table = Box::new([[Bitboard::EMPTY; 64]; 64]);
    for a in Square::all() {
        for b in Square::all() {
            if a == b {
                continue;
            }
            for bishop in [false, true] {
                let ray = slider_ray(a, bishop);
                if ray.contains(b) {
                    table[a.index()][b.index()] = (ray & slider_ray(b, bishop))
                        | Bitboard::from_square(a)
                        | Bitboard::from_square(b);
                }
            }
        }
    }
    table
});

fn slider_ray(sq: Square, bishop: bool) -> Bitboard {
    slider_attacks_for(sq, Bitboard::EMPTY, bishop)
}

fn slider_attacks_for(sq: Square, occupied: Bitboard, bishop: bool) -> Bitboard {
    if bishop {
        magics::bishop_attacks_slow(sq, occupied)
    } else {
        magics::rook_attacks_slow(sq, occupied)
    }
}

/// Force all lazy tables to build. Called once from engine construction so
/// the first search does not pay the initialization cost.
pub fn init() {
    Lazy::force(&PAWN_ATTACKS);
    Lazy::force(&KNIGHT_ATTACKS);
    Lazy::force(&KING_ATTACKS);
    Lazy::force(&SLIDERS);
    Lazy::force(&BETWEEN);
    Lazy::force(&LINE);
}

#[inline]
#[must_use]
pub fn pawn_attacks(color: Color, sq: Square) -> Bitboard {
    PAWN_ATTACKS[color.index()][sq.index()]
}

#[inline]
#[must_use]
pub fn knight_attacks(sq: Square) -> Bitboard {
    KNIGHT_ATTACKS[sq.index()]
}

#[inline]
#[must_use]
pub fn king_attacks(sq: Square) -> Bitboard {
    KING_ATTACKS[sq.index()]
}

#[inline]
#[must_use]
pub fn bishop_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    SLIDERS.bishop(sq, occupied)
}

#[inline]
#[must_use]
pub fn rook_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    SLIDERS.rook(sq, occupied)
}

#[inline]
#[must_use]
pub fn queen_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    SLIDERS.bishop(sq, occupied) | SLIDERS.rook(sq, occupied)
}

/// Attacks of a piece type from a square, pawns excluded (their attacks are
/// color-dependent).
#[inline]
#[must_use]
pub fn attacks(pt: PieceType, sq: Square, occupied: Bitboard) -> Bitboard {
    match pt {
        PieceType::Knight => knight_attacks(sq),
        PieceType::Bishop => bishop_attacks(sq, occupied),
        PieceType::Rook => rook_attacks(sq, occupied),
        PieceType::Queen => queen_attacks(sq, occupied),
        PieceType::King => king_attacks(sq),
        PieceType::Pawn => Bitboard::EMPTY,
    }
}

/// Squares between `from` and `to` (exclusive of `from`, inclusive of `to`);
/// empty when not aligned.
#[inline]
#[must_use]
pub fn between(from: Square, to: Square) -> Bitboard {
    BETWEEN[from.index()][to.index()]
}

/// The full line through two squares, or empty when not aligned.
#[inline]
#[must_use]
pub fn line(a: Square, b: Square) -> Bitboard {
    LINE[a.index()][b.index()]
}

/// True when three squares lie on one rank, file or diagonal.
#[inline]
#[must_use]
pub fn aligned(a: Square, b: Square, c: Square) -> bool {
    line(a, b).contains(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knight_attacks_center_and_corner() {
        let e4 = Square::new(3, 4);
        assert_eq!(knight_attacks(e4).count(), 8);
        let a1 = Square::A1;
        assert_eq!(knight_attacks(a1).count(), 2);
    }

    #[test]
    fn test_king_attacks_counts() {
        assert_eq!(king_attacks(Square::A1).count(), 3);
        assert_eq!(king_attacks(Square::new(3, 4)).count(), 8);
    }

    #[test]
    fn test_pawn_attacks_direction() {
        let e4 = Square::new(3, 4);
        let white = pawn_attacks(Color::White, e4);
        assert!(white.contains(Square::new(4, 3)));
        assert!(white.contains(Square::new(4, 5)));
        let black = pawn_attacks(Color::Black, e4);
        assert!(black.contains(Square::new(2, 3)));
        assert!(black.contains(Square::new(2, 5)));
    }

    #[test]
    fn test_pawn_attacks_no_file_wrap() {
        let a4 = Square::new(3, 0);
        assert_eq!(pawn_attacks(Color::White, a4).count(), 1);
        let h4 = Square::new(3, 7);
        assert_eq!(pawn_attacks(Color::Black, h4).count(), 1);
    }

    #[test]
    fn test_rook_attacks_empty_board() {
        let e4 = Square::new(3, 4);
        let attacks = rook_attacks(e4, Bitboard::EMPTY);
        assert_eq!(attacks.count(), 14);
        assert!(attacks.contains(Square::new(3, 0)));
        assert!(attacks.contains(Square::new(7, 4)));
        assert!(!attacks.contains(e4));
    }

    #[test]
    fn test_rook_attacks_with_blockers() {
        let e4 = Square::new(3, 4);
        let blockers =
            Bitboard::from_square(Square::new(5, 4)) | Bitboard::from_square(Square::new(3, 2));
        let attacks = rook_attacks(e4, blockers);
        assert!(attacks.contains(Square::new(5, 4)));
        assert!(!attacks.contains(Square::new(6, 4)));
        assert!(attacks.contains(Square::new(3, 2)));
        assert!(!attacks.contains(Square::new(3, 1)));
    }

    #[test]
    fn test_bishop_attacks_with_blockers() {
        let e4 = Square::new(3, 4);
        let blocker = Bitboard::from_square(Square::new(5, 6));
        let attacks = bishop_attacks(e4, blocker);
        assert!(attacks.contains(Square::new(5, 6)));
        assert!(!attacks.contains(Square::new(6, 7)));
        assert!(attacks.contains(Square::new(0, 1)));
    }

    #[test]
    fn test_magic_matches_slow_path() {
        let occupancies = [
            Bitboard::EMPTY,
            Bitboard(0xFF00_FF00_FF00_FF00),
            Bitboard(0x00FF_00FF_00FF_00FF),
            Bitboard(0x5555_5555_5555_5555),
        ];
        for sq in Square::all() {
            for occ in occupancies {
                assert_eq!(rook_attacks(sq, occ), magics::rook_attacks_slow(sq, occ));
                assert_eq!(bishop_attacks(sq, occ), magics::bishop_attacks_slow(sq, occ));
            }
        }
    }

    #[test]
    fn test_between_and_line() {
        let a1 = Square::A1;
        let h8 = Square::H8;
        let mid = between(a1, h8);
        assert!(mid.contains(Square::new(3, 3)));
        assert!(mid.contains(h8));
        assert!(!mid.contains(a1));
        assert!(aligned(a1, h8, Square::new(4, 4)));
        assert!(!aligned(a1, h8, Square::new(4, 5)));
        // Unaligned pairs carry only the target square (checker capture).
        let knight_hop = Square::new(2, 1);
        assert_eq!(between(a1, knight_hop), Bitboard::from_square(knight_hop));
    }
}
