//! Magic bitboard construction.
//!
//! For each square the relevant-blocker subsets are enumerated with the
//! carry trick and hashed by `((occ & mask) * magic) >> shift` into a slice
//! of one flat attack array. Candidate magics are sparse random numbers
//! from a fixed-seed RNG, retried until the mapping is collision free.

use rand::prelude::*;

use crate::types::{Bitboard, Square};

/// Per-square magic hashing data. `offset` points into the shared flat
/// attack table.
#[derive(Clone, Copy, Default)]
struct Magic {
    mask: u64,
    magic: u64,
    shift: u32,
    offset: usize,
}

impl Magic {
    #[inline]
    fn index(&self, occupied: Bitboard) -> usize {
        let relevant = occupied.0 & self.mask;
        self.offset + (relevant.wrapping_mul(self.magic) >> self.shift) as usize
    }
}

/// Rook and bishop attack tables sharing one backing array.
pub struct SliderAttacks {
    table: Vec<Bitboard>,
    rook_magics: [Magic; 64],
    bishop_magics: [Magic; 64],
}

impl SliderAttacks {
    #[inline]
    #[must_use]
    pub fn rook(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        self.table[self.rook_magics[sq.index()].index(occupied)]
    }

    #[inline]
    #[must_use]
    pub fn bishop(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        self.table[self.bishop_magics[sq.index()].index(occupied)]
    }

    /// Build both tables. Runs once at startup behind a `Lazy`.
    #[must_use]
    pub fn init() -> Self {
        let mut table = Vec::new();
        let mut rook_magics = [Magic::default(); 64];
        let mut bishop_magics = [Magic::default(); 64];
        let mut rng = StdRng::seed_from_u64(SEED);

        for sq in Square::all() {
            rook_magics[sq.index()] = find_magic(sq, false, &mut table, &mut rng);
            bishop_magics[sq.index()] = find_magic(sq, true, &mut table, &mut rng);
        }

        SliderAttacks {
            table,
            rook_magics,
            bishop_magics,
        }
    }
}

const SEED: u64 = 0x9D4C_63A5_17B2_E4F1;

fn find_magic(sq: Square, bishop: bool, table: &mut Vec<Bitboard>, rng: &mut StdRng) -> Magic {
    let mask = relevant_mask(sq, bishop);
    let bits = mask.count_ones();
    let size = 1usize << bits;
    let shift = 64 - bits;

    // Enumerate every blocker subset of the mask (carry trick) and its
    // reference attack set.
    let mut occupancies = Vec::with_capacity(size);
    let mut references = Vec::with_capacity(size);
    let mut subset: u64 = 0;
    loop {
        occupancies.push(Bitboard(subset));
        references.push(attacks_slow(sq, Bitboard(subset), bishop));
        subset = subset.wrapping_sub(mask) & mask;
        if subset == 0 {
            break;
        }
    }

    let offset = table.len();
    table.resize(offset + size, Bitboard::EMPTY);

    let mut used = vec![false; size];
    'candidates: loop {
        // Sparse candidates hash low-entropy masks much better.
        let magic = rng.gen::<u64>() & rng.gen::<u64>() & rng.gen::<u64>();
        if (mask.wrapping_mul(magic) >> 56).count_ones() < 6 {
            continue;
        }

        used.iter_mut().for_each(|u| *u = false);
        for (occ, attack) in occupancies.iter().zip(&references) {
            let idx = ((occ.0.wrapping_mul(magic)) >> shift) as usize;
            if used[idx] {
                if table[offset + idx] != *attack {
                    continue 'candidates;
                }
            } else {
                used[idx] = true;
                table[offset + idx] = *attack;
            }
        }

        return Magic {
            mask,
            magic,
            shift,
            offset,
        };
    }
}

/// Relevant blocker mask: the slider rays minus the board edge in each
/// direction (edge squares never change the attack set).
fn relevant_mask(sq: Square, bishop: bool) -> u64 {
    let mut mask = 0u64;
    for (dr, df) in directions(bishop) {
        let mut rank = sq.rank() as i32 + dr;
        let mut file = sq.file() as i32 + df;
        while (0..8).contains(&(rank + dr)) && (0..8).contains(&(file + df)) {
            mask |= 1u64 << (rank * 8 + file);
            rank += dr;
            file += df;
        }
    }
    mask
}

fn directions(bishop: bool) -> [(i32, i32); 4] {
    if bishop {
        [(1, 1), (1, -1), (-1, 1), (-1, -1)]
    } else {
        [(1, 0), (-1, 0), (0, 1), (0, -1)]
    }
}

fn attacks_slow(sq: Square, occupied: Bitboard, bishop: bool) -> Bitboard {
    let mut attacks = Bitboard::EMPTY;
    for (dr, df) in directions(bishop) {
        let mut rank = sq.rank() as i32 + dr;
        let mut file = sq.file() as i32 + df;
        while (0..8).contains(&rank) && (0..8).contains(&file) {
            let target = Square::new(rank as usize, file as usize);
            attacks.set(target);
            if occupied.contains(target) {
                break;
            }
            rank += dr;
            file += df;
        }
    }
    attacks
}

/// Ray-walking rook attacks; the reference the magic tables are verified
/// against, and what table construction itself uses.
#[must_use]
pub fn rook_attacks_slow(sq: Square, occupied: Bitboard) -> Bitboard {
    attacks_slow(sq, occupied, false)
}

/// Ray-walking bishop attacks.
#[must_use]
pub fn bishop_attacks_slow(sq: Square, occupied: Bitboard) -> Bitboard {
    attacks_slow(sq, occupied, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevant_mask_excludes_edges() {
        // Rook on e4: mask covers b4-g4 and e2-e7, not a4/h4/e1/e8.
        let mask = relevant_mask(Square::new(3, 4), false);
        assert_eq!(mask & (1 << Square::new(3, 0).index()), 0);
        assert_eq!(mask & (1 << Square::new(3, 7).index()), 0);
        assert_ne!(mask & (1 << Square::new(3, 1).index()), 0);
        assert_eq!(mask.count_ones(), 10);
    }

    #[test]
    fn test_corner_rook_mask_bits() {
        assert_eq!(relevant_mask(Square::A1, false).count_ones(), 12);
        assert_eq!(relevant_mask(Square::A1, true).count_ones(), 6);
    }

    #[test]
    fn test_slow_attacks_symmetry() {
        // Attacks from a to empty-board b imply attacks from b to a.
        for sq in Square::all() {
            for target in rook_attacks_slow(sq, Bitboard::EMPTY) {
                assert!(rook_attacks_slow(target, Bitboard::EMPTY).contains(sq));
            }
        }
    }
}
