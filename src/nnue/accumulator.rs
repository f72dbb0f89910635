//! The feature-transformer accumulator and its lazy maintenance.
//!
//! Each `StateInfo` carries one `Accumulator` with a `computed` flag per
//! perspective. Nothing is touched during make/unmake beyond the
//! dirty-piece record; `ensure_computed` walks back to the nearest usable
//! ancestor and applies one batched pass of row additions/subtractions, or
//! rebuilds from the per-king-square cache when that perspective's king
//! moved somewhere along the path.

use super::features::{feature_index, oriented_king};
use super::network::NnueNetwork;
use super::{simd, L1, PSQT_BUCKETS};
use crate::position::Position;
use crate::types::{Bitboard, Color, Piece, PieceType, Square};

/// Per-perspective feature transformer output plus the PSQT partial sums.
/// 64-byte aligned so vectorized row updates stay on natural boundaries.
#[derive(Clone)]
#[repr(align(64))]
pub struct Accumulator {
    pub values: [[i16; L1]; 2],
    pub psqt: [[i32; PSQT_BUCKETS]; 2],
    pub computed: [bool; 2],
}

impl Default for Accumulator {
    fn default() -> Self {
        Accumulator {
            values: [[0; L1]; 2],
            psqt: [[0; PSQT_BUCKETS]; 2],
            computed: [false; 2],
        }
    }
}

/// One piece delta from make/unmake: where a piece left and where it
/// arrived. Captures have no `to`, promotion pieces no `from`.
#[derive(Clone, Copy)]
pub struct DirtyPiece {
    pub piece: Piece,
    pub from: Option<Square>,
    pub to: Option<Square>,
}

/// Up to three piece deltas per move (castling moves two pieces, a
/// promotion capture changes three).
#[derive(Clone, Copy)]
pub struct DirtyPieces {
    entries: [DirtyPiece; 3],
    len: usize,
}

impl Default for DirtyPieces {
    fn default() -> Self {
        DirtyPieces {
            entries: [DirtyPiece {
                piece: Piece::from_index(0),
                from: None,
                to: None,
            }; 3],
            len: 0,
        }
    }
}

impl DirtyPieces {
    #[inline]
    pub fn push(&mut self, piece: Piece, from: Option<Square>, to: Option<Square>) {
        debug_assert!(self.len < 3);
        self.entries[self.len] = DirtyPiece { piece, from, to };
        self.len += 1;
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[DirtyPiece] {
        &self.entries[..self.len]
    }

    /// Did this move displace `perspective`'s king? If so the whole
    /// perspective must be rebuilt, not incremented.
    #[inline]
    #[must_use]
    pub fn moved_king(&self, perspective: Color) -> bool {
        self.as_slice().iter().any(|d| {
            d.piece.piece_type() == PieceType::King && d.piece.color() == perspective
        })
    }
}

/// Per-worker refresh cache: for every (perspective, king square) pair the
/// last accumulator computed there together with the piece bitboards it
/// was computed from. A refresh diffs the current board against the
/// snapshot instead of rebuilding from zero.
pub struct AccumulatorCache {
    entries: Vec<CacheEntry>,
}

struct CacheEntry {
    pieces: [[Bitboard; PieceType::COUNT]; 2],
    values: [i16; L1],
    psqt: [i32; PSQT_BUCKETS],
}

impl AccumulatorCache {
    /// Empty-board snapshots seeded with the transformer biases.
    #[must_use]
    pub fn new(network: &NnueNetwork) -> Self {
        let mut entries = Vec::with_capacity(2 * 64);
        for _ in 0..2 * 64 {
            let mut values = [0i16; L1];
            values.copy_from_slice(&network.ft_biases);
            entries.push(CacheEntry {
                pieces: [[Bitboard::EMPTY; PieceType::COUNT]; 2],
                values,
                psqt: [0; PSQT_BUCKETS],
            });
        }
        AccumulatorCache { entries }
    }

    /// Drop all snapshots back to the empty board (new game, new network).
    pub fn clear(&mut self, network: &NnueNetwork) {
        for entry in &mut self.entries {
            entry.pieces = [[Bitboard::EMPTY; PieceType::COUNT]; 2];
            entry.values.copy_from_slice(&network.ft_biases);
            entry.psqt = [0; PSQT_BUCKETS];
        }
    }

    #[inline]
    fn entry_mut(&mut self, perspective: Color, ksq: Square) -> &mut CacheEntry {
        &mut self.entries[perspective.index() * 64 + ksq.index()]
    }
}

/// Make sure the current state's accumulator is valid for `perspective`.
pub fn ensure_computed(
    pos: &mut Position,
    network: &NnueNetwork,
    cache: &mut AccumulatorCache,
    perspective: Color,
) {
    let p = perspective.index();
    let last = pos.state_stack().len() - 1;
    if pos.state_stack()[last].accumulator.computed[p] {
        return;
    }

    // Walk back towards a computed ancestor. Crossing a state where this
    // perspective's king moved forces a cache refresh instead.
    let mut idx = last;
    loop {
        let st = &pos.state_stack()[idx];
        if st.dirty.moved_king(perspective) {
            refresh_from_cache(pos, network, cache, perspective);
            return;
        }
        if idx == 0 {
            refresh_from_cache(pos, network, cache, perspective);
            return;
        }
        idx -= 1;
        if pos.state_stack()[idx].accumulator.computed[p] {
            break;
        }
    }

    // One forward pass from the computed ancestor to the top.
    let ksq = oriented_king(pos, perspective);
    let stack = pos.state_stack_mut();
    for i in idx + 1..=last {
        let (before, after) = stack.split_at_mut(i);
        let parent = &before[i - 1].accumulator;
        let st = &mut after[0];

        st.accumulator.values[p] = parent.values[p];
        st.accumulator.psqt[p] = parent.psqt[p];
        for delta in st.dirty.as_slice() {
            if let Some(from) = delta.from {
                let feature = feature_index(perspective, ksq, delta.piece, from);
                simd::sub_row(&mut st.accumulator.values[p], network.ft_row(feature));
                sub_psqt(&mut st.accumulator.psqt[p], network.psqt_row(feature));
            }
            if let Some(to) = delta.to {
                let feature = feature_index(perspective, ksq, delta.piece, to);
                simd::add_row(&mut st.accumulator.values[p], network.ft_row(feature));
                add_psqt(&mut st.accumulator.psqt[p], network.psqt_row(feature));
            }
        }
        st.accumulator.computed[p] = true;
    }
}

/// Rebuild the top accumulator for one perspective from the cache entry of
/// the current king square, then store the new snapshot back.
fn refresh_from_cache(
    pos: &mut Position,
    network: &NnueNetwork,
    cache: &mut AccumulatorCache,
    perspective: Color,
) {
    let p = perspective.index();
    let king_sq = pos.king_square(perspective);
    let oriented_ksq = super::features::orient(perspective, king_sq);

    // Collect adds/subs against the snapshot before touching anything.
    let mut added: Vec<usize> = Vec::with_capacity(32);
    let mut removed: Vec<usize> = Vec::with_capacity(32);
    {
        let entry = cache.entry_mut(perspective, king_sq);
        for color in [Color::White, Color::Black] {
            for pt in PieceType::ALL {
                let piece = Piece::new(color, pt);
                let now = pos.colored(color, pt);
                let then = entry.pieces[color.index()][pt.index()];
                for sq in now & !then {
                    added.push(feature_index(perspective, oriented_ksq, piece, sq));
                }
                for sq in then & !now {
                    removed.push(feature_index(perspective, oriented_ksq, piece, sq));
                }
                entry.pieces[color.index()][pt.index()] = now;
            }
        }
        for feature in &removed {
            simd::sub_row(&mut entry.values, network.ft_row(*feature));
            sub_psqt(&mut entry.psqt, network.psqt_row(*feature));
        }
        for feature in &added {
            simd::add_row(&mut entry.values, network.ft_row(*feature));
            add_psqt(&mut entry.psqt, network.psqt_row(*feature));
        }
    }

    let entry = &cache.entries[p * 64 + king_sq.index()];
    let st = pos.state_stack_mut().last_mut().expect("stack non-empty");
    st.accumulator.values[p].copy_from_slice(&entry.values);
    st.accumulator.psqt[p].copy_from_slice(&entry.psqt);
    st.accumulator.computed[p] = true;
}

#[inline]
fn add_psqt(acc: &mut [i32; PSQT_BUCKETS], row: &[i32]) {
    for (a, &r) in acc.iter_mut().zip(row) {
        *a += r;
    }
}

#[inline]
fn sub_psqt(acc: &mut [i32; PSQT_BUCKETS], row: &[i32]) {
    for (a, &r) in acc.iter_mut().zip(row) {
        *a -= r;
    }
}

/// Rebuild an accumulator for one perspective from the piece list alone.
/// The reference implementation the incremental path is tested against.
pub fn refresh_from_scratch(
    pos: &mut Position,
    network: &NnueNetwork,
    perspective: Color,
) {
    let p = perspective.index();
    let mut features = Vec::with_capacity(32);
    super::features::active_features(pos, perspective, &mut features);

    let st = pos.state_stack_mut().last_mut().expect("stack non-empty");
    st.accumulator.values[p].copy_from_slice(&network.ft_biases);
    st.accumulator.psqt[p] = [0; PSQT_BUCKETS];
    for &feature in &features {
        simd::add_row(&mut st.accumulator.values[p], network.ft_row(feature));
        add_psqt(&mut st.accumulator.psqt[p], network.psqt_row(feature));
    }
    st.accumulator.computed[p] = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{generate, GenType, Position};
    use crate::types::MoveList;
    use rand::prelude::*;

    /// A deterministic non-trivial network for equivalence tests.
    fn test_network() -> NnueNetwork {
        let mut network = NnueNetwork::zeroed();
        let mut state = 0x1234_5678_u32;
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            state
        };
        for w in network.ft_weights.iter_mut() {
            *w = (next() % 64) as i16 - 32;
        }
        for b in network.ft_biases.iter_mut() {
            *b = (next() % 32) as i16;
        }
        for w in network.psqt_weights.iter_mut() {
            *w = (next() % 512) as i32 - 256;
        }
        network
    }

    fn assert_incremental_matches(pos: &mut Position, network: &NnueNetwork) {
        for perspective in [Color::White, Color::Black] {
            let p = perspective.index();
            let incremental_values = pos.state_stack().last().unwrap().accumulator.values[p];
            let incremental_psqt = pos.state_stack().last().unwrap().accumulator.psqt[p];

            refresh_from_scratch(pos, network, perspective);
            let fresh = &pos.state_stack().last().unwrap().accumulator;
            assert_eq!(
                incremental_values[..],
                fresh.values[p][..],
                "accumulator diverged for {perspective:?}"
            );
            assert_eq!(incremental_psqt, fresh.psqt[p]);
        }
    }

    #[test]
    fn test_incremental_equals_refresh_over_random_game() {
        let network = test_network();
        let mut cache = AccumulatorCache::new(&network);
        let mut pos = Position::startpos();
        let mut rng = StdRng::seed_from_u64(99);

        for _ in 0..60 {
            let mut list = MoveList::new();
            generate(&pos, GenType::Legal, &mut list);
            if list.is_empty() {
                break;
            }
            let m = list[rng.gen_range(0..list.len())];
            pos.do_move(m);

            ensure_computed(&mut pos, &network, &mut cache, Color::White);
            ensure_computed(&mut pos, &network, &mut cache, Color::Black);
            assert_incremental_matches(&mut pos, &network);
        }
    }

    #[test]
    fn test_lazy_update_skips_intermediate_states() {
        // Make several moves without evaluating, then one ensure_computed
        // must batch the whole path.
        let network = test_network();
        let mut cache = AccumulatorCache::new(&network);
        let mut pos = Position::startpos();

        for uci in ["g1f3", "b8c6", "d2d4", "d7d5", "c1f4"] {
            let m = pos.parse_uci_move(uci).unwrap();
            pos.do_move(m);
        }
        ensure_computed(&mut pos, &network, &mut cache, Color::White);
        ensure_computed(&mut pos, &network, &mut cache, Color::Black);
        assert_incremental_matches(&mut pos, &network);
    }

    #[test]
    fn test_king_move_triggers_refresh_and_matches() {
        let network = test_network();
        let mut cache = AccumulatorCache::new(&network);
        let mut pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            false,
        )
        .unwrap();

        // Castle: the white perspective must refresh, black increments.
        let m = pos.parse_uci_move("e1g1").unwrap();
        pos.do_move(m);
        ensure_computed(&mut pos, &network, &mut cache, Color::White);
        ensure_computed(&mut pos, &network, &mut cache, Color::Black);
        assert_incremental_matches(&mut pos, &network);

        // Returning to a previously seen king square exercises the cached
        // snapshot diff path.
        for uci in ["e8g8", "g1h1", "g8h8"] {
            let m = pos.parse_uci_move(uci).unwrap();
            pos.do_move(m);
            ensure_computed(&mut pos, &network, &mut cache, Color::White);
            ensure_computed(&mut pos, &network, &mut cache, Color::Black);
        }
        assert_incremental_matches(&mut pos, &network);
    }
}
