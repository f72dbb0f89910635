//! NNUE (Efficiently Updatable Neural Network) evaluation.
//!
//! Architecture: HalfKAv2 features -> (49152 -> 512) x 2 perspectives,
//! squared-clipped-ReLU with pairwise products -> 512 -> 16 -> 1, plus a
//! bucketed PSQT term accumulated alongside the feature transformer.
//!
//! The feature transformer output (the accumulator) lives inside each
//! `StateInfo` and is maintained incrementally from the dirty-piece record
//! written by make/unmake; king moves invalidate a perspective, which is
//! then rebuilt from the per-king-square refresh cache instead of from
//! scratch.

pub mod accumulator;
pub mod features;
pub mod network;
pub mod simd;

pub use accumulator::{Accumulator, AccumulatorCache, DirtyPiece, DirtyPieces};
pub use network::{NetworkLoadError, NnueNetwork};

use crate::position::Position;
use crate::types::{Color, Value, VALUE_MATED_IN_MAX_PLY, VALUE_MATE_IN_MAX_PLY};

/// Feature transformer width per perspective.
pub const L1: usize = 512;

/// Hidden layer width.
pub const L2: usize = 16;

/// HalfKAv2 feature count: own-king square x piece x piece square.
pub const FEATURES: usize = 64 * 12 * 64;

/// Material-count buckets for the PSQT head.
pub const PSQT_BUCKETS: usize = 8;

/// Feature-transformer activation ceiling.
pub const QA: i32 = 255;

/// Weight quantization of the affine stack.
pub const QB: i32 = 64;

/// Network-output-to-centipawn scale.
pub const SCALE: i32 = 400;

/// PSQT bucket for a position: one per four men on the board.
#[inline]
#[must_use]
pub fn psqt_bucket(pos: &Position) -> usize {
    (pos.occupied().count() as usize - 1) / 4
}

/// Full evaluation of the current position from the side to move's point
/// of view. Updates the accumulator lazily, then runs the small network
/// stack and rescales by the material phase.
#[must_use]
pub fn evaluate(pos: &mut Position, network: &NnueNetwork, cache: &mut AccumulatorCache) -> Value {
    accumulator::ensure_computed(pos, network, cache, Color::White);
    accumulator::ensure_computed(pos, network, cache, Color::Black);

    let bucket = psqt_bucket(pos);
    let stm = pos.side_to_move();
    let (positional, psqt) = network.propagate(&pos.st().accumulator, stm, bucket);

    // More material keeps the positional term dominant; in drained
    // positions the PSQT head takes over.
    let npm = pos.non_pawn_material(Color::White) + pos.non_pawn_material(Color::Black);
    let v = (positional * (580 + npm / 32)) / 1024 + psqt;

    v.clamp(VALUE_MATED_IN_MAX_PLY + 1, VALUE_MATE_IN_MAX_PLY - 1)
}
