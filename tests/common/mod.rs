//! Shared helpers for the integration tests.

use basalt::nnue::{self, NnueNetwork};

/// A network whose PSQT head encodes plain material, making the search
/// value captures without trained weights. Feature planes 0-5 are the
/// perspective's own pieces, 6-11 the opponent's.
#[must_use]
pub fn material_network() -> NnueNetwork {
    let mut network = NnueNetwork::zeroed();
    let values = [100, 320, 330, 500, 900, 0];

    for king_sq in 0..64 {
        for plane in 0..12 {
            let piece_type = plane % 6;
            let sign = if plane < 6 { 1 } else { -1 };
            // propagate() divides the PSQT delta by 2 * QB.
            let weight = sign * values[piece_type] * 2 * nnue::QB;
            for sq in 0..64 {
                let feature = (king_sq * 12 + plane) * 64 + sq;
                for bucket in 0..nnue::PSQT_BUCKETS {
                    network.psqt_weights[feature * nnue::PSQT_BUCKETS + bucket] = weight;
                }
            }
        }
    }
    network
}
