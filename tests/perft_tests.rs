//! Perft against the reference counts of the standard test suite.

use basalt::position::Position;

struct PerftPosition {
    name: &'static str,
    fen: &'static str,
    depths: &'static [(u32, u64)],
}

const SUITE: &[PerftPosition] = &[
    PerftPosition {
        name: "startpos",
        fen: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        depths: &[(1, 20), (2, 400), (3, 8_902), (4, 197_281), (5, 4_865_609)],
    },
    PerftPosition {
        name: "kiwipete",
        fen: "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        depths: &[(1, 48), (2, 2_039), (3, 97_862), (4, 4_085_603)],
    },
    PerftPosition {
        name: "position 3",
        fen: "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        depths: &[(1, 14), (2, 191), (3, 2_812), (4, 43_238), (5, 674_624)],
    },
    PerftPosition {
        name: "position 4",
        fen: "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
        depths: &[(1, 6), (2, 264), (3, 9_467), (4, 422_333)],
    },
    PerftPosition {
        name: "position 5",
        fen: "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        depths: &[(1, 44), (2, 1_486), (3, 62_379), (4, 2_103_487)],
    },
    PerftPosition {
        name: "position 6",
        fen: "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
        depths: &[(1, 46), (2, 2_079), (3, 89_890), (4, 3_894_594)],
    },
];

#[test]
fn perft_reference_suite() {
    for position in SUITE {
        let mut pos = Position::from_fen(position.fen, false).unwrap();
        for &(depth, expected) in position.depths {
            let nodes = basalt::perft(&mut pos, depth);
            assert_eq!(
                nodes, expected,
                "{} at depth {depth}: got {nodes}, want {expected}",
                position.name
            );
        }
    }
}

/// Deep counts from the specification scenarios. Minutes of work in debug
/// builds, so opt in with `cargo test -- --ignored --release`.
#[test]
#[ignore]
fn perft_deep_startpos() {
    let mut pos =
        Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", false)
            .unwrap();
    assert_eq!(basalt::perft(&mut pos, 6), 119_060_324);
}

#[test]
#[ignore]
fn perft_deep_kiwipete() {
    let mut pos = Position::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        false,
    )
    .unwrap();
    assert_eq!(basalt::perft(&mut pos, 5), 193_690_690);
}

#[test]
#[ignore]
fn perft_deep_position3() {
    let mut pos = Position::from_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", false).unwrap();
    assert_eq!(basalt::perft(&mut pos, 7), 178_633_661);
}

#[test]
fn perft_chess960_start_array() {
    // A Chess960 array with castling rights named by rook file.
    let fen = "bqnb1rkr/pp3ppp/3ppn2/2p5/5P2/P2P4/NPP1P1PP/BQ1BNRKR w HFhf - 2 9";
    let mut pos = Position::from_fen(fen, true).unwrap();
    assert_eq!(basalt::perft(&mut pos, 1), 21);
    assert_eq!(basalt::perft(&mut pos, 2), 528);
    assert_eq!(basalt::perft(&mut pos, 3), 12_189);
}
