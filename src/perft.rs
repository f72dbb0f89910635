//! Perft: exhaustive legal move-path counting for move generator
//! validation.

use crate::position::{generate, GenType, Position};
use crate::types::MoveList;

/// Count leaf nodes of the legal move tree to the given depth.
#[must_use]
pub fn perft(pos: &mut Position, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }

    let mut list = MoveList::new();
    generate(pos, GenType::Legal, &mut list);

    if depth == 1 {
        return list.len() as u64;
    }

    let mut nodes = 0;
    for &m in &list {
        pos.do_move(m);
        nodes += perft(pos, depth - 1);
        pos.undo_move(m);
    }
    nodes
}

/// Per-root-move breakdown, the classic `divide` debugging aid.
#[must_use]
pub fn perft_divide(pos: &mut Position, depth: u32) -> Vec<(String, u64)> {
    let mut list = MoveList::new();
    generate(pos, GenType::Legal, &mut list);

    let mut out = Vec::with_capacity(list.len());
    for &m in &list {
        pos.do_move(m);
        let nodes = if depth > 1 { perft(pos, depth - 1) } else { 1 };
        pos.undo_move(m);
        out.push((m.to_uci(pos.is_chess960()), nodes));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(fen: &str, depth: u32) -> u64 {
        let mut pos = Position::from_fen(fen, false).unwrap();
        perft(&mut pos, depth)
    }

    #[test]
    fn test_perft_startpos_shallow() {
        let fen = crate::position::START_FEN;
        assert_eq!(run(fen, 1), 20);
        assert_eq!(run(fen, 2), 400);
        assert_eq!(run(fen, 3), 8_902);
        assert_eq!(run(fen, 4), 197_281);
    }

    #[test]
    fn test_perft_kiwipete() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        assert_eq!(run(fen, 1), 48);
        assert_eq!(run(fen, 2), 2_039);
        assert_eq!(run(fen, 3), 97_862);
    }

    #[test]
    fn test_perft_position3() {
        let fen = "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1";
        assert_eq!(run(fen, 1), 14);
        assert_eq!(run(fen, 2), 191);
        assert_eq!(run(fen, 3), 2_812);
        assert_eq!(run(fen, 4), 43_238);
        assert_eq!(run(fen, 5), 674_624);
    }

    #[test]
    fn test_perft_position4_promotions() {
        let fen = "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1";
        assert_eq!(run(fen, 1), 6);
        assert_eq!(run(fen, 2), 264);
        assert_eq!(run(fen, 3), 9_467);
    }

    #[test]
    fn test_perft_position5() {
        let fen = "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8";
        assert_eq!(run(fen, 1), 44);
        assert_eq!(run(fen, 2), 1_486);
        assert_eq!(run(fen, 3), 62_379);
    }

    #[test]
    fn test_perft_position6() {
        let fen = "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10";
        assert_eq!(run(fen, 1), 46);
        assert_eq!(run(fen, 2), 2_079);
        assert_eq!(run(fen, 3), 89_890);
    }

    #[test]
    fn test_perft_en_passant_pin() {
        // En passant discovered check cases.
        let fen = "8/8/8/8/k2Pp2Q/8/8/3K4 b - d3 0 1";
        assert_eq!(run(fen, 1), 6);
    }

    #[test]
    fn test_perft_divide_sums_to_perft() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let mut pos = Position::from_fen(fen, false).unwrap();
        let divide = perft_divide(&mut pos, 3);
        let total: u64 = divide.iter().map(|(_, n)| n).sum();
        assert_eq!(total, perft(&mut pos, 3));
    }
}
