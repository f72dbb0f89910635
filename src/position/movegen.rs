//! Pseudo-legal move generation by category, plus the fully legal filter.

use super::Position;
use crate::bitboard::{attacks, between, king_attacks, pawn_attacks};
use crate::types::{
    Bitboard, CastleSide, Color, Direction, Move, MoveList, PieceType, Square, RANK_3, RANK_6,
    RANK_7, RANK_2,
};

/// Which class of moves to generate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenType {
    /// Captures, en passant and queen promotions.
    Captures,
    /// Non-captures: pushes, piece quiets, castling, under-promotions.
    Quiets,
    /// Check evasions; only valid when the side to move is in check.
    Evasions,
    /// Captures and quiets together (not in check).
    NonEvasions,
    /// The legal move set, whatever the check state.
    Legal,
}

/// Generate moves of the requested class into `list`.
pub fn generate(pos: &Position, gen: GenType, list: &mut MoveList) {
    match gen {
        GenType::Legal => {
            let pseudo = if pos.in_check() {
                GenType::Evasions
            } else {
                GenType::NonEvasions
            };
            generate(pos, pseudo, list);
            list.retain(|m| pos.legal(m));
        }
        GenType::Evasions => {
            debug_assert!(pos.in_check());
            generate_evasions(pos, list);
        }
        _ => {
            debug_assert!(!pos.in_check() || gen != GenType::Quiets);
            generate_all(pos, gen, list);
        }
    }
}

fn generate_all(pos: &Position, gen: GenType, list: &mut MoveList) {
    let us = pos.side_to_move();
    let target = match gen {
        GenType::Captures => pos.pieces_of(us.opponent()),
        GenType::Quiets => !pos.occupied(),
        _ => !pos.pieces_of(us),
    };

    generate_pawn_moves(pos, gen, target, list);
    generate_piece_moves(pos, us, target, list);

    let ksq = pos.king_square(us);
    let king_targets = king_attacks(ksq) & target;
    for to in king_targets {
        list.push(Move::new(ksq, to));
    }

    if gen != GenType::Captures && pos.castling_rights().has_any(us) {
        generate_castling(pos, us, list);
    }
}

fn generate_evasions(pos: &Position, list: &mut MoveList) {
    let us = pos.side_to_move();
    let ksq = pos.king_square(us);
    let checkers = pos.checkers();

    // King steps; full legality (including moving along the checking ray)
    // is left to the `legal` filter.
    for to in king_attacks(ksq) & !pos.pieces_of(us) {
        list.push(Move::new(ksq, to));
    }

    // Double check: only the king can move.
    if checkers.more_than_one() {
        return;
    }

    // Block the ray or capture the checker. `between` includes the checker
    // square, so interpositions and captures share one target mask. Knight
    // and pawn checks leave only the capture.
    let checker = checkers.lsb().expect("in check implies a checker");
    let target = between(ksq, checker);

    generate_pawn_moves(pos, GenType::Evasions, target, list);
    generate_piece_moves(pos, us, target, list);
}

fn generate_piece_moves(pos: &Position, us: Color, target: Bitboard, list: &mut MoveList) {
    for pt in [
        PieceType::Knight,
        PieceType::Bishop,
        PieceType::Rook,
        PieceType::Queen,
    ] {
        for from in pos.colored(us, pt) {
            let moves = attacks(pt, from, pos.occupied()) & target;
            for to in moves {
                list.push(Move::new(from, to));
            }
        }
    }
}

fn generate_pawn_moves(pos: &Position, gen: GenType, target: Bitboard, list: &mut MoveList) {
    let us = pos.side_to_move();
    let them = us.opponent();
    let empty = !pos.occupied();
    let enemies = pos.pieces_of(them);

    let (up, up_west, up_east, promo_rank, double_rank) = if us.is_white() {
        (
            Direction::North,
            Direction::NorthWest,
            Direction::NorthEast,
            RANK_7,
            RANK_3,
        )
    } else {
        (
            Direction::South,
            Direction::SouthWest,
            Direction::SouthEast,
            RANK_2,
            RANK_6,
        )
    };
    let forward = us.forward();

    let pawns = pos.colored(us, PieceType::Pawn);
    let pawns_on_7 = pawns & promo_rank;
    let pawns_not_on_7 = pawns & !promo_rank;

    // Single and double pushes.
    if gen != GenType::Captures {
        let mut single = pawns_not_on_7.shift(up) & empty;
        let mut double = (single & double_rank).shift(up) & empty;
        if gen == GenType::Evasions {
            single &= target;
            double &= target;
        }
        for to in single {
            list.push(Move::new(to.offset(-forward), to));
        }
        for to in double {
            list.push(Move::new(to.offset(-2 * forward), to));
        }
    }

    // Promotions. Queen promotions travel with the captures, the
    // under-promotions with the quiets.
    if pawns_on_7.any() {
        let mut push = pawns_on_7.shift(up) & empty;
        let mut west = pawns_on_7.shift(up_west) & enemies;
        let mut east = pawns_on_7.shift(up_east) & enemies;
        if gen == GenType::Evasions {
            push &= target;
            west &= target;
            east &= target;
        }
        for to in push {
            push_promotions(gen, to.offset(-forward), to, false, list);
        }
        for to in west {
            push_promotions(gen, to.offset(-forward + 1), to, true, list);
        }
        for to in east {
            push_promotions(gen, to.offset(-forward - 1), to, true, list);
        }
    }

    // Ordinary captures and en passant.
    if gen != GenType::Quiets {
        let mut west = pawns_not_on_7.shift(up_west) & enemies;
        let mut east = pawns_not_on_7.shift(up_east) & enemies;
        if gen == GenType::Evasions {
            west &= target;
            east &= target;
        }
        for to in west {
            list.push(Move::new(to.offset(-forward + 1), to));
        }
        for to in east {
            list.push(Move::new(to.offset(-forward - 1), to));
        }

        if let Some(ep) = pos.ep_square() {
            // When evading, en passant only helps if the checker is the
            // pawn that just pushed.
            let captured_sq = ep.offset(-forward);
            if gen == GenType::Evasions && !target.contains(captured_sq) {
                return;
            }
            let capturers = pawns_not_on_7 & pawn_attacks(them, ep);
            for from in capturers {
                list.push(Move::en_passant(from, ep));
            }
        }
    }
}

/// Promotion fan-out in the fixed order queen, rook, bishop, knight.
fn push_promotions(gen: GenType, from: Square, to: Square, is_capture: bool, list: &mut MoveList) {
    let all = matches!(gen, GenType::Evasions | GenType::NonEvasions);
    // A queen promotion is tactical even without a capture.
    if all || gen == GenType::Captures || is_capture {
        list.push(Move::promotion(from, to, PieceType::Queen));
    }
    if all || gen == GenType::Quiets {
        list.push(Move::promotion(from, to, PieceType::Rook));
        list.push(Move::promotion(from, to, PieceType::Bishop));
        list.push(Move::promotion(from, to, PieceType::Knight));
    }
}

fn generate_castling(pos: &Position, us: Color, list: &mut MoveList) {
    debug_assert!(!pos.in_check());
    let them = us.opponent();
    let ksq = pos.king_square(us);

    for side in [CastleSide::King, CastleSide::Queen] {
        if !pos.castling_rights().has(us, side) || pos.castling_blocked(us, side) {
            continue;
        }
        // The king may not cross or land on an attacked square.
        let path = pos.castling_king_path(us, side);
        let occupied = pos.occupied();
        if Iterator::any(&mut path.into_iter(), |sq| pos.attacked_by(them, sq, occupied)) {
            continue;
        }
        let rook = pos
            .castling_rook_square(us, side)
            .expect("right implies rook square");
        list.push(Move::castle(ksq, rook));
    }
}
