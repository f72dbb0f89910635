//! Error types for position construction and move parsing.

use std::fmt;

/// FEN parsing failure, or a parsed position that is not legal chess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    /// FEN string has too few whitespace-separated fields (needs at least 4)
    TooFewParts { found: usize },
    /// Invalid piece character in the board field
    InvalidPiece { char: char },
    /// Invalid castling character
    InvalidCastling { char: char },
    /// Invalid side to move (must be 'w' or 'b')
    InvalidSideToMove { found: String },
    /// Invalid en passant field
    InvalidEnPassant { found: String },
    /// A rank of the board field does not describe exactly 8 files
    BadRank { rank: usize },
    /// Each side needs exactly one king
    WrongKingCount { color_white: bool, count: usize },
    /// Pawns cannot stand on the first or eighth rank
    PawnOnBackRank,
    /// More pieces than a legal game can produce
    TooManyPieces { color_white: bool, count: usize },
    /// The side not to move is in check
    OpponentInCheck,
}

impl fmt::Display for FenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenError::TooFewParts { found } => {
                write!(f, "FEN must have at least 4 fields, found {found}")
            }
            FenError::InvalidPiece { char } => {
                write!(f, "Invalid piece character '{char}' in FEN")
            }
            FenError::InvalidCastling { char } => {
                write!(f, "Invalid castling character '{char}' in FEN")
            }
            FenError::InvalidSideToMove { found } => {
                write!(f, "Invalid side to move '{found}', expected 'w' or 'b'")
            }
            FenError::InvalidEnPassant { found } => {
                write!(f, "Invalid en passant square '{found}'")
            }
            FenError::BadRank { rank } => {
                write!(f, "Rank {} of the FEN board field is malformed", rank + 1)
            }
            FenError::WrongKingCount { color_white, count } => {
                let side = if *color_white { "White" } else { "Black" };
                write!(f, "{side} must have exactly one king, found {count}")
            }
            FenError::PawnOnBackRank => write!(f, "Pawn on first or eighth rank"),
            FenError::TooManyPieces { color_white, count } => {
                let side = if *color_white { "White" } else { "Black" };
                write!(f, "{side} has {count} pieces, more than a legal game allows")
            }
            FenError::OpponentInCheck => {
                write!(f, "The side not to move is in check")
            }
        }
    }
}

impl std::error::Error for FenError {}

/// Failure to interpret a UCI move string in the current position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciMoveError {
    /// Move string has invalid length (must be 4-5 characters)
    InvalidLength { len: usize },
    /// Invalid square notation in the move
    InvalidSquare { notation: String },
    /// Invalid promotion piece suffix
    InvalidPromotion { char: char },
    /// No legal move in the position matches the string
    IllegalMove { notation: String },
}

impl fmt::Display for UciMoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UciMoveError::InvalidLength { len } => {
                write!(f, "Move must be 4-5 characters, found {len}")
            }
            UciMoveError::InvalidSquare { notation } => {
                write!(f, "Invalid square notation in '{notation}'")
            }
            UciMoveError::InvalidPromotion { char } => {
                write!(f, "Invalid promotion piece '{char}'")
            }
            UciMoveError::IllegalMove { notation } => {
                write!(f, "Illegal move '{notation}'")
            }
        }
    }
}

impl std::error::Error for UciMoveError {}
