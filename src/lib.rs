//! Search and evaluation core of a UCI chess engine.
//!
//! The crate covers board representation and move generation (bitboards
//! with magic attack tables), a parallel iterative-deepening alpha-beta
//! search sharing a lock-free transposition table (Lazy SMP), and an
//! incrementally updated NNUE evaluator. The UCI text protocol itself is
//! an external collaborator driving the [`engine::Engine`] facade.
//!
//! # Example
//! ```no_run
//! use basalt::engine::Engine;
//! use basalt::search::Limits;
//!
//! let mut engine = Engine::new("/path/to/networks").unwrap();
//! engine.on_bestmove(|best, ponder| println!("bestmove {best} ponder {ponder}"));
//! engine.set_position(basalt::position::START_FEN, &["e2e4"]).unwrap();
//! engine.go(Limits::movetime(1000));
//! engine.wait_for_search_finished();
//! ```

pub mod bitboard;
pub mod engine;
pub mod history;
pub mod movepick;
pub mod nnue;
pub mod numa;
pub mod perft;
pub mod position;
pub mod search;
pub mod threads;
pub mod tt;
pub mod types;
mod zobrist;

pub use engine::{Engine, EngineError};
pub use perft::perft;
pub use position::{FenError, Position, UciMoveError, START_FEN};
pub use search::Limits;
pub use types::{Bitboard, Color, Move, Piece, PieceType, Square, Value};
