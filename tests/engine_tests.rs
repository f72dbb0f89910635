//! Engine facade integration: network files, Chess960, reconfiguration.

mod common;

use std::io::Write;
use std::sync::mpsc;
use std::time::Duration;

use basalt::engine::{Engine, EngineError, DEFAULT_NETWORK_NAME};
use basalt::nnue::{self, NnueNetwork};
use basalt::search::Limits;

/// Serialize a network in the engine's file format: version word,
/// architecture hash, length-prefixed description, feature transformer
/// (biases, weights, PSQT), hidden and output layers.
fn network_bytes(description: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&nnue::network::VERSION.to_le_bytes());
    out.extend_from_slice(&nnue::network::ARCH_HASH.to_le_bytes());
    out.extend_from_slice(&(description.len() as u32).to_le_bytes());
    out.extend_from_slice(description.as_bytes());
    // All-zero weights are a valid (if toothless) network.
    out.extend(std::iter::repeat(0u8).take(nnue::L1 * 2)); // ft biases
    out.extend(std::iter::repeat(0u8).take(nnue::FEATURES * nnue::L1 * 2)); // ft weights
    out.extend(std::iter::repeat(0u8).take(nnue::FEATURES * nnue::PSQT_BUCKETS * 4)); // psqt
    out.extend(std::iter::repeat(0u8).take(nnue::L2 * 4)); // hidden biases
    out.extend(std::iter::repeat(0u8).take(nnue::L1 * nnue::L2)); // hidden weights
    out.extend(std::iter::repeat(0u8).take(4)); // output bias
    out.extend(std::iter::repeat(0u8).take(nnue::L2)); // output weights
    out
}

fn temp_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("basalt-test-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn engine_boots_from_network_file() {
    let dir = temp_dir("boot");
    let path = dir.join(DEFAULT_NETWORK_NAME);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&network_bytes("integration test net")).unwrap();
    drop(file);

    let mut engine = Engine::new(&dir).unwrap();
    let (tx, rx) = mpsc::channel::<String>();
    engine.on_verify_networks(move |desc| {
        let _ = tx.send(desc.to_string());
    });
    engine.verify_networks();
    let desc = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(desc.contains("integration test net"));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn truncated_network_file_is_rejected() {
    let dir = temp_dir("truncated");
    let path = dir.join(DEFAULT_NETWORK_NAME);
    let bytes = network_bytes("x");
    std::fs::write(&path, &bytes[..bytes.len() / 3]).unwrap();

    let err = Engine::new(&dir).unwrap_err();
    assert!(matches!(err, EngineError::NetworkLoad(_)));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn wrong_version_network_is_rejected() {
    let dir = temp_dir("version");
    let path = dir.join(DEFAULT_NETWORK_NAME);
    let mut bytes = network_bytes("x");
    bytes[0] ^= 0x55;
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        Engine::new(&dir),
        Err(EngineError::NetworkLoad(
            nnue::NetworkLoadError::BadVersion { .. }
        ))
    ));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn chess960_full_round_trip() {
    let mut e = Engine::with_network(common::material_network());
    e.set_chess960(true);
    let fen = "bqnb1rkr/pp3ppp/3ppn2/2p5/5P2/P2P4/NPP1P1PP/BQ1BNRKR w HFhf - 2 9";
    e.set_position(fen, &[]).unwrap();
    assert_eq!(e.position().fen(), fen);

    let (tx, rx) = mpsc::channel::<String>();
    e.on_bestmove(move |best, _| {
        let _ = tx.send(best.to_string());
    });
    e.go(Limits::depth(4));
    e.wait_for_search_finished();
    let best = rx.recv_timeout(Duration::from_secs(30)).unwrap();
    assert!(e.position().parse_uci_move(&best).is_ok());
}

#[test]
fn uci_move_list_applies_en_passant_and_castling() {
    let mut e = Engine::with_network(NnueNetwork::zeroed());
    e.set_position(
        basalt::START_FEN,
        &["e2e4", "g8f6", "e4e5", "d7d5", "e5d6", "e7d6", "g1f3", "f8e7", "f1e2", "e8g8"],
    )
    .unwrap();
    // Black castled; the resulting position must agree.
    assert!(e.position().fen().contains("rnbq1rk1"));
}

#[test]
fn hashfull_grows_during_search() {
    let mut e = Engine::with_network(common::material_network());
    e.set_position(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        &[],
    )
    .unwrap();
    let (tx, rx) = mpsc::channel::<u32>();
    e.on_update_full(move |info| {
        let _ = tx.send(info.hashfull);
    });
    e.go(Limits::depth(6));
    e.wait_for_search_finished();
    let final_fill = rx.try_iter().last().unwrap_or(0);
    assert!(final_fill > 0, "TT should fill during a depth-6 search");
}

#[test]
fn nodes_accumulate_and_reset_per_go() {
    let e = {
        let mut e = Engine::with_network(NnueNetwork::zeroed());
        e.set_position(basalt::START_FEN, &[]).unwrap();
        e
    };
    e.go(Limits::depth(4));
    e.wait_for_search_finished();
    let first = e.nodes();
    assert!(first > 0);

    e.go(Limits::depth(1));
    e.wait_for_search_finished();
    assert!(e.nodes() < first, "node counter restarts per go");
}
