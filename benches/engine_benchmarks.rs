//! Criterion benchmarks: move generation, perft, make/unmake and a fixed
//! search workload.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use basalt::engine::Engine;
use basalt::nnue::NnueNetwork;
use basalt::position::{generate, GenType, Position};
use basalt::search::Limits;
use basalt::types::MoveList;

const KIWIPETE: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

fn bench_movegen(c: &mut Criterion) {
    let pos = Position::from_fen(KIWIPETE, false).unwrap();
    c.bench_function("movegen kiwipete legal", |b| {
        b.iter(|| {
            let mut list = MoveList::new();
            generate(black_box(&pos), GenType::Legal, &mut list);
            black_box(list.len())
        })
    });
}

fn bench_perft(c: &mut Criterion) {
    c.bench_function("perft startpos depth 4", |b| {
        let mut pos = Position::startpos();
        b.iter(|| black_box(basalt::perft(&mut pos, 4)))
    });
    c.bench_function("perft kiwipete depth 3", |b| {
        let mut pos = Position::from_fen(KIWIPETE, false).unwrap();
        b.iter(|| black_box(basalt::perft(&mut pos, 3)))
    });
}

fn bench_make_unmake(c: &mut Criterion) {
    let pos = Position::from_fen(KIWIPETE, false).unwrap();
    let mut list = MoveList::new();
    generate(&pos, GenType::Legal, &mut list);

    c.bench_function("make/unmake all kiwipete moves", |b| {
        let mut pos = pos.clone();
        b.iter(|| {
            for &m in &list {
                pos.do_move(m);
                pos.undo_move(m);
            }
        })
    });
}

fn bench_fixed_depth_search(c: &mut Criterion) {
    let mut engine = Engine::with_network(NnueNetwork::zeroed());
    engine.set_position(KIWIPETE, &[]).unwrap();

    c.bench_function("search kiwipete depth 5", |b| {
        b.iter(|| {
            engine.new_game().unwrap();
            engine.go(Limits::depth(5));
            engine.wait_for_search_finished();
            black_box(engine.nodes())
        })
    });
}

criterion_group!(
    benches,
    bench_movegen,
    bench_perft,
    bench_make_unmake,
    bench_fixed_depth_search
);
criterion_main!(benches);
