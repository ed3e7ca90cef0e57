//! Benchmarks for round resolution.
//!
//! Covers the parallel trajectory phase and the sequential sweep on a
//! crowded board.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rampart::gateway::compile_script;
use rampart::{Board, EngineConfig, LogicRegistry, Position, Profile, Side, resolve_round};

const SOURCES: [&str; 3] = [
    "x = x + 1",
    "x = x + 1; y = min(6, max(0, y + (t % 3) - 1))",
    "x = x + 2; y = y + (t % 2) * 2 - 1",
];

/// Fill both halves with offensive towers, `per_side` each.
fn crowded(rules: &EngineConfig, per_side: i16) -> (Board, LogicRegistry) {
    let mut board = Board::new(&rules.board, &rules.health);
    let mut logic = LogicRegistry::new(rules.logic.size_limit, rules.simulation.memory_size);
    let half = rules.board.width / 2;
    let mut placed = 0;
    'fill: for x in 1..half {
        for y in 0..rules.board.height {
            if placed == per_side {
                break 'fill;
            }
            for (side, pos) in [
                (Side::Player1, Position::new(x, y)),
                (Side::Player2, Position::new(rules.board.width - 1 - x, y)),
            ] {
                let id = board.install(side, pos, true).unwrap();
                let src = SOURCES[usize::from(placed.unsigned_abs()) % SOURCES.len()];
                logic
                    .install_bytecode(id, src, compile_script(src).unwrap())
                    .unwrap();
            }
            placed += 1;
        }
    }
    (board, logic)
}

fn bench_resolve_by_profile(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_round");
    for profile in [Profile::Sprint, Profile::Classic, Profile::Marathon] {
        let rules = EngineConfig::profile(profile);
        let (board, logic) = crowded(&rules, 8);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{profile:?}")), &rules, |b, rules| {
            b.iter(|| black_box(resolve_round(&board, &logic, rules, 0)));
        });
    }
    group.finish();
}

fn bench_resolve_by_towers(c: &mut Criterion) {
    let rules = EngineConfig::default();
    let mut group = c.benchmark_group("resolve_towers");
    for per_side in [1, 4, 16, 30] {
        let (board, logic) = crowded(&rules, per_side);
        group.bench_with_input(BenchmarkId::from_parameter(per_side * 2), &per_side, |b, _| {
            b.iter(|| black_box(resolve_round(&board, &logic, &rules, 0)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolve_by_profile, bench_resolve_by_towers);
criterion_main!(benches);
