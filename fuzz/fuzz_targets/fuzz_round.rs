#![no_main]

//! Round resolution fuzzer.
//!
//! Builds a board from fuzzer-chosen towers and scripts, resolves a round
//! twice and checks the reports agree and only valid projectiles did damage.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rampart::gateway::compile_script;
use rampart::{Board, EngineConfig, LogicRegistry, Position, Side, resolve_round};

#[derive(Arbitrary, Debug)]
struct FuzzTower {
    player2: bool,
    x: u8,
    y: u8,
    dx: i8,
    dy: i8,
    period: u8,
}

#[derive(Arbitrary, Debug)]
struct Input {
    ticks: u8,
    radius: u8,
    towers: Vec<FuzzTower>,
}

fuzz_target!(|input: Input| {
    let mut rules = EngineConfig::default();
    rules.simulation.tick_count = u32::from(input.ticks % 64) + 1;
    rules.simulation.collision_radius = u16::from(input.radius % 3) + 1;

    let mut board = Board::new(&rules.board, &rules.health);
    let mut logic = LogicRegistry::new(rules.logic.size_limit, rules.simulation.memory_size);
    for tower in input.towers.iter().take(32) {
        let side = if tower.player2 { Side::Player2 } else { Side::Player1 };
        let at = Position::new(i16::from(tower.x % 14), i16::from(tower.y % 7));
        let Ok(id) = board.install(side, at, true) else {
            continue;
        };
        let source = format!(
            "x = x + {}; y = y + {} * (t % {})",
            tower.dx % 4,
            tower.dy % 4,
            u16::from(tower.period) + 1
        );
        let Ok(bytecode) = compile_script(&source) else {
            continue;
        };
        let _ = logic.install_bytecode(id, &source, bytecode);
    }

    let first = resolve_round(&board, &logic, &rules, 0);
    let second = resolve_round(&board, &logic, &rules, 0);
    assert_eq!(first, second);
    if let Ok(report) = first {
        for event in &report.damage {
            assert!(report.trajectories[&event.source].is_valid());
        }
    }
});
