//! Benchmarks for the RV32IM interpreter.

#![allow(missing_docs)] // Benchmark macros generate undocumented functions
#![allow(clippy::unreadable_literal)] // Instruction encodings are standard hex
#![allow(clippy::unwrap_used)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use rampart::config::SimulationConfig;
use rampart::game::Position;
use rampart::gateway::compile_script;
use rampart::isa::{decode, reg};
use rampart::logic::{FORWARD_BYTECODE, Frame, LogicStep, TrajectoryLogic, VmLogic};
use rampart::vm::{DEFAULT_MEMORY_SIZE, Metering, Program, run};

const WEAVE: &str = "x = x + 1; y = min(6, max(0, y + (t % 3) - 1))";

fn bench_decode(c: &mut Criterion) {
    let instructions = [
        0x00108093u32, // addi x1, x1, 1
        0x002081B3u32, // add x3, x1, x2
        0x00208463u32, // beq x1, x2, 8
        0x0000006Fu32, // jal x0, 0
        0x02B50533u32, // mul x10, x10, x11
    ];

    c.bench_function("decode_1000", |b| {
        b.iter(|| {
            for _ in 0..200 {
                for inst in &instructions {
                    let _ = black_box(decode(*inst));
                }
            }
        });
    });
}

fn bench_single_invocation(c: &mut Criterion) {
    let program = Program::from_bytes(&compile_script(WEAVE).unwrap(), DEFAULT_MEMORY_SIZE).unwrap();
    let metering = Metering::default();

    c.bench_function("invoke_weave", |b| {
        b.iter(|| {
            let (mut cpu, mut memory) = program.instantiate();
            cpu.set_reg(reg::A0, 5);
            cpu.set_reg(reg::A1, 3);
            cpu.set_reg(reg::A2, 3);
            black_box(run(&mut cpu, &mut memory, &metering, 10_000))
        });
    });
}

fn bench_round_of_ticks(c: &mut Criterion) {
    let sim = SimulationConfig::default();
    let forward = Program::from_bytes(&FORWARD_BYTECODE, DEFAULT_MEMORY_SIZE).unwrap();
    let weave = Program::from_bytes(&compile_script(WEAVE).unwrap(), DEFAULT_MEMORY_SIZE).unwrap();

    for (name, program) in [("ticks_forward", &forward), ("ticks_weave", &weave)] {
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut logic = VmLogic::new(program, Frame::Board, &sim);
                let mut pos = Position::new(1, 3);
                for tick in 1..=sim.tick_count {
                    if let LogicStep::Next(next) = black_box(logic.next_position(tick, pos)) {
                        pos = next;
                    }
                }
                logic.fuel_used()
            });
        });
    }
}

criterion_group!(benches, bench_decode, bench_single_invocation, bench_round_of_ticks);
criterion_main!(benches);
