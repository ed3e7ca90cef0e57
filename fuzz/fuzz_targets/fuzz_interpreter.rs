#![no_main]

//! Interpreter fuzzer.
//!
//! Feeds arbitrary bytes as a flat tower image and runs it for a handful of
//! ticks. Any image must either be rejected at load or produce a position
//! or an invalid step, never a panic.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rampart::config::SimulationConfig;
use rampart::game::Position;
use rampart::logic::{Frame, LogicStep, TrajectoryLogic, VmLogic};
use rampart::vm::Program;

#[derive(Arbitrary, Debug)]
struct Input {
    mirrored: bool,
    x: i8,
    y: i8,
    image: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let mut sim = SimulationConfig::default();
    sim.fuel_per_tick = 2_000;
    let Ok(program) = Program::from_bytes(&input.image, 64 * 1024) else {
        return;
    };
    let frame = if input.mirrored {
        Frame::Mirrored { width: 14 }
    } else {
        Frame::Board
    };
    let mut logic = VmLogic::new(&program, frame, &sim);
    let mut pos = Position::new(i16::from(input.x), i16::from(input.y));
    for tick in 1..=8 {
        match logic.next_position(tick, pos) {
            LogicStep::Next(next) => pos = next,
            LogicStep::Invalid(_) => break,
        }
    }
    assert!(logic.fuel_used() <= 8 * sim.fuel_per_tick);
});
