//! Trajectory logic backed by a sandboxed RV32IM program.

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use crate::config::SimulationConfig;
use crate::game::Position;
use crate::isa::reg;
use crate::vm::{Metering, Program, RunResult, run};

use super::{Frame, InvalidReason, LogicStep, SYSCALL_RETURN, TrajectoryLogic};

/// Runs a deployed program once per tick from a pristine image.
#[derive(Debug)]
pub struct VmLogic<'a> {
    program: &'a Program,
    frame: Frame,
    metering: Metering,
    fuel_per_tick: u64,
    budget: u64,
    fuel_used: u64,
}

impl<'a> VmLogic<'a> {
    /// Logic for a tower whose owner sees the board through `frame`.
    #[must_use]
    pub fn new(program: &'a Program, frame: Frame, sim: &SimulationConfig) -> Self {
        VmLogic {
            program,
            frame,
            metering: sim.metering,
            fuel_per_tick: sim.fuel_per_tick,
            budget: u64::MAX,
            fuel_used: 0,
        }
    }

    /// Cap the fuel spent across all invocations at `budget`.
    #[must_use]
    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }
}

impl TrajectoryLogic for VmLogic<'_> {
    fn next_position(&mut self, tick: u32, current: Position) -> LogicStep {
        let local = self.frame.apply(current);
        let (mut cpu, mut memory) = self.program.instantiate();
        cpu.set_reg(reg::A0, tick);
        cpu.set_reg(reg::A1, i32::from(local.x) as u32);
        cpu.set_reg(reg::A2, i32::from(local.y) as u32);

        let fuel = self
            .fuel_per_tick
            .min(self.budget.saturating_sub(self.fuel_used));
        let report = run(&mut cpu, &mut memory, &self.metering, fuel);
        self.fuel_used += report.fuel_used;

        match report.result {
            RunResult::OutOfFuel if fuel < self.fuel_per_tick => {
                LogicStep::Invalid(InvalidReason::BudgetExhausted)
            }
            RunResult::OutOfFuel => LogicStep::Invalid(InvalidReason::OutOfFuel),
            RunResult::Trap(cause) => LogicStep::Invalid(InvalidReason::Trap(cause)),
            RunResult::Ecall => {
                let call = cpu.reg(reg::A7);
                if call != SYSCALL_RETURN {
                    return LogicStep::Invalid(InvalidReason::UnknownSyscall(call));
                }
                let x = cpu.reg(reg::A0) as i32;
                let y = cpu.reg(reg::A1) as i32;
                match (i16::try_from(x), i16::try_from(y)) {
                    (Ok(nx), Ok(ny)) => LogicStep::Next(self.frame.apply(Position::new(nx, ny))),
                    _ => LogicStep::Invalid(InvalidReason::OutOfRange { x, y }),
                }
            }
        }
    }

    fn fuel_used(&self) -> u64 {
        self.fuel_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::compile_script;
    use crate::logic::FORWARD_BYTECODE;
    use crate::vm::DEFAULT_MEMORY_SIZE;

    fn program(bytes: &[u8]) -> Program {
        Program::from_bytes(bytes, DEFAULT_MEMORY_SIZE).unwrap()
    }

    #[test]
    fn test_forward_in_both_frames() {
        let sim = SimulationConfig::default();
        let prog = program(&FORWARD_BYTECODE);

        let mut left = VmLogic::new(&prog, Frame::Board, &sim);
        assert_eq!(
            left.next_position(1, Position::new(3, 3)),
            LogicStep::Next(Position::new(4, 3))
        );

        let mut right = VmLogic::new(&prog, Frame::Mirrored { width: 14 }, &sim);
        assert_eq!(
            right.next_position(1, Position::new(10, 2)),
            LogicStep::Next(Position::new(9, 2))
        );
        assert_eq!(left.fuel_used(), 4);
    }

    #[test]
    fn test_tick_is_visible() {
        let sim = SimulationConfig::default();
        let prog = program(&compile_script("y = t").unwrap());
        let mut logic = VmLogic::new(&prog, Frame::Board, &sim);
        assert_eq!(
            logic.next_position(5, Position::new(0, 0)),
            LogicStep::Next(Position::new(0, 5))
        );
    }

    #[test]
    fn test_out_of_range_result() {
        let sim = SimulationConfig::default();
        let prog = program(&compile_script("x = 40000").unwrap());
        let mut logic = VmLogic::new(&prog, Frame::Board, &sim);
        assert_eq!(
            logic.next_position(1, Position::new(0, 0)),
            LogicStep::Invalid(InvalidReason::OutOfRange { x: 40000, y: 0 })
        );
    }

    #[test]
    fn test_unknown_syscall() {
        // addi a7, zero, 1; ecall
        let bytes = [0x93, 0x08, 0x10, 0x00, 0x73, 0x00, 0x00, 0x00];
        let sim = SimulationConfig::default();
        let prog = program(&bytes);
        let mut logic = VmLogic::new(&prog, Frame::Board, &sim);
        assert_eq!(
            logic.next_position(1, Position::new(0, 0)),
            LogicStep::Invalid(InvalidReason::UnknownSyscall(1))
        );
    }

    #[test]
    fn test_spinning_program_runs_out_of_fuel() {
        // beq zero, zero, 0
        let bytes = [0x63, 0x00, 0x00, 0x00];
        let sim = SimulationConfig {
            fuel_per_tick: 50,
            ..SimulationConfig::default()
        };
        let prog = program(&bytes);
        let mut logic = VmLogic::new(&prog, Frame::Board, &sim);
        assert_eq!(
            logic.next_position(1, Position::new(0, 0)),
            LogicStep::Invalid(InvalidReason::OutOfFuel)
        );
        assert_eq!(logic.fuel_used(), 50);
    }

    #[test]
    fn test_budget_bounds_fuel_across_ticks() {
        let sim = SimulationConfig::default();
        let prog = program(&FORWARD_BYTECODE);
        let mut logic = VmLogic::new(&prog, Frame::Board, &sim).with_budget(10);
        assert_eq!(
            logic.next_position(1, Position::new(0, 0)),
            LogicStep::Next(Position::new(1, 0))
        );
        assert_eq!(
            logic.next_position(2, Position::new(1, 0)),
            LogicStep::Next(Position::new(2, 0))
        );
        // Two of the four instructions fit in what is left.
        assert_eq!(
            logic.next_position(3, Position::new(2, 0)),
            LogicStep::Invalid(InvalidReason::BudgetExhausted)
        );
        assert_eq!(logic.fuel_used(), 10);
        assert_eq!(
            logic.next_position(4, Position::new(2, 0)),
            LogicStep::Invalid(InvalidReason::BudgetExhausted)
        );
        assert_eq!(logic.fuel_used(), 10);
    }
}
