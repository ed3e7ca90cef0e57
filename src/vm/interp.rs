//! Fuel-metered interpreter loop.

use serde::{Deserialize, Serialize};

use crate::error::TrapCause;
use crate::isa::{Instruction, decode};

use super::exec::execute;
use super::{Cpu, Memory};

/// Fuel cost of each instruction class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metering {
    /// ALU, branches, jumps, system.
    pub base: u64,
    /// Loads and stores.
    pub memory: u64,
    /// Multiplication.
    pub multiply: u64,
    /// Division and remainder.
    pub divide: u64,
}

impl Default for Metering {
    fn default() -> Self {
        Metering {
            base: 1,
            memory: 2,
            multiply: 1,
            divide: 4,
        }
    }
}

impl Metering {
    /// Cost of one instruction.
    #[must_use]
    pub fn cost(&self, inst: &Instruction) -> u64 {
        match inst {
            Instruction::Load { .. } | Instruction::Store { .. } => self.memory,
            Instruction::Op { op, .. } if op.is_division() => self.divide,
            Instruction::Op { op, .. } if op.is_muldiv() => self.multiply,
            _ => self.base,
        }
    }
}

/// How a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    /// The program executed `ecall`; `pc` already points past it.
    Ecall,
    /// The program faulted.
    Trap(TrapCause),
    /// The next instruction would have exceeded the budget.
    OutOfFuel,
}

/// Outcome of [`run`] plus the fuel it consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Why execution stopped.
    pub result: RunResult,
    /// Fuel consumed, never more than the budget.
    pub fuel_used: u64,
}

/// Run until `ecall`, a trap, or fuel exhaustion.
///
/// # Determinism
///
/// The result depends only on the initial `cpu`, `memory` and `fuel`.
pub fn run(cpu: &mut Cpu, memory: &mut Memory, metering: &Metering, fuel: u64) -> RunReport {
    let mut used = 0u64;
    let stop = |result, fuel_used| RunReport { result, fuel_used };
    loop {
        if !cpu.pc.is_multiple_of(4) {
            return stop(RunResult::Trap(TrapCause::InstructionMisaligned(cpu.pc)), used);
        }
        let word = match memory.fetch(cpu.pc) {
            Ok(word) => word,
            Err(cause) => return stop(RunResult::Trap(cause), used),
        };
        let inst = match decode(word) {
            Ok(inst) => inst,
            Err(word) => return stop(RunResult::Trap(TrapCause::InvalidInstruction(word)), used),
        };
        let cost = metering.cost(&inst);
        if used + cost > fuel {
            return stop(RunResult::OutOfFuel, used);
        }
        used += cost;
        match execute(inst, cpu, memory) {
            Ok(next) => cpu.pc = next,
            Err(TrapCause::Ecall) => {
                cpu.pc = cpu.pc.wrapping_add(4);
                return stop(RunResult::Ecall, used);
            }
            Err(cause) => return stop(RunResult::Trap(cause), used),
        }
    }
}
