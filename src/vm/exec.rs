//! Single-instruction semantics.

#![allow(clippy::cast_sign_loss)]

use crate::error::{TrapCause, VmResult};
use crate::isa::Instruction;

use super::{Cpu, Memory};

/// Execute `inst` located at `cpu.pc` and return the address of the next one.
///
/// Registers and memory are updated in place. `ecall` and `ebreak` are
/// reported as traps; the caller decides what an `ecall` means.
///
/// # Errors
///
/// Memory faults, misaligned jump targets and system instructions.
pub(crate) fn execute(inst: Instruction, cpu: &mut Cpu, memory: &mut Memory) -> VmResult<u32> {
    let pc = cpu.pc;
    let next = pc.wrapping_add(4);
    match inst {
        Instruction::Op { op, rd, rs1, rs2 } => {
            cpu.set_reg(rd, op.apply(cpu.reg(rs1), cpu.reg(rs2)));
        }
        Instruction::OpImm { op, rd, rs1, imm } => {
            cpu.set_reg(rd, op.apply(cpu.reg(rs1), imm as u32));
        }
        Instruction::Load {
            width,
            rd,
            rs1,
            imm,
        } => {
            let addr = cpu.reg(rs1).wrapping_add(imm as u32);
            let value = memory.load(addr, width)?;
            cpu.set_reg(rd, value);
        }
        Instruction::Store {
            width,
            rs1,
            rs2,
            imm,
        } => {
            let addr = cpu.reg(rs1).wrapping_add(imm as u32);
            memory.store(addr, width, cpu.reg(rs2))?;
        }
        Instruction::Branch {
            cond,
            rs1,
            rs2,
            imm,
        } => {
            if cond.holds(cpu.reg(rs1), cpu.reg(rs2)) {
                return jump_target(pc.wrapping_add(imm as u32));
            }
        }
        Instruction::Lui { rd, imm } => cpu.set_reg(rd, imm as u32),
        Instruction::Auipc { rd, imm } => cpu.set_reg(rd, pc.wrapping_add(imm as u32)),
        Instruction::Jal { rd, imm } => {
            let target = jump_target(pc.wrapping_add(imm as u32))?;
            cpu.set_reg(rd, next);
            return Ok(target);
        }
        Instruction::Jalr { rd, rs1, imm } => {
            let target = jump_target(cpu.reg(rs1).wrapping_add(imm as u32) & !1)?;
            cpu.set_reg(rd, next);
            return Ok(target);
        }
        Instruction::Fence => {}
        Instruction::Ecall => return Err(TrapCause::Ecall),
        Instruction::Ebreak => return Err(TrapCause::Ebreak),
    }
    Ok(next)
}

fn jump_target(target: u32) -> VmResult<u32> {
    if target.is_multiple_of(4) {
        Ok(target)
    } else {
        Err(TrapCause::InstructionMisaligned(target))
    }
}
