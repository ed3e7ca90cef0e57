//! Register file and program counter of a tower program.

use crate::isa::Reg;

/// RV32 hart state. `x0` reads as zero and ignores writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cpu {
    regs: [u32; 32],
    /// Address of the next instruction.
    pub pc: u32,
}

impl Cpu {
    /// A hart with cleared registers starting at `entry`.
    #[must_use]
    pub fn at(entry: u32) -> Self {
        Cpu {
            regs: [0; 32],
            pc: entry,
        }
    }

    /// Read a register.
    #[inline]
    #[must_use]
    pub fn reg(&self, r: Reg) -> u32 {
        if r == 0 { 0 } else { self.regs[usize::from(r & 0x1F)] }
    }

    /// Write a register; writes to `x0` are dropped.
    #[inline]
    pub fn set_reg(&mut self, r: Reg, value: u32) {
        if r != 0 {
            self.regs[usize::from(r & 0x1F)] = value;
        }
    }

    /// The full register file, for traces and tests.
    #[must_use]
    pub fn regs(&self) -> &[u32; 32] {
        &self.regs
    }
}
