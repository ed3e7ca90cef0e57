//! Decoded RV32IM instruction forms.
//!
//! Instructions are grouped by format rather than listed one variant per
//! mnemonic: the ALU operation, memory width or branch condition is carried
//! as a field so that execution and encoding can share one table each.

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]

use std::fmt;

/// Register index (0-31).
pub type Reg = u8;

/// Arithmetic/logic operation shared by register and immediate forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction (register form only).
    Sub,
    /// Shift left logical.
    Sll,
    /// Set if less than, signed.
    Slt,
    /// Set if less than, unsigned.
    Sltu,
    /// Bitwise exclusive or.
    Xor,
    /// Shift right logical.
    Srl,
    /// Shift right arithmetic.
    Sra,
    /// Bitwise or.
    Or,
    /// Bitwise and.
    And,
    /// Low 32 bits of the product.
    Mul,
    /// High 32 bits, signed x signed.
    Mulh,
    /// High 32 bits, signed x unsigned.
    Mulhsu,
    /// High 32 bits, unsigned x unsigned.
    Mulhu,
    /// Signed division.
    Div,
    /// Unsigned division.
    Divu,
    /// Signed remainder.
    Rem,
    /// Unsigned remainder.
    Remu,
}

impl AluOp {
    /// Apply the operation to two register values.
    ///
    /// Division by zero and signed overflow follow the RISC-V M extension:
    /// no trap, quotient all ones, remainder equals the dividend.
    #[must_use]
    pub fn apply(self, a: u32, b: u32) -> u32 {
        let sa = a as i32;
        let sb = b as i32;
        match self {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            AluOp::Sll => a << (b & 0x1F),
            AluOp::Slt => u32::from(sa < sb),
            AluOp::Sltu => u32::from(a < b),
            AluOp::Xor => a ^ b,
            AluOp::Srl => a >> (b & 0x1F),
            AluOp::Sra => (sa >> (b & 0x1F)) as u32,
            AluOp::Or => a | b,
            AluOp::And => a & b,
            AluOp::Mul => a.wrapping_mul(b),
            AluOp::Mulh => ((i64::from(sa) * i64::from(sb)) >> 32) as u32,
            AluOp::Mulhsu => ((i64::from(sa) * i64::from(b)) >> 32) as u32,
            AluOp::Mulhu => ((u64::from(a) * u64::from(b)) >> 32) as u32,
            AluOp::Div => {
                if b == 0 {
                    u32::MAX
                } else {
                    sa.wrapping_div(sb) as u32
                }
            }
            AluOp::Divu => a.checked_div(b).unwrap_or(u32::MAX),
            AluOp::Rem => {
                if b == 0 {
                    a
                } else {
                    sa.wrapping_rem(sb) as u32
                }
            }
            AluOp::Remu => a.checked_rem(b).unwrap_or(a),
        }
    }

    /// True for the M extension operations.
    #[must_use]
    pub fn is_muldiv(self) -> bool {
        matches!(
            self,
            AluOp::Mul
                | AluOp::Mulh
                | AluOp::Mulhsu
                | AluOp::Mulhu
                | AluOp::Div
                | AluOp::Divu
                | AluOp::Rem
                | AluOp::Remu
        )
    }

    /// True for division and remainder.
    #[must_use]
    pub fn is_division(self) -> bool {
        matches!(self, AluOp::Div | AluOp::Divu | AluOp::Rem | AluOp::Remu)
    }
}

/// Width and signedness of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemWidth {
    /// 8-bit, sign-extended on load.
    Byte,
    /// 16-bit, sign-extended on load.
    Half,
    /// 32-bit.
    Word,
    /// 8-bit, zero-extended on load.
    ByteUnsigned,
    /// 16-bit, zero-extended on load.
    HalfUnsigned,
}

impl MemWidth {
    /// Number of bytes touched.
    #[must_use]
    pub fn bytes(self) -> u32 {
        match self {
            MemWidth::Byte | MemWidth::ByteUnsigned => 1,
            MemWidth::Half | MemWidth::HalfUnsigned => 2,
            MemWidth::Word => 4,
        }
    }
}

/// Branch comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCond {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than, signed.
    Lt,
    /// Greater or equal, signed.
    Ge,
    /// Less than, unsigned.
    Ltu,
    /// Greater or equal, unsigned.
    Geu,
}

impl BranchCond {
    /// Evaluate the condition.
    #[must_use]
    pub fn holds(self, a: u32, b: u32) -> bool {
        match self {
            BranchCond::Eq => a == b,
            BranchCond::Ne => a != b,
            BranchCond::Lt => (a as i32) < (b as i32),
            BranchCond::Ge => (a as i32) >= (b as i32),
            BranchCond::Ltu => a < b,
            BranchCond::Geu => a >= b,
        }
    }
}

/// A decoded instruction.
///
/// Immediates are stored sign-extended. For `Lui`/`Auipc` the immediate is
/// already shifted into the upper 20 bits. For shifts in `OpImm`, `imm` is
/// the shift amount.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Op { op: AluOp, rd: Reg, rs1: Reg, rs2: Reg },
    OpImm { op: AluOp, rd: Reg, rs1: Reg, imm: i32 },
    Load { width: MemWidth, rd: Reg, rs1: Reg, imm: i32 },
    Store { width: MemWidth, rs1: Reg, rs2: Reg, imm: i32 },
    Branch { cond: BranchCond, rs1: Reg, rs2: Reg, imm: i32 },
    Lui { rd: Reg, imm: i32 },
    Auipc { rd: Reg, imm: i32 },
    Jal { rd: Reg, imm: i32 },
    Jalr { rd: Reg, rs1: Reg, imm: i32 },
    Fence,
    Ecall,
    Ebreak,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::Op { op, rd, rs1, rs2 } => {
                write!(f, "{} x{rd}, x{rs1}, x{rs2}", format!("{op:?}").to_lowercase())
            }
            Instruction::OpImm { op, rd, rs1, imm } => {
                write!(f, "{}i x{rd}, x{rs1}, {imm}", format!("{op:?}").to_lowercase())
            }
            Instruction::Load { width, rd, rs1, imm } => {
                write!(f, "load.{width:?} x{rd}, {imm}(x{rs1})")
            }
            Instruction::Store { width, rs1, rs2, imm } => {
                write!(f, "store.{width:?} x{rs2}, {imm}(x{rs1})")
            }
            Instruction::Branch { cond, rs1, rs2, imm } => {
                write!(f, "b{} x{rs1}, x{rs2}, {imm}", format!("{cond:?}").to_lowercase())
            }
            Instruction::Lui { rd, imm } => write!(f, "lui x{rd}, {:#x}", (imm as u32) >> 12),
            Instruction::Auipc { rd, imm } => {
                write!(f, "auipc x{rd}, {:#x}", (imm as u32) >> 12)
            }
            Instruction::Jal { rd, imm } => write!(f, "jal x{rd}, {imm}"),
            Instruction::Jalr { rd, rs1, imm } => write!(f, "jalr x{rd}, {imm}(x{rs1})"),
            Instruction::Fence => write!(f, "fence"),
            Instruction::Ecall => write!(f, "ecall"),
            Instruction::Ebreak => write!(f, "ebreak"),
        }
    }
}
