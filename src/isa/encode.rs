//! Instruction encoding, the inverse of decoding.
//!
//! Used to build the built-in tower programs and by the script compiler.

#![allow(clippy::cast_sign_loss)]

use thiserror::Error;

use super::decode::{AUIPC, BRANCH, FENCE, JAL, JALR, LOAD, LUI, OP, OP_IMM, STORE, SYSTEM};
use super::instruction::{AluOp, BranchCond, Instruction, MemWidth};

/// Why an instruction could not be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Immediate does not fit the instruction format.
    #[error("immediate {imm} does not fit in {bits} bits")]
    ImmediateOutOfRange {
        /// The offending value.
        imm: i32,
        /// Width of the field.
        bits: u32,
    },
    /// Branch or jump offset is odd.
    #[error("jump offset {0} is not 2-byte aligned")]
    MisalignedOffset(i32),
    /// Operation has no encoding in this format (e.g. `subi`).
    #[error("{0:?} has no immediate form")]
    NoImmediateForm(AluOp),
    /// Register index above 31.
    #[error("register x{0} does not exist")]
    BadRegister(u8),
}

/// Encode one instruction.
///
/// # Errors
///
/// Returns [`EncodeError`] when a field does not fit its format.
pub fn encode(inst: &Instruction) -> Result<u32, EncodeError> {
    let word = match *inst {
        Instruction::Op { op, rd, rs1, rs2 } => {
            let (funct7, funct3) = register_fields(op);
            r_type(OP, reg(rd)?, funct3, reg(rs1)?, reg(rs2)?, funct7)
        }
        Instruction::OpImm { op, rd, rs1, imm } => {
            let (funct3, field) = immediate_fields(op, imm)?;
            i_type(OP_IMM, reg(rd)?, funct3, reg(rs1)?, field)
        }
        Instruction::Load {
            width,
            rd,
            rs1,
            imm,
        } => {
            let funct3 = match width {
                MemWidth::Byte => 0b000,
                MemWidth::Half => 0b001,
                MemWidth::Word => 0b010,
                MemWidth::ByteUnsigned => 0b100,
                MemWidth::HalfUnsigned => 0b101,
            };
            i_type(LOAD, reg(rd)?, funct3, reg(rs1)?, signed(imm, 12)?)
        }
        Instruction::Store {
            width,
            rs1,
            rs2,
            imm,
        } => {
            let funct3 = match width {
                MemWidth::Byte | MemWidth::ByteUnsigned => 0b000,
                MemWidth::Half | MemWidth::HalfUnsigned => 0b001,
                MemWidth::Word => 0b010,
            };
            let imm = signed(imm, 12)?;
            ((imm >> 5) << 25)
                | (u32::from(reg(rs2)?) << 20)
                | (u32::from(reg(rs1)?) << 15)
                | (funct3 << 12)
                | ((imm & 0x1F) << 7)
                | STORE
        }
        Instruction::Branch {
            cond,
            rs1,
            rs2,
            imm,
        } => {
            let funct3 = match cond {
                BranchCond::Eq => 0b000,
                BranchCond::Ne => 0b001,
                BranchCond::Lt => 0b100,
                BranchCond::Ge => 0b101,
                BranchCond::Ltu => 0b110,
                BranchCond::Geu => 0b111,
            };
            let imm = even(imm, 13)?;
            (((imm >> 12) & 0x1) << 31)
                | (((imm >> 5) & 0x3F) << 25)
                | (u32::from(reg(rs2)?) << 20)
                | (u32::from(reg(rs1)?) << 15)
                | (funct3 << 12)
                | (((imm >> 1) & 0xF) << 8)
                | (((imm >> 11) & 0x1) << 7)
                | BRANCH
        }
        Instruction::Lui { rd, imm } => upper(LUI, rd, imm)?,
        Instruction::Auipc { rd, imm } => upper(AUIPC, rd, imm)?,
        Instruction::Jal { rd, imm } => {
            let imm = even(imm, 21)?;
            (((imm >> 20) & 0x1) << 31)
                | (((imm >> 1) & 0x3FF) << 21)
                | (((imm >> 11) & 0x1) << 20)
                | (((imm >> 12) & 0xFF) << 12)
                | (u32::from(reg(rd)?) << 7)
                | JAL
        }
        Instruction::Jalr { rd, rs1, imm } => {
            i_type(JALR, reg(rd)?, 0, reg(rs1)?, signed(imm, 12)?)
        }
        Instruction::Fence => 0x0FF0_0000 | FENCE,
        Instruction::Ecall => SYSTEM,
        Instruction::Ebreak => (1 << 20) | SYSTEM,
    };
    Ok(word)
}

/// Encode a sequence into little-endian machine code.
///
/// # Errors
///
/// Fails on the first instruction that cannot be encoded.
pub fn assemble(program: &[Instruction]) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = Vec::with_capacity(program.len() * 4);
    for inst in program {
        bytes.extend_from_slice(&encode(inst)?.to_le_bytes());
    }
    Ok(bytes)
}

fn register_fields(op: AluOp) -> (u32, u32) {
    match op {
        AluOp::Add => (0b000_0000, 0b000),
        AluOp::Sub => (0b010_0000, 0b000),
        AluOp::Sll => (0b000_0000, 0b001),
        AluOp::Slt => (0b000_0000, 0b010),
        AluOp::Sltu => (0b000_0000, 0b011),
        AluOp::Xor => (0b000_0000, 0b100),
        AluOp::Srl => (0b000_0000, 0b101),
        AluOp::Sra => (0b010_0000, 0b101),
        AluOp::Or => (0b000_0000, 0b110),
        AluOp::And => (0b000_0000, 0b111),
        AluOp::Mul => (0b000_0001, 0b000),
        AluOp::Mulh => (0b000_0001, 0b001),
        AluOp::Mulhsu => (0b000_0001, 0b010),
        AluOp::Mulhu => (0b000_0001, 0b011),
        AluOp::Div => (0b000_0001, 0b100),
        AluOp::Divu => (0b000_0001, 0b101),
        AluOp::Rem => (0b000_0001, 0b110),
        AluOp::Remu => (0b000_0001, 0b111),
    }
}

/// Returns `(funct3, imm[11:0])` for the immediate ALU form.
fn immediate_fields(op: AluOp, imm: i32) -> Result<(u32, u32), EncodeError> {
    let shift = |imm: i32| {
        if (0..32).contains(&imm) {
            Ok(imm as u32)
        } else {
            Err(EncodeError::ImmediateOutOfRange { imm, bits: 5 })
        }
    };
    Ok(match op {
        AluOp::Add => (0b000, signed(imm, 12)?),
        AluOp::Slt => (0b010, signed(imm, 12)?),
        AluOp::Sltu => (0b011, signed(imm, 12)?),
        AluOp::Xor => (0b100, signed(imm, 12)?),
        AluOp::Or => (0b110, signed(imm, 12)?),
        AluOp::And => (0b111, signed(imm, 12)?),
        AluOp::Sll => (0b001, shift(imm)?),
        AluOp::Srl => (0b101, shift(imm)?),
        AluOp::Sra => (0b101, shift(imm)? | (0b010_0000 << 5)),
        other => return Err(EncodeError::NoImmediateForm(other)),
    })
}

fn r_type(opcode: u32, rd: u8, funct3: u32, rs1: u8, rs2: u8, funct7: u32) -> u32 {
    (funct7 << 25)
        | (u32::from(rs2) << 20)
        | (u32::from(rs1) << 15)
        | (funct3 << 12)
        | (u32::from(rd) << 7)
        | opcode
}

fn i_type(opcode: u32, rd: u8, funct3: u32, rs1: u8, imm: u32) -> u32 {
    (imm << 20) | (u32::from(rs1) << 15) | (funct3 << 12) | (u32::from(rd) << 7) | opcode
}

fn upper(opcode: u32, rd: u8, imm: i32) -> Result<u32, EncodeError> {
    if imm & 0xFFF != 0 {
        return Err(EncodeError::ImmediateOutOfRange { imm, bits: 20 });
    }
    Ok((imm as u32) | (u32::from(reg(rd)?) << 7) | opcode)
}

fn reg(r: u8) -> Result<u8, EncodeError> {
    if r < 32 { Ok(r) } else { Err(EncodeError::BadRegister(r)) }
}

/// Check that `imm` fits in a signed field of `bits` and mask it to that width.
fn signed(imm: i32, bits: u32) -> Result<u32, EncodeError> {
    let min = -(1i32 << (bits - 1));
    let max = (1i32 << (bits - 1)) - 1;
    if (min..=max).contains(&imm) {
        Ok((imm as u32) & ((1u32 << bits) - 1))
    } else {
        Err(EncodeError::ImmediateOutOfRange { imm, bits })
    }
}

fn even(imm: i32, bits: u32) -> Result<u32, EncodeError> {
    if imm % 2 != 0 {
        return Err(EncodeError::MisalignedOffset(imm));
    }
    signed(imm, bits)
}
