//! Instruction word decoding.

#![allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]

use super::instruction::{AluOp, BranchCond, Instruction, MemWidth};

pub(super) const LOAD: u32 = 0x03;
pub(super) const FENCE: u32 = 0x0F;
pub(super) const OP_IMM: u32 = 0x13;
pub(super) const AUIPC: u32 = 0x17;
pub(super) const STORE: u32 = 0x23;
pub(super) const OP: u32 = 0x33;
pub(super) const LUI: u32 = 0x37;
pub(super) const BRANCH: u32 = 0x63;
pub(super) const JALR: u32 = 0x67;
pub(super) const JAL: u32 = 0x6F;
pub(super) const SYSTEM: u32 = 0x73;

/// Decode a 32-bit word. Unknown encodings return the word unchanged.
pub(super) fn decode(word: u32) -> Result<Instruction, u32> {
    let rd = ((word >> 7) & 0x1F) as u8;
    let funct3 = (word >> 12) & 0x07;
    let rs1 = ((word >> 15) & 0x1F) as u8;
    let rs2 = ((word >> 20) & 0x1F) as u8;
    let funct7 = word >> 25;

    let inst = match word & 0x7F {
        OP => Instruction::Op {
            op: register_op(funct7, funct3).ok_or(word)?,
            rd,
            rs1,
            rs2,
        },
        OP_IMM => immediate_op(rd, funct3, rs1, word).ok_or(word)?,
        LOAD => Instruction::Load {
            width: load_width(funct3).ok_or(word)?,
            rd,
            rs1,
            imm: i_imm(word),
        },
        STORE => Instruction::Store {
            width: store_width(funct3).ok_or(word)?,
            rs1,
            rs2,
            imm: s_imm(word),
        },
        BRANCH => Instruction::Branch {
            cond: branch_cond(funct3).ok_or(word)?,
            rs1,
            rs2,
            imm: b_imm(word),
        },
        LUI => Instruction::Lui { rd, imm: u_imm(word) },
        AUIPC => Instruction::Auipc { rd, imm: u_imm(word) },
        JAL => Instruction::Jal { rd, imm: j_imm(word) },
        JALR if funct3 == 0 => Instruction::Jalr {
            rd,
            rs1,
            imm: i_imm(word),
        },
        FENCE => Instruction::Fence,
        SYSTEM if funct3 == 0 => match word >> 20 {
            0 => Instruction::Ecall,
            1 => Instruction::Ebreak,
            _ => return Err(word),
        },
        _ => return Err(word),
    };
    Ok(inst)
}

fn register_op(funct7: u32, funct3: u32) -> Option<AluOp> {
    let op = match (funct7, funct3) {
        (0b000_0000, 0b000) => AluOp::Add,
        (0b010_0000, 0b000) => AluOp::Sub,
        (0b000_0000, 0b001) => AluOp::Sll,
        (0b000_0000, 0b010) => AluOp::Slt,
        (0b000_0000, 0b011) => AluOp::Sltu,
        (0b000_0000, 0b100) => AluOp::Xor,
        (0b000_0000, 0b101) => AluOp::Srl,
        (0b010_0000, 0b101) => AluOp::Sra,
        (0b000_0000, 0b110) => AluOp::Or,
        (0b000_0000, 0b111) => AluOp::And,
        (0b000_0001, 0b000) => AluOp::Mul,
        (0b000_0001, 0b001) => AluOp::Mulh,
        (0b000_0001, 0b010) => AluOp::Mulhsu,
        (0b000_0001, 0b011) => AluOp::Mulhu,
        (0b000_0001, 0b100) => AluOp::Div,
        (0b000_0001, 0b101) => AluOp::Divu,
        (0b000_0001, 0b110) => AluOp::Rem,
        (0b000_0001, 0b111) => AluOp::Remu,
        _ => return None,
    };
    Some(op)
}

fn immediate_op(rd: u8, funct3: u32, rs1: u8, word: u32) -> Option<Instruction> {
    let funct7 = word >> 25;
    let shamt = ((word >> 20) & 0x1F) as i32;
    let (op, imm) = match (funct3, funct7) {
        (0b000, _) => (AluOp::Add, i_imm(word)),
        (0b010, _) => (AluOp::Slt, i_imm(word)),
        (0b011, _) => (AluOp::Sltu, i_imm(word)),
        (0b100, _) => (AluOp::Xor, i_imm(word)),
        (0b110, _) => (AluOp::Or, i_imm(word)),
        (0b111, _) => (AluOp::And, i_imm(word)),
        (0b001, 0b000_0000) => (AluOp::Sll, shamt),
        (0b101, 0b000_0000) => (AluOp::Srl, shamt),
        (0b101, 0b010_0000) => (AluOp::Sra, shamt),
        _ => return None,
    };
    Some(Instruction::OpImm { op, rd, rs1, imm })
}

fn load_width(funct3: u32) -> Option<MemWidth> {
    match funct3 {
        0b000 => Some(MemWidth::Byte),
        0b001 => Some(MemWidth::Half),
        0b010 => Some(MemWidth::Word),
        0b100 => Some(MemWidth::ByteUnsigned),
        0b101 => Some(MemWidth::HalfUnsigned),
        _ => None,
    }
}

fn store_width(funct3: u32) -> Option<MemWidth> {
    match funct3 {
        0b000 => Some(MemWidth::Byte),
        0b001 => Some(MemWidth::Half),
        0b010 => Some(MemWidth::Word),
        _ => None,
    }
}

fn branch_cond(funct3: u32) -> Option<BranchCond> {
    match funct3 {
        0b000 => Some(BranchCond::Eq),
        0b001 => Some(BranchCond::Ne),
        0b100 => Some(BranchCond::Lt),
        0b101 => Some(BranchCond::Ge),
        0b110 => Some(BranchCond::Ltu),
        0b111 => Some(BranchCond::Geu),
        _ => None,
    }
}

/// imm[11:0] = inst[31:20]
fn i_imm(word: u32) -> i32 {
    (word as i32) >> 20
}

/// imm[11:5] = inst[31:25], imm[4:0] = inst[11:7]
fn s_imm(word: u32) -> i32 {
    let imm = ((word >> 25) << 5) | ((word >> 7) & 0x1F);
    ((imm as i32) << 20) >> 20
}

/// imm[12|10:5|4:1|11] = inst[31|30:25|11:8|7]
fn b_imm(word: u32) -> i32 {
    let imm = ((word >> 31) << 12)
        | (((word >> 7) & 0x1) << 11)
        | (((word >> 25) & 0x3F) << 5)
        | (((word >> 8) & 0xF) << 1);
    ((imm as i32) << 19) >> 19
}

/// imm[31:12] = inst[31:12]
fn u_imm(word: u32) -> i32 {
    (word & 0xFFFF_F000) as i32
}

/// imm[20|10:1|11|19:12] = inst[31|30:21|20|19:12]
fn j_imm(word: u32) -> i32 {
    let imm = ((word >> 31) << 20)
        | (((word >> 12) & 0xFF) << 12)
        | (((word >> 20) & 0x1) << 11)
        | (((word >> 21) & 0x3FF) << 1);
    ((imm as i32) << 11) >> 11
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_add() {
        // add x3, x1, x2
        assert_eq!(
            decode(0x0020_81B3),
            Ok(Instruction::Op {
                op: AluOp::Add,
                rd: 3,
                rs1: 1,
                rs2: 2
            })
        );
    }

    #[test]
    fn test_decode_negative_addi() {
        // addi x1, x0, -1
        assert_eq!(
            decode(0xFFF0_0093),
            Ok(Instruction::OpImm {
                op: AluOp::Add,
                rd: 1,
                rs1: 0,
                imm: -1
            })
        );
    }

    #[test]
    fn test_decode_mul_and_branch() {
        // mul x5, x6, x7
        assert_eq!(
            decode(0x0273_02B3),
            Ok(Instruction::Op {
                op: AluOp::Mul,
                rd: 5,
                rs1: 6,
                rs2: 7
            })
        );
        // beq x0, x0, -4
        assert_eq!(
            decode(0xFE00_0EE3),
            Ok(Instruction::Branch {
                cond: BranchCond::Eq,
                rs1: 0,
                rs2: 0,
                imm: -4
            })
        );
    }

    #[test]
    fn test_decode_system() {
        assert_eq!(decode(0x0000_0073), Ok(Instruction::Ecall));
        assert_eq!(decode(0x0010_0073), Ok(Instruction::Ebreak));
        // csrrw is not supported
        assert_eq!(decode(0x0000_1073), Err(0x0000_1073));
    }

    #[test]
    fn test_decode_garbage() {
        assert_eq!(decode(0), Err(0));
        assert_eq!(decode(0xFFFF_FFFF), Err(0xFFFF_FFFF));
    }
}
