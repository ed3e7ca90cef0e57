//! RV32IM instruction set: decoded forms, decoding and encoding.

mod decode;
mod encode;
mod instruction;

pub use encode::{EncodeError, assemble, encode};
pub use instruction::{AluOp, BranchCond, Instruction, MemWidth, Reg};

/// Decode a 32-bit instruction word.
///
/// # Errors
///
/// Returns the original word if the opcode or function fields are not part
/// of RV32IM.
pub fn decode(word: u32) -> Result<Instruction, u32> {
    decode::decode(word)
}

/// ABI register names used by tower programs.
pub mod reg {
    use super::Reg;

    /// Hardwired zero.
    pub const ZERO: Reg = 0;
    /// Return address.
    pub const RA: Reg = 1;
    /// Stack pointer.
    pub const SP: Reg = 2;
    /// Temporaries t0-t2.
    pub const T0: Reg = 5;
    #[allow(missing_docs)]
    pub const T1: Reg = 6;
    #[allow(missing_docs)]
    pub const T2: Reg = 7;
    /// Argument/return registers a0-a7.
    pub const A0: Reg = 10;
    #[allow(missing_docs)]
    pub const A1: Reg = 11;
    #[allow(missing_docs)]
    pub const A2: Reg = 12;
    #[allow(missing_docs)]
    pub const A7: Reg = 17;
}
