//! Tower program images: flat RV32 code or a RISC-V ELF.
//!
//! A [`Program`] is validated once when logic is deployed and then
//! instantiated into a fresh [`Cpu`]/[`Memory`] pair for every invocation,
//! so no state leaks from one tick to the next.

use goblin::elf::Elf;
use goblin::elf::program_header::PT_LOAD;
use thiserror::Error;

use super::{Cpu, Memory};
use crate::isa::reg;

/// Load address of flat images and the base of program memory.
pub const TEXT_BASE: u32 = 0x8000_0000;

/// Default program memory: code, data and stack together.
pub const DEFAULT_MEMORY_SIZE: u32 = 64 * 1024;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const GP_REG: u8 = 3;

/// Why a compiled image cannot run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// Zero bytes of code.
    #[error("program is empty")]
    Empty,
    /// Flat code must be whole instruction words.
    #[error("flat image of {0} bytes is not a whole number of instructions")]
    Unaligned(usize),
    /// Does not fit into program memory.
    #[error("image of {size} bytes does not fit in {memory} bytes of memory")]
    TooLarge {
        /// Image size.
        size: usize,
        /// Memory size.
        memory: u32,
    },
    /// goblin could not parse the ELF.
    #[error("malformed ELF: {0}")]
    Malformed(String),
    /// Wrong machine, class or endianness.
    #[error("not a 32-bit little-endian RISC-V executable: {0}")]
    WrongTarget(String),
    /// A loadable segment lies outside program memory.
    #[error("segment at {vaddr:#x} ({size} bytes) lies outside program memory")]
    SegmentOutOfRange {
        /// Segment virtual address.
        vaddr: u64,
        /// Segment memory size.
        size: u64,
    },
}

/// A validated, ready-to-run program image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    memory: Memory,
    entry: u32,
    global_pointer: Option<u32>,
}

impl Program {
    /// Detect the format from the leading bytes and load accordingly.
    ///
    /// # Errors
    ///
    /// See [`ImageError`].
    pub fn from_bytes(bytes: &[u8], memory_size: u32) -> Result<Self, ImageError> {
        if bytes.starts_with(ELF_MAGIC) {
            Self::elf(bytes, memory_size)
        } else {
            Self::flat(bytes, memory_size)
        }
    }

    /// Raw instruction words loaded at [`TEXT_BASE`], entry at the first word.
    /// The code region is write-protected.
    ///
    /// # Errors
    ///
    /// Empty, unaligned or oversized code.
    pub fn flat(code: &[u8], memory_size: u32) -> Result<Self, ImageError> {
        if code.is_empty() {
            return Err(ImageError::Empty);
        }
        if !code.len().is_multiple_of(4) {
            return Err(ImageError::Unaligned(code.len()));
        }
        let too_large = ImageError::TooLarge {
            size: code.len(),
            memory: memory_size,
        };
        let len = u32::try_from(code.len()).map_err(|_| too_large.clone())?;
        let mut memory = Memory::new(memory_size, TEXT_BASE);
        memory.write_image(TEXT_BASE, code).map_err(|_| too_large)?;
        memory.protect_text(len);
        Ok(Program {
            memory,
            entry: TEXT_BASE,
            global_pointer: None,
        })
    }

    /// A statically linked RV32 ELF whose `PT_LOAD` segments fit inside
    /// `[TEXT_BASE, TEXT_BASE + memory_size)`.
    ///
    /// # Errors
    ///
    /// Parse failures, wrong target, out-of-range segments.
    pub fn elf(bytes: &[u8], memory_size: u32) -> Result<Self, ImageError> {
        let elf = Elf::parse(bytes).map_err(|e| ImageError::Malformed(e.to_string()))?;
        check_target(&elf)?;

        let mut memory = Memory::new(memory_size, TEXT_BASE);
        let mut loaded = 0usize;
        for phdr in elf.program_headers.iter().filter(|p| p.p_type == PT_LOAD) {
            let out_of_range = ImageError::SegmentOutOfRange {
                vaddr: phdr.p_vaddr,
                size: phdr.p_memsz,
            };
            let start = u32::try_from(phdr.p_vaddr).map_err(|_| out_of_range.clone())?;
            let mem_len = u32::try_from(phdr.p_memsz).map_err(|_| out_of_range.clone())?;
            let end = start.checked_add(mem_len).ok_or_else(|| out_of_range.clone())?;
            if start < memory.base() || end > memory.end() || phdr.p_filesz > phdr.p_memsz {
                return Err(out_of_range);
            }
            let file = phdr.file_range();
            let data = bytes
                .get(file)
                .ok_or_else(|| ImageError::Malformed("segment data past end of file".into()))?;
            memory
                .write_image(start, data)
                .map_err(|_| out_of_range)?;
            loaded += data.len();
        }
        if loaded == 0 {
            return Err(ImageError::Empty);
        }

        let entry = u32::try_from(elf.entry)
            .map_err(|_| ImageError::WrongTarget(format!("entry {:#x}", elf.entry)))?;
        let global_pointer = elf
            .syms
            .iter()
            .find(|sym| elf.strtab.get_at(sym.st_name) == Some("__global_pointer$"))
            .and_then(|sym| u32::try_from(sym.st_value).ok());

        Ok(Program {
            memory,
            entry,
            global_pointer,
        })
    }

    /// Entry address.
    #[must_use]
    pub fn entry(&self) -> u32 {
        self.entry
    }

    /// A fresh hart and memory: pc at entry, `sp` at the 16-byte aligned top
    /// of memory, `gp` set when the ELF defines one.
    #[must_use]
    pub fn instantiate(&self) -> (Cpu, Memory) {
        let memory = self.memory.clone();
        let mut cpu = Cpu::at(self.entry);
        cpu.set_reg(reg::SP, memory.end() & !0xF);
        if let Some(gp) = self.global_pointer {
            cpu.set_reg(GP_REG, gp);
        }
        (cpu, memory)
    }
}

fn check_target(elf: &Elf) -> Result<(), ImageError> {
    use goblin::elf::header::EM_RISCV;

    if elf.header.e_machine != EM_RISCV {
        return Err(ImageError::WrongTarget(format!(
            "machine type {}",
            elf.header.e_machine
        )));
    }
    if elf.is_64 {
        return Err(ImageError::WrongTarget("64-bit class".into()));
    }
    if !elf.little_endian {
        return Err(ImageError::WrongTarget("big-endian".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{AluOp, Instruction, MemWidth, assemble};
    use crate::vm::{Metering, RunResult, run};

    fn minimal_elf(machine: u16, code: &[u8]) -> Vec<u8> {
        let code_len = u32::try_from(code.len()).unwrap();
        let mut elf = Vec::new();
        elf.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0]);
        elf.extend_from_slice(&[0; 8]);
        elf.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        elf.extend_from_slice(&machine.to_le_bytes());
        elf.extend_from_slice(&1u32.to_le_bytes());
        elf.extend_from_slice(&TEXT_BASE.to_le_bytes()); // entry
        elf.extend_from_slice(&52u32.to_le_bytes()); // phoff
        elf.extend_from_slice(&0u32.to_le_bytes()); // shoff
        elf.extend_from_slice(&0u32.to_le_bytes()); // flags
        elf.extend_from_slice(&52u16.to_le_bytes());
        elf.extend_from_slice(&32u16.to_le_bytes());
        elf.extend_from_slice(&1u16.to_le_bytes());
        elf.extend_from_slice(&40u16.to_le_bytes());
        elf.extend_from_slice(&0u16.to_le_bytes());
        elf.extend_from_slice(&0u16.to_le_bytes());
        for word in [1, 84, TEXT_BASE, TEXT_BASE, code_len, code_len, 5, 4] {
            elf.extend_from_slice(&word.to_le_bytes());
        }
        elf.extend_from_slice(code);
        elf
    }

    fn answer_program() -> Vec<u8> {
        assemble(&[
            Instruction::OpImm {
                op: AluOp::Add,
                rd: reg::A0,
                rs1: 0,
                imm: 42,
            },
            Instruction::Ecall,
        ])
        .unwrap()
    }

    #[test]
    fn test_flat_image_runs() {
        let program = Program::from_bytes(&answer_program(), DEFAULT_MEMORY_SIZE).unwrap();
        let (mut cpu, mut memory) = program.instantiate();
        assert_eq!(cpu.reg(reg::SP), TEXT_BASE + DEFAULT_MEMORY_SIZE);
        let report = run(&mut cpu, &mut memory, &Metering::default(), 10);
        assert_eq!(report.result, RunResult::Ecall);
        assert_eq!(cpu.reg(reg::A0), 42);
    }

    #[test]
    fn test_flat_image_rejects_bad_sizes() {
        assert_eq!(Program::flat(&[], 64), Err(ImageError::Empty));
        assert_eq!(Program::flat(&[0x13, 0, 0], 64), Err(ImageError::Unaligned(3)));
        assert!(matches!(
            Program::flat(&[0; 128], 64),
            Err(ImageError::TooLarge { size: 128, .. })
        ));
    }

    #[test]
    fn test_self_modifying_code_faults() {
        let code = assemble(&[
            Instruction::Auipc { rd: reg::T0, imm: 0 },
            Instruction::Store {
                width: MemWidth::Word,
                rs1: reg::T0,
                rs2: 0,
                imm: 0,
            },
            Instruction::Ecall,
        ])
        .unwrap();
        let program = Program::flat(&code, DEFAULT_MEMORY_SIZE).unwrap();
        let (mut cpu, mut memory) = program.instantiate();
        let report = run(&mut cpu, &mut memory, &Metering::default(), 10);
        assert!(matches!(report.result, RunResult::Trap(_)));
    }

    #[test]
    fn test_elf_image_runs() {
        let elf = minimal_elf(goblin::elf::header::EM_RISCV, &answer_program());
        let program = Program::from_bytes(&elf, DEFAULT_MEMORY_SIZE).unwrap();
        assert_eq!(program.entry(), TEXT_BASE);
        let (mut cpu, mut memory) = program.instantiate();
        let report = run(&mut cpu, &mut memory, &Metering::default(), 10);
        assert_eq!(report.result, RunResult::Ecall);
        assert_eq!(cpu.reg(reg::A0), 42);
    }

    #[test]
    fn test_elf_wrong_machine() {
        let elf = minimal_elf(62, &answer_program()); // x86-64
        assert!(matches!(
            Program::from_bytes(&elf, DEFAULT_MEMORY_SIZE),
            Err(ImageError::WrongTarget(_))
        ));
    }
}
