//! Sandboxed RV32IM machine that runs tower programs.

mod cpu;
mod exec;
mod image;
mod interp;
mod memory;

pub use cpu::Cpu;
pub use image::{DEFAULT_MEMORY_SIZE, ImageError, Program, TEXT_BASE};
pub use interp::{Metering, RunReport, RunResult, run};
pub use memory::Memory;
