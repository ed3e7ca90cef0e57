//! Bounded little-endian memory for a tower program.
//!
//! The region starts at `base`. The first `text_len` bytes hold the program
//! image and are read-only; everything after is scratch and stack.

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

use crate::error::{AccessType, TrapCause, VmResult};
use crate::isa::MemWidth;

/// Memory of one program instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    data: Vec<u8>,
    base: u32,
    text_len: u32,
}

impl Memory {
    /// Zeroed memory of `size` bytes starting at `base`.
    #[must_use]
    pub fn new(size: u32, base: u32) -> Self {
        Memory {
            data: vec![0; size as usize],
            base,
            text_len: 0,
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    /// First valid address.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// One past the last valid address (saturating at `u32::MAX`).
    #[must_use]
    pub fn end(&self) -> u32 {
        self.base.saturating_add(self.size())
    }

    /// Mark `[base, base + len)` read-only for the program.
    pub fn protect_text(&mut self, len: u32) {
        self.text_len = len.min(self.size());
    }

    fn offset(&self, addr: u32, len: u32, access: AccessType) -> VmResult<usize> {
        let fault = TrapCause::MemoryFault { addr, access };
        let offset = addr.checked_sub(self.base).ok_or(fault)?;
        if offset.checked_add(len).is_none_or(|end| end > self.size()) {
            return Err(fault);
        }
        if access == AccessType::Write && offset < self.text_len {
            return Err(fault);
        }
        Ok(offset as usize)
    }

    /// Load a value of `width`, sign- or zero-extended to 32 bits.
    ///
    /// # Errors
    ///
    /// [`TrapCause::MemoryFault`] when the access leaves the region.
    pub fn load(&self, addr: u32, width: MemWidth) -> VmResult<u32> {
        let n = width.bytes();
        let at = self.offset(addr, n, AccessType::Read)?;
        let mut raw = [0u8; 4];
        raw[..n as usize].copy_from_slice(&self.data[at..at + n as usize]);
        let value = u32::from_le_bytes(raw);
        Ok(match width {
            MemWidth::Byte => i32::from(value as u8 as i8) as u32,
            MemWidth::Half => i32::from(value as u16 as i16) as u32,
            MemWidth::Word | MemWidth::ByteUnsigned | MemWidth::HalfUnsigned => value,
        })
    }

    /// Store the low `width` bytes of `value`.
    ///
    /// # Errors
    ///
    /// [`TrapCause::MemoryFault`] when the access leaves the region or hits
    /// the read-only program image.
    pub fn store(&mut self, addr: u32, width: MemWidth, value: u32) -> VmResult<()> {
        let n = width.bytes() as usize;
        let at = self.offset(addr, width.bytes(), AccessType::Write)?;
        self.data[at..at + n].copy_from_slice(&value.to_le_bytes()[..n]);
        Ok(())
    }

    /// Fetch an instruction word.
    ///
    /// # Errors
    ///
    /// [`TrapCause::MemoryFault`] with [`AccessType::Execute`] when out of range.
    #[inline]
    pub fn fetch(&self, addr: u32) -> VmResult<u32> {
        let at = self.offset(addr, 4, AccessType::Execute)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.data[at..at + 4]);
        Ok(u32::from_le_bytes(raw))
    }

    /// Copy bytes in while building an image. Ignores write protection.
    ///
    /// # Errors
    ///
    /// [`TrapCause::MemoryFault`] when the bytes do not fit.
    pub fn write_image(&mut self, addr: u32, bytes: &[u8]) -> VmResult<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| TrapCause::MemoryFault {
            addr,
            access: AccessType::Write,
        })?;
        let at = self.offset(addr, len, AccessType::Read).map_err(|_| TrapCause::MemoryFault {
            addr,
            access: AccessType::Write,
        })?;
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}
