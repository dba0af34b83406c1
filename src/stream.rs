//! Little-endian byte sink for ELF serialization.
//!
//! Wraps any seekable writer and adds the field-width helpers the object
//! writer needs: fixed-width little-endian integers, zero padding, and the
//! class-parametric word writers whose width depends on ELFCLASS. The sink
//! is append-only except for a single seek back to offset 0, used to patch
//! the ELF header once the section layout is known.

use std::io::{Seek, SeekFrom, Write};

use crate::elf::ElfClass;
use crate::error::Result;

pub struct ElfStream<W> {
    inner: W,
    pos: u64,
}

impl<W: Write + Seek> ElfStream<W> {
    /// Wrap a sink. The sink must be positioned at the start of the file.
    pub fn new(inner: W) -> Self {
        ElfStream { inner, pos: 0 }
    }

    /// Current write position in the file.
    pub fn tell(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, val: u8) -> Result<()> {
        self.write_bytes(&[val])
    }

    pub fn write_le16(&mut self, val: u16) -> Result<()> {
        self.write_bytes(&val.to_le_bytes())
    }

    pub fn write_le32(&mut self, val: u32) -> Result<()> {
        self.write_bytes(&val.to_le_bytes())
    }

    pub fn write_le64(&mut self, val: u64) -> Result<()> {
        self.write_bytes(&val.to_le_bytes())
    }

    pub fn write_zero_padding(&mut self, count: u64) -> Result<()> {
        const ZEROS: [u8; 64] = [0; 64];
        let mut remaining = count;
        while remaining > 0 {
            let chunk = remaining.min(ZEROS.len() as u64) as usize;
            self.write_bytes(&ZEROS[..chunk])?;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    /// Write an Xword-sized field: 8 bytes on ELF64, 4 on ELF32.
    pub fn write_word(&mut self, class: ElfClass, val: u64) -> Result<()> {
        if class.is_64() {
            self.write_le64(val)
        } else {
            self.write_le32(val as u32)
        }
    }

    /// Write an Addr- or Off-sized field; same widths as [`Self::write_word`].
    pub fn write_addr_or_offset(&mut self, class: ElfClass, val: u64) -> Result<()> {
        self.write_word(class, val)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
