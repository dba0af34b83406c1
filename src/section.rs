//! Section headers and program-bits payload bookkeeping.
//!
//! Every section shares the same header record; the variants (string table,
//! symbol table, relocation section) layer their payload state on top of a
//! [`SectionHeader`] and serialize through its single class-dispatched
//! `write_header`.

use std::io::{Seek, Write};

use crate::elf::ElfClass;
use crate::error::Result;
use crate::stream::ElfStream;

/// Which user-section bucket a section lives in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SectionKind {
    Text,
    Data,
    RoData,
}

/// Non-owning reference to a user section: the writer owns each bucket in a
/// `Vec`, so a `(kind, index)` pair is stable for the writer's lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SectionRef {
    pub kind: SectionKind,
    pub index: usize,
}

/// The header fields common to every section, plus the bookkeeping values
/// (number, name index, offset, size) that are filled in as layout proceeds.
pub struct SectionHeader {
    pub name: String,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
    /// Assigned 0-based index in the section header table.
    number: Option<u16>,
    /// Offset of the name in .shstrtab; valid only after its layout.
    pub name_index: u32,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
}

impl SectionHeader {
    pub fn new(
        name: &str,
        sh_type: u32,
        sh_flags: u64,
        sh_addralign: u64,
        sh_entsize: u64,
    ) -> Self {
        SectionHeader {
            name: name.to_string(),
            sh_type,
            sh_flags,
            sh_addralign,
            sh_entsize,
            number: None,
            name_index: 0,
            offset: 0,
            size: 0,
            link: 0,
            info: 0,
        }
    }

    pub fn set_number(&mut self, number: usize) {
        assert!(
            self.number.is_none(),
            "section {:?} numbered twice",
            self.name
        );
        self.number = Some(number as u16);
    }

    /// The assigned section number. Panics before assignment.
    pub fn number(&self) -> u16 {
        self.number
            .unwrap_or_else(|| panic!("section {:?} has no number yet", self.name))
    }

    /// Serialize the Elf{32,64}_Shdr record. Both classes share field order;
    /// only the word-sized field widths differ.
    pub fn write_header<W: Write + Seek>(
        &self,
        out: &mut ElfStream<W>,
        class: ElfClass,
    ) -> Result<()> {
        out.write_le32(self.name_index)?;
        out.write_le32(self.sh_type)?;
        out.write_word(class, self.sh_flags)?;
        out.write_addr_or_offset(class, 0)?; // sh_addr: unset in ET_REL
        out.write_addr_or_offset(class, self.offset)?;
        out.write_word(class, self.size)?;
        out.write_le32(self.link)?;
        out.write_le32(self.info)?;
        out.write_word(class, self.sh_addralign)?;
        out.write_word(class, self.sh_entsize)?;
        Ok(())
    }
}

/// A SHT_PROGBITS section whose payload goes straight to the sink; the
/// section itself only tracks its running size.
pub struct ProgBitsSection {
    pub header: SectionHeader,
}

impl ProgBitsSection {
    pub fn new(header: SectionHeader) -> Self {
        ProgBitsSection { header }
    }

    /// Size accumulated so far; doubles as the offset of the next append.
    pub fn current_size(&self) -> u64 {
        self.header.size
    }

    pub fn append_data<W: Write + Seek>(
        &mut self,
        out: &mut ElfStream<W>,
        bytes: &[u8],
    ) -> Result<()> {
        out.write_bytes(bytes)?;
        self.header.size += bytes.len() as u64;
        Ok(())
    }
}
