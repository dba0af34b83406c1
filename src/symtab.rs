//! The .symtab section.
//!
//! Symbols are kept partitioned, locals before globals, so sh_info (the
//! index of the first non-local symbol) is just the local count. Name and
//! section-index fields stay symbolic until finalization, when the string
//! table has been laid out and section numbers exist.

use std::io::{Seek, Write};

use crate::elf::{ElfClass, SHN_UNDEF, STB_LOCAL};
use crate::error::Result;
use crate::section::{ProgBitsSection, SectionHeader, SectionKind, SectionRef};
use crate::stream::ElfStream;
use crate::strtab::StringTableSection;

pub struct SymbolEntry {
    pub name: String,
    pub sym_type: u8,
    pub binding: u8,
    /// Defining user section, or `None` for the null symbol (SHN_UNDEF).
    pub section: Option<SectionRef>,
    pub value: u64,
    pub size: u64,
    /// Resolved .strtab offset; valid after `update_indices`.
    st_name: u32,
    /// Resolved section number; valid after `update_indices`.
    st_shndx: u16,
}

pub struct SymbolTableSection {
    pub header: SectionHeader,
    locals: Vec<SymbolEntry>,
    globals: Vec<SymbolEntry>,
}

impl SymbolTableSection {
    pub fn new(header: SectionHeader) -> Self {
        SymbolTableSection {
            header,
            locals: Vec::new(),
            globals: Vec::new(),
        }
    }

    /// Append a defined symbol, partitioned by binding.
    pub fn create_defined_sym(
        &mut self,
        name: &str,
        sym_type: u8,
        binding: u8,
        section: Option<SectionRef>,
        value: u64,
        size: u64,
    ) {
        let entry = SymbolEntry {
            name: name.to_string(),
            sym_type,
            binding,
            section,
            value,
            size,
            st_name: 0,
            st_shndx: SHN_UNDEF,
        };
        if binding == STB_LOCAL {
            self.locals.push(entry);
        } else {
            self.globals.push(entry);
        }
    }

    pub fn num_locals(&self) -> usize {
        self.locals.len()
    }

    pub fn len(&self) -> usize {
        self.locals.len() + self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Table index of the named symbol, locals first, matching the emitted
    /// record order.
    pub fn find_index(&self, name: &str) -> Option<u32> {
        self.locals
            .iter()
            .chain(self.globals.iter())
            .position(|sym| sym.name == name)
            .map(|idx| idx as u32)
    }

    /// Resolve every symbol's st_name from the laid-out string table and its
    /// st_shndx from the owning section's assigned number.
    pub fn update_indices(
        &mut self,
        strtab: &StringTableSection,
        text: &[ProgBitsSection],
        data: &[ProgBitsSection],
        rodata: &[ProgBitsSection],
    ) {
        for sym in self.locals.iter_mut().chain(self.globals.iter_mut()) {
            sym.st_name = strtab.index_of(&sym.name);
            sym.st_shndx = match sym.section {
                Some(sec) => section_number(sec, text, data, rodata),
                None => SHN_UNDEF,
            };
        }
    }

    pub fn section_data_size(&self, class: ElfClass) -> u64 {
        self.len() as u64 * class.sym_entry_size()
    }

    /// Emit the symbol records. The two classes differ in field order, not
    /// just width: ELF64 moves info/other/shndx ahead of value/size.
    pub fn write_data<W: Write + Seek>(
        &self,
        out: &mut ElfStream<W>,
        class: ElfClass,
    ) -> Result<()> {
        for sym in self.locals.iter().chain(self.globals.iter()) {
            let st_info = (sym.binding << 4) | (sym.sym_type & 0xf);
            let st_other = 0u8;
            if class.is_64() {
                out.write_le32(sym.st_name)?;
                out.write_u8(st_info)?;
                out.write_u8(st_other)?;
                out.write_le16(sym.st_shndx)?;
                out.write_le64(sym.value)?;
                out.write_le64(sym.size)?;
            } else {
                out.write_le32(sym.st_name)?;
                out.write_le32(sym.value as u32)?;
                out.write_le32(sym.size as u32)?;
                out.write_u8(st_info)?;
                out.write_u8(st_other)?;
                out.write_le16(sym.st_shndx)?;
            }
        }
        Ok(())
    }
}

/// Map a section reference to its assigned section-header-table number.
pub fn section_number(
    sec: SectionRef,
    text: &[ProgBitsSection],
    data: &[ProgBitsSection],
    rodata: &[ProgBitsSection],
) -> u16 {
    let bucket = match sec.kind {
        SectionKind::Text => text,
        SectionKind::Data => data,
        SectionKind::RoData => rodata,
    };
    bucket[sec.index].header.number()
}
