//! Relocation fixups and the sections that carry them.
//!
//! The assembler hands the writer fixups whose offsets are relative to a
//! single function's buffer; the writer rebases them onto the coalesced user
//! section before they land here. Records are emitted in the class-specific
//! form: RELA with explicit addends on ELF64, REL on ELF32.

use std::io::{Seek, Write};

use crate::elf::ElfClass;
use crate::error::Result;
use crate::section::{SectionHeader, SectionRef};
use crate::stream::ElfStream;
use crate::symtab::SymbolTableSection;

/// An unresolved reference produced by the assembler: patch location, target
/// symbol, relocation type, and (for RELA) the addend.
#[derive(Clone, Debug)]
pub struct Fixup {
    /// Offset of the patch site; function-relative as produced, section-
    /// relative once recorded in a relocation section.
    pub offset: u64,
    /// Target-specific relocation type (e.g. R_X86_64_PC32 = 2).
    pub reloc_type: u32,
    /// Name of the symbol the relocation is against.
    pub symbol: String,
    pub addend: i64,
}

/// The writer's view of one assembled function: its encoded bytes and the
/// fixups left for the linker.
pub trait Assembler {
    fn bytes(&self) -> &[u8];
    fn fixups(&self) -> &[Fixup];
}

/// A SHT_REL or SHT_RELA section tied to the user section it patches.
pub struct RelocationSection {
    pub header: SectionHeader,
    /// The user section the relocations apply to (becomes sh_info).
    pub related: SectionRef,
    fixups: Vec<Fixup>,
}

impl RelocationSection {
    pub fn new(header: SectionHeader, related: SectionRef) -> Self {
        RelocationSection {
            header,
            related,
            fixups: Vec::new(),
        }
    }

    /// Append a function's fixups, rebasing each offset by the function's
    /// position within the related section.
    pub fn add_relocations(&mut self, base_offset: u64, fixups: &[Fixup]) {
        for fixup in fixups {
            let mut fixup = fixup.clone();
            fixup.offset += base_offset;
            self.fixups.push(fixup);
        }
    }

    pub fn section_data_size(&self, class: ElfClass) -> u64 {
        self.fixups.len() as u64 * class.reloc_entry_size()
    }

    /// Emit the relocation records against the finalized symbol table.
    /// A fixup naming a symbol absent from the table is a programming error.
    pub fn write_data<W: Write + Seek>(
        &self,
        out: &mut ElfStream<W>,
        class: ElfClass,
        symtab: &SymbolTableSection,
    ) -> Result<()> {
        for fixup in &self.fixups {
            let sym_index = symtab.find_index(&fixup.symbol).unwrap_or_else(|| {
                panic!(
                    "relocation in {:?} against unknown symbol {:?}",
                    self.header.name, fixup.symbol
                )
            });
            if class.uses_rela() {
                out.write_le64(fixup.offset)?;
                let r_info = (u64::from(sym_index) << 32) | u64::from(fixup.reloc_type);
                out.write_le64(r_info)?;
                out.write_le64(fixup.addend as u64)?;
            } else {
                assert!(
                    fixup.reloc_type <= 0xff,
                    "relocation type {} does not fit the ELF32 r_info byte",
                    fixup.reloc_type
                );
                out.write_le32(fixup.offset as u32)?;
                let r_info = (sym_index << 8) | (fixup.reloc_type & 0xff);
                out.write_le32(r_info)?;
            }
        }
        Ok(())
    }
}
