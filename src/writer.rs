//! The ELF relocatable object writer.
//!
//! Drives the whole emission protocol: a dummy ELF header goes out first,
//! user payloads (function code, constant pools) stream directly to the sink
//! as they arrive, and one finalization pass lays out the string tables,
//! assigns section numbers, writes the symbol/relocation/section-header
//! tables, and seeks back to offset 0 to patch the real header over the
//! dummy. e_shoff, e_shnum, and e_shstrndx only exist after layout, which is
//! what makes the two-pass protocol necessary.

use std::io::{Seek, Write};

use log::debug;

use crate::elf::{
    ElfClass, EI_NIDENT, EI_PAD, ELFDATA2LSB, ELFOSABI_NONE, ELF_MAGIC, ET_REL, EV_CURRENT,
    SHF_ALLOC, SHF_EXECINSTR, SHF_MERGE, SHN_LORESERVE, SHT_NULL, SHT_PROGBITS, SHT_REL,
    SHT_RELA, SHT_STRTAB, SHT_SYMTAB, STB_GLOBAL, STB_LOCAL, STT_FUNC, STT_NOTYPE,
};
use crate::error::{ElfError, Result};
use crate::pool::PoolConstant;
use crate::reloc::{Assembler, RelocationSection};
use crate::section::{ProgBitsSection, SectionHeader, SectionKind, SectionRef};
use crate::stream::ElfStream;
use crate::strtab::StringTableSection;
use crate::symtab::SymbolTableSection;
use crate::target::TargetArch;

/// Target code-alignment quantum (bundle size), used as `.text` alignment.
const TEXT_ALIGN: u64 = 32;

/// Writer lifecycle. Sections and symbols may only be created while
/// `Building`; `Finalizing` covers the single finalization pass; a `Done`
/// writer is inert.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum WriterState {
    Building,
    Finalizing,
    Done,
}

/// Identifies one entry of the finalized section-header table without
/// borrowing the section itself.
#[derive(Clone, Copy)]
enum SectionId {
    Null,
    User(SectionKind, usize),
    Rel(SectionKind, usize),
    ShStrTab,
    SymTab,
    StrTab,
}

pub struct ObjectWriter<W> {
    out: ElfStream<W>,
    arch: TargetArch,
    class: ElfClass,
    state: WriterState,
    section_numbers_assigned: bool,
    /// Section-header-table order; filled during number assignment.
    all_sections: Vec<SectionId>,

    null_section: SectionHeader,
    shstrtab: StringTableSection,
    symtab: SymbolTableSection,
    strtab: StringTableSection,

    text_sections: Vec<ProgBitsSection>,
    data_sections: Vec<ProgBitsSection>,
    rodata_sections: Vec<ProgBitsSection>,
    rel_text_sections: Vec<RelocationSection>,
    rel_data_sections: Vec<RelocationSection>,
    rel_rodata_sections: Vec<RelocationSection>,
}

impl<W: Write + Seek> ObjectWriter<W> {
    /// Start an object for `arch` on `sink`. Writes the dummy ELF header and
    /// creates the fixed bookkeeping sections (null, .shstrtab, .symtab,
    /// .strtab); the header is patched with real values at finalization.
    pub fn new(arch: TargetArch, sink: W) -> Result<Self> {
        let class = arch.elf_class();

        let null_section = SectionHeader::new("", SHT_NULL, 0, 0, 0);

        let mut shstrtab =
            StringTableSection::new(SectionHeader::new(".shstrtab", SHT_STRTAB, 0, 1, 0));
        shstrtab.add(".shstrtab");

        let mut symtab = SymbolTableSection::new(SectionHeader::new(
            ".symtab",
            SHT_SYMTAB,
            0,
            class.table_align(),
            class.sym_entry_size(),
        ));
        shstrtab.add(".symtab");
        // The first symbol table entry is the NULL symbol.
        symtab.create_defined_sym("", STT_NOTYPE, STB_LOCAL, None, 0, 0);

        let strtab = StringTableSection::new(SectionHeader::new(".strtab", SHT_STRTAB, 0, 1, 0));
        shstrtab.add(".strtab");

        let mut writer = ObjectWriter {
            out: ElfStream::new(sink),
            arch,
            class,
            state: WriterState::Building,
            section_numbers_assigned: false,
            all_sections: Vec::new(),
            null_section,
            shstrtab,
            symtab,
            strtab,
            text_sections: Vec::new(),
            data_sections: Vec::new(),
            rodata_sections: Vec::new(),
            rel_text_sections: Vec::new(),
            rel_data_sections: Vec::new(),
            rel_rodata_sections: Vec::new(),
        };
        // Dummy values; e_shoff/e_shnum/e_shstrndx are unknown until layout.
        writer.write_elf_header(0, 0, 0)?;
        Ok(writer)
    }

    /// Allocate a section header and register its name, which must happen
    /// before .shstrtab is laid out.
    fn new_section_header(
        &mut self,
        name: &str,
        sh_type: u32,
        sh_flags: u64,
        sh_addralign: u64,
        sh_entsize: u64,
    ) -> SectionHeader {
        assert!(
            !self.section_numbers_assigned,
            "section {:?} created after section numbers were assigned",
            name
        );
        self.shstrtab.add(name);
        debug!("created section {}", name);
        SectionHeader::new(name, sh_type, sh_flags, sh_addralign, sh_entsize)
    }

    /// Append one function's code to the coalesced `.text` section, define
    /// its symbol, and record its fixups in the paired relocation section.
    ///
    /// Internal (compilation-local) functions become LOCAL NOTYPE symbols;
    /// externally-visible ones GLOBAL FUNC. Function symbols carry size 0,
    /// unlike data symbols.
    pub fn write_function_code(
        &mut self,
        name: &str,
        is_internal: bool,
        asm: &dyn Assembler,
    ) -> Result<()> {
        assert!(
            self.state == WriterState::Building,
            "function {:?} written after finalization",
            name
        );
        if self.text_sections.is_empty() {
            let header = self.new_section_header(
                ".text",
                SHT_PROGBITS,
                SHF_ALLOC | SHF_EXECINSTR,
                TEXT_ALIGN,
                0,
            );
            let mut section = ProgBitsSection::new(header);
            section.header.offset = align_file_offset(&mut self.out, TEXT_ALIGN)?;
            self.text_sections.push(section);
        }
        let text_ref = SectionRef { kind: SectionKind::Text, index: 0 };
        let offset_in_section = self.text_sections[0].current_size();
        self.text_sections[0].append_data(&mut self.out, asm.bytes())?;

        let (sym_type, binding) = if is_internal {
            (STT_NOTYPE, STB_LOCAL)
        } else {
            (STT_FUNC, STB_GLOBAL)
        };
        self.symtab
            .create_defined_sym(name, sym_type, binding, Some(text_ref), offset_in_section, 0);
        self.strtab.add(name);

        let fixups = asm.fixups();
        if !fixups.is_empty() {
            let rel_name = format!("{}.text", self.class.reloc_section_prefix());
            let index = match self
                .rel_text_sections
                .iter()
                .position(|rel| rel.header.name == rel_name)
            {
                Some(index) => index,
                None => {
                    let sh_type = if self.class.uses_rela() { SHT_RELA } else { SHT_REL };
                    let header = self.new_section_header(
                        &rel_name,
                        sh_type,
                        0,
                        self.class.table_align(),
                        self.class.reloc_entry_size(),
                    );
                    self.rel_text_sections
                        .push(RelocationSection::new(header, text_ref));
                    self.rel_text_sections.len() - 1
                }
            };
            self.rel_text_sections[index].add_relocations(offset_in_section, fixups);
        }
        debug!(
            "wrote function {} ({} bytes at .text+{:#x}, {} fixups)",
            name,
            asm.bytes().len(),
            offset_in_section,
            fixups.len()
        );
        Ok(())
    }

    /// Emit a read-only pool of one primitive type into its own
    /// `.rodata.cst<N>` section, one LOCAL symbol per element. An empty pool
    /// produces no section. Call at most once per element type.
    pub fn write_constant_pool<C: PoolConstant>(&mut self, pool: &[C]) -> Result<()> {
        assert!(
            self.state == WriterState::Building,
            "constant pool written after finalization"
        );
        if pool.is_empty() {
            return Ok(());
        }
        let width = C::WIDTH;
        let name = format!(".rodata.cst{}", width);
        // Entries are written back to back; entry size doubles as the
        // section alignment, so no padding is needed between them.
        let header =
            self.new_section_header(&name, SHT_PROGBITS, SHF_ALLOC | SHF_MERGE, width, width);
        let mut section = ProgBitsSection::new(header);
        section.header.offset = align_file_offset(&mut self.out, width)?;
        let section_ref = SectionRef {
            kind: SectionKind::RoData,
            index: self.rodata_sections.len(),
        };
        for constant in pool {
            let label = constant.pool_label();
            // Size 0: the section's fixed entry size already describes it.
            self.symtab.create_defined_sym(
                &label,
                STT_NOTYPE,
                STB_LOCAL,
                Some(section_ref),
                section.current_size(),
                0,
            );
            self.strtab.add(&label);
            let bytes = constant.le_bytes();
            assert!(
                bytes.len() as u64 == width,
                "pool constant encoded {} bytes, expected {}",
                bytes.len(),
                width
            );
            section.append_data(&mut self.out, &bytes)?;
        }
        debug!("wrote {} ({} entries)", name, pool.len());
        self.rodata_sections.push(section);
        Ok(())
    }

    /// Globals with initializers are not wired up yet; fail loudly instead
    /// of guessing a layout.
    pub fn write_data_initializer(&mut self, name: &str, _data: &[u8]) -> Result<()> {
        assert!(
            self.state == WriterState::Building,
            "data initializer {:?} written after finalization",
            name
        );
        Err(ElfError::NotImplemented("data initializers"))
    }

    /// Assign every section its number in the header table, pairing each
    /// relocation section immediately after its related user section, and
    /// resolve the name/link/info fields that depend on the numbering.
    fn assign_section_numbers_info(&mut self) {
        assert!(!self.section_numbers_assigned, "section numbers assigned twice");
        let mut next = 0usize;
        let mut all = Vec::new();

        self.null_section.set_number(next);
        next += 1;
        all.push(SectionId::Null);

        for kind in [SectionKind::Text, SectionKind::Data, SectionKind::RoData] {
            let (users, rels) = match kind {
                SectionKind::Text => (&mut self.text_sections, &mut self.rel_text_sections),
                SectionKind::Data => (&mut self.data_sections, &mut self.rel_data_sections),
                SectionKind::RoData => (&mut self.rodata_sections, &mut self.rel_rodata_sections),
            };
            assign_pairs(kind, users, rels, &self.shstrtab, &mut next, &mut all);
        }

        self.shstrtab.header.set_number(next);
        next += 1;
        let name_index = self.shstrtab.index_of(".shstrtab");
        self.shstrtab.header.name_index = name_index;
        all.push(SectionId::ShStrTab);

        self.symtab.header.set_number(next);
        next += 1;
        self.symtab.header.name_index = self.shstrtab.index_of(".symtab");
        all.push(SectionId::SymTab);

        self.strtab.header.set_number(next);
        next += 1;
        self.strtab.header.name_index = self.shstrtab.index_of(".strtab");
        all.push(SectionId::StrTab);

        self.symtab.header.link = u32::from(self.strtab.header.number());
        self.symtab.header.info = self.symtab.num_locals() as u32;

        let symtab_number = u32::from(self.symtab.header.number());
        for rel in self
            .rel_text_sections
            .iter_mut()
            .chain(self.rel_data_sections.iter_mut())
            .chain(self.rel_rodata_sections.iter_mut())
        {
            rel.header.link = symtab_number;
        }

        self.all_sections = all;
        self.section_numbers_assigned = true;
    }

    /// Finalize the object: freeze the string tables, assign section
    /// numbers, emit the symbol table, string tables, relocation sections,
    /// and section-header table, then patch the real ELF header over the
    /// dummy one at offset 0. Call exactly once; the writer is inert after.
    pub fn write_non_user_sections(&mut self) -> Result<()> {
        assert!(
            self.state == WriterState::Building,
            "writer finalized twice"
        );
        self.state = WriterState::Finalizing;
        let class = self.class;

        // All section names are known; .shstrtab payload goes out first.
        self.shstrtab.do_layout();
        self.shstrtab.header.size = self.shstrtab.section_data_size();
        self.shstrtab.header.offset =
            align_file_offset(&mut self.out, self.shstrtab.header.sh_addralign)?;
        self.out.write_bytes(self.shstrtab.bytes())?;

        self.assign_section_numbers_info();
        debug!("assigned {} section numbers", self.all_sections.len());

        self.strtab.do_layout();
        self.strtab.header.size = self.strtab.section_data_size();

        // Every symbol's st_name and st_shndx is resolvable now.
        self.symtab.update_indices(
            &self.strtab,
            &self.text_sections,
            &self.data_sections,
            &self.rodata_sections,
        );

        self.symtab.header.offset =
            align_file_offset(&mut self.out, self.symtab.header.sh_addralign)?;
        self.symtab.header.size = self.symtab.section_data_size(class);
        self.symtab.write_data(&mut self.out, class)?;

        self.strtab.header.offset =
            align_file_offset(&mut self.out, self.strtab.header.sh_addralign)?;
        self.out.write_bytes(self.strtab.bytes())?;

        write_rel_bucket(&mut self.out, class, &self.symtab, &mut self.rel_text_sections)?;
        write_rel_bucket(&mut self.out, class, &self.symtab, &mut self.rel_data_sections)?;
        write_rel_bucket(&mut self.out, class, &self.symtab, &mut self.rel_rodata_sections)?;

        let sh_offset = align_file_offset(&mut self.out, class.table_align())?;
        let all = std::mem::take(&mut self.all_sections);
        for &id in &all {
            let header = match id {
                SectionId::Null => &self.null_section,
                SectionId::User(SectionKind::Text, i) => &self.text_sections[i].header,
                SectionId::User(SectionKind::Data, i) => &self.data_sections[i].header,
                SectionId::User(SectionKind::RoData, i) => &self.rodata_sections[i].header,
                SectionId::Rel(SectionKind::Text, i) => &self.rel_text_sections[i].header,
                SectionId::Rel(SectionKind::Data, i) => &self.rel_data_sections[i].header,
                SectionId::Rel(SectionKind::RoData, i) => &self.rel_rodata_sections[i].header,
                SectionId::ShStrTab => &self.shstrtab.header,
                SectionId::SymTab => &self.symtab.header,
                SectionId::StrTab => &self.strtab.header,
            };
            header.write_header(&mut self.out, class)?;
        }

        // The header fields are finally known; patch them in place.
        self.out.seek(0)?;
        let shstrndx = self.shstrtab.header.number();
        self.write_elf_header(sh_offset, shstrndx, all.len())?;
        self.all_sections = all;
        self.state = WriterState::Done;
        debug!("object finalized, section header table at {:#x}", sh_offset);
        Ok(())
    }

    /// Write the full ELF header at the current position. Called twice: once
    /// with dummy layout values, once with the real ones.
    fn write_elf_header(&mut self, sh_offset: u64, shstrndx: u16, shnum: usize) -> Result<()> {
        assert!(
            shnum < SHN_LORESERVE as usize,
            "{} sections need the section-0 count escape, which is unsupported",
            shnum
        );
        assert!(
            shstrndx < SHN_LORESERVE,
            "shstrndx {} needs the section-0 count escape, which is unsupported",
            shstrndx
        );
        let class = self.class;
        self.out.write_bytes(&ELF_MAGIC)?;
        self.out.write_u8(class.ident())?;
        self.out.write_u8(ELFDATA2LSB)?;
        self.out.write_u8(EV_CURRENT)?;
        self.out.write_u8(ELFOSABI_NONE)?;
        self.out.write_u8(0)?; // ei_abiversion
        self.out.write_zero_padding((EI_NIDENT - EI_PAD) as u64)?;

        self.out.write_le16(ET_REL)?;
        self.out.write_le16(self.arch.elf_machine())?;
        self.out.write_le32(1)?; // e_version
        self.out.write_addr_or_offset(class, 0)?; // e_entry: none in ET_REL
        self.out.write_addr_or_offset(class, 0)?; // e_phoff: no program headers
        self.out.write_addr_or_offset(class, sh_offset)?;
        self.out.write_le32(self.arch.elf_flags())?;
        self.out.write_le16(class.ehdr_size() as u16)?;
        self.out.write_le16(0)?; // e_phentsize
        self.out.write_le16(0)?; // e_phnum
        self.out.write_le16(class.shdr_size() as u16)?;
        self.out.write_le16(shnum as u16)?;
        self.out.write_le16(shstrndx)?;
        Ok(())
    }

    /// Hand the sink back, typically after finalization.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

/// Zero-pad the sink up to `align` and return the new position. The only
/// way the file offset advances between section payloads.
fn align_file_offset<W: Write + Seek>(out: &mut ElfStream<W>, align: u64) -> Result<u64> {
    assert!(
        align.is_power_of_two(),
        "section alignment {} is not a power of two",
        align
    );
    let pos = out.tell();
    let rem = pos & (align - 1);
    if rem == 0 {
        return Ok(pos);
    }
    out.write_zero_padding(align - rem)?;
    Ok(pos + (align - rem))
}

/// Number one bucket's user sections, pairing each with its relocation
/// section (if any) so the relocation section's number is always
/// `related.number + 1`. Relocation-section order mirrors user-section
/// creation order, so a single front-of-list cursor suffices.
fn assign_pairs(
    kind: SectionKind,
    users: &mut [ProgBitsSection],
    rels: &mut [RelocationSection],
    shstrtab: &StringTableSection,
    next: &mut usize,
    all: &mut Vec<SectionId>,
) {
    let mut rel_index = 0;
    for (user_index, user) in users.iter_mut().enumerate() {
        user.header.set_number(*next);
        *next += 1;
        user.header.name_index = shstrtab.index_of(&user.header.name);
        all.push(SectionId::User(kind, user_index));
        if rel_index < rels.len() && rels[rel_index].related.index == user_index {
            let rel = &mut rels[rel_index];
            rel.header.info = u32::from(user.header.number());
            rel.header.set_number(*next);
            *next += 1;
            rel.header.name_index = shstrtab.index_of(&rel.header.name);
            all.push(SectionId::Rel(kind, rel_index));
            rel_index += 1;
        }
    }
    assert!(
        rel_index == rels.len(),
        "{:?} relocation section has no preceding related section",
        kind
    );
}

/// Lay out and emit every relocation section of one bucket.
fn write_rel_bucket<W: Write + Seek>(
    out: &mut ElfStream<W>,
    class: ElfClass,
    symtab: &SymbolTableSection,
    bucket: &mut [RelocationSection],
) -> Result<()> {
    for rel in bucket {
        rel.header.offset = align_file_offset(out, rel.header.sh_addralign)?;
        rel.header.size = rel.section_data_size(class);
        rel.write_data(out, class, symtab)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reloc::Fixup;
    use object::{Object, ObjectSection, ObjectSymbol, RelocationTarget};
    use std::io::{Cursor, Read, Seek, SeekFrom};

    // R_X86_64_PC32 / R_386_PC32: enough for exercising r_info packing.
    const R_PC32: u32 = 2;

    struct TestAsm {
        bytes: Vec<u8>,
        fixups: Vec<Fixup>,
    }

    impl Assembler for TestAsm {
        fn bytes(&self) -> &[u8] {
            &self.bytes
        }
        fn fixups(&self) -> &[Fixup] {
            &self.fixups
        }
    }

    fn asm(bytes: &[u8]) -> TestAsm {
        TestAsm { bytes: bytes.to_vec(), fixups: Vec::new() }
    }

    fn asm_with_fixup(bytes: &[u8], offset: u64, symbol: &str, addend: i64) -> TestAsm {
        TestAsm {
            bytes: bytes.to_vec(),
            fixups: vec![Fixup {
                offset,
                reloc_type: R_PC32,
                symbol: symbol.to_string(),
                addend,
            }],
        }
    }

    fn writer(arch: TargetArch) -> ObjectWriter<Cursor<Vec<u8>>> {
        ObjectWriter::new(arch, Cursor::new(Vec::new())).unwrap()
    }

    fn finish(mut w: ObjectWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        w.write_non_user_sections().unwrap();
        w.into_inner().into_inner()
    }

    fn read_u16(data: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap())
    }

    fn read_u32(data: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
    }

    fn read_u64(data: &[u8], offset: usize) -> u64 {
        u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap())
    }

    /// A section header re-read from the produced bytes, with its name
    /// resolved through e_shstrndx.
    struct RawSection {
        name: String,
        sh_type: u32,
        offset: u64,
        size: u64,
        link: u32,
        info: u32,
        addralign: u64,
        entsize: u64,
    }

    /// Independently walk the section-header table of a produced file.
    fn raw_sections(data: &[u8]) -> Vec<RawSection> {
        let is64 = data[4] == 2;
        let (shoff, shentsize, shnum, shstrndx) = if is64 {
            (
                read_u64(data, 40) as usize,
                read_u16(data, 58) as usize,
                read_u16(data, 60) as usize,
                read_u16(data, 62) as usize,
            )
        } else {
            (
                read_u32(data, 32) as usize,
                read_u16(data, 46) as usize,
                read_u16(data, 48) as usize,
                read_u16(data, 50) as usize,
            )
        };
        let header_at = |index: usize| -> (u32, u32, u64, u64, u32, u32, u64, u64) {
            let base = shoff + index * shentsize;
            if is64 {
                (
                    read_u32(data, base),
                    read_u32(data, base + 4),
                    read_u64(data, base + 24),
                    read_u64(data, base + 32),
                    read_u32(data, base + 40),
                    read_u32(data, base + 44),
                    read_u64(data, base + 48),
                    read_u64(data, base + 56),
                )
            } else {
                (
                    read_u32(data, base),
                    read_u32(data, base + 4),
                    read_u32(data, base + 16) as u64,
                    read_u32(data, base + 20) as u64,
                    read_u32(data, base + 24),
                    read_u32(data, base + 28),
                    read_u32(data, base + 32) as u64,
                    read_u32(data, base + 36) as u64,
                )
            }
        };
        let (_, _, strtab_off, _, _, _, _, _) = header_at(shstrndx);
        (0..shnum)
            .map(|index| {
                let (name_idx, sh_type, offset, size, link, info, addralign, entsize) =
                    header_at(index);
                let start = strtab_off as usize + name_idx as usize;
                let end = start + data[start..].iter().position(|&b| b == 0).unwrap();
                RawSection {
                    name: String::from_utf8(data[start..end].to_vec()).unwrap(),
                    sh_type,
                    offset,
                    size,
                    link,
                    info,
                    addralign,
                    entsize,
                }
            })
            .collect()
    }

    fn raw_section<'a>(sections: &'a [RawSection], name: &str) -> &'a RawSection {
        sections
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("no section named {:?}", name))
    }

    /// Symbol record re-read from the produced bytes.
    struct RawSym {
        st_name: u32,
        st_info: u8,
        st_shndx: u16,
        st_value: u64,
        st_size: u64,
    }

    fn raw_symbols(data: &[u8]) -> Vec<RawSym> {
        let is64 = data[4] == 2;
        let sections = raw_sections(data);
        let symtab = raw_section(&sections, ".symtab");
        let entsize = symtab.entsize as usize;
        (0..(symtab.size / symtab.entsize) as usize)
            .map(|index| {
                let base = symtab.offset as usize + index * entsize;
                if is64 {
                    RawSym {
                        st_name: read_u32(data, base),
                        st_info: data[base + 4],
                        st_shndx: read_u16(data, base + 6),
                        st_value: read_u64(data, base + 8),
                        st_size: read_u64(data, base + 16),
                    }
                } else {
                    RawSym {
                        st_name: read_u32(data, base),
                        st_value: read_u32(data, base + 4) as u64,
                        st_size: read_u32(data, base + 8) as u64,
                        st_info: data[base + 12],
                        st_shndx: read_u16(data, base + 14),
                    }
                }
            })
            .collect()
    }

    fn symbol_name(data: &[u8], sym: &RawSym) -> String {
        let sections = raw_sections(data);
        let strtab_off = raw_section(&sections, ".strtab").offset as usize;
        let start = strtab_off + sym.st_name as usize;
        let end = start + data[start..].iter().position(|&b| b == 0).unwrap();
        String::from_utf8(data[start..end].to_vec()).unwrap()
    }

    // ── Scenarios ────────────────────────────────────────────────────────

    #[test]
    fn test_empty_module_x86_64() {
        let bytes = finish(writer(TargetArch::X8664));

        assert_eq!(&bytes[0..4], &[0x7f, b'E', b'L', b'F']);
        assert_eq!(bytes[4], 2, "ELFCLASS64");
        assert_eq!(bytes[5], 1, "little-endian");
        assert_eq!(read_u16(&bytes, 16), 1, "e_type = ET_REL");
        assert_eq!(read_u16(&bytes, 18), 62, "e_machine = EM_X86_64");
        assert_eq!(read_u16(&bytes, 60), 4, "e_shnum");
        assert_eq!(read_u16(&bytes, 62), 1, "e_shstrndx");

        let sections = raw_sections(&bytes);
        let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["", ".shstrtab", ".symtab", ".strtab"]);

        let symbols = raw_symbols(&bytes);
        assert_eq!(symbols.len(), 1, "only the null symbol");
        let null = &symbols[0];
        assert_eq!(
            (null.st_name, null.st_info, null.st_shndx, null.st_value, null.st_size),
            (0, 0, 0, 0, 0)
        );

        object::File::parse(&*bytes).expect("independent reader rejects the file");
    }

    #[test]
    fn test_single_internal_function_i386() {
        let mut w = writer(TargetArch::X8632);
        w.write_function_code("f", true, &asm(&[0xc3])).unwrap();
        let bytes = finish(w);

        assert_eq!(bytes[4], 1, "ELFCLASS32");
        assert_eq!(read_u16(&bytes, 18), 3, "e_machine = EM_386");
        assert_eq!(read_u16(&bytes, 48), 5, "e_shnum");

        let sections = raw_sections(&bytes);
        let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["", ".text", ".shstrtab", ".symtab", ".strtab"]);
        let text = raw_section(&sections, ".text");
        assert_eq!(text.size, 1);
        assert_eq!(text.offset % 32, 0, "text offset honors bundle alignment");
        assert_eq!(bytes[text.offset as usize], 0xc3);

        let symbols = raw_symbols(&bytes);
        assert_eq!(symbols.len(), 2);
        let f = &symbols[1];
        assert_eq!(symbol_name(&bytes, f), "f");
        assert_eq!(f.st_info, 0, "LOCAL NOTYPE");
        assert_eq!(f.st_value, 0);
        assert_eq!(f.st_shndx, 1);
        let symtab = raw_section(&sections, ".symtab");
        assert_eq!(symtab.info, 2, "both symbols are local");
    }

    #[test]
    fn test_fixups_become_rela_entries() {
        let mut w = writer(TargetArch::X8664);
        w.write_function_code("a", false, &asm(&[0x90])).unwrap();
        w.write_function_code("b", false, &asm_with_fixup(&[0xe8, 0, 0, 0, 0], 1, "a", -4))
            .unwrap();
        let bytes = finish(w);

        let sections = raw_sections(&bytes);
        let text = raw_section(&sections, ".text");
        assert_eq!(
            &bytes[text.offset as usize..(text.offset + text.size) as usize],
            &[0x90, 0xe8, 0, 0, 0, 0]
        );

        let symbols = raw_symbols(&bytes);
        let b = symbols
            .iter()
            .find(|s| symbol_name(&bytes, s) == "b")
            .unwrap();
        assert_eq!(b.st_value, 1);
        assert_eq!(b.st_info, (STB_GLOBAL << 4) | STT_FUNC);

        let rela = raw_section(&sections, ".rela.text");
        assert_eq!(rela.sh_type, SHT_RELA);
        assert_eq!(rela.size, 24);
        assert_eq!(rela.entsize, 24);
        let base = rela.offset as usize;
        let a_index = symbols
            .iter()
            .position(|s| symbol_name(&bytes, s) == "a")
            .unwrap() as u64;
        assert_eq!(read_u64(&bytes, base), 2, "r_offset rebased into .text");
        assert_eq!(read_u64(&bytes, base + 8), (a_index << 32) | u64::from(R_PC32));
        assert_eq!(read_u64(&bytes, base + 16) as i64, -4);
    }

    #[test]
    fn test_constant_pool_f32() {
        let mut w = writer(TargetArch::X8664);
        w.write_constant_pool(&[1.0f32, 2.0f32]).unwrap();
        let bytes = finish(w);

        let sections = raw_sections(&bytes);
        let pool = raw_section(&sections, ".rodata.cst4");
        assert_eq!(pool.size, 8);
        assert_eq!(pool.addralign, 4);
        assert_eq!(pool.entsize, 4);
        assert_eq!(pool.offset % 4, 0);
        assert_eq!(
            &bytes[pool.offset as usize..(pool.offset + pool.size) as usize],
            &[0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x00, 0x40]
        );

        let symbols = raw_symbols(&bytes);
        assert_eq!(symbols.len(), 3, "null symbol plus one per constant");
        assert_eq!(symbols[1].st_value, 0);
        assert_eq!(symbols[2].st_value, 4);
        for sym in &symbols[1..] {
            assert_eq!(sym.st_info, 0, "pool symbols are LOCAL NOTYPE");
            assert_eq!(sym.st_shndx, 1);
        }
    }

    #[test]
    fn test_empty_pool_creates_no_section() {
        let mut w = writer(TargetArch::X8664);
        w.write_constant_pool::<f64>(&[]).unwrap();
        let bytes = finish(w);
        assert_eq!(read_u16(&bytes, 60), 4, "only the bookkeeping sections");
    }

    #[test]
    fn test_two_functions_share_one_rel_section() {
        let mut w = writer(TargetArch::X8664);
        w.write_function_code("a", false, &asm_with_fixup(&[0xe8, 0, 0, 0, 0], 1, "a", -4))
            .unwrap();
        w.write_function_code("b", false, &asm_with_fixup(&[0xe8, 0, 0, 0, 0], 1, "a", -4))
            .unwrap();
        let bytes = finish(w);

        let sections = raw_sections(&bytes);
        let rel_count = sections.iter().filter(|s| s.sh_type == SHT_RELA).count();
        assert_eq!(rel_count, 1, "functions share the coalesced .rela.text");
        let rela = raw_section(&sections, ".rela.text");
        assert_eq!(rela.size, 48);
        // Entries appear in emission order with rebased offsets.
        assert_eq!(read_u64(&bytes, rela.offset as usize), 1);
        assert_eq!(read_u64(&bytes, rela.offset as usize + 24), 6);
    }

    #[test]
    fn test_rel_section_pairs_with_its_user_section() {
        let mut w = writer(TargetArch::X8632);
        w.write_function_code("f", false, &asm_with_fixup(&[0xe8, 0, 0, 0, 0], 1, "f", 0))
            .unwrap();
        let bytes = finish(w);

        let sections = raw_sections(&bytes);
        let rel = raw_section(&sections, ".rel.text");
        assert_eq!(rel.sh_type, SHT_REL);
        assert_eq!(rel.entsize, 8);
        let rel_number = sections.iter().position(|s| s.name == ".rel.text").unwrap();
        assert_eq!(rel.info as usize + 1, rel_number, "rel follows its section");
        assert_eq!(sections[rel.info as usize].name, ".text");
        let symtab_number = sections.iter().position(|s| s.name == ".symtab").unwrap();
        assert_eq!(rel.link as usize, symtab_number);
        // ELF32 r_info byte packing: (sym << 8) | type.
        let f_index = raw_symbols(&bytes)
            .iter()
            .enumerate()
            .find(|(_, s)| symbol_name(&bytes, s) == "f")
            .map(|(i, _)| i as u32)
            .unwrap();
        assert_eq!(read_u32(&bytes, rel.offset as usize + 4), (f_index << 8) | R_PC32);
    }

    #[test]
    fn test_header_patch_matches_layout_walk() {
        let mut w = writer(TargetArch::X8664);
        w.write_function_code("f", false, &asm(&[0x90; 7])).unwrap();
        w.write_constant_pool(&[1.5f64]).unwrap();
        let bytes = finish(w);

        // Recompute the expected section-header offset by walking payloads:
        // it must land right after the last payload byte, aligned to 8.
        let sections = raw_sections(&bytes);
        let payload_end = sections
            .iter()
            .filter(|s| s.sh_type != SHT_NULL)
            .map(|s| s.offset + s.size)
            .max()
            .unwrap();
        let expected_shoff = (payload_end + 7) & !7;
        assert_eq!(read_u64(&bytes, 40), expected_shoff);

        // Alignment property: every payload starts on its sh_addralign
        // boundary and the gap before it is zero-filled.
        let mut prev_end = 0u64;
        let mut ordered: Vec<&RawSection> =
            sections.iter().filter(|s| s.sh_type != SHT_NULL).collect();
        ordered.sort_by_key(|s| s.offset);
        for section in ordered {
            assert_eq!(
                section.offset % section.addralign.max(1),
                0,
                "{} misaligned",
                section.name
            );
            if section.offset > prev_end && prev_end > 0 {
                assert!(
                    bytes[prev_end as usize..section.offset as usize]
                        .iter()
                        .all(|&b| b == 0),
                    "gap before {} not zero-filled",
                    section.name
                );
            }
            prev_end = section.offset + section.size;
        }
    }

    #[test]
    fn test_null_section_header_is_all_zero() {
        let bytes = finish(writer(TargetArch::X8664));
        let shoff = read_u64(&bytes, 40) as usize;
        assert!(bytes[shoff..shoff + 64].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_independent_reader_round_trip() {
        let mut w = writer(TargetArch::X8664);
        w.write_function_code("callee", false, &asm(&[0x90, 0xc3])).unwrap();
        w.write_function_code(
            "caller",
            false,
            &asm_with_fixup(&[0xe8, 0, 0, 0, 0], 1, "callee", -4),
        )
        .unwrap();
        w.write_constant_pool(&[1.0f32, 0.5f32]).unwrap();
        let bytes = finish(w);

        let file = object::File::parse(&*bytes).unwrap();
        let text = file.section_by_name(".text").unwrap();
        assert_eq!(text.data().unwrap(), &[0x90, 0xc3, 0xe8, 0, 0, 0, 0]);

        let caller = file
            .symbols()
            .find(|s| s.name().ok() == Some("caller"))
            .expect("caller symbol visible to the reader");
        assert_eq!(caller.address(), 2);
        assert!(caller.is_global());

        let (offset, reloc) = text.relocations().next().expect("one relocation");
        assert_eq!(offset, 3);
        assert_eq!(reloc.addend(), -4);
        match reloc.target() {
            RelocationTarget::Symbol(index) => {
                let target = file.symbol_by_index(index).unwrap();
                assert_eq!(target.name().ok(), Some("callee"));
            }
            other => panic!("unexpected relocation target {:?}", other),
        }
    }

    #[test]
    fn test_file_backed_sink_matches_cursor() {
        fn build<W: Write + Seek>(w: &mut ObjectWriter<W>) {
            w.write_function_code("f", false, &asm(&[0xc3])).unwrap();
            w.write_constant_pool(&[2.5f64]).unwrap();
            w.write_non_user_sections().unwrap();
        }

        let mut cursor_writer =
            ObjectWriter::new(TargetArch::X8664, Cursor::new(Vec::new())).unwrap();
        build(&mut cursor_writer);
        let expected = cursor_writer.into_inner().into_inner();

        let file = tempfile::tempfile().unwrap();
        let mut file_writer = ObjectWriter::new(TargetArch::X8664, file).unwrap();
        build(&mut file_writer);
        let mut file = file_writer.into_inner();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut actual = Vec::new();
        file.read_to_end(&mut actual).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_data_initializers_unimplemented() {
        let mut w = writer(TargetArch::X8664);
        let err = w.write_data_initializer("global_var", &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ElfError::NotImplemented(_)));
        // The failed call must leave no trace in the object.
        let bytes = finish(w);
        assert_eq!(read_u16(&bytes, 60), 4);
        assert_eq!(raw_symbols(&bytes).len(), 1);
    }

    #[test]
    #[should_panic(expected = "finalized twice")]
    fn test_double_finalize_panics() {
        let mut w = writer(TargetArch::X8664);
        w.write_non_user_sections().unwrap();
        let _ = w.write_non_user_sections();
    }

    #[test]
    #[should_panic(expected = "after finalization")]
    fn test_write_after_finalize_panics() {
        let mut w = writer(TargetArch::X8664);
        w.write_non_user_sections().unwrap();
        let _ = w.write_function_code("late", false, &asm(&[0xc3]));
    }

    #[test]
    fn test_arm32_header_flags() {
        let bytes = finish(writer(TargetArch::Arm32));
        assert_eq!(bytes[4], 1, "ELFCLASS32");
        assert_eq!(read_u16(&bytes, 18), 40, "e_machine = EM_ARM");
        assert_eq!(read_u32(&bytes, 36), 0x0500_0000, "EABI v5 flags");
    }
}
