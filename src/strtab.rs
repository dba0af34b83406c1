//! ELF string table sections (.strtab, .shstrtab).
//!
//! Strings accumulate in insertion order while the object is being built;
//! `do_layout` freezes the table into the on-disk blob, after which byte
//! indices are stable. The blob starts with a NUL so the empty string maps
//! to offset 0, matching ELF convention.

use std::collections::HashMap;

use crate::section::SectionHeader;

pub struct StringTableSection {
    pub header: SectionHeader,
    /// Unique strings in insertion order.
    strings: Vec<String>,
    /// Offsets into `data`; filled by `do_layout`.
    offsets: HashMap<String, u32>,
    data: Vec<u8>,
    laid_out: bool,
}

impl StringTableSection {
    pub fn new(header: SectionHeader) -> Self {
        StringTableSection {
            header,
            strings: Vec::new(),
            offsets: HashMap::new(),
            data: Vec::new(),
            laid_out: false,
        }
    }

    /// Insert a string. Idempotent; the empty string is always present at
    /// offset 0 and is not stored.
    pub fn add(&mut self, s: &str) {
        assert!(!self.laid_out, "string added to {:?} after layout", self.header.name);
        if s.is_empty() || self.offsets.contains_key(s) {
            return;
        }
        self.offsets.insert(s.to_string(), 0);
        self.strings.push(s.to_string());
    }

    /// Freeze the table: concatenate each unique string plus its NUL
    /// terminator after the leading NUL, fixing every offset.
    pub fn do_layout(&mut self) {
        assert!(!self.laid_out, "{:?} laid out twice", self.header.name);
        self.data.push(0);
        for s in &self.strings {
            self.offsets.insert(s.clone(), self.data.len() as u32);
            self.data.extend_from_slice(s.as_bytes());
            self.data.push(0);
        }
        self.laid_out = true;
    }

    /// Byte offset of a previously-added string. Valid only post-layout;
    /// asking for a string that was never added is a programming error.
    pub fn index_of(&self, s: &str) -> u32 {
        assert!(self.laid_out, "{:?} queried before layout", self.header.name);
        if s.is_empty() {
            return 0;
        }
        *self
            .offsets
            .get(s)
            .unwrap_or_else(|| panic!("string {:?} not in {:?}", s, self.header.name))
    }

    /// The frozen table bytes, leading NUL included.
    pub fn bytes(&self) -> &[u8] {
        assert!(self.laid_out, "{:?} read before layout", self.header.name);
        &self.data
    }

    pub fn section_data_size(&self) -> u64 {
        self.bytes().len() as u64
    }
}
