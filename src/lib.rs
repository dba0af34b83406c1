//! Writer for ELF relocatable object files (ET_REL).
//!
//! A code generator feeds this crate machine-code buffers with relocation
//! fixups, named function/data symbols, and read-only constant pools; the
//! writer serializes them into a single byte-exact little-endian ELF image,
//! 32- or 64-bit per the target machine.
//!
//! Typical driver flow:
//! 1. [`ObjectWriter::new`] writes a placeholder ELF header and sets up the
//!    bookkeeping sections (null, .shstrtab, .symtab, .strtab).
//! 2. [`ObjectWriter::write_function_code`] per compiled function and
//!    [`ObjectWriter::write_constant_pool`] per pooled constant type stream
//!    payloads to the sink as they arrive.
//! 3. One [`ObjectWriter::write_non_user_sections`] call finalizes string
//!    tables, section numbers, the symbol/relocation/section-header tables,
//!    and patches the real header over the placeholder.
//!
//! The crate is a library only: it owns no CLI, no configuration, and no
//! logger; it logs through the `log` facade and reports sink failures as
//! [`ElfError`].

pub mod elf;
pub mod error;
pub mod pool;
pub mod reloc;
pub mod section;
pub mod stream;
pub mod strtab;
pub mod symtab;
pub mod target;
pub mod writer;

pub use elf::ElfClass;
pub use error::{ElfError, Result};
pub use pool::PoolConstant;
pub use reloc::{Assembler, Fixup};
pub use stream::ElfStream;
pub use target::TargetArch;
pub use writer::ObjectWriter;
