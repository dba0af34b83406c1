//! Target architecture table.
//!
//! Each supported architecture fixes three ELF header facts: the file class,
//! e_machine, and e_flags. The enum is matched exhaustively, so adding an
//! architecture without a table row fails to compile rather than at runtime.

use crate::elf::{
    ElfClass, EF_ARM_EABI_VER5, EF_RISCV_FLOAT_ABI_DOUBLE, EF_RISCV_RVC, EM_386, EM_AARCH64,
    EM_ARM, EM_RISCV, EM_X86_64,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TargetArch {
    X8632,
    X8664,
    Arm32,
    Arm64,
    Riscv64,
}

struct TargetInfo {
    is_elf64: bool,
    e_machine: u16,
    e_flags: u32,
}

const fn target_info(arch: TargetArch) -> TargetInfo {
    match arch {
        TargetArch::X8632 => TargetInfo { is_elf64: false, e_machine: EM_386, e_flags: 0 },
        TargetArch::X8664 => TargetInfo { is_elf64: true, e_machine: EM_X86_64, e_flags: 0 },
        TargetArch::Arm32 => TargetInfo {
            is_elf64: false,
            e_machine: EM_ARM,
            e_flags: EF_ARM_EABI_VER5,
        },
        TargetArch::Arm64 => TargetInfo { is_elf64: true, e_machine: EM_AARCH64, e_flags: 0 },
        TargetArch::Riscv64 => TargetInfo {
            is_elf64: true,
            e_machine: EM_RISCV,
            e_flags: EF_RISCV_RVC | EF_RISCV_FLOAT_ABI_DOUBLE,
        },
    }
}

impl TargetArch {
    pub fn elf_class(self) -> ElfClass {
        if target_info(self).is_elf64 {
            ElfClass::Elf64
        } else {
            ElfClass::Elf32
        }
    }

    pub fn elf_machine(self) -> u16 {
        target_info(self).e_machine
    }

    pub fn elf_flags(self) -> u32 {
        target_info(self).e_flags
    }
}
