//! Poolable read-only constants.
//!
//! The upstream constant cache hands the writer deduplicated pools of
//! primitive numeric constants; each pool lands in a `.rodata.cst<N>`
//! section with one local symbol per element. This trait is the seam: an
//! element knows its width, its pool label, and its raw little-endian bytes.
//! Integer pools are a future extension.

/// One element of a read-only constant pool.
pub trait PoolConstant {
    /// Element size in bytes; also the pool section's alignment and entry
    /// size.
    const WIDTH: u64;

    /// Deduplicated local label naming this constant in the symbol table.
    fn pool_label(&self) -> String;

    /// The element's on-disk encoding, exactly `WIDTH` little-endian bytes.
    fn le_bytes(&self) -> Vec<u8>;
}

impl PoolConstant for f32 {
    const WIDTH: u64 = 4;

    fn pool_label(&self) -> String {
        // Bit pattern, not value: distinguishes -0.0 from 0.0 and keeps NaN
        // payloads apart.
        format!(".L$float${:08x}", self.to_bits())
    }

    fn le_bytes(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}

impl PoolConstant for f64 {
    const WIDTH: u64 = 8;

    fn pool_label(&self) -> String {
        format!(".L$double${:016x}", self.to_bits())
    }

    fn le_bytes(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}
