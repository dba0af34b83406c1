//! Error type for object emission.
//!
//! Only two things can go wrong at runtime: the sink can fail, and a caller
//! can request a feature the writer does not implement. Everything else
//! (create-after-assign, unresolved symbols, too many sections) is a
//! programming error and panics with the violated invariant instead of
//! surfacing here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElfError {
    /// The underlying sink failed. The partially-written object is invalid
    /// and must be discarded by the caller.
    #[error("object write failed: {0}")]
    Io(#[from] std::io::Error),

    /// A requested operation is recognized but not implemented.
    #[error("{0} not implemented")]
    NotImplemented(&'static str),
}

pub type Result<T> = std::result::Result<T, ElfError>;
