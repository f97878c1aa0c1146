//! Corruption fault taxonomy.
//!
//! Out-of-memory is not an error here: `alloc` and `realloc` signal it
//! with `None`. [`HeapFault`] covers only conditions that mean the
//! block list can no longer be trusted, and every one of them is
//! terminal.

use thiserror::Error;

/// A heap-corruption condition.
///
/// Faults are emitted to the diagnostic sink at FATAL severity and then
/// raised as a panic. The block list's integrity is load-bearing for
/// every subsequent operation, so no recovery is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapFault {
    #[error("bad magic {found:#010x} at block offset {offset:#x} (expected {expected:#010x})")]
    BadMagic {
        offset: usize,
        found: u32,
        expected: u32,
    },

    #[error("implausible block offset {offset:#x} (usable arena is {usable} bytes)")]
    OutOfRange { offset: usize, usable: usize },

    #[error("misaligned block offset {offset:#x}")]
    Misaligned { offset: usize },

    #[error("{which} link of block {offset:#x} names {neighbor:#x}, which does not point back")]
    LinkMismatch {
        offset: usize,
        neighbor: usize,
        which: &'static str,
    },

    #[error("zero-sized block at offset {offset:#x}")]
    ZeroSizeBlock { offset: usize },

    #[error("block {offset:#x} links forward to non-ascending offset {next:#x}")]
    OrderViolation { offset: usize, next: usize },

    #[error("block list walk exceeded {limit} blocks at offset {offset:#x}")]
    ListRunaway { offset: usize, limit: usize },

    #[error("payload access to free block at offset {offset:#x}")]
    FreeBlockAccess { offset: usize },
}
