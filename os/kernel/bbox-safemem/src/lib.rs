//! # Safe Memory Pool
//!
//! A bump allocator whose bookkeeping lives inside the memory it manages, so
//! that after a warm reset the directory of "what was allocated where" can be
//! read back from the reserved region alone.
//!
//! ```text
//! offset ─► ┌────────────────────┐
//!           │ PoolHeader (72 B)  │ magic, flags, name, cursor, counts
//!           ├────────────────────┤
//!           │ EntryRecord[0..max]│ {id, size, vaddr, paddr} + BCH parity
//!           ├────────────────────┤ ◄─ base_alloc_addr
//!           │ payload            │ handed out from one end
//!           └────────────────────┘ ◄─ end_alloc_addr
//! ```
//!
//! Allocation is append-only: there is no free. Each directory entry carries
//! BCH parity so a few flipped bits in retained memory are corrected when the
//! entry is looked up. An entry becomes visible (the entry count is bumped)
//! only after its parity has been written.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod layout;
mod pool;

use bbox_addresses::RegionError;

pub use layout::{
    ENTRY_ECC_LEN, ENTRY_SIZE, EntryRecord, HEADER_SIZE, POOL_NAME_LEN, PoolFlags, PoolHeader,
    SafeMemEntry,
};
pub use pool::SafeMemPool;

/// Marks a byte range as an initialized pool.
pub const SAFEMEM_POOL_MAGIC: u32 = 0xdeae_aabe;

/// Smallest pool that can hold its header and a usable directory.
pub const MIN_POOL_SIZE: u64 = HEADER_SIZE + 2 * ENTRY_SIZE;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PoolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("id {0} is already allocated")]
    AlreadyExists(u32),
    /// Directory full, or not enough payload left.
    #[error("pool exhausted allocating id {id} ({size} bytes)")]
    ResourceExhausted { id: u32, size: u64 },
    #[error("id {0} is not allocated")]
    NotFound(u32),
    /// The directory entry failed its ECC check.
    #[error("directory entry for id {0} is uncorrectable")]
    Io(u32),
    #[error("BCH codec unavailable")]
    Unavailable,
    #[error("no pool at this offset (magic 0x{0:08x})")]
    BadMagic(u32),
    #[error(transparent)]
    Region(#[from] RegionError),
}
