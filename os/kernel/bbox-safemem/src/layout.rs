//! On-media form of a pool: a fixed header followed by the entry directory.

use bbox_addresses::{MemRegion, PhysicalAddress, VirtualAddress};
use bbox_layout::Persist;
use bitfield_struct::bitfield;

/// Pool name bytes, NUL-terminated.
pub const POOL_NAME_LEN: usize = 16;

/// Bytes reserved for the parity of one directory tuple.
pub const ENTRY_ECC_LEN: usize = 8;

const _: () = assert!(bbox_bch::ecc_len_for(<SafeMemEntry as Persist>::SIZE) <= ENTRY_ECC_LEN);

#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PoolFlags {
    /// The payload cursor starts at the low end and moves up.
    pub grow_upward: bool,
    #[bits(31)]
    __: u32,
}

impl Persist for PoolFlags {
    const SIZE: usize = 4;

    fn write_le(&self, out: &mut [u8]) {
        self.into_bits().write_le(out);
    }

    fn read_le(buf: &[u8]) -> Self {
        Self::from_bits(u32::read_le(buf))
    }
}

/// Pool header as stored at the start of the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Persist)]
pub struct PoolHeader {
    pub magic: u32,
    pub flags: PoolFlags,
    pub name: [u8; POOL_NAME_LEN],
    pub base_alloc_addr: u64,
    pub end_alloc_addr: u64,
    pub cur_alloc_addr: u64,
    /// Physical address corresponding to `base_alloc_addr`.
    pub phys_addr: u64,
    pub pool_size: u64,
    pub max_entries: u32,
    pub cur_entries: u32,
}

/// One allocation as recorded in the directory. Immutable once written.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Persist)]
pub struct SafeMemEntry {
    pub id: u32,
    pub size: u32,
    pub vaddr: u64,
    pub paddr: u64,
}

impl SafeMemEntry {
    #[must_use]
    pub const fn mem(&self) -> MemRegion {
        MemRegion::new(
            VirtualAddress::new(self.vaddr),
            PhysicalAddress::new(self.paddr),
            self.size as u64,
        )
    }
}

/// Directory slot: the tuple and its parity.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Persist)]
pub struct EntryRecord {
    pub entry: SafeMemEntry,
    pub ecc: [u8; ENTRY_ECC_LEN],
}

pub const HEADER_SIZE: u64 = PoolHeader::SIZE as u64;
pub const ENTRY_SIZE: u64 = EntryRecord::SIZE as u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_fixed() {
        assert_eq!(HEADER_SIZE, 72);
        assert_eq!(SafeMemEntry::SIZE, 24);
        assert_eq!(ENTRY_SIZE, 32);
        assert_eq!(PoolHeader::CUR_ENTRIES_OFFSET, 68);
        assert_eq!(PoolHeader::CUR_ALLOC_ADDR_OFFSET, 40);
        assert_eq!(EntryRecord::ECC_OFFSET, 24);
    }

    #[test]
    fn flags_round_trip_through_u32() {
        let flags = PoolFlags::new().with_grow_upward(true);
        let mut buf = [0u8; 4];
        flags.write_le(&mut buf);
        assert_eq!(buf, [1, 0, 0, 0]);
        assert!(PoolFlags::read_le(&buf).grow_upward());
    }
}
