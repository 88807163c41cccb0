//! # Crash-Record Addresses and Regions
//!
//! Strongly typed wrappers for the three kinds of numbers that describe the
//! reserved blackbox memory, plus the region object through which every byte of
//! it is read and written.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | Address as seen by the bus; stable across reboots. |
//! | [`VirtualAddress`] | Address in the kernel mapping of the region; may change per boot. |
//! | [`RegionOffset`] | Byte offset from the start of a [`ReservedRegion`]. |
//! | [`MemRegion`] | The `{vaddr, paddr, size}` triple handed to allocation callers. |
//!
//! ## Why offsets
//!
//! Persisted structures record virtual and physical addresses because recovery
//! tooling expects them, but this crate never dereferences either. A virtual
//! address is turned into a [`RegionOffset`] by subtracting the region's
//! *nominal* virtual base, and the offset is then bounds-checked against the
//! backing storage. A scratch copy of last boot's region keeps the nominal
//! base of the live region, so addresses recorded last boot still resolve
//! into the copy.
//!
//! ```rust
//! # use bbox_addresses::*;
//! let region = ReservedRegion::from_vec(
//!     PhysicalAddress::new(0x8000_0000),
//!     VirtualAddress::new(0xFFFF_0000_0000_0000),
//!     vec![0; 4096],
//! );
//! let va = VirtualAddress::new(0xFFFF_0000_0000_0100);
//! let off = region.offset_of(va).unwrap();
//! assert_eq!(off.as_u64(), 0x100);
//! assert_eq!(region.mem().to_physical(va).unwrap().as_u64(), 0x8000_0100);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

extern crate alloc;

mod mem_region;
mod physical_address;
mod region_offset;
mod reserved_region;
mod virtual_address;

pub use mem_region::MemRegion;
pub use physical_address::PhysicalAddress;
pub use region_offset::RegionOffset;
pub use reserved_region::{RegionError, ReservedRegion};
pub use virtual_address::VirtualAddress;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn va_pa_arithmetic() {
        let va = VirtualAddress::new(0x1000);
        assert_eq!((va + 0x20).as_u64(), 0x1020);
        assert_eq!((va + 0x20).offset_from(va), Some(RegionOffset::new(0x20)));
        assert_eq!(va.offset_from(va + 1), None);
        assert_eq!((va - 0x10).as_u64(), 0x0ff0);

        let pa = PhysicalAddress::new(0x9000);
        assert_eq!((pa + RegionOffset::new(4)).as_u64(), 0x9004);
    }

    #[test]
    fn formatting() {
        let va = VirtualAddress::new(0xABC);
        assert_eq!(format!("{va}"), "0x0000000000000ABC");
        assert_eq!(format!("{va:?}"), "VA(0x0000000000000ABC)");
        let pa = PhysicalAddress::new(0x10);
        assert_eq!(format!("{pa:?}"), "PA(0x0000000000000010)");
    }
}
