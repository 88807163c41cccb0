use crate::{PhysicalAddress, VirtualAddress};

/// A contiguous chunk of the reserved region: where it is mapped, where it
/// lives physically, and how long it is.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct MemRegion {
    pub vaddr: VirtualAddress,
    pub paddr: PhysicalAddress,
    pub size: u64,
}

impl MemRegion {
    #[inline]
    #[must_use]
    pub const fn new(vaddr: VirtualAddress, paddr: PhysicalAddress, size: u64) -> Self {
        Self { vaddr, paddr, size }
    }

    /// One past the last virtual address, saturating at the top of the
    /// address space. Use [`checked_vend`](Self::checked_vend) on triples
    /// decoded from memory.
    #[inline]
    #[must_use]
    pub const fn vend(&self) -> VirtualAddress {
        VirtualAddress::new(self.vaddr.as_u64().saturating_add(self.size))
    }

    /// One past the last virtual address, or `None` if the chunk wraps.
    #[inline]
    #[must_use]
    pub const fn checked_vend(&self) -> Option<VirtualAddress> {
        self.vaddr.checked_add(self.size)
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[must_use]
    pub const fn contains(&self, va: VirtualAddress) -> bool {
        match va.offset_from(self.vaddr) {
            Some(off) => off.as_u64() < self.size,
            None => false,
        }
    }

    /// Translate a virtual address inside this chunk to its physical address:
    /// `va - vaddr + paddr`. The end address is accepted so that an empty
    /// allocation at the very top still translates.
    #[must_use]
    pub const fn to_physical(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        match va.offset_from(self.vaddr) {
            Some(off) if off.as_u64() <= self.size => match self.paddr.as_u64().checked_add(off.as_u64()) {
                Some(pa) => Some(PhysicalAddress::new(pa)),
                None => None,
            },
            _ => None,
        }
    }

    /// Sub-chunk starting `offset` bytes in.
    #[must_use]
    pub const fn slice(&self, offset: u64, size: u64) -> Option<Self> {
        match offset.checked_add(size) {
            Some(end) if end <= self.size => Some(Self {
                vaddr: VirtualAddress::new(self.vaddr.as_u64() + offset),
                paddr: PhysicalAddress::new(self.paddr.as_u64() + offset),
                size,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> MemRegion {
        MemRegion::new(VirtualAddress::new(0x1000), PhysicalAddress::new(0x8000), 0x100)
    }

    #[test]
    fn translate_inside_and_at_end() {
        let m = chunk();
        assert_eq!(m.to_physical(VirtualAddress::new(0x1010)), Some(PhysicalAddress::new(0x8010)));
        assert_eq!(m.to_physical(VirtualAddress::new(0x1100)), Some(PhysicalAddress::new(0x8100)));
        assert_eq!(m.to_physical(VirtualAddress::new(0x1101)), None);
        assert_eq!(m.to_physical(VirtualAddress::new(0x0FFF)), None);
    }

    #[test]
    fn contains_is_half_open() {
        let m = chunk();
        assert!(m.contains(VirtualAddress::new(0x1000)));
        assert!(m.contains(VirtualAddress::new(0x10FF)));
        assert!(!m.contains(VirtualAddress::new(0x1100)));
    }

    #[test]
    fn wrapping_chunk_has_no_end() {
        let m = MemRegion::new(VirtualAddress::new(u64::MAX - 0xF), PhysicalAddress::new(0x8000), 0x100);
        assert_eq!(m.checked_vend(), None);
        assert_eq!(m.vend(), VirtualAddress::new(u64::MAX));
        assert!(m.contains(VirtualAddress::new(u64::MAX)));
        assert_eq!(chunk().checked_vend(), Some(VirtualAddress::new(0x1100)));
    }

    #[test]
    fn slicing() {
        let m = chunk();
        let s = m.slice(0x40, 0x20).unwrap();
        assert_eq!(s.vaddr.as_u64(), 0x1040);
        assert_eq!(s.paddr.as_u64(), 0x8040);
        assert!(m.slice(0xF0, 0x20).is_none());
    }
}
