use crate::{MemRegion, PhysicalAddress, RegionOffset, VirtualAddress};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr::{self, NonNull};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RegionError {
    #[error("access of {len} bytes at {offset} exceeds region size 0x{size:X}")]
    OutOfBounds {
        offset: RegionOffset,
        len: u64,
        size: u64,
    },
    #[error("address {0} is not inside the region")]
    Foreign(VirtualAddress),
    #[error("no memory for a region copy of 0x{0:X} bytes")]
    NoMemory(u64),
}

/// The memory that survives a warm reset.
///
/// Either borrowed from the platform (the live region, mapped by firmware or
/// the early memory code) or owned (a heap copy taken at boot, or an image
/// loaded by host tooling). Every access is bounds-checked against the backing
/// length.
///
/// ### Sharing
/// Methods take `&self` because several independent writers own disjoint parts
/// of the region: the head manager owns the header prefix, each pool owns its
/// directory, each producer owns the slots it allocated. Writers to the *same*
/// bytes must serialize among themselves; the region does not lock.
pub struct ReservedRegion {
    phys: PhysicalAddress,
    /// Address the records inside this region were written against.
    virt: VirtualAddress,
    base: NonNull<u8>,
    len: usize,
    owned: bool,
}

// Safety: the region is plain memory; see the sharing contract above.
unsafe impl Send for ReservedRegion {}
unsafe impl Sync for ReservedRegion {}

impl ReservedRegion {
    /// Wrap a platform-provided mapping.
    ///
    /// # Safety
    /// `base..base + len` must be mapped, writable, and not used by anything
    /// else for as long as the region is alive.
    #[must_use]
    pub unsafe fn from_raw_parts(phys: PhysicalAddress, base: NonNull<u8>, len: usize) -> Self {
        Self {
            phys,
            virt: VirtualAddress::from_ptr(base.as_ptr()),
            base,
            len,
            owned: false,
        }
    }

    /// Take ownership of `bytes`, recording them as living at `phys` / `virt`.
    #[must_use]
    pub fn from_vec(phys: PhysicalAddress, virt: VirtualAddress, bytes: Vec<u8>) -> Self {
        let boxed: Box<[u8]> = bytes.into_boxed_slice();
        let len = boxed.len();
        let raw = Box::into_raw(boxed).cast::<u8>();
        Self {
            phys,
            virt,
            // SAFETY: Box never hands out a null pointer, even for empty slices.
            base: unsafe { NonNull::new_unchecked(raw) },
            len,
            owned: true,
        }
    }

    /// Zero-filled owned region.
    #[must_use]
    pub fn zeroed(phys: PhysicalAddress, virt: VirtualAddress, len: usize) -> Self {
        Self::from_vec(phys, virt, alloc::vec![0; len])
    }

    /// Heap copy of the whole region with the same nominal addresses.
    ///
    /// Fails instead of aborting when the heap cannot hold the copy.
    pub fn try_clone_contents(&self) -> Result<Self, RegionError> {
        let mut copy = Vec::new();
        copy.try_reserve_exact(self.len)
            .map_err(|_| RegionError::NoMemory(self.size()))?;
        copy.resize(self.len, 0);
        self.read(RegionOffset::new(0), &mut copy)?;
        Ok(Self::from_vec(self.phys, self.virt, copy))
    }

    #[inline]
    #[must_use]
    pub const fn phys(&self) -> PhysicalAddress {
        self.phys
    }

    #[inline]
    #[must_use]
    pub const fn virt(&self) -> VirtualAddress {
        self.virt
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.len as u64
    }

    /// The whole region as an address triple.
    #[inline]
    #[must_use]
    pub const fn mem(&self) -> MemRegion {
        MemRegion::new(self.virt, self.phys, self.len as u64)
    }

    #[must_use]
    pub const fn owns_memory(&self) -> bool {
        self.owned
    }

    /// Resolve a recorded virtual address to an offset into this region.
    pub fn offset_of(&self, va: VirtualAddress) -> Result<RegionOffset, RegionError> {
        match va.offset_from(self.virt) {
            Some(off) if off.as_u64() <= self.size() => Ok(off),
            _ => Err(RegionError::Foreign(va)),
        }
    }

    /// Address triple for `len` bytes at `offset`.
    pub fn mem_at(&self, offset: RegionOffset, len: u64) -> Result<MemRegion, RegionError> {
        self.check(offset, len)?;
        Ok(MemRegion::new(self.virt + offset, self.phys + offset, len))
    }

    fn check(&self, offset: RegionOffset, len: u64) -> Result<usize, RegionError> {
        let oob = RegionError::OutOfBounds {
            offset,
            len,
            size: self.size(),
        };
        match offset.checked_add(len) {
            Some(end) if end.as_u64() <= self.size() => {
                usize::try_from(offset.as_u64()).map_err(|_| oob)
            }
            _ => Err(oob),
        }
    }

    pub fn read(&self, offset: RegionOffset, buf: &mut [u8]) -> Result<(), RegionError> {
        let start = self.check(offset, buf.len() as u64)?;
        // SAFETY: bounds checked; `buf` cannot alias the region through a shared borrow.
        unsafe { ptr::copy_nonoverlapping(self.base.as_ptr().add(start), buf.as_mut_ptr(), buf.len()) };
        Ok(())
    }

    pub fn write(&self, offset: RegionOffset, data: &[u8]) -> Result<(), RegionError> {
        let start = self.check(offset, data.len() as u64)?;
        // SAFETY: bounds checked; writers of overlapping bytes serialize externally.
        unsafe { ptr::copy(data.as_ptr(), self.base.as_ptr().add(start), data.len()) };
        Ok(())
    }

    pub fn fill(&self, offset: RegionOffset, len: u64, byte: u8) -> Result<(), RegionError> {
        let start = self.check(offset, len)?;
        // SAFETY: bounds checked; `check` proved len fits in the usize-sized backing.
        unsafe { ptr::write_bytes(self.base.as_ptr().add(start), byte, len as usize) };
        Ok(())
    }

    pub fn read_u32(&self, offset: RegionOffset) -> Result<u32, RegionError> {
        let mut b = [0u8; 4];
        self.read(offset, &mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn write_u32(&self, offset: RegionOffset, v: u32) -> Result<(), RegionError> {
        self.write(offset, &v.to_le_bytes())
    }

    pub fn read_u64(&self, offset: RegionOffset) -> Result<u64, RegionError> {
        let mut b = [0u8; 8];
        self.read(offset, &mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    pub fn write_u64(&self, offset: RegionOffset, v: u64) -> Result<(), RegionError> {
        self.write(offset, &v.to_le_bytes())
    }

    /// Copy of every byte, e.g. for writing an image file.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        // SAFETY: the whole backing is valid for reads.
        unsafe { core::slice::from_raw_parts(self.base.as_ptr(), self.len) }.to_vec()
    }

    /// Exclusive view of a slot, for producers writing their dump payload.
    ///
    /// # Safety
    /// No other reference to, or writer of, these bytes may exist while the
    /// returned slice is alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_mut(&self, offset: RegionOffset, len: u64) -> Result<&mut [u8], RegionError> {
        let start = self.check(offset, len)?;
        // SAFETY: bounds checked; exclusivity is the caller's contract.
        Ok(unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr().add(start), len as usize) })
    }
}

impl Drop for ReservedRegion {
    fn drop(&mut self) {
        if self.owned {
            // SAFETY: produced by Box::into_raw in `from_vec` with this length.
            drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.len)) });
        }
    }
}

impl core::fmt::Debug for ReservedRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReservedRegion")
            .field("phys", &self.phys)
            .field("virt", &self.virt)
            .field("len", &self.len)
            .field("owned", &self.owned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> ReservedRegion {
        ReservedRegion::zeroed(PhysicalAddress::new(0x4000_0000), VirtualAddress::new(0x10_0000), 256)
    }

    #[test]
    fn write_then_read_back() {
        let r = region();
        r.write(RegionOffset::new(10), b"abc").unwrap();
        let mut out = [0u8; 3];
        r.read(RegionOffset::new(10), &mut out).unwrap();
        assert_eq!(&out, b"abc");
        r.write_u64(RegionOffset::new(248), 0x0102_0304_0506_0708).unwrap();
        assert_eq!(r.read_u64(RegionOffset::new(248)).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn rejects_out_of_bounds() {
        let r = region();
        assert!(matches!(
            r.write(RegionOffset::new(254), b"abc"),
            Err(RegionError::OutOfBounds { .. })
        ));
        assert!(r.read_u32(RegionOffset::new(u64::MAX)).is_err());
        assert!(r.fill(RegionOffset::new(0), 257, 0).is_err());
    }

    #[test]
    fn offsets_resolve_against_nominal_base() {
        let r = region();
        assert_eq!(r.offset_of(VirtualAddress::new(0x10_0040)).unwrap(), RegionOffset::new(0x40));
        assert_eq!(
            r.offset_of(VirtualAddress::new(0x0F_FFFF)),
            Err(RegionError::Foreign(VirtualAddress::new(0x0F_FFFF)))
        );
        let m = r.mem_at(RegionOffset::new(0x40), 0x10).unwrap();
        assert_eq!(m.paddr.as_u64(), 0x4000_0040);
    }

    #[test]
    fn copy_keeps_addresses_and_contents() {
        let r = region();
        r.fill(RegionOffset::new(0), 256, 0xA5).unwrap();
        let c = r.try_clone_contents().unwrap();
        assert!(c.owns_memory());
        assert_eq!(c.virt(), r.virt());
        assert_eq!(c.phys(), r.phys());
        assert_eq!(c.snapshot(), r.snapshot());

        // copies are independent
        c.write(RegionOffset::new(0), &[0]).unwrap();
        assert_eq!(r.read_u32(RegionOffset::new(0)).unwrap(), 0xA5A5_A5A5);
    }

    #[test]
    fn borrowed_region_writes_through() {
        let mut backing = vec![0u8; 64];
        let base = NonNull::new(backing.as_mut_ptr()).unwrap();
        let r = unsafe { ReservedRegion::from_raw_parts(PhysicalAddress::new(0x1000), base, 64) };
        r.write_u32(RegionOffset::new(4), 0xDEAD_BEEF).unwrap();
        drop(r);
        assert_eq!(&backing[4..8], &0xDEAD_BEEFu32.to_le_bytes());
    }
}
