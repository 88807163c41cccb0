use crate::layout::{
    ENTRY_ECC_LEN, ENTRY_SIZE, EntryRecord, HEADER_SIZE, POOL_NAME_LEN, PoolFlags, PoolHeader,
    SafeMemEntry,
};
use crate::{MIN_POOL_SIZE, PoolError, SAFEMEM_POOL_MAGIC};
use alloc::vec;
use alloc::vec::Vec;
use bbox_addresses::{MemRegion, PhysicalAddress, RegionOffset, ReservedRegion, VirtualAddress};
use bbox_bch::BchError;
use bbox_layout::{Persist, copy_truncated, fixed_str};
use bbox_sync::SpinLock;
use core::fmt;
use log::{debug, error, info, trace};

/// The mutable part of the header, cached under the pool lock and written
/// through to the region on every change.
#[derive(Debug, Copy, Clone)]
struct Cursor {
    cur_alloc: VirtualAddress,
    cur_entries: u32,
}

/// Handle to a pool living at a fixed offset of a [`ReservedRegion`].
///
/// The handle caches the immutable geometry; the cursor and entry count are
/// guarded by one spin lock, taken by [`alloc`](Self::alloc) for the whole
/// operation and by lookups only while scanning ids.
pub struct SafeMemPool<'r> {
    region: &'r ReservedRegion,
    offset: RegionOffset,
    name: [u8; POOL_NAME_LEN],
    grow_upward: bool,
    base: VirtualAddress,
    end: VirtualAddress,
    phys: PhysicalAddress,
    pool_size: u64,
    max_entries: u32,
    state: SpinLock<Cursor>,
}

impl<'r> SafeMemPool<'r> {
    /// Lay out a fresh pool: header and directory in `size` bytes at
    /// `offset`, handing out bytes of `payload`.
    ///
    /// The directory holds `(size - header) / entry - 1` entries. The cursor
    /// starts at the payload base when `grow_upward`, at its end otherwise.
    /// Both ranges must lie in `region` and must not overlap.
    pub fn init(
        region: &'r ReservedRegion,
        offset: RegionOffset,
        name: &str,
        size: u64,
        payload: MemRegion,
        grow_upward: bool,
    ) -> Result<Self, PoolError> {
        if size < MIN_POOL_SIZE {
            error!("pool {name}: {size} bytes is below the minimum of {MIN_POOL_SIZE}");
            return Err(PoolError::InvalidArgument("pool smaller than header and two entries"));
        }
        let directory = region.mem_at(offset, size)?;
        let payload_offset = region.offset_of(payload.vaddr)?;
        region.mem_at(payload_offset, payload.size)?;
        if payload.vaddr < directory.vend() && directory.vaddr < payload.vend() {
            error!("pool {name}: payload overlaps the directory");
            return Err(PoolError::InvalidArgument("payload overlaps the directory"));
        }
        let max_entries = u32::try_from((size - HEADER_SIZE) / ENTRY_SIZE - 1)
            .map_err(|_| PoolError::InvalidArgument("pool directory too large"))?;
        let base = payload.vaddr;
        let end = payload.vend();
        let cur_alloc = if grow_upward { base } else { end };

        let mut name_buf = [0u8; POOL_NAME_LEN];
        copy_truncated(&mut name_buf, name.as_bytes());

        let header = PoolHeader {
            magic: SAFEMEM_POOL_MAGIC,
            flags: PoolFlags::new().with_grow_upward(grow_upward),
            name: name_buf,
            base_alloc_addr: base.as_u64(),
            end_alloc_addr: end.as_u64(),
            cur_alloc_addr: cur_alloc.as_u64(),
            phys_addr: payload.paddr.as_u64(),
            pool_size: payload.size,
            max_entries,
            cur_entries: 0,
        };
        region.fill(offset, HEADER_SIZE + u64::from(max_entries) * ENTRY_SIZE, 0)?;
        region.write(offset, &bbox_layout::to_vec(&header))?;

        info!(
            "pool {name}: {max_entries} entries, payload {base}..{end} ({})",
            if grow_upward { "upward" } else { "downward" }
        );
        Ok(Self {
            region,
            offset,
            name: name_buf,
            grow_upward,
            base,
            end,
            phys: payload.paddr,
            pool_size: payload.size,
            max_entries,
            state: SpinLock::new(Cursor {
                cur_alloc,
                cur_entries: 0,
            }),
        })
    }

    /// Adopt a pool already present at `offset`, e.g. in last boot's copy.
    ///
    /// The header must carry the pool magic and describe a directory and
    /// payload that fit the region; nothing in the directory is decoded yet.
    pub fn open(region: &'r ReservedRegion, offset: RegionOffset) -> Result<Self, PoolError> {
        let mut buf = [0u8; PoolHeader::SIZE];
        region.read(offset, &mut buf)?;
        let h = PoolHeader::read_le(&buf);
        if h.magic != SAFEMEM_POOL_MAGIC {
            return Err(PoolError::BadMagic(h.magic));
        }

        let base = VirtualAddress::new(h.base_alloc_addr);
        let end = VirtualAddress::new(h.end_alloc_addr);
        let cur_alloc = VirtualAddress::new(h.cur_alloc_addr);
        let directory_fits = region
            .mem_at(offset, HEADER_SIZE + u64::from(h.max_entries) * ENTRY_SIZE)
            .is_ok();
        let payload_fits = region
            .offset_of(base)
            .and_then(|off| region.mem_at(off, h.pool_size))
            .is_ok_and(|mem| mem.vend() == end);
        let consistent = directory_fits
            && payload_fits
            && (base..=end).contains(&cur_alloc)
            && h.cur_entries <= h.max_entries;
        if !consistent {
            error!("pool at {offset}: header fails geometry checks");
            return Err(PoolError::InvalidArgument("inconsistent pool header"));
        }

        trace!(
            "pool {}: adopted with {}/{} entries",
            fixed_str(&h.name),
            h.cur_entries,
            h.max_entries
        );
        Ok(Self {
            region,
            offset,
            name: h.name,
            grow_upward: h.flags.grow_upward(),
            base,
            end,
            phys: PhysicalAddress::new(h.phys_addr),
            pool_size: h.pool_size,
            max_entries: h.max_entries,
            state: SpinLock::new(Cursor {
                cur_alloc,
                cur_entries: h.cur_entries,
            }),
        })
    }

    /// Re-establish the lock. Entries, cursor and count are untouched.
    pub fn reinit(&mut self) {
        self.state.reset();
        trace!("pool {}: lock reinitialized", self.name());
    }

    /// Reserve `size` payload bytes under the non-zero, unique `id`.
    ///
    /// All-or-nothing: the directory entry, its parity and the advanced cursor
    /// are written only once every check has passed, and the entry count is
    /// bumped last.
    pub fn alloc(&self, id: u32, size: u64) -> Result<MemRegion, PoolError> {
        if id == 0 {
            error!("pool {}: id 0 is reserved", self.name());
            return Err(PoolError::InvalidArgument("id 0 is reserved"));
        }
        if size == 0 {
            return Err(PoolError::InvalidArgument("zero-size allocation"));
        }
        let size32 = u32::try_from(size)
            .map_err(|_| PoolError::InvalidArgument("allocation does not fit a directory entry"))?;
        let exhausted = PoolError::ResourceExhausted { id, size };

        let mut st = self.state.lock();
        if st.cur_entries >= self.max_entries {
            error!(
                "pool {}: directory full ({} entries), id {id} rejected",
                self.name(),
                self.max_entries
            );
            return Err(exhausted);
        }
        if self.find_raw(st.cur_entries, id)?.is_some() {
            error!("pool {}: id {id} already allocated", self.name());
            return Err(PoolError::AlreadyExists(id));
        }

        let (vaddr, next) = if self.grow_upward {
            match st.cur_alloc.checked_add(size) {
                Some(next) if next <= self.end => (st.cur_alloc, next),
                _ => {
                    error!("pool {}: no room for id {id} ({size} bytes)", self.name());
                    return Err(exhausted);
                }
            }
        } else {
            match st.cur_alloc.checked_sub(size) {
                Some(next) if next >= self.base => (next, next),
                _ => {
                    error!("pool {}: no room for id {id} ({size} bytes)", self.name());
                    return Err(exhausted);
                }
            }
        };
        let paddr = self.phys + (vaddr.as_u64() - self.base.as_u64());

        let entry = SafeMemEntry {
            id,
            size: size32,
            vaddr: vaddr.as_u64(),
            paddr: paddr.as_u64(),
        };
        self.write_record(st.cur_entries, &entry).inspect_err(|e| {
            error!("pool {}: cannot record id {id}: {e}", self.name());
        })?;
        self.region.write_u64(self.header_field(PoolHeader::CUR_ALLOC_ADDR_OFFSET), next.as_u64())?;
        self.region.write_u32(self.header_field(PoolHeader::CUR_ENTRIES_OFFSET), st.cur_entries + 1)?;
        st.cur_alloc = next;
        st.cur_entries += 1;

        debug!(
            "pool {}: id {id} -> {vaddr} ({paddr:?}), {size} bytes",
            self.name()
        );
        Ok(entry.mem())
    }

    /// Look up `id`, correcting its directory entry if needed.
    pub fn get(&self, id: u32) -> Result<MemRegion, PoolError> {
        self.get_checked(id).map(|(mem, _)| mem)
    }

    /// Like [`get`](Self::get), also returning the number of corrected bits.
    ///
    /// The index is found by scanning raw ids under the lock; the ECC check
    /// runs outside it. If no raw id matches, every entry is decoded in case
    /// the id bits themselves were damaged.
    pub fn get_checked(&self, id: u32) -> Result<(MemRegion, u32), PoolError> {
        if id == 0 {
            return Err(PoolError::InvalidArgument("id 0 is reserved"));
        }
        let (count, hit) = {
            let st = self.state.lock();
            (st.cur_entries, self.find_raw(st.cur_entries, id)?)
        };

        if let Some(index) = hit {
            match self.checkout(index) {
                Ok((entry, corrected)) if entry.id == id => return Ok((entry.mem(), corrected)),
                Ok(_) => {}
                Err(PoolError::Io(_)) => {
                    error!("pool {}: entry for id {id} is uncorrectable", self.name());
                    return Err(PoolError::Io(id));
                }
                Err(e) => return Err(e),
            }
        }

        let mut damaged = false;
        for index in 0..count {
            match self.checkout(index) {
                Ok((entry, corrected)) if entry.id == id => return Ok((entry.mem(), corrected)),
                Ok(_) => {}
                Err(PoolError::Io(_)) => damaged = true,
                Err(e) => return Err(e),
            }
        }
        if damaged {
            error!("pool {}: id {id} not found among damaged entries", self.name());
            Err(PoolError::Io(id))
        } else {
            Err(PoolError::NotFound(id))
        }
    }

    /// Validated directory slot `index` and its corrected-bit count.
    pub fn entry(&self, index: u32) -> Result<(SafeMemEntry, u32), PoolError> {
        if index >= self.cur_entries() {
            return Err(PoolError::InvalidArgument("entry index out of range"));
        }
        self.checkout(index)
    }

    /// Copy of the payload recorded under `id`.
    pub fn payload(&self, id: u32) -> Result<Vec<u8>, PoolError> {
        let mem = self.get(id)?;
        let offset = self.payload_offset(&mem)?;
        let mut buf = vec![0u8; mem.size as usize];
        self.region.read(offset, &mut buf)?;
        Ok(buf)
    }

    /// Region offset of an allocation handed out by this pool.
    pub fn payload_offset(&self, mem: &MemRegion) -> Result<RegionOffset, PoolError> {
        let in_payload = mem.checked_vend().is_some_and(|vend| vend <= self.end);
        if mem.vaddr < self.base || !in_payload {
            return Err(PoolError::InvalidArgument("address outside the pool payload"));
        }
        Ok(self.region.offset_of(mem.vaddr)?)
    }

    fn checkout(&self, index: u32) -> Result<(SafeMemEntry, u32), PoolError> {
        let mut buf = [0u8; EntryRecord::SIZE];
        self.region.read(self.entry_offset(index), &mut buf)?;
        let record = EntryRecord::read_le(&buf);

        let mut tuple = [0u8; SafeMemEntry::SIZE];
        record.entry.write_le(&mut tuple);
        let corrected = bbox_bch::checkout(&mut tuple, &record.ecc)
            .map_err(|e| bch_error(e, record.entry.id))?;
        let entry = SafeMemEntry::read_le(&tuple);
        if corrected > 0 {
            info!(
                "pool {}: entry {index} (id {}) repaired, {corrected} bit(s)",
                self.name(),
                entry.id
            );
            self.write_record(index, &entry)?;
        }
        Ok((entry, corrected))
    }

    /// Encode `entry` with fresh parity into directory slot `index`.
    fn write_record(&self, index: u32, entry: &SafeMemEntry) -> Result<(), PoolError> {
        let mut record = EntryRecord {
            entry: *entry,
            ecc: [0; ENTRY_ECC_LEN],
        };
        let mut tuple = [0u8; SafeMemEntry::SIZE];
        entry.write_le(&mut tuple);
        bbox_bch::encode(&tuple, &mut record.ecc).map_err(|e| bch_error(e, entry.id))?;

        let mut slot = [0u8; EntryRecord::SIZE];
        record.write_le(&mut slot);
        self.region.write(self.entry_offset(index), &slot)?;
        Ok(())
    }

    fn find_raw(&self, count: u32, id: u32) -> Result<Option<u32>, PoolError> {
        let id_at = EntryRecord::ENTRY_OFFSET + SafeMemEntry::ID_OFFSET;
        for index in 0..count {
            if self.region.read_u32(self.entry_offset(index) + id_at as u64)? == id {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn entry_offset(&self, index: u32) -> RegionOffset {
        self.offset + (HEADER_SIZE + u64::from(index) * ENTRY_SIZE)
    }

    fn header_field(&self, field_offset: usize) -> RegionOffset {
        self.offset + field_offset as u64
    }

    #[must_use]
    pub fn name(&self) -> &str {
        fixed_str(&self.name)
    }

    #[must_use]
    pub const fn region(&self) -> &'r ReservedRegion {
        self.region
    }

    #[must_use]
    pub const fn offset(&self) -> RegionOffset {
        self.offset
    }

    #[must_use]
    pub const fn grow_upward(&self) -> bool {
        self.grow_upward
    }

    #[must_use]
    pub const fn base_alloc_addr(&self) -> VirtualAddress {
        self.base
    }

    #[must_use]
    pub const fn end_alloc_addr(&self) -> VirtualAddress {
        self.end
    }

    #[must_use]
    pub const fn phys_addr(&self) -> PhysicalAddress {
        self.phys
    }

    /// Payload bytes managed by the pool.
    #[must_use]
    pub const fn pool_size(&self) -> u64 {
        self.pool_size
    }

    #[must_use]
    pub const fn max_entries(&self) -> u32 {
        self.max_entries
    }

    #[must_use]
    pub fn cur_entries(&self) -> u32 {
        self.state.lock().cur_entries
    }

    #[must_use]
    pub fn cur_alloc_addr(&self) -> VirtualAddress {
        self.state.lock().cur_alloc
    }

    /// Payload bytes not yet handed out.
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        let st = self.state.lock();
        if self.grow_upward {
            self.end.as_u64() - st.cur_alloc.as_u64()
        } else {
            st.cur_alloc.as_u64() - self.base.as_u64()
        }
    }

    /// Log the header and every entry at debug level.
    pub fn show(&self) {
        debug!("{self}");
    }
}

fn bch_error(e: BchError, id: u32) -> PoolError {
    match e {
        BchError::Uncorrectable => PoolError::Io(id),
        BchError::Unavailable | BchError::InvalidParameters { .. } => PoolError::Unavailable,
        BchError::EccTooShort { .. } => PoolError::InvalidArgument("entry parity field too short"),
    }
}

impl fmt::Display for SafeMemPool<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Cursor {
            cur_alloc,
            cur_entries,
        } = *self.state.lock();
        writeln!(
            f,
            "pool '{}' ({}): payload {}..{} cur {} phys {:?}, entries {}/{}",
            self.name(),
            if self.grow_upward { "up" } else { "down" },
            self.base,
            self.end,
            cur_alloc,
            self.phys,
            cur_entries,
            self.max_entries
        )?;
        for index in 0..cur_entries {
            match self.checkout(index) {
                Ok((e, corrected)) => writeln!(
                    f,
                    "  [{index:3}] id {:<5} size 0x{:<8x} vaddr 0x{:016x} paddr 0x{:016x}{}",
                    e.id,
                    e.size,
                    e.vaddr,
                    e.paddr,
                    if corrected > 0 { " (repaired)" } else { "" }
                )?,
                Err(err) => writeln!(f, "  [{index:3}] {err}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SafeMemPool<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeMemPool")
            .field("name", &self.name())
            .field("offset", &self.offset)
            .field("grow_upward", &self.grow_upward)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIR: u64 = 1024;

    fn region(len: usize) -> ReservedRegion {
        ReservedRegion::zeroed(
            PhysicalAddress::new(0x8000_0000),
            VirtualAddress::new(0xffff_8000_0000_0000),
            len,
        )
    }

    /// Everything after the first `DIR` bytes.
    fn payload(r: &ReservedRegion) -> MemRegion {
        r.mem_at(RegionOffset::new(DIR), r.size() - DIR).unwrap()
    }

    fn pool<'r>(r: &'r ReservedRegion, name: &str, grow_upward: bool) -> SafeMemPool<'r> {
        SafeMemPool::init(r, RegionOffset::new(0), name, DIR, payload(r), grow_upward).unwrap()
    }

    fn flip(region: &ReservedRegion, offset: RegionOffset, bit: u32) {
        let mut b = [0u8];
        region.read(offset, &mut b).unwrap();
        b[0] ^= 1 << bit;
        region.write(offset, &b).unwrap();
    }

    #[test]
    fn fresh_pool_geometry() {
        let r = region(8192);
        let bad = SafeMemPool::init(&r, RegionOffset::new(0), "main", 4096, payload(&r), false);
        assert!(matches!(bad, Err(PoolError::InvalidArgument(_))));

        let r = region(8192);
        let p = pool(&r, "main", false);
        assert_eq!(p.max_entries(), (1024 - 72) / 32 - 1);
        assert_eq!(p.cur_entries(), 0);
        assert_eq!(p.base_alloc_addr(), r.virt() + DIR);
        assert_eq!(p.end_alloc_addr(), r.virt() + 8192);
        assert_eq!(p.cur_alloc_addr(), p.end_alloc_addr());
        assert_eq!(p.pool_size(), 8192 - DIR);
        assert_eq!(p.free_bytes(), 8192 - DIR);
    }

    #[test]
    fn alloc_then_get() {
        let r = region(4096);
        let p = pool(&r, "p", false);
        let mem = p.alloc(7, 64).unwrap();
        assert_eq!(mem.vaddr, p.end_alloc_addr() - 64);
        assert_eq!(mem.size, 64);
        assert_eq!(
            mem.paddr.as_u64(),
            mem.vaddr.as_u64() - p.base_alloc_addr().as_u64() + p.phys_addr().as_u64()
        );
        assert_eq!(mem.paddr, r.phys() + (4096 - 64));
        assert_eq!(p.get(7).unwrap(), mem);
        assert_eq!(p.cur_entries(), 1);
    }

    #[test]
    fn upward_pool_hands_out_from_the_base() {
        let r = region(2048);
        let p = pool(&r, "up", true);
        let a = p.alloc(1, 16).unwrap();
        let b = p.alloc(2, 16).unwrap();
        assert_eq!(a.vaddr, p.base_alloc_addr());
        assert_eq!(b.vaddr, a.vend());
    }

    #[test]
    fn undersized_pool_is_rejected() {
        let r = region(4096);
        let err = SafeMemPool::init(
            &r,
            RegionOffset::new(0),
            "tiny",
            HEADER_SIZE + ENTRY_SIZE,
            payload(&r),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, PoolError::InvalidArgument(_)));
        assert!(r.snapshot().iter().all(|&b| b == 0));
    }

    #[test]
    fn minimal_pool_has_one_entry() {
        let r = region(4096);
        let p = SafeMemPool::init(&r, RegionOffset::new(0), "min", MIN_POOL_SIZE, payload(&r), true)
            .unwrap();
        assert_eq!(p.max_entries(), 1);
        p.alloc(1, 8).unwrap();
        assert!(matches!(p.alloc(2, 8), Err(PoolError::ResourceExhausted { id: 2, .. })));
    }

    #[test]
    fn payload_outside_the_region_is_rejected() {
        let r = region(2048);
        let foreign = MemRegion::new(VirtualAddress::new(0x1000), PhysicalAddress::new(0x1000), 64);
        assert!(SafeMemPool::init(&r, RegionOffset::new(0), "p", DIR, foreign, true).is_err());
        let overlapping = r.mem_at(RegionOffset::new(512), 1024).unwrap();
        assert!(matches!(
            SafeMemPool::init(&r, RegionOffset::new(0), "p", DIR, overlapping, true),
            Err(PoolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_id_and_size_are_rejected() {
        let r = region(2048);
        let p = pool(&r, "p", false);
        assert!(matches!(p.alloc(0, 8), Err(PoolError::InvalidArgument(_))));
        assert!(matches!(p.alloc(3, 0), Err(PoolError::InvalidArgument(_))));
        assert!(matches!(p.get(0), Err(PoolError::InvalidArgument(_))));
        assert_eq!(p.cur_entries(), 0);
    }

    #[test]
    fn payload_exhaustion_leaves_no_trace() {
        let r = region(2048);
        let p = pool(&r, "p", false);
        let before = r.snapshot();
        let free = p.free_bytes();
        assert_eq!(
            p.alloc(9, free + 1),
            Err(PoolError::ResourceExhausted { id: 9, size: free + 1 })
        );
        assert_eq!(r.snapshot(), before);
        assert!(p.alloc(9, free).is_ok());
        assert_eq!(p.free_bytes(), 0);
    }

    #[test]
    fn open_adopts_an_existing_pool() {
        let r = region(4096);
        let offset = RegionOffset::new(256);
        {
            let payload = r.mem_at(RegionOffset::new(2048), 2048).unwrap();
            let p = SafeMemPool::init(&r, offset, "adopt", 512, payload, false).unwrap();
            p.alloc(42, 100).unwrap();
        }
        let copy = r.try_clone_contents().unwrap();
        let p = SafeMemPool::open(&copy, offset).unwrap();
        assert_eq!(p.name(), "adopt");
        assert_eq!(p.cur_entries(), 1);
        assert_eq!(p.get(42).unwrap().size, 100);
        assert!(matches!(p.alloc(42, 1), Err(PoolError::AlreadyExists(42))));
    }

    #[test]
    fn open_rejects_missing_magic_and_bad_geometry() {
        let r = region(2048);
        assert_eq!(
            SafeMemPool::open(&r, RegionOffset::new(0)).unwrap_err(),
            PoolError::BadMagic(0)
        );
        drop(pool(&r, "p", true));
        // pool_size now claims more than the region holds
        r.write_u64(RegionOffset::new(PoolHeader::POOL_SIZE_OFFSET as u64), 1 << 20)
            .unwrap();
        assert!(matches!(
            SafeMemPool::open(&r, RegionOffset::new(0)),
            Err(PoolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn damaged_id_bits_are_found_by_decoding() {
        let r = region(4096);
        let p = pool(&r, "p", false);
        let a = p.alloc(5, 64).unwrap();
        p.alloc(6, 64).unwrap();

        // entry 0's id byte: 5 -> 4
        flip(&r, RegionOffset::new(HEADER_SIZE), 0);
        assert_eq!(p.get_checked(5).unwrap(), (a, 1));
        // the repair was written back
        assert_eq!(p.get_checked(5).unwrap(), (a, 0));
    }

    #[test]
    fn reinit_recovers_an_abandoned_lock() {
        let r = region(2048);
        let mut p = pool(&r, "p", false);
        core::mem::forget(p.state.lock());
        assert!(p.state.is_locked());
        p.reinit();
        assert!(p.alloc(1, 8).is_ok());
    }

    #[test]
    fn payload_copies_bytes() {
        let r = region(2048);
        let p = pool(&r, "p", true);
        let mem = p.alloc(11, 4).unwrap();
        r.write(p.payload_offset(&mem).unwrap(), b"data").unwrap();
        assert_eq!(p.payload(11).unwrap(), b"data");
        assert_eq!(p.payload(12), Err(PoolError::NotFound(12)));
    }

    #[test]
    fn wrapping_chunks_are_not_in_the_payload() {
        let r = region(2048);
        let p = pool(&r, "p", true);
        let mem = p.alloc(11, 4).unwrap();
        let wrapped = MemRegion::new(mem.vaddr, mem.paddr, u64::MAX);
        assert!(matches!(p.payload_offset(&wrapped), Err(PoolError::InvalidArgument(_))));
    }

    #[test]
    fn display_lists_entries() {
        let r = region(2048);
        let p = pool(&r, "listing", false);
        p.alloc(3, 32).unwrap();
        let text = p.to_string();
        assert!(text.starts_with("pool 'listing' (down)"));
        assert!(text.contains("id 3 "));
        assert!(text.contains("entries 1/"));
    }
}
