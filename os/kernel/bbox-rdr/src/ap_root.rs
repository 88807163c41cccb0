//! The AP exception root at the start of area 0.
//!
//! It identifies the area, counts entries into the exception path and hosts
//! a second pool, growing upward over the rest of area 0, from which the AP
//! producers (module dumps, register dumps, ...) take their slots.

use crate::RdrError;
use crate::config::BlackboxConfig;
use crate::consts::{
    AP_DUMP_MAGIC, AP_POOL_OFFSET, BBOX_VERSION, PRODUCT_DEVICE_LEN, PRODUCT_VERSION_LEN,
    ROOT_CHECK_SIZE, ROOT_HEAD_SIZE,
};
use bbox_addresses::{MemRegion, PhysicalAddress, RegionOffset, ReservedRegion, VirtualAddress};
use bbox_layout::{Persist, copy_truncated, fixed_str};
use bbox_safemem::{MIN_POOL_SIZE, SafeMemPool};
use core::fmt::{self, Write};
use log::{error, info};

/// The `{vaddr, paddr, size}` triple as persisted.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Persist)]
pub struct MemTriple {
    pub vaddr: u64,
    pub paddr: u64,
    pub size: u64,
}

impl From<MemRegion> for MemTriple {
    fn from(m: MemRegion) -> Self {
        Self {
            vaddr: m.vaddr.as_u64(),
            paddr: m.paddr.as_u64(),
            size: m.size,
        }
    }
}

impl From<MemTriple> for MemRegion {
    fn from(m: MemTriple) -> Self {
        Self::new(VirtualAddress::new(m.vaddr), PhysicalAddress::new(m.paddr), m.size)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Persist)]
pub struct ApRootHeader {
    pub dump_magic: u32,
    pub version: [u8; PRODUCT_VERSION_LEN],
    /// The area this root lives in.
    pub mem: MemTriple,
    pub device_id: [u8; PRODUCT_DEVICE_LEN],
    pub bbox_version: u64,
}

const HEADER_PAD: usize = ROOT_CHECK_SIZE - 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Persist)]
struct ApRootPrefix {
    header: ApRootHeader,
    pad: [u8; HEADER_PAD],
    ecc: [u8; 8],
    enter_times: u32,
    reserved: u32,
    slice: u64,
}

const _: () = assert!(<ApRootHeader as Persist>::SIZE + HEADER_PAD == ROOT_CHECK_SIZE);
const _: () = assert!(<ApRootPrefix as Persist>::SIZE as u64 <= AP_POOL_OFFSET);
const _: () = assert!(bbox_bch::ecc_len_for(ROOT_CHECK_SIZE) <= 8);

pub struct ApRoot<'r> {
    region: &'r ReservedRegion,
    offset: RegionOffset,
    area: MemRegion,
    pool: SafeMemPool<'r>,
}

impl<'r> ApRoot<'r> {
    /// Write a fresh root over `area` and lay out the AP pool behind it.
    pub fn init(
        region: &'r ReservedRegion,
        area: MemRegion,
        config: &BlackboxConfig,
        slice: u64,
    ) -> Result<Self, RdrError> {
        if area.size <= ROOT_HEAD_SIZE {
            error!("area 0 of {} bytes cannot hold the AP root", area.size);
            return Err(RdrError::InvalidArgument("area 0 smaller than the AP root"));
        }
        let offset = region.offset_of(area.vaddr)?;
        region.fill(offset, ROOT_HEAD_SIZE, 0)?;

        let mut prefix = ApRootPrefix {
            header: ApRootHeader {
                dump_magic: AP_DUMP_MAGIC,
                mem: area.into(),
                bbox_version: BBOX_VERSION,
                ..ApRootHeader::default()
            },
            slice,
            ..ApRootPrefix::default()
        };
        copy_truncated(&mut prefix.header.version, config.product_version.as_bytes());
        copy_truncated(&mut prefix.header.device_id, config.device_id.as_bytes());

        let mut checked = [0u8; ROOT_CHECK_SIZE];
        prefix.header.write_le(&mut checked);
        bbox_bch::encode(&checked, &mut prefix.ecc)?;
        region.write(offset, &bbox_layout::to_vec(&prefix))?;

        let payload = area
            .slice(ROOT_HEAD_SIZE, area.size - ROOT_HEAD_SIZE)
            .ok_or(RdrError::InvalidArgument("area 0 smaller than the AP root"))?;
        let pool = SafeMemPool::init(
            region,
            offset + AP_POOL_OFFSET,
            "ap_root",
            ROOT_HEAD_SIZE - AP_POOL_OFFSET,
            payload,
            true,
        )?;
        info!("AP root at {} with {} payload bytes", area.vaddr, payload.size);
        Ok(Self {
            region,
            offset,
            area,
            pool,
        })
    }

    /// Adopt an existing root, e.g. from last boot's copy.
    pub fn open(region: &'r ReservedRegion, area: MemRegion) -> Result<Self, RdrError> {
        let offset = region.offset_of(area.vaddr)?;
        let mut buf = [0u8; ApRootPrefix::SIZE];
        region.read(offset, &mut buf)?;
        let (checked, rest) = buf.split_at_mut(ROOT_CHECK_SIZE);
        bbox_bch::checkout(checked, &rest[..8]).inspect_err(|e| {
            error!("AP root failed its ECC check: {e}");
        })?;
        let prefix = ApRootPrefix::read_le(&buf);
        if prefix.header.dump_magic != AP_DUMP_MAGIC {
            return Err(RdrError::BadMagic(prefix.header.dump_magic));
        }
        let pool = SafeMemPool::open(region, offset + AP_POOL_OFFSET)?;
        Ok(Self {
            region,
            offset,
            area,
            pool,
        })
    }

    #[must_use]
    pub const fn pool(&self) -> &SafeMemPool<'r> {
        &self.pool
    }

    #[must_use]
    pub const fn area(&self) -> MemRegion {
        self.area
    }

    /// Count one more entry into the exception path; returns the new count.
    pub fn enter(&self) -> Result<u32, RdrError> {
        let at = self.offset + ApRootPrefix::ENTER_TIMES_OFFSET as u64;
        let times = self.region.read_u32(at)?.wrapping_add(1);
        self.region.write_u32(at, times)?;
        Ok(times)
    }

    pub fn enter_times(&self) -> Result<u32, RdrError> {
        Ok(self
            .region
            .read_u32(self.offset + ApRootPrefix::ENTER_TIMES_OFFSET as u64)?)
    }

    pub fn header(&self) -> Result<ApRootHeader, RdrError> {
        let mut buf = [0u8; ApRootHeader::SIZE];
        self.region.read(self.offset, &mut buf)?;
        Ok(ApRootHeader::read_le(&buf))
    }

    pub fn slice(&self) -> Result<u64, RdrError> {
        Ok(self
            .region
            .read_u64(self.offset + ApRootPrefix::SLICE_OFFSET as u64)?)
    }

    pub fn render(&self, w: &mut impl Write) -> fmt::Result {
        match self.header() {
            Ok(h) => {
                writeln!(w, "dump_magic   [0x{:x}]", h.dump_magic)?;
                writeln!(w, "version      [{}]", fixed_str(&h.version))?;
                writeln!(w, "device_id    [{}]", fixed_str(&h.device_id))?;
                writeln!(w, "bbox_version [0x{:x}]", h.bbox_version)?;
                writeln!(
                    w,
                    "area         [vaddr 0x{:x} paddr 0x{:x} size 0x{:x}]",
                    h.mem.vaddr, h.mem.paddr, h.mem.size
                )?;
            }
            Err(e) => writeln!(w, "header unreadable: {e}")?,
        }
        if let Ok(times) = self.enter_times() {
            writeln!(w, "enter_times  [{times}]")?;
        }
        if let Ok(slice) = self.slice() {
            writeln!(w, "slice        [{slice}]")?;
        }
        write!(w, "{}", self.pool)
    }
}

impl fmt::Debug for ApRoot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApRoot")
            .field("offset", &self.offset)
            .field("area", &self.area)
            .finish_non_exhaustive()
    }
}

const _: () = assert!(ROOT_HEAD_SIZE - AP_POOL_OFFSET >= MIN_POOL_SIZE);
