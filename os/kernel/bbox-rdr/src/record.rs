//! Read-only view of a record, live or recovered.

use crate::RdrError;
use crate::ap_root::ApRoot;
use crate::consts::{FILE_MAGIC, POOL_OFFSET, area_id, area_name};
use crate::layout::{BaseInfo, HeadPrefix, TopHead};
use alloc::string::String;
use bbox_addresses::{MemRegion, RegionOffset, ReservedRegion};
use bbox_layout::Persist;
use bbox_safemem::{PoolError, SafeMemPool};
use core::fmt::{self, Write};
use log::{debug, error};

/// A validated head: the top head passed its ECC check and carries
/// [`FILE_MAGIC`].
#[derive(Debug)]
pub struct RecordView<'a> {
    region: &'a ReservedRegion,
    top: TopHead,
    base_info: BaseInfo,
    reentry_count: u32,
    corrected: u32,
}

impl<'a> RecordView<'a> {
    pub fn open(region: &'a ReservedRegion) -> Result<Self, RdrError> {
        let mut buf = [0u8; HeadPrefix::SIZE];
        region.read(RegionOffset::new(0), &mut buf)?;
        let (top, ecc) = buf.split_at_mut(TopHead::SIZE);
        let corrected = bbox_bch::checkout(top, &ecc[..8]).inspect_err(|e| {
            error!("record head failed its ECC check: {e}");
        })?;
        let prefix = HeadPrefix::read_le(&buf);
        if prefix.top.magic != FILE_MAGIC {
            return Err(RdrError::BadMagic(prefix.top.magic));
        }
        Ok(Self {
            region,
            top: prefix.top,
            base_info: prefix.base_info,
            reentry_count: prefix.reentry_count,
            corrected,
        })
    }

    #[must_use]
    pub const fn region(&self) -> &'a ReservedRegion {
        self.region
    }

    #[must_use]
    pub const fn top_head(&self) -> &TopHead {
        &self.top
    }

    #[must_use]
    pub const fn base_info(&self) -> &BaseInfo {
        &self.base_info
    }

    #[must_use]
    pub const fn reentry_count(&self) -> u32 {
        self.reentry_count
    }

    /// Bits the head ECC check had to correct.
    #[must_use]
    pub const fn corrected_bits(&self) -> u32 {
        self.corrected
    }

    pub fn pool(&self) -> Result<SafeMemPool<'a>, RdrError> {
        Ok(SafeMemPool::open(self.region, RegionOffset::new(POOL_OFFSET))?)
    }

    /// Address and size of area `index`.
    pub fn area(&self, index: usize) -> Result<MemRegion, RdrError> {
        if index >= self.top.area_count as usize {
            return Err(RdrError::InvalidArgument("area index out of range"));
        }
        Ok(self.pool()?.get(area_id(index))?)
    }

    /// The AP root at the start of area 0.
    pub fn ap_root(&self) -> Result<ApRoot<'a>, RdrError> {
        ApRoot::open(self.region, self.area(0)?)
    }

    /// Human-readable dump of base info, top head and area table.
    pub fn render(&self, w: &mut impl Write) -> fmt::Result {
        let b = &self.base_info;
        let t = &self.top;
        writeln!(w, "========= base info =========")?;
        writeln!(w, "modid        :[0x{:x}]", b.module_id)?;
        writeln!(w, "arg1         :[0x{:x}]", b.arg1)?;
        writeln!(w, "arg2         :[0x{:x}]", b.arg2)?;
        writeln!(w, "coreid       :[0x{:x}]", b.core_id)?;
        writeln!(w, "reason       :[0x{:x}]", b.exception_type)?;
        writeln!(w, "subtype      :[0x{:x}]", b.exception_subtype)?;
        writeln!(w, "e data       :[{}]", b.datetime())?;
        writeln!(w, "e module     :[{}]", b.module_name())?;
        writeln!(w, "e desc       :[{}]", b.description())?;
        writeln!(w, "start_flag   :[0x{:x}]", b.start_flag)?;
        writeln!(w, "save_flag    :[0x{:x}]", b.savefile_flag)?;
        writeln!(w, "reboot_flag  :[0x{:x}]", b.reboot_flag)?;
        writeln!(w, "========= top head =========")?;
        writeln!(w, "magic        :[0x{:x}]", t.magic)?;
        writeln!(w, "version      :[0x{:x}]", t.version)?;
        writeln!(w, "area num     :[0x{:x}]", t.area_count)?;
        writeln!(w, "buildtime    :[{}]", t.build_time())?;
        writeln!(w, "product      :[{} {}]", t.product_name(), t.product_version())?;
        writeln!(w, "reentry      :[{}]", self.reentry_count)?;
        writeln!(w, "========= area info =========")?;
        match self.pool() {
            Ok(pool) => {
                for index in 0..self.top.area_count as usize {
                    match pool.get(area_id(index)) {
                        Ok(mem) => writeln!(
                            w,
                            "area[{}] addr[0x{:x}] size[0x{:x}]",
                            area_name(index),
                            mem.paddr.as_u64(),
                            mem.size
                        )?,
                        Err(PoolError::NotFound(_)) => {
                            writeln!(w, "area[{}] is no mem", area_name(index))?;
                        }
                        Err(e) => writeln!(w, "area[{}] {e}", area_name(index))?,
                    }
                }
            }
            Err(e) => writeln!(w, "pool unavailable: {e}")?,
        }
        writeln!(w, "========= clear text =========")?;
        writeln!(w, "savefile_flag:[0x{:x}]", b.cleartext_savefile_flag)
    }

    /// [`render`](Self::render) into the debug log.
    pub fn show(&self) {
        let mut text = String::new();
        if self.render(&mut text).is_ok() {
            for line in text.lines() {
                debug!("{line}");
            }
        }
    }
}
