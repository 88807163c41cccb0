//! The record head: detects last boot's record, rebuilds the head for this
//! boot and carries the exception classification.

use crate::config::{BlackboxConfig, BootType, Platform};
use crate::consts::{
    DATATIME_MAXLEN, FILE_MAGIC, MAX_AREAS, MODULE_NAME_LEN, POOL_OFFSET, RDR_VERSION,
    STR_EXCEPTIONDESC_MAXLEN, area_id, area_index,
};
use crate::layout::{BaseInfo, HeadPrefix, RebootFlag, SaveFileFlag, StartFlag, TopHead, base_info_field};
use crate::record::RecordView;
use crate::RdrError;
use bbox_addresses::{MemRegion, RegionOffset, ReservedRegion};
use bbox_layout::{Persist, copy_truncated};
use bbox_safemem::{MIN_POOL_SIZE, SafeMemPool};
use log::{error, info, trace, warn};

/// Per-boot lifecycle of the head.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HeadState {
    Uninitialized,
    ValidatingPrior,
    /// Last boot's record was copied aside.
    BackedUp,
    /// Nothing valid was found.
    NoPrior,
    Reinitialized,
    Ready,
}

/// A heap copy of last boot's region.
///
/// The copy keeps the live region's nominal addresses, so the addresses
/// recorded in its directories resolve into the copy.
#[derive(Debug)]
pub struct LastRecord {
    region: ReservedRegion,
}

impl LastRecord {
    fn new(region: ReservedRegion) -> Self {
        match SafeMemPool::open(&region, RegionOffset::new(POOL_OFFSET)) {
            Ok(mut pool) => pool.reinit(),
            Err(e) => warn!("last record has no usable pool: {e}"),
        }
        Self { region }
    }

    #[must_use]
    pub const fn region(&self) -> &ReservedRegion {
        &self.region
    }

    pub fn view(&self) -> Result<RecordView<'_>, RdrError> {
        RecordView::open(&self.region)
    }
}

/// Pieces of an exception classification.
#[derive(Debug, Copy, Clone, Default)]
pub struct Classification<'a> {
    pub core_id: u32,
    pub exception_type: u32,
    pub exception_subtype: u32,
    pub module_name: &'a str,
    pub description: &'a str,
    pub datetime: &'a str,
}

pub struct RecordHead<'r> {
    region: &'r ReservedRegion,
    state: HeadState,
    pool: Option<SafeMemPool<'r>>,
    last: Option<LastRecord>,
    area_count: usize,
    reentry: u32,
}

impl<'r> RecordHead<'r> {
    #[must_use]
    pub const fn new(region: &'r ReservedRegion) -> Self {
        Self {
            region,
            state: HeadState::Uninitialized,
            pool: None,
            last: None,
            area_count: 0,
            reentry: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> HeadState {
        self.state
    }

    #[must_use]
    pub const fn region(&self) -> &'r ReservedRegion {
        self.region
    }

    /// Bring the head to [`HeadState::Ready`] for this boot.
    ///
    /// Areas `1..` are allocated in descending index order with their
    /// configured sizes; area 0 then receives everything left in the pool,
    /// so areas `1..` must leave at least one byte for it.
    ///
    /// Every call counts towards the reentry count. A repeated call only
    /// persists the new count and fails with [`RdrError::AlreadyInitialized`].
    pub fn init(&mut self, config: &BlackboxConfig, platform: &dyn Platform) -> Result<(), RdrError> {
        trace!("record head init: enter");
        self.reentry = self.reentry.wrapping_add(1);
        if self.state != HeadState::Uninitialized {
            error!("record head initialized again (reentry {})", self.reentry);
            self.region.write_u32(
                RegionOffset::new(HeadPrefix::REENTRY_COUNT_OFFSET as u64),
                self.reentry,
            )?;
            return Err(RdrError::AlreadyInitialized);
        }
        let areas = config.areas;
        if areas.is_empty() || areas.len() > MAX_AREAS {
            return Err(RdrError::InvalidArgument("area count out of range"));
        }
        let head_size = config.head_size;
        if head_size < POOL_OFFSET + MIN_POOL_SIZE || head_size >= self.region.size() {
            return Err(RdrError::InvalidArgument("head size does not fit the region"));
        }
        let reserved = areas[1..]
            .iter()
            .try_fold(0u64, |sum, &size| sum.checked_add(size));
        if !reserved.is_some_and(|sum| sum < self.region.size() - head_size) {
            return Err(RdrError::InvalidArgument("areas leave no room for area 0"));
        }

        self.state = HeadState::ValidatingPrior;
        self.state = match self.backup_prior()? {
            Some(last) => {
                self.last = Some(last);
                HeadState::BackedUp
            }
            None => HeadState::NoPrior,
        };

        match platform.boot_type() {
            BootType::ColdBoot => self.region.fill(RegionOffset::new(0), self.region.size(), 0)?,
            BootType::WarmBoot => self.region.fill(RegionOffset::new(0), head_size, 0)?,
        }
        self.state = HeadState::Reinitialized;

        self.write_top_head(config, platform)?;
        let payload = self
            .region
            .mem_at(RegionOffset::new(head_size), self.region.size() - head_size)?;
        let pool = SafeMemPool::init(
            self.region,
            RegionOffset::new(POOL_OFFSET),
            "rdr_mem",
            head_size - POOL_OFFSET,
            payload,
            false,
        )?;
        Self::alloc_areas(&pool, areas)?;
        self.pool = Some(pool);
        self.area_count = areas.len();
        self.state = HeadState::Ready;

        self.show_base_info(false);
        trace!("record head init: exit");
        Ok(())
    }

    /// Copy last boot's region aside if its head validates.
    fn backup_prior(&self) -> Result<Option<LastRecord>, RdrError> {
        let view = match RecordView::open(self.region) {
            Ok(view) => view,
            Err(e) => {
                info!("no prior record: {e}");
                return Ok(None);
            }
        };
        let copy = self.region.try_clone_contents().inspect_err(|e| {
            error!("cannot back up last record: {e}");
        })?;
        info!(
            "last record backed up ({} bytes, {} bit(s) corrected in head)",
            copy.size(),
            view.corrected_bits()
        );
        let last = LastRecord::new(copy);
        if let Ok(view) = last.view() {
            view.show();
        }
        Ok(Some(last))
    }

    fn write_top_head(&self, config: &BlackboxConfig, platform: &dyn Platform) -> Result<(), RdrError> {
        let area_count = u32::try_from(config.areas.len())
            .map_err(|_| RdrError::InvalidArgument("area count out of range"))?;
        let mut top = TopHead {
            magic: FILE_MAGIC,
            version: RDR_VERSION,
            area_count,
            base_address: self.region.phys().as_u64(),
            total_size: self.region.size(),
            ..TopHead::default()
        };
        copy_truncated(&mut top.build_time, platform.build_time().as_bytes());
        copy_truncated(&mut top.product_name, config.product_name.as_bytes());
        copy_truncated(&mut top.product_version, config.product_version.as_bytes());

        let mut prefix = HeadPrefix {
            top,
            reentry_count: self.reentry,
            ..HeadPrefix::default()
        };
        let mut top_bytes = [0u8; TopHead::SIZE];
        prefix.top.write_le(&mut top_bytes);
        bbox_bch::encode(&top_bytes, &mut prefix.ecc)?;
        self.region.write(RegionOffset::new(0), &bbox_layout::to_vec(&prefix))?;
        Ok(())
    }

    fn alloc_areas(pool: &SafeMemPool<'_>, areas: &[u64]) -> Result<(), RdrError> {
        for index in (1..areas.len()).rev() {
            pool.alloc(area_id(index), areas[index]).inspect_err(|e| {
                error!("area {index}: {e}");
            })?;
        }
        let remainder = pool.cur_alloc_addr().as_u64() - pool.base_alloc_addr().as_u64();
        pool.alloc(area_id(0), remainder).inspect_err(|e| {
            error!("area 0 ({remainder} bytes): {e}");
        })?;
        Ok(())
    }

    fn ready_pool(&self) -> Result<&SafeMemPool<'r>, RdrError> {
        match (&self.pool, self.state) {
            (Some(pool), HeadState::Ready) => Ok(pool),
            _ => Err(RdrError::Unavailable),
        }
    }

    fn ensure_ready(&self) -> Result<(), RdrError> {
        self.ready_pool().map(|_| ())
    }

    /// The main pool, once ready.
    pub fn pool(&self) -> Result<&SafeMemPool<'r>, RdrError> {
        self.ready_pool()
    }

    /// Physical address and size of the area with directory id `area_id`.
    pub fn get_area_info(&self, area_id: u32) -> Result<MemRegion, RdrError> {
        let pool = self.ready_pool()?;
        match area_index(area_id) {
            Some(index) if index < self.area_count => Ok(pool.get(area_id)?),
            _ => Err(RdrError::InvalidArgument("unknown area id")),
        }
    }

    pub fn record_exception(&self, module_id: u32, arg1: u32, arg2: u32) -> Result<(), RdrError> {
        self.ensure_ready()?;
        self.write_field(BaseInfo::MODULE_ID_OFFSET, module_id)?;
        self.write_field(BaseInfo::ARG1_OFFSET, arg1)?;
        self.write_field(BaseInfo::ARG2_OFFSET, arg2)
    }

    pub fn record_classification(&self, class: &Classification<'_>) -> Result<(), RdrError> {
        self.ensure_ready()?;
        self.write_field(BaseInfo::CORE_ID_OFFSET, class.core_id)?;
        self.write_field(BaseInfo::EXCEPTION_TYPE_OFFSET, class.exception_type)?;
        self.write_field(BaseInfo::EXCEPTION_SUBTYPE_OFFSET, class.exception_subtype)?;
        self.write_str(BaseInfo::MODULE_NAME_OFFSET, &mut [0; MODULE_NAME_LEN], class.module_name)?;
        self.write_str(
            BaseInfo::DESCRIPTION_OFFSET,
            &mut [0; STR_EXCEPTIONDESC_MAXLEN],
            class.description,
        )?;
        self.write_str(BaseInfo::DATETIME_OFFSET, &mut [0; DATATIME_MAXLEN], class.datetime)
    }

    /// Start of exception processing: clear the cause and move both progress
    /// flags to their start state.
    pub fn begin_exception_processing(&self) -> Result<(), RdrError> {
        self.ensure_ready()?;
        for field in [
            BaseInfo::MODULE_ID_OFFSET,
            BaseInfo::ARG1_OFFSET,
            BaseInfo::ARG2_OFFSET,
            BaseInfo::CORE_ID_OFFSET,
            BaseInfo::EXCEPTION_TYPE_OFFSET,
            BaseInfo::EXCEPTION_SUBTYPE_OFFSET,
        ] {
            self.write_field(field, 0)?;
        }
        self.region.fill(
            RegionOffset::new(base_info_field(BaseInfo::DATETIME_OFFSET)),
            DATATIME_MAXLEN as u64,
            0,
        )?;
        self.advance(BaseInfo::START_FLAG_OFFSET, StartFlag::ExecStart.raw(), |raw| {
            StartFlag::from_raw(raw).is_some_and(|f| f < StartFlag::ExecStart)
        })?;
        self.advance(BaseInfo::SAVEFILE_FLAG_OFFSET, SaveFileFlag::DumpStart.raw(), |raw| {
            SaveFileFlag::from_raw(raw).is_some_and(|f| f < SaveFileFlag::DumpStart)
        })?;
        self.write_field(BaseInfo::CLEARTEXT_SAVEFILE_FLAG_OFFSET, 0)
    }

    pub fn mark_dump_done(&self) -> Result<(), RdrError> {
        self.ensure_ready()?;
        self.write_field(BaseInfo::SAVEFILE_FLAG_OFFSET, SaveFileFlag::DumpDone.raw())
    }

    pub fn mark_exec_done(&self) -> Result<(), RdrError> {
        self.ensure_ready()?;
        self.write_field(BaseInfo::START_FLAG_OFFSET, StartFlag::ExecDone.raw())
    }

    pub fn mark_reboot_done(&self) -> Result<(), RdrError> {
        self.ensure_ready()?;
        self.write_field(BaseInfo::REBOOT_FLAG_OFFSET, RebootFlag::RebootDone.raw())
    }

    pub fn mark_cleartext_done(&self) -> Result<(), RdrError> {
        self.ensure_ready()?;
        self.write_field(BaseInfo::CLEARTEXT_SAVEFILE_FLAG_OFFSET, 1)
    }

    /// Number of [`init`](Self::init) calls on this head, as persisted.
    pub fn reentry_count(&self) -> Result<u32, RdrError> {
        Ok(self
            .region
            .read_u32(RegionOffset::new(HeadPrefix::REENTRY_COUNT_OFFSET as u64))?)
    }

    /// Current base info as stored in the region.
    pub fn base_info(&self) -> Result<BaseInfo, RdrError> {
        let mut buf = [0u8; BaseInfo::SIZE];
        self.region
            .read(RegionOffset::new(base_info_field(0)), &mut buf)?;
        Ok(BaseInfo::read_le(&buf))
    }

    /// Log this boot's record, or the backed-up one.
    pub fn show_base_info(&self, is_last: bool) {
        let view = if is_last {
            match &self.last {
                Some(last) => last.view(),
                None => return,
            }
        } else {
            RecordView::open(self.region)
        };
        match view {
            Ok(view) => view.show(),
            Err(e) => info!("record not initialized, nothing to show: {e}"),
        }
    }

    #[must_use]
    pub const fn last_record(&self) -> Option<&LastRecord> {
        self.last.as_ref()
    }

    /// Release last boot's copy.
    pub fn clear_last_record(&mut self) {
        if self.last.take().is_some() {
            info!("last record released");
        }
    }

    /// Nothing to tear down; the record simply stops being written.
    pub const fn exit(&self) {}

    fn write_field(&self, field_offset: usize, value: u32) -> Result<(), RdrError> {
        Ok(self
            .region
            .write_u32(RegionOffset::new(base_info_field(field_offset)), value)?)
    }

    fn write_str(&self, field_offset: usize, buf: &mut [u8], value: &str) -> Result<(), RdrError> {
        copy_truncated(buf, value.as_bytes());
        Ok(self
            .region
            .write(RegionOffset::new(base_info_field(field_offset)), buf)?)
    }

    /// Write `value` only if `behind(current)` holds; flags never move back.
    fn advance(&self, field_offset: usize, value: u32, behind: impl Fn(u32) -> bool) -> Result<(), RdrError> {
        let at = RegionOffset::new(base_info_field(field_offset));
        if behind(self.region.read_u32(at)?) {
            self.region.write_u32(at, value)?;
        }
        Ok(())
    }
}

impl core::fmt::Debug for RecordHead<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecordHead")
            .field("state", &self.state)
            .field("area_count", &self.area_count)
            .field("has_last", &self.last.is_some())
            .finish_non_exhaustive()
    }
}
