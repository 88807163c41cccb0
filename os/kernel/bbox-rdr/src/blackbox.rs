//! The recorder context: head, AP root and module-dump registry brought up
//! in order over one reserved region.

use crate::RdrError;
use crate::ap_root::ApRoot;
use crate::config::{BlackboxConfig, Platform};
use crate::consts::area_id;
use crate::head::{Classification, LastRecord, RecordHead};
use crate::moddump::{DumpCallback, DumpModule, DumpReport, ModuleDumpRegistry};
use bbox_addresses::{MemRegion, ReservedRegion};
use log::{error, info, trace, warn};

/// What the exception path knows about the failure.
#[derive(Debug, Copy, Clone, Default)]
pub struct ExceptionRecord<'a> {
    pub module_id: u32,
    pub arg1: u32,
    pub arg2: u32,
    pub class: Classification<'a>,
}

/// Result of [`Blackbox::handle_exception`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExceptionOutcome {
    /// First entry: dumps ran and execution was marked done. The save flag
    /// stays at `DumpStart` until [`Blackbox::mark_dump_done`].
    Recorded(DumpReport),
    /// The path was entered again while already handling an exception; the
    /// cause was recorded but dumps were not rerun.
    Nested { depth: u32 },
}

pub struct Blackbox<'r> {
    head: RecordHead<'r>,
    ap_root: ApRoot<'r>,
    moddump: ModuleDumpRegistry<'r>,
}

impl<'r> Blackbox<'r> {
    /// Initialize the head, lay the AP root over area 0 and allocate the
    /// module-dump slots from the AP pool.
    pub fn init(
        region: &'r ReservedRegion,
        config: &BlackboxConfig,
        platform: &dyn Platform,
    ) -> Result<Self, RdrError> {
        trace!("blackbox init: enter");
        let mut head = RecordHead::new(region);
        head.init(config, platform)?;
        let area0 = head.get_area_info(area_id(0))?;
        let ap_root = ApRoot::init(region, area0, config, platform.time_slice())?;
        let moddump = ModuleDumpRegistry::init(ap_root.pool(), &config.module_dump_sizes);
        moddump.show();
        info!("blackbox ready");
        trace!("blackbox init: exit");
        Ok(Self {
            head,
            ap_root,
            moddump,
        })
    }

    /// Record an exception and run the module dumps.
    ///
    /// The AP root's enter count is never reset within a boot, so any later
    /// entry counts as nested and only overwrites the cause codes.
    /// Takes no lock that init-context code may hold, apart from the bounded
    /// per-slot spin in [`ModuleDumpRegistry::run_all_dumps`].
    pub fn handle_exception(&self, record: &ExceptionRecord<'_>) -> Result<ExceptionOutcome, RdrError> {
        let enter_times = self.ap_root.enter()?;
        let depth = enter_times.saturating_sub(1);
        info!(
            "exception from module 0x{:x} (arg1 0x{:x}, arg2 0x{:x}), enter_times {enter_times}",
            record.module_id, record.arg1, record.arg2
        );
        if depth > 0 {
            warn!("exception path re-entered (depth {depth}), skipping dumps");
            self.head
                .record_exception(record.module_id, record.arg1, record.arg2)?;
            return Ok(ExceptionOutcome::Nested { depth });
        }

        self.head.begin_exception_processing()?;
        self.head
            .record_exception(record.module_id, record.arg1, record.arg2)?;
        self.head.record_classification(&record.class)?;

        let report = self.moddump.run_all_dumps();
        if report.failed > 0 {
            error!("{} of {} module dump(s) failed", report.failed, report.invoked);
        }
        self.head.mark_exec_done()?;
        Ok(ExceptionOutcome::Recorded(report))
    }

    #[must_use]
    pub const fn head(&self) -> &RecordHead<'r> {
        &self.head
    }

    #[must_use]
    pub const fn ap_root(&self) -> &ApRoot<'r> {
        &self.ap_root
    }

    #[must_use]
    pub const fn moddump(&self) -> &ModuleDumpRegistry<'r> {
        &self.moddump
    }

    pub fn get_area_info(&self, area_id: u32) -> Result<MemRegion, RdrError> {
        self.head.get_area_info(area_id)
    }

    pub fn get_module_dump_region(&self, module: DumpModule) -> Result<MemRegion, RdrError> {
        self.moddump.get_region(module)
    }

    pub fn register_dump_callback(
        &self,
        module: DumpModule,
        callback: DumpCallback,
        name: &str,
    ) -> Result<(), RdrError> {
        self.moddump.register(module, callback, name)
    }

    pub fn run_all_dumps(&self) -> DumpReport {
        self.moddump.run_all_dumps()
    }

    pub fn begin_exception_processing(&self) -> Result<(), RdrError> {
        self.head.begin_exception_processing()
    }

    /// Called by the platform once the dumps have been saved to storage.
    pub fn mark_dump_done(&self) -> Result<(), RdrError> {
        self.head.mark_dump_done()
    }

    pub fn mark_cleartext_done(&self) -> Result<(), RdrError> {
        self.head.mark_cleartext_done()
    }

    pub fn mark_reboot_done(&self) -> Result<(), RdrError> {
        self.head.mark_reboot_done()
    }

    #[must_use]
    pub const fn last_record(&self) -> Option<&LastRecord> {
        self.head.last_record()
    }

    pub fn clear_last_record(&mut self) {
        self.head.clear_last_record();
    }
}

impl core::fmt::Debug for Blackbox<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Blackbox")
            .field("head", &self.head)
            .field("ap_root", &self.ap_root)
            .field("moddump", &self.moddump)
            .finish()
    }
}
