//! Module-dump registry: pre-allocated slots that subsystems fill with their
//! diagnostic state when an exception is being recorded.

use crate::RdrError;
use crate::consts::{MODULE_NAME_LEN, memid};
use alloc::boxed::Box;
use bbox_addresses::{MemRegion, RegionOffset, ReservedRegion};
use bbox_layout::{copy_truncated, fixed_str};
use bbox_safemem::SafeMemPool;
use bbox_sync::SpinLock;
use log::{debug, error, info, trace};

/// Modules that can own a dump slot. The discriminant is the table index.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum DumpModule {
    Test = 0,
    Noc = 1,
    Ddr = 2,
    Tzc400 = 3,
    Idm = 4,
    Smmu = 5,
    Tfa = 6,
    Gap = 7,
}

impl DumpModule {
    pub const COUNT: usize = 8;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Test,
        Self::Noc,
        Self::Ddr,
        Self::Tzc400,
        Self::Idm,
        Self::Smmu,
        Self::Tfa,
        Self::Gap,
    ];

    /// Directory id of this module's slot in the AP pool.
    #[must_use]
    pub const fn memid(self) -> u32 {
        memid::MODULE_DUMP + self as u32
    }
}

impl TryFrom<u32> for DumpModule {
    type Error = RdrError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .get(id as usize)
            .copied()
            .ok_or(RdrError::InvalidArgument("module id out of range"))
    }
}

/// Failure reported by a dump callback.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("module dump failed: {0}")]
pub struct DumpError(pub &'static str);

/// Fills the slot with the module's state. Runs in exception context: it
/// must not block or allocate. Registering from inside a callback fails
/// with [`RdrError::Busy`] for the slot being dumped.
pub type DumpCallback = Box<dyn Fn(&mut [u8]) -> Result<(), DumpError> + Send + Sync>;

struct Registration {
    callback: DumpCallback,
    name: [u8; MODULE_NAME_LEN],
}

struct Slot {
    mem: MemRegion,
    offset: RegionOffset,
    registration: SpinLock<Option<Registration>>,
}

/// Outcome of [`ModuleDumpRegistry::run_all_dumps`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct DumpReport {
    pub invoked: u32,
    pub failed: u32,
    /// Slots skipped because their registration lock stayed busy.
    pub skipped: u32,
}

/// Spins granted to a busy slot before giving up on it.
const DUMP_LOCK_SPINS: usize = 1 << 12;

pub struct ModuleDumpRegistry<'r> {
    region: &'r ReservedRegion,
    slots: [Option<Slot>; DumpModule::COUNT],
}

impl<'r> ModuleDumpRegistry<'r> {
    /// Allocate a slot for each module with a nonzero size.
    ///
    /// The first failed allocation ends the scan: later modules get no slot
    /// this boot. That is logged, not returned.
    pub fn init(pool: &SafeMemPool<'r>, sizes: &[u64; DumpModule::COUNT]) -> Self {
        trace!("module dump init: enter");
        let mut slots: [Option<Slot>; DumpModule::COUNT] = Default::default();
        for module in DumpModule::ALL {
            let size = sizes[module as usize];
            if size == 0 {
                continue;
            }
            let allocated = pool
                .alloc(module.memid(), size)
                .and_then(|mem| Ok((mem, pool.payload_offset(&mem)?)));
            match allocated {
                Ok((mem, offset)) => {
                    debug!("module {module:?}: dump slot {} size 0x{:x}", mem.vaddr, mem.size);
                    slots[module as usize] = Some(Slot {
                        mem,
                        offset,
                        registration: SpinLock::new(None),
                    });
                }
                Err(e) => {
                    error!("no room for module {module:?} dump slot: {e}");
                    break;
                }
            }
        }
        trace!("module dump init: exit");
        Self {
            region: pool.region(),
            slots,
        }
    }

    /// Attach `callback` to the module's slot, replacing any earlier one.
    ///
    /// The slot stays locked while its dump runs; registering for it then
    /// fails with [`RdrError::Busy`] after a bounded spin.
    pub fn register(
        &self,
        module: DumpModule,
        callback: DumpCallback,
        name: &str,
    ) -> Result<(), RdrError> {
        if name.is_empty() {
            error!("module {module:?}: empty module name");
            return Err(RdrError::InvalidArgument("empty module name"));
        }
        info!("module_name [{name}]");
        let Some(slot) = &self.slots[module as usize] else {
            error!("module {module:?} [{name}] has no dump slot, register failed");
            return Err(RdrError::NoDumpSlot(module));
        };
        let Some(mut registration) = slot.registration.try_lock_spin(DUMP_LOCK_SPINS) else {
            error!("module {module:?} [{name}]: dump slot busy, register failed");
            return Err(RdrError::Busy(module));
        };
        let mut stored = [0u8; MODULE_NAME_LEN];
        copy_truncated(&mut stored, name.as_bytes());
        *registration = Some(Registration {
            callback,
            name: stored,
        });
        Ok(())
    }

    /// The slot allocated to `module`.
    pub fn get_region(&self, module: DumpModule) -> Result<MemRegion, RdrError> {
        match &self.slots[module as usize] {
            Some(slot) => Ok(slot.mem),
            None => {
                error!("module {module:?}: dump size is zero");
                Err(RdrError::InvalidArgument("module has no dump slot"))
            }
        }
    }

    /// A slot whose registration stays locked counts as registered: only
    /// a running dump or a concurrent `register` holds it.
    #[must_use]
    pub fn is_registered(&self, module: DumpModule) -> bool {
        self.slots[module as usize].as_ref().is_some_and(|slot| {
            slot.registration
                .try_lock_spin(DUMP_LOCK_SPINS)
                .is_none_or(|registration| registration.is_some())
        })
    }

    /// Invoke every registered callback on its slot, in table order.
    ///
    /// Failures are logged and counted; they never stop the iteration. The
    /// pool lock is never taken, and a slot whose registration is locked by
    /// someone else is skipped after a bounded spin.
    pub fn run_all_dumps(&self) -> DumpReport {
        trace!("run_all_dumps: enter");
        let mut report = DumpReport::default();
        for (module, slot) in DumpModule::ALL.iter().zip(&self.slots) {
            let Some(slot) = slot else { continue };
            let Some(guard) = slot.registration.try_lock_spin(DUMP_LOCK_SPINS) else {
                error!("module {module:?}: registration busy, dump skipped");
                report.skipped += 1;
                continue;
            };
            let Some(registration) = guard.as_ref() else { continue };

            // SAFETY: slot bytes belong to this registry alone and the
            // registration guard serializes every writer of them.
            let payload = match unsafe { self.region.slice_mut(slot.offset, slot.mem.size) } {
                Ok(payload) => payload,
                Err(e) => {
                    error!("module {module:?}: {e}");
                    report.failed += 1;
                    continue;
                }
            };
            report.invoked += 1;
            if let Err(e) = (registration.callback)(payload) {
                error!("[{}] dump failed: {e}", fixed_str(&registration.name));
                report.failed += 1;
            }
        }
        trace!("run_all_dumps: exit");
        report
    }

    /// Log every allocated slot.
    pub fn show(&self) {
        for (module, slot) in DumpModule::ALL.iter().zip(&self.slots) {
            if let Some(slot) = slot {
                debug!("moddump[{module:?}] addr {} size 0x{:x}", slot.mem.vaddr, slot.mem.size);
            }
        }
    }
}

impl core::fmt::Debug for ModuleDumpRegistry<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModuleDumpRegistry")
            .field("slots", &self.slots.iter().filter(|s| s.is_some()).count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbox_addresses::{PhysicalAddress, VirtualAddress};
    use std::sync::{Arc, Mutex};

    fn region() -> ReservedRegion {
        ReservedRegion::zeroed(
            PhysicalAddress::new(0x8000_0000),
            VirtualAddress::new(0xffff_0000_8000_0000),
            0x4000,
        )
    }

    fn pool(r: &ReservedRegion) -> SafeMemPool<'_> {
        let payload = r.mem_at(RegionOffset::new(1024), r.size() - 1024).unwrap();
        SafeMemPool::init(r, RegionOffset::new(0), "ap", 1024, payload, true).unwrap()
    }

    fn sizes(list: &[(DumpModule, u64)]) -> [u64; DumpModule::COUNT] {
        let mut sizes = [0; DumpModule::COUNT];
        for &(module, size) in list {
            sizes[module as usize] = size;
        }
        sizes
    }

    #[test]
    fn module_ids_map_to_table_order() {
        assert_eq!(DumpModule::try_from(0), Ok(DumpModule::Test));
        assert_eq!(DumpModule::try_from(7), Ok(DumpModule::Gap));
        assert!(matches!(DumpModule::try_from(8), Err(RdrError::InvalidArgument(_))));
        assert_eq!(DumpModule::Tfa.memid(), memid::MODULE_DUMP + 6);
    }

    #[test]
    fn slots_are_allocated_under_module_memids() {
        let r = region();
        let pool = pool(&r);
        let reg = ModuleDumpRegistry::init(&pool, &sizes(&[(DumpModule::Noc, 0x100), (DumpModule::Gap, 0x40)]));

        let noc = reg.get_region(DumpModule::Noc).unwrap();
        assert_eq!(noc.size, 0x100);
        assert_eq!(pool.get(DumpModule::Noc.memid()).unwrap(), noc);
        assert_eq!(reg.get_region(DumpModule::Gap).unwrap().size, 0x40);
        assert!(matches!(reg.get_region(DumpModule::Ddr), Err(RdrError::InvalidArgument(_))));
    }

    #[test]
    fn first_failed_slot_stops_allocation() {
        let r = region();
        let pool = pool(&r);
        let reg = ModuleDumpRegistry::init(
            &pool,
            &sizes(&[
                (DumpModule::Test, 0x100),
                (DumpModule::Noc, 0x10_0000),
                (DumpModule::Ddr, 0x10),
            ]),
        );

        assert!(reg.get_region(DumpModule::Test).is_ok());
        assert!(reg.get_region(DumpModule::Noc).is_err());
        assert!(reg.get_region(DumpModule::Ddr).is_err());
        assert_eq!(pool.cur_entries(), 1);
        assert_eq!(
            reg.register(DumpModule::Ddr, Box::new(|_| Ok(())), "ddr"),
            Err(RdrError::NoDumpSlot(DumpModule::Ddr))
        );
    }

    #[test]
    fn registration_needs_a_name() {
        let r = region();
        let pool = pool(&r);
        let reg = ModuleDumpRegistry::init(&pool, &sizes(&[(DumpModule::Idm, 0x20)]));
        assert!(matches!(
            reg.register(DumpModule::Idm, Box::new(|_| Ok(())), ""),
            Err(RdrError::InvalidArgument(_))
        ));
        assert!(!reg.is_registered(DumpModule::Idm));
        reg.register(DumpModule::Idm, Box::new(|_| Ok(())), "idm").unwrap();
        assert!(reg.is_registered(DumpModule::Idm));
    }

    #[test]
    fn dumps_run_in_table_order_and_failures_do_not_stop_the_loop() {
        let r = region();
        let pool = pool(&r);
        let reg = ModuleDumpRegistry::init(
            &pool,
            &sizes(&[
                (DumpModule::Test, 0x10),
                (DumpModule::Noc, 0x10),
                (DumpModule::Smmu, 0x20),
            ]),
        );
        let calls = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&calls);
        reg.register(
            DumpModule::Smmu,
            Box::new(move |buf| {
                log.lock().unwrap().push("smmu");
                buf.fill(0x5a);
                Ok(())
            }),
            "smmu",
        )
        .unwrap();
        let log = Arc::clone(&calls);
        reg.register(
            DumpModule::Test,
            Box::new(move |_| {
                log.lock().unwrap().push("test");
                Err(DumpError("bus error"))
            }),
            "test",
        )
        .unwrap();

        let report = reg.run_all_dumps();
        assert_eq!(
            report,
            DumpReport {
                invoked: 2,
                failed: 1,
                skipped: 0
            }
        );
        assert_eq!(*calls.lock().unwrap(), ["test", "smmu"]);

        let smmu = reg.get_region(DumpModule::Smmu).unwrap();
        let offset = pool.payload_offset(&smmu).unwrap();
        let mut written = [0u8; 0x20];
        r.read(offset, &mut written).unwrap();
        assert!(written.iter().all(|&b| b == 0x5a));
    }

    #[test]
    fn a_later_registration_replaces_the_earlier_one() {
        let r = region();
        let pool = pool(&r);
        let reg = ModuleDumpRegistry::init(&pool, &sizes(&[(DumpModule::Tfa, 0x8)]));
        reg.register(DumpModule::Tfa, Box::new(|_| Err(DumpError("old"))), "old").unwrap();
        reg.register(DumpModule::Tfa, Box::new(|_| Ok(())), "new").unwrap();
        assert_eq!(reg.run_all_dumps().failed, 0);
    }

    #[test]
    fn registering_from_a_running_dump_reports_busy() {
        let r: &'static ReservedRegion = Box::leak(Box::new(region()));
        let pool: &'static SafeMemPool<'static> = Box::leak(Box::new(pool(r)));
        let reg: &'static ModuleDumpRegistry<'static> = Box::leak(Box::new(
            ModuleDumpRegistry::init(pool, &sizes(&[(DumpModule::Idm, 0x20)])),
        ));
        let nested = Arc::new(Mutex::new(None));

        let seen = Arc::clone(&nested);
        reg.register(
            DumpModule::Idm,
            Box::new(move |_| {
                let again = reg.register(DumpModule::Idm, Box::new(|_| Ok(())), "idm-again");
                *seen.lock().unwrap() = Some((again, reg.is_registered(DumpModule::Idm)));
                Ok(())
            }),
            "idm",
        )
        .unwrap();

        let report = reg.run_all_dumps();
        assert_eq!((report.invoked, report.failed), (1, 0));
        assert_eq!(
            *nested.lock().unwrap(),
            Some((Err(RdrError::Busy(DumpModule::Idm)), true))
        );
        // the slot is free again once the dump returns
        reg.register(DumpModule::Idm, Box::new(|_| Ok(())), "idm-later").unwrap();
    }
}
