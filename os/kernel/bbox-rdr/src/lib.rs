//! # Blackbox record
//!
//! Keeps a crash record in a reserved memory region that survives a warm
//! reset. The region starts with a head (identity, BCH-protected) and the
//! base info of the current exception, followed by a safe memory pool that
//! carves the rest of the region into per-subsystem areas:
//!
//! ```text
//! 0x0000 ─► TopHead + ECC │ reentry │ BaseInfo
//! 0x0100 ─► main pool header + directory
//! head   ─► area N-1 … area 1 │ area 0 (AP root, AP pool, module dumps)
//! ```
//!
//! [`Blackbox`] brings the pieces up in order. On the way it copies last
//! boot's record aside if the head still validates, so it can be inspected
//! through [`LastRecord`] after this boot has started overwriting the live
//! region.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod ap_root;
mod blackbox;
mod config;
pub mod consts;
mod global;
mod head;
mod layout;
mod moddump;
mod record;

use bbox_addresses::RegionError;
use bbox_bch::BchError;
use bbox_safemem::PoolError;

pub use ap_root::{ApRoot, ApRootHeader, MemTriple};
pub use blackbox::{Blackbox, ExceptionOutcome, ExceptionRecord};
pub use config::{BlackboxConfig, BootType, Platform};
pub use global::{
    blackbox, get_area_info, get_module_dump_region, install, mark_dump_done,
    register_dump_callback, run_all_dumps,
};
pub use head::{Classification, HeadState, LastRecord, RecordHead};
pub use layout::{BaseInfo, HeadPrefix, RebootFlag, SaveFileFlag, StartFlag, TopHead};
pub use moddump::{DumpCallback, DumpError, DumpModule, DumpReport, ModuleDumpRegistry};
pub use record::RecordView;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RdrError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The registry was used before the recorder was installed.
    #[error("blackbox not ready")]
    PermissionDenied,
    #[error("record head not initialized")]
    Unavailable,
    #[error("already initialized")]
    AlreadyInitialized,
    #[error("module {0:?} has no dump slot")]
    NoDumpSlot(DumpModule),
    /// The slot's registration stayed locked, e.g. by its own running dump.
    #[error("module {0:?} dump slot is busy")]
    Busy(DumpModule),
    #[error("no record head (magic 0x{0:08x})")]
    BadMagic(u32),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error(transparent)]
    Bch(#[from] BchError),
}
