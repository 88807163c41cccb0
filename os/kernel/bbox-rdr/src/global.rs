//! Process-wide access to the installed [`Blackbox`], for collaborators that
//! cannot be handed a reference.

use crate::RdrError;
use crate::blackbox::Blackbox;
use crate::moddump::{DumpError, DumpModule, DumpReport};
use alloc::boxed::Box;
use bbox_addresses::MemRegion;
use bbox_sync::InitCell;
use log::error;

static BLACKBOX: InitCell<Blackbox<'static>> = InitCell::new();

/// Publish `blackbox` for the free functions below. Only the first call wins.
pub fn install(blackbox: Blackbox<'static>) -> Result<&'static Blackbox<'static>, RdrError> {
    BLACKBOX.set(blackbox).map_err(|_| {
        error!("blackbox already installed");
        RdrError::AlreadyInitialized
    })
}

/// The installed context, if any.
#[inline]
pub fn blackbox() -> Option<&'static Blackbox<'static>> {
    BLACKBOX.get()
}

fn registry_user() -> Result<&'static Blackbox<'static>, RdrError> {
    blackbox().ok_or_else(|| {
        error!("blackbox not ready");
        RdrError::PermissionDenied
    })
}

/// Dump slot of `module_id`.
pub fn get_module_dump_region(module_id: u32) -> Result<MemRegion, RdrError> {
    let bbox = registry_user()?;
    bbox.get_module_dump_region(DumpModule::try_from(module_id)?)
}

/// Attach a dump callback for `module_id`.
pub fn register_dump_callback<F>(module_id: u32, callback: F, name: &str) -> Result<(), RdrError>
where
    F: Fn(&mut [u8]) -> Result<(), DumpError> + Send + Sync + 'static,
{
    let bbox = registry_user()?;
    let module = DumpModule::try_from(module_id)?;
    bbox.register_dump_callback(module, Box::new(callback), name)
}

/// Physical address and size of the area with directory id `area_id`.
pub fn get_area_info(area_id: u32) -> Result<MemRegion, RdrError> {
    blackbox()
        .ok_or(RdrError::Unavailable)?
        .get_area_info(area_id)
}

/// Close the save step of the current exception once its dumps are stored.
pub fn mark_dump_done() -> Result<(), RdrError> {
    blackbox().ok_or(RdrError::Unavailable)?.mark_dump_done()
}

/// Run every registered dump; `None` before install.
pub fn run_all_dumps() -> Option<DumpReport> {
    blackbox().map(Blackbox::run_all_dumps)
}
