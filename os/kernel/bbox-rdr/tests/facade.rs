//! The process-wide facade is a one-shot static, so everything lives in a
//! single test.

mod common;

use bbox_rdr::consts::area_id;
use bbox_rdr::{Blackbox, BlackboxConfig, DumpModule, RdrError, SaveFileFlag};
use common::{TestPlatform, region};

const CONFIG: BlackboxConfig = BlackboxConfig::new().with_areas(&[0, 0x1000]);

#[test]
fn facade_reports_not_ready_until_installed() {
    let tfa = DumpModule::Tfa as u32;
    assert_eq!(bbox_rdr::get_module_dump_region(tfa), Err(RdrError::PermissionDenied));
    assert_eq!(
        bbox_rdr::register_dump_callback(tfa, |_| Ok(()), "tfa"),
        Err(RdrError::PermissionDenied)
    );
    assert_eq!(bbox_rdr::get_area_info(area_id(0)), Err(RdrError::Unavailable));
    assert!(bbox_rdr::run_all_dumps().is_none());
    assert_eq!(bbox_rdr::mark_dump_done(), Err(RdrError::Unavailable));
    assert!(bbox_rdr::blackbox().is_none());

    let r: &'static _ = Box::leak(Box::new(region(0x2_0000)));
    let installed = bbox_rdr::install(Blackbox::init(r, &CONFIG, &TestPlatform::COLD).unwrap()).unwrap();
    assert!(std::ptr::eq(installed, bbox_rdr::blackbox().unwrap()));

    let slot = bbox_rdr::get_module_dump_region(tfa).unwrap();
    assert_eq!(slot.size, 0x4000);
    assert!(matches!(
        bbox_rdr::get_module_dump_region(99),
        Err(RdrError::InvalidArgument(_))
    ));
    assert_eq!(bbox_rdr::get_area_info(area_id(1)).unwrap().size, 0x1000);

    bbox_rdr::register_dump_callback(tfa, |buf| {
        buf[0] = 1;
        Ok(())
    }, "tfa")
    .unwrap();
    let report = bbox_rdr::run_all_dumps().unwrap();
    assert_eq!((report.invoked, report.failed), (1, 0));
    bbox_rdr::mark_dump_done().unwrap();
    assert_eq!(
        installed.head().base_info().unwrap().savefile_flag(),
        Some(SaveFileFlag::DumpDone)
    );

    let again = Blackbox::init(
        Box::leak(Box::new(region(0x2_0000))),
        &CONFIG,
        &TestPlatform::COLD,
    )
    .unwrap();
    assert_eq!(bbox_rdr::install(again).err(), Some(RdrError::AlreadyInitialized));
}
