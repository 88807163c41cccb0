//! Persisted-format constants. Changing any of these breaks readers of
//! existing region images.

/// Marks an initialized record head.
pub const FILE_MAGIC: u32 = 0xdead_8d8d;
/// Record format version, major in the high half.
pub const RDR_VERSION: u32 = 0x0001_0001;

/// Default bytes reserved at the start of the region for the head and the
/// main pool directory. Area payloads start right after.
pub const RDR_BASEINFO_SIZE: u64 = 0x4000;
/// Offset of the main pool header within the head prefix.
pub const POOL_OFFSET: u64 = 0x100;

pub const MODULE_NAME_LEN: usize = 12;
pub const STR_EXCEPTIONDESC_MAXLEN: usize = 48;
pub const DATATIME_MAXLEN: usize = 24;
pub const RDR_BUILD_DATE_TIME_LEN: usize = 16;
pub const RDR_PRODUCT_MAXLEN: usize = 16;

/// Maximum number of areas; area `i` is recorded under id `1 << i`.
pub const MAX_AREAS: usize = 16;

const AREA_NAMES: [&str; 8] = ["AP", "CP", "TEEOS", "HIFI", "LPM3", "IOM3", "ISP", "IVP"];

/// Directory id of area `index`.
#[must_use]
pub const fn area_id(index: usize) -> u32 {
    1 << index
}

/// Inverse of [`area_id`] for ids naming exactly one area.
#[must_use]
pub const fn area_index(id: u32) -> Option<usize> {
    if id.is_power_of_two() && (id.trailing_zeros() as usize) < MAX_AREAS {
        Some(id.trailing_zeros() as usize)
    } else {
        None
    }
}

#[must_use]
pub fn area_name(index: usize) -> &'static str {
    AREA_NAMES.get(index).copied().unwrap_or("AREA")
}

/// Marks an initialized AP exception root.
pub const AP_DUMP_MAGIC: u32 = 0x1928_3746;
/// v1.0.11
pub const BBOX_VERSION: u64 = 0x1001B;
/// Bytes at the start of area 0 reserved for the AP root and its directory.
pub const ROOT_HEAD_SIZE: u64 = 0x4000;
/// Bytes of the AP root covered by its parity.
pub const ROOT_CHECK_SIZE: usize = 128;
/// Offset of the AP pool header within the AP root.
pub const AP_POOL_OFFSET: u64 = 0x100;
pub const PRODUCT_VERSION_LEN: usize = 32;
pub const PRODUCT_DEVICE_LEN: usize = 32;

/// Directory ids used inside the AP pool.
pub mod memid {
    pub const REGDUMP: u32 = 1;
    pub const MODULE_DUMP: u32 = 100;
    pub const PSTORE: u32 = 200;
    pub const STACK: u32 = 210;
    pub const SUSPEND_INFO: u32 = 220;
    pub const HOOK: u32 = 1000;
    pub const RES: u32 = 2000;
}
