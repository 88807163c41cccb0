//! Byte layout of the record head prefix.
//!
//! ```text
//! 0x000  TopHead          80 B   ECC-protected
//! 0x050  ecc               8 B
//! 0x058  reentry_count     4 B
//! 0x060  BaseInfo        128 B   rewritten at exception time, unprotected
//! 0x100  pool header + directory ... up to the head size
//! ```

use crate::consts::{
    DATATIME_MAXLEN, MODULE_NAME_LEN, POOL_OFFSET, RDR_BUILD_DATE_TIME_LEN, RDR_PRODUCT_MAXLEN,
    STR_EXCEPTIONDESC_MAXLEN,
};
use bbox_layout::{Persist, fixed_str};

#[derive(Debug, Clone, Default, PartialEq, Eq, Persist)]
pub struct TopHead {
    pub magic: u32,
    pub version: u32,
    pub area_count: u32,
    pub reserved: u32,
    /// Physical base of the region.
    pub base_address: u64,
    pub total_size: u64,
    pub build_time: [u8; RDR_BUILD_DATE_TIME_LEN],
    pub product_name: [u8; RDR_PRODUCT_MAXLEN],
    pub product_version: [u8; RDR_PRODUCT_MAXLEN],
}

impl TopHead {
    #[must_use]
    pub fn build_time(&self) -> &str {
        fixed_str(&self.build_time)
    }

    #[must_use]
    pub fn product_name(&self) -> &str {
        fixed_str(&self.product_name)
    }

    #[must_use]
    pub fn product_version(&self) -> &str {
        fixed_str(&self.product_version)
    }
}

macro_rules! lifecycle_flag {
    ($(#[$m:meta])* $name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        $(#[$m])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
        #[repr(u32)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            #[must_use]
            pub const fn from_raw(raw: u32) -> Option<Self> {
                match raw {
                    $(v if v == $value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            #[must_use]
            pub const fn raw(self) -> u32 {
                self as u32
            }
        }
    };
}

lifecycle_flag!(
    /// Progress of exception processing.
    StartFlag { None = 0, ExecStart = 0xff11_5501, ExecDone = 0xff11_5502 }
);
lifecycle_flag!(
    /// Progress of saving the dump.
    SaveFileFlag { None = 0, DumpStart = 0xff11_5503, DumpDone = 0xff11_5504 }
);
lifecycle_flag!(
    RebootFlag { None = 0, RebootDone = 0xff11_5505 }
);

/// Classification of the exception being (or last) processed.
#[derive(Debug, Clone, PartialEq, Eq, Persist)]
pub struct BaseInfo {
    pub module_id: u32,
    pub arg1: u32,
    pub arg2: u32,
    pub core_id: u32,
    pub exception_type: u32,
    pub exception_subtype: u32,
    pub start_flag: u32,
    pub savefile_flag: u32,
    pub reboot_flag: u32,
    pub reserved: u32,
    pub module_name: [u8; MODULE_NAME_LEN],
    pub description: [u8; STR_EXCEPTIONDESC_MAXLEN],
    pub datetime: [u8; DATATIME_MAXLEN],
    pub cleartext_savefile_flag: u32,
}

impl Default for BaseInfo {
    fn default() -> Self {
        Self {
            module_id: 0,
            arg1: 0,
            arg2: 0,
            core_id: 0,
            exception_type: 0,
            exception_subtype: 0,
            start_flag: 0,
            savefile_flag: 0,
            reboot_flag: 0,
            reserved: 0,
            module_name: [0; MODULE_NAME_LEN],
            description: [0; STR_EXCEPTIONDESC_MAXLEN],
            datetime: [0; DATATIME_MAXLEN],
            cleartext_savefile_flag: 0,
        }
    }
}

impl BaseInfo {
    #[must_use]
    pub const fn start_flag(&self) -> Option<StartFlag> {
        StartFlag::from_raw(self.start_flag)
    }

    #[must_use]
    pub const fn savefile_flag(&self) -> Option<SaveFileFlag> {
        SaveFileFlag::from_raw(self.savefile_flag)
    }

    #[must_use]
    pub const fn reboot_flag(&self) -> Option<RebootFlag> {
        RebootFlag::from_raw(self.reboot_flag)
    }

    #[must_use]
    pub fn module_name(&self) -> &str {
        fixed_str(&self.module_name)
    }

    #[must_use]
    pub fn description(&self) -> &str {
        fixed_str(&self.description)
    }

    #[must_use]
    pub fn datetime(&self) -> &str {
        fixed_str(&self.datetime)
    }
}

/// Everything in front of the main pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Persist)]
pub struct HeadPrefix {
    pub top: TopHead,
    pub ecc: [u8; 8],
    pub reentry_count: u32,
    pub reserved: u32,
    pub base_info: BaseInfo,
}

const _: () = assert!(<HeadPrefix as Persist>::SIZE as u64 <= POOL_OFFSET);
const _: () = assert!(bbox_bch::ecc_len_for(<TopHead as Persist>::SIZE) <= 8);

/// Offset of a `BaseInfo` field within the region.
pub(crate) const fn base_info_field(field_offset: usize) -> u64 {
    (HeadPrefix::BASE_INFO_OFFSET + field_offset) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_layout() {
        assert_eq!(TopHead::SIZE, 80);
        assert_eq!(HeadPrefix::ECC_OFFSET, 80);
        assert_eq!(HeadPrefix::REENTRY_COUNT_OFFSET, 88);
        assert_eq!(HeadPrefix::BASE_INFO_OFFSET, 96);
        assert_eq!(BaseInfo::SIZE, 128);
        assert_eq!(HeadPrefix::SIZE, 224);
    }

    #[test]
    fn flags_decode_known_values_only() {
        assert_eq!(StartFlag::from_raw(0), Some(StartFlag::None));
        assert_eq!(StartFlag::from_raw(0xff11_5502), Some(StartFlag::ExecDone));
        assert_eq!(SaveFileFlag::from_raw(0xff11_5502), None);
        assert!(RebootFlag::RebootDone > RebootFlag::None);
        assert_eq!(SaveFileFlag::DumpStart.raw(), 0xff11_5503);
    }
}
