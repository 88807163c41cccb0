#![allow(dead_code)]

use bbox_addresses::{PhysicalAddress, ReservedRegion, VirtualAddress};
use bbox_rdr::{BootType, Platform};

pub const REGION_PHYS: u64 = 0x8_0000_0000;
pub const REGION_VIRT: u64 = 0xffff_0008_0000_0000;

pub struct TestPlatform {
    pub boot: BootType,
}

impl TestPlatform {
    pub const COLD: Self = Self {
        boot: BootType::ColdBoot,
    };
    pub const WARM: Self = Self {
        boot: BootType::WarmBoot,
    };
}

impl Platform for TestPlatform {
    fn boot_type(&self) -> BootType {
        self.boot
    }

    fn build_time(&self) -> &str {
        "2024-05-01 08:30"
    }

    fn time_slice(&self) -> u64 {
        42
    }
}

pub fn region(len: usize) -> ReservedRegion {
    ReservedRegion::zeroed(
        PhysicalAddress::new(REGION_PHYS),
        VirtualAddress::new(REGION_VIRT),
        len,
    )
}
