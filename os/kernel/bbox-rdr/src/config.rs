use crate::consts::RDR_BASEINFO_SIZE;
use crate::moddump::DumpModule;

/// How the platform came up this boot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BootType {
    /// Power-on: retained memory holds garbage and is wiped entirely.
    ColdBoot,
    /// Reset with memory retained: only the head prefix is rewritten.
    WarmBoot,
}

/// Platform services the recorder depends on.
pub trait Platform {
    fn boot_type(&self) -> BootType;

    /// Build timestamp stamped into the head, e.g. `"2025-01-31 12:00"`.
    fn build_time(&self) -> &str;

    /// Current time slice recorded in the AP root.
    fn time_slice(&self) -> u64 {
        0
    }
}

/// Runtime parameters of the recorder.
#[derive(Debug, Clone)]
pub struct BlackboxConfig {
    pub product_name: &'static str,
    pub product_version: &'static str,
    pub device_id: &'static str,
    /// Bytes of the head prefix; area payloads follow it.
    pub head_size: u64,
    /// Requested area sizes by area index. Entry 0 is ignored: area 0 takes
    /// whatever the other areas leave.
    pub areas: &'static [u64],
    /// Module-dump slot size per [`DumpModule`]; zero means no slot.
    pub module_dump_sizes: [u64; DumpModule::COUNT],
}

impl Default for BlackboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BlackboxConfig {
    #[must_use]
    pub const fn new() -> Self {
        let mut module_dump_sizes = [0; DumpModule::COUNT];
        module_dump_sizes[DumpModule::Tzc400 as usize] = 0x1000;
        module_dump_sizes[DumpModule::Idm as usize] = 0x1000;
        module_dump_sizes[DumpModule::Smmu as usize] = 0x1000;
        module_dump_sizes[DumpModule::Tfa as usize] = 0x4000;
        module_dump_sizes[DumpModule::Gap as usize] = 0x1000;
        Self {
            product_name: "bbox",
            product_version: "0.0.0",
            device_id: "",
            head_size: RDR_BASEINFO_SIZE,
            areas: &[0, 0x1_0000, 0x1_0000],
            module_dump_sizes,
        }
    }

    #[must_use]
    pub const fn with_product(mut self, name: &'static str, version: &'static str) -> Self {
        self.product_name = name;
        self.product_version = version;
        self
    }

    #[must_use]
    pub const fn with_device_id(mut self, device_id: &'static str) -> Self {
        self.device_id = device_id;
        self
    }

    #[must_use]
    pub const fn with_head_size(mut self, head_size: u64) -> Self {
        self.head_size = head_size;
        self
    }

    #[must_use]
    pub const fn with_areas(mut self, areas: &'static [u64]) -> Self {
        self.areas = areas;
        self
    }

    #[must_use]
    pub const fn with_module_dump_size(mut self, module: DumpModule, size: u64) -> Self {
        self.module_dump_sizes[module as usize] = size;
        self
    }

    /// No module-dump slots at all.
    #[must_use]
    pub const fn without_module_dumps(mut self) -> Self {
        self.module_dump_sizes = [0; DumpModule::COUNT];
        self
    }
}
