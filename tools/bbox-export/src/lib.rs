//! Host-side export of blackbox region images.

pub mod export;
pub mod logger;
pub mod partition;

pub use export::{export, load_image};
pub use partition::{AccessMode, WaitError, sys_sync, wait_partition};
