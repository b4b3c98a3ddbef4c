use sysinfo::System;

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Total physical memory in whole gigabytes, or `None` when the platform
/// reports nothing.
pub fn total_ram_gb() -> Option<u64> {
    let mut sys = System::new();
    sys.refresh_memory();
    match sys.total_memory() {
        0 => None,
        bytes => Some(bytes / BYTES_PER_GB),
    }
}
