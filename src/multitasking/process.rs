use alloc::string::String;

use kyro_abi::{ProcessId, SecurityLevel};

use crate::memory::{AddressSpaceId, VirtRangePool};

/// Base of the per-process range pool used for kernel-made mappings
const MAPPING_RANGE_BASE: u64 = 0x4000_0000;

/// A process: its address space, working directory and privilege level.
/// Thread-level state lives in the scheduler's task table.
#[derive(Debug)]
pub struct Process {
    pub id: ProcessId,
    pub address_space: AddressSpaceId,
    pub security_level: SecurityLevel,
    pub working_directory: String,
    pub virtual_ranges: VirtRangePool,
}
impl Process {
    pub fn new(id: ProcessId, address_space: AddressSpaceId, security_level: SecurityLevel) -> Self {
        Self {
            id,
            address_space,
            security_level,
            working_directory: String::from("/"),
            virtual_ranges: VirtRangePool::new(MAPPING_RANGE_BASE),
        }
    }
}
