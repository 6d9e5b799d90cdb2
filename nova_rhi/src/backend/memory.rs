/// Memory type selection and usage telemetry

use crate::device::{DeviceCapabilities, MemoryProperty};

/// Find the first memory type allowed by `type_bits` that has every flag in `properties`
///
/// Returns `None` when no type matches; callers must check.
pub fn find_memory_index(
    capabilities: &DeviceCapabilities,
    type_bits: u32,
    properties: MemoryProperty,
) -> Option<u32> {
    capabilities
        .memory_types
        .iter()
        .enumerate()
        .take(32)
        .find(|(index, memory_type)| {
            type_bits & (1 << index) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(index, _)| index as u32)
}

/// Round `value` up to a multiple of `alignment` (0 or 1 leave it unchanged)
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Device memory currently allocated by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    allocated_bytes: u64,
    allocation_count: u32,
}

impl MemoryUsage {
    /// Record an allocation
    pub fn allocate(&mut self, size: u64) {
        self.allocated_bytes += size;
        self.allocation_count += 1;
        crate::engine_trace!("nova::rhi::Memory", "Allocated {} bytes ({} total)", size, self.allocated_bytes);
    }

    /// Record a free
    pub fn free(&mut self, size: u64) {
        self.allocated_bytes = self.allocated_bytes.saturating_sub(size);
        self.allocation_count = self.allocation_count.saturating_sub(1);
        crate::engine_trace!("nova::rhi::Memory", "Freed {} bytes ({} total)", size, self.allocated_bytes);
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    pub fn allocation_count(&self) -> u32 {
        self.allocation_count
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
