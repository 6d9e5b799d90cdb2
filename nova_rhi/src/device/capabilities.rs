/// Device capabilities - what the black-box device selection hands back

use bitflags::bitflags;
use crate::device::types::{Format, MemoryProperty};

bitflags! {
    /// Optional feature tiers detected at device creation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceSupportFlags: u32 {
        /// Extended dynamic state is part of the core API version
        const NATIVE_DYNAMIC_STATE = 1 << 0;
        /// Extended dynamic state is available through an extension
        const DYNAMIC_STATE_EXTENSION = 1 << 1;
        /// Dynamic rendering is part of the core API version
        const NATIVE_DYNAMIC_RENDERING = 1 << 2;
        /// Dynamic rendering is available through an extension
        const DYNAMIC_RENDERING_EXTENSION = 1 << 3;
        /// Smooth line rasterization is available
        const LINE_SMOOTH_RASTERISATION = 1 << 4;
    }
}

impl DeviceSupportFlags {
    /// Whether any dynamic-state tier is available
    pub fn has_dynamic_state(&self) -> bool {
        self.intersects(Self::NATIVE_DYNAMIC_STATE | Self::DYNAMIC_STATE_EXTENSION)
    }

    /// Whether any dynamic-rendering tier is available
    pub fn has_dynamic_rendering(&self) -> bool {
        self.intersects(Self::NATIVE_DYNAMIC_RENDERING | Self::DYNAMIC_RENDERING_EXTENSION)
    }
}

/// One memory type of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub property_flags: MemoryProperty,
    pub heap_index: u32,
}

/// Immutable description of the selected device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    /// Human-readable device name
    pub device_name: String,
    pub graphics_queue_family: u32,
    pub present_queue_family: u32,
    pub transfer_queue_family: u32,
    /// Offsets into uniform buffers must be multiples of this
    pub min_uniform_buffer_offset_alignment: u64,
    pub max_push_constants_size: u32,
    pub max_sampler_anisotropy: f32,
    /// Memory types in device order (index = memory type index)
    pub memory_types: Vec<MemoryType>,
    /// A memory type is both device-local and host-visible
    pub supports_device_local_host_visible: bool,
    pub support_flags: DeviceSupportFlags,
    /// Depth-stencil format chosen at device creation
    pub depth_format: Format,
    /// Bytes per texel of `depth_format`
    pub depth_channel_count: u8,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            device_name: String::from("Unknown device"),
            graphics_queue_family: 0,
            present_queue_family: 0,
            transfer_queue_family: 0,
            min_uniform_buffer_offset_alignment: 256,
            max_push_constants_size: 128,
            max_sampler_anisotropy: 1.0,
            memory_types: Vec::new(),
            supports_device_local_host_visible: false,
            support_flags: DeviceSupportFlags::empty(),
            depth_format: Format::D32_SFLOAT,
            depth_channel_count: 4,
        }
    }
}
