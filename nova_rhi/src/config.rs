/// Renderer and window configuration

use bitflags::bitflags;

bitflags! {
    /// Renderer behaviour flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RendererConfigFlags: u32 {
        /// Synchronize presentation with the display refresh
        const VSYNC = 1 << 0;
        /// Prefer power efficiency over latency (FIFO instead of MAILBOX)
        const POWER_SAVING = 1 << 1;
        /// Enable validation/debug layers
        const ENABLE_VALIDATION = 1 << 2;
    }
}

/// Renderer configuration
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Application name
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    pub flags: RendererConfigFlags,
    /// Secondary command buffers allocated per primary (render passes per frame)
    pub secondary_buffers_per_frame: u32,
    /// Size of each per-frame staging buffer in bytes
    pub staging_buffer_size: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        let mut flags = RendererConfigFlags::VSYNC;
        if cfg!(debug_assertions) {
            flags |= RendererConfigFlags::ENABLE_VALIDATION;
        }
        Self {
            application_name: "Nova Application".to_string(),
            application_version: (1, 0, 0),
            flags,
            secondary_buffers_per_frame: 16,
            staging_buffer_size: 64 * 1024 * 1024,
        }
    }
}

/// Window registration parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            width: 1280,
            height: 720,
        }
    }
}
