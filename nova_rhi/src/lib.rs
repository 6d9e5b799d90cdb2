/*!
# Nova RHI

Backend-agnostic render hardware interface of the Nova engine.

The backend is written once against the explicit `GpuDevice` trait and exposed
to the rest of the engine through the object-safe `RendererBackend` trait.
Device implementations (Vulkan, ...) live in their own crates and register a
factory with the backend plugin registry.

## Architecture

- **device**: `GpuDevice`, raw handles and the plain descriptors passed to it
- **backend**: images, buffers, command buffers, swapchain, texture/sampler
  tables, the shader frequency engine, per-window frame state and the
  `RenderBackend` facade
- **renderer**: `RendererBackend` trait and the plugin registry
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod config;
pub mod device;
pub mod backend;
pub mod renderer;
pub mod utils;

// Main nova namespace module
pub mod nova {
    // Error types
    pub use crate::error::{Error, Result};

    // Logger slot
    pub use crate::engine::Engine;

    pub use crate::config::{RendererConfig, RendererConfigFlags, WindowConfig};
    pub use crate::renderer::{create_backend, register_backend_plugin, RendererBackend};
    pub use crate::backend::RenderBackend;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Render sub-module with all backend types
    pub mod render {
        pub use crate::backend::*;
        pub use crate::backend::shader::{
            ApplyFrame, ApplyResources, FrequencyHandle, FrequencyInfo, FrequencyLayout, FrequencyState, Shader,
            ShaderAttributeConfig, ShaderConfig, ShaderDefaults, ShaderFlags, ShaderStageConfig, ShaderUniform,
            ShaderUniformConfig, ShaderUniformType, ShaderUpdateFrequency, UniformValue, INVALID_STAMP,
            PER_DRAW_PUSH_CONSTANT_SIZE,
        };
        pub use crate::device::*;
    }
}

// Re-export math library at crate root
pub use glam;
