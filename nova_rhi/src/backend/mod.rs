/// Backend module - the renderer backend written against `GpuDevice`
///
/// Leaf-first: memory and context, image/buffer managers, command buffers,
/// swapchain, texture/sampler tables, shader engine, per-window frame state,
/// and the `RenderBackend` facade that composes them.

pub mod memory;
pub mod context;
pub mod image;
pub mod buffer;
pub mod command_buffer;
pub mod swapchain;
pub mod texture;
pub mod sampler;
pub mod shader;
pub mod window;
pub mod frame;
pub mod render_backend;

#[cfg(test)]
pub(crate) mod mock_device;

pub use memory::{find_memory_index, align_up, MemoryUsage};
pub use context::GpuContext;
pub use image::{Image, ImageCreateParams, mip_level_count, mip_extent};
pub use buffer::{GpuBuffer, RenderBuffer, RenderBufferType, RenderBufferTrackType, FrameWorkload};
pub use command_buffer::{CommandBuffer, CommandBufferState, CommandBufferOp};
pub use swapchain::Swapchain;
pub use texture::{TextureHandle, TextureDesc, TextureFlags, TextureSlot, TextureTable};
pub use sampler::{SamplerHandle, SamplerTable};
pub use window::{WindowHandle, WindowRenderState};
pub use frame::FrameData;
pub use render_backend::{RenderBackend, BufferHandle, ShaderHandle};
