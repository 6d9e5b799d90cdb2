/// RendererBackend trait - the call surface the rest of the engine renders through
///
/// Exactly one backend is active per renderer instance. Backends register a
/// factory under a name (e.g. "vulkan") and the engine creates the one it
/// wants through `create_backend`.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::backend::buffer::{RenderBufferTrackType, RenderBufferType};
use crate::backend::frame::FrameData;
use crate::backend::render_backend::{BufferHandle, ShaderHandle};
use crate::backend::sampler::SamplerHandle;
use crate::backend::shader::{FrequencyHandle, ShaderConfig, ShaderUpdateFrequency, UniformValue};
use crate::backend::texture::{TextureDesc, TextureHandle};
use crate::backend::window::WindowHandle;
use crate::config::{RendererConfig, RendererConfigFlags, WindowConfig};
use crate::device::{
    CompareOp, DeviceCapabilities, PrimitiveTopology, Rect2D, SamplerDesc, StencilOp, SurfaceSource, Viewport,
    Winding,
};
use crate::error::Result;
use crate::{engine_err, engine_error, engine_info};

const SOURCE: &str = "nova::rhi::Renderer";

// ============================================================================
// RendererBackend trait
// ============================================================================

/// Renderer backend
///
/// Rendering calls (viewport, clears, shader use/apply, draws) target the
/// window whose frame was last prepared.
pub trait RendererBackend: Send {
    /// Drain the device and destroy every resource; idempotent
    fn shutdown(&mut self);

    fn capabilities(&self) -> &DeviceCapabilities;

    /// Always `false`: the backend records from a single thread
    fn multithreading_enabled(&self) -> bool;

    fn flags(&self) -> RendererConfigFlags;

    /// Change vsync/power-saving; every swapchain is rebuilt on its next prepare
    fn set_flags(&mut self, flags: RendererConfigFlags);

    fn wait_idle(&mut self) -> Result<()>;

    // ===== WINDOWS =====

    fn window_create(&mut self, source: &dyn SurfaceSource, config: &WindowConfig) -> Result<WindowHandle>;
    fn window_destroy(&mut self, window: WindowHandle) -> Result<()>;
    /// Record the new framebuffer size; the swapchain follows on the next prepare
    fn window_resize(&mut self, window: WindowHandle, width: u32, height: u32) -> Result<()>;
    fn window_colourbuffer(&self, window: WindowHandle) -> Result<TextureHandle>;
    fn window_depthbuffer(&self, window: WindowHandle) -> Result<TextureHandle>;

    // ===== FRAME =====

    /// `Ok(false)` skips the tick (rebuild, minimized, out of date)
    fn frame_prepare(&mut self, window: WindowHandle, frame: &FrameData) -> Result<bool>;
    fn frame_commands_begin(&mut self) -> Result<()>;
    fn frame_commands_end(&mut self) -> Result<()>;
    fn frame_submit(&mut self) -> Result<()>;
    /// `Ok(false)` when the swapchain had to be rebuilt
    fn frame_present(&mut self) -> Result<bool>;

    /// Start a render pass; no colour targets means the window colour buffer
    fn begin_rendering(
        &mut self,
        render_area: Rect2D,
        colour_targets: &[TextureHandle],
        depth_target: Option<TextureHandle>,
    ) -> Result<()>;
    fn end_rendering(&mut self) -> Result<()>;

    // ===== FIXED-FUNCTION STATE =====

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;
    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()>;
    fn reset_viewport_scissor(&mut self) -> Result<()>;
    fn set_winding(&mut self, winding: Winding) -> Result<()>;
    fn set_depth_test(&mut self, enabled: bool) -> Result<()>;
    fn set_depth_write(&mut self, enabled: bool) -> Result<()>;
    fn set_stencil_test(&mut self, enabled: bool) -> Result<()>;
    fn set_stencil_op(
        &mut self,
        fail_op: StencilOp,
        pass_op: StencilOp,
        depth_fail_op: StencilOp,
        compare_op: CompareOp,
    ) -> Result<()>;
    fn set_stencil_reference(&mut self, reference: u32) -> Result<()>;
    fn set_stencil_compare_mask(&mut self, mask: u32) -> Result<()>;
    fn set_stencil_write_mask(&mut self, mask: u32) -> Result<()>;

    fn clear_colour_set(&mut self, colour: [f32; 4]) -> Result<()>;
    fn clear_depth_set(&mut self, depth: f32) -> Result<()>;
    fn clear_stencil_set(&mut self, stencil: u32) -> Result<()>;
    fn clear_colour_apply(&mut self, target: Option<TextureHandle>) -> Result<()>;
    fn clear_depth_stencil_apply(&mut self, target: Option<TextureHandle>) -> Result<()>;

    // ===== TEXTURES & SAMPLERS =====

    fn texture_acquire(&mut self, desc: TextureDesc) -> Result<TextureHandle>;
    fn texture_release(&mut self, texture: TextureHandle) -> Result<()>;
    /// Contents are discarded
    fn texture_resize(&mut self, texture: TextureHandle, width: u32, height: u32) -> Result<()>;
    fn texture_write_data(&mut self, texture: TextureHandle, data: &[u8]) -> Result<()>;
    fn texture_read_data(&mut self, texture: TextureHandle, offset: u64, size: u64) -> Result<Vec<u8>>;
    fn texture_read_pixel(&mut self, texture: TextureHandle, x: u32, y: u32) -> Result<[u8; 4]>;
    fn texture_generation(&self, texture: TextureHandle) -> Option<u16>;
    fn default_texture(&self) -> TextureHandle;

    fn sampler_acquire(&mut self, name: &str, desc: SamplerDesc) -> Result<SamplerHandle>;
    fn sampler_release(&mut self, sampler: SamplerHandle) -> Result<()>;
    fn sampler_refresh(&mut self, sampler: SamplerHandle, desc: SamplerDesc) -> Result<()>;
    fn default_sampler(&self) -> SamplerHandle;

    // ===== SHADERS =====

    /// Build against the active (or first) window's swapchain
    fn shader_create(&mut self, config: &ShaderConfig) -> Result<ShaderHandle>;
    fn shader_destroy(&mut self, shader: ShaderHandle) -> Result<()>;
    /// Bind the shader's pipeline in the recording frame
    fn shader_use(&mut self, shader: ShaderHandle) -> Result<()>;
    fn shader_set_topology(&mut self, shader: ShaderHandle, topology: PrimitiveTopology) -> Result<()>;
    fn shader_set_wireframe(&mut self, shader: ShaderHandle, enabled: bool) -> Result<()>;

    fn shader_bind_per_frame(&mut self, shader: ShaderHandle) -> Result<()>;
    fn shader_bind_per_group(&mut self, shader: ShaderHandle, state: FrequencyHandle) -> Result<()>;
    fn shader_bind_per_draw(&mut self, shader: ShaderHandle, state: FrequencyHandle) -> Result<()>;

    /// Update stale descriptors and bind; returns the number of descriptor writes
    fn shader_apply_per_frame(&mut self, shader: ShaderHandle) -> Result<usize>;
    fn shader_apply_per_group(&mut self, shader: ShaderHandle) -> Result<usize>;
    fn shader_apply_per_draw(&mut self, shader: ShaderHandle) -> Result<usize>;

    fn shader_acquire_resources(&mut self, shader: ShaderHandle, frequency: ShaderUpdateFrequency) -> Result<FrequencyHandle>;
    fn shader_release_resources(&mut self, shader: ShaderHandle, state: FrequencyHandle) -> Result<()>;
    fn shader_per_frame_resources(&self, shader: ShaderHandle) -> Result<FrequencyHandle>;

    fn shader_uniform_location(&self, shader: ShaderHandle, name: &str) -> Result<u16>;
    /// Write into the bound state of the uniform's frequency
    fn shader_uniform_set(
        &mut self,
        shader: ShaderHandle,
        location: u16,
        array_index: u32,
        value: UniformValue<'_>,
    ) -> Result<()>;

    // ===== BUFFERS =====

    fn buffer_create(
        &mut self,
        name: &str,
        buffer_type: RenderBufferType,
        size: u64,
        track_type: RenderBufferTrackType,
    ) -> Result<BufferHandle>;
    fn buffer_destroy(&mut self, buffer: BufferHandle) -> Result<()>;
    fn buffer_resize(&mut self, buffer: BufferHandle, new_size: u64) -> Result<()>;
    /// Bind as vertex/index input without drawing
    fn buffer_bind(&mut self, buffer: BufferHandle, offset: u64) -> Result<()>;
    fn buffer_map(&mut self, buffer: BufferHandle) -> Result<()>;
    fn buffer_unmap(&mut self, buffer: BufferHandle) -> Result<()>;
    fn buffer_flush(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> Result<()>;
    fn buffer_read(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> Result<Vec<u8>>;
    /// Sub-range according to the buffer's tracking policy
    fn buffer_allocate(&mut self, buffer: BufferHandle, size: u64) -> Result<u64>;
    fn buffer_free(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> Result<()>;
    fn buffer_load_range(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;
    fn buffer_copy_range(
        &mut self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) -> Result<()>;
    fn buffer_draw(&mut self, buffer: BufferHandle, offset: u64, element_count: u32, bind_only: bool) -> Result<()>;
}

// ============================================================================
// Plugin system for registering renderer backends
// ============================================================================

/// Backend plugin factory function type
type BackendPluginFactory = Box<dyn Fn(RendererConfig) -> Result<Box<dyn RendererBackend>> + Send + Sync>;

/// Plugin registry for renderer backends
pub struct BackendPluginRegistry {
    plugins: HashMap<&'static str, BackendPluginFactory>,
}

impl BackendPluginRegistry {
    fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Register a plugin, replacing any previous one of the same name
    pub fn register_plugin<F>(&mut self, name: &'static str, factory: F)
    where
        F: Fn(RendererConfig) -> Result<Box<dyn RendererBackend>> + Send + Sync + 'static,
    {
        if self.plugins.insert(name, Box::new(factory)).is_some() {
            engine_info!(SOURCE, "Backend plugin '{}' replaced", name);
        }
    }

    /// Create a backend using a registered plugin
    pub fn create_backend(&self, plugin_name: &str, config: RendererConfig) -> Result<Box<dyn RendererBackend>> {
        let factory = self.plugins.get(plugin_name).ok_or_else(|| {
            engine_err!(SOURCE, "Backend plugin '{}' not found", plugin_name)
        })?;
        factory(config)
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.plugins.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

static BACKEND_REGISTRY: OnceLock<Mutex<BackendPluginRegistry>> = OnceLock::new();

/// Get the global backend plugin registry
pub fn backend_plugin_registry() -> &'static Mutex<BackendPluginRegistry> {
    BACKEND_REGISTRY.get_or_init(|| Mutex::new(BackendPluginRegistry::new()))
}

/// Register a backend plugin in the global registry
pub fn register_backend_plugin<F>(name: &'static str, factory: F)
where
    F: Fn(RendererConfig) -> Result<Box<dyn RendererBackend>> + Send + Sync + 'static,
{
    match backend_plugin_registry().lock() {
        Ok(mut registry) => registry.register_plugin(name, factory),
        Err(_) => engine_error!(SOURCE, "Backend registry poisoned, plugin '{}' not registered", name),
    }
}

/// Create a backend through the global registry
pub fn create_backend(plugin_name: &str, config: RendererConfig) -> Result<Box<dyn RendererBackend>> {
    let registry = backend_plugin_registry()
        .lock()
        .map_err(|_| engine_err!(SOURCE, "Backend registry poisoned"))?;
    registry.create_backend(plugin_name, config)
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
