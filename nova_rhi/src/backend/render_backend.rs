/// RenderBackend - the `RendererBackend` implementation over any `GpuDevice`
///
/// Owns the device context and every resource table. Rendering calls target
/// the window whose frame was last prepared; shaders are built against that
/// window's swapchain (image count, colour format) and grow with its image count.

use slotmap::{new_key_type, SlotMap};
use crate::error::Result;
use crate::config::{RendererConfig, RendererConfigFlags, WindowConfig};
use crate::device::*;
use crate::backend::buffer::{RenderBuffer, RenderBufferTrackType, RenderBufferType};
use crate::backend::context::GpuContext;
use crate::backend::frame::FrameData;
use crate::backend::sampler::{SamplerHandle, SamplerTable};
use crate::backend::shader::{
    ApplyFrame, ApplyResources, FrequencyHandle, Shader, ShaderConfig, ShaderDefaults, ShaderUpdateFrequency,
    UniformValue,
};
use crate::backend::texture::{TextureDesc, TextureHandle, TextureTable};
use crate::backend::window::{WindowHandle, WindowRenderState};
use crate::renderer::RendererBackend;
use crate::{engine_bail, engine_debug, engine_err, engine_info, engine_warn};

const SOURCE: &str = "nova::rhi::Backend";

/// Side of the default base-colour texture
const DEFAULT_TEXTURE_SIZE: u32 = 16;

new_key_type! {
    /// Generational shader handle
    pub struct ShaderHandle;
    /// Generational buffer handle
    pub struct BufferHandle;
}

pub struct RenderBackend<D: GpuDevice> {
    context: GpuContext<D>,
    config: RendererConfig,
    textures: TextureTable,
    samplers: SamplerTable,
    shaders: SlotMap<ShaderHandle, Shader>,
    buffers: SlotMap<BufferHandle, RenderBuffer>,
    windows: SlotMap<WindowHandle, WindowRenderState>,
    /// Window of the last prepared frame
    active_window: Option<WindowHandle>,
    frame_number: u64,
    defaults: ShaderDefaults,
    shut_down: bool,
}

impl<D: GpuDevice> RenderBackend<D> {
    /// Take ownership of an initialized device and create the default resources
    pub fn new(device: D, config: RendererConfig) -> Result<Self> {
        let mut context = GpuContext::new(device);
        let mut textures = TextureTable::new();
        let mut samplers = SamplerTable::new();

        let sampler = samplers.acquire(&mut context, "default", SamplerDesc::default())?;
        let texture = textures.acquire(
            &mut context,
            TextureDesc::new("default_base_colour", DEFAULT_TEXTURE_SIZE, DEFAULT_TEXTURE_SIZE, Format::R8G8B8A8_UNORM),
        )?;
        let pixels = vec![0xFF; (DEFAULT_TEXTURE_SIZE * DEFAULT_TEXTURE_SIZE * 4) as usize];
        textures.write_data(&mut context, texture, &pixels, None)?;

        engine_info!(
            SOURCE,
            "Render backend ready on '{}'",
            context.capabilities().device_name
        );
        Ok(Self {
            context,
            config,
            textures,
            samplers,
            shaders: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            windows: SlotMap::with_key(),
            active_window: None,
            frame_number: 0,
            defaults: ShaderDefaults { sampler, texture },
            shut_down: false,
        })
    }

    pub fn context(&self) -> &GpuContext<D> {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut GpuContext<D> {
        &mut self.context
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn textures(&self) -> &TextureTable {
        &self.textures
    }

    pub fn samplers(&self) -> &SamplerTable {
        &self.samplers
    }

    pub fn shader(&self, handle: ShaderHandle) -> Option<&Shader> {
        self.shaders.get(handle)
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&RenderBuffer> {
        self.buffers.get(handle)
    }

    pub fn window(&self, handle: WindowHandle) -> Option<&WindowRenderState> {
        self.windows.get(handle)
    }

    pub fn active_window(&self) -> Option<WindowHandle> {
        self.active_window
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    // ===== LOOKUPS =====

    fn window_state(&self, handle: WindowHandle) -> Result<&WindowRenderState> {
        self.windows
            .get(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale window handle {:?}", handle))
    }

    fn window_state_mut(&mut self, handle: WindowHandle) -> Result<&mut WindowRenderState> {
        self.windows
            .get_mut(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale window handle {:?}", handle))
    }

    fn active(&mut self) -> Result<&mut WindowRenderState> {
        let Some(handle) = self.active_window else {
            engine_bail!(SOURCE, "No frame has been prepared");
        };
        self.window_state_mut(handle)
    }

    /// Command buffer of the recording frame
    fn recording_command_buffer(&self) -> Result<RawCommandBuffer> {
        match self.active_window.and_then(|handle| self.windows.get(handle)) {
            Some(window) if window.is_recording() => Ok(window.active_command_buffer()),
            _ => Err(engine_err!(SOURCE, "No frame is recording")),
        }
    }

    fn shader_mut(&mut self, handle: ShaderHandle) -> Result<&mut Shader> {
        self.shaders
            .get_mut(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale shader handle {:?}", handle))
    }

    fn buffer_mut(&mut self, handle: BufferHandle) -> Result<&mut RenderBuffer> {
        self.buffers
            .get_mut(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale buffer handle {:?}", handle))
    }

    fn apply(&mut self, handle: ShaderHandle, frequency: ShaderUpdateFrequency) -> Result<usize> {
        let command_buffer = self.recording_command_buffer()?;
        let image_index = self.active()?.image_index();
        let frame = ApplyFrame { image_index, frame_number: self.frame_number, command_buffer };
        let resources = ApplyResources {
            textures: &self.textures,
            samplers: &self.samplers,
            default_texture: self.defaults.texture,
        };
        let shader = self
            .shaders
            .get_mut(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale shader handle {:?}", handle))?;
        shader.apply(&mut self.context.device, frequency, &frame, &resources)
    }
}

impl<D: GpuDevice> RendererBackend for RenderBackend<D> {
    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if let Err(e) = self.context.device.wait_idle() {
            engine_warn!(SOURCE, "Device wait failed during shutdown: {}", e);
        }

        for (_, shader) in self.shaders.drain() {
            if let Err(e) = shader.destroy(&mut self.context) {
                engine_warn!(SOURCE, "Shader destroy failed during shutdown: {}", e);
            }
        }
        for (_, mut buffer) in self.buffers.drain() {
            buffer.destroy_completed(&mut self.context);
        }
        for (_, mut window) in self.windows.drain() {
            window.destroy(&mut self.context, &mut self.textures);
        }
        self.active_window = None;
        self.samplers.destroy_all(&mut self.context);
        self.textures.destroy_all(&mut self.context);
        engine_info!(SOURCE, "Render backend shut down");
    }

    fn capabilities(&self) -> &DeviceCapabilities {
        self.context.capabilities()
    }

    fn multithreading_enabled(&self) -> bool {
        false
    }

    fn flags(&self) -> RendererConfigFlags {
        self.config.flags
    }

    fn set_flags(&mut self, flags: RendererConfigFlags) {
        if self.config.flags == flags {
            return;
        }
        engine_debug!(SOURCE, "Renderer flags {:?} -> {:?}", self.config.flags, flags);
        self.config.flags = flags;
        for (_, window) in self.windows.iter_mut() {
            window.mark_flags_dirty();
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.context.device.wait_idle()
    }

    // ===== WINDOWS =====

    fn window_create(&mut self, source: &dyn SurfaceSource, config: &WindowConfig) -> Result<WindowHandle> {
        let window = WindowRenderState::create(&mut self.context, &mut self.textures, source, config, &self.config)?;
        Ok(self.windows.insert(window))
    }

    fn window_destroy(&mut self, window: WindowHandle) -> Result<()> {
        let Some(mut state) = self.windows.remove(window) else {
            engine_bail!(SOURCE, "Invalid or stale window handle {:?}", window);
        };
        state.destroy(&mut self.context, &mut self.textures);
        if self.active_window == Some(window) {
            self.active_window = None;
        }
        Ok(())
    }

    fn window_resize(&mut self, window: WindowHandle, width: u32, height: u32) -> Result<()> {
        self.window_state_mut(window)?.resize(width, height);
        Ok(())
    }

    fn window_colourbuffer(&self, window: WindowHandle) -> Result<TextureHandle> {
        Ok(self.window_state(window)?.colourbuffer())
    }

    fn window_depthbuffer(&self, window: WindowHandle) -> Result<TextureHandle> {
        Ok(self.window_state(window)?.depthbuffer())
    }

    // ===== FRAME =====

    fn frame_prepare(&mut self, window: WindowHandle, frame: &FrameData) -> Result<bool> {
        let state = self
            .windows
            .get_mut(window)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale window handle {:?}", window))?;
        self.active_window = Some(window);
        self.frame_number = frame.frame_number;
        let prepared = state.prepare_frame(&mut self.context, &mut self.textures, &self.config, self.config.flags)?;

        // A recreation may have handed the window more swapchain images
        let image_count = state.image_count();
        for shader in self.shaders.values_mut() {
            shader.ensure_image_count(&mut self.context, image_count)?;
        }
        Ok(prepared)
    }

    fn frame_commands_begin(&mut self) -> Result<()> {
        let Some(handle) = self.active_window else {
            engine_bail!(SOURCE, "No frame has been prepared");
        };
        let window = self
            .windows
            .get_mut(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale window handle {:?}", handle))?;
        window.commands_begin(&mut self.context)
    }

    fn frame_commands_end(&mut self) -> Result<()> {
        let Some(handle) = self.active_window else {
            engine_bail!(SOURCE, "No frame has been prepared");
        };
        let window = self
            .windows
            .get_mut(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale window handle {:?}", handle))?;
        window.commands_end(&mut self.context, &mut self.textures)
    }

    fn frame_submit(&mut self) -> Result<()> {
        let Some(handle) = self.active_window else {
            engine_bail!(SOURCE, "No frame has been prepared");
        };
        let window = self
            .windows
            .get_mut(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale window handle {:?}", handle))?;
        window.submit(&mut self.context)
    }

    fn frame_present(&mut self) -> Result<bool> {
        let Some(handle) = self.active_window else {
            engine_bail!(SOURCE, "No frame has been prepared");
        };
        let window = self
            .windows
            .get_mut(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale window handle {:?}", handle))?;
        window.present(&mut self.context, &mut self.textures, &self.config, self.config.flags)
    }

    fn begin_rendering(
        &mut self,
        render_area: Rect2D,
        colour_targets: &[TextureHandle],
        depth_target: Option<TextureHandle>,
    ) -> Result<()> {
        let Some(handle) = self.active_window else {
            engine_bail!(SOURCE, "No frame has been prepared");
        };
        let window = self
            .windows
            .get_mut(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale window handle {:?}", handle))?;
        window.begin_rendering(&mut self.context, &mut self.textures, render_area, colour_targets, depth_target)
    }

    fn end_rendering(&mut self) -> Result<()> {
        let Some(handle) = self.active_window else {
            engine_bail!(SOURCE, "No frame has been prepared");
        };
        let window = self
            .windows
            .get_mut(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale window handle {:?}", handle))?;
        window.end_rendering(&mut self.context, &mut self.textures)
    }

    // ===== FIXED-FUNCTION STATE =====

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.set_viewport(&mut self.context.device, viewport);
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.set_scissor(&mut self.context.device, scissor);
        Ok(())
    }

    fn reset_viewport_scissor(&mut self) -> Result<()> {
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.reset_viewport_scissor(&mut self.context.device);
        Ok(())
    }

    fn set_winding(&mut self, winding: Winding) -> Result<()> {
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.set_winding(&mut self.context.device, winding);
        Ok(())
    }

    fn set_depth_test(&mut self, enabled: bool) -> Result<()> {
        self.recording_command_buffer()?;
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.set_depth_test(&mut self.context.device, enabled);
        Ok(())
    }

    fn set_depth_write(&mut self, enabled: bool) -> Result<()> {
        self.recording_command_buffer()?;
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.set_depth_write(&mut self.context.device, enabled);
        Ok(())
    }

    fn set_stencil_test(&mut self, enabled: bool) -> Result<()> {
        self.recording_command_buffer()?;
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.set_stencil_test(&mut self.context.device, enabled);
        Ok(())
    }

    fn set_stencil_op(
        &mut self,
        fail_op: StencilOp,
        pass_op: StencilOp,
        depth_fail_op: StencilOp,
        compare_op: CompareOp,
    ) -> Result<()> {
        self.recording_command_buffer()?;
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.set_stencil_op(&mut self.context.device, fail_op, pass_op, depth_fail_op, compare_op);
        Ok(())
    }

    fn set_stencil_reference(&mut self, reference: u32) -> Result<()> {
        self.recording_command_buffer()?;
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.set_stencil_reference(&mut self.context.device, reference);
        Ok(())
    }

    fn set_stencil_compare_mask(&mut self, mask: u32) -> Result<()> {
        self.recording_command_buffer()?;
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.set_stencil_compare_mask(&mut self.context.device, mask);
        Ok(())
    }

    fn set_stencil_write_mask(&mut self, mask: u32) -> Result<()> {
        self.recording_command_buffer()?;
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.set_stencil_write_mask(&mut self.context.device, mask);
        Ok(())
    }

    fn clear_colour_set(&mut self, colour: [f32; 4]) -> Result<()> {
        self.active()?.set_clear_colour(colour);
        Ok(())
    }

    fn clear_depth_set(&mut self, depth: f32) -> Result<()> {
        self.active()?.set_clear_depth(depth);
        Ok(())
    }

    fn clear_stencil_set(&mut self, stencil: u32) -> Result<()> {
        self.active()?.set_clear_stencil(stencil);
        Ok(())
    }

    fn clear_colour_apply(&mut self, target: Option<TextureHandle>) -> Result<()> {
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.clear_colour_apply(&mut self.context, &mut self.textures, target)
    }

    fn clear_depth_stencil_apply(&mut self, target: Option<TextureHandle>) -> Result<()> {
        let Some(window) = self.active_window.and_then(|h| self.windows.get_mut(h)) else {
            engine_bail!(SOURCE, "No active window");
        };
        window.clear_depth_stencil_apply(&mut self.context, &mut self.textures, target)
    }

    // ===== TEXTURES & SAMPLERS =====

    fn texture_acquire(&mut self, desc: TextureDesc) -> Result<TextureHandle> {
        self.textures.acquire(&mut self.context, desc)
    }

    fn texture_release(&mut self, texture: TextureHandle) -> Result<()> {
        if texture == self.defaults.texture {
            engine_bail!(SOURCE, "The default texture cannot be released");
        }
        self.textures.release(&mut self.context, texture)
    }

    fn texture_resize(&mut self, texture: TextureHandle, width: u32, height: u32) -> Result<()> {
        self.textures.resize(&mut self.context, texture, width, height)
    }

    fn texture_write_data(&mut self, texture: TextureHandle, data: &[u8]) -> Result<()> {
        match self.active_window.and_then(|h| self.windows.get_mut(h)) {
            // Inside a frame the upload rides the frame's staging and command buffers
            Some(window) if window.is_recording() => {
                self.textures.write_data(&mut self.context, texture, data, window.workload())?;
                window.record_texture_written(texture);
                Ok(())
            }
            _ => self.textures.write_data(&mut self.context, texture, data, None),
        }
    }

    fn texture_read_data(&mut self, texture: TextureHandle, offset: u64, size: u64) -> Result<Vec<u8>> {
        self.textures.read_data(&mut self.context, texture, offset, size)
    }

    fn texture_read_pixel(&mut self, texture: TextureHandle, x: u32, y: u32) -> Result<[u8; 4]> {
        self.textures.read_pixel(&mut self.context, texture, x, y)
    }

    fn texture_generation(&self, texture: TextureHandle) -> Option<u16> {
        self.textures.get(texture).map(|slot| slot.generation())
    }

    fn default_texture(&self) -> TextureHandle {
        self.defaults.texture
    }

    fn sampler_acquire(&mut self, name: &str, desc: SamplerDesc) -> Result<SamplerHandle> {
        self.samplers.acquire(&mut self.context, name, desc)
    }

    fn sampler_release(&mut self, sampler: SamplerHandle) -> Result<()> {
        if sampler == self.defaults.sampler {
            engine_bail!(SOURCE, "The default sampler cannot be released");
        }
        self.samplers.release(&mut self.context, sampler)
    }

    fn sampler_refresh(&mut self, sampler: SamplerHandle, desc: SamplerDesc) -> Result<()> {
        self.samplers.refresh(&mut self.context, sampler, desc)
    }

    fn default_sampler(&self) -> SamplerHandle {
        self.defaults.sampler
    }

    // ===== SHADERS =====

    fn shader_create(&mut self, config: &ShaderConfig) -> Result<ShaderHandle> {
        let window = self
            .active_window
            .and_then(|h| self.windows.get(h))
            .or_else(|| self.windows.values().next())
            .ok_or_else(|| engine_err!(SOURCE, "Shader '{}' needs a window to be created against", config.name))?;
        let image_count = window.image_count();
        let colour_format = window.swapchain().format();
        let shader = Shader::create(&mut self.context, config, image_count, colour_format, self.defaults)?;
        Ok(self.shaders.insert(shader))
    }

    fn shader_destroy(&mut self, shader: ShaderHandle) -> Result<()> {
        let Some(removed) = self.shaders.remove(shader) else {
            engine_bail!(SOURCE, "Invalid or stale shader handle {:?}", shader);
        };
        removed.destroy(&mut self.context)
    }

    fn shader_use(&mut self, shader: ShaderHandle) -> Result<()> {
        let command_buffer = self.recording_command_buffer()?;
        let device = &mut self.context.device;
        let shader = self
            .shaders
            .get(shader)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale shader handle {:?}", shader))?;
        shader.use_shader(device, command_buffer)
    }

    fn shader_set_topology(&mut self, shader: ShaderHandle, topology: PrimitiveTopology) -> Result<()> {
        let command_buffer = self.recording_command_buffer().ok();
        let shader = self
            .shaders
            .get_mut(shader)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale shader handle {:?}", shader))?;
        shader.set_topology(&mut self.context.device, command_buffer, topology)
    }

    fn shader_set_wireframe(&mut self, shader: ShaderHandle, enabled: bool) -> Result<()> {
        self.shader_mut(shader)?.set_wireframe(enabled)
    }

    fn shader_bind_per_frame(&mut self, shader: ShaderHandle) -> Result<()> {
        self.shader_mut(shader)?.bind_per_frame();
        Ok(())
    }

    fn shader_bind_per_group(&mut self, shader: ShaderHandle, state: FrequencyHandle) -> Result<()> {
        self.shader_mut(shader)?.bind_per_group(state)
    }

    fn shader_bind_per_draw(&mut self, shader: ShaderHandle, state: FrequencyHandle) -> Result<()> {
        self.shader_mut(shader)?.bind_per_draw(state)
    }

    fn shader_apply_per_frame(&mut self, shader: ShaderHandle) -> Result<usize> {
        self.apply(shader, ShaderUpdateFrequency::PerFrame)
    }

    fn shader_apply_per_group(&mut self, shader: ShaderHandle) -> Result<usize> {
        self.apply(shader, ShaderUpdateFrequency::PerGroup)
    }

    fn shader_apply_per_draw(&mut self, shader: ShaderHandle) -> Result<usize> {
        self.apply(shader, ShaderUpdateFrequency::PerDraw)
    }

    fn shader_acquire_resources(&mut self, shader: ShaderHandle, frequency: ShaderUpdateFrequency) -> Result<FrequencyHandle> {
        let defaults = self.defaults;
        let shader = self
            .shaders
            .get_mut(shader)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale shader handle {:?}", shader))?;
        shader.acquire_state(&mut self.context, frequency, defaults)
    }

    fn shader_release_resources(&mut self, shader: ShaderHandle, state: FrequencyHandle) -> Result<()> {
        let shader = self
            .shaders
            .get_mut(shader)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale shader handle {:?}", shader))?;
        shader.release_state(&mut self.context, state)
    }

    fn shader_per_frame_resources(&self, shader: ShaderHandle) -> Result<FrequencyHandle> {
        self.shaders
            .get(shader)
            .map(Shader::per_frame_handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale shader handle {:?}", shader))
    }

    fn shader_uniform_location(&self, shader: ShaderHandle, name: &str) -> Result<u16> {
        let shader = self
            .shaders
            .get(shader)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale shader handle {:?}", shader))?;
        shader
            .uniform_location(name)
            .ok_or_else(|| engine_err!(SOURCE, "Shader '{}' has no uniform '{}'", shader.name(), name))
    }

    fn shader_uniform_set(
        &mut self,
        shader: ShaderHandle,
        location: u16,
        array_index: u32,
        value: UniformValue<'_>,
    ) -> Result<()> {
        let image_index = self
            .active_window
            .and_then(|h| self.windows.get(h))
            .map_or(0, WindowRenderState::image_index);
        let shader = self
            .shaders
            .get_mut(shader)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale shader handle {:?}", shader))?;
        shader.uniform_set(&mut self.context.device, location, array_index, value, image_index)
    }

    // ===== BUFFERS =====

    fn buffer_create(
        &mut self,
        name: &str,
        buffer_type: RenderBufferType,
        size: u64,
        track_type: RenderBufferTrackType,
    ) -> Result<BufferHandle> {
        let buffer = RenderBuffer::create(&mut self.context, name, buffer_type, size, track_type)?;
        Ok(self.buffers.insert(buffer))
    }

    fn buffer_destroy(&mut self, buffer: BufferHandle) -> Result<()> {
        let Some(mut removed) = self.buffers.remove(buffer) else {
            engine_bail!(SOURCE, "Invalid or stale buffer handle {:?}", buffer);
        };
        removed.destroy(&mut self.context)
    }

    fn buffer_resize(&mut self, buffer: BufferHandle, new_size: u64) -> Result<()> {
        let target = self
            .buffers
            .get_mut(buffer)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale buffer handle {:?}", buffer))?;
        target.resize(&mut self.context, new_size)
    }

    fn buffer_bind(&mut self, buffer: BufferHandle, offset: u64) -> Result<()> {
        self.buffer_draw(buffer, offset, 0, true)
    }

    fn buffer_map(&mut self, buffer: BufferHandle) -> Result<()> {
        self.buffer_mut(buffer)?.map()
    }

    fn buffer_unmap(&mut self, buffer: BufferHandle) -> Result<()> {
        self.buffer_mut(buffer)?.unmap();
        Ok(())
    }

    fn buffer_flush(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> Result<()> {
        let target = self
            .buffers
            .get(buffer)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale buffer handle {:?}", buffer))?;
        target.flush(&mut self.context.device, offset, size)
    }

    fn buffer_read(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> Result<Vec<u8>> {
        let target = self
            .buffers
            .get(buffer)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale buffer handle {:?}", buffer))?;
        target.read(&mut self.context, offset, size)
    }

    fn buffer_allocate(&mut self, buffer: BufferHandle, size: u64) -> Result<u64> {
        let target = self.buffer_mut(buffer)?;
        match target.allocate(size) {
            Some(offset) => Ok(offset),
            None => Err(engine_err!(SOURCE, "Buffer '{}' cannot provide {} bytes", target.name(), size)),
        }
    }

    fn buffer_free(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> Result<()> {
        let target = self.buffer_mut(buffer)?;
        if !target.free(offset, size) {
            engine_bail!(SOURCE, "Buffer '{}': range {}+{} was not allocated", target.name(), offset, size);
        }
        Ok(())
    }

    fn buffer_load_range(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let target = self
            .buffers
            .get_mut(buffer)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale buffer handle {:?}", buffer))?;
        let workload = self
            .active_window
            .and_then(|h| self.windows.get_mut(h))
            .and_then(WindowRenderState::workload);
        target.load_range(&mut self.context, offset, data, workload)
    }

    fn buffer_copy_range(
        &mut self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        let frame_command_buffer = self
            .active_window
            .and_then(|h| self.windows.get(h))
            .filter(|window| window.is_recording())
            .map(|window| window.command_buffer().raw());
        let source = self
            .buffers
            .get(src)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale buffer handle {:?}", src))?;
        let destination = self
            .buffers
            .get(dst)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale buffer handle {:?}", dst))?;
        RenderBuffer::copy_range(&mut self.context, source, src_offset, destination, dst_offset, size, frame_command_buffer)
    }

    fn buffer_draw(&mut self, buffer: BufferHandle, offset: u64, element_count: u32, bind_only: bool) -> Result<()> {
        let command_buffer = self.recording_command_buffer()?;
        let target = self
            .buffers
            .get(buffer)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale buffer handle {:?}", buffer))?;
        target.draw(&mut self.context.device, command_buffer, offset, element_count, bind_only)
    }
}

impl<D: GpuDevice> Drop for RenderBackend<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "render_backend_tests.rs"]
mod tests;
