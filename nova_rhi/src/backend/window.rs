/// Per-window render state - swapchain, frames in flight and their resources
///
/// Everything indexed by frame (command buffers, semaphores, fences, staging
/// buffers, written-texture lists) has `max_frames_in_flight` entries and is
/// rebuilt when a swapchain recreation changes that count.

use slotmap::new_key_type;
use crate::error::Result;
use crate::config::{RendererConfig, RendererConfigFlags, WindowConfig};
use crate::device::*;
use crate::backend::buffer::{RenderBuffer, RenderBufferTrackType, RenderBufferType};
use crate::backend::command_buffer::CommandBuffer;
use crate::backend::context::GpuContext;
use crate::backend::swapchain::Swapchain;
use crate::backend::texture::{TextureDesc, TextureFlags, TextureHandle, TextureTable};
use crate::{engine_debug, engine_info};

const SOURCE: &str = "nova::rhi::Window";

new_key_type! {
    /// Generational window handle
    pub struct WindowHandle;
}

/// Synchronization objects of one frame in flight
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameSync {
    /// Signaled by the acquire, waited on by the submit
    pub image_available: RawSemaphore,
    /// Signaled by the submit, waited on by the present
    pub queue_complete: RawSemaphore,
    /// Signaled when the frame's submission retires; created signaled
    pub in_flight: RawFence,
}

/// Fixed-function state reapplied to every render pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PassState {
    pub viewport: Viewport,
    pub scissor: Rect2D,
    pub winding: Winding,
}

#[derive(Debug)]
pub struct WindowRenderState {
    pub(crate) name: String,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) surface: RawSurface,
    pub(crate) swapchain: Swapchain,

    pub(crate) command_buffers: Vec<CommandBuffer>,
    pub(crate) sync: Vec<FrameSync>,
    pub(crate) staging: Vec<RenderBuffer>,
    /// Textures uploaded inside each frame; their generation bumps once the frame retires
    pub(crate) textures_written: Vec<Vec<TextureHandle>>,

    pub(crate) current_frame: u32,
    pub(crate) image_index: u32,
    /// Bumped on every resize
    pub(crate) size_generation: u64,
    /// Generation the swapchain currently matches
    pub(crate) size_last_generation: u64,
    /// Generation the last recreation was built for
    pub(crate) size_rebuilt_generation: u64,
    pub(crate) skip_frames: u32,
    pub(crate) recreating: bool,
    /// Flag change (vsync, power saving) waiting for a rebuild
    pub(crate) flags_dirty: bool,

    /// Intermediate colour target blitted to the swapchain at the end of the frame
    pub(crate) colourbuffer: TextureHandle,
    pub(crate) depthbuffer: TextureHandle,
    pub(crate) colour_index: u32,
    /// Colour targets of the active render pass, transitioned back for sampling when it ends
    pub(crate) pass_targets: Vec<(TextureHandle, u32)>,

    pub(crate) pass_state: PassState,
    pub(crate) clear_colour: [f32; 4],
    pub(crate) clear_depth: f32,
    pub(crate) clear_stencil: u32,
}

impl WindowRenderState {
    /// Create surface, swapchain, intermediate targets and per-frame resources
    pub fn create<D: GpuDevice>(
        context: &mut GpuContext<D>,
        textures: &mut TextureTable,
        source: &dyn SurfaceSource,
        window: &WindowConfig,
        config: &RendererConfig,
    ) -> Result<Self> {
        let surface = context.device.create_surface(source)?;
        let swapchain = match Swapchain::create(context, textures, surface, window.width, window.height, config.flags) {
            Ok(swapchain) => swapchain,
            Err(e) => {
                context.device.destroy_surface(surface);
                return Err(e);
            }
        };

        // The surface may dictate an extent other than the requested size
        let extent = swapchain.extent();
        let mut state = Self {
            name: window.name.clone(),
            width: extent.width,
            height: extent.height,
            surface,
            swapchain,
            command_buffers: Vec::new(),
            sync: Vec::new(),
            staging: Vec::new(),
            textures_written: Vec::new(),
            current_frame: 0,
            image_index: 0,
            size_generation: 0,
            size_last_generation: 0,
            size_rebuilt_generation: 0,
            skip_frames: 0,
            recreating: false,
            flags_dirty: false,
            colourbuffer: TextureHandle::default(),
            depthbuffer: TextureHandle::default(),
            colour_index: 0,
            pass_targets: Vec::new(),
            pass_state: PassState {
                viewport: Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: 0.0,
                    height: 0.0,
                    min_depth: 0.0,
                    max_depth: 1.0,
                },
                scissor: Rect2D::default(),
                winding: Winding::CounterClockwise,
            },
            clear_colour: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
        };
        state.reset_pass_rect();

        if let Err(e) = state
            .create_targets(context, textures)
            .and_then(|_| state.create_frame_resources(context, config))
        {
            state.destroy(context, textures);
            return Err(e);
        }

        engine_info!(
            SOURCE,
            "Window '{}' ready: {}x{}, {} frames in flight",
            state.name,
            state.width,
            state.height,
            state.max_frames_in_flight()
        );
        Ok(state)
    }

    /// Drain the device and destroy every window resource
    ///
    /// Best effort: keeps going past individual failures.
    pub fn destroy<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, textures: &mut TextureTable) {
        let _ = context.device.wait_idle();
        self.destroy_frame_resources(context);
        for handle in [self.colourbuffer, self.depthbuffer] {
            if textures.contains(handle) {
                let _ = textures.release(context, handle);
            }
        }
        let _ = self.swapchain.destroy(context, textures);
        if !self.surface.is_null() {
            context.device.destroy_surface(self.surface);
            self.surface = RawSurface::NULL;
        }
        engine_debug!(SOURCE, "Window '{}' destroyed", self.name);
    }

    /// Record a new framebuffer size; the swapchain follows on the next prepare
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.size_generation += 1;
    }

    pub fn max_frames_in_flight(&self) -> u32 {
        self.swapchain.max_frames_in_flight()
    }

    pub fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    /// Viewport and scissor covering the whole window
    pub(crate) fn reset_pass_rect(&mut self) {
        self.pass_state.viewport.x = 0.0;
        self.pass_state.viewport.y = 0.0;
        self.pass_state.viewport.width = self.width as f32;
        self.pass_state.viewport.height = self.height as f32;
        self.pass_state.scissor = Rect2D { x: 0, y: 0, width: self.width, height: self.height };
    }

    // ===== SWAPCHAIN RECREATION =====

    /// Rebuild the swapchain for the current size and flags
    ///
    /// Returns `Ok(false)` without touching anything when the window is
    /// minimized (zero width or height).
    pub(crate) fn recreate_swapchain<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        textures: &mut TextureTable,
        config: &RendererConfig,
        flags: RendererConfigFlags,
    ) -> Result<bool> {
        if self.recreating {
            engine_debug!(SOURCE, "Swapchain recreation already in progress");
            return Ok(false);
        }
        if self.width == 0 || self.height == 0 {
            engine_debug!(SOURCE, "Window '{}' is minimized, swapchain not recreated", self.name);
            return Ok(false);
        }

        self.recreating = true;
        let result = self.rebuild(context, textures, config, flags);
        self.recreating = false;
        result.map(|_| true)
    }

    fn rebuild<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        textures: &mut TextureTable,
        config: &RendererConfig,
        flags: RendererConfigFlags,
    ) -> Result<()> {
        context.device.wait_idle()?;
        let frames_before = self.max_frames_in_flight();
        let images_before = self.image_count();

        self.swapchain.recreate(context, textures, self.width, self.height, flags)?;
        let extent = self.swapchain.extent();
        self.width = extent.width;
        self.height = extent.height;
        self.reset_pass_rect();

        if self.image_count() == images_before {
            textures.resize(context, self.colourbuffer, extent.width, extent.height)?;
            textures.resize(context, self.depthbuffer, extent.width, extent.height)?;
        } else {
            for handle in [self.colourbuffer, self.depthbuffer] {
                textures.release(context, handle)?;
            }
            self.create_targets(context, textures)?;
        }
        self.colour_index = 0;

        if self.max_frames_in_flight() != frames_before {
            engine_debug!(
                SOURCE,
                "Frames in flight changed {} -> {}, rebuilding per-frame resources",
                frames_before,
                self.max_frames_in_flight()
            );
            // Device is idle: uploads recorded by the dropped frames are complete
            self.retire_written_textures(textures);
            self.destroy_frame_resources(context);
            self.create_frame_resources(context, config)?;
        }
        self.current_frame %= self.max_frames_in_flight().max(1);
        Ok(())
    }

    // ===== RESOURCES =====

    fn create_targets<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, textures: &mut TextureTable) -> Result<()> {
        let extent = self.swapchain.extent();
        let image_count = self.image_count();
        self.colourbuffer = textures.acquire(
            context,
            TextureDesc {
                image_count,
                flags: TextureFlags::IS_WRITEABLE,
                ..TextureDesc::new(&format!("{}_colourbuffer", self.name), extent.width, extent.height, self.swapchain.format())
            },
        )?;
        let depth_format = context.capabilities().depth_format;
        self.depthbuffer = textures.acquire(
            context,
            TextureDesc {
                image_count,
                flags: TextureFlags::DEPTH | TextureFlags::IS_WRITEABLE,
                ..TextureDesc::new(&format!("{}_depthbuffer", self.name), extent.width, extent.height, depth_format)
            },
        )?;
        Ok(())
    }

    fn create_frame_resources<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, config: &RendererConfig) -> Result<()> {
        let frames = self.max_frames_in_flight();
        for frame in 0..frames {
            self.command_buffers
                .push(CommandBuffer::allocate(&mut context.device, true, config.secondary_buffers_per_frame)?);
            let image_available = context.device.create_semaphore()?;
            let queue_complete = context.device.create_semaphore()?;
            // Signaled so the first wait on every frame slot returns immediately
            let in_flight = context.device.create_fence(true)?;
            self.sync.push(FrameSync { image_available, queue_complete, in_flight });
            self.staging.push(RenderBuffer::create(
                context,
                &format!("{}_staging_{}", self.name, frame),
                RenderBufferType::Staging,
                config.staging_buffer_size,
                RenderBufferTrackType::Linear,
            )?);
            self.textures_written.push(Vec::new());
        }
        self.current_frame = 0;
        Ok(())
    }

    /// Bump the generation of every texture uploaded by a pending frame
    fn retire_written_textures(&mut self, textures: &mut TextureTable) {
        for handle in self.textures_written.iter_mut().flat_map(|list| list.drain(..)) {
            if let Some(slot) = textures.get_mut(handle) {
                slot.bump_generation();
            }
        }
    }

    fn destroy_frame_resources<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) {
        for mut command_buffer in self.command_buffers.drain(..) {
            command_buffer.free(&mut context.device);
        }
        for sync in self.sync.drain(..) {
            context.device.destroy_semaphore(sync.image_available);
            context.device.destroy_semaphore(sync.queue_complete);
            context.device.destroy_fence(sync.in_flight);
        }
        for mut staging in self.staging.drain(..) {
            staging.destroy_completed(context);
        }
        self.textures_written.clear();
    }

    // ===== ACCESSORS =====

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    pub fn colourbuffer(&self) -> TextureHandle {
        self.colourbuffer
    }

    pub fn depthbuffer(&self) -> TextureHandle {
        self.depthbuffer
    }

    /// Primary command buffer of the current frame
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffers[self.current_frame as usize]
    }
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod tests;
