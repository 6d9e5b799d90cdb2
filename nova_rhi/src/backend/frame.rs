/// Frame lifecycle - acquire, record, end-of-frame blit, submit, present
///
/// One cycle per window and tick:
///
/// ```text
/// prepare_frame -> commands_begin -> (begin_rendering .. end_rendering)* -> commands_end -> submit -> present
/// ```
///
/// `prepare_frame` returning `Ok(false)` means the tick is skipped (swapchain
/// being rebuilt, window minimized, image out of date); the caller simply tries
/// again next tick.

use crate::error::Result;
use crate::config::{RendererConfig, RendererConfigFlags};
use crate::device::*;
use crate::backend::buffer::FrameWorkload;
use crate::backend::context::GpuContext;
use crate::backend::texture::{TextureHandle, TextureTable};
use crate::backend::window::WindowRenderState;
use crate::{engine_bail, engine_debug, engine_err, engine_fatal, engine_warn};

const SOURCE: &str = "nova::rhi::Frame";

/// Engine-level per-tick data
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameData {
    /// Monotonic render frame number; drives descriptor staleness
    pub frame_number: u64,
    /// Seconds since the previous tick
    pub delta_time: f32,
}

impl WindowRenderState {
    // ===== ACQUIRE =====

    /// Wait for the frame slot to retire and acquire the next swapchain image
    pub fn prepare_frame<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        textures: &mut TextureTable,
        config: &RendererConfig,
        flags: RendererConfigFlags,
    ) -> Result<bool> {
        if self.recreating {
            engine_debug!(SOURCE, "Swapchain recreation in progress, frame skipped");
            return Ok(false);
        }

        if self.size_generation != self.size_last_generation || self.flags_dirty {
            context.device.wait_idle()?;
            if self.skip_frames == 0 {
                let generation = self.size_generation;
                if !self.recreate_swapchain(context, textures, config, flags)? {
                    return Ok(false);
                }
                self.size_rebuilt_generation = generation;
                self.flags_dirty = false;
            }
            // Debounce: let every frame slot rotate past the rebuild before resyncing
            self.skip_frames += 1;
            if self.skip_frames >= self.max_frames_in_flight() {
                self.size_last_generation = self.size_rebuilt_generation;
                self.skip_frames = 0;
            }
            return Ok(false);
        }

        let frame = self.current_frame as usize;
        let sync = self.sync[frame];
        if !context.device.wait_for_fence(sync.in_flight, u64::MAX)? {
            engine_warn!(SOURCE, "In-flight fence wait timed out on frame {}", frame);
            return Ok(false);
        }

        // The frame that uploaded these has retired
        for handle in self.textures_written[frame].drain(..) {
            if let Some(slot) = textures.get_mut(handle) {
                slot.bump_generation();
            }
        }

        match self.swapchain.acquire_next_image(&mut context.device, sync.image_available)? {
            AcquireOutcome::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    engine_debug!(SOURCE, "Swapchain image {} is suboptimal", image_index);
                }
                self.image_index = image_index;
            }
            AcquireOutcome::OutOfDate => {
                engine_debug!(SOURCE, "Swapchain out of date on acquire, recreating");
                self.recreate_swapchain(context, textures, config, flags)?;
                return Ok(false);
            }
        }

        context.device.reset_fence(sync.in_flight)?;
        self.staging[frame].clear();
        Ok(true)
    }

    // ===== RECORD =====

    /// Reset and begin the frame's primary command buffer
    pub fn commands_begin<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) -> Result<()> {
        let command_buffer = &mut self.command_buffers[self.current_frame as usize];
        command_buffer.reset(&mut context.device)?;
        command_buffer.begin(&mut context.device, CommandBufferUsage::ONE_TIME_SUBMIT)?;
        let raw = command_buffer.raw();
        context.device.cmd_set_viewport(raw, &self.pass_state.viewport);
        context.device.cmd_set_scissor(raw, &self.pass_state.scissor);
        Ok(())
    }

    /// Begin a render pass in the next secondary command buffer
    ///
    /// An empty `colour_targets` renders into the window's colour buffer; the
    /// depth target defaults to the window's depth buffer. Buffered targets use
    /// the image matching the current colour index.
    pub fn begin_rendering<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        textures: &mut TextureTable,
        render_area: Rect2D,
        colour_targets: &[TextureHandle],
        depth_target: Option<TextureHandle>,
    ) -> Result<()> {
        let frame = self.current_frame as usize;
        let primary = self.command_buffers[frame].raw();
        let index = self.colour_index;

        let targets: Vec<TextureHandle> = if colour_targets.is_empty() {
            vec![self.colourbuffer]
        } else {
            colour_targets.to_vec()
        };
        let depth = depth_target.unwrap_or(self.depthbuffer);

        let mut colour_attachments = Vec::with_capacity(targets.len());
        let mut layer_count = 1;
        for handle in &targets {
            let slot = textures
                .get_mut(*handle)
                .ok_or_else(|| engine_err!(SOURCE, "Invalid colour target {:?}", handle))?;
            let image = slot.image_mut(index);
            let old = image.layout();
            let (src_access, src_stage) = match old {
                ImageLayout::ShaderReadOnlyOptimal => (AccessFlags::SHADER_READ, PipelineStage::FRAGMENT_SHADER),
                _ => (AccessFlags::empty(), PipelineStage::TOP_OF_PIPE),
            };
            image.barrier(
                &mut context.device,
                primary,
                old,
                ImageLayout::ColorAttachmentOptimal,
                src_access,
                AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE,
                src_stage,
                PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            );
            layer_count = image.params().layer_count.max(1);
            colour_attachments.push(RenderingAttachment {
                view: image.view(),
                layout: ImageLayout::ColorAttachmentOptimal,
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
                clear_value: ClearValue::Color(self.clear_colour),
            });
        }

        let depth_slot = textures
            .get_mut(depth)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid depth target {:?}", depth))?;
        let depth_image = depth_slot.image_mut(index);
        let depth_old = depth_image.layout();
        if depth_old != ImageLayout::DepthStencilAttachmentOptimal {
            depth_image.barrier(
                &mut context.device,
                primary,
                depth_old,
                ImageLayout::DepthStencilAttachmentOptimal,
                AccessFlags::empty(),
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                PipelineStage::TOP_OF_PIPE,
                PipelineStage::EARLY_FRAGMENT_TESTS | PipelineStage::LATE_FRAGMENT_TESTS,
            );
        }
        let depth_attachment = RenderingAttachment {
            view: depth_image.view(),
            layout: ImageLayout::DepthStencilAttachmentOptimal,
            load_op: LoadOp::Load,
            store_op: StoreOp::Store,
            clear_value: ClearValue::DepthStencil { depth: self.clear_depth, stencil: self.clear_stencil },
        };
        let stencil_attachment = depth_image.format().has_stencil().then_some(depth_attachment);

        let secondary = self.command_buffers[frame].begin_secondary(&mut context.device)?;
        context.device.cmd_begin_rendering(
            secondary,
            &RenderingInfo {
                render_area,
                layer_count,
                color_attachments: colour_attachments,
                depth_attachment: Some(depth_attachment),
                stencil_attachment,
            },
        );

        // Fixed-function state does not carry over into a new secondary
        context.device.cmd_set_viewport(secondary, &self.pass_state.viewport);
        context.device.cmd_set_scissor(secondary, &self.pass_state.scissor);
        if context.capabilities().support_flags.has_dynamic_state() {
            context.device.cmd_set_front_face(secondary, self.pass_state.winding);
        }

        self.pass_targets = targets.into_iter().map(|handle| (handle, index)).collect();
        Ok(())
    }

    /// End the active render pass and execute its secondary into the primary
    pub fn end_rendering<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, textures: &mut TextureTable) -> Result<()> {
        let frame = self.current_frame as usize;
        let command_buffer = &mut self.command_buffers[frame];
        if !command_buffer.in_secondary() {
            engine_fatal!(SOURCE, "end_rendering called with no active render pass");
        }
        context.device.cmd_end_rendering(command_buffer.active());
        command_buffer.end_secondary(&mut context.device)?;
        let primary = command_buffer.raw();

        // Offscreen targets become sampleable; the window colour buffer waits for the end-of-frame blit
        for (handle, index) in self.pass_targets.drain(..) {
            if handle == self.colourbuffer {
                continue;
            }
            if let Some(slot) = textures.get_mut(handle) {
                slot.image_mut(index).barrier(
                    &mut context.device,
                    primary,
                    ImageLayout::ColorAttachmentOptimal,
                    ImageLayout::ShaderReadOnlyOptimal,
                    AccessFlags::COLOR_ATTACHMENT_WRITE,
                    AccessFlags::SHADER_READ,
                    PipelineStage::COLOR_ATTACHMENT_OUTPUT,
                    PipelineStage::FRAGMENT_SHADER,
                );
            }
        }
        Ok(())
    }

    /// Blit the colour buffer to the swapchain image and end the primary
    pub fn commands_end<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, textures: &mut TextureTable) -> Result<()> {
        let frame = self.current_frame as usize;
        let primary = self.command_buffers[frame].raw();
        let device = &mut context.device;

        let swapchain_texture = self.swapchain.texture();
        let swapchain_extent = self.swapchain.extent();
        let image_index = self.image_index;
        let colour_index = self.colour_index;

        let colour = textures
            .get_mut(self.colourbuffer)
            .ok_or_else(|| engine_err!(SOURCE, "Window '{}' lost its colour buffer", self.name))?;
        let colour_count = colour.images().len() as u32;
        let colour_image = colour.image_mut(colour_index);
        let colour_old = colour_image.layout();
        colour_image.barrier(
            device,
            primary,
            colour_old,
            ImageLayout::TransferSrcOptimal,
            AccessFlags::COLOR_ATTACHMENT_WRITE,
            AccessFlags::TRANSFER_READ,
            PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            PipelineStage::TRANSFER,
        );
        let colour_raw = colour_image.raw();
        let (colour_width, colour_height) = (colour_image.width(), colour_image.height());

        let target = textures
            .get_mut(swapchain_texture)
            .ok_or_else(|| engine_err!(SOURCE, "Window '{}' lost its swapchain images", self.name))?;
        let target_image = target.image_mut(image_index);
        // The acquire semaphore is waited on at colour-attachment output
        target_image.barrier(
            device,
            primary,
            ImageLayout::Undefined,
            ImageLayout::TransferDstOptimal,
            AccessFlags::empty(),
            AccessFlags::TRANSFER_WRITE,
            PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            PipelineStage::TRANSFER,
        );

        let layers = ImageSubresourceLayers {
            aspect: ImageAspect::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        device.cmd_blit_image(
            primary,
            colour_raw,
            ImageLayout::TransferSrcOptimal,
            target_image.raw(),
            ImageLayout::TransferDstOptimal,
            &ImageBlit {
                src_subresource: layers,
                src_offsets: [[0, 0, 0], [colour_width as i32, colour_height as i32, 1]],
                dst_subresource: layers,
                dst_offsets: [[0, 0, 0], [swapchain_extent.width as i32, swapchain_extent.height as i32, 1]],
            },
            Filter::Linear,
        );

        target_image.barrier(
            device,
            primary,
            ImageLayout::TransferDstOptimal,
            ImageLayout::PresentSrc,
            AccessFlags::TRANSFER_WRITE,
            AccessFlags::empty(),
            PipelineStage::TRANSFER,
            PipelineStage::BOTTOM_OF_PIPE,
        );

        if let Some(colour) = textures.get_mut(self.colourbuffer) {
            colour.image_mut(colour_index).barrier(
                device,
                primary,
                ImageLayout::TransferSrcOptimal,
                ImageLayout::ShaderReadOnlyOptimal,
                AccessFlags::TRANSFER_READ,
                AccessFlags::SHADER_READ,
                PipelineStage::TRANSFER,
                PipelineStage::FRAGMENT_SHADER,
            );
        }

        // Transfers folded into this frame must be visible to the next frame's vertex input
        device.cmd_pipeline_barrier(
            primary,
            &PipelineBarrier::memory(
                PipelineStage::TRANSFER,
                PipelineStage::VERTEX_INPUT,
                MemoryBarrier {
                    src_access: AccessFlags::TRANSFER_WRITE,
                    dst_access: AccessFlags::VERTEX_ATTRIBUTE_READ | AccessFlags::INDEX_READ,
                },
            ),
        );

        self.command_buffers[frame].end(device)?;
        self.colour_index = (colour_index + 1) % colour_count.max(1);
        Ok(())
    }

    // ===== SUBMIT & PRESENT =====

    /// Submit the primary: wait image-available, signal queue-complete and the in-flight fence
    pub fn submit<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) -> Result<()> {
        let frame = self.current_frame as usize;
        let sync = self.sync[frame];
        let command_buffer = &mut self.command_buffers[frame];
        if command_buffer.state() != crate::backend::CommandBufferState::RecordingEnded {
            engine_fatal!(SOURCE, "Frame submitted in command buffer state {:?}", command_buffer.state());
        }
        context.device.queue_submit(&SubmitInfo {
            command_buffers: vec![command_buffer.raw()],
            wait: Some((sync.image_available, PipelineStage::COLOR_ATTACHMENT_OUTPUT)),
            signal: Some(sync.queue_complete),
            fence: Some(sync.in_flight),
        })?;
        command_buffer.mark_submitted();
        Ok(())
    }

    /// Present once the queue completes and advance to the next frame slot
    ///
    /// Returns `Ok(false)` when the swapchain had to be rebuilt.
    pub fn present<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        textures: &mut TextureTable,
        config: &RendererConfig,
        flags: RendererConfigFlags,
    ) -> Result<bool> {
        let frame = self.current_frame as usize;
        let outcome = self
            .swapchain
            .present(&mut context.device, self.image_index, self.sync[frame].queue_complete)?;
        self.current_frame = (self.current_frame + 1) % self.max_frames_in_flight().max(1);

        match outcome {
            PresentOutcome::Presented => Ok(true),
            PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => {
                engine_debug!(SOURCE, "Swapchain {:?} on present, recreating", outcome);
                self.recreate_swapchain(context, textures, config, flags)?;
                Ok(false)
            }
        }
    }

    // ===== IN-FRAME HELPERS =====

    /// Command buffer rendering commands currently go to (active secondary or primary)
    pub fn active_command_buffer(&self) -> RawCommandBuffer {
        self.command_buffers[self.current_frame as usize].active()
    }

    /// Whether the frame's primary is recording
    pub fn is_recording(&self) -> bool {
        self.command_buffers
            .get(self.current_frame as usize)
            .is_some_and(|cb| cb.state() == crate::backend::CommandBufferState::Recording)
    }

    /// Transfer context of the recording frame, if any
    pub fn workload(&mut self) -> Option<FrameWorkload<'_>> {
        if !self.is_recording() {
            return None;
        }
        let frame = self.current_frame as usize;
        Some(FrameWorkload {
            command_buffer: self.command_buffers[frame].raw(),
            staging: &mut self.staging[frame],
        })
    }

    /// Defer a texture's generation bump until the current frame retires
    pub fn record_texture_written(&mut self, handle: TextureHandle) {
        let list = &mut self.textures_written[self.current_frame as usize];
        if !list.contains(&handle) {
            list.push(handle);
        }
    }

    /// Force a swapchain rebuild on the next prepare (flag change)
    pub fn mark_flags_dirty(&mut self) {
        self.flags_dirty = true;
    }

    // ===== FIXED-FUNCTION STATE =====

    pub fn set_viewport<D: GpuDevice>(&mut self, device: &mut D, viewport: Viewport) {
        self.pass_state.viewport = viewport;
        if self.is_recording() {
            device.cmd_set_viewport(self.active_command_buffer(), &viewport);
        }
    }

    pub fn set_scissor<D: GpuDevice>(&mut self, device: &mut D, scissor: Rect2D) {
        self.pass_state.scissor = scissor;
        if self.is_recording() {
            device.cmd_set_scissor(self.active_command_buffer(), &scissor);
        }
    }

    /// Back to the full-window viewport and scissor
    pub fn reset_viewport_scissor<D: GpuDevice>(&mut self, device: &mut D) {
        self.reset_pass_rect();
        if self.is_recording() {
            let cb = self.active_command_buffer();
            device.cmd_set_viewport(cb, &self.pass_state.viewport);
            device.cmd_set_scissor(cb, &self.pass_state.scissor);
        }
    }

    pub fn set_winding<D: GpuDevice>(&mut self, device: &mut D, winding: Winding) {
        require_dynamic_state(device, "winding");
        self.pass_state.winding = winding;
        if self.is_recording() {
            device.cmd_set_front_face(self.active_command_buffer(), winding);
        }
    }

    pub fn set_depth_test<D: GpuDevice>(&mut self, device: &mut D, enabled: bool) {
        require_dynamic_state(device, "depth test");
        device.cmd_set_depth_test_enable(self.active_command_buffer(), enabled);
    }

    pub fn set_depth_write<D: GpuDevice>(&mut self, device: &mut D, enabled: bool) {
        require_dynamic_state(device, "depth write");
        device.cmd_set_depth_write_enable(self.active_command_buffer(), enabled);
    }

    pub fn set_stencil_test<D: GpuDevice>(&mut self, device: &mut D, enabled: bool) {
        require_dynamic_state(device, "stencil test");
        device.cmd_set_stencil_test_enable(self.active_command_buffer(), enabled);
    }

    pub fn set_stencil_op<D: GpuDevice>(
        &mut self,
        device: &mut D,
        fail_op: StencilOp,
        pass_op: StencilOp,
        depth_fail_op: StencilOp,
        compare_op: CompareOp,
    ) {
        require_dynamic_state(device, "stencil op");
        device.cmd_set_stencil_op(self.active_command_buffer(), fail_op, pass_op, depth_fail_op, compare_op);
    }

    // Reference and masks are core dynamic state on every device
    pub fn set_stencil_reference<D: GpuDevice>(&mut self, device: &mut D, reference: u32) {
        device.cmd_set_stencil_reference(self.active_command_buffer(), reference);
    }

    pub fn set_stencil_compare_mask<D: GpuDevice>(&mut self, device: &mut D, mask: u32) {
        device.cmd_set_stencil_compare_mask(self.active_command_buffer(), mask);
    }

    pub fn set_stencil_write_mask<D: GpuDevice>(&mut self, device: &mut D, mask: u32) {
        device.cmd_set_stencil_write_mask(self.active_command_buffer(), mask);
    }

    // ===== CLEARS =====

    pub fn set_clear_colour(&mut self, colour: [f32; 4]) {
        self.clear_colour = colour;
    }

    pub fn set_clear_depth(&mut self, depth: f32) {
        self.clear_depth = depth;
    }

    pub fn set_clear_stencil(&mut self, stencil: u32) {
        self.clear_stencil = stencil;
    }

    /// Record a clear of `target` (default: the window colour buffer) with the clear colour
    pub fn clear_colour_apply<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        textures: &mut TextureTable,
        target: Option<TextureHandle>,
    ) -> Result<()> {
        let primary = self.clear_command_buffer()?;
        let target = target.unwrap_or(self.colourbuffer);
        textures.clear_color(&mut context.device, primary, target, self.colour_index, self.clear_colour)
    }

    /// Record a clear of `target` (default: the window depth buffer) with the clear depth and stencil
    pub fn clear_depth_stencil_apply<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        textures: &mut TextureTable,
        target: Option<TextureHandle>,
    ) -> Result<()> {
        let primary = self.clear_command_buffer()?;
        let target = target.unwrap_or(self.depthbuffer);
        textures.clear_depth_stencil(&mut context.device, primary, target, self.colour_index, self.clear_depth, self.clear_stencil)
    }

    fn clear_command_buffer(&self) -> Result<RawCommandBuffer> {
        if !self.is_recording() {
            engine_bail!(SOURCE, "Clears must be recorded between commands_begin and commands_end");
        }
        let command_buffer = &self.command_buffers[self.current_frame as usize];
        if command_buffer.in_secondary() {
            engine_bail!(SOURCE, "Clears cannot be recorded inside a render pass");
        }
        Ok(command_buffer.raw())
    }
}

fn require_dynamic_state<D: GpuDevice>(device: &D, what: &str) {
    if !device.capabilities().support_flags.has_dynamic_state() {
        engine_fatal!(SOURCE, "Setting {} requires dynamic state support, which this device lacks", what);
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
