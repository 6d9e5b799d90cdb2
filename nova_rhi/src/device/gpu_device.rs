/// GpuDevice trait - the explicit low-level GPU API
///
/// One device owns the instance, the logical device, its queues and the
/// graphics command pool. All object handles are raw 64-bit values; the
/// device never validates engine-level protocol (command buffer states,
/// layout bookkeeping), that is the backend's job.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use crate::error::Result;
use crate::device::capabilities::DeviceCapabilities;
use crate::device::descriptors::*;
use crate::device::handles::*;
use crate::device::types::*;

/// Anything a presentation surface can be created from
pub trait SurfaceSource: HasDisplayHandle + HasWindowHandle {}

impl<T: HasDisplayHandle + HasWindowHandle> SurfaceSource for T {}

/// Explicit GPU device
pub trait GpuDevice: Send {
    // ===== DEVICE =====

    /// Capabilities of the selected device
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Whether optimal-tiled images of `format` support linear-filtered blits
    fn format_supports_linear_blit(&self, format: Format) -> bool;

    /// Block until the device has finished all submitted work
    fn wait_idle(&mut self) -> Result<()>;

    /// Block until the graphics queue has finished all submitted work
    fn queue_wait_idle(&mut self) -> Result<()>;

    // ===== SURFACE & SWAPCHAIN =====

    fn create_surface(&mut self, source: &dyn SurfaceSource) -> Result<RawSurface>;
    fn destroy_surface(&mut self, surface: RawSurface);

    /// Query capabilities, formats and present modes of a surface
    fn query_surface_support(&self, surface: RawSurface) -> Result<SurfaceSupport>;

    fn create_swapchain(&mut self, info: &SwapchainCreateInfo) -> Result<RawSwapchain>;
    fn swapchain_images(&self, swapchain: RawSwapchain) -> Result<Vec<RawImage>>;
    fn destroy_swapchain(&mut self, swapchain: RawSwapchain);

    /// Acquire the next presentable image, signaling `signal` when it is ready
    fn acquire_next_image(
        &mut self,
        swapchain: RawSwapchain,
        timeout: u64,
        signal: RawSemaphore,
    ) -> Result<AcquireOutcome>;

    /// Present `image_index` once `wait` is signaled
    fn queue_present(
        &mut self,
        swapchain: RawSwapchain,
        image_index: u32,
        wait: RawSemaphore,
    ) -> Result<PresentOutcome>;

    // ===== IMAGES =====

    fn create_image(&mut self, info: &ImageCreateInfo) -> Result<RawImage>;
    fn image_memory_requirements(&self, image: RawImage) -> MemoryRequirements;

    /// Allocate and bind memory of type `memory_index` to `image`
    fn allocate_image_memory(
        &mut self,
        image: RawImage,
        requirements: &MemoryRequirements,
        memory_index: u32,
        properties: MemoryProperty,
        name: &str,
    ) -> Result<()>;

    /// Destroy the image and free its bound memory
    fn destroy_image(&mut self, image: RawImage);

    fn create_image_view(&mut self, info: &ImageViewCreateInfo) -> Result<RawImageView>;
    fn destroy_image_view(&mut self, view: RawImageView);

    // ===== BUFFERS =====

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<RawBuffer>;
    fn buffer_memory_requirements(&self, buffer: RawBuffer) -> MemoryRequirements;

    /// Allocate and bind memory of type `memory_index` to `buffer`
    fn allocate_buffer_memory(
        &mut self,
        buffer: RawBuffer,
        requirements: &MemoryRequirements,
        memory_index: u32,
        properties: MemoryProperty,
        name: &str,
    ) -> Result<()>;

    /// Destroy the buffer and free its bound memory
    fn destroy_buffer(&mut self, buffer: RawBuffer);

    /// Host view of a host-visible buffer's whole memory
    fn mapped_memory(&mut self, buffer: RawBuffer) -> Result<&mut [u8]>;

    /// Flush a host write range of non-coherent memory
    fn flush_memory(&mut self, buffer: RawBuffer, offset: u64, size: u64) -> Result<()>;

    // ===== COMMAND BUFFERS =====

    fn allocate_command_buffers(
        &mut self,
        level: CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<RawCommandBuffer>>;
    fn free_command_buffers(&mut self, command_buffers: &[RawCommandBuffer]);

    fn begin_command_buffer(
        &mut self,
        command_buffer: RawCommandBuffer,
        level: CommandBufferLevel,
        usage: CommandBufferUsage,
    ) -> Result<()>;
    fn end_command_buffer(&mut self, command_buffer: RawCommandBuffer) -> Result<()>;
    fn reset_command_buffer(&mut self, command_buffer: RawCommandBuffer) -> Result<()>;

    fn queue_submit(&mut self, submit: &SubmitInfo) -> Result<()>;

    // ===== COMMANDS =====

    fn cmd_pipeline_barrier(&mut self, cb: RawCommandBuffer, barrier: &PipelineBarrier);
    fn cmd_copy_buffer(&mut self, cb: RawCommandBuffer, src: RawBuffer, dst: RawBuffer, region: &BufferCopy);
    fn cmd_copy_buffer_to_image(
        &mut self,
        cb: RawCommandBuffer,
        src: RawBuffer,
        dst: RawImage,
        dst_layout: ImageLayout,
        region: &BufferImageCopy,
    );
    fn cmd_copy_image_to_buffer(
        &mut self,
        cb: RawCommandBuffer,
        src: RawImage,
        src_layout: ImageLayout,
        dst: RawBuffer,
        region: &BufferImageCopy,
    );
    fn cmd_blit_image(
        &mut self,
        cb: RawCommandBuffer,
        src: RawImage,
        src_layout: ImageLayout,
        dst: RawImage,
        dst_layout: ImageLayout,
        region: &ImageBlit,
        filter: Filter,
    );
    fn cmd_clear_color_image(
        &mut self,
        cb: RawCommandBuffer,
        image: RawImage,
        layout: ImageLayout,
        color: [f32; 4],
        range: &ImageSubresourceRange,
    );
    fn cmd_clear_depth_stencil_image(
        &mut self,
        cb: RawCommandBuffer,
        image: RawImage,
        layout: ImageLayout,
        depth: f32,
        stencil: u32,
        range: &ImageSubresourceRange,
    );
    fn cmd_execute_commands(&mut self, cb: RawCommandBuffer, secondaries: &[RawCommandBuffer]);

    fn cmd_begin_rendering(&mut self, cb: RawCommandBuffer, info: &RenderingInfo);
    fn cmd_end_rendering(&mut self, cb: RawCommandBuffer);

    fn cmd_set_viewport(&mut self, cb: RawCommandBuffer, viewport: &Viewport);
    fn cmd_set_scissor(&mut self, cb: RawCommandBuffer, scissor: &Rect2D);
    fn cmd_set_primitive_topology(&mut self, cb: RawCommandBuffer, topology: PrimitiveTopology);
    fn cmd_set_front_face(&mut self, cb: RawCommandBuffer, winding: Winding);
    fn cmd_set_depth_test_enable(&mut self, cb: RawCommandBuffer, enabled: bool);
    fn cmd_set_depth_write_enable(&mut self, cb: RawCommandBuffer, enabled: bool);
    fn cmd_set_stencil_test_enable(&mut self, cb: RawCommandBuffer, enabled: bool);
    fn cmd_set_stencil_op(
        &mut self,
        cb: RawCommandBuffer,
        fail_op: StencilOp,
        pass_op: StencilOp,
        depth_fail_op: StencilOp,
        compare_op: CompareOp,
    );
    fn cmd_set_stencil_reference(&mut self, cb: RawCommandBuffer, reference: u32);
    fn cmd_set_stencil_compare_mask(&mut self, cb: RawCommandBuffer, mask: u32);
    fn cmd_set_stencil_write_mask(&mut self, cb: RawCommandBuffer, mask: u32);

    fn cmd_bind_pipeline(&mut self, cb: RawCommandBuffer, pipeline: RawPipeline);
    fn cmd_bind_descriptor_sets(
        &mut self,
        cb: RawCommandBuffer,
        layout: RawPipelineLayout,
        first_set: u32,
        sets: &[RawDescriptorSet],
    );
    fn cmd_push_constants(
        &mut self,
        cb: RawCommandBuffer,
        layout: RawPipelineLayout,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    fn cmd_bind_vertex_buffer(&mut self, cb: RawCommandBuffer, buffer: RawBuffer, offset: u64);
    fn cmd_bind_index_buffer(&mut self, cb: RawCommandBuffer, buffer: RawBuffer, offset: u64, index_type: IndexType);
    fn cmd_draw(&mut self, cb: RawCommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn cmd_draw_indexed(
        &mut self,
        cb: RawCommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    // ===== SYNCHRONIZATION =====

    fn create_semaphore(&mut self) -> Result<RawSemaphore>;
    fn destroy_semaphore(&mut self, semaphore: RawSemaphore);
    fn create_fence(&mut self, signaled: bool) -> Result<RawFence>;
    fn destroy_fence(&mut self, fence: RawFence);

    /// Wait for `fence`; `Ok(false)` on timeout
    fn wait_for_fence(&mut self, fence: RawFence, timeout: u64) -> Result<bool>;
    fn reset_fence(&mut self, fence: RawFence) -> Result<()>;

    // ===== DESCRIPTORS =====

    fn create_descriptor_pool(&mut self, sizes: &[DescriptorPoolSize], max_sets: u32) -> Result<RawDescriptorPool>;
    fn destroy_descriptor_pool(&mut self, pool: RawDescriptorPool);
    fn create_descriptor_set_layout(&mut self, bindings: &[DescriptorSetLayoutBinding]) -> Result<RawDescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&mut self, layout: RawDescriptorSetLayout);
    fn allocate_descriptor_sets(
        &mut self,
        pool: RawDescriptorPool,
        layouts: &[RawDescriptorSetLayout],
    ) -> Result<Vec<RawDescriptorSet>>;
    fn free_descriptor_sets(&mut self, pool: RawDescriptorPool, sets: &[RawDescriptorSet]) -> Result<()>;

    /// Apply every write in one batched update
    fn update_descriptor_sets(&mut self, writes: &[DescriptorWrite]);

    // ===== SHADERS & PIPELINES =====

    fn create_shader_module(&mut self, stage: ShaderStage, spirv: &[u8]) -> Result<RawShaderModule>;
    fn destroy_shader_module(&mut self, module: RawShaderModule);
    fn create_pipeline_layout(
        &mut self,
        set_layouts: &[RawDescriptorSetLayout],
        push_constants: &[PushConstantRange],
    ) -> Result<RawPipelineLayout>;
    fn destroy_pipeline_layout(&mut self, layout: RawPipelineLayout);
    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<RawPipeline>;
    fn destroy_pipeline(&mut self, pipeline: RawPipeline);

    // ===== SAMPLERS =====

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<RawSampler>;
    fn destroy_sampler(&mut self, sampler: RawSampler);
}
