/// Mock GPU device for unit tests
///
/// Hands out sequential fake handles, records every interesting call, and
/// emulates just enough state to check protocols: fence signal state, host
/// memory of host-visible buffers, swapchain images and scripted surface
/// behaviour (out-of-date acquire/present, surface limits, blit support).

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WebDisplayHandle, WebWindowHandle, WindowHandle,
};
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::device::*;

/// Recorded device call
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MockCall {
    WaitIdle,
    QueueWaitIdle,
    CreateSurface(RawSurface),
    DestroySurface(RawSurface),
    CreateSwapchain { swapchain: RawSwapchain, info: SwapchainCreateInfo },
    DestroySwapchain(RawSwapchain),
    Acquire { swapchain: RawSwapchain, signal: RawSemaphore },
    Present { swapchain: RawSwapchain, image_index: u32, wait: RawSemaphore },
    CreateImage { image: RawImage, info: ImageCreateInfo },
    AllocateImageMemory { image: RawImage, memory_index: u32, properties: MemoryProperty },
    DestroyImage(RawImage),
    CreateImageView { view: RawImageView, info: ImageViewCreateInfo },
    DestroyImageView(RawImageView),
    CreateBuffer { buffer: RawBuffer, size: u64, usage: BufferUsage },
    AllocateBufferMemory { buffer: RawBuffer, properties: MemoryProperty },
    DestroyBuffer(RawBuffer),
    FlushMemory { buffer: RawBuffer, offset: u64, size: u64 },
    AllocateCommandBuffers { level: CommandBufferLevel, buffers: Vec<RawCommandBuffer> },
    FreeCommandBuffers(Vec<RawCommandBuffer>),
    BeginCommandBuffer(RawCommandBuffer, CommandBufferLevel),
    EndCommandBuffer(RawCommandBuffer),
    ResetCommandBuffer(RawCommandBuffer),
    Submit(SubmitInfo),
    Barrier(RawCommandBuffer, PipelineBarrier),
    CopyBuffer { cb: RawCommandBuffer, src: RawBuffer, dst: RawBuffer, region: BufferCopy },
    CopyBufferToImage { cb: RawCommandBuffer, src: RawBuffer, dst: RawImage, region: BufferImageCopy },
    CopyImageToBuffer { cb: RawCommandBuffer, src: RawImage, dst: RawBuffer, region: BufferImageCopy },
    Blit { cb: RawCommandBuffer, src: RawImage, dst: RawImage, region: ImageBlit },
    ClearColorImage { cb: RawCommandBuffer, image: RawImage, color: [f32; 4] },
    ClearDepthStencilImage { cb: RawCommandBuffer, image: RawImage, depth: f32, stencil: u32 },
    ExecuteCommands { cb: RawCommandBuffer, secondaries: Vec<RawCommandBuffer> },
    BeginRendering(RawCommandBuffer, RenderingInfo),
    EndRendering(RawCommandBuffer),
    SetViewport(RawCommandBuffer, Viewport),
    SetScissor(RawCommandBuffer, Rect2D),
    SetTopology(RawCommandBuffer, PrimitiveTopology),
    SetFrontFace(RawCommandBuffer, Winding),
    SetDynamicState(RawCommandBuffer, DynamicState),
    BindPipeline(RawCommandBuffer, RawPipeline),
    BindDescriptorSets { cb: RawCommandBuffer, layout: RawPipelineLayout, first_set: u32, sets: Vec<RawDescriptorSet> },
    PushConstants { cb: RawCommandBuffer, stages: ShaderStageFlags, offset: u32, data: Vec<u8> },
    BindVertexBuffer { cb: RawCommandBuffer, buffer: RawBuffer, offset: u64 },
    BindIndexBuffer { cb: RawCommandBuffer, buffer: RawBuffer, offset: u64 },
    Draw { cb: RawCommandBuffer, vertex_count: u32 },
    DrawIndexed { cb: RawCommandBuffer, index_count: u32 },
    CreateSemaphore(RawSemaphore),
    DestroySemaphore(RawSemaphore),
    CreateFence { fence: RawFence, signaled: bool },
    DestroyFence(RawFence),
    WaitFence(RawFence),
    ResetFence(RawFence),
    CreateDescriptorPool { pool: RawDescriptorPool, sizes: Vec<DescriptorPoolSize>, max_sets: u32 },
    DestroyDescriptorPool(RawDescriptorPool),
    CreateDescriptorSetLayout { layout: RawDescriptorSetLayout, bindings: Vec<DescriptorSetLayoutBinding> },
    DestroyDescriptorSetLayout(RawDescriptorSetLayout),
    AllocateDescriptorSets(Vec<RawDescriptorSet>),
    FreeDescriptorSets(Vec<RawDescriptorSet>),
    UpdateDescriptorSets(Vec<DescriptorWrite>),
    CreateShaderModule(ShaderStage),
    DestroyShaderModule(RawShaderModule),
    CreatePipelineLayout { layout: RawPipelineLayout, set_layouts: Vec<RawDescriptorSetLayout>, push_constants: Vec<PushConstantRange> },
    DestroyPipelineLayout(RawPipelineLayout),
    CreatePipeline { pipeline: RawPipeline, topology: PrimitiveTopology, polygon_mode: PolygonMode },
    DestroyPipeline(RawPipeline),
    CreateSampler { sampler: RawSampler, desc: SamplerDesc },
    DestroySampler(RawSampler),
}

struct MockBuffer {
    size: u64,
    properties: Option<MemoryProperty>,
    memory: Vec<u8>,
}

/// Recording mock device
pub(crate) struct MockDevice {
    pub capabilities: DeviceCapabilities,
    pub linear_blit: bool,
    pub surface_support: SurfaceSupport,
    /// The next `n` acquires report out-of-date
    pub out_of_date_acquires: u32,
    /// The next `n` presents report out-of-date
    pub out_of_date_presents: u32,
    pub calls: Vec<MockCall>,
    /// Waits issued on a fence that would never signal
    pub unsignaled_fence_waits: u32,
    next_handle: u64,
    fences: FxHashMap<RawFence, bool>,
    buffers: FxHashMap<RawBuffer, MockBuffer>,
    images: FxHashMap<RawImage, ImageCreateInfo>,
    swapchains: FxHashMap<RawSwapchain, (Vec<RawImage>, u32)>,
}

impl MockDevice {
    pub fn new() -> Self {
        let capabilities = DeviceCapabilities {
            device_name: "Mock GPU".to_string(),
            graphics_queue_family: 0,
            present_queue_family: 0,
            transfer_queue_family: 0,
            min_uniform_buffer_offset_alignment: 256,
            max_push_constants_size: 128,
            max_sampler_anisotropy: 16.0,
            memory_types: vec![
                MemoryType { property_flags: MemoryProperty::DEVICE_LOCAL, heap_index: 0 },
                MemoryType {
                    property_flags: MemoryProperty::HOST_VISIBLE | MemoryProperty::HOST_COHERENT,
                    heap_index: 1,
                },
                MemoryType {
                    property_flags: MemoryProperty::DEVICE_LOCAL
                        | MemoryProperty::HOST_VISIBLE
                        | MemoryProperty::HOST_COHERENT,
                    heap_index: 0,
                },
            ],
            supports_device_local_host_visible: true,
            support_flags: DeviceSupportFlags::NATIVE_DYNAMIC_STATE | DeviceSupportFlags::NATIVE_DYNAMIC_RENDERING,
            depth_format: Format::D32_SFLOAT_S8_UINT,
            depth_channel_count: 5,
        };
        let surface_support = SurfaceSupport {
            capabilities: SurfaceCapabilities {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: Extent2D { width: 800, height: 600 },
                min_image_extent: Extent2D { width: 1, height: 1 },
                max_image_extent: Extent2D { width: 4096, height: 4096 },
            },
            formats: vec![
                SurfaceFormat { format: Format::R8G8B8A8_UNORM, color_space: ColorSpace::SrgbNonlinear },
                SurfaceFormat { format: Format::B8G8R8A8_UNORM, color_space: ColorSpace::SrgbNonlinear },
            ],
            present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox, PresentMode::Immediate],
        };
        Self {
            capabilities,
            linear_blit: true,
            surface_support,
            out_of_date_acquires: 0,
            out_of_date_presents: 0,
            calls: Vec::new(),
            unsignaled_fence_waits: 0,
            next_handle: 1,
            fences: FxHashMap::default(),
            buffers: FxHashMap::default(),
            images: FxHashMap::default(),
            swapchains: FxHashMap::default(),
        }
    }

    /// Surface limits yielding `image_count` images (and `image_count - 1` frames in flight)
    pub fn with_image_count(mut self, image_count: u32) -> Self {
        self.surface_support.capabilities.min_image_count = image_count - 1;
        self.surface_support.capabilities.max_image_count = image_count;
        self
    }

    pub fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn fence_signaled(&self, fence: RawFence) -> bool {
        self.fences.get(&fence).copied().unwrap_or(false)
    }

    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn image_info(&self, image: RawImage) -> Option<ImageCreateInfo> {
        self.images.get(&image).copied()
    }

    /// Host memory of a buffer regardless of its memory type
    pub fn buffer_contents(&self, buffer: RawBuffer) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.memory.as_slice())
    }

    fn handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl GpuDevice for MockDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format_supports_linear_blit(&self, _format: Format) -> bool {
        self.linear_blit
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.calls.push(MockCall::WaitIdle);
        Ok(())
    }

    fn queue_wait_idle(&mut self) -> Result<()> {
        self.calls.push(MockCall::QueueWaitIdle);
        Ok(())
    }

    fn create_surface(&mut self, _source: &dyn SurfaceSource) -> Result<RawSurface> {
        let surface = RawSurface(self.handle());
        self.calls.push(MockCall::CreateSurface(surface));
        Ok(surface)
    }

    fn destroy_surface(&mut self, surface: RawSurface) {
        self.calls.push(MockCall::DestroySurface(surface));
    }

    fn query_surface_support(&self, _surface: RawSurface) -> Result<SurfaceSupport> {
        Ok(self.surface_support.clone())
    }

    fn create_swapchain(&mut self, info: &SwapchainCreateInfo) -> Result<RawSwapchain> {
        let swapchain = RawSwapchain(self.handle());
        let images = (0..info.min_image_count).map(|_| RawImage(self.handle())).collect();
        self.swapchains.insert(swapchain, (images, 0));
        self.calls.push(MockCall::CreateSwapchain { swapchain, info: *info });
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: RawSwapchain) -> Result<Vec<RawImage>> {
        self.swapchains
            .get(&swapchain)
            .map(|(images, _)| images.clone())
            .ok_or_else(|| Error::InvalidResource("unknown swapchain".to_string()))
    }

    fn destroy_swapchain(&mut self, swapchain: RawSwapchain) {
        self.swapchains.remove(&swapchain);
        self.calls.push(MockCall::DestroySwapchain(swapchain));
    }

    fn acquire_next_image(&mut self, swapchain: RawSwapchain, _timeout: u64, signal: RawSemaphore) -> Result<AcquireOutcome> {
        self.calls.push(MockCall::Acquire { swapchain, signal });
        if self.out_of_date_acquires > 0 {
            self.out_of_date_acquires -= 1;
            return Ok(AcquireOutcome::OutOfDate);
        }
        let (images, next) = self
            .swapchains
            .get_mut(&swapchain)
            .ok_or_else(|| Error::InvalidResource("unknown swapchain".to_string()))?;
        let image_index = *next;
        *next = (*next + 1) % images.len() as u32;
        Ok(AcquireOutcome::Acquired { image_index, suboptimal: false })
    }

    fn queue_present(&mut self, swapchain: RawSwapchain, image_index: u32, wait: RawSemaphore) -> Result<PresentOutcome> {
        self.calls.push(MockCall::Present { swapchain, image_index, wait });
        if self.out_of_date_presents > 0 {
            self.out_of_date_presents -= 1;
            return Ok(PresentOutcome::OutOfDate);
        }
        Ok(PresentOutcome::Presented)
    }

    fn create_image(&mut self, info: &ImageCreateInfo) -> Result<RawImage> {
        let image = RawImage(self.handle());
        self.images.insert(image, *info);
        self.calls.push(MockCall::CreateImage { image, info: *info });
        Ok(image)
    }

    fn image_memory_requirements(&self, image: RawImage) -> MemoryRequirements {
        let size = self
            .images
            .get(&image)
            .map(|info| {
                info.width as u64 * info.height as u64 * info.format.size_bytes().max(1) as u64 * info.layer_count.max(1) as u64
            })
            .unwrap_or(0);
        MemoryRequirements { size, alignment: 256, memory_type_bits: 0b111 }
    }

    fn allocate_image_memory(
        &mut self,
        image: RawImage,
        _requirements: &MemoryRequirements,
        memory_index: u32,
        properties: MemoryProperty,
        _name: &str,
    ) -> Result<()> {
        self.calls.push(MockCall::AllocateImageMemory { image, memory_index, properties });
        Ok(())
    }

    fn destroy_image(&mut self, image: RawImage) {
        self.images.remove(&image);
        self.calls.push(MockCall::DestroyImage(image));
    }

    fn create_image_view(&mut self, info: &ImageViewCreateInfo) -> Result<RawImageView> {
        let view = RawImageView(self.handle());
        self.calls.push(MockCall::CreateImageView { view, info: *info });
        Ok(view)
    }

    fn destroy_image_view(&mut self, view: RawImageView) {
        self.calls.push(MockCall::DestroyImageView(view));
    }

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<RawBuffer> {
        let buffer = RawBuffer(self.handle());
        self.buffers.insert(buffer, MockBuffer { size, properties: None, memory: Vec::new() });
        self.calls.push(MockCall::CreateBuffer { buffer, size, usage });
        Ok(buffer)
    }

    fn buffer_memory_requirements(&self, buffer: RawBuffer) -> MemoryRequirements {
        let size = self.buffers.get(&buffer).map(|b| b.size).unwrap_or(0);
        MemoryRequirements { size, alignment: 256, memory_type_bits: 0b111 }
    }

    fn allocate_buffer_memory(
        &mut self,
        buffer: RawBuffer,
        requirements: &MemoryRequirements,
        _memory_index: u32,
        properties: MemoryProperty,
        _name: &str,
    ) -> Result<()> {
        let entry = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| Error::InvalidResource("unknown buffer".to_string()))?;
        entry.properties = Some(properties);
        entry.memory = vec![0; requirements.size as usize];
        self.calls.push(MockCall::AllocateBufferMemory { buffer, properties });
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: RawBuffer) {
        self.buffers.remove(&buffer);
        self.calls.push(MockCall::DestroyBuffer(buffer));
    }

    fn mapped_memory(&mut self, buffer: RawBuffer) -> Result<&mut [u8]> {
        let entry = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| Error::InvalidResource("unknown buffer".to_string()))?;
        match entry.properties {
            Some(properties) if properties.contains(MemoryProperty::HOST_VISIBLE) => Ok(entry.memory.as_mut_slice()),
            _ => Err(Error::BackendError("buffer memory is not host-visible".to_string())),
        }
    }

    fn flush_memory(&mut self, buffer: RawBuffer, offset: u64, size: u64) -> Result<()> {
        self.calls.push(MockCall::FlushMemory { buffer, offset, size });
        Ok(())
    }

    fn allocate_command_buffers(&mut self, level: CommandBufferLevel, count: u32) -> Result<Vec<RawCommandBuffer>> {
        let buffers: Vec<RawCommandBuffer> = (0..count).map(|_| RawCommandBuffer(self.handle())).collect();
        self.calls.push(MockCall::AllocateCommandBuffers { level, buffers: buffers.clone() });
        Ok(buffers)
    }

    fn free_command_buffers(&mut self, command_buffers: &[RawCommandBuffer]) {
        self.calls.push(MockCall::FreeCommandBuffers(command_buffers.to_vec()));
    }

    fn begin_command_buffer(&mut self, command_buffer: RawCommandBuffer, level: CommandBufferLevel, _usage: CommandBufferUsage) -> Result<()> {
        self.calls.push(MockCall::BeginCommandBuffer(command_buffer, level));
        Ok(())
    }

    fn end_command_buffer(&mut self, command_buffer: RawCommandBuffer) -> Result<()> {
        self.calls.push(MockCall::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn reset_command_buffer(&mut self, command_buffer: RawCommandBuffer) -> Result<()> {
        self.calls.push(MockCall::ResetCommandBuffer(command_buffer));
        Ok(())
    }

    fn queue_submit(&mut self, submit: &SubmitInfo) -> Result<()> {
        // Work completes immediately
        if let Some(fence) = submit.fence {
            self.fences.insert(fence, true);
        }
        self.calls.push(MockCall::Submit(submit.clone()));
        Ok(())
    }

    fn cmd_pipeline_barrier(&mut self, cb: RawCommandBuffer, barrier: &PipelineBarrier) {
        self.calls.push(MockCall::Barrier(cb, barrier.clone()));
    }

    fn cmd_copy_buffer(&mut self, cb: RawCommandBuffer, src: RawBuffer, dst: RawBuffer, region: &BufferCopy) {
        // Copies execute eagerly so read-backs observe the data
        let data = self.buffers.get(&src).and_then(|b| {
            let start = region.src_offset as usize;
            b.memory.get(start..start + region.size as usize).map(|s| s.to_vec())
        });
        if let (Some(data), Some(target)) = (data, self.buffers.get_mut(&dst)) {
            let start = region.dst_offset as usize;
            if let Some(slice) = target.memory.get_mut(start..start + data.len()) {
                slice.copy_from_slice(&data);
            }
        }
        self.calls.push(MockCall::CopyBuffer { cb, src, dst, region: *region });
    }

    fn cmd_copy_buffer_to_image(&mut self, cb: RawCommandBuffer, src: RawBuffer, dst: RawImage, _dst_layout: ImageLayout, region: &BufferImageCopy) {
        self.calls.push(MockCall::CopyBufferToImage { cb, src, dst, region: *region });
    }

    fn cmd_copy_image_to_buffer(&mut self, cb: RawCommandBuffer, src: RawImage, _src_layout: ImageLayout, dst: RawBuffer, region: &BufferImageCopy) {
        self.calls.push(MockCall::CopyImageToBuffer { cb, src, dst, region: *region });
    }

    fn cmd_blit_image(
        &mut self,
        cb: RawCommandBuffer,
        src: RawImage,
        _src_layout: ImageLayout,
        dst: RawImage,
        _dst_layout: ImageLayout,
        region: &ImageBlit,
        _filter: Filter,
    ) {
        self.calls.push(MockCall::Blit { cb, src, dst, region: *region });
    }

    fn cmd_clear_color_image(&mut self, cb: RawCommandBuffer, image: RawImage, _layout: ImageLayout, color: [f32; 4], _range: &ImageSubresourceRange) {
        self.calls.push(MockCall::ClearColorImage { cb, image, color });
    }

    fn cmd_clear_depth_stencil_image(
        &mut self,
        cb: RawCommandBuffer,
        image: RawImage,
        _layout: ImageLayout,
        depth: f32,
        stencil: u32,
        _range: &ImageSubresourceRange,
    ) {
        self.calls.push(MockCall::ClearDepthStencilImage { cb, image, depth, stencil });
    }

    fn cmd_execute_commands(&mut self, cb: RawCommandBuffer, secondaries: &[RawCommandBuffer]) {
        self.calls.push(MockCall::ExecuteCommands { cb, secondaries: secondaries.to_vec() });
    }

    fn cmd_begin_rendering(&mut self, cb: RawCommandBuffer, info: &RenderingInfo) {
        self.calls.push(MockCall::BeginRendering(cb, info.clone()));
    }

    fn cmd_end_rendering(&mut self, cb: RawCommandBuffer) {
        self.calls.push(MockCall::EndRendering(cb));
    }

    fn cmd_set_viewport(&mut self, cb: RawCommandBuffer, viewport: &Viewport) {
        self.calls.push(MockCall::SetViewport(cb, *viewport));
    }

    fn cmd_set_scissor(&mut self, cb: RawCommandBuffer, scissor: &Rect2D) {
        self.calls.push(MockCall::SetScissor(cb, *scissor));
    }

    fn cmd_set_primitive_topology(&mut self, cb: RawCommandBuffer, topology: PrimitiveTopology) {
        self.calls.push(MockCall::SetTopology(cb, topology));
    }

    fn cmd_set_front_face(&mut self, cb: RawCommandBuffer, winding: Winding) {
        self.calls.push(MockCall::SetFrontFace(cb, winding));
    }

    fn cmd_set_depth_test_enable(&mut self, cb: RawCommandBuffer, _enabled: bool) {
        self.calls.push(MockCall::SetDynamicState(cb, DynamicState::DepthTestEnable));
    }

    fn cmd_set_depth_write_enable(&mut self, cb: RawCommandBuffer, _enabled: bool) {
        self.calls.push(MockCall::SetDynamicState(cb, DynamicState::DepthWriteEnable));
    }

    fn cmd_set_stencil_test_enable(&mut self, cb: RawCommandBuffer, _enabled: bool) {
        self.calls.push(MockCall::SetDynamicState(cb, DynamicState::StencilTestEnable));
    }

    fn cmd_set_stencil_op(&mut self, cb: RawCommandBuffer, _fail_op: StencilOp, _pass_op: StencilOp, _depth_fail_op: StencilOp, _compare_op: CompareOp) {
        self.calls.push(MockCall::SetDynamicState(cb, DynamicState::StencilOp));
    }

    fn cmd_set_stencil_reference(&mut self, cb: RawCommandBuffer, _reference: u32) {
        self.calls.push(MockCall::SetDynamicState(cb, DynamicState::StencilReference));
    }

    fn cmd_set_stencil_compare_mask(&mut self, cb: RawCommandBuffer, _mask: u32) {
        self.calls.push(MockCall::SetDynamicState(cb, DynamicState::StencilCompareMask));
    }

    fn cmd_set_stencil_write_mask(&mut self, cb: RawCommandBuffer, _mask: u32) {
        self.calls.push(MockCall::SetDynamicState(cb, DynamicState::StencilWriteMask));
    }

    fn cmd_bind_pipeline(&mut self, cb: RawCommandBuffer, pipeline: RawPipeline) {
        self.calls.push(MockCall::BindPipeline(cb, pipeline));
    }

    fn cmd_bind_descriptor_sets(&mut self, cb: RawCommandBuffer, layout: RawPipelineLayout, first_set: u32, sets: &[RawDescriptorSet]) {
        self.calls.push(MockCall::BindDescriptorSets { cb, layout, first_set, sets: sets.to_vec() });
    }

    fn cmd_push_constants(&mut self, cb: RawCommandBuffer, _layout: RawPipelineLayout, stages: ShaderStageFlags, offset: u32, data: &[u8]) {
        self.calls.push(MockCall::PushConstants { cb, stages, offset, data: data.to_vec() });
    }

    fn cmd_bind_vertex_buffer(&mut self, cb: RawCommandBuffer, buffer: RawBuffer, offset: u64) {
        self.calls.push(MockCall::BindVertexBuffer { cb, buffer, offset });
    }

    fn cmd_bind_index_buffer(&mut self, cb: RawCommandBuffer, buffer: RawBuffer, offset: u64, _index_type: IndexType) {
        self.calls.push(MockCall::BindIndexBuffer { cb, buffer, offset });
    }

    fn cmd_draw(&mut self, cb: RawCommandBuffer, vertex_count: u32, _instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.calls.push(MockCall::Draw { cb, vertex_count });
    }

    fn cmd_draw_indexed(&mut self, cb: RawCommandBuffer, index_count: u32, _instance_count: u32, _first_index: u32, _vertex_offset: i32, _first_instance: u32) {
        self.calls.push(MockCall::DrawIndexed { cb, index_count });
    }

    fn create_semaphore(&mut self) -> Result<RawSemaphore> {
        let semaphore = RawSemaphore(self.handle());
        self.calls.push(MockCall::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn destroy_semaphore(&mut self, semaphore: RawSemaphore) {
        self.calls.push(MockCall::DestroySemaphore(semaphore));
    }

    fn create_fence(&mut self, signaled: bool) -> Result<RawFence> {
        let fence = RawFence(self.handle());
        self.fences.insert(fence, signaled);
        self.calls.push(MockCall::CreateFence { fence, signaled });
        Ok(fence)
    }

    fn destroy_fence(&mut self, fence: RawFence) {
        self.fences.remove(&fence);
        self.calls.push(MockCall::DestroyFence(fence));
    }

    fn wait_for_fence(&mut self, fence: RawFence, _timeout: u64) -> Result<bool> {
        if !self.fence_signaled(fence) {
            self.unsignaled_fence_waits += 1;
        }
        self.calls.push(MockCall::WaitFence(fence));
        Ok(true)
    }

    fn reset_fence(&mut self, fence: RawFence) -> Result<()> {
        self.fences.insert(fence, false);
        self.calls.push(MockCall::ResetFence(fence));
        Ok(())
    }

    fn create_descriptor_pool(&mut self, sizes: &[DescriptorPoolSize], max_sets: u32) -> Result<RawDescriptorPool> {
        let pool = RawDescriptorPool(self.handle());
        self.calls.push(MockCall::CreateDescriptorPool { pool, sizes: sizes.to_vec(), max_sets });
        Ok(pool)
    }

    fn destroy_descriptor_pool(&mut self, pool: RawDescriptorPool) {
        self.calls.push(MockCall::DestroyDescriptorPool(pool));
    }

    fn create_descriptor_set_layout(&mut self, bindings: &[DescriptorSetLayoutBinding]) -> Result<RawDescriptorSetLayout> {
        let layout = RawDescriptorSetLayout(self.handle());
        self.calls.push(MockCall::CreateDescriptorSetLayout { layout, bindings: bindings.to_vec() });
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&mut self, layout: RawDescriptorSetLayout) {
        self.calls.push(MockCall::DestroyDescriptorSetLayout(layout));
    }

    fn allocate_descriptor_sets(&mut self, _pool: RawDescriptorPool, layouts: &[RawDescriptorSetLayout]) -> Result<Vec<RawDescriptorSet>> {
        let sets: Vec<RawDescriptorSet> = layouts.iter().map(|_| RawDescriptorSet(self.handle())).collect();
        self.calls.push(MockCall::AllocateDescriptorSets(sets.clone()));
        Ok(sets)
    }

    fn free_descriptor_sets(&mut self, _pool: RawDescriptorPool, sets: &[RawDescriptorSet]) -> Result<()> {
        self.calls.push(MockCall::FreeDescriptorSets(sets.to_vec()));
        Ok(())
    }

    fn update_descriptor_sets(&mut self, writes: &[DescriptorWrite]) {
        self.calls.push(MockCall::UpdateDescriptorSets(writes.to_vec()));
    }

    fn create_shader_module(&mut self, stage: ShaderStage, spirv: &[u8]) -> Result<RawShaderModule> {
        if spirv.is_empty() || spirv.len() % 4 != 0 {
            return Err(Error::BackendError("SPIR-V size must be a non-zero multiple of 4".to_string()));
        }
        self.calls.push(MockCall::CreateShaderModule(stage));
        Ok(RawShaderModule(self.handle()))
    }

    fn destroy_shader_module(&mut self, module: RawShaderModule) {
        self.calls.push(MockCall::DestroyShaderModule(module));
    }

    fn create_pipeline_layout(&mut self, set_layouts: &[RawDescriptorSetLayout], push_constants: &[PushConstantRange]) -> Result<RawPipelineLayout> {
        let layout = RawPipelineLayout(self.handle());
        self.calls.push(MockCall::CreatePipelineLayout {
            layout,
            set_layouts: set_layouts.to_vec(),
            push_constants: push_constants.to_vec(),
        });
        Ok(layout)
    }

    fn destroy_pipeline_layout(&mut self, layout: RawPipelineLayout) {
        self.calls.push(MockCall::DestroyPipelineLayout(layout));
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<RawPipeline> {
        let pipeline = RawPipeline(self.handle());
        self.calls.push(MockCall::CreatePipeline { pipeline, topology: desc.topology, polygon_mode: desc.polygon_mode });
        Ok(pipeline)
    }

    fn destroy_pipeline(&mut self, pipeline: RawPipeline) {
        self.calls.push(MockCall::DestroyPipeline(pipeline));
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<RawSampler> {
        let sampler = RawSampler(self.handle());
        self.calls.push(MockCall::CreateSampler { sampler, desc: *desc });
        Ok(sampler)
    }

    fn destroy_sampler(&mut self, sampler: RawSampler) {
        self.calls.push(MockCall::DestroySampler(sampler));
    }
}

/// Window stand-in for surface creation
pub(crate) struct MockWindow;

impl HasWindowHandle for MockWindow {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        let raw = RawWindowHandle::Web(WebWindowHandle::new(1));
        // SAFETY: web handles carry no pointers
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl HasDisplayHandle for MockWindow {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        let raw = RawDisplayHandle::Web(WebDisplayHandle::new());
        // SAFETY: web handles carry no pointers
        Ok(unsafe { DisplayHandle::borrow_raw(raw) })
    }
}
