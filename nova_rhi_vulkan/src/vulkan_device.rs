//! VulkanDevice - `GpuDevice` implemented on `ash`
//!
//! Raw handles carry the native 64-bit Vulkan handles, so every call converts
//! them in place without a lookup. The only side tables are the allocations
//! `gpu-allocator` handed out for images and buffers.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::AllocationError;
use nova_rhi::device::*;
use nova_rhi::nova::{Error, RendererConfig, Result};
use nova_rhi::{engine_bail, engine_err, engine_error, engine_info, engine_warn};
use raw_window_handle::HandleError;
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::sync::MutexGuard;

use crate::vulkan_context::{DynamicRenderingFns, DynamicStateFns, VulkanContext};
use crate::vulkan_convert::*;
use crate::vulkan_reflect::{decode_spirv, reflect_module, validate_module};

const SOURCE: &str = "nova::vulkan::Device";

const ENTRY_POINT_NAME: &CStr = c"main";

/// Memory bound to an image, if any
struct ImageRecord {
    linear: bool,
    allocation: Option<Allocation>,
}

/// Vulkan implementation of the explicit device API
pub struct VulkanDevice {
    context: VulkanContext,
    images: FxHashMap<RawImage, ImageRecord>,
    buffers: FxHashMap<RawBuffer, Option<Allocation>>,
}

/// Map a failed Vulkan call to an engine error, logging it
fn vk_error(what: &'static str) -> impl Fn(vk::Result) -> Error {
    move |result| match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        | vk::Result::ERROR_OUT_OF_POOL_MEMORY => {
            engine_error!(SOURCE, "{}: {:?}", what, result);
            Error::OutOfMemory
        }
        _ => engine_err!(SOURCE, "{}: {:?}", what, result),
    }
}

/// Map a failed allocation to an engine error, logging it
fn allocation_error(name: &str, size: u64, error: AllocationError) -> Error {
    let size_mb = size as f64 / (1024.0 * 1024.0);
    match error {
        AllocationError::OutOfMemory | AllocationError::NoCompatibleMemoryTypeFound => {
            engine_error!(SOURCE, "Out of GPU memory for '{}' ({:.2} MB): {:?}", name, size_mb, error);
            Error::OutOfMemory
        }
        other => engine_err!(SOURCE, "Failed to allocate '{}' ({:.2} MB): {:?}", name, size_mb, other),
    }
}

fn handle_error(error: HandleError) -> Error {
    engine_err!(SOURCE, "Window handle unavailable: {:?}", error)
}

/// Flushable range around `[offset, offset + size)` of an allocation at
/// `allocation_offset` in its memory block, widened to `atom` boundaries
pub(crate) fn flush_range(allocation_offset: u64, offset: u64, size: u64, atom: u64) -> (u64, u64) {
    let atom = atom.max(1);
    let start = allocation_offset + offset;
    let aligned_start = start / atom * atom;
    let aligned_end = (start + size).div_ceil(atom) * atom;
    (aligned_start, aligned_end - aligned_start)
}

fn buffer_image_copy_to_vk(region: &BufferImageCopy) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: region.buffer_offset,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: subresource_layers_to_vk(&region.subresource),
        image_offset: vk::Offset3D { x: region.x, y: region.y, z: 0 },
        image_extent: vk::Extent3D { width: region.width, height: region.height, depth: 1 },
    }
}

fn attachment_to_vk(attachment: &RenderingAttachment) -> vk::RenderingAttachmentInfo<'static> {
    vk::RenderingAttachmentInfo::default()
        .image_view(attachment.view.vk())
        .image_layout(image_layout_to_vk(attachment.layout))
        .load_op(load_op_to_vk(attachment.load_op))
        .store_op(store_op_to_vk(attachment.store_op))
        .clear_value(clear_value_to_vk(attachment.clear_value))
}

/// Call an extended dynamic state command through whichever tier the device has
macro_rules! dynamic_state_call {
    ($self:ident, $method:ident($($arg:expr),*)) => {
        match &$self.context.dynamic_state {
            DynamicStateFns::Core => unsafe { $self.context.device.$method($($arg),*) },
            DynamicStateFns::Extension(fns) => unsafe { fns.$method($($arg),*) },
            DynamicStateFns::Unsupported => {}
        }
    };
}

impl VulkanDevice {
    /// Create the instance and device described by `config`
    pub fn new(config: &RendererConfig) -> Result<Self> {
        let context = VulkanContext::new(config)?;
        Ok(Self {
            context,
            images: FxHashMap::default(),
            buffers: FxHashMap::default(),
        })
    }

    fn allocator(&self) -> Result<MutexGuard<'_, Allocator>> {
        self.context
            .allocator
            .lock()
            .map_err(|_| engine_err!(SOURCE, "GPU allocator lock poisoned"))
    }

    fn allocate(
        &self,
        name: &str,
        requirements: &MemoryRequirements,
        memory_index: u32,
        properties: MemoryProperty,
        linear: bool,
    ) -> Result<Allocation> {
        let desc = AllocationCreateDesc {
            name,
            requirements: vk::MemoryRequirements {
                size: requirements.size,
                alignment: requirements.alignment,
                memory_type_bits: 1 << memory_index,
            },
            location: memory_location(properties),
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        };
        self.allocator()?
            .allocate(&desc)
            .map_err(|e| allocation_error(name, requirements.size, e))
    }

    fn free_allocation(&self, allocation: Allocation) {
        match self.allocator() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    engine_warn!(SOURCE, "Failed to free GPU allocation: {:?}", e);
                }
            }
            Err(_) => engine_warn!(SOURCE, "GPU allocation leaked, allocator unavailable"),
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.context.device.device_wait_idle().ok();
        }
        let images: Vec<(RawImage, ImageRecord)> = self.images.drain().collect();
        if !images.is_empty() {
            engine_warn!(SOURCE, "{} image(s) still alive at shutdown", images.len());
        }
        for (image, record) in images {
            unsafe { self.context.device.destroy_image(image.vk(), None) };
            if let Some(allocation) = record.allocation {
                self.free_allocation(allocation);
            }
        }
        let buffers: Vec<(RawBuffer, Option<Allocation>)> = self.buffers.drain().collect();
        if !buffers.is_empty() {
            engine_warn!(SOURCE, "{} buffer(s) still alive at shutdown", buffers.len());
        }
        for (buffer, allocation) in buffers {
            unsafe { self.context.device.destroy_buffer(buffer.vk(), None) };
            if let Some(allocation) = allocation {
                self.free_allocation(allocation);
            }
        }
    }
}

impl GpuDevice for VulkanDevice {
    // ===== DEVICE =====

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.context.capabilities
    }

    fn format_supports_linear_blit(&self, format: Format) -> bool {
        let properties = unsafe {
            self.context
                .instance
                .get_physical_device_format_properties(self.context.physical_device, format_to_vk(format))
        };
        properties.optimal_tiling_features.contains(
            vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
                | vk::FormatFeatureFlags::BLIT_SRC
                | vk::FormatFeatureFlags::BLIT_DST,
        )
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.context.device.device_wait_idle() }.map_err(vk_error("Failed to wait for device idle"))
    }

    fn queue_wait_idle(&mut self) -> Result<()> {
        unsafe { self.context.device.queue_wait_idle(self.context.graphics_queue) }
            .map_err(vk_error("Failed to wait for queue idle"))
    }

    // ===== SURFACE & SWAPCHAIN =====

    fn create_surface(&mut self, source: &dyn SurfaceSource) -> Result<RawSurface> {
        let display_handle = source.display_handle().map_err(handle_error)?.as_raw();
        let window_handle = source.window_handle().map_err(handle_error)?.as_raw();

        let surface = unsafe {
            ash_window::create_surface(
                &self.context.entry,
                &self.context.instance,
                display_handle,
                window_handle,
                None,
            )
        }
        .map_err(vk_error("Failed to create window surface"))?;

        let family = self.context.capabilities.present_queue_family;
        let supported = unsafe {
            self.context
                .surface_loader
                .get_physical_device_surface_support(self.context.physical_device, family, surface)
        }
        .unwrap_or(false);
        if !supported {
            unsafe { self.context.surface_loader.destroy_surface(surface, None) };
            return Err(Error::InitializationFailed(format!(
                "Queue family {} cannot present to this surface",
                family
            )));
        }

        Ok(RawSurface(raw(surface)))
    }

    fn destroy_surface(&mut self, surface: RawSurface) {
        unsafe { self.context.surface_loader.destroy_surface(surface.vk(), None) };
    }

    fn query_surface_support(&self, surface: RawSurface) -> Result<SurfaceSupport> {
        let loader = &self.context.surface_loader;
        let physical_device = self.context.physical_device;
        unsafe {
            let caps = loader
                .get_physical_device_surface_capabilities(physical_device, surface.vk())
                .map_err(vk_error("Failed to query surface capabilities"))?;
            let formats = loader
                .get_physical_device_surface_formats(physical_device, surface.vk())
                .map_err(vk_error("Failed to query surface formats"))?;
            let present_modes = loader
                .get_physical_device_surface_present_modes(physical_device, surface.vk())
                .map_err(vk_error("Failed to query surface present modes"))?;

            Ok(SurfaceSupport {
                capabilities: SurfaceCapabilities {
                    min_image_count: caps.min_image_count,
                    max_image_count: caps.max_image_count,
                    current_extent: extent_from_vk(caps.current_extent),
                    min_image_extent: extent_from_vk(caps.min_image_extent),
                    max_image_extent: extent_from_vk(caps.max_image_extent),
                },
                formats: formats
                    .iter()
                    .filter_map(|format| {
                        surface_format_from_vk(format.format).map(|engine_format| SurfaceFormat {
                            format: engine_format,
                            color_space: color_space_from_vk(format.color_space),
                        })
                    })
                    .collect(),
                present_modes: present_modes.into_iter().filter_map(present_mode_from_vk).collect(),
            })
        }
    }

    fn create_swapchain(&mut self, info: &SwapchainCreateInfo) -> Result<RawSwapchain> {
        let caps = unsafe {
            self.context
                .surface_loader
                .get_physical_device_surface_capabilities(self.context.physical_device, info.surface.vk())
        }
        .map_err(vk_error("Failed to query surface capabilities"))?;

        let [graphics, present] = info.queue_families;
        let families = [graphics, present];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(info.surface.vk())
            .min_image_count(info.min_image_count)
            .image_format(format_to_vk(info.surface_format.format))
            .image_color_space(color_space_to_vk(info.surface_format.color_space))
            .image_extent(extent_to_vk(info.extent))
            .image_array_layers(1)
            .image_usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::TRANSFER_SRC,
            )
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode_to_vk(info.present_mode))
            .clipped(true)
            .old_swapchain(info.old_swapchain.vk());
        create_info = if graphics != present {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = unsafe { self.context.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(vk_error("Failed to create swapchain"))?;
        engine_info!(
            SOURCE,
            "Swapchain created ({}x{}, {:?}, {:?})",
            info.extent.width,
            info.extent.height,
            info.surface_format.format,
            info.present_mode
        );
        Ok(RawSwapchain(raw(swapchain)))
    }

    fn swapchain_images(&self, swapchain: RawSwapchain) -> Result<Vec<RawImage>> {
        let images = unsafe { self.context.swapchain_loader.get_swapchain_images(swapchain.vk()) }
            .map_err(vk_error("Failed to get swapchain images"))?;
        Ok(images.into_iter().map(|image| RawImage(raw(image))).collect())
    }

    fn destroy_swapchain(&mut self, swapchain: RawSwapchain) {
        unsafe { self.context.swapchain_loader.destroy_swapchain(swapchain.vk(), None) };
    }

    fn acquire_next_image(
        &mut self,
        swapchain: RawSwapchain,
        timeout: u64,
        signal: RawSemaphore,
    ) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.context
                .swapchain_loader
                .acquire_next_image(swapchain.vk(), timeout, signal.vk(), vk::Fence::null())
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(vk_error("Failed to acquire swapchain image")(e)),
        }
    }

    fn queue_present(
        &mut self,
        swapchain: RawSwapchain,
        image_index: u32,
        wait: RawSemaphore,
    ) -> Result<PresentOutcome> {
        let wait_semaphores = [wait.vk()];
        let swapchains = [swapchain.vk()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.context
                .swapchain_loader
                .queue_present(self.context.graphics_queue, &present_info)
        };
        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(vk_error("Failed to present swapchain image")(e)),
        }
    }

    // ===== IMAGES =====

    fn create_image(&mut self, info: &ImageCreateInfo) -> Result<RawImage> {
        let flags = if info.texture_type.is_cube() {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let create_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(format_to_vk(info.format))
            .extent(vk::Extent3D { width: info.width, height: info.height, depth: 1 })
            .mip_levels(info.mip_levels)
            .array_layers(info.layer_count)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(tiling_to_vk(info.tiling))
            .usage(image_usage_to_vk(info.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.context.device.create_image(&create_info, None) }
            .map_err(vk_error("Failed to create image"))?;
        let handle = RawImage(raw(image));
        self.images.insert(
            handle,
            ImageRecord {
                linear: info.tiling == ImageTiling::Linear,
                allocation: None,
            },
        );
        Ok(handle)
    }

    fn image_memory_requirements(&self, image: RawImage) -> MemoryRequirements {
        memory_requirements_from_vk(unsafe { self.context.device.get_image_memory_requirements(image.vk()) })
    }

    fn allocate_image_memory(
        &mut self,
        image: RawImage,
        requirements: &MemoryRequirements,
        memory_index: u32,
        properties: MemoryProperty,
        name: &str,
    ) -> Result<()> {
        let linear = match self.images.get(&image) {
            Some(ImageRecord { allocation: Some(_), .. }) => {
                engine_bail!(SOURCE, "Image '{}' already has memory bound", name)
            }
            Some(record) => record.linear,
            None => return Err(Error::InvalidResource(format!("Unknown image '{}'", name))),
        };

        let allocation = self.allocate(name, requirements, memory_index, properties, linear)?;
        let bound = unsafe {
            self.context
                .device
                .bind_image_memory(image.vk(), allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.free_allocation(allocation);
            return Err(vk_error("Failed to bind image memory")(e));
        }

        if let Some(record) = self.images.get_mut(&image) {
            record.allocation = Some(allocation);
        }
        Ok(())
    }

    fn destroy_image(&mut self, image: RawImage) {
        unsafe { self.context.device.destroy_image(image.vk(), None) };
        if let Some(ImageRecord { allocation: Some(allocation), .. }) = self.images.remove(&image) {
            self.free_allocation(allocation);
        }
    }

    fn create_image_view(&mut self, info: &ImageViewCreateInfo) -> Result<RawImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(info.image.vk())
            .view_type(view_type_to_vk(info.view_type))
            .format(format_to_vk(info.format))
            .components(vk::ComponentMapping::default())
            .subresource_range(subresource_range_to_vk(&info.range));
        let view = unsafe { self.context.device.create_image_view(&create_info, None) }
            .map_err(vk_error("Failed to create image view"))?;
        Ok(RawImageView(raw(view)))
    }

    fn destroy_image_view(&mut self, view: RawImageView) {
        unsafe { self.context.device.destroy_image_view(view.vk(), None) };
    }

    // ===== BUFFERS =====

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<RawBuffer> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(buffer_usage_to_vk(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.context.device.create_buffer(&create_info, None) }
            .map_err(vk_error("Failed to create buffer"))?;
        let handle = RawBuffer(raw(buffer));
        self.buffers.insert(handle, None);
        Ok(handle)
    }

    fn buffer_memory_requirements(&self, buffer: RawBuffer) -> MemoryRequirements {
        memory_requirements_from_vk(unsafe { self.context.device.get_buffer_memory_requirements(buffer.vk()) })
    }

    fn allocate_buffer_memory(
        &mut self,
        buffer: RawBuffer,
        requirements: &MemoryRequirements,
        memory_index: u32,
        properties: MemoryProperty,
        name: &str,
    ) -> Result<()> {
        match self.buffers.get(&buffer) {
            Some(Some(_)) => engine_bail!(SOURCE, "Buffer '{}' already has memory bound", name),
            Some(None) => {}
            None => return Err(Error::InvalidResource(format!("Unknown buffer '{}'", name))),
        }

        let allocation = self.allocate(name, requirements, memory_index, properties, true)?;
        let bound = unsafe {
            self.context
                .device
                .bind_buffer_memory(buffer.vk(), allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.free_allocation(allocation);
            return Err(vk_error("Failed to bind buffer memory")(e));
        }

        self.buffers.insert(buffer, Some(allocation));
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: RawBuffer) {
        unsafe { self.context.device.destroy_buffer(buffer.vk(), None) };
        if let Some(Some(allocation)) = self.buffers.remove(&buffer) {
            self.free_allocation(allocation);
        }
    }

    fn mapped_memory(&mut self, buffer: RawBuffer) -> Result<&mut [u8]> {
        match self.buffers.get_mut(&buffer) {
            Some(Some(allocation)) => allocation
                .mapped_slice_mut()
                .ok_or_else(|| engine_err!(SOURCE, "Buffer memory is not host visible")),
            Some(None) => engine_bail!(SOURCE, "Buffer has no memory bound"),
            None => Err(Error::InvalidResource("Unknown buffer".to_string())),
        }
    }

    fn flush_memory(&mut self, buffer: RawBuffer, offset: u64, size: u64) -> Result<()> {
        let allocation = match self.buffers.get(&buffer) {
            Some(Some(allocation)) => allocation,
            Some(None) => engine_bail!(SOURCE, "Buffer has no memory bound"),
            None => return Err(Error::InvalidResource("Unknown buffer".to_string())),
        };
        if allocation.memory_properties().contains(vk::MemoryPropertyFlags::HOST_COHERENT) {
            return Ok(());
        }

        let (range_offset, range_size) =
            flush_range(allocation.offset(), offset, size, self.context.non_coherent_atom_size);
        let range = vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(range_offset)
            .size(range_size);
        unsafe { self.context.device.flush_mapped_memory_ranges(&[range]) }
            .map_err(vk_error("Failed to flush mapped memory"))
    }

    // ===== COMMAND BUFFERS =====

    fn allocate_command_buffers(
        &mut self,
        level: CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<RawCommandBuffer>> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.context.command_pool)
            .level(command_buffer_level_to_vk(level))
            .command_buffer_count(count);
        let command_buffers = unsafe { self.context.device.allocate_command_buffers(&allocate_info) }
            .map_err(vk_error("Failed to allocate command buffers"))?;
        Ok(command_buffers.into_iter().map(|cb| RawCommandBuffer(raw(cb))).collect())
    }

    fn free_command_buffers(&mut self, command_buffers: &[RawCommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        let native: Vec<vk::CommandBuffer> = command_buffers.iter().map(|cb| cb.vk()).collect();
        unsafe { self.context.device.free_command_buffers(self.context.command_pool, &native) };
    }

    fn begin_command_buffer(
        &mut self,
        command_buffer: RawCommandBuffer,
        level: CommandBufferLevel,
        usage: CommandBufferUsage,
    ) -> Result<()> {
        // Secondaries record their own rendering pass, so nothing is inherited
        let inheritance = vk::CommandBufferInheritanceInfo::default();
        let mut begin_info = vk::CommandBufferBeginInfo::default().flags(command_buffer_usage_to_vk(usage));
        if level == CommandBufferLevel::Secondary {
            begin_info = begin_info.inheritance_info(&inheritance);
        }
        unsafe { self.context.device.begin_command_buffer(command_buffer.vk(), &begin_info) }
            .map_err(vk_error("Failed to begin command buffer"))
    }

    fn end_command_buffer(&mut self, command_buffer: RawCommandBuffer) -> Result<()> {
        unsafe { self.context.device.end_command_buffer(command_buffer.vk()) }
            .map_err(vk_error("Failed to end command buffer"))
    }

    fn reset_command_buffer(&mut self, command_buffer: RawCommandBuffer) -> Result<()> {
        unsafe {
            self.context
                .device
                .reset_command_buffer(command_buffer.vk(), vk::CommandBufferResetFlags::empty())
        }
        .map_err(vk_error("Failed to reset command buffer"))
    }

    fn queue_submit(&mut self, submit: &SubmitInfo) -> Result<()> {
        let command_buffers: Vec<vk::CommandBuffer> = submit.command_buffers.iter().map(|cb| cb.vk()).collect();
        let (wait_semaphores, wait_stages): (Vec<vk::Semaphore>, Vec<vk::PipelineStageFlags>) = submit
            .wait
            .iter()
            .map(|(semaphore, stage)| (semaphore.vk(), pipeline_stage_to_vk(*stage)))
            .unzip();
        let signal_semaphores: Vec<vk::Semaphore> = submit.signal.iter().map(|semaphore| semaphore.vk()).collect();

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);
        let fence = submit.fence.map(|fence| fence.vk()).unwrap_or_else(vk::Fence::null);

        unsafe {
            self.context
                .device
                .queue_submit(self.context.graphics_queue, &[submit_info], fence)
        }
        .map_err(vk_error("Failed to submit to graphics queue"))
    }

    // ===== COMMANDS =====

    fn cmd_pipeline_barrier(&mut self, cb: RawCommandBuffer, barrier: &PipelineBarrier) {
        let memory_barriers: Vec<vk::MemoryBarrier> = barrier
            .memory_barriers
            .iter()
            .map(|b| {
                vk::MemoryBarrier::default()
                    .src_access_mask(access_to_vk(b.src_access))
                    .dst_access_mask(access_to_vk(b.dst_access))
            })
            .collect();
        let buffer_barriers: Vec<vk::BufferMemoryBarrier> = barrier
            .buffer_barriers
            .iter()
            .map(|b| {
                vk::BufferMemoryBarrier::default()
                    .src_access_mask(access_to_vk(b.src_access))
                    .dst_access_mask(access_to_vk(b.dst_access))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(b.buffer.vk())
                    .offset(b.offset)
                    .size(b.size)
            })
            .collect();
        let image_barriers: Vec<vk::ImageMemoryBarrier> = barrier
            .image_barriers
            .iter()
            .map(|b| {
                vk::ImageMemoryBarrier::default()
                    .src_access_mask(access_to_vk(b.src_access))
                    .dst_access_mask(access_to_vk(b.dst_access))
                    .old_layout(image_layout_to_vk(b.old_layout))
                    .new_layout(image_layout_to_vk(b.new_layout))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(b.image.vk())
                    .subresource_range(subresource_range_to_vk(&b.range))
            })
            .collect();

        unsafe {
            self.context.device.cmd_pipeline_barrier(
                cb.vk(),
                pipeline_stage_to_vk(barrier.src_stage),
                pipeline_stage_to_vk(barrier.dst_stage),
                vk::DependencyFlags::empty(),
                &memory_barriers,
                &buffer_barriers,
                &image_barriers,
            );
        }
    }

    fn cmd_copy_buffer(&mut self, cb: RawCommandBuffer, src: RawBuffer, dst: RawBuffer, region: &BufferCopy) {
        let copy = vk::BufferCopy {
            src_offset: region.src_offset,
            dst_offset: region.dst_offset,
            size: region.size,
        };
        unsafe { self.context.device.cmd_copy_buffer(cb.vk(), src.vk(), dst.vk(), &[copy]) };
    }

    fn cmd_copy_buffer_to_image(
        &mut self,
        cb: RawCommandBuffer,
        src: RawBuffer,
        dst: RawImage,
        dst_layout: ImageLayout,
        region: &BufferImageCopy,
    ) {
        unsafe {
            self.context.device.cmd_copy_buffer_to_image(
                cb.vk(),
                src.vk(),
                dst.vk(),
                image_layout_to_vk(dst_layout),
                &[buffer_image_copy_to_vk(region)],
            );
        }
    }

    fn cmd_copy_image_to_buffer(
        &mut self,
        cb: RawCommandBuffer,
        src: RawImage,
        src_layout: ImageLayout,
        dst: RawBuffer,
        region: &BufferImageCopy,
    ) {
        unsafe {
            self.context.device.cmd_copy_image_to_buffer(
                cb.vk(),
                src.vk(),
                image_layout_to_vk(src_layout),
                dst.vk(),
                &[buffer_image_copy_to_vk(region)],
            );
        }
    }

    fn cmd_blit_image(
        &mut self,
        cb: RawCommandBuffer,
        src: RawImage,
        src_layout: ImageLayout,
        dst: RawImage,
        dst_layout: ImageLayout,
        region: &ImageBlit,
        filter: Filter,
    ) {
        let blit = vk::ImageBlit {
            src_subresource: subresource_layers_to_vk(&region.src_subresource),
            src_offsets: offsets_to_vk(&region.src_offsets),
            dst_subresource: subresource_layers_to_vk(&region.dst_subresource),
            dst_offsets: offsets_to_vk(&region.dst_offsets),
        };
        unsafe {
            self.context.device.cmd_blit_image(
                cb.vk(),
                src.vk(),
                image_layout_to_vk(src_layout),
                dst.vk(),
                image_layout_to_vk(dst_layout),
                &[blit],
                filter_to_vk(filter),
            );
        }
    }

    fn cmd_clear_color_image(
        &mut self,
        cb: RawCommandBuffer,
        image: RawImage,
        layout: ImageLayout,
        color: [f32; 4],
        range: &ImageSubresourceRange,
    ) {
        let value = vk::ClearColorValue { float32: color };
        unsafe {
            self.context.device.cmd_clear_color_image(
                cb.vk(),
                image.vk(),
                image_layout_to_vk(layout),
                &value,
                &[subresource_range_to_vk(range)],
            );
        }
    }

    fn cmd_clear_depth_stencil_image(
        &mut self,
        cb: RawCommandBuffer,
        image: RawImage,
        layout: ImageLayout,
        depth: f32,
        stencil: u32,
        range: &ImageSubresourceRange,
    ) {
        let value = vk::ClearDepthStencilValue { depth, stencil };
        unsafe {
            self.context.device.cmd_clear_depth_stencil_image(
                cb.vk(),
                image.vk(),
                image_layout_to_vk(layout),
                &value,
                &[subresource_range_to_vk(range)],
            );
        }
    }

    fn cmd_execute_commands(&mut self, cb: RawCommandBuffer, secondaries: &[RawCommandBuffer]) {
        if secondaries.is_empty() {
            return;
        }
        let native: Vec<vk::CommandBuffer> = secondaries.iter().map(|secondary| secondary.vk()).collect();
        unsafe { self.context.device.cmd_execute_commands(cb.vk(), &native) };
    }

    fn cmd_begin_rendering(&mut self, cb: RawCommandBuffer, info: &RenderingInfo) {
        let color_attachments: Vec<vk::RenderingAttachmentInfo> =
            info.color_attachments.iter().map(attachment_to_vk).collect();
        let depth_attachment = info.depth_attachment.as_ref().map(attachment_to_vk);
        let stencil_attachment = info.stencil_attachment.as_ref().map(attachment_to_vk);

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(rect_to_vk(&info.render_area))
            .layer_count(info.layer_count)
            .color_attachments(&color_attachments);
        if let Some(depth) = &depth_attachment {
            rendering_info = rendering_info.depth_attachment(depth);
        }
        if let Some(stencil) = &stencil_attachment {
            rendering_info = rendering_info.stencil_attachment(stencil);
        }

        match &self.context.dynamic_rendering {
            DynamicRenderingFns::Core => unsafe { self.context.device.cmd_begin_rendering(cb.vk(), &rendering_info) },
            DynamicRenderingFns::Extension(fns) => unsafe { fns.cmd_begin_rendering(cb.vk(), &rendering_info) },
        }
    }

    fn cmd_end_rendering(&mut self, cb: RawCommandBuffer) {
        match &self.context.dynamic_rendering {
            DynamicRenderingFns::Core => unsafe { self.context.device.cmd_end_rendering(cb.vk()) },
            DynamicRenderingFns::Extension(fns) => unsafe { fns.cmd_end_rendering(cb.vk()) },
        }
    }

    fn cmd_set_viewport(&mut self, cb: RawCommandBuffer, viewport: &Viewport) {
        unsafe { self.context.device.cmd_set_viewport(cb.vk(), 0, &[viewport_to_vk(viewport)]) };
    }

    fn cmd_set_scissor(&mut self, cb: RawCommandBuffer, scissor: &Rect2D) {
        unsafe { self.context.device.cmd_set_scissor(cb.vk(), 0, &[rect_to_vk(scissor)]) };
    }

    fn cmd_set_primitive_topology(&mut self, cb: RawCommandBuffer, topology: PrimitiveTopology) {
        dynamic_state_call!(self, cmd_set_primitive_topology(cb.vk(), topology_to_vk(topology)));
    }

    fn cmd_set_front_face(&mut self, cb: RawCommandBuffer, winding: Winding) {
        dynamic_state_call!(self, cmd_set_front_face(cb.vk(), winding_to_vk(winding)));
    }

    fn cmd_set_depth_test_enable(&mut self, cb: RawCommandBuffer, enabled: bool) {
        dynamic_state_call!(self, cmd_set_depth_test_enable(cb.vk(), enabled));
    }

    fn cmd_set_depth_write_enable(&mut self, cb: RawCommandBuffer, enabled: bool) {
        dynamic_state_call!(self, cmd_set_depth_write_enable(cb.vk(), enabled));
    }

    fn cmd_set_stencil_test_enable(&mut self, cb: RawCommandBuffer, enabled: bool) {
        dynamic_state_call!(self, cmd_set_stencil_test_enable(cb.vk(), enabled));
    }

    fn cmd_set_stencil_op(
        &mut self,
        cb: RawCommandBuffer,
        fail_op: StencilOp,
        pass_op: StencilOp,
        depth_fail_op: StencilOp,
        compare_op: CompareOp,
    ) {
        dynamic_state_call!(
            self,
            cmd_set_stencil_op(
                cb.vk(),
                vk::StencilFaceFlags::FRONT_AND_BACK,
                stencil_op_to_vk(fail_op),
                stencil_op_to_vk(pass_op),
                stencil_op_to_vk(depth_fail_op),
                compare_op_to_vk(compare_op)
            )
        );
    }

    fn cmd_set_stencil_reference(&mut self, cb: RawCommandBuffer, reference: u32) {
        unsafe {
            self.context
                .device
                .cmd_set_stencil_reference(cb.vk(), vk::StencilFaceFlags::FRONT_AND_BACK, reference)
        };
    }

    fn cmd_set_stencil_compare_mask(&mut self, cb: RawCommandBuffer, mask: u32) {
        unsafe {
            self.context
                .device
                .cmd_set_stencil_compare_mask(cb.vk(), vk::StencilFaceFlags::FRONT_AND_BACK, mask)
        };
    }

    fn cmd_set_stencil_write_mask(&mut self, cb: RawCommandBuffer, mask: u32) {
        unsafe {
            self.context
                .device
                .cmd_set_stencil_write_mask(cb.vk(), vk::StencilFaceFlags::FRONT_AND_BACK, mask)
        };
    }

    fn cmd_bind_pipeline(&mut self, cb: RawCommandBuffer, pipeline: RawPipeline) {
        unsafe {
            self.context
                .device
                .cmd_bind_pipeline(cb.vk(), vk::PipelineBindPoint::GRAPHICS, pipeline.vk())
        };
    }

    fn cmd_bind_descriptor_sets(
        &mut self,
        cb: RawCommandBuffer,
        layout: RawPipelineLayout,
        first_set: u32,
        sets: &[RawDescriptorSet],
    ) {
        let native: Vec<vk::DescriptorSet> = sets.iter().map(|set| set.vk()).collect();
        unsafe {
            self.context.device.cmd_bind_descriptor_sets(
                cb.vk(),
                vk::PipelineBindPoint::GRAPHICS,
                layout.vk(),
                first_set,
                &native,
                &[],
            );
        }
    }

    fn cmd_push_constants(
        &mut self,
        cb: RawCommandBuffer,
        layout: RawPipelineLayout,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.context
                .device
                .cmd_push_constants(cb.vk(), layout.vk(), shader_stage_flags_to_vk(stages), offset, data)
        };
    }

    fn cmd_bind_vertex_buffer(&mut self, cb: RawCommandBuffer, buffer: RawBuffer, offset: u64) {
        unsafe {
            self.context
                .device
                .cmd_bind_vertex_buffers(cb.vk(), 0, &[buffer.vk()], &[offset])
        };
    }

    fn cmd_bind_index_buffer(&mut self, cb: RawCommandBuffer, buffer: RawBuffer, offset: u64, index_type: IndexType) {
        unsafe {
            self.context
                .device
                .cmd_bind_index_buffer(cb.vk(), buffer.vk(), offset, index_type_to_vk(index_type))
        };
    }

    fn cmd_draw(&mut self, cb: RawCommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.context
                .device
                .cmd_draw(cb.vk(), vertex_count, instance_count, first_vertex, first_instance)
        };
    }

    fn cmd_draw_indexed(
        &mut self,
        cb: RawCommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.context.device.cmd_draw_indexed(
                cb.vk(),
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    // ===== SYNCHRONIZATION =====

    fn create_semaphore(&mut self) -> Result<RawSemaphore> {
        let semaphore = unsafe {
            self.context
                .device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
        .map_err(vk_error("Failed to create semaphore"))?;
        Ok(RawSemaphore(raw(semaphore)))
    }

    fn destroy_semaphore(&mut self, semaphore: RawSemaphore) {
        unsafe { self.context.device.destroy_semaphore(semaphore.vk(), None) };
    }

    fn create_fence(&mut self, signaled: bool) -> Result<RawFence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            self.context
                .device
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
        }
        .map_err(vk_error("Failed to create fence"))?;
        Ok(RawFence(raw(fence)))
    }

    fn destroy_fence(&mut self, fence: RawFence) {
        unsafe { self.context.device.destroy_fence(fence.vk(), None) };
    }

    fn wait_for_fence(&mut self, fence: RawFence, timeout: u64) -> Result<bool> {
        match unsafe { self.context.device.wait_for_fences(&[fence.vk()], true, timeout) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(vk_error("Failed to wait for fence")(e)),
        }
    }

    fn reset_fence(&mut self, fence: RawFence) -> Result<()> {
        unsafe { self.context.device.reset_fences(&[fence.vk()]) }.map_err(vk_error("Failed to reset fence"))
    }

    // ===== DESCRIPTORS =====

    fn create_descriptor_pool(&mut self, sizes: &[DescriptorPoolSize], max_sets: u32) -> Result<RawDescriptorPool> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = sizes
            .iter()
            .map(|size| vk::DescriptorPoolSize {
                ty: descriptor_type_to_vk(size.descriptor_type),
                descriptor_count: size.count,
            })
            .collect();
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { self.context.device.create_descriptor_pool(&create_info, None) }
            .map_err(vk_error("Failed to create descriptor pool"))?;
        Ok(RawDescriptorPool(raw(pool)))
    }

    fn destroy_descriptor_pool(&mut self, pool: RawDescriptorPool) {
        unsafe { self.context.device.destroy_descriptor_pool(pool.vk(), None) };
    }

    fn create_descriptor_set_layout(&mut self, bindings: &[DescriptorSetLayoutBinding]) -> Result<RawDescriptorSetLayout> {
        let native: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(descriptor_type_to_vk(binding.descriptor_type))
                    .descriptor_count(binding.count)
                    .stage_flags(shader_stage_flags_to_vk(binding.stages))
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&native);
        let layout = unsafe { self.context.device.create_descriptor_set_layout(&create_info, None) }
            .map_err(vk_error("Failed to create descriptor set layout"))?;
        Ok(RawDescriptorSetLayout(raw(layout)))
    }

    fn destroy_descriptor_set_layout(&mut self, layout: RawDescriptorSetLayout) {
        unsafe { self.context.device.destroy_descriptor_set_layout(layout.vk(), None) };
    }

    fn allocate_descriptor_sets(
        &mut self,
        pool: RawDescriptorPool,
        layouts: &[RawDescriptorSetLayout],
    ) -> Result<Vec<RawDescriptorSet>> {
        let native: Vec<vk::DescriptorSetLayout> = layouts.iter().map(|layout| layout.vk()).collect();
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool.vk())
            .set_layouts(&native);
        let sets = unsafe { self.context.device.allocate_descriptor_sets(&allocate_info) }
            .map_err(vk_error("Failed to allocate descriptor sets"))?;
        Ok(sets.into_iter().map(|set| RawDescriptorSet(raw(set))).collect())
    }

    fn free_descriptor_sets(&mut self, pool: RawDescriptorPool, sets: &[RawDescriptorSet]) -> Result<()> {
        if sets.is_empty() {
            return Ok(());
        }
        let native: Vec<vk::DescriptorSet> = sets.iter().map(|set| set.vk()).collect();
        unsafe { self.context.device.free_descriptor_sets(pool.vk(), &native) }
            .map_err(vk_error("Failed to free descriptor sets"))
    }

    fn update_descriptor_sets(&mut self, writes: &[DescriptorWrite]) {
        if writes.is_empty() {
            return;
        }

        // Infos are collected first so the writes can borrow them
        let mut buffer_infos = Vec::with_capacity(writes.len());
        let mut image_infos = Vec::with_capacity(writes.len());
        for write in writes {
            match write.resource {
                DescriptorResource::UniformBuffer { buffer, offset, range } => {
                    buffer_infos.push(vk::DescriptorBufferInfo { buffer: buffer.vk(), offset, range });
                }
                DescriptorResource::Sampler(sampler) => image_infos.push(vk::DescriptorImageInfo {
                    sampler: sampler.vk(),
                    image_view: vk::ImageView::null(),
                    image_layout: vk::ImageLayout::UNDEFINED,
                }),
                DescriptorResource::SampledImage { view, layout } => image_infos.push(vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: view.vk(),
                    image_layout: image_layout_to_vk(layout),
                }),
            }
        }

        let mut next_buffer = 0;
        let mut next_image = 0;
        let native: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .map(|write| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(write.set.vk())
                    .dst_binding(write.binding)
                    .dst_array_element(write.array_element);
                match write.resource {
                    DescriptorResource::UniformBuffer { .. } => {
                        let info = std::slice::from_ref(&buffer_infos[next_buffer]);
                        next_buffer += 1;
                        base.descriptor_type(vk::DescriptorType::UNIFORM_BUFFER).buffer_info(info)
                    }
                    DescriptorResource::Sampler(_) => {
                        let info = std::slice::from_ref(&image_infos[next_image]);
                        next_image += 1;
                        base.descriptor_type(vk::DescriptorType::SAMPLER).image_info(info)
                    }
                    DescriptorResource::SampledImage { .. } => {
                        let info = std::slice::from_ref(&image_infos[next_image]);
                        next_image += 1;
                        base.descriptor_type(vk::DescriptorType::SAMPLED_IMAGE).image_info(info)
                    }
                }
            })
            .collect();

        unsafe { self.context.device.update_descriptor_sets(&native, &[]) };
    }

    // ===== SHADERS & PIPELINES =====

    fn create_shader_module(&mut self, stage: ShaderStage, spirv: &[u8]) -> Result<RawShaderModule> {
        let words = decode_spirv(spirv)?;
        match reflect_module(&words) {
            Ok(reflection) => {
                validate_module(&reflection, stage, self.context.capabilities.max_push_constants_size)?
            }
            Err(_) => engine_warn!(SOURCE, "{:?} module could not be reflected, creating it unchecked", stage),
        }

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { self.context.device.create_shader_module(&create_info, None) }
            .map_err(vk_error("Failed to create shader module"))?;
        Ok(RawShaderModule(raw(module)))
    }

    fn destroy_shader_module(&mut self, module: RawShaderModule) {
        unsafe { self.context.device.destroy_shader_module(module.vk(), None) };
    }

    fn create_pipeline_layout(
        &mut self,
        set_layouts: &[RawDescriptorSetLayout],
        push_constants: &[PushConstantRange],
    ) -> Result<RawPipelineLayout> {
        let layouts: Vec<vk::DescriptorSetLayout> = set_layouts.iter().map(|layout| layout.vk()).collect();
        let ranges: Vec<vk::PushConstantRange> = push_constants
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: shader_stage_flags_to_vk(range.stages),
                offset: range.offset,
                size: range.size,
            })
            .collect();
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&layouts)
            .push_constant_ranges(&ranges);
        let layout = unsafe { self.context.device.create_pipeline_layout(&create_info, None) }
            .map_err(vk_error("Failed to create pipeline layout"))?;
        Ok(RawPipelineLayout(raw(layout)))
    }

    fn destroy_pipeline_layout(&mut self, layout: RawPipelineLayout) {
        unsafe { self.context.device.destroy_pipeline_layout(layout.vk(), None) };
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<RawPipeline> {
        let stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
            .stages
            .iter()
            .map(|(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader_stage_to_vk(*stage))
                    .module(module.vk())
                    .name(ENTRY_POINT_NAME)
            })
            .collect();

        let bindings = if desc.vertex_stride > 0 {
            vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: desc.vertex_stride,
                input_rate: vk::VertexInputRate::VERTEX,
            }]
        } else {
            Vec::new()
        };
        let attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: 0,
                format: format_to_vk(attribute.format),
                offset: attribute.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(desc.topology))
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let smooth_lines = desc.line_smooth
            && self
                .context
                .capabilities
                .support_flags
                .contains(DeviceSupportFlags::LINE_SMOOTH_RASTERISATION);
        if desc.line_smooth && !smooth_lines {
            engine_warn!(SOURCE, "Pipeline '{}' requests smooth lines, device has no support", desc.name);
        }
        let mut line_state = vk::PipelineRasterizationLineStateCreateInfoEXT::default()
            .line_rasterization_mode(vk::LineRasterizationModeEXT::RECTANGULAR_SMOOTH);
        let mut rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(polygon_mode_to_vk(desc.polygon_mode))
            .cull_mode(cull_mode_to_vk(desc.cull_mode))
            .front_face(winding_to_vk(desc.winding))
            .line_width(1.0);
        if smooth_lines {
            rasterizer = rasterizer.push_next(&mut line_state);
        }

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let stencil = stencil_state_to_vk(&desc.stencil);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_write)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .stencil_test_enable(desc.stencil_test)
            .front(stencil)
            .back(stencil);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states: Vec<vk::DynamicState> =
            desc.dynamic_states.iter().copied().map(dynamic_state_to_vk).collect();
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = [format_to_vk(desc.color_format)];
        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(desc.depth_format.map(format_to_vk).unwrap_or(vk::Format::UNDEFINED))
            .stencil_attachment_format(desc.stencil_format.map(format_to_vk).unwrap_or(vk::Format::UNDEFINED));

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .push_next(&mut rendering)
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout.vk());

        let pipelines = unsafe {
            self.context
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, e)| vk_error("Failed to create graphics pipeline")(e))?;

        match pipelines.first() {
            Some(pipeline) => Ok(RawPipeline(raw(*pipeline))),
            None => engine_bail!(SOURCE, "Pipeline '{}' was not created", desc.name),
        }
    }

    fn destroy_pipeline(&mut self, pipeline: RawPipeline) {
        unsafe { self.context.device.destroy_pipeline(pipeline.vk(), None) };
    }

    // ===== SAMPLERS =====

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<RawSampler> {
        let device_max = self.context.capabilities.max_sampler_anisotropy;
        let anisotropy_enable = desc.max_anisotropy > 0.0 && device_max > 1.0;
        let mipmap_mode = match desc.min_filter {
            Filter::Linear => vk::SamplerMipmapMode::LINEAR,
            Filter::Nearest => vk::SamplerMipmapMode::NEAREST,
        };

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter_to_vk(desc.mag_filter))
            .min_filter(filter_to_vk(desc.min_filter))
            .mipmap_mode(mipmap_mode)
            .address_mode_u(address_mode_to_vk(desc.address_mode_u))
            .address_mode_v(address_mode_to_vk(desc.address_mode_v))
            .address_mode_w(address_mode_to_vk(desc.address_mode_w))
            .anisotropy_enable(anisotropy_enable)
            .max_anisotropy(if anisotropy_enable { desc.max_anisotropy.min(device_max) } else { 1.0 })
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(desc.mip_levels as f32)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe { self.context.device.create_sampler(&create_info, None) }
            .map_err(vk_error("Failed to create sampler"))?;
        Ok(RawSampler(raw(sampler)))
    }

    fn destroy_sampler(&mut self, sampler: RawSampler) {
        unsafe { self.context.device.destroy_sampler(sampler.vk(), None) };
    }
}

#[cfg(test)]
#[path = "vulkan_device_tests.rs"]
mod tests;
