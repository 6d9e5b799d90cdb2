/// Image manager - device images, their views and layout transitions

use crate::error::Result;
use crate::device::*;
use crate::backend::context::GpuContext;
use crate::backend::memory::find_memory_index;
use crate::{engine_bail, engine_fatal, engine_warn};

const SOURCE: &str = "nova::rhi::Image";

/// Number of mip levels of a full chain: `floor(log2(max(w, h))) + 1`
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let max = width.max(height).max(1);
    32 - max.leading_zeros()
}

/// Dimension of mip `level`: `max(1, dim >> level)`
pub fn mip_extent(dimension: u32, level: u32) -> u32 {
    dimension.checked_shr(level).unwrap_or(0).max(1)
}

/// Cached creation parameters, reused by `recreate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCreateParams {
    pub texture_type: TextureType,
    pub width: u32,
    pub height: u32,
    pub layer_count: u32,
    pub mip_levels: u32,
    pub format: Format,
    pub tiling: ImageTiling,
    pub usage: ImageUsage,
    pub memory_flags: MemoryProperty,
    /// Create the aggregate view (and per-layer views when `layer_count > 1`)
    pub create_view: bool,
    pub view_aspect: ImageAspect,
}

impl ImageCreateParams {
    /// Device-local, optimal-tiled 2D image with a view
    pub fn new(width: u32, height: u32, format: Format, usage: ImageUsage) -> Self {
        Self {
            texture_type: TextureType::Tex2D,
            width,
            height,
            layer_count: 1,
            mip_levels: 1,
            format,
            tiling: ImageTiling::Optimal,
            usage,
            memory_flags: MemoryProperty::DEVICE_LOCAL,
            create_view: true,
            view_aspect: format.aspect(),
        }
    }
}

/// Device image with view(s)
#[derive(Debug)]
pub struct Image {
    raw: RawImage,
    view: RawImageView,
    layer_views: Vec<RawImageView>,
    params: ImageCreateParams,
    requirements: MemoryRequirements,
    name: String,
    layout: ImageLayout,
    /// False for swapchain images: only the views belong to us
    owned: bool,
}

impl Image {
    /// Create an image, bind memory of the requested properties and build its views
    pub fn create<D: GpuDevice>(context: &mut GpuContext<D>, name: &str, params: ImageCreateParams) -> Result<Self> {
        let mut image = Self {
            raw: RawImage::NULL,
            view: RawImageView::NULL,
            layer_views: Vec::new(),
            params,
            requirements: MemoryRequirements::default(),
            name: name.to_string(),
            layout: ImageLayout::Undefined,
            owned: true,
        };
        image.build(context)?;
        Ok(image)
    }

    /// Wrap an image owned by someone else (swapchain) and create its view
    pub fn wrap<D: GpuDevice>(
        context: &mut GpuContext<D>,
        name: &str,
        raw: RawImage,
        params: ImageCreateParams,
    ) -> Result<Self> {
        let mut image = Self {
            raw,
            view: RawImageView::NULL,
            layer_views: Vec::new(),
            params,
            requirements: MemoryRequirements::default(),
            name: name.to_string(),
            layout: ImageLayout::Undefined,
            owned: false,
        };
        if params.create_view {
            image.create_views(context)?;
        }
        Ok(image)
    }

    /// Release views, memory and image
    pub fn destroy<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) {
        self.destroy_internals(context);
        self.name.clear();
    }

    /// Destroy the device objects and rebuild them from the cached parameters
    pub fn recreate<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) -> Result<()> {
        if !self.owned {
            engine_bail!(SOURCE, "Cannot recreate wrapped image '{}'", self.name);
        }
        self.destroy_internals(context);
        self.build(context)
    }

    /// Change dimensions and mip count, then recreate
    pub fn resize<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, width: u32, height: u32, mip_levels: u32) -> Result<()> {
        self.params.width = width;
        self.params.height = height;
        self.params.mip_levels = mip_levels.max(1);
        self.recreate(context)
    }

    fn build<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) -> Result<()> {
        let info = ImageCreateInfo {
            texture_type: self.params.texture_type,
            width: self.params.width,
            height: self.params.height,
            layer_count: self.params.layer_count.max(1),
            mip_levels: self.params.mip_levels.max(1),
            format: self.params.format,
            tiling: self.params.tiling,
            usage: self.params.usage,
        };
        let raw = context.device.create_image(&info)?;
        let requirements = context.device.image_memory_requirements(raw);

        let memory_index = match find_memory_index(context.capabilities(), requirements.memory_type_bits, self.params.memory_flags) {
            Some(index) => index,
            None => {
                context.device.destroy_image(raw);
                engine_bail!(
                    SOURCE,
                    "Required memory type not found for image '{}' ({:?})",
                    self.name,
                    self.params.memory_flags
                );
            }
        };
        if let Err(e) = context
            .device
            .allocate_image_memory(raw, &requirements, memory_index, self.params.memory_flags, &self.name)
        {
            context.device.destroy_image(raw);
            return Err(e);
        }
        context.memory.allocate(requirements.size);

        self.raw = raw;
        self.requirements = requirements;
        self.layout = ImageLayout::Undefined;

        if self.params.create_view {
            if let Err(e) = self.create_views(context) {
                self.destroy_internals(context);
                return Err(e);
            }
        }
        Ok(())
    }

    fn create_views<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) -> Result<()> {
        let layer_count = self.params.layer_count.max(1);
        let mip_levels = self.params.mip_levels.max(1);

        self.view = context.device.create_image_view(&ImageViewCreateInfo {
            image: self.raw,
            view_type: self.params.texture_type.view_type(),
            format: self.params.format,
            range: ImageSubresourceRange::full(self.params.view_aspect, mip_levels, layer_count),
        })?;

        // Individual layers must be bindable as 2D attachments
        if layer_count > 1 {
            for layer in 0..layer_count {
                let view = context.device.create_image_view(&ImageViewCreateInfo {
                    image: self.raw,
                    view_type: ImageViewType::Tex2D,
                    format: self.params.format,
                    range: ImageSubresourceRange {
                        aspect: self.params.view_aspect,
                        base_mip_level: 0,
                        level_count: mip_levels,
                        base_array_layer: layer,
                        layer_count: 1,
                    },
                })?;
                self.layer_views.push(view);
            }
        }
        Ok(())
    }

    fn destroy_internals<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) {
        for view in self.layer_views.drain(..) {
            context.device.destroy_image_view(view);
        }
        if !self.view.is_null() {
            context.device.destroy_image_view(self.view);
            self.view = RawImageView::NULL;
        }
        if self.owned && !self.raw.is_null() {
            context.device.destroy_image(self.raw);
            context.memory.free(self.requirements.size);
        }
        self.raw = RawImage::NULL;
        self.requirements = MemoryRequirements::default();
        self.layout = ImageLayout::Undefined;
    }

    // ===== LAYOUTS =====

    /// Record a layout transition from the fixed transition table
    ///
    /// Any pair outside the table is fatal.
    pub fn transition_layout<D: GpuDevice>(
        &mut self,
        device: &mut D,
        command_buffer: RawCommandBuffer,
        old: ImageLayout,
        new: ImageLayout,
    ) {
        let (src_access, dst_access, src_stage, dst_stage) = match (old, new) {
            (ImageLayout::Undefined, ImageLayout::TransferDstOptimal) => (
                AccessFlags::empty(),
                AccessFlags::TRANSFER_WRITE,
                PipelineStage::TOP_OF_PIPE,
                PipelineStage::TRANSFER,
            ),
            (ImageLayout::TransferDstOptimal, ImageLayout::ShaderReadOnlyOptimal) => (
                AccessFlags::TRANSFER_WRITE,
                AccessFlags::SHADER_READ,
                PipelineStage::TRANSFER,
                PipelineStage::FRAGMENT_SHADER,
            ),
            (ImageLayout::TransferSrcOptimal, ImageLayout::ShaderReadOnlyOptimal) => (
                AccessFlags::TRANSFER_READ,
                AccessFlags::SHADER_READ,
                PipelineStage::TRANSFER,
                PipelineStage::FRAGMENT_SHADER,
            ),
            (ImageLayout::Undefined, ImageLayout::TransferSrcOptimal) => (
                AccessFlags::empty(),
                AccessFlags::TRANSFER_READ,
                PipelineStage::TOP_OF_PIPE,
                PipelineStage::TRANSFER,
            ),
            _ => engine_fatal!(SOURCE, "Unsupported layout transition {:?} -> {:?} on '{}'", old, new, self.name),
        };

        image_barrier(
            device,
            command_buffer,
            self.raw,
            old,
            new,
            src_access,
            dst_access,
            src_stage,
            dst_stage,
            self.full_range(),
        );
        self.layout = new;
    }

    /// Record a barrier with explicit masks (attachment and present transitions)
    #[allow(clippy::too_many_arguments)]
    pub fn barrier<D: GpuDevice>(
        &mut self,
        device: &mut D,
        command_buffer: RawCommandBuffer,
        old: ImageLayout,
        new: ImageLayout,
        src_access: AccessFlags,
        dst_access: AccessFlags,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
    ) {
        image_barrier(
            device,
            command_buffer,
            self.raw,
            old,
            new,
            src_access,
            dst_access,
            src_stage,
            dst_stage,
            self.full_range(),
        );
        self.layout = new;
    }

    /// Generate the mip chain by successive linear blits
    ///
    /// Expects every level in `TransferDstOptimal`; leaves every level in
    /// `ShaderReadOnlyOptimal`. Returns false (recording nothing) when the
    /// image has a single level or the format cannot be linearly blitted.
    pub fn generate_mipmaps<D: GpuDevice>(&mut self, device: &mut D, command_buffer: RawCommandBuffer) -> bool {
        let mip_levels = self.params.mip_levels;
        if mip_levels <= 1 {
            engine_warn!(SOURCE, "Image '{}' has a single mip level, nothing to generate", self.name);
            return false;
        }
        if !device.format_supports_linear_blit(self.params.format) {
            engine_warn!(SOURCE, "Format {:?} does not support linear blits, mipmaps not generated", self.params.format);
            return false;
        }

        let layer_count = self.params.layer_count.max(1);
        let aspect = self.params.format.aspect();
        let level_range = |level: u32| ImageSubresourceRange {
            aspect,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: 0,
            layer_count,
        };
        let layers = |level: u32| ImageSubresourceLayers {
            aspect,
            mip_level: level,
            base_array_layer: 0,
            layer_count,
        };

        for level in 1..mip_levels {
            let src_width = mip_extent(self.params.width, level - 1) as i32;
            let src_height = mip_extent(self.params.height, level - 1) as i32;
            let dst_width = mip_extent(self.params.width, level) as i32;
            let dst_height = mip_extent(self.params.height, level) as i32;

            image_barrier(
                device,
                command_buffer,
                self.raw,
                ImageLayout::TransferDstOptimal,
                ImageLayout::TransferSrcOptimal,
                AccessFlags::TRANSFER_WRITE,
                AccessFlags::TRANSFER_READ,
                PipelineStage::TRANSFER,
                PipelineStage::TRANSFER,
                level_range(level - 1),
            );

            device.cmd_blit_image(
                command_buffer,
                self.raw,
                ImageLayout::TransferSrcOptimal,
                self.raw,
                ImageLayout::TransferDstOptimal,
                &ImageBlit {
                    src_subresource: layers(level - 1),
                    src_offsets: [[0, 0, 0], [src_width, src_height, 1]],
                    dst_subresource: layers(level),
                    dst_offsets: [[0, 0, 0], [dst_width, dst_height, 1]],
                },
                Filter::Linear,
            );

            image_barrier(
                device,
                command_buffer,
                self.raw,
                ImageLayout::TransferSrcOptimal,
                ImageLayout::ShaderReadOnlyOptimal,
                AccessFlags::TRANSFER_READ,
                AccessFlags::SHADER_READ,
                PipelineStage::TRANSFER,
                PipelineStage::FRAGMENT_SHADER,
                level_range(level - 1),
            );
        }

        // The last level was never a blit source
        image_barrier(
            device,
            command_buffer,
            self.raw,
            ImageLayout::TransferDstOptimal,
            ImageLayout::ShaderReadOnlyOptimal,
            AccessFlags::TRANSFER_WRITE,
            AccessFlags::SHADER_READ,
            PipelineStage::TRANSFER,
            PipelineStage::FRAGMENT_SHADER,
            level_range(mip_levels - 1),
        );

        self.layout = ImageLayout::ShaderReadOnlyOptimal;
        true
    }

    // ===== COPIES =====

    /// Copy tightly packed pixels of every layer from `buffer` into mip 0
    ///
    /// The image must already be in `TransferDstOptimal`.
    pub fn copy_from_buffer<D: GpuDevice>(&self, device: &mut D, command_buffer: RawCommandBuffer, buffer: RawBuffer, offset: u64) {
        device.cmd_copy_buffer_to_image(
            command_buffer,
            buffer,
            self.raw,
            ImageLayout::TransferDstOptimal,
            &BufferImageCopy {
                buffer_offset: offset,
                subresource: self.mip0_layers(),
                x: 0,
                y: 0,
                width: self.params.width,
                height: self.params.height,
            },
        );
    }

    /// Copy mip 0 of every layer into `buffer`
    ///
    /// The image must already be in `TransferSrcOptimal`.
    pub fn copy_to_buffer<D: GpuDevice>(&self, device: &mut D, command_buffer: RawCommandBuffer, buffer: RawBuffer) {
        self.copy_region_to_buffer(device, command_buffer, buffer, 0, 0, 0, self.params.width, self.params.height);
    }

    /// Copy a sub-rectangle of mip 0 into `buffer` at `offset`
    ///
    /// The image must already be in `TransferSrcOptimal`.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_region_to_buffer<D: GpuDevice>(
        &self,
        device: &mut D,
        command_buffer: RawCommandBuffer,
        buffer: RawBuffer,
        offset: u64,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) {
        device.cmd_copy_image_to_buffer(
            command_buffer,
            self.raw,
            ImageLayout::TransferSrcOptimal,
            buffer,
            &BufferImageCopy {
                buffer_offset: offset,
                subresource: self.mip0_layers(),
                x: x as i32,
                y: y as i32,
                width,
                height,
            },
        );
    }

    fn mip0_layers(&self) -> ImageSubresourceLayers {
        ImageSubresourceLayers {
            aspect: self.params.format.aspect(),
            mip_level: 0,
            base_array_layer: 0,
            layer_count: self.params.layer_count.max(1),
        }
    }

    fn full_range(&self) -> ImageSubresourceRange {
        ImageSubresourceRange::full(
            self.params.format.aspect(),
            self.params.mip_levels.max(1),
            self.params.layer_count.max(1),
        )
    }

    // ===== ACCESSORS =====

    pub fn raw(&self) -> RawImage {
        self.raw
    }

    pub fn view(&self) -> RawImageView {
        self.view
    }

    pub fn layer_views(&self) -> &[RawImageView] {
        &self.layer_views
    }

    pub fn params(&self) -> &ImageCreateParams {
        &self.params
    }

    pub fn width(&self) -> u32 {
        self.params.width
    }

    pub fn height(&self) -> u32 {
        self.params.height
    }

    pub fn mip_levels(&self) -> u32 {
        self.params.mip_levels
    }

    pub fn format(&self) -> Format {
        self.params.format
    }

    pub fn requirements(&self) -> &MemoryRequirements {
        &self.requirements
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last layout recorded through this image
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub fn set_layout(&mut self, layout: ImageLayout) {
        self.layout = layout;
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }
}

/// Record a single image barrier
#[allow(clippy::too_many_arguments)]
pub fn image_barrier<D: GpuDevice>(
    device: &mut D,
    command_buffer: RawCommandBuffer,
    image: RawImage,
    old: ImageLayout,
    new: ImageLayout,
    src_access: AccessFlags,
    dst_access: AccessFlags,
    src_stage: PipelineStage,
    dst_stage: PipelineStage,
    range: ImageSubresourceRange,
) {
    device.cmd_pipeline_barrier(
        command_buffer,
        &PipelineBarrier::image(
            src_stage,
            dst_stage,
            ImageBarrier {
                image,
                old_layout: old,
                new_layout: new,
                src_access,
                dst_access,
                range,
            },
        ),
    );
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
