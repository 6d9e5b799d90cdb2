/// Texture slot table - generational texture handles over 1..N images
///
/// A slot holds one image per buffered copy (render targets usually have
/// one per swapchain image, static textures one). Handles are `slotmap`
/// keys: a released slot is reused with a new version, so keys captured
/// before the release are rejected.

use bitflags::bitflags;
use slotmap::{new_key_type, SlotMap};
use crate::error::Result;
use crate::device::*;
use crate::backend::buffer::{FrameWorkload, RenderBuffer, RenderBufferTrackType, RenderBufferType};
use crate::backend::context::GpuContext;
use crate::backend::image::{mip_level_count, Image, ImageCreateParams};
use crate::{engine_bail, engine_debug, engine_err};

const SOURCE: &str = "nova::rhi::Texture";

/// Content generation that marks "no data yet"
pub const INVALID_GENERATION: u16 = u16::MAX;

new_key_type! {
    /// Generational texture handle
    pub struct TextureHandle;
}

bitflags! {
    /// Texture flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureFlags: u32 {
        const HAS_TRANSPARENCY = 1 << 0;
        /// Can be written by the GPU (render target)
        const IS_WRITEABLE = 1 << 1;
        /// Images belong to someone else (swapchain)
        const IS_WRAPPED = 1 << 2;
        /// Depth/stencil attachment
        const DEPTH = 1 << 3;
    }
}

/// Texture acquisition parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub name: String,
    pub texture_type: TextureType,
    pub width: u32,
    pub height: u32,
    pub layer_count: u32,
    /// 1 disables mipmapping; anything larger is recomputed from the size
    pub mip_levels: u32,
    pub format: Format,
    /// Independent images (buffering factor)
    pub image_count: u32,
    pub flags: TextureFlags,
}

impl TextureDesc {
    /// Single-image 2D texture without mips
    pub fn new(name: &str, width: u32, height: u32, format: Format) -> Self {
        Self {
            name: name.to_string(),
            texture_type: TextureType::Tex2D,
            width,
            height,
            layer_count: 1,
            mip_levels: 1,
            format,
            image_count: 1,
            flags: TextureFlags::empty(),
        }
    }

    /// Bytes of mip 0 across every layer
    pub fn size_bytes(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.size_bytes() as u64 * self.layer_count.max(1) as u64
    }

    fn image_params(&self) -> ImageCreateParams {
        let (usage, aspect) = if self.flags.contains(TextureFlags::DEPTH) {
            (
                ImageUsage::DEPTH_STENCIL_ATTACHMENT | ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST,
                self.format.aspect(),
            )
        } else {
            let mut usage = ImageUsage::SAMPLED | ImageUsage::TRANSFER_SRC | ImageUsage::TRANSFER_DST;
            if self.flags.contains(TextureFlags::IS_WRITEABLE) {
                usage |= ImageUsage::COLOR_ATTACHMENT;
            }
            (usage, ImageAspect::COLOR)
        };
        ImageCreateParams {
            texture_type: self.texture_type,
            width: self.width,
            height: self.height,
            layer_count: self.layer_count.max(1),
            mip_levels: self.mip_levels.max(1),
            format: self.format,
            tiling: ImageTiling::Optimal,
            usage,
            memory_flags: MemoryProperty::DEVICE_LOCAL,
            create_view: true,
            view_aspect: aspect,
        }
    }
}

/// One texture table entry
#[derive(Debug)]
pub struct TextureSlot {
    desc: TextureDesc,
    images: Vec<Image>,
    generation: u16,
}

impl TextureSlot {
    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    pub fn format(&self) -> Format {
        self.desc.format
    }

    pub fn flags(&self) -> TextureFlags {
        self.desc.flags
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Image for buffered copy `index` (wraps around)
    pub fn image(&self, index: u32) -> &Image {
        &self.images[index as usize % self.images.len()]
    }

    pub fn image_mut(&mut self, index: u32) -> &mut Image {
        let len = self.images.len();
        &mut self.images[index as usize % len]
    }

    /// Content generation; `INVALID_GENERATION` until the first write
    pub fn generation(&self) -> u16 {
        self.generation
    }

    /// Advance the content generation, skipping the invalid value
    pub fn bump_generation(&mut self) {
        self.generation = next_generation(self.generation);
    }
}

/// Next content generation (`INVALID_GENERATION` is never produced)
pub fn next_generation(generation: u16) -> u16 {
    match generation.wrapping_add(1) {
        INVALID_GENERATION => 0,
        next => next,
    }
}

/// Slot table of textures
#[derive(Debug, Default)]
pub struct TextureTable {
    slots: SlotMap<TextureHandle, TextureSlot>,
}

impl TextureTable {
    pub fn new() -> Self {
        Self { slots: SlotMap::with_key() }
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&TextureSlot> {
        self.slots.get(handle)
    }

    pub fn get_mut(&mut self, handle: TextureHandle) -> Option<&mut TextureSlot> {
        self.slots.get_mut(handle)
    }

    pub fn contains(&self, handle: TextureHandle) -> bool {
        self.slots.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, handle: TextureHandle) -> Result<&TextureSlot> {
        self.slots
            .get(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale texture handle {:?}", handle))
    }

    fn slot_mut(&mut self, handle: TextureHandle) -> Result<&mut TextureSlot> {
        self.slots
            .get_mut(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale texture handle {:?}", handle))
    }

    /// Create `desc.image_count` images and a slot referencing them
    pub fn acquire<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, desc: TextureDesc) -> Result<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            engine_bail!(SOURCE, "Texture '{}' has a zero dimension ({}x{})", desc.name, desc.width, desc.height);
        }
        let mut desc = desc;
        desc.image_count = desc.image_count.max(1);
        if desc.texture_type.is_cube() && desc.layer_count % 6 != 0 {
            desc.layer_count = 6 * desc.layer_count.max(1).div_ceil(6);
        }
        if desc.mip_levels > 1 {
            desc.mip_levels = mip_level_count(desc.width, desc.height);
        }

        let params = desc.image_params();
        let mut images = Vec::with_capacity(desc.image_count as usize);
        for index in 0..desc.image_count {
            let name = format!("{}_{}", desc.name, index);
            match Image::create(context, &name, params) {
                Ok(image) => images.push(image),
                Err(e) => {
                    for mut image in images {
                        image.destroy(context);
                    }
                    return Err(e);
                }
            }
        }

        engine_debug!(
            SOURCE,
            "Acquired texture '{}' ({}x{}, {} mips, {} images)",
            desc.name,
            desc.width,
            desc.height,
            desc.mip_levels,
            desc.image_count
        );
        Ok(self.slots.insert(TextureSlot {
            desc,
            images,
            generation: INVALID_GENERATION,
        }))
    }

    /// Create a slot around images owned elsewhere (swapchain images)
    pub fn acquire_wrapped<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        name: &str,
        raws: &[RawImage],
        width: u32,
        height: u32,
        format: Format,
    ) -> Result<TextureHandle> {
        let images = wrap_images(context, name, raws, width, height, format)?;
        let desc = TextureDesc {
            image_count: raws.len() as u32,
            flags: TextureFlags::IS_WRAPPED | TextureFlags::IS_WRITEABLE,
            ..TextureDesc::new(name, width, height, format)
        };
        Ok(self.slots.insert(TextureSlot { desc, images, generation: 0 }))
    }

    /// Swap the images of a wrapped slot (swapchain recreation)
    pub fn replace_wrapped<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        handle: TextureHandle,
        raws: &[RawImage],
        width: u32,
        height: u32,
        format: Format,
    ) -> Result<()> {
        let images = wrap_images(context, self.slot(handle)?.name(), raws, width, height, format)?;
        let slot = self.slot_mut(handle)?;
        for mut image in std::mem::replace(&mut slot.images, images) {
            image.destroy(context);
        }
        slot.desc.width = width;
        slot.desc.height = height;
        slot.desc.format = format;
        slot.desc.image_count = raws.len() as u32;
        slot.bump_generation();
        Ok(())
    }

    /// Destroy a texture after draining the device; the handle becomes stale
    pub fn release<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, handle: TextureHandle) -> Result<()> {
        self.slot(handle)?;
        context.device.wait_idle()?;
        if let Some(mut slot) = self.slots.remove(handle) {
            for image in slot.images.iter_mut() {
                image.destroy(context);
            }
            engine_debug!(SOURCE, "Released texture '{}'", slot.desc.name);
        }
        Ok(())
    }

    /// Recreate every image at the new size; contents are discarded
    pub fn resize<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        handle: TextureHandle,
        width: u32,
        height: u32,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            engine_bail!(SOURCE, "Cannot resize texture to {}x{}", width, height);
        }
        let slot = self.slot_mut(handle)?;
        if slot.desc.flags.contains(TextureFlags::IS_WRAPPED) {
            engine_bail!(SOURCE, "Wrapped texture '{}' cannot be resized", slot.desc.name);
        }

        let mip_levels = if slot.desc.mip_levels > 1 { mip_level_count(width, height) } else { 1 };
        for image in slot.images.iter_mut() {
            image.resize(context, width, height, mip_levels)?;
        }
        slot.desc.width = width;
        slot.desc.height = height;
        slot.desc.mip_levels = mip_levels;
        slot.bump_generation();
        Ok(())
    }

    /// Upload mip 0 of every layer into every image of the texture
    ///
    /// With a frame workload the upload rides on the frame command buffer and
    /// the generation is left for the caller to bump once that frame retires;
    /// otherwise the upload blocks and the generation is bumped immediately.
    pub fn write_data<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        handle: TextureHandle,
        data: &[u8],
        workload: Option<FrameWorkload<'_>>,
    ) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        let expected = slot.desc.size_bytes();
        if data.len() as u64 != expected {
            engine_bail!(
                SOURCE,
                "Texture '{}' expects {} bytes, got {}",
                slot.desc.name,
                expected,
                data.len()
            );
        }

        match workload {
            Some(workload) => {
                for image in slot.images.iter_mut() {
                    let offset = workload
                        .staging
                        .allocate(expected)
                        .ok_or_else(|| engine_err!(SOURCE, "Frame staging buffer is full ({} bytes requested)", expected))?;
                    workload.staging.write_mapped(&mut context.device, offset, data)?;
                    upload_image(&mut context.device, workload.command_buffer, image, workload.staging.raw(), offset);
                }
            }
            None => {
                let mut staging =
                    RenderBuffer::create(context, "texture_staging", RenderBufferType::Staging, expected, RenderBufferTrackType::None)?;
                let result = staging.write_mapped(&mut context.device, 0, data).and_then(|_| {
                    let command_buffer = context.begin_single_use()?;
                    for image in slot.images.iter_mut() {
                        upload_image(&mut context.device, command_buffer.raw(), image, staging.raw(), 0);
                    }
                    context.end_single_use(command_buffer)
                });
                staging.destroy_completed(context);
                result?;
                slot.bump_generation();
            }
        }
        Ok(())
    }

    /// Read `size` bytes of mip 0 starting at byte `offset`
    pub fn read_data<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        handle: TextureHandle,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>> {
        let slot = self.slot_mut(handle)?;
        let total = slot.desc.size_bytes();
        if offset.checked_add(size).map_or(true, |end| end > total) {
            engine_bail!(SOURCE, "Read {}+{} exceeds texture '{}' ({} bytes)", offset, size, slot.desc.name, total);
        }
        let image = slot.image_mut(0);
        let data = read_back(context, image, total, |device, command_buffer, image, buffer| {
            image.copy_to_buffer(device, command_buffer, buffer);
        })?;
        Ok(data[offset as usize..(offset + size) as usize].to_vec())
    }

    /// Read one texel of mip 0 (missing channels are zero)
    pub fn read_pixel<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        handle: TextureHandle,
        x: u32,
        y: u32,
    ) -> Result<[u8; 4]> {
        let slot = self.slot_mut(handle)?;
        if x >= slot.desc.width || y >= slot.desc.height {
            engine_bail!(SOURCE, "Pixel ({}, {}) outside texture '{}'", x, y, slot.desc.name);
        }
        let texel = slot.desc.format.size_bytes() as u64;
        let image = slot.image_mut(0);
        let data = read_back(context, image, texel, |device, command_buffer, image, buffer| {
            image.copy_region_to_buffer(device, command_buffer, buffer, 0, x, y, 1, 1);
        })?;
        let mut pixel = [0u8; 4];
        let count = data.len().min(4);
        pixel[..count].copy_from_slice(&data[..count]);
        Ok(pixel)
    }

    /// Record a colour clear of buffered copy `index`
    pub fn clear_color<D: GpuDevice>(
        &mut self,
        device: &mut D,
        command_buffer: RawCommandBuffer,
        handle: TextureHandle,
        index: u32,
        color: [f32; 4],
    ) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        let image = slot.image_mut(index);
        let range = ImageSubresourceRange::full(ImageAspect::COLOR, image.mip_levels(), image.params().layer_count);
        let layout = image.layout();
        image.barrier(
            device,
            command_buffer,
            layout,
            ImageLayout::TransferDstOptimal,
            AccessFlags::empty(),
            AccessFlags::TRANSFER_WRITE,
            PipelineStage::TOP_OF_PIPE,
            PipelineStage::TRANSFER,
        );
        device.cmd_clear_color_image(command_buffer, image.raw(), ImageLayout::TransferDstOptimal, color, &range);
        image.barrier(
            device,
            command_buffer,
            ImageLayout::TransferDstOptimal,
            ImageLayout::ShaderReadOnlyOptimal,
            AccessFlags::TRANSFER_WRITE,
            AccessFlags::SHADER_READ,
            PipelineStage::TRANSFER,
            PipelineStage::FRAGMENT_SHADER,
        );
        Ok(())
    }

    /// Record a depth/stencil clear of buffered copy `index`
    pub fn clear_depth_stencil<D: GpuDevice>(
        &mut self,
        device: &mut D,
        command_buffer: RawCommandBuffer,
        handle: TextureHandle,
        index: u32,
        depth: f32,
        stencil: u32,
    ) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        let image = slot.image_mut(index);
        let range = ImageSubresourceRange::full(image.format().aspect(), image.mip_levels(), image.params().layer_count);
        let layout = image.layout();
        image.barrier(
            device,
            command_buffer,
            layout,
            ImageLayout::TransferDstOptimal,
            AccessFlags::empty(),
            AccessFlags::TRANSFER_WRITE,
            PipelineStage::TOP_OF_PIPE,
            PipelineStage::TRANSFER,
        );
        device.cmd_clear_depth_stencil_image(command_buffer, image.raw(), ImageLayout::TransferDstOptimal, depth, stencil, &range);
        image.barrier(
            device,
            command_buffer,
            ImageLayout::TransferDstOptimal,
            ImageLayout::DepthStencilAttachmentOptimal,
            AccessFlags::TRANSFER_WRITE,
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            PipelineStage::TRANSFER,
            PipelineStage::EARLY_FRAGMENT_TESTS,
        );
        Ok(())
    }

    /// Destroy every texture (shutdown)
    pub fn destroy_all<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) {
        for (_, mut slot) in self.slots.drain() {
            for image in slot.images.iter_mut() {
                image.destroy(context);
            }
        }
    }
}

fn wrap_images<D: GpuDevice>(
    context: &mut GpuContext<D>,
    name: &str,
    raws: &[RawImage],
    width: u32,
    height: u32,
    format: Format,
) -> Result<Vec<Image>> {
    let params = ImageCreateParams::new(width, height, format, ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_DST);
    let mut images = Vec::with_capacity(raws.len());
    for (index, raw) in raws.iter().enumerate() {
        match Image::wrap(context, &format!("{}_{}", name, index), *raw, params) {
            Ok(image) => images.push(image),
            Err(e) => {
                for mut image in images {
                    image.destroy(context);
                }
                return Err(e);
            }
        }
    }
    Ok(images)
}

fn upload_image<D: GpuDevice>(device: &mut D, command_buffer: RawCommandBuffer, image: &mut Image, staging: RawBuffer, offset: u64) {
    image.transition_layout(device, command_buffer, ImageLayout::Undefined, ImageLayout::TransferDstOptimal);
    image.copy_from_buffer(device, command_buffer, staging, offset);
    if image.mip_levels() <= 1 || !image.generate_mipmaps(device, command_buffer) {
        image.transition_layout(device, command_buffer, ImageLayout::TransferDstOptimal, ImageLayout::ShaderReadOnlyOptimal);
    }
}

fn read_back<D: GpuDevice>(
    context: &mut GpuContext<D>,
    image: &mut Image,
    size: u64,
    record: impl FnOnce(&mut D, RawCommandBuffer, &mut Image, RawBuffer),
) -> Result<Vec<u8>> {
    let mut read = RenderBuffer::create(context, "texture_read", RenderBufferType::Read, size, RenderBufferTrackType::None)?;
    let result = context
        .begin_single_use()
        .and_then(|command_buffer| {
            image.transition_layout(&mut context.device, command_buffer.raw(), ImageLayout::Undefined, ImageLayout::TransferSrcOptimal);
            record(&mut context.device, command_buffer.raw(), image, read.raw());
            image.transition_layout(
                &mut context.device,
                command_buffer.raw(),
                ImageLayout::TransferSrcOptimal,
                ImageLayout::ShaderReadOnlyOptimal,
            );
            context.end_single_use(command_buffer)
        })
        .and_then(|_| read.gpu_buffer().read_mapped(&mut context.device, 0, size));
    read.destroy_completed(context);
    result
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
