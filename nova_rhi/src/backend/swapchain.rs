/// Swapchain manager - the presentation image chain of one surface
///
/// Surface limits are re-queried on every (re)creation. The images are
/// exposed through a wrapped texture slot so they can be addressed like any
/// other render target.

use crate::error::Result;
use crate::config::RendererConfigFlags;
use crate::device::*;
use crate::backend::context::GpuContext;
use crate::backend::texture::{TextureHandle, TextureTable};
use crate::{engine_bail, engine_info};

const SOURCE: &str = "nova::rhi::Swapchain";

/// VSync requests FIFO, upgraded to MAILBOX unless power saving; no VSync requests IMMEDIATE
pub fn select_present_mode(flags: RendererConfigFlags, available: &[PresentMode]) -> PresentMode {
    if flags.contains(RendererConfigFlags::VSYNC) {
        if !flags.contains(RendererConfigFlags::POWER_SAVING) && available.contains(&PresentMode::Mailbox) {
            PresentMode::Mailbox
        } else {
            PresentMode::Fifo
        }
    } else if available.contains(&PresentMode::Immediate) {
        PresentMode::Immediate
    } else {
        // FIFO is the one mode every surface must support
        PresentMode::Fifo
    }
}

/// `min + 1`, clamped to the maximum when the surface has one
pub fn select_image_count(capabilities: &SurfaceCapabilities) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Prefer B8G8R8A8_UNORM in the sRGB non-linear colour space, else the first format
pub fn select_surface_format(formats: &[SurfaceFormat]) -> Option<SurfaceFormat> {
    formats
        .iter()
        .find(|f| f.format == Format::B8G8R8A8_UNORM && f.color_space == ColorSpace::SrgbNonlinear)
        .or_else(|| formats.first())
        .copied()
}

/// Current surface extent, or the window size clamped to the limits when undefined
pub fn select_extent(capabilities: &SurfaceCapabilities, width: u32, height: u32) -> Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    Extent2D {
        width: width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

#[derive(Debug)]
pub struct Swapchain {
    raw: RawSwapchain,
    surface: RawSurface,
    surface_format: SurfaceFormat,
    extent: Extent2D,
    present_mode: PresentMode,
    image_count: u32,
    max_frames_in_flight: u32,
    /// Wrapped texture holding the swapchain images
    texture: TextureHandle,
}

impl Swapchain {
    pub fn create<D: GpuDevice>(
        context: &mut GpuContext<D>,
        textures: &mut TextureTable,
        surface: RawSurface,
        width: u32,
        height: u32,
        flags: RendererConfigFlags,
    ) -> Result<Self> {
        let mut swapchain = Self {
            raw: RawSwapchain::NULL,
            surface,
            surface_format: SurfaceFormat { format: Format::UNDEFINED, color_space: ColorSpace::SrgbNonlinear },
            extent: Extent2D::default(),
            present_mode: PresentMode::Fifo,
            image_count: 0,
            max_frames_in_flight: 0,
            texture: TextureHandle::default(),
        };
        let images = swapchain.build(context, width, height, flags)?;
        match textures.acquire_wrapped(
            context,
            "swapchain",
            &images,
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.surface_format.format,
        ) {
            Ok(texture) => swapchain.texture = texture,
            Err(e) => {
                context.device.destroy_swapchain(swapchain.raw);
                return Err(e);
            }
        }
        Ok(swapchain)
    }

    /// Destroy then create with the current flags, refreshing the wrapped texture
    pub fn recreate<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        textures: &mut TextureTable,
        width: u32,
        height: u32,
        flags: RendererConfigFlags,
    ) -> Result<()> {
        context.device.destroy_swapchain(self.raw);
        self.raw = RawSwapchain::NULL;
        let images = self.build(context, width, height, flags)?;
        textures.replace_wrapped(
            context,
            self.texture,
            &images,
            self.extent.width,
            self.extent.height,
            self.surface_format.format,
        )
    }

    /// Destroy the swapchain and its wrapped texture (the surface stays)
    pub fn destroy<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, textures: &mut TextureTable) -> Result<()> {
        if textures.contains(self.texture) {
            textures.release(context, self.texture)?;
        }
        if !self.raw.is_null() {
            context.device.destroy_swapchain(self.raw);
            self.raw = RawSwapchain::NULL;
        }
        Ok(())
    }

    fn build<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        width: u32,
        height: u32,
        flags: RendererConfigFlags,
    ) -> Result<Vec<RawImage>> {
        let support = context.device.query_surface_support(self.surface)?;
        let surface_format = match select_surface_format(&support.formats) {
            Some(format) => format,
            None => engine_bail!(SOURCE, "Surface reports no formats"),
        };
        let present_mode = select_present_mode(flags, &support.present_modes);
        let image_count = select_image_count(&support.capabilities);
        let extent = select_extent(&support.capabilities, width, height);
        if extent.width == 0 || extent.height == 0 {
            engine_bail!(SOURCE, "Cannot create a {}x{} swapchain", extent.width, extent.height);
        }

        let capabilities = context.capabilities();
        let info = SwapchainCreateInfo {
            surface: self.surface,
            min_image_count: image_count,
            surface_format,
            extent,
            present_mode,
            queue_families: [capabilities.graphics_queue_family, capabilities.present_queue_family],
            old_swapchain: RawSwapchain::NULL,
        };
        let raw = context.device.create_swapchain(&info)?;
        let images = match context.device.swapchain_images(raw) {
            Ok(images) if !images.is_empty() => images,
            Ok(_) => {
                context.device.destroy_swapchain(raw);
                engine_bail!(SOURCE, "Swapchain returned no images");
            }
            Err(e) => {
                context.device.destroy_swapchain(raw);
                return Err(e);
            }
        };

        self.raw = raw;
        self.surface_format = surface_format;
        self.extent = extent;
        self.present_mode = present_mode;
        // The device may return more images than requested
        self.image_count = images.len() as u32;
        self.max_frames_in_flight = (self.image_count - 1).max(1);

        engine_info!(
            SOURCE,
            "Swapchain {}x{}, {:?}, {:?}, {} images, {} frames in flight",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            self.image_count,
            self.max_frames_in_flight
        );
        Ok(images)
    }

    pub fn acquire_next_image<D: GpuDevice>(&self, device: &mut D, signal: RawSemaphore) -> Result<AcquireOutcome> {
        device.acquire_next_image(self.raw, u64::MAX, signal)
    }

    pub fn present<D: GpuDevice>(&self, device: &mut D, image_index: u32, wait: RawSemaphore) -> Result<PresentOutcome> {
        device.queue_present(self.raw, image_index, wait)
    }

    pub fn raw(&self) -> RawSwapchain {
        self.raw
    }

    pub fn surface(&self) -> RawSurface {
        self.surface
    }

    pub fn format(&self) -> Format {
        self.surface_format.format
    }

    pub fn surface_format(&self) -> SurfaceFormat {
        self.surface_format
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    pub fn max_frames_in_flight(&self) -> u32 {
        self.max_frames_in_flight
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }
}

#[cfg(test)]
#[path = "swapchain_tests.rs"]
mod tests;
