/// Creation and command descriptors passed to `GpuDevice`

use crate::device::handles::*;
use crate::device::types::*;

// ============================================================================
// Images
// ============================================================================

/// Parameters of a device image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCreateInfo {
    pub texture_type: TextureType,
    pub width: u32,
    pub height: u32,
    pub layer_count: u32,
    pub mip_levels: u32,
    pub format: Format,
    pub tiling: ImageTiling,
    pub usage: ImageUsage,
}

/// Subresource range covered by a view or barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSubresourceRange {
    pub aspect: ImageAspect,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl ImageSubresourceRange {
    /// Range covering every mip level and layer
    pub fn full(aspect: ImageAspect, mip_levels: u32, layer_count: u32) -> Self {
        Self {
            aspect,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count,
        }
    }
}

/// Subresource layers addressed by copies and blits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSubresourceLayers {
    pub aspect: ImageAspect,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

/// Parameters of an image view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageViewCreateInfo {
    pub image: RawImage,
    pub view_type: ImageViewType,
    pub format: Format,
    pub range: ImageSubresourceRange,
}

// ============================================================================
// Swapchain
// ============================================================================

/// Parameters of a swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainCreateInfo {
    pub surface: RawSurface,
    pub min_image_count: u32,
    pub surface_format: SurfaceFormat,
    pub extent: Extent2D,
    pub present_mode: PresentMode,
    /// Queue families sharing the images (graphics, present)
    pub queue_families: [u32; 2],
    pub old_swapchain: RawSwapchain,
}

// ============================================================================
// Barriers and copies
// ============================================================================

/// Global memory barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBarrier {
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
}

/// Buffer memory barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: RawBuffer,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub offset: u64,
    pub size: u64,
}

/// Image memory barrier with layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: RawImage,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub range: ImageSubresourceRange,
}

/// A pipeline barrier command
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineBarrier {
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
    pub memory_barriers: Vec<MemoryBarrier>,
    pub buffer_barriers: Vec<BufferBarrier>,
    pub image_barriers: Vec<ImageBarrier>,
}

impl PipelineBarrier {
    /// Barrier holding a single image barrier
    pub fn image(src_stage: PipelineStage, dst_stage: PipelineStage, barrier: ImageBarrier) -> Self {
        Self {
            src_stage,
            dst_stage,
            memory_barriers: Vec::new(),
            buffer_barriers: Vec::new(),
            image_barriers: vec![barrier],
        }
    }

    /// Barrier holding a single global memory barrier
    pub fn memory(src_stage: PipelineStage, dst_stage: PipelineStage, barrier: MemoryBarrier) -> Self {
        Self {
            src_stage,
            dst_stage,
            memory_barriers: vec![barrier],
            buffer_barriers: Vec::new(),
            image_barriers: Vec::new(),
        }
    }
}

/// Buffer to buffer copy region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

/// Buffer to/from image copy region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    pub subresource: ImageSubresourceLayers,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Image blit region; offsets are `[min, max]` corners as `[x, y, z]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBlit {
    pub src_subresource: ImageSubresourceLayers,
    pub src_offsets: [[i32; 3]; 2],
    pub dst_subresource: ImageSubresourceLayers,
    pub dst_offsets: [[i32; 3]; 2],
}

// ============================================================================
// Rendering
// ============================================================================

/// Viewport rectangle with depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Integer rectangle (scissor, render area)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Attachment load operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

/// Attachment store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// Clear value of an attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// One attachment of a dynamic rendering pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingAttachment {
    pub view: RawImageView,
    pub layout: ImageLayout,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: ClearValue,
}

/// Dynamic rendering pass description
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingInfo {
    pub render_area: Rect2D,
    pub layer_count: u32,
    pub color_attachments: Vec<RenderingAttachment>,
    pub depth_attachment: Option<RenderingAttachment>,
    pub stencil_attachment: Option<RenderingAttachment>,
}

/// Queue submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitInfo {
    pub command_buffers: Vec<RawCommandBuffer>,
    /// Semaphore to wait on and the stage that waits
    pub wait: Option<(RawSemaphore, PipelineStage)>,
    pub signal: Option<RawSemaphore>,
    pub fence: Option<RawFence>,
}

// ============================================================================
// Descriptors
// ============================================================================

/// Descriptor pool size entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPoolSize {
    pub descriptor_type: DescriptorType,
    pub count: u32,
}

/// Binding of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
}

/// Resource written into one descriptor element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    UniformBuffer { buffer: RawBuffer, offset: u64, range: u64 },
    Sampler(RawSampler),
    SampledImage { view: RawImageView, layout: ImageLayout },
}

/// One descriptor element write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub set: RawDescriptorSet,
    pub binding: u32,
    pub array_element: u32,
    pub resource: DescriptorResource,
}

/// Push constant range of a pipeline layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    pub stages: ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

// ============================================================================
// Pipelines
// ============================================================================

/// Vertex attribute of the (single) vertex binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttributeDesc {
    pub location: u32,
    pub format: Format,
    pub offset: u32,
}

/// Stencil state shared by front and back faces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Replace,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
            compare_mask: 0xFF,
            write_mask: 0,
            reference: 1,
        }
    }
}

/// Graphics pipeline description
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineDesc {
    pub name: String,
    pub stages: Vec<(ShaderStage, RawShaderModule)>,
    pub vertex_stride: u32,
    pub attributes: Vec<VertexAttributeDesc>,
    pub layout: RawPipelineLayout,
    pub topology: PrimitiveTopology,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub winding: Winding,
    pub depth_test: bool,
    pub depth_write: bool,
    pub stencil_test: bool,
    pub stencil: StencilState,
    pub dynamic_states: Vec<DynamicState>,
    pub color_format: Format,
    pub depth_format: Option<Format>,
    pub stencil_format: Option<Format>,
    pub line_smooth: bool,
}

/// Sampler description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub address_mode_u: SamplerAddressMode,
    pub address_mode_v: SamplerAddressMode,
    pub address_mode_w: SamplerAddressMode,
    /// 0 disables anisotropic filtering
    pub max_anisotropy: f32,
    /// Sampled mip levels; the LOD range is clamped to `[0, mip_levels]`
    pub mip_levels: u32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            address_mode_u: SamplerAddressMode::Repeat,
            address_mode_v: SamplerAddressMode::Repeat,
            address_mode_w: SamplerAddressMode::Repeat,
            max_anisotropy: 16.0,
            mip_levels: 1,
        }
    }
}
