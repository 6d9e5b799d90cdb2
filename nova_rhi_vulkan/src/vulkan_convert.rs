/// Conversions between the device-layer types of `nova_rhi` and `ash::vk`
///
/// Every function here is pure, so the mapping tables can be tested without a GPU.

use ash::vk;
use ash::vk::Handle;
use nova_rhi::device::*;

// ============================================================================
// Handles
// ============================================================================

/// Native Vulkan handle behind a raw device handle
pub(crate) trait IntoVk {
    type Vk;
    fn vk(self) -> Self::Vk;
}

macro_rules! handle_conversions {
    ($($raw:ident => $vk:ty,)*) => {
        $(
            impl IntoVk for $raw {
                type Vk = $vk;
                fn vk(self) -> $vk {
                    <$vk>::from_raw(self.0)
                }
            }
        )*
    };
}

handle_conversions! {
    RawImage => vk::Image,
    RawImageView => vk::ImageView,
    RawBuffer => vk::Buffer,
    RawCommandBuffer => vk::CommandBuffer,
    RawSemaphore => vk::Semaphore,
    RawFence => vk::Fence,
    RawSurface => vk::SurfaceKHR,
    RawSwapchain => vk::SwapchainKHR,
    RawDescriptorPool => vk::DescriptorPool,
    RawDescriptorSetLayout => vk::DescriptorSetLayout,
    RawDescriptorSet => vk::DescriptorSet,
    RawPipelineLayout => vk::PipelineLayout,
    RawPipeline => vk::Pipeline,
    RawShaderModule => vk::ShaderModule,
    RawSampler => vk::Sampler,
}

/// 64-bit value of any Vulkan handle
pub(crate) fn raw<H: Handle>(handle: H) -> u64 {
    handle.as_raw()
}

// ============================================================================
// Formats
// ============================================================================

pub(crate) fn format_to_vk(format: Format) -> vk::Format {
    match format {
        Format::UNDEFINED => vk::Format::UNDEFINED,
        Format::R8_UNORM => vk::Format::R8_UNORM,
        Format::R8G8_UNORM => vk::Format::R8G8_UNORM,
        Format::R8G8B8_UNORM => vk::Format::R8G8B8_UNORM,
        Format::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        Format::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        Format::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        Format::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        Format::R16G16B16A16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        Format::D32_SFLOAT => vk::Format::D32_SFLOAT,
        Format::D32_SFLOAT_S8_UINT => vk::Format::D32_SFLOAT_S8_UINT,
        Format::D24_UNORM_S8_UINT => vk::Format::D24_UNORM_S8_UINT,
        Format::R32_SFLOAT => vk::Format::R32_SFLOAT,
        Format::R32G32_SFLOAT => vk::Format::R32G32_SFLOAT,
        Format::R32G32B32_SFLOAT => vk::Format::R32G32B32_SFLOAT,
        Format::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        Format::R32_SINT => vk::Format::R32_SINT,
        Format::R32G32_SINT => vk::Format::R32G32_SINT,
        Format::R32G32B32_SINT => vk::Format::R32G32B32_SINT,
        Format::R32G32B32A32_SINT => vk::Format::R32G32B32A32_SINT,
        Format::R32_UINT => vk::Format::R32_UINT,
        Format::R32G32_UINT => vk::Format::R32G32_UINT,
        Format::R32G32B32_UINT => vk::Format::R32G32B32_UINT,
        Format::R32G32B32A32_UINT => vk::Format::R32G32B32A32_UINT,
        Format::R8_SINT => vk::Format::R8_SINT,
        Format::R8_UINT => vk::Format::R8_UINT,
        Format::R16_SINT => vk::Format::R16_SINT,
        Format::R16_UINT => vk::Format::R16_UINT,
    }
}

/// Engine format of a surface format; `None` for formats the engine never renders to
pub(crate) fn surface_format_from_vk(format: vk::Format) -> Option<Format> {
    match format {
        vk::Format::R8G8B8A8_UNORM => Some(Format::R8G8B8A8_UNORM),
        vk::Format::R8G8B8A8_SRGB => Some(Format::R8G8B8A8_SRGB),
        vk::Format::B8G8R8A8_UNORM => Some(Format::B8G8R8A8_UNORM),
        vk::Format::B8G8R8A8_SRGB => Some(Format::B8G8R8A8_SRGB),
        vk::Format::R16G16B16A16_SFLOAT => Some(Format::R16G16B16A16_SFLOAT),
        _ => None,
    }
}

pub(crate) fn color_space_to_vk(color_space: ColorSpace) -> vk::ColorSpaceKHR {
    match color_space {
        ColorSpace::SrgbNonlinear | ColorSpace::Other => vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }
}

pub(crate) fn color_space_from_vk(color_space: vk::ColorSpaceKHR) -> ColorSpace {
    match color_space {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => ColorSpace::SrgbNonlinear,
        _ => ColorSpace::Other,
    }
}

pub(crate) fn present_mode_to_vk(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

pub(crate) fn present_mode_from_vk(mode: vk::PresentModeKHR) -> Option<PresentMode> {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
        vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
        vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
        vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
        _ => None,
    }
}

pub(crate) fn extent_to_vk(extent: Extent2D) -> vk::Extent2D {
    vk::Extent2D { width: extent.width, height: extent.height }
}

pub(crate) fn extent_from_vk(extent: vk::Extent2D) -> Extent2D {
    Extent2D { width: extent.width, height: extent.height }
}

// ============================================================================
// Images and memory
// ============================================================================

pub(crate) fn image_layout_to_vk(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ColorAttachmentOptimal => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachmentOptimal => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::ShaderReadOnlyOptimal => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSrcOptimal => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDstOptimal => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub(crate) fn tiling_to_vk(tiling: ImageTiling) -> vk::ImageTiling {
    match tiling {
        ImageTiling::Optimal => vk::ImageTiling::OPTIMAL,
        ImageTiling::Linear => vk::ImageTiling::LINEAR,
    }
}

pub(crate) fn view_type_to_vk(view_type: ImageViewType) -> vk::ImageViewType {
    match view_type {
        ImageViewType::Tex2D => vk::ImageViewType::TYPE_2D,
        ImageViewType::Tex2DArray => vk::ImageViewType::TYPE_2D_ARRAY,
        ImageViewType::Cube => vk::ImageViewType::CUBE,
        ImageViewType::CubeArray => vk::ImageViewType::CUBE_ARRAY,
    }
}

pub(crate) fn image_usage_to_vk(usage: ImageUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(ImageUsage::TRANSFER_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(ImageUsage::TRANSFER_DST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(ImageUsage::SAMPLED) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(ImageUsage::STORAGE) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(ImageUsage::COLOR_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    flags
}

pub(crate) fn aspect_to_vk(aspect: ImageAspect) -> vk::ImageAspectFlags {
    let mut flags = vk::ImageAspectFlags::empty();
    if aspect.contains(ImageAspect::COLOR) {
        flags |= vk::ImageAspectFlags::COLOR;
    }
    if aspect.contains(ImageAspect::DEPTH) {
        flags |= vk::ImageAspectFlags::DEPTH;
    }
    if aspect.contains(ImageAspect::STENCIL) {
        flags |= vk::ImageAspectFlags::STENCIL;
    }
    flags
}

pub(crate) fn subresource_range_to_vk(range: &ImageSubresourceRange) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect_to_vk(range.aspect),
        base_mip_level: range.base_mip_level,
        level_count: range.level_count,
        base_array_layer: range.base_array_layer,
        layer_count: range.layer_count,
    }
}

pub(crate) fn subresource_layers_to_vk(layers: &ImageSubresourceLayers) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspect_to_vk(layers.aspect),
        mip_level: layers.mip_level,
        base_array_layer: layers.base_array_layer,
        layer_count: layers.layer_count,
    }
}

pub(crate) fn memory_property_from_vk(flags: vk::MemoryPropertyFlags) -> MemoryProperty {
    let mut properties = MemoryProperty::empty();
    if flags.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL) {
        properties |= MemoryProperty::DEVICE_LOCAL;
    }
    if flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        properties |= MemoryProperty::HOST_VISIBLE;
    }
    if flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT) {
        properties |= MemoryProperty::HOST_COHERENT;
    }
    if flags.contains(vk::MemoryPropertyFlags::HOST_CACHED) {
        properties |= MemoryProperty::HOST_CACHED;
    }
    properties
}

/// Allocator location matching the memory properties the backend asked for
pub(crate) fn memory_location(properties: MemoryProperty) -> gpu_allocator::MemoryLocation {
    use gpu_allocator::MemoryLocation;
    if !properties.contains(MemoryProperty::HOST_VISIBLE) {
        MemoryLocation::GpuOnly
    } else if properties.contains(MemoryProperty::HOST_CACHED) {
        MemoryLocation::GpuToCpu
    } else {
        MemoryLocation::CpuToGpu
    }
}

pub(crate) fn memory_requirements_from_vk(requirements: vk::MemoryRequirements) -> MemoryRequirements {
    MemoryRequirements {
        size: requirements.size,
        alignment: requirements.alignment,
        memory_type_bits: requirements.memory_type_bits,
    }
}

pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    flags
}

pub(crate) fn index_type_to_vk(index_type: IndexType) -> vk::IndexType {
    match index_type {
        IndexType::U16 => vk::IndexType::UINT16,
        IndexType::U32 => vk::IndexType::UINT32,
    }
}

// ============================================================================
// Synchronization
// ============================================================================

pub(crate) fn access_to_vk(access: AccessFlags) -> vk::AccessFlags {
    const TABLE: [(AccessFlags, vk::AccessFlags); 15] = [
        (AccessFlags::INDEX_READ, vk::AccessFlags::INDEX_READ),
        (AccessFlags::VERTEX_ATTRIBUTE_READ, vk::AccessFlags::VERTEX_ATTRIBUTE_READ),
        (AccessFlags::UNIFORM_READ, vk::AccessFlags::UNIFORM_READ),
        (AccessFlags::SHADER_READ, vk::AccessFlags::SHADER_READ),
        (AccessFlags::SHADER_WRITE, vk::AccessFlags::SHADER_WRITE),
        (AccessFlags::COLOR_ATTACHMENT_READ, vk::AccessFlags::COLOR_ATTACHMENT_READ),
        (AccessFlags::COLOR_ATTACHMENT_WRITE, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
        (AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ),
        (AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE),
        (AccessFlags::TRANSFER_READ, vk::AccessFlags::TRANSFER_READ),
        (AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_WRITE),
        (AccessFlags::HOST_READ, vk::AccessFlags::HOST_READ),
        (AccessFlags::HOST_WRITE, vk::AccessFlags::HOST_WRITE),
        (AccessFlags::MEMORY_READ, vk::AccessFlags::MEMORY_READ),
        (AccessFlags::MEMORY_WRITE, vk::AccessFlags::MEMORY_WRITE),
    ];
    TABLE
        .iter()
        .filter(|(engine, _)| access.contains(*engine))
        .fold(vk::AccessFlags::empty(), |flags, (_, native)| flags | *native)
}

pub(crate) fn pipeline_stage_to_vk(stage: PipelineStage) -> vk::PipelineStageFlags {
    const TABLE: [(PipelineStage, vk::PipelineStageFlags); 12] = [
        (PipelineStage::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
        (PipelineStage::VERTEX_INPUT, vk::PipelineStageFlags::VERTEX_INPUT),
        (PipelineStage::VERTEX_SHADER, vk::PipelineStageFlags::VERTEX_SHADER),
        (PipelineStage::FRAGMENT_SHADER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        (PipelineStage::EARLY_FRAGMENT_TESTS, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS),
        (PipelineStage::LATE_FRAGMENT_TESTS, vk::PipelineStageFlags::LATE_FRAGMENT_TESTS),
        (PipelineStage::COLOR_ATTACHMENT_OUTPUT, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT),
        (PipelineStage::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        (PipelineStage::BOTTOM_OF_PIPE, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
        (PipelineStage::HOST, vk::PipelineStageFlags::HOST),
        (PipelineStage::ALL_GRAPHICS, vk::PipelineStageFlags::ALL_GRAPHICS),
        (PipelineStage::ALL_COMMANDS, vk::PipelineStageFlags::ALL_COMMANDS),
    ];
    let flags = TABLE
        .iter()
        .filter(|(engine, _)| stage.contains(*engine))
        .fold(vk::PipelineStageFlags::empty(), |flags, (_, native)| flags | *native);
    // An empty stage mask is invalid in a barrier
    if flags.is_empty() {
        vk::PipelineStageFlags::TOP_OF_PIPE
    } else {
        flags
    }
}

// ============================================================================
// Command buffers
// ============================================================================

pub(crate) fn command_buffer_level_to_vk(level: CommandBufferLevel) -> vk::CommandBufferLevel {
    match level {
        CommandBufferLevel::Primary => vk::CommandBufferLevel::PRIMARY,
        CommandBufferLevel::Secondary => vk::CommandBufferLevel::SECONDARY,
    }
}

pub(crate) fn command_buffer_usage_to_vk(usage: CommandBufferUsage) -> vk::CommandBufferUsageFlags {
    let mut flags = vk::CommandBufferUsageFlags::empty();
    if usage.contains(CommandBufferUsage::ONE_TIME_SUBMIT) {
        flags |= vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
    }
    if usage.contains(CommandBufferUsage::RENDER_PASS_CONTINUE) {
        flags |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
    }
    if usage.contains(CommandBufferUsage::SIMULTANEOUS_USE) {
        flags |= vk::CommandBufferUsageFlags::SIMULTANEOUS_USE;
    }
    flags
}

pub(crate) fn load_op_to_vk(load_op: LoadOp) -> vk::AttachmentLoadOp {
    match load_op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub(crate) fn store_op_to_vk(store_op: StoreOp) -> vk::AttachmentStoreOp {
    match store_op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub(crate) fn clear_value_to_vk(value: ClearValue) -> vk::ClearValue {
    match value {
        ClearValue::Color(float32) => vk::ClearValue {
            color: vk::ClearColorValue { float32 },
        },
        ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        },
    }
}

pub(crate) fn viewport_to_vk(viewport: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

pub(crate) fn rect_to_vk(rect: &Rect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: rect.x, y: rect.y },
        extent: vk::Extent2D { width: rect.width, height: rect.height },
    }
}

pub(crate) fn offsets_to_vk(offsets: &[[i32; 3]; 2]) -> [vk::Offset3D; 2] {
    let [min, max] = *offsets;
    [
        vk::Offset3D { x: min[0], y: min[1], z: min[2] },
        vk::Offset3D { x: max[0], y: max[1], z: max[2] },
    ]
}

// ============================================================================
// Shaders and pipelines
// ============================================================================

pub(crate) fn shader_stage_to_vk(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

pub(crate) fn shader_stage_flags_to_vk(stages: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStageFlags::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStageFlags::GEOMETRY) {
        flags |= vk::ShaderStageFlags::GEOMETRY;
    }
    if stages.contains(ShaderStageFlags::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStageFlags::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    flags
}

pub(crate) fn descriptor_type_to_vk(descriptor_type: DescriptorType) -> vk::DescriptorType {
    match descriptor_type {
        DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
    }
}

pub(crate) fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
    }
}

pub(crate) fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
    }
}

pub(crate) fn winding_to_vk(winding: Winding) -> vk::FrontFace {
    match winding {
        Winding::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        Winding::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub(crate) fn polygon_mode_to_vk(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
    }
}

pub(crate) fn compare_op_to_vk(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub(crate) fn stencil_op_to_vk(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::IncrementAndClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOp::DecrementAndClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::IncrementAndWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::DecrementAndWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub(crate) fn stencil_state_to_vk(state: &StencilState) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: stencil_op_to_vk(state.fail_op),
        pass_op: stencil_op_to_vk(state.pass_op),
        depth_fail_op: stencil_op_to_vk(state.depth_fail_op),
        compare_op: compare_op_to_vk(state.compare_op),
        compare_mask: state.compare_mask,
        write_mask: state.write_mask,
        reference: state.reference,
    }
}

pub(crate) fn dynamic_state_to_vk(state: DynamicState) -> vk::DynamicState {
    match state {
        DynamicState::Viewport => vk::DynamicState::VIEWPORT,
        DynamicState::Scissor => vk::DynamicState::SCISSOR,
        DynamicState::LineWidth => vk::DynamicState::LINE_WIDTH,
        DynamicState::StencilCompareMask => vk::DynamicState::STENCIL_COMPARE_MASK,
        DynamicState::StencilWriteMask => vk::DynamicState::STENCIL_WRITE_MASK,
        DynamicState::StencilReference => vk::DynamicState::STENCIL_REFERENCE,
        DynamicState::FrontFace => vk::DynamicState::FRONT_FACE,
        DynamicState::PrimitiveTopology => vk::DynamicState::PRIMITIVE_TOPOLOGY,
        DynamicState::DepthTestEnable => vk::DynamicState::DEPTH_TEST_ENABLE,
        DynamicState::DepthWriteEnable => vk::DynamicState::DEPTH_WRITE_ENABLE,
        DynamicState::DepthCompareOp => vk::DynamicState::DEPTH_COMPARE_OP,
        DynamicState::StencilTestEnable => vk::DynamicState::STENCIL_TEST_ENABLE,
        DynamicState::StencilOp => vk::DynamicState::STENCIL_OP,
    }
}

// ============================================================================
// Samplers
// ============================================================================

pub(crate) fn filter_to_vk(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub(crate) fn address_mode_to_vk(mode: SamplerAddressMode) -> vk::SamplerAddressMode {
    match mode {
        SamplerAddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        SamplerAddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        SamplerAddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        SamplerAddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

#[cfg(test)]
#[path = "vulkan_convert_tests.rs"]
mod tests;
