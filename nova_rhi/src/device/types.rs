/// Enumerations and flag sets shared by the device API

use bitflags::bitflags;

// ============================================================================
// Formats
// ============================================================================

/// Image and vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Format {
    UNDEFINED,

    // Colour formats
    R8_UNORM,
    R8G8_UNORM,
    R8G8B8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_SFLOAT,

    // Depth/stencil formats
    D32_SFLOAT,
    D32_SFLOAT_S8_UINT,
    D24_UNORM_S8_UINT,

    // Vertex attribute formats
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
    R32_SINT,
    R32G32_SINT,
    R32G32B32_SINT,
    R32G32B32A32_SINT,
    R32_UINT,
    R32G32_UINT,
    R32G32B32_UINT,
    R32G32B32A32_UINT,
    R8_SINT,
    R8_UINT,
    R16_SINT,
    R16_UINT,
}

impl Format {
    /// Size of one texel (or one vertex attribute) in bytes
    pub fn size_bytes(&self) -> u32 {
        match self {
            Format::UNDEFINED => 0,
            Format::R8_UNORM | Format::R8_SINT | Format::R8_UINT => 1,
            Format::R8G8_UNORM | Format::R16_SINT | Format::R16_UINT => 2,
            Format::R8G8B8_UNORM => 3,
            Format::R8G8B8A8_UNORM
            | Format::R8G8B8A8_SRGB
            | Format::B8G8R8A8_UNORM
            | Format::B8G8R8A8_SRGB
            | Format::D32_SFLOAT
            | Format::D24_UNORM_S8_UINT
            | Format::R32_SFLOAT
            | Format::R32_SINT
            | Format::R32_UINT => 4,
            Format::D32_SFLOAT_S8_UINT => 5,
            Format::R16G16B16A16_SFLOAT
            | Format::R32G32_SFLOAT
            | Format::R32G32_SINT
            | Format::R32G32_UINT => 8,
            Format::R32G32B32_SFLOAT | Format::R32G32B32_SINT | Format::R32G32B32_UINT => 12,
            Format::R32G32B32A32_SFLOAT
            | Format::R32G32B32A32_SINT
            | Format::R32G32B32A32_UINT => 16,
        }
    }

    /// Whether this is a depth (or depth/stencil) format
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            Format::D32_SFLOAT | Format::D32_SFLOAT_S8_UINT | Format::D24_UNORM_S8_UINT
        )
    }

    /// Whether this format carries a stencil component
    pub fn has_stencil(&self) -> bool {
        matches!(self, Format::D32_SFLOAT_S8_UINT | Format::D24_UNORM_S8_UINT)
    }

    /// Aspect flags an image view of this format uses
    pub fn aspect(&self) -> ImageAspect {
        if self.has_stencil() {
            ImageAspect::DEPTH | ImageAspect::STENCIL
        } else if self.is_depth() {
            ImageAspect::DEPTH
        } else {
            ImageAspect::COLOR
        }
    }
}

// ============================================================================
// Images
// ============================================================================

/// Image layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    PresentSrc,
}

/// Image tiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageTiling {
    Optimal,
    Linear,
}

/// Engine-level texture/image type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureType {
    /// Simple 2D texture
    Tex2D,
    /// 2D texture array
    Tex2DArray,
    /// Cubemap (6 layers)
    Cube,
    /// Cubemap array (6 * n layers)
    CubeArray,
}

impl TextureType {
    /// View type of the aggregate view for this texture type
    pub fn view_type(&self) -> ImageViewType {
        match self {
            TextureType::Tex2D => ImageViewType::Tex2D,
            TextureType::Tex2DArray => ImageViewType::Tex2DArray,
            TextureType::Cube => ImageViewType::Cube,
            TextureType::CubeArray => ImageViewType::CubeArray,
        }
    }

    /// Whether images of this type need the cube-compatible creation flag
    pub fn is_cube(&self) -> bool {
        matches!(self, TextureType::Cube | TextureType::CubeArray)
    }
}

/// Image view type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageViewType {
    Tex2D,
    Tex2DArray,
    Cube,
    CubeArray,
}

bitflags! {
    /// Image usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
    }
}

bitflags! {
    /// Image aspect flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageAspect: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

// ============================================================================
// Memory and buffers
// ============================================================================

bitflags! {
    /// Memory property flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryProperty: u32 {
        const DEVICE_LOCAL = 1 << 0;
        const HOST_VISIBLE = 1 << 1;
        const HOST_COHERENT = 1 << 2;
        const HOST_CACHED = 1 << 3;
    }
}

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const INDEX = 1 << 4;
        const VERTEX = 1 << 5;
    }
}

/// Memory requirements reported for an image or buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryRequirements {
    /// Required allocation size in bytes
    pub size: u64,
    /// Required alignment in bytes
    pub alignment: u64,
    /// Bit `i` set means memory type `i` is acceptable
    pub memory_type_bits: u32,
}

/// Index element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

// ============================================================================
// Synchronization
// ============================================================================

bitflags! {
    /// Memory access flags used in barriers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const INDEX_READ = 1 << 0;
        const VERTEX_ATTRIBUTE_READ = 1 << 1;
        const UNIFORM_READ = 1 << 2;
        const SHADER_READ = 1 << 3;
        const SHADER_WRITE = 1 << 4;
        const COLOR_ATTACHMENT_READ = 1 << 5;
        const COLOR_ATTACHMENT_WRITE = 1 << 6;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 7;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 8;
        const TRANSFER_READ = 1 << 9;
        const TRANSFER_WRITE = 1 << 10;
        const HOST_READ = 1 << 11;
        const HOST_WRITE = 1 << 12;
        const MEMORY_READ = 1 << 13;
        const MEMORY_WRITE = 1 << 14;
    }
}

bitflags! {
    /// Pipeline stage flags used in barriers and semaphore waits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStage: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const VERTEX_INPUT = 1 << 1;
        const VERTEX_SHADER = 1 << 2;
        const FRAGMENT_SHADER = 1 << 3;
        const EARLY_FRAGMENT_TESTS = 1 << 4;
        const LATE_FRAGMENT_TESTS = 1 << 5;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 6;
        const TRANSFER = 1 << 7;
        const BOTTOM_OF_PIPE = 1 << 8;
        const HOST = 1 << 9;
        const ALL_GRAPHICS = 1 << 10;
        const ALL_COMMANDS = 1 << 11;
    }
}

/// Outcome of acquiring the next swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image acquired; `suboptimal` hints that a rebuild would be beneficial
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface and must be rebuilt
    OutOfDate,
}

/// Outcome of presenting a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

// ============================================================================
// Command buffers
// ============================================================================

/// Command buffer level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferLevel {
    Primary,
    Secondary,
}

bitflags! {
    /// Command buffer begin flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandBufferUsage: u32 {
        const ONE_TIME_SUBMIT = 1 << 0;
        const RENDER_PASS_CONTINUE = 1 << 1;
        const SIMULTANEOUS_USE = 1 << 2;
    }
}

// ============================================================================
// Shaders and pipelines
// ============================================================================

/// Shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Stage flag for this stage
    pub fn flag(&self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Geometry => ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => ShaderStageFlags::COMPUTE,
        }
    }
}

bitflags! {
    /// Shader stage visibility flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const GEOMETRY = 1 << 1;
        const FRAGMENT = 1 << 2;
        const COMPUTE = 1 << 3;
    }
}

/// Descriptor type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    Sampler,
    SampledImage,
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveTopology {
    /// Topology class this topology belongs to
    pub fn class(&self) -> PrimitiveTopologyClass {
        match self {
            PrimitiveTopology::PointList => PrimitiveTopologyClass::Point,
            PrimitiveTopology::LineList | PrimitiveTopology::LineStrip => PrimitiveTopologyClass::Line,
            PrimitiveTopology::TriangleList
            | PrimitiveTopology::TriangleStrip
            | PrimitiveTopology::TriangleFan => PrimitiveTopologyClass::Triangle,
        }
    }
}

/// Topology class; pipelines are created per class, not per topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopologyClass {
    Point = 0,
    Line = 1,
    Triangle = 2,
}

impl PrimitiveTopologyClass {
    /// All classes in pipeline-array order
    pub const ALL: [PrimitiveTopologyClass; 3] = [
        PrimitiveTopologyClass::Point,
        PrimitiveTopologyClass::Line,
        PrimitiveTopologyClass::Triangle,
    ];

    /// Topology a pipeline of this class is created with
    pub fn default_topology(&self) -> PrimitiveTopology {
        match self {
            PrimitiveTopologyClass::Point => PrimitiveTopology::PointList,
            PrimitiveTopologyClass::Line => PrimitiveTopology::LineList,
            PrimitiveTopologyClass::Triangle => PrimitiveTopology::TriangleList,
        }
    }

    /// Topology types belonging to this class
    pub fn types(&self) -> PrimitiveTopologyTypes {
        match self {
            PrimitiveTopologyClass::Point => PrimitiveTopologyTypes::POINT_LIST,
            PrimitiveTopologyClass::Line => {
                PrimitiveTopologyTypes::LINE_LIST | PrimitiveTopologyTypes::LINE_STRIP
            }
            PrimitiveTopologyClass::Triangle => {
                PrimitiveTopologyTypes::TRIANGLE_LIST
                    | PrimitiveTopologyTypes::TRIANGLE_STRIP
                    | PrimitiveTopologyTypes::TRIANGLE_FAN
            }
        }
    }
}

bitflags! {
    /// Set of topologies a shader will be drawn with
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PrimitiveTopologyTypes: u32 {
        const POINT_LIST = 1 << 0;
        const LINE_LIST = 1 << 1;
        const LINE_STRIP = 1 << 2;
        const TRIANGLE_LIST = 1 << 3;
        const TRIANGLE_STRIP = 1 << 4;
        const TRIANGLE_FAN = 1 << 5;
    }
}

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
    FrontAndBack,
}

/// Front-face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Winding {
    CounterClockwise,
    Clockwise,
}

/// Polygon rasterization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
}

/// Comparison operator (depth/stencil tests)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// Stencil operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

/// Pipeline state that is set while recording instead of baked into the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicState {
    Viewport,
    Scissor,
    LineWidth,
    StencilCompareMask,
    StencilWriteMask,
    StencilReference,
    FrontFace,
    PrimitiveTopology,
    DepthTestEnable,
    DepthWriteEnable,
    DepthCompareOp,
    StencilTestEnable,
    StencilOp,
}

// ============================================================================
// Samplers
// ============================================================================

/// Texture filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Texture addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerAddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

// ============================================================================
// Presentation
// ============================================================================

/// Presentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

/// Surface colour space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    SrgbNonlinear,
    Other,
}

/// One format/colour-space pair a surface supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFormat {
    pub format: Format,
    pub color_space: ColorSpace,
}

/// 2D extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

/// Surface limits, re-queried on every swapchain (re)creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// 0 means "no limit"
    pub max_image_count: u32,
    /// `u32::MAX` width means "determined by the swapchain extent"
    pub current_extent: Extent2D,
    pub min_image_extent: Extent2D,
    pub max_image_extent: Extent2D,
}

/// Everything a surface reports about presentation support
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSupport {
    pub capabilities: SurfaceCapabilities,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
}
