/// Engine-level shader description handed over by the asset system

use bitflags::bitflags;
use crate::device::{CullMode, Format, PrimitiveTopologyTypes, ShaderStage};

/// How often a uniform changes, which decides where it is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderUpdateFrequency {
    /// Once per frame (camera, lights); a single state per shader
    PerFrame = 0,
    /// Once per group of draws (material); a bounded pool of states
    PerGroup = 1,
    /// Once per draw (model matrix); plain uniforms travel as push constants
    PerDraw = 2,
}

impl ShaderUpdateFrequency {
    /// All frequencies in descriptor-set order
    pub const ALL: [ShaderUpdateFrequency; 3] = [
        ShaderUpdateFrequency::PerFrame,
        ShaderUpdateFrequency::PerGroup,
        ShaderUpdateFrequency::PerDraw,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Type of a shader uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum ShaderUniformType {
    Float32,
    Float32_2,
    Float32_3,
    Float32_4,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Matrix4,
    /// Opaque block of the given size in bytes
    Custom(u32),
    Sampler,
    Texture,
}

impl ShaderUniformType {
    /// Size in bytes of one element; 0 for samplers and textures
    pub fn size(&self) -> u32 {
        match self {
            ShaderUniformType::Int8 | ShaderUniformType::UInt8 => 1,
            ShaderUniformType::Int16 | ShaderUniformType::UInt16 => 2,
            ShaderUniformType::Float32 | ShaderUniformType::Int32 | ShaderUniformType::UInt32 => 4,
            ShaderUniformType::Float32_2 => 8,
            ShaderUniformType::Float32_3 => 12,
            ShaderUniformType::Float32_4 => 16,
            ShaderUniformType::Matrix4 => 64,
            ShaderUniformType::Custom(size) => *size,
            ShaderUniformType::Sampler | ShaderUniformType::Texture => 0,
        }
    }

    pub fn is_sampler(&self) -> bool {
        matches!(self, ShaderUniformType::Sampler)
    }

    pub fn is_texture(&self) -> bool {
        matches!(self, ShaderUniformType::Texture)
    }

    /// Stored in a uniform buffer (or push constants) rather than a descriptor
    pub fn is_plain(&self) -> bool {
        !self.is_sampler() && !self.is_texture()
    }
}

/// One declared uniform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderUniformConfig {
    pub name: String,
    pub uniform_type: ShaderUniformType,
    pub frequency: ShaderUpdateFrequency,
    /// Number of array elements; 0 is treated as 1
    pub array_length: u32,
}

impl ShaderUniformConfig {
    pub fn new(name: &str, uniform_type: ShaderUniformType, frequency: ShaderUpdateFrequency) -> Self {
        Self {
            name: name.to_string(),
            uniform_type,
            frequency,
            array_length: 1,
        }
    }

    pub fn array(mut self, length: u32) -> Self {
        self.array_length = length;
        self
    }
}

/// One vertex attribute; offsets follow declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderAttributeConfig {
    pub name: String,
    pub format: Format,
}

/// One shader stage as SPIR-V bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageConfig {
    pub stage: ShaderStage,
    pub spirv: Vec<u8>,
}

bitflags! {
    /// Fixed-function state baked into the shader's pipelines
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderFlags: u32 {
        const DEPTH_TEST = 1 << 0;
        const DEPTH_WRITE = 1 << 1;
        const STENCIL_TEST = 1 << 2;
        const STENCIL_WRITE = 1 << 3;
        /// Also build a line-mode twin of every pipeline
        const WIREFRAME = 1 << 4;
    }
}

/// Shader description
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderConfig {
    pub name: String,
    pub stages: Vec<ShaderStageConfig>,
    pub attributes: Vec<ShaderAttributeConfig>,
    pub uniforms: Vec<ShaderUniformConfig>,
    pub cull_mode: CullMode,
    /// Topologies the shader is drawn with; one pipeline per class they cover
    pub topology_types: PrimitiveTopologyTypes,
    /// Concurrent per-group states
    pub max_groups: u32,
    /// Concurrent per-draw states
    pub max_per_draw_count: u32,
    pub flags: ShaderFlags,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            stages: Vec::new(),
            attributes: Vec::new(),
            uniforms: Vec::new(),
            cull_mode: CullMode::Back,
            topology_types: PrimitiveTopologyTypes::TRIANGLE_LIST,
            max_groups: 1,
            max_per_draw_count: 1,
            flags: ShaderFlags::DEPTH_TEST | ShaderFlags::DEPTH_WRITE,
        }
    }
}
