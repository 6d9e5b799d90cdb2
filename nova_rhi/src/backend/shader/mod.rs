/// Shader engine - frequency-tagged uniforms mapped onto descriptor sets and push constants

pub mod config;
pub mod frequency;
pub mod state;
#[allow(clippy::module_inception)]
pub mod shader;

pub use config::{
    ShaderAttributeConfig, ShaderConfig, ShaderFlags, ShaderStageConfig, ShaderUniformConfig,
    ShaderUniformType, ShaderUpdateFrequency,
};
pub use frequency::{FrequencyInfo, FrequencyLayout, ShaderUniform, PER_DRAW_PUSH_CONSTANT_SIZE};
pub use state::{FrequencyHandle, FrequencyState, INVALID_STAMP};
pub use shader::{ApplyFrame, ApplyResources, Shader, ShaderDefaults, UniformValue};
