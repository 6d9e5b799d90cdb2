/// Frequency layout - buckets a shader's uniforms into per-frame, per-group and per-draw blocks
///
/// Pure computation over the declared uniforms: counts, byte offsets, UBO
/// strides and descriptor binding numbers. No device access, so the
/// descriptor mapping can be checked without a GPU.

use rdst::RadixSort;
use rustc_hash::FxHashMap;
use crate::error::Result;
use crate::backend::memory::align_up;
use crate::backend::shader::config::{ShaderUniformConfig, ShaderUniformType, ShaderUpdateFrequency};
use crate::{engine_bail, engine_err};

const SOURCE: &str = "nova::rhi::Shader";

/// Per-draw storage limit: the push-constant size every device guarantees
pub const PER_DRAW_PUSH_CONSTANT_SIZE: u64 = 128;

/// Resolved uniform of a shader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderUniform {
    pub name: String,
    /// Declaration index; also the uniform's location
    pub index: u16,
    pub uniform_type: ShaderUniformType,
    pub frequency: ShaderUpdateFrequency,
    /// Byte offset inside the frequency's block (plain uniforms only)
    pub offset: u64,
    /// Size of one element in bytes (plain uniforms only)
    pub size: u64,
    pub array_length: u32,
    /// Descriptor binding inside the frequency's set (samplers and textures only)
    pub binding: u32,
    /// Index into the frequency state's sampler or texture arrays
    pub state_index: u16,
}

/// What one update frequency declares
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyInfo {
    /// Plain uniforms (UBO or push constants)
    pub uniform_count: u32,
    pub uniform_sampler_count: u32,
    pub uniform_texture_count: u32,
    /// Uniform indices of the samplers, declaration order
    pub sampler_indices: Vec<u16>,
    /// Uniform indices of the textures, declaration order
    pub texture_indices: Vec<u16>,
    /// Samplers and textures sorted by uniform index; descriptor binding order
    pub sorted_indices: Vec<u16>,
    /// Sampler array elements over every sampler uniform
    pub sampler_element_count: u32,
    /// Texture array elements over every texture uniform
    pub texture_element_count: u32,
    /// Bytes of plain uniforms
    pub ubo_size: u64,
    /// Bytes reserved per state
    pub ubo_stride: u64,
}

impl FrequencyInfo {
    /// Whether plain uniforms live in a uniform buffer binding (per-draw uses push constants)
    pub fn has_ubo(&self, frequency: ShaderUpdateFrequency) -> bool {
        frequency != ShaderUpdateFrequency::PerDraw && self.uniform_count > 0
    }

    /// Whether this frequency contributes a descriptor set
    pub fn has_descriptor_set(&self, frequency: ShaderUpdateFrequency) -> bool {
        self.has_ubo(frequency) || !self.sorted_indices.is_empty()
    }

    /// First binding number used by samplers and textures
    pub fn first_descriptor_binding(&self, frequency: ShaderUpdateFrequency) -> u32 {
        u32::from(self.has_ubo(frequency))
    }
}

/// UBO stride of one frequency
///
/// Per-draw is exactly the push-constant limit (or 0 when empty) and fails
/// beyond it; the others are rounded up to the uniform offset alignment.
pub fn ubo_stride(frequency: ShaderUpdateFrequency, ubo_size: u64, alignment: u64) -> Result<u64> {
    match frequency {
        ShaderUpdateFrequency::PerDraw => {
            if ubo_size > PER_DRAW_PUSH_CONSTANT_SIZE {
                engine_bail!(
                    SOURCE,
                    "Per-draw uniforms take {} bytes, more than the {} byte push constant limit",
                    ubo_size,
                    PER_DRAW_PUSH_CONSTANT_SIZE
                );
            }
            Ok(if ubo_size > 0 { PER_DRAW_PUSH_CONSTANT_SIZE } else { 0 })
        }
        _ => Ok(align_up(ubo_size, alignment)),
    }
}

/// Concatenate sampler and texture indices and sort them by uniform index
pub fn sorted_binding_indices(sampler_indices: &[u16], texture_indices: &[u16]) -> Vec<u16> {
    let mut sorted: Vec<u16> = sampler_indices.iter().chain(texture_indices).copied().collect();
    sorted.radix_sort_unstable();
    sorted
}

/// Uniform table plus the three frequency blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyLayout {
    pub uniforms: Vec<ShaderUniform>,
    pub lookup: FxHashMap<String, u16>,
    pub frequencies: [FrequencyInfo; 3],
}

impl FrequencyLayout {
    pub fn build(configs: &[ShaderUniformConfig], alignment: u64) -> Result<Self> {
        if configs.len() > u16::MAX as usize {
            engine_bail!(SOURCE, "{} uniforms declared, at most {} supported", configs.len(), u16::MAX);
        }

        let mut uniforms = Vec::with_capacity(configs.len());
        let mut lookup = FxHashMap::default();
        let mut frequencies: [FrequencyInfo; 3] = Default::default();

        // Bucket by frequency, splitting plain / sampler / texture
        for (index, config) in configs.iter().enumerate() {
            let index = index as u16;
            if lookup.insert(config.name.clone(), index).is_some() {
                engine_bail!(SOURCE, "Uniform '{}' declared twice", config.name);
            }
            let array_length = config.array_length.max(1);
            let info = &mut frequencies[config.frequency.index()];
            let mut uniform = ShaderUniform {
                name: config.name.clone(),
                index,
                uniform_type: config.uniform_type,
                frequency: config.frequency,
                offset: 0,
                size: 0,
                array_length,
                binding: 0,
                state_index: 0,
            };

            match config.uniform_type {
                ShaderUniformType::Sampler => {
                    uniform.state_index = info.sampler_indices.len() as u16;
                    info.sampler_indices.push(index);
                    info.uniform_sampler_count += 1;
                    info.sampler_element_count += array_length;
                }
                ShaderUniformType::Texture => {
                    uniform.state_index = info.texture_indices.len() as u16;
                    info.texture_indices.push(index);
                    info.uniform_texture_count += 1;
                    info.texture_element_count += array_length;
                }
                plain => {
                    let size = u64::from(plain.size());
                    if size == 0 {
                        engine_bail!(SOURCE, "Uniform '{}' has zero size", config.name);
                    }
                    uniform.offset = info.ubo_size;
                    uniform.size = size;
                    info.ubo_size += size * u64::from(array_length);
                    info.uniform_count += 1;
                }
            }
            uniforms.push(uniform);
        }

        for frequency in ShaderUpdateFrequency::ALL {
            let info = &mut frequencies[frequency.index()];
            info.sorted_indices = sorted_binding_indices(&info.sampler_indices, &info.texture_indices);
            info.ubo_stride = ubo_stride(frequency, info.ubo_size, alignment)?;

            // Binding numbers follow the sorted order
            let first = info.first_descriptor_binding(frequency);
            for (position, &index) in info.sorted_indices.iter().enumerate() {
                uniforms[index as usize].binding = first + position as u32;
            }
        }

        Ok(Self { uniforms, lookup, frequencies })
    }

    pub fn info(&self, frequency: ShaderUpdateFrequency) -> &FrequencyInfo {
        &self.frequencies[frequency.index()]
    }

    pub fn uniform(&self, location: u16) -> Result<&ShaderUniform> {
        self.uniforms
            .get(location as usize)
            .ok_or_else(|| engine_err!(SOURCE, "No uniform at location {}", location))
    }

    /// Descriptor sets a shader binds: one per frequency that declares anything bindable
    pub fn descriptor_set_count(&self) -> u32 {
        ShaderUpdateFrequency::ALL
            .iter()
            .filter(|frequency| self.info(**frequency).has_descriptor_set(**frequency))
            .count() as u32
    }

    /// Compacted set index of each frequency (`None` when it has no set)
    pub fn set_indices(&self) -> [Option<u32>; 3] {
        let mut indices = [None; 3];
        let mut next = 0;
        for frequency in ShaderUpdateFrequency::ALL {
            if self.info(frequency).has_descriptor_set(frequency) {
                indices[frequency.index()] = Some(next);
                next += 1;
            }
        }
        indices
    }
}

#[cfg(test)]
#[path = "frequency_tests.rs"]
mod tests;
