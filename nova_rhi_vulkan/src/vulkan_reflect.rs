/// SPIR-V sanity checks run before a shader module is created
///
/// The backend lays out its descriptor sets from the shader config, not from
/// reflection; spirq is only used to reject modules that cannot match that
/// layout (no `main` entry point, descriptor sets past the per-draw set, push
/// constants larger than the device allows).

use nova_rhi::device::ShaderStage;
use nova_rhi::nova::Result;
use nova_rhi::{engine_bail, engine_err};

const SOURCE: &str = "nova::vulkan::Reflect";

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Entry point every stage is created with
pub(crate) const ENTRY_POINT: &str = "main";

/// Per-frame, per-group and per-draw
pub(crate) const MAX_DESCRIPTOR_SETS: u32 = 3;

/// What a module declares, as far as pipeline creation cares
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ModuleReflection {
    pub entry_points: Vec<String>,
    /// `(set, binding)` of every descriptor
    pub bindings: Vec<(u32, u32)>,
    /// Largest push constant block in bytes
    pub push_constant_size: u32,
}

/// Decode SPIR-V bytes into words, fixing byte order and checking the magic number
pub(crate) fn decode_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    let words = ash::util::read_spv(&mut std::io::Cursor::new(bytes))
        .map_err(|e| engine_err!(SOURCE, "Invalid SPIR-V ({} bytes): {}", bytes.len(), e))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(word) => engine_bail!(SOURCE, "Invalid SPIR-V magic number 0x{:08X}", word),
        None => engine_bail!(SOURCE, "Empty SPIR-V module"),
    }
}

/// Reflect entry points, descriptors and push constants of a module
pub(crate) fn reflect_module(words: &[u32]) -> Result<ModuleReflection> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(words)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| engine_err!(SOURCE, "SPIR-V reflection failed: {:?}", e))?;

    let mut reflection = ModuleReflection::default();
    for entry_point in &entry_points {
        reflection.entry_points.push(entry_point.name.clone());
        for var in entry_point.vars.iter() {
            match var {
                spirq::var::Variable::Descriptor { desc_bind, .. } => {
                    reflection.bindings.push((desc_bind.set(), desc_bind.bind()));
                }
                spirq::var::Variable::PushConstant { ty, .. } => {
                    let size = ty.nbyte().unwrap_or(0) as u32;
                    reflection.push_constant_size = reflection.push_constant_size.max(size);
                }
                _ => {}
            }
        }
    }
    reflection.bindings.sort_unstable();
    reflection.bindings.dedup();
    Ok(reflection)
}

/// Check a reflected module against the backend's pipeline layout rules
pub(crate) fn validate_module(
    reflection: &ModuleReflection,
    stage: ShaderStage,
    max_push_constants_size: u32,
) -> Result<()> {
    if !reflection.entry_points.iter().any(|name| name == ENTRY_POINT) {
        engine_bail!(
            SOURCE,
            "{:?} module has no '{}' entry point (found {:?})",
            stage,
            ENTRY_POINT,
            reflection.entry_points
        );
    }
    if let Some((set, binding)) = reflection.bindings.iter().find(|(set, _)| *set >= MAX_DESCRIPTOR_SETS) {
        engine_bail!(
            SOURCE,
            "{:?} module uses descriptor set {} (binding {}); only sets 0..{} exist",
            stage,
            set,
            binding,
            MAX_DESCRIPTOR_SETS
        );
    }
    if reflection.push_constant_size > max_push_constants_size {
        engine_bail!(
            SOURCE,
            "{:?} module declares {} bytes of push constants, the device allows {}",
            stage,
            reflection.push_constant_size,
            max_push_constants_size
        );
    }
    Ok(())
}

#[cfg(test)]
#[path = "vulkan_reflect_tests.rs"]
mod tests;
