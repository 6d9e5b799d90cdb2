use super::*;
use ShaderUniformType as T;
use ShaderUpdateFrequency as F;

const ALIGNMENT: u64 = 256;

fn uniform(name: &str, uniform_type: ShaderUniformType, frequency: ShaderUpdateFrequency) -> ShaderUniformConfig {
    ShaderUniformConfig::new(name, uniform_type, frequency)
}

/// 1 per-frame mat4, 1 per-group vec4 + 1 per-group sampler, nothing per draw
fn scenario_a() -> Vec<ShaderUniformConfig> {
    vec![
        uniform("view_projection", T::Matrix4, F::PerFrame),
        uniform("diffuse_colour", T::Float32_4, F::PerGroup),
        uniform("diffuse_sampler", T::Sampler, F::PerGroup),
    ]
}

#[test]
fn test_scenario_a_compacts_descriptor_sets() {
    let layout = FrequencyLayout::build(&scenario_a(), ALIGNMENT).unwrap();

    assert_eq!(layout.descriptor_set_count(), 2);
    assert_eq!(layout.set_indices(), [Some(0), Some(1), None]);
    assert_eq!(layout.info(F::PerFrame).ubo_stride, align_up(64, ALIGNMENT));
    assert_eq!(layout.info(F::PerGroup).uniform_sampler_count, 1);
    assert_eq!(layout.info(F::PerGroup).uniform_count, 1);
    assert_eq!(layout.info(F::PerDraw), &FrequencyInfo::default());
}

#[test]
fn test_plain_uniform_offsets_accumulate() {
    let configs = vec![
        uniform("projection", T::Matrix4, F::PerFrame),
        uniform("view", T::Matrix4, F::PerFrame),
        uniform("ambient", T::Float32_4, F::PerFrame),
        uniform("lights", T::Float32_4, F::PerFrame).array(4),
        uniform("mode", T::UInt32, F::PerFrame),
    ];
    let layout = FrequencyLayout::build(&configs, ALIGNMENT).unwrap();
    let offsets: Vec<u64> = layout.uniforms.iter().map(|u| u.offset).collect();
    assert_eq!(offsets, vec![0, 64, 128, 144, 208]);
    assert_eq!(layout.info(F::PerFrame).ubo_size, 212);
    assert_eq!(layout.info(F::PerFrame).ubo_stride, 256);
    assert_eq!(layout.lookup["lights"], 3);
}

#[test]
fn test_missing_frequency_shifts_set_indices() {
    let configs = vec![
        uniform("projection", T::Matrix4, F::PerFrame),
        uniform("model_texture", T::Texture, F::PerDraw),
    ];
    let layout = FrequencyLayout::build(&configs, ALIGNMENT).unwrap();
    assert_eq!(layout.set_indices(), [Some(0), None, Some(1)]);
    assert_eq!(layout.descriptor_set_count(), 2);
}

#[test]
fn test_per_draw_plain_uniforms_use_no_descriptor_set() {
    let configs = vec![uniform("model", T::Matrix4, F::PerDraw)];
    let layout = FrequencyLayout::build(&configs, ALIGNMENT).unwrap();
    let info = layout.info(F::PerDraw);
    assert!(!info.has_ubo(F::PerDraw));
    assert!(!info.has_descriptor_set(F::PerDraw));
    assert_eq!(info.ubo_stride, PER_DRAW_PUSH_CONSTANT_SIZE);
    assert_eq!(layout.descriptor_set_count(), 0);
}

// ============================================================================
// Strides
// ============================================================================

#[test]
fn test_stride_is_idempotent_and_aligned() {
    for size in [1u64, 63, 64, 255, 256, 257, 1000] {
        for frequency in [F::PerFrame, F::PerGroup] {
            let first = ubo_stride(frequency, size, ALIGNMENT).unwrap();
            let second = ubo_stride(frequency, size, ALIGNMENT).unwrap();
            assert_eq!(first, second);
            assert!(first >= size);
            assert_eq!(first % ALIGNMENT, 0);
        }
    }
    assert_eq!(ubo_stride(F::PerFrame, 0, ALIGNMENT).unwrap(), 0);
}

#[test]
fn test_per_draw_stride_is_push_constant_limit() {
    assert_eq!(ubo_stride(F::PerDraw, 4, ALIGNMENT).unwrap(), 128);
    assert_eq!(ubo_stride(F::PerDraw, 128, ALIGNMENT).unwrap(), 128);
    assert_eq!(ubo_stride(F::PerDraw, 0, ALIGNMENT).unwrap(), 0);
    assert!(ubo_stride(F::PerDraw, 129, ALIGNMENT).is_err());
}

#[test]
fn test_per_draw_over_limit_fails_build() {
    let configs = vec![
        uniform("model", T::Matrix4, F::PerDraw),
        uniform("normal", T::Matrix4, F::PerDraw),
        uniform("extra", T::Float32, F::PerDraw),
    ];
    assert!(FrequencyLayout::build(&configs, ALIGNMENT).is_err());
}

// ============================================================================
// Binding order
// ============================================================================

fn interleaved() -> Vec<ShaderUniformConfig> {
    vec![
        uniform("albedo", T::Texture, F::PerGroup),
        uniform("tint", T::Float32_4, F::PerGroup),
        uniform("albedo_sampler", T::Sampler, F::PerGroup),
        uniform("normal", T::Texture, F::PerGroup).array(2),
        uniform("shadow_sampler", T::Sampler, F::PerGroup),
        uniform("roughness", T::Float32, F::PerGroup),
    ]
}

#[test]
fn test_sorted_indices_follow_declaration_order() {
    let layout = FrequencyLayout::build(&interleaved(), ALIGNMENT).unwrap();
    let info = layout.info(F::PerGroup);
    assert_eq!(info.sampler_indices, vec![2, 4]);
    assert_eq!(info.texture_indices, vec![0, 3]);
    assert_eq!(info.sorted_indices, vec![0, 2, 3, 4]);
    assert_eq!(info.texture_element_count, 3);

    // UBO sits at binding 0, descriptors follow in sorted order
    let bindings: Vec<u32> = info.sorted_indices.iter().map(|&i| layout.uniforms[i as usize].binding).collect();
    assert_eq!(bindings, vec![1, 2, 3, 4]);
}

#[test]
fn test_sorted_binding_order_is_stable_across_builds() {
    let serialize = |layout: &FrequencyLayout| -> Vec<u16> {
        ShaderUpdateFrequency::ALL
            .iter()
            .flat_map(|f| layout.info(*f).sorted_indices.clone())
            .collect()
    };
    let first = serialize(&FrequencyLayout::build(&interleaved(), ALIGNMENT).unwrap());
    let second = serialize(&FrequencyLayout::build(&interleaved(), ALIGNMENT).unwrap());
    assert_eq!(first, second);

    let info = FrequencyLayout::build(&interleaved(), ALIGNMENT).unwrap().frequencies[F::PerGroup.index()].clone();
    assert_eq!(sorted_binding_indices(&info.sampler_indices, &info.texture_indices), first);
}

#[test]
fn test_descriptors_without_ubo_start_at_binding_zero() {
    let configs = vec![
        uniform("shadow_map", T::Texture, F::PerFrame),
        uniform("shadow_sampler", T::Sampler, F::PerFrame),
    ];
    let layout = FrequencyLayout::build(&configs, ALIGNMENT).unwrap();
    assert_eq!(layout.uniforms[0].binding, 0);
    assert_eq!(layout.uniforms[1].binding, 1);
    assert_eq!(layout.uniforms[0].state_index, 0);
    assert_eq!(layout.uniforms[1].state_index, 0);
}

#[test]
fn test_duplicate_uniform_name_fails() {
    let configs = vec![
        uniform("colour", T::Float32_4, F::PerGroup),
        uniform("colour", T::Float32_4, F::PerDraw),
    ];
    assert!(FrequencyLayout::build(&configs, ALIGNMENT).is_err());
}

#[test]
fn test_zero_sized_custom_uniform_fails() {
    let configs = vec![uniform("empty", T::Custom(0), F::PerFrame)];
    assert!(FrequencyLayout::build(&configs, ALIGNMENT).is_err());
}
