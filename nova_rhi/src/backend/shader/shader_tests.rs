use super::*;
use crate::device::*;
use crate::backend::mock_device::{MockCall, MockDevice};
use crate::backend::shader::config::{ShaderAttributeConfig, ShaderStageConfig, ShaderUniformConfig};
use crate::backend::texture::TextureDesc;
use ShaderUniformType as T;
use ShaderUpdateFrequency as F;

const COMMAND_BUFFER: RawCommandBuffer = RawCommandBuffer(9000);
const IMAGE_COUNT: u32 = 3;

struct Fixture {
    ctx: GpuContext<MockDevice>,
    textures: TextureTable,
    samplers: SamplerTable,
    defaults: ShaderDefaults,
}

fn fixture_with(device: MockDevice) -> Fixture {
    let mut ctx = GpuContext::new(device);
    let mut textures = TextureTable::new();
    let mut samplers = SamplerTable::new();
    let texture = textures
        .acquire(&mut ctx, TextureDesc::new("default_base_colour", 2, 2, Format::R8G8B8A8_UNORM))
        .unwrap();
    let sampler = samplers.acquire(&mut ctx, "default", SamplerDesc::default()).unwrap();
    ctx.device.clear_calls();
    Fixture { ctx, textures, samplers, defaults: ShaderDefaults { sampler, texture } }
}

fn fixture() -> Fixture {
    fixture_with(MockDevice::new())
}

fn stage(stage: ShaderStage) -> ShaderStageConfig {
    ShaderStageConfig { stage, spirv: vec![0; 8] }
}

fn uniform(name: &str, uniform_type: ShaderUniformType, frequency: ShaderUpdateFrequency) -> ShaderUniformConfig {
    ShaderUniformConfig::new(name, uniform_type, frequency)
}

fn base_config(uniforms: Vec<ShaderUniformConfig>) -> ShaderConfig {
    ShaderConfig {
        name: "test".to_string(),
        stages: vec![stage(ShaderStage::Vertex), stage(ShaderStage::Fragment)],
        attributes: vec![ShaderAttributeConfig { name: "in_position".to_string(), format: Format::R32G32B32_SFLOAT }],
        uniforms,
        max_groups: 4,
        max_per_draw_count: 0,
        ..ShaderConfig::default()
    }
}

/// 1 per-frame mat4, 1 per-group vec4 + 1 per-group sampler, nothing per draw
fn scenario_a() -> ShaderConfig {
    base_config(vec![
        uniform("view_projection", T::Matrix4, F::PerFrame),
        uniform("diffuse_colour", T::Float32_4, F::PerGroup),
        uniform("diffuse_sampler", T::Sampler, F::PerGroup),
    ])
}

fn create(fx: &mut Fixture, config: &ShaderConfig) -> Shader {
    Shader::create(&mut fx.ctx, config, IMAGE_COUNT, Format::B8G8R8A8_UNORM, fx.defaults).unwrap()
}

fn apply(fx: &mut Fixture, shader: &mut Shader, frequency: ShaderUpdateFrequency, image_index: u32, frame_number: u64) -> Result<usize> {
    let resources = ApplyResources {
        textures: &fx.textures,
        samplers: &fx.samplers,
        default_texture: fx.defaults.texture,
    };
    let frame = ApplyFrame { image_index, frame_number, command_buffer: COMMAND_BUFFER };
    shader.apply(&mut fx.ctx.device, frequency, &frame, &resources)
}

fn last_writes(device: &MockDevice) -> Vec<DescriptorWrite> {
    device
        .calls
        .iter()
        .rev()
        .find_map(|call| match call {
            MockCall::UpdateDescriptorSets(writes) => Some(writes.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn set_layout_bindings(device: &MockDevice) -> Vec<Vec<DescriptorSetLayoutBinding>> {
    device
        .calls
        .iter()
        .filter_map(|call| match call {
            MockCall::CreateDescriptorSetLayout { bindings, .. } => Some(bindings.clone()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn test_scenario_a_creates_two_set_layouts() {
    let mut fx = fixture();
    let shader = create(&mut fx, &scenario_a());

    assert_eq!(shader.descriptor_set_count(), 2);
    assert_eq!(shader.set_indices(), [Some(0), Some(1), None]);
    assert_eq!(shader.layout().info(F::PerFrame).ubo_stride, 256);
    assert_eq!(shader.layout().info(F::PerGroup).uniform_sampler_count, 1);

    let bindings = set_layout_bindings(&fx.ctx.device);
    assert_eq!(bindings.len(), 2);
    assert_eq!(bindings[0].len(), 1);
    assert_eq!(bindings[0][0].descriptor_type, DescriptorType::UniformBuffer);
    assert_eq!(bindings[1][1].binding, 1);
    assert_eq!(bindings[1][1].descriptor_type, DescriptorType::Sampler);

    let layouts = fx.ctx.device.calls.iter().find_map(|call| match call {
        MockCall::CreatePipelineLayout { set_layouts, push_constants, .. } => Some((set_layouts.len(), push_constants.len())),
        _ => None,
    });
    assert_eq!(layouts, Some((2, 0)));
}

#[test]
fn test_pool_sized_for_every_user_and_image() {
    let mut fx = fixture();
    create(&mut fx, &scenario_a());

    let pool = fx.ctx.device.calls.iter().find_map(|call| match call {
        MockCall::CreateDescriptorPool { sizes, max_sets, .. } => Some((sizes.clone(), *max_sets)),
        _ => None,
    });
    let (sizes, max_sets) = pool.unwrap();
    // One per-frame user plus four groups, three images each
    assert_eq!(
        sizes,
        vec![
            DescriptorPoolSize { descriptor_type: DescriptorType::UniformBuffer, count: 15 },
            DescriptorPoolSize { descriptor_type: DescriptorType::Sampler, count: 12 },
        ]
    );
    assert_eq!(max_sets, 15);
}

#[test]
fn test_uniform_buffers_hold_frame_and_group_blocks() {
    let mut fx = fixture();
    let shader = create(&mut fx, &scenario_a());
    assert_eq!(shader.uniform_buffers().len(), IMAGE_COUNT as usize);
    assert!(shader.uniform_buffers().iter().all(|b| b.total_size() == 256 + 256 * 4));

    // The per-frame state exists from creation: one set per image
    assert_eq!(shader.active_states(F::PerFrame), 1);
    let sets = fx.ctx.device.calls.iter().find_map(|call| match call {
        MockCall::AllocateDescriptorSets(sets) => Some(sets.len()),
        _ => None,
    });
    assert_eq!(sets, Some(IMAGE_COUNT as usize));
}

#[test]
fn test_vertex_attribute_offsets_follow_declaration() {
    let mut fx = fixture();
    let mut config = scenario_a();
    config.attributes = vec![
        ShaderAttributeConfig { name: "in_position".to_string(), format: Format::R32G32B32_SFLOAT },
        ShaderAttributeConfig { name: "in_texcoord".to_string(), format: Format::R32G32_SFLOAT },
        ShaderAttributeConfig { name: "in_colour".to_string(), format: Format::R32G32B32A32_SFLOAT },
    ];
    let shader = create(&mut fx, &config);
    let offsets: Vec<u32> = shader.attributes().iter().map(|a| a.offset).collect();
    assert_eq!(offsets, vec![0, 12, 20]);
    assert_eq!(shader.vertex_stride(), 36);
}

#[test]
fn test_pipeline_per_topology_class_with_wireframe_twins() {
    let mut fx = fixture();
    let mut config = scenario_a();
    config.topology_types = PrimitiveTopologyTypes::POINT_LIST
        | PrimitiveTopologyTypes::LINE_STRIP
        | PrimitiveTopologyTypes::TRIANGLE_LIST
        | PrimitiveTopologyTypes::TRIANGLE_STRIP;
    config.flags |= ShaderFlags::WIREFRAME;
    let shader = create(&mut fx, &config);

    let created: Vec<(PrimitiveTopology, PolygonMode)> = fx
        .ctx
        .device
        .calls
        .iter()
        .filter_map(|call| match call {
            MockCall::CreatePipeline { topology, polygon_mode, .. } => Some((*topology, *polygon_mode)),
            _ => None,
        })
        .collect();
    assert_eq!(
        created,
        vec![
            (PrimitiveTopology::PointList, PolygonMode::Fill),
            (PrimitiveTopology::LineStrip, PolygonMode::Fill),
            (PrimitiveTopology::LineStrip, PolygonMode::Line),
            (PrimitiveTopology::TriangleList, PolygonMode::Fill),
            (PrimitiveTopology::TriangleList, PolygonMode::Line),
        ]
    );
    assert!(shader.wireframe_pipeline(PrimitiveTopologyClass::Point).is_none());
    assert!(shader.wireframe_pipeline(PrimitiveTopologyClass::Triangle).is_some());
    assert_eq!(shader.current_topology(), PrimitiveTopology::PointList);
}

#[test]
fn test_unsupported_stage_is_skipped() {
    let mut fx = fixture();
    let mut config = scenario_a();
    config.stages.push(stage(ShaderStage::Geometry));
    create(&mut fx, &config);
    assert_eq!(fx.ctx.device.count(|c| matches!(c, MockCall::CreateShaderModule(_))), 2);
    assert_eq!(fx.ctx.device.count(|c| matches!(c, MockCall::CreateShaderModule(ShaderStage::Geometry))), 0);
}

#[test]
fn test_failed_creation_destroys_partial_shader() {
    let mut fx = fixture();
    let mut config = scenario_a();
    config.stages = vec![stage(ShaderStage::Fragment)];
    let result = Shader::create(&mut fx.ctx, &config, IMAGE_COUNT, Format::B8G8R8A8_UNORM, fx.defaults);
    assert!(result.is_err());
    assert_eq!(fx.ctx.device.count(|c| matches!(c, MockCall::CreateShaderModule(_))), 1);
    assert_eq!(fx.ctx.device.count(|c| matches!(c, MockCall::DestroyShaderModule(_))), 1);
}

#[test]
fn test_invalid_spirv_fails_creation() {
    let mut fx = fixture();
    let mut config = scenario_a();
    config.stages[1].spirv = vec![0; 6];
    assert!(Shader::create(&mut fx.ctx, &config, IMAGE_COUNT, Format::B8G8R8A8_UNORM, fx.defaults).is_err());
    assert_eq!(fx.ctx.device.count(|c| matches!(c, MockCall::DestroyShaderModule(_))), 1);
}

#[test]
fn test_destroy_releases_every_device_object() {
    let mut fx = fixture();
    let buffers_before = fx.ctx.device.live_buffers();
    let mut shader = create(&mut fx, &scenario_a());
    shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    shader.destroy(&mut fx.ctx).unwrap();

    let device = &fx.ctx.device;
    assert_eq!(device.count(|c| matches!(c, MockCall::WaitIdle)), 1);
    assert_eq!(device.count(|c| matches!(c, MockCall::DestroyPipeline(_))), 1);
    assert_eq!(device.count(|c| matches!(c, MockCall::DestroyPipelineLayout(_))), 1);
    assert_eq!(device.count(|c| matches!(c, MockCall::DestroyDescriptorSetLayout(_))), 2);
    assert_eq!(device.count(|c| matches!(c, MockCall::DestroyDescriptorPool(_))), 1);
    assert_eq!(device.count(|c| matches!(c, MockCall::DestroyShaderModule(_))), 2);
    assert_eq!(device.live_buffers(), buffers_before);
}

// ============================================================================
// Frequency states
// ============================================================================

#[test]
fn test_per_frame_state_is_not_acquirable() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    assert!(shader.acquire_state(&mut fx.ctx, F::PerFrame, fx.defaults).is_err());
}

#[test]
fn test_per_frame_state_is_not_releasable() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    let handle = shader.per_frame_handle();
    assert!(shader.release_state(&mut fx.ctx, handle).is_err());
    assert_eq!(shader.active_states(F::PerFrame), 1);
    assert_eq!(fx.ctx.device.count(|c| matches!(c, MockCall::FreeDescriptorSets(_))), 0);
}

#[test]
fn test_group_states_are_bounded_by_max_groups() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    let handles: Vec<_> = (0..4)
        .map(|_| shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap())
        .collect();
    assert!(shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).is_err());

    shader.release_state(&mut fx.ctx, handles[2]).unwrap();
    let again = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    assert_eq!(again.index(), handles[2].index());
    assert_eq!(shader.active_states(F::PerGroup), 4);
}

#[test]
fn test_release_drains_device_and_frees_sets() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    let handle = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    fx.ctx.device.clear_calls();

    shader.release_state(&mut fx.ctx, handle).unwrap();
    let device = &fx.ctx.device;
    assert!(matches!(device.calls.first(), Some(MockCall::WaitIdle)));
    let freed = device.calls.iter().find_map(|call| match call {
        MockCall::FreeDescriptorSets(sets) => Some(sets.len()),
        _ => None,
    });
    assert_eq!(freed, Some(IMAGE_COUNT as usize));
}

#[test]
fn test_released_group_handle_is_rejected() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    let old = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    shader.release_state(&mut fx.ctx, old).unwrap();
    let new = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();

    assert_eq!(old.index(), new.index());
    assert!(shader.bind_per_group(old).is_err());
    assert!(shader.release_state(&mut fx.ctx, old).is_err());
    assert!(shader.bind_per_group(new).is_ok());
}

#[test]
fn test_group_ubo_ranges_do_not_overlap() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    let a = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    let b = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();

    let mut offsets = Vec::new();
    for handle in [a, b] {
        shader.bind_per_group(handle).unwrap();
        apply(&mut fx, &mut shader, F::PerGroup, 0, 1).unwrap();
        let ubo = last_writes(&fx.ctx.device).into_iter().find_map(|w| match w.resource {
            DescriptorResource::UniformBuffer { offset, range, .. } => Some((offset, range)),
            _ => None,
        });
        offsets.push(ubo.unwrap());
    }
    // Per-frame owns 0..256
    assert_eq!(offsets, vec![(256, 256), (512, 256)]);
}

// ============================================================================
// Swapchain image count
// ============================================================================

#[test]
fn test_growing_image_count_rebuilds_per_image_resources() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    let group = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    let colour = [9u8; 16];
    shader.bind_per_group(group).unwrap();
    let location = shader.uniform_location("diffuse_colour").unwrap();
    shader.uniform_set(&mut fx.ctx.device, location, 0, UniformValue::Data(&colour), 0).unwrap();

    let old_pool = shader.descriptor_pool();
    fx.ctx.device.clear_calls();
    assert!(!shader.ensure_image_count(&mut fx.ctx, IMAGE_COUNT).unwrap());
    assert!(fx.ctx.device.calls.is_empty());

    assert!(shader.ensure_image_count(&mut fx.ctx, 4).unwrap());
    assert_eq!(shader.image_count(), 4);
    assert_eq!(shader.uniform_buffers().len(), 4);
    assert!(fx.ctx.device.calls.contains(&MockCall::DestroyDescriptorPool(old_pool)));
    assert_ne!(shader.descriptor_pool(), old_pool);
    let max_sets = fx.ctx.device.calls.iter().find_map(|call| match call {
        MockCall::CreateDescriptorPool { max_sets, .. } => Some(*max_sets),
        _ => None,
    });
    assert_eq!(max_sets, Some(20));

    // The added buffer starts as a copy of image 0 with the same ranges
    let memory = fx.ctx.device.buffer_contents(shader.uniform_buffers()[3].raw()).unwrap();
    assert_eq!(&memory[256..272], &colour);

    shader.bind_per_frame();
    assert_eq!(apply(&mut fx, &mut shader, F::PerFrame, 3, 1).unwrap(), 1);
    shader.bind_per_group(group).unwrap();
    assert_eq!(apply(&mut fx, &mut shader, F::PerGroup, 3, 1).unwrap(), 2);
    let ubo = last_writes(&fx.ctx.device).into_iter().find_map(|w| match w.resource {
        DescriptorResource::UniformBuffer { buffer, offset, .. } => Some((buffer, offset)),
        _ => None,
    });
    assert_eq!(ubo, Some((shader.uniform_buffers()[3].raw(), 256)));
}

#[test]
fn test_states_acquired_after_growth_skip_live_ranges() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    shader.ensure_image_count(&mut fx.ctx, 5).unwrap();

    let second = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    shader.bind_per_group(second).unwrap();
    apply(&mut fx, &mut shader, F::PerGroup, 4, 1).unwrap();
    let offset = last_writes(&fx.ctx.device).into_iter().find_map(|w| match w.resource {
        DescriptorResource::UniformBuffer { offset, .. } => Some(offset),
        _ => None,
    });
    assert_eq!(offset, Some(512));
    assert_eq!(shader.active_states(F::PerGroup), 2);
}

// ============================================================================
// Uniforms
// ============================================================================

#[test]
fn test_uniform_data_lands_in_image_buffer() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    let handle = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();

    let location = shader.uniform_location("view_projection").unwrap();
    let matrix: Vec<u8> = (0..64).collect();
    shader.bind_per_frame();
    shader.uniform_set(&mut fx.ctx.device, location, 0, UniformValue::Data(&matrix), 1).unwrap();

    let colour = [7u8; 16];
    shader.bind_per_group(handle).unwrap();
    let location = shader.uniform_location("diffuse_colour").unwrap();
    shader.uniform_set(&mut fx.ctx.device, location, 0, UniformValue::Data(&colour), 1).unwrap();

    let memory = fx.ctx.device.buffer_contents(shader.uniform_buffers()[1].raw()).unwrap();
    assert_eq!(&memory[0..64], matrix.as_slice());
    assert_eq!(&memory[256..272], &colour);
    let other = fx.ctx.device.buffer_contents(shader.uniform_buffers()[0].raw()).unwrap();
    assert!(other[0..64].iter().all(|b| *b == 0));
}

#[test]
fn test_uniform_of_unbound_frequency_is_rejected() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    shader.bind_per_frame();
    let location = shader.uniform_location("diffuse_colour").unwrap();
    assert!(shader
        .uniform_set(&mut fx.ctx.device, location, 0, UniformValue::Data(&[0; 16]), 0)
        .is_err());
}

#[test]
fn test_uniform_value_must_match_type_and_size() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    let handle = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    shader.bind_per_group(handle).unwrap();
    let colour = shader.uniform_location("diffuse_colour").unwrap();
    let sampler = shader.uniform_location("diffuse_sampler").unwrap();

    let device = &mut fx.ctx.device;
    assert!(shader.uniform_set(device, sampler, 0, UniformValue::Data(&[0; 4]), 0).is_err());
    assert!(shader.uniform_set(device, colour, 0, UniformValue::Sampler(fx.defaults.sampler), 0).is_err());
    assert!(shader.uniform_set(device, colour, 0, UniformValue::Data(&[0; 20]), 0).is_err());
    assert!(shader.uniform_set(device, colour, 1, UniformValue::Data(&[0; 16]), 0).is_err());
    assert_eq!(shader.uniform_location("missing"), None);
}

// ============================================================================
// Apply
// ============================================================================

#[test]
fn test_apply_skips_fresh_descriptors_within_a_frame() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    let handle = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    shader.bind_per_group(handle).unwrap();

    assert_eq!(apply(&mut fx, &mut shader, F::PerGroup, 0, 1).unwrap(), 2);
    assert_eq!(apply(&mut fx, &mut shader, F::PerGroup, 0, 1).unwrap(), 0);
    // Another image has its own stamps
    assert_eq!(apply(&mut fx, &mut shader, F::PerGroup, 1, 1).unwrap(), 2);
    // The next render frame writes again
    assert_eq!(apply(&mut fx, &mut shader, F::PerGroup, 0, 2).unwrap(), 2);

    assert_eq!(fx.ctx.device.count(|c| matches!(c, MockCall::UpdateDescriptorSets(_))), 3);
    assert_eq!(
        fx.ctx.device.count(|c| matches!(c, MockCall::BindDescriptorSets { first_set: 1, .. })),
        4
    );
}

#[test]
fn test_apply_binds_each_frequency_at_its_set_index() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    let handle = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();

    shader.bind_per_frame();
    assert_eq!(apply(&mut fx, &mut shader, F::PerFrame, 2, 5).unwrap(), 1);
    shader.bind_per_group(handle).unwrap();
    apply(&mut fx, &mut shader, F::PerGroup, 2, 5).unwrap();

    let binds: Vec<u32> = fx
        .ctx
        .device
        .calls
        .iter()
        .filter_map(|call| match call {
            MockCall::BindDescriptorSets { first_set, sets, .. } if sets.len() == 1 => Some(*first_set),
            _ => None,
        })
        .collect();
    assert_eq!(binds, vec![0, 1]);
}

#[test]
fn test_sampler_change_rewrites_only_that_element() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    let handle = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    shader.bind_per_group(handle).unwrap();
    apply(&mut fx, &mut shader, F::PerGroup, 0, 1).unwrap();

    let nearest = SamplerDesc { min_filter: Filter::Nearest, mag_filter: Filter::Nearest, ..SamplerDesc::default() };
    let other = fx.samplers.acquire(&mut fx.ctx, "nearest", nearest).unwrap();
    let location = shader.uniform_location("diffuse_sampler").unwrap();
    shader.uniform_set(&mut fx.ctx.device, location, 0, UniformValue::Sampler(other), 0).unwrap();

    assert_eq!(apply(&mut fx, &mut shader, F::PerGroup, 0, 1).unwrap(), 1);
    let writes = last_writes(&fx.ctx.device);
    assert_eq!(writes[0].binding, 1);
    assert_eq!(writes[0].resource, DescriptorResource::Sampler(fx.samplers.raw(other).unwrap()));
}

#[test]
fn test_invalid_sampler_is_reported_and_nothing_written() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    let handle = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    shader.bind_per_group(handle).unwrap();

    let doomed = fx.samplers.acquire(&mut fx.ctx, "doomed", SamplerDesc::default()).unwrap();
    let location = shader.uniform_location("diffuse_sampler").unwrap();
    shader.uniform_set(&mut fx.ctx.device, location, 0, UniformValue::Sampler(doomed), 0).unwrap();
    fx.samplers.release(&mut fx.ctx, doomed).unwrap();
    fx.ctx.device.clear_calls();

    assert!(apply(&mut fx, &mut shader, F::PerGroup, 0, 1).is_err());
    assert_eq!(fx.ctx.device.count(|c| matches!(c, MockCall::UpdateDescriptorSets(_))), 0);

    // Stamps were not committed: fixing the binding writes the UBO as well
    shader.uniform_set(&mut fx.ctx.device, location, 0, UniformValue::Sampler(fx.defaults.sampler), 0).unwrap();
    assert_eq!(apply(&mut fx, &mut shader, F::PerGroup, 0, 1).unwrap(), 2);
}

fn textured_config() -> ShaderConfig {
    base_config(vec![
        uniform("projection", T::Matrix4, F::PerFrame),
        uniform("albedo", T::Texture, F::PerGroup),
        uniform("albedo_sampler", T::Sampler, F::PerGroup),
    ])
}

#[test]
fn test_unwritten_texture_falls_back_to_default() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &textured_config());
    let albedo = fx
        .textures
        .acquire(&mut fx.ctx, TextureDesc::new("albedo", 4, 4, Format::R8G8B8A8_UNORM))
        .unwrap();
    let handle = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    shader.bind_per_group(handle).unwrap();
    let location = shader.uniform_location("albedo").unwrap();
    shader.uniform_set(&mut fx.ctx.device, location, 0, UniformValue::Texture(albedo), 0).unwrap();

    apply(&mut fx, &mut shader, F::PerGroup, 0, 1).unwrap();
    let default_view = fx.textures.get(fx.defaults.texture).unwrap().image(0).view();
    let view_of = |writes: Vec<DescriptorWrite>| {
        writes.into_iter().find_map(|w| match w.resource {
            DescriptorResource::SampledImage { view, layout } => Some((view, layout)),
            _ => None,
        })
    };
    assert_eq!(
        view_of(last_writes(&fx.ctx.device)),
        Some((default_view, ImageLayout::ShaderReadOnlyOptimal))
    );

    fx.textures.get_mut(albedo).unwrap().bump_generation();
    apply(&mut fx, &mut shader, F::PerGroup, 0, 2).unwrap();
    let albedo_view = fx.textures.get(albedo).unwrap().image(0).view();
    assert_eq!(view_of(last_writes(&fx.ctx.device)).map(|(view, _)| view), Some(albedo_view));
}

#[test]
fn test_texture_binding_order_matches_layout() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &textured_config());
    let handle = shader.acquire_state(&mut fx.ctx, F::PerGroup, fx.defaults).unwrap();
    shader.bind_per_group(handle).unwrap();
    apply(&mut fx, &mut shader, F::PerGroup, 0, 1).unwrap();

    let layout_bindings: Vec<u32> = set_layout_bindings(&fx.ctx.device)[1].iter().map(|b| b.binding).collect();
    let written: Vec<u32> = last_writes(&fx.ctx.device).iter().map(|w| w.binding).collect();
    // No plain group uniforms, so no UBO at binding 0
    assert_eq!(layout_bindings, vec![0, 1]);
    assert_eq!(written, layout_bindings);
}

// ============================================================================
// Per-draw
// ============================================================================

fn per_draw_config() -> ShaderConfig {
    ShaderConfig {
        max_per_draw_count: 2,
        ..base_config(vec![
            uniform("projection", T::Matrix4, F::PerFrame),
            uniform("model", T::Matrix4, F::PerDraw),
        ])
    }
}

#[test]
fn test_per_draw_uniforms_travel_as_push_constants() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &per_draw_config());
    assert_eq!(shader.set_indices(), [Some(0), None, None]);

    let range = fx.ctx.device.calls.iter().find_map(|call| match call {
        MockCall::CreatePipelineLayout { push_constants, .. } => push_constants.first().copied(),
        _ => None,
    });
    assert_eq!(
        range,
        Some(PushConstantRange { stages: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT, offset: 0, size: 128 })
    );

    let handle = shader.acquire_state(&mut fx.ctx, F::PerDraw, fx.defaults).unwrap();
    shader.bind_per_draw(handle).unwrap();
    let model: Vec<u8> = (100..164).collect();
    let location = shader.uniform_location("model").unwrap();
    shader.uniform_set(&mut fx.ctx.device, location, 0, UniformValue::Data(&model), 0).unwrap();
    fx.ctx.device.clear_calls();

    assert_eq!(apply(&mut fx, &mut shader, F::PerDraw, 0, 1).unwrap(), 0);
    let pushed = fx.ctx.device.calls.iter().find_map(|call| match call {
        MockCall::PushConstants { data, offset: 0, .. } => Some(data.clone()),
        _ => None,
    });
    let pushed = pushed.unwrap();
    assert_eq!(pushed.len(), 128);
    assert_eq!(&pushed[..64], model.as_slice());
    assert_eq!(fx.ctx.device.count(|c| matches!(c, MockCall::BindDescriptorSets { .. })), 0);
}

#[test]
fn test_per_draw_state_without_descriptors_allocates_no_sets() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &per_draw_config());
    fx.ctx.device.clear_calls();
    shader.acquire_state(&mut fx.ctx, F::PerDraw, fx.defaults).unwrap();
    assert_eq!(fx.ctx.device.count(|c| matches!(c, MockCall::AllocateDescriptorSets(_))), 0);
}

// ============================================================================
// Pipelines
// ============================================================================

fn bound_pipelines(device: &MockDevice) -> Vec<RawPipeline> {
    device
        .calls
        .iter()
        .filter_map(|call| match call {
            MockCall::BindPipeline(_, pipeline) => Some(*pipeline),
            _ => None,
        })
        .collect()
}

#[test]
fn test_topology_change_of_class_rebinds_pipeline() {
    let mut fx = fixture();
    let mut config = scenario_a();
    config.topology_types = PrimitiveTopologyTypes::LINE_LIST | PrimitiveTopologyTypes::TRIANGLE_LIST;
    let mut shader = create(&mut fx, &config);
    fx.ctx.device.clear_calls();

    shader.set_topology(&mut fx.ctx.device, None, PrimitiveTopology::TriangleList).unwrap();
    shader.use_shader(&mut fx.ctx.device, COMMAND_BUFFER).unwrap();
    shader
        .set_topology(&mut fx.ctx.device, Some(COMMAND_BUFFER), PrimitiveTopology::LineList)
        .unwrap();

    assert_eq!(
        bound_pipelines(&fx.ctx.device),
        vec![
            shader.pipeline(PrimitiveTopologyClass::Triangle).unwrap(),
            shader.pipeline(PrimitiveTopologyClass::Line).unwrap(),
        ]
    );
    assert_eq!(fx.ctx.device.count(|c| matches!(c, MockCall::SetTopology(_, PrimitiveTopology::LineList))), 1);
    assert!(shader
        .set_topology(&mut fx.ctx.device, None, PrimitiveTopology::TriangleFan)
        .is_err());
}

#[test]
fn test_wireframe_requires_twin_pipeline() {
    let mut fx = fixture();
    let mut shader = create(&mut fx, &scenario_a());
    assert!(shader.set_wireframe(true).is_err());

    let mut config = scenario_a();
    config.flags |= ShaderFlags::WIREFRAME;
    let mut shader = create(&mut fx, &config);
    shader.set_wireframe(true).unwrap();
    fx.ctx.device.clear_calls();
    shader.use_shader(&mut fx.ctx.device, COMMAND_BUFFER).unwrap();
    assert_eq!(
        bound_pipelines(&fx.ctx.device),
        vec![shader.wireframe_pipeline(PrimitiveTopologyClass::Triangle).unwrap()]
    );
}

#[test]
fn test_pipelines_without_dynamic_state_skip_topology_command() {
    let mut device = MockDevice::new();
    device.capabilities.support_flags = DeviceSupportFlags::NATIVE_DYNAMIC_RENDERING;
    let mut fx = fixture_with(device);
    let shader = create(&mut fx, &scenario_a());
    fx.ctx.device.clear_calls();
    shader.use_shader(&mut fx.ctx.device, COMMAND_BUFFER).unwrap();
    assert_eq!(fx.ctx.device.count(|c| matches!(c, MockCall::SetTopology(..))), 0);
    assert_eq!(bound_pipelines(&fx.ctx.device).len(), 1);
}
