/// Shader - pipelines, descriptor layouts and frequency states built from a `ShaderConfig`
///
/// Creation turns the frequency layout into a descriptor pool, up to three
/// set layouts (compacted), a pipeline layout and one pipeline per topology
/// class. At draw time `apply` writes only the stale descriptors of the
/// active state for the current swapchain image and binds its set.

use crate::error::Result;
use crate::device::*;
use crate::backend::buffer::{RenderBuffer, RenderBufferTrackType, RenderBufferType};
use crate::backend::context::GpuContext;
use crate::backend::sampler::{SamplerHandle, SamplerTable};
use crate::backend::shader::config::{ShaderConfig, ShaderFlags, ShaderUniformType, ShaderUpdateFrequency};
use crate::backend::shader::frequency::{FrequencyLayout, ShaderUniform};
use crate::backend::shader::state::{BindingState, FrequencyHandle, FrequencyState, FrequencyStateArray, INVALID_STAMP};
use crate::backend::texture::{TextureFlags, TextureHandle, TextureSlot, TextureTable, INVALID_GENERATION};
use crate::{engine_bail, engine_debug, engine_err, engine_warn};

const SOURCE: &str = "nova::rhi::Shader";

/// Stages every descriptor binding and the push constant range are visible to
const BINDING_STAGES: ShaderStageFlags = ShaderStageFlags::VERTEX.union(ShaderStageFlags::FRAGMENT);

/// Topologies in class order; the first enabled one of a class is baked into its pipeline
const TOPOLOGIES: [(PrimitiveTopology, PrimitiveTopologyTypes); 6] = [
    (PrimitiveTopology::PointList, PrimitiveTopologyTypes::POINT_LIST),
    (PrimitiveTopology::LineList, PrimitiveTopologyTypes::LINE_LIST),
    (PrimitiveTopology::LineStrip, PrimitiveTopologyTypes::LINE_STRIP),
    (PrimitiveTopology::TriangleList, PrimitiveTopologyTypes::TRIANGLE_LIST),
    (PrimitiveTopology::TriangleStrip, PrimitiveTopologyTypes::TRIANGLE_STRIP),
    (PrimitiveTopology::TriangleFan, PrimitiveTopologyTypes::TRIANGLE_FAN),
];

fn topology_flag(topology: PrimitiveTopology) -> PrimitiveTopologyTypes {
    TOPOLOGIES
        .iter()
        .find(|(candidate, _)| *candidate == topology)
        .map(|(_, flag)| *flag)
        .unwrap_or(PrimitiveTopologyTypes::empty())
}

/// Resources newly acquired states start out bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderDefaults {
    pub sampler: SamplerHandle,
    /// Also stands in for textures that have never been written
    pub texture: TextureHandle,
}

/// Value handed to `Shader::uniform_set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformValue<'a> {
    /// Raw bytes of a plain uniform element (or consecutive elements)
    Data(&'a [u8]),
    Sampler(SamplerHandle),
    Texture(TextureHandle),
}

impl<'a> UniformValue<'a> {
    /// Bytes of a plain value (`glam::Mat4`, `[f32; 4]`, ...)
    pub fn pod<T: bytemuck::Pod>(value: &'a T) -> Self {
        UniformValue::Data(bytemuck::bytes_of(value))
    }
}

/// Frame position `apply` records into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyFrame {
    pub image_index: u32,
    pub frame_number: u64,
    pub command_buffer: RawCommandBuffer,
}

/// Tables `apply` resolves sampler and texture handles against
pub struct ApplyResources<'a> {
    pub textures: &'a TextureTable,
    pub samplers: &'a SamplerTable,
    pub default_texture: TextureHandle,
}

/// Stamp updates committed once every write of an apply resolved
enum PendingStamp {
    Ubo,
    Sampler { state_index: usize, element: usize },
    Texture { state_index: usize, element: usize },
}

pub struct Shader {
    name: String,
    flags: ShaderFlags,
    modules: Vec<(ShaderStage, RawShaderModule)>,
    attributes: Vec<VertexAttributeDesc>,
    vertex_stride: u32,
    layout: FrequencyLayout,
    descriptor_pool: RawDescriptorPool,
    /// Indexed by frequency; null when the frequency has no set
    set_layouts: [RawDescriptorSetLayout; 3],
    set_indices: [Option<u32>; 3],
    pipeline_layout: RawPipelineLayout,
    /// Indexed by topology class
    pipelines: [Option<RawPipeline>; 3],
    wireframe_pipelines: [Option<RawPipeline>; 3],
    topology_types: PrimitiveTopologyTypes,
    current_topology: PrimitiveTopology,
    wireframe: bool,
    /// One per swapchain image
    uniform_buffers: Vec<RenderBuffer>,
    image_count: u32,
    per_frame: Option<FrequencyState>,
    per_group: FrequencyStateArray,
    per_draw: FrequencyStateArray,
    bound_frequency: ShaderUpdateFrequency,
    bound_group: Option<FrequencyHandle>,
    bound_draw: Option<FrequencyHandle>,
}

impl Shader {
    /// Build every device object of the shader and its per-frame state
    ///
    /// On failure everything created so far is destroyed again.
    pub fn create<D: GpuDevice>(
        context: &mut GpuContext<D>,
        config: &ShaderConfig,
        image_count: u32,
        color_format: Format,
        defaults: ShaderDefaults,
    ) -> Result<Self> {
        let alignment = context.capabilities().min_uniform_buffer_offset_alignment;
        let layout = FrequencyLayout::build(&config.uniforms, alignment)?;
        let image_count = image_count.max(1);

        let mut shader = Self {
            name: config.name.clone(),
            flags: config.flags,
            modules: Vec::new(),
            attributes: Vec::new(),
            vertex_stride: 0,
            set_indices: layout.set_indices(),
            layout,
            descriptor_pool: RawDescriptorPool::NULL,
            set_layouts: [RawDescriptorSetLayout::NULL; 3],
            pipeline_layout: RawPipelineLayout::NULL,
            pipelines: [None; 3],
            wireframe_pipelines: [None; 3],
            topology_types: config.topology_types,
            current_topology: PrimitiveTopology::TriangleList,
            wireframe: false,
            uniform_buffers: Vec::new(),
            image_count,
            per_frame: None,
            per_group: FrequencyStateArray::new(ShaderUpdateFrequency::PerGroup, config.max_groups),
            per_draw: FrequencyStateArray::new(ShaderUpdateFrequency::PerDraw, config.max_per_draw_count),
            bound_frequency: ShaderUpdateFrequency::PerFrame,
            bound_group: None,
            bound_draw: None,
        };

        if let Err(e) = shader.initialize(context, config, color_format, defaults) {
            shader.destroy_resources(context);
            return Err(e);
        }

        engine_debug!(
            SOURCE,
            "Created shader '{}' ({} uniforms, {} descriptor sets)",
            shader.name,
            shader.layout.uniforms.len(),
            shader.layout.descriptor_set_count()
        );
        Ok(shader)
    }

    fn initialize<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        config: &ShaderConfig,
        color_format: Format,
        defaults: ShaderDefaults,
    ) -> Result<()> {
        self.create_modules(context, config)?;
        self.create_attributes(config);
        self.create_descriptor_pool(context, Self::users(config))?;
        self.create_set_layouts(context)?;
        self.create_pipeline_layout(context)?;
        self.create_pipelines(context, config, color_format)?;
        self.create_uniform_buffers(context, config)?;

        let per_frame = self.new_state(context, ShaderUpdateFrequency::PerFrame, defaults)?;
        self.per_frame = Some(per_frame);
        Ok(())
    }

    fn create_modules<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, config: &ShaderConfig) -> Result<()> {
        for stage in &config.stages {
            match stage.stage {
                ShaderStage::Vertex | ShaderStage::Fragment => {}
                other => {
                    engine_warn!(SOURCE, "Shader '{}': {:?} stage is not supported and is ignored", self.name, other);
                    continue;
                }
            }
            let module = context.device.create_shader_module(stage.stage, &stage.spirv)?;
            self.modules.push((stage.stage, module));
        }
        if !self.modules.iter().any(|(stage, _)| *stage == ShaderStage::Vertex) {
            engine_bail!(SOURCE, "Shader '{}' has no vertex stage", self.name);
        }
        Ok(())
    }

    fn create_attributes(&mut self, config: &ShaderConfig) {
        let mut offset = 0;
        for (location, attribute) in config.attributes.iter().enumerate() {
            self.attributes.push(VertexAttributeDesc {
                location: location as u32,
                format: attribute.format,
                offset,
            });
            offset += attribute.format.size_bytes();
        }
        self.vertex_stride = offset;
    }

    /// Concurrent users of each frequency: the singleton, the group pool, the draw pool
    fn users(config: &ShaderConfig) -> [u32; 3] {
        [1, config.max_groups, config.max_per_draw_count]
    }

    fn create_descriptor_pool<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, users: [u32; 3]) -> Result<()> {
        let (mut ubos, mut samplers, mut images, mut max_sets) = (0u32, 0u32, 0u32, 0u32);
        for frequency in ShaderUpdateFrequency::ALL {
            let info = self.layout.info(frequency);
            let users = users[frequency.index()];
            if info.has_ubo(frequency) {
                ubos += users;
            }
            samplers += info.sampler_element_count * users;
            images += info.texture_element_count * users;
            if info.has_descriptor_set(frequency) {
                max_sets += users;
            }
        }

        let sizes: Vec<DescriptorPoolSize> = [
            (DescriptorType::UniformBuffer, ubos),
            (DescriptorType::Sampler, samplers),
            (DescriptorType::SampledImage, images),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(descriptor_type, count)| DescriptorPoolSize {
            descriptor_type,
            count: count * self.image_count,
        })
        .collect();

        if max_sets == 0 {
            return Ok(());
        }
        self.descriptor_pool = context
            .device
            .create_descriptor_pool(&sizes, max_sets * self.image_count)?;
        Ok(())
    }

    fn create_set_layouts<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) -> Result<()> {
        for frequency in ShaderUpdateFrequency::ALL {
            let info = self.layout.info(frequency);
            if !info.has_descriptor_set(frequency) {
                continue;
            }
            let mut bindings = Vec::with_capacity(info.sorted_indices.len() + 1);
            if info.has_ubo(frequency) {
                bindings.push(DescriptorSetLayoutBinding {
                    binding: 0,
                    descriptor_type: DescriptorType::UniformBuffer,
                    count: 1,
                    stages: BINDING_STAGES,
                });
            }
            for &index in &info.sorted_indices {
                let uniform = &self.layout.uniforms[index as usize];
                let descriptor_type = if uniform.uniform_type.is_sampler() {
                    DescriptorType::Sampler
                } else {
                    DescriptorType::SampledImage
                };
                bindings.push(DescriptorSetLayoutBinding {
                    binding: uniform.binding,
                    descriptor_type,
                    count: uniform.array_length,
                    stages: BINDING_STAGES,
                });
            }
            self.set_layouts[frequency.index()] = context.device.create_descriptor_set_layout(&bindings)?;
        }
        Ok(())
    }

    fn create_pipeline_layout<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) -> Result<()> {
        let set_layouts: Vec<RawDescriptorSetLayout> = self
            .set_layouts
            .iter()
            .copied()
            .filter(|layout| !layout.is_null())
            .collect();
        let mut push_constants = Vec::new();
        let per_draw = self.layout.info(ShaderUpdateFrequency::PerDraw);
        if per_draw.uniform_count > 0 {
            push_constants.push(PushConstantRange {
                stages: BINDING_STAGES,
                offset: 0,
                size: per_draw.ubo_stride as u32,
            });
        }
        self.pipeline_layout = context.device.create_pipeline_layout(&set_layouts, &push_constants)?;
        Ok(())
    }

    fn create_pipelines<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        config: &ShaderConfig,
        color_format: Format,
    ) -> Result<()> {
        let capabilities = context.capabilities();
        let dynamic = capabilities.support_flags.has_dynamic_state();
        let depth_format = capabilities.depth_format;
        let line_smooth = capabilities
            .support_flags
            .contains(DeviceSupportFlags::LINE_SMOOTH_RASTERISATION);

        let mut dynamic_states = vec![
            DynamicState::Viewport,
            DynamicState::Scissor,
            DynamicState::StencilCompareMask,
            DynamicState::StencilWriteMask,
            DynamicState::StencilReference,
        ];
        if dynamic {
            dynamic_states.extend([
                DynamicState::FrontFace,
                DynamicState::PrimitiveTopology,
                DynamicState::DepthTestEnable,
                DynamicState::DepthWriteEnable,
                DynamicState::StencilTestEnable,
                DynamicState::StencilOp,
            ]);
        }

        let stencil = StencilState {
            write_mask: if config.flags.contains(ShaderFlags::STENCIL_WRITE) { 0xFF } else { 0 },
            ..StencilState::default()
        };
        let mut desc = GraphicsPipelineDesc {
            name: self.name.clone(),
            stages: self.modules.clone(),
            vertex_stride: self.vertex_stride,
            attributes: self.attributes.clone(),
            layout: self.pipeline_layout,
            topology: PrimitiveTopology::TriangleList,
            polygon_mode: PolygonMode::Fill,
            cull_mode: config.cull_mode,
            winding: Winding::CounterClockwise,
            depth_test: config.flags.contains(ShaderFlags::DEPTH_TEST),
            depth_write: config.flags.contains(ShaderFlags::DEPTH_WRITE),
            stencil_test: config.flags.contains(ShaderFlags::STENCIL_TEST),
            stencil,
            dynamic_states,
            color_format,
            depth_format: Some(depth_format),
            stencil_format: depth_format.has_stencil().then_some(depth_format),
            line_smooth,
        };

        let mut first_topology = None;
        for class in PrimitiveTopologyClass::ALL {
            let Some(topology) = TOPOLOGIES
                .iter()
                .find(|(topology, flag)| topology.class() == class && self.topology_types.contains(*flag))
                .map(|(topology, _)| *topology)
            else {
                continue;
            };
            first_topology.get_or_insert(topology);

            desc.topology = topology;
            desc.polygon_mode = PolygonMode::Fill;
            self.pipelines[class as usize] = Some(context.device.create_graphics_pipeline(&desc)?);

            if config.flags.contains(ShaderFlags::WIREFRAME) && class != PrimitiveTopologyClass::Point {
                desc.polygon_mode = PolygonMode::Line;
                desc.name = format!("{}_wireframe", self.name);
                self.wireframe_pipelines[class as usize] = Some(context.device.create_graphics_pipeline(&desc)?);
                desc.name = self.name.clone();
            }
        }

        match first_topology {
            Some(topology) => {
                self.current_topology = topology;
                Ok(())
            }
            None => Err(engine_err!(SOURCE, "Shader '{}' enables no primitive topology", self.name)),
        }
    }

    fn create_uniform_buffers<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, config: &ShaderConfig) -> Result<()> {
        let frame_stride = self.layout.info(ShaderUpdateFrequency::PerFrame).ubo_stride;
        let group_stride = self.layout.info(ShaderUpdateFrequency::PerGroup).ubo_stride;
        let total = frame_stride + group_stride * u64::from(config.max_groups);
        if total == 0 {
            return Ok(());
        }
        for index in 0..self.image_count {
            let name = format!("{}_uniforms_{}", self.name, index);
            let mut buffer = RenderBuffer::create(
                context,
                &name,
                RenderBufferType::Uniform,
                total,
                RenderBufferTrackType::Freelist,
            )?;
            if let Err(e) = buffer.map() {
                buffer.destroy_completed(context);
                return Err(e);
            }
            self.uniform_buffers.push(buffer);
        }
        Ok(())
    }

    /// Destroy the shader after draining the device
    pub fn destroy<D: GpuDevice>(mut self, context: &mut GpuContext<D>) -> Result<()> {
        context.device.wait_idle()?;
        self.destroy_resources(context);
        engine_debug!(SOURCE, "Destroyed shader '{}'", self.name);
        Ok(())
    }

    fn destroy_resources<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) {
        // Sets go back with the pool, UBO ranges with the buffers
        self.per_group.drain();
        self.per_draw.drain();
        self.per_frame = None;
        self.bound_group = None;
        self.bound_draw = None;
        for mut buffer in self.uniform_buffers.drain(..) {
            buffer.destroy_completed(context);
        }

        for pipeline in self.pipelines.iter_mut().chain(self.wireframe_pipelines.iter_mut()) {
            if let Some(pipeline) = pipeline.take() {
                context.device.destroy_pipeline(pipeline);
            }
        }
        if !self.pipeline_layout.is_null() {
            context.device.destroy_pipeline_layout(self.pipeline_layout);
            self.pipeline_layout = RawPipelineLayout::NULL;
        }
        for layout in self.set_layouts.iter_mut() {
            if !layout.is_null() {
                context.device.destroy_descriptor_set_layout(*layout);
                *layout = RawDescriptorSetLayout::NULL;
            }
        }
        if !self.descriptor_pool.is_null() {
            context.device.destroy_descriptor_pool(self.descriptor_pool);
            self.descriptor_pool = RawDescriptorPool::NULL;
        }
        for (_, module) in self.modules.drain(..) {
            context.device.destroy_shader_module(module);
        }
    }

    // ===== SWAPCHAIN IMAGES =====

    /// Grow the per-image resources to cover `image_count` swapchain images
    ///
    /// Added uniform buffers mirror the first one, so state ranges keep their
    /// offsets and contents. The descriptor pool is rebuilt, every live state
    /// gets one set per image and all its descriptors go stale. Never shrinks.
    /// Returns whether anything was rebuilt.
    pub fn ensure_image_count<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, image_count: u32) -> Result<bool> {
        if image_count <= self.image_count {
            return Ok(false);
        }
        context.device.wait_idle()?;
        let previous = self.image_count;

        if let Some(first) = self.uniform_buffers.first() {
            let total = first.total_size();
            for index in self.uniform_buffers.len() as u32..image_count {
                let name = format!("{}_uniforms_{}", self.name, index);
                let mut buffer = RenderBuffer::create(
                    context,
                    &name,
                    RenderBufferType::Uniform,
                    total,
                    RenderBufferTrackType::Freelist,
                )?;
                let mirrored = match buffer.map() {
                    Ok(()) => buffer.mirror_from(&mut context.device, &self.uniform_buffers[0]),
                    Err(e) => Err(e),
                };
                if let Err(e) = mirrored {
                    buffer.destroy_completed(context);
                    return Err(e);
                }
                self.uniform_buffers.push(buffer);
            }
        }

        let old_pool = self.descriptor_pool;
        self.descriptor_pool = RawDescriptorPool::NULL;
        self.image_count = image_count;
        let users = [1, self.per_group.capacity(), self.per_draw.capacity()];
        let allocated = match self.create_descriptor_pool(context, users) {
            Ok(()) => self.allocate_live_sets(context),
            Err(e) => Err(e),
        };
        let allocated = match allocated {
            Ok(allocated) => allocated,
            Err(e) => {
                if !self.descriptor_pool.is_null() {
                    context.device.destroy_descriptor_pool(self.descriptor_pool);
                }
                self.descriptor_pool = old_pool;
                self.image_count = previous;
                return Err(e);
            }
        };
        if !old_pool.is_null() {
            context.device.destroy_descriptor_pool(old_pool);
        }

        let mut allocated = allocated.into_iter();
        for frequency in ShaderUpdateFrequency::ALL {
            let has_set = self.layout.info(frequency).has_descriptor_set(frequency);
            for state in self.live_states_mut(frequency) {
                if has_set {
                    state.descriptor_sets = allocated.next().unwrap_or_default();
                }
                state.reset_stamps(image_count);
            }
        }

        engine_debug!(
            SOURCE,
            "Shader '{}' grown from {} to {} swapchain images",
            self.name,
            previous,
            image_count
        );
        Ok(true)
    }

    /// One set per image for every live state, in `live_states_mut` order
    fn allocate_live_sets<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) -> Result<Vec<Vec<RawDescriptorSet>>> {
        let mut allocated = Vec::new();
        for frequency in ShaderUpdateFrequency::ALL {
            if !self.layout.info(frequency).has_descriptor_set(frequency) {
                continue;
            }
            let layouts = vec![self.set_layouts[frequency.index()]; self.image_count as usize];
            let count = self.live_states_mut(frequency).len();
            for _ in 0..count {
                allocated.push(context.device.allocate_descriptor_sets(self.descriptor_pool, &layouts)?);
            }
        }
        Ok(allocated)
    }

    fn live_states_mut(&mut self, frequency: ShaderUpdateFrequency) -> Vec<&mut FrequencyState> {
        match frequency {
            ShaderUpdateFrequency::PerFrame => self.per_frame.iter_mut().collect(),
            ShaderUpdateFrequency::PerGroup => self.per_group.iter_mut().collect(),
            ShaderUpdateFrequency::PerDraw => self.per_draw.iter_mut().collect(),
        }
    }

    // ===== FREQUENCY STATES =====

    /// Reserve a UBO range in every per-image buffer, allocate the per-image sets
    /// and bind every sampler/texture element to the defaults
    fn new_state<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        frequency: ShaderUpdateFrequency,
        defaults: ShaderDefaults,
    ) -> Result<FrequencyState> {
        let info = self.layout.info(frequency);
        let stride = info.ubo_stride;

        let mut ubo_offset = None;
        if info.has_ubo(frequency) {
            for index in 0..self.uniform_buffers.len() {
                let offset = self.uniform_buffers[index].allocate(stride);
                let consistent = match (offset, ubo_offset) {
                    (Some(offset), Some(first)) => offset == first,
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if !consistent {
                    if let Some(offset) = offset {
                        self.uniform_buffers[index].free(offset, stride);
                    }
                    if let Some(first) = ubo_offset {
                        for buffer in &mut self.uniform_buffers[..index] {
                            buffer.free(first, stride);
                        }
                    }
                    engine_bail!(SOURCE, "Shader '{}': no uniform buffer space for a {:?} state", self.name, frequency);
                }
                ubo_offset = offset;
            }
        }

        let mut descriptor_sets = Vec::new();
        if info.has_descriptor_set(frequency) {
            let layouts = vec![self.set_layouts[frequency.index()]; self.image_count as usize];
            match context.device.allocate_descriptor_sets(self.descriptor_pool, &layouts) {
                Ok(sets) => descriptor_sets = sets,
                Err(e) => {
                    if let Some(offset) = ubo_offset {
                        for buffer in &mut self.uniform_buffers {
                            buffer.free(offset, stride);
                        }
                    }
                    return Err(e);
                }
            }
        }

        let samplers = info
            .sampler_indices
            .iter()
            .map(|&index| {
                let uniform = &self.layout.uniforms[index as usize];
                BindingState::new(index, uniform.array_length, defaults.sampler, self.image_count)
            })
            .collect();
        let textures = info
            .texture_indices
            .iter()
            .map(|&index| {
                let uniform = &self.layout.uniforms[index as usize];
                BindingState::new(index, uniform.array_length, defaults.texture, self.image_count)
            })
            .collect();
        let push_data = if frequency == ShaderUpdateFrequency::PerDraw && info.uniform_count > 0 {
            vec![0; stride as usize]
        } else {
            Vec::new()
        };

        Ok(FrequencyState {
            descriptor_sets,
            ubo_offset,
            ubo_stamps: vec![INVALID_STAMP; self.image_count as usize],
            samplers,
            textures,
            push_data,
        })
    }

    fn free_ubo_range(&mut self, state: &FrequencyState, frequency: ShaderUpdateFrequency) {
        let Some(offset) = state.ubo_offset else {
            return;
        };
        let stride = self.layout.info(frequency).ubo_stride;
        for buffer in &mut self.uniform_buffers {
            buffer.free(offset, stride);
        }
    }

    fn states_mut(&mut self, frequency: ShaderUpdateFrequency) -> Result<&mut FrequencyStateArray> {
        match frequency {
            ShaderUpdateFrequency::PerGroup => Ok(&mut self.per_group),
            ShaderUpdateFrequency::PerDraw => Ok(&mut self.per_draw),
            ShaderUpdateFrequency::PerFrame => Err(engine_err!(
                SOURCE,
                "Shader '{}': the per-frame state is created with the shader and cannot be acquired or released",
                self.name
            )),
        }
    }

    /// Take a free per-group or per-draw state slot
    pub fn acquire_state<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        frequency: ShaderUpdateFrequency,
        defaults: ShaderDefaults,
    ) -> Result<FrequencyHandle> {
        let capacity = self.states_mut(frequency)?.capacity();
        let Some(index) = self.states_mut(frequency)?.free_index() else {
            engine_bail!(
                SOURCE,
                "Shader '{}': all {} {:?} states are in use",
                self.name,
                capacity,
                frequency
            );
        };
        let state = self.new_state(context, frequency, defaults)?;
        match self.states_mut(frequency)?.insert(index, state) {
            Some(handle) => Ok(handle),
            None => Err(engine_err!(SOURCE, "Shader '{}': state slot {} is already taken", self.name, index)),
        }
    }

    /// Return a per-group or per-draw state after draining the device
    pub fn release_state<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, handle: FrequencyHandle) -> Result<()> {
        let frequency = handle.frequency();
        if !self.states_mut(frequency)?.contains(handle) {
            engine_bail!(SOURCE, "Shader '{}': invalid or stale {:?} state handle", self.name, frequency);
        }
        context.device.wait_idle()?;

        let Some(state) = self.states_mut(frequency)?.remove(handle) else {
            return Ok(());
        };
        self.free_ubo_range(&state, frequency);
        if !state.descriptor_sets.is_empty() {
            context
                .device
                .free_descriptor_sets(self.descriptor_pool, &state.descriptor_sets)?;
        }
        if self.bound_group == Some(handle) {
            self.bound_group = None;
        }
        if self.bound_draw == Some(handle) {
            self.bound_draw = None;
        }
        Ok(())
    }

    // ===== BINDING =====

    fn active_pipeline(&self) -> Result<RawPipeline> {
        let class = self.current_topology.class() as usize;
        let pipeline = if self.wireframe {
            self.wireframe_pipelines[class]
        } else {
            self.pipelines[class]
        };
        pipeline.ok_or_else(|| {
            engine_err!(SOURCE, "Shader '{}' has no pipeline for {:?}", self.name, self.current_topology)
        })
    }

    /// Bind the pipeline of the current topology class
    pub fn use_shader<D: GpuDevice>(&self, device: &mut D, command_buffer: RawCommandBuffer) -> Result<()> {
        let pipeline = self.active_pipeline()?;
        device.cmd_bind_pipeline(command_buffer, pipeline);
        if device.capabilities().support_flags.has_dynamic_state() {
            device.cmd_set_primitive_topology(command_buffer, self.current_topology);
        }
        Ok(())
    }

    /// Switch topology; a change of class rebinds that class's pipeline
    pub fn set_topology<D: GpuDevice>(
        &mut self,
        device: &mut D,
        command_buffer: Option<RawCommandBuffer>,
        topology: PrimitiveTopology,
    ) -> Result<()> {
        if !self.topology_types.contains(topology_flag(topology)) {
            engine_bail!(SOURCE, "Shader '{}' was not created for {:?}", self.name, topology);
        }
        let class_changed = topology.class() != self.current_topology.class();
        self.current_topology = topology;

        if let Some(command_buffer) = command_buffer {
            if class_changed {
                self.use_shader(device, command_buffer)?;
            } else if device.capabilities().support_flags.has_dynamic_state() {
                device.cmd_set_primitive_topology(command_buffer, topology);
            }
        }
        Ok(())
    }

    /// Draw with the line-mode twin; takes effect at the next `use_shader`
    pub fn set_wireframe(&mut self, enabled: bool) -> Result<()> {
        if enabled && self.wireframe_pipelines[self.current_topology.class() as usize].is_none() {
            engine_bail!(SOURCE, "Shader '{}' has no wireframe pipeline for {:?}", self.name, self.current_topology);
        }
        self.wireframe = enabled;
        Ok(())
    }

    /// Direct the next uniform writes at the per-frame state
    /// The per-frame state lives as long as the shader; this handle cannot be released
    pub fn per_frame_handle(&self) -> FrequencyHandle {
        FrequencyHandle::per_frame()
    }

    pub fn bind_per_frame(&mut self) {
        self.bound_frequency = ShaderUpdateFrequency::PerFrame;
    }

    pub fn bind_per_group(&mut self, handle: FrequencyHandle) -> Result<()> {
        if !self.per_group.contains(handle) {
            engine_bail!(SOURCE, "Shader '{}': invalid or stale per-group state handle", self.name);
        }
        self.bound_frequency = ShaderUpdateFrequency::PerGroup;
        self.bound_group = Some(handle);
        Ok(())
    }

    pub fn bind_per_draw(&mut self, handle: FrequencyHandle) -> Result<()> {
        if !self.per_draw.contains(handle) {
            engine_bail!(SOURCE, "Shader '{}': invalid or stale per-draw state handle", self.name);
        }
        self.bound_frequency = ShaderUpdateFrequency::PerDraw;
        self.bound_draw = Some(handle);
        Ok(())
    }

    fn state(&self, frequency: ShaderUpdateFrequency) -> Result<&FrequencyState> {
        let state = match frequency {
            ShaderUpdateFrequency::PerFrame => self.per_frame.as_ref(),
            ShaderUpdateFrequency::PerGroup => self.bound_group.and_then(|handle| self.per_group.get(handle)),
            ShaderUpdateFrequency::PerDraw => self.bound_draw.and_then(|handle| self.per_draw.get(handle)),
        };
        state.ok_or_else(|| engine_err!(SOURCE, "Shader '{}': no {:?} state bound", self.name, frequency))
    }

    fn state_mut(&mut self, frequency: ShaderUpdateFrequency) -> Result<&mut FrequencyState> {
        let state = match frequency {
            ShaderUpdateFrequency::PerFrame => self.per_frame.as_mut(),
            ShaderUpdateFrequency::PerGroup => match self.bound_group {
                Some(handle) => self.per_group.get_mut(handle),
                None => None,
            },
            ShaderUpdateFrequency::PerDraw => match self.bound_draw {
                Some(handle) => self.per_draw.get_mut(handle),
                None => None,
            },
        };
        match state {
            Some(state) => Ok(state),
            None => Err(engine_err!(SOURCE, "Shader '{}': no {:?} state bound", self.name, frequency)),
        }
    }

    // ===== UNIFORMS =====

    pub fn uniform_location(&self, name: &str) -> Option<u16> {
        self.layout.lookup.get(name).copied()
    }

    pub fn uniform(&self, location: u16) -> Result<&ShaderUniform> {
        self.layout.uniform(location)
    }

    /// Set one uniform of the bound state
    ///
    /// Plain data goes to the uniform buffer of `image_index` (per-draw data
    /// to the state's push constant block). Samplers and textures only take
    /// effect at the next `apply`.
    pub fn uniform_set<D: GpuDevice>(
        &mut self,
        device: &mut D,
        location: u16,
        array_index: u32,
        value: UniformValue<'_>,
        image_index: u32,
    ) -> Result<()> {
        let uniform = self.layout.uniform(location)?.clone();
        if uniform.frequency != self.bound_frequency {
            engine_bail!(
                SOURCE,
                "Shader '{}': uniform '{}' is {:?} but a {:?} state is bound",
                self.name,
                uniform.name,
                uniform.frequency,
                self.bound_frequency
            );
        }
        if array_index >= uniform.array_length {
            engine_bail!(
                SOURCE,
                "Shader '{}': element {} out of range for uniform '{}' ({} elements)",
                self.name,
                array_index,
                uniform.name,
                uniform.array_length
            );
        }

        match (value, uniform.uniform_type) {
            (UniformValue::Sampler(handle), ShaderUniformType::Sampler) => {
                let state = self.state_mut(uniform.frequency)?;
                state.samplers[uniform.state_index as usize].set(array_index as usize, handle);
                Ok(())
            }
            (UniformValue::Texture(handle), ShaderUniformType::Texture) => {
                let state = self.state_mut(uniform.frequency)?;
                state.textures[uniform.state_index as usize].set(array_index as usize, handle);
                Ok(())
            }
            (UniformValue::Data(data), kind) if kind.is_plain() => {
                let start = uniform.offset + u64::from(array_index) * uniform.size;
                let end = uniform.offset + u64::from(uniform.array_length) * uniform.size;
                if data.is_empty() || start + data.len() as u64 > end {
                    engine_bail!(
                        SOURCE,
                        "Shader '{}': {} bytes do not fit uniform '{}' at element {}",
                        self.name,
                        data.len(),
                        uniform.name,
                        array_index
                    );
                }

                if uniform.frequency == ShaderUpdateFrequency::PerDraw {
                    let state = self.state_mut(uniform.frequency)?;
                    state.push_data[start as usize..start as usize + data.len()].copy_from_slice(data);
                    return Ok(());
                }

                let ubo_offset = self
                    .state(uniform.frequency)?
                    .ubo_offset
                    .ok_or_else(|| engine_err!(SOURCE, "Shader '{}': state has no uniform buffer range", self.name))?;
                let buffer = self
                    .uniform_buffers
                    .get(image_index as usize)
                    .ok_or_else(|| engine_err!(SOURCE, "Shader '{}': no uniform buffer for image {}", self.name, image_index))?;
                buffer.write_mapped(device, ubo_offset + start, data)
            }
            (_, kind) => Err(engine_err!(
                SOURCE,
                "Shader '{}': value does not match uniform '{}' of type {:?}",
                self.name,
                uniform.name,
                kind
            )),
        }
    }

    /// Push and/or write the stale descriptors of the active `frequency` state, then bind its set
    ///
    /// Returns the number of descriptor writes issued in the single batched update.
    pub fn apply<D: GpuDevice>(
        &mut self,
        device: &mut D,
        frequency: ShaderUpdateFrequency,
        frame: &ApplyFrame,
        resources: &ApplyResources<'_>,
    ) -> Result<usize> {
        let Self {
            name,
            layout,
            per_frame,
            per_group,
            per_draw,
            bound_group,
            bound_draw,
            uniform_buffers,
            pipeline_layout,
            set_indices,
            ..
        } = self;
        let state = match (frequency, *bound_group, *bound_draw) {
            (ShaderUpdateFrequency::PerFrame, _, _) => per_frame.as_mut(),
            (ShaderUpdateFrequency::PerGroup, Some(handle), _) => per_group.get_mut(handle),
            (ShaderUpdateFrequency::PerDraw, _, Some(handle)) => per_draw.get_mut(handle),
            _ => None,
        }
        .ok_or_else(|| engine_err!(SOURCE, "Shader '{}': no {:?} state bound", name, frequency))?;
        let info = layout.info(frequency);

        if frequency == ShaderUpdateFrequency::PerDraw && info.uniform_count > 0 {
            device.cmd_push_constants(frame.command_buffer, *pipeline_layout, BINDING_STAGES, 0, &state.push_data);
        }
        let Some(set_index) = set_indices[frequency.index()] else {
            return Ok(0);
        };

        let image = frame.image_index as usize;
        let set = *state
            .descriptor_sets
            .get(image)
            .ok_or_else(|| engine_err!(SOURCE, "Shader '{}': no descriptor set for image {}", name, image))?;

        let mut writes = Vec::new();
        let mut pending = Vec::new();
        if info.has_ubo(frequency) && state.ubo_stamps[image] != frame.frame_number {
            let buffer = uniform_buffers
                .get(image)
                .ok_or_else(|| engine_err!(SOURCE, "Shader '{}': no uniform buffer for image {}", name, image))?;
            writes.push(DescriptorWrite {
                set,
                binding: 0,
                array_element: 0,
                resource: DescriptorResource::UniformBuffer {
                    buffer: buffer.raw(),
                    offset: state.ubo_offset.unwrap_or(0),
                    range: info.ubo_stride,
                },
            });
            pending.push(PendingStamp::Ubo);
        }

        for &index in &info.sorted_indices {
            let uniform = &layout.uniforms[index as usize];
            let state_index = uniform.state_index as usize;
            if uniform.uniform_type.is_sampler() {
                let binding = &state.samplers[state_index];
                for (element, handle) in binding.resources.iter().enumerate() {
                    if binding.stamps[element][image] == frame.frame_number {
                        continue;
                    }
                    let raw = resources.samplers.raw(*handle).ok_or_else(|| {
                        engine_err!(SOURCE, "Shader '{}': sampler '{}'[{}] is not a valid sampler", name, uniform.name, element)
                    })?;
                    writes.push(DescriptorWrite {
                        set,
                        binding: uniform.binding,
                        array_element: element as u32,
                        resource: DescriptorResource::Sampler(raw),
                    });
                    pending.push(PendingStamp::Sampler { state_index, element });
                }
            } else {
                let binding = &state.textures[state_index];
                for (element, handle) in binding.resources.iter().enumerate() {
                    if binding.stamps[element][image] == frame.frame_number {
                        continue;
                    }
                    let slot = resolve_texture(resources, *handle).ok_or_else(|| {
                        engine_err!(SOURCE, "Shader '{}': texture '{}'[{}] is not a valid texture", name, uniform.name, element)
                    })?;
                    writes.push(DescriptorWrite {
                        set,
                        binding: uniform.binding,
                        array_element: element as u32,
                        resource: DescriptorResource::SampledImage {
                            view: slot.image(frame.image_index).view(),
                            layout: ImageLayout::ShaderReadOnlyOptimal,
                        },
                    });
                    pending.push(PendingStamp::Texture { state_index, element });
                }
            }
        }

        for stamp in pending {
            match stamp {
                PendingStamp::Ubo => state.ubo_stamps[image] = frame.frame_number,
                PendingStamp::Sampler { state_index, element } => {
                    state.samplers[state_index].stamps[element][image] = frame.frame_number
                }
                PendingStamp::Texture { state_index, element } => {
                    state.textures[state_index].stamps[element][image] = frame.frame_number
                }
            }
        }

        if !writes.is_empty() {
            device.update_descriptor_sets(&writes);
        }
        device.cmd_bind_descriptor_sets(frame.command_buffer, *pipeline_layout, set_index, &[set]);
        Ok(writes.len())
    }

    // ===== ACCESSORS =====

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &FrequencyLayout {
        &self.layout
    }

    pub fn set_indices(&self) -> [Option<u32>; 3] {
        self.set_indices
    }

    pub fn descriptor_set_count(&self) -> u32 {
        self.layout.descriptor_set_count()
    }

    pub fn descriptor_pool(&self) -> RawDescriptorPool {
        self.descriptor_pool
    }

    pub fn pipeline_layout(&self) -> RawPipelineLayout {
        self.pipeline_layout
    }

    pub fn pipeline(&self, class: PrimitiveTopologyClass) -> Option<RawPipeline> {
        self.pipelines[class as usize]
    }

    pub fn wireframe_pipeline(&self, class: PrimitiveTopologyClass) -> Option<RawPipeline> {
        self.wireframe_pipelines[class as usize]
    }

    pub fn current_topology(&self) -> PrimitiveTopology {
        self.current_topology
    }

    pub fn is_wireframe(&self) -> bool {
        self.wireframe
    }

    pub fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }

    pub fn attributes(&self) -> &[VertexAttributeDesc] {
        &self.attributes
    }

    pub fn uniform_buffers(&self) -> &[RenderBuffer] {
        &self.uniform_buffers
    }

    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    pub fn active_states(&self, frequency: ShaderUpdateFrequency) -> u32 {
        match frequency {
            ShaderUpdateFrequency::PerFrame => u32::from(self.per_frame.is_some()),
            ShaderUpdateFrequency::PerGroup => self.per_group.active_count(),
            ShaderUpdateFrequency::PerDraw => self.per_draw.active_count(),
        }
    }

    pub fn flags(&self) -> ShaderFlags {
        self.flags
    }
}

/// Texture bound to a descriptor; never-written static textures fall back to the default
fn resolve_texture<'a>(resources: &ApplyResources<'a>, handle: TextureHandle) -> Option<&'a TextureSlot> {
    let slot = resources.textures.get(handle)?;
    if slot.generation() == INVALID_GENERATION && !slot.flags().contains(TextureFlags::IS_WRITEABLE) {
        return resources.textures.get(resources.default_texture);
    }
    Some(slot)
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
