/// Buffer manager - device buffers and the renderbuffer wrapper
///
/// `GpuBuffer` is the raw buffer + memory. `RenderBuffer` adds the engine-level
/// type, size and sub-allocation policy, and implements the staging dance
/// for device-local-only memory.

use crate::error::Result;
use crate::device::*;
use crate::backend::context::GpuContext;
use crate::backend::memory::find_memory_index;
use crate::utils::FreeList;
use crate::{engine_bail, engine_err, engine_warn};

const SOURCE: &str = "nova::rhi::Buffer";

/// Engine-level buffer purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderBufferType {
    Vertex,
    Index,
    Uniform,
    /// Host-visible upload buffer
    Staging,
    /// Host-visible read-back buffer
    Read,
    Storage,
}

/// Sub-allocation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderBufferTrackType {
    /// No sub-allocation; the buffer is used whole
    None,
    /// Bump allocator, reset with `clear`
    Linear,
    /// First-fit free list
    Freelist,
}

impl RenderBufferType {
    /// Usage and memory properties this type is created with
    pub fn flags(&self, capabilities: &DeviceCapabilities) -> (BufferUsage, MemoryProperty) {
        let transfer = BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST;
        let host = MemoryProperty::HOST_VISIBLE | MemoryProperty::HOST_COHERENT;
        match self {
            RenderBufferType::Vertex => (BufferUsage::VERTEX | transfer, MemoryProperty::DEVICE_LOCAL),
            RenderBufferType::Index => (BufferUsage::INDEX | transfer, MemoryProperty::DEVICE_LOCAL),
            RenderBufferType::Uniform => {
                let mut properties = host;
                if capabilities.supports_device_local_host_visible {
                    properties |= MemoryProperty::DEVICE_LOCAL;
                }
                (BufferUsage::UNIFORM | BufferUsage::TRANSFER_DST, properties)
            }
            RenderBufferType::Staging => (BufferUsage::TRANSFER_SRC, host),
            RenderBufferType::Read => (BufferUsage::TRANSFER_DST, host),
            RenderBufferType::Storage => (BufferUsage::STORAGE | transfer, MemoryProperty::DEVICE_LOCAL),
        }
    }
}

// ============================================================================
// GpuBuffer
// ============================================================================

/// Device buffer with bound memory
#[derive(Debug)]
pub struct GpuBuffer {
    raw: RawBuffer,
    size: u64,
    usage: BufferUsage,
    memory_flags: MemoryProperty,
    requirements: MemoryRequirements,
    memory_index: u32,
}

impl GpuBuffer {
    pub fn create<D: GpuDevice>(
        context: &mut GpuContext<D>,
        name: &str,
        size: u64,
        usage: BufferUsage,
        memory_flags: MemoryProperty,
    ) -> Result<Self> {
        let raw = context.device.create_buffer(size, usage)?;
        let requirements = context.device.buffer_memory_requirements(raw);

        let memory_index = match find_memory_index(context.capabilities(), requirements.memory_type_bits, memory_flags) {
            Some(index) => index,
            None => {
                context.device.destroy_buffer(raw);
                engine_bail!(SOURCE, "Required memory type not found for buffer '{}' ({:?})", name, memory_flags);
            }
        };
        if let Err(e) = context
            .device
            .allocate_buffer_memory(raw, &requirements, memory_index, memory_flags, name)
        {
            context.device.destroy_buffer(raw);
            return Err(e);
        }
        context.memory.allocate(requirements.size);

        Ok(Self {
            raw,
            size,
            usage,
            memory_flags,
            requirements,
            memory_index,
        })
    }

    pub fn destroy<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) {
        if self.raw.is_null() {
            return;
        }
        context.device.destroy_buffer(self.raw);
        context.memory.free(self.requirements.size);
        self.raw = RawBuffer::NULL;
    }

    /// Write through the host mapping (host-visible memory only)
    pub fn write<D: GpuDevice>(&self, device: &mut D, offset: u64, data: &[u8]) -> Result<()> {
        let end = self.check_range(offset, data.len() as u64)?;
        let memory = device.mapped_memory(self.raw)?;
        memory[offset as usize..end as usize].copy_from_slice(data);
        if !self.memory_flags.contains(MemoryProperty::HOST_COHERENT) {
            device.flush_memory(self.raw, offset, data.len() as u64)?;
        }
        Ok(())
    }

    /// Read through the host mapping (host-visible memory only)
    pub fn read_mapped<D: GpuDevice>(&self, device: &mut D, offset: u64, size: u64) -> Result<Vec<u8>> {
        let end = self.check_range(offset, size)?;
        let memory = device.mapped_memory(self.raw)?;
        Ok(memory[offset as usize..end as usize].to_vec())
    }

    fn check_range(&self, offset: u64, size: u64) -> Result<u64> {
        match offset.checked_add(size) {
            Some(end) if end <= self.size => Ok(end),
            _ => Err(engine_err!(
                SOURCE,
                "Range {}..{} exceeds buffer size {}",
                offset,
                offset.saturating_add(size),
                self.size
            )),
        }
    }

    /// Not host-visible: host access needs a staging round-trip
    pub fn is_device_local_only(&self) -> bool {
        self.memory_flags.contains(MemoryProperty::DEVICE_LOCAL)
            && !self.memory_flags.contains(MemoryProperty::HOST_VISIBLE)
    }

    pub fn raw(&self) -> RawBuffer {
        self.raw
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn memory_flags(&self) -> MemoryProperty {
        self.memory_flags
    }

    pub fn memory_index(&self) -> u32 {
        self.memory_index
    }

    pub fn requirements(&self) -> &MemoryRequirements {
        &self.requirements
    }
}

// ============================================================================
// RenderBuffer
// ============================================================================

/// Frame recording context for transfers folded into the frame's command buffer
pub struct FrameWorkload<'a> {
    pub command_buffer: RawCommandBuffer,
    /// The current frame's staging buffer (linear)
    pub staging: &'a mut RenderBuffer,
}

/// Engine-level buffer
#[derive(Debug)]
pub struct RenderBuffer {
    name: String,
    buffer_type: RenderBufferType,
    total_size: u64,
    track_type: RenderBufferTrackType,
    buffer: GpuBuffer,
    freelist: Option<FreeList>,
    linear_offset: u64,
    mapped: bool,
}

impl RenderBuffer {
    pub fn create<D: GpuDevice>(
        context: &mut GpuContext<D>,
        name: &str,
        buffer_type: RenderBufferType,
        size: u64,
        track_type: RenderBufferTrackType,
    ) -> Result<Self> {
        if size == 0 {
            engine_bail!(SOURCE, "Buffer '{}' must have a non-zero size", name);
        }
        let (usage, memory_flags) = buffer_type.flags(context.capabilities());
        let buffer = GpuBuffer::create(context, name, size, usage, memory_flags)?;
        let freelist = match track_type {
            RenderBufferTrackType::Freelist => Some(FreeList::new(size)),
            _ => None,
        };
        crate::engine_debug!(SOURCE, "Created {:?} buffer '{}' ({} bytes)", buffer_type, name, size);

        Ok(Self {
            name: name.to_string(),
            buffer_type,
            total_size: size,
            track_type,
            buffer,
            freelist,
            linear_offset: 0,
            mapped: false,
        })
    }

    /// Destroy the buffer after draining the device
    pub fn destroy<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) -> Result<()> {
        context.device.wait_idle()?;
        self.buffer.destroy(context);
        self.freelist = None;
        self.mapped = false;
        Ok(())
    }

    /// Destroy without draining; only for buffers whose last use already completed
    pub(crate) fn destroy_completed<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) {
        self.buffer.destroy(context);
        self.freelist = None;
        self.mapped = false;
    }

    /// Grow the buffer: new buffer, blocking copy of the old bytes, drain, swap
    pub fn resize<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, new_size: u64) -> Result<()> {
        if new_size < self.total_size {
            engine_bail!(
                SOURCE,
                "Buffer '{}' cannot shrink ({} -> {} bytes)",
                self.name,
                self.total_size,
                new_size
            );
        }
        if new_size == self.total_size {
            return Ok(());
        }

        let mut new_buffer = GpuBuffer::create(
            context,
            &self.name,
            new_size,
            self.buffer.usage,
            self.buffer.memory_flags,
        )?;

        let copy = context.begin_single_use().and_then(|command_buffer| {
            context.device.cmd_copy_buffer(
                command_buffer.raw(),
                self.buffer.raw,
                new_buffer.raw,
                &BufferCopy { src_offset: 0, dst_offset: 0, size: self.total_size },
            );
            context.end_single_use(command_buffer)
        });
        if let Err(e) = copy.and_then(|_| context.device.wait_idle()) {
            new_buffer.destroy(context);
            return Err(e);
        }

        let mut old = std::mem::replace(&mut self.buffer, new_buffer);
        old.destroy(context);
        if let Some(freelist) = self.freelist.as_mut() {
            freelist.resize(new_size);
        }
        self.total_size = new_size;
        Ok(())
    }

    // ===== SUB-ALLOCATION =====

    /// Reserve a range according to the tracking policy
    pub fn allocate(&mut self, size: u64) -> Option<u64> {
        match self.track_type {
            RenderBufferTrackType::None => {
                engine_warn!(SOURCE, "Buffer '{}' does not track allocations", self.name);
                None
            }
            RenderBufferTrackType::Linear => {
                let offset = self.linear_offset;
                if size == 0 || offset + size > self.total_size {
                    return None;
                }
                self.linear_offset += size;
                Some(offset)
            }
            RenderBufferTrackType::Freelist => self.freelist.as_mut().and_then(|list| list.allocate(size)),
        }
    }

    /// Return a range (freelist only; linear buffers are reset with `clear`)
    pub fn free(&mut self, offset: u64, size: u64) -> bool {
        match (self.track_type, self.freelist.as_mut()) {
            (RenderBufferTrackType::Freelist, Some(list)) => list.free(offset, size),
            _ => false,
        }
    }

    /// Forget every sub-allocation
    pub fn clear(&mut self) {
        self.linear_offset = 0;
        if let Some(list) = self.freelist.as_mut() {
            list.clear();
        }
    }

    // ===== HOST ACCESS =====

    pub fn map(&mut self) -> Result<()> {
        if self.buffer.is_device_local_only() {
            engine_bail!(SOURCE, "Buffer '{}' is not host-visible and cannot be mapped", self.name);
        }
        self.mapped = true;
        Ok(())
    }

    pub fn unmap(&mut self) {
        self.mapped = false;
    }

    /// Host view of `offset..offset + size` (buffer must be mapped)
    pub fn mapped_range<'a, D: GpuDevice>(
        &self,
        device: &'a mut D,
        offset: u64,
        size: u64,
    ) -> Result<&'a mut [u8]> {
        if !self.mapped {
            engine_bail!(SOURCE, "Buffer '{}' is not mapped", self.name);
        }
        let end = self.buffer.check_range(offset, size)?;
        let memory = device.mapped_memory(self.buffer.raw)?;
        Ok(&mut memory[offset as usize..end as usize])
    }

    pub fn flush<D: GpuDevice>(&self, device: &mut D, offset: u64, size: u64) -> Result<()> {
        if self.buffer.memory_flags.contains(MemoryProperty::HOST_COHERENT) {
            return Ok(());
        }
        device.flush_memory(self.buffer.raw, offset, size)
    }

    /// Read `size` bytes at `offset`, through a read-back buffer if device-local-only
    pub fn read<D: GpuDevice>(&self, context: &mut GpuContext<D>, offset: u64, size: u64) -> Result<Vec<u8>> {
        self.buffer.check_range(offset, size)?;
        if !self.buffer.is_device_local_only() {
            return self.buffer.read_mapped(&mut context.device, offset, size);
        }

        let mut read = RenderBuffer::create(context, "read", RenderBufferType::Read, size, RenderBufferTrackType::None)?;
        let result = context
            .begin_single_use()
            .and_then(|command_buffer| {
                context.device.cmd_copy_buffer(
                    command_buffer.raw(),
                    self.buffer.raw,
                    read.buffer.raw,
                    &BufferCopy { src_offset: offset, dst_offset: 0, size },
                );
                context.end_single_use(command_buffer)
            })
            .and_then(|_| read.buffer.read_mapped(&mut context.device, 0, size));
        read.buffer.destroy(context);
        result
    }

    /// Upload `data` at `offset`
    ///
    /// Device-local-only buffers go through staging: the frame's staging buffer
    /// and command buffer when `workload` is given, otherwise a temporary
    /// staging buffer and a blocking one-shot copy.
    pub fn load_range<D: GpuDevice>(
        &mut self,
        context: &mut GpuContext<D>,
        offset: u64,
        data: &[u8],
        workload: Option<FrameWorkload<'_>>,
    ) -> Result<()> {
        let size = data.len() as u64;
        self.buffer.check_range(offset, size)?;
        if !self.buffer.is_device_local_only() {
            return self.buffer.write(&mut context.device, offset, data);
        }

        match workload {
            Some(workload) => {
                let staging_offset = workload
                    .staging
                    .allocate(size)
                    .ok_or_else(|| engine_err!(SOURCE, "Frame staging buffer is full ({} bytes requested)", size))?;
                workload.staging.buffer.write(&mut context.device, staging_offset, data)?;
                context.device.cmd_copy_buffer(
                    workload.command_buffer,
                    workload.staging.buffer.raw,
                    self.buffer.raw,
                    &BufferCopy { src_offset: staging_offset, dst_offset: offset, size },
                );
                Ok(())
            }
            None => {
                let mut staging =
                    RenderBuffer::create(context, "staging", RenderBufferType::Staging, size, RenderBufferTrackType::None)?;
                let result = staging.buffer.write(&mut context.device, 0, data).and_then(|_| {
                    let command_buffer = context.begin_single_use()?;
                    context.device.cmd_copy_buffer(
                        command_buffer.raw(),
                        staging.buffer.raw,
                        self.buffer.raw,
                        &BufferCopy { src_offset: 0, dst_offset: offset, size },
                    );
                    context.end_single_use(command_buffer)
                });
                staging.buffer.destroy(context);
                result
            }
        }
    }

    /// Copy `size` bytes between buffers
    ///
    /// Inside the frame workload the copy is followed by a transfer barrier;
    /// outside it is a blocking one-shot submission.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_range<D: GpuDevice>(
        context: &mut GpuContext<D>,
        src: &RenderBuffer,
        src_offset: u64,
        dst: &RenderBuffer,
        dst_offset: u64,
        size: u64,
        frame_command_buffer: Option<RawCommandBuffer>,
    ) -> Result<()> {
        src.buffer.check_range(src_offset, size)?;
        dst.buffer.check_range(dst_offset, size)?;
        let region = BufferCopy { src_offset, dst_offset, size };

        match frame_command_buffer {
            Some(command_buffer) => {
                context.device.cmd_copy_buffer(command_buffer, src.buffer.raw, dst.buffer.raw, &region);
                context.device.cmd_pipeline_barrier(
                    command_buffer,
                    &PipelineBarrier::memory(
                        PipelineStage::TRANSFER,
                        PipelineStage::TRANSFER,
                        MemoryBarrier {
                            src_access: AccessFlags::TRANSFER_WRITE,
                            dst_access: AccessFlags::TRANSFER_READ | AccessFlags::TRANSFER_WRITE,
                        },
                    ),
                );
                Ok(())
            }
            None => {
                let command_buffer = context.begin_single_use()?;
                context.device.cmd_copy_buffer(command_buffer.raw(), src.buffer.raw, dst.buffer.raw, &region);
                context.end_single_use(command_buffer)
            }
        }
    }

    /// Bind as vertex/index input at `offset`; issue the draw unless `bind_only`
    pub fn draw<D: GpuDevice>(
        &self,
        device: &mut D,
        command_buffer: RawCommandBuffer,
        offset: u64,
        element_count: u32,
        bind_only: bool,
    ) -> Result<()> {
        match self.buffer_type {
            RenderBufferType::Vertex => {
                device.cmd_bind_vertex_buffer(command_buffer, self.buffer.raw, offset);
                if !bind_only {
                    device.cmd_draw(command_buffer, element_count, 1, 0, 0);
                }
                Ok(())
            }
            RenderBufferType::Index => {
                device.cmd_bind_index_buffer(command_buffer, self.buffer.raw, offset, IndexType::U32);
                if !bind_only {
                    device.cmd_draw_indexed(command_buffer, element_count, 1, 0, 0, 0);
                }
                Ok(())
            }
            other => Err(engine_err!(SOURCE, "Cannot draw from {:?} buffer '{}'", other, self.name)),
        }
    }

    // ===== ACCESSORS =====

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer_type(&self) -> RenderBufferType {
        self.buffer_type
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn track_type(&self) -> RenderBufferTrackType {
        self.track_type
    }

    pub fn gpu_buffer(&self) -> &GpuBuffer {
        &self.buffer
    }

    pub fn raw(&self) -> RawBuffer {
        self.buffer.raw
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Write through the host mapping without a staging round-trip
    pub fn write_mapped<D: GpuDevice>(&self, device: &mut D, offset: u64, data: &[u8]) -> Result<()> {
        self.buffer.write(device, offset, data)
    }

    /// Copy `source`'s host-visible bytes and sub-allocations into this buffer
    ///
    /// Both buffers must have the same size; ranges keep their offsets.
    pub(crate) fn mirror_from<D: GpuDevice>(&mut self, device: &mut D, source: &RenderBuffer) -> Result<()> {
        if source.total_size != self.total_size {
            engine_bail!(
                SOURCE,
                "Buffer '{}' ({} bytes) cannot mirror '{}' ({} bytes)",
                self.name,
                self.total_size,
                source.name,
                source.total_size
            );
        }
        let bytes = source.buffer.read_mapped(device, 0, source.total_size)?;
        self.buffer.write(device, 0, &bytes)?;
        self.freelist = source.freelist.clone();
        self.linear_offset = source.linear_offset;
        Ok(())
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
