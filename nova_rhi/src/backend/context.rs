/// GpuContext - device plus the bookkeeping every resource helper shares
///
/// Passed explicitly (`&mut GpuContext<D>`) to every image, buffer and
/// command buffer operation; there is no global renderer state.

use crate::error::Result;
use crate::device::{CommandBufferUsage, DeviceCapabilities, GpuDevice, SubmitInfo};
use crate::backend::command_buffer::CommandBuffer;
use crate::backend::memory::MemoryUsage;

pub struct GpuContext<D: GpuDevice> {
    /// The explicit GPU device
    pub device: D,
    /// Device memory allocated through the image/buffer managers
    pub memory: MemoryUsage,
}

impl<D: GpuDevice> GpuContext<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            memory: MemoryUsage::default(),
        }
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        self.device.capabilities()
    }

    /// Allocate and begin a primary command buffer for one blocking submission
    pub fn begin_single_use(&mut self) -> Result<CommandBuffer> {
        let mut command_buffer = CommandBuffer::allocate(&mut self.device, true, 0)?;
        command_buffer.begin(&mut self.device, CommandBufferUsage::ONE_TIME_SUBMIT)?;
        Ok(command_buffer)
    }

    /// End, submit and free a single-use command buffer
    ///
    /// Blocks until the graphics queue is idle.
    pub fn end_single_use(&mut self, mut command_buffer: CommandBuffer) -> Result<()> {
        command_buffer.end(&mut self.device)?;

        let submit = SubmitInfo {
            command_buffers: vec![command_buffer.raw()],
            wait: None,
            signal: None,
            fence: None,
        };
        let result = self
            .device
            .queue_submit(&submit)
            .and_then(|_| self.device.queue_wait_idle());
        if result.is_ok() {
            command_buffer.mark_submitted();
        }

        command_buffer.free(&mut self.device);
        result
    }
}
