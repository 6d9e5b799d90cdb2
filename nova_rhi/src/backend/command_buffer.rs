/// Command buffer - native command buffer plus its recording state machine
///
/// `NotAllocated -> Ready -> Recording -> RecordingEnded -> Submitted -> (reset) -> Ready`
///
/// Primaries may own a fixed array of secondaries. While a render pass is
/// active (`in_secondary`), recording targets the current secondary; ending
/// the pass executes that secondary into the primary and moves the cursor on.
/// Protocol violations are programmer errors and go through `engine_fatal!`.

use crate::error::Result;
use crate::device::{CommandBufferLevel, CommandBufferUsage, GpuDevice, RawCommandBuffer};
use crate::{engine_err, engine_fatal};

const SOURCE: &str = "nova::rhi::CommandBuffer";

/// Recording state of a command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    NotAllocated,
    Ready,
    Recording,
    RecordingEnded,
    Submitted,
}

/// Operation applied to a command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferOp {
    Allocate,
    Begin,
    End,
    Submit,
    Reset,
    Free,
}

impl CommandBufferState {
    /// State after applying `op`, or `None` if `op` is illegal in this state
    pub fn apply(self, op: CommandBufferOp) -> Option<CommandBufferState> {
        use CommandBufferState::*;
        match (self, op) {
            (NotAllocated, CommandBufferOp::Allocate) => Some(Ready),
            (Ready, CommandBufferOp::Begin) => Some(Recording),
            (Recording, CommandBufferOp::End) => Some(RecordingEnded),
            (RecordingEnded, CommandBufferOp::Submit) => Some(Submitted),
            (Submitted | Ready, CommandBufferOp::Reset) => Some(Ready),
            (NotAllocated, CommandBufferOp::Free) => None,
            (_, CommandBufferOp::Free) => Some(NotAllocated),
            _ => None,
        }
    }
}

/// Native command buffer with state tracking
#[derive(Debug)]
pub struct CommandBuffer {
    raw: RawCommandBuffer,
    state: CommandBufferState,
    is_primary: bool,
    secondaries: Vec<CommandBuffer>,
    secondary_buffer_index: usize,
    in_secondary: bool,
    /// Owning primary (secondaries only, non-owning)
    parent: Option<RawCommandBuffer>,
}

impl CommandBuffer {
    /// Allocate a command buffer; primaries also get `secondary_count` secondaries
    pub fn allocate<D: GpuDevice>(device: &mut D, is_primary: bool, secondary_count: u32) -> Result<Self> {
        let level = if is_primary { CommandBufferLevel::Primary } else { CommandBufferLevel::Secondary };
        let raw = device
            .allocate_command_buffers(level, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| engine_err!(SOURCE, "Device returned no command buffer"))?;

        let mut command_buffer = Self {
            raw,
            state: CommandBufferState::NotAllocated,
            is_primary,
            secondaries: Vec::new(),
            secondary_buffer_index: 0,
            in_secondary: false,
            parent: None,
        };
        command_buffer.transition(CommandBufferOp::Allocate);

        if is_primary && secondary_count > 0 {
            let raws = match device.allocate_command_buffers(CommandBufferLevel::Secondary, secondary_count) {
                Ok(raws) => raws,
                Err(e) => {
                    device.free_command_buffers(&[raw]);
                    return Err(e);
                }
            };
            command_buffer.secondaries = raws
                .into_iter()
                .map(|secondary| CommandBuffer {
                    raw: secondary,
                    state: CommandBufferState::Ready,
                    is_primary: false,
                    secondaries: Vec::new(),
                    secondary_buffer_index: 0,
                    in_secondary: false,
                    parent: Some(raw),
                })
                .collect();
        }

        Ok(command_buffer)
    }

    /// Free the command buffer and all of its secondaries
    pub fn free<D: GpuDevice>(&mut self, device: &mut D) {
        if self.state == CommandBufferState::NotAllocated {
            return;
        }
        if !self.secondaries.is_empty() {
            let raws: Vec<RawCommandBuffer> = self.secondaries.iter().map(|s| s.raw).collect();
            device.free_command_buffers(&raws);
            self.secondaries.clear();
        }
        device.free_command_buffers(&[self.raw]);
        self.transition(CommandBufferOp::Free);
        self.raw = RawCommandBuffer::NULL;
        self.secondary_buffer_index = 0;
        self.in_secondary = false;
    }

    /// Begin recording (legal only from `Ready`)
    pub fn begin<D: GpuDevice>(&mut self, device: &mut D, usage: CommandBufferUsage) -> Result<()> {
        self.check(CommandBufferOp::Begin);
        let level = if self.is_primary { CommandBufferLevel::Primary } else { CommandBufferLevel::Secondary };
        device.begin_command_buffer(self.raw, level, usage)?;
        self.transition(CommandBufferOp::Begin);
        Ok(())
    }

    /// End recording (legal only from `Recording`)
    pub fn end<D: GpuDevice>(&mut self, device: &mut D) -> Result<()> {
        self.check(CommandBufferOp::End);
        if self.in_secondary {
            engine_fatal!(SOURCE, "Command buffer ended while secondary {} is still recording", self.secondary_buffer_index);
        }
        device.end_command_buffer(self.raw)?;
        self.transition(CommandBufferOp::End);
        Ok(())
    }

    /// Mark as submitted, cascading onto every secondary that finished recording
    pub fn mark_submitted(&mut self) {
        self.transition(CommandBufferOp::Submit);
        for secondary in self.secondaries.iter_mut() {
            if secondary.state == CommandBufferState::RecordingEnded {
                secondary.transition(CommandBufferOp::Submit);
            }
        }
    }

    /// Reset to `Ready`, along with submitted secondaries; rewinds the secondary cursor
    pub fn reset<D: GpuDevice>(&mut self, device: &mut D) -> Result<()> {
        self.check(CommandBufferOp::Reset);
        if self.state == CommandBufferState::Submitted {
            device.reset_command_buffer(self.raw)?;
        }
        self.transition(CommandBufferOp::Reset);

        for secondary in self.secondaries.iter_mut() {
            if secondary.state == CommandBufferState::Submitted {
                device.reset_command_buffer(secondary.raw)?;
                secondary.transition(CommandBufferOp::Reset);
            }
        }
        self.secondary_buffer_index = 0;
        self.in_secondary = false;
        Ok(())
    }

    /// Begin the current secondary and make it the recording target
    pub fn begin_secondary<D: GpuDevice>(&mut self, device: &mut D) -> Result<RawCommandBuffer> {
        if !self.is_primary {
            engine_fatal!(SOURCE, "Secondary command buffers cannot own secondaries");
        }
        if self.state != CommandBufferState::Recording {
            engine_fatal!(SOURCE, "Render pass begun on a primary in state {:?}", self.state);
        }
        if self.in_secondary {
            engine_fatal!(SOURCE, "Render pass begun while secondary {} is still active", self.secondary_buffer_index);
        }
        let index = self.secondary_buffer_index;
        let count = self.secondaries.len();
        let secondary = match self.secondaries.get_mut(index) {
            Some(secondary) => secondary,
            None => engine_fatal!(
                SOURCE,
                "Render pass {} exceeds the {} secondary command buffers of this frame",
                index,
                count
            ),
        };
        secondary.begin(device, CommandBufferUsage::ONE_TIME_SUBMIT)?;
        let raw = secondary.raw;
        self.in_secondary = true;
        Ok(raw)
    }

    /// End the current secondary, execute it into the primary and advance the cursor
    pub fn end_secondary<D: GpuDevice>(&mut self, device: &mut D) -> Result<()> {
        if !self.in_secondary {
            engine_fatal!(SOURCE, "Render pass ended with no active secondary");
        }
        let index = self.secondary_buffer_index;
        let secondary = &mut self.secondaries[index];
        secondary.end(device)?;
        device.cmd_execute_commands(self.raw, &[secondary.raw]);
        self.secondary_buffer_index += 1;
        self.in_secondary = false;
        Ok(())
    }

    /// Native handle commands are currently recorded into
    pub fn active(&self) -> RawCommandBuffer {
        if self.in_secondary {
            self.secondaries[self.secondary_buffer_index].raw
        } else {
            self.raw
        }
    }

    pub fn raw(&self) -> RawCommandBuffer {
        self.raw
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn in_secondary(&self) -> bool {
        self.in_secondary
    }

    pub fn secondary_buffer_index(&self) -> usize {
        self.secondary_buffer_index
    }

    pub fn secondaries(&self) -> &[CommandBuffer] {
        &self.secondaries
    }

    pub fn parent(&self) -> Option<RawCommandBuffer> {
        self.parent
    }

    fn check(&self, op: CommandBufferOp) {
        if self.state.apply(op).is_none() {
            engine_fatal!(SOURCE, "Illegal command buffer operation {:?} in state {:?}", op, self.state);
        }
    }

    fn transition(&mut self, op: CommandBufferOp) {
        match self.state.apply(op) {
            Some(next) => self.state = next,
            None => engine_fatal!(SOURCE, "Illegal command buffer operation {:?} in state {:?}", op, self.state),
        }
    }
}

#[cfg(test)]
#[path = "command_buffer_tests.rs"]
mod tests;
