/// Sampler slot table

use slotmap::{new_key_type, SlotMap};
use crate::error::Result;
use crate::device::{GpuDevice, RawSampler, SamplerDesc};
use crate::backend::context::GpuContext;
use crate::{engine_debug, engine_err};

const SOURCE: &str = "nova::rhi::Sampler";

new_key_type! {
    /// Generational sampler handle
    pub struct SamplerHandle;
}

#[derive(Debug)]
struct SamplerSlot {
    name: String,
    raw: RawSampler,
    desc: SamplerDesc,
}

/// Slot table of device samplers
#[derive(Debug, Default)]
pub struct SamplerTable {
    slots: SlotMap<SamplerHandle, SamplerSlot>,
}

impl SamplerTable {
    pub fn new() -> Self {
        Self { slots: SlotMap::with_key() }
    }

    pub fn acquire<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, name: &str, desc: SamplerDesc) -> Result<SamplerHandle> {
        let desc = clamp_anisotropy(context, desc);
        let raw = context.device.create_sampler(&desc)?;
        engine_debug!(SOURCE, "Acquired sampler '{}'", name);
        Ok(self.slots.insert(SamplerSlot { name: name.to_string(), raw, desc }))
    }

    /// Destroy after draining the device; the handle becomes stale
    pub fn release<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, handle: SamplerHandle) -> Result<()> {
        if !self.slots.contains_key(handle) {
            return Err(engine_err!(SOURCE, "Invalid or stale sampler handle {:?}", handle));
        }
        context.device.wait_idle()?;
        if let Some(slot) = self.slots.remove(handle) {
            context.device.destroy_sampler(slot.raw);
        }
        Ok(())
    }

    /// Rebuild the device sampler with a new description; the handle stays valid
    pub fn refresh<D: GpuDevice>(&mut self, context: &mut GpuContext<D>, handle: SamplerHandle, desc: SamplerDesc) -> Result<()> {
        let desc = clamp_anisotropy(context, desc);
        let slot = self
            .slots
            .get_mut(handle)
            .ok_or_else(|| engine_err!(SOURCE, "Invalid or stale sampler handle {:?}", handle))?;
        context.device.wait_idle()?;
        let raw = context.device.create_sampler(&desc)?;
        context.device.destroy_sampler(std::mem::replace(&mut slot.raw, raw));
        slot.desc = desc;
        Ok(())
    }

    pub fn raw(&self, handle: SamplerHandle) -> Option<RawSampler> {
        self.slots.get(handle).map(|slot| slot.raw)
    }

    pub fn desc(&self, handle: SamplerHandle) -> Option<&SamplerDesc> {
        self.slots.get(handle).map(|slot| &slot.desc)
    }

    pub fn name(&self, handle: SamplerHandle) -> Option<&str> {
        self.slots.get(handle).map(|slot| slot.name.as_str())
    }

    pub fn contains(&self, handle: SamplerHandle) -> bool {
        self.slots.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Destroy every sampler (shutdown)
    pub fn destroy_all<D: GpuDevice>(&mut self, context: &mut GpuContext<D>) {
        for (_, slot) in self.slots.drain() {
            context.device.destroy_sampler(slot.raw);
        }
    }
}

fn clamp_anisotropy<D: GpuDevice>(context: &GpuContext<D>, mut desc: SamplerDesc) -> SamplerDesc {
    desc.max_anisotropy = desc.max_anisotropy.min(context.capabilities().max_sampler_anisotropy).max(0.0);
    desc
}

#[cfg(test)]
#[path = "sampler_tests.rs"]
mod tests;
