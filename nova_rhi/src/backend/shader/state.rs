/// Frequency states - per-frame singleton, per-group and per-draw pools
///
/// A state owns one descriptor set per swapchain image, a byte range in the
/// shader's shared uniform buffers, the sampler/texture bound to each
/// descriptor element and the render-frame stamps that keep descriptor writes
/// from repeating within one frame.

use crate::backend::sampler::SamplerHandle;
use crate::backend::shader::config::ShaderUpdateFrequency;
use crate::backend::texture::TextureHandle;
use crate::device::RawDescriptorSet;

/// Stamp of a descriptor that has never been written
pub const INVALID_STAMP: u64 = u64::MAX;

/// Generational handle of a per-group or per-draw state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrequencyHandle {
    frequency: ShaderUpdateFrequency,
    index: u32,
    generation: u32,
}

impl FrequencyHandle {
    /// Handle naming the shader's single per-frame state
    pub(crate) fn per_frame() -> Self {
        Self { frequency: ShaderUpdateFrequency::PerFrame, index: 0, generation: 0 }
    }

    pub fn frequency(&self) -> ShaderUpdateFrequency {
        self.frequency
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Resource bound to every element of one sampler or texture uniform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingState<H> {
    pub uniform_index: u16,
    pub resources: Vec<H>,
    /// `stamps[element][image]`: frame number of the last descriptor write
    pub stamps: Vec<Vec<u64>>,
}

impl<H: Copy + PartialEq> BindingState<H> {
    pub fn new(uniform_index: u16, array_length: u32, default: H, image_count: u32) -> Self {
        Self {
            uniform_index,
            resources: vec![default; array_length as usize],
            stamps: vec![vec![INVALID_STAMP; image_count as usize]; array_length as usize],
        }
    }

    /// Bind `resource` to `element`; a change makes the element stale on every image
    pub fn set(&mut self, element: usize, resource: H) -> bool {
        match self.resources.get_mut(element) {
            Some(current) => {
                if *current != resource {
                    *current = resource;
                    self.stamps[element].fill(INVALID_STAMP);
                }
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyState {
    /// One per swapchain image; empty when the frequency has no set
    pub descriptor_sets: Vec<RawDescriptorSet>,
    /// Offset of the state's range in every per-image uniform buffer
    pub ubo_offset: Option<u64>,
    /// Per-image stamp of the UBO descriptor
    pub ubo_stamps: Vec<u64>,
    pub samplers: Vec<BindingState<SamplerHandle>>,
    pub textures: Vec<BindingState<TextureHandle>>,
    /// Per-draw plain uniform block pushed as constants
    pub push_data: Vec<u8>,
}

impl FrequencyState {
    /// Size every stamp vector for `image_count` images, all stale
    pub fn reset_stamps(&mut self, image_count: u32) {
        let images = image_count as usize;
        self.ubo_stamps = vec![INVALID_STAMP; images];
        for stamps in self
            .samplers
            .iter_mut()
            .flat_map(|binding| binding.stamps.iter_mut())
            .chain(self.textures.iter_mut().flat_map(|binding| binding.stamps.iter_mut()))
        {
            *stamps = vec![INVALID_STAMP; images];
        }
    }
}

#[derive(Debug)]
struct FrequencySlot {
    generation: u32,
    state: Option<FrequencyState>,
}

/// Bounded pool of states; acquisition takes the first free slot
#[derive(Debug)]
pub struct FrequencyStateArray {
    frequency: ShaderUpdateFrequency,
    slots: Vec<FrequencySlot>,
}

impl FrequencyStateArray {
    /// Every slot starts unassigned
    pub fn new(frequency: ShaderUpdateFrequency, capacity: u32) -> Self {
        let slots = (0..capacity).map(|_| FrequencySlot { generation: 0, state: None }).collect();
        Self { frequency, slots }
    }

    /// First unassigned slot, if any
    pub fn free_index(&self) -> Option<u32> {
        self.slots.iter().position(|slot| slot.state.is_none()).map(|i| i as u32)
    }

    /// Occupy slot `index` (from `free_index`)
    pub fn insert(&mut self, index: u32, state: FrequencyState) -> Option<FrequencyHandle> {
        let slot = self.slots.get_mut(index as usize)?;
        if slot.state.is_some() {
            return None;
        }
        slot.state = Some(state);
        Some(FrequencyHandle { frequency: self.frequency, index, generation: slot.generation })
    }

    fn slot(&self, handle: FrequencyHandle) -> Option<&FrequencySlot> {
        if handle.frequency != self.frequency {
            return None;
        }
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }

    pub fn contains(&self, handle: FrequencyHandle) -> bool {
        self.slot(handle).is_some_and(|slot| slot.state.is_some())
    }

    pub fn get(&self, handle: FrequencyHandle) -> Option<&FrequencyState> {
        self.slot(handle)?.state.as_ref()
    }

    pub fn get_mut(&mut self, handle: FrequencyHandle) -> Option<&mut FrequencyState> {
        if handle.frequency != self.frequency {
            return None;
        }
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?
            .state
            .as_mut()
    }

    /// Free the slot, invalidating every handle to it
    pub fn remove(&mut self, handle: FrequencyHandle) -> Option<FrequencyState> {
        if !self.contains(handle) {
            return None;
        }
        let slot = &mut self.slots[handle.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.state.take()
    }

    /// Drain every occupied slot
    pub fn drain(&mut self) -> Vec<FrequencyState> {
        self.slots
            .iter_mut()
            .filter_map(|slot| {
                let state = slot.state.take()?;
                slot.generation = slot.generation.wrapping_add(1);
                Some(state)
            })
            .collect()
    }

    /// Occupied states in slot order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FrequencyState> {
        self.slots.iter_mut().filter_map(|slot| slot.state.as_mut())
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn active_count(&self) -> u32 {
        self.slots.iter().filter(|slot| slot.state.is_some()).count() as u32
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
