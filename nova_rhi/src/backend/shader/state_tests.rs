use super::*;
use slotmap::SlotMap;

fn empty_state() -> FrequencyState {
    FrequencyState {
        descriptor_sets: vec![RawDescriptorSet(1), RawDescriptorSet(2)],
        ubo_offset: Some(0),
        ubo_stamps: vec![INVALID_STAMP; 2],
        samplers: Vec::new(),
        textures: Vec::new(),
        push_data: Vec::new(),
    }
}

fn acquire(array: &mut FrequencyStateArray) -> Option<FrequencyHandle> {
    let index = array.free_index()?;
    array.insert(index, empty_state())
}

#[test]
fn test_acquire_takes_first_free_slot() {
    let mut array = FrequencyStateArray::new(ShaderUpdateFrequency::PerGroup, 3);
    let a = acquire(&mut array).unwrap();
    let b = acquire(&mut array).unwrap();
    assert_eq!((a.index(), b.index()), (0, 1));

    array.remove(a).unwrap();
    let c = acquire(&mut array).unwrap();
    assert_eq!(c.index(), 0);
    assert_eq!(array.active_count(), 2);
}

#[test]
fn test_exhausted_array_has_no_free_slot() {
    let mut array = FrequencyStateArray::new(ShaderUpdateFrequency::PerDraw, 2);
    acquire(&mut array).unwrap();
    acquire(&mut array).unwrap();
    assert_eq!(array.free_index(), None);
    assert!(acquire(&mut array).is_none());
}

#[test]
fn test_handle_from_released_slot_is_rejected() {
    let mut array = FrequencyStateArray::new(ShaderUpdateFrequency::PerGroup, 1);
    let old = acquire(&mut array).unwrap();
    array.remove(old).unwrap();
    let new = acquire(&mut array).unwrap();

    assert_eq!(old.index(), new.index());
    assert!(!array.contains(old));
    assert!(array.get(old).is_none());
    assert!(array.get_mut(old).is_none());
    assert!(array.remove(old).is_none());
    assert!(array.contains(new));
}

#[test]
fn test_handle_of_other_frequency_is_rejected() {
    let mut groups = FrequencyStateArray::new(ShaderUpdateFrequency::PerGroup, 1);
    let mut draws = FrequencyStateArray::new(ShaderUpdateFrequency::PerDraw, 1);
    let group = acquire(&mut groups).unwrap();
    acquire(&mut draws).unwrap();
    assert!(!draws.contains(group));
}

#[test]
fn test_insert_into_occupied_slot_fails() {
    let mut array = FrequencyStateArray::new(ShaderUpdateFrequency::PerGroup, 1);
    acquire(&mut array).unwrap();
    assert!(array.insert(0, empty_state()).is_none());
    assert!(array.insert(5, empty_state()).is_none());
}

#[test]
fn test_drain_invalidates_every_handle() {
    let mut array = FrequencyStateArray::new(ShaderUpdateFrequency::PerGroup, 4);
    let handles: Vec<_> = (0..3).map(|_| acquire(&mut array).unwrap()).collect();
    assert_eq!(array.drain().len(), 3);
    assert_eq!(array.active_count(), 0);
    assert!(handles.iter().all(|h| !array.contains(*h)));
    assert_eq!(array.capacity(), 4);
}

#[test]
fn test_binding_change_invalidates_element_stamps() {
    let mut keys: SlotMap<SamplerHandle, ()> = SlotMap::with_key();
    let default = keys.insert(());
    let other = keys.insert(());

    let mut binding = BindingState::new(3, 2, default, 3);
    binding.stamps[0] = vec![7, 7, 7];
    binding.stamps[1] = vec![7, 7, 7];

    // Same resource keeps the stamps
    assert!(binding.set(0, default));
    assert_eq!(binding.stamps[0], vec![7, 7, 7]);

    assert!(binding.set(1, other));
    assert_eq!(binding.resources, vec![default, other]);
    assert_eq!(binding.stamps[0], vec![7, 7, 7]);
    assert_eq!(binding.stamps[1], vec![INVALID_STAMP; 3]);

    assert!(!binding.set(2, other));
}
