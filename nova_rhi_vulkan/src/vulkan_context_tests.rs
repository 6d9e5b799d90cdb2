use super::*;

fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: flags,
        queue_count: 1,
        ..Default::default()
    }
}

// ============================================================================
// INSTANCE EXTENSIONS
// ============================================================================

#[test]
fn test_instance_extensions_keep_only_available_surfaces() {
    let available = [
        ash::khr::surface::NAME,
        ash::khr::xlib_surface::NAME,
        ash::khr::wayland_surface::NAME,
        ash::ext::debug_utils::NAME,
    ];
    let extensions = instance_extensions(&available, false);
    assert_eq!(
        extensions,
        vec![ash::khr::surface::NAME, ash::khr::xlib_surface::NAME, ash::khr::wayland_surface::NAME]
    );
}

#[test]
fn test_instance_extensions_add_debug_utils_with_validation() {
    let available = [ash::khr::surface::NAME, ash::ext::debug_utils::NAME];
    let extensions = instance_extensions(&available, true);
    assert!(extensions.contains(&ash::ext::debug_utils::NAME));
}

#[test]
fn test_instance_extensions_add_portability_enumeration() {
    let available = [
        ash::khr::surface::NAME,
        ash::ext::metal_surface::NAME,
        ash::khr::portability_enumeration::NAME,
    ];
    let extensions = instance_extensions(&available, false);
    assert!(extensions.contains(&ash::ext::metal_surface::NAME));
    assert!(extensions.contains(&ash::khr::portability_enumeration::NAME));
}

#[test]
fn test_instance_extensions_without_surface() {
    let extensions = instance_extensions(&[ash::ext::debug_utils::NAME], true);
    assert!(!extensions.contains(&ash::khr::surface::NAME));
}

// ============================================================================
// DEVICE SELECTION
// ============================================================================

#[test]
fn test_device_type_score_order() {
    let discrete = device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU);
    let integrated = device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU);
    let virtual_gpu = device_type_score(vk::PhysicalDeviceType::VIRTUAL_GPU);
    let cpu = device_type_score(vk::PhysicalDeviceType::CPU);
    let other = device_type_score(vk::PhysicalDeviceType::OTHER);
    assert!(discrete > integrated);
    assert!(integrated > virtual_gpu);
    assert!(virtual_gpu > cpu);
    assert!(cpu > other);
}

#[test]
fn test_support_flags_native_on_1_3() {
    let flags = support_flags(vk::API_VERSION_1_3, &[ash::ext::extended_dynamic_state::NAME], false);
    assert!(flags.contains(DeviceSupportFlags::NATIVE_DYNAMIC_STATE));
    assert!(flags.contains(DeviceSupportFlags::NATIVE_DYNAMIC_RENDERING));
    assert!(!flags.contains(DeviceSupportFlags::DYNAMIC_STATE_EXTENSION));
}

#[test]
fn test_support_flags_extensions_below_1_3() {
    let extensions = [ash::ext::extended_dynamic_state::NAME, ash::khr::dynamic_rendering::NAME];
    let flags = support_flags(vk::API_VERSION_1_2, &extensions, true);
    assert_eq!(
        flags,
        DeviceSupportFlags::DYNAMIC_STATE_EXTENSION
            | DeviceSupportFlags::DYNAMIC_RENDERING_EXTENSION
            | DeviceSupportFlags::LINE_SMOOTH_RASTERISATION
    );
}

#[test]
fn test_support_flags_nothing_on_bare_1_1() {
    let flags = support_flags(vk::API_VERSION_1_1, &[ash::khr::swapchain::NAME], false);
    assert!(flags.is_empty());
    assert!(!flags.has_dynamic_rendering());
}

#[test]
fn test_depth_format_preference() {
    assert_eq!(select_depth_format(|_| true), Some(Format::D32_SFLOAT_S8_UINT));
    assert_eq!(
        select_depth_format(|format| format != vk::Format::D32_SFLOAT_S8_UINT),
        Some(Format::D24_UNORM_S8_UINT)
    );
    assert_eq!(
        select_depth_format(|format| format == vk::Format::D32_SFLOAT),
        Some(Format::D32_SFLOAT)
    );
    assert_eq!(select_depth_format(|_| false), None);
}

#[test]
fn test_graphics_family_is_first_graphics_queue() {
    let families = [
        family(vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::GRAPHICS),
    ];
    assert_eq!(graphics_family(&families), Some(1));
    assert_eq!(graphics_family(&[family(vk::QueueFlags::COMPUTE)]), None);
}

#[test]
fn test_transfer_family_prefers_dedicated_queue() {
    let families = [
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
    ];
    assert_eq!(transfer_family(&families, 0), 1);

    let graphics_only = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER)];
    assert_eq!(transfer_family(&graphics_only, 0), 0);
}
