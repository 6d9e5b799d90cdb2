/// VulkanContext - instance, device, queue, command pool and allocator
///
/// Creation never needs a window: the instance enables every surface
/// extension the loader offers, and present support is checked per surface
/// when one is created. Device selection is a plain scoring pass (discrete
/// first) over devices that can render with dynamic rendering.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use nova_rhi::device::{DeviceCapabilities, DeviceSupportFlags, Format, MemoryType};
use nova_rhi::nova::{Error, RendererConfig, RendererConfigFlags, Result};
use nova_rhi::{engine_error, engine_info, engine_warn};
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::Mutex;

use crate::vulkan_convert::{format_to_vk, memory_property_from_vk};

const SOURCE: &str = "nova::vulkan::Context";

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Surface extensions enabled whenever the loader offers them
const SURFACE_EXTENSIONS: [&CStr; 6] = [
    ash::khr::win32_surface::NAME,
    ash::khr::xlib_surface::NAME,
    ash::khr::xcb_surface::NAME,
    ash::khr::wayland_surface::NAME,
    ash::khr::android_surface::NAME,
    ash::ext::metal_surface::NAME,
];

/// Depth formats in order of preference
const DEPTH_FORMATS: [Format; 3] = [Format::D32_SFLOAT_S8_UINT, Format::D24_UNORM_S8_UINT, Format::D32_SFLOAT];

/// How extended dynamic state commands are reached
pub(crate) enum DynamicStateFns {
    Core,
    Extension(ash::ext::extended_dynamic_state::Device),
    Unsupported,
}

/// How dynamic rendering commands are reached
pub(crate) enum DynamicRenderingFns {
    Core,
    Extension(ash::khr::dynamic_rendering::Device),
}

/// Everything the Vulkan device shares across calls
pub(crate) struct VulkanContext {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    /// Graphics command pool (RESET_COMMAND_BUFFER)
    pub command_pool: vk::CommandPool,
    /// Dropped before the device is destroyed
    pub allocator: ManuallyDrop<Mutex<Allocator>>,
    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub dynamic_state: DynamicStateFns,
    pub dynamic_rendering: DynamicRenderingFns,
    pub capabilities: DeviceCapabilities,
    pub non_coherent_atom_size: u64,
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

/// A physical device that passed the requirements, with what it offers
struct DeviceCandidate {
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    graphics_family: u32,
    transfer_family: u32,
    extensions: Vec<CString>,
    support_flags: DeviceSupportFlags,
}

fn init_failed<E: std::fmt::Debug>(what: &'static str) -> impl FnOnce(E) -> Error {
    move |e| {
        engine_error!(SOURCE, "{}: {:?}", what, e);
        Error::InitializationFailed(format!("{}: {:?}", what, e))
    }
}

impl VulkanContext {
    pub(crate) fn new(config: &RendererConfig) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(init_failed("Failed to load Vulkan library"))?;

            let instance_version = entry
                .try_enumerate_instance_version()
                .map_err(init_failed("Failed to query instance version"))?
                .unwrap_or(vk::API_VERSION_1_0);
            let api_version = instance_version.min(vk::API_VERSION_1_3);

            let available: Vec<CString> = entry
                .enumerate_instance_extension_properties(None)
                .map_err(init_failed("Failed to enumerate instance extensions"))?
                .iter()
                .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
                .collect();
            let available_refs: Vec<&CStr> = available.iter().map(CString::as_c_str).collect();

            let validation = Self::validation_requested(&entry, config);
            let extensions = instance_extensions(&available_refs, validation);
            if !extensions.contains(&ash::khr::surface::NAME) {
                engine_error!(SOURCE, "Vulkan loader offers no surface extension");
                return Err(Error::InitializationFailed("VK_KHR_surface is not available".to_string()));
            }
            let extension_ptrs: Vec<*const std::os::raw::c_char> =
                extensions.iter().map(|name| name.as_ptr()).collect();
            let layer_ptrs = if validation { vec![VALIDATION_LAYER.as_ptr()] } else { Vec::new() };

            let application_name = CString::new(config.application_name.as_str())
                .map_err(init_failed("Invalid application name"))?;
            let (major, minor, patch) = config.application_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&application_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"Nova")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(api_version);

            let flags = if extensions.contains(&ash::khr::portability_enumeration::NAME) {
                vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
            } else {
                vk::InstanceCreateFlags::empty()
            };
            let create_info = vk::InstanceCreateInfo::default()
                .flags(flags)
                .application_info(&app_info)
                .enabled_layer_names(&layer_ptrs)
                .enabled_extension_names(&extension_ptrs);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(init_failed("Failed to create Vulkan instance"))?;

            let debug_messenger = if validation {
                Self::create_debug_messenger(&entry, &instance)
            } else {
                None
            };

            match Self::create_device(entry.clone(), instance.clone(), api_version, debug_messenger.clone()) {
                Ok(context) => Ok(context),
                Err(e) => {
                    if let Some((debug_utils, messenger)) = debug_messenger {
                        debug_utils.destroy_debug_utils_messenger(messenger, None);
                    }
                    instance.destroy_instance(None);
                    Err(e)
                }
            }
        }
    }

    fn validation_requested(entry: &ash::Entry, config: &RendererConfig) -> bool {
        if !config.flags.contains(RendererConfigFlags::ENABLE_VALIDATION) {
            return false;
        }
        if !cfg!(feature = "vulkan-validation") {
            engine_warn!(SOURCE, "Validation requested but the vulkan-validation feature is disabled");
            return false;
        }
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let found = layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str().map(|name| name == VALIDATION_LAYER).unwrap_or(false));
        if !found {
            engine_warn!(SOURCE, "Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }
        found
    }

    #[cfg(feature = "vulkan-validation")]
    fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
        let info = crate::vulkan_debug::messenger_create_info();
        match unsafe { debug_utils.create_debug_utils_messenger(&info, None) } {
            Ok(messenger) => Some((debug_utils, messenger)),
            Err(e) => {
                engine_warn!(SOURCE, "Failed to create debug messenger: {:?}", e);
                None
            }
        }
    }

    #[cfg(not(feature = "vulkan-validation"))]
    fn create_debug_messenger(
        _entry: &ash::Entry,
        _instance: &ash::Instance,
    ) -> Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        None
    }

    unsafe fn create_device(
        entry: ash::Entry,
        instance: ash::Instance,
        api_version: u32,
        debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    ) -> Result<Self> {
        let candidate = Self::select_physical_device(&instance, api_version)?;
        let physical_device = candidate.physical_device;
        let extension_refs: Vec<&CStr> = candidate.extensions.iter().map(CString::as_c_str).collect();
        let support_flags = candidate.support_flags;

        let features = instance.get_physical_device_features(physical_device);
        let anisotropy = features.sampler_anisotropy == vk::TRUE;
        let enabled_features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(anisotropy)
            .fill_mode_non_solid(features.fill_mode_non_solid == vk::TRUE);

        let mut device_extensions = vec![ash::khr::swapchain::NAME];
        if support_flags.contains(DeviceSupportFlags::DYNAMIC_RENDERING_EXTENSION) {
            device_extensions.push(ash::khr::dynamic_rendering::NAME);
        }
        if support_flags.contains(DeviceSupportFlags::DYNAMIC_STATE_EXTENSION) {
            device_extensions.push(ash::ext::extended_dynamic_state::NAME);
        }
        if support_flags.contains(DeviceSupportFlags::LINE_SMOOTH_RASTERISATION) {
            device_extensions.push(ash::ext::line_rasterization::NAME);
        }
        if extension_refs.contains(&ash::khr::portability_subset::NAME) {
            device_extensions.push(ash::khr::portability_subset::NAME);
        }
        let extension_ptrs: Vec<*const std::os::raw::c_char> =
            device_extensions.iter().map(|name| name.as_ptr()).collect();

        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(candidate.graphics_family)
            .queue_priorities(&queue_priorities)];

        let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);
        let mut dynamic_rendering_features =
            vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);
        let mut dynamic_state_features =
            vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default().extended_dynamic_state(true);
        let mut line_features = vk::PhysicalDeviceLineRasterizationFeaturesEXT::default().smooth_lines(true);

        let mut device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&enabled_features);
        if support_flags.contains(DeviceSupportFlags::NATIVE_DYNAMIC_RENDERING) {
            device_create_info = device_create_info.push_next(&mut vulkan13_features);
        } else {
            device_create_info = device_create_info.push_next(&mut dynamic_rendering_features);
        }
        if support_flags.contains(DeviceSupportFlags::DYNAMIC_STATE_EXTENSION) {
            device_create_info = device_create_info.push_next(&mut dynamic_state_features);
        }
        if support_flags.contains(DeviceSupportFlags::LINE_SMOOTH_RASTERISATION) {
            device_create_info = device_create_info.push_next(&mut line_features);
        }

        let device = instance
            .create_device(physical_device, &device_create_info, None)
            .map_err(init_failed("Failed to create logical device"))?;
        let graphics_queue = device.get_device_queue(candidate.graphics_family, 0);

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(candidate.graphics_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = match device.create_command_pool(&pool_info, None) {
            Ok(pool) => pool,
            Err(e) => {
                device.destroy_device(None);
                return Err(init_failed("Failed to create command pool")(e));
            }
        };

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                device.destroy_command_pool(command_pool, None);
                device.destroy_device(None);
                return Err(init_failed("Failed to create GPU allocator")(e));
            }
        };

        let dynamic_state = if support_flags.contains(DeviceSupportFlags::NATIVE_DYNAMIC_STATE) {
            DynamicStateFns::Core
        } else if support_flags.contains(DeviceSupportFlags::DYNAMIC_STATE_EXTENSION) {
            DynamicStateFns::Extension(ash::ext::extended_dynamic_state::Device::new(&instance, &device))
        } else {
            DynamicStateFns::Unsupported
        };
        let dynamic_rendering = if support_flags.contains(DeviceSupportFlags::NATIVE_DYNAMIC_RENDERING) {
            DynamicRenderingFns::Core
        } else {
            DynamicRenderingFns::Extension(ash::khr::dynamic_rendering::Device::new(&instance, &device))
        };

        let capabilities = Self::build_capabilities(&instance, &candidate, anisotropy);
        engine_info!(
            SOURCE,
            "Selected '{}' (graphics family {}, support {:?}, depth {:?})",
            capabilities.device_name,
            capabilities.graphics_queue_family,
            capabilities.support_flags,
            capabilities.depth_format
        );

        Ok(Self {
            surface_loader: ash::khr::surface::Instance::new(&entry, &instance),
            swapchain_loader: ash::khr::swapchain::Device::new(&instance, &device),
            entry,
            instance,
            physical_device,
            device,
            graphics_queue,
            command_pool,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            dynamic_state,
            dynamic_rendering,
            capabilities,
            non_coherent_atom_size: candidate.properties.limits.non_coherent_atom_size.max(1),
            debug_messenger,
        })
    }

    unsafe fn select_physical_device(instance: &ash::Instance, api_version: u32) -> Result<DeviceCandidate> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(init_failed("Failed to enumerate physical devices"))?;

        let mut best: Option<(u32, DeviceCandidate)> = None;
        for physical_device in physical_devices {
            let properties = instance.get_physical_device_properties(physical_device);
            let name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let families = instance.get_physical_device_queue_family_properties(physical_device);
            let Some(graphics_family) = graphics_family(&families) else {
                engine_info!(SOURCE, "Skipping '{}': no graphics queue", name);
                continue;
            };

            let extensions: Vec<CString> = match instance.enumerate_device_extension_properties(physical_device) {
                Ok(extensions) => extensions
                    .iter()
                    .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
                    .collect(),
                Err(e) => {
                    engine_warn!(SOURCE, "Skipping '{}': cannot enumerate extensions ({:?})", name, e);
                    continue;
                }
            };
            let extension_refs: Vec<&CStr> = extensions.iter().map(CString::as_c_str).collect();
            if !extension_refs.contains(&ash::khr::swapchain::NAME) {
                engine_info!(SOURCE, "Skipping '{}': no swapchain support", name);
                continue;
            }

            let device_api = properties.api_version.min(api_version);
            let smooth_lines = extension_refs.contains(&ash::ext::line_rasterization::NAME)
                && api_version >= vk::API_VERSION_1_1
                && Self::supports_smooth_lines(instance, physical_device);
            let support_flags = support_flags(device_api, &extension_refs, smooth_lines);
            if !support_flags.has_dynamic_rendering() {
                engine_info!(SOURCE, "Skipping '{}': no dynamic rendering", name);
                continue;
            }

            let score = device_type_score(properties.device_type);
            if best.as_ref().map(|(best_score, _)| score > *best_score).unwrap_or(true) {
                best = Some((
                    score,
                    DeviceCandidate {
                        physical_device,
                        properties,
                        graphics_family,
                        transfer_family: transfer_family(&families, graphics_family),
                        extensions,
                        support_flags,
                    },
                ));
            }
        }

        best.map(|(_, candidate)| candidate).ok_or_else(|| {
            engine_error!(SOURCE, "No Vulkan device meets the renderer requirements");
            Error::InitializationFailed("No suitable Vulkan device found".to_string())
        })
    }

    unsafe fn supports_smooth_lines(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> bool {
        let mut line_features = vk::PhysicalDeviceLineRasterizationFeaturesEXT::default();
        let mut features = vk::PhysicalDeviceFeatures2::default().push_next(&mut line_features);
        instance.get_physical_device_features2(physical_device, &mut features);
        line_features.smooth_lines == vk::TRUE
    }

    unsafe fn build_capabilities(
        instance: &ash::Instance,
        candidate: &DeviceCandidate,
        anisotropy: bool,
    ) -> DeviceCapabilities {
        let physical_device = candidate.physical_device;
        let limits = &candidate.properties.limits;

        let memory = instance.get_physical_device_memory_properties(physical_device);
        let memory_types: Vec<MemoryType> = memory.memory_types[..memory.memory_type_count as usize]
            .iter()
            .map(|memory_type| MemoryType {
                property_flags: memory_property_from_vk(memory_type.property_flags),
                heap_index: memory_type.heap_index,
            })
            .collect();
        let device_local_host_visible = vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;
        let supports_device_local_host_visible = memory.memory_types[..memory.memory_type_count as usize]
            .iter()
            .any(|memory_type| memory_type.property_flags.contains(device_local_host_visible));

        let depth_format = select_depth_format(|format| {
            instance
                .get_physical_device_format_properties(physical_device, format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .unwrap_or(Format::D32_SFLOAT);

        DeviceCapabilities {
            device_name: candidate
                .properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "Unknown device".to_string()),
            graphics_queue_family: candidate.graphics_family,
            present_queue_family: candidate.graphics_family,
            transfer_queue_family: candidate.transfer_family,
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment.max(1),
            max_push_constants_size: limits.max_push_constants_size,
            max_sampler_anisotropy: if anisotropy { limits.max_sampler_anisotropy } else { 1.0 },
            memory_types,
            supports_device_local_host_visible,
            support_flags: candidate.support_flags,
            depth_format,
            depth_channel_count: depth_format.size_bytes() as u8,
        }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_command_pool(self.command_pool, None);

            // Allocator memory blocks must be freed while the device is alive
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

// ============================================================================
// Selection helpers
// ============================================================================

/// Instance extensions to enable out of the ones the loader offers
pub(crate) fn instance_extensions(available: &[&CStr], validation: bool) -> Vec<&'static CStr> {
    let mut extensions = Vec::new();
    if available.contains(&ash::khr::surface::NAME) {
        extensions.push(ash::khr::surface::NAME);
    }
    extensions.extend(SURFACE_EXTENSIONS.iter().copied().filter(|name| available.contains(name)));
    if available.contains(&ash::khr::portability_enumeration::NAME) {
        extensions.push(ash::khr::portability_enumeration::NAME);
    }
    if validation && available.contains(&ash::ext::debug_utils::NAME) {
        extensions.push(ash::ext::debug_utils::NAME);
    }
    extensions
}

/// Preference of a device type; higher wins
pub(crate) fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// Feature tiers available at `api_version` with `extensions`
pub(crate) fn support_flags(api_version: u32, extensions: &[&CStr], smooth_lines: bool) -> DeviceSupportFlags {
    let mut flags = DeviceSupportFlags::empty();
    if api_version >= vk::API_VERSION_1_3 {
        flags |= DeviceSupportFlags::NATIVE_DYNAMIC_STATE | DeviceSupportFlags::NATIVE_DYNAMIC_RENDERING;
    } else {
        if extensions.contains(&ash::ext::extended_dynamic_state::NAME) {
            flags |= DeviceSupportFlags::DYNAMIC_STATE_EXTENSION;
        }
        if extensions.contains(&ash::khr::dynamic_rendering::NAME) {
            flags |= DeviceSupportFlags::DYNAMIC_RENDERING_EXTENSION;
        }
    }
    if smooth_lines {
        flags |= DeviceSupportFlags::LINE_SMOOTH_RASTERISATION;
    }
    flags
}

/// First depth format `supports` accepts, in preference order
pub(crate) fn select_depth_format(supports: impl Fn(vk::Format) -> bool) -> Option<Format> {
    DEPTH_FORMATS.iter().copied().find(|format| supports(format_to_vk(*format)))
}

/// First queue family with graphics support
pub(crate) fn graphics_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|index| index as u32)
}

/// A transfer-only family if one exists, otherwise the graphics family
pub(crate) fn transfer_family(families: &[vk::QueueFamilyProperties], graphics: u32) -> u32 {
    families
        .iter()
        .position(|family| {
            family.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|index| index as u32)
        .unwrap_or(graphics)
}

#[cfg(test)]
#[path = "vulkan_context_tests.rs"]
mod tests;
