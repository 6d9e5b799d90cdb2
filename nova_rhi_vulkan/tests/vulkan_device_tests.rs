//! GPU tests for VulkanDevice and the Vulkan backend plugin
//!
//! All tests require a Vulkan driver and are marked with #[ignore].
//!
//! Run with: cargo test -p nova_rhi_vulkan --test vulkan_device_tests -- --ignored --test-threads=1

use nova_rhi::device::*;
use nova_rhi::nova::render::{FrameData, TextureDesc};
use nova_rhi::nova::{create_backend, RendererConfig, RendererConfigFlags, WindowConfig};
use nova_rhi_vulkan::VulkanDevice;
use winit::event_loop::EventLoop;
use winit::window::Window;

/// Hidden window for surface tests
#[allow(deprecated)]
fn create_test_window() -> (Window, EventLoop<()>) {
    let event_loop = EventLoop::new().unwrap();
    let window_attrs = Window::default_attributes()
        .with_title("Nova Vulkan Test")
        .with_inner_size(winit::dpi::PhysicalSize::new(640, 480))
        .with_visible(false);
    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}

fn test_config() -> RendererConfig {
    RendererConfig {
        application_name: "nova_rhi_vulkan tests".to_string(),
        flags: RendererConfigFlags::VSYNC,
        secondary_buffers_per_frame: 4,
        staging_buffer_size: 1024 * 1024,
        ..RendererConfig::default()
    }
}

fn host_memory_index(device: &VulkanDevice, requirements: &MemoryRequirements) -> u32 {
    let wanted = MemoryProperty::HOST_VISIBLE | MemoryProperty::HOST_COHERENT;
    device
        .capabilities()
        .memory_types
        .iter()
        .enumerate()
        .position(|(index, memory_type)| {
            requirements.memory_type_bits & (1 << index) != 0 && memory_type.property_flags.contains(wanted)
        })
        .expect("no host-visible coherent memory type") as u32
}

// ============================================================================
// DEVICE
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_device_creation_without_window() {
    let device = VulkanDevice::new(&test_config()).unwrap();
    let caps = device.capabilities();

    assert!(!caps.device_name.is_empty());
    assert!(caps.support_flags.has_dynamic_rendering());
    assert!(caps.depth_format.is_depth());
    assert_eq!(caps.depth_channel_count as u32, caps.depth_format.size_bytes());
    assert!(caps.min_uniform_buffer_offset_alignment.is_power_of_two());
    assert!(caps.max_push_constants_size >= 128);
    assert!(!caps.memory_types.is_empty());
    assert_eq!(caps.present_queue_family, caps.graphics_queue_family);
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_buffer_host_round_trip() {
    let mut device = VulkanDevice::new(&test_config()).unwrap();
    let buffer = device
        .create_buffer(256, BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST)
        .unwrap();
    let requirements = device.buffer_memory_requirements(buffer);
    assert!(requirements.size >= 256);

    let index = host_memory_index(&device, &requirements);
    let properties = device.capabilities().memory_types[index as usize].property_flags;
    device
        .allocate_buffer_memory(buffer, &requirements, index, properties, "round_trip")
        .unwrap();

    let pattern: Vec<u8> = (0..=255).collect();
    device.mapped_memory(buffer).unwrap()[..256].copy_from_slice(&pattern);
    device.flush_memory(buffer, 0, 256).unwrap();
    assert_eq!(&device.mapped_memory(buffer).unwrap()[..256], pattern.as_slice());

    device.destroy_buffer(buffer);
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_fence_wait_and_timeout() {
    let mut device = VulkanDevice::new(&test_config()).unwrap();

    let signaled = device.create_fence(true).unwrap();
    assert!(device.wait_for_fence(signaled, 0).unwrap());
    device.reset_fence(signaled).unwrap();
    assert!(!device.wait_for_fence(signaled, 0).unwrap());

    device.destroy_fence(signaled);
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_empty_submit_signals_fence() {
    let mut device = VulkanDevice::new(&test_config()).unwrap();
    let command_buffers = device.allocate_command_buffers(CommandBufferLevel::Primary, 1).unwrap();
    let cb = command_buffers[0];

    device
        .begin_command_buffer(cb, CommandBufferLevel::Primary, CommandBufferUsage::ONE_TIME_SUBMIT)
        .unwrap();
    device.end_command_buffer(cb).unwrap();

    let fence = device.create_fence(false).unwrap();
    device
        .queue_submit(&SubmitInfo {
            command_buffers: vec![cb],
            wait: None,
            signal: None,
            fence: Some(fence),
        })
        .unwrap();
    assert!(device.wait_for_fence(fence, 5_000_000_000).unwrap());

    device.destroy_fence(fence);
    device.free_command_buffers(&command_buffers);
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_rejects_invalid_spirv() {
    let mut device = VulkanDevice::new(&test_config()).unwrap();
    assert!(device.create_shader_module(ShaderStage::Vertex, &[1, 2, 3]).is_err());
    assert!(device.create_shader_module(ShaderStage::Vertex, &[0; 16]).is_err());
}

// ============================================================================
// SURFACE
// ============================================================================

#[test]
#[ignore] // Requires GPU and a display
fn test_vulkan_surface_support() {
    let (window, _event_loop) = create_test_window();
    let mut device = VulkanDevice::new(&test_config()).unwrap();

    let surface = device.create_surface(&window).unwrap();
    let support = device.query_surface_support(surface).unwrap();
    assert!(!support.formats.is_empty());
    assert!(support.present_modes.contains(&PresentMode::Fifo));
    assert!(support.capabilities.min_image_count >= 1);

    device.destroy_surface(surface);
}

// ============================================================================
// BACKEND PLUGIN
// ============================================================================

#[test]
#[ignore] // Requires GPU and a display
fn test_vulkan_backend_renders_frames() {
    let (window, _event_loop) = create_test_window();
    nova_rhi_vulkan::register();
    let mut backend = create_backend(nova_rhi_vulkan::PLUGIN_NAME, test_config()).unwrap();

    let window_config = WindowConfig { name: "main".to_string(), width: 640, height: 480 };
    let handle = backend.window_create(&window, &window_config).unwrap();

    let mut presented = 0;
    for frame_number in 1..=3 {
        let frame = FrameData { frame_number, delta_time: 1.0 / 60.0 };
        if !backend.frame_prepare(handle, &frame).unwrap() {
            continue;
        }
        backend.clear_colour_set([0.1, 0.2, 0.3, 1.0]).unwrap();
        backend.frame_commands_begin().unwrap();
        backend
            .begin_rendering(Rect2D { x: 0, y: 0, width: 640, height: 480 }, &[], None)
            .unwrap();
        backend.end_rendering().unwrap();
        backend.frame_commands_end().unwrap();
        backend.frame_submit().unwrap();
        if backend.frame_present().unwrap() {
            presented += 1;
        }
    }
    assert!(presented > 0);

    backend.window_destroy(handle).unwrap();
    backend.shutdown();
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_backend_texture_upload_and_read_back() {
    nova_rhi_vulkan::register();
    let mut backend = create_backend(nova_rhi_vulkan::PLUGIN_NAME, test_config()).unwrap();

    let texture = backend
        .texture_acquire(TextureDesc::new("checker", 4, 4, Format::R8G8B8A8_UNORM))
        .unwrap();
    let pixels: Vec<u8> = (0..4 * 4 * 4).map(|i| i as u8).collect();
    backend.texture_write_data(texture, &pixels).unwrap();

    let pixel = backend.texture_read_pixel(texture, 1, 0).unwrap();
    assert_eq!(pixel, [4, 5, 6, 7]);

    backend.texture_release(texture).unwrap();
    backend.shutdown();
}
