use super::*;
use crate::backend::mock_device::{MockCall, MockDevice, MockWindow};
use crate::backend::texture::INVALID_GENERATION;

fn test_config() -> RendererConfig {
    RendererConfig {
        secondary_buffers_per_frame: 4,
        staging_buffer_size: 4096,
        ..RendererConfig::default()
    }
}

fn create_window(device: MockDevice) -> (GpuContext<MockDevice>, TextureTable, WindowRenderState) {
    let mut ctx = GpuContext::new(device);
    let mut textures = TextureTable::new();
    let window = WindowConfig { name: "main".to_string(), width: 800, height: 600 };
    let state = WindowRenderState::create(&mut ctx, &mut textures, &MockWindow, &window, &test_config()).unwrap();
    (ctx, textures, state)
}

#[test]
fn test_create_allocates_per_frame_resources() {
    let (ctx, textures, state) = create_window(MockDevice::new());

    assert_eq!(state.image_count(), 3);
    assert_eq!(state.max_frames_in_flight(), 2);
    assert_eq!(state.command_buffers.len(), 2);
    assert_eq!(state.sync.len(), 2);
    assert_eq!(state.staging.len(), 2);
    assert_eq!(state.textures_written.len(), 2);
    assert_eq!(state.current_frame(), 0);

    for command_buffer in &state.command_buffers {
        assert!(command_buffer.is_primary());
        assert_eq!(command_buffer.secondaries().len(), 4);
    }
    // First wait on every slot must not block
    for sync in &state.sync {
        assert!(ctx.device.fence_signaled(sync.in_flight));
    }
}

#[test]
fn test_create_builds_window_targets() {
    let (_ctx, textures, state) = create_window(MockDevice::new());

    // swapchain + colour buffer + depth buffer
    assert_eq!(textures.len(), 3);
    let colour = textures.get(state.colourbuffer()).unwrap();
    assert_eq!(colour.images().len(), 3);
    assert_eq!(colour.format(), Format::B8G8R8A8_UNORM);
    assert!(colour.flags().contains(TextureFlags::IS_WRITEABLE));

    let depth = textures.get(state.depthbuffer()).unwrap();
    assert_eq!(depth.images().len(), 3);
    assert_eq!(depth.format(), Format::D32_SFLOAT_S8_UINT);
    assert!(depth.flags().contains(TextureFlags::DEPTH));

    assert_eq!((state.width(), state.height()), (800, 600));
    assert_eq!(state.pass_state.scissor, Rect2D { x: 0, y: 0, width: 800, height: 600 });
}

#[test]
fn test_resize_only_bumps_generation() {
    let (mut ctx, _textures, mut state) = create_window(MockDevice::new());
    ctx.device.clear_calls();

    state.resize(1024, 768);
    state.resize(1280, 720);

    assert_eq!(state.size_generation, 2);
    assert_eq!(state.size_last_generation, 0);
    assert_eq!(ctx.device.count(|c| matches!(c, MockCall::CreateSwapchain { .. })), 0);
}

#[test]
fn test_recreate_skipped_while_minimized() {
    let (mut ctx, mut textures, mut state) = create_window(MockDevice::new());
    let config = test_config();
    ctx.device.clear_calls();

    state.resize(0, 600);
    let rebuilt = state.recreate_swapchain(&mut ctx, &mut textures, &config, config.flags).unwrap();

    assert!(!rebuilt);
    assert!(!state.recreating);
    assert!(ctx.device.calls.is_empty());
}

#[test]
fn test_recreate_same_image_count_resizes_targets() {
    let (mut ctx, mut textures, mut state) = create_window(MockDevice::new());
    let config = test_config();
    let colour = state.colourbuffer();
    let command_buffer = state.command_buffer().raw();

    ctx.device.surface_support.capabilities.current_extent = Extent2D { width: 1024, height: 768 };
    state.resize(1024, 768);
    assert!(state.recreate_swapchain(&mut ctx, &mut textures, &config, config.flags).unwrap());

    assert_eq!(state.colourbuffer(), colour);
    assert_eq!(textures.get(colour).unwrap().width(), 1024);
    assert_eq!(textures.get(state.depthbuffer()).unwrap().height(), 768);
    assert_eq!(state.pass_state.viewport.width, 1024.0);
    // Frame count unchanged: per-frame resources survive
    assert_eq!(state.command_buffer().raw(), command_buffer);
}

#[test]
fn test_recreate_new_frame_count_rebuilds_frame_resources() {
    let (mut ctx, mut textures, mut state) = create_window(MockDevice::new());
    let config = test_config();
    let old_fences: Vec<RawFence> = state.sync.iter().map(|s| s.in_flight).collect();

    ctx.device.surface_support.capabilities.min_image_count = 3;
    ctx.device.surface_support.capabilities.max_image_count = 4;
    assert!(state.recreate_swapchain(&mut ctx, &mut textures, &config, config.flags).unwrap());

    assert_eq!(state.image_count(), 4);
    assert_eq!(state.max_frames_in_flight(), 3);
    assert_eq!(state.command_buffers.len(), 3);
    assert_eq!(state.staging.len(), 3);
    assert_eq!(textures.get(state.colourbuffer()).unwrap().images().len(), 4);
    for fence in old_fences {
        assert!(ctx.device.calls.contains(&MockCall::DestroyFence(fence)));
    }
    assert!(state.current_frame() < 3);
}

#[test]
fn test_recreate_new_frame_count_retires_pending_uploads() {
    let (mut ctx, mut textures, mut state) = create_window(MockDevice::new());
    let config = test_config();
    let texture = textures
        .acquire(&mut ctx, TextureDesc::new("albedo", 4, 4, Format::R8G8B8A8_UNORM))
        .unwrap();
    assert_eq!(textures.get(texture).unwrap().generation(), INVALID_GENERATION);
    state.record_texture_written(texture);

    ctx.device.surface_support.capabilities.min_image_count = 3;
    ctx.device.surface_support.capabilities.max_image_count = 4;
    assert!(state.recreate_swapchain(&mut ctx, &mut textures, &config, config.flags).unwrap());

    assert_eq!(state.max_frames_in_flight(), 3);
    assert_ne!(textures.get(texture).unwrap().generation(), INVALID_GENERATION);
    assert!(state.textures_written.iter().all(|list| list.is_empty()));
}

#[test]
fn test_destroy_releases_everything() {
    let (mut ctx, mut textures, mut state) = create_window(MockDevice::new());
    state.destroy(&mut ctx, &mut textures);

    assert!(textures.is_empty());
    assert_eq!(ctx.device.live_images(), 0);
    assert_eq!(ctx.device.live_buffers(), 0);
    assert_eq!(ctx.device.count(|c| matches!(c, MockCall::DestroySurface(_))), 1);
    assert_eq!(ctx.device.count(|c| matches!(c, MockCall::DestroySwapchain(_))), 1);
    assert_eq!(ctx.device.count(|c| matches!(c, MockCall::DestroyFence(_))), 2);
}
