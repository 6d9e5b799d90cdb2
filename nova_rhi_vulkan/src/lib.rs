/*!
# Nova RHI - Vulkan Device

Vulkan implementation of the `nova_rhi` explicit device API.

The device is built on `ash` for the bindings, `ash-window` for surfaces,
`gpu-allocator` for memory and `spirq` for a sanity pass over incoming SPIR-V.
Everything above the device (frames, swapchains, shaders) is the backend in
`nova_rhi`; this crate only translates `GpuDevice` calls into Vulkan.

```no_run
use nova_rhi::nova::{create_backend, RendererConfig};

nova_rhi_vulkan::register();
let backend = create_backend("vulkan", RendererConfig::default())?;
# Ok::<(), nova_rhi::nova::Error>(())
```
*/

mod vulkan_context;
mod vulkan_convert;
mod vulkan_debug;
mod vulkan_device;
mod vulkan_reflect;

use nova_rhi::nova::{register_backend_plugin, RenderBackend, RendererBackend};

pub use vulkan_debug::{print_validation_stats_report, reset_validation_stats, validation_stats, ValidationStats};
pub use vulkan_device::VulkanDevice;

/// Name the Vulkan backend is registered under
pub const PLUGIN_NAME: &str = "vulkan";

/// Register the Vulkan backend with the plugin registry
///
/// Registering again replaces the previous factory.
pub fn register() {
    register_backend_plugin(PLUGIN_NAME, |config| {
        let device = VulkanDevice::new(&config)?;
        let backend: Box<dyn RendererBackend> = Box::new(RenderBackend::new(device, config)?);
        Ok(backend)
    });
}
