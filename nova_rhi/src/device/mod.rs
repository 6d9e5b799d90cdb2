/// Device module - the explicit low-level GPU API the backend is written against
///
/// Everything above this module (images, buffers, command buffers, swapchains,
/// shaders) talks to the GPU only through `GpuDevice`. The Vulkan crate
/// implements it with `ash`; tests implement it with a recording mock.

pub mod handles;
pub mod types;
pub mod capabilities;
pub mod descriptors;
pub mod gpu_device;

pub use handles::*;
pub use types::*;
pub use capabilities::*;
pub use descriptors::*;
pub use gpu_device::*;
