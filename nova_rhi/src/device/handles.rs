/// Raw device object handles
///
/// Every handle is an opaque 64-bit value; `0` is the null handle. Vulkan
/// handles are themselves 64-bit, so the Vulkan device converts them with
/// `vk::Handle::as_raw` / `from_raw` without any lookup.

macro_rules! raw_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
            pub struct $name(pub u64);

            impl $name {
                /// The null handle
                pub const NULL: Self = Self(0);

                /// Whether this is the null handle
                pub fn is_null(&self) -> bool {
                    self.0 == 0
                }
            }
        )*
    };
}

raw_handle! {
    /// Native image
    RawImage;
    /// Native image view
    RawImageView;
    /// Native buffer
    RawBuffer;
    /// Native command buffer (primary or secondary)
    RawCommandBuffer;
    /// Native binary semaphore
    RawSemaphore;
    /// Native fence
    RawFence;
    /// Native presentation surface
    RawSurface;
    /// Native swapchain
    RawSwapchain;
    /// Native descriptor pool
    RawDescriptorPool;
    /// Native descriptor set layout
    RawDescriptorSetLayout;
    /// Native descriptor set
    RawDescriptorSet;
    /// Native pipeline layout
    RawPipelineLayout;
    /// Native graphics pipeline
    RawPipeline;
    /// Native shader module
    RawShaderModule;
    /// Native sampler
    RawSampler;
}
