pub mod device;
pub mod pipeline;
pub mod swapchain;
pub mod vulkan_backend;
