pub mod buffer;
pub mod framebuffer;
pub mod image;
pub mod pipeline;
