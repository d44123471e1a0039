//! GPU 资源的生命周期与 per-frame 复用
//!
//! - [`pool::Pool`]：带 generation 的资源池，过期句柄总是解析失败
//! - [`per_frame::PerFrame`]：每个 frame in flight 一份资源
//! - [`render_context::RenderContext`]：注入给 render pass 的上下文，拥有所有资源池

pub mod descriptor_allocator;
pub mod frame_counter;
pub mod handle;
pub mod per_frame;
pub mod pipeline_settings;
pub mod pool;
pub mod render_context;
pub mod resources;
pub mod ring_buffer;
