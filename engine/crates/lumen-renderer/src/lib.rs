//! 帧循环
//!
//! [`renderer::Renderer`] 拥有 [`lumen_render_interface::render_context::RenderContext`] 和
//! [`lumen_render_graph::render_graph::RenderGraph`]，负责每一帧的同步、录制、提交和 present，
//! 以及 presentation image 失效之后的 resize。

pub mod config;
pub mod error;
pub mod presentation;
pub mod renderer;
