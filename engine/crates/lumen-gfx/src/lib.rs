//! 图形 API 封装层
//!
//! 上层（资源池、per-frame、render graph）只通过 [`backend::GfxBackend`] 与 GPU 打交道：
//! 传入纯数据的 desc 结构体，拿回不透明的原生句柄。上层永远不会自己构造原生句柄。
//!
//! 提供两个实现：
//! - [`vulkan::vulkan_backend::VulkanBackend`]：基于 ash + vk-mem
//! - [`headless::headless_backend::HeadlessBackend`]：纯 CPU 实现，没有 GPU 也可以跑完整的帧循环，用于测试和工具

pub mod backend;
pub mod commands;
pub mod descriptors;
pub mod error;
pub mod headless;
pub mod pipelines;
pub mod resources;
pub mod vulkan;

pub use ash::vk;
pub use error::{GfxError, GfxResult};
