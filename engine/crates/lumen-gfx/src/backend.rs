use std::any::Any;

use ash::vk;

use crate::commands::command::GfxCommand;
use crate::descriptors::descriptor::{GfxDescriptorPoolDesc, GfxDescriptorSetLayoutDesc, GfxDescriptorWrite};
use crate::error::GfxResult;
use crate::pipelines::compute_pipeline::GfxComputePipelineDesc;
use crate::pipelines::graphics_pipeline::{GfxGraphicsPipelineDesc, GfxPipelineObjects};
use crate::resources::buffer::{GfxBufferAlloc, GfxBufferDesc};
use crate::resources::image::{GfxImageAlloc, GfxImageDesc};

slotmap::new_key_type! {
    /// backend 内部一次内存分配的 key，上层只保存不解释
    pub struct GfxAllocationKey;
}

/// 获取 presentation image 的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GfxAcquire {
    Image { index: u32, suboptimal: bool },
    /// swapchain 已经和 surface 不匹配，需要重建
    OutOfDate,
}

/// present 的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GfxPresent {
    Presented,
    Suboptimal,
    OutOfDate,
}
impl GfxPresent {
    /// 是否需要重建 swapchain
    #[inline]
    pub fn need_recreate(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// presentation image 集合的信息
///
/// 这些 image 属于 presentation engine，上层只能包装，不能释放它们的内存
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxSwapchainInfo {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub images: Vec<vk::Image>,
}

/// 图形 API 的边界
///
/// 所有原生句柄都由这里创建和销毁；参数都是纯数据的 desc。
/// 所有的调用都在同一个线程上进行。
pub trait GfxBackend {
    fn name(&self) -> &str;

    // buffer
    fn create_buffer(&mut self, desc: &GfxBufferDesc) -> GfxResult<GfxBufferAlloc>;
    fn destroy_buffer(&mut self, buffer: vk::Buffer, allocation: GfxAllocationKey);
    /// 只能用于 host visible 的内存
    fn write_buffer(&mut self, allocation: GfxAllocationKey, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()>;
    /// 只能用于 host visible 的内存
    fn read_buffer(&mut self, allocation: GfxAllocationKey, offset: vk::DeviceSize, len: usize) -> GfxResult<Vec<u8>>;

    // image
    fn create_image(&mut self, desc: &GfxImageDesc) -> GfxResult<GfxImageAlloc>;
    /// 不能用于 presentation image
    fn destroy_image(&mut self, image: vk::Image, allocation: GfxAllocationKey);
    fn create_image_view(
        &mut self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> GfxResult<vk::ImageView>;
    fn destroy_image_view(&mut self, view: vk::ImageView);

    // framebuffer
    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> GfxResult<vk::Framebuffer>;
    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer);

    // pipeline
    fn create_graphics_pipeline(&mut self, desc: &GfxGraphicsPipelineDesc) -> GfxResult<GfxPipelineObjects>;
    fn create_compute_pipeline(&mut self, desc: &GfxComputePipelineDesc) -> GfxResult<GfxPipelineObjects>;
    /// 销毁 pipeline 以及它拥有的 layout、render pass、descriptor set layout
    fn destroy_pipeline(&mut self, objects: &GfxPipelineObjects);

    // descriptor
    fn create_descriptor_set_layout(&mut self, desc: &GfxDescriptorSetLayoutDesc)
    -> GfxResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(&mut self, desc: &GfxDescriptorPoolDesc) -> GfxResult<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool);
    /// pool 耗尽时返回 `ERROR_OUT_OF_POOL_MEMORY` 或 `ERROR_FRAGMENTED_POOL`
    fn allocate_descriptor_set(
        &mut self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet>;
    fn free_descriptor_set(&mut self, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> GfxResult<()>;
    fn update_descriptor_sets(&mut self, writes: &[GfxDescriptorWrite]);

    // frame
    /// 为每个 frame slot 创建同步对象和 command buffer，会销毁之前的
    fn configure_frame_slots(&mut self, frames_in_flight: usize) -> GfxResult<()>;
    /// 等待这个 slot 上一次提交的工作完成，没有超时
    fn wait_frame_slot(&mut self, slot: usize) -> GfxResult<()>;
    fn acquire_present_image(&mut self, slot: usize) -> GfxResult<GfxAcquire>;
    fn begin_commands(&mut self, slot: usize) -> GfxResult<vk::CommandBuffer>;
    fn record(&mut self, cmd: vk::CommandBuffer, command: GfxCommand);
    /// 在提交之前才会 reset slot 的 fence，因此在 acquire 失败后跳过这一帧不会导致死锁
    fn submit_frame(&mut self, slot: usize, cmd: vk::CommandBuffer, present_image: Option<u32>) -> GfxResult<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> GfxResult<GfxPresent>;
    /// 一次性提交，阻塞直到 GPU 执行完毕
    fn immediate_submit(&mut self, commands: &[GfxCommand]) -> GfxResult<()>;
    fn wait_idle(&mut self) -> GfxResult<()>;

    // presentation
    fn swapchain_info(&self) -> Option<GfxSwapchainInfo>;
    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> GfxResult<GfxSwapchainInfo>;

    /// 释放 backend 自己持有的对象，之后不能再使用
    fn destroy(&mut self);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
