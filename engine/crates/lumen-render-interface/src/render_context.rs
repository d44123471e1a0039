use ash::vk;
use itertools::Itertools;
use lumen_gfx::backend::{GfxBackend, GfxSwapchainInfo};
use lumen_gfx::commands::barrier::{GfxBarrierMask, GfxImageBarrier};
use lumen_gfx::commands::command::GfxCommand;
use lumen_gfx::descriptors::descriptor::{GfxDescriptorPoolDesc, GfxDescriptorWrite};
use lumen_gfx::pipelines::compute_pipeline::GfxComputePipelineDesc;
use lumen_gfx::pipelines::graphics_pipeline::GfxGraphicsPipelineDesc;
use lumen_gfx::resources::buffer::GfxBufferDesc;
use lumen_gfx::resources::image::{GfxFormatUtils, GfxImageDesc};
use lumen_gfx::{GfxError, GfxResult};

use crate::descriptor_allocator::{DescriptorAllocator, GfxDescriptorSet};
use crate::frame_counter::FrameCounter;
use crate::handle::Handle;
use crate::per_frame::{PerFrame, PerFrameIndexing};
use crate::pipeline_settings::{DefaultRendererSettings, FrameSettings};
use crate::pool::{GfxResource, Pool};
use crate::resources::buffer::GfxBuffer;
use crate::resources::framebuffer::{GfxFramebuffer, GfxFramebufferAttachment, GfxFramebufferDesc};
use crate::resources::image::GfxImage;
use crate::resources::pipeline::{GfxComputePipeline, GfxGraphicsPipeline};

/// 创建 [`RenderContext`] 所需的配置
#[derive(Clone, Debug)]
pub struct RenderContextSettings {
    pub frames_in_flight: usize,
    /// 每种资源的 pool 容量
    pub pool_capacity: usize,
    pub descriptor_pool: GfxDescriptorPoolDesc,
    /// 有 presentation 时，extent 和 present format 以 presentation image 为准
    pub frame_settings: FrameSettings,
}

impl Default for RenderContextSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: DefaultRendererSettings::DEFAULT_FRAMES_IN_FLIGHT,
            pool_capacity: Pool::<GfxBuffer>::DEFAULT_CAPACITY,
            descriptor_pool: GfxDescriptorPoolDesc::default(),
            frame_settings: FrameSettings::default(),
        }
    }
}

/// 每种 pool 当前存活的资源数量，用于检查泄漏
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub buffers: usize,
    /// 包含 presentation image 的包装
    pub images: usize,
    pub framebuffers: usize,
    pub graphics_pipelines: usize,
    pub compute_pipelines: usize,
    pub descriptor_sets: usize,
}

/// 注入给 render pass 的上下文
///
/// 拥有 backend、所有资源池、帧计数器、descriptor 分配器以及 presentation image 集合。
/// 所有资源的创建和销毁都经过这里，是资源池唯一的修改者。
///
/// 通过 `get` 系列接口拿到的引用只在下一次修改 pool 之前有效，跨帧保存时应该保存句柄。
pub struct RenderContext {
    buffers: Pool<GfxBuffer>,
    images: Pool<GfxImage>,
    framebuffers: Pool<GfxFramebuffer>,
    graphics_pipelines: Pool<GfxGraphicsPipeline>,
    compute_pipelines: Pool<GfxComputePipeline>,

    descriptor_allocator: DescriptorAllocator,

    frame_counter: FrameCounter,
    frame_settings: FrameSettings,

    /// presentation engine 拥有的 image，没有 presentation 时为 None
    present_images: Option<PerFrame<GfxImage>>,

    gfx: Box<dyn GfxBackend>,
}

// new & init
impl RenderContext {
    pub fn new(mut gfx: Box<dyn GfxBackend>, settings: RenderContextSettings) -> GfxResult<Self> {
        let max = DefaultRendererSettings::MAX_FRAMES_IN_FLIGHT;
        if settings.frames_in_flight == 0 || settings.frames_in_flight > max {
            return Err(GfxError::InvalidDesc(format!(
                "frames in flight must be in 1..={max}, got {}",
                settings.frames_in_flight
            )));
        }
        gfx.configure_frame_slots(settings.frames_in_flight)?;

        let capacity = settings.pool_capacity;
        let mut ctx = Self {
            buffers: Pool::with_capacity(capacity),
            images: Pool::with_capacity(capacity),
            framebuffers: Pool::with_capacity(capacity),
            graphics_pipelines: Pool::with_capacity(capacity),
            compute_pipelines: Pool::with_capacity(capacity),
            descriptor_allocator: DescriptorAllocator::new(settings.descriptor_pool),
            frame_counter: FrameCounter::new(settings.frames_in_flight),
            frame_settings: settings.frame_settings,
            present_images: None,
            gfx,
        };

        if let Some(info) = ctx.gfx.swapchain_info() {
            ctx.wrap_present_images(&info)?;
        }
        log::info!(
            "render context on {} backend: {} frames in flight, draw area {}x{}",
            ctx.gfx.name(),
            settings.frames_in_flight,
            ctx.frame_settings.frame_extent.width,
            ctx.frame_settings.frame_extent.height
        );
        Ok(ctx)
    }
}

// getters
impl RenderContext {
    #[inline]
    pub fn gfx(&self) -> &dyn GfxBackend {
        self.gfx.as_ref()
    }

    #[inline]
    pub fn gfx_mut(&mut self) -> &mut dyn GfxBackend {
        self.gfx.as_mut()
    }

    #[inline]
    pub fn num_frames_in_flight(&self) -> usize {
        self.frame_counter.frames_in_flight()
    }

    /// 当前帧使用的 frame slot
    #[inline]
    pub fn cur_frame(&self) -> usize {
        self.frame_counter.frame_slot()
    }

    #[inline]
    pub fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }

    #[inline]
    pub fn frame_counter_mut(&mut self) -> &mut FrameCounter {
        &mut self.frame_counter
    }

    #[inline]
    pub fn frame_settings(&self) -> &FrameSettings {
        &self.frame_settings
    }

    #[inline]
    pub fn draw_area_extent(&self) -> vk::Extent2D {
        self.frame_settings.frame_extent
    }

    #[inline]
    pub fn buffer_pool(&self) -> &Pool<GfxBuffer> {
        &self.buffers
    }

    #[inline]
    pub fn image_pool(&self) -> &Pool<GfxImage> {
        &self.images
    }

    #[inline]
    pub fn framebuffer_pool(&self) -> &Pool<GfxFramebuffer> {
        &self.framebuffers
    }

    pub fn live_resource_counts(&self) -> ResourceCounts {
        ResourceCounts {
            buffers: self.buffers.live_count(),
            images: self.images.live_count(),
            framebuffers: self.framebuffers.live_count(),
            graphics_pipelines: self.graphics_pipelines.live_count(),
            compute_pipelines: self.compute_pipelines.live_count(),
            descriptor_sets: self.descriptor_allocator.allocated_count(),
        }
    }
}

// Buffer API
impl RenderContext {
    pub fn create_buffer(&mut self, desc: &GfxBufferDesc) -> GfxResult<Handle<GfxBuffer>> {
        self.buffers.create(self.gfx.as_mut(), desc)
    }

    #[inline]
    pub fn buffer(&self, handle: Handle<GfxBuffer>) -> Option<&GfxBuffer> {
        self.buffers.get(handle)
    }

    pub fn destroy_buffer(&mut self, handle: Handle<GfxBuffer>) -> GfxResult<()> {
        self.buffers.destroy(self.gfx.as_mut(), handle)
    }

    /// 只能写入 host visible 的 buffer
    pub fn write_buffer(&mut self, handle: Handle<GfxBuffer>, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        let allocation = Self::resolve(&self.buffers, handle)?.allocation();
        self.gfx.write_buffer(allocation, offset, data)
    }

    pub fn read_buffer(&mut self, handle: Handle<GfxBuffer>, offset: vk::DeviceSize, len: usize) -> GfxResult<Vec<u8>> {
        let allocation = Self::resolve(&self.buffers, handle)?.allocation();
        self.gfx.read_buffer(allocation, offset, len)
    }
}

// Image API
impl RenderContext {
    pub fn create_image(&mut self, desc: &GfxImageDesc) -> GfxResult<Handle<GfxImage>> {
        self.images.create(self.gfx.as_mut(), desc)
    }

    #[inline]
    pub fn image(&self, handle: Handle<GfxImage>) -> Option<&GfxImage> {
        self.images.get(handle)
    }

    pub fn destroy_image(&mut self, handle: Handle<GfxImage>) -> GfxResult<()> {
        self.images.destroy(self.gfx.as_mut(), handle)
    }

    /// 同一个 format 总是返回同一个 view
    pub fn image_view(&mut self, handle: Handle<GfxImage>, format: vk::Format) -> GfxResult<vk::ImageView> {
        let image = self.images.get_mut(handle).ok_or_else(|| Self::stale(handle))?;
        image.get_or_create_view(self.gfx.as_mut(), format)
    }
}

// Framebuffer API
impl RenderContext {
    /// 从 `(format, image)` 列表创建 framebuffer，extent 是所有 image 在每个轴上的最小值
    ///
    /// 需要的 view 会在 image 上按需创建，framebuffer 不拥有这些 image
    pub fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[(vk::Format, Handle<GfxImage>)],
        name: impl Into<String>,
    ) -> GfxResult<Handle<GfxFramebuffer>> {
        let gfx = self.gfx.as_mut();
        let attachments = attachments
            .iter()
            .map(|(format, handle)| -> GfxResult<GfxFramebufferAttachment> {
                let image = self.images.get_mut(*handle).ok_or_else(|| Self::stale(*handle))?;
                Ok(GfxFramebufferAttachment {
                    format: *format,
                    view: image.get_or_create_view(gfx, *format)?,
                    extent: image.extent(),
                })
            })
            .collect::<GfxResult<Vec<_>>>()?;

        let desc = GfxFramebufferDesc {
            render_pass,
            attachments,
            name: name.into(),
        };
        self.framebuffers.create(gfx, &desc)
    }

    #[inline]
    pub fn framebuffer(&self, handle: Handle<GfxFramebuffer>) -> Option<&GfxFramebuffer> {
        self.framebuffers.get(handle)
    }

    pub fn destroy_framebuffer(&mut self, handle: Handle<GfxFramebuffer>) -> GfxResult<()> {
        self.framebuffers.destroy(self.gfx.as_mut(), handle)
    }
}

// Pipeline API
impl RenderContext {
    pub fn create_graphics_pipeline(&mut self, desc: &GfxGraphicsPipelineDesc) -> GfxResult<Handle<GfxGraphicsPipeline>> {
        self.graphics_pipelines.create(self.gfx.as_mut(), desc)
    }

    #[inline]
    pub fn graphics_pipeline(&self, handle: Handle<GfxGraphicsPipeline>) -> Option<&GfxGraphicsPipeline> {
        self.graphics_pipelines.get(handle)
    }

    pub fn destroy_graphics_pipeline(&mut self, handle: Handle<GfxGraphicsPipeline>) -> GfxResult<()> {
        self.graphics_pipelines.destroy(self.gfx.as_mut(), handle)
    }

    pub fn create_compute_pipeline(&mut self, desc: &GfxComputePipelineDesc) -> GfxResult<Handle<GfxComputePipeline>> {
        self.compute_pipelines.create(self.gfx.as_mut(), desc)
    }

    #[inline]
    pub fn compute_pipeline(&self, handle: Handle<GfxComputePipeline>) -> Option<&GfxComputePipeline> {
        self.compute_pipelines.get(handle)
    }

    pub fn destroy_compute_pipeline(&mut self, handle: Handle<GfxComputePipeline>) -> GfxResult<()> {
        self.compute_pipelines.destroy(self.gfx.as_mut(), handle)
    }
}

// Per-frame API
impl RenderContext {
    /// 每个 frame in flight 一个 buffer
    pub fn create_per_frame_buffers(&mut self, desc: &GfxBufferDesc) -> GfxResult<PerFrame<GfxBuffer>> {
        let count = self.num_frames_in_flight();
        PerFrame::new(&mut self.buffers, self.gfx.as_mut(), desc, count)
    }

    /// 每个 frame in flight 一张 image
    pub fn create_per_frame_images(&mut self, desc: &GfxImageDesc) -> GfxResult<PerFrame<GfxImage>> {
        let count = self.num_frames_in_flight();
        PerFrame::new(&mut self.images, self.gfx.as_mut(), desc, count)
    }

    /// 第 i 个 framebuffer 使用每个 attachment 的第 i 份 image
    ///
    /// 所有 attachment 的份数和索引方式必须一致，结果沿用它们的索引方式
    pub fn create_per_frame_framebuffers(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[(vk::Format, &PerFrame<GfxImage>)],
        name: &str,
    ) -> GfxResult<PerFrame<GfxFramebuffer>> {
        let Some((_, first)) = attachments.first() else {
            return Err(GfxError::EmptyFramebuffer(name.to_string()));
        };
        let (count, indexing) = (first.len(), first.indexing());
        if !attachments.iter().all(|(_, a)| a.len() == count && a.indexing() == indexing) {
            return Err(GfxError::InvalidDesc(format!(
                "per-frame framebuffer '{name}' mixes attachments of different frame layouts"
            )));
        }

        let mut handles = Vec::with_capacity(count);
        for i in 0..count {
            let frame_attachments = attachments.iter().map(|(format, images)| (*format, images.handle(i))).collect_vec();
            match self.create_framebuffer(render_pass, &frame_attachments, format!("{name}-{i}")) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    for handle in handles {
                        let _ = self.destroy_framebuffer(handle);
                    }
                    return Err(err);
                }
            }
        }
        Ok(PerFrame::from_handles(handles, indexing))
    }

    pub fn destroy_per_frame_buffers(&mut self, buffers: PerFrame<GfxBuffer>) -> GfxResult<()> {
        buffers.destroy(&mut self.buffers, self.gfx.as_mut())
    }

    pub fn destroy_per_frame_images(&mut self, images: PerFrame<GfxImage>) -> GfxResult<()> {
        images.destroy(&mut self.images, self.gfx.as_mut())
    }

    pub fn destroy_per_frame_framebuffers(&mut self, framebuffers: PerFrame<GfxFramebuffer>) -> GfxResult<()> {
        framebuffers.destroy(&mut self.framebuffers, self.gfx.as_mut())
    }

    #[inline]
    pub fn cur_frame_buffer(&self, buffers: &PerFrame<GfxBuffer>) -> GfxResult<&GfxBuffer> {
        buffers.cur_frame_data(&self.buffers, &self.frame_counter)
    }

    #[inline]
    pub fn cur_frame_image(&self, images: &PerFrame<GfxImage>) -> GfxResult<&GfxImage> {
        images.cur_frame_data(&self.images, &self.frame_counter)
    }

    #[inline]
    pub fn cur_frame_framebuffer(&self, framebuffers: &PerFrame<GfxFramebuffer>) -> GfxResult<&GfxFramebuffer> {
        framebuffers.cur_frame_data(&self.framebuffers, &self.frame_counter)
    }

    /// 在所有 N 份 image 上添加同一个 view format
    pub fn add_image_view_format(&mut self, images: &PerFrame<GfxImage>, format: vk::Format) -> GfxResult<()> {
        images.add_image_view_format(&mut self.images, self.gfx.as_mut(), format)
    }

    #[inline]
    pub fn image_view_by_format(&self, images: &PerFrame<GfxImage>, format: vk::Format) -> Option<vk::ImageView> {
        images.image_view_by_format(&self.images, &self.frame_counter, format)
    }
}

// Present API
impl RenderContext {
    #[inline]
    pub fn present_images(&self) -> Option<&PerFrame<GfxImage>> {
        self.present_images.as_ref()
    }

    /// 把 presentation engine 的 image 包装成 per-frame image，并以它为准更新绘制区域
    pub fn wrap_present_images(&mut self, info: &GfxSwapchainInfo) -> GfxResult<()> {
        self.release_present_images()?;

        let images = PerFrame::from_present_images(&mut self.images, self.gfx.as_mut(), info)?;
        images.add_image_view_format(&mut self.images, self.gfx.as_mut(), info.format)?;
        debug_assert_eq!(images.indexing(), PerFrameIndexing::PresentImage);

        self.present_images = Some(images);
        self.frame_settings.frame_extent = info.extent;
        self.frame_settings.present_format = info.format;
        Ok(())
    }

    /// 销毁包装以及它们的 view，image 本身属于 presentation engine
    pub fn release_present_images(&mut self) -> GfxResult<()> {
        match self.present_images.take() {
            Some(images) => images.destroy(&mut self.images, self.gfx.as_mut()),
            None => Ok(()),
        }
    }

    /// 没有 presentation 时只更新绘制区域
    #[inline]
    pub fn set_draw_area_extent(&mut self, extent: vk::Extent2D) {
        self.frame_settings.frame_extent = extent;
    }
}

// Descriptor API
impl RenderContext {
    pub fn allocate_descriptor_set(&mut self, layout: vk::DescriptorSetLayout) -> GfxResult<GfxDescriptorSet> {
        self.descriptor_allocator.allocate(self.gfx.as_mut(), layout)
    }

    pub fn free_descriptor_set(&mut self, set: GfxDescriptorSet) -> GfxResult<()> {
        self.descriptor_allocator.free(self.gfx.as_mut(), set)
    }

    #[inline]
    pub fn update_descriptors(&mut self, writes: &[GfxDescriptorWrite]) {
        self.gfx.update_descriptor_sets(writes);
    }
}

// Command API
impl RenderContext {
    #[inline]
    pub fn record(&mut self, cmd: vk::CommandBuffer, command: GfxCommand) {
        self.gfx.record(cmd, command);
    }

    /// 阻塞直到这批命令在 GPU 上执行完毕，只用于一次性的上传等工作
    #[inline]
    pub fn immediate_submit(&mut self, commands: &[GfxCommand]) -> GfxResult<()> {
        self.gfx.immediate_submit(commands)
    }

    /// 通过 stage buffer 把数据传到 device local 的 buffer 中
    pub fn upload_cpu_buffer_to_gpu(&mut self, dst: Handle<GfxBuffer>, data: &[u8]) -> GfxResult<()> {
        let dst_buffer = Self::resolve(&self.buffers, dst)?;
        let size = data.len() as vk::DeviceSize;
        if size > dst_buffer.size() {
            return Err(GfxError::OutOfRange {
                offset: 0,
                len: size,
                size: dst_buffer.size(),
            });
        }
        let dst_buffer = dst_buffer.vk_buffer();

        self.with_stage_buffer(data, |stage| vec![GfxCommand::copy_whole_buffer(stage, dst_buffer, size)])
    }

    /// 按 `T` 的内存布局上传
    pub fn upload_slice_to_gpu<T: bytemuck::Pod>(&mut self, dst: Handle<GfxBuffer>, data: &[T]) -> GfxResult<()> {
        self.upload_cpu_buffer_to_gpu(dst, bytemuck::cast_slice(data))
    }

    /// 上传像素数据，结束后 image 处于 `SHADER_READ_ONLY_OPTIMAL`
    pub fn upload_texture_to_gpu(&mut self, dst: Handle<GfxImage>, pixels: &[u8]) -> GfxResult<()> {
        let image = Self::resolve(&self.images, dst)?;
        let (vk_image, extent, aspect) = (image.vk_image(), image.extent(), image.aspect());
        if let Some(pixel_size) = GfxFormatUtils::pixel_size_in_bytes(image.format()) {
            let expected = extent.width as usize * extent.height as usize * pixel_size;
            if pixels.len() != expected {
                return Err(GfxError::InvalidDesc(format!(
                    "texture '{}' expects {expected} bytes, got {}",
                    image.name(),
                    pixels.len()
                )));
            }
        }

        let to_transfer = GfxImageBarrier::new()
            .image(vk_image)
            .image_aspect_flag(aspect)
            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE)
            .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE);
        let to_sample = GfxImageBarrier::new()
            .image(vk_image)
            .image_aspect_flag(aspect)
            .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .mask(GfxBarrierMask::TRANSFER_TO_SAMPLE);

        self.with_stage_buffer(pixels, |stage| {
            vec![
                GfxCommand::ImageBarrier(to_transfer),
                GfxCommand::CopyBufferToImage {
                    src: stage,
                    dst: vk_image,
                    extent,
                    aspect,
                },
                GfxCommand::ImageBarrier(to_sample),
            ]
        })
    }

    /// 创建一个临时的 stage buffer，执行 `commands` 之后销毁它
    fn with_stage_buffer(
        &mut self,
        data: &[u8],
        commands: impl FnOnce(vk::Buffer) -> Vec<GfxCommand>,
    ) -> GfxResult<()> {
        let stage = self.create_buffer(&GfxBufferDesc::new_stage(data.len().max(1) as vk::DeviceSize, "stage"))?;
        let result = self.write_buffer(stage, 0, data).and_then(|_| {
            let stage_buffer = Self::resolve(&self.buffers, stage)?.vk_buffer();
            self.gfx.immediate_submit(&commands(stage_buffer))
        });
        self.destroy_buffer(stage)?;
        result
    }
}

// tools
impl RenderContext {
    fn resolve<T: GfxResource>(pool: &Pool<T>, handle: Handle<T>) -> GfxResult<&T> {
        pool.get(handle).ok_or_else(|| Self::stale(handle))
    }

    fn stale<T: GfxResource>(handle: Handle<T>) -> GfxError {
        GfxError::StaleHandle {
            kind: T::KIND,
            handle: handle.to_string(),
        }
    }
}

// destroy
impl RenderContext {
    /// 等待 GPU 空闲，销毁所有剩余的资源，把 backend 交还给调用者
    pub fn destroy(mut self) -> Box<dyn GfxBackend> {
        if let Err(err) = self.gfx.wait_idle() {
            log::error!("wait idle before destroying render context: {err}");
        }
        if let Err(err) = self.release_present_images() {
            log::error!("release present images: {err}");
        }

        let gfx = self.gfx.as_mut();
        let leaked = self.framebuffers.destroy_all(gfx)
            + self.graphics_pipelines.destroy_all(gfx)
            + self.compute_pipelines.destroy_all(gfx)
            + self.images.destroy_all(gfx)
            + self.buffers.destroy_all(gfx);
        if leaked > 0 {
            log::warn!("render context destroyed {leaked} resources that were still alive");
        }
        self.descriptor_allocator.destroy(gfx);

        self.gfx.destroy();
        self.gfx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_gfx::headless::headless_backend::{HeadlessBackend, HeadlessObjectCounts};
    use lumen_gfx::pipelines::graphics_pipeline::GfxAttachmentDesc;
    use lumen_gfx::resources::buffer::GfxMemoryLocation;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn headless(gfx: &dyn GfxBackend) -> &HeadlessBackend {
        gfx.as_any().downcast_ref::<HeadlessBackend>().unwrap()
    }

    fn offscreen_context() -> RenderContext {
        lumen_crate_tools::init_log::init_test_log();
        RenderContext::new(Box::new(HeadlessBackend::new()), RenderContextSettings::default()).unwrap()
    }

    #[test]
    fn frames_in_flight_out_of_range_is_rejected() {
        for frames_in_flight in [0, DefaultRendererSettings::MAX_FRAMES_IN_FLIGHT + 1] {
            let settings = RenderContextSettings {
                frames_in_flight,
                ..Default::default()
            };
            let err = RenderContext::new(Box::new(HeadlessBackend::new()), settings).err().unwrap();
            assert!(matches!(err, GfxError::InvalidDesc(_)));
        }
    }

    #[test]
    fn presentation_images_are_wrapped_on_creation() {
        let gfx = HeadlessBackend::with_presentation(extent(800, 600), 2, vk::Format::B8G8R8A8_UNORM);
        let ctx = RenderContext::new(Box::new(gfx), RenderContextSettings::default()).unwrap();

        assert_eq!(ctx.draw_area_extent(), extent(800, 600));
        assert_eq!(ctx.num_frames_in_flight(), 3);
        let present = ctx.present_images().unwrap();
        assert_eq!(present.len(), 2);
        assert_eq!(ctx.live_resource_counts().images, 2);
        assert_eq!(headless(ctx.gfx()).live_objects().image_views, 2);

        let gfx = ctx.destroy();
        assert_eq!(headless(gfx.as_ref()).live_objects(), HeadlessObjectCounts::default());
        assert_eq!(headless(gfx.as_ref()).stats().validation_errors, 0);
    }

    #[test]
    fn upload_goes_through_a_temporary_stage_buffer() {
        let mut ctx = offscreen_context();
        let dst = ctx
            .create_buffer(
                &GfxBufferDesc::new(16, vk::BufferUsageFlags::TRANSFER_DST, "readback")
                    .location(GfxMemoryLocation::HostVisible),
            )
            .unwrap();

        ctx.upload_slice_to_gpu(dst, &[1u32, 2, 3, 4]).unwrap();

        let bytes = ctx.read_buffer(dst, 0, 16).unwrap();
        let values: Vec<u32> = bytes.chunks(4).map(|c| u32::from_le_bytes(c.try_into().unwrap())).collect();
        assert_eq!(values, vec![1, 2, 3, 4]);
        assert_eq!(ctx.live_resource_counts().buffers, 1);
        assert_eq!(headless(ctx.gfx()).stats().immediate_submits, 1);

        ctx.destroy_buffer(dst).unwrap();
        ctx.destroy();
    }

    #[test]
    fn oversized_upload_is_rejected_without_leaking() {
        let mut ctx = offscreen_context();
        let dst = ctx.create_buffer(&GfxBufferDesc::new(4, vk::BufferUsageFlags::TRANSFER_DST, "small")).unwrap();

        let err = ctx.upload_cpu_buffer_to_gpu(dst, &[0; 8]).unwrap_err();

        assert!(matches!(err, GfxError::OutOfRange { len: 8, size: 4, .. }));
        assert_eq!(ctx.live_resource_counts().buffers, 1);
        ctx.destroy();
    }

    #[test]
    fn texture_upload_fills_the_image() {
        let mut ctx = offscreen_context();
        let image = ctx
            .create_image(&GfxImageDesc::new_2d(
                extent(2, 2),
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                vk::ImageAspectFlags::COLOR,
                "texture",
            ))
            .unwrap();
        let pixels: Vec<u8> = (0..16).collect();

        ctx.upload_texture_to_gpu(image, &pixels).unwrap();
        assert!(ctx.upload_texture_to_gpu(image, &pixels[..4]).is_err());

        let vk_image = ctx.image(image).unwrap().vk_image();
        assert_eq!(headless(ctx.gfx()).image_bytes(vk_image), Some(pixels.as_slice()));
        assert_eq!(ctx.live_resource_counts().buffers, 0);
        assert_eq!(headless(ctx.gfx()).stats().validation_errors, 0);
        ctx.destroy();
    }

    #[test]
    fn per_frame_framebuffers_pair_up_frame_copies() {
        let mut ctx = offscreen_context();
        let pipeline = ctx
            .create_graphics_pipeline(
                &GfxGraphicsPipelineDesc::new("gbuffer")
                    .color_attachment(GfxAttachmentDesc::color(vk::Format::R8G8B8A8_UNORM))
                    .depth_attachment(GfxAttachmentDesc::depth(vk::Format::D32_SFLOAT)),
            )
            .unwrap();
        let render_pass = ctx.graphics_pipeline(pipeline).unwrap().render_pass();

        let color = ctx
            .create_per_frame_images(&GfxImageDesc::new_color_target(
                extent(64, 64),
                vk::Format::R8G8B8A8_UNORM,
                "albedo",
            ))
            .unwrap();
        let depth = ctx
            .create_per_frame_images(&GfxImageDesc::new_depth_target(extent(64, 32), vk::Format::D32_SFLOAT, "depth"))
            .unwrap();
        let framebuffers = ctx
            .create_per_frame_framebuffers(
                render_pass,
                &[(vk::Format::R8G8B8A8_UNORM, &color), (vk::Format::D32_SFLOAT, &depth)],
                "gbuffer",
            )
            .unwrap();

        assert_eq!(framebuffers.len(), 3);
        for _ in 0..3 {
            let view = ctx.image_view_by_format(&color, vk::Format::R8G8B8A8_UNORM).unwrap();
            let framebuffer = ctx.cur_frame_framebuffer(&framebuffers).unwrap();
            assert_eq!(framebuffer.views()[0], view);
            assert_eq!(framebuffer.extent(), extent(64, 32));
            ctx.frame_counter_mut().next_frame();
        }

        ctx.destroy_per_frame_framebuffers(framebuffers).unwrap();
        ctx.destroy_per_frame_images(color).unwrap();
        ctx.destroy_per_frame_images(depth).unwrap();
        ctx.destroy_graphics_pipeline(pipeline).unwrap();
        assert_eq!(ctx.live_resource_counts(), ResourceCounts::default());

        let gfx = ctx.destroy();
        assert_eq!(headless(gfx.as_ref()).live_objects(), HeadlessObjectCounts::default());
    }

    #[test]
    fn mismatched_per_frame_attachments_are_rejected() {
        let gfx = HeadlessBackend::with_presentation(extent(32, 32), 2, vk::Format::B8G8R8A8_UNORM);
        let mut ctx = RenderContext::new(Box::new(gfx), RenderContextSettings::default()).unwrap();
        let pipeline = ctx
            .create_graphics_pipeline(
                &GfxGraphicsPipelineDesc::new("overlay")
                    .color_attachment(GfxAttachmentDesc::present(vk::Format::B8G8R8A8_UNORM))
                    .depth_attachment(GfxAttachmentDesc::depth(vk::Format::D32_SFLOAT)),
            )
            .unwrap();
        let render_pass = ctx.graphics_pipeline(pipeline).unwrap().render_pass();
        let depth = ctx
            .create_per_frame_images(&GfxImageDesc::new_depth_target(extent(32, 32), vk::Format::D32_SFLOAT, "depth"))
            .unwrap();
        let present = ctx.present_images().unwrap().clone();

        let err = ctx
            .create_per_frame_framebuffers(
                render_pass,
                &[(vk::Format::B8G8R8A8_UNORM, &present), (vk::Format::D32_SFLOAT, &depth)],
                "overlay",
            )
            .unwrap_err();
        assert!(matches!(err, GfxError::InvalidDesc(_)));
        assert!(matches!(
            ctx.create_per_frame_framebuffers(render_pass, &[], "empty"),
            Err(GfxError::EmptyFramebuffer(_))
        ));

        // 没有手动销毁的资源由 destroy 统一回收
        let gfx = ctx.destroy();
        assert_eq!(headless(gfx.as_ref()).live_objects(), HeadlessObjectCounts::default());
    }

    #[test]
    fn stale_handles_surface_as_errors() {
        let mut ctx = offscreen_context();
        let buffer = ctx.create_buffer(&GfxBufferDesc::new_stage(4, "stage")).unwrap();
        ctx.destroy_buffer(buffer).unwrap();

        assert!(ctx.buffer(buffer).is_none());
        assert!(matches!(ctx.write_buffer(buffer, 0, &[0]), Err(GfxError::StaleHandle { .. })));
        assert!(matches!(ctx.destroy_buffer(buffer), Err(GfxError::StaleHandle { .. })));
        ctx.destroy();
    }
}
