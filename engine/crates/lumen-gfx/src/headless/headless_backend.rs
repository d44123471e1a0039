use std::any::Any;
use std::collections::{HashMap, HashSet};

use ash::vk;
use ash::vk::Handle;
use slotmap::SlotMap;

use crate::backend::{GfxAcquire, GfxAllocationKey, GfxBackend, GfxPresent, GfxSwapchainInfo};
use crate::commands::command::GfxCommand;
use crate::descriptors::descriptor::{GfxDescriptorPoolDesc, GfxDescriptorSetLayoutDesc, GfxDescriptorWrite};
use crate::error::{GfxError, GfxResult};
use crate::pipelines::compute_pipeline::GfxComputePipelineDesc;
use crate::pipelines::graphics_pipeline::{GfxGraphicsPipelineDesc, GfxPipelineObjects};
use crate::resources::buffer::{GfxAllocationInfo, GfxBufferAlloc, GfxBufferDesc, GfxMemoryLocation};
use crate::resources::image::{GfxFormatUtils, GfxImageAlloc, GfxImageDesc};

struct HeadlessAllocation {
    bytes: Vec<u8>,
    host_visible: bool,
}

struct HeadlessImage {
    /// presentation image 没有 allocation
    allocation: Option<GfxAllocationKey>,
    extent: vk::Extent2D,
    format: vk::Format,
    mutable_format: bool,
}

struct HeadlessDescriptorPool {
    max_sets: u32,
    sets: HashSet<vk::DescriptorSet>,
}

struct HeadlessFrameSlot {
    cmd: vk::CommandBuffer,
    /// 已经提交，但还没有被 wait
    in_flight: bool,
}

struct HeadlessSwapchain {
    info: GfxSwapchainInfo,
    next_image: u32,
    out_of_date: bool,
    suboptimal: bool,
}

/// 当前存活的原生对象数量，用于检查泄漏
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeadlessObjectCounts {
    pub allocations: usize,
    pub buffers: usize,
    /// 不包含 presentation image
    pub images: usize,
    pub image_views: usize,
    pub framebuffers: usize,
    pub render_passes: usize,
    pub pipelines: usize,
    pub pipeline_layouts: usize,
    pub descriptor_set_layouts: usize,
    pub descriptor_pools: usize,
    pub descriptor_sets: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub frames_submitted: u64,
    pub frames_presented: u64,
    pub immediate_submits: u64,
    pub draws: u64,
    pub dispatches: u64,
    pub swapchain_recreations: u64,
    /// 对 Vulkan 来说属于非法使用的次数，例如销毁不存在的对象
    pub validation_errors: u64,
}

/// 没有 GPU 的 backend
///
/// 所有对象都只是 CPU 上的记录：buffer 和 image 的内容是字节数组，
/// copy 命令在提交时执行，draw 和 dispatch 只计数。
/// 可以模拟 presentation image 集合以及 out-of-date。
/// 所有 Vulkan validation layer 会报告的非法使用都会记录到 [`HeadlessStats::validation_errors`]。
pub struct HeadlessBackend {
    next_raw: u64,

    allocations: SlotMap<GfxAllocationKey, HeadlessAllocation>,
    buffers: HashMap<vk::Buffer, GfxAllocationKey>,
    images: HashMap<vk::Image, HeadlessImage>,
    image_views: HashMap<vk::ImageView, vk::Image>,
    framebuffers: HashMap<vk::Framebuffer, Vec<vk::ImageView>>,
    render_passes: HashSet<vk::RenderPass>,
    pipelines: HashSet<vk::Pipeline>,
    pipeline_layouts: HashSet<vk::PipelineLayout>,
    set_layouts: HashSet<vk::DescriptorSetLayout>,
    descriptor_pools: HashMap<vk::DescriptorPool, HeadlessDescriptorPool>,

    frame_slots: Vec<HeadlessFrameSlot>,
    recording: HashMap<vk::CommandBuffer, Vec<GfxCommand>>,
    last_frame_commands: Vec<GfxCommand>,

    swapchain: Option<HeadlessSwapchain>,
    stats: HeadlessStats,
}

// new & init
impl HeadlessBackend {
    /// 没有 presentation 的 backend，只能离屏渲染
    pub fn new() -> Self {
        Self {
            next_raw: 0,
            allocations: SlotMap::with_key(),
            buffers: HashMap::new(),
            images: HashMap::new(),
            image_views: HashMap::new(),
            framebuffers: HashMap::new(),
            render_passes: HashSet::new(),
            pipelines: HashSet::new(),
            pipeline_layouts: HashSet::new(),
            set_layouts: HashSet::new(),
            descriptor_pools: HashMap::new(),
            frame_slots: Vec::new(),
            recording: HashMap::new(),
            last_frame_commands: Vec::new(),
            swapchain: None,
            stats: HeadlessStats::default(),
        }
    }

    /// 带有 `image_count` 张 presentation image 的 backend
    pub fn with_presentation(extent: vk::Extent2D, image_count: usize, format: vk::Format) -> Self {
        let mut backend = Self::new();
        let info = backend.create_present_images(extent, image_count, format);
        backend.swapchain = Some(HeadlessSwapchain {
            info,
            next_image: 0,
            out_of_date: false,
            suboptimal: false,
        });
        backend
    }

    fn create_present_images(&mut self, extent: vk::Extent2D, image_count: usize, format: vk::Format) -> GfxSwapchainInfo {
        let images = (0..image_count)
            .map(|_| {
                let image: vk::Image = self.next_handle();
                self.images.insert(
                    image,
                    HeadlessImage {
                        allocation: None,
                        extent,
                        format,
                        mutable_format: false,
                    },
                );
                image
            })
            .collect();
        GfxSwapchainInfo { extent, format, images }
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

// getters
impl HeadlessBackend {
    pub fn live_objects(&self) -> HeadlessObjectCounts {
        let present_images = self.swapchain.as_ref().map_or(0, |s| s.info.images.len());
        HeadlessObjectCounts {
            allocations: self.allocations.len(),
            buffers: self.buffers.len(),
            images: self.images.len() - present_images,
            image_views: self.image_views.len(),
            framebuffers: self.framebuffers.len(),
            render_passes: self.render_passes.len(),
            pipelines: self.pipelines.len(),
            pipeline_layouts: self.pipeline_layouts.len(),
            descriptor_set_layouts: self.set_layouts.len(),
            descriptor_pools: self.descriptor_pools.len(),
            descriptor_sets: self.descriptor_pools.values().map(|p| p.sets.len()).sum(),
        }
    }

    #[inline]
    pub fn stats(&self) -> HeadlessStats {
        self.stats
    }

    /// 最近一次 `submit_frame` 提交的命令
    #[inline]
    pub fn last_frame_commands(&self) -> &[GfxCommand] {
        &self.last_frame_commands
    }

    /// image 的内容，presentation image 没有内容
    pub fn image_bytes(&self, image: vk::Image) -> Option<&[u8]> {
        let allocation = self.images.get(&image)?.allocation?;
        self.allocations.get(allocation).map(|a| a.bytes.as_slice())
    }

    /// 任意 buffer 的内容，不要求 host visible
    pub fn buffer_bytes(&self, buffer: vk::Buffer) -> Option<&[u8]> {
        let allocation = self.buffers.get(&buffer)?;
        self.allocations.get(*allocation).map(|a| a.bytes.as_slice())
    }

    #[inline]
    pub fn contains_image_view(&self, view: vk::ImageView) -> bool {
        self.image_views.contains_key(&view)
    }

    #[inline]
    pub fn contains_framebuffer(&self, framebuffer: vk::Framebuffer) -> bool {
        self.framebuffers.contains_key(&framebuffer)
    }
}

// tools
impl HeadlessBackend {
    /// 下一次 acquire 返回 out-of-date，直到 swapchain 被重建
    pub fn request_out_of_date(&mut self) {
        if let Some(swapchain) = &mut self.swapchain {
            swapchain.out_of_date = true;
        }
    }

    /// 下一次 present 返回 suboptimal
    pub fn request_suboptimal(&mut self) {
        if let Some(swapchain) = &mut self.swapchain {
            swapchain.suboptimal = true;
        }
    }

    fn next_handle<H: Handle>(&mut self) -> H {
        self.next_raw += 1;
        H::from_raw(self.next_raw)
    }

    fn validation_error(&mut self, message: String) {
        log::error!("[headless] validation: {}", message);
        self.stats.validation_errors += 1;
    }

    fn allocate(&mut self, size: usize, host_visible: bool) -> GfxAllocationKey {
        self.allocations.insert(HeadlessAllocation {
            bytes: vec![0; size],
            host_visible,
        })
    }

    fn execute(&mut self, commands: &[GfxCommand]) {
        for command in commands {
            match command {
                GfxCommand::CopyBuffer { src, dst, regions } => {
                    let (Some(src_key), Some(dst_key)) = (self.buffers.get(src).copied(), self.buffers.get(dst).copied())
                    else {
                        self.validation_error(format!("copy between unknown buffers {:?} -> {:?}", src, dst));
                        continue;
                    };
                    for region in regions {
                        let src_range = region.src_offset as usize..(region.src_offset + region.size) as usize;
                        let data = self.allocations[src_key].bytes.get(src_range).map(|d| d.to_vec());
                        let dst_range = region.dst_offset as usize..(region.dst_offset + region.size) as usize;
                        let copied = match (data, self.allocations[dst_key].bytes.get_mut(dst_range)) {
                            (Some(data), Some(dst)) => {
                                dst.copy_from_slice(&data);
                                true
                            }
                            _ => false,
                        };
                        if !copied {
                            self.validation_error(format!("buffer copy region out of range: {:?}", region));
                        }
                    }
                }
                GfxCommand::CopyBufferToImage { src, dst, .. } => {
                    let src_key = self.buffers.get(src).copied();
                    let dst_key = self.images.get(dst).and_then(|i| i.allocation);
                    let (Some(src_key), Some(dst_key)) = (src_key, dst_key) else {
                        self.validation_error(format!("copy from buffer {:?} to image {:?} is invalid", src, dst));
                        continue;
                    };
                    let data = self.allocations[src_key].bytes.clone();
                    let dst_bytes = &mut self.allocations[dst_key].bytes;
                    let len = data.len().min(dst_bytes.len());
                    dst_bytes[..len].copy_from_slice(&data[..len]);
                }
                GfxCommand::ImageBarrier(barrier) => {
                    if !self.images.contains_key(&barrier.image) {
                        self.validation_error(format!("barrier on unknown image {:?}", barrier.image));
                    }
                }
                GfxCommand::BeginRenderPass {
                    render_pass,
                    framebuffer,
                    ..
                } => {
                    if !self.render_passes.contains(render_pass) {
                        self.validation_error(format!("begin unknown render pass {:?}", render_pass));
                    }
                    let dangling = match self.framebuffers.get(framebuffer) {
                        None => Some(format!("begin render pass with unknown framebuffer {:?}", framebuffer)),
                        Some(views) => views
                            .iter()
                            .find(|v| !self.image_views.contains_key(*v))
                            .map(|v| format!("framebuffer {:?} references destroyed view {:?}", framebuffer, v)),
                    };
                    if let Some(message) = dangling {
                        self.validation_error(message);
                    }
                }
                GfxCommand::BindPipeline { pipeline, .. } => {
                    if !self.pipelines.contains(pipeline) {
                        self.validation_error(format!("bind unknown pipeline {:?}", pipeline));
                    }
                }
                GfxCommand::BindDescriptorSets { sets, .. } => {
                    let known = |set: &vk::DescriptorSet| self.descriptor_pools.values().any(|p| p.sets.contains(set));
                    if let Some(set) = sets.iter().find(|s| !known(*s)) {
                        self.validation_error(format!("bind unknown descriptor set {:?}", set));
                    }
                }
                GfxCommand::BindVertexBuffer { buffer, .. } | GfxCommand::BindIndexBuffer { buffer, .. } => {
                    if !self.buffers.contains_key(buffer) {
                        self.validation_error(format!("bind unknown buffer {:?}", buffer));
                    }
                }
                GfxCommand::Draw { .. } | GfxCommand::DrawIndexed { .. } => self.stats.draws += 1,
                GfxCommand::Dispatch { .. } => self.stats.dispatches += 1,
                GfxCommand::EndRenderPass | GfxCommand::SetViewportScissor { .. } | GfxCommand::PushConstants { .. } => {}
            }
        }
    }

    fn create_set_layouts(&mut self, descs: &[GfxDescriptorSetLayoutDesc]) -> Vec<vk::DescriptorSetLayout> {
        descs
            .iter()
            .map(|_| {
                let layout = self.next_handle();
                self.set_layouts.insert(layout);
                layout
            })
            .collect()
    }

    fn create_pipeline_layout(&mut self) -> vk::PipelineLayout {
        let layout = self.next_handle();
        self.pipeline_layouts.insert(layout);
        layout
    }
}

impl GfxBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_buffer(&mut self, desc: &GfxBufferDesc) -> GfxResult<GfxBufferAlloc> {
        if desc.size == 0 {
            return Err(GfxError::InvalidDesc(format!("buffer '{}' has zero size", desc.name)));
        }
        let host_visible = desc.location == GfxMemoryLocation::HostVisible;
        let allocation = self.allocate(desc.size as usize, host_visible);
        let buffer = self.next_handle();
        self.buffers.insert(buffer, allocation);

        Ok(GfxBufferAlloc {
            buffer,
            allocation,
            info: GfxAllocationInfo {
                size: desc.size,
                offset: 0,
                host_visible,
            },
        })
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer, allocation: GfxAllocationKey) {
        if self.buffers.remove(&buffer).is_none() {
            self.validation_error(format!("destroy unknown buffer {:?}", buffer));
        }
        if self.allocations.remove(allocation).is_none() {
            self.validation_error(format!("free unknown allocation {:?}", allocation));
        }
    }

    fn write_buffer(&mut self, allocation: GfxAllocationKey, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        let alloc = self.allocations.get_mut(allocation).ok_or(GfxError::Vulkan(vk::Result::ERROR_MEMORY_MAP_FAILED))?;
        if !alloc.host_visible {
            return Err(GfxError::NotHostVisible);
        }
        let size = alloc.bytes.len() as vk::DeviceSize;
        let len = data.len() as vk::DeviceSize;
        if offset + len > size {
            return Err(GfxError::OutOfRange { offset, len, size });
        }
        alloc.bytes[offset as usize..(offset + len) as usize].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&mut self, allocation: GfxAllocationKey, offset: vk::DeviceSize, len: usize) -> GfxResult<Vec<u8>> {
        let alloc = self.allocations.get(allocation).ok_or(GfxError::Vulkan(vk::Result::ERROR_MEMORY_MAP_FAILED))?;
        if !alloc.host_visible {
            return Err(GfxError::NotHostVisible);
        }
        let size = alloc.bytes.len() as vk::DeviceSize;
        if offset + len as vk::DeviceSize > size {
            return Err(GfxError::OutOfRange {
                offset,
                len: len as vk::DeviceSize,
                size,
            });
        }
        Ok(alloc.bytes[offset as usize..offset as usize + len].to_vec())
    }

    fn create_image(&mut self, desc: &GfxImageDesc) -> GfxResult<GfxImageAlloc> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(GfxError::InvalidDesc(format!("image '{}' has zero extent", desc.name)));
        }
        let pixel_size = GfxFormatUtils::pixel_size_in_bytes(desc.format).unwrap_or(0);
        let size = desc.extent.width as usize * desc.extent.height as usize * pixel_size;
        let allocation = self.allocate(size, false);
        let image = self.next_handle();
        self.images.insert(
            image,
            HeadlessImage {
                allocation: Some(allocation),
                extent: desc.extent,
                format: desc.format,
                mutable_format: desc.mutable_format,
            },
        );

        Ok(GfxImageAlloc { image, allocation })
    }

    fn destroy_image(&mut self, image: vk::Image, allocation: GfxAllocationKey) {
        match self.images.get(&image).map(|i| i.allocation) {
            None => self.validation_error(format!("destroy unknown image {:?}", image)),
            Some(None) => {
                self.validation_error(format!("destroy presentation-owned image {:?}", image));
                return;
            }
            Some(Some(_)) => {
                self.images.remove(&image);
            }
        }
        if self.allocations.remove(allocation).is_none() {
            self.validation_error(format!("free unknown allocation {:?}", allocation));
        }
    }

    fn create_image_view(
        &mut self,
        image: vk::Image,
        format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> GfxResult<vk::ImageView> {
        let Some(info) = self.images.get(&image) else {
            return Err(GfxError::InvalidDesc(format!("image view of unknown image {:?}", image)));
        };
        let incompatible = info.format != format && !info.mutable_format;
        if incompatible {
            self.validation_error(format!("view format {:?} on non-mutable image {:?}", format, image));
        }
        let view = self.next_handle();
        self.image_views.insert(view, image);
        Ok(view)
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        if self.image_views.remove(&view).is_none() {
            self.validation_error(format!("destroy unknown image view {:?}", view));
        }
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> GfxResult<vk::Framebuffer> {
        if attachments.is_empty() || extent.width == 0 || extent.height == 0 {
            return Err(GfxError::InvalidDesc("framebuffer without attachments or area".to_string()));
        }
        if !self.render_passes.contains(&render_pass) {
            return Err(GfxError::InvalidDesc(format!("framebuffer for unknown render pass {:?}", render_pass)));
        }
        if let Some(view) = attachments.iter().find(|v| !self.image_views.contains_key(*v)) {
            return Err(GfxError::InvalidDesc(format!("framebuffer attachment {:?} does not exist", view)));
        }
        let framebuffer = self.next_handle();
        self.framebuffers.insert(framebuffer, attachments.to_vec());
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        if self.framebuffers.remove(&framebuffer).is_none() {
            self.validation_error(format!("destroy unknown framebuffer {:?}", framebuffer));
        }
    }

    fn create_graphics_pipeline(&mut self, desc: &GfxGraphicsPipelineDesc) -> GfxResult<GfxPipelineObjects> {
        if desc.color_attachments.is_empty() && desc.depth_attachment.is_none() {
            return Err(GfxError::InvalidDesc(format!("pipeline '{}' has no attachments", desc.name)));
        }
        let render_pass = self.next_handle();
        self.render_passes.insert(render_pass);
        let set_layouts = self.create_set_layouts(&desc.set_layouts);
        let layout = self.create_pipeline_layout();
        let pipeline = self.next_handle();
        self.pipelines.insert(pipeline);

        Ok(GfxPipelineObjects {
            pipeline,
            layout,
            render_pass,
            set_layouts,
        })
    }

    fn create_compute_pipeline(&mut self, desc: &GfxComputePipelineDesc) -> GfxResult<GfxPipelineObjects> {
        if desc.stage.stage != vk::ShaderStageFlags::COMPUTE {
            return Err(GfxError::InvalidDesc(format!("pipeline '{}' needs a compute stage", desc.name)));
        }
        let set_layouts = self.create_set_layouts(&desc.set_layouts);
        let layout = self.create_pipeline_layout();
        let pipeline = self.next_handle();
        self.pipelines.insert(pipeline);

        Ok(GfxPipelineObjects {
            pipeline,
            layout,
            render_pass: vk::RenderPass::null(),
            set_layouts,
        })
    }

    fn destroy_pipeline(&mut self, objects: &GfxPipelineObjects) {
        if !self.pipelines.remove(&objects.pipeline) {
            self.validation_error(format!("destroy unknown pipeline {:?}", objects.pipeline));
        }
        if !self.pipeline_layouts.remove(&objects.layout) {
            self.validation_error(format!("destroy unknown pipeline layout {:?}", objects.layout));
        }
        if objects.render_pass != vk::RenderPass::null() && !self.render_passes.remove(&objects.render_pass) {
            self.validation_error(format!("destroy unknown render pass {:?}", objects.render_pass));
        }
        for layout in &objects.set_layouts {
            if !self.set_layouts.remove(layout) {
                self.validation_error(format!("destroy unknown set layout {:?}", layout));
            }
        }
    }

    fn create_descriptor_set_layout(
        &mut self,
        desc: &GfxDescriptorSetLayoutDesc,
    ) -> GfxResult<vk::DescriptorSetLayout> {
        Ok(self.create_set_layouts(std::slice::from_ref(desc))[0])
    }

    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout) {
        if !self.set_layouts.remove(&layout) {
            self.validation_error(format!("destroy unknown set layout {:?}", layout));
        }
    }

    fn create_descriptor_pool(&mut self, desc: &GfxDescriptorPoolDesc) -> GfxResult<vk::DescriptorPool> {
        if desc.max_sets == 0 {
            return Err(GfxError::InvalidDesc("descriptor pool with max_sets 0".to_string()));
        }
        let pool = self.next_handle();
        self.descriptor_pools.insert(
            pool,
            HeadlessDescriptorPool {
                max_sets: desc.max_sets,
                sets: HashSet::new(),
            },
        );
        Ok(pool)
    }

    fn destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool) {
        if self.descriptor_pools.remove(&pool).is_none() {
            self.validation_error(format!("destroy unknown descriptor pool {:?}", pool));
        }
    }

    fn allocate_descriptor_set(
        &mut self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet> {
        if !self.set_layouts.contains(&layout) {
            return Err(GfxError::InvalidDesc(format!("allocate set with unknown layout {:?}", layout)));
        }
        let set = self.next_handle();
        let pool = self
            .descriptor_pools
            .get_mut(&pool)
            .ok_or_else(|| GfxError::InvalidDesc(format!("allocate set from unknown pool {:?}", pool)))?;
        if pool.sets.len() >= pool.max_sets as usize {
            return Err(GfxError::Vulkan(vk::Result::ERROR_OUT_OF_POOL_MEMORY));
        }
        pool.sets.insert(set);
        Ok(set)
    }

    fn free_descriptor_set(&mut self, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> GfxResult<()> {
        let freed = self.descriptor_pools.get_mut(&pool).is_some_and(|p| p.sets.remove(&set));
        if !freed {
            self.validation_error(format!("free set {:?} to pool {:?} which did not allocate it", set, pool));
            return Err(GfxError::InvalidDesc(format!("descriptor set {:?} was not allocated from {:?}", set, pool)));
        }
        Ok(())
    }

    fn update_descriptor_sets(&mut self, writes: &[GfxDescriptorWrite]) {
        for write in writes {
            let known = self.descriptor_pools.values().any(|p| p.sets.contains(&write.set));
            if !known {
                self.validation_error(format!("update unknown descriptor set {:?}", write.set));
            }
        }
    }

    fn configure_frame_slots(&mut self, frames_in_flight: usize) -> GfxResult<()> {
        for slot in std::mem::take(&mut self.frame_slots) {
            self.recording.remove(&slot.cmd);
        }
        self.frame_slots = (0..frames_in_flight)
            .map(|_| HeadlessFrameSlot {
                cmd: self.next_handle(),
                in_flight: false,
            })
            .collect();
        Ok(())
    }

    fn wait_frame_slot(&mut self, slot: usize) -> GfxResult<()> {
        let frame_slot = self.frame_slots.get_mut(slot).ok_or(GfxError::InvalidDesc(format!("no frame slot {slot}")))?;
        frame_slot.in_flight = false;
        Ok(())
    }

    fn acquire_present_image(&mut self, _slot: usize) -> GfxResult<GfxAcquire> {
        let swapchain = self.swapchain.as_mut().ok_or(GfxError::NoSwapchain)?;
        if swapchain.out_of_date {
            return Ok(GfxAcquire::OutOfDate);
        }
        let index = swapchain.next_image;
        swapchain.next_image = (index + 1) % swapchain.info.images.len() as u32;
        Ok(GfxAcquire::Image {
            index,
            suboptimal: false,
        })
    }

    fn begin_commands(&mut self, slot: usize) -> GfxResult<vk::CommandBuffer> {
        let cmd = self.frame_slots.get(slot).ok_or(GfxError::InvalidDesc(format!("no frame slot {slot}")))?.cmd;
        self.recording.insert(cmd, Vec::new());
        Ok(cmd)
    }

    fn record(&mut self, cmd: vk::CommandBuffer, command: GfxCommand) {
        match self.recording.get_mut(&cmd) {
            Some(commands) => commands.push(command),
            None => self.validation_error(format!("record into command buffer {:?} which is not recording", cmd)),
        }
    }

    fn submit_frame(&mut self, slot: usize, cmd: vk::CommandBuffer, _present_image: Option<u32>) -> GfxResult<()> {
        let in_flight = self.frame_slots.get(slot).ok_or(GfxError::InvalidDesc(format!("no frame slot {slot}")))?.in_flight;
        if in_flight {
            self.validation_error(format!("frame slot {slot} submitted while its previous work was not waited"));
        }
        let commands = self.recording.remove(&cmd).unwrap_or_default();
        self.execute(&commands);
        self.last_frame_commands = commands;
        self.frame_slots[slot].in_flight = true;
        self.stats.frames_submitted += 1;
        Ok(())
    }

    fn present(&mut self, _slot: usize, image_index: u32) -> GfxResult<GfxPresent> {
        let swapchain = self.swapchain.as_mut().ok_or(GfxError::NoSwapchain)?;
        if image_index as usize >= swapchain.info.images.len() {
            return Err(GfxError::InvalidDesc(format!("present image index {image_index} out of range")));
        }
        self.stats.frames_presented += 1;
        if swapchain.out_of_date {
            return Ok(GfxPresent::OutOfDate);
        }
        if std::mem::take(&mut swapchain.suboptimal) {
            return Ok(GfxPresent::Suboptimal);
        }
        Ok(GfxPresent::Presented)
    }

    fn immediate_submit(&mut self, commands: &[GfxCommand]) -> GfxResult<()> {
        self.execute(commands);
        self.stats.immediate_submits += 1;
        Ok(())
    }

    fn wait_idle(&mut self) -> GfxResult<()> {
        self.frame_slots.iter_mut().for_each(|slot| slot.in_flight = false);
        Ok(())
    }

    fn swapchain_info(&self) -> Option<GfxSwapchainInfo> {
        self.swapchain.as_ref().map(|s| s.info.clone())
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> GfxResult<GfxSwapchainInfo> {
        let old = self.swapchain.take().ok_or(GfxError::NoSwapchain)?;
        for image in &old.info.images {
            if self.image_views.values().any(|i| i == image) {
                self.validation_error(format!("presentation image {:?} still has views when recreated", image));
            }
            self.images.remove(image);
        }

        let info = self.create_present_images(extent, old.info.images.len(), old.info.format);
        self.swapchain = Some(HeadlessSwapchain {
            info: info.clone(),
            next_image: 0,
            out_of_date: false,
            suboptimal: false,
        });
        self.stats.swapchain_recreations += 1;
        Ok(info)
    }

    fn destroy(&mut self) {
        if let Some(swapchain) = self.swapchain.take() {
            for image in &swapchain.info.images {
                self.images.remove(image);
            }
        }
        self.frame_slots.clear();
        self.recording.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::descriptor::GfxDescriptorBinding;
    use crate::pipelines::graphics_pipeline::GfxAttachmentDesc;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn copy_between_buffers_runs_at_submit() {
        let mut backend = HeadlessBackend::new();
        let src = backend.create_buffer(&GfxBufferDesc::new_stage(4, "src")).unwrap();
        let dst = backend
            .create_buffer(&GfxBufferDesc::new(4, vk::BufferUsageFlags::TRANSFER_DST, "dst").location(GfxMemoryLocation::HostVisible))
            .unwrap();
        backend.write_buffer(src.allocation, 0, &[1, 2, 3, 4]).unwrap();

        backend.immediate_submit(&[GfxCommand::copy_whole_buffer(src.buffer, dst.buffer, 4)]).unwrap();

        assert_eq!(backend.read_buffer(dst.allocation, 0, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(backend.stats().validation_errors, 0);
    }

    #[test]
    fn device_local_memory_is_not_mappable() {
        let mut backend = HeadlessBackend::new();
        let buffer = backend.create_buffer(&GfxBufferDesc::new(16, vk::BufferUsageFlags::VERTEX_BUFFER, "vb")).unwrap();

        assert!(matches!(backend.write_buffer(buffer.allocation, 0, &[0; 4]), Err(GfxError::NotHostVisible)));
    }

    #[test]
    fn host_access_is_bounds_checked() {
        let mut backend = HeadlessBackend::new();
        let buffer = backend.create_buffer(&GfxBufferDesc::new_stage(8, "stage")).unwrap();

        let err = backend.write_buffer(buffer.allocation, 6, &[0; 4]).unwrap_err();
        assert!(matches!(err, GfxError::OutOfRange { offset: 6, len: 4, size: 8 }));
    }

    #[test]
    fn descriptor_pool_reports_exhaustion() {
        let mut backend = HeadlessBackend::new();
        let layout = backend
            .create_descriptor_set_layout(&GfxDescriptorSetLayoutDesc::new(vec![GfxDescriptorBinding::new(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            )]))
            .unwrap();
        let pool = backend
            .create_descriptor_pool(&GfxDescriptorPoolDesc {
                max_sets: 1,
                ..Default::default()
            })
            .unwrap();

        backend.allocate_descriptor_set(pool, layout).unwrap();
        let err = backend.allocate_descriptor_set(pool, layout).unwrap_err();
        assert!(err.is_descriptor_pool_exhausted());
    }

    #[test]
    fn presentation_images_cycle_and_go_out_of_date() {
        let mut backend = HeadlessBackend::with_presentation(extent(800, 600), 2, vk::Format::B8G8R8A8_UNORM);
        backend.configure_frame_slots(2).unwrap();

        assert_eq!(backend.acquire_present_image(0).unwrap(), GfxAcquire::Image { index: 0, suboptimal: false });
        assert_eq!(backend.acquire_present_image(1).unwrap(), GfxAcquire::Image { index: 1, suboptimal: false });

        backend.request_out_of_date();
        assert_eq!(backend.acquire_present_image(0).unwrap(), GfxAcquire::OutOfDate);

        let info = backend.recreate_swapchain(extent(1024, 768)).unwrap();
        assert_eq!(info.extent, extent(1024, 768));
        assert_eq!(info.images.len(), 2);
        assert!(matches!(backend.acquire_present_image(0).unwrap(), GfxAcquire::Image { index: 0, .. }));
    }

    #[test]
    fn presentation_images_are_not_counted_or_destroyable() {
        let mut backend = HeadlessBackend::with_presentation(extent(64, 64), 3, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(backend.live_objects().images, 0);

        let image = backend.swapchain_info().unwrap().images[0];
        let stray = backend.allocate(0, false);
        backend.destroy_image(image, stray);
        assert_eq!(backend.stats().validation_errors, 1);
    }

    #[test]
    fn submitting_an_unwaited_slot_is_a_validation_error() {
        lumen_crate_tools::init_log::init_test_log();
        let mut backend = HeadlessBackend::new();
        backend.configure_frame_slots(1).unwrap();

        let cmd = backend.begin_commands(0).unwrap();
        backend.submit_frame(0, cmd, None).unwrap();
        let cmd = backend.begin_commands(0).unwrap();
        backend.submit_frame(0, cmd, None).unwrap();
        assert_eq!(backend.stats().validation_errors, 1);

        backend.wait_frame_slot(0).unwrap();
        let cmd = backend.begin_commands(0).unwrap();
        backend.submit_frame(0, cmd, None).unwrap();
        assert_eq!(backend.stats().validation_errors, 1);
    }

    #[test]
    fn destroying_a_pipeline_releases_what_it_owns() {
        let mut backend = HeadlessBackend::new();
        let desc = GfxGraphicsPipelineDesc::new("test")
            .color_attachment(GfxAttachmentDesc::color(vk::Format::R8G8B8A8_UNORM))
            .set_layouts(vec![GfxDescriptorSetLayoutDesc::default(), GfxDescriptorSetLayoutDesc::default()]);

        let objects = backend.create_graphics_pipeline(&desc).unwrap();
        assert_eq!(backend.live_objects().descriptor_set_layouts, 2);

        backend.destroy_pipeline(&objects);
        assert_eq!(backend.live_objects(), HeadlessObjectCounts::default());
        assert_eq!(backend.stats().validation_errors, 0);
    }
}
