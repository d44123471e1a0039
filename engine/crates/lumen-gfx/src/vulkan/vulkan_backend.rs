use std::any::Any;

use ash::vk;
use itertools::Itertools;
use slotmap::SlotMap;
use vk_mem::Alloc;

use crate::backend::{GfxAcquire, GfxAllocationKey, GfxBackend, GfxPresent, GfxSwapchainInfo};
use crate::commands::command::GfxCommand;
use crate::descriptors::descriptor::{
    GfxDescriptorPoolDesc, GfxDescriptorResource, GfxDescriptorSetLayoutDesc, GfxDescriptorWrite,
};
use crate::error::{GfxError, GfxResult};
use crate::pipelines::compute_pipeline::GfxComputePipelineDesc;
use crate::pipelines::graphics_pipeline::{GfxGraphicsPipelineDesc, GfxPipelineObjects};
use crate::resources::buffer::{GfxAllocationInfo, GfxBufferAlloc, GfxBufferDesc, GfxMemoryLocation};
use crate::resources::image::{GfxImageAlloc, GfxImageDesc};
use crate::vk_check;
use crate::vulkan::device::VulkanDevice;
use crate::vulkan::pipeline::VulkanPipelineFactory;
use crate::vulkan::swapchain::{VulkanPresentSettings, VulkanSwapchain};

struct VulkanAllocation {
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
    host_visible: bool,
}

/// 每个 frame slot 独占的 command pool 和同步对象
struct VulkanFrameSlot {
    command_pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    /// 创建时处于 signaled 状态，第一次 wait 不会阻塞
    fence: vk::Fence,
    image_available: vk::Semaphore,
}

/// 基于 ash + vk-mem 的 backend
pub struct VulkanBackend {
    frame_slots: Vec<VulkanFrameSlot>,

    immediate_pool: vk::CommandPool,
    immediate_fence: vk::Fence,

    surface: vk::SurfaceKHR,
    swapchain: Option<VulkanSwapchain>,
    present_settings: VulkanPresentSettings,

    allocations: SlotMap<GfxAllocationKey, VulkanAllocation>,

    destroyed: bool,

    /// 需要在 device 之前 drop
    allocator: vk_mem::Allocator,
    device: VulkanDevice,
}

// new & init
impl VulkanBackend {
    /// `surface` 为 None 时只能离屏渲染；surface 的所有权转移给 backend
    pub fn new(
        device: VulkanDevice,
        surface: Option<vk::SurfaceKHR>,
        present_settings: VulkanPresentSettings,
        window_extent: vk::Extent2D,
    ) -> GfxResult<Self> {
        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(&device.instance, &device.device, device.physical_device);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        let allocator = unsafe { vk_mem::Allocator::new(vma_ci)? };

        let immediate_pool = unsafe {
            device.device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(device.queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT),
                None,
            )?
        };
        let immediate_fence = unsafe { device.device.create_fence(&vk::FenceCreateInfo::default(), None)? };

        let surface = surface.unwrap_or_default();
        let swapchain = if surface != vk::SurfaceKHR::null() {
            Some(VulkanSwapchain::new(
                &device,
                surface,
                &present_settings,
                window_extent,
                vk::SwapchainKHR::null(),
            )?)
        } else {
            None
        };

        Ok(Self {
            frame_slots: vec![],
            immediate_pool,
            immediate_fence,
            surface,
            swapchain,
            present_settings,
            allocations: SlotMap::with_key(),
            destroyed: false,
            allocator,
            device,
        })
    }

    fn create_frame_slot(&self) -> GfxResult<VulkanFrameSlot> {
        let device = &self.device.device;
        unsafe {
            let command_pool = device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(self.device.queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT),
                None,
            )?;
            let cmd = device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(command_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1),
            )?[0];
            let fence = device.create_fence(&vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED), None)?;
            let image_available = device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?;

            Ok(VulkanFrameSlot {
                command_pool,
                cmd,
                fence,
                image_available,
            })
        }
    }

    fn destroy_frame_slots(&mut self) {
        let device = &self.device.device;
        for slot in self.frame_slots.drain(..) {
            unsafe {
                device.destroy_semaphore(slot.image_available, None);
                device.destroy_fence(slot.fence, None);
                device.destroy_command_pool(slot.command_pool, None);
            }
        }
    }

    fn frame_slot(&self, slot: usize) -> GfxResult<&VulkanFrameSlot> {
        self.frame_slots.get(slot).ok_or_else(|| GfxError::InvalidDesc(format!("no frame slot {slot}")))
    }

    fn pipeline_factory(&self) -> VulkanPipelineFactory<'_> {
        VulkanPipelineFactory::new(&self.device.device)
    }
}

// getters
impl VulkanBackend {
    #[inline]
    pub fn device(&self) -> &VulkanDevice {
        &self.device
    }
}

// tools
impl VulkanBackend {
    /// 将命令翻译为原生调用
    fn record_command(&self, cmd: vk::CommandBuffer, command: &GfxCommand) {
        let device = &self.device.device;
        unsafe {
            match command {
                GfxCommand::CopyBuffer { src, dst, regions } => device.cmd_copy_buffer(cmd, *src, *dst, regions),
                GfxCommand::CopyBufferToImage {
                    src,
                    dst,
                    extent,
                    aspect,
                } => {
                    let region = vk::BufferImageCopy {
                        buffer_offset: 0,
                        buffer_row_length: 0,
                        buffer_image_height: 0,
                        image_subresource: vk::ImageSubresourceLayers {
                            aspect_mask: *aspect,
                            mip_level: 0,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        image_offset: vk::Offset3D::default(),
                        image_extent: vk::Extent3D {
                            width: extent.width,
                            height: extent.height,
                            depth: 1,
                        },
                    };
                    device.cmd_copy_buffer_to_image(
                        cmd,
                        *src,
                        *dst,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        std::slice::from_ref(&region),
                    );
                }
                GfxCommand::ImageBarrier(barrier) => {
                    let barrier = barrier.to_vk();
                    let dependency_info =
                        vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));
                    device.cmd_pipeline_barrier2(cmd, &dependency_info);
                }
                GfxCommand::BeginRenderPass {
                    render_pass,
                    framebuffer,
                    extent,
                    clear_values,
                } => {
                    let clear_values = clear_values.iter().map(|c| c.to_vk()).collect_vec();
                    let begin_info = vk::RenderPassBeginInfo::default()
                        .render_pass(*render_pass)
                        .framebuffer(*framebuffer)
                        .render_area(vk::Rect2D {
                            offset: vk::Offset2D::default(),
                            extent: *extent,
                        })
                        .clear_values(&clear_values);
                    device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
                }
                GfxCommand::EndRenderPass => device.cmd_end_render_pass(cmd),
                GfxCommand::BindPipeline { bind_point, pipeline } => device.cmd_bind_pipeline(cmd, *bind_point, *pipeline),
                GfxCommand::BindDescriptorSets {
                    bind_point,
                    layout,
                    first_set,
                    sets,
                } => device.cmd_bind_descriptor_sets(cmd, *bind_point, *layout, *first_set, sets, &[]),
                GfxCommand::BindVertexBuffer { buffer, offset } => {
                    device.cmd_bind_vertex_buffers(cmd, 0, std::slice::from_ref(buffer), std::slice::from_ref(offset))
                }
                GfxCommand::BindIndexBuffer {
                    buffer,
                    offset,
                    index_type,
                } => device.cmd_bind_index_buffer(cmd, *buffer, *offset, *index_type),
                GfxCommand::SetViewportScissor { extent } => {
                    let viewport = vk::Viewport {
                        x: 0.0,
                        y: 0.0,
                        width: extent.width as f32,
                        height: extent.height as f32,
                        min_depth: 0.0,
                        max_depth: 1.0,
                    };
                    let scissor = vk::Rect2D {
                        offset: vk::Offset2D::default(),
                        extent: *extent,
                    };
                    device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
                    device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));
                }
                GfxCommand::PushConstants {
                    layout,
                    stages,
                    offset,
                    data,
                } => device.cmd_push_constants(cmd, *layout, *stages, *offset, data),
                GfxCommand::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => device.cmd_draw(cmd, *vertex_count, *instance_count, *first_vertex, *first_instance),
                GfxCommand::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                } => device.cmd_draw_indexed(
                    cmd,
                    *index_count,
                    *instance_count,
                    *first_index,
                    *vertex_offset,
                    *first_instance,
                ),
                GfxCommand::Dispatch { x, y, z } => device.cmd_dispatch(cmd, *x, *y, *z),
            }
        }
    }
}

impl GfxBackend for VulkanBackend {
    fn name(&self) -> &str {
        "vulkan"
    }

    fn create_buffer(&mut self, desc: &GfxBufferDesc) -> GfxResult<GfxBufferAlloc> {
        let host_visible = desc.location == GfxMemoryLocation::HostVisible;
        let buffer_ci = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(desc.sharing_mode())
            .queue_family_indices(&desc.queue_families);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if host_visible {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let (buffer, allocation) = unsafe { self.allocator.create_buffer(&buffer_ci, &alloc_ci)? };
        let alloc_info = self.allocator.get_allocation_info(&allocation);
        let allocation = self.allocations.insert(VulkanAllocation {
            allocation,
            size: desc.size,
            host_visible,
        });

        Ok(GfxBufferAlloc {
            buffer,
            allocation,
            info: GfxAllocationInfo {
                size: alloc_info.size,
                offset: alloc_info.offset,
                host_visible,
            },
        })
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer, allocation: GfxAllocationKey) {
        match self.allocations.remove(allocation) {
            Some(mut alloc) => unsafe { self.allocator.destroy_buffer(buffer, &mut alloc.allocation) },
            None => log::error!("destroy buffer {:?} with unknown allocation", buffer),
        }
    }

    fn write_buffer(&mut self, allocation: GfxAllocationKey, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        let allocator = &self.allocator;
        let alloc = self.allocations.get_mut(allocation).ok_or(GfxError::Vulkan(vk::Result::ERROR_MEMORY_MAP_FAILED))?;
        if !alloc.host_visible {
            return Err(GfxError::NotHostVisible);
        }
        let len = data.len() as vk::DeviceSize;
        if offset + len > alloc.size {
            return Err(GfxError::OutOfRange {
                offset,
                len,
                size: alloc.size,
            });
        }
        unsafe {
            let ptr = allocator.map_memory(&mut alloc.allocation)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
            vk_check!(allocator.flush_allocation(&alloc.allocation, offset, len), "flush_allocation");
            allocator.unmap_memory(&mut alloc.allocation);
        }
        Ok(())
    }

    fn read_buffer(&mut self, allocation: GfxAllocationKey, offset: vk::DeviceSize, len: usize) -> GfxResult<Vec<u8>> {
        let allocator = &self.allocator;
        let alloc = self.allocations.get_mut(allocation).ok_or(GfxError::Vulkan(vk::Result::ERROR_MEMORY_MAP_FAILED))?;
        if !alloc.host_visible {
            return Err(GfxError::NotHostVisible);
        }
        if offset + len as vk::DeviceSize > alloc.size {
            return Err(GfxError::OutOfRange {
                offset,
                len: len as vk::DeviceSize,
                size: alloc.size,
            });
        }
        let mut bytes = vec![0; len];
        unsafe {
            vk_check!(
                allocator.invalidate_allocation(&alloc.allocation, offset, len as vk::DeviceSize),
                "invalidate_allocation"
            );
            let ptr = allocator.map_memory(&mut alloc.allocation)?;
            std::ptr::copy_nonoverlapping(ptr.add(offset as usize), bytes.as_mut_ptr(), len);
            allocator.unmap_memory(&mut alloc.allocation);
        }
        Ok(bytes)
    }

    fn create_image(&mut self, desc: &GfxImageDesc) -> GfxResult<GfxImageAlloc> {
        let flags = if desc.mutable_format { vk::ImageCreateFlags::MUTABLE_FORMAT } else { vk::ImageCreateFlags::empty() };
        let image_ci = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(desc.sharing_mode())
            .queue_family_indices(&desc.queue_families)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let (image, allocation) = unsafe { self.allocator.create_image(&image_ci, &alloc_ci)? };
        let alloc_info = self.allocator.get_allocation_info(&allocation);
        let allocation = self.allocations.insert(VulkanAllocation {
            allocation,
            size: alloc_info.size,
            host_visible: false,
        });
        Ok(GfxImageAlloc { image, allocation })
    }

    fn destroy_image(&mut self, image: vk::Image, allocation: GfxAllocationKey) {
        match self.allocations.remove(allocation) {
            Some(mut alloc) => unsafe { self.allocator.destroy_image(image, &mut alloc.allocation) },
            None => log::error!("destroy image {:?} with unknown allocation", image),
        }
    }

    fn create_image_view(
        &mut self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> GfxResult<vk::ImageView> {
        let ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        Ok(unsafe { self.device.device.create_image_view(&ci, None)? })
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        unsafe { self.device.device.destroy_image_view(view, None) }
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> GfxResult<vk::Framebuffer> {
        let ci = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        Ok(unsafe { self.device.device.create_framebuffer(&ci, None)? })
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_graphics_pipeline(&mut self, desc: &GfxGraphicsPipelineDesc) -> GfxResult<GfxPipelineObjects> {
        self.pipeline_factory().create_graphics_pipeline(desc)
    }

    fn create_compute_pipeline(&mut self, desc: &GfxComputePipelineDesc) -> GfxResult<GfxPipelineObjects> {
        self.pipeline_factory().create_compute_pipeline(desc)
    }

    fn destroy_pipeline(&mut self, objects: &GfxPipelineObjects) {
        self.pipeline_factory().destroy_pipeline(objects)
    }

    fn create_descriptor_set_layout(
        &mut self,
        desc: &GfxDescriptorSetLayoutDesc,
    ) -> GfxResult<vk::DescriptorSetLayout> {
        self.pipeline_factory().create_set_layout(desc)
    }

    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(&mut self, desc: &GfxDescriptorPoolDesc) -> GfxResult<vk::DescriptorPool> {
        // 需要单独释放 descriptor set
        let ci = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(desc.max_sets)
            .pool_sizes(&desc.sizes);
        Ok(unsafe { self.device.device.create_descriptor_pool(&ci, None)? })
    }

    fn destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool) {
        unsafe { self.device.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(
        &mut self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet> {
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(std::slice::from_ref(&layout));
        Ok(unsafe { self.device.device.allocate_descriptor_sets(&info)? }[0])
    }

    fn free_descriptor_set(&mut self, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> GfxResult<()> {
        unsafe { self.device.device.free_descriptor_sets(pool, std::slice::from_ref(&set))? };
        Ok(())
    }

    fn update_descriptor_sets(&mut self, writes: &[GfxDescriptorWrite]) {
        let buffer_infos = writes
            .iter()
            .map(|w| match w.resource {
                GfxDescriptorResource::Buffer {
                    buffer, offset, range, ..
                } => vk::DescriptorBufferInfo { buffer, offset, range },
                GfxDescriptorResource::Image { .. } => vk::DescriptorBufferInfo::default(),
            })
            .collect_vec();
        let image_infos = writes
            .iter()
            .map(|w| match w.resource {
                GfxDescriptorResource::Image {
                    view, layout, sampler, ..
                } => vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: layout,
                },
                GfxDescriptorResource::Buffer { .. } => vk::DescriptorImageInfo::default(),
            })
            .collect_vec();

        let vk_writes = writes
            .iter()
            .enumerate()
            .map(|(idx, w)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(w.set)
                    .dst_binding(w.binding)
                    .dst_array_element(w.array_element)
                    .descriptor_type(w.resource.ty());
                match w.resource {
                    GfxDescriptorResource::Buffer { .. } => write.buffer_info(std::slice::from_ref(&buffer_infos[idx])),
                    GfxDescriptorResource::Image { .. } => write.image_info(std::slice::from_ref(&image_infos[idx])),
                }
            })
            .collect_vec();

        unsafe { self.device.device.update_descriptor_sets(&vk_writes, &[]) }
    }

    fn configure_frame_slots(&mut self, frames_in_flight: usize) -> GfxResult<()> {
        self.wait_idle()?;
        self.destroy_frame_slots();
        for _ in 0..frames_in_flight {
            let slot = self.create_frame_slot()?;
            self.frame_slots.push(slot);
        }
        log::info!("{} frame slots configured", frames_in_flight);
        Ok(())
    }

    fn wait_frame_slot(&mut self, slot: usize) -> GfxResult<()> {
        let fence = self.frame_slot(slot)?.fence;
        unsafe { self.device.device.wait_for_fences(std::slice::from_ref(&fence), true, u64::MAX)? };
        Ok(())
    }

    fn acquire_present_image(&mut self, slot: usize) -> GfxResult<GfxAcquire> {
        let semaphore = self.frame_slot(slot)?.image_available;
        let swapchain = self.swapchain.as_ref().ok_or(GfxError::NoSwapchain)?;
        swapchain.acquire_next_image(&self.device, semaphore)
    }

    fn begin_commands(&mut self, slot: usize) -> GfxResult<vk::CommandBuffer> {
        let frame_slot = self.frame_slot(slot)?;
        let device = &self.device.device;
        unsafe {
            device.reset_command_pool(frame_slot.command_pool, vk::CommandPoolResetFlags::empty())?;
            device.begin_command_buffer(
                frame_slot.cmd,
                &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
        }
        Ok(frame_slot.cmd)
    }

    fn record(&mut self, cmd: vk::CommandBuffer, command: GfxCommand) {
        self.record_command(cmd, &command);
    }

    fn submit_frame(&mut self, slot: usize, cmd: vk::CommandBuffer, present_image: Option<u32>) -> GfxResult<()> {
        let frame_slot = self.frame_slot(slot)?;
        let fence = frame_slot.fence;
        let wait_semaphores = [frame_slot.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = match (present_image, &self.swapchain) {
            (Some(index), Some(swapchain)) => vec![swapchain.render_finished(index)],
            _ => vec![],
        };

        let mut submit_info = vk::SubmitInfo::default()
            .command_buffers(std::slice::from_ref(&cmd))
            .signal_semaphores(&signal_semaphores);
        if present_image.is_some() {
            submit_info = submit_info.wait_semaphores(&wait_semaphores).wait_dst_stage_mask(&wait_stages);
        }

        let device = &self.device.device;
        unsafe {
            device.end_command_buffer(cmd)?;
            device.reset_fences(std::slice::from_ref(&fence))?;
            device.queue_submit(self.device.queue, std::slice::from_ref(&submit_info), fence)?;
        }
        Ok(())
    }

    fn present(&mut self, _slot: usize, image_index: u32) -> GfxResult<GfxPresent> {
        let swapchain = self.swapchain.as_ref().ok_or(GfxError::NoSwapchain)?;
        swapchain.present_image(&self.device, image_index)
    }

    fn immediate_submit(&mut self, commands: &[GfxCommand]) -> GfxResult<()> {
        let device = &self.device.device;
        let cmd = unsafe {
            device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(self.immediate_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1),
            )?[0]
        };

        let result = (|| -> GfxResult<()> {
            unsafe {
                device.begin_command_buffer(
                    cmd,
                    &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )?;
            }
            for command in commands {
                self.record_command(cmd, command);
            }
            let submit_info = vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&cmd));
            unsafe {
                device.end_command_buffer(cmd)?;
                device.reset_fences(std::slice::from_ref(&self.immediate_fence))?;
                device.queue_submit(self.device.queue, std::slice::from_ref(&submit_info), self.immediate_fence)?;
                device.wait_for_fences(std::slice::from_ref(&self.immediate_fence), true, u64::MAX)?;
            }
            Ok(())
        })();

        unsafe { device.free_command_buffers(self.immediate_pool, std::slice::from_ref(&cmd)) };
        result
    }

    fn wait_idle(&mut self) -> GfxResult<()> {
        unsafe { self.device.device.device_wait_idle()? };
        Ok(())
    }

    fn swapchain_info(&self) -> Option<GfxSwapchainInfo> {
        self.swapchain.as_ref().map(|s| s.info())
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> GfxResult<GfxSwapchainInfo> {
        if self.surface == vk::SurfaceKHR::null() {
            return Err(GfxError::NoSwapchain);
        }
        self.wait_idle()?;

        let old = self.swapchain.take();
        let old_handle = old.as_ref().map_or(vk::SwapchainKHR::null(), |s| s.handle());
        let new = VulkanSwapchain::new(&self.device, self.surface, &self.present_settings, extent, old_handle);
        if let Some(old) = old {
            old.destroy(&self.device);
        }

        let swapchain = new?;
        let info = swapchain.info();
        self.swapchain = Some(swapchain);
        Ok(info)
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        vk_check!(unsafe { self.device.device.device_wait_idle() }, "device_wait_idle");

        self.destroy_frame_slots();
        unsafe {
            self.device.device.destroy_fence(self.immediate_fence, None);
            self.device.device.destroy_command_pool(self.immediate_pool, None);
        }
        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy(&self.device);
        }
        if self.surface != vk::SurfaceKHR::null() {
            unsafe { self.device.surface_pf.destroy_surface(self.surface, None) };
        }

        if !self.allocations.is_empty() {
            log::error!("{} allocations are still alive when the backend is destroyed", self.allocations.len());
        }
        self.destroyed = true;
        log::info!("vulkan backend destroyed");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "VulkanBackend dropped without destroy()");
    }
}
