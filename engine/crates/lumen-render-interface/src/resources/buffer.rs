use ash::vk;
use lumen_gfx::GfxResult;
use lumen_gfx::backend::{GfxAllocationKey, GfxBackend};
use lumen_gfx::resources::buffer::{GfxAllocationInfo, GfxBufferDesc};

use crate::pool::GfxResource;

/// 一块 GPU 内存
pub struct GfxBuffer {
    buffer: vk::Buffer,
    allocation: GfxAllocationKey,
    allocation_info: GfxAllocationInfo,

    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,

    name: String,
}

impl GfxResource for GfxBuffer {
    const KIND: &'static str = "buffer";
    type Desc = GfxBufferDesc;

    fn create(gfx: &mut dyn GfxBackend, desc: &GfxBufferDesc) -> GfxResult<Self> {
        let alloc = gfx.create_buffer(desc)?;
        Ok(Self {
            buffer: alloc.buffer,
            allocation: alloc.allocation,
            allocation_info: alloc.info,
            size: desc.size,
            usage: desc.usage,
            name: desc.name.clone(),
        })
    }

    fn destroy(self, gfx: &mut dyn GfxBackend) {
        log::debug!("destroy buffer {}", self.name);
        gfx.destroy_buffer(self.buffer, self.allocation);
    }
}

// getters
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn allocation(&self) -> GfxAllocationKey {
        self.allocation
    }

    #[inline]
    pub fn allocation_info(&self) -> &GfxAllocationInfo {
        &self.allocation_info
    }

    /// 请求的大小，实际分配的大小见 [`GfxBuffer::allocation_info`]
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_host_visible(&self) -> bool {
        self.allocation_info.host_visible
    }
}
