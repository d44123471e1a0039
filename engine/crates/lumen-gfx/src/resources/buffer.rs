use ash::vk;

use crate::backend::GfxAllocationKey;

/// buffer 所在的内存位置
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GfxMemoryLocation {
    /// 优先使用 device memory，CPU 不可直接读写
    #[default]
    DeviceLocal,
    /// host visible + coherent，用于 stage buffer、uniform buffer 等需要 CPU 写入的场景
    HostVisible,
}

/// 创建 buffer 的描述
#[derive(Clone, Debug)]
pub struct GfxBufferDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: GfxMemoryLocation,
    /// 为空表示 EXCLUSIVE，否则在这些 queue family 之间 CONCURRENT 共享
    pub queue_families: Vec<u32>,
    pub name: String,
}
impl GfxBufferDesc {
    #[inline]
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags, name: impl Into<String>) -> Self {
        Self {
            size,
            usage,
            location: GfxMemoryLocation::DeviceLocal,
            queue_families: Vec::new(),
            name: name.into(),
        }
    }

    /// stage buffer：host visible，只作为 transfer 的 src
    #[inline]
    pub fn new_stage(size: vk::DeviceSize, name: impl Into<String>) -> Self {
        Self::new(size, vk::BufferUsageFlags::TRANSFER_SRC, name).location(GfxMemoryLocation::HostVisible)
    }

    // builder
    #[inline]
    pub fn location(mut self, location: GfxMemoryLocation) -> Self {
        self.location = location;
        self
    }

    #[inline]
    pub fn queue_families(mut self, queue_families: &[u32]) -> Self {
        self.queue_families = queue_families.to_vec();
        self
    }

    #[inline]
    pub fn sharing_mode(&self) -> vk::SharingMode {
        if self.queue_families.len() > 1 { vk::SharingMode::CONCURRENT } else { vk::SharingMode::EXCLUSIVE }
    }
}

/// 一次内存分配的元数据
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxAllocationInfo {
    /// 实际分配的大小（可能大于请求的大小）
    pub size: vk::DeviceSize,
    /// 在 device memory block 中的偏移
    pub offset: vk::DeviceSize,
    pub host_visible: bool,
}

/// backend 创建 buffer 的结果
#[derive(Clone, Copy, Debug)]
pub struct GfxBufferAlloc {
    pub buffer: vk::Buffer,
    pub allocation: GfxAllocationKey,
    pub info: GfxAllocationInfo,
}
