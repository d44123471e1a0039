use ash::vk;

use crate::backend::GfxAllocationKey;

/// 创建 image 的描述
#[derive(Clone, Debug)]
pub struct GfxImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    /// 允许创建和 image 本身 format 不同的 view（VK_IMAGE_CREATE_MUTABLE_FORMAT_BIT）
    pub mutable_format: bool,
    /// 为空表示 EXCLUSIVE，否则在这些 queue family 之间 CONCURRENT 共享
    pub queue_families: Vec<u32>,
    pub name: String,
}
impl GfxImageDesc {
    #[inline]
    pub fn new_2d(
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        name: impl Into<String>,
    ) -> Self {
        Self {
            extent,
            format,
            usage,
            aspect,
            mutable_format: false,
            queue_families: Vec::new(),
            name: name.into(),
        }
    }

    /// 颜色 attachment，同时可以被采样
    #[inline]
    pub fn new_color_target(extent: vk::Extent2D, format: vk::Format, name: impl Into<String>) -> Self {
        Self::new_2d(
            extent,
            format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::ImageAspectFlags::COLOR,
            name,
        )
    }

    /// 深度 attachment，同时可以被采样
    #[inline]
    pub fn new_depth_target(extent: vk::Extent2D, format: vk::Format, name: impl Into<String>) -> Self {
        Self::new_2d(
            extent,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::DEPTH,
            name,
        )
    }

    // builder
    #[inline]
    pub fn mutable_format(mut self, mutable_format: bool) -> Self {
        self.mutable_format = mutable_format;
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

/// backend 创建 image 的结果
#[derive(Clone, Copy, Debug)]
pub struct GfxImageAlloc {
    pub image: vk::Image,
    pub allocation: GfxAllocationKey,
}

/// Vulkan 格式相关的工具类
pub struct GfxFormatUtils;
impl GfxFormatUtils {
    /// 计算指定格式下每个像素需要的字节数
    ///
    /// 不支持的格式返回 None
    pub fn pixel_size_in_bytes(format: vk::Format) -> Option<usize> {
        match format {
            vk::Format::R8_UNORM | vk::Format::R8_SRGB => Some(1),
            vk::Format::R8G8_UNORM => Some(2),
            vk::Format::R8G8B8A8_UNORM
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::B8G8R8A8_UNORM
            | vk::Format::B8G8R8A8_SRGB
            | vk::Format::R32_SFLOAT
            | vk::Format::D32_SFLOAT
            | vk::Format::A2B10G10R10_UNORM_PACK32 => Some(4),
            vk::Format::R16G16B16A16_SFLOAT | vk::Format::R16G16B16A16_UNORM | vk::Format::R32G32_SFLOAT => Some(8),
            vk::Format::R32G32B32A32_SFLOAT => Some(16),
            _ => None,
        }
    }

    #[inline]
    pub fn is_depth(format: vk::Format) -> bool {
        matches!(
            format,
            vk::Format::D16_UNORM
                | vk::Format::D32_SFLOAT
                | vk::Format::D24_UNORM_S8_UINT
                | vk::Format::D32_SFLOAT_S8_UINT
                | vk::Format::X8_D24_UNORM_PACK32
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_size_of_common_formats() {
        assert_eq!(GfxFormatUtils::pixel_size_in_bytes(vk::Format::R8G8B8A8_UNORM), Some(4));
        assert_eq!(GfxFormatUtils::pixel_size_in_bytes(vk::Format::R16G16B16A16_SFLOAT), Some(8));
        assert_eq!(GfxFormatUtils::pixel_size_in_bytes(vk::Format::BC7_UNORM_BLOCK), None);
    }

    #[test]
    fn depth_formats_are_detected() {
        assert!(GfxFormatUtils::is_depth(vk::Format::D32_SFLOAT));
        assert!(!GfxFormatUtils::is_depth(vk::Format::R8G8B8A8_UNORM));
    }
}
