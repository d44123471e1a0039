use ash::vk;

/// barrier 使用的 src 和 dst 访问 mask
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxBarrierMask {
    pub src_stage: vk::PipelineStageFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_access: vk::AccessFlags2,
}
impl GfxBarrierMask {
    /// color attachment 写入之后，在 fragment shader 中采样
    pub const COLOR_WRITE_TO_SAMPLE: Self = Self {
        src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
        src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        dst_access: vk::AccessFlags2::SHADER_SAMPLED_READ,
    };

    /// transfer 写入之后，在 fragment shader 中采样
    pub const TRANSFER_TO_SAMPLE: Self = Self {
        src_stage: vk::PipelineStageFlags2::TRANSFER,
        dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
        src_access: vk::AccessFlags2::TRANSFER_WRITE,
        dst_access: vk::AccessFlags2::SHADER_SAMPLED_READ,
    };
}

/// 便捷创建 image memory barrier 的结构体
///
/// 只覆盖第一个 mip level 和第一个 array layer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxImageBarrier {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub aspect: vk::ImageAspectFlags,
    pub mask: GfxBarrierMask,
}

impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            image: vk::Image::null(),
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::UNDEFINED,
            aspect: vk::ImageAspectFlags::COLOR,
            mask: GfxBarrierMask {
                src_stage: vk::PipelineStageFlags2::NONE,
                dst_stage: vk::PipelineStageFlags2::NONE,
                src_access: vk::AccessFlags2::NONE,
                dst_access: vk::AccessFlags2::NONE,
            },
        }
    }
}

impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// builder
    #[inline]
    pub fn image(mut self, image: vk::Image) -> Self {
        self.image = image;
        self
    }

    /// builder
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.old_layout = old_layout;
        self.new_layout = new_layout;
        self
    }

    /// builder
    #[inline]
    pub fn src_mask(mut self, src_stage_mask: vk::PipelineStageFlags2, src_access_mask: vk::AccessFlags2) -> Self {
        self.mask.src_stage = src_stage_mask;
        self.mask.src_access = src_access_mask;
        self
    }

    /// builder
    #[inline]
    pub fn dst_mask(mut self, dst_stage_mask: vk::PipelineStageFlags2, dst_access_mask: vk::AccessFlags2) -> Self {
        self.mask.dst_stage = dst_stage_mask;
        self.mask.dst_access = dst_access_mask;
        self
    }

    /// builder
    #[inline]
    pub fn mask(mut self, mask: GfxBarrierMask) -> Self {
        self.mask = mask;
        self
    }

    /// builder
    /// layer 和 miplevel 都使用默认值
    #[inline]
    pub fn image_aspect_flag(mut self, aspect_mask: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect_mask;
        self
    }

    /// 转换为原生结构体
    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2 {
            src_stage_mask: self.mask.src_stage,
            src_access_mask: self.mask.src_access,
            dst_stage_mask: self.mask.dst_stage,
            dst_access_mask: self.mask.dst_access,
            old_layout: self.old_layout,
            new_layout: self.new_layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: self.image,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        }
    }
}
