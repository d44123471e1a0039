use ash::vk;

use crate::descriptors::descriptor::GfxDescriptorSetLayoutDesc;
use crate::pipelines::shader::GfxShaderStage;

/// render pass 中的一个 attachment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxAttachmentDesc {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}
impl GfxAttachmentDesc {
    /// 每帧 clear，结束后可以被后续 pass 采样
    #[inline]
    pub fn color(format: vk::Format) -> Self {
        Self {
            format,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    #[inline]
    pub fn depth(format: vk::Format) -> Self {
        Self {
            format,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        }
    }

    /// 直接输出到 presentation image
    #[inline]
    pub fn present(format: vk::Format) -> Self {
        Self {
            format,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

/// 创建 graphics pipeline 所需的全部状态
///
/// pipeline 会拥有自己的 render pass 以及 descriptor set layouts，
/// 销毁 pipeline 时这些对象一起销毁。viewport 和 scissor 总是 dynamic state，
/// 所以窗口尺寸变化时不需要重建 pipeline。
#[derive(Clone, Debug)]
pub struct GfxGraphicsPipelineDesc {
    pub name: String,
    pub stages: Vec<GfxShaderStage>,

    pub color_attachments: Vec<GfxAttachmentDesc>,
    pub depth_attachment: Option<GfxAttachmentDesc>,

    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,

    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend_enable: bool,

    /// 按照更新频率排列，下标即 set index，参考 [`crate::descriptors::descriptor::GfxUpdateFrequency`]
    pub set_layouts: Vec<GfxDescriptorSetLayoutDesc>,
    pub push_constants: Vec<vk::PushConstantRange>,
}
impl GfxGraphicsPipelineDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: vec![],
            color_attachments: vec![],
            depth_attachment: None,
            vertex_bindings: vec![],
            vertex_attributes: vec![],
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            // 按照 OpenGL 的传统，将 CCW 视为 front face
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: false,
            depth_write: false,
            blend_enable: false,
            set_layouts: vec![],
            push_constants: vec![],
        }
    }

    // builder
    #[inline]
    pub fn stage(mut self, stage: GfxShaderStage) -> Self {
        self.stages.push(stage);
        self
    }

    #[inline]
    pub fn color_attachment(mut self, attachment: GfxAttachmentDesc) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    #[inline]
    pub fn depth_attachment(mut self, attachment: GfxAttachmentDesc) -> Self {
        self.depth_attachment = Some(attachment);
        self.depth_test = true;
        self.depth_write = true;
        self
    }

    #[inline]
    pub fn vertex_input(
        mut self,
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.vertex_bindings = bindings;
        self.vertex_attributes = attributes;
        self
    }

    #[inline]
    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    #[inline]
    pub fn blend(mut self, blend_enable: bool) -> Self {
        self.blend_enable = blend_enable;
        self
    }

    #[inline]
    pub fn set_layouts(mut self, set_layouts: Vec<GfxDescriptorSetLayoutDesc>) -> Self {
        self.set_layouts = set_layouts;
        self
    }

    #[inline]
    pub fn push_constant(mut self, range: vk::PushConstantRange) -> Self {
        self.push_constants.push(range);
        self
    }

    /// render pass 中 attachment 的顺序：先 color，再 depth
    pub fn attachment_formats(&self) -> Vec<vk::Format> {
        self.color_attachments.iter().chain(self.depth_attachment.iter()).map(|a| a.format).collect()
    }
}

/// pipeline 拥有的所有原生对象
///
/// compute pipeline 没有 render pass，对应字段为 null
#[derive(Clone, Debug, Default)]
pub struct GfxPipelineObjects {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_formats_put_depth_last() {
        let desc = GfxGraphicsPipelineDesc::new("gbuffer")
            .depth_attachment(GfxAttachmentDesc::depth(vk::Format::D32_SFLOAT))
            .color_attachment(GfxAttachmentDesc::color(vk::Format::R8G8B8A8_UNORM))
            .color_attachment(GfxAttachmentDesc::color(vk::Format::R16G16B16A16_SFLOAT));

        assert_eq!(
            desc.attachment_formats(),
            vec![vk::Format::R8G8B8A8_UNORM, vk::Format::R16G16B16A16_SFLOAT, vk::Format::D32_SFLOAT]
        );
        assert!(desc.depth_test);
    }
}
