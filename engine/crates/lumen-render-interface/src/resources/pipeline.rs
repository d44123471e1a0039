use ash::vk;
use lumen_gfx::GfxResult;
use lumen_gfx::backend::GfxBackend;
use lumen_gfx::descriptors::descriptor::GfxUpdateFrequency;
use lumen_gfx::pipelines::compute_pipeline::GfxComputePipelineDesc;
use lumen_gfx::pipelines::graphics_pipeline::{GfxGraphicsPipelineDesc, GfxPipelineObjects};

use crate::pool::GfxResource;

/// 创建之后不可变
///
/// 拥有 render pass、pipeline layout 以及按更新频率排列的 descriptor set layout，销毁时一起释放。
/// viewport 和 scissor 是动态状态，所以 resize 不需要重建 pipeline。
pub struct GfxGraphicsPipeline {
    objects: GfxPipelineObjects,
    attachment_formats: Vec<vk::Format>,
    name: String,
}

impl GfxResource for GfxGraphicsPipeline {
    const KIND: &'static str = "graphics pipeline";
    type Desc = GfxGraphicsPipelineDesc;

    fn create(gfx: &mut dyn GfxBackend, desc: &GfxGraphicsPipelineDesc) -> GfxResult<Self> {
        let objects = gfx.create_graphics_pipeline(desc)?;
        log::info!("create graphics pipeline {}", desc.name);
        Ok(Self {
            objects,
            attachment_formats: desc.attachment_formats(),
            name: desc.name.clone(),
        })
    }

    fn destroy(self, gfx: &mut dyn GfxBackend) {
        log::debug!("destroy graphics pipeline {}", self.name);
        gfx.destroy_pipeline(&self.objects);
    }
}

// getters
impl GfxGraphicsPipeline {
    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.objects.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.objects.layout
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.objects.render_pass
    }

    /// 颜色 attachment 在前，depth 在最后
    #[inline]
    pub fn attachment_formats(&self) -> &[vk::Format] {
        &self.attachment_formats
    }

    #[inline]
    pub fn set_layout(&self, frequency: GfxUpdateFrequency) -> Option<vk::DescriptorSetLayout> {
        self.objects.set_layouts.get(frequency.set_index() as usize).copied()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct GfxComputePipeline {
    objects: GfxPipelineObjects,
    name: String,
}

impl GfxResource for GfxComputePipeline {
    const KIND: &'static str = "compute pipeline";
    type Desc = GfxComputePipelineDesc;

    fn create(gfx: &mut dyn GfxBackend, desc: &GfxComputePipelineDesc) -> GfxResult<Self> {
        let objects = gfx.create_compute_pipeline(desc)?;
        log::info!("create compute pipeline {}", desc.name);
        Ok(Self {
            objects,
            name: desc.name.clone(),
        })
    }

    fn destroy(self, gfx: &mut dyn GfxBackend) {
        log::debug!("destroy compute pipeline {}", self.name);
        gfx.destroy_pipeline(&self.objects);
    }
}

// getters
impl GfxComputePipeline {
    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.objects.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.objects.layout
    }

    #[inline]
    pub fn set_layout(&self, frequency: GfxUpdateFrequency) -> Option<vk::DescriptorSetLayout> {
        self.objects.set_layouts.get(frequency.set_index() as usize).copied()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
