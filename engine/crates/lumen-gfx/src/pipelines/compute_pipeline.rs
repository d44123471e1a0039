use ash::vk;

use crate::descriptors::descriptor::GfxDescriptorSetLayoutDesc;
use crate::pipelines::shader::GfxShaderStage;

#[derive(Clone, Debug)]
pub struct GfxComputePipelineDesc {
    pub name: String,
    pub stage: GfxShaderStage,
    pub set_layouts: Vec<GfxDescriptorSetLayoutDesc>,
    pub push_constants: Vec<vk::PushConstantRange>,
}
impl GfxComputePipelineDesc {
    #[inline]
    pub fn new(name: impl Into<String>, stage: GfxShaderStage) -> Self {
        Self {
            name: name.into(),
            stage,
            set_layouts: vec![],
            push_constants: vec![],
        }
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
}
