use ash::vk;

/// 一个 shader stage
///
/// shader 的编译和加载不在这一层，这里只接收已经加载好的 SPIR-V
#[derive(Clone, Debug)]
pub struct GfxShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub spirv: Vec<u32>,
    pub entry_point: String,
}
impl GfxShaderStage {
    #[inline]
    pub fn new(stage: vk::ShaderStageFlags, spirv: Vec<u32>) -> Self {
        Self {
            stage,
            spirv,
            entry_point: "main".to_string(),
        }
    }

    #[inline]
    pub fn entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }
}
