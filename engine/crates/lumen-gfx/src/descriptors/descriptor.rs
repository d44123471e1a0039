use ash::vk;

/// descriptor set 的更新频率，同时也是 set index
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxUpdateFrequency {
    /// 整个 renderer 生命周期内基本不变
    Global = 0,
    /// 每帧更新一次
    PerFrame = 1,
    /// 每个 material 一份
    PerMaterial = 2,
    /// 每次 draw 一份
    PerDraw = 3,
}
impl GfxUpdateFrequency {
    #[inline]
    pub const fn set_index(self) -> u32 {
        self as u32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxDescriptorBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}
impl GfxDescriptorBinding {
    #[inline]
    pub fn new(binding: u32, ty: vk::DescriptorType, stages: vk::ShaderStageFlags) -> Self {
        Self {
            binding,
            ty,
            count: 1,
            stages,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxDescriptorSetLayoutDesc {
    pub bindings: Vec<GfxDescriptorBinding>,
}
impl GfxDescriptorSetLayoutDesc {
    #[inline]
    pub fn new(bindings: Vec<GfxDescriptorBinding>) -> Self {
        Self { bindings }
    }
}

/// descriptor pool 的容量
#[derive(Clone, Debug)]
pub struct GfxDescriptorPoolDesc {
    pub max_sets: u32,
    pub sizes: Vec<vk::DescriptorPoolSize>,
}
impl Default for GfxDescriptorPoolDesc {
    fn default() -> Self {
        Self {
            max_sets: 256,
            sizes: vec![
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: 256,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::STORAGE_BUFFER,
                    descriptor_count: 256,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: 512,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::STORAGE_IMAGE,
                    descriptor_count: 128,
                },
            ],
        }
    }
}

/// 写入 descriptor 的具体资源
#[derive(Clone, Copy, Debug)]
pub enum GfxDescriptorResource {
    Buffer {
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    Image {
        ty: vk::DescriptorType,
        view: vk::ImageView,
        layout: vk::ImageLayout,
        sampler: vk::Sampler,
    },
}
impl GfxDescriptorResource {
    #[inline]
    pub fn ty(&self) -> vk::DescriptorType {
        match self {
            Self::Buffer { ty, .. } | Self::Image { ty, .. } => *ty,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GfxDescriptorWrite {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub array_element: u32,
    pub resource: GfxDescriptorResource,
}
impl GfxDescriptorWrite {
    #[inline]
    pub fn uniform_buffer(set: vk::DescriptorSet, binding: u32, buffer: vk::Buffer, range: vk::DeviceSize) -> Self {
        Self {
            set,
            binding,
            array_element: 0,
            resource: GfxDescriptorResource::Buffer {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                buffer,
                offset: 0,
                range,
            },
        }
    }

    #[inline]
    pub fn sampled_image(set: vk::DescriptorSet, binding: u32, view: vk::ImageView, sampler: vk::Sampler) -> Self {
        Self {
            set,
            binding,
            array_element: 0,
            resource: GfxDescriptorResource::Image {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                view,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                sampler,
            },
        }
    }
}
