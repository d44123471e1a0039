use std::path::Path;

use ash::vk;
use lumen_gfx::descriptors::descriptor::GfxDescriptorPoolDesc;
use lumen_gfx::vulkan::swapchain::VulkanPresentSettings;
use lumen_render_interface::pipeline_settings::{DefaultRendererSettings, FrameSettings};
use lumen_render_interface::render_context::RenderContextSettings;
use serde::Deserialize;

use crate::error::{RendererError, RendererResult};

/// 配置文件中可以使用的 present mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeConfig {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}
impl PresentModeConfig {
    #[inline]
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// 配置文件中可以使用的 format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatConfig {
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba16Sfloat,
    Rgba32Sfloat,
    D32Sfloat,
    D24UnormS8Uint,
}
impl FormatConfig {
    #[inline]
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            Self::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            Self::Rgba16Sfloat => vk::Format::R16G16B16A16_SFLOAT,
            Self::Rgba32Sfloat => vk::Format::R32G32B32A32_SFLOAT,
            Self::D32Sfloat => vk::Format::D32_SFLOAT,
            Self::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        }
    }

    #[inline]
    pub fn is_depth(self) -> bool {
        matches!(self, Self::D32Sfloat | Self::D24UnormS8Uint)
    }
}

/// 渲染器配置，通常从 TOML 文件加载
///
/// ```toml
/// frames_in_flight = 2
/// width = 1280
/// height = 720
/// present_mode = "mailbox"
/// hdr_format = "rgba32_sfloat"
/// ```
///
/// 没有写出的字段使用 [`DefaultRendererSettings`] 中的默认值
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub frames_in_flight: usize,
    /// 没有 presentation 时的绘制区域；有 presentation 时以 presentation image 为准
    pub width: u32,
    pub height: u32,
    pub present_mode: PresentModeConfig,

    /// 每种资源的 pool 容量
    pub pool_capacity: usize,
    /// 每个 descriptor pool 最多分配的 set 数量
    pub descriptor_pool_max_sets: u32,

    pub color_format: FormatConfig,
    pub hdr_format: FormatConfig,
    pub depth_format: FormatConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DefaultRendererSettings::DEFAULT_FRAMES_IN_FLIGHT,
            width: DefaultRendererSettings::DEFAULT_EXTENT.width,
            height: DefaultRendererSettings::DEFAULT_EXTENT.height,
            present_mode: PresentModeConfig::Fifo,
            pool_capacity: 4096,
            descriptor_pool_max_sets: DefaultRendererSettings::DEFAULT_DESCRIPTOR_POOL_MAX_SETS,
            color_format: FormatConfig::Rgba8Unorm,
            hdr_format: FormatConfig::Rgba16Sfloat,
            depth_format: FormatConfig::D32Sfloat,
        }
    }
}

// new & init
impl RendererConfig {
    pub fn from_toml_str(content: &str) -> RendererResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> RendererResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        log::info!("load renderer config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> RendererResult<()> {
        let max = DefaultRendererSettings::MAX_FRAMES_IN_FLIGHT;
        if !(1..=max).contains(&self.frames_in_flight) {
            return Err(RendererError::InvalidConfig(format!(
                "frames_in_flight must be in 1..={max}, got {}",
                self.frames_in_flight
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(RendererError::InvalidConfig(format!("draw extent {}x{} is empty", self.width, self.height)));
        }
        if self.pool_capacity == 0 || self.descriptor_pool_max_sets == 0 {
            return Err(RendererError::InvalidConfig("pool sizes must be positive".to_string()));
        }
        if self.color_format.is_depth() || self.hdr_format.is_depth() {
            return Err(RendererError::InvalidConfig("color targets cannot use a depth format".to_string()));
        }
        if !self.depth_format.is_depth() {
            return Err(RendererError::InvalidConfig(format!("{:?} is not a depth format", self.depth_format)));
        }
        Ok(())
    }
}

// tools
impl RendererConfig {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    pub fn render_context_settings(&self) -> RenderContextSettings {
        let mut descriptor_pool = GfxDescriptorPoolDesc::default();
        descriptor_pool.max_sets = self.descriptor_pool_max_sets;
        RenderContextSettings {
            frames_in_flight: self.frames_in_flight,
            pool_capacity: self.pool_capacity,
            descriptor_pool,
            frame_settings: FrameSettings {
                color_format: self.color_format.to_vk(),
                hdr_format: self.hdr_format.to_vk(),
                depth_format: self.depth_format.to_vk(),
                present_format: DefaultRendererSettings::DEFAULT_SURFACE_FORMAT.format,
                frame_extent: self.extent(),
            },
        }
    }

    /// 交给 Vulkan backend 创建 swapchain
    pub fn present_settings(&self) -> VulkanPresentSettings {
        VulkanPresentSettings {
            present_mode: self.present_mode.to_vk(),
            surface_format: DefaultRendererSettings::DEFAULT_SURFACE_FORMAT,
        }
    }
}
