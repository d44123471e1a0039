use ash::vk;

/// 渲染器默认配置
pub struct DefaultRendererSettings;
impl DefaultRendererSettings {
    pub const DEFAULT_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    pub const DEFAULT_PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::FIFO;
    pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;
    pub const MAX_FRAMES_IN_FLIGHT: usize = 8;
    pub const DEFAULT_EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };
    /// G-buffer 使用的格式
    pub const DEFAULT_COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
    /// lighting 结果
    pub const DEFAULT_HDR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
    pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
    pub const DEFAULT_DESCRIPTOR_POOL_MAX_SETS: u32 = 256;
}

/// 帧级渲染配置
#[derive(Copy, Clone, Debug)]
pub struct FrameSettings {
    pub color_format: vk::Format,
    pub hdr_format: vk::Format,
    pub depth_format: vk::Format,
    pub present_format: vk::Format,
    pub frame_extent: vk::Extent2D,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            color_format: DefaultRendererSettings::DEFAULT_COLOR_FORMAT,
            hdr_format: DefaultRendererSettings::DEFAULT_HDR_FORMAT,
            depth_format: DefaultRendererSettings::DEFAULT_DEPTH_FORMAT,
            present_format: DefaultRendererSettings::DEFAULT_SURFACE_FORMAT.format,
            frame_extent: DefaultRendererSettings::DEFAULT_EXTENT,
        }
    }
}
