use ash::vk;
use lumen_gfx::backend::GfxBackend;
use lumen_gfx::{GfxError, GfxResult};

use crate::pool::GfxResource;

/// framebuffer 的一个 attachment，view 已经从 image 中解析出来
#[derive(Clone, Copy, Debug)]
pub struct GfxFramebufferAttachment {
    pub format: vk::Format,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
}

#[derive(Clone, Debug)]
pub struct GfxFramebufferDesc {
    pub render_pass: vk::RenderPass,
    /// 顺序需要和 render pass 的 attachment 顺序一致
    pub attachments: Vec<GfxFramebufferAttachment>,
    pub name: String,
}

impl GfxFramebufferDesc {
    /// 所有 attachment 在每个轴上的最小值
    pub fn derive_extent(&self) -> GfxResult<vk::Extent2D> {
        self.attachments
            .iter()
            .map(|a| a.extent)
            .reduce(|acc, e| vk::Extent2D {
                width: acc.width.min(e.width),
                height: acc.height.min(e.height),
            })
            .ok_or_else(|| GfxError::EmptyFramebuffer(self.name.clone()))
    }
}

/// 不拥有 attachment，销毁时 image 和 view 都保留
pub struct GfxFramebuffer {
    framebuffer: vk::Framebuffer,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    attachment_formats: Vec<vk::Format>,
    views: Vec<vk::ImageView>,
    name: String,
}

impl GfxResource for GfxFramebuffer {
    const KIND: &'static str = "framebuffer";
    type Desc = GfxFramebufferDesc;

    fn create(gfx: &mut dyn GfxBackend, desc: &GfxFramebufferDesc) -> GfxResult<Self> {
        let extent = desc.derive_extent()?;
        let views = desc.attachments.iter().map(|a| a.view).collect::<Vec<_>>();
        let framebuffer = gfx.create_framebuffer(desc.render_pass, &views, extent)?;

        Ok(Self {
            framebuffer,
            render_pass: desc.render_pass,
            extent,
            attachment_formats: desc.attachments.iter().map(|a| a.format).collect(),
            views,
            name: desc.name.clone(),
        })
    }

    fn destroy(self, gfx: &mut dyn GfxBackend) {
        log::debug!("destroy framebuffer {}", self.name);
        gfx.destroy_framebuffer(self.framebuffer);
    }
}

// getters
impl GfxFramebuffer {
    #[inline]
    pub fn vk_framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn attachment_formats(&self) -> &[vk::Format] {
        &self.attachment_formats
    }

    #[inline]
    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
