use ash::vk;
use lumen_gfx::backend::{GfxAllocationKey, GfxBackend};
use lumen_gfx::resources::image::GfxImageDesc;
use lumen_gfx::{GfxError, GfxResult};

use crate::pool::GfxResource;

/// 一张 image 最多缓存的 view 数量
pub const MAX_IMAGE_VIEWS: usize = 3;

/// 像素数据
///
/// view 按 format 缓存，第一次请求时创建，之后一直复用，直到 image 被销毁。
/// 非 mutable-format 的 image 只能创建和自身 format 相同的 view。
///
/// preallocated 的 image（例如 presentation image）不属于这里，销毁时只会销毁它的 view。
pub struct GfxImage {
    image: vk::Image,
    /// None 表示 preallocated
    allocation: Option<GfxAllocationKey>,

    extent: vk::Extent2D,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mutable_format: bool,

    views: [Option<(vk::Format, vk::ImageView)>; MAX_IMAGE_VIEWS],

    name: String,
}

impl GfxResource for GfxImage {
    const KIND: &'static str = "image";
    type Desc = GfxImageDesc;

    fn create(gfx: &mut dyn GfxBackend, desc: &GfxImageDesc) -> GfxResult<Self> {
        let alloc = gfx.create_image(desc)?;
        Ok(Self {
            image: alloc.image,
            allocation: Some(alloc.allocation),
            extent: desc.extent,
            format: desc.format,
            aspect: desc.aspect,
            mutable_format: desc.mutable_format,
            views: [None; MAX_IMAGE_VIEWS],
            name: desc.name.clone(),
        })
    }

    fn destroy(mut self, gfx: &mut dyn GfxBackend) {
        self.destroy_views(gfx);
        if let Some(allocation) = self.allocation {
            log::debug!("destroy image {}", self.name);
            gfx.destroy_image(self.image, allocation);
        }
    }
}

// new & init
impl GfxImage {
    /// 包装一张不属于自己的 image，销毁时不会释放它的内存
    pub fn from_preallocated(
        image: vk::Image,
        extent: vk::Extent2D,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        name: impl Into<String>,
    ) -> Self {
        Self {
            image,
            allocation: None,
            extent,
            format,
            aspect,
            mutable_format: false,
            views: [None; MAX_IMAGE_VIEWS],
            name: name.into(),
        }
    }
}

// getters
impl GfxImage {
    #[inline]
    pub fn vk_image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn allocation(&self) -> Option<GfxAllocationKey> {
        self.allocation
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    #[inline]
    pub fn is_mutable_format(&self) -> bool {
        self.mutable_format
    }

    #[inline]
    pub fn is_preallocated(&self) -> bool {
        self.allocation.is_none()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 已经创建的 view
    #[inline]
    pub fn view(&self, format: vk::Format) -> Option<vk::ImageView> {
        self.views.iter().flatten().find(|(f, _)| *f == format).map(|(_, view)| *view)
    }

    #[inline]
    pub fn view_count(&self) -> usize {
        self.views.iter().flatten().count()
    }
}

// tools
impl GfxImage {
    /// 同一个 format 总是返回同一个 view
    pub fn get_or_create_view(&mut self, gfx: &mut dyn GfxBackend, format: vk::Format) -> GfxResult<vk::ImageView> {
        if let Some(view) = self.view(format) {
            return Ok(view);
        }

        if !self.mutable_format && format != self.format {
            return Err(self.reject(format, "image was not created with a mutable format"));
        }
        let Some(slot) = self.views.iter().position(Option::is_none) else {
            return Err(self.reject(format, "image view cache is full"));
        };

        let view = gfx.create_image_view(self.image, format, self.aspect)?;
        debug_assert!(self.views.iter().flatten().all(|(f, v)| *f != format && *v != view));
        self.views[slot] = Some((format, view));
        Ok(view)
    }

    /// 使用 image 自身 format 的 view
    #[inline]
    pub fn default_view(&mut self, gfx: &mut dyn GfxBackend) -> GfxResult<vk::ImageView> {
        self.get_or_create_view(gfx, self.format)
    }

    #[inline]
    pub fn add_view_format(&mut self, gfx: &mut dyn GfxBackend, format: vk::Format) -> GfxResult<()> {
        self.get_or_create_view(gfx, format).map(|_| ())
    }

    /// 只销毁 view，image 本身保留
    pub fn destroy_views(&mut self, gfx: &mut dyn GfxBackend) {
        for (_, view) in self.views.iter_mut().filter_map(Option::take) {
            gfx.destroy_image_view(view);
        }
    }

    fn reject(&self, format: vk::Format, reason: &'static str) -> GfxError {
        GfxError::ViewFormatRejected {
            image: self.name.clone(),
            format,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_gfx::headless::headless_backend::HeadlessBackend;

    fn color_desc(mutable: bool) -> GfxImageDesc {
        GfxImageDesc::new_color_target(
            vk::Extent2D {
                width: 4,
                height: 4,
            },
            vk::Format::R8G8B8A8_UNORM,
            "color",
        )
        .mutable_format(mutable)
    }

    #[test]
    fn same_format_returns_the_same_view() {
        let mut gfx = HeadlessBackend::new();
        let mut image = GfxImage::create(&mut gfx, &color_desc(false)).unwrap();

        let first = image.get_or_create_view(&mut gfx, vk::Format::R8G8B8A8_UNORM).unwrap();
        let second = image.get_or_create_view(&mut gfx, vk::Format::R8G8B8A8_UNORM).unwrap();

        assert_eq!(first, second);
        assert_eq!(image.view_count(), 1);
        assert_eq!(gfx.live_objects().image_views, 1);
        image.destroy(&mut gfx);
    }

    #[test]
    fn non_mutable_image_rejects_a_second_format() {
        let mut gfx = HeadlessBackend::new();
        let mut image = GfxImage::create(&mut gfx, &color_desc(false)).unwrap();

        image.default_view(&mut gfx).unwrap();
        let err = image.get_or_create_view(&mut gfx, vk::Format::R8G8B8A8_SRGB).unwrap_err();

        assert!(matches!(err, GfxError::ViewFormatRejected { format: vk::Format::R8G8B8A8_SRGB, .. }));
        assert_eq!(image.view_count(), 1);
        image.destroy(&mut gfx);
    }

    #[test]
    fn mutable_image_caches_up_to_three_formats() {
        let mut gfx = HeadlessBackend::new();
        let mut image = GfxImage::create(&mut gfx, &color_desc(true)).unwrap();

        let formats = [vk::Format::R8G8B8A8_UNORM, vk::Format::R8G8B8A8_SRGB, vk::Format::R32_SFLOAT];
        let views: Vec<_> = formats.iter().map(|f| image.get_or_create_view(&mut gfx, *f).unwrap()).collect();
        assert_eq!(image.view(vk::Format::R8G8B8A8_SRGB), Some(views[1]));
        assert_eq!(image.get_or_create_view(&mut gfx, vk::Format::R32_SFLOAT).unwrap(), views[2]);

        let err = image.get_or_create_view(&mut gfx, vk::Format::R8_UNORM).unwrap_err();
        assert!(matches!(err, GfxError::ViewFormatRejected { reason: "image view cache is full", .. }));
        assert_eq!(gfx.live_objects().image_views, 3);

        image.destroy(&mut gfx);
        assert_eq!(gfx.live_objects().image_views, 0);
        assert_eq!(gfx.live_objects().images, 0);
    }

    #[test]
    fn preallocated_image_only_destroys_its_views() {
        let extent = vk::Extent2D {
            width: 8,
            height: 8,
        };
        let mut gfx = HeadlessBackend::with_presentation(extent, 2, vk::Format::B8G8R8A8_UNORM);
        let native = gfx.swapchain_info().unwrap().images[0];

        let mut image = GfxImage::from_preallocated(
            native,
            extent,
            vk::Format::B8G8R8A8_UNORM,
            vk::ImageAspectFlags::COLOR,
            "present-0",
        );
        image.default_view(&mut gfx).unwrap();
        assert!(image.is_preallocated());
        image.destroy(&mut gfx);

        assert_eq!(gfx.live_objects().image_views, 0);
        assert_eq!(gfx.stats().validation_errors, 0);
    }
}
