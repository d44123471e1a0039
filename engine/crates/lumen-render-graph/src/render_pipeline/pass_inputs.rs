use ash::vk;
use lumen_gfx::descriptors::descriptor::GfxDescriptorWrite;
use lumen_gfx::{GfxError, GfxResult};
use lumen_render_interface::descriptor_allocator::GfxDescriptorSet;
use lumen_render_interface::frame_counter::FrameCounter;
use lumen_render_interface::per_frame::PerFrame;
use lumen_render_interface::pool::GfxResource;
use lumen_render_interface::render_context::RenderContext;
use lumen_render_interface::resources::image::GfxImage;

/// 采样上游 pass 输出的 descriptor set，每个 frame in flight 一个
///
/// binding `i` 对应 `sources[i]`，所有 binding 都是 combined image sampler。
/// 上游的 per-frame image 换了一组句柄（例如 resize 之后）才会重建 set，
/// 同一组句柄每帧重复设置不会产生任何 GPU 调用。
pub struct PassInputs {
    name: String,
    sources: Vec<Option<PerFrame<GfxImage>>>,
    sets: Vec<GfxDescriptorSet>,
    dirty: bool,
}

// new & init
impl PassInputs {
    pub fn new(name: impl Into<String>, binding_count: usize) -> Self {
        Self {
            name: name.into(),
            sources: vec![None; binding_count],
            sets: Vec::new(),
            dirty: true,
        }
    }
}

// getters
impl PassInputs {
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn source(&self, binding: usize) -> Option<&PerFrame<GfxImage>> {
        self.sources.get(binding).and_then(Option::as_ref)
    }

    /// 当前帧使用的 set，还没有 prepare 时为 None
    pub fn cur_frame_set(&self, frame: &FrameCounter) -> Option<vk::DescriptorSet> {
        if self.sets.is_empty() || self.dirty {
            return None;
        }
        Some(self.sets[frame.frame_id() as usize % self.sets.len()].handle())
    }
}

// tools
impl PassInputs {
    /// 只有句柄发生变化时才标记为需要重建
    pub fn set_source(&mut self, binding: usize, images: &PerFrame<GfxImage>) {
        let Some(slot) = self.sources.get_mut(binding) else {
            log::error!("pass inputs '{}' has no binding {}", self.name, binding);
            return;
        };
        if slot.as_ref() != Some(images) {
            *slot = Some(images.clone());
            self.dirty = true;
        }
    }

    /// 需要时重新分配并写入所有的 set
    pub fn prepare(&mut self, ctx: &mut RenderContext, layout: vk::DescriptorSetLayout, sampler: vk::Sampler) -> GfxResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let sources: Vec<PerFrame<GfxImage>> = self
            .sources
            .iter()
            .enumerate()
            .map(|(binding, source)| {
                source.clone().ok_or_else(|| {
                    GfxError::InvalidDesc(format!("pass inputs '{}' binding {} has no source", self.name, binding))
                })
            })
            .collect::<GfxResult<_>>()?;

        self.free_sets(ctx)?;

        let frame_count = sources.first().map_or(0, PerFrame::len);
        for frame in 0..frame_count {
            let set = ctx.allocate_descriptor_set(layout)?;
            self.sets.push(set);

            let mut writes = Vec::with_capacity(sources.len());
            for (binding, images) in sources.iter().enumerate() {
                let handle = images.handle(frame);
                let format = ctx
                    .image(handle)
                    .map(|image| image.format())
                    .ok_or_else(|| GfxError::StaleHandle {
                        kind: GfxImage::KIND,
                        handle: handle.to_string(),
                    })?;
                let view = ctx.image_view(handle, format)?;
                writes.push(GfxDescriptorWrite::sampled_image(set.handle(), binding as u32, view, sampler));
            }
            ctx.update_descriptors(&writes);
        }

        self.dirty = false;
        log::debug!("pass inputs '{}' rebuilt {} descriptor sets", self.name, frame_count);
        Ok(())
    }

    pub fn destroy(&mut self, ctx: &mut RenderContext) -> GfxResult<()> {
        self.sources.iter_mut().for_each(|source| *source = None);
        self.dirty = true;
        self.free_sets(ctx)
    }

    fn free_sets(&mut self, ctx: &mut RenderContext) -> GfxResult<()> {
        for set in self.sets.drain(..) {
            ctx.free_descriptor_set(set)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_gfx::backend::GfxBackend;
    use lumen_gfx::descriptors::descriptor::{GfxDescriptorBinding, GfxDescriptorSetLayoutDesc};
    use lumen_gfx::headless::headless_backend::HeadlessBackend;
    use lumen_gfx::resources::image::GfxImageDesc;
    use lumen_render_interface::render_context::RenderContextSettings;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn sets_are_rebuilt_only_when_the_source_changes() {
        let mut ctx = RenderContext::new(Box::new(HeadlessBackend::new()), RenderContextSettings::default()).unwrap();
        let layout = ctx
            .gfx_mut()
            .create_descriptor_set_layout(&GfxDescriptorSetLayoutDesc::new(vec![GfxDescriptorBinding::new(
                0,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )]))
            .unwrap();
        let desc = GfxImageDesc::new_color_target(extent(64, 64), vk::Format::R8G8B8A8_UNORM, "input");
        let images = ctx.create_per_frame_images(&desc).unwrap();

        let mut inputs = PassInputs::new("test", 1);
        assert!(inputs.prepare(&mut ctx, layout, vk::Sampler::null()).is_err());

        inputs.set_source(0, &images);
        inputs.prepare(&mut ctx, layout, vk::Sampler::null()).unwrap();
        assert_eq!(ctx.live_resource_counts().descriptor_sets, 3);
        let first = inputs.cur_frame_set(ctx.frame_counter()).unwrap();

        // 同一组句柄
        inputs.set_source(0, &images.clone());
        assert!(!inputs.is_dirty());
        assert_eq!(inputs.cur_frame_set(ctx.frame_counter()), Some(first));

        let desc = GfxImageDesc::new_color_target(extent(32, 32), vk::Format::R8G8B8A8_UNORM, "input");
        let resized = ctx.create_per_frame_images(&desc).unwrap();
        inputs.set_source(0, &resized);
        assert!(inputs.is_dirty());
        assert_eq!(inputs.cur_frame_set(ctx.frame_counter()), None);
        inputs.prepare(&mut ctx, layout, vk::Sampler::null()).unwrap();
        assert_eq!(ctx.live_resource_counts().descriptor_sets, 3);

        inputs.destroy(&mut ctx).unwrap();
        assert_eq!(ctx.live_resource_counts().descriptor_sets, 0);
        ctx.destroy_per_frame_images(images).unwrap();
        ctx.destroy_per_frame_images(resized).unwrap();
        ctx.gfx_mut().destroy_descriptor_set_layout(layout);
        ctx.destroy();
    }
}
