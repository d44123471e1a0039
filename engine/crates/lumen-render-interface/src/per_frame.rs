use ash::vk;
use lumen_gfx::backend::{GfxBackend, GfxSwapchainInfo};
use lumen_gfx::{GfxError, GfxResult};

use crate::frame_counter::FrameCounter;
use crate::handle::Handle;
use crate::pool::{GfxResource, Pool};
use crate::resources::image::GfxImage;

/// 当前帧使用哪一份资源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PerFrameIndexing {
    /// `frame_id % N`
    FrameSlot,
    /// 本帧 acquire 到的 presentation image 的序号
    ///
    /// presentation image 的数量由 presentation engine 决定，不一定等于 frames in flight
    PresentImage,
}

/// 每个 frame in flight 一份资源
///
/// 每一份都是独立的 pool slot，CPU 在第 k 帧写入的资源不会和第 k-1、k-2 帧共享。
/// 不是 pool 管理的对象，只是一组句柄；销毁它会销毁所有 N 份资源。
pub struct PerFrame<T> {
    handles: Vec<Handle<T>>,
    indexing: PerFrameIndexing,
}

impl<T> Clone for PerFrame<T> {
    fn clone(&self) -> Self {
        Self {
            handles: self.handles.clone(),
            indexing: self.indexing,
        }
    }
}

impl<T> PartialEq for PerFrame<T> {
    fn eq(&self, other: &Self) -> bool {
        self.indexing == other.indexing && self.handles == other.handles
    }
}

impl<T> Eq for PerFrame<T> {}

impl<T> std::fmt::Debug for PerFrame<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerFrame").field("handles", &self.handles).field("indexing", &self.indexing).finish()
    }
}

// new & init
impl<T: GfxResource> PerFrame<T> {
    /// 用同一个 desc 创建 `count` 份独立的资源
    ///
    /// 中途失败时，已经创建的资源会被销毁
    pub fn new(pool: &mut Pool<T>, gfx: &mut dyn GfxBackend, desc: &T::Desc, count: usize) -> GfxResult<Self> {
        if count == 0 {
            return Err(GfxError::InvalidDesc("per-frame resource needs at least one copy".to_string()));
        }
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            match pool.create(gfx, desc) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    for handle in handles {
                        let _ = pool.destroy(gfx, handle);
                    }
                    return Err(err);
                }
            }
        }
        Ok(Self::from_handles(handles, PerFrameIndexing::FrameSlot))
    }

    pub fn from_handles(handles: Vec<Handle<T>>, indexing: PerFrameIndexing) -> Self {
        debug_assert!(!handles.is_empty(), "per-frame resource without any handle");
        Self { handles, indexing }
    }
}

impl PerFrame<GfxImage> {
    /// 包装 presentation engine 拥有的 image，销毁时只会释放 view
    pub fn from_present_images(
        pool: &mut Pool<GfxImage>,
        gfx: &mut dyn GfxBackend,
        info: &GfxSwapchainInfo,
    ) -> GfxResult<Self> {
        if info.images.is_empty() {
            return Err(GfxError::InvalidDesc("presentation engine returned no images".to_string()));
        }
        let mut handles = Vec::with_capacity(info.images.len());
        for (index, image) in info.images.iter().enumerate() {
            let image = GfxImage::from_preallocated(
                *image,
                info.extent,
                info.format,
                vk::ImageAspectFlags::COLOR,
                format!("present-{index}"),
            );
            match pool.insert(gfx, image) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    for handle in handles {
                        let _ = pool.destroy(gfx, handle);
                    }
                    return Err(err);
                }
            }
        }
        Ok(Self::from_handles(handles, PerFrameIndexing::PresentImage))
    }
}

// getters
impl<T> PerFrame<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    #[inline]
    pub fn indexing(&self) -> PerFrameIndexing {
        self.indexing
    }

    #[inline]
    pub fn handle(&self, index: usize) -> Handle<T> {
        self.handles[index]
    }

    #[inline]
    pub fn handles(&self) -> &[Handle<T>] {
        &self.handles
    }

    /// 当前帧的句柄
    ///
    /// `PresentImage` 模式下，本帧还没有 acquire 到 image 时返回 null 句柄
    #[inline]
    pub fn cur_frame_handle(&self, frame: &FrameCounter) -> Handle<T> {
        self.index_of(frame).map_or(Handle::null(), |index| self.handles[index])
    }

    fn index_of(&self, frame: &FrameCounter) -> Option<usize> {
        match self.indexing {
            PerFrameIndexing::FrameSlot => frame.frame_id().checked_rem(self.handles.len() as u64).map(|i| i as usize),
            PerFrameIndexing::PresentImage => {
                frame.present_image_index().map(|i| i as usize).filter(|i| *i < self.handles.len())
            }
        }
    }
}

// tools
impl<T: GfxResource> PerFrame<T> {
    /// 当前帧的资源
    ///
    /// 解析失败说明资源在销毁之后仍然被使用，属于生命周期错误
    pub fn cur_frame_data<'a>(&self, pool: &'a Pool<T>, frame: &FrameCounter) -> GfxResult<&'a T> {
        let handle = self.cur_frame_handle(frame);
        pool.get(handle).ok_or_else(|| Self::torn_down(handle, frame))
    }

    pub fn cur_frame_data_mut<'a>(&self, pool: &'a mut Pool<T>, frame: &FrameCounter) -> GfxResult<&'a mut T> {
        let handle = self.cur_frame_handle(frame);
        pool.get_mut(handle).ok_or_else(|| Self::torn_down(handle, frame))
    }

    /// 所有资源都还存活
    pub fn is_alive(&self, pool: &Pool<T>) -> bool {
        self.handles.iter().all(|h| pool.contains(*h))
    }

    /// 销毁所有 N 份资源，不是幂等的
    ///
    /// 某一份失败时继续销毁其余的，返回第一个错误
    pub fn destroy(self, pool: &mut Pool<T>, gfx: &mut dyn GfxBackend) -> GfxResult<()> {
        let mut result = Ok(());
        for handle in self.handles {
            if let Err(err) = pool.destroy(gfx, handle) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    fn torn_down(handle: Handle<T>, frame: &FrameCounter) -> GfxError {
        log::error!("{} per-frame {} {} does not resolve", frame.frame_name(), T::KIND, handle);
        GfxError::StaleHandle {
            kind: T::KIND,
            handle: handle.to_string(),
        }
    }
}

impl PerFrame<GfxImage> {
    /// 在所有 N 份 image 上添加同一个 view format，保持它们可以互换
    pub fn add_image_view_format(
        &self,
        pool: &mut Pool<GfxImage>,
        gfx: &mut dyn GfxBackend,
        format: vk::Format,
    ) -> GfxResult<()> {
        for handle in &self.handles {
            let image = pool.get_mut(*handle).ok_or_else(|| GfxError::StaleHandle {
                kind: GfxImage::KIND,
                handle: handle.to_string(),
            })?;
            image.add_view_format(gfx, format)?;
        }
        Ok(())
    }

    /// 当前帧 image 上已经创建的 view
    pub fn image_view_by_format(
        &self,
        pool: &Pool<GfxImage>,
        frame: &FrameCounter,
        format: vk::Format,
    ) -> Option<vk::ImageView> {
        pool.get(self.cur_frame_handle(frame))?.view(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_gfx::headless::headless_backend::{HeadlessBackend, HeadlessObjectCounts};
    use lumen_gfx::resources::buffer::{GfxBufferDesc, GfxMemoryLocation};
    use lumen_gfx::resources::image::GfxImageDesc;

    use crate::resources::buffer::GfxBuffer;

    fn marker_buffer_desc() -> GfxBufferDesc {
        GfxBufferDesc::new(4, vk::BufferUsageFlags::UNIFORM_BUFFER, "per-frame-marker")
            .location(GfxMemoryLocation::HostVisible)
    }

    #[test]
    fn frames_write_into_isolated_resources() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<GfxBuffer>::with_capacity(16);
        let mut frame = FrameCounter::new(3);
        let buffers = PerFrame::new(&mut pool, &mut gfx, &marker_buffer_desc(), 3).unwrap();

        for marker in 0..3u32 {
            let allocation = buffers.cur_frame_data(&pool, &frame).unwrap().allocation();
            gfx.write_buffer(allocation, 0, &(100 + marker).to_le_bytes()).unwrap();
            frame.next_frame();
        }

        // 一整个循环之后回到第一份资源，之前每一帧写入的值都还在
        for marker in 0..3u32 {
            let allocation = buffers.cur_frame_data(&pool, &frame).unwrap().allocation();
            let bytes = gfx.read_buffer(allocation, 0, 4).unwrap();
            assert_eq!(u32::from_le_bytes(bytes.try_into().unwrap()), 100 + marker);
            frame.next_frame();
        }

        let distinct: std::collections::HashSet<_> = buffers.handles().iter().map(|h| h.index()).collect();
        assert_eq!(distinct.len(), 3);

        buffers.destroy(&mut pool, &mut gfx).unwrap();
        assert_eq!(pool.live_count(), 0);
        assert_eq!(gfx.live_objects().buffers, 0);
    }

    #[test]
    fn destroyed_per_frame_fails_loudly() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<GfxBuffer>::with_capacity(16);
        let frame = FrameCounter::new(2);
        let buffers = PerFrame::new(&mut pool, &mut gfx, &marker_buffer_desc(), 2).unwrap();
        let stale = buffers.clone();

        buffers.destroy(&mut pool, &mut gfx).unwrap();

        assert!(!stale.is_alive(&pool));
        assert!(matches!(stale.cur_frame_data(&pool, &frame), Err(GfxError::StaleHandle { kind: "buffer", .. })));
        assert!(stale.destroy(&mut pool, &mut gfx).is_err());
    }

    #[test]
    fn creation_failure_releases_partial_copies() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<GfxBuffer>::with_capacity(2);

        let err = PerFrame::new(&mut pool, &mut gfx, &marker_buffer_desc(), 3).unwrap_err();

        assert!(matches!(err, GfxError::PoolExhausted { .. }));
        assert_eq!(pool.live_count(), 0);
        assert_eq!(gfx.live_objects().buffers, 0);
    }

    #[test]
    fn zero_copies_is_rejected() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<GfxBuffer>::with_capacity(4);

        let err = PerFrame::new(&mut pool, &mut gfx, &marker_buffer_desc(), 0).unwrap_err();

        assert!(matches!(err, GfxError::InvalidDesc(_)));
        assert_eq!(pool.live_count(), 0);
        assert_eq!(gfx.live_objects().buffers, 0);
    }

    #[test]
    fn present_images_follow_the_acquired_index() {
        let extent = vk::Extent2D {
            width: 32,
            height: 32,
        };
        let mut gfx = HeadlessBackend::with_presentation(extent, 2, vk::Format::B8G8R8A8_UNORM);
        let mut pool = Pool::<GfxImage>::with_capacity(8);
        let mut frame = FrameCounter::new(3);
        let info = gfx.swapchain_info().unwrap();

        let images = PerFrame::from_present_images(&mut pool, &mut gfx, &info).unwrap();
        assert_eq!(images.len(), 2);
        assert!(images.cur_frame_handle(&frame).is_null());

        frame.set_present_image_index(Some(1));
        let image = images.cur_frame_data(&pool, &frame).unwrap();
        assert_eq!(image.vk_image(), info.images[1]);
        assert!(image.is_preallocated());

        images.add_image_view_format(&mut pool, &mut gfx, vk::Format::B8G8R8A8_UNORM).unwrap();
        assert!(images.image_view_by_format(&pool, &frame, vk::Format::B8G8R8A8_UNORM).is_some());
        assert_eq!(gfx.live_objects().image_views, 2);

        images.destroy(&mut pool, &mut gfx).unwrap();
        assert_eq!(gfx.live_objects().image_views, 0);
        assert_eq!(gfx.stats().validation_errors, 0);
    }

    #[test]
    fn view_formats_are_added_to_every_copy() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<GfxImage>::with_capacity(8);
        let mut frame = FrameCounter::new(3);
        let desc = GfxImageDesc::new_color_target(
            vk::Extent2D {
                width: 16,
                height: 16,
            },
            vk::Format::R8G8B8A8_UNORM,
            "hdr",
        )
        .mutable_format(true);
        let images = PerFrame::new(&mut pool, &mut gfx, &desc, 3).unwrap();

        images.add_image_view_format(&mut pool, &mut gfx, vk::Format::R8G8B8A8_SRGB).unwrap();

        for _ in 0..3 {
            assert!(images.image_view_by_format(&pool, &frame, vk::Format::R8G8B8A8_SRGB).is_some());
            assert!(images.image_view_by_format(&pool, &frame, vk::Format::R8G8B8A8_UNORM).is_none());
            frame.next_frame();
        }
        assert_eq!(gfx.live_objects().image_views, 3);

        images.destroy(&mut pool, &mut gfx).unwrap();
        assert_eq!(gfx.live_objects(), HeadlessObjectCounts::default());
    }
}
