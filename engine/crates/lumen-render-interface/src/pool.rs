use lumen_gfx::backend::GfxBackend;
use lumen_gfx::{GfxError, GfxResult};

use crate::handle::Handle;
use crate::ring_buffer::RingBuffer;

/// 每种 GPU 资源共同的能力：从 desc 创建，显式销毁
pub trait GfxResource: Sized {
    /// 用于日志和错误信息
    const KIND: &'static str;
    type Desc: ?Sized;

    fn create(gfx: &mut dyn GfxBackend, desc: &Self::Desc) -> GfxResult<Self>;
    fn destroy(self, gfx: &mut dyn GfxBackend);
}

/// 带 generation 的资源池
///
/// - 对于任意存活的句柄 `h`：`generations[h.index] == h.generation`
/// - 销毁之后该 slot 的 generation 递增，旧句柄再也无法解析
/// - free-list 中的 index 对应的 slot 一定是空的
/// - generation 即将回绕的 slot 会被永久弃用，而不是放回 free-list
///
/// 通过 [`Pool::get`] 拿到的引用借用了整个 pool，在同一个 pool 上调用
/// [`Pool::destroy`] 之前必须放弃这个引用：
///
/// ```compile_fail
/// use lumen_gfx::headless::headless_backend::HeadlessBackend;
/// use lumen_gfx::resources::buffer::GfxBufferDesc;
/// use lumen_render_interface::pool::Pool;
/// use lumen_render_interface::resources::buffer::GfxBuffer;
///
/// let mut gfx = HeadlessBackend::new();
/// let mut pool = Pool::<GfxBuffer>::new();
/// let handle = pool.create(&mut gfx, &GfxBufferDesc::new_stage(16, "stage")).unwrap();
///
/// let buffer = pool.get(handle).unwrap();
/// pool.destroy(&mut gfx, handle).unwrap();
/// println!("{:?}", buffer.vk_buffer());
/// ```
pub struct Pool<T> {
    slots: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: RingBuffer<u32>,

    capacity: usize,
    live: usize,
    retired: usize,
}

// new & init
impl<T: GfxResource> Pool<T> {
    pub const DEFAULT_CAPACITY: usize = 65536;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity <= u32::MAX as usize, "invalid pool capacity {capacity}");
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: RingBuffer::with_capacity(capacity),
            capacity,
            live: 0,
            retired: 0,
        }
    }
}

impl<T: GfxResource> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

// getters
impl<T: GfxResource> Pool<T> {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前存活的资源数量
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// 因 generation 用尽而弃用的 slot 数量
    #[inline]
    pub fn retired_count(&self) -> usize {
        self.retired
    }

    #[inline]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// 过期、未分配或 null 的句柄返回 None
    #[inline]
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let index = handle.index() as usize;
        if self.generations.get(index) != Some(&handle.generation()) {
            return None;
        }
        self.slots[index].as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let index = handle.index() as usize;
        if self.generations.get(index) != Some(&handle.generation()) {
            return None;
        }
        self.slots[index].as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref().map(|value| (Handle::new(index as u32, self.generations[index]), value))
        })
    }
}

// tools
impl<T: GfxResource> Pool<T> {
    /// 通过 desc 创建资源并放入 pool
    pub fn create(&mut self, gfx: &mut dyn GfxBackend, desc: &T::Desc) -> GfxResult<Handle<T>> {
        if !self.has_vacancy() {
            return Err(self.exhausted());
        }
        let value = T::create(gfx, desc)?;
        self.insert(gfx, value)
    }

    /// 放入一个在外部构建好的资源
    ///
    /// pool 已满时资源会被销毁
    pub fn insert(&mut self, gfx: &mut dyn GfxBackend, value: T) -> GfxResult<Handle<T>> {
        let index = match self.free_list.pop() {
            Some(index) => index as usize,
            None if self.slots.len() < self.capacity => {
                self.slots.push(None);
                self.generations.push(1);
                self.slots.len() - 1
            }
            None => {
                value.destroy(gfx);
                return Err(self.exhausted());
            }
        };

        debug_assert!(self.slots[index].is_none(), "free-list returned occupied slot {index}");
        self.slots[index] = Some(value);
        self.live += 1;
        Ok(Handle::new(index as u32, self.generations[index]))
    }

    /// 销毁资源，释放对应的 GPU 对象
    ///
    /// 过期的句柄（包括重复销毁）返回 [`GfxError::StaleHandle`]
    pub fn destroy(&mut self, gfx: &mut dyn GfxBackend, handle: Handle<T>) -> GfxResult<()> {
        let value = self.remove(handle).ok_or_else(|| Self::stale(handle))?;
        value.destroy(gfx);
        Ok(())
    }

    /// 从 pool 中取出资源而不销毁它，slot 同样会失效
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        self.get(handle)?;
        let index = handle.index() as usize;
        let value = self.slots[index].take();
        self.live -= 1;

        let generation = self.generations[index].wrapping_add(1);
        self.generations[index] = generation;
        if generation == 0 {
            // 回绕之后旧句柄可能重新生效，直接弃用这个 slot
            self.retired += 1;
            log::warn!("{} pool slot {} retired after exhausting its generations", T::KIND, index);
        } else if let Err(index) = self.free_list.push(index as u32) {
            debug_assert!(false, "{} pool free-list overflow at slot {}", T::KIND, index);
            log::error!("{} pool free-list overflow at slot {}", T::KIND, index);
        }
        value
    }

    /// 销毁所有存活的资源，返回销毁的数量
    pub fn destroy_all(&mut self, gfx: &mut dyn GfxBackend) -> usize {
        let handles: Vec<Handle<T>> = self.iter().map(|(handle, _)| handle).collect();
        for handle in &handles {
            if let Some(value) = self.remove(*handle) {
                value.destroy(gfx);
            }
        }
        if !handles.is_empty() {
            log::debug!("destroyed {} remaining {} resources", handles.len(), T::KIND);
        }
        handles.len()
    }

    #[inline]
    fn has_vacancy(&self) -> bool {
        !self.free_list.is_empty() || self.slots.len() < self.capacity
    }

    #[inline]
    fn exhausted(&self) -> GfxError {
        GfxError::PoolExhausted {
            kind: T::KIND,
            capacity: self.capacity,
        }
    }

    #[inline]
    fn stale(handle: Handle<T>) -> GfxError {
        GfxError::StaleHandle {
            kind: T::KIND,
            handle: handle.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_gfx::headless::headless_backend::HeadlessBackend;

    /// 只记录自己的值，销毁时计数
    #[derive(Debug, PartialEq)]
    struct Marker(u32);
    impl GfxResource for Marker {
        const KIND: &'static str = "marker";
        type Desc = u32;

        fn create(_gfx: &mut dyn GfxBackend, desc: &u32) -> GfxResult<Self> {
            Ok(Self(*desc))
        }

        fn destroy(self, _gfx: &mut dyn GfxBackend) {}
    }

    #[test]
    fn reused_slot_invalidates_old_handle() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<Marker>::with_capacity(4);

        let old = pool.create(&mut gfx, &1).unwrap();
        pool.destroy(&mut gfx, old).unwrap();
        let new = pool.create(&mut gfx, &2).unwrap();

        assert_eq!(new.index(), old.index());
        assert_eq!(new.generation(), old.generation() + 1);
        assert_eq!(pool.get(old), None);
        assert_eq!(pool.get(new), Some(&Marker(2)));
    }

    #[test]
    fn double_destroy_is_rejected() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<Marker>::with_capacity(4);

        let handle = pool.create(&mut gfx, &7).unwrap();
        pool.destroy(&mut gfx, handle).unwrap();
        let err = pool.destroy(&mut gfx, handle).unwrap_err();

        assert!(matches!(err, GfxError::StaleHandle { kind: "marker", .. }));
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn double_destroy_after_reuse_does_not_touch_the_new_resource() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<Marker>::with_capacity(1);

        let old = pool.create(&mut gfx, &1).unwrap();
        pool.destroy(&mut gfx, old).unwrap();
        let new = pool.create(&mut gfx, &2).unwrap();

        assert!(pool.destroy(&mut gfx, old).is_err());
        assert!(pool.contains(new));
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<Marker>::with_capacity(2);

        pool.create(&mut gfx, &1).unwrap();
        let second = pool.create(&mut gfx, &2).unwrap();
        assert!(matches!(pool.create(&mut gfx, &3), Err(GfxError::PoolExhausted { capacity: 2, .. })));

        pool.destroy(&mut gfx, second).unwrap();
        assert!(pool.create(&mut gfx, &3).is_ok());
    }

    #[test]
    fn null_and_foreign_handles_never_resolve() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<Marker>::with_capacity(4);
        pool.create(&mut gfx, &1).unwrap();

        assert!(pool.get(Handle::null()).is_none());
        assert!(pool.get(Handle::new(3, 1)).is_none());
        assert!(pool.get(Handle::new(0, 2)).is_none());
    }

    #[test]
    fn free_list_holds_exactly_the_empty_slots() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<Marker>::with_capacity(8);

        let handles: Vec<_> = (0..5).map(|i| pool.create(&mut gfx, &i).unwrap()).collect();
        for handle in handles.iter().step_by(2) {
            pool.destroy(&mut gfx, *handle).unwrap();
        }

        assert_eq!(pool.live_count(), 2);
        assert_eq!(pool.free_list.len(), 3);
        for index in 0..pool.slots.len() {
            let is_free = pool.slots[index].is_none();
            assert_eq!(is_free, [0, 2, 4].contains(&index));
        }
        let live: Vec<u32> = pool.iter().map(|(_, m)| m.0).collect();
        assert_eq!(live, vec![1, 3]);
    }

    #[test]
    fn slot_is_retired_instead_of_wrapping() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<Marker>::with_capacity(2);

        let handle = pool.create(&mut gfx, &1).unwrap();
        pool.generations[handle.index() as usize] = u32::MAX;
        let last = Handle::new(handle.index(), u32::MAX);
        pool.destroy(&mut gfx, last).unwrap();

        assert_eq!(pool.retired_count(), 1);
        let next = pool.create(&mut gfx, &2).unwrap();
        assert_ne!(next.index(), handle.index());
        assert!(matches!(pool.create(&mut gfx, &3), Err(GfxError::PoolExhausted { .. })));
    }

    #[test]
    fn destroy_all_empties_the_pool() {
        let mut gfx = HeadlessBackend::new();
        let mut pool = Pool::<Marker>::with_capacity(8);
        let handles: Vec<_> = (0..4).map(|i| pool.create(&mut gfx, &i).unwrap()).collect();

        assert_eq!(pool.destroy_all(&mut gfx), 4);
        assert_eq!(pool.live_count(), 0);
        assert!(handles.iter().all(|h| !pool.contains(*h)));
    }
}
