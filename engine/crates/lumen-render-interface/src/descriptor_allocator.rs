use ash::vk;
use lumen_gfx::backend::GfxBackend;
use lumen_gfx::descriptors::descriptor::GfxDescriptorPoolDesc;
use lumen_gfx::{GfxError, GfxResult};
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    pub struct DescriptorPoolKey;
}

/// 记录了签发它的 pool，释放时归还给同一个 pool
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxDescriptorSet {
    set: vk::DescriptorSet,
    layout: vk::DescriptorSetLayout,
    pool: DescriptorPoolKey,
}

// getters
impl GfxDescriptorSet {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSet {
        self.set
    }

    #[inline]
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn pool(&self) -> DescriptorPoolKey {
        self.pool
    }
}

struct DescriptorPoolEntry {
    pool: vk::DescriptorPool,
    allocated: u32,
}

/// descriptor set 分配器
///
/// 当前 pool 耗尽时先尝试还有空位的旧 pool，都不行再新建一个 pool 并重试一次。
/// 旧的 pool 在上面的 set 全部被释放后销毁。
pub struct DescriptorAllocator {
    pools: SlotMap<DescriptorPoolKey, DescriptorPoolEntry>,
    /// 新的分配从这个 pool 开始
    current: Option<DescriptorPoolKey>,
    pool_desc: GfxDescriptorPoolDesc,
}

// new & init
impl DescriptorAllocator {
    pub fn new(pool_desc: GfxDescriptorPoolDesc) -> Self {
        Self {
            pools: SlotMap::with_key(),
            current: None,
            pool_desc,
        }
    }
}

// getters
impl DescriptorAllocator {
    #[inline]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// 还没有被释放的 set 的数量
    #[inline]
    pub fn allocated_count(&self) -> usize {
        self.pools.values().map(|p| p.allocated as usize).sum()
    }
}

// tools
impl DescriptorAllocator {
    pub fn allocate(&mut self, gfx: &mut dyn GfxBackend, layout: vk::DescriptorSetLayout) -> GfxResult<GfxDescriptorSet> {
        let key = match self.current {
            Some(key) => key,
            None => self.grow(gfx)?,
        };
        match self.allocate_from(gfx, key, layout) {
            Err(err) if err.is_descriptor_pool_exhausted() => {}
            result => return result,
        }

        // 先回到还有空位的旧 pool
        let max_sets = self.pool_desc.max_sets;
        let candidates: Vec<_> =
            self.pools.iter().filter(|(k, entry)| *k != key && entry.allocated < max_sets).map(|(k, _)| k).collect();
        for candidate in candidates {
            match self.allocate_from(gfx, candidate, layout) {
                Ok(set) => {
                    self.current = Some(candidate);
                    return Ok(set);
                }
                Err(err) if err.is_descriptor_pool_exhausted() => continue,
                Err(err) => return Err(err),
            }
        }

        log::info!("descriptor pools exhausted after {} sets each, allocating a new one", max_sets);
        let key = self.grow(gfx)?;
        self.allocate_from(gfx, key, layout)
    }

    /// 把 set 归还给签发它的 pool
    ///
    /// 不是当前 pool 的 pool 空了之后立即销毁
    pub fn free(&mut self, gfx: &mut dyn GfxBackend, set: GfxDescriptorSet) -> GfxResult<()> {
        let entry = self
            .pools
            .get_mut(set.pool)
            .ok_or_else(|| GfxError::InvalidDesc(format!("descriptor set {:?} outlived its pool", set.set)))?;
        gfx.free_descriptor_set(entry.pool, set.set)?;
        entry.allocated -= 1;

        if entry.allocated == 0 && self.current != Some(set.pool) {
            if let Some(entry) = self.pools.remove(set.pool) {
                gfx.destroy_descriptor_pool(entry.pool);
                log::debug!("destroy empty descriptor pool {:?}", entry.pool);
            }
        }
        Ok(())
    }

    /// 销毁所有 pool，上面分配的 set 一起失效
    pub fn destroy(&mut self, gfx: &mut dyn GfxBackend) {
        for (_, entry) in self.pools.drain() {
            gfx.destroy_descriptor_pool(entry.pool);
        }
        self.current = None;
    }

    fn allocate_from(
        &mut self,
        gfx: &mut dyn GfxBackend,
        key: DescriptorPoolKey,
        layout: vk::DescriptorSetLayout,
    ) -> GfxResult<GfxDescriptorSet> {
        let entry = &mut self.pools[key];
        let set = gfx.allocate_descriptor_set(entry.pool, layout)?;
        entry.allocated += 1;
        Ok(GfxDescriptorSet { set, layout, pool: key })
    }

    fn grow(&mut self, gfx: &mut dyn GfxBackend) -> GfxResult<DescriptorPoolKey> {
        let pool = gfx.create_descriptor_pool(&self.pool_desc)?;
        let key = self.pools.insert(DescriptorPoolEntry { pool, allocated: 0 });
        self.current = Some(key);
        Ok(key)
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        debug_assert!(self.pools.is_empty(), "descriptor allocator dropped without destroy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_gfx::descriptors::descriptor::{GfxDescriptorBinding, GfxDescriptorSetLayoutDesc};
    use lumen_gfx::headless::headless_backend::HeadlessBackend;

    fn setup() -> (HeadlessBackend, vk::DescriptorSetLayout, DescriptorAllocator) {
        setup_with(1)
    }

    fn setup_with(max_sets: u32) -> (HeadlessBackend, vk::DescriptorSetLayout, DescriptorAllocator) {
        let mut gfx = HeadlessBackend::new();
        let layout = gfx
            .create_descriptor_set_layout(&GfxDescriptorSetLayoutDesc::new(vec![GfxDescriptorBinding::new(
                0,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )]))
            .unwrap();
        let allocator = DescriptorAllocator::new(GfxDescriptorPoolDesc {
            max_sets,
            ..Default::default()
        });
        (gfx, layout, allocator)
    }

    #[test]
    fn exhaustion_grows_a_new_pool() {
        let (mut gfx, layout, mut allocator) = setup();

        let first = allocator.allocate(&mut gfx, layout).unwrap();
        let second = allocator.allocate(&mut gfx, layout).unwrap();

        assert_ne!(first.pool(), second.pool());
        assert_eq!(allocator.pool_count(), 2);
        assert_eq!(allocator.allocated_count(), 2);
        assert_eq!(gfx.live_objects().descriptor_sets, 2);

        allocator.destroy(&mut gfx);
        assert_eq!(gfx.live_objects().descriptor_pools, 0);
    }

    #[test]
    fn sets_are_freed_to_the_pool_that_issued_them() {
        let (mut gfx, layout, mut allocator) = setup();
        let first = allocator.allocate(&mut gfx, layout).unwrap();
        let second = allocator.allocate(&mut gfx, layout).unwrap();

        // first 来自较早的 pool，而不是当前的 pool
        allocator.free(&mut gfx, first).unwrap();
        // 较早的 pool 空了，随即销毁
        assert_eq!(allocator.pool_count(), 1);
        allocator.free(&mut gfx, second).unwrap();
        assert_eq!(allocator.pool_count(), 1);

        assert_eq!(allocator.allocated_count(), 0);
        assert_eq!(gfx.live_objects().descriptor_sets, 0);
        assert_eq!(gfx.stats().validation_errors, 0);
        allocator.destroy(&mut gfx);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let (mut gfx, _, mut allocator) = setup();

        let err = allocator.allocate(&mut gfx, vk::DescriptorSetLayout::null()).unwrap_err();

        assert!(matches!(err, GfxError::InvalidDesc(_)));
        assert_eq!(allocator.pool_count(), 1);
        allocator.destroy(&mut gfx);
    }

    #[test]
    fn alternating_load_does_not_pile_up_pools() {
        let (mut gfx, layout, mut allocator) = setup_with(2);

        for _ in 0..10 {
            let sets: Vec<_> = (0..3).map(|_| allocator.allocate(&mut gfx, layout).unwrap()).collect();
            assert!(allocator.pool_count() <= 2);
            for set in sets {
                allocator.free(&mut gfx, set).unwrap();
            }
            assert!(allocator.pool_count() <= 2);
        }

        assert_eq!(allocator.allocated_count(), 0);
        assert!(gfx.live_objects().descriptor_pools <= 2);
        assert_eq!(gfx.stats().validation_errors, 0);
        allocator.destroy(&mut gfx);
        assert_eq!(gfx.live_objects().descriptor_pools, 0);
    }

    #[test]
    fn older_pool_with_room_is_reused() {
        let (mut gfx, layout, mut allocator) = setup_with(2);
        let a = allocator.allocate(&mut gfx, layout).unwrap();
        let _b = allocator.allocate(&mut gfx, layout).unwrap();
        let c = allocator.allocate(&mut gfx, layout).unwrap();
        assert_ne!(a.pool(), c.pool());

        allocator.free(&mut gfx, a).unwrap();
        // c 所在的 pool 还剩一个空位
        let d = allocator.allocate(&mut gfx, layout).unwrap();
        assert_eq!(d.pool(), c.pool());
        // 之后回到 a 原来的 pool，而不是新建
        let e = allocator.allocate(&mut gfx, layout).unwrap();
        assert_eq!(e.pool(), a.pool());
        assert_eq!(allocator.pool_count(), 2);

        allocator.destroy(&mut gfx);
    }
}
