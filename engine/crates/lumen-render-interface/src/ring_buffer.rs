/// 可以放进 [`RingBuffer`] 的索引类型
pub trait FreeIndex: Copy + Default {
    /// 该类型能表示的索引数量，即 `max + 1`
    const MAX_CAPACITY: usize;

    fn to_usize(self) -> usize;
    fn from_usize(value: usize) -> Self;
}

macro_rules! impl_free_index {
    ($($ty:ty),*) => {
        $(
            impl FreeIndex for $ty {
                const MAX_CAPACITY: usize = <$ty>::MAX as usize + 1;

                #[inline]
                fn to_usize(self) -> usize {
                    self as usize
                }

                #[inline]
                fn from_usize(value: usize) -> Self {
                    value as $ty
                }
            }
        )*
    };
}
impl_free_index!(u8, u16);

impl FreeIndex for u32 {
    // 32 位的索引空间无法全部预分配，需要使用 with_capacity
    const MAX_CAPACITY: usize = u16::MAX as usize + 1;

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }

    #[inline]
    fn from_usize(value: usize) -> Self {
        value as u32
    }
}

/// 固定容量的环形队列，用作资源池的 free-list
///
/// 构造时一次性分配，之后不会增长。
/// `head == tail` 同时可以表示空和满，通过 `empty` 标记区分。
pub struct RingBuffer<I: FreeIndex> {
    data: Box<[I]>,
    /// 下一个 pop 的位置
    head: usize,
    /// 下一个 push 的位置
    tail: usize,
    empty: bool,
}

// new & init
impl<I: FreeIndex> RingBuffer<I> {
    /// 容量为 `I::MAX_CAPACITY`
    pub fn new() -> Self {
        Self::with_capacity(I::MAX_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            data: vec![I::default(); capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            empty: true,
        }
    }
}

impl<I: FreeIndex> Default for RingBuffer<I> {
    fn default() -> Self {
        Self::new()
    }
}

// getters
impl<I: FreeIndex> RingBuffer<I> {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        !self.empty && self.head == self.tail
    }

    pub fn len(&self) -> usize {
        if self.empty {
            0
        } else if self.tail > self.head {
            self.tail - self.head
        } else {
            self.capacity() - self.head + self.tail
        }
    }
}

// tools
impl<I: FreeIndex> RingBuffer<I> {
    /// 已满时原样返回 `value`
    #[inline]
    pub fn push(&mut self, value: I) -> Result<(), I> {
        if self.is_full() {
            return Err(value);
        }
        self.data[self.tail] = value;
        self.tail = (self.tail + 1) % self.capacity();
        self.empty = false;
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> Option<I> {
        if self.empty {
            return None;
        }
        let value = self.data[self.head];
        self.head = (self.head + 1) % self.capacity();
        self.empty = self.head == self.tail;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exactly_capacity_pushes() {
        let mut ring = RingBuffer::<u32>::with_capacity(4);
        for i in 0..4 {
            assert!(!ring.is_full());
            ring.push(i).unwrap();
        }
        assert!(ring.is_full());
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.push(99), Err(99));
    }

    #[test]
    fn yields_exactly_what_was_pushed() {
        let mut ring = RingBuffer::<u32>::with_capacity(3);
        assert!(ring.is_empty());
        assert_eq!(ring.pop(), None);

        for i in 0..3 {
            ring.push(i).unwrap();
        }
        for i in 0..3 {
            assert!(!ring.is_empty());
            assert_eq!(ring.pop(), Some(i));
        }
        assert!(ring.is_empty());
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn wraps_around() {
        let mut ring = RingBuffer::<u16>::with_capacity(3);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.pop(), Some(1));
        ring.push(3).unwrap();
        ring.push(4).unwrap();
        assert!(ring.is_full());
        assert_eq!(ring.len(), 3);
        assert_eq!([ring.pop(), ring.pop(), ring.pop()], [Some(2), Some(3), Some(4)]);
        assert!(ring.is_empty());
    }

    #[test]
    fn default_capacity_covers_the_index_type() {
        assert_eq!(RingBuffer::<u8>::new().capacity(), 256);
        assert_eq!(RingBuffer::<u16>::new().capacity(), 65536);
    }
}
