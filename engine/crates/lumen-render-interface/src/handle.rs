use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// 指向 [`crate::pool::Pool`] 中某个 slot 的句柄
///
/// 只能通过签发它的 pool 解析；generation 不匹配时解析失败。
/// generation 0 永远不会被签发，因此 [`Handle::null`] 永远无法解析。
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

// new & init
impl<T> Handle<T> {
    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn null() -> Self {
        Self::new(0, 0)
    }
}

// getters
impl<T> Handle<T> {
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.generation == 0
    }
}

impl<T> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Display for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

impl<T> Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let type_name = std::any::type_name::<T>().rsplit("::").next().unwrap_or("?");
        write!(f, "Handle<{}>({}v{})", type_name, self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Marker;

    #[test]
    fn equality_needs_both_fields() {
        let a = Handle::<Marker>::new(3, 1);
        assert_eq!(a, Handle::new(3, 1));
        assert_ne!(a, Handle::new(3, 2));
        assert_ne!(a, Handle::new(4, 1));

        let set: HashSet<_> = [a, Handle::new(3, 1), Handle::new(3, 2)].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn null_handle() {
        assert!(Handle::<Marker>::null().is_null());
        assert!(Handle::<Marker>::default().is_null());
        assert!(!Handle::<Marker>::new(0, 1).is_null());
        assert_eq!(format!("{:?}", Handle::<Marker>::new(2, 5)), "Handle<Marker>(2v5)");
    }
}
