//! Free-list pools for GPU objects that are expensive to recreate.
//!
//! Objects are handed out by key (buffer kind plus size class, render
//! target size) and come back on release. Nothing is destroyed while the
//! owning context lives; [`ObjectPool::drain`] hands every handle back for
//! teardown.

use std::hash::Hash;

use glam::IVec2;
use rustc_hash::FxHashMap;

use crate::gpu::driver::{BufferId, BufferKind, RenderTargetId};

/// Size classes are powers of two, with a floor of one page.
const MIN_SIZE_CLASS: usize = 4096;

/// Size class a buffer request of `size_hint` bytes falls into.
#[must_use]
pub fn size_class(size_hint: usize) -> usize {
    size_hint.max(MIN_SIZE_CLASS).next_power_of_two()
}

/// Pool key for pixel transfer buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferKey {
    /// Pack or unpack.
    pub kind: BufferKind,
    /// Allocated size in bytes.
    pub capacity: usize,
}

impl BufferKey {
    /// Key for a request of at least `size_hint` bytes.
    #[must_use]
    pub fn for_request(kind: BufferKind, size_hint: usize) -> Self {
        Self {
            kind,
            capacity: size_class(size_hint),
        }
    }
}

/// Pooled objects keyed by `K`, identified by handle `H`.
#[derive(Debug)]
pub struct ObjectPool<K, H> {
    free: FxHashMap<K, Vec<H>>,
    in_use: FxHashMap<H, K>,
    allocated: usize,
}

impl<K, H> Default for ObjectPool<K, H> {
    fn default() -> Self {
        Self {
            free: FxHashMap::default(),
            in_use: FxHashMap::default(),
            allocated: 0,
        }
    }
}

impl<K, H> ObjectPool<K, H>
where
    K: Copy + Eq + Hash + std::fmt::Debug,
    H: Copy + Eq + Hash,
{
    /// Take a free object for `key`, or create one with `alloc`.
    ///
    /// # Errors
    ///
    /// Whatever `alloc` returns; the pool is unchanged.
    pub fn acquire<E>(
        &mut self,
        key: K,
        alloc: impl FnOnce(K) -> Result<H, E>,
    ) -> Result<H, E> {
        let handle = match self.free.get_mut(&key).and_then(Vec::pop) {
            Some(handle) => handle,
            None => {
                let handle = alloc(key)?;
                self.allocated += 1;
                log::debug!("object pool grew to {} for {key:?}", self.allocated);
                handle
            }
        };
        let _ = self.in_use.insert(handle, key);
        Ok(handle)
    }

    /// Return `handle` to its free list. Returns `false` if it was not
    /// handed out by this pool.
    pub fn release(&mut self, handle: H) -> bool {
        match self.in_use.remove(&handle) {
            Some(key) => {
                self.free.entry(key).or_default().push(handle);
                true
            }
            None => false,
        }
    }

    /// Key an in-use handle was acquired with.
    #[must_use]
    pub fn key_of(&self, handle: H) -> Option<K> {
        self.in_use.get(&handle).copied()
    }

    /// Objects ever created by this pool and not yet drained.
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }

    /// Objects currently handed out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }

    /// Objects waiting on free lists.
    #[must_use]
    pub fn free(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Remove every object, free and in use, for destruction.
    pub fn drain(&mut self) -> Vec<H> {
        let mut handles: Vec<H> = self.free.drain().flat_map(|(_, list)| list).collect();
        handles.extend(self.in_use.drain().map(|(handle, _)| handle));
        self.allocated = 0;
        handles
    }
}

/// Pixel transfer buffers, keyed by kind and size class.
pub type BufferPool = ObjectPool<BufferKey, BufferId>;

/// Render targets, keyed by size.
pub type RenderTargetPool = ObjectPool<IVec2, RenderTargetId>;

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(next: &mut u32) -> impl FnMut(BufferKey) -> Result<BufferId, ()> + '_ {
        move |_| {
            *next += 1;
            Ok(BufferId::from_raw(*next))
        }
    }

    #[test]
    fn released_buffer_is_reused_for_same_class() {
        let mut pool = BufferPool::default();
        let mut next = 0;
        let key = BufferKey::for_request(BufferKind::PixelUnpack, 10_000);
        let a = pool.acquire(key, alloc(&mut next)).unwrap();
        assert!(pool.release(a));
        let same = BufferKey::for_request(BufferKind::PixelUnpack, 12_000);
        let b = pool.acquire(same, alloc(&mut next)).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn kinds_and_classes_do_not_mix() {
        let mut pool = BufferPool::default();
        let mut next = 0;
        let unpack = BufferKey::for_request(BufferKind::PixelUnpack, 100);
        let a = pool.acquire(unpack, alloc(&mut next)).unwrap();
        assert!(pool.release(a));
        let pack = BufferKey::for_request(BufferKind::PixelPack, 100);
        let b = pool.acquire(pack, alloc(&mut next)).unwrap();
        let big = BufferKey::for_request(BufferKind::PixelUnpack, 1 << 20);
        let c = pool.acquire(big, alloc(&mut next)).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.free(), 1);
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn failed_allocation_leaves_pool_unchanged() {
        let mut pool = RenderTargetPool::default();
        let result = pool.acquire(IVec2::new(64, 64), |_| Err::<RenderTargetId, _>("oom"));
        assert_eq!(result, Err("oom"));
        assert_eq!(pool.allocated(), 0);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn unknown_release_is_rejected() {
        let mut pool = RenderTargetPool::default();
        assert!(!pool.release(RenderTargetId::from_raw(9)));
    }

    #[test]
    fn drain_returns_every_object_once() {
        let mut pool = BufferPool::default();
        let mut next = 0;
        let key = BufferKey::for_request(BufferKind::PixelPack, 1);
        let a = pool.acquire(key, alloc(&mut next)).unwrap();
        let b = pool.acquire(key, alloc(&mut next)).unwrap();
        assert!(pool.release(a));
        let mut drained = pool.drain();
        drained.sort();
        assert_eq!(drained, vec![a, b]);
        assert!(pool.drain().is_empty());
        assert_eq!(pool.free() + pool.in_use(), 0);
    }

    #[test]
    fn size_class_is_pow2_with_floor() {
        assert_eq!(size_class(0), MIN_SIZE_CLASS);
        assert_eq!(size_class(4097), 8192);
        assert!(size_class(1_000_000) >= 1_000_000);
    }
}
