//! Process-wide free-list of fixed-size records.
//!
//! Grounded on `compio-driver`'s `AsyncifyPool`: a bounded, lock-free
//! structure that producers and the consumer share without blocking, falling
//! back to the heap when it is empty (`acquire`) or full (`release`).

use std::sync::Arc;

use asyncmsgq_log::{debug, instrument};
use crossbeam_queue::ArrayQueue;

/// Default capacity of a [`Pool`], chosen to absorb a short burst of
/// concurrent posts without falling back to the heap allocator on the
/// realtime thread's hot path.
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// A lock-free free-list of boxed `T` records.
///
/// `T` must be `Default`; a recycled record is handed back to a caller by
/// simply resetting it in place with `*item = T::default()`. `Pool` never
/// has to know anything about `T`'s internal invariants: a released item
/// is always behavior-free once reset.
pub struct Pool<T> {
    free: ArrayQueue<Box<T>>,
}

impl<T: Default> Pool<T> {
    /// Create a pool with the given free-list capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Pop a record from the free-list, or heap-allocate a fresh
    /// `T::default()` if the list is empty.
    pub fn acquire(&self) -> Box<T> {
        instrument!(asyncmsgq_log::Level::TRACE, "Pool::acquire");
        match self.free.pop() {
            Some(item) => item,
            None => {
                debug!("item pool empty, falling back to heap allocation");
                Box::new(T::default())
            }
        }
    }

    /// Return a record to the free-list after resetting it to a
    /// behavior-free state, or heap-free it if the list is full.
    pub fn release(&self, mut item: Box<T>) {
        instrument!(asyncmsgq_log::Level::TRACE, "Pool::release");
        *item = T::default();
        if let Err(item) = self.free.push(item) {
            debug!("item pool full, heap-freeing returned record");
            drop(item);
        }
    }

    /// Number of records currently parked in the free-list (diagnostics
    /// only, racy by construction).
    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

impl<T: Default> Default for Pool<T> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }
}

/// A process-wide, lazily constructed pool shared by every [`Pool::shared`]
/// caller, mirroring the original C implementation's
/// `PA_STATIC_FLIST_DECLARE`.
pub fn shared<T: Default + Send + 'static>() -> Arc<Pool<T>> {
    use std::{
        any::{Any, TypeId},
        collections::HashMap,
        sync::{Mutex, OnceLock},
    };

    static REGISTRY: OnceLock<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> =
        OnceLock::new();

    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = registry.lock().unwrap();
    let entry = guard
        .entry(TypeId::of::<T>())
        .or_insert_with(|| Arc::new(Pool::<T>::default()) as Arc<dyn Any + Send + Sync>);
    entry.clone().downcast::<Pool<T>>().expect("type id collision")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Item(u32);

    #[test]
    fn acquire_falls_back_to_heap_when_empty() {
        let pool: Pool<Item> = Pool::with_capacity(1);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(a.0, 0);
        assert_eq!(b.0, 0);
    }

    #[test]
    fn release_recycles_up_to_capacity() {
        let pool: Pool<Item> = Pool::with_capacity(1);
        let a = pool.acquire();
        pool.release(a);
        assert_eq!(pool.len(), 1);

        let b = pool.acquire();
        assert_eq!(pool.len(), 0);
        pool.release(b);

        // Pushing a second item while the list is already full heap-frees it
        // rather than growing the list.
        let c = Box::new(Item(7));
        pool.release(c);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn released_items_are_reset() {
        let pool: Pool<Item> = Pool::with_capacity(1);
        let mut item = pool.acquire();
        item.0 = 42;
        pool.release(item);
        let recycled = pool.acquire();
        assert_eq!(recycled.0, 0);
    }
}
