//! Fixed-size object pool.
//!
//! Core kernel objects (processes, threads, VFS nodes, open files) must stay
//! allocatable even while the general heap lock is held by a preempted
//! holder: a reentrant grab of that lock from interrupt context would be an
//! instant deadlock on a single core. The pool keeps its own free list under
//! its own lock, so recycling never touches the heap lock.
//!
//! `get` hands out a [`PoolBox`] in default (zeroed-equivalent) state; drop
//! returns the entry to the free list. There is no explicit put and no
//! membership check on return: an entry can only be returned once because
//! returning is dropping.

extern crate alloc;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};
use spin::Mutex;

struct PoolInner<T> {
    free: Vec<Box<T>>,
    live: usize,
    total: usize,
}

pub struct Pool<T: Default> {
    inner: Arc<Mutex<PoolInner<T>>>,
}

impl<T: Default> Pool<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                free: Vec::new(),
                live: 0,
                total: 0,
            })),
        }
    }

    /// Take an entry in default state, recycling a freed one when possible.
    pub fn get(&self) -> PoolBox<T> {
        let mut inner = self.inner.lock();
        let entry = match inner.free.pop() {
            Some(mut e) => {
                *e = T::default();
                e
            }
            None => {
                inner.total += 1;
                Box::new(T::default())
            }
        };
        inner.live += 1;
        PoolBox {
            entry: Some(entry),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Entries currently handed out.
    pub fn live_count(&self) -> usize {
        self.inner.lock().live
    }

    /// Entries ever carved (live + recycled).
    pub fn total_count(&self) -> usize {
        self.inner.lock().total
    }
}

impl<T: Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Owning handle to a pool entry. Dropping returns the entry to the pool.
pub struct PoolBox<T: Default> {
    entry: Option<Box<T>>,
    pool: Arc<Mutex<PoolInner<T>>>,
}

impl<T: Default> Deref for PoolBox<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.entry.as_ref().unwrap()
    }
}

impl<T: Default> DerefMut for PoolBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.entry.as_mut().unwrap()
    }
}

impl<T: Default> Drop for PoolBox<T> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            let mut inner = self.pool.lock();
            inner.free.push(entry);
            inner.live -= 1;
        }
    }
}
