//! Locked list with insertion-order iteration.
//!
//! An open iterator holds the list lock for its whole lifetime, so
//! structural mutation blocks while a traversal is in flight. Release is
//! automatic: the guard returned by [`List::iter`] frees the lock on drop,
//! so there is no explicit close call to forget and no way to leave the
//! list wedged.

extern crate alloc;

use alloc::collections::VecDeque;
use spin::{Mutex, MutexGuard};

pub struct List<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> List<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Append to the tail. O(1).
    pub fn append(&self, item: T) {
        self.inner.lock().push_back(item);
    }

    /// Remove and return the head. O(1).
    pub fn remove_front(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    /// Remove and return the tail. O(1).
    pub fn remove_back(&self) -> Option<T> {
        self.inner.lock().pop_back()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop every element.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Open an iteration over the list. The returned guard holds the list
    /// lock until it is dropped; `append`/`remove` on the same list block
    /// for that long.
    pub fn iter(&self) -> ListIter<'_, T> {
        ListIter {
            guard: self.inner.lock(),
            pos: 0,
        }
    }
}

impl<T: PartialEq> List<T> {
    /// Remove the first element equal to `item`. O(n) identity scan.
    pub fn remove(&self, item: &T) -> bool {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.iter().position(|x| x == item) {
            inner.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.inner.lock().iter().any(|x| x == item)
    }
}

impl<T: Clone> List<T> {
    /// Snapshot of the current contents in insertion order.
    pub fn snapshot(&self) -> alloc::vec::Vec<T> {
        self.inner.lock().iter().cloned().collect()
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over a locked list. Yields elements in insertion order.
pub struct ListIter<'a, T> {
    guard: MutexGuard<'a, VecDeque<T>>,
    pos: usize,
}

impl<'a, T> ListIter<'a, T> {
    /// Return the current element and advance, or `None` past the tail.
    pub fn advance(&mut self) -> Option<&T> {
        if self.pos >= self.guard.len() {
            return None;
        }
        self.pos += 1;
        self.guard.get(self.pos - 1)
    }

    /// Whether another `advance` would yield an element.
    pub fn has_more(&self) -> bool {
        self.pos < self.guard.len()
    }
}
