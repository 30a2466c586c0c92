//! Fixed-capacity byte ring.
//!
//! Interrupt handlers deposit bytes with `push`; blocked readers drain with
//! `pop`. The FIFO itself never blocks; the cooperative wait loop lives in
//! the caller (see `device::queue`).

extern crate alloc;

use alloc::collections::VecDeque;
use spin::Mutex;

pub struct Fifo {
    inner: Mutex<VecDeque<u8>>,
    capacity: usize,
}

impl Fifo {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Push one byte. Fails with `false` when the ring is full.
    pub fn push(&self, byte: u8) -> bool {
        let mut inner = self.inner.lock();
        if inner.len() >= self.capacity {
            return false;
        }
        inner.push_back(byte);
        true
    }

    /// Push as much of `data` as fits; returns the number accepted.
    pub fn push_slice(&self, data: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        let room = self.capacity - inner.len();
        let n = room.min(data.len());
        for &b in &data[..n] {
            inner.push_back(b);
        }
        n
    }

    pub fn pop(&self) -> Option<u8> {
        self.inner.lock().pop_front()
    }

    /// Drain up to `buf.len()` bytes; returns the number copied.
    pub fn pop_slice(&self, buf: &mut [u8]) -> usize {
        let mut inner = self.inner.lock();
        let n = inner.len().min(buf.len());
        for slot in buf[..n].iter_mut() {
            *slot = inner.pop_front().unwrap();
        }
        n
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
