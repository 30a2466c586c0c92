//! Kernel heap allocator.
//!
//! A bump-pointer arena with a free-list recycler keyed by exact block size.
//! `allocate` rounds the request up to the configured alignment, reuses a
//! freed block of exactly that size when one exists, and otherwise carves a
//! fresh block off the arena break. Returned regions are always zero-filled.
//! There is no coalescing and no growth past the configured arena end.
//!
//! A block is a move-once [`BlockHandle`]: releasing consumes the handle,
//! so a double release does not compile, and a stale handle (one that
//! survived a `set_base`) is rejected with an error rather than treated as
//! heap corruption.
//!
//! One lock guards both chains. It is not reentrant; callers that can be
//! interrupted while holding it take the interrupt-masked section
//! (`sync::irq`). Hot-path kernel objects avoid this lock entirely through
//! `mem::pool`.

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;
use hashbrown::HashMap;
use spin::Mutex;

use crate::environment::{DEFAULT_HEAP_SIZE, HEAP_ALIGN};
use crate::error::{KernelError, Result};
use crate::sync::irq::without_interrupts;

/// Identity of a live heap block. Not `Clone`: releasing moves it back into
/// the allocator, so a block cannot be freed twice.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    id: u64,
}

impl BlockHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy)]
struct Block {
    offset: usize,
    size: usize,
}

struct HeapInner {
    arena: Vec<u8>,
    /// Arena break: everything below is carved out.
    brk: usize,
    next_id: u64,
    /// Live blocks by handle id.
    allocated: HashMap<u64, Block>,
    /// Freed blocks recycled by exact size.
    free: HashMap<usize, Vec<Block>>,
}

pub struct KernelHeap {
    inner: Mutex<HeapInner>,
}

fn align_up(n: usize) -> usize {
    (n + HEAP_ALIGN - 1) & !(HEAP_ALIGN - 1)
}

impl KernelHeap {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HeapInner {
                arena: vec![0u8; capacity],
                brk: 0,
                next_id: 1,
                allocated: HashMap::new(),
                free: HashMap::new(),
            }),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_HEAP_SIZE)
    }

    /// Reset the arena: drop all bookkeeping and restart the break at zero.
    pub fn set_base(&self, capacity: usize) {
        without_interrupts(|| {
            let mut inner = self.inner.lock();
            inner.arena = vec![0u8; capacity];
            inner.brk = 0;
            inner.allocated.clear();
            inner.free.clear();
        })
    }

    /// Allocate a zero-filled block of at least `size` bytes.
    pub fn allocate(&self, size: usize) -> Result<BlockHandle> {
        if size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let size = align_up(size);
        without_interrupts(|| {
            let mut inner = self.inner.lock();

            // Exact-size free-list reuse, first fit.
            let (block, drained) = match inner.free.get_mut(&size) {
                Some(list) => {
                    let b = list.pop();
                    (b, list.is_empty())
                }
                None => (None, false),
            };
            if drained {
                inner.free.remove(&size);
            }

            let block = match block {
                Some(b) => b,
                None => {
                    if inner.brk + size > inner.arena.len() {
                        return Err(KernelError::OutOfMemory);
                    }
                    let b = Block {
                        offset: inner.brk,
                        size,
                    };
                    inner.brk += size;
                    b
                }
            };

            // Zero-fill before handing out; freed contents never leak.
            let (start, end) = (block.offset, block.offset + block.size);
            for byte in inner.arena[start..end].iter_mut() {
                *byte = 0;
            }

            let id = inner.next_id;
            inner.next_id += 1;
            inner.allocated.insert(id, block);
            Ok(BlockHandle { id })
        })
    }

    /// Release a block. Consumes the handle; a handle the allocator does not
    /// recognize (a stale survivor of `set_base`) is a reported error.
    pub fn release(&self, handle: BlockHandle) -> Result<()> {
        without_interrupts(|| {
            let mut inner = self.inner.lock();
            let block = inner
                .allocated
                .remove(&handle.id)
                .ok_or(KernelError::InvalidArgument)?;
            // No zeroing, no coalescing: the block waits on the exact-size
            // free list until a same-size request reuses it.
            inner.free.entry(block.size).or_default().push(block);
            Ok(())
        })
    }

    /// Raw arena bump: carve `size` aligned bytes off the break without
    /// block bookkeeping. Returns the offset of the new region.
    pub fn extend(&self, size: usize) -> Result<usize> {
        let size = align_up(size);
        without_interrupts(|| {
            let mut inner = self.inner.lock();
            if inner.brk + size > inner.arena.len() {
                return Err(KernelError::OutOfMemory);
            }
            let offset = inner.brk;
            inner.brk += size;
            let end = offset + size;
            for byte in inner.arena[offset..end].iter_mut() {
                *byte = 0;
            }
            Ok(offset)
        })
    }

    /// Size of the block behind `handle`.
    pub fn block_size(&self, handle: &BlockHandle) -> Result<usize> {
        let inner = self.inner.lock();
        inner
            .allocated
            .get(&handle.id)
            .map(|b| b.size)
            .ok_or(KernelError::InvalidArgument)
    }

    /// Copy bytes out of a live block.
    pub fn read(&self, handle: &BlockHandle, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let inner = self.inner.lock();
        let block = inner
            .allocated
            .get(&handle.id)
            .ok_or(KernelError::InvalidArgument)?;
        if offset >= block.size {
            return Ok(0);
        }
        let n = (block.size - offset).min(buf.len());
        let start = block.offset + offset;
        buf[..n].copy_from_slice(&inner.arena[start..start + n]);
        Ok(n)
    }

    /// Copy bytes into a live block.
    pub fn write(&self, handle: &BlockHandle, offset: usize, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let block = inner
            .allocated
            .get(&handle.id)
            .copied()
            .ok_or(KernelError::InvalidArgument)?;
        if offset + data.len() > block.size {
            return Err(KernelError::NoSpace);
        }
        let start = block.offset + offset;
        inner.arena[start..start + data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    /// Number of live blocks.
    pub fn allocated_count(&self) -> usize {
        self.inner.lock().allocated.len()
    }

    /// Current break offset.
    pub fn brk(&self) -> usize {
        self.inner.lock().brk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_blocks_never_overlap() {
        let heap = KernelHeap::new(4096);
        let a = heap.allocate(100).unwrap();
        let b = heap.allocate(100).unwrap();
        // Write distinct patterns and check neither clobbers the other.
        heap.write(&a, 0, &[0xaa; 100]).unwrap();
        heap.write(&b, 0, &[0xbb; 100]).unwrap();
        let mut buf = [0u8; 100];
        heap.read(&a, 0, &mut buf).unwrap();
        assert!(buf.iter().all(|&x| x == 0xaa));
        heap.read(&b, 0, &mut buf).unwrap();
        assert!(buf.iter().all(|&x| x == 0xbb));
    }

    #[test]
    fn release_then_allocate_reuses_exact_size() {
        let heap = KernelHeap::new(4096);
        let a = heap.allocate(128).unwrap();
        let brk_before = heap.brk();
        heap.release(a).unwrap();
        // Same size comes off the free list, not the break.
        let _b = heap.allocate(128).unwrap();
        assert_eq!(heap.brk(), brk_before);
        // A different size carves fresh arena.
        let _c = heap.allocate(64).unwrap();
        assert!(heap.brk() > brk_before);
    }

    #[test]
    fn reused_block_is_zero_filled() {
        let heap = KernelHeap::new(4096);
        let a = heap.allocate(32).unwrap();
        heap.write(&a, 0, &[0xff; 32]).unwrap();
        heap.release(a).unwrap();
        let b = heap.allocate(32).unwrap();
        let mut buf = [0xau8; 32];
        heap.read(&b, 0, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 32]);
    }

    #[test]
    fn stale_handle_is_rejected_not_fatal() {
        let heap = KernelHeap::new(4096);
        let a = heap.allocate(16).unwrap();
        heap.set_base(4096);
        assert_eq!(heap.release(a), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn arena_exhaustion_is_an_error() {
        let heap = KernelHeap::new(256);
        assert!(heap.allocate(128).is_ok());
        assert_eq!(heap.allocate(256), Err(KernelError::OutOfMemory));
        assert_eq!(heap.extend(512), Err(KernelError::OutOfMemory));
    }

    #[test]
    fn extend_bumps_aligned_and_zeroed() {
        let heap = KernelHeap::new(1024);
        let off = heap.extend(10).unwrap();
        assert_eq!(off % HEAP_ALIGN, 0);
        let off2 = heap.extend(10).unwrap();
        assert_eq!(off2, off + align_up(10));
    }
}
