//! Block-chunked growable byte buffer.
//!
//! Storage grows in fixed-size chunks so appends never move existing data.
//! Backs tmpfs regular-file contents.

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use crate::environment::CHUNK_SIZE;

struct BufInner {
    chunks: Vec<Vec<u8>>,
    len: usize,
}

pub struct ChunkBuffer {
    inner: Mutex<BufInner>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BufInner {
                chunks: Vec::new(),
                len: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write `data` at `offset`, growing (zero-filled) as needed.
    /// Returns the number of bytes written (always `data.len()`).
    pub fn write_at(&self, offset: usize, data: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        let end = offset + data.len();
        let chunks_needed = end.div_ceil(CHUNK_SIZE);
        while inner.chunks.len() < chunks_needed {
            inner.chunks.push(vec![0u8; CHUNK_SIZE]);
        }
        let mut pos = offset;
        let mut src = 0;
        while src < data.len() {
            let chunk = pos / CHUNK_SIZE;
            let off = pos % CHUNK_SIZE;
            let n = (CHUNK_SIZE - off).min(data.len() - src);
            inner.chunks[chunk][off..off + n].copy_from_slice(&data[src..src + n]);
            pos += n;
            src += n;
        }
        if end > inner.len {
            inner.len = end;
        }
        data.len()
    }

    /// Read from `offset` into `buf`; returns bytes copied (0 at EOF).
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let inner = self.inner.lock();
        if offset >= inner.len {
            return 0;
        }
        let n = (inner.len - offset).min(buf.len());
        let mut pos = offset;
        let mut dst = 0;
        while dst < n {
            let chunk = pos / CHUNK_SIZE;
            let off = pos % CHUNK_SIZE;
            let step = (CHUNK_SIZE - off).min(n - dst);
            buf[dst..dst + step].copy_from_slice(&inner.chunks[chunk][off..off + step]);
            pos += step;
            dst += step;
        }
        n
    }

    /// Shrink to `new_len`, freeing whole trailing chunks.
    pub fn truncate(&self, new_len: usize) {
        let mut inner = self.inner.lock();
        if new_len >= inner.len {
            return;
        }
        inner.len = new_len;
        let keep = new_len.div_ceil(CHUNK_SIZE);
        inner.chunks.truncate(keep);
        // Zero the tail of the last kept chunk so regrowth reads zeros.
        if let Some(last) = inner.chunks.last_mut() {
            let off = new_len % CHUNK_SIZE;
            if off != 0 {
                for b in last[off..].iter_mut() {
                    *b = 0;
                }
            }
        }
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}
