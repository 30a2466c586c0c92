//! Anonymous pipes.
//!
//! A pipe is a bounded byte ring shared by reader and writer endpoints.
//! The ring tracks how many endpoints of each direction are alive so the
//! ends can observe each other: reads see end-of-file once a writer has
//! attached and every writer is gone again, writes fail with `BrokenPipe`
//! once every reader is gone. A ring that has never seen a writer is not
//! at end-of-file, it is merely empty; FIFO nodes rely on that distinction
//! because their reader side can open first.

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use spin::Mutex;

use crate::environment::PIPE_BUFFER_SIZE;
use crate::error::{KernelError, Result};
use crate::object::FileObject;
use crate::sched::{current_thread, yield_now};
use crate::task::Thread;

pub struct PipeRing {
    buffer: VecDeque<u8>,
    capacity: usize,
    reader_count: usize,
    writer_count: usize,
    /// Latched by the first writer attach; EOF needs it set.
    writer_seen: bool,
}

impl PipeRing {
    pub fn reader_count(&self) -> usize {
        self.reader_count
    }

    pub fn writer_count(&self) -> usize {
        self.writer_count
    }

    fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::new(),
            capacity,
            reader_count: 0,
            writer_count: 0,
            writer_seen: false,
        }
    }
}

pub struct PipeEndpoint {
    shared: Arc<Mutex<PipeRing>>,
    readable: bool,
    writable: bool,
}

/// Create a connected pipe pair: `(read_end, write_end)`.
pub fn create_pipe(capacity: usize) -> (PipeEndpoint, PipeEndpoint) {
    let capacity = if capacity == 0 { PIPE_BUFFER_SIZE } else { capacity };
    let shared = Arc::new(Mutex::new(PipeRing::new(capacity)));
    (
        PipeEndpoint::attach_reader(&shared),
        PipeEndpoint::attach_writer(&shared),
    )
}

/// An unconnected ring for endpoints attached later (FIFO nodes).
pub fn create_ring(capacity: usize) -> Arc<Mutex<PipeRing>> {
    Arc::new(Mutex::new(PipeRing::new(capacity)))
}

impl PipeEndpoint {
    pub fn attach_reader(shared: &Arc<Mutex<PipeRing>>) -> Self {
        shared.lock().reader_count += 1;
        Self {
            shared: Arc::clone(shared),
            readable: true,
            writable: false,
        }
    }

    pub fn attach_writer(shared: &Arc<Mutex<PipeRing>>) -> Self {
        {
            let mut ring = shared.lock();
            ring.writer_count += 1;
            ring.writer_seen = true;
        }
        Self {
            shared: Arc::clone(shared),
            readable: false,
            writable: true,
        }
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Non-blocking read. `Ok(0)` is end-of-file: the ring is empty and
    /// every writer that ever attached is gone again.
    pub fn try_read(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.readable {
            return Err(KernelError::NotSupported);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let mut ring = self.shared.lock();
        if ring.buffer.is_empty() {
            if ring.writer_seen && ring.writer_count == 0 {
                return Ok(0);
            }
            return Err(KernelError::WouldBlock);
        }
        let mut read = 0;
        while read < buf.len() {
            match ring.buffer.pop_front() {
                Some(byte) => {
                    buf[read] = byte;
                    read += 1;
                }
                None => break,
            }
        }
        Ok(read)
    }

    /// Non-blocking write of as much as fits.
    pub fn try_write(&self, buf: &[u8]) -> Result<usize> {
        if !self.writable {
            return Err(KernelError::NotSupported);
        }
        let mut ring = self.shared.lock();
        if ring.reader_count == 0 {
            return Err(KernelError::BrokenPipe);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let space = ring.capacity - ring.buffer.len();
        if space == 0 {
            return Err(KernelError::WouldBlock);
        }
        let n = space.min(buf.len());
        ring.buffer.extend(buf[..n].iter().copied());
        Ok(n)
    }

    /// Blocking read on behalf of `thread` (pass `None` when no thread
    /// context exists; the loop then cannot be interrupted).
    pub fn read_blocking(&self, thread: Option<&Arc<Thread>>, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.try_read(buf) {
                Err(KernelError::WouldBlock) => {}
                other => return other,
            }
            if thread.is_some_and(|t| t.exit_requested()) {
                return Err(KernelError::Interrupted);
            }
            yield_now();
        }
    }

    /// Blocking write of the whole buffer.
    pub fn write_blocking(&self, thread: Option<&Arc<Thread>>, buf: &[u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            match self.try_write(&buf[written..]) {
                Ok(n) => written += n,
                Err(KernelError::WouldBlock) => {
                    if thread.is_some_and(|t| t.exit_requested()) {
                        return Err(KernelError::Interrupted);
                    }
                    yield_now();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    pub fn pending(&self) -> usize {
        self.shared.lock().buffer.len()
    }
}

impl Drop for PipeEndpoint {
    fn drop(&mut self) {
        let mut ring = self.shared.lock();
        if self.readable {
            ring.reader_count -= 1;
        }
        if self.writable {
            ring.writer_count -= 1;
        }
    }
}

impl FileObject for PipeEndpoint {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.read_blocking(current_thread().as_ref(), buf)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        self.write_blocking(current_thread().as_ref(), buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread as host;

    #[test]
    fn bytes_flow_in_order() {
        let (rx, tx) = create_pipe(16);
        assert_eq!(tx.try_write(b"abc").unwrap(), 3);
        let mut buf = [0u8; 8];
        assert_eq!(rx.try_read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(rx.try_read(&mut buf), Err(KernelError::WouldBlock));
    }

    #[test]
    fn capacity_backpressure() {
        let (_rx, tx) = create_pipe(4);
        assert_eq!(tx.try_write(b"abcdef").unwrap(), 4);
        assert_eq!(tx.try_write(b"x"), Err(KernelError::WouldBlock));
    }

    #[test]
    fn eof_after_last_writer_drops() {
        let (rx, tx) = create_pipe(16);
        tx.try_write(b"tail").unwrap();
        drop(tx);
        let mut buf = [0u8; 8];
        // Buffered bytes drain first, then end-of-file.
        assert_eq!(rx.try_read(&mut buf).unwrap(), 4);
        assert_eq!(rx.try_read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn reader_on_a_fresh_ring_blocks_instead_of_eof() {
        let ring = create_ring(8);
        let rx = PipeEndpoint::attach_reader(&ring);
        let mut buf = [0u8; 4];
        // No writer has ever attached: empty, but not end-of-file.
        assert_eq!(rx.try_read(&mut buf), Err(KernelError::WouldBlock));
        let tx = PipeEndpoint::attach_writer(&ring);
        drop(tx);
        assert_eq!(rx.try_read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn broken_pipe_after_last_reader_drops() {
        let (rx, tx) = create_pipe(16);
        drop(rx);
        assert_eq!(tx.try_write(b"x"), Err(KernelError::BrokenPipe));
    }

    #[test]
    fn wrong_direction_is_refused() {
        let (rx, tx) = create_pipe(16);
        let mut buf = [0u8; 4];
        assert_eq!(tx.try_read(&mut buf), Err(KernelError::NotSupported));
        assert_eq!(rx.try_write(b"x"), Err(KernelError::NotSupported));
    }

    #[test]
    fn blocking_write_completes_once_reader_drains() {
        let (rx, tx) = create_pipe(4);
        let writer = host::spawn(move || tx.write_blocking(None, b"0123456789"));
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        while out.len() < 10 {
            match rx.try_read(&mut buf) {
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(KernelError::WouldBlock) => host::yield_now(),
                Err(e) => panic!("unexpected {e:?}"),
            }
        }
        assert_eq!(writer.join().unwrap().unwrap(), 10);
        assert_eq!(out, b"0123456789");
    }
}
