//! Named FIFO nodes.
//!
//! A FIFO node owns no channel until someone opens it for reading: the
//! first read-side open allocates the backing ring, write-side opens block
//! until a reader exists, and the ring is detached again when the last
//! reader leaves so the next round starts clean. Endpoint bookkeeping is
//! the same ring used by anonymous pipes.

extern crate alloc;

use alloc::sync::Arc;
use spin::Mutex;

use crate::environment::PIPE_BUFFER_SIZE;
use crate::error::{KernelError, Result};
use crate::fs::vfs::core::VfsNode;
use crate::fs::{FileMetadata, OpenFlags};
use crate::ipc::pipe::{create_ring, PipeEndpoint, PipeRing};
use crate::object::FileObject;
use crate::sched::yield_now;
use crate::task::Thread;

pub struct FifoState {
    inner: Mutex<FifoInner>,
}

struct FifoInner {
    /// Present while at least one reader holds the FIFO open.
    ring: Option<Arc<Mutex<PipeRing>>>,
}

impl FifoState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FifoInner { ring: None }),
        }
    }

    pub fn has_channel(&self) -> bool {
        self.inner.lock().ring.is_some()
    }

    /// Read-side open. Allocates the channel on first use.
    pub fn open_read(self: &Arc<Self>, node: &Arc<VfsNode>) -> Arc<FifoFileObject> {
        let mut inner = self.inner.lock();
        let ring = inner
            .ring
            .get_or_insert_with(|| create_ring(PIPE_BUFFER_SIZE));
        Arc::new(FifoFileObject {
            endpoint: PipeEndpoint::attach_reader(ring),
            state: Arc::clone(self),
            node: Arc::clone(node),
        })
    }

    /// Write-side open. Blocks until a reader holds the channel open, or
    /// fails with `WouldBlock` when `NONBLOCK` was requested.
    pub fn open_write(
        self: &Arc<Self>,
        node: &Arc<VfsNode>,
        flags: OpenFlags,
        thread: Option<&Arc<Thread>>,
    ) -> Result<Arc<FifoFileObject>> {
        loop {
            {
                let inner = self.inner.lock();
                if let Some(ring) = &inner.ring {
                    if ring.lock().reader_count() > 0 {
                        return Ok(Arc::new(FifoFileObject {
                            endpoint: PipeEndpoint::attach_writer(ring),
                            state: Arc::clone(self),
                            node: Arc::clone(node),
                        }));
                    }
                }
            }
            if flags.contains(OpenFlags::NONBLOCK) {
                return Err(KernelError::WouldBlock);
            }
            if thread.is_some_and(|t| t.exit_requested()) {
                return Err(KernelError::Interrupted);
            }
            yield_now();
        }
    }
}

impl Default for FifoState {
    fn default() -> Self {
        Self::new()
    }
}

/// One open end of a FIFO node.
pub struct FifoFileObject {
    endpoint: PipeEndpoint,
    state: Arc<FifoState>,
    node: Arc<VfsNode>,
}

impl FifoFileObject {
    pub fn try_read(&self, buf: &mut [u8]) -> Result<usize> {
        self.endpoint.try_read(buf)
    }

    pub fn try_write(&self, buf: &[u8]) -> Result<usize> {
        self.endpoint.try_write(buf)
    }

    pub fn read_blocking(&self, thread: Option<&Arc<Thread>>, buf: &mut [u8]) -> Result<usize> {
        self.endpoint.read_blocking(thread, buf)
    }

    pub fn write_blocking(&self, thread: Option<&Arc<Thread>>, buf: &[u8]) -> Result<usize> {
        self.endpoint.write_blocking(thread, buf)
    }
}

impl Drop for FifoFileObject {
    fn drop(&mut self) {
        // Runs before the endpoint detaches, so a count of one means this
        // was the last reader and the channel goes away with it.
        if self.endpoint.is_readable() {
            let mut inner = self.state.inner.lock();
            let last = inner
                .ring
                .as_ref()
                .is_some_and(|r| r.lock().reader_count() == 1);
            if last {
                inner.ring = None;
            }
        }
    }
}

impl FileObject for FifoFileObject {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.endpoint
            .read_blocking(crate::sched::current_thread().as_ref(), buf)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        self.endpoint
            .write_blocking(crate::sched::current_thread().as_ref(), buf)
    }

    fn metadata(&self) -> Result<FileMetadata> {
        self.node.metadata()
    }

    fn node(&self) -> Option<Arc<VfsNode>> {
        Some(Arc::clone(&self.node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::tmpfs::TmpFs;
    use crate::fs::vfs::core::FileSystemOperations;
    use crate::fs::FileType;
    use crate::task::Process;
    use std::thread as host;

    fn fifo_node() -> (Arc<VfsNode>, Arc<FifoState>) {
        let fs = TmpFs::new();
        let node = fs
            .create(&fs.root_node(), "queue", FileType::Fifo, 0o644)
            .unwrap();
        let state = TmpFs::fifo_state(&node).unwrap();
        (node, state)
    }

    #[test]
    fn channel_appears_with_first_reader_and_leaves_with_last() {
        let (node, state) = fifo_node();
        assert!(!state.has_channel());
        let r1 = state.open_read(&node);
        let r2 = state.open_read(&node);
        assert!(state.has_channel());
        drop(r1);
        assert!(state.has_channel());
        drop(r2);
        assert!(!state.has_channel());
    }

    #[test]
    fn nonblocking_writer_needs_a_reader() {
        let (node, state) = fifo_node();
        assert_eq!(
            state
                .open_write(&node, OpenFlags::WRITE | OpenFlags::NONBLOCK, None)
                .err(),
            Some(KernelError::WouldBlock)
        );
        let _reader = state.open_read(&node);
        assert!(state
            .open_write(&node, OpenFlags::WRITE | OpenFlags::NONBLOCK, None)
            .is_ok());
    }

    #[test]
    fn writer_open_blocks_until_reader_arrives() {
        let (node, state) = fifo_node();
        let writer = {
            let node = Arc::clone(&node);
            let state = Arc::clone(&state);
            host::spawn(move || {
                let w = state.open_write(&node, OpenFlags::WRITE, None)?;
                w.try_write(b"ping")
            })
        };
        host::yield_now();
        let reader = state.open_read(&node);
        assert_eq!(writer.join().unwrap().unwrap(), 4);
        let mut buf = [0u8; 8];
        assert_eq!(reader.try_read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"ping");
    }

    #[test]
    fn blocked_writer_open_honors_exit_request() {
        let (node, state) = fifo_node();
        let proc = Process::create("fifo-cancel", None);
        let thread = proc.main_thread();
        let writer = {
            let node = Arc::clone(&node);
            let state = Arc::clone(&state);
            let thread = Arc::clone(&thread);
            host::spawn(move || state.open_write(&node, OpenFlags::WRITE, Some(&thread)).err())
        };
        host::yield_now();
        thread.request_exit();
        assert_eq!(writer.join().unwrap(), Some(KernelError::Interrupted));
    }

    #[test]
    fn reader_before_any_writer_is_not_at_eof() {
        let (node, state) = fifo_node();
        let reader = state.open_read(&node);
        let mut buf = [0u8; 4];
        // Nobody has opened the write side yet: the read must wait, not
        // report end-of-stream.
        assert_eq!(reader.try_read(&mut buf), Err(KernelError::WouldBlock));
        let writer = state
            .open_write(&node, OpenFlags::WRITE | OpenFlags::NONBLOCK, None)
            .unwrap();
        drop(writer);
        assert_eq!(reader.try_read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn reader_sees_eof_when_writers_leave() {
        let (node, state) = fifo_node();
        let reader = state.open_read(&node);
        let writer = state
            .open_write(&node, OpenFlags::WRITE | OpenFlags::NONBLOCK, None)
            .unwrap();
        writer.try_write(b"bye").unwrap();
        drop(writer);
        let mut buf = [0u8; 8];
        assert_eq!(reader.try_read(&mut buf).unwrap(), 3);
        assert_eq!(reader.try_read(&mut buf).unwrap(), 0);
    }
}
