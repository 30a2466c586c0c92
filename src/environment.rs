//! Kernel-wide tunable constants.

/// Default capacity of the kernel heap arena in bytes.
pub const DEFAULT_HEAP_SIZE: usize = 4 * 1024 * 1024;

/// Alignment every heap allocation is rounded up to.
pub const HEAP_ALIGN: usize = 16;

/// Per-process file descriptor table capacity.
pub const MAX_FDS: usize = 4096;

/// Number of entries in the syscall dispatch table.
pub const SYSCALL_TABLE_SIZE: usize = 256;

/// Bucket count of the fixed-size dictionary. Kept a small prime.
pub const DICT_BUCKETS: usize = 31;

/// Default capacity of a byte FIFO backing an input device.
pub const FIFO_CAPACITY: usize = 256;

/// Pipe ring buffer capacity in bytes.
pub const PIPE_BUFFER_SIZE: usize = 4096;

/// Capacity of the kernel message ring.
pub const KLOG_CAPACITY: usize = 64 * 1024;

/// Chunk size of the block-chunked growable buffer.
pub const CHUNK_SIZE: usize = 512;

/// Record size of the boot archive format.
pub const ARCHIVE_BLOCK_SIZE: usize = 512;
