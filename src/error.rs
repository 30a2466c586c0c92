//! Kernel error taxonomy.
//!
//! Every kernel-internal operation reports failure through [`KernelError`].
//! Syscall handlers flatten results into a signed word where negative values
//! are negated errno codes and non-negative values carry the payload (byte
//! counts, descriptor numbers, pids).

use core::fmt;

/// Errors a kernel operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Path segment or object does not exist.
    NoSuchEntry,
    /// Descriptor number does not refer to an open file.
    BadDescriptor,
    /// A directory was required but the node is not one.
    NotADirectory,
    /// A non-directory was required but the node is a directory.
    IsADirectory,
    /// The descriptor table is full.
    TooManyOpenFiles,
    /// Terminal operation on a non-terminal device.
    NotATty,
    /// No space left on the device or buffer.
    NoSpace,
    /// The operation table has no hook for this operation.
    NotSupported,
    /// A blocking call was cancelled by a termination request.
    Interrupted,
    /// Non-blocking path found nothing to do.
    WouldBlock,
    /// Malformed argument.
    InvalidArgument,
    /// Name or object already exists.
    AlreadyExists,
    /// Write to a pipe with no readers.
    BrokenPipe,
    /// Kernel heap arena exhausted.
    OutOfMemory,
    /// FIFO operation on a non-FIFO node.
    NotAPipe,
    /// Resource is held by someone else.
    Busy,
    /// A fixed-size table ran out of slots.
    Exhausted,
}

impl KernelError {
    /// Positive errno value for this error.
    pub fn errno(&self) -> i32 {
        match self {
            KernelError::NoSuchEntry => 2,       // ENOENT
            KernelError::Interrupted => 4,       // EINTR
            KernelError::BadDescriptor => 9,     // EBADF
            KernelError::WouldBlock => 11,       // EAGAIN
            KernelError::OutOfMemory => 12,      // ENOMEM
            KernelError::Busy => 16,             // EBUSY
            KernelError::AlreadyExists => 17,    // EEXIST
            KernelError::NotADirectory => 20,    // ENOTDIR
            KernelError::IsADirectory => 21,     // EISDIR
            KernelError::InvalidArgument => 22,  // EINVAL
            KernelError::TooManyOpenFiles => 24, // EMFILE
            KernelError::NotATty => 25,          // ENOTTY
            KernelError::Exhausted => 23,        // ENFILE
            KernelError::NoSpace => 28,          // ENOSPC
            KernelError::NotAPipe => 29,         // ESPIPE
            KernelError::BrokenPipe => 32,       // EPIPE
            KernelError::NotSupported => 95,     // ENOTSUP
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (errno {})", self, self.errno())
    }
}

/// Result alias used across the kernel.
pub type Result<T> = core::result::Result<T, KernelError>;

/// Flatten a kernel result into the syscall return convention.
pub fn syscall_return(res: Result<usize>) -> isize {
    match res {
        Ok(v) => v as isize,
        Err(e) => -(e.errno() as isize),
    }
}
