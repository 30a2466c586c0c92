//! Synchronization primitives.
//!
//! Locking is the `spin` crate throughout. On top of it this module adds the
//! interrupt-masked critical section and the wait queue, the two primitives
//! the rest of the kernel coordinates with.

pub mod irq;
pub mod waitqueue;

pub use waitqueue::WaitQueue;
