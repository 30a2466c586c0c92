//! Scheduling.
//!
//! Single-core cooperative model: blocking code paths spin through
//! [`yield_now`] and the scheduler tracks thread states and the run queue.

pub mod scheduler;

extern crate alloc;

use alloc::sync::Arc;

use crate::task::Thread;

pub use scheduler::{get_scheduler, Scheduler};

/// Cooperative suspension point. Every blocking loop in the kernel passes
/// through here between polls.
pub fn yield_now() {
    #[cfg(test)]
    std::thread::yield_now();
    core::hint::spin_loop();
}

/// The thread currently on the CPU, if the scheduler has dispatched one.
pub fn current_thread() -> Option<Arc<Thread>> {
    get_scheduler().current_thread()
}
