//! Wait queue: blocking coordination between threads.
//!
//! A `WaitQueue` lets threads block until a producer announces an event.
//! Two signaling flavors exist and they are easy to confuse:
//!
//! - [`WaitQueue::pulse`] is a synchronous broadcast-and-join. It wakes every
//!   queued waiter, then blocks the *caller* until all of them have left the
//!   wait accounting, and finally clears the signaled flag. Used where the
//!   signaler must know the event was observed before tearing state down
//!   (process exit delivering its status to reapers).
//! - [`WaitQueue::empty`] wakes everyone and returns immediately, leaving the
//!   signaled flag latched. Used for timer-style one-shot wakeups.
//!
//! A waiter that has been marked exit-requested leaves the wait with
//! `Interrupted` instead of sleeping forever.

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use spin::Mutex;

use crate::error::{KernelError, Result};
use crate::sched::scheduler::get_scheduler;
use crate::task::{Thread, ThreadState};

pub struct WaitQueue {
    /// Threads currently queued for wakeup.
    waiters: Mutex<VecDeque<Arc<Thread>>>,
    /// Event flag. Waiters poll this in addition to the scheduler wakeup.
    signaled: AtomicBool,
    /// Threads currently inside `wait`, queued or not.
    inside: AtomicUsize,
    name: &'static str,
}

impl WaitQueue {
    pub const fn new(name: &'static str) -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
            signaled: AtomicBool::new(false),
            inside: AtomicUsize::new(0),
            name,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of threads currently inside a wait.
    pub fn waiter_count(&self) -> usize {
        self.inside.load(Ordering::Acquire)
    }

    /// Whether the queue is currently signaled.
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Block `thread` until the queue is signaled.
    ///
    /// If the queue is already signaled the call returns without sleeping.
    /// The signaled flag is polled as well as waiting for the scheduler
    /// wakeup, so a missed state transition cannot strand the waiter.
    pub fn wait(&self, thread: &Arc<Thread>) -> Result<()> {
        self.wait_until(thread, || false)
    }

    /// Like [`WaitQueue::wait`], but also returns once `done` observes the
    /// event through shared state. A `pulse` that fires between the
    /// caller's own check and the queue registration sees no waiters and
    /// latches nothing; `done` is what lets such a late waiter through.
    pub fn wait_until(&self, thread: &Arc<Thread>, done: impl Fn() -> bool) -> Result<()> {
        self.inside.fetch_add(1, Ordering::AcqRel);

        if !self.signaled.load(Ordering::Acquire) && !done() {
            self.waiters.lock().push_back(Arc::clone(thread));
            get_scheduler().schedule(ThreadState::Sleeping, thread);

            while !self.signaled.load(Ordering::Acquire) && !done() {
                if thread.exit_requested() {
                    self.waiters.lock().retain(|t| t.tid() != thread.tid());
                    self.inside.fetch_sub(1, Ordering::AcqRel);
                    get_scheduler().schedule(ThreadState::Runnable, thread);
                    return Err(KernelError::Interrupted);
                }
                core::hint::spin_loop();
            }
            self.waiters.lock().retain(|t| t.tid() != thread.tid());
            get_scheduler().schedule(ThreadState::Runnable, thread);
        }

        self.inside.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    /// Broadcast the event and join: wake every queued waiter, block until
    /// all of them have left the wait accounting, then clear the flag.
    ///
    /// A pulse with no waiters is a no-op.
    pub fn pulse(&self) {
        if self.inside.load(Ordering::Acquire) == 0 {
            return;
        }
        self.signaled.store(true, Ordering::Release);

        let drained: VecDeque<Arc<Thread>> = {
            let mut waiters = self.waiters.lock();
            waiters.drain(..).collect()
        };
        for thread in &drained {
            get_scheduler().schedule(ThreadState::Runnable, thread);
        }

        // Join: all waiters have been scheduled runnable, but the caller may
        // not proceed until every one of them has exited the wait.
        while self.inside.load(Ordering::Acquire) > 0 {
            core::hint::spin_loop();
        }
        self.signaled.store(false, Ordering::Release);
    }

    /// One-time latch: wake every queued waiter and return immediately.
    /// The signaled flag stays set, so late arrivals pass straight through.
    pub fn empty(&self) {
        self.signaled.store(true, Ordering::Release);
        let drained: VecDeque<Arc<Thread>> = {
            let mut waiters = self.waiters.lock();
            waiters.drain(..).collect()
        };
        for thread in &drained {
            get_scheduler().schedule(ThreadState::Runnable, thread);
        }
    }
}
