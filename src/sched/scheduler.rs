//! Thread scheduler.
//!
//! Every thread state transition goes through [`Scheduler::schedule`]; no
//! other code touches a thread's state. `Dead` is terminal and triggers
//! reclamation: the thread leaves the run queue, the thread map, and its
//! owning process's thread list.

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use hashbrown::HashMap;
use spin::{Mutex, Once};

use crate::task::{Thread, ThreadState, Tid};

pub struct Scheduler {
    threads: Mutex<HashMap<Tid, Arc<Thread>>>,
    run_queue: Mutex<VecDeque<Tid>>,
    current: Mutex<Option<Arc<Thread>>>,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
            run_queue: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
        }
    }

    /// Make `thread` known to the scheduler. Idempotent.
    pub fn register(&self, thread: &Arc<Thread>) {
        self.threads.lock().insert(thread.tid(), Arc::clone(thread));
    }

    /// The single state-transition entry point.
    pub fn schedule(&self, state: ThreadState, thread: &Arc<Thread>) {
        thread.set_state(state);
        let tid = thread.tid();
        match state {
            ThreadState::Runnable => {
                let mut queue = self.run_queue.lock();
                if !queue.contains(&tid) {
                    queue.push_back(tid);
                }
            }
            ThreadState::Dead => {
                self.run_queue.lock().retain(|&t| t != tid);
                self.threads.lock().remove(&tid);
                if let Some(process) = thread.process() {
                    process.reclaim_thread(thread);
                }
                let mut current = self.current.lock();
                if current.as_ref().is_some_and(|c| c.tid() == tid) {
                    *current = None;
                }
            }
            _ => {
                self.run_queue.lock().retain(|&t| t != tid);
            }
        }
    }

    /// Round-robin dispatch: rotate the front of the run queue into the
    /// current slot.
    pub fn pick_next(&self) -> Option<Arc<Thread>> {
        let next = {
            let mut queue = self.run_queue.lock();
            let tid = queue.pop_front()?;
            queue.push_back(tid);
            tid
        };
        let thread = self.threads.lock().get(&next).cloned()?;
        *self.current.lock() = Some(Arc::clone(&thread));
        Some(thread)
    }

    pub fn current_thread(&self) -> Option<Arc<Thread>> {
        self.current.lock().clone()
    }

    pub fn set_current(&self, thread: Option<Arc<Thread>>) {
        *self.current.lock() = thread;
    }

    pub fn thread(&self, tid: Tid) -> Option<Arc<Thread>> {
        self.threads.lock().get(&tid).cloned()
    }

    pub fn run_queue_len(&self) -> usize {
        self.run_queue.lock().len()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }
}

static SCHEDULER: Once<Scheduler> = Once::new();

pub fn get_scheduler() -> &'static Scheduler {
    SCHEDULER.call_once(Scheduler::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Process;

    #[test]
    fn runnable_threads_rotate_through_the_queue() {
        let sched = Scheduler::new();
        let proc = Process::create("rotate", None);
        let a = proc.spawn_thread(0, 0);
        let b = proc.spawn_thread(0, 0);
        sched.register(&a);
        sched.register(&b);
        sched.schedule(ThreadState::Runnable, &a);
        sched.schedule(ThreadState::Runnable, &b);

        let first = sched.pick_next().unwrap();
        let second = sched.pick_next().unwrap();
        let third = sched.pick_next().unwrap();
        assert_ne!(first.tid(), second.tid());
        assert_eq!(first.tid(), third.tid());
        assert_eq!(sched.current_thread().unwrap().tid(), third.tid());
    }

    #[test]
    fn sleeping_thread_leaves_the_run_queue() {
        let sched = Scheduler::new();
        let proc = Process::create("sleeper", None);
        let t = proc.spawn_thread(0, 0);
        sched.register(&t);
        sched.schedule(ThreadState::Runnable, &t);
        assert_eq!(sched.run_queue_len(), 1);
        sched.schedule(ThreadState::Sleeping, &t);
        assert_eq!(sched.run_queue_len(), 0);
        assert_eq!(t.state(), ThreadState::Sleeping);
        assert!(sched.pick_next().is_none());
    }

    #[test]
    fn dead_thread_is_reclaimed_everywhere() {
        let sched = Scheduler::new();
        let proc = Process::create("reclaim", None);
        let t = proc.spawn_thread(0, 0);
        let before = proc.thread_count();
        sched.register(&t);
        sched.schedule(ThreadState::Runnable, &t);

        sched.schedule(ThreadState::Dead, &t);
        assert_eq!(t.state(), ThreadState::Dead);
        assert_eq!(sched.run_queue_len(), 0);
        assert!(sched.thread(t.tid()).is_none());
        assert_eq!(proc.thread_count(), before - 1);
    }
}
