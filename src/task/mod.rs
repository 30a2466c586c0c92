//! Processes and threads.
//!
//! A [`Process`] owns its threads, descriptor table, working directory and
//! address space; a [`Thread`] is a schedulable execution context with a
//! saved register snapshot. Ownership points downward: processes hold
//! their threads strongly, threads refer back through `Weak`, so a dead
//! process cannot be kept alive by its own members.

pub mod signal;

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use bitflags::bitflags;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use hashbrown::HashMap;
use spin::{Mutex, Once};

use crate::collections::List;
use crate::error::{KernelError, Result};
use crate::fs::vfs::core::VfsNode;
use crate::kinfo;
use crate::object::FdTable;
use crate::sched::scheduler::get_scheduler;
use crate::sched::yield_now;
use crate::sync::WaitQueue;
use crate::vm::MemorySpace;

use signal::{SignalContext, SignalHandler};

pub type Pid = u32;
pub type Tid = u32;

/// Thread scheduling states. Transitions happen only through
/// `Scheduler::schedule`; `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Runnable,
    Sleeping,
    Stopped,
    Zombie,
    Waiting,
    Locked,
    Dead,
}

/// The saved register file of a suspended thread, reduced to the calling
/// convention slots the kernel actually manipulates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterContext {
    pub pc: usize,
    pub sp: usize,
    pub ra: usize,
    pub a0: usize,
    pub a1: usize,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CloneFlags: u32 {
        const SHARE_VM = 1 << 0;
        const SHARE_FILES = 1 << 1;
    }
}

static NEXT_PID: AtomicU32 = AtomicU32::new(1);

pub struct Thread {
    tid: Tid,
    process: Mutex<Weak<Process>>,
    state: Mutex<ThreadState>,
    context: Mutex<RegisterContext>,
    in_interrupt: AtomicBool,
    exit_requested: AtomicBool,
    /// Contexts saved by signal splicing, restored by `sigreturn`.
    signal_stack: Mutex<Vec<SignalContext>>,
    /// Signals deferred because the thread was mid-interrupt.
    pending_signals: Mutex<Vec<SignalContext>>,
}

impl Thread {
    fn new(tid: Tid, process: Weak<Process>) -> Arc<Self> {
        Arc::new(Self {
            tid,
            process: Mutex::new(process),
            state: Mutex::new(ThreadState::Runnable),
            context: Mutex::new(RegisterContext::default()),
            in_interrupt: AtomicBool::new(false),
            exit_requested: AtomicBool::new(false),
            signal_stack: Mutex::new(Vec::new()),
            pending_signals: Mutex::new(Vec::new()),
        })
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn process(&self) -> Option<Arc<Process>> {
        self.process.lock().upgrade()
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ThreadState) {
        *self.state.lock() = state;
    }

    pub fn context(&self) -> RegisterContext {
        self.context.lock().clone()
    }

    pub fn set_context(&self, context: RegisterContext) {
        *self.context.lock() = context;
    }

    pub fn in_interrupt(&self) -> bool {
        self.in_interrupt.load(Ordering::Acquire)
    }

    /// Interrupt entry/exit bracket, set by the trap path.
    pub fn set_in_interrupt(&self, value: bool) {
        self.in_interrupt.store(value, Ordering::Release);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::Acquire)
    }

    /// Ask the thread to leave its current blocking loop. Cooperative:
    /// a loop that never checks the flag never notices.
    pub fn request_exit(&self) {
        self.exit_requested.store(true, Ordering::Release);
    }

    /// Redirect the thread into a signal handler: the current register
    /// snapshot is pushed for later restoration and the snapshot is
    /// rewritten so resumption enters `handler(signal, arg)`.
    ///
    /// This is the one place that pokes saved registers directly.
    pub(crate) fn splice_signal(&self, handler: usize, arg: usize, sig: u32) {
        let mut context = self.context.lock();
        let saved = context.clone();
        self.signal_stack.lock().push(SignalContext {
            signal: sig,
            handler,
            arg,
            saved,
        });
        context.pc = handler;
        context.a0 = sig as usize;
        context.a1 = arg;
    }

    /// Return from a spliced handler: restore the snapshot saved at
    /// delivery time.
    pub fn sigreturn(&self) -> Result<()> {
        let frame = self
            .signal_stack
            .lock()
            .pop()
            .ok_or(KernelError::InvalidArgument)?;
        *self.context.lock() = frame.saved;
        Ok(())
    }

    pub(crate) fn queue_pending_signal(&self, context: SignalContext) {
        self.pending_signals.lock().push(context);
    }

    /// Deferred signals waiting for the thread to leave interrupt context.
    pub fn pending_signal_count(&self) -> usize {
        self.pending_signals.lock().len()
    }

    /// Drain one deferred signal and splice it now. Called on the return
    /// path out of an interrupt.
    pub fn apply_pending_signal(&self) -> bool {
        let next = {
            let mut pending = self.pending_signals.lock();
            if pending.is_empty() {
                return false;
            }
            pending.remove(0)
        };
        self.splice_signal(next.handler, next.arg, next.signal);
        true
    }
}

impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        self.tid == other.tid
    }
}

impl Eq for Thread {}

#[derive(Debug, Clone, Copy)]
pub struct Credentials {
    pub ruid: u32,
    pub euid: u32,
    pub rgid: u32,
    pub egid: u32,
}

impl Credentials {
    const fn root() -> Self {
        Self {
            ruid: 0,
            euid: 0,
            rgid: 0,
            egid: 0,
        }
    }
}

pub struct Process {
    pid: Pid,
    name: String,
    credentials: Mutex<Credentials>,
    umask: AtomicU32,
    threads: List<Arc<Thread>>,
    main: Once<Arc<Thread>>,
    next_tid: AtomicU32,
    parent: Mutex<Weak<Process>>,
    children: Mutex<Vec<Weak<Process>>>,
    fd_table: FdTable,
    cwd: Mutex<Option<Arc<VfsNode>>>,
    root: Mutex<Option<Arc<VfsNode>>>,
    memory: MemorySpace,
    /// Parents blocked reaping this process wait here; `exit` pulses it.
    reaper: WaitQueue,
    signal_handlers: Mutex<HashMap<u32, SignalHandler>>,
    start_time: AtomicU64,
    exit_status: AtomicI32,
    exited: AtomicBool,
}

impl Process {
    /// Create a process with its main thread, register both with the
    /// process table and the scheduler.
    pub fn create(name: &str, parent: Option<&Arc<Process>>) -> Arc<Self> {
        let pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);
        let process = Arc::new(Self {
            pid,
            name: name.to_string(),
            credentials: Mutex::new(Credentials::root()),
            umask: AtomicU32::new(0o022),
            threads: List::new(),
            main: Once::new(),
            next_tid: AtomicU32::new(1),
            parent: Mutex::new(match parent {
                Some(p) => Arc::downgrade(p),
                None => Weak::new(),
            }),
            children: Mutex::new(Vec::new()),
            fd_table: FdTable::new(),
            cwd: Mutex::new(None),
            root: Mutex::new(None),
            memory: MemorySpace::new(),
            reaper: WaitQueue::new("process-reaper"),
            signal_handlers: Mutex::new(HashMap::new()),
            start_time: AtomicU64::new(0),
            exit_status: AtomicI32::new(0),
            exited: AtomicBool::new(false),
        });

        let main = process.spawn_thread(0, 0);
        process.main.call_once(|| main);

        if let Some(p) = parent {
            p.children.lock().push(Arc::downgrade(&process));
        }
        get_process_table().insert(&process);
        kinfo!("task: created process {} (pid {})", name, pid);
        process
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credentials(&self) -> Credentials {
        *self.credentials.lock()
    }

    pub fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.lock() = credentials;
    }

    pub fn umask(&self) -> u32 {
        self.umask.load(Ordering::Acquire)
    }

    pub fn set_umask(&self, umask: u32) {
        self.umask.store(umask & 0o777, Ordering::Release);
    }

    pub fn parent(&self) -> Option<Arc<Process>> {
        self.parent.lock().upgrade()
    }

    pub fn children(&self) -> Vec<Arc<Process>> {
        self.children
            .lock()
            .iter()
            .filter_map(|w| w.upgrade())
            .collect()
    }

    pub fn fd_table(&self) -> &FdTable {
        &self.fd_table
    }

    pub fn memory(&self) -> &MemorySpace {
        &self.memory
    }

    pub fn reaper(&self) -> &WaitQueue {
        &self.reaper
    }

    pub fn cwd(&self) -> Option<Arc<VfsNode>> {
        self.cwd.lock().clone()
    }

    pub fn set_cwd(&self, node: Arc<VfsNode>) {
        *self.cwd.lock() = Some(node);
    }

    pub fn root(&self) -> Option<Arc<VfsNode>> {
        self.root.lock().clone()
    }

    pub fn set_root(&self, node: Arc<VfsNode>) {
        *self.root.lock() = Some(node);
    }

    pub fn start_time(&self) -> u64 {
        self.start_time.load(Ordering::Acquire)
    }

    pub fn set_start_time(&self, time: u64) {
        self.start_time.store(time, Ordering::Release);
    }

    /// The thread created with the process.
    pub fn main_thread(&self) -> Arc<Thread> {
        // Set in `create` before the process is visible anywhere.
        Arc::clone(self.main.get().expect("process main thread"))
    }

    pub fn threads(&self) -> Vec<Arc<Thread>> {
        self.threads.snapshot()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Create a thread entering at `entry` with `arg` in the first
    /// argument register, schedule it runnable.
    pub fn spawn_thread(self: &Arc<Self>, entry: usize, arg: usize) -> Arc<Thread> {
        let tid = self.alloc_tid();
        let thread = Thread::new(tid, Arc::downgrade(self));
        thread.set_context(RegisterContext {
            pc: entry,
            a0: arg,
            ..RegisterContext::default()
        });
        self.threads.append(Arc::clone(&thread));
        get_scheduler().register(&thread);
        get_scheduler().schedule(ThreadState::Runnable, &thread);
        thread
    }

    /// `clone` in the restricted form this kernel supports: the child
    /// shares the address space and the file table, nothing else is
    /// accepted. The caller yields once so the child runs first.
    pub fn clone_thread(
        self: &Arc<Self>,
        entry: usize,
        stack: usize,
        flags: CloneFlags,
        arg: usize,
    ) -> Result<Tid> {
        if flags != CloneFlags::SHARE_VM | CloneFlags::SHARE_FILES {
            return Err(KernelError::NotSupported);
        }
        let tid = self.alloc_tid();
        let thread = Thread::new(tid, Arc::downgrade(self));
        thread.set_context(RegisterContext {
            pc: entry,
            sp: stack,
            a0: arg,
            ..RegisterContext::default()
        });
        self.threads.append(Arc::clone(&thread));
        get_scheduler().register(&thread);
        get_scheduler().schedule(ThreadState::Runnable, &thread);
        yield_now();
        Ok(tid)
    }

    /// Fork-time copy: new process with a cloned descriptor table, a
    /// copied address space, and the same cwd/root.
    pub fn fork(self: &Arc<Self>, name: &str) -> Arc<Process> {
        let child = Process::create(name, Some(self));
        child.fd_table.clone_from(&self.fd_table);
        if let Some(cwd) = self.cwd() {
            child.set_cwd(cwd);
        }
        if let Some(root) = self.root() {
            child.set_root(root);
        }
        *child.credentials.lock() = self.credentials();
        child
    }

    pub fn signal_handler(&self, sig: u32) -> Option<SignalHandler> {
        self.signal_handlers.lock().get(&sig).copied()
    }

    pub fn register_signal_handler(&self, sig: u32, handler: SignalHandler) {
        self.signal_handlers.lock().insert(sig, handler);
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn exit_status(&self) -> i32 {
        self.exit_status.load(Ordering::Acquire)
    }

    /// Terminate the process. Runs at most once; later calls are no-ops.
    ///
    /// Every owned thread is asked to exit. Threads currently servicing an
    /// interrupt keep running until they check the flag; the rest go
    /// straight to `Zombie`. The reaper queue is pulsed last, so a parent
    /// blocked in [`Process::wait_for_exit`] observes the exit before this
    /// call returns.
    pub fn exit(&self, status: i32) {
        if self.exited.swap(true, Ordering::AcqRel) {
            return;
        }
        self.exit_status.store(status, Ordering::Release);
        for thread in self.threads.snapshot() {
            thread.request_exit();
            if !thread.in_interrupt() {
                get_scheduler().schedule(ThreadState::Zombie, &thread);
            }
        }
        kinfo!("task: pid {} exited with status {}", self.pid, status);
        self.reaper.pulse();
    }

    /// Block `waiter` until this process exits, then reap it: the status
    /// is returned, the remaining threads go `Dead`, and the process table
    /// entry is dropped. The exited flag is re-checked inside the wait so
    /// an exit that completes between the caller's check and the queue
    /// registration cannot strand the waiter.
    pub fn wait_for_exit(&self, waiter: &Arc<Thread>) -> Result<i32> {
        while !self.has_exited() {
            self.reaper.wait_until(waiter, || self.has_exited())?;
        }
        let status = self.exit_status();
        self.reap();
        Ok(status)
    }

    /// Retire a reaped process. Idempotent.
    fn reap(&self) {
        for thread in self.threads.snapshot() {
            get_scheduler().schedule(ThreadState::Dead, &thread);
        }
        get_process_table().remove(self.pid);
    }

    /// Called by the scheduler when one of our threads goes `Dead`.
    pub(crate) fn reclaim_thread(&self, thread: &Arc<Thread>) {
        self.threads.remove(thread);
    }

    fn alloc_tid(&self) -> Tid {
        self.next_tid.fetch_add(1, Ordering::Relaxed)
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("exited", &self.has_exited())
            .finish()
    }
}

/// Global pid → process map.
pub struct ProcessTable {
    processes: Mutex<HashMap<Pid, Arc<Process>>>,
}

impl ProcessTable {
    fn new() -> Self {
        Self {
            processes: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, process: &Arc<Process>) {
        self.processes
            .lock()
            .insert(process.pid(), Arc::clone(process));
    }

    pub fn get(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes.lock().get(&pid).cloned()
    }

    /// Drop the table's reference, after the exit status has been reaped.
    pub fn remove(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes.lock().remove(&pid)
    }

    pub fn all(&self) -> Vec<Arc<Process>> {
        self.processes.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.processes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.lock().is_empty()
    }
}

static PROCESS_TABLE: Once<ProcessTable> = Once::new();

pub fn get_process_table() -> &'static ProcessTable {
    PROCESS_TABLE.call_once(ProcessTable::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread as host;

    #[test]
    fn create_registers_pid_and_main_thread() {
        let proc = Process::create("init-test", None);
        assert_eq!(proc.thread_count(), 1);
        assert_eq!(proc.main_thread().state(), ThreadState::Runnable);
        let found = get_process_table().get(proc.pid()).unwrap();
        assert_eq!(found.pid(), proc.pid());
        get_process_table().remove(proc.pid());
    }

    #[test]
    fn clone_rejects_unsupported_flag_combinations() {
        let proc = Process::create("clone-flags", None);
        assert_eq!(
            proc.clone_thread(0x1000, 0x2000, CloneFlags::SHARE_VM, 0),
            Err(KernelError::NotSupported)
        );
        assert_eq!(
            proc.clone_thread(0x1000, 0x2000, CloneFlags::empty(), 0),
            Err(KernelError::NotSupported)
        );
        let tid = proc
            .clone_thread(0x1000, 0x2000, CloneFlags::SHARE_VM | CloneFlags::SHARE_FILES, 7)
            .unwrap();
        let thread = proc
            .threads()
            .into_iter()
            .find(|t| t.tid() == tid)
            .unwrap();
        let ctx = thread.context();
        assert_eq!(ctx.pc, 0x1000);
        assert_eq!(ctx.sp, 0x2000);
        assert_eq!(ctx.a0, 7);
        get_process_table().remove(proc.pid());
    }

    #[test]
    fn exit_happens_exactly_once() {
        let proc = Process::create("exit-once", None);
        proc.exit(3);
        proc.exit(99);
        assert!(proc.has_exited());
        assert_eq!(proc.exit_status(), 3);
        assert_eq!(proc.main_thread().state(), ThreadState::Zombie);
        assert!(proc.main_thread().exit_requested());
        get_process_table().remove(proc.pid());
    }

    #[test]
    fn exit_defers_threads_stuck_in_interrupts() {
        let proc = Process::create("exit-deferred", None);
        let thread = proc.main_thread();
        thread.set_in_interrupt(true);
        proc.exit(0);
        // Not forced to Zombie; only marked.
        assert_ne!(thread.state(), ThreadState::Zombie);
        assert!(thread.exit_requested());
        get_process_table().remove(proc.pid());
    }

    #[test]
    fn parent_reaps_exit_status_synchronously() {
        let child = Process::create("reaped", None);
        let parent = Process::create("reaper", None);
        let waiter = parent.main_thread();

        let reap = {
            let child = Arc::clone(&child);
            let waiter = Arc::clone(&waiter);
            host::spawn(move || child.wait_for_exit(&waiter))
        };
        while child.reaper().waiter_count() == 0 {
            host::yield_now();
        }
        child.exit(42);
        assert_eq!(reap.join().unwrap().unwrap(), 42);
        get_process_table().remove(child.pid());
        get_process_table().remove(parent.pid());
    }

    #[test]
    fn reaping_retires_threads_and_the_table_entry() {
        let child = Process::create("retired", None);
        let parent = Process::create("retirer", None);
        let pid = child.pid();
        child.exit(7);
        // The pulse is long gone; the waiter passes through on the exited
        // flag and then retires the process.
        assert_eq!(child.wait_for_exit(&parent.main_thread()).unwrap(), 7);
        assert_eq!(child.main_thread().state(), ThreadState::Dead);
        assert_eq!(child.thread_count(), 0);
        assert!(get_process_table().get(pid).is_none());
        get_process_table().remove(parent.pid());
    }

    #[test]
    fn fork_shares_descriptor_streams() {
        use crate::object::{FdFlags, FileObject, KernelObject};
        struct Nop;
        impl FileObject for Nop {}

        let parent = Process::create("fork-parent", None);
        let fd = parent
            .fd_table()
            .open(KernelObject::new(Arc::new(Nop)))
            .unwrap();
        parent.fd_table().set_flags(fd, FdFlags::CLOEXEC).unwrap();
        let child = parent.fork("fork-child");
        assert!(child.fd_table().get(fd).is_ok());
        // Slot flags travel with the descriptor across fork.
        assert_eq!(child.fd_table().flags(fd).unwrap(), FdFlags::CLOEXEC);
        assert_eq!(child.parent().unwrap().pid(), parent.pid());
        assert!(parent.children().iter().any(|c| c.pid() == child.pid()));
        get_process_table().remove(parent.pid());
        get_process_table().remove(child.pid());
    }

    #[test]
    fn sigreturn_restores_the_spliced_context() {
        let proc = Process::create("sigret", None);
        let thread = proc.main_thread();
        thread.set_context(RegisterContext {
            pc: 0x4000,
            sp: 0x8000,
            ra: 0x4444,
            a0: 1,
            a1: 2,
        });
        let before = thread.context();
        thread.splice_signal(0x9000, 0xdead, 15);
        let spliced = thread.context();
        assert_eq!(spliced.pc, 0x9000);
        assert_eq!(spliced.a0, 15);
        assert_eq!(spliced.a1, 0xdead);
        thread.sigreturn().unwrap();
        assert_eq!(thread.context(), before);
        // Nothing left to return from.
        assert_eq!(thread.sigreturn(), Err(KernelError::InvalidArgument));
        get_process_table().remove(proc.pid());
    }
}
