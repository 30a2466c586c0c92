//! Signal delivery.
//!
//! Unhandled signals fall through a fixed default-disposition table: the
//! terminate-class signals end the process, everything else is ignored.
//! A registered handler is delivered by splicing the handler invocation
//! into the target thread's saved registers, unless the thread is
//! mid-interrupt, in which case the context is queued and the thread is
//! flagged so delivery happens on the interrupt return path instead.

extern crate alloc;

use alloc::sync::Arc;

use crate::error::Result;
use crate::kwarn;

use super::{Process, RegisterContext};

pub const SIGHUP: u32 = 1;
pub const SIGINT: u32 = 2;
pub const SIGQUIT: u32 = 3;
pub const SIGKILL: u32 = 9;
pub const SIGUSR1: u32 = 10;
pub const SIGSEGV: u32 = 11;
pub const SIGUSR2: u32 = 12;
pub const SIGTERM: u32 = 15;
pub const SIGCHLD: u32 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultDisposition {
    Terminate,
    Ignore,
}

/// Disposition applied when no handler is registered.
pub fn default_disposition(sig: u32) -> DefaultDisposition {
    match sig {
        SIGINT | SIGKILL | SIGSEGV | SIGTERM => DefaultDisposition::Terminate,
        _ => DefaultDisposition::Ignore,
    }
}

/// A registered user handler: entry point plus an opaque argument handed
/// through in the second argument register.
#[derive(Debug, Clone, Copy)]
pub struct SignalHandler {
    pub entry: usize,
    pub arg: usize,
}

/// Everything needed to enter a handler later and return from it.
#[derive(Debug, Clone)]
pub struct SignalContext {
    pub signal: u32,
    pub handler: usize,
    pub arg: usize,
    pub saved: RegisterContext,
}

/// Deliver `sig` to `process`.
///
/// `SIGKILL` cannot be handled; it always terminates.
pub fn deliver(process: &Arc<Process>, sig: u32) -> Result<()> {
    let handler = if sig == SIGKILL {
        None
    } else {
        process.signal_handler(sig)
    };

    let Some(handler) = handler else {
        match default_disposition(sig) {
            DefaultDisposition::Terminate => {
                process.exit(128 + sig as i32);
            }
            DefaultDisposition::Ignore => {}
        }
        return Ok(());
    };

    let thread = process.main_thread();
    if thread.in_interrupt() {
        // Rewriting registers that an in-flight interrupt is saving and
        // restoring is a race; queue the context and flag the thread.
        thread.queue_pending_signal(SignalContext {
            signal: sig,
            handler: handler.entry,
            arg: handler.arg,
            saved: thread.context(),
        });
        thread.request_exit();
    } else {
        thread.splice_signal(handler.entry, handler.arg, sig);
    }
    Ok(())
}

/// Report a user-mode fault: dump the faulting context to the kernel log
/// and terminate the process with the segfault disposition. The kernel
/// itself keeps running.
pub fn handle_user_fault(process: &Arc<Process>, reason: &str) {
    let context = process.main_thread().context();
    kwarn!(
        "fault: pid {} ({}) {}: pc={:#x} sp={:#x} ra={:#x}",
        process.pid(),
        process.name(),
        reason,
        context.pc,
        context.sp,
        context.ra
    );
    process.exit(128 + SIGSEGV as i32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{get_process_table, Process, RegisterContext};

    #[test]
    fn default_dispositions() {
        assert_eq!(default_disposition(SIGKILL), DefaultDisposition::Terminate);
        assert_eq!(default_disposition(SIGINT), DefaultDisposition::Terminate);
        assert_eq!(default_disposition(SIGCHLD), DefaultDisposition::Ignore);
        assert_eq!(default_disposition(SIGUSR1), DefaultDisposition::Ignore);
    }

    #[test]
    fn unhandled_terminate_signal_ends_the_process() {
        let proc = Process::create("sig-term", None);
        deliver(&proc, SIGTERM).unwrap();
        assert!(proc.has_exited());
        assert_eq!(proc.exit_status(), 128 + SIGTERM as i32);
        get_process_table().remove(proc.pid());
    }

    #[test]
    fn unhandled_ignored_signal_is_a_noop() {
        let proc = Process::create("sig-ignore", None);
        deliver(&proc, SIGUSR2).unwrap();
        assert!(!proc.has_exited());
        get_process_table().remove(proc.pid());
    }

    #[test]
    fn handler_is_spliced_into_user_mode_thread() {
        let proc = Process::create("sig-splice", None);
        proc.register_signal_handler(
            SIGUSR1,
            SignalHandler {
                entry: 0xcafe,
                arg: 0x77,
            },
        );
        let thread = proc.main_thread();
        thread.set_context(RegisterContext {
            pc: 0x1000,
            sp: 0x2000,
            ..RegisterContext::default()
        });

        deliver(&proc, SIGUSR1).unwrap();
        let ctx = thread.context();
        assert_eq!(ctx.pc, 0xcafe);
        assert_eq!(ctx.a0, SIGUSR1 as usize);
        assert_eq!(ctx.a1, 0x77);
        // Handler returns through sigreturn to the original context.
        thread.sigreturn().unwrap();
        assert_eq!(thread.context().pc, 0x1000);
        get_process_table().remove(proc.pid());
    }

    #[test]
    fn delivery_is_deferred_while_mid_interrupt() {
        let proc = Process::create("sig-deferred", None);
        proc.register_signal_handler(
            SIGUSR1,
            SignalHandler {
                entry: 0xcafe,
                arg: 0,
            },
        );
        let thread = proc.main_thread();
        thread.set_context(RegisterContext {
            pc: 0x1000,
            ..RegisterContext::default()
        });
        thread.set_in_interrupt(true);

        deliver(&proc, SIGUSR1).unwrap();
        // Registers untouched; context parked on the pending queue.
        assert_eq!(thread.context().pc, 0x1000);
        assert_eq!(thread.pending_signal_count(), 1);
        assert!(thread.exit_requested());

        // Interrupt return path applies it.
        thread.set_in_interrupt(false);
        assert!(thread.apply_pending_signal());
        assert_eq!(thread.context().pc, 0xcafe);
        assert_eq!(thread.pending_signal_count(), 0);
        get_process_table().remove(proc.pid());
    }

    #[test]
    fn sigkill_ignores_registered_handlers() {
        let proc = Process::create("sig-kill", None);
        proc.register_signal_handler(
            SIGKILL,
            SignalHandler {
                entry: 0xcafe,
                arg: 0,
            },
        );
        deliver(&proc, SIGKILL).unwrap();
        assert!(proc.has_exited());
        get_process_table().remove(proc.pid());
    }

    #[test]
    fn user_fault_terminates_only_the_process() {
        let proc = Process::create("faulting", None);
        handle_user_fault(&proc, "unhandled page fault");
        assert!(proc.has_exited());
        assert_eq!(proc.exit_status(), 128 + SIGSEGV as i32);
        get_process_table().remove(proc.pid());
    }
}
