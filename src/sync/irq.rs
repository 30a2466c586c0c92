//! Interrupt masking for critical sections.
//!
//! On a single core a spinlock alone is not enough when the same lock can be
//! taken from an interrupt handler: a reentrant attempt while the core holds
//! the lock is an instant deadlock. Sections with that shape mask interrupts
//! for the duration of the hold. The mask is a depth counter so nested
//! sections compose.

use core::sync::atomic::{AtomicUsize, Ordering};

static MASK_DEPTH: AtomicUsize = AtomicUsize::new(0);

/// Scoped interrupt mask. Dropping the guard re-enables delivery once the
/// outermost guard goes away.
pub struct InterruptGuard {
    _private: (),
}

impl InterruptGuard {
    fn acquire() -> Self {
        MASK_DEPTH.fetch_add(1, Ordering::AcqRel);
        Self { _private: () }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        MASK_DEPTH.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Run `f` with interrupt delivery masked.
pub fn without_interrupts<T>(f: impl FnOnce() -> T) -> T {
    let _guard = InterruptGuard::acquire();
    f()
}

/// Whether interrupt delivery is currently masked.
pub fn interrupts_masked() -> bool {
    MASK_DEPTH.load(Ordering::Acquire) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_depth_nests() {
        without_interrupts(|| {
            assert!(interrupts_masked());
            without_interrupts(|| assert!(interrupts_masked()));
            assert!(interrupts_masked());
        });
    }
}
