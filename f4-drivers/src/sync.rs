//! Producer-side mutual exclusion for interrupt-shared state.
//!
//! [`SpinLock::lock`] masks interrupts through `critical_section::with`
//! (which saves and restores the previous mask state, so nesting inside an
//! already-masked context is fine) and then takes a test-and-set flag. The
//! flag covers producers the interrupt mask alone cannot exclude, such as a
//! second core or a critical-section implementation that only raises BASEPRI.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// Test-and-set spinlock taken inside a critical section.
///
/// Not reentrant: calling [`lock()`](Self::lock) on the same lock from inside
/// its own closure spins forever.
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    pub const fn new() -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
        }
    }

    /// Run `f` with interrupts masked and the lock held.
    pub fn lock<R>(&self, f: impl FnOnce() -> R) -> R {
        critical_section::with(|_| {
            while self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                spin_loop();
            }
            let result = f();
            self.locked.store(false, Ordering::Release);
            result
        })
    }

    /// Whether some context currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}
