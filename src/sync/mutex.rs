//! Recursive mutex
//!
//! Mutual exclusion built on exclusive (LL/SC) access to the owner word.
//! The acquire path is timing critical: the fast-fail snapshot taken at the
//! top of each attempt is what keeps a release-and-notify landing mid-way
//! from turning into a lost wakeup.

use core::cell::{Cell, UnsafeCell};

use crate::kernel;
use crate::port;
use crate::task::OsTcb;
use crate::wait::WaitQueue;

/// Recursive mutex.
///
/// The owning task may acquire again without blocking; acquire and release
/// calls must balance for the mutex to be handed on. Blocking is indefinite:
/// if the owner never releases, a contending task never returns.
pub struct OsMutex {
    /// Owning task's TCB address, 0 when free. Only ever updated through
    /// the exclusive monitor.
    owner: UnsafeCell<usize>,
    /// Recursion depth. Zero exactly when `owner` is 0, and only touched by
    /// the owner.
    counter: Cell<u32>,
    /// Tasks blocked on this mutex.
    wait_queue: WaitQueue,
}

// SAFETY: the owner word goes through LL/SC only; the counter is only
// touched while holding the mutex; the wait queue is kernel-side state.
unsafe impl Send for OsMutex {}
unsafe impl Sync for OsMutex {}

impl OsMutex {
    /// Create a new, free mutex.
    pub const fn new() -> Self {
        OsMutex {
            owner: UnsafeCell::new(0),
            counter: Cell::new(0),
            wait_queue: WaitQueue::new(),
        }
    }

    /// Reset to the free state. Must not be called while tasks contend.
    pub fn init(&self) {
        unsafe { self.owner.get().write_volatile(0) };
        self.counter.set(0);
        self.wait_queue.init();
    }

    #[inline]
    fn current_addr() -> usize {
        kernel::os_current_tcb().map_or(0, |tcb| tcb.as_ptr() as usize)
    }

    /// Acquire the mutex, waiting for the owner to release it if necessary.
    ///
    /// Each attempt snapshots the fast-fail counter, exclusively loads the
    /// owner word and either claims it, recurses, or waits. The wait aborts
    /// without suspending when a notify slipped in after the snapshot, and
    /// the attempt is simply retried.
    pub fn acquire(&self) {
        debug_assert!(!port::in_interrupt(), "mutex acquire from interrupt context");

        loop {
            // Snapshot first, so a release landing anywhere below is caught
            // by the wait syscall's fast-fail check.
            let fail_fast_seen = kernel::os_fast_fail_counter();

            let owner = unsafe { port::ll_load(self.owner.get()) };
            if owner == 0 {
                if unsafe { port::sc_store(Self::current_addr(), self.owner.get()) } {
                    // Claimed. Settle the store before touching protected
                    // data.
                    port::memory_barrier();
                    break;
                }
                // Monitor was cleared under us; retry.
            } else if owner == Self::current_addr() {
                // Recursive re-entry, no store needed.
                break;
            } else {
                kernel::os_wait(&self.wait_queue, fail_fast_seen);
            }
        }

        self.counter.set(self.counter.get() + 1);
    }

    /// Release the mutex. A call from a task that is not the owner does
    /// nothing. Waiters are notified once the recursion depth reaches zero.
    pub fn release(&self) {
        if unsafe { self.owner.get().read_volatile() } != Self::current_addr() {
            return;
        }

        // Settle protected-data writes before the mutex changes hands.
        port::memory_barrier();
        self.counter.set(self.counter.get().saturating_sub(1));
        if self.counter.get() == 0 {
            unsafe { self.owner.get().write_volatile(0) };
            // A task that never waited can slip in and claim the mutex
            // right here. The waiter notified below then loses the retry
            // and simply waits again - wasteful but harmless.
            kernel::os_notify(&self.wait_queue);
        }
    }

    /// Whether some task currently owns the mutex.
    #[inline]
    pub fn is_owned(&self) -> bool {
        (unsafe { self.owner.get().read_volatile() }) != 0
    }

    /// The owning task, if any.
    pub fn owner(&self) -> Option<*const OsTcb> {
        match unsafe { self.owner.get().read_volatile() } {
            0 => None,
            addr => Some(addr as *const OsTcb),
        }
    }
}

impl Default for OsMutex {
    fn default() -> Self {
        Self::new()
    }
}
