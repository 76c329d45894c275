//! Counting semaphore
//!
//! Token counting on an exclusively-accessed word. One type covers three
//! shapes: bounded counting (blocks when empty and when full), binary
//! (bound of one), and unbounded (never blocks on give; overflow is the
//! caller's concern).

use core::cell::{Cell, UnsafeCell};

use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::port;
use crate::types::OsSemCtr;
use crate::wait::WaitQueue;

/// Counting semaphore.
pub struct OsSem {
    /// Available tokens. Only ever updated through the exclusive monitor.
    tokens: UnsafeCell<OsSemCtr>,
    /// Token ceiling; 0 means unbounded.
    max_tokens: Cell<OsSemCtr>,
    /// Tasks blocked on this semaphore, takers and givers alike.
    wait_queue: WaitQueue,
}

// SAFETY: the token word goes through LL/SC only; ceiling and wait queue
// follow the kernel-mode access discipline.
unsafe impl Send for OsSem {}
unsafe impl Sync for OsSem {}

impl OsSem {
    /// Create an empty, unbounded semaphore. Usually followed by one of the
    /// `init` calls before the OS starts.
    pub const fn new() -> Self {
        OsSem {
            tokens: UnsafeCell::new(0),
            max_tokens: Cell::new(0),
            wait_queue: WaitQueue::new(),
        }
    }

    /// Initialize a bounded counting semaphore: takers block while empty,
    /// givers block while full. `max_tokens == 0` removes the upper bound.
    ///
    /// # Errors
    /// * `OsError::SemTokensAboveCeiling` - `init_tokens` exceeds the bound
    pub fn init(&self, max_tokens: OsSemCtr, init_tokens: OsSemCtr) -> OsResult<()> {
        if max_tokens != 0 && init_tokens > max_tokens {
            return Err(OsError::SemTokensAboveCeiling);
        }
        self.max_tokens.set(max_tokens);
        unsafe { self.tokens.get().write_volatile(init_tokens) };
        self.wait_queue.init();
        Ok(())
    }

    /// Initialize a binary semaphore: one token at most, starting full or
    /// empty.
    pub fn init_binary(&self, init_full: bool) -> OsResult<()> {
        self.init(1, init_full as OsSemCtr)
    }

    /// Initialize an unbounded counting semaphore starting at zero. Givers
    /// never block; keeping gives and takes balanced against overflow is
    /// the caller's concern.
    pub fn init_counting(&self) -> OsResult<()> {
        self.init(0, 0)
    }

    /// Take one token, waiting while the semaphore is empty.
    ///
    /// Once this returns, a token has been consumed. Each attempt snapshots
    /// the fast-fail counter before the exclusive load, so a give landing
    /// mid-attempt aborts the wait instead of being lost.
    pub fn take(&self) {
        debug_assert!(!port::in_interrupt(), "semaphore take from interrupt context");

        loop {
            let fail_fast_seen = kernel::os_fast_fail_counter();

            let tokens = unsafe { port::ll_load(self.tokens.get()) };
            if tokens > 0 {
                if unsafe { port::sc_store(tokens - 1, self.tokens.get()) } {
                    // A giver may be blocked on a full semaphore; the freed
                    // slot is its wakeup.
                    kernel::os_notify(&self.wait_queue);
                    return;
                }
            } else {
                kernel::os_wait(&self.wait_queue, fail_fast_seen);
            }
        }
    }

    /// Give one token, waiting while a bounded semaphore is full.
    ///
    /// Once this returns, a token has been added and the best waiter (if
    /// any) has been notified.
    pub fn give(&self) {
        loop {
            let fail_fast_seen = kernel::os_fast_fail_counter();

            let tokens = unsafe { port::ll_load(self.tokens.get()) };
            let max_tokens = self.max_tokens.get();
            if max_tokens == 0 || tokens < max_tokens {
                if unsafe { port::sc_store(tokens.wrapping_add(1), self.tokens.get()) } {
                    kernel::os_notify(&self.wait_queue);
                    return;
                }
            } else {
                kernel::os_wait(&self.wait_queue, fail_fast_seen);
            }
        }
    }

    /// Current token count.
    #[inline]
    pub fn tokens(&self) -> OsSemCtr {
        unsafe { self.tokens.get().read_volatile() }
    }
}

impl Default for OsSem {
    fn default() -> Self {
        Self::new()
    }
}
