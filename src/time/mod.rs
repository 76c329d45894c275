//! Time management
//!
//! The system tick and the sleep subsystem. `os_sleep` parks the calling
//! task on the sleep heap; the scheduler polls the heap root on every
//! scheduling decision and re-admits tasks whose wake tick has passed.

mod sleep_heap;

use core::ptr::NonNull;

use sleep_heap::SleepHeap;

use crate::config::MAX_SLEEP_TICKS;
use crate::sync::mutex::OsMutex;
use crate::task::OsTcb;
use crate::types::state;
use crate::{kernel, port, trace};

/// All sleeping tasks, keyed on wake tick.
static SLEEP_HEAP: SleepHeap = SleepHeap::new();

/// Serializes task-side heap inserts. The scheduler-side extraction cannot
/// take a mutex and coexists through the heap's fail-fast counter instead.
static SLEEP_MUTEX: OsMutex = OsMutex::new();

/// Put the current task to sleep for at least `sleep_ms` milliseconds.
///
/// The task becomes runnable again once the tick counter passes the wake
/// tick; when it actually runs depends on the other tasks in the system.
/// Durations above [`MAX_SLEEP_TICKS`] make the wraparound-safe wake
/// comparison undefined and are rejected by a debug assertion.
///
/// Must be called from task context only.
pub fn os_sleep(sleep_ms: u32) {
    debug_assert!(sleep_ms <= MAX_SLEEP_TICKS, "sleep exceeds half the tick range");
    debug_assert!(!port::in_interrupt(), "os_sleep called from interrupt context");

    // Sample the clock as early as possible so the sleep is as accurate as
    // the scheduling overhead allows. One tick is one millisecond.
    let now = kernel::os_elapsed_ticks();

    let Some(current) = kernel::os_current_tcb() else { return };
    unsafe {
        let tcb = &mut *current.as_ptr();
        tcb.data = now.wrapping_add(sleep_ms);
        tcb.state |= state::SLEEP;
    }
    trace!("sleep: {} ms", sleep_ms);

    // The task must finish planting itself in the heap before it leaves the
    // runnable set, so the insert comes first.
    SLEEP_MUTEX.acquire();
    SLEEP_HEAP.insert(current);
    SLEEP_MUTEX.release();

    port::syscall_task_remove(current);
}

/// Whether the earliest sleeper is due. Scheduler-side.
pub(crate) fn sleeper_expired() -> bool {
    SLEEP_HEAP.needs_wakeup(kernel::os_elapsed_ticks())
}

/// Take the earliest sleeper off the heap. Scheduler-side, lock-free.
pub(crate) fn sleeper_extract() -> Option<NonNull<OsTcb>> {
    SLEEP_HEAP.extract()
}

/// Reset the sleep subsystem. Called from `os_init`, before multitasking.
pub(crate) fn sleep_reset() {
    SLEEP_HEAP.reset();
    SLEEP_MUTEX.init();
}

#[cfg(test)]
pub(crate) fn sleep_heap_insert_for_test(tcb: NonNull<OsTcb>) {
    SLEEP_HEAP.insert(tcb);
}

/// SysTick interrupt: advance the clock and let the scheduler decide who
/// runs next.
#[cfg(target_arch = "arm")]
#[no_mangle]
pub extern "C" fn SysTick() {
    kernel::tick_increment();
    port::pend_context_switch();
}
