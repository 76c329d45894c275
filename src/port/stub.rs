//! Host stub port
//!
//! Lets the kernel's logic build and run under `cargo test` on the host.
//! Context switching is a no-op, system calls dispatch by direct call, and
//! the exclusive monitor is emulated with a flag that behaves like the real
//! one does for a single core: a load-link arms it, a store-conditional
//! succeeds only while it is armed, and `clear_exclusive` disarms it.

use core::ptr::NonNull;
use core::sync::atomic::{compiler_fence, AtomicBool, Ordering};

use crate::kernel;
use crate::task::OsTcb;
use crate::wait::WaitQueue;

/// Emulated exclusive monitor.
static MONITOR: AtomicBool = AtomicBool::new(false);

pub fn start_first_task() -> ! {
    unimplemented!("multitasking is not available on the host");
}

/// No context switching on the host; scheduling decisions are driven
/// directly by the tests.
pub fn pend_context_switch() {}

pub fn tick_enable(_freq_hz: u32) {}

#[inline]
pub fn memory_barrier() {
    compiler_fence(Ordering::SeqCst);
}

/// Load-linked: arm the monitor and read the word.
///
/// # Safety
/// `addr` must be valid for reads.
pub unsafe fn ll_load(addr: *const usize) -> usize {
    MONITOR.store(true, Ordering::Relaxed);
    unsafe { addr.read_volatile() }
}

/// Store-conditional: write the word only if the monitor is still armed.
///
/// # Safety
/// `addr` must be valid for writes.
pub unsafe fn sc_store(value: usize, addr: *mut usize) -> bool {
    if MONITOR.swap(false, Ordering::Relaxed) {
        unsafe { addr.write_volatile(value) };
        true
    } else {
        false
    }
}

pub fn clear_exclusive() {
    MONITOR.store(false, Ordering::Relaxed);
}

pub fn breakpoint() {}

pub fn in_interrupt() -> bool {
    false
}

pub fn wait_for_interrupt() {}

// ============ System calls: direct dispatch ============

pub fn syscall_enable_systick() {
    kernel::svc_enable_systick();
}

pub fn syscall_schedule() {
    kernel::svc_schedule();
}

pub fn syscall_task_add(tcb: NonNull<OsTcb>) {
    kernel::svc_task_add(tcb);
}

pub fn syscall_task_exit() {
    kernel::svc_task_exit();
}

pub fn syscall_yield() {
    kernel::svc_task_yield();
}

pub fn syscall_task_remove(tcb: NonNull<OsTcb>) {
    kernel::svc_task_remove(tcb);
}

pub fn syscall_wait(queue: &WaitQueue, fail_fast_seen: u32) {
    kernel::svc_wait(queue, fail_fast_seen);
}

pub fn syscall_notify(queue: &WaitQueue) {
    kernel::svc_notify(queue);
}
