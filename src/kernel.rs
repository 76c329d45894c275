//! Global kernel state, initialization and system-call dispatch
//!
//! Owns the tick counter, the fast-fail counter, the current-task pointer,
//! the idle task, and the scheduler selected at `os_init`. System calls are
//! numbered; on the target they are `svc` instructions dispatched by the
//! port layer, on the host they are direct calls into the `svc_*` handlers.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::{IDLE_STACK_SIZE, TICK_RATE_HZ};
use crate::error::{OsError, OsResult};
use crate::info;
use crate::kcell::KernelCell;
use crate::port;
use crate::sched::Scheduler;
use crate::task::{self, OsTcb};
use crate::time;
use crate::types::{OsStkElement, OsTick};
use crate::wait::WaitQueue;

// ============ Kernel State ============

/// Atomic kernel bookkeeping.
pub(crate) struct KernelState {
    initialized: AtomicBool,
    running: AtomicBool,
    /// Elapsed ticks since start. Wraps around every 2^32 ticks.
    ticks: AtomicU32,
    /// Bumped on every notify; lets a would-be waiter detect a notify that
    /// landed between its failed atomic attempt and its wait syscall.
    fast_fail: AtomicU32,
}

impl KernelState {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            ticks: AtomicU32::new(0),
            fast_fail: AtomicU32::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.ticks.store(0, Ordering::SeqCst);
        self.fast_fail.store(0, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[inline(always)]
    fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }
}

pub(crate) static KERNEL: KernelState = KernelState::new();

/// The scheduler selected at `os_init`.
static SCHEDULER: KernelCell<Option<&'static dyn Scheduler>> = KernelCell::new(None);

/// Pointer to the running task's TCB. Written only by the context-switch
/// path.
static mut OS_CURRENT_TCB: *mut OsTcb = core::ptr::null_mut();

/// Idle task TCB and stack.
static mut IDLE_TCB: OsTcb = OsTcb::new();
static mut IDLE_STACK: [OsStkElement; IDLE_STACK_SIZE] = [0; IDLE_STACK_SIZE];

/// The idle task: runs at priority 0 whenever nothing else is runnable.
fn idle_task(_arg: *mut ()) {
    loop {
        port::wait_for_interrupt();
    }
}

// ============ Public API ============

/// Initialize the kernel with a scheduler. Must be called before any other
/// kernel function; the scheduler reference doubles as the non-null
/// callback-table check the configuration contract asks for.
///
/// # Errors
/// * `OsError::OsRunning` - multitasking has already started
pub fn os_init(scheduler: &'static dyn Scheduler) -> OsResult<()> {
    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    KERNEL.reset();
    unsafe {
        *(&raw mut OS_CURRENT_TCB) = core::ptr::null_mut();
        *SCHEDULER.get() = Some(scheduler);
    }
    time::sleep_reset();
    KERNEL.set_initialized(true);

    info!("kernel init: preemptive={}", scheduler.preemptive());
    Ok(())
}

/// Start multitasking. Builds the idle task and hands the CPU to the
/// scheduler; on the target this function never returns.
///
/// # Errors
/// * `OsError::OsNotInit` - `os_init` has not been called
/// * `OsError::OsRunning` - multitasking has already started
pub fn os_start() -> OsResult<()> {
    if !KERNEL.is_initialized() {
        return Err(OsError::OsNotInit);
    }
    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    unsafe {
        let idle = &mut *(&raw mut IDLE_TCB);
        let stack = &mut *(&raw mut IDLE_STACK);
        task::os_tcb_init(idle, stack, idle_task, 0, core::ptr::null_mut())?;
    }

    KERNEL.set_running(true);
    info!("kernel start");

    port::start_first_task()
}

/// The running task's TCB, or `None` before the first context switch.
#[inline]
pub fn os_current_tcb() -> Option<NonNull<OsTcb>> {
    NonNull::new(unsafe { *(&raw const OS_CURRENT_TCB) })
}

/// Elapsed ticks since start (1 ms each, wrapping).
#[inline]
pub fn os_elapsed_ticks() -> OsTick {
    KERNEL.ticks.load(Ordering::Relaxed)
}

/// Current value of the fast-fail counter. Sampled by blocking primitives
/// before an atomic attempt and passed into the wait syscall.
#[inline]
pub fn os_fast_fail_counter() -> u32 {
    KERNEL.fast_fail.load(Ordering::Relaxed)
}

// ============ Internal accessors ============

#[inline]
pub(crate) fn scheduler() -> Option<&'static dyn Scheduler> {
    unsafe { *SCHEDULER.get() }
}

/// The idle task's TCB, the scheduler's fallback pick.
#[inline]
pub(crate) fn idle_tcb() -> NonNull<OsTcb> {
    unsafe { NonNull::new_unchecked(&raw mut IDLE_TCB) }
}

#[cfg(test)]
pub(crate) unsafe fn set_current_tcb(tcb: Option<NonNull<OsTcb>>) {
    unsafe {
        *(&raw mut OS_CURRENT_TCB) = tcb.map_or(core::ptr::null_mut(), NonNull::as_ptr);
    }
}

#[cfg_attr(not(target_arch = "arm"), allow(dead_code))]
#[inline(always)]
pub(crate) fn tick_increment() {
    KERNEL.ticks.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
pub(crate) fn tick_advance_for_test(ticks: u32) {
    KERNEL.ticks.fetch_add(ticks, Ordering::Relaxed);
}

pub(crate) fn fast_fail_bump() {
    KERNEL.fast_fail.fetch_add(1, Ordering::Relaxed);
}

/// Context-switch pivot, called with interrupts masked from the switch
/// handler. Saves the outgoing stack pointer, asks the scheduler for the
/// next task and returns its saved stack pointer.
#[cfg_attr(not(target_arch = "arm"), allow(dead_code))]
pub(crate) unsafe fn switch_context(current_sp: *mut OsStkElement) -> *mut OsStkElement {
    unsafe {
        if !current_sp.is_null() {
            let current = *(&raw const OS_CURRENT_TCB);
            if !current.is_null() {
                (*current).sp = current_sp;
            }
        }

        let next = match scheduler() {
            Some(sched) => sched.schedule(),
            None => idle_tcb(),
        };
        *(&raw mut OS_CURRENT_TCB) = next.as_ptr();
        (*next.as_ptr()).sp
    }
}

// ============ System-call numbering and handlers ============

/// System-call numbers. Must match the port layer's dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[cfg_attr(not(target_arch = "arm"), allow(dead_code))]
pub(crate) enum SvcNum {
    EnableSystick = 0,
    Schedule = 1,
    AddTask = 2,
    ExitTask = 3,
    YieldTask = 4,
    RemoveTask = 5,
    Wait = 6,
    Notify = 7,
}

/// Start the periodic tick, if the scheduler wants preemption.
pub(crate) fn svc_enable_systick() {
    if scheduler().is_some_and(|s| s.preemptive()) {
        port::tick_enable(TICK_RATE_HZ);
    }
}

/// Ask for a scheduling decision.
pub(crate) fn svc_schedule() {
    port::pend_context_switch();
}

/// Admit a task to the scheduler.
pub(crate) fn svc_task_add(tcb: NonNull<OsTcb>) {
    if let Some(sched) = scheduler() {
        sched.task_add(tcb);
    }
}

/// Retire the current task after its function returned.
pub(crate) fn svc_task_exit() {
    if let (Some(sched), Some(current)) = (scheduler(), os_current_tcb()) {
        sched.task_exit(current);
    }
    port::pend_context_switch();
}

/// Voluntary reschedule. Yields to tasks of the same or higher priority; the
/// highest-priority task simply runs again.
pub(crate) fn svc_task_yield() {
    port::pend_context_switch();
}

/// Take a task out of the runnable set (sleep path) and reschedule.
pub(crate) fn svc_task_remove(tcb: NonNull<OsTcb>) {
    if let Some(sched) = scheduler() {
        sched.task_remove(tcb);
    }
    port::pend_context_switch();
}

/// Block the current task on a resource wait queue, unless the fast-fail
/// snapshot is stale.
pub(crate) fn svc_wait(queue: *const WaitQueue, fail_fast_seen: u32) {
    if let Some(sched) = scheduler() {
        sched.wait(unsafe { &*queue }, fail_fast_seen);
    }
}

/// Wake the best waiter of a resource wait queue. The counter bump comes
/// first so that concurrent waiters abort their enqueue, and the exclusive
/// monitor is cleared so their in-flight store-conditionals fail.
pub(crate) fn svc_notify(queue: *const WaitQueue) {
    fast_fail_bump();
    port::clear_exclusive();
    if let Some(sched) = scheduler() {
        sched.notify(unsafe { &*queue });
    }
}

// ============ Wrappers used by the sync primitives ============

/// Issue the wait syscall for `queue` with the given fast-fail snapshot.
pub(crate) fn os_wait(queue: &WaitQueue, fail_fast_seen: u32) {
    port::syscall_wait(queue, fail_fast_seen);
}

/// Issue the notify syscall for `queue`.
pub(crate) fn os_notify(queue: &WaitQueue) {
    port::syscall_notify(queue);
}

// ============ Test support ============
