//! Cortex-M port
//!
//! Context switching via the PendSV exception, system calls via SVC, and
//! the exclusive-monitor primitives the sync layer builds on. Tasks run
//! unprivileged in thread mode on the process stack; the kernel runs in
//! handler mode on the main stack.

#![allow(clippy::missing_safety_doc)]

use core::arch::{asm, naked_asm};
use core::ptr::NonNull;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;

use crate::kernel::{self, SvcNum};
use crate::task::OsTcb;
use crate::types::OsStkElement;
use crate::wait::WaitQueue;

/// Core clock the SysTick reload is derived from.
const CORE_CLOCK_HZ: u32 = 16_000_000;

/// Start the periodic tick.
pub fn tick_enable(freq_hz: u32) {
    let mut p = unsafe { cortex_m::Peripherals::steal() };
    p.SYST.set_reload(CORE_CLOCK_HZ / freq_hz - 1);
    p.SYST.clear_current();
    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
}

/// One-shot entry into multitasking. Drops to unprivileged thread mode and
/// lets the first PendSV switch into whatever the scheduler picks (the idle
/// task when nothing else is runnable). Never returns.
pub fn start_first_task() -> ! {
    unsafe {
        let mut p = cortex_m::Peripherals::steal();
        // PendSV must be the lowest priority in the system so a switch only
        // happens once every other handler is done; SysTick sits above it.
        p.SCB.set_priority(SystemHandler::PendSV, 0xF0);
        p.SCB.set_priority(SystemHandler::SysTick, 0x10);

        // PSP = 0 marks the first switch: there is no context to save yet.
        asm!("msr psp, {0}", in(reg) 0u32);

        // Unprivileged thread mode from here on; every kernel entry below
        // goes through SVC. Still on MSP until the first exception return.
        asm!(
            "mrs {tmp}, CONTROL",
            "orr {tmp}, {tmp}, #1",
            "msr CONTROL, {tmp}",
            "isb",
            tmp = out(reg) _,
        );

        cortex_m::interrupt::enable();
    }

    syscall_enable_systick();
    syscall_schedule();

    // The pended switch takes the CPU; this context is never resumed.
    loop {
        wait_for_interrupt();
    }
}

/// Request a context switch. Takes effect once no other handler is active.
#[inline(always)]
pub fn pend_context_switch() {
    cortex_m::peripheral::SCB::set_pendsv();
}

// ============ Exclusive access ============

/// Load-linked word read.
pub unsafe fn ll_load(addr: *const usize) -> usize {
    let value: usize;
    unsafe {
        asm!("ldrex {0}, [{1}]", out(reg) value, in(reg) addr, options(nostack));
    }
    value
}

/// Store-conditional word write. Fails if the monitor was cleared since the
/// paired `ll_load` - by a context switch, another store-conditional, or an
/// explicit `clear_exclusive`.
pub unsafe fn sc_store(value: usize, addr: *mut usize) -> bool {
    let failed: u32;
    unsafe {
        asm!("strex {0}, {1}, [{2}]", out(reg) failed, in(reg) value, in(reg) addr, options(nostack));
    }
    failed == 0
}

#[inline(always)]
pub fn clear_exclusive() {
    unsafe { asm!("clrex", options(nomem, nostack, preserves_flags)) };
}

#[inline(always)]
pub fn memory_barrier() {
    cortex_m::asm::dmb();
}

#[inline(always)]
pub fn breakpoint() {
    cortex_m::asm::bkpt();
}

pub fn in_interrupt() -> bool {
    let ipsr: u32;
    unsafe {
        asm!("mrs {}, IPSR", out(reg) ipsr, options(nomem, nostack, preserves_flags));
    }
    ipsr != 0
}

#[inline(always)]
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

// ============ Context switch ============

/// Rust half of the PendSV handler: saves the outgoing stack pointer, asks
/// the scheduler for the next task, returns its stack pointer.
#[no_mangle]
unsafe extern "C" fn pendsv_switch(current_sp: *mut OsStkElement) -> *mut OsStkElement {
    unsafe { kernel::switch_context(current_sp) }
}

/// PendSV exception: the only place task contexts are switched.
///
/// 1. Void any exclusive hold, so an interrupted LL/SC pair fails cleanly
/// 2. Stack r4-r11 below the hardware frame on the outgoing PSP
///    (skipped on the first switch, when PSP is still 0)
/// 3. Pivot TCBs via `pendsv_switch`
/// 4. Unstack r4-r11 from the incoming PSP and return to thread mode
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "clrex",
        "mrs r0, psp",
        "cbz r0, 1f",
        "stmdb r0!, {{r4-r11}}",
        "1:",
        "bl {switch}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        // Thread mode, process stack, no FP state.
        "ldr lr, =0xFFFFFFFD",
        "cpsie i",
        "dsb",
        "isb",
        "bx lr",
        switch = sym pendsv_switch,
    );
}

// ============ System calls ============

/// Exception frame the CPU stacks on SVC entry. The handler reads call
/// arguments from the stacked r0-r2.
#[repr(C)]
struct SvcStackFrame {
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    psr: u32,
}

/// SVCall exception: hand the caller's stacked frame to the dispatcher.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn SVCall() {
    naked_asm!(
        "tst lr, #4",
        "ite eq",
        "mrseq r0, msp",
        "mrsne r0, psp",
        "b {dispatch}",
        dispatch = sym svc_dispatch,
    );
}

/// Dispatch by the SVC immediate, recovered from the low byte of the
/// instruction preceding the stacked return address. The numbering must
/// match [`SvcNum`] or the wrong handler runs.
unsafe extern "C" fn svc_dispatch(frame: *mut SvcStackFrame) {
    let frame = unsafe { &mut *frame };
    let svc_num = unsafe { (frame.pc as *const u16).sub(1).read() } as u32 & 0xFF;

    match svc_num {
        n if n == SvcNum::EnableSystick as u32 => kernel::svc_enable_systick(),
        n if n == SvcNum::Schedule as u32 => kernel::svc_schedule(),
        n if n == SvcNum::AddTask as u32 => {
            if let Some(tcb) = NonNull::new(frame.r0 as *mut OsTcb) {
                kernel::svc_task_add(tcb);
            }
        }
        n if n == SvcNum::ExitTask as u32 => kernel::svc_task_exit(),
        n if n == SvcNum::YieldTask as u32 => kernel::svc_task_yield(),
        n if n == SvcNum::RemoveTask as u32 => {
            if let Some(tcb) = NonNull::new(frame.r0 as *mut OsTcb) {
                kernel::svc_task_remove(tcb);
            }
        }
        n if n == SvcNum::Wait as u32 => {
            kernel::svc_wait(frame.r0 as *const WaitQueue, frame.r1);
        }
        n if n == SvcNum::Notify as u32 => {
            kernel::svc_notify(frame.r0 as *const WaitQueue);
        }
        _ => {}
    }
}

pub fn syscall_enable_systick() {
    unsafe { asm!("svc #{n}", n = const SvcNum::EnableSystick as u32) };
}

pub fn syscall_schedule() {
    unsafe { asm!("svc #{n}", n = const SvcNum::Schedule as u32) };
}

pub fn syscall_task_add(tcb: NonNull<OsTcb>) {
    unsafe {
        asm!("svc #{n}", n = const SvcNum::AddTask as u32, in("r0") tcb.as_ptr());
    }
}

pub fn syscall_task_exit() {
    unsafe { asm!("svc #{n}", n = const SvcNum::ExitTask as u32) };
}

pub fn syscall_yield() {
    unsafe { asm!("svc #{n}", n = const SvcNum::YieldTask as u32) };
}

pub fn syscall_task_remove(tcb: NonNull<OsTcb>) {
    unsafe {
        asm!("svc #{n}", n = const SvcNum::RemoveTask as u32, in("r0") tcb.as_ptr());
    }
}

pub fn syscall_wait(queue: &WaitQueue, fail_fast_seen: u32) {
    unsafe {
        asm!(
            "svc #{n}",
            n = const SvcNum::Wait as u32,
            in("r0") queue as *const WaitQueue,
            in("r1") fail_fast_seen,
        );
    }
}

pub fn syscall_notify(queue: &WaitQueue) {
    unsafe {
        asm!("svc #{n}", n = const SvcNum::Notify as u32, in("r0") queue as *const WaitQueue);
    }
}
