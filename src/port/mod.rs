//! Port layer - CPU-specific implementations
//!
//! Everything the kernel needs from the hardware: first-switch entry,
//! context-switch and tick plumbing, exclusive (LL/SC) word access, and the
//! initial stack frame layout. ARM targets get the Cortex-M implementation;
//! everything else gets a host stub so the core logic can run under
//! `cargo test`.

#[cfg(target_arch = "arm")]
pub mod cortex_m;

#[cfg(target_arch = "arm")]
pub use cortex_m::*;

#[cfg(not(target_arch = "arm"))]
pub mod stub;

#[cfg(not(target_arch = "arm"))]
pub use stub::*;

use crate::task::OsTaskFn;
use crate::types::OsStkElement;

/// A task's saved register frame, as found at the top of the stack of a
/// task that is not running. The upper half (r0..psr) matches what the CPU
/// stacks automatically on exception entry; r4-r11 are stacked by the
/// context switcher below it, which is why the order looks inside out.
#[repr(C)]
pub struct OsStackFrame {
    pub(crate) r4: u32,
    pub(crate) r5: u32,
    pub(crate) r6: u32,
    pub(crate) r7: u32,
    pub(crate) r8: u32,
    pub(crate) r9: u32,
    pub(crate) r10: u32,
    pub(crate) r11: u32,
    pub(crate) r0: u32,
    pub(crate) r1: u32,
    pub(crate) r2: u32,
    pub(crate) r3: u32,
    pub(crate) r12: u32,
    pub(crate) lr: u32,
    pub(crate) pc: u32,
    pub(crate) psr: u32,
}

const FRAME_WORDS: usize = core::mem::size_of::<OsStackFrame>() / 4;

/// Build the initial stack frame for a task, so the first switch into it
/// "returns" into `func` with `arg` in r0 and the link register pointing at
/// the task-end trampoline. Returns the initial stack pointer.
///
/// Stacks are full-descending; the top is aligned down to 8 bytes as the
/// exception entry hardware expects.
pub(crate) fn task_stack_init(
    func: OsTaskFn,
    arg: *mut (),
    stack: &mut [OsStkElement],
) -> *mut OsStkElement {
    let top = unsafe { stack.as_mut_ptr().add(stack.len()) };
    let top = (top as usize & !7) as *mut OsStkElement;

    let frame = unsafe { top.sub(FRAME_WORDS) } as *mut OsStackFrame;
    unsafe {
        frame.write(OsStackFrame {
            r4: 0,
            r5: 0,
            r6: 0,
            r7: 0,
            r8: 0,
            r9: 0,
            r10: 0,
            r11: 0,
            r0: arg as usize as u32,
            r1: 0,
            r2: 0,
            r3: 0,
            r12: 0,
            lr: crate::task::task_end as usize as u32,
            // Thumb bit on the entry point, and the thumb bit alone in the
            // stacked PSR - anything else faults on exception return.
            pc: (func as usize as u32) | 1,
            psr: 0x0100_0000,
        });
    }

    frame as *mut OsStkElement
}
