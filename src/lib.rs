//! rondos - a fixed-priority round-robin RTOS kernel
//!
//! A small real-time kernel for single-core, 32-bit ARM Cortex-M parts:
//! - Fixed-priority scheduling with round-robin rotation inside each priority
//! - Tick-based sleeping with wraparound-safe wakeup ordering
//! - Recursive mutexes, counting/binary semaphores, bounded byte-copy queues
//!   and fixed-block memory pools, built on exclusive (LL/SC) word access
//! - A pluggable scheduler selected at `os_init`

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

// ============ Critical Section ============

// The kernel itself never masks interrupts - resource words are guarded by the
// exclusive monitor and the fast-fail protocol. This impl exists so that
// ecosystem crates (defmt-rtt in particular) can link on single-core parts.
#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod config;
pub mod error;
pub mod kernel;
pub mod port;
pub mod sched;
pub mod sync;
pub mod task;
pub mod time;
pub mod types;
pub mod wait;

mod kcell;

// ============ Re-exports ============

pub use config::*;
pub use error::{OsError, OsResult};
pub use kernel::{os_current_tcb, os_elapsed_ticks, os_fast_fail_counter, os_init, os_start};
pub use sched::{RoundRobin, Scheduler, ROUND_ROBIN};
pub use sync::mempool::OsMemPool;
pub use sync::mutex::OsMutex;
pub use sync::queue::OsQueue;
pub use sync::sem::OsSem;
pub use task::{os_task_add, os_tcb_init, os_yield, OsTaskFn, OsTcb};
pub use time::os_sleep;
pub use types::*;
pub use wait::WaitQueue;
