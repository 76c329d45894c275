//! Compile-time configuration
//!
//! These constants bound the resources the kernel statically allocates.
//! All of them are validated at compile time.

use crate::types::{OsPrio, OsTick};

/// Maximum number of application tasks that may be added to the scheduler.
///
/// Also sizes the sleep heap, so that every task in the system can be
/// asleep at the same time.
pub const MAX_TASKS: usize = 15;

/// Number of priority levels. Priority 0 is reserved for the idle task;
/// application tasks use `1..=PRIORITY_MAX`.
pub const PRIORITY_LEVELS: usize = 5;

/// Highest usable task priority.
pub const PRIORITY_MAX: OsPrio = (PRIORITY_LEVELS - 1) as OsPrio;

/// System tick rate in Hz. One tick per millisecond.
pub const TICK_RATE_HZ: u32 = 1_000;

/// Minimum task stack size, in words.
pub const STACK_SIZE_MIN: usize = 32;

/// Longest single sleep, in ticks. Sleeping past half the tick range makes
/// the wraparound-safe wake comparison undefined.
pub const MAX_SLEEP_TICKS: OsTick = 0x7FFF_FFFF;

/// Idle task stack size, in words.
pub(crate) const IDLE_STACK_SIZE: usize = 64;

// ============ Compile-time validation ============

const _: () = assert!(MAX_TASKS > 0, "MAX_TASKS must be at least 1");
const _: () = assert!(MAX_TASKS <= u8::MAX as usize, "MAX_TASKS must fit a u8 counter");
const _: () = assert!(
    PRIORITY_LEVELS >= 2,
    "PRIORITY_LEVELS must cover idle plus at least one task priority"
);
const _: () = assert!(
    PRIORITY_LEVELS - 1 <= OsPrio::MAX as usize,
    "PRIORITY_MAX must fit the priority type"
);
const _: () = assert!(
    TICK_RATE_HZ == 1_000,
    "sleep durations are given in milliseconds; the tick must be 1 ms"
);
const _: () = assert!(STACK_SIZE_MIN >= 16, "a stack must at least hold one context frame");
const _: () = assert!(IDLE_STACK_SIZE >= STACK_SIZE_MIN);
