//! Core type definitions
//!
//! Strong typing for the quantities the kernel passes around.

/// Task priority. 0 is reserved for the idle task.
pub type OsPrio = u8;

/// Tick counter type. Wraps roughly every 49.7 days at a 1 ms tick.
pub type OsTick = u32;

/// Task state bitfield type.
pub type OsState = u32;

/// Semaphore token count.
///
/// Word-sized so token updates go through the exclusive monitor.
pub type OsSemCtr = usize;

/// Stack element type. Stacks are arrays of 32-bit words.
pub type OsStkElement = u32;

/// Bits of a task's `state` field. Remaining bits are reserved for
/// application use.
pub mod state {
    use super::OsState;

    /// Task gave up the rest of its slice voluntarily.
    pub const YIELD: OsState = 1 << 0;
    /// Task is on the sleep heap.
    pub const SLEEP: OsState = 1 << 1;
    /// Task is on a resource wait queue.
    pub const WAIT: OsState = 1 << 2;
    /// Task runs with an inherited priority. Reserved; priority
    /// inheritance is not implemented.
    pub const PRIORITY_INHERITED: OsState = 1 << 3;
}
