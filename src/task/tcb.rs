//! Task Control Block (TCB) definition

use core::ptr::NonNull;

use crate::types::{OsPrio, OsState, OsStkElement, OsTick};

/// Task Control Block
///
/// One per task, statically allocated by the application and handed to the
/// kernel through [`os_tcb_init`](crate::task::os_tcb_init) and
/// [`os_task_add`](crate::task::os_task_add).
///
/// A TCB is a member of exactly one structure at a time: the running slot,
/// a priority ring, a resource wait queue, or the sleep heap. The `next`
/// link is shared between the ring (doubly linked, with `prev`) and the
/// wait queue (singly linked).
#[repr(C)]
pub struct OsTcb {
    /// Saved stack pointer. MUST stay the first field: the context switch
    /// reaches the saved register frame by double-dereferencing a TCB
    /// pointer.
    pub(crate) sp: *mut OsStkElement,

    /// State bits, see [`state`](crate::types::state). Only some are used;
    /// the rest are reserved.
    pub(crate) state: OsState,

    /// Task priority, `0..=PRIORITY_MAX`. 0 is reserved for idle.
    pub(crate) priority: OsPrio,

    /// Kernel scratch word. Holds the absolute wake tick while the task
    /// sleeps.
    pub(crate) data: OsTick,

    /// Previous task in the priority ring.
    pub(crate) prev: Option<NonNull<OsTcb>>,

    /// Next task in the priority ring, or the successor in a resource wait
    /// queue. Never both at once.
    pub(crate) next: Option<NonNull<OsTcb>>,
}

impl OsTcb {
    /// Create a new, uninitialized TCB.
    pub const fn new() -> Self {
        OsTcb {
            sp: core::ptr::null_mut(),
            state: 0,
            priority: 0,
            data: 0,
            prev: None,
            next: None,
        }
    }

    /// Current priority.
    #[inline]
    pub fn priority(&self) -> OsPrio {
        self.priority
    }

    /// Current state bits.
    #[inline]
    pub fn state(&self) -> OsState {
        self.state
    }

    /// Whether the task is on the sleep heap.
    #[inline]
    pub fn is_sleeping(&self) -> bool {
        self.state & crate::types::state::SLEEP != 0
    }

    /// Whether the task is on a resource wait queue.
    #[inline]
    pub fn is_waiting(&self) -> bool {
        self.state & crate::types::state::WAIT != 0
    }
}

impl Default for OsTcb {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: TCB links and state are only mutated from kernel context or, for
// the fields written by os_tcb_init, before the task is visible to the
// scheduler.
unsafe impl Send for OsTcb {}
unsafe impl Sync for OsTcb {}
