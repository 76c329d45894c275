//! Resource wait queues
//!
//! Every blocking primitive owns one [`WaitQueue`]: a singly-linked list of
//! TCBs sorted by priority, first-come first-served among equals. The list
//! reuses the TCB's `next` link, so a task must never be on a ring and on a
//! wait queue at the same time - the scheduler's wait path removes the task
//! from its ring before enqueueing it here.
//!
//! Insertion is O(n) in the number of waiters, extraction is O(1).

use core::cell::Cell;
use core::ptr::NonNull;

use crate::task::OsTcb;

/// Head of a per-resource wait queue.
pub struct WaitQueue {
    head: Cell<Option<NonNull<OsTcb>>>,
}

// SAFETY: only mutated from kernel context (the scheduler's wait and notify
// callbacks), where accesses are serialized.
unsafe impl Send for WaitQueue {}
unsafe impl Sync for WaitQueue {}

impl WaitQueue {
    /// Create a new empty wait queue.
    pub const fn new() -> Self {
        WaitQueue { head: Cell::new(None) }
    }

    /// Reset the queue. Any queued tasks are forgotten.
    pub(crate) fn init(&self) {
        self.head.set(None);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.get().is_none()
    }

    /// Insert a task, keeping the queue sorted by descending priority and
    /// first-come first-served among equal priorities: the task lands after
    /// every waiter of equal or higher priority and before the first one of
    /// strictly lower priority.
    pub(crate) fn insert(&self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        // The link may still hold a stale ring successor.
        tcb_ref.next = None;

        let Some(head) = self.head.get() else {
            self.head.set(Some(tcb));
            return;
        };

        if tcb_ref.priority > unsafe { head.as_ref() }.priority {
            tcb_ref.next = Some(head);
            self.head.set(Some(tcb));
            return;
        }

        // Walk past every waiter the new task does not outrank. The strict
        // `>` above and the `>=` here together put it behind equal-priority
        // predecessors.
        let mut queued = head;
        loop {
            let queued_ref = unsafe { &mut *queued.as_ptr() };
            match queued_ref.next {
                Some(next) if tcb_ref.priority >= unsafe { next.as_ref() }.priority => {
                    queued = next;
                }
                _ => {
                    tcb_ref.next = queued_ref.next;
                    queued_ref.next = Some(tcb);
                    return;
                }
            }
        }
    }

    /// Remove and return the head of the queue: the highest-priority,
    /// earliest-arrived waiter. Returns `None` if no task is queued.
    pub(crate) fn extract(&self) -> Option<NonNull<OsTcb>> {
        let extracted = self.head.get()?;
        self.head.set(unsafe { extracted.as_ref() }.next);
        Some(extracted)
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcb(priority: u8) -> OsTcb {
        let mut t = OsTcb::new();
        t.priority = priority;
        t
    }

    fn ptr(t: &mut OsTcb) -> NonNull<OsTcb> {
        NonNull::from(t)
    }

    #[test]
    fn empty_queue_extracts_nothing() {
        let queue = WaitQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.extract(), None);
    }

    #[test]
    fn single_insert_extract() {
        let queue = WaitQueue::new();
        let mut a = tcb(2);

        queue.insert(ptr(&mut a));
        assert!(!queue.is_empty());
        assert_eq!(queue.extract(), Some(ptr(&mut a)));
        assert!(queue.is_empty());
    }

    #[test]
    fn extraction_is_priority_descending() {
        let queue = WaitQueue::new();
        let mut low = tcb(1);
        let mut mid = tcb(2);
        let mut high = tcb(4);

        queue.insert(ptr(&mut mid));
        queue.insert(ptr(&mut low));
        queue.insert(ptr(&mut high));

        assert_eq!(queue.extract(), Some(ptr(&mut high)));
        assert_eq!(queue.extract(), Some(ptr(&mut mid)));
        assert_eq!(queue.extract(), Some(ptr(&mut low)));
        assert_eq!(queue.extract(), None);
    }

    #[test]
    fn equal_priorities_are_fifo() {
        let queue = WaitQueue::new();
        let mut first = tcb(3);
        let mut second = tcb(3);
        let mut third = tcb(3);

        queue.insert(ptr(&mut first));
        queue.insert(ptr(&mut second));
        queue.insert(ptr(&mut third));

        assert_eq!(queue.extract(), Some(ptr(&mut first)));
        assert_eq!(queue.extract(), Some(ptr(&mut second)));
        assert_eq!(queue.extract(), Some(ptr(&mut third)));
    }

    #[test]
    fn mixed_priorities_keep_fifo_within_level() {
        let queue = WaitQueue::new();
        let mut high = tcb(4);
        let mut mid_a = tcb(2);
        let mut mid_b = tcb(2);
        let mut low = tcb(1);

        queue.insert(ptr(&mut mid_a));
        queue.insert(ptr(&mut low));
        queue.insert(ptr(&mut mid_b));
        queue.insert(ptr(&mut high));

        assert_eq!(queue.extract(), Some(ptr(&mut high)));
        assert_eq!(queue.extract(), Some(ptr(&mut mid_a)));
        assert_eq!(queue.extract(), Some(ptr(&mut mid_b)));
        assert_eq!(queue.extract(), Some(ptr(&mut low)));
    }

    #[test]
    fn stale_ring_link_is_cleared_on_insert() {
        let queue = WaitQueue::new();
        let mut a = tcb(2);
        let mut b = tcb(2);
        // Simulate a link left over from ring membership.
        a.next = Some(ptr(&mut b));

        queue.insert(ptr(&mut a));
        assert_eq!(queue.extract(), Some(ptr(&mut a)));
        assert_eq!(queue.extract(), None);
    }
}
