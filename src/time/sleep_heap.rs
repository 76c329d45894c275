//! Sleep heap - binary min-heap of sleeping tasks
//!
//! Keyed on the absolute wake tick stored in each TCB's `data` word, with
//! the next task to wake always at the root. Sized for `MAX_TASKS` so every
//! task in the system can sleep at once.
//!
//! Two parties touch the heap: tasks insert under the sleep mutex, and the
//! scheduler extracts from the context-switch handler, where taking a mutex
//! is impossible. The scheduler therefore works lock-free and bumps a
//! fail-fast counter on every extraction; the task-side sift-up re-checks
//! that counter before committing each swap, and re-reads the (possibly
//! re-indexed) heap when it changed.

use core::cell::{Cell, UnsafeCell};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::{MAX_SLEEP_TICKS, MAX_TASKS};
use crate::kernel;
use crate::task::OsTcb;
use crate::types::OsTick;

/// Wraparound-safe "is `t1` later than `t2`" on the wrapping tick counter,
/// comparing the distances of both times from a common reference. Holds for
/// any pair of times less than half the tick range apart.
#[inline]
pub(crate) fn tick_is_after(t1: OsTick, t2: OsTick, reference: OsTick) -> bool {
    t1.wrapping_sub(reference) > t2.wrapping_sub(reference)
}

pub(crate) struct SleepHeap {
    store: UnsafeCell<[Option<NonNull<OsTcb>>; MAX_TASKS]>,
    len: Cell<usize>,
    /// Bumped on every scheduler-side extraction so an interrupted insert
    /// can tell the heap shifted under it.
    fail_fast: AtomicU32,
}

// SAFETY: inserts are serialized by the sleep mutex; the only other access
// is the scheduler's extraction, which the fail-fast counter protocol makes
// safe to interleave.
unsafe impl Sync for SleepHeap {}

impl SleepHeap {
    pub const fn new() -> Self {
        SleepHeap {
            store: UnsafeCell::new([None; MAX_TASKS]),
            len: Cell::new(0),
            fail_fast: AtomicU32::new(0),
        }
    }

    pub fn reset(&self) {
        unsafe { *self.store.get() = [None; MAX_TASKS] };
        self.len.set(0);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len.get()
    }

    #[inline]
    fn slots(&self) -> &mut [Option<NonNull<OsTcb>>; MAX_TASKS] {
        unsafe { &mut *self.store.get() }
    }

    #[inline]
    fn wake_tick(&self, index: usize) -> OsTick {
        let slot = self.slots()[index].expect("sleep heap slot empty");
        unsafe { slot.as_ref() }.data
    }

    /// Swap the element at `*index` with the one at `other`, and leave
    /// `*index` pointing at the element's new position.
    fn swap(&self, index: &mut usize, other: usize) {
        self.slots().swap(*index, other);
        *index = other;
    }

    /// Whether the root task's wake tick has passed.
    pub fn needs_wakeup(&self, now: OsTick) -> bool {
        if self.len.get() == 0 {
            return false;
        }
        // The reference sits half the tick range away from now, which makes
        // the comparison immune to counter overflow for any sleep within
        // MAX_SLEEP_TICKS.
        tick_is_after(now, self.wake_tick(0), now.wrapping_add(MAX_SLEEP_TICKS))
    }

    /// Place a task on the heap. Callers hold the sleep mutex.
    ///
    /// The scheduler may still extract concurrently - it cannot take the
    /// mutex - which is what the fail-fast re-check inside the sift-up is
    /// for. A context switch landing between the append and the first
    /// sift-up step can still leave the heap momentarily mis-shapen; the
    /// retry bounds the damage but does not eliminate it entirely.
    pub fn insert(&self, tcb: NonNull<OsTcb>) {
        let len = self.len.get();
        debug_assert!(len < MAX_TASKS, "sleep heap sized for MAX_TASKS");
        self.slots()[len] = Some(tcb);
        self.len.set(len + 1);
        self.sift_up();
    }

    /// Remove and return the task with the earliest wake tick. Called from
    /// the scheduler only, never under the mutex.
    pub fn extract(&self) -> Option<NonNull<OsTcb>> {
        let len = self.len.get();
        if len == 0 {
            return None;
        }

        let slots = self.slots();
        let root = slots[0];
        slots[0] = slots[len - 1];
        slots[len - 1] = None;
        self.len.set(len - 1);
        self.sift_down();

        // Tell any in-progress insert that the heap changed shape.
        self.fail_fast.fetch_add(1, Ordering::Relaxed);

        root
    }

    /// Restore heap order after an append at the end.
    fn sift_up(&self) {
        let mut index = self.len.get() - 1;
        loop {
            // Snapshot first: a scheduler extraction after this point must
            // void the swap below.
            let fail_fast_seen = self.fail_fast.load(Ordering::Relaxed);

            if index == 0 {
                return;
            }
            let parent = (index - 1) / 2;

            let now = kernel::os_elapsed_ticks();
            let reference = now.wrapping_add(MAX_SLEEP_TICKS);
            if tick_is_after(self.wake_tick(index), self.wake_tick(parent), reference) {
                // Parent wakes first; order restored.
                return;
            }

            // Commit the swap only if the scheduler kept its hands off since
            // the snapshot; otherwise loop and re-read the new shape.
            if self.fail_fast.load(Ordering::Relaxed) == fail_fast_seen {
                self.swap(&mut index, parent);
            }
        }
    }

    /// Restore heap order after the last element was moved to the root.
    fn sift_down(&self) {
        let len = self.len.get();
        let mut index = 0;
        loop {
            let child_a = 2 * index + 1;
            if child_a >= len {
                return;
            }
            let child_b = child_a + 1;

            let now = kernel::os_elapsed_ticks();
            let reference = now.wrapping_add(MAX_SLEEP_TICKS);

            // Pick the earlier-waking child.
            let child = if child_b < len
                && tick_is_after(self.wake_tick(child_a), self.wake_tick(child_b), reference)
            {
                child_b
            } else {
                child_a
            };

            if tick_is_after(self.wake_tick(child), self.wake_tick(index), reference) {
                // Both children wake later; order restored.
                return;
            }
            self.swap(&mut index, child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleeper(wake_tick: OsTick) -> OsTcb {
        let mut t = OsTcb::new();
        t.data = wake_tick;
        t
    }

    fn ptr(t: &mut OsTcb) -> NonNull<OsTcb> {
        NonNull::from(t)
    }

    #[test]
    fn tick_comparison_without_overflow() {
        let now: OsTick = 1_000;
        let reference = now.wrapping_add(MAX_SLEEP_TICKS);
        assert!(tick_is_after(2_000, 1_500, reference));
        assert!(!tick_is_after(1_500, 2_000, reference));
        assert!(!tick_is_after(1_500, 1_500, reference));
    }

    #[test]
    fn tick_comparison_across_overflow() {
        // One wake tick before the counter wraps, one just after.
        let now: OsTick = u32::MAX - 50;
        let reference = now.wrapping_add(MAX_SLEEP_TICKS);
        let before_wrap: OsTick = u32::MAX - 10;
        let after_wrap: OsTick = 50;
        assert!(tick_is_after(after_wrap, before_wrap, reference));
        assert!(!tick_is_after(before_wrap, after_wrap, reference));
    }

    #[test]
    fn empty_heap() {
        let heap = SleepHeap::new();
        assert_eq!(heap.len(), 0);
        assert!(!heap.needs_wakeup(0));
        assert_eq!(heap.extract(), None);
    }

    #[test]
    fn extracts_in_temporal_order() {
        let heap = SleepHeap::new();
        let mut t300 = sleeper(300);
        let mut t100 = sleeper(100);
        let mut t200 = sleeper(200);

        heap.insert(ptr(&mut t300));
        heap.insert(ptr(&mut t100));
        heap.insert(ptr(&mut t200));

        assert_eq!(heap.extract(), Some(ptr(&mut t100)));
        assert_eq!(heap.extract(), Some(ptr(&mut t200)));
        assert_eq!(heap.extract(), Some(ptr(&mut t300)));
        assert_eq!(heap.extract(), None);
    }

    #[test]
    fn ordering_survives_counter_wrap() {
        let heap = SleepHeap::new();
        // Wake ticks straddling the wrap point: 2^32 - 10 is earlier in real
        // time than 50.
        let mut late = sleeper(50);
        let mut early = sleeper(u32::MAX - 10);

        heap.insert(ptr(&mut late));
        heap.insert(ptr(&mut early));

        assert_eq!(heap.extract(), Some(ptr(&mut early)));
        assert_eq!(heap.extract(), Some(ptr(&mut late)));
    }

    #[test]
    fn needs_wakeup_tracks_the_root() {
        let heap = SleepHeap::new();
        let mut t = sleeper(100);
        heap.insert(ptr(&mut t));

        assert!(!heap.needs_wakeup(99));
        // Equal is not "after": the root wakes strictly after its tick.
        assert!(!heap.needs_wakeup(100));
        assert!(heap.needs_wakeup(101));
    }

    #[test]
    fn wrapped_sleep_does_not_wake_early() {
        // A task sleeping 100 ticks across the wrap boundary: set at
        // 2^32 - 50, due at wrapped tick 50.
        let heap = SleepHeap::new();
        let set_at: OsTick = u32::MAX.wrapping_sub(49);
        let mut t = sleeper(set_at.wrapping_add(100));
        heap.insert(ptr(&mut t));

        assert!(!heap.needs_wakeup(set_at));
        assert!(!heap.needs_wakeup(u32::MAX));
        assert!(!heap.needs_wakeup(10));
        assert!(heap.needs_wakeup(51));
    }

    #[test]
    fn extraction_bumps_fail_fast_counter() {
        let heap = SleepHeap::new();
        let mut t = sleeper(10);
        heap.insert(ptr(&mut t));

        let before = heap.fail_fast.load(Ordering::Relaxed);
        heap.extract();
        assert_eq!(heap.fail_fast.load(Ordering::Relaxed), before + 1);
    }

    #[test]
    fn interleaved_inserts_and_extracts_keep_order() {
        let heap = SleepHeap::new();
        let mut a = sleeper(5);
        let mut b = sleeper(1);
        let mut c = sleeper(9);
        let mut d = sleeper(3);

        heap.insert(ptr(&mut a));
        heap.insert(ptr(&mut b));
        assert_eq!(heap.extract(), Some(ptr(&mut b)));
        heap.insert(ptr(&mut c));
        heap.insert(ptr(&mut d));
        assert_eq!(heap.extract(), Some(ptr(&mut d)));
        assert_eq!(heap.extract(), Some(ptr(&mut a)));
        assert_eq!(heap.extract(), Some(ptr(&mut c)));
    }
}
