//! Host-side tests over the public kernel API
//!
//! These run on the host through the stub port: no context switching
//! happens, so everything here sticks to the non-blocking paths and to the
//! configuration/bookkeeping contracts.

use std::sync::Mutex;

/// Serializes tests that touch global kernel state (init/start).
static KERNEL_TESTS: Mutex<()> = Mutex::new(());

fn leak_words(words: usize) -> &'static mut [rondos::OsStkElement] {
    Box::leak(vec![0u32; words].into_boxed_slice())
}

fn leak_bytes(len: usize) -> &'static mut [u8] {
    Box::leak(vec![0u8; len].into_boxed_slice())
}

mod config_tests {
    use rondos::config::*;

    #[test]
    fn limits_are_sane() {
        assert!(MAX_TASKS >= 1);
        assert!(PRIORITY_LEVELS >= 2, "need idle plus at least one task priority");
        assert_eq!(PRIORITY_MAX as usize, PRIORITY_LEVELS - 1);
        assert_eq!(TICK_RATE_HZ, 1_000, "sleep durations are milliseconds");
        // Sleeps are bounded to half the tick range for the wraparound-safe
        // comparison to hold.
        assert_eq!(MAX_SLEEP_TICKS, u32::MAX / 2);
    }
}

mod error_tests {
    use rondos::OsError;

    #[test]
    fn errors_compare_and_format() {
        assert_eq!(OsError::OsNotInit, OsError::OsNotInit);
        assert_ne!(OsError::OsNotInit, OsError::OsRunning);
        let _ = format!("{:?}", OsError::SemTokensAboveCeiling);
    }
}

mod types_tests {
    use rondos::types::state;

    #[test]
    fn state_bits_are_distinct() {
        let all = state::YIELD | state::SLEEP | state::WAIT | state::PRIORITY_INHERITED;
        assert_eq!(all.count_ones(), 4);
    }
}

mod tcb_tests {
    use super::leak_words;
    use rondos::{os_tcb_init, OsError, OsTcb, PRIORITY_MAX, STACK_SIZE_MIN};

    fn no_op(_: *mut ()) {}

    #[test]
    fn fresh_tcb_is_inert() {
        let tcb = OsTcb::new();
        assert_eq!(tcb.priority(), 0);
        assert_eq!(tcb.state(), 0);
        assert!(!tcb.is_sleeping());
        assert!(!tcb.is_waiting());
    }

    #[test]
    fn init_sets_priority_and_rejects_short_stacks() {
        let mut tcb = OsTcb::new();
        assert_eq!(
            os_tcb_init(&mut tcb, leak_words(STACK_SIZE_MIN - 1), no_op, 2, core::ptr::null_mut()),
            Err(OsError::StkSizeInvalid)
        );

        os_tcb_init(&mut tcb, leak_words(128), no_op, PRIORITY_MAX, core::ptr::null_mut())
            .unwrap();
        assert_eq!(tcb.priority(), PRIORITY_MAX);
    }
}

mod kernel_tests {
    use super::KERNEL_TESTS;
    use rondos::{os_current_tcb, os_elapsed_ticks, os_init, os_start, OsError, RoundRobin};

    #[test]
    fn init_before_start_is_enforced() {
        let _guard = KERNEL_TESTS.lock().unwrap_or_else(|p| p.into_inner());

        // Nothing initialized yet in this sequence.
        static SCHED: RoundRobin = RoundRobin::new();
        assert_eq!(os_start(), Err(OsError::OsNotInit));

        os_init(&SCHED).unwrap();
        assert_eq!(os_current_tcb(), None);
        assert_eq!(os_elapsed_ticks(), 0);

        // Re-init before start is allowed and resets the clock.
        static SCHED2: RoundRobin = RoundRobin::new();
        os_init(&SCHED2).unwrap();
        assert_eq!(os_elapsed_ticks(), 0);
    }
}

mod sem_tests {
    use rondos::{OsError, OsSem};

    #[test]
    fn token_accounting_balances() {
        static SEM: OsSem = OsSem::new();
        SEM.init(8, 2).unwrap();

        let initial = SEM.tokens();
        for _ in 0..5 {
            SEM.give();
        }
        for _ in 0..4 {
            SEM.take();
        }
        // gives - takes == final - initial
        assert_eq!(5 - 4, SEM.tokens() as i64 - initial as i64);
    }

    #[test]
    fn ceiling_is_enforced_at_init() {
        let sem = OsSem::new();
        assert_eq!(sem.init_binary(true), Ok(()));
        assert_eq!(sem.init(2, 3), Err(OsError::SemTokensAboveCeiling));
    }
}

mod queue_tests {
    use super::leak_bytes;
    use rondos::OsQueue;

    #[test]
    fn sequence_survives_a_small_ring() {
        static QUEUE: OsQueue = OsQueue::new();
        QUEUE.init(super::leak_bytes(16), 4, 4).unwrap();

        // 100k sequence numbers through a 4-slot queue, batched so nothing
        // ever blocks: no gaps, no duplicates, byte-identical.
        let mut expected = 0u32;
        for batch in 0..25_000u32 {
            for i in 0..4 {
                let seq = batch * 4 + i;
                unsafe { QUEUE.enqueue(seq.to_le_bytes().as_ptr()) };
            }
            for _ in 0..4 {
                let mut out = [0u8; 4];
                unsafe { QUEUE.dequeue(out.as_mut_ptr()) };
                assert_eq!(u32::from_le_bytes(out), expected);
                expected += 1;
            }
        }
        assert_eq!(expected, 100_000);
        assert!(QUEUE.is_empty());
    }

    #[test]
    fn len_tracks_occupancy() {
        let queue = OsQueue::new();
        queue.init(leak_bytes(32), 4, 8).unwrap();

        assert_eq!(queue.len(), 0);
        let item = [0u8; 8];
        unsafe { queue.enqueue(item.as_ptr()) };
        unsafe { queue.enqueue(item.as_ptr()) };
        assert_eq!(queue.len(), 2);

        let mut out = [0u8; 8];
        unsafe { queue.dequeue(out.as_mut_ptr()) };
        assert_eq!(queue.len(), 1);
    }
}

mod pool_tests {
    use rondos::OsMemPool;

    fn leak_pool_memory(bytes: usize) -> &'static mut [u8] {
        let words = bytes.div_ceil(core::mem::size_of::<usize>());
        let buf = Box::leak(vec![0usize; words].into_boxed_slice());
        unsafe { core::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut u8, bytes) }
    }

    #[test]
    fn free_blocks_equal_capacity_minus_held() {
        static POOL: OsMemPool = OsMemPool::new();
        POOL.init(Some(leak_pool_memory(4 * 16)), 4, 16).unwrap();

        let mut held = Vec::new();
        for _ in 0..3 {
            held.push(POOL.alloc());
            assert_eq!(POOL.blocks_free(), 4 - held.len());
        }
        while let Some(block) = held.pop() {
            unsafe { POOL.free(block) };
            assert_eq!(POOL.blocks_free(), 4 - held.len());
        }
        assert_eq!(POOL.blocks_free(), 4);
    }

    #[test]
    fn churn_reuses_blocks_without_leaking() {
        static POOL: OsMemPool = OsMemPool::new();
        POOL.init(Some(leak_pool_memory(2 * 8)), 2, 8).unwrap();

        for _ in 0..1_000 {
            let a = POOL.alloc();
            let b = POOL.alloc();
            assert_eq!(POOL.blocks_free(), 0);
            unsafe {
                POOL.free(a);
                POOL.free(b);
            }
            assert_eq!(POOL.blocks_free(), 2);
        }
    }
}
