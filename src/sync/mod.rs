//! Synchronization and IPC primitives
//!
//! All four are built on the same two mechanisms: exclusive (LL/SC) access
//! to a single resource word, and the kernel's wait/notify fabric with its
//! fast-fail protection against lost wakeups. The queue and the memory pool
//! are compositions of the mutex and the semaphore.

pub mod mempool;
pub mod mutex;
pub mod queue;
pub mod sem;
