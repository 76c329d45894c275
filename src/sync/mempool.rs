//! Fixed-block memory pool
//!
//! A static allocator for systems with predetermined structure sizes. Free
//! blocks form an intrusive LIFO list - the first machine word of each free
//! block points at the next one - so the pool costs one word of overhead
//! total. A counting semaphore accounts for free blocks, a mutex guards the
//! list itself.

use core::cell::Cell;
use core::ptr::NonNull;

use crate::error::{OsError, OsResult};
use crate::sync::mutex::OsMutex;
use crate::sync::sem::OsSem;

/// Fixed-block pool over caller-supplied backing memory.
pub struct OsMemPool {
    /// Most recently freed block, or null when the pool is empty.
    head: Cell<*mut usize>,
    /// Guards the free list.
    mutex: OsMutex,
    /// Tokens = free blocks; ceiling = pool capacity.
    blocks_avail: OsSem,
}

// SAFETY: the free list is only walked under the mutex.
unsafe impl Send for OsMemPool {}
unsafe impl Sync for OsMemPool {}

impl OsMemPool {
    /// Create a pool with no blocks; unusable until `init`.
    pub const fn new() -> Self {
        OsMemPool {
            head: Cell::new(core::ptr::null_mut()),
            mutex: OsMutex::new(),
            blocks_avail: OsSem::new(),
        }
    }

    /// Initialize the pool over `memory`, carved into `block_count` blocks
    /// of `block_size` bytes. Passing `None` starts the pool empty with the
    /// same capacity, to be filled later through `free`. Must run
    /// single-threaded, before the OS starts: the population path below
    /// bypasses the mutex and semaphore on purpose.
    ///
    /// The backing memory must be word-aligned and `block_size` a multiple
    /// of the word size, or the free-list links would be misaligned.
    ///
    /// # Errors
    /// * `OsError::PoolBlockSizeInvalid` - a block cannot hold the free-list link
    /// * `OsError::PoolMemTooSmall` - memory cannot hold `block_count * block_size` bytes
    pub fn init(
        &self,
        memory: Option<&'static mut [u8]>,
        block_count: usize,
        block_size: usize,
    ) -> OsResult<()> {
        if block_size < core::mem::size_of::<usize>() {
            return Err(OsError::PoolBlockSizeInvalid);
        }

        self.head.set(core::ptr::null_mut());
        self.mutex.init();

        let Some(memory) = memory else {
            // Empty pool: full capacity, nothing available yet.
            return self.blocks_avail.init(block_count, 0);
        };

        if memory.len() < block_count * block_size {
            return Err(OsError::PoolMemTooSmall);
        }
        debug_assert_eq!(
            memory.as_ptr() as usize % core::mem::align_of::<usize>(),
            0,
            "pool memory must be word-aligned"
        );
        debug_assert_eq!(
            block_size % core::mem::align_of::<usize>(),
            0,
            "block size must keep every block word-aligned"
        );

        self.blocks_avail.init(block_count, block_count)?;

        // Push the blocks directly - no semaphore or mutex traffic, since
        // nothing else runs yet. The last block pushed is allocated first.
        let mut block = memory.as_mut_ptr();
        for _ in 0..block_count {
            self.push(block as *mut usize);
            block = unsafe { block.add(block_size) };
        }
        Ok(())
    }

    /// Take a block from the pool, waiting while it is empty. The returned
    /// memory is uninitialized - whatever the block held before is gone.
    pub fn alloc(&self) -> NonNull<u8> {
        // The semaphore guarantees a block is there; the mutex guards the
        // unlink.
        self.blocks_avail.take();
        self.mutex.acquire();

        let block = self.head.get();
        debug_assert!(!block.is_null(), "free-list accounting out of sync");
        self.head.set(unsafe { block.read() } as *mut usize);

        self.mutex.release();

        // SAFETY: the semaphore token taken above vouches for a non-null
        // head; the list is only ever fed valid block pointers.
        unsafe { NonNull::new_unchecked(block as *mut u8) }
    }

    /// Return a block to the pool. The block's first word is overwritten
    /// immediately.
    ///
    /// Double frees and blocks from elsewhere are not detected; the
    /// capacity accounting only holds because `init` matched the semaphore
    /// ceiling to the block count.
    ///
    /// # Safety
    /// `block` must have come from `alloc` on this pool (or, during
    /// single-threaded startup of an empty pool, be a fresh word-aligned
    /// block of at least `block_size` bytes), and must not be used again
    /// until re-allocated.
    pub unsafe fn free(&self, block: NonNull<u8>) {
        self.mutex.acquire();

        self.push(block.as_ptr() as *mut usize);

        // Semaphore before mutex, same wakeup-ordering rationale as the
        // queue: mutex waiters get priority over allocators.
        self.blocks_avail.give();
        self.mutex.release();
    }

    /// Number of blocks currently free.
    #[inline]
    pub fn blocks_free(&self) -> usize {
        self.blocks_avail.tokens()
    }

    /// Link a block onto the head of the free list.
    fn push(&self, block: *mut usize) {
        unsafe { block.write(self.head.get() as usize) };
        self.head.set(block);
    }
}

impl Default for OsMemPool {
    fn default() -> Self {
        Self::new()
    }
}
