//! Bounded queue
//!
//! Inter-task communication through a fixed-size ring of byte-copied
//! elements. Two semaphores account for readable items and free slots, a
//! mutex serializes the copies. Best used for small items; for anything big
//! the idiom is to queue pointers into a memory pool instead.

use core::cell::Cell;

use crate::error::{OsError, OsResult};
use crate::sync::mutex::OsMutex;
use crate::sync::sem::OsSem;

/// Bounded multi-producer multi-consumer queue over caller-supplied
/// backing memory.
pub struct OsQueue {
    /// First byte of the backing ring.
    start: Cell<*mut u8>,
    /// One past the last byte of the backing ring.
    end: Cell<*mut u8>,
    /// Write cursor.
    head: Cell<*mut u8>,
    /// Read cursor.
    tail: Cell<*mut u8>,
    /// Bytes per element.
    item_size: Cell<usize>,
    /// Serializes element copies.
    mutex: OsMutex,
    /// Tokens = readable items.
    sem_read: OsSem,
    /// Tokens = free slots.
    sem_write: OsSem,
}

// SAFETY: the cursors are only moved under the mutex; the semaphores and
// mutex provide their own guarantees.
unsafe impl Send for OsQueue {}
unsafe impl Sync for OsQueue {}

impl OsQueue {
    /// Create a queue with no backing memory; unusable until `init`.
    pub const fn new() -> Self {
        OsQueue {
            start: Cell::new(core::ptr::null_mut()),
            end: Cell::new(core::ptr::null_mut()),
            head: Cell::new(core::ptr::null_mut()),
            tail: Cell::new(core::ptr::null_mut()),
            item_size: Cell::new(0),
            mutex: OsMutex::new(),
            sem_read: OsSem::new(),
            sem_write: OsSem::new(),
        }
    }

    /// Initialize the queue over `memory`, holding up to `length` elements
    /// of `item_size` bytes each. Must run before the OS starts.
    ///
    /// # Errors
    /// * `OsError::QueueGeometryInvalid` - zero length or item size
    /// * `OsError::QueueMemTooSmall` - memory cannot hold `length * item_size` bytes
    pub fn init(
        &self,
        memory: &'static mut [u8],
        length: usize,
        item_size: usize,
    ) -> OsResult<()> {
        if length == 0 || item_size == 0 {
            return Err(OsError::QueueGeometryInvalid);
        }
        let capacity = length * item_size;
        if memory.len() < capacity {
            return Err(OsError::QueueMemTooSmall);
        }

        let start = memory.as_mut_ptr();
        self.start.set(start);
        self.end.set(unsafe { start.add(capacity) });
        self.head.set(start);
        self.tail.set(start);
        self.item_size.set(item_size);

        self.mutex.init();
        self.sem_read.init(length, 0)?;
        self.sem_write.init(length, length)?;
        Ok(())
    }

    /// Copy `item` into the back of the queue, waiting for a free slot if
    /// the queue is full.
    ///
    /// # Safety
    /// `item` must be valid for reads of `item_size` bytes. No alignment is
    /// required; the copy is byte-granular.
    pub unsafe fn enqueue(&self, item: *const u8) {
        self.sem_write.take();
        self.mutex.acquire();

        let head = self.head.get();
        let item_size = self.item_size.get();
        unsafe { core::ptr::copy_nonoverlapping(item, head, item_size) };
        self.advance(&self.head, item_size);

        // Semaphore before mutex: the notify chain then favors tasks
        // waiting for the mutex over tasks waiting for an item, except in
        // the rare case of a context switch between these two lines.
        self.sem_read.give();
        self.mutex.release();
    }

    /// Copy the front of the queue into `buffer`, waiting for an item if
    /// the queue is empty.
    ///
    /// # Safety
    /// `buffer` must be valid for writes of `item_size` bytes. No alignment
    /// is required; the copy is byte-granular.
    pub unsafe fn dequeue(&self, buffer: *mut u8) {
        self.sem_read.take();
        self.mutex.acquire();

        let tail = self.tail.get();
        let item_size = self.item_size.get();
        unsafe { core::ptr::copy_nonoverlapping(tail, buffer, item_size) };
        self.advance(&self.tail, item_size);

        self.sem_write.give();
        self.mutex.release();
    }

    /// Number of items currently readable.
    #[inline]
    pub fn len(&self) -> usize {
        self.sem_read.tokens()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Step a cursor one element forward, wrapping at the end of the ring.
    fn advance(&self, cursor: &Cell<*mut u8>, item_size: usize) {
        let mut next = unsafe { cursor.get().add(item_size) };
        if next >= self.end.get() {
            next = self.start.get();
        }
        cursor.set(next);
    }
}

impl Default for OsQueue {
    fn default() -> Self {
        Self::new()
    }
}
