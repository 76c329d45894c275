//! Error types
//!
//! Errors are few and limited to configuration mistakes caught at
//! initialization. Blocking operations have no failure mode - blocking is
//! indefinite by design, and capacity overruns on the hot paths are debug
//! assertions rather than return codes.

/// Kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OsError {
    // ============ OS state errors ============
    /// The kernel has not been initialized
    OsNotInit = 1001,
    /// The kernel is already running
    OsRunning = 1002,

    // ============ Task errors ============
    /// Stack slice is smaller than `STACK_SIZE_MIN`
    StkSizeInvalid = 2001,

    // ============ Semaphore errors ============
    /// Initial token count exceeds the semaphore ceiling
    SemTokensAboveCeiling = 3001,

    // ============ Queue errors ============
    /// Queue length or item size is zero
    QueueGeometryInvalid = 4001,
    /// Backing memory is too small for `length * item_size` bytes
    QueueMemTooSmall = 4002,

    // ============ Memory pool errors ============
    /// Block size cannot hold the intrusive free-list link
    PoolBlockSizeInvalid = 5001,
    /// Backing memory is too small for `block_count * block_size` bytes
    PoolMemTooSmall = 5002,
}

/// Result type alias for kernel operations
pub type OsResult<T> = Result<T, OsError>;
