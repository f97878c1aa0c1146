//! Operation counters.

/// Monotonic counters for one allocator instance.
///
/// Diagnostic only; none of these participate in block bookkeeping.
/// `realloc` is allocate-new + copy + free-old internally, so each
/// successful reallocation also bumps `alloc_calls` and `free_calls`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// `alloc` calls, successful or not.
    pub alloc_calls: u64,
    /// `realloc` calls, successful or not.
    pub realloc_calls: u64,
    /// `free` calls, including no-op frees of the null offset.
    pub free_calls: u64,
    /// Allocations that returned `None` after the coalesce-and-retry
    /// pass, plus overflowing requests.
    pub failed_allocs: u64,
    /// Frees of already-free blocks (logged, never fatal).
    pub double_frees: u64,
    /// Free blocks split in two to serve a request.
    pub splits: u64,
    /// Coalesce runs that merged at least two blocks.
    pub coalesces: u64,
    /// Full-arena coalesce passes triggered by a failed search.
    pub pack_passes: u64,
    /// `reset` calls.
    pub resets: u64,
}
