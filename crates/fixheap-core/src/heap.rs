//! The block-structured heap manager.
//!
//! [`HeapAllocator`] owns no memory: the caller supplies a byte buffer
//! and keeps it alive for the allocator's lifetime. The buffer starts
//! as one free block spanning the usable (word-rounded) length minus
//! one header, and every later state is reachable only through
//! split-on-alloc and coalesce-on-free transitions, so the block list
//! always tiles the usable arena exactly.
//!
//! Allocation policy: first fit, scanning forward from the last known
//! free block. The hint is advisory; when a scan from it reaches the
//! tail without a fit, a full coalesce pass runs and the search retries
//! once from the first block. There is no wraparound within a pass.

use crate::block::{BlockHeader, BlockInfo, HEADER_SIZE, MAGIC, NIL, SPLIT_SLACK, WORD_SIZE};
use crate::diag::{DiagnosticSink, Severity, StderrSink};
use crate::error::HeapFault;
use crate::stats::HeapStats;

/// Free-list allocator over a caller-supplied fixed buffer.
///
/// All public pointers are *payload offsets* into the buffer; offset
/// `0` plays the role of the null pointer (no payload can ever start
/// there, the first block's header does).
///
/// Out-of-memory is reported by returning `None`. Heap corruption (bad
/// magic, implausible offsets, broken back-references) is reported to
/// the diagnostic sink at FATAL severity and then raised as a panic;
/// see [`HeapFault`]. A double free is logged at ERROR severity and
/// otherwise ignored.
pub struct HeapAllocator<'a, S: DiagnosticSink> {
    arena: &'a mut [u8],
    usable: usize,
    /// Search-start hint; not correctness-critical but re-pointed at
    /// every merge site so it never names an absorbed header.
    last_free: Option<usize>,
    stats: HeapStats,
    sink: S,
}

impl<'a> HeapAllocator<'a, StderrSink> {
    /// Creates an allocator over `arena`, reporting diagnostics to
    /// stderr.
    ///
    /// # Panics
    ///
    /// Panics when the word-rounded length cannot hold a single block
    /// header, or exceeds the `i32::MAX` payload encoding limit.
    pub fn new(arena: &'a mut [u8]) -> Self {
        Self::with_sink(arena, StderrSink)
    }
}

impl<'a, S: DiagnosticSink> HeapAllocator<'a, S> {
    /// Creates an allocator over `arena` with an explicit diagnostic
    /// sink.
    ///
    /// # Panics
    ///
    /// Same degenerate-size conditions as [`HeapAllocator::new`].
    pub fn with_sink(arena: &'a mut [u8], sink: S) -> Self {
        let usable = arena.len() & !(WORD_SIZE - 1);
        assert!(
            usable > HEADER_SIZE,
            "arena of {} bytes cannot hold a block header",
            arena.len()
        );
        assert!(
            usable <= i32::MAX as usize,
            "arena of {} bytes exceeds the supported maximum of {} bytes",
            arena.len(),
            i32::MAX
        );
        let mut heap = Self {
            arena,
            usable,
            last_free: None,
            stats: HeapStats::default(),
            sink,
        };
        heap.init_root();
        heap
    }

    /// Usable arena size: the supplied length rounded down to a word.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.usable
    }

    #[must_use]
    pub fn stats(&self) -> &HeapStats {
        &self.stats
    }

    /// Allocates `elem_len * elem_count` bytes, rounded up to the word
    /// size (a zero-byte request is promoted to one word). Returns the
    /// payload offset, or `None` when no free block is large enough
    /// even after a full coalesce pass.
    pub fn alloc(&mut self, elem_len: usize, elem_count: usize) -> Option<usize> {
        self.stats.alloc_calls += 1;
        let Some(need) = Self::request_size(elem_len, elem_count) else {
            self.stats.failed_allocs += 1;
            self.sink.emit(
                Severity::Warn,
                &format!("allocation of {elem_count} x {elem_len} bytes overflows"),
            );
            return None;
        };
        self.validate();

        let start = self.last_free.unwrap_or(0);
        let mut candidate = self.find_fit(start, need);
        if candidate.is_none() {
            self.pack_all();
            candidate = self.find_fit(0, need);
        }
        let Some(offset) = candidate else {
            self.stats.failed_allocs += 1;
            self.sink.emit(
                Severity::Warn,
                &format!(
                    "out of memory: {need} bytes requested, largest free block holds {} bytes",
                    self.largest_available()
                ),
            );
            return None;
        };
        Some(self.take(offset, need))
    }

    /// Resizes the allocation at `ptr` to `new_len * new_count` bytes.
    ///
    /// Always allocate-new + copy + free-old; there is no in-place
    /// growth even when the following block is free. The copy bound is
    /// `min(old payload size, new rounded size)`, so growing never
    /// reads past the old allocation. The old block is freed only when
    /// the new allocation succeeds; on failure the original is left
    /// intact and `None` is returned.
    ///
    /// A `ptr` of `0` behaves as a plain [`HeapAllocator::alloc`].
    pub fn realloc(&mut self, ptr: usize, new_len: usize, new_count: usize) -> Option<usize> {
        self.stats.realloc_calls += 1;
        if ptr == 0 {
            return self.alloc(new_len, new_count);
        }
        let old_offset = self.block_offset_of(ptr);
        let old_header = self.header_at(old_offset);
        self.check_links(old_offset, &old_header);

        let Some(new_rounded) = Self::request_size(new_len, new_count) else {
            self.stats.failed_allocs += 1;
            self.sink.emit(
                Severity::Warn,
                &format!("reallocation to {new_count} x {new_len} bytes overflows"),
            );
            return None;
        };
        let new_ptr = self.alloc(new_len, new_count)?;

        let copy = old_header.payload_len().min(new_rounded);
        self.arena.copy_within(ptr..ptr + copy, new_ptr);
        self.free(ptr);
        Some(new_ptr)
    }

    /// Returns the block at `ptr` to the free list and coalesces it
    /// with any adjacent free neighbors.
    ///
    /// A `ptr` of `0` is a logged no-op. Freeing an already-free block
    /// is logged at ERROR severity and ignored. Any other pointer that
    /// does not name a block header takes the corruption fault path.
    pub fn free(&mut self, ptr: usize) {
        self.stats.free_calls += 1;
        if ptr == 0 {
            self.sink.emit(Severity::Trace, "free of null offset ignored");
            return;
        }
        let offset = self.block_offset_of(ptr);
        let mut header = self.header_at(offset);
        self.check_links(offset, &header);

        if header.is_free() {
            self.stats.double_frees += 1;
            self.sink.emit(
                Severity::Error,
                &format!("double free of block at offset {offset:#x}"),
            );
            return;
        }

        header.size = -header.size;
        header.write(self.arena, offset);
        let merged = self.pack_at(offset);
        self.last_free = Some(merged);
    }

    /// Discards every block and reinitializes the arena as one free
    /// block. Outstanding payload offsets become dangling. No payload
    /// destructors run; this is a raw byte allocator, not an object
    /// lifecycle manager.
    pub fn reset(&mut self) {
        self.stats.resets += 1;
        self.init_root();
    }

    /// Sum of all free payload bytes. Walks the block list.
    #[must_use]
    pub fn total_available(&self) -> usize {
        self.blocks()
            .iter()
            .filter(|b| b.free)
            .map(|b| b.payload_len)
            .sum()
    }

    /// Largest single free payload. Walks the block list.
    #[must_use]
    pub fn largest_available(&self) -> usize {
        self.blocks()
            .iter()
            .filter(|b| b.free)
            .map(|b| b.payload_len)
            .max()
            .unwrap_or(0)
    }

    /// Immutable view of a used block's payload.
    ///
    /// This is the offset model's replacement for handing out raw
    /// pointers: all payload access goes through the allocator's
    /// borrow of the arena. Accessing a free block or a bogus offset
    /// takes the corruption fault path.
    #[must_use]
    pub fn payload(&self, ptr: usize) -> &[u8] {
        let len = self.payload_len_checked(ptr);
        &self.arena[ptr..ptr + len]
    }

    /// Mutable view of a used block's payload.
    pub fn payload_mut(&mut self, ptr: usize) -> &mut [u8] {
        let len = self.payload_len_checked(ptr);
        &mut self.arena[ptr..ptr + len]
    }

    /// Ordered snapshot of the block list.
    #[must_use]
    pub fn blocks(&self) -> Vec<BlockInfo> {
        let limit = self.walk_limit();
        let mut out = Vec::new();
        let mut offset = 0usize;
        loop {
            let header = self.header_at(offset);
            out.push(BlockInfo {
                offset,
                payload_len: header.payload_len(),
                free: header.is_free(),
            });
            if out.len() > limit {
                self.fault(HeapFault::ListRunaway { offset, limit });
            }
            if header.next == NIL {
                break;
            }
            offset = header.next as usize;
        }
        out
    }

    /// Emits a per-block report and a summary line at DEBUG severity.
    pub fn dump(&self) {
        let blocks = self.blocks();
        for b in &blocks {
            self.sink.emit(
                Severity::Debug,
                &format!(
                    "block {:#08x} {} payload={}",
                    b.offset,
                    if b.free { "free" } else { "used" },
                    b.payload_len
                ),
            );
        }
        self.sink.emit(
            Severity::Debug,
            &format!(
                "{} blocks, {} bytes usable, {} free, largest {}",
                blocks.len(),
                self.usable,
                self.total_available(),
                self.largest_available()
            ),
        );
    }

    /// Full integrity walk over the block list, run before every
    /// allocation search. Checks each block's offset plausibility,
    /// magic sentinel, non-zero size, ascending order, and that the
    /// `prev` link names the block we arrived from. Any violation is
    /// terminal.
    pub fn validate(&self) {
        let limit = self.walk_limit();
        let mut steps = 0usize;
        let mut offset = 0usize;
        let mut came_from = NIL;
        loop {
            if let Err(fault) = self.check_offset(offset) {
                self.fault(fault);
            }
            let header = BlockHeader::read(self.arena, offset);
            if header.magic != MAGIC {
                self.fault(HeapFault::BadMagic {
                    offset,
                    found: header.magic,
                    expected: MAGIC,
                });
            }
            if header.size == 0 {
                self.fault(HeapFault::ZeroSizeBlock { offset });
            }
            if header.prev != came_from {
                self.fault(HeapFault::LinkMismatch {
                    offset,
                    neighbor: header.prev as usize,
                    which: "prev",
                });
            }
            steps += 1;
            if steps > limit {
                self.fault(HeapFault::ListRunaway { offset, limit });
            }
            if header.next == NIL {
                break;
            }
            let next = header.next as usize;
            if next <= offset {
                self.fault(HeapFault::OrderViolation { offset, next });
            }
            came_from = offset as u32;
            offset = next;
        }
    }

    fn init_root(&mut self) {
        let root = BlockHeader {
            magic: MAGIC,
            size: -((self.usable - HEADER_SIZE) as i32),
            prev: NIL,
            next: NIL,
        };
        root.write(self.arena, 0);
        self.last_free = Some(0);
    }

    /// Rounds a request up to the word size; a zero-byte request is
    /// promoted to one word so every live block occupies payload space.
    /// `None` when the byte count overflows.
    fn request_size(elem_len: usize, elem_count: usize) -> Option<usize> {
        let bytes = elem_len.checked_mul(elem_count)?;
        let rounded = bytes.checked_add(WORD_SIZE - 1)? & !(WORD_SIZE - 1);
        Some(if rounded == 0 { WORD_SIZE } else { rounded })
    }

    /// Scans forward from the block at `start` for a free block with at
    /// least `need` payload bytes. No wraparound: the scan ends at the
    /// list tail.
    fn find_fit(&self, start: usize, need: usize) -> Option<usize> {
        let mut offset = start;
        loop {
            let header = self.header_at(offset);
            if header.is_free() && header.payload_len() >= need {
                return Some(offset);
            }
            if header.next == NIL {
                return None;
            }
            offset = header.next as usize;
        }
    }

    /// Marks the free block at `offset` used, splitting the surplus off
    /// into a new free block when it exceeds [`SPLIT_SLACK`]. Returns
    /// the payload offset.
    fn take(&mut self, offset: usize, need: usize) -> usize {
        let mut header = self.header_at(offset);
        let free_len = header.payload_len();
        debug_assert!(header.is_free() && free_len >= need);

        if free_len - need > SPLIT_SLACK {
            let surplus_offset = offset + HEADER_SIZE + need;
            let surplus = BlockHeader {
                magic: MAGIC,
                size: -((free_len - need - HEADER_SIZE) as i32),
                prev: offset as u32,
                next: header.next,
            };
            surplus.write(self.arena, surplus_offset);
            if header.next != NIL {
                let right_offset = header.next as usize;
                let mut right = self.header_at(right_offset);
                right.prev = surplus_offset as u32;
                right.write(self.arena, right_offset);
            }
            header.next = surplus_offset as u32;
            header.size = need as i32;
            self.last_free = Some(surplus_offset);
            self.stats.splits += 1;
        } else {
            // Surplus too small to be worth a header; hand out the
            // whole block.
            header.size = free_len as i32;
        }
        header.write(self.arena, offset);
        offset + HEADER_SIZE
    }

    /// Coalesces the run of adjacent free blocks containing `anchor`
    /// (itself free) into one free block. Returns the merged block's
    /// offset; an anchor with no free neighbor is left untouched.
    fn pack_at(&mut self, anchor: usize) -> usize {
        let mut start = anchor;
        loop {
            let header = self.header_at(start);
            if header.prev == NIL {
                break;
            }
            let prev = header.prev as usize;
            if !self.header_at(prev).is_free() {
                break;
            }
            start = prev;
        }
        let mut end = start;
        loop {
            let header = self.header_at(end);
            if header.next == NIL {
                break;
            }
            let next = header.next as usize;
            if !self.header_at(next).is_free() {
                break;
            }
            end = next;
        }
        if start == end {
            return start;
        }

        let end_header = self.header_at(end);
        // The merged payload absorbs every interior header: distance
        // from run start to run end, plus the end block's payload.
        let merged_len = (end - start) + end_header.payload_len();
        let mut merged = self.header_at(start);
        merged.size = -(merged_len as i32);
        merged.next = end_header.next;
        merged.write(self.arena, start);
        if end_header.next != NIL {
            let right_offset = end_header.next as usize;
            let mut right = self.header_at(right_offset);
            right.prev = start as u32;
            right.write(self.arena, right_offset);
        }
        self.stats.coalesces += 1;
        start
    }

    /// Full coalesce pass: merges every adjacent free-block run in the
    /// arena and re-points the search hint at the first free block.
    fn pack_all(&mut self) {
        self.stats.pack_passes += 1;
        let mut first_free = None;
        let mut offset = 0usize;
        loop {
            let header = self.header_at(offset);
            let settled = if header.is_free() {
                let merged = self.pack_at(offset);
                if first_free.is_none() {
                    first_free = Some(merged);
                }
                merged
            } else {
                offset
            };
            let next = self.header_at(settled).next;
            if next == NIL {
                break;
            }
            offset = next as usize;
        }
        self.last_free = first_free;
    }

    /// Maps a payload offset back to its block header offset. A `ptr`
    /// no header could precede is corruption.
    fn block_offset_of(&self, ptr: usize) -> usize {
        if ptr < HEADER_SIZE || ptr > self.usable {
            self.fault(HeapFault::OutOfRange {
                offset: ptr,
                usable: self.usable,
            });
        }
        ptr - HEADER_SIZE
    }

    fn payload_len_checked(&self, ptr: usize) -> usize {
        let offset = self.block_offset_of(ptr);
        let header = self.header_at(offset);
        if header.is_free() {
            self.fault(HeapFault::FreeBlockAccess { offset });
        }
        header.payload_len()
    }

    /// Reads the header at `offset`, faulting on implausible offsets or
    /// a missing magic sentinel.
    fn header_at(&self, offset: usize) -> BlockHeader {
        if let Err(fault) = self.check_offset(offset) {
            self.fault(fault);
        }
        let header = BlockHeader::read(self.arena, offset);
        if header.magic != MAGIC {
            self.fault(HeapFault::BadMagic {
                offset,
                found: header.magic,
                expected: MAGIC,
            });
        }
        header
    }

    /// Verifies the mutual back-references around the block at
    /// `offset`.
    fn check_links(&self, offset: usize, header: &BlockHeader) {
        if header.prev != NIL {
            let prev = header.prev as usize;
            if self.header_at(prev).next != offset as u32 {
                self.fault(HeapFault::LinkMismatch {
                    offset,
                    neighbor: prev,
                    which: "prev",
                });
            }
        }
        if header.next != NIL {
            let next = header.next as usize;
            if self.header_at(next).prev != offset as u32 {
                self.fault(HeapFault::LinkMismatch {
                    offset,
                    neighbor: next,
                    which: "next",
                });
            }
        }
    }

    fn check_offset(&self, offset: usize) -> Result<(), HeapFault> {
        if offset > self.usable - HEADER_SIZE {
            return Err(HeapFault::OutOfRange {
                offset,
                usable: self.usable,
            });
        }
        if !offset.is_multiple_of(WORD_SIZE) {
            return Err(HeapFault::Misaligned { offset });
        }
        Ok(())
    }

    /// Upper bound on how many blocks the arena can hold; exceeding it
    /// during a walk means the list links form a cycle.
    fn walk_limit(&self) -> usize {
        self.usable / HEADER_SIZE + 1
    }

    /// Terminal corruption path: log at FATAL severity, then panic.
    /// Continuing with a corrupted block list would risk further
    /// memory corruption.
    fn fault(&self, fault: HeapFault) -> ! {
        self.sink.emit(Severity::Fatal, &fault.to_string());
        panic!("heap corruption: {fault}");
    }
}
