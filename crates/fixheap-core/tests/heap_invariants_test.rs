//! Integration tests: block-list invariants and allocation policy.
//!
//! Exercises the allocator purely through its public surface: tiling
//! and address-order invariants, split/coalesce behavior, accounting,
//! the out-of-memory path, and the realloc contract.
//!
//! Run: cargo test -p fixheap-core --test heap_invariants_test

use fixheap_core::{
    DiagnosticSink, HEADER_SIZE, HeapAllocator, MemorySink, NullSink, Severity, WORD_SIZE,
};

const ARENA_LEN: usize = 4096;

fn round_up(n: usize) -> usize {
    (n + WORD_SIZE - 1) & !(WORD_SIZE - 1)
}

fn assert_invariants<S: DiagnosticSink>(heap: &HeapAllocator<'_, S>) {
    heap.validate();
    let blocks = heap.blocks();
    let tiled: usize = blocks.iter().map(|b| b.region_len()).sum();
    assert_eq!(tiled, heap.capacity(), "blocks must tile the arena");
    for pair in blocks.windows(2) {
        assert!(
            pair[0].offset < pair[1].offset,
            "blocks must stay in ascending address order"
        );
    }
}

// ---------------------------------------------------------------------------
// Bookkeeping scenarios
// ---------------------------------------------------------------------------

#[test]
fn small_alloc_bookkeeping_on_fresh_arena() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let initial = heap.total_available();
    assert_eq!(initial, ARENA_LEN - HEADER_SIZE);

    let ptr = heap.alloc(100, 1).expect("100 bytes fit a fresh 4 KiB arena");
    assert_ne!(ptr, 0);

    // The split costs the rounded payload plus one new header.
    let expected = initial - round_up(100) - HEADER_SIZE;
    assert_eq!(heap.total_available(), expected);
    assert_eq!(heap.largest_available(), expected);
    assert_invariants(&heap);
}

#[test]
fn near_capacity_request_fails_without_damage() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);

    // 4088 rounds to itself and exceeds the 4080 usable payload bytes
    // left after the root header.
    assert_eq!(heap.alloc(4088, 1), None);
    assert_invariants(&heap);

    // Smaller requests must still be served correctly afterwards.
    let ptr = heap.alloc(100, 1).expect("arena must stay serviceable");
    heap.payload_mut(ptr).fill(0x5A);
    assert!(heap.payload(ptr).iter().all(|&b| b == 0x5A));
    assert_invariants(&heap);
}

#[test]
fn freed_middle_block_is_reused_in_place() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let first = heap.alloc(256, 1).expect("first");
    let middle = heap.alloc(256, 1).expect("middle");
    let last = heap.alloc(256, 1).expect("last");

    heap.free(middle);
    let reused = heap.alloc(256, 1).expect("freed block must satisfy this");
    assert_eq!(
        reused, middle,
        "an exact-size request must reuse the freed block, not carve a new one"
    );
    assert_ne!(reused, first);
    assert_ne!(reused, last);
    assert_invariants(&heap);
}

#[test]
fn accounting_after_consecutive_allocations() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let initial = heap.total_available();

    let requests = [100usize, 200, 56, 24];
    let mut spent = 0usize;
    for len in requests {
        assert!(heap.alloc(len, 1).is_some());
        spent += round_up(len) + HEADER_SIZE;
    }
    assert_eq!(heap.total_available(), initial - spent);
    assert_invariants(&heap);
}

#[test]
fn zero_byte_request_is_promoted_to_one_word() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let ptr = heap.alloc(0, 1).expect("zero-byte request still allocates");
    assert_eq!(heap.payload(ptr).len(), WORD_SIZE);
    assert_invariants(&heap);
}

#[test]
fn overflowing_request_is_rejected_with_a_warning() {
    let sink = MemorySink::new();
    let handle = sink.clone();
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, sink);

    assert_eq!(heap.alloc(usize::MAX, 2), None);
    assert!(handle.contains(Severity::Warn, "overflows"));
    assert_invariants(&heap);
}

// ---------------------------------------------------------------------------
// Round trip and coalescing
// ---------------------------------------------------------------------------

#[test]
fn alloc_free_round_trip_restores_availability() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let before = heap.total_available();

    let ptr = heap.alloc(200, 1).expect("fits");
    heap.free(ptr);

    assert_eq!(heap.total_available(), before);
    assert_eq!(heap.blocks().len(), 1);
    assert_invariants(&heap);
}

#[test]
fn coalescing_merges_three_adjacent_regions_in_any_free_order() {
    let orders: [[usize; 3]; 4] = [[1, 0, 2], [0, 1, 2], [2, 1, 0], [2, 0, 1]];
    for order in orders {
        let mut buf = vec![0u8; ARENA_LEN];
        let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
        let ptrs = [
            heap.alloc(256, 1).expect("a"),
            heap.alloc(256, 1).expect("b"),
            heap.alloc(256, 1).expect("c"),
        ];
        for &idx in &order {
            heap.free(ptrs[idx]);
        }

        let blocks = heap.blocks();
        assert_eq!(
            blocks.len(),
            1,
            "free order {order:?} must leave one merged block"
        );
        assert!(blocks[0].free);
        assert_eq!(heap.largest_available(), heap.capacity() - HEADER_SIZE);
        assert_invariants(&heap);
    }
}

#[test]
fn null_free_is_a_no_op() {
    let sink = MemorySink::new();
    let handle = sink.clone();
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, sink);
    let before = heap.total_available();

    heap.free(0);

    assert_eq!(heap.total_available(), before);
    assert!(handle.contains(Severity::Trace, "null"));
    assert_invariants(&heap);
}

#[test]
fn free_of_pointer_into_payload_interior_is_fatal() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let ptr = heap.alloc(256, 1).expect("fits");

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        // The bytes 32 past the payload start hold no header, so the
        // magic check must trip.
        heap.free(ptr + 32);
    }));
    assert!(result.is_err(), "interior pointer must be treated as corruption");
}

// ---------------------------------------------------------------------------
// Realloc contract
// ---------------------------------------------------------------------------

#[test]
fn realloc_growth_moves_and_preserves_contents() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let ptr = heap.alloc(32, 1).expect("fits");
    heap.payload_mut(ptr).fill(0xAB);

    let grown = heap.realloc(ptr, 64, 1).expect("growth fits");
    assert_ne!(grown, ptr, "growth is always allocate+copy+free, never in place");
    assert!(heap.payload(grown)[..32].iter().all(|&b| b == 0xAB));
    assert_invariants(&heap);
}

#[test]
fn realloc_shrink_copies_only_the_new_size() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let ptr = heap.alloc(128, 1).expect("fits");
    heap.payload_mut(ptr).fill(0xCD);

    let shrunk = heap.realloc(ptr, 40, 1).expect("shrink fits");
    assert_eq!(heap.payload(shrunk).len(), round_up(40));
    assert!(heap.payload(shrunk).iter().all(|&b| b == 0xCD));
    assert_invariants(&heap);
}

#[test]
fn failed_realloc_leaves_original_intact() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let ptr = heap.alloc(64, 1).expect("fits");
    heap.payload_mut(ptr).fill(0x77);

    assert_eq!(heap.realloc(ptr, ARENA_LEN * 2, 1), None);
    assert!(heap.payload(ptr).iter().all(|&b| b == 0x77));
    heap.free(ptr);
    assert_invariants(&heap);
}

#[test]
fn realloc_of_null_acts_as_alloc() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let ptr = heap.realloc(0, 64, 1).expect("behaves as plain alloc");
    assert_ne!(ptr, 0);
    assert_eq!(heap.payload(ptr).len(), 64);
    assert_invariants(&heap);
}

// ---------------------------------------------------------------------------
// Payload access
// ---------------------------------------------------------------------------

#[test]
fn payload_length_matches_rounded_request() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let ptr = heap.alloc(13, 1).expect("fits");
    assert_eq!(heap.payload(ptr).len(), round_up(13));
}

#[test]
fn payload_access_to_freed_block_is_fatal() {
    let mut buf = vec![0u8; ARENA_LEN];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let ptr = heap.alloc(64, 1).expect("fits");
    heap.free(ptr);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = heap.payload(ptr);
    }));
    assert!(result.is_err(), "use after free must fault");
}

// ---------------------------------------------------------------------------
// Deterministic randomized churn
// ---------------------------------------------------------------------------

fn lcg(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

#[test]
fn invariants_hold_under_deterministic_churn() {
    let mut buf = vec![0u8; 64 * 1024];
    let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
    let mut live: Vec<(usize, u8)> = Vec::new();
    let mut rng = 0xA5A5_5A5A_DEAD_BEEFu64;

    for step in 0..1500 {
        let r = lcg(&mut rng);
        match r % 3 {
            0 => {
                let len = ((r >> 8) as usize % 512).max(1);
                if let Some(ptr) = heap.alloc(len, 1) {
                    let fill = (step & 0xFF) as u8;
                    heap.payload_mut(ptr).fill(fill);
                    live.push((ptr, fill));
                }
            }
            1 if !live.is_empty() => {
                let idx = (r as usize) % live.len();
                let (ptr, _) = live.swap_remove(idx);
                heap.free(ptr);
            }
            2 if !live.is_empty() => {
                let idx = (r as usize) % live.len();
                let (ptr, _) = live[idx];
                let new_len = (((r >> 16) as usize) % 512).max(1);
                if let Some(new_ptr) = heap.realloc(ptr, new_len, 1) {
                    let fill = (step & 0xFF) as u8;
                    heap.payload_mut(new_ptr).fill(fill);
                    live[idx] = (new_ptr, fill);
                }
            }
            _ => {}
        }

        let blocks = heap.blocks();
        let tiled: usize = blocks.iter().map(|b| b.region_len()).sum();
        assert_eq!(tiled, heap.capacity(), "tiling broke at step {step}");
        let used = blocks.iter().filter(|b| !b.free).count();
        assert_eq!(used, live.len(), "used-block count broke at step {step}");
        let free_sum: usize = blocks
            .iter()
            .filter(|b| b.free)
            .map(|b| b.payload_len)
            .sum();
        assert_eq!(free_sum, heap.total_available());
        for &(ptr, fill) in &live {
            let payload = heap.payload(ptr);
            assert_eq!(payload[0], fill, "payload head clobbered at step {step}");
            assert_eq!(
                payload[payload.len() - 1],
                fill,
                "payload tail clobbered at step {step}"
            );
        }
    }
}
