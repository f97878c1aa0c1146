//! Deterministic allocation traces with shadow-model verification.
//!
//! A trace is a seeded LCG stream of allocator operations replayed
//! against a fresh arena. The runner keeps a shadow table of live
//! payloads (offset + fill byte) and, after every operation, verifies
//! the properties the allocator guarantees: the block list tiles the
//! usable arena exactly, block offsets stay in ascending order, the
//! used-block count matches the shadow table, and no live payload has
//! been clobbered. Violations are collected into the report rather
//! than panicking, so a run always produces a full account.

use fixheap_core::{DiagnosticSink, HEADER_SIZE, HeapAllocator, MemorySink, Severity};

use crate::report::TraceReport;

/// Parameters of one deterministic trace run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceConfig {
    /// LCG seed; equal seeds replay the identical operation stream.
    pub seed: u64,
    /// Number of operations to execute.
    pub ops: usize,
    /// Byte length of the backing arena.
    pub arena_len: usize,
    /// Upper bound on a single request, in bytes.
    pub max_request: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            seed: 0xB10C_FEED,
            ops: 2_000,
            arena_len: 64 * 1024,
            max_request: 512,
        }
    }
}

fn lcg(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

/// Executes the trace described by `config` and returns its report.
#[must_use]
pub fn run_trace(config: &TraceConfig) -> TraceReport {
    let mut buf = vec![0u8; config.arena_len];
    let sink = MemorySink::new();
    let diags = sink.clone();
    let mut heap = HeapAllocator::with_sink(&mut buf, sink);

    let mut report = TraceReport::new(config);
    let mut live: Vec<(usize, u8)> = Vec::new();
    let mut rng = config.seed;
    let mut fill_counter = 0u8;
    let max_request = config.max_request.max(1);

    for step in 0..config.ops {
        let r = lcg(&mut rng);
        match r % 16 {
            0..=7 => {
                report.allocs_attempted += 1;
                let len = ((r >> 8) as usize % max_request).max(1);
                match heap.alloc(len, 1) {
                    Some(ptr) => {
                        fill_counter = fill_counter.wrapping_add(1);
                        heap.payload_mut(ptr).fill(fill_counter);
                        live.push((ptr, fill_counter));
                        report.allocs_succeeded += 1;
                    }
                    None => report.oom_events += 1,
                }
            }
            8..=11 if !live.is_empty() => {
                let idx = (r as usize) % live.len();
                let (ptr, _) = live.swap_remove(idx);
                heap.free(ptr);
                report.frees += 1;
            }
            12..=13 if !live.is_empty() => {
                let idx = (r as usize) % live.len();
                let (ptr, _) = live[idx];
                let new_len = (((r >> 16) as usize) % max_request).max(1);
                report.reallocs += 1;
                match heap.realloc(ptr, new_len, 1) {
                    Some(new_ptr) => {
                        fill_counter = fill_counter.wrapping_add(1);
                        heap.payload_mut(new_ptr).fill(fill_counter);
                        live[idx] = (new_ptr, fill_counter);
                    }
                    None => report.oom_events += 1,
                }
            }
            14 if !live.is_empty() => {
                // Free a block, then free it again while its header is
                // still in place, exercising the logged non-fatal
                // double-free path. Skipped when the freed block merged
                // into a predecessor, since its header no longer exists.
                let idx = (r as usize) % live.len();
                let (ptr, _) = live.swap_remove(idx);
                heap.free(ptr);
                report.frees += 1;
                let header_intact = heap
                    .blocks()
                    .iter()
                    .any(|b| b.free && b.offset + HEADER_SIZE == ptr);
                if header_intact {
                    heap.free(ptr);
                    report.double_frees_injected += 1;
                }
            }
            15 => {
                heap.reset();
                live.clear();
                report.resets += 1;
            }
            _ => {}
        }

        let live_bytes: usize = live.iter().map(|&(ptr, _)| heap.payload(ptr).len()).sum();
        report.peak_live_bytes = report.peak_live_bytes.max(live_bytes);
        verify_step(&heap, &live, step, &mut report.violations);
        report.ops_executed += 1;
    }

    let double_free_lines = diags
        .entries()
        .iter()
        .filter(|(s, line)| *s == Severity::Error && line.contains("double free"))
        .count() as u64;
    if double_free_lines != report.double_frees_injected {
        report.violations.push(format!(
            "injected {} double frees but the sink recorded {}",
            report.double_frees_injected, double_free_lines
        ));
    }

    report.final_total_available = heap.total_available();
    report.final_largest_available = heap.largest_available();
    report.final_block_count = heap.blocks().len();
    report
}

fn verify_step<S: DiagnosticSink>(
    heap: &HeapAllocator<'_, S>,
    live: &[(usize, u8)],
    step: usize,
    violations: &mut Vec<String>,
) {
    let blocks = heap.blocks();

    let tiled: usize = blocks.iter().map(|b| b.region_len()).sum();
    if tiled != heap.capacity() {
        violations.push(format!(
            "step {step}: blocks cover {tiled} of {} usable bytes",
            heap.capacity()
        ));
    }

    for pair in blocks.windows(2) {
        if pair[0].offset >= pair[1].offset {
            violations.push(format!(
                "step {step}: block {:#x} not below its successor {:#x}",
                pair[0].offset, pair[1].offset
            ));
        }
    }

    let used = blocks.iter().filter(|b| !b.free).count();
    if used != live.len() {
        violations.push(format!(
            "step {step}: {used} used blocks but {} live in the shadow table",
            live.len()
        ));
    }

    for &(ptr, fill) in live {
        let payload = heap.payload(ptr);
        if payload[0] != fill || payload[payload.len() - 1] != fill {
            violations.push(format!(
                "step {step}: payload at {ptr:#x} clobbered (expected fill {fill:#04x})"
            ));
        }
    }
}
