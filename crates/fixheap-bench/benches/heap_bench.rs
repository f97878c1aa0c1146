//! Allocator benchmarks.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use fixheap_core::{HeapAllocator, NullSink};

const ARENA_LEN: usize = 256 * 1024;

fn bench_alloc_free_cycle(c: &mut Criterion) {
    let sizes: &[usize] = &[16, 64, 256, 1024, 4096];
    let mut group = c.benchmark_group("alloc_free_cycle");

    for &size in sizes {
        group.bench_with_input(BenchmarkId::new("fixheap", size), &size, |b, &sz| {
            let mut buf = vec![0u8; ARENA_LEN];
            let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
            b.iter(|| {
                let ptr = heap.alloc(sz, 1).expect("arena large enough");
                criterion::black_box(ptr);
                heap.free(ptr);
            });
        });
    }
    group.finish();
}

fn bench_alloc_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_burst");

    group.bench_function("256x64B", |b| {
        let mut buf = vec![0u8; ARENA_LEN];
        let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
        b.iter(|| {
            let ptrs: Vec<usize> = (0..256)
                .map(|_| heap.alloc(64, 1).expect("arena large enough"))
                .collect();
            for ptr in ptrs {
                heap.free(ptr);
            }
        });
    });

    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    fn lcg(state: &mut u64) -> u64 {
        *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        *state
    }

    let mut group = c.benchmark_group("churn");

    group.bench_function("steady_state_mixed", |b| {
        let mut buf = vec![0u8; ARENA_LEN];
        let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
        let mut live: Vec<usize> = Vec::new();
        let mut rng = 0x5EED_5EEDu64;
        b.iter(|| {
            let r = lcg(&mut rng);
            if r % 2 == 0 || live.is_empty() {
                let len = ((r >> 8) as usize % 512).max(1);
                if let Some(ptr) = heap.alloc(len, 1) {
                    live.push(ptr);
                }
            } else {
                let idx = (r as usize) % live.len();
                heap.free(live.swap_remove(idx));
            }
        });
        for ptr in live {
            heap.free(ptr);
        }
    });

    group.finish();
}

fn bench_coalesce_recovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("coalesce_recovery");

    group.bench_function("fragment_then_large", |b| {
        let mut buf = vec![0u8; ARENA_LEN];
        let mut heap = HeapAllocator::with_sink(&mut buf, NullSink);
        b.iter(|| {
            heap.reset();
            let ptrs: Vec<usize> = (0..128)
                .map(|_| heap.alloc(512, 1).expect("arena large enough"))
                .collect();
            for ptr in ptrs {
                heap.free(ptr);
            }
            let big = heap.alloc(128 * 1024, 1).expect("coalesced space");
            heap.free(big);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_alloc_free_cycle,
    bench_alloc_burst,
    bench_churn,
    bench_coalesce_recovery
);
criterion_main!(benches);
