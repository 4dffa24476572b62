use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gdriver::abi::{ItemDesc, PROCESS_FORWARD};
use gdriver::{Driver, DriverConfig, StaticLoader, SymbolTable};
use libc::{c_int, c_void};

const ITEMS: u64 = 10_000;

unsafe extern "C" fn bench_ph(_item: *mut ItemDesc, _s: *mut c_void, _l: usize) -> c_int {
    PROCESS_FORWARD
}

// Sums the payload into state word 0.
unsafe extern "C" fn bench_th(item: *const ItemDesc, state: *mut c_void, _l: usize) -> c_int {
    let data = std::slice::from_raw_parts((*item).data, (*item).len);
    let sum: u64 = data.iter().map(|&b| b as u64).sum();
    (*(state as *const AtomicU64)).fetch_add(sum, Ordering::Relaxed);
    0
}

fn bench_dispatch(c: &mut Criterion) {
    let loader = StaticLoader::new().with_module(
        "libbench.so",
        SymbolTable::new()
            .process("bench_ph", bench_ph)
            .thread("bench_th", bench_th),
    );

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(ITEMS));
    group.sample_size(20);

    for workers in [1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            b.iter(|| {
                let config = DriverConfig::new().workers(workers).items(ITEMS).item_size(64);
                let driver = Driver::with_loader(loader.clone(), config);
                driver
                    .init(&["bench"], "libbench.so", None, "bench_ph", "bench_th")
                    .unwrap();
                let report = driver.run().unwrap();
                driver.fini();
                black_box(report.processed)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
