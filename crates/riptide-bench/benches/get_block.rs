//! Block fetch benchmarks: hit path, cross-page assembly, batch pipeline.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use riptide_bench::bench_pool;
use riptide_buffer::{BlockRequest, PoolConfig};

const PAGE: usize = 4096;
const PAGES: usize = 1024;

fn hit_config() -> PoolConfig {
    // Pool larger than the file: everything stays resident.
    PoolConfig::new(PAGES).with_partitions(4).with_page_size(PAGE)
}

fn bench_single_page_hit(c: &mut Criterion) {
    let pool = bench_pool(hit_config(), PAGES);
    pool.manager.warmup().expect("warmup");

    let mut group = c.benchmark_group("get_block");
    group.throughput(Throughput::Bytes(PAGE as u64));
    let mut rng = StdRng::seed_from_u64(7);
    group.bench_function("single_page_hit", |b| {
        b.iter(|| {
            let fpage = rng.gen_range(0..PAGES) as u64;
            let block = pool
                .manager
                .get_block(pool.file, fpage * PAGE as u64, PAGE)
                .expect("get_block");
            criterion::black_box(block.as_contiguous());
        })
    });
    group.finish();
}

fn bench_small_read_hit(c: &mut Criterion) {
    let pool = bench_pool(hit_config(), PAGES);
    pool.manager.warmup().expect("warmup");

    let mut group = c.benchmark_group("get_block");
    group.throughput(Throughput::Bytes(64));
    let mut rng = StdRng::seed_from_u64(11);
    group.bench_function("small_read_hit", |b| {
        b.iter(|| {
            let offset = rng.gen_range(0..PAGES as u64 * PAGE as u64 - 64);
            let block = pool
                .manager
                .get_block(pool.file, offset, 64)
                .expect("get_block");
            criterion::black_box(block.len());
        })
    });
    group.finish();
}

fn bench_cross_page_read(c: &mut Criterion) {
    let pool = bench_pool(hit_config(), PAGES);
    pool.manager.warmup().expect("warmup");

    let mut group = c.benchmark_group("get_block");
    group.throughput(Throughput::Bytes(3 * PAGE as u64));
    let mut rng = StdRng::seed_from_u64(13);
    group.bench_function("cross_page_read", |b| {
        b.iter(|| {
            let fpage = rng.gen_range(0..PAGES - 4) as u64;
            let block = pool
                .manager
                .get_block(pool.file, fpage * PAGE as u64 + 100, 3 * PAGE)
                .expect("get_block");
            criterion::black_box(block.pin_count());
        })
    });
    group.finish();
}

fn bench_batch_hits(c: &mut Criterion) {
    let pool = bench_pool(hit_config(), PAGES);
    pool.manager.warmup().expect("warmup");

    let mut group = c.benchmark_group("get_block_batch");
    group.throughput(Throughput::Bytes(32 * PAGE as u64));
    let mut rng = StdRng::seed_from_u64(17);
    group.bench_function("batch_32_hits", |b| {
        b.iter_batched(
            || {
                (0..32)
                    .map(|_| {
                        let fpage = rng.gen_range(0..PAGES) as u64;
                        BlockRequest::new(pool.file, fpage * PAGE as u64, PAGE)
                    })
                    .collect::<Vec<_>>()
            },
            |requests| {
                let results = pool.manager.get_block_batch(&requests);
                criterion::black_box(results.len());
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_set_block(c: &mut Criterion) {
    let pool = bench_pool(hit_config(), PAGES);
    pool.manager.warmup().expect("warmup");

    let payload = vec![0xEEu8; 256];
    let mut group = c.benchmark_group("set_block");
    group.throughput(Throughput::Bytes(256));
    let mut rng = StdRng::seed_from_u64(19);
    group.bench_function("small_overwrite", |b| {
        b.iter(|| {
            let offset = rng.gen_range(0..PAGES as u64 * PAGE as u64 - 256);
            pool.manager
                .set_block(pool.file, offset, &payload, false)
                .expect("set_block");
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_single_page_hit,
    bench_small_read_hit,
    bench_cross_page_read,
    bench_batch_hits,
    bench_set_block
);
criterion_main!(benches);
