use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use plottr::registry::DatasetRegistry;
use plottr::structure::structure;
use plottr::{wire, MessageBuilder, WireMessage};

/// A 2-d sweep of `rows` x `cols` points, with rows offset by `row_offset`.
fn sweep(update: bool, rows: usize, cols: usize, row_offset: usize) -> WireMessage {
    let freq: Vec<f64> = (0..rows).map(|r| 4.0e9 + (r + row_offset) as f64 * 1.0e6).collect();
    let power: Vec<f64> = (0..cols).map(|c| -30.0 + c as f64).collect();
    let signal: Vec<f64> = (0..rows * cols).map(|i| (i as f64).sin()).collect();

    MessageBuilder::new("sweep")
        .update(update)
        .grid_axes([("freq", freq), ("power", power)])
        .data("signal", signal, ["freq", "power"])
        .build()
        .unwrap()
}

fn bench_decode(c: &mut Criterion) {
    let payload = wire::encode(&sweep(false, 100, 100, 0)).unwrap();

    let mut group = c.benchmark_group("ingest/decode");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("10k_points", |b| b.iter(|| wire::decode(&payload).unwrap()));
    group.finish();
}

fn bench_structure(c: &mut Criterion) {
    let message = sweep(false, 100, 100, 0);

    let mut group = c.benchmark_group("ingest/structure");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("10k_points", |b| b.iter(|| structure(&message).unwrap()));
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let initial = sweep(false, 200, 50, 0);
    // Half the rows overlap the initial sweep, half are new.
    let update = sweep(true, 100, 50, 150);

    let mut group = c.benchmark_group("ingest/merge");
    group.throughput(Throughput::Elements(5_000));
    group.bench_function("5k_into_10k", |b| {
        b.iter_batched(
            || {
                let mut reg = DatasetRegistry::new();
                reg.apply("sweep", &initial, false).unwrap();
                reg
            },
            |mut reg| reg.apply("sweep", &update, true).unwrap(),
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_decode, bench_structure, bench_merge);
criterion_main!(benches);
