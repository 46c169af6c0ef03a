use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::RngCore;
use secrypt_core::{EngineConfig, MemoryChunkStore, SelfEncryptor};

/// Generate test data of the given size.
fn generate_test_data(size: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; size];
    rng.fill_bytes(&mut data);
    data
}

fn bench_write_finalise(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_finalise");

    for size in [256 * 1024, 1024 * 1024, 4 * 1024 * 1024] {
        let data = generate_test_data(size, 1);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let store = Arc::new(MemoryChunkStore::new());
                let mut engine =
                    SelfEncryptor::new(store, EngineConfig::default()).unwrap();
                engine.write(black_box(data), 0).unwrap();
                black_box(engine.finalise().unwrap());
            });
        });
    }

    group.finish();
}

fn bench_full_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_read");

    for size in [256 * 1024, 1024 * 1024, 4 * 1024 * 1024] {
        let data = generate_test_data(size, 2);
        let store = Arc::new(MemoryChunkStore::new());
        let mut engine = SelfEncryptor::new(store.clone(), EngineConfig::default()).unwrap();
        engine.write(&data, 0).unwrap();
        let map = engine.finalise().unwrap();
        let reader = SelfEncryptor::open(store, map, EngineConfig::default()).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &reader, |b, reader| {
            let mut buf = vec![0u8; size];
            b.iter(|| {
                reader.read(black_box(&mut buf), 0).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write_finalise, bench_full_read);
criterion_main!(benches);
