#![allow(dead_code)]

use std::sync::Arc;

use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use secrypt_core::{DataMap, EngineConfig, MemoryChunkStore, SelfEncryptor};

/// Fresh engine over a fresh in-memory store.
pub fn new_engine(config: EngineConfig) -> (Arc<MemoryChunkStore>, SelfEncryptor) {
    let store = Arc::new(MemoryChunkStore::new());
    let engine = SelfEncryptor::new(store.clone(), config).unwrap();
    (store, engine)
}

/// Small chunks so boundary tests stay fast.
pub fn small_config() -> EngineConfig {
    EngineConfig::default()
        .with_nominal_chunk_size(4096)
        .with_worker_count(2)
}

/// The incrementing `i & 0xFF` byte pattern.
pub fn counting_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i & 0xFF) as u8).collect()
}

/// Seeded random payload; distinct chunks for distinct content.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);
    buf
}

/// Encrypt `data` in one in-order write and return the store and sealed map.
pub fn encrypt(data: &[u8], config: EngineConfig) -> (Arc<MemoryChunkStore>, DataMap) {
    let (store, mut engine) = new_engine(config);
    engine.write(data, 0).unwrap();
    let map = engine.finalise().unwrap();
    (store, map)
}

/// Read the whole stream back through a fresh reader.
pub fn read_all(store: Arc<MemoryChunkStore>, map: &DataMap, config: EngineConfig) -> Vec<u8> {
    let reader = SelfEncryptor::open(store, map.clone(), config).unwrap();
    let mut buf = vec![0u8; map.total_size() as usize];
    reader.read(&mut buf, 0).unwrap();
    buf
}

/// The size bookkeeping every sealed map must satisfy.
pub fn assert_sizes_consistent(map: &DataMap) {
    let chunked: u64 = map.chunks().iter().map(|c| c.pre_size).sum();
    assert_eq!(chunked + map.residual_content().len() as u64, map.total_size());
    for chunk in map.chunks() {
        assert_eq!(chunk.pre_size, chunk.post_size);
    }
}
