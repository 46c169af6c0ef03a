//! Property tests over the whole write/finalise/read cycle.

mod common;

use std::sync::Arc;

use common::small_config;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use secrypt_core::{DataMap, MemoryChunkStore, SelfEncryptor};

fn encrypt(data: &[u8]) -> (Arc<MemoryChunkStore>, DataMap) {
    common::encrypt(data, small_config())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn roundtrip_recovers_every_stream(
        data in proptest::collection::vec(any::<u8>(), 0..20_000),
    ) {
        let (store, map) = encrypt(&data);
        common::assert_sizes_consistent(&map);

        let reader = SelfEncryptor::open(store, map, small_config()).unwrap();
        let mut recovered = vec![0u8; data.len()];
        reader.read(&mut recovered, 0).unwrap();
        prop_assert_eq!(recovered, data);
    }

    #[test]
    fn chunk_count_follows_the_threshold(length in 0usize..20_000) {
        let data = common::random_bytes(length, 0xC0FFEE);
        let (_, map) = encrypt(&data);

        if length < 3 * 1025 {
            prop_assert_eq!(map.chunks().len(), 0);
            prop_assert_eq!(map.residual_content().len(), length);
        } else {
            prop_assert!(map.chunks().len() >= 3);
        }
    }

    #[test]
    fn independent_engines_converge(
        data in proptest::collection::vec(any::<u8>(), 0..20_000),
    ) {
        let (_, first) = encrypt(&data);
        let (_, second) = encrypt(&data);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn any_write_order_yields_the_same_map(
        data in proptest::collection::vec(any::<u8>(), 1..16_000),
        seed in any::<u64>(),
    ) {
        // cut the stream into non-overlapping segments, shuffle, and write
        // each at its true offset
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cuts = vec![0, data.len()];
        for _ in 0..rng.random_range(0..6usize) {
            cuts.push(rng.random_range(0..=data.len()));
        }
        cuts.sort_unstable();
        cuts.dedup();
        let mut segments: Vec<(usize, &[u8])> = cuts
            .windows(2)
            .map(|window| (window[0], &data[window[0]..window[1]]))
            .collect();
        segments.shuffle(&mut rng);

        let store = Arc::new(MemoryChunkStore::new());
        let mut engine = SelfEncryptor::new(store, small_config()).unwrap();
        for (offset, segment) in segments {
            engine.write(segment, offset as u64).unwrap();
        }
        let permuted = engine.finalise().unwrap();

        let (_, in_order) = encrypt(&data);
        prop_assert_eq!(permuted, in_order);
    }
}
