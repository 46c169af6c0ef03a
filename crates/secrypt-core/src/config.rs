//! Engine configuration.

use std::thread;

use thiserror::Error;

/// Default chunk size for long streams: 256 KiB.
pub const DEFAULT_NOMINAL_CHUNK_SIZE: usize = 256 * 1024;

/// Smallest accepted nominal chunk size.
pub const MIN_NOMINAL_CHUNK_SIZE: usize = 1024;

/// Largest accepted nominal chunk size: 16 MiB.
pub const MAX_NOMINAL_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Default minimum chunk size. Streams shorter than three times this value
/// are stored entirely in the data map's residual content.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 1025;

/// Upper bound on the worker pool size.
pub const MAX_WORKER_COUNT: usize = 256;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "nominal chunk size {0} outside [{MIN_NOMINAL_CHUNK_SIZE}, {MAX_NOMINAL_CHUNK_SIZE}]"
    )]
    NominalChunkSize(usize),
    #[error("minimum chunk size must be at least 1, got {0}")]
    MinChunkSize(usize),
    #[error("worker count {0} outside [1, {MAX_WORKER_COUNT}]")]
    WorkerCount(usize),
    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Tunables for a [`SelfEncryptor`](crate::engine::SelfEncryptor).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Chunk size used once the stream is long enough to support it.
    pub nominal_chunk_size: usize,
    /// Streams shorter than `3 * min_chunk_size` bytes are kept as residual
    /// content; a trailing remainder shorter than this never forms a chunk
    /// of its own.
    pub min_chunk_size: usize,
    /// Size of the worker pool used for parallel chunk processing.
    pub worker_count: usize,
    /// Re-hash decrypted plaintext on read and compare against the recorded
    /// pre-hash.
    pub verify_plaintext_hash_on_read: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let workers = thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4)
            .min(MAX_WORKER_COUNT);
        Self {
            nominal_chunk_size: DEFAULT_NOMINAL_CHUNK_SIZE,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            worker_count: workers,
            verify_plaintext_hash_on_read: true,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_nominal_chunk_size(mut self, size: usize) -> Self {
        self.nominal_chunk_size = size;
        self
    }

    #[must_use]
    pub fn with_min_chunk_size(mut self, size: usize) -> Self {
        self.min_chunk_size = size;
        self
    }

    #[must_use]
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    #[must_use]
    pub fn with_plaintext_verification(mut self, verify: bool) -> Self {
        self.verify_plaintext_hash_on_read = verify;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_NOMINAL_CHUNK_SIZE..=MAX_NOMINAL_CHUNK_SIZE).contains(&self.nominal_chunk_size) {
            return Err(ConfigError::NominalChunkSize(self.nominal_chunk_size));
        }
        if self.min_chunk_size == 0 {
            return Err(ConfigError::MinChunkSize(self.min_chunk_size));
        }
        if !(1..=MAX_WORKER_COUNT).contains(&self.worker_count) {
            return Err(ConfigError::WorkerCount(self.worker_count));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let too_small = EngineConfig::default().with_nominal_chunk_size(512);
        assert!(matches!(
            too_small.validate(),
            Err(ConfigError::NominalChunkSize(512))
        ));

        let too_large =
            EngineConfig::default().with_nominal_chunk_size(MAX_NOMINAL_CHUNK_SIZE + 1);
        assert!(too_large.validate().is_err());

        let zero_min = EngineConfig::default().with_min_chunk_size(0);
        assert!(matches!(
            zero_min.validate(),
            Err(ConfigError::MinChunkSize(0))
        ));

        let zero_workers = EngineConfig::default().with_worker_count(0);
        assert!(matches!(
            zero_workers.validate(),
            Err(ConfigError::WorkerCount(0))
        ));

        let too_many = EngineConfig::default().with_worker_count(MAX_WORKER_COUNT + 1);
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn builders_compose() {
        let config = EngineConfig::default()
            .with_nominal_chunk_size(4096)
            .with_min_chunk_size(100)
            .with_worker_count(2)
            .with_plaintext_verification(false);
        assert_eq!(config.nominal_chunk_size, 4096);
        assert_eq!(config.min_chunk_size, 100);
        assert_eq!(config.worker_count, 2);
        assert!(!config.verify_plaintext_hash_on_read);
        assert!(config.validate().is_ok());
    }
}
