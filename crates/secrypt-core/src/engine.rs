//! The self-encryption engine.
//!
//! A [`SelfEncryptor`] owns the write-side state of one stream: the
//! sequencer reordering incoming writes, the chunker cutting the in-order
//! bytes, and the descriptor slots of the data map under construction. It
//! holds the chunk store behind a shared reference and never persists
//! anything else.
//!
//! # Write path
//!
//! Bytes flow `write -> sequencer -> chunker -> per-chunk pipeline -> store`.
//! Once three nominal chunks' worth of in-order bytes exist, the first two
//! chunks are hashed and held back (their encryption material depends on the
//! hashes of the *last* two chunks), while every later full chunk is hashed,
//! encrypted and stored eagerly from a worker pool. `finalise` cuts the
//! trailing chunks, seals the two held-back chunks, and returns the
//! immutable [`DataMap`].
//!
//! Memory stays bounded by the sequencer buffer, the two held-back chunks
//! and the chunks of the batch in flight; committed chunk bytes are dropped
//! as soon as they are stored.
//!
//! # Read path
//!
//! `read` walks the descriptor list once to find the affected chunk range,
//! then fetches, verifies and decrypts those chunks in parallel, each worker
//! writing into its own disjoint window of the caller's buffer. Bytes in the
//! residual region are copied straight out of the map.

use std::sync::Arc;

use rayon::prelude::*;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument, trace, warn};

use crate::chunker::{Chunker, Emit};
use crate::config::{ConfigError, EngineConfig};
use crate::crypto::hashing::{self, StreamHasher};
use crate::crypto::keys;
use crate::crypto::pipeline;
use crate::data_map::{ChunkDescriptor, ChunkHash, DataMap};
use crate::error::{Error, InputError, IntegrityError, StorageError};
use crate::sequencer::Sequencer;
use crate::store::{ChunkStore, DeleteOutcome, PutOutcome};

/// Descriptor slot for a chunk whose ciphertext may not exist yet.
#[derive(Debug)]
struct PendingChunk {
    pre_hash: ChunkHash,
    pre_size: u64,
    post: Option<(ChunkHash, u64)>,
}

#[derive(Debug)]
enum State {
    Writing,
    Sealed(DataMap),
}

/// One chunk's contribution to a read request.
struct ReadJob {
    index: usize,
    skip: usize,
    length: usize,
}

/// Outcome of [`SelfEncryptor::delete_all`].
///
/// Missing blobs are reported, not treated as failures: identical chunks
/// share one blob, and a second `delete_all` finds nothing left at all.
#[derive(Debug, Default)]
pub struct DeleteReport {
    pub deleted: Vec<ChunkHash>,
    pub missing: Vec<ChunkHash>,
    pub failed: Vec<ChunkHash>,
}

impl DeleteReport {
    /// True when no delete call errored.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct SelfEncryptor {
    store: Arc<dyn ChunkStore>,
    config: EngineConfig,
    pool: rayon::ThreadPool,
    state: State,
    sequencer: Sequencer,
    chunker: Chunker,
    slots: Vec<PendingChunk>,
    /// Raw bytes of chunks 0 and 1 while their encryption is pending.
    deferred: Vec<Vec<u8>>,
    /// Whether the held-back chunks were folded into the stream hash yet.
    /// They stay patchable until the first eager commit freezes them.
    deferred_hashed: bool,
    stream_hasher: StreamHasher,
}

impl SelfEncryptor {
    /// Create an engine for writing a fresh stream.
    pub fn new(store: Arc<dyn ChunkStore>, config: EngineConfig) -> Result<Self, Error> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_count)
            .build()
            .map_err(|err| ConfigError::WorkerPool(err.to_string()))?;
        Ok(Self {
            store,
            chunker: Chunker::new(config.nominal_chunk_size, config.min_chunk_size),
            sequencer: Sequencer::new(),
            slots: Vec::new(),
            deferred: Vec::new(),
            deferred_hashed: false,
            stream_hasher: StreamHasher::new(),
            state: State::Writing,
            pool,
            config,
        })
    }

    /// Open a sealed map for reading and deleting.
    pub fn open(
        store: Arc<dyn ChunkStore>,
        map: DataMap,
        config: EngineConfig,
    ) -> Result<Self, Error> {
        let mut engine = Self::new(store, config)?;
        engine.state = State::Sealed(map);
        Ok(engine)
    }

    /// The sealed map, once `finalise` has run.
    pub fn data_map(&self) -> Option<&DataMap> {
        match &self.state {
            State::Sealed(map) => Some(map),
            State::Writing => None,
        }
    }

    /// Accept `data` at `offset`, in any order relative to other writes.
    ///
    /// Writes at the cursor stream straight into the chunker; writes beyond
    /// it are parked in the sequencer. A write below the cursor is a rewrite
    /// and only succeeds while every touched byte is still raw (parked,
    /// pending, or held back with nothing encrypted yet); anything else
    /// fails with [`InputError::RewriteNotSupported`].
    #[instrument(level = "debug", skip(self, data), fields(length = data.len()))]
    pub fn write(&mut self, data: &[u8], offset: u64) -> Result<(), Error> {
        if matches!(self.state, State::Sealed(_)) {
            return Err(InputError::AlreadyFinalised.into());
        }
        if data.is_empty() {
            return Ok(());
        }
        let length = data.len() as u64;
        let Some(end) = offset.checked_add(length) else {
            return Err(InputError::OffsetOverflow { offset, length }.into());
        };

        let cursor = self.sequencer.cursor();
        if offset < cursor {
            let overlap = (cursor.min(end) - offset) as usize;
            self.patch(offset, &data[..overlap])?;
            if end > cursor {
                self.ingest(cursor, &data[overlap..])?;
            }
            return Ok(());
        }
        self.ingest(offset, data)
    }

    /// Seal the stream and return its immutable map.
    ///
    /// Drains the sequencer (holes below parked segments read back as
    /// zeros), cuts the trailing chunks, encrypts everything still raw,
    /// including the two held-back chunks whose material now exists, and
    /// seals. Idempotent: a second call returns the same map.
    #[instrument(level = "debug", skip(self))]
    pub fn finalise(&mut self) -> Result<DataMap, Error> {
        if let State::Sealed(map) = &self.state {
            return Ok(map.clone());
        }

        for (start, segment) in self.sequencer.take_pending() {
            let cursor = self.sequencer.cursor();
            if start > cursor {
                trace!(gap = start - cursor, "zero-filling unwritten hole");
                let zeros = vec![0u8; (start - cursor) as usize];
                self.ingest(cursor, &zeros)?;
            }
            let cursor = self.sequencer.cursor();
            self.ingest(cursor, &segment)?;
        }

        let split = self.chunker.finalise();

        if !self.deferred.is_empty() && !self.deferred_hashed {
            for chunk in &self.deferred {
                self.stream_hasher.update(chunk);
            }
            self.deferred_hashed = true;
        }

        let base = self.slots.len();
        let tail_hashes: Vec<ChunkHash> = self
            .pool
            .install(|| split.chunks.par_iter().map(|chunk| hashing::hash(chunk)).collect());
        for (chunk, pre_hash) in split.chunks.iter().zip(&tail_hashes) {
            self.slots.push(PendingChunk {
                pre_hash: *pre_hash,
                pre_size: chunk.len() as u64,
                post: None,
            });
            self.stream_hasher.update(chunk);
        }
        self.stream_hasher.update(&split.residual);
        let file_hash = std::mem::take(&mut self.stream_hasher).finish();
        let total_size = self.sequencer.cursor();

        if self.slots.is_empty() {
            debug!(total_size, "stream below chunking threshold; sealing residual-only map");
            let map = DataMap::new(Vec::new(), split.residual, total_size, file_hash);
            self.state = State::Sealed(map.clone());
            return Ok(map);
        }

        let mut jobs: Vec<(usize, Vec<u8>)> = Vec::with_capacity(split.chunks.len() + 2);
        for (k, chunk) in split.chunks.into_iter().enumerate() {
            jobs.push((base + k, chunk));
        }
        for (index, chunk) in std::mem::take(&mut self.deferred).into_iter().enumerate() {
            jobs.push((index, chunk));
        }
        self.seal_batch(jobs)?;

        let mut chunks = Vec::with_capacity(self.slots.len());
        for (index, slot) in self.slots.iter().enumerate() {
            let Some((post_hash, post_size)) = slot.post else {
                return Err(StorageError::ChunkNotCommitted { index }.into());
            };
            chunks.push(ChunkDescriptor {
                pre_hash: slot.pre_hash,
                pre_size: slot.pre_size,
                post_hash,
                post_size,
            });
        }

        debug!(
            chunks = chunks.len(),
            residual = split.residual.len(),
            total_size,
            "stream sealed"
        );
        let map = DataMap::new(chunks, split.residual, total_size, file_hash);
        self.state = State::Sealed(map.clone());
        Ok(map)
    }

    /// Reconstruct `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// Requires a sealed map. The whole range must lie within the stream;
    /// an empty `buf` is a no-op.
    #[instrument(level = "debug", skip(self, buf), fields(length = buf.len()))]
    pub fn read(&self, buf: &mut [u8], offset: u64) -> Result<(), Error> {
        let State::Sealed(map) = &self.state else {
            return Err(InputError::NotFinalised.into());
        };
        let length = buf.len() as u64;
        let in_bounds = offset
            .checked_add(length)
            .is_some_and(|end| end <= map.total_size());
        if !in_bounds {
            return Err(InputError::OutOfRange {
                offset,
                length,
                total_size: map.total_size(),
            }
            .into());
        }
        if buf.is_empty() {
            return Ok(());
        }
        let end = offset + length;

        // One prefix-sum walk locates every chunk the range touches.
        let mut jobs = Vec::new();
        let mut chunk_start = 0u64;
        for (index, descriptor) in map.chunks().iter().enumerate() {
            let chunk_end = chunk_start + descriptor.pre_size;
            if chunk_end <= offset {
                chunk_start = chunk_end;
                continue;
            }
            if chunk_start >= end {
                break;
            }
            let from = offset.max(chunk_start);
            let to = end.min(chunk_end);
            jobs.push(ReadJob {
                index,
                skip: (from - chunk_start) as usize,
                length: (to - from) as usize,
            });
            chunk_start = chunk_end;
        }

        // Carve the output into one disjoint window per chunk so workers
        // write without sharing; the residual window comes last.
        let chunked_size = map.chunked_size();
        let chunk_region = end.min(chunked_size).saturating_sub(offset) as usize;
        let (chunk_buf, residual_buf) = buf.split_at_mut(chunk_region);
        let mut windows = Vec::with_capacity(jobs.len());
        let mut rest = chunk_buf;
        for job in jobs {
            let (window, remainder) = rest.split_at_mut(job.length);
            windows.push((job, window));
            rest = remainder;
        }
        debug_assert!(rest.is_empty());

        let descriptors = map.chunks();
        let pre_hashes: Vec<ChunkHash> = descriptors.iter().map(|c| c.pre_hash).collect();
        let store = Arc::clone(&self.store);
        let verify_plaintext = self.config.verify_plaintext_hash_on_read;
        self.pool.install(|| {
            windows
                .into_par_iter()
                .try_for_each(|(job, window)| -> Result<(), Error> {
                    let descriptor = &descriptors[job.index];
                    let blob = store
                        .get(&descriptor.post_hash)
                        .map_err(|source| StorageError::StoreGetFailed {
                            index: job.index,
                            source,
                        })?
                        .ok_or(StorageError::ChunkMissing {
                            index: job.index,
                            key: descriptor.post_hash,
                        })?;
                    if !bool::from(hashing::hash(&blob).0[..].ct_eq(&descriptor.post_hash.0[..])) {
                        warn!(chunk = job.index, "stored blob fails its post-hash check");
                        return Err(IntegrityError::PostHashMismatch { index: job.index }.into());
                    }

                    let chunk_keys = keys::derive_for_chunk(&pre_hashes, job.index);
                    let plain = pipeline::open_chunk(&blob, &chunk_keys);
                    if plain.len() as u64 != descriptor.pre_size {
                        return Err(IntegrityError::PreHashMismatch { index: job.index }.into());
                    }
                    if verify_plaintext
                        && !bool::from(
                            hashing::hash(&plain).0[..].ct_eq(&descriptor.pre_hash.0[..]),
                        )
                    {
                        warn!(chunk = job.index, "decrypted bytes fail their pre-hash check");
                        return Err(IntegrityError::PreHashMismatch { index: job.index }.into());
                    }
                    window.copy_from_slice(&plain[job.skip..job.skip + job.length]);
                    Ok(())
                })
        })?;

        if end > chunked_size {
            let from = offset.max(chunked_size);
            let src = (from - chunked_size) as usize;
            residual_buf.copy_from_slice(&map.residual_content()[src..src + residual_buf.len()]);
        }
        Ok(())
    }

    /// Delete every stored chunk this engine knows about.
    ///
    /// Works on a sealed map and equally on a partially written stream, so
    /// an aborted write sequence can be cleaned up. Blobs that are already
    /// gone are reported as missing, never as failures.
    #[instrument(level = "debug", skip(self))]
    pub fn delete_all(&self) -> DeleteReport {
        let keys: Vec<(usize, ChunkHash)> = match &self.state {
            State::Sealed(map) => map
                .chunks()
                .iter()
                .enumerate()
                .map(|(index, chunk)| (index, chunk.post_hash))
                .collect(),
            State::Writing => self
                .slots
                .iter()
                .enumerate()
                .filter_map(|(index, slot)| slot.post.map(|(hash, _)| (index, hash)))
                .collect(),
        };

        let mut report = DeleteReport::default();
        for (index, key) in keys {
            match self.store.delete(&key) {
                Ok(DeleteOutcome::Deleted) => report.deleted.push(key),
                Ok(DeleteOutcome::NotFound) => report.missing.push(key),
                Err(source) => {
                    warn!(chunk = index, error = %source, "chunk delete failed");
                    report.failed.push(key);
                }
            }
        }
        report
    }

    /// Delete a single chunk's blob from the store.
    pub fn delete_chunk(&self, index: usize) -> Result<DeleteOutcome, Error> {
        let State::Sealed(map) = &self.state else {
            return Err(InputError::NotFinalised.into());
        };
        let count = map.chunks().len();
        let Some(descriptor) = map.chunks().get(index) else {
            return Err(InputError::ChunkIndexOutOfRange { index, count }.into());
        };
        self.store
            .delete(&descriptor.post_hash)
            .map_err(|source| StorageError::StoreDeleteFailed { index, source }.into())
    }

    /// Discard all in-progress state and start a fresh stream.
    pub fn reset(&mut self) {
        self.state = State::Writing;
        self.sequencer = Sequencer::new();
        self.chunker = Chunker::new(self.config.nominal_chunk_size, self.config.min_chunk_size);
        self.slots.clear();
        self.deferred.clear();
        self.deferred_hashed = false;
        self.stream_hasher = StreamHasher::new();
    }

    /// Feed a write at or beyond the cursor into the pipeline.
    fn ingest(&mut self, offset: u64, data: &[u8]) -> Result<(), Error> {
        let delivered = self.sequencer.write(offset, data)?;
        if delivered.is_empty() {
            return Ok(());
        }
        self.pump(&delivered)
    }

    /// Run newly in-order bytes through the chunker and commit what it cuts.
    fn pump(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut ready = Vec::new();
        for emit in self.chunker.push(bytes) {
            match emit {
                Emit::Deferred(chunk) => {
                    let pre_hash = hashing::hash(&chunk);
                    self.slots.push(PendingChunk {
                        pre_hash,
                        pre_size: chunk.len() as u64,
                        post: None,
                    });
                    self.deferred.push(chunk);
                }
                Emit::Ready(chunk) => ready.push(chunk),
            }
        }
        if ready.is_empty() {
            return Ok(());
        }
        self.commit_ready(ready)
    }

    /// Hash, encrypt and store a batch of eagerly cut chunks.
    fn commit_ready(&mut self, ready: Vec<Vec<u8>>) -> Result<(), Error> {
        // The first commit freezes the held-back chunks: from here on their
        // bytes are immutable and can enter the stream hash.
        if !self.deferred_hashed {
            for chunk in &self.deferred {
                self.stream_hasher.update(chunk);
            }
            self.deferred_hashed = true;
        }

        let base = self.slots.len();
        let pre_hashes: Vec<ChunkHash> = self
            .pool
            .install(|| ready.par_iter().map(|chunk| hashing::hash(chunk)).collect());
        for (chunk, pre_hash) in ready.iter().zip(&pre_hashes) {
            self.slots.push(PendingChunk {
                pre_hash: *pre_hash,
                pre_size: chunk.len() as u64,
                post: None,
            });
            self.stream_hasher.update(chunk);
        }

        let jobs: Vec<(usize, Vec<u8>)> = ready
            .into_iter()
            .enumerate()
            .map(|(k, chunk)| (base + k, chunk))
            .collect();
        self.seal_batch(jobs)
    }

    /// Encrypt and store the given (index, raw bytes) jobs in parallel.
    ///
    /// Every pre-hash a job depends on must already be recorded: indices
    /// >= 2 read their two predecessors, indices 0 and 1 wrap to the tail
    /// and are only passed in from `finalise`.
    fn seal_batch(&mut self, jobs: Vec<(usize, Vec<u8>)>) -> Result<(), Error> {
        if jobs.is_empty() {
            return Ok(());
        }
        debug!(chunks = jobs.len(), "sealing chunk batch");
        let pre_hashes: Vec<ChunkHash> = self.slots.iter().map(|slot| slot.pre_hash).collect();
        let store = Arc::clone(&self.store);
        let sealed: Vec<(usize, ChunkHash, u64)> = self.pool.install(|| {
            jobs.into_par_iter()
                .map(|(index, bytes)| {
                    let chunk_keys = if index >= 2 {
                        keys::derive(
                            &pre_hashes[index - 1],
                            &pre_hashes[index],
                            &pre_hashes[index - 2],
                        )
                    } else {
                        keys::derive_for_chunk(&pre_hashes, index)
                    };
                    let sealed = pipeline::seal_chunk(&bytes, &chunk_keys);
                    match store.put(&sealed.post_hash, &sealed.content) {
                        Ok(PutOutcome::Stored) => {}
                        Ok(PutOutcome::AlreadyStored) => {
                            trace!(chunk = index, "identical blob already stored");
                        }
                        Err(source) => {
                            return Err(StorageError::StorePutFailed { index, source }.into());
                        }
                    }
                    Ok((index, sealed.post_hash, bytes.len() as u64))
                })
                .collect::<Result<Vec<_>, Error>>()
        })?;
        for (index, post_hash, post_size) in sealed {
            self.slots[index].post = Some((post_hash, post_size));
        }
        Ok(())
    }

    /// Apply a rewrite below the cursor.
    fn patch(&mut self, offset: u64, data: &[u8]) -> Result<(), Error> {
        let end = offset + data.len() as u64;
        debug_assert!(end <= self.sequencer.cursor());
        let deferred_len: u64 = self.deferred.iter().map(|chunk| chunk.len() as u64).sum();
        let consumed = self.chunker.consumed();

        // [deferred_len, consumed) is already encrypted and stored.
        if consumed > deferred_len && offset < consumed && end > deferred_len {
            warn!(offset, end, "rewrite touches committed chunks");
            return Err(InputError::RewriteNotSupported { start: offset, end }.into());
        }

        if offset < deferred_len {
            // The held-back chunks are only patchable while nothing is
            // encrypted: later chunks draw their keys from these hashes.
            if self.slots.iter().any(|slot| slot.post.is_some()) {
                warn!(offset, end, "rewrite of held-back chunks after encryption started");
                return Err(InputError::RewriteNotSupported { start: offset, end }.into());
            }
            let mut chunk_start = 0u64;
            for (index, chunk) in self.deferred.iter_mut().enumerate() {
                let chunk_end = chunk_start + chunk.len() as u64;
                if offset < chunk_end && end > chunk_start {
                    let from = offset.max(chunk_start);
                    let to = end.min(chunk_end);
                    let dst = (from - chunk_start) as usize;
                    let src = (from - offset) as usize;
                    let patch_len = (to - from) as usize;
                    chunk[dst..dst + patch_len].copy_from_slice(&data[src..src + patch_len]);
                    self.slots[index].pre_hash = hashing::hash(chunk);
                }
                chunk_start = chunk_end;
            }
        }

        if end > consumed {
            let from = offset.max(consumed);
            let relative = (from - consumed) as usize;
            let src = (from - offset) as usize;
            self.chunker.patch_pending(relative, &data[src..]);
        }
        trace!(offset, end, "rewrite applied to raw bytes");
        Ok(())
    }
}
