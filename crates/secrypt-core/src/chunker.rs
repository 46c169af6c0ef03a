//! Chunk boundary policy and two-phase emission.
//!
//! Short streams are split three ways (or kept whole below the chunking
//! threshold) only once their final length is known. Long streams switch to
//! the nominal chunk size as soon as three nominal chunks' worth of in-order
//! bytes exist; from that point the first two chunks are held back (their
//! encryption material depends on the hashes of the final chunks) while
//! every later full chunk is handed out eagerly, keeping the in-order buffer
//! bounded.

use std::collections::VecDeque;

/// A chunk's raw bytes leaving the chunker.
#[derive(Debug)]
pub enum Emit {
    /// One of the first two chunks: hash it now, encrypt it at finalise.
    Deferred(Vec<u8>),
    /// A chunk whose neighbours' hashes are already known: process it now.
    Ready(Vec<u8>),
}

/// What remains when the stream ends.
#[derive(Debug)]
pub struct TailSplit {
    /// Final chunks, in stream order.
    pub chunks: Vec<Vec<u8>>,
    /// Trailing bytes too short to form a chunk.
    pub residual: Vec<u8>,
}

#[derive(Debug)]
pub struct Chunker {
    nominal_chunk_size: usize,
    min_chunk_size: usize,
    pending: VecDeque<u8>,
    total_in: u64,
    consumed: u64,
    deferral_done: bool,
}

impl Chunker {
    pub fn new(nominal_chunk_size: usize, min_chunk_size: usize) -> Self {
        Self {
            nominal_chunk_size,
            min_chunk_size,
            pending: VecDeque::new(),
            total_in: 0,
            consumed: 0,
            deferral_done: false,
        }
    }

    /// Bytes accepted so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Bytes already cut into chunks (deferred ones included).
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Bytes waiting in the in-order buffer.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn deferral_done(&self) -> bool {
        self.deferral_done
    }

    /// Accept in-order bytes and cut whatever chunks have become possible.
    ///
    /// Nothing is cut until three nominal chunks' worth of bytes have been
    /// seen; crossing that line yields the two deferred chunks followed by
    /// every complete nominal chunk, and later pushes keep cutting eagerly.
    pub fn push(&mut self, data: &[u8]) -> Vec<Emit> {
        self.pending.extend(data.iter().copied());
        self.total_in += data.len() as u64;

        let mut emits = Vec::new();
        if !self.deferral_done && self.total_in >= 3 * self.nominal_chunk_size as u64 {
            emits.push(Emit::Deferred(self.cut(self.nominal_chunk_size)));
            emits.push(Emit::Deferred(self.cut(self.nominal_chunk_size)));
            self.deferral_done = true;
        }
        if self.deferral_done {
            while self.pending.len() >= self.nominal_chunk_size {
                emits.push(Emit::Ready(self.cut(self.nominal_chunk_size)));
            }
        }
        emits
    }

    /// Cut the end of the stream into final chunks and residual bytes.
    ///
    /// Short streams (nothing deferred) either stay whole below three times
    /// the minimum chunk size or are split into three equal chunks with at
    /// most two spare bytes. Long streams keep the nominal size; a remainder
    /// shorter than the minimum never forms a runt chunk and is kept in the
    /// map instead.
    pub fn finalise(&mut self) -> TailSplit {
        if !self.deferral_done {
            let total = self.pending.len();
            if total < 3 * self.min_chunk_size {
                return TailSplit {
                    chunks: Vec::new(),
                    residual: self.cut(total),
                };
            }
            let chunk_size = total / 3;
            let chunks = vec![
                self.cut(chunk_size),
                self.cut(chunk_size),
                self.cut(chunk_size),
            ];
            return TailSplit {
                chunks,
                residual: self.cut(self.pending.len()),
            };
        }

        let mut chunks = Vec::new();
        while self.pending.len() >= self.nominal_chunk_size {
            chunks.push(self.cut(self.nominal_chunk_size));
        }
        let remainder = self.pending.len();
        if remainder >= self.min_chunk_size {
            chunks.push(self.cut(remainder));
            TailSplit {
                chunks,
                residual: Vec::new(),
            }
        } else {
            TailSplit {
                chunks,
                residual: self.cut(remainder),
            }
        }
    }

    /// Overwrite bytes still sitting in the in-order buffer.
    ///
    /// `relative_offset` counts from the first pending byte.
    pub fn patch_pending(&mut self, relative_offset: usize, data: &[u8]) {
        debug_assert!(relative_offset + data.len() <= self.pending.len());
        for (i, byte) in data.iter().enumerate() {
            self.pending[relative_offset + i] = *byte;
        }
    }

    fn cut(&mut self, length: usize) -> Vec<u8> {
        let chunk: Vec<u8> = self.pending.drain(..length).collect();
        self.consumed += length as u64;
        chunk
    }
}
