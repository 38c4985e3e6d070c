//! Streaming binary Merkle tree hasher for padded pieces
//!
//! The tree is built over 64-byte segment pairs. Input is buffered in
//! subtrees of [`SUBTREE_SIZE`] bytes; each full subtree is hashed in
//! parallel and merged into a stack of completed roots, so memory use stays
//! bounded no matter how large the piece is.

use alloy_primitives::{B256, Keccak256};
use std::io::{self, Write};
use std::sync::LazyLock;

use super::constants::*;
use super::{Commitment, CommitmentError};
use crate::size::PaddedPieceSize;

/// Pre-computed hashes for zero-filled subtrees at each level.
///
/// - Level 0: hash of 64 zero bytes (one segment pair)
/// - Level n: hash of two level n-1 hashes (64 * 2^n bytes of zeros)
static ZERO_HASHES: LazyLock<[B256; ZERO_TREE_LEVELS]> = LazyLock::new(|| {
    let mut hashes = [B256::ZERO; ZERO_TREE_LEVELS];
    hashes[0] = hash_leaf(&[0u8; SEGMENT_PAIR_LENGTH]);
    for i in 1..ZERO_TREE_LEVELS {
        hashes[i] = hash_pair(&hashes[i - 1], &hashes[i - 1]);
    }
    hashes
});

#[inline(always)]
fn hash_leaf(segment_pair: &[u8]) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(segment_pair);
    hasher.finalize()
}

#[inline(always)]
fn hash_pair(left: &B256, right: &B256) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(left.as_slice());
    hasher.update(right.as_slice());
    hasher.finalize()
}

/// Root hash of an all-zero subtree of `length` bytes.
pub(crate) fn zero_subtree_hash(length: usize) -> B256 {
    ZERO_HASHES[tree_level(length)]
}

/// Hash a power-of-two subtree, splitting across the rayon pool.
fn hash_subtree(data: &[u8]) -> B256 {
    debug_assert!(data.len().is_power_of_two());
    debug_assert!(data.len() >= SEGMENT_PAIR_LENGTH);

    if data.len() == SEGMENT_PAIR_LENGTH {
        return hash_leaf(data);
    }

    let (left, right) = data.split_at(data.len() / 2);
    let (left_hash, right_hash) = if data.len() <= SEQUENTIAL_THRESHOLD {
        (hash_subtree(left), hash_subtree(right))
    } else {
        rayon::join(|| hash_subtree(left), || hash_subtree(right))
    };
    hash_pair(&left_hash, &right_hash)
}

/// Hash a buffered subtree, short-circuiting padding regions.
fn hash_buffered(data: &[u8]) -> B256 {
    if data.iter().all(|b| *b == 0) {
        zero_subtree_hash(data.len())
    } else {
        hash_subtree(data)
    }
}

/// Incremental hasher producing the commitment of a padded piece.
///
/// Exactly [`PaddedPieceSize::get`] bytes must be written before
/// [`finalize`](Self::finalize) is called. Writing past that size fails.
#[derive(Debug, Clone)]
pub struct PieceHasher {
    size: PaddedPieceSize,
    written: u64,
    subtree_len: usize,
    buffer: Vec<u8>,
    /// Completed subtree roots as `(level, hash)`, strictly decreasing levels.
    stack: Vec<(usize, B256)>,
}

impl PieceHasher {
    /// Create a hasher for a piece of `size` bytes.
    pub fn new(size: PaddedPieceSize) -> Self {
        let subtree_len = usize::try_from(size.get()).map_or(SUBTREE_SIZE, |s| s.min(SUBTREE_SIZE));
        Self {
            size,
            written: 0,
            subtree_len,
            buffer: Vec::with_capacity(subtree_len),
            stack: Vec::new(),
        }
    }

    /// Declared padded size.
    pub const fn size(&self) -> PaddedPieceSize {
        self.size
    }

    /// Number of bytes written so far.
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Update the hasher with more data.
    ///
    /// Returns the number of bytes accepted, which is less than `data.len()`
    /// only when the declared size is reached.
    pub fn update(&mut self, mut data: &[u8]) -> usize {
        let remaining = self.size.get() - self.written;
        let accepted = data.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        data = &data[..accepted];

        while !data.is_empty() {
            let room = self.subtree_len - self.buffer.len();
            let take = room.min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.buffer.len() == self.subtree_len {
                let root = hash_buffered(&self.buffer);
                self.buffer.clear();
                self.push(tree_level(self.subtree_len), root);
            }
        }

        self.written += accepted as u64;
        accepted
    }

    /// Merge a completed subtree root into the stack.
    fn push(&mut self, mut level: usize, mut hash: B256) {
        while let Some(&(top_level, top_hash)) = self.stack.last() {
            if top_level != level {
                break;
            }
            self.stack.pop();
            hash = hash_pair(&top_hash, &hash);
            level += 1;
        }
        self.stack.push((level, hash));
    }

    /// Finish the tree and return the piece commitment.
    pub fn finalize(mut self) -> Result<Commitment, CommitmentError> {
        if self.written != self.size.get() {
            return Err(CommitmentError::short_read(self.size.get(), self.written));
        }
        // The declared size is a multiple of the subtree length, so a full
        // write leaves the buffer empty and exactly one root on the stack.
        debug_assert!(self.buffer.is_empty());
        debug_assert_eq!(self.stack.len(), 1);
        self.stack
            .pop()
            .map(|(_, root)| Commitment::new(root))
            .ok_or_else(|| CommitmentError::short_read(self.size.get(), self.written))
    }
}

impl Write for PieceHasher {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.update(buf) {
            0 => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "write exceeds the declared padded piece size",
            )),
            n => Ok(n),
        }
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
