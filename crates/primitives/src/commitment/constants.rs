//! Constants used by the piece commitment tree

/// Hash size in bytes (keccak256)
pub(crate) const HASH_SIZE: usize = 32;

/// Length of a segment pair, the input of one leaf hash
pub(crate) const SEGMENT_PAIR_LENGTH: usize = 2 * HASH_SIZE;

/// Bytes buffered and hashed as one unit before merging upwards
pub(crate) const SUBTREE_SIZE: usize = 64 * 1024;

/// Subtrees at or below this size are hashed on the calling thread
pub(crate) const SEQUENTIAL_THRESHOLD: usize = 4 * 1024;

/// Number of levels in the zero-tree cache (64 bytes up to 2^37 bytes)
pub(crate) const ZERO_TREE_LEVELS: usize = 32;

/// Tree level of a power-of-two subtree of `length` bytes.
///
/// Level 0 covers one segment pair.
#[inline(always)]
pub(crate) const fn tree_level(length: usize) -> usize {
    length.trailing_zeros() as usize - SEGMENT_PAIR_LENGTH.trailing_zeros() as usize
}
