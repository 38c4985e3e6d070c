//! Piece commitments
//!
//! A piece commitment is the root of a binary Merkle tree over the padded
//! piece, built with keccak256 over 64-byte segment pairs. Two pieces with the
//! same commitment are content-identical.
//!
//! ```
//! use comb_primitives::{CommitmentScheme, PadReader, UnpaddedPieceSize, generate_piece_commitment};
//!
//! let payload = vec![42u8; 1000];
//! let (reader, padded) = PadReader::new(payload.as_slice(), UnpaddedPieceSize::new(1000)).unwrap();
//! let commitment = generate_piece_commitment(CommitmentScheme::Sector2KiB, reader, padded).unwrap();
//! assert_eq!(padded.get(), 1024);
//! assert!(!commitment.is_zero());
//! ```

mod constants;
mod error;
mod hasher;
mod scheme;

#[cfg(test)]
mod tests;

use std::fmt;
use std::io::{self, Read};
use std::ops::Deref;

use alloy_primitives::{B256, hex};
use tracing::trace;

pub use error::CommitmentError;
pub use hasher::PieceHasher;
pub use scheme::CommitmentScheme;

/// Commitment to the contents of a padded piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Commitment(B256);

impl Commitment {
    /// Wrap a tree root.
    pub const fn new(root: B256) -> Self {
        Self(root)
    }

    /// The tree root.
    pub const fn root(&self) -> B256 {
        self.0
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.as_slice()))
    }
}

impl Deref for Commitment {
    type Target = B256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<B256> for Commitment {
    fn from(root: B256) -> Self {
        Self(root)
    }
}

/// Compute the commitment of a padded stream of `size` bytes.
///
/// Exactly `size` bytes are consumed from `reader`. A reader that ends early
/// yields [`CommitmentError::ShortRead`].
pub fn generate_piece_commitment<R: Read>(
    scheme: CommitmentScheme,
    reader: R,
    size: crate::PaddedPieceSize,
) -> Result<Commitment, CommitmentError> {
    if size.get() > scheme.max_piece_size() {
        return Err(CommitmentError::PieceTooLarge {
            size: size.get(),
            max: scheme.max_piece_size(),
            scheme,
        });
    }

    let mut hasher = PieceHasher::new(size);
    io::copy(&mut reader.take(size.get()), &mut hasher)?;
    let commitment = hasher.finalize()?;
    trace!(%scheme, size = size.get(), %commitment, "computed piece commitment");
    Ok(commitment)
}
