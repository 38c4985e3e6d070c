//! Piece sizes and size classes
//!
//! A piece is padded up to a size class before it is committed to. Size
//! classes are the powers of two starting at [`MIN_PIECE_SIZE`]. Padding is
//! plain zero fill, so a padded piece of size `n` holds up to `n` source bytes.

use std::fmt;

use crate::error::{PrimitivesError, Result};

/// Smallest size class in bytes.
pub const MIN_PIECE_SIZE: u64 = 128;

/// Natural length of an archive encoding before padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct UnpaddedPieceSize(u64);

impl UnpaddedPieceSize {
    /// Wrap a byte length.
    pub const fn new(size: u64) -> Self {
        Self(size)
    }

    /// The byte length.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The smallest size class that holds this many bytes.
    pub fn padded(self) -> Result<PaddedPieceSize> {
        self.0
            .max(MIN_PIECE_SIZE)
            .checked_next_power_of_two()
            .map(PaddedPieceSize)
            .ok_or(PrimitivesError::PieceSizeOverflow(self.0))
    }
}

impl From<u64> for UnpaddedPieceSize {
    fn from(size: u64) -> Self {
        Self(size)
    }
}

impl fmt::Display for UnpaddedPieceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Length of a piece after padding. Always a valid size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u64", into = "u64"))]
pub struct PaddedPieceSize(u64);

impl PaddedPieceSize {
    /// Validate a padded size.
    pub fn new(size: u64) -> Result<Self> {
        if size >= MIN_PIECE_SIZE && size.is_power_of_two() {
            Ok(Self(size))
        } else {
            Err(PrimitivesError::InvalidPaddedSize(size))
        }
    }

    /// The byte length.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Number of source bytes this size class can hold.
    pub const fn capacity(self) -> UnpaddedPieceSize {
        UnpaddedPieceSize(self.0)
    }
}

impl TryFrom<u64> for PaddedPieceSize {
    type Error = PrimitivesError;

    fn try_from(size: u64) -> Result<Self> {
        Self::new(size)
    }
}

impl From<PaddedPieceSize> for u64 {
    fn from(size: PaddedPieceSize) -> Self {
        size.0
    }
}

impl fmt::Display for PaddedPieceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
