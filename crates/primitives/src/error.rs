//! Error types for the comb-primitives crate
//!
//! The crate uses a two-level error hierarchy:
//!
//! - `PrimitivesError`: The top-level error type that wraps all other errors
//! - Component-specific errors: More detailed errors from specific subsystems
//!   (like [`CommitmentError`](crate::commitment::CommitmentError))
//!
//! ## Example Usage
//!
//! ```
//! use comb_primitives::error::{PrimitivesError, Result};
//! use comb_primitives::UnpaddedPieceSize;
//!
//! fn padded(len: u64) -> Result<u64> {
//!     Ok(UnpaddedPieceSize::new(len).padded()?.get())
//! }
//!
//! match padded(u64::MAX) {
//!     Err(PrimitivesError::PieceSizeOverflow(size)) => assert_eq!(size, u64::MAX),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use thiserror::Error;

/// Result type for operations in the primitives crate
pub type Result<T> = std::result::Result<T, PrimitivesError>;

/// Main error type for the primitives crate
#[derive(Error, Debug)]
pub enum PrimitivesError {
    /// Errors from piece commitment generation
    #[error(transparent)]
    Commitment(#[from] crate::commitment::CommitmentError),

    /// A padded size that is not a valid size class
    #[error("invalid padded piece size {0}: not a power-of-two size class")]
    InvalidPaddedSize(u64),

    /// An unpadded size with no size class large enough to hold it
    #[error("no piece size class can hold {0} bytes")]
    PieceSizeOverflow(u64),

    /// A block encoding that cannot be decoded
    #[error("invalid block encoding: {0}")]
    InvalidBlock(&'static str),

    /// Text that is not a hex encoded content id
    #[error("invalid content id: {0}")]
    InvalidContentId(String),

    /// Input/output errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Array conversion errors
    #[error("Array conversion error: {0}")]
    ArrayConversion(#[from] std::array::TryFromSliceError),
}
