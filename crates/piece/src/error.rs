//! Error types for the comb-piece crate
//!
//! Every [`PieceError`] variant names the pipeline step that failed, wrapping
//! the underlying codec, padding, commitment or I/O error unchanged.

use std::io;

use comb_primitives::{CommitmentError, ContentId, PrimitivesError};
use thiserror::Error;

/// Result type for piece pipeline operations
pub type Result<T> = std::result::Result<T, PieceError>;

/// Errors from a block store backend
#[derive(Error, Debug)]
pub enum BlockstoreError {
    /// A stored block could not be decoded
    #[error("corrupt block {cid}: {source}")]
    Corrupt {
        /// Block content id
        cid: ContentId,
        /// Decoding failure
        #[source]
        source: PrimitivesError,
    },

    /// Backend specific failure
    #[error("blockstore backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the archive codec
#[derive(Error, Debug)]
pub enum CarError {
    /// A block reachable from the root is not in the block store
    #[error("block {0} not found in blockstore")]
    MissingBlock(ContentId),

    /// The archive header is malformed
    #[error("invalid archive header: {0}")]
    InvalidHeader(&'static str),

    /// A block section is larger than the codec accepts
    #[error("block section of {0} bytes exceeds limit")]
    BlockTooLarge(u64),

    /// A block's bytes do not hash to the content id recorded beside them
    #[error("block content id mismatch: expected {expected}, got {actual}")]
    CidMismatch {
        /// Recorded content id
        expected: ContentId,
        /// Content id of the bytes read
        actual: ContentId,
    },

    /// The block bytes could not be decoded
    #[error("invalid block: {0}")]
    Block(#[from] PrimitivesError),

    /// Block store failure
    #[error(transparent)]
    Blockstore(#[from] BlockstoreError),

    /// Reading or writing the archive stream failed
    #[error("archive I/O: {0}")]
    Io(#[from] io::Error),
}

/// Errors from the piece preparation pipeline
#[derive(Error, Debug)]
pub enum PieceError {
    /// Traversing the payload graph failed
    #[error("preparing archive: {0}")]
    PrepareCar(#[source] CarError),

    /// Writing the archive failed
    #[error("writing archive: {0}")]
    WriteCar(#[source] CarError),

    /// Loading an archive into the block store failed
    #[error("loading archive: {0}")]
    LoadCar(#[source] CarError),

    /// Opening the producer/consumer pipe failed
    #[error("opening pipe: {0}")]
    Pipe(#[source] io::Error),

    /// The archive producer thread panicked
    #[error("archive producer panicked")]
    ProducerPanicked,

    /// No size class can hold the archive
    #[error("padding piece: {0}")]
    Padding(#[source] PrimitivesError),

    /// Hashing the padded piece failed
    #[error("computing piece commitment: {0}")]
    Commitment(#[source] CommitmentError),

    /// Creating the temporary piece file failed
    #[error("creating temp file: {0}")]
    CreateTemp(#[source] io::Error),

    /// Measuring or rewinding the temporary piece file failed
    #[error("preparing temp file {path}: {source}")]
    TempFile {
        /// Temp file path
        path: std::path::PathBuf,
        /// Underlying failure
        #[source]
        source: io::Error,
    },
}
