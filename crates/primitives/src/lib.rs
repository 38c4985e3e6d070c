//! Core primitives for storage deal preparation
//!
//! This crate provides the fundamental types used to turn a content-addressed
//! data graph into a committed piece: content identifiers, graph blocks, piece
//! size classes, the padding transform and the piece commitment.
//!
//! ## Key Components
//!
//! - **Content ids**: keccak256 digests naming blocks and proposals ([`ContentId`])
//! - **Blocks**: linked nodes of a data graph ([`Block`])
//! - **Piece sizes**: power-of-two size classes ([`UnpaddedPieceSize`], [`PaddedPieceSize`])
//! - **Padding**: a reader that zero-fills a stream to its size class ([`PadReader`])
//! - **Commitments**: a binary Merkle root over the padded piece ([`generate_piece_commitment`])
//!
//! ## Usage Examples
//!
//! ```
//! use comb_primitives::{Block, CommitmentScheme, PadReader, generate_piece_commitment};
//!
//! let block = Block::leaf(&b"Hello, world!"[..]);
//! let encoded = block.encode();
//!
//! let (reader, padded) = PadReader::new(&encoded[..], (encoded.len() as u64).into()).unwrap();
//! let commitment = generate_piece_commitment(CommitmentScheme::Sector2KiB, reader, padded).unwrap();
//! println!("{} -> {commitment} ({padded} bytes)", block.cid());
//! ```

// Re-export dependencies that are part of our public API
pub use bytes;

pub mod block;
mod cache;
pub mod cid;
pub mod commitment;
pub mod error;
pub mod padding;
pub mod size;

// Re-export core types
pub use block::Block;
pub use cid::ContentId;
pub use error::{PrimitivesError, Result};
pub use padding::PadReader;
pub use size::{MIN_PIECE_SIZE, PaddedPieceSize, UnpaddedPieceSize};

// Core commitment functionality
pub use commitment::{
    Commitment, CommitmentError, CommitmentScheme, PieceHasher, generate_piece_commitment,
};
