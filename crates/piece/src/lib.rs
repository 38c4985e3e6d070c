//! Piece preparation for storage deals
//!
//! This crate turns a content-addressed data graph into a committed piece:
//!
//! - **Block storage**: the graph lives in a [`Blockstore`]
//! - **Archive codec**: [`Car`] encodes the selected graph as one byte stream
//! - **Pipeline**: [`PieceIo`] streams the archive through padding into the
//!   piece commitment; [`PieceIoWithStore`] materializes it to a file first
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use comb_piece::{MemoryBlockstore, PieceIo, Selector, import_bytes};
//! use comb_primitives::CommitmentScheme;
//!
//! let bs = Arc::new(MemoryBlockstore::new());
//! let root = import_bytes(&*bs, &[7u8; 10_000], 4096).unwrap();
//!
//! let io = PieceIo::with_blockstore(bs);
//! let (commitment, padded) = io
//!     .generate_piece_commitment(CommitmentScheme::Sector8MiB, root, Selector::ExploreAll)
//!     .unwrap();
//! assert_eq!(padded.get(), 8192);
//! # let _ = commitment;
//! ```

pub mod blockstore;
pub mod car;
pub mod error;
pub mod filestore;
pub mod pipeline;
pub mod selector;

pub use blockstore::{Blockstore, MemoryBlockstore, import_bytes};
pub use car::{Car, CarIo, PreparedArchive, PreparedCar};
pub use error::{BlockstoreError, CarError, PieceError, Result};
pub use filestore::{DirFileStore, FileStore, TempFile};
pub use pipeline::{PieceIo, PieceIoWithStore, generate_piece_commitment_from_reader};
pub use selector::Selector;
