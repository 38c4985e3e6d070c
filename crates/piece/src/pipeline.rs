//! Piece preparation pipeline
//!
//! Turns a payload graph into `(commitment, padded size)`:
//!
//! ```text
//! [Blockstore] → [Archive encoder] → [Pad reader] → [Piece hasher]
//! ```
//!
//! In streaming mode the encoder runs on a producer thread writing into an OS
//! pipe while the calling thread pads and hashes from the read end, so the
//! encoded archive is never held in memory. In disk mode the archive is first
//! written to a temp file which is handed to the caller on success.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use comb_primitives::{
    Commitment, CommitmentScheme, ContentId, PadReader, PaddedPieceSize, UnpaddedPieceSize,
    generate_piece_commitment,
};
use tracing::{debug, warn};

use crate::blockstore::Blockstore;
use crate::car::{Car, CarIo, PreparedCar};
use crate::error::{CarError, PieceError, Result};
use crate::filestore::{DirFileStore, FileStore, TempFile};
use crate::selector::Selector;

/// Pad `reader`, which yields `unpadded` bytes, and compute its commitment.
pub fn generate_piece_commitment_from_reader<R: Read>(
    scheme: CommitmentScheme,
    reader: R,
    unpadded: UnpaddedPieceSize,
) -> Result<(Commitment, PaddedPieceSize)> {
    let (padded_reader, padded) = PadReader::new(reader, unpadded).map_err(PieceError::Padding)?;
    let commitment =
        generate_piece_commitment(scheme, padded_reader, padded).map_err(PieceError::Commitment)?;
    Ok((commitment, padded))
}

/// Streaming piece preparation over a block store.
pub struct PieceIo<C = Car> {
    car: C,
    bs: Arc<dyn Blockstore>,
}

impl<C: std::fmt::Debug> std::fmt::Debug for PieceIo<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PieceIo").field("car", &self.car).finish_non_exhaustive()
    }
}

impl<C: Clone> Clone for PieceIo<C> {
    fn clone(&self) -> Self {
        Self {
            car: self.car.clone(),
            bs: Arc::clone(&self.bs),
        }
    }
}

impl PieceIo<Car> {
    /// Pipeline using the default archive codec.
    pub fn with_blockstore(bs: Arc<dyn Blockstore>) -> Self {
        Self::new(Car, bs)
    }
}

impl<C: CarIo> PieceIo<C> {
    /// Create a pipeline reading blocks from `bs`.
    pub fn new(car: C, bs: Arc<dyn Blockstore>) -> Self {
        Self { car, bs }
    }

    /// The block store payloads are read from.
    pub fn blockstore(&self) -> &Arc<dyn Blockstore> {
        &self.bs
    }

    /// The archive codec.
    pub const fn car(&self) -> &C {
        &self.car
    }

    /// Compute the commitment and padded size of the payload under `payload`.
    ///
    /// The archive is produced on a second thread and streamed through a pipe.
    /// Both threads are joined before returning. A failure of the hashing side
    /// takes precedence; a producer failure still fails an otherwise
    /// successful run.
    pub fn generate_piece_commitment(
        &self,
        scheme: CommitmentScheme,
        payload: ContentId,
        selector: Selector,
    ) -> Result<(Commitment, PaddedPieceSize)> {
        let prepared = self
            .car
            .prepare_car(Arc::clone(&self.bs), payload, selector)
            .map_err(PieceError::PrepareCar)?;
        let unpadded = UnpaddedPieceSize::new(prepared.size());
        debug!(%payload, %unpadded, "streaming archive into piece commitment");

        let (reader, writer) = io::pipe().map_err(PieceError::Pipe)?;

        thread::scope(|s| {
            let producer = s.spawn(move || -> std::result::Result<(), CarError> {
                let mut writer = writer;
                prepared.dump(&mut writer)
                // write end closed on drop
            });

            // The read end moves into the consumer and is dropped when it
            // returns, failing any write the producer still has in flight.
            let consumed = generate_piece_commitment_from_reader(scheme, reader, unpadded);
            let produced = producer.join();

            match (consumed, produced) {
                (Err(err), produced) => {
                    if let Ok(Err(producer_err)) = produced {
                        debug!(%payload, error = %producer_err, "archive producer also failed");
                    }
                    Err(err)
                }
                (Ok(_), Err(_)) => Err(PieceError::ProducerPanicked),
                (Ok(_), Ok(Err(producer_err))) => Err(PieceError::WriteCar(producer_err)),
                (Ok(piece), Ok(Ok(()))) => Ok(piece),
            }
        })
    }

    /// Load an archive into the block store, returning its root.
    pub fn read_piece(&self, reader: &mut dyn Read) -> Result<ContentId> {
        let root = self
            .car
            .load_car(&*self.bs, reader)
            .map_err(PieceError::LoadCar)?;
        debug!(%root, "loaded piece archive");
        Ok(root)
    }
}

/// Piece preparation that materializes the archive through a file store.
#[derive(Debug, Clone)]
pub struct PieceIoWithStore<C = Car, F = DirFileStore> {
    io: PieceIo<C>,
    store: F,
}

impl<C: CarIo, F: FileStore> PieceIoWithStore<C, F> {
    /// Create a disk-buffered pipeline.
    pub fn new(car: C, bs: Arc<dyn Blockstore>, store: F) -> Self {
        Self {
            io: PieceIo::new(car, bs),
            store,
        }
    }

    /// The streaming pipeline sharing this block store.
    pub const fn streaming(&self) -> &PieceIo<C> {
        &self.io
    }

    /// The file store temp files are created in.
    pub const fn file_store(&self) -> &F {
        &self.store
    }

    /// Streaming commitment, see [`PieceIo::generate_piece_commitment`].
    pub fn generate_piece_commitment(
        &self,
        scheme: CommitmentScheme,
        payload: ContentId,
        selector: Selector,
    ) -> Result<(Commitment, PaddedPieceSize)> {
        self.io.generate_piece_commitment(scheme, payload, selector)
    }

    /// Load an archive into the block store, returning its root.
    pub fn read_piece(&self, reader: &mut dyn Read) -> Result<ContentId> {
        self.io.read_piece(reader)
    }

    /// Write the archive to a temp file and commit to its padded contents.
    ///
    /// On success the file stays in place and its path is returned; the
    /// caller owns it from then on. On failure the file is closed and
    /// deleted before the error is returned.
    pub fn generate_piece_commitment_to_file(
        &self,
        scheme: CommitmentScheme,
        payload: ContentId,
        selector: Selector,
    ) -> Result<(Commitment, PathBuf, PaddedPieceSize)> {
        let mut file = self.store.create_temp().map_err(PieceError::CreateTemp)?;

        match self.write_and_commit(&mut file, scheme, payload, selector) {
            Ok((commitment, padded)) => {
                let path = file.into_path();
                debug!(%payload, %commitment, path = %path.display(), "materialized piece");
                Ok((commitment, path, padded))
            }
            Err(err) => {
                let path = file.into_path();
                if let Err(cleanup) = self.store.delete(&path) {
                    warn!(path = %path.display(), error = %cleanup, "failed to delete temp piece file");
                }
                Err(err)
            }
        }
    }

    fn write_and_commit(
        &self,
        file: &mut TempFile,
        scheme: CommitmentScheme,
        payload: ContentId,
        selector: Selector,
    ) -> Result<(Commitment, PaddedPieceSize)> {
        self.io
            .car
            .write_car(&*self.io.bs, payload, selector, file)
            .map_err(PieceError::WriteCar)?;

        let path = file.path().to_owned();
        let temp_err = |source: io::Error| PieceError::TempFile {
            path: path.clone(),
            source,
        };
        file.flush().map_err(temp_err)?;
        let size = file.len().map_err(temp_err)?;
        file.seek(SeekFrom::Start(0)).map_err(temp_err)?;

        generate_piece_commitment_from_reader(scheme, file, UnpaddedPieceSize::new(size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockstore::{MemoryBlockstore, import_bytes};
    use crate::car::{HEADER_LEN, SECTION_OVERHEAD};
    use comb_primitives::Block;
    use rand::RngCore;

    fn random_payload(bs: &dyn Blockstore, len: usize) -> ContentId {
        let mut data = vec![0u8; len];
        rand::rng().fill_bytes(&mut data);
        import_bytes(bs, &data, 16 * 1024).unwrap()
    }

    /// A codec whose archive dump fails after writing part of the stream.
    #[derive(Debug, Clone, Copy)]
    struct FailingCar {
        size: u64,
        write_before_failing: usize,
        panics: bool,
    }

    struct FailingArchive(FailingCar);

    impl PreparedCar for FailingArchive {
        fn size(&self) -> u64 {
            self.0.size
        }

        fn dump(&self, out: &mut dyn Write) -> std::result::Result<(), CarError> {
            out.write_all(&vec![1u8; self.0.write_before_failing])?;
            if self.0.panics {
                panic!("archive encoder crashed");
            }
            Err(CarError::MissingBlock(ContentId::zero()))
        }
    }

    impl CarIo for FailingCar {
        type Prepared = FailingArchive;

        fn prepare_car(
            &self,
            _bs: Arc<dyn Blockstore>,
            _root: ContentId,
            _selector: Selector,
        ) -> std::result::Result<FailingArchive, CarError> {
            Ok(FailingArchive(*self))
        }

        fn write_car(
            &self,
            _bs: &dyn Blockstore,
            _root: ContentId,
            _selector: Selector,
            out: &mut dyn Write,
        ) -> std::result::Result<u64, CarError> {
            FailingArchive(*self).dump(out).map(|_| 0)
        }

        fn load_car(
            &self,
            _bs: &dyn Blockstore,
            _reader: &mut dyn Read,
        ) -> std::result::Result<ContentId, CarError> {
            Err(CarError::InvalidHeader("unsupported"))
        }
    }

    #[test]
    fn test_streaming_matches_disk() {
        let bs: Arc<dyn Blockstore> = Arc::new(MemoryBlockstore::new());
        let payload = random_payload(&*bs, 300_000);
        let dir = tempfile::tempdir().unwrap();
        let io = PieceIoWithStore::new(Car, bs, DirFileStore::new(dir.path()));

        let (streamed, streamed_size) = io
            .generate_piece_commitment(CommitmentScheme::Sector8MiB, payload, Selector::ExploreAll)
            .unwrap();
        let (on_disk, path, disk_size) = io
            .generate_piece_commitment_to_file(
                CommitmentScheme::Sector8MiB,
                payload,
                Selector::ExploreAll,
            )
            .unwrap();

        assert_eq!(streamed, on_disk);
        assert_eq!(streamed_size, disk_size);
        assert_eq!(disk_size.get(), 524_288);
        assert!(path.exists());

        // the materialized file is a loadable archive
        let target = PieceIo::with_blockstore(Arc::new(MemoryBlockstore::new()));
        let root = target
            .read_piece(&mut std::fs::File::open(&path).unwrap())
            .unwrap();
        assert_eq!(root, payload);
    }

    #[test]
    fn test_deterministic() {
        let bs: Arc<dyn Blockstore> = Arc::new(MemoryBlockstore::new());
        let payload = random_payload(&*bs, 50_000);
        let io = PieceIo::with_blockstore(bs);

        let first = io
            .generate_piece_commitment(CommitmentScheme::Sector8MiB, payload, Selector::ExploreAll)
            .unwrap();
        let second = io
            .generate_piece_commitment(CommitmentScheme::Sector8MiB, payload, Selector::ExploreAll)
            .unwrap();
        assert_eq!(first, second);

        let other = random_payload(&**io.blockstore(), 50_000);
        let third = io
            .generate_piece_commitment(CommitmentScheme::Sector8MiB, other, Selector::ExploreAll)
            .unwrap();
        assert_ne!(first.0, third.0);
    }

    #[test]
    fn test_million_byte_archive() {
        let bs: Arc<dyn Blockstore> = Arc::new(MemoryBlockstore::new());
        let data_len = 1_000_000 - HEADER_LEN - SECTION_OVERHEAD - 4;
        let payload = bs.put(Block::leaf(vec![0x5Au8; data_len as usize])).unwrap();

        let prepared = Car
            .prepare_car(Arc::clone(&bs), payload, Selector::ExploreAll)
            .unwrap();
        assert_eq!(prepared.size(), 1_000_000);

        let io = PieceIo::with_blockstore(bs);
        let (_, padded) = io
            .generate_piece_commitment(CommitmentScheme::Sector8MiB, payload, Selector::ExploreAll)
            .unwrap();
        assert_eq!(padded.get(), 1_048_576);
    }

    #[test]
    fn test_zero_block_payload() {
        let bs: Arc<dyn Blockstore> = Arc::new(MemoryBlockstore::new());
        let io = PieceIo::with_blockstore(bs);

        let (commitment, padded) = io
            .generate_piece_commitment(
                CommitmentScheme::Sector2KiB,
                ContentId::zero(),
                Selector::Nothing,
            )
            .unwrap();
        assert_eq!(padded.get(), 128);
        assert!(!commitment.is_zero());
    }

    #[test]
    fn test_producer_error_fails_successful_consumer() {
        // the producer writes every declared byte and then reports failure
        let car = FailingCar {
            size: 200,
            write_before_failing: 200,
            panics: false,
        };
        let io = PieceIo::new(car, Arc::new(MemoryBlockstore::new()));
        let err = io
            .generate_piece_commitment(CommitmentScheme::Sector2KiB, ContentId::zero(), Selector::ExploreAll)
            .unwrap_err();
        assert!(matches!(err, PieceError::WriteCar(CarError::MissingBlock(_))));
    }

    #[test]
    fn test_consumer_error_takes_precedence() {
        // the producer stops short, so the pad reader runs out of source
        let car = FailingCar {
            size: 1000,
            write_before_failing: 10,
            panics: false,
        };
        let io = PieceIo::new(car, Arc::new(MemoryBlockstore::new()));
        let err = io
            .generate_piece_commitment(CommitmentScheme::Sector2KiB, ContentId::zero(), Selector::ExploreAll)
            .unwrap_err();
        assert!(matches!(err, PieceError::Commitment(_)));
    }

    #[test]
    fn test_producer_panic_fails_drained_consumer() {
        let car = FailingCar {
            size: 200,
            write_before_failing: 200,
            panics: true,
        };
        let io = PieceIo::new(car, Arc::new(MemoryBlockstore::new()));
        let err = io
            .generate_piece_commitment(CommitmentScheme::Sector2KiB, ContentId::zero(), Selector::ExploreAll)
            .unwrap_err();
        assert!(matches!(err, PieceError::ProducerPanicked));
    }

    #[test]
    fn test_consumer_error_takes_precedence_over_panic() {
        let car = FailingCar {
            size: 1000,
            write_before_failing: 10,
            panics: true,
        };
        let io = PieceIo::new(car, Arc::new(MemoryBlockstore::new()));
        let err = io
            .generate_piece_commitment(CommitmentScheme::Sector2KiB, ContentId::zero(), Selector::ExploreAll)
            .unwrap_err();
        assert!(matches!(err, PieceError::Commitment(_)));
    }

    #[test]
    fn test_consumer_failure_unblocks_producer() {
        // piece is too large for the scheme: the consumer fails before reading
        // while the producer is blocked on a full pipe
        let car = FailingCar {
            size: 1 << 20,
            write_before_failing: 1 << 20,
            panics: false,
        };
        let io = PieceIo::new(car, Arc::new(MemoryBlockstore::new()));
        let err = io
            .generate_piece_commitment(CommitmentScheme::Sector2KiB, ContentId::zero(), Selector::ExploreAll)
            .unwrap_err();
        assert!(matches!(err, PieceError::Commitment(_)));
    }

    #[test]
    fn test_disk_failure_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let car = FailingCar {
            size: 0,
            write_before_failing: 64,
            panics: false,
        };
        let io = PieceIoWithStore::new(
            car,
            Arc::new(MemoryBlockstore::new()),
            DirFileStore::new(dir.path()),
        );

        let err = io
            .generate_piece_commitment_to_file(
                CommitmentScheme::Sector2KiB,
                ContentId::zero(),
                Selector::ExploreAll,
            )
            .unwrap_err();
        assert!(matches!(err, PieceError::WriteCar(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_payload() {
        let io = PieceIo::with_blockstore(Arc::new(MemoryBlockstore::new()));
        let err = io
            .generate_piece_commitment(
                CommitmentScheme::Sector2KiB,
                ContentId::hash(b"unknown"),
                Selector::ExploreAll,
            )
            .unwrap_err();
        assert!(matches!(err, PieceError::PrepareCar(CarError::MissingBlock(_))));
    }
}
