//! Tests for the piece commitment tree.

use super::constants::SEGMENT_PAIR_LENGTH;
use super::hasher::zero_subtree_hash;
use super::*;
use crate::{PadReader, PaddedPieceSize, UnpaddedPieceSize};
use alloy_primitives::{Keccak256, b256};
use rand::Rng;
use std::io::Write;

/// Straightforward recursive tree used as a reference.
fn reference_root(data: &[u8]) -> B256 {
    if data.len() == SEGMENT_PAIR_LENGTH {
        let mut hasher = Keccak256::new();
        hasher.update(data);
        return hasher.finalize();
    }
    let (left, right) = data.split_at(data.len() / 2);
    let mut hasher = Keccak256::new();
    hasher.update(reference_root(left));
    hasher.update(reference_root(right));
    hasher.finalize()
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..len).map(|_| rng.random::<u8>()).collect()
}

fn commit(data: &[u8]) -> Commitment {
    let size = PaddedPieceSize::new(data.len() as u64).unwrap();
    generate_piece_commitment(CommitmentScheme::Sector64GiB, data, size).unwrap()
}

#[test]
fn test_zero_piece_vectors() {
    assert_eq!(
        commit(&[0u8; 128]).root(),
        b256!("b4c11951957c6f8f642c4af61cd6b24640fec6dc7fc607ee8206a99e92410d30")
    );
    assert_eq!(
        commit(&[0u8; 2048]).root(),
        b256!("887c22bd8750d34016ac3c66b5ff102dacdd73f6b014e710b51e8022af9a1968")
    );
}

#[test]
fn test_zero_cache_matches_reference() {
    for len in [64, 128, 4096, 65536] {
        assert_eq!(zero_subtree_hash(len), reference_root(&vec![0u8; len]), "len {len}");
    }
}

#[test]
fn test_matches_reference_across_subtrees() {
    // below, at and above the buffered subtree size
    for len in [128usize, 4096, 65536, 262_144] {
        let data = random_bytes(len);
        assert_eq!(commit(&data).root(), reference_root(&data), "len {len}");
    }
}

#[test]
fn test_sparse_piece_matches_reference() {
    let mut data = vec![0u8; 262_144];
    data[70_000] = 1;
    assert_eq!(commit(&data).root(), reference_root(&data));
}

#[test]
fn test_chunked_writes_are_equivalent() {
    let data = random_bytes(131_072);
    let size = PaddedPieceSize::new(131_072).unwrap();

    let mut hasher = PieceHasher::new(size);
    for chunk in data.chunks(1000) {
        hasher.write_all(chunk).unwrap();
    }
    assert_eq!(hasher.finalize().unwrap(), commit(&data));
}

#[test]
fn test_determinism_and_sensitivity() {
    let mut data = random_bytes(8192);
    let first = commit(&data);
    assert_eq!(first, commit(&data));

    data[8191] ^= 0xFF;
    assert_ne!(first, commit(&data));
}

#[test]
fn test_short_read() {
    let size = PaddedPieceSize::new(256).unwrap();
    let err = generate_piece_commitment(CommitmentScheme::Sector2KiB, &[1u8; 100][..], size)
        .unwrap_err();
    assert!(matches!(
        err,
        CommitmentError::ShortRead {
            expected: 256,
            actual: 100
        }
    ));
}

#[test]
fn test_write_past_size() {
    let mut hasher = PieceHasher::new(PaddedPieceSize::new(128).unwrap());
    assert_eq!(hasher.write(&[1u8; 200]).unwrap(), 128);
    assert_eq!(
        hasher.write(&[1u8]).unwrap_err().kind(),
        io::ErrorKind::InvalidInput
    );
    assert_eq!(hasher.written(), 128);
}

#[test]
fn test_piece_too_large_for_scheme() {
    let size = PaddedPieceSize::new(4096).unwrap();
    let err = generate_piece_commitment(CommitmentScheme::Sector2KiB, io::repeat(0), size)
        .unwrap_err();
    assert!(matches!(
        err,
        CommitmentError::PieceTooLarge {
            size: 4096,
            max: 2048,
            ..
        }
    ));
}

#[test]
fn test_padded_stream_commitment() {
    let payload = random_bytes(1000);
    let (reader, padded) = PadReader::new(payload.as_slice(), UnpaddedPieceSize::new(1000)).unwrap();
    let commitment = generate_piece_commitment(CommitmentScheme::Sector8MiB, reader, padded).unwrap();

    let mut expected = payload.clone();
    expected.resize(1024, 0);
    assert_eq!(commitment.root(), reference_root(&expected));
}
