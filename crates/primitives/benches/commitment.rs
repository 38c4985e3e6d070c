#![allow(missing_docs)]
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::{RngCore, rng};

use comb_primitives::{
    CommitmentScheme, PadReader, PaddedPieceSize, PieceHasher, UnpaddedPieceSize,
    generate_piece_commitment,
};

fn bench_piece_hasher(c: &mut Criterion) {
    let mut group = c.benchmark_group("piece_hasher");

    for size in [4096usize, 65536, 1 << 20, 8 << 20] {
        let mut data = vec![0u8; size];
        rng().fill_bytes(&mut data);
        let padded = PaddedPieceSize::new(size as u64).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let mut hasher = PieceHasher::new(padded);
                hasher.update(data);
                hasher.finalize().unwrap()
            });
        });
    }

    group.finish();
}

fn bench_padded_commitment(c: &mut Criterion) {
    let mut group = c.benchmark_group("padded_commitment");

    // mostly padding: exercises the zero-subtree shortcut
    for unpadded in [1_000_000usize, 4_500_000] {
        let mut data = vec![0u8; unpadded];
        rng().fill_bytes(&mut data);

        group.bench_with_input(BenchmarkId::from_parameter(unpadded), &data, |b, data| {
            b.iter(|| {
                let (reader, padded) =
                    PadReader::new(data.as_slice(), UnpaddedPieceSize::new(data.len() as u64))
                        .unwrap();
                generate_piece_commitment(CommitmentScheme::Sector8MiB, reader, padded).unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_piece_hasher, bench_padded_commitment);
criterion_main!(benches);
