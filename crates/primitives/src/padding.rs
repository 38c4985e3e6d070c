//! Padding transform
//!
//! [`PadReader`] wraps a source of known length and yields exactly the padded
//! size of that length: first the source bytes, then zeros.

use std::io::{self, Read};

use crate::error::Result;
use crate::size::{PaddedPieceSize, UnpaddedPieceSize};

/// Zero bytes handed out per padding read.
const ZEROS: [u8; 4096] = [0u8; 4096];

/// Reader that pads a source stream up to its size class.
#[derive(Debug)]
pub struct PadReader<R> {
    inner: R,
    padded: PaddedPieceSize,
    source_remaining: u64,
    pad_remaining: u64,
}

impl<R: Read> PadReader<R> {
    /// Wrap `inner`, which must yield at least `unpadded` bytes.
    ///
    /// Returns the reader together with the padded size it will produce.
    /// Bytes beyond `unpadded` are never read from `inner`.
    pub fn new(inner: R, unpadded: UnpaddedPieceSize) -> Result<(Self, PaddedPieceSize)> {
        let padded = unpadded.padded()?;
        let reader = Self {
            inner,
            padded,
            source_remaining: unpadded.get(),
            pad_remaining: padded.get() - unpadded.get(),
        };
        Ok((reader, padded))
    }

    /// Size of the padded stream.
    pub const fn padded_size(&self) -> PaddedPieceSize {
        self.padded
    }

    /// Consume the wrapper, returning the source.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for PadReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.source_remaining > 0 {
            let want = buf.len().min(usize::try_from(self.source_remaining).unwrap_or(usize::MAX));
            let n = self.inner.read(&mut buf[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "padding source ended {} bytes before its declared length",
                        self.source_remaining
                    ),
                ));
            }
            self.source_remaining -= n as u64;
            return Ok(n);
        }

        let n = buf
            .len()
            .min(ZEROS.len())
            .min(usize::try_from(self.pad_remaining).unwrap_or(usize::MAX));
        buf[..n].copy_from_slice(&ZEROS[..n]);
        self.pad_remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pads_with_zeros() {
        let source = vec![7u8; 200];
        let (mut reader, padded) =
            PadReader::new(source.as_slice(), UnpaddedPieceSize::new(200)).unwrap();
        assert_eq!(padded.get(), 256);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 256);
        assert!(out[..200].iter().all(|b| *b == 7));
        assert!(out[200..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_empty_source() {
        let (mut reader, padded) = PadReader::new(io::empty(), UnpaddedPieceSize::new(0)).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(padded.get(), 128);
        assert_eq!(out, vec![0u8; 128]);
    }

    #[test]
    fn test_ignores_trailing_source_bytes() {
        let source = vec![1u8; 300];
        let (mut reader, _) = PadReader::new(source.as_slice(), UnpaddedPieceSize::new(100)).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 128);
        assert_eq!(out.iter().filter(|b| **b == 1).count(), 100);
    }

    #[test]
    fn test_short_source_fails() {
        let source = vec![1u8; 10];
        let (mut reader, _) = PadReader::new(source.as_slice(), UnpaddedPieceSize::new(50)).unwrap();
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
