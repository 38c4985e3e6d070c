use thiserror::Error;

/// Errors specific to piece commitment generation
#[derive(Error, Debug)]
pub enum CommitmentError {
    /// The stream ended before the declared padded size was reached
    #[error("short read: expected {expected} padded bytes, got {actual}")]
    ShortRead {
        /// Declared padded size
        expected: u64,
        /// Bytes actually hashed
        actual: u64,
    },

    /// The piece does not fit the sector size of the scheme
    #[error("piece of {size} bytes exceeds the {max} byte limit of {scheme}")]
    PieceTooLarge {
        /// Padded piece size
        size: u64,
        /// Largest piece the scheme accepts
        max: u64,
        /// Scheme name
        scheme: super::CommitmentScheme,
    },

    /// Reading the padded stream failed
    #[error("reading padded piece: {0}")]
    Io(#[from] std::io::Error),
}

impl CommitmentError {
    pub(crate) const fn short_read(expected: u64, actual: u64) -> Self {
        Self::ShortRead { expected, actual }
    }
}
