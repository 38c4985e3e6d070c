//! Commitment schemes
//!
//! A scheme names the sector size a piece is destined for. It bounds the
//! largest piece that may be committed to and travels with the deal proposal.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::{Display, EnumIter, EnumString};

/// Sector sizes a piece can be committed for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    EnumIter,
    IntoPrimitive,
    TryFromPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u64)]
pub enum CommitmentScheme {
    /// 2 KiB sectors
    #[strum(serialize = "2KiB")]
    Sector2KiB = 0,
    /// 8 MiB sectors
    #[strum(serialize = "8MiB")]
    Sector8MiB = 1,
    /// 512 MiB sectors
    #[strum(serialize = "512MiB")]
    Sector512MiB = 2,
    /// 32 GiB sectors
    #[default]
    #[strum(serialize = "32GiB")]
    Sector32GiB = 3,
    /// 64 GiB sectors
    #[strum(serialize = "64GiB")]
    Sector64GiB = 4,
}

impl CommitmentScheme {
    /// Sector size in bytes.
    pub const fn sector_size(self) -> u64 {
        match self {
            Self::Sector2KiB => 2 << 10,
            Self::Sector8MiB => 8 << 20,
            Self::Sector512MiB => 512 << 20,
            Self::Sector32GiB => 32 << 30,
            Self::Sector64GiB => 64 << 30,
        }
    }

    /// Largest padded piece the scheme accepts.
    pub const fn max_piece_size(self) -> u64 {
        self.sector_size()
    }
}
