//! Content identifiers
//!
//! This module provides the [`ContentId`] type, a 32-byte keccak256 digest that
//! names an immutable byte sequence. Blocks of a data graph, signed deal
//! proposals and archive roots are all addressed by content id.
//!
//! ## Example Usage
//!
//! ```
//! use comb_primitives::ContentId;
//!
//! let a = ContentId::hash(b"hello");
//! let b = ContentId::hash(b"hello");
//! assert_eq!(a, b);
//!
//! let parsed: ContentId = a.to_string().parse().unwrap();
//! assert_eq!(parsed, a);
//! ```

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use alloy_primitives::{B256, hex, keccak256};

use crate::error::{PrimitivesError, Result};

/// A 256-bit content-derived identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ContentId(pub B256);

impl ContentId {
    /// Length of a content id in bytes.
    pub const LENGTH: usize = 32;

    /// Creates a content id from raw digest bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    /// Computes the content id of `data`.
    #[inline]
    pub fn hash(data: impl AsRef<[u8]>) -> Self {
        Self(keccak256(data.as_ref()))
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Creates a content id from a slice, checking the length.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let digest = B256::try_from(slice)?;
        Ok(Self(digest))
    }

    /// Checks if this content id is all zeros.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The all-zero content id, used as an "undefined" marker.
    pub const fn zero() -> Self {
        Self(B256::ZERO)
    }

    /// Short form used in log lines: the first eight bytes as hex.
    pub fn short(&self) -> String {
        hex::encode(&self.0.as_slice()[..8])
    }
}

impl Default for ContentId {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.as_slice()))
    }
}

impl FromStr for ContentId {
    type Err = PrimitivesError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|_| PrimitivesError::InvalidContentId(s.to_owned()))?;
        Self::from_slice(&bytes)
    }
}

impl Deref for ContentId {
    type Target = B256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<B256> for ContentId {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl From<[u8; 32]> for ContentId {
    fn from(bytes: [u8; 32]) -> Self {
        Self::new(bytes)
    }
}

impl From<ContentId> for B256 {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

impl AsRef<[u8]> for ContentId {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(ContentId::hash(b"abc"), ContentId::hash(b"abc"));
        assert_ne!(ContentId::hash(b"abc"), ContentId::hash(b"abd"));
    }

    #[test]
    fn test_display_roundtrip() {
        let id = ContentId::hash(b"payload");
        let text = id.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<ContentId>().unwrap(), id);
        assert_eq!(format!("0x{text}").parse::<ContentId>().unwrap(), id);
    }

    #[test]
    fn test_invalid_text() {
        assert!(matches!(
            "not-hex".parse::<ContentId>(),
            Err(PrimitivesError::InvalidContentId(_))
        ));
        assert!(matches!(
            "abcd".parse::<ContentId>(),
            Err(PrimitivesError::ArrayConversion(_))
        ));
    }

    #[test]
    fn test_short_form() {
        let id = ContentId::new([0xAB; 32]);
        assert_eq!(id.short(), "abababababababab");
        assert!(ContentId::zero().is_zero());
    }
}
