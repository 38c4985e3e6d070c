//! Client configuration.

use std::path::PathBuf;

use comb_fsm::GroupConfig;
use comb_primitives::PaddedPieceSize;
use serde::{Deserialize, Serialize};

use crate::types::TokenAmount;

/// Default datastore namespace for deal records.
pub const DEFAULT_DEAL_NAMESPACE: &str = "deals";

/// How the piece is produced before committing to it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PieceMode {
    /// Stream the archive straight into the hasher.
    #[default]
    Streaming,
    /// Write the archive to a file under `dir` first, and keep it.
    DiskBuffered {
        /// Directory for piece files
        dir: PathBuf,
    },
}

/// Collateral the client asks the provider to lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollateralPolicy {
    /// One token unit per padded piece byte.
    #[default]
    PieceSize,
    /// A fixed amount regardless of size.
    Fixed(TokenAmount),
    /// No provider collateral.
    Zero,
}

impl CollateralPolicy {
    /// Provider collateral for a piece of `size`.
    pub const fn provider_collateral(&self, size: PaddedPieceSize) -> TokenAmount {
        match self {
            Self::PieceSize => size.get() as TokenAmount,
            Self::Fixed(amount) => *amount,
            Self::Zero => 0,
        }
    }
}

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Piece production mode.
    pub piece_mode: PieceMode,
    /// Provider collateral rule.
    pub collateral_policy: CollateralPolicy,
    /// Datastore namespace for deal records.
    pub deal_namespace: String,
    /// Deal notifications buffered per subscriber.
    pub notification_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let group = GroupConfig::default();
        Self {
            piece_mode: PieceMode::default(),
            collateral_policy: CollateralPolicy::default(),
            deal_namespace: DEFAULT_DEAL_NAMESPACE.to_owned(),
            notification_capacity: group.notification_capacity,
        }
    }
}

impl ClientConfig {
    /// Set the piece production mode.
    pub fn with_piece_mode(mut self, mode: PieceMode) -> Self {
        self.piece_mode = mode;
        self
    }

    /// Buffer pieces to files under `dir`.
    pub fn disk_buffered(self, dir: impl Into<PathBuf>) -> Self {
        self.with_piece_mode(PieceMode::DiskBuffered { dir: dir.into() })
    }

    /// Set the provider collateral rule.
    pub fn with_collateral_policy(mut self, policy: CollateralPolicy) -> Self {
        self.collateral_policy = policy;
        self
    }

    /// Set the deal record namespace.
    pub fn with_deal_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.deal_namespace = namespace.into();
        self
    }

    /// Set the notification channel capacity.
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    pub(crate) fn group_config(&self) -> GroupConfig {
        GroupConfig::new(self.deal_namespace.clone())
            .with_notification_capacity(self.notification_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collateral_policy() {
        let size = PaddedPieceSize::new(1 << 20).unwrap();
        assert_eq!(CollateralPolicy::default().provider_collateral(size), 1 << 20);
        assert_eq!(CollateralPolicy::Fixed(7).provider_collateral(size), 7);
        assert_eq!(CollateralPolicy::Zero.provider_collateral(size), 0);
    }

    #[test]
    fn test_group_config() {
        let config = ClientConfig::default()
            .with_deal_namespace("client-deals")
            .with_notification_capacity(0);
        let group = config.group_config();
        assert_eq!(group.namespace, "client-deals");
        assert_eq!(group.notification_capacity, 1);
    }

    #[test]
    fn test_partial_config_from_json() {
        let config: ClientConfig = serde_json::from_str(
            r#"{ "collateral_policy": { "Fixed": 42 }, "piece_mode": { "DiskBuffered": { "dir": "/tmp/pieces" } } }"#,
        )
        .unwrap();
        assert_eq!(config.collateral_policy, CollateralPolicy::Fixed(42));
        assert_eq!(
            config.piece_mode,
            PieceMode::DiskBuffered {
                dir: "/tmp/pieces".into()
            }
        );
        assert_eq!(config.deal_namespace, DEFAULT_DEAL_NAMESPACE);
    }
}
