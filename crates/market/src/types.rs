//! Storage market data types
//!
//! Proposal, ask and response types carry a fixed big-endian byte layout.
//! That layout is what gets hashed and signed, so it never depends on a
//! serialization format.

use std::fmt;
use std::path::PathBuf;

use alloy_primitives::{Address, B256, Signature, hex, keccak256};
use byteorder::{BigEndian, ByteOrder};
use comb_piece::Selector;
use comb_primitives::{Commitment, ContentId, PaddedPieceSize};
use serde::{Deserialize, Serialize};

use crate::state::DealState;

/// Amount of the chain's native token, in its smallest unit.
pub type TokenAmount = u128;

/// Chain height.
pub type ChainEpoch = u64;

/// On-chain deal identifier.
pub type DealId = u64;

/// Network identity of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub B256);

impl PeerId {
    /// Create a peer id from raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    /// Peer id derived from a signing address.
    pub fn from_address(address: Address) -> Self {
        Self(keccak256(address.as_slice()))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is enough to tell peers apart in logs
        write!(f, "peer-{}", hex::encode(&self.0[..6]))
    }
}

/// Terms of a storage deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealProposal {
    /// Commitment of the padded piece.
    pub piece_commitment: Commitment,
    /// Padded piece size.
    pub piece_size: PaddedPieceSize,
    /// Client address.
    pub client: Address,
    /// Provider address.
    pub provider: Address,
    /// First epoch of storage.
    pub start_epoch: ChainEpoch,
    /// Epoch storage ends.
    pub end_epoch: ChainEpoch,
    /// Price per epoch.
    pub storage_price_per_epoch: TokenAmount,
    /// Collateral locked by the provider.
    pub provider_collateral: TokenAmount,
    /// Collateral locked by the client.
    pub client_collateral: TokenAmount,
}

/// Encoded proposal bytes.
pub type DealProposalBytes = [u8; DealProposal::ENCODED_LEN];

impl DealProposal {
    /// Length of the canonical encoding.
    pub const ENCODED_LEN: usize = 32 + 8 + 20 + 20 + 8 + 8 + 16 + 16 + 16;

    /// Canonical encoding.
    ///
    /// Format: `commitment || piece_size || client || provider || start || end
    /// || price || provider_collateral || client_collateral`, integers big-endian.
    pub fn to_bytes(&self) -> DealProposalBytes {
        let mut bytes = [0u8; Self::ENCODED_LEN];
        bytes[..32].copy_from_slice(self.piece_commitment.as_bytes());
        BigEndian::write_u64(&mut bytes[32..40], self.piece_size.get());
        bytes[40..60].copy_from_slice(self.client.as_slice());
        bytes[60..80].copy_from_slice(self.provider.as_slice());
        BigEndian::write_u64(&mut bytes[80..88], self.start_epoch);
        BigEndian::write_u64(&mut bytes[88..96], self.end_epoch);
        BigEndian::write_u128(&mut bytes[96..112], self.storage_price_per_epoch);
        BigEndian::write_u128(&mut bytes[112..128], self.provider_collateral);
        BigEndian::write_u128(&mut bytes[128..144], self.client_collateral);
        bytes
    }

    /// The 32-byte hash the client signs.
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.to_bytes())
    }

    /// Number of epochs the deal covers.
    pub const fn duration(&self) -> ChainEpoch {
        self.end_epoch.saturating_sub(self.start_epoch)
    }

    /// Price over the whole deal.
    pub const fn total_storage_fee(&self) -> TokenAmount {
        self.storage_price_per_epoch
            .saturating_mul(self.duration() as TokenAmount)
    }

    /// Funds the client must have available before proposing.
    pub const fn client_balance_requirement(&self) -> TokenAmount {
        self.client_collateral
            .saturating_add(self.total_storage_fee())
    }
}

/// A proposal signed by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDealProposal {
    /// Deal terms.
    pub proposal: DealProposal,
    /// Client signature over [`DealProposal::signing_hash`].
    pub client_signature: Signature,
}

impl ClientDealProposal {
    /// Canonical encoding: proposal bytes followed by the 65-byte signature.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(DealProposal::ENCODED_LEN + 65);
        bytes.extend_from_slice(&self.proposal.to_bytes());
        bytes.extend_from_slice(&self.client_signature.as_bytes());
        bytes
    }

    /// Proposal id, derived from the canonical encoding.
    pub fn cid(&self) -> ContentId {
        ContentId::hash(self.to_bytes())
    }

    /// Address recovered from the client signature.
    pub fn recover_client(&self) -> Option<Address> {
        self.client_signature
            .recover_address_from_msg(self.proposal.signing_hash().as_slice())
            .ok()
    }
}

/// A provider's price list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAsk {
    /// Price per epoch per size class unit.
    pub price: TokenAmount,
    /// Smallest piece accepted.
    pub min_piece_size: PaddedPieceSize,
    /// Provider address.
    pub miner: Address,
    /// Epoch the ask was made.
    pub timestamp: ChainEpoch,
    /// Epoch the ask expires.
    pub expiry: ChainEpoch,
    /// Sequence number, bumped on every change.
    pub seq_no: u64,
}

impl StorageAsk {
    /// Length of the canonical encoding.
    pub const ENCODED_LEN: usize = 16 + 8 + 20 + 8 + 8 + 8;

    /// Canonical encoding.
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut bytes = [0u8; Self::ENCODED_LEN];
        BigEndian::write_u128(&mut bytes[..16], self.price);
        BigEndian::write_u64(&mut bytes[16..24], self.min_piece_size.get());
        bytes[24..44].copy_from_slice(self.miner.as_slice());
        BigEndian::write_u64(&mut bytes[44..52], self.timestamp);
        BigEndian::write_u64(&mut bytes[52..60], self.expiry);
        BigEndian::write_u64(&mut bytes[60..68], self.seq_no);
        bytes
    }

    /// The 32-byte hash the provider's worker signs.
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.to_bytes())
    }
}

/// An ask signed by the provider's worker key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedStorageAsk {
    /// The ask.
    pub ask: StorageAsk,
    /// Worker signature over [`StorageAsk::signing_hash`].
    pub signature: Signature,
}

/// What the chain knows about a storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProviderInfo {
    /// Provider (miner actor) address.
    pub address: Address,
    /// Owner address.
    pub owner: Address,
    /// Worker address, signs asks and deal responses.
    pub worker: Address,
    /// Sector size in bytes.
    pub sector_size: u64,
    /// Network identity.
    pub peer_id: PeerId,
}

/// Reference to the payload of a deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRef {
    /// Root of the payload graph.
    pub root: ContentId,
    /// Blocks of the graph included in the piece.
    pub selector: Selector,
}

impl DataRef {
    /// The whole graph under `root`.
    pub const fn new(root: ContentId) -> Self {
        Self {
            root,
            selector: Selector::ExploreAll,
        }
    }
}

/// A deal published on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDeal {
    /// On-chain id.
    pub deal_id: DealId,
    /// Deal terms.
    pub proposal: DealProposal,
    /// Epoch the sector holding the deal was committed, once it was.
    pub sector_start_epoch: Option<ChainEpoch>,
}

/// Escrow balance of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    /// Funds locked in deals.
    pub locked: TokenAmount,
    /// Funds free to back new deals.
    pub available: TokenAmount,
}

/// Outcome of a successful proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposeStorageDealResult {
    /// Id of the tracked deal.
    pub proposal_cid: ContentId,
}

/// A deal tracked by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDeal {
    /// Deal id, derived from the signed proposal.
    pub proposal_cid: ContentId,
    /// The signed proposal.
    pub client_deal_proposal: ClientDealProposal,
    /// Lifecycle state.
    pub state: DealState,
    /// Provider network identity.
    pub miner: PeerId,
    /// Provider worker address, expected to sign deal responses.
    pub miner_worker: Address,
    /// The payload.
    pub data_ref: DataRef,
    /// On-chain id once published.
    pub deal_id: Option<DealId>,
    /// Publish message reported by the provider.
    pub publish_message: Option<ContentId>,
    /// Last failure or rejection reason.
    pub message: String,
    /// Materialized piece file, in disk-buffered mode.
    pub piece_path: Option<PathBuf>,
}

impl ClientDeal {
    /// A new deal in the [`DealState::Unknown`] state.
    pub fn new(
        client_deal_proposal: ClientDealProposal,
        miner: PeerId,
        miner_worker: Address,
        data_ref: DataRef,
    ) -> Self {
        Self {
            proposal_cid: client_deal_proposal.cid(),
            client_deal_proposal,
            state: DealState::Unknown,
            miner,
            miner_worker,
            data_ref,
            deal_id: None,
            publish_message: None,
            message: String::new(),
            piece_path: None,
        }
    }

    /// The deal terms.
    pub const fn proposal(&self) -> &DealProposal {
        &self.client_deal_proposal.proposal
    }
}

impl comb_fsm::Record for ClientDeal {
    type State = DealState;

    fn state(&self) -> DealState {
        self.state
    }

    fn set_state(&mut self, state: DealState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    fn proposal(client: Address) -> DealProposal {
        DealProposal {
            piece_commitment: Commitment::new(B256::repeat_byte(0x11)),
            piece_size: PaddedPieceSize::new(1 << 20).unwrap(),
            client,
            provider: Address::repeat_byte(0x22),
            start_epoch: 100,
            end_epoch: 200,
            storage_price_per_epoch: 3,
            provider_collateral: 1 << 20,
            client_collateral: 7,
        }
    }

    #[test]
    fn test_proposal_layout() {
        let p = proposal(Address::repeat_byte(0x33));
        let bytes = p.to_bytes();
        assert_eq!(&bytes[..32], &[0x11; 32]);
        assert_eq!(BigEndian::read_u64(&bytes[32..40]), 1 << 20);
        assert_eq!(&bytes[40..60], &[0x33; 20]);
        assert_eq!(&bytes[60..80], &[0x22; 20]);
        assert_eq!(BigEndian::read_u128(&bytes[128..144]), 7);
    }

    #[test]
    fn test_fees() {
        let p = proposal(Address::ZERO);
        assert_eq!(p.duration(), 100);
        assert_eq!(p.total_storage_fee(), 300);
        assert_eq!(p.client_balance_requirement(), 307);
    }

    #[test]
    fn test_signed_proposal_cid_and_recovery() {
        let signer = PrivateKeySigner::random();
        let p = proposal(signer.address());
        let signature = signer.sign_message_sync(p.signing_hash().as_slice()).unwrap();
        let signed = ClientDealProposal {
            proposal: p.clone(),
            client_signature: signature,
        };

        assert_eq!(signed.recover_client(), Some(signer.address()));
        assert_eq!(signed.cid(), signed.clone().cid());

        let mut other = signed.clone();
        other.proposal.client_collateral += 1;
        assert_ne!(other.cid(), signed.cid());
        assert_ne!(other.recover_client(), Some(signer.address()));
    }
}
