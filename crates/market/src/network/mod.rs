//! Storage market wire protocol
//!
//! Two stream kinds connect a client to a provider:
//!
//! - an **ask stream** carries one [`AskRequest`] and one [`AskResponse`],
//! - a **deal stream** carries a [`Proposal`] and the provider's
//!   [`SignedResponse`], and stays open while the deal is negotiated.
//!
//! Transports implement [`StorageMarketNetwork`]. [`MemoryNetwork`] connects
//! clients to in-process providers.

mod memory;

use std::future::Future;

use alloy_primitives::{Address, B256, Signature, keccak256};
use byteorder::{BigEndian, ByteOrder};
use comb_primitives::ContentId;
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::state::DealState;
use crate::types::{ClientDealProposal, DataRef, PeerId, SignedStorageAsk};

pub use memory::{AskHandler, DealHandler, MemoryAskStream, MemoryDealStream, MemoryNetwork};

/// Request for a provider's current ask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    /// Provider address.
    pub miner: Address,
}

/// Reply to an [`AskRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    /// The ask, if the provider has one.
    pub ask: Option<SignedStorageAsk>,
}

/// A deal proposal as sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// The signed proposal.
    pub deal_proposal: ClientDealProposal,
    /// The payload the piece was built from.
    pub piece: DataRef,
}

/// Provider's answer to a [`Proposal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Deal state at the provider.
    pub state: DealState,
    /// Explanation, set on rejection.
    pub message: String,
    /// Id of the proposal answered.
    pub proposal: ContentId,
    /// Message publishing the deal, set on acceptance.
    pub publish_message: Option<ContentId>,
}

impl Response {
    /// Canonical encoding.
    ///
    /// Format: `state (u64) || proposal (32) || flag (1) || publish (32) || message`.
    /// The publish field is zero when the flag is 0.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; 8 + 32 + 1 + 32];
        BigEndian::write_u64(&mut bytes[..8], self.state.into());
        bytes[8..40].copy_from_slice(self.proposal.as_bytes());
        if let Some(publish) = &self.publish_message {
            bytes[40] = 1;
            bytes[41..73].copy_from_slice(publish.as_bytes());
        }
        bytes.extend_from_slice(self.message.as_bytes());
        bytes
    }

    /// The 32-byte hash the provider's worker signs.
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.to_bytes())
    }
}

/// A response signed by the provider's worker key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedResponse {
    /// The response.
    pub response: Response,
    /// Worker signature over [`Response::signing_hash`].
    pub signature: Signature,
}

/// Client end of an ask stream.
pub trait StorageAskStream: Send + Sync {
    /// Send the request.
    fn write_ask_request(
        &self,
        request: AskRequest,
    ) -> impl Future<Output = Result<(), NetworkError>> + Send;

    /// Wait for the response.
    fn read_ask_response(&self) -> impl Future<Output = Result<AskResponse, NetworkError>> + Send;

    /// Close the stream. Closing twice fails with [`NetworkError::AlreadyClosed`].
    fn close(&self) -> Result<(), NetworkError>;
}

/// Client end of a deal stream.
pub trait StorageDealStream: Send + Sync + 'static {
    /// Send the proposal.
    fn write_deal_proposal(
        &self,
        proposal: Proposal,
    ) -> impl Future<Output = Result<(), NetworkError>> + Send;

    /// Wait for the provider's response.
    fn read_deal_response(
        &self,
    ) -> impl Future<Output = Result<SignedResponse, NetworkError>> + Send;

    /// The provider at the other end.
    fn remote_peer(&self) -> PeerId;

    /// Close the stream. Closing twice fails with [`NetworkError::AlreadyClosed`].
    fn close(&self) -> Result<(), NetworkError>;
}

/// Opens streams to providers.
pub trait StorageMarketNetwork: Send + Sync + 'static {
    /// Ask stream type.
    type AskStream: StorageAskStream;
    /// Deal stream type.
    type DealStream: StorageDealStream;

    /// Open an ask stream to `peer`.
    fn new_ask_stream(
        &self,
        peer: PeerId,
    ) -> impl Future<Output = Result<Self::AskStream, NetworkError>> + Send;

    /// Open a deal stream to `peer`.
    fn new_deal_stream(
        &self,
        peer: PeerId,
    ) -> impl Future<Output = Result<Self::DealStream, NetworkError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(publish: Option<ContentId>) -> Response {
        Response {
            state: DealState::ProposalAccepted,
            message: String::new(),
            proposal: ContentId::hash(b"proposal"),
            publish_message: publish,
        }
    }

    #[test]
    fn test_response_encoding() {
        let bytes = response(None).to_bytes();
        assert_eq!(bytes.len(), 73);
        assert_eq!(BigEndian::read_u64(&bytes[..8]), 3);
        assert_eq!(bytes[40], 0);

        let publish = ContentId::hash(b"publish");
        let bytes = response(Some(publish)).to_bytes();
        assert_eq!(bytes[40], 1);
        assert_eq!(&bytes[41..73], publish.as_bytes());
    }

    #[test]
    fn test_signing_hash_covers_every_field() {
        let base = response(None);
        let mut rejected = base.clone();
        rejected.state = DealState::ProposalRejected;
        let mut with_message = base.clone();
        with_message.message = "full".into();
        let with_publish = response(Some(ContentId::zero()));

        let hashes = [
            base.signing_hash(),
            rejected.signing_hash(),
            with_message.signing_hash(),
            with_publish.signing_hash(),
        ];
        for (i, a) in hashes.iter().enumerate() {
            for b in &hashes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
