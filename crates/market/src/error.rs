//! Error types for the storage market client.

use alloy_primitives::Address;
use comb_fsm::FsmError;
use comb_piece::PieceError;
use comb_primitives::ContentId;
use thiserror::Error;

use crate::types::{DealId, PeerId, TokenAmount};

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors from a network stream
#[derive(Error, Debug)]
pub enum NetworkError {
    /// No route to the peer
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    /// The stream was closed locally
    #[error("stream already closed")]
    AlreadyClosed,

    /// The remote end hung up
    #[error("stream reset by peer")]
    Reset,

    /// Transport failure
    #[error(transparent)]
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the chain node
#[derive(Error, Debug)]
pub enum NodeError {
    /// The node holds no key for this address
    #[error("no key for address {0}")]
    UnknownSigner(Address),

    /// No provider is registered under this address
    #[error("unknown storage provider {0}")]
    UnknownProvider(Address),

    /// A signature did not come from the expected key
    #[error("signature does not match {expected}")]
    InvalidSignature {
        /// Expected signer
        expected: Address,
    },

    /// Not enough available funds
    #[error("insufficient funds for {address}: need {required}, have {available}")]
    InsufficientFunds {
        /// Account
        address: Address,
        /// Amount the deal needs
        required: TokenAmount,
        /// Amount available
        available: TokenAmount,
    },

    /// The deal has no publish message, or it did not land
    #[error("deal {0} was not published")]
    DealNotPublished(ContentId),

    /// The deal id is not known on chain
    #[error("unknown deal id {0}")]
    UnknownDeal(DealId),

    /// The deal has not been assigned an on-chain id
    #[error("deal {0} has no on-chain id")]
    MissingDealId(ContentId),

    /// Signing failed
    #[error(transparent)]
    Signer(#[from] alloy_signer::Error),

    /// Backend failure
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// No connection is registered for a deal
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no connection to provider for deal {0}")]
pub struct NoConnection(pub ContentId);

/// A provider answered in a way the protocol does not allow
#[derive(Error, Debug)]
pub enum ProtocolViolation {
    /// The ask response carried no ask
    #[error("got no ask back")]
    NoAsk,

    /// The ask belongs to another provider
    #[error("got back ask for wrong miner: expected {expected}, got {actual}")]
    WrongMiner {
        /// Provider that was asked
        expected: Address,
        /// Provider named in the ask
        actual: Address,
    },

    /// The ask signature did not verify
    #[error("ask was not properly signed: {0}")]
    InvalidAskSignature(#[source] NodeError),
}

/// Errors returned by the client
///
/// Proposal failures name the step that failed.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Computing the piece commitment failed
    #[error("computing commP failed: {0}")]
    CommP(#[source] PieceError),

    /// The piece commitment task did not complete
    #[error("commP task failed: {0}")]
    CommPTask(#[source] tokio::task::JoinError),

    /// Signing the proposal failed
    #[error("signing deal proposal failed: {0}")]
    Signing(#[source] NodeError),

    /// The deal could not be tracked
    #[error("setting up deal tracking: {0}")]
    Tracking(#[source] FsmError),

    /// Opening the deal stream failed
    #[error("connecting to storage provider failed: {0}")]
    Connect(#[source] NetworkError),

    /// Opening the deal's state machine failed
    #[error("initializing state machine: {0}")]
    Initialize(#[source] FsmError),

    /// Opening the ask stream failed
    #[error("failed to open stream to miner: {0}")]
    OpenAskStream(#[source] NetworkError),

    /// Sending the ask request failed
    #[error("failed to send ask request: {0}")]
    SendAskRequest(#[source] NetworkError),

    /// Reading the ask response failed
    #[error("failed to read ask response: {0}")]
    ReadAskResponse(#[source] NetworkError),

    /// The provider broke the protocol
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// Chain node failure
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Deal tracking failure
    #[error(transparent)]
    Fsm(#[from] FsmError),
}
