//! Storage market client
//!
//! Negotiates storage deals with providers on behalf of a client:
//!
//! - **Pricing**: [`Client::get_ask`] fetches and checks a provider's ask
//! - **Proposing**: [`Client::propose_storage_deal`] commits to the payload
//!   piece, signs the proposal and hands the deal to its state machine
//! - **Tracking**: every deal is a persisted record driven by
//!   [`ClientDealMachine`] until it is [`DealState::Active`] or
//!   [`DealState::Error`]
//!
//! The chain and the transport are traits ([`StorageClientNode`],
//! [`StorageMarketNetwork`]). [`MemoryClientNode`] and [`MemoryNetwork`]
//! implement them in process.

pub mod client;
pub mod clientstates;
pub mod config;
pub mod connections;
pub mod discovery;
pub mod error;
pub mod network;
pub mod node;
pub mod state;
pub mod types;

pub use client::{Client, DealNotification, ProposeDealParams};
pub use clientstates::{ClientDealMachine, client_events};
pub use config::{ClientConfig, CollateralPolicy, PieceMode};
pub use connections::ConnectionRegistry;
pub use discovery::{LocalDiscovery, RetrievalPeer};
pub use error::{ClientError, NetworkError, NoConnection, NodeError, ProtocolViolation, Result};
pub use network::{
    AskRequest, AskResponse, MemoryNetwork, Proposal, Response, SignedResponse, StorageAskStream,
    StorageDealStream, StorageMarketNetwork,
};
#[cfg(feature = "local-signer")]
pub use node::MemoryClientNode;
pub use node::StorageClientNode;
pub use state::{ClientEvent, ClientEventKind, DealState};
pub use types::{
    Balance, ChainEpoch, ClientDeal, ClientDealProposal, DataRef, DealId, DealProposal, PeerId,
    ProposeStorageDealResult, SignedStorageAsk, StorageAsk, StorageDeal, StorageProviderInfo,
    TokenAmount,
};
