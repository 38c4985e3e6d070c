//! Deal states and client events.

use comb_primitives::ContentId;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumDiscriminants, EnumIter, EnumString};

use crate::types::DealId;

/// Lifecycle state of a deal.
///
/// Numeric codes are stable; records are persisted with them.
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
    Serialize,
    Deserialize,
)]
#[repr(u64)]
#[serde(try_from = "u64", into = "u64")]
pub enum DealState {
    /// Tracked but not yet opened.
    #[default]
    Unknown = 0,
    /// The provider has no record of the proposal.
    ProposalNotFound = 1,
    /// The provider rejected the proposal.
    ProposalRejected = 2,
    /// The provider accepted; waiting for the publish message to land.
    ProposalAccepted = 3,
    /// Data staged at the provider.
    Staged = 4,
    /// Published on chain; waiting for the sector to be committed.
    Sealing = 5,
    /// The deal is live. Terminal.
    Active = 6,
    /// Cleaning up after a failure.
    Failing = 7,
    /// The deal is unknown on chain.
    NotFound = 8,
    /// Checking the client has the funds the deal needs.
    EnsureClientFunds = 9,
    /// Funds confirmed; sending the proposal.
    FundsEnsured = 10,
    /// Proposal sent; waiting for the provider's signed response.
    Validating = 11,
    /// Failed. Terminal.
    Error = 12,
}

impl DealState {
    /// Whether the deal makes no further automatic progress.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Active | Self::Error)
    }
}

/// Events driving a client deal.
#[derive(Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(name(ClientEventKind), derive(Hash, Display, EnumIter))]
pub enum ClientEvent {
    /// Start negotiating.
    Open,
    /// The client cannot cover the deal.
    EnsureFundsFailed(String),
    /// The client can cover the deal.
    FundsEnsured,
    /// Sending the proposal failed.
    WriteProposalFailed(String),
    /// The proposal was sent.
    DealProposed,
    /// No connection is registered for the deal.
    DealStreamLookupErrored(String),
    /// Reading the provider's response failed.
    ReadResponseFailed(String),
    /// The response was not signed by the provider's worker.
    ResponseVerificationFailed,
    /// The response names another proposal.
    ResponseDealDidNotMatch {
        /// This deal's proposal id
        expected: ContentId,
        /// The id in the response
        actual: ContentId,
    },
    /// The provider did not accept the proposal.
    DealRejected {
        /// State reported by the provider
        state: DealState,
        /// Provider's explanation
        reason: String,
    },
    /// The provider accepted the proposal.
    DealAccepted {
        /// Message publishing the deal on chain
        publish_message: Option<ContentId>,
    },
    /// Closing the connection failed.
    StreamCloseError(String),
    /// The deal could not be confirmed on chain.
    DealPublishFailed(String),
    /// The deal was confirmed on chain.
    DealPublished {
        /// On-chain id
        deal_id: DealId,
    },
    /// Waiting for sector commitment failed.
    DealActivationFailed(String),
    /// The sector holding the deal was committed.
    DealActivated,
    /// Cleanup after a failure finished.
    Failed,
}

impl comb_fsm::Event for ClientEvent {
    type Kind = ClientEventKind;

    fn kind(&self) -> ClientEventKind {
        self.into()
    }
}
