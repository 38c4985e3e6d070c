//! Client deal state machine
//!
//! A deal moves through funding, proposing, validating the provider's
//! response, publication and sector commitment:
//!
//! ```text
//! Unknown -> EnsureClientFunds -> FundsEnsured -> Validating
//!         -> ProposalAccepted -> Sealing -> Active
//! ```
//!
//! Any failure leads to `Error`, directly or through `Failing`. Entry
//! actions talk to the chain node and the deal's stream and return the
//! event that moves the deal on.

use std::future::Future;
use std::sync::Arc;

use comb_fsm::{Events, Machine};
use comb_primitives::ContentId;
use tracing::{info, warn};

use crate::connections::ConnectionRegistry;
use crate::error::NodeError;
use crate::network::{Proposal, SignedResponse, StorageDealStream};
use crate::node::StorageClientNode;
use crate::state::{ClientEvent, ClientEventKind, DealState};
use crate::types::ClientDeal;

/// Transition table of a client deal.
pub fn client_events() -> Events<ClientEventKind, DealState> {
    use ClientEventKind as E;
    use DealState as S;

    Events::new()
        .transition(E::Open, [S::Unknown], S::EnsureClientFunds)
        .transition(E::EnsureFundsFailed, [S::EnsureClientFunds], S::Error)
        .transition(E::FundsEnsured, [S::EnsureClientFunds], S::FundsEnsured)
        .transition(E::WriteProposalFailed, [S::FundsEnsured], S::Error)
        .transition(E::DealProposed, [S::FundsEnsured], S::Validating)
        .transition_from_any(E::DealStreamLookupErrored, S::Failing)
        .transition(E::ReadResponseFailed, [S::Validating], S::Error)
        .transition(E::ResponseVerificationFailed, [S::Validating], S::Failing)
        .transition(E::ResponseDealDidNotMatch, [S::Validating], S::Failing)
        .transition(E::DealRejected, [S::Validating], S::Failing)
        .transition(E::DealAccepted, [S::Validating], S::ProposalAccepted)
        .transition_from_any(E::StreamCloseError, S::Error)
        .transition(E::DealPublishFailed, [S::ProposalAccepted], S::Error)
        .transition(E::DealPublished, [S::ProposalAccepted], S::Sealing)
        .transition(E::DealActivationFailed, [S::Sealing], S::Error)
        .transition(E::DealActivated, [S::Sealing], S::Active)
        .transition(E::Failed, [S::Failing], S::Error)
}

/// State machine driving client deals.
pub struct ClientDealMachine<N, S> {
    node: Arc<N>,
    conns: Arc<ConnectionRegistry<S>>,
    events: Events<ClientEventKind, DealState>,
}

impl<N, S> std::fmt::Debug for ClientDealMachine<N, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientDealMachine")
            .field("connections", &self.conns.len())
            .finish_non_exhaustive()
    }
}

impl<N, S> ClientDealMachine<N, S>
where
    N: StorageClientNode,
    S: StorageDealStream,
{
    /// Create a machine using `node` for chain access and `conns` for streams.
    pub fn new(node: Arc<N>, conns: Arc<ConnectionRegistry<S>>) -> Self {
        Self {
            node,
            conns,
            events: client_events(),
        }
    }
}

impl<N, S> Machine for ClientDealMachine<N, S>
where
    N: StorageClientNode,
    S: StorageDealStream,
{
    type Key = ContentId;
    type Record = ClientDeal;
    type Event = ClientEvent;

    fn events(&self) -> &Events<ClientEventKind, DealState> {
        &self.events
    }

    fn apply(&self, deal: &mut ClientDeal, event: &ClientEvent) {
        match event {
            ClientEvent::EnsureFundsFailed(err)
            | ClientEvent::WriteProposalFailed(err)
            | ClientEvent::DealStreamLookupErrored(err)
            | ClientEvent::ReadResponseFailed(err)
            | ClientEvent::StreamCloseError(err)
            | ClientEvent::DealPublishFailed(err)
            | ClientEvent::DealActivationFailed(err) => deal.message.clone_from(err),
            ClientEvent::ResponseVerificationFailed => {
                deal.message = "unable to verify signature on deal response".to_owned();
            }
            ClientEvent::ResponseDealDidNotMatch { expected, actual } => {
                deal.message =
                    format!("miner responded to a wrong proposal: {actual} != {expected}");
            }
            ClientEvent::DealRejected { state, reason } => {
                deal.message = format!("deal failed: (State={state}) {reason}");
            }
            ClientEvent::DealAccepted { publish_message } => {
                deal.publish_message = *publish_message;
            }
            ClientEvent::DealPublished { deal_id } => deal.deal_id = Some(*deal_id),
            ClientEvent::Open
            | ClientEvent::FundsEnsured
            | ClientEvent::DealProposed
            | ClientEvent::DealActivated
            | ClientEvent::Failed => {}
        }
    }

    fn on_enter(
        &self,
        state: DealState,
        deal: &ClientDeal,
    ) -> impl Future<Output = Option<ClientEvent>> + Send {
        let node = Arc::clone(&self.node);
        let conns = Arc::clone(&self.conns);
        let deal = deal.clone();

        async move {
            match state {
                DealState::EnsureClientFunds => Some(ensure_funds(&*node, &deal).await),
                DealState::FundsEnsured => Some(propose(&conns, &deal).await),
                DealState::Validating => Some(verify_response(&*node, &conns, &deal).await),
                DealState::ProposalAccepted => {
                    Some(match node.validate_published_deal(&deal).await {
                        Ok(deal_id) => ClientEvent::DealPublished { deal_id },
                        Err(e) => ClientEvent::DealPublishFailed(e.to_string()),
                    })
                }
                DealState::Sealing => Some(wait_for_sector(&*node, &deal).await),
                DealState::Active => {
                    info!(deal = %deal.proposal_cid.short(), deal_id = ?deal.deal_id, "deal active");
                    conns
                        .remove(&deal.proposal_cid)
                        .err()
                        .map(|e| ClientEvent::StreamCloseError(e.to_string()))
                }
                DealState::Failing => Some(match conns.remove(&deal.proposal_cid) {
                    Ok(()) => ClientEvent::Failed,
                    Err(e) => ClientEvent::StreamCloseError(e.to_string()),
                }),
                DealState::Error => {
                    warn!(deal = %deal.proposal_cid.short(), reason = %deal.message, "deal failed");
                    if let Err(e) = conns.remove(&deal.proposal_cid) {
                        warn!(deal = %deal.proposal_cid.short(), error = %e, "closing deal stream failed");
                    }
                    None
                }
                DealState::Unknown
                | DealState::ProposalNotFound
                | DealState::ProposalRejected
                | DealState::Staged
                | DealState::NotFound => None,
            }
        }
    }

    fn is_terminal(&self, state: DealState) -> bool {
        state.is_terminal()
    }
}

async fn ensure_funds<N: StorageClientNode>(node: &N, deal: &ClientDeal) -> ClientEvent {
    let proposal = deal.proposal();
    match node
        .ensure_funds(proposal.client, proposal.client_balance_requirement())
        .await
    {
        Ok(()) => ClientEvent::FundsEnsured,
        Err(e) => ClientEvent::EnsureFundsFailed(e.to_string()),
    }
}

async fn propose<S: StorageDealStream>(
    conns: &ConnectionRegistry<S>,
    deal: &ClientDeal,
) -> ClientEvent {
    let stream = match conns.get(&deal.proposal_cid) {
        Ok(stream) => stream,
        Err(e) => return ClientEvent::DealStreamLookupErrored(e.to_string()),
    };
    let proposal = Proposal {
        deal_proposal: deal.client_deal_proposal.clone(),
        piece: deal.data_ref.clone(),
    };
    match stream.write_deal_proposal(proposal).await {
        Ok(()) => ClientEvent::DealProposed,
        Err(e) => ClientEvent::WriteProposalFailed(e.to_string()),
    }
}

async fn verify_response<N, S>(
    node: &N,
    conns: &ConnectionRegistry<S>,
    deal: &ClientDeal,
) -> ClientEvent
where
    N: StorageClientNode,
    S: StorageDealStream,
{
    let stream = match conns.get(&deal.proposal_cid) {
        Ok(stream) => stream,
        Err(e) => return ClientEvent::DealStreamLookupErrored(e.to_string()),
    };
    let SignedResponse {
        response,
        signature,
    } = match stream.read_deal_response().await {
        Ok(signed) => signed,
        Err(e) => return ClientEvent::ReadResponseFailed(e.to_string()),
    };

    let hash = response.signing_hash();
    let verified = node
        .verify_signature(&signature, deal.miner_worker, hash.as_slice())
        .await;
    if !matches!(verified, Ok(true)) {
        return ClientEvent::ResponseVerificationFailed;
    }

    if response.proposal != deal.proposal_cid {
        return ClientEvent::ResponseDealDidNotMatch {
            expected: deal.proposal_cid,
            actual: response.proposal,
        };
    }

    if response.state != DealState::ProposalAccepted {
        return ClientEvent::DealRejected {
            state: response.state,
            reason: response.message,
        };
    }

    ClientEvent::DealAccepted {
        publish_message: response.publish_message,
    }
}

async fn wait_for_sector<N: StorageClientNode>(node: &N, deal: &ClientDeal) -> ClientEvent {
    let committed = match deal.deal_id {
        Some(deal_id) => {
            node.on_deal_sector_committed(deal.proposal().provider, deal_id)
                .await
        }
        None => Err(NodeError::MissingDealId(deal.proposal_cid)),
    };
    match committed {
        Ok(()) => ClientEvent::DealActivated,
        Err(e) => ClientEvent::DealActivationFailed(e.to_string()),
    }
}
