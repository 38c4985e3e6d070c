//! Storage market client.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use alloy_primitives::Address;
use comb_fsm::{Datastore, Notification, StateGroup};
use comb_piece::{Blockstore, Car, DirFileStore, PieceIo, PieceIoWithStore};
use comb_primitives::{Commitment, CommitmentScheme, ContentId, PaddedPieceSize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::clientstates::ClientDealMachine;
use crate::config::{ClientConfig, PieceMode};
use crate::connections::ConnectionRegistry;
use crate::discovery::{LocalDiscovery, RetrievalPeer};
use crate::error::{ClientError, ProtocolViolation, Result};
use crate::network::{AskRequest, AskResponse, StorageAskStream, StorageMarketNetwork};
use crate::node::StorageClientNode;
use crate::state::{ClientEvent, DealState};
use crate::types::{
    Balance, ChainEpoch, ClientDeal, DataRef, DealProposal, ProposeStorageDealResult,
    SignedStorageAsk, StorageDeal, StorageProviderInfo, TokenAmount,
};

/// Transition notification for a client deal.
pub type DealNotification = Notification<ContentId, ClientEvent, DealState>;

/// Arguments of [`Client::propose_storage_deal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposeDealParams {
    /// Client address; signs the proposal and pays for the deal.
    pub client: Address,
    /// The provider to store with.
    pub provider: StorageProviderInfo,
    /// The payload to store.
    pub data: DataRef,
    /// First epoch of storage.
    pub start_epoch: ChainEpoch,
    /// Epoch storage ends.
    pub end_epoch: ChainEpoch,
    /// Price per epoch.
    pub price_per_epoch: TokenAmount,
    /// Collateral the client locks.
    pub collateral: TokenAmount,
    /// Commitment scheme of the provider's sectors.
    pub scheme: CommitmentScheme,
}

#[derive(Debug, Clone)]
enum Pieces {
    Streaming(PieceIo<Car>),
    DiskBuffered(PieceIoWithStore<Car, DirFileStore>),
}

struct Piece {
    commitment: Commitment,
    size: PaddedPieceSize,
    path: Option<PathBuf>,
}

impl Pieces {
    fn new(mode: &PieceMode, bs: Arc<dyn Blockstore>) -> Self {
        match mode {
            PieceMode::Streaming => Self::Streaming(PieceIo::with_blockstore(bs)),
            PieceMode::DiskBuffered { dir } => {
                Self::DiskBuffered(PieceIoWithStore::new(Car, bs, DirFileStore::new(dir)))
            }
        }
    }

    fn generate(&self, scheme: CommitmentScheme, data: &DataRef) -> comb_piece::Result<Piece> {
        match self {
            Self::Streaming(io) => {
                let (commitment, size) =
                    io.generate_piece_commitment(scheme, data.root, data.selector)?;
                Ok(Piece {
                    commitment,
                    size,
                    path: None,
                })
            }
            Self::DiskBuffered(io) => {
                let (commitment, path, size) =
                    io.generate_piece_commitment_to_file(scheme, data.root, data.selector)?;
                Ok(Piece {
                    commitment,
                    size,
                    path: Some(path),
                })
            }
        }
    }

    fn discard(&self, piece: &Piece) {
        use comb_piece::FileStore;

        let (Self::DiskBuffered(io), Some(path)) = (self, &piece.path) else {
            return;
        };
        if let Err(e) = io.file_store().delete(path) {
            warn!(path = %path.display(), error = %e, "removing piece file failed");
        }
    }
}

/// Client side of the storage market.
///
/// Proposes deals to providers and tracks each one in a durable state
/// machine until it is active on chain or has failed.
pub struct Client<N, Net>
where
    N: StorageClientNode,
    Net: StorageMarketNetwork,
{
    net: Net,
    node: Arc<N>,
    pieces: Pieces,
    discovery: Arc<LocalDiscovery>,
    conns: Arc<ConnectionRegistry<Net::DealStream>>,
    deals: StateGroup<ClientDealMachine<N, Net::DealStream>>,
    config: ClientConfig,
}

impl<N, Net> fmt::Debug for Client<N, Net>
where
    N: StorageClientNode,
    Net: StorageMarketNetwork,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("connections", &self.conns.len())
            .field("deals", &self.deals)
            .finish_non_exhaustive()
    }
}

impl<N, Net> Client<N, Net>
where
    N: StorageClientNode,
    Net: StorageMarketNetwork,
{
    /// Create a client.
    ///
    /// Deal records are kept in `ds` under the configured namespace. Records
    /// left by an earlier client are picked up lazily, or all at once by
    /// [`restart_deals`](Self::restart_deals). Deals are driven by Tokio
    /// tasks, so proposing and resuming need a running runtime.
    pub fn new(
        net: Net,
        bs: Arc<dyn Blockstore>,
        discovery: Arc<LocalDiscovery>,
        ds: Arc<dyn Datastore>,
        node: Arc<N>,
        config: ClientConfig,
    ) -> Self {
        let conns = Arc::new(ConnectionRegistry::new());
        let machine = ClientDealMachine::new(Arc::clone(&node), Arc::clone(&conns));
        Self {
            net,
            pieces: Pieces::new(&config.piece_mode, bs),
            deals: StateGroup::new(machine, ds, config.group_config()),
            node,
            discovery,
            conns,
            config,
        }
    }

    /// Stream every known storage provider.
    ///
    /// Sending stops once `cancel` completes or the receiver is dropped; the
    /// channel is closed either way.
    pub async fn list_providers(
        &self,
        cancel: impl Future<Output = ()> + Send + 'static,
    ) -> Result<mpsc::Receiver<StorageProviderInfo>> {
        let providers = self.node.list_storage_providers().await?;
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            tokio::pin!(cancel);
            for provider in providers {
                tokio::select! {
                    biased;
                    () = &mut cancel => return,
                    sent = tx.send(provider) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }

    /// Published deals where `address` is the client.
    pub async fn list_deals(&self, address: Address) -> Result<Vec<StorageDeal>> {
        Ok(self.node.list_client_deals(address).await?)
    }

    /// Every deal this client tracks.
    pub fn list_in_progress_deals(&self) -> Result<Vec<ClientDeal>> {
        Ok(self.deals.list()?)
    }

    /// The tracked deal with proposal id `cid`.
    pub fn get_in_progress_deal(&self, cid: &ContentId) -> Result<ClientDeal> {
        Ok(self.deals.get(cid)?)
    }

    /// Fetch and check a provider's current ask.
    pub async fn get_ask(&self, info: &StorageProviderInfo) -> Result<SignedStorageAsk> {
        let stream = self
            .net
            .new_ask_stream(info.peer_id)
            .await
            .map_err(ClientError::OpenAskStream)?;

        let response = exchange_ask(&stream, info.address).await;
        if let Err(e) = stream.close() {
            debug!(peer = %info.peer_id, error = %e, "closing ask stream failed");
        }

        let ask = response?.ask.ok_or(ProtocolViolation::NoAsk)?;
        if ask.ask.miner != info.address {
            return Err(ProtocolViolation::WrongMiner {
                expected: info.address,
                actual: ask.ask.miner,
            }
            .into());
        }
        self.node
            .validate_ask_signature(&ask)
            .await
            .map_err(ProtocolViolation::InvalidAskSignature)?;
        Ok(ask)
    }

    /// Propose a deal and start tracking it.
    ///
    /// Computes the piece commitment, signs the proposal, starts tracking
    /// under the proposal id, opens a stream to the provider, registers it
    /// and opens the deal's state machine. The provider is then recorded as
    /// a retrieval peer for the payload.
    ///
    /// A failure before tracking starts leaves nothing behind. A later
    /// failure leaves the tracked record in place; nothing is rolled back.
    pub async fn propose_storage_deal(
        &self,
        params: ProposeDealParams,
    ) -> Result<ProposeStorageDealResult> {
        let ProposeDealParams {
            client,
            provider,
            data,
            start_epoch,
            end_epoch,
            price_per_epoch,
            collateral,
            scheme,
        } = params;

        let piece = self.generate_piece(scheme, &data).await?;
        let proposal = DealProposal {
            piece_commitment: piece.commitment,
            piece_size: piece.size,
            client,
            provider: provider.address,
            start_epoch,
            end_epoch,
            storage_price_per_epoch: price_per_epoch,
            provider_collateral: self.config.collateral_policy.provider_collateral(piece.size),
            client_collateral: collateral,
        };

        let signed = match self.node.sign_proposal(client, proposal).await {
            Ok(signed) => signed,
            Err(e) => {
                self.pieces.discard(&piece);
                return Err(ClientError::Signing(e));
            }
        };

        let mut deal = ClientDeal::new(signed, provider.peer_id, provider.worker, data.clone());
        deal.piece_path.clone_from(&piece.path);
        let proposal_cid = deal.proposal_cid;

        if let Err(e) = self.deals.begin(proposal_cid, deal) {
            self.pieces.discard(&piece);
            return Err(ClientError::Tracking(e));
        }

        let stream = self
            .net
            .new_deal_stream(provider.peer_id)
            .await
            .map_err(ClientError::Connect)?;
        self.conns.put(proposal_cid, stream);

        if let Err(e) = self.deals.send(&proposal_cid, ClientEvent::Open).await {
            // no actor will ever release the stream
            if let Err(close) = self.conns.remove(&proposal_cid) {
                warn!(deal = %proposal_cid.short(), error = %close, "releasing deal stream failed");
            }
            return Err(ClientError::Initialize(e));
        }

        self.discovery.add_peer(
            data.root,
            RetrievalPeer {
                address: provider.address,
                id: provider.peer_id,
            },
        );
        info!(
            deal = %proposal_cid.short(),
            provider = %provider.address,
            piece_size = piece.size.get(),
            "proposed storage deal"
        );
        Ok(ProposeStorageDealResult { proposal_cid })
    }

    async fn generate_piece(&self, scheme: CommitmentScheme, data: &DataRef) -> Result<Piece> {
        let pieces = self.pieces.clone();
        let data = data.clone();
        tokio::task::spawn_blocking(move || pieces.generate(scheme, &data))
            .await
            .map_err(ClientError::CommPTask)?
            .map_err(ClientError::CommP)
    }

    /// Escrow balance of `address`.
    pub async fn get_payment_escrow(&self, address: Address) -> Result<Balance> {
        Ok(self.node.get_balance(address).await?)
    }

    /// Add `amount` to the escrow of `address`.
    pub async fn add_payment_escrow(&self, address: Address, amount: TokenAmount) -> Result<()> {
        Ok(self.node.add_funds(address, amount).await?)
    }

    /// Resume every persisted deal that has not finished. Returns how many.
    ///
    /// Streams do not survive a restart, so a deal waiting on its provider
    /// fails once resumed.
    pub fn restart_deals(&self) -> Result<usize> {
        let mut resumed = 0;
        for deal in self.deals.list()? {
            if deal.state.is_terminal() {
                continue;
            }
            self.deals.resume(&deal.proposal_cid)?;
            resumed += 1;
        }
        debug!(resumed, "restarted deals");
        Ok(resumed)
    }

    /// Receive a notification for every deal transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DealNotification> {
        self.deals.subscribe()
    }

    /// Open deal streams.
    pub fn connections(&self) -> &ConnectionRegistry<Net::DealStream> {
        &self.conns
    }

    /// Payload to retrieval peer index.
    pub fn discovery(&self) -> &Arc<LocalDiscovery> {
        &self.discovery
    }

    /// The chain node.
    pub fn node(&self) -> &Arc<N> {
        &self.node
    }

    /// Stop negotiating. Deal records stay persisted.
    pub async fn stop(&self) {
        self.deals.stop().await;
        info!("storage market client stopped");
    }
}

async fn exchange_ask<S: StorageAskStream>(stream: &S, miner: Address) -> Result<AskResponse> {
    stream
        .write_ask_request(AskRequest { miner })
        .await
        .map_err(ClientError::SendAskRequest)?;
    stream
        .read_ask_response()
        .await
        .map_err(ClientError::ReadAskResponse)
}
