//! Chain node interface used by the client.

#[cfg(feature = "local-signer")]
mod memory;

use std::future::Future;

use alloy_primitives::{Address, Signature};

use crate::error::NodeError;
use crate::types::{
    Balance, ClientDeal, ClientDealProposal, DealId, DealProposal, SignedStorageAsk,
    StorageDeal, StorageProviderInfo, TokenAmount,
};

#[cfg(feature = "local-signer")]
pub use memory::MemoryClientNode;

/// Chain access, wallet, and escrow for a storage market client.
///
/// # Async Design
///
/// Every method may reach a remote node, so all of them return futures.
/// Implementations must be shareable across the deal actors.
pub trait StorageClientNode: Send + Sync + 'static {
    /// Every storage provider known on chain.
    fn list_storage_providers(
        &self,
    ) -> impl Future<Output = Result<Vec<StorageProviderInfo>, NodeError>> + Send;

    /// Published deals where `address` is the client.
    fn list_client_deals(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<Vec<StorageDeal>, NodeError>> + Send;

    /// Sign `proposal` with the key of `signer`.
    fn sign_proposal(
        &self,
        signer: Address,
        proposal: DealProposal,
    ) -> impl Future<Output = Result<ClientDealProposal, NodeError>> + Send;

    /// Check the ask was signed by its provider's worker key.
    fn validate_ask_signature(
        &self,
        ask: &SignedStorageAsk,
    ) -> impl Future<Output = Result<(), NodeError>> + Send;

    /// Whether `signature` over `message` was made by `signer`.
    fn verify_signature(
        &self,
        signature: &Signature,
        signer: Address,
        message: &[u8],
    ) -> impl Future<Output = Result<bool, NodeError>> + Send;

    /// Escrow balance of `address`.
    fn get_balance(&self, address: Address)
    -> impl Future<Output = Result<Balance, NodeError>> + Send;

    /// Move `amount` into the escrow of `address`.
    fn add_funds(
        &self,
        address: Address,
        amount: TokenAmount,
    ) -> impl Future<Output = Result<(), NodeError>> + Send;

    /// Make sure `address` has at least `amount` available.
    fn ensure_funds(
        &self,
        address: Address,
        amount: TokenAmount,
    ) -> impl Future<Output = Result<(), NodeError>> + Send;

    /// Wait for the deal's publish message and return its on-chain id.
    fn validate_published_deal(
        &self,
        deal: &ClientDeal,
    ) -> impl Future<Output = Result<DealId, NodeError>> + Send;

    /// Wait until `provider` commits the sector holding `deal_id`.
    fn on_deal_sector_committed(
        &self,
        provider: Address,
        deal_id: DealId,
    ) -> impl Future<Output = Result<(), NodeError>> + Send;
}
