use std::collections::{BTreeMap, HashMap};
use std::fmt;

use alloy_primitives::{Address, Signature};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use comb_primitives::ContentId;
use parking_lot::RwLock;
use tracing::debug;

use super::StorageClientNode;
use crate::error::NodeError;
use crate::types::{
    Balance, ClientDeal, ClientDealProposal, DealId, DealProposal, SignedStorageAsk,
    StorageDeal, StorageProviderInfo, TokenAmount,
};

#[derive(Debug, Default)]
struct Chain {
    providers: Vec<StorageProviderInfo>,
    balances: HashMap<Address, Balance>,
    deals: BTreeMap<DealId, StorageDeal>,
    published: HashMap<ContentId, DealId>,
    last_deal_id: DealId,
}

/// Chain node and wallet held entirely in memory.
///
/// Keys are local secp256k1 signers. Publishing a deal locks the client's
/// collateral and storage fee in escrow; sector commitment is immediate.
#[derive(Default)]
pub struct MemoryClientNode {
    keys: RwLock<HashMap<Address, PrivateKeySigner>>,
    chain: RwLock<Chain>,
}

impl fmt::Debug for MemoryClientNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryClientNode")
            .field("keys", &self.keys.read().len())
            .field("chain", &*self.chain.read())
            .finish()
    }
}

impl MemoryClientNode {
    /// Create a node with no keys, providers, or deals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a random key and return its address.
    pub fn generate_key(&self) -> Address {
        self.import_key(PrivateKeySigner::random())
    }

    /// Hold `signer` and return its address.
    pub fn import_key(&self, signer: PrivateKeySigner) -> Address {
        let address = signer.address();
        self.keys.write().insert(address, signer);
        address
    }

    /// Sign `message` (EIP-191) with the key of `signer`.
    pub fn sign_message(&self, signer: Address, message: &[u8]) -> Result<Signature, NodeError> {
        let keys = self.keys.read();
        let key = keys.get(&signer).ok_or(NodeError::UnknownSigner(signer))?;
        Ok(key.sign_message_sync(message)?)
    }

    /// Register a storage provider on chain.
    pub fn add_provider(&self, info: StorageProviderInfo) {
        let mut chain = self.chain.write();
        chain.providers.retain(|p| p.address != info.address);
        chain.providers.push(info);
    }

    /// A published deal.
    pub fn deal(&self, deal_id: DealId) -> Option<StorageDeal> {
        self.chain.read().deals.get(&deal_id).cloned()
    }

    fn available(chain: &Chain, address: Address) -> TokenAmount {
        chain
            .balances
            .get(&address)
            .map_or(0, |balance| balance.available)
    }
}

impl StorageClientNode for MemoryClientNode {
    async fn list_storage_providers(&self) -> Result<Vec<StorageProviderInfo>, NodeError> {
        Ok(self.chain.read().providers.clone())
    }

    async fn list_client_deals(&self, address: Address) -> Result<Vec<StorageDeal>, NodeError> {
        Ok(self
            .chain
            .read()
            .deals
            .values()
            .filter(|deal| deal.proposal.client == address)
            .cloned()
            .collect())
    }

    async fn sign_proposal(
        &self,
        signer: Address,
        proposal: DealProposal,
    ) -> Result<ClientDealProposal, NodeError> {
        let client_signature = self.sign_message(signer, proposal.signing_hash().as_slice())?;
        Ok(ClientDealProposal {
            proposal,
            client_signature,
        })
    }

    async fn validate_ask_signature(&self, ask: &SignedStorageAsk) -> Result<(), NodeError> {
        let miner = ask.ask.miner;
        let worker = self
            .chain
            .read()
            .providers
            .iter()
            .find(|p| p.address == miner)
            .map(|p| p.worker)
            .ok_or(NodeError::UnknownProvider(miner))?;

        let signed = self
            .verify_signature(&ask.signature, worker, ask.ask.signing_hash().as_slice())
            .await?;
        if !signed {
            return Err(NodeError::InvalidSignature { expected: worker });
        }
        Ok(())
    }

    async fn verify_signature(
        &self,
        signature: &Signature,
        signer: Address,
        message: &[u8],
    ) -> Result<bool, NodeError> {
        Ok(signature
            .recover_address_from_msg(message)
            .is_ok_and(|recovered| recovered == signer))
    }

    async fn get_balance(&self, address: Address) -> Result<Balance, NodeError> {
        Ok(self
            .chain
            .read()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn add_funds(&self, address: Address, amount: TokenAmount) -> Result<(), NodeError> {
        let mut chain = self.chain.write();
        let balance = chain.balances.entry(address).or_default();
        balance.available = balance.available.saturating_add(amount);
        Ok(())
    }

    async fn ensure_funds(&self, address: Address, amount: TokenAmount) -> Result<(), NodeError> {
        let available = Self::available(&self.chain.read(), address);
        if available < amount {
            return Err(NodeError::InsufficientFunds {
                address,
                required: amount,
                available,
            });
        }
        Ok(())
    }

    async fn validate_published_deal(&self, deal: &ClientDeal) -> Result<DealId, NodeError> {
        if deal.publish_message.is_none() {
            return Err(NodeError::DealNotPublished(deal.proposal_cid));
        }
        let proposal = deal.proposal();
        if deal.client_deal_proposal.recover_client() != Some(proposal.client) {
            return Err(NodeError::InvalidSignature {
                expected: proposal.client,
            });
        }

        let mut chain = self.chain.write();
        if let Some(&deal_id) = chain.published.get(&deal.proposal_cid) {
            return Ok(deal_id);
        }

        let required = proposal.client_balance_requirement();
        let available = Self::available(&chain, proposal.client);
        if available < required {
            return Err(NodeError::InsufficientFunds {
                address: proposal.client,
                required,
                available,
            });
        }
        let balance = chain.balances.entry(proposal.client).or_default();
        balance.available -= required;
        balance.locked += required;

        chain.last_deal_id += 1;
        let deal_id = chain.last_deal_id;
        chain.published.insert(deal.proposal_cid, deal_id);
        chain.deals.insert(
            deal_id,
            StorageDeal {
                deal_id,
                proposal: proposal.clone(),
                sector_start_epoch: None,
            },
        );
        debug!(deal_id, proposal = %deal.proposal_cid.short(), "deal published");
        Ok(deal_id)
    }

    async fn on_deal_sector_committed(
        &self,
        provider: Address,
        deal_id: DealId,
    ) -> Result<(), NodeError> {
        let mut chain = self.chain.write();
        let deal = chain
            .deals
            .get_mut(&deal_id)
            .ok_or(NodeError::UnknownDeal(deal_id))?;
        if deal.proposal.provider != provider {
            return Err(NodeError::UnknownProvider(provider));
        }
        deal.sector_start_epoch = Some(deal.proposal.start_epoch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataRef, PeerId, StorageAsk};
    use alloy_primitives::B256;
    use comb_primitives::{Commitment, PaddedPieceSize};

    fn provider(node: &MemoryClientNode) -> StorageProviderInfo {
        let worker = node.generate_key();
        let info = StorageProviderInfo {
            address: Address::repeat_byte(0xaa),
            owner: worker,
            worker,
            sector_size: 1 << 30,
            peer_id: PeerId::from_address(worker),
        };
        node.add_provider(info.clone());
        info
    }

    fn proposal(client: Address, provider: Address) -> DealProposal {
        DealProposal {
            piece_commitment: Commitment::new(B256::repeat_byte(1)),
            piece_size: PaddedPieceSize::new(128).unwrap(),
            client,
            provider,
            start_epoch: 10,
            end_epoch: 20,
            storage_price_per_epoch: 5,
            provider_collateral: 128,
            client_collateral: 50,
        }
    }

    #[tokio::test]
    async fn test_ask_signature() {
        let node = MemoryClientNode::new();
        let info = provider(&node);
        let ask = StorageAsk {
            price: 1,
            min_piece_size: PaddedPieceSize::new(256).unwrap(),
            miner: info.address,
            timestamp: 1,
            expiry: 100,
            seq_no: 0,
        };
        let signature = node
            .sign_message(info.worker, ask.signing_hash().as_slice())
            .unwrap();
        let signed = SignedStorageAsk { ask, signature };
        node.validate_ask_signature(&signed).await.unwrap();

        let stranger = node.generate_key();
        let forged = SignedStorageAsk {
            signature: node
                .sign_message(stranger, signed.ask.signing_hash().as_slice())
                .unwrap(),
            ..signed
        };
        assert!(matches!(
            node.validate_ask_signature(&forged).await,
            Err(NodeError::InvalidSignature { expected }) if expected == info.worker
        ));
    }

    #[tokio::test]
    async fn test_funds() {
        let node = MemoryClientNode::new();
        let client = node.generate_key();

        assert_eq!(node.get_balance(client).await.unwrap(), Balance::default());
        assert!(matches!(
            node.ensure_funds(client, 1).await,
            Err(NodeError::InsufficientFunds { available: 0, .. })
        ));

        node.add_funds(client, 100).await.unwrap();
        node.ensure_funds(client, 100).await.unwrap();
        assert_eq!(node.get_balance(client).await.unwrap().available, 100);
    }

    #[tokio::test]
    async fn test_publish_locks_funds_once() {
        let node = MemoryClientNode::new();
        let info = provider(&node);
        let client = node.generate_key();
        node.add_funds(client, 1_000).await.unwrap();

        let signed = node
            .sign_proposal(client, proposal(client, info.address))
            .await
            .unwrap();
        let mut deal = ClientDeal::new(
            signed,
            info.peer_id,
            info.worker,
            DataRef::new(ContentId::hash(b"payload")),
        );

        assert!(matches!(
            node.validate_published_deal(&deal).await,
            Err(NodeError::DealNotPublished(_))
        ));

        deal.publish_message = Some(ContentId::hash(b"msg"));
        let id = node.validate_published_deal(&deal).await.unwrap();
        assert_eq!(node.validate_published_deal(&deal).await.unwrap(), id);

        // 50 collateral + 5 * 10 epochs
        let balance = node.get_balance(client).await.unwrap();
        assert_eq!(balance.locked, 100);
        assert_eq!(balance.available, 900);

        node.on_deal_sector_committed(info.address, id).await.unwrap();
        assert_eq!(node.deal(id).unwrap().sector_start_epoch, Some(10));
        assert_eq!(node.list_client_deals(client).await.unwrap().len(), 1);
        assert!(node.list_client_deals(info.worker).await.unwrap().is_empty());
        assert!(matches!(
            node.on_deal_sector_committed(info.address, id + 1).await,
            Err(NodeError::UnknownDeal(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_signer() {
        let node = MemoryClientNode::new();
        let nobody = Address::repeat_byte(9);
        assert!(matches!(
            node.sign_proposal(nobody, proposal(nobody, nobody)).await,
            Err(NodeError::UnknownSigner(a)) if a == nobody
        ));
    }
}
