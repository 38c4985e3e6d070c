//! Local record of which peers hold which payloads.

use std::collections::HashMap;

use alloy_primitives::Address;
use comb_primitives::ContentId;
use parking_lot::RwLock;

use crate::types::PeerId;

/// A peer able to serve a payload back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetrievalPeer {
    /// Provider address.
    pub address: Address,
    /// Provider network identity.
    pub id: PeerId,
}

/// In-memory payload to peer index.
#[derive(Debug, Default)]
pub struct LocalDiscovery {
    peers: RwLock<HashMap<ContentId, Vec<RetrievalPeer>>>,
}

impl LocalDiscovery {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `peer` holds `payload`. Recording a peer twice is a no-op.
    pub fn add_peer(&self, payload: ContentId, peer: RetrievalPeer) {
        let mut peers = self.peers.write();
        let known = peers.entry(payload).or_default();
        if !known.contains(&peer) {
            known.push(peer);
        }
    }

    /// Peers recorded for `payload`, oldest first.
    pub fn get_peers(&self, payload: &ContentId) -> Vec<RetrievalPeer> {
        self.peers.read().get(payload).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_peer_dedupes() {
        let discovery = LocalDiscovery::new();
        let payload = ContentId::hash(b"payload");
        let a = RetrievalPeer {
            address: Address::repeat_byte(1),
            id: PeerId::new([1; 32]),
        };
        let b = RetrievalPeer {
            address: Address::repeat_byte(2),
            id: PeerId::new([2; 32]),
        };

        discovery.add_peer(payload, a);
        discovery.add_peer(payload, b);
        discovery.add_peer(payload, a);

        assert_eq!(discovery.get_peers(&payload), [a, b]);
        assert!(discovery.get_peers(&ContentId::zero()).is_empty());
    }
}
