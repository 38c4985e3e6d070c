//! In-process transport.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::{Mutex, mpsc};
use tracing::trace;

use super::{
    AskRequest, AskResponse, Proposal, SignedResponse, StorageAskStream, StorageDealStream,
    StorageMarketNetwork,
};
use crate::error::NetworkError;
use crate::types::PeerId;

/// Provider-side handling of an ask request.
pub type AskHandler = Arc<dyn Fn(AskRequest) -> AskResponse + Send + Sync>;

/// Provider-side handling of a proposal. `None` sends no reply.
pub type DealHandler = Arc<dyn Fn(Proposal) -> Option<SignedResponse> + Send + Sync>;

#[derive(Clone)]
struct Provider {
    ask: AskHandler,
    deal: DealHandler,
}

/// Network of in-process providers.
///
/// Each registered provider answers through handler closures, called
/// synchronously when the client writes. Clones share the provider table.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    providers: Arc<RwLock<HashMap<PeerId, Provider>>>,
}

impl fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("providers", &self.providers.read().len())
            .finish()
    }
}

impl MemoryNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `peer`, replacing any previous one.
    pub fn register_provider(
        &self,
        peer: PeerId,
        ask: impl Fn(AskRequest) -> AskResponse + Send + Sync + 'static,
        deal: impl Fn(Proposal) -> Option<SignedResponse> + Send + Sync + 'static,
    ) {
        self.providers.write().insert(
            peer,
            Provider {
                ask: Arc::new(ask),
                deal: Arc::new(deal),
            },
        );
    }

    /// Remove a provider. Open streams keep working.
    pub fn unregister_provider(&self, peer: &PeerId) -> bool {
        self.providers.write().remove(peer).is_some()
    }

    fn provider(&self, peer: PeerId) -> Result<Provider, NetworkError> {
        self.providers
            .read()
            .get(&peer)
            .cloned()
            .ok_or(NetworkError::UnknownPeer(peer))
    }
}

impl StorageMarketNetwork for MemoryNetwork {
    type AskStream = MemoryAskStream;
    type DealStream = MemoryDealStream;

    async fn new_ask_stream(&self, peer: PeerId) -> Result<MemoryAskStream, NetworkError> {
        let provider = self.provider(peer)?;
        Ok(MemoryAskStream {
            handler: provider.ask,
            replies: Replies::new(),
        })
    }

    async fn new_deal_stream(&self, peer: PeerId) -> Result<MemoryDealStream, NetworkError> {
        let provider = self.provider(peer)?;
        trace!(%peer, "opened deal stream");
        Ok(MemoryDealStream {
            peer,
            handler: provider.deal,
            replies: Replies::new(),
        })
    }
}

/// Reply queue shared by both stream kinds.
struct Replies<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
    closed: AtomicBool,
}

impl<T> Replies<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<(), NetworkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetworkError::AlreadyClosed);
        }
        Ok(())
    }

    fn push(&self, reply: T) -> Result<(), NetworkError> {
        self.tx.send(reply).map_err(|_| NetworkError::Reset)
    }

    /// Waits until a reply arrives; pends forever if the provider never answers.
    async fn next(&self) -> Result<T, NetworkError> {
        self.check_open()?;
        self.rx.lock().await.recv().await.ok_or(NetworkError::Reset)
    }

    fn close(&self) -> Result<(), NetworkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(NetworkError::AlreadyClosed);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Client end of an in-process ask stream.
pub struct MemoryAskStream {
    handler: AskHandler,
    replies: Replies<AskResponse>,
}

impl fmt::Debug for MemoryAskStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAskStream")
            .field("closed", &self.replies.is_closed())
            .finish_non_exhaustive()
    }
}

impl StorageAskStream for MemoryAskStream {
    async fn write_ask_request(&self, request: AskRequest) -> Result<(), NetworkError> {
        self.replies.check_open()?;
        self.replies.push((self.handler)(request))
    }

    async fn read_ask_response(&self) -> Result<AskResponse, NetworkError> {
        self.replies.next().await
    }

    fn close(&self) -> Result<(), NetworkError> {
        self.replies.close()
    }
}

/// Client end of an in-process deal stream.
pub struct MemoryDealStream {
    peer: PeerId,
    handler: DealHandler,
    replies: Replies<SignedResponse>,
}

impl MemoryDealStream {
    /// Whether [`StorageDealStream::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.replies.is_closed()
    }
}

impl fmt::Debug for MemoryDealStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDealStream")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl StorageDealStream for MemoryDealStream {
    async fn write_deal_proposal(&self, proposal: Proposal) -> Result<(), NetworkError> {
        self.replies.check_open()?;
        match (self.handler)(proposal) {
            Some(response) => self.replies.push(response),
            None => Ok(()),
        }
    }

    async fn read_deal_response(&self) -> Result<SignedResponse, NetworkError> {
        self.replies.next().await
    }

    fn remote_peer(&self) -> PeerId {
        self.peer
    }

    fn close(&self) -> Result<(), NetworkError> {
        self.replies.close()
    }
}
