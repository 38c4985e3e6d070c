//! Open deal streams, keyed by deal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use comb_primitives::ContentId;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{NetworkError, NoConnection};
use crate::network::StorageDealStream;

/// Deal streams shared between the client and the deal state machines.
///
/// Holds at most one stream per deal. Lookups may run concurrently with
/// each other; insertion and removal are exclusive.
pub struct ConnectionRegistry<S> {
    conns: RwLock<HashMap<ContentId, Arc<S>>>,
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self {
            conns: RwLock::new(HashMap::new()),
        }
    }
}

impl<S> fmt::Debug for ConnectionRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl<S: StorageDealStream> ConnectionRegistry<S> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the stream for `id`, returning the stream it replaced.
    pub fn put(&self, id: ContentId, stream: S) -> Option<Arc<S>> {
        self.conns.write().insert(id, Arc::new(stream))
    }

    /// The stream for `id`.
    pub fn get(&self, id: &ContentId) -> Result<Arc<S>, NoConnection> {
        self.conns
            .read()
            .get(id)
            .cloned()
            .ok_or(NoConnection(*id))
    }

    /// Close the stream for `id` and forget it.
    ///
    /// The entry is removed even when closing fails; the close error is
    /// returned. A stream that was already closed is not an error, and
    /// neither is an unknown `id`.
    pub fn remove(&self, id: &ContentId) -> Result<(), NetworkError> {
        let Some(stream) = self.conns.write().remove(id) else {
            return Ok(());
        };
        match stream.close() {
            Ok(()) | Err(NetworkError::AlreadyClosed) => Ok(()),
            Err(e) => {
                debug!(deal = %id.short(), error = %e, "closing deal stream failed");
                Err(e)
            }
        }
    }
}

impl<S> ConnectionRegistry<S> {
    /// Whether a stream is registered for `id`.
    pub fn contains(&self, id: &ContentId) -> bool {
        self.conns.read().contains_key(id)
    }

    /// Number of registered streams.
    pub fn len(&self) -> usize {
        self.conns.read().len()
    }

    /// Whether no stream is registered.
    pub fn is_empty(&self) -> bool {
        self.conns.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Proposal, SignedResponse};
    use crate::types::PeerId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingStream {
        closes: AtomicUsize,
        fail: bool,
    }

    impl StorageDealStream for CountingStream {
        async fn write_deal_proposal(&self, _: Proposal) -> Result<(), NetworkError> {
            Ok(())
        }

        async fn read_deal_response(&self) -> Result<SignedResponse, NetworkError> {
            Err(NetworkError::Reset)
        }

        fn remote_peer(&self) -> PeerId {
            PeerId::default()
        }

        fn close(&self) -> Result<(), NetworkError> {
            if self.fail {
                return Err(NetworkError::Reset);
            }
            if self.closes.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(NetworkError::AlreadyClosed);
            }
            Ok(())
        }
    }

    fn id(n: u32) -> ContentId {
        ContentId::hash(n.to_be_bytes())
    }

    #[test]
    fn test_put_get_remove() {
        let registry = ConnectionRegistry::new();
        assert!(matches!(registry.get(&id(1)), Err(NoConnection(i)) if i == id(1)));

        assert!(registry.put(id(1), CountingStream::default()).is_none());
        let stream = registry.get(&id(1)).unwrap();
        assert!(registry.contains(&id(1)));

        registry.remove(&id(1)).unwrap();
        assert_eq!(stream.closes.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert!(registry.get(&id(1)).is_err());

        // unknown ids are fine
        registry.remove(&id(1)).unwrap();
    }

    #[test]
    fn test_remove_ignores_double_close() {
        let registry = ConnectionRegistry::new();
        registry.put(id(1), CountingStream::default());
        registry.get(&id(1)).unwrap().close().unwrap();

        registry.remove(&id(1)).unwrap();
        assert!(!registry.contains(&id(1)));
    }

    #[test]
    fn test_remove_reports_close_error() {
        let registry = ConnectionRegistry::new();
        registry.put(
            id(1),
            CountingStream {
                fail: true,
                ..Default::default()
            },
        );

        assert!(matches!(registry.remove(&id(1)), Err(NetworkError::Reset)));
        assert!(!registry.contains(&id(1)));
    }

    #[test]
    fn test_put_replaces() {
        let registry = ConnectionRegistry::new();
        registry.put(id(1), CountingStream::default());
        let old = registry.put(id(1), CountingStream::default());
        assert!(old.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        const THREADS: u32 = 8;
        const PER_THREAD: u32 = 200;

        let registry = Arc::new(ConnectionRegistry::<CountingStream>::new());
        std::thread::scope(|s| {
            for t in 0..THREADS {
                let registry = &registry;
                s.spawn(move || {
                    for i in 0..PER_THREAD {
                        let key = id(t * PER_THREAD + i);
                        registry.put(key, CountingStream::default());
                        assert!(registry.get(&key).is_ok());
                        if i % 2 == 0 {
                            registry.remove(&key).unwrap();
                            assert!(registry.get(&key).is_err());
                        }
                    }
                });
            }
        });

        assert_eq!(registry.len(), (THREADS * PER_THREAD / 2) as usize);
    }
}
