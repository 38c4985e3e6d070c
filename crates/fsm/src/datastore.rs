//! Durable key/value storage for state machine records.

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::DatastoreError;

/// A key/value store with prefix queries.
///
/// Writes must be durable once `put` returns: the state group persists a
/// record after every transition and relies on reading it back after a
/// restart.
pub trait Datastore: Send + Sync {
    /// Retrieves a value. Returns `None` if the key doesn't exist.
    fn get(&self, key: &str) -> Result<Option<Bytes>, DatastoreError>;

    /// Stores or replaces a value.
    fn put(&self, key: &str, value: Bytes) -> Result<(), DatastoreError>;

    /// Checks if a key exists.
    fn has(&self, key: &str) -> Result<bool, DatastoreError>;

    /// Removes a key. Returns `true` if it existed.
    fn delete(&self, key: &str) -> Result<bool, DatastoreError>;

    /// Returns every entry whose key starts with `prefix`, ordered by key.
    fn query_prefix(&self, prefix: &str) -> Result<Vec<(String, Bytes)>, DatastoreError>;
}

/// In-memory datastore.
///
/// Shared between state groups through an `Arc`, it outlives any one group
/// and so stands in for durable storage in tests.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    entries: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryDatastore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Datastore for MemoryDatastore {
    fn get(&self, key: &str) -> Result<Option<Bytes>, DatastoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Bytes) -> Result<(), DatastoreError> {
        self.entries.write().insert(key.to_owned(), value);
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool, DatastoreError> {
        Ok(self.entries.read().contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<bool, DatastoreError> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn query_prefix(&self, prefix: &str) -> Result<Vec<(String, Bytes)>, DatastoreError> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_query() {
        let ds = MemoryDatastore::new();
        ds.put("/deals/b", Bytes::from_static(b"2")).unwrap();
        ds.put("/deals/a", Bytes::from_static(b"1")).unwrap();
        ds.put("/other/a", Bytes::from_static(b"3")).unwrap();

        let deals = ds.query_prefix("/deals/").unwrap();
        let keys: Vec<_> = deals.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["/deals/a", "/deals/b"]);
    }

    #[test]
    fn test_delete() {
        let ds = MemoryDatastore::new();
        ds.put("k", Bytes::from_static(b"v")).unwrap();
        assert!(ds.has("k").unwrap());
        assert!(ds.delete("k").unwrap());
        assert!(!ds.delete("k").unwrap());
        assert!(ds.is_empty());
    }
}
