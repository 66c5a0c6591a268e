//! Persistence Store (C3): a named-store registry of opaque key/value
//! stores, each mutated only through a buffered transaction.
//!
//! The default implementation is a plain in-memory map (§4.3); a durable
//! implementation may back it with real storage but must preserve the same
//! observable ordering: a transaction's clear, then its removes, then its
//! puts, applied atomically on `commit`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::Result;

/// One named store's buffered mutations. Writes are invisible until
/// `commit`; a `Tx` dropped without committing has no effect.
pub struct Tx<'a> {
    store: &'a NamedStore,
    clear: bool,
    removes: Vec<String>,
    puts: Vec<(String, Vec<u8>)>,
}

impl<'a> Tx<'a> {
    pub fn clear(&mut self) -> &mut Self {
        self.clear = true;
        self.removes.clear();
        self.puts.clear();
        self
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.removes.push(key.into());
        self
    }

    pub fn put_opaque(&mut self, key: impl Into<String>, value: Vec<u8>) -> &mut Self {
        self.puts.push((key.into(), value));
        self
    }

    /// Atomically applies the buffered clear/removes/puts, in that order.
    pub async fn commit(self) -> Result<()> {
        let mut map = self.store.entries.write().await;
        if self.clear {
            map.clear();
        }
        for key in &self.removes {
            map.remove(key);
        }
        for (key, value) in self.puts {
            map.insert(key, value);
        }
        Ok(())
    }
}

/// One named key/value store.
pub struct NamedStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl NamedStore {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn get_all(&self) -> HashMap<String, Vec<u8>> {
        self.entries.read().await.clone()
    }

    pub async fn get_opaque(&self, key: &str, default: Vec<u8>) -> Vec<u8> {
        self.entries.read().await.get(key).cloned().unwrap_or(default)
    }

    pub fn open_transaction(&self) -> Tx<'_> {
        Tx {
            store: self,
            clear: false,
            removes: Vec::new(),
            puts: Vec::new(),
        }
    }
}

impl Default for NamedStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of named stores, created on demand on first `get`.
#[derive(Default)]
pub struct PersistenceStoreRegistry {
    stores: RwLock<HashMap<String, Arc<NamedStore>>>,
}

impl PersistenceStoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Arc<NamedStore> {
        if let Some(store) = self.stores.read().await.get(name) {
            return Arc::clone(store);
        }
        let mut stores = self.stores.write().await;
        Arc::clone(stores.entry(name.to_string()).or_insert_with(|| Arc::new(NamedStore::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transaction_applies_clear_then_removes_then_puts() {
        let registry = PersistenceStoreRegistry::new();
        let store = registry.get("attributes").await;

        let mut tx = store.open_transaction();
        tx.put_opaque("a", b"1".to_vec());
        tx.put_opaque("b", b"2".to_vec());
        tx.commit().await.unwrap();

        assert!(store.contains("a").await);
        assert_eq!(store.get_opaque("b", Vec::new()).await, b"2".to_vec());

        let mut tx = store.open_transaction();
        tx.clear();
        tx.put_opaque("a", b"3".to_vec());
        tx.commit().await.unwrap();

        assert!(!store.contains("b").await);
        assert_eq!(store.get_opaque("a", Vec::new()).await, b"3".to_vec());
    }

    #[tokio::test]
    async fn get_creates_store_on_demand_and_is_idempotent() {
        let registry = PersistenceStoreRegistry::new();
        let first = registry.get("x").await;
        let mut tx = first.open_transaction();
        tx.put_opaque("k", b"v".to_vec());
        tx.commit().await.unwrap();

        let second = registry.get("x").await;
        assert_eq!(second.get_opaque("k", Vec::new()).await, b"v".to_vec());
    }

    #[tokio::test]
    async fn remove_without_clear_leaves_other_keys() {
        let registry = PersistenceStoreRegistry::new();
        let store = registry.get("attributes").await;
        let mut tx = store.open_transaction();
        tx.put_opaque("a", b"1".to_vec());
        tx.put_opaque("b", b"2".to_vec());
        tx.commit().await.unwrap();

        let mut tx = store.open_transaction();
        tx.remove("a");
        tx.commit().await.unwrap();

        assert!(!store.contains("a").await);
        assert!(store.contains("b").await);
    }
}
