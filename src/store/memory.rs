//! In-process store.
//!
//! Behaves like a local or remote store depending on how it is built. Remote
//! instances can simulate a slow or failing `synchronize` and inject changes
//! "from another device", which makes them the workhorse of the policy tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::broadcast;

use super::{KeyValueStore, StoreChange, StoreKind};
use crate::error::{Result, SyncError};
use crate::favorites::FavoritesList;

pub struct MemoryStore {
    name: String,
    kind: StoreKind,
    values: Mutex<HashMap<String, FavoritesList>>,
    reachable: AtomicBool,
    sync_delay: Mutex<Option<Duration>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new(name: &str, kind: StoreKind) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            name: name.to_string(),
            kind,
            values: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            sync_delay: Mutex::new(None),
            changes,
        }
    }

    pub fn local(name: &str) -> Self {
        Self::new(name, StoreKind::Local)
    }

    pub fn remote(name: &str) -> Self {
        Self::new(name, StoreKind::Remote)
    }

    /// Toggle whether operations succeed.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make `synchronize` take this long before completing.
    pub fn set_sync_delay(&self, delay: Option<Duration>) {
        *self.sync_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Write a value as if another process did, and notify subscribers.
    pub fn inject_external(&self, key: &str, value: Option<FavoritesList>) {
        {
            let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
            match value {
                Some(list) => values.insert(key.to_string(), list),
                None => values.remove(key),
            };
        }
        let _ = self.changes.send(StoreChange {
            store: self.name.clone(),
            keys: vec![key.to_string()],
        });
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::unavailable(&self.name, "store is unreachable"))
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        self.kind
    }

    fn get(&self, key: &str) -> Result<Option<FavoritesList>> {
        self.check_reachable()?;
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &FavoritesList) -> Result<()> {
        self.check_reachable()?;
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_reachable()?;
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }

    fn synchronize(&self) -> BoxFuture<'_, bool> {
        let delay = *self.sync_delay.lock().unwrap_or_else(|e| e.into_inner());
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.reachable.load(Ordering::SeqCst)
        })
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StoreChange>> {
        match self.kind {
            StoreKind::Remote => Some(self.changes.subscribe()),
            StoreKind::Local => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = MemoryStore::local("mem");
        let list: FavoritesList = ["a", "b"].into_iter().collect();
        store.set("favorites", &list).unwrap();
        assert_eq!(store.get("favorites").unwrap(), Some(list));
        store.remove("favorites").unwrap();
        assert_eq!(store.get("favorites").unwrap(), None);
    }

    #[test]
    fn test_unreachable_store_errors() {
        let store = MemoryStore::local("mem");
        store.set_reachable(false);
        assert!(matches!(
            store.get("favorites"),
            Err(SyncError::StoreUnavailable { .. })
        ));
        assert!(store.set("favorites", &FavoritesList::empty()).is_err());
    }

    #[tokio::test]
    async fn test_inject_external_notifies_remote_subscribers() {
        let store = MemoryStore::remote("cloud");
        let mut rx = store.subscribe().unwrap();
        store.inject_external("favorites", Some(["x"].into_iter().collect()));

        let change = rx.recv().await.unwrap();
        assert_eq!(change.store, "cloud");
        assert!(change.touches("favorites"));
        assert!(store.synchronize().await);
    }

    #[test]
    fn test_local_store_has_no_subscription() {
        assert!(MemoryStore::local("mem").subscribe().is_none());
    }
}
