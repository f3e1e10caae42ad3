use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::FavoritesSync;
use crate::store::StoreChange;

/// Background task turning a store's change notifications into reloads.
///
/// The subscription lives exactly as long as this handle: dropping it
/// aborts the task and deregisters from the store.
pub struct ChangeListener {
    store: String,
    task: JoinHandle<()>,
}

impl ChangeListener {
    pub fn spawn(
        sync: Arc<FavoritesSync>,
        store: &str,
        mut changes: broadcast::Receiver<StoreChange>,
    ) -> Self {
        let store_name = store.to_string();
        tracing::info!("Listening for external changes on '{}'", store_name);

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if !change.touches(sync.key()) {
                            tracing::trace!("Ignoring change to unrelated keys: {:?}", change.keys);
                            continue;
                        }
                        sync.on_external_change(&change.store).await;
                    }
                    Err(RecvError::Lagged(n)) => {
                        // Missed notifications collapse into a single reload.
                        tracing::warn!("Change listener lagged by {} events", n);
                        sync.on_external_change(&store_name).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Change listener for '{}' stopped", store_name);
        });

        Self {
            store: store.to_string(),
            task,
        }
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop listening. Equivalent to dropping the handle.
    pub fn shutdown(self) {}
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::favorites::FavoritesList;
    use crate::refresh::RefreshNotifier;
    use crate::store::{KeyValueStore, MemoryStore, StoreHandle};

    fn setup() -> (Arc<MemoryStore>, Arc<MemoryStore>, Arc<FavoritesSync>) {
        let shared = Arc::new(MemoryStore::local("app-group"));
        let cloud = Arc::new(MemoryStore::remote("cloud"));
        let stores: Vec<StoreHandle> = vec![shared.clone(), cloud.clone()];
        let sync = Arc::new(FavoritesSync::with_options(
            stores,
            "favorites",
            Duration::from_millis(100),
            RefreshNotifier::default(),
        ));
        (shared, cloud, sync)
    }

    #[tokio::test]
    async fn test_external_change_triggers_reload() {
        let (shared, cloud, sync) = setup();
        let listeners = sync.listen();
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].store(), "cloud");

        let mut updates = sync.updates();
        let favorites: FavoritesList = ["apple", "banana"].into_iter().collect();
        cloud.inject_external("favorites", Some(favorites.clone()));

        tokio::time::timeout(Duration::from_secs(2), updates.changed())
            .await
            .expect("listener did not republish")
            .unwrap();
        assert_eq!(*updates.borrow_and_update(), favorites);
        // Resolve copied the remote list into the empty shared store.
        assert_eq!(shared.get("favorites").unwrap(), Some(favorites));
    }

    #[tokio::test]
    async fn test_unrelated_key_is_ignored() {
        let (_shared, cloud, sync) = setup();
        let _listeners = sync.listen();
        let mut updates = sync.updates();

        cloud.inject_external("recent", Some(["x"].into_iter().collect()));
        let waited = tokio::time::timeout(Duration::from_millis(200), updates.changed()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_dropping_listener_stops_reloads() {
        let (_shared, cloud, sync) = setup();
        let listeners = sync.listen();
        let mut updates = sync.updates();
        drop(listeners);
        tokio::task::yield_now().await;

        cloud.inject_external("favorites", Some(["late"].into_iter().collect()));
        let waited = tokio::time::timeout(Duration::from_millis(200), updates.changed()).await;
        assert!(waited.is_err());
    }
}
