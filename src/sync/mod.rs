//! Favorites sync policy across prioritized stores.
//!
//! - **resolve** walks the stores in priority order and returns the first
//!   non-empty list, copying it back into any higher-priority store that came
//!   up empty or failed.
//! - **write** / **clear** hit every store independently; one acceptance is
//!   enough, the rest is reported.
//! - **on_external_change** re-resolves and republishes when a remote store
//!   changed out of process (driven by [`listener::ChangeListener`]).
//!
//! A failing store never fails a read. The worst case is an empty list.

pub mod listener;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::error::{Result, SyncError};
use crate::favorites::FavoritesList;
use crate::refresh::{RefreshNotifier, RefreshReason};
use crate::settings::Settings;
use crate::store::{KeyValueStore, StoreHandle, StoreKind};

pub use listener::ChangeListener;

/// Outcome of a bounded synchronize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Completed,
    /// The store answered but the round trip did not complete.
    Incomplete,
    TimedOut,
}

/// What a resolve found and where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub list: FavoritesList,
    /// Store the list came from; `None` when every store was empty.
    pub source: Option<String>,
    /// Higher-priority stores the list was copied back into.
    pub written_back: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreOutcome {
    pub store: String,
    /// `None` when the store accepted the operation.
    pub error: Option<String>,
}

impl StoreOutcome {
    pub fn accepted(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-store results of a write or clear, in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub outcomes: Vec<StoreOutcome>,
}

impl WriteReport {
    /// Whether the first-priority store accepted.
    pub fn primary_accepted(&self) -> bool {
        self.outcomes.first().is_some_and(StoreOutcome::accepted)
    }

    pub fn any_accepted(&self) -> bool {
        self.outcomes.iter().any(StoreOutcome::accepted)
    }

    pub fn accepted_by(&self, store: &str) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.store == store && o.accepted())
    }

    pub fn failures(&self) -> impl Iterator<Item = &StoreOutcome> {
        self.outcomes.iter().filter(|o| !o.accepted())
    }
}

/// Resolves, writes and clears the favorites list over an ordered set of stores.
pub struct FavoritesSync {
    stores: Vec<StoreHandle>,
    key: String,
    sync_timeout: Duration,
    notifier: RefreshNotifier,
    published: watch::Sender<FavoritesList>,
}

impl FavoritesSync {
    /// `stores` must already be in priority order, highest first.
    pub fn new(stores: Vec<StoreHandle>, settings: &Settings, notifier: RefreshNotifier) -> Self {
        Self::with_options(
            stores,
            &settings.favorites_key,
            settings.sync_timeout(),
            notifier,
        )
    }

    pub fn with_options(
        stores: Vec<StoreHandle>,
        key: &str,
        sync_timeout: Duration,
        notifier: RefreshNotifier,
    ) -> Self {
        let (published, _) = watch::channel(FavoritesList::empty());
        Self {
            stores,
            key: key.to_string(),
            sync_timeout,
            notifier,
            published,
        }
    }

    pub fn stores(&self) -> &[StoreHandle] {
        &self.stores
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn notifier(&self) -> &RefreshNotifier {
        &self.notifier
    }

    /// Lists republished after writes, clears and external changes.
    pub fn updates(&self) -> watch::Receiver<FavoritesList> {
        self.published.subscribe()
    }

    /// Subscribe to every store that reports external changes.
    ///
    /// Must be called inside a Tokio runtime. Dropping the returned listeners
    /// deregisters them.
    pub fn listen(self: &Arc<Self>) -> Vec<ChangeListener> {
        self.stores
            .iter()
            .filter_map(|store| {
                store
                    .subscribe()
                    .map(|rx| ChangeListener::spawn(self.clone(), store.name(), rx))
            })
            .collect()
    }

    /// The current favorites, or an empty list if no store has any.
    pub async fn resolve(&self) -> FavoritesList {
        self.resolve_detailed().await.list
    }

    pub async fn resolve_detailed(&self) -> Resolution {
        let mut missed: Vec<&StoreHandle> = Vec::new();

        for store in &self.stores {
            if store.kind() == StoreKind::Remote {
                self.synchronize_bounded(store.as_ref()).await;
            }

            match store.get(&self.key) {
                Ok(Some(list)) if !list.is_empty() => {
                    if missed.is_empty() {
                        tracing::info!(store = %store.name(), count = list.len(), "Loaded favorites");
                    } else {
                        tracing::info!(
                            store = %store.name(),
                            count = list.len(),
                            skipped = missed.len(),
                            "Loaded favorites from fallback store"
                        );
                    }
                    let written_back = self.write_back(&missed, &list).await;
                    return Resolution {
                        list,
                        source: Some(store.name().to_string()),
                        written_back,
                    };
                }
                Ok(_) => {
                    tracing::debug!(store = %store.name(), "No favorites in store");
                    missed.push(store);
                }
                Err(e) => {
                    tracing::warn!(store = %store.name(), "Failed to read favorites: {}", e);
                    missed.push(store);
                }
            }
        }

        tracing::info!("No favorites found in any store");
        Resolution::default()
    }

    /// Write `list` to every store. Fails only if no store accepted it.
    pub async fn write(&self, list: &FavoritesList) -> Result<WriteReport> {
        let report = self
            .apply_all("write", |store| store.set(&self.key, list))
            .await?;

        if report.primary_accepted() {
            tracing::info!(count = list.len(), "Saved favorites");
            self.publish(list.clone());
            self.notifier.request(RefreshReason::Saved);
        }
        Ok(report)
    }

    /// Remove the list from every store. Fails only if no store accepted.
    pub async fn clear(&self) -> Result<WriteReport> {
        let report = self
            .apply_all("clear", |store| store.remove(&self.key))
            .await?;

        if report.primary_accepted() {
            tracing::info!("Cleared favorites");
            self.publish(FavoritesList::empty());
            self.notifier.request(RefreshReason::Cleared);
        }
        Ok(report)
    }

    /// Reload after `store` changed out of process and push the result to surfaces.
    pub async fn on_external_change(&self, store: &str) -> FavoritesList {
        tracing::info!(store = %store, "Store changed externally, reloading favorites");
        let list = self.resolve().await;
        self.publish(list.clone());
        self.notifier.request(RefreshReason::ExternalChange);
        list
    }

    async fn apply_all<F>(&self, op: &str, f: F) -> Result<WriteReport>
    where
        F: Fn(&dyn KeyValueStore) -> Result<()>,
    {
        let mut outcomes = Vec::with_capacity(self.stores.len());

        for store in &self.stores {
            let error = match f(store.as_ref()) {
                Ok(()) => {
                    if store.kind() == StoreKind::Remote {
                        self.synchronize_bounded(store.as_ref()).await;
                    }
                    None
                }
                Err(e) => {
                    tracing::warn!(store = %store.name(), "Failed to {} favorites: {}", op, e);
                    Some(e.to_string())
                }
            };
            outcomes.push(StoreOutcome {
                store: store.name().to_string(),
                error,
            });
        }

        let report = WriteReport { outcomes };
        if !report.any_accepted() {
            tracing::error!("No store accepted the favorites {}", op);
            return Err(SyncError::NoStoreAccepted);
        }
        Ok(report)
    }

    async fn write_back(&self, targets: &[&StoreHandle], list: &FavoritesList) -> Vec<String> {
        let mut written = Vec::new();
        for store in targets {
            match store.set(&self.key, list) {
                Ok(()) => {
                    if store.kind() == StoreKind::Remote {
                        self.synchronize_bounded(store.as_ref()).await;
                    }
                    tracing::info!(store = %store.name(), count = list.len(), "Wrote favorites back");
                    written.push(store.name().to_string());
                }
                Err(e) => {
                    tracing::warn!(store = %store.name(), "Write-back failed: {}", e);
                }
            }
        }
        written
    }

    async fn synchronize_bounded(&self, store: &dyn KeyValueStore) -> SyncStatus {
        match tokio::time::timeout(self.sync_timeout, store.synchronize()).await {
            Ok(true) => {
                tracing::debug!(store = %store.name(), "Synchronize completed");
                SyncStatus::Completed
            }
            Ok(false) => {
                tracing::warn!(store = %store.name(), "Synchronize did not complete");
                SyncStatus::Incomplete
            }
            Err(_) => {
                let err = SyncError::StoreTimeout {
                    store: store.name().to_string(),
                    timeout_ms: self.sync_timeout.as_millis() as u64,
                };
                tracing::warn!("{}, using locally available data", err);
                SyncStatus::TimedOut
            }
        }
    }

    pub(crate) fn publish(&self, list: FavoritesList) {
        self.published.send_replace(list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const KEY: &str = "favorites";

    fn list(items: &[&str]) -> FavoritesList {
        items.iter().copied().collect()
    }

    struct Fixture {
        primary: Arc<MemoryStore>,
        secondary: Arc<MemoryStore>,
        sync: FavoritesSync,
    }

    fn fixture() -> Fixture {
        fixture_with_timeout(Duration::from_millis(500))
    }

    fn fixture_with_timeout(timeout: Duration) -> Fixture {
        let primary = Arc::new(MemoryStore::local("app-group"));
        let secondary = Arc::new(MemoryStore::remote("cloud"));
        let stores: Vec<StoreHandle> = vec![primary.clone(), secondary.clone()];
        let sync = FavoritesSync::with_options(stores, KEY, timeout, RefreshNotifier::default());
        Fixture {
            primary,
            secondary,
            sync,
        }
    }

    #[tokio::test]
    async fn test_write_then_resolve_returns_same_list() {
        let f = fixture();
        let favorites = list(&["pear", "apple", "pear"]);
        let report = f.sync.write(&favorites).await.unwrap();
        assert!(report.primary_accepted());
        assert_eq!(report.outcomes.len(), 2);

        assert_eq!(f.sync.resolve().await, favorites);
    }

    #[tokio::test]
    async fn test_write_clear_resolve_is_empty() {
        let f = fixture();
        f.sync.write(&list(&["alpha"])).await.unwrap();
        f.sync.clear().await.unwrap();

        assert!(f.sync.resolve().await.is_empty());
        assert_eq!(f.secondary.get(KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_fallback_writes_back_to_primary() {
        let f = fixture();
        let fruit = list(&["apple", "banana", "cherry"]);
        f.secondary.set(KEY, &fruit).unwrap();

        let resolution = f.sync.resolve_detailed().await;
        assert_eq!(resolution.list, fruit);
        assert_eq!(resolution.source.as_deref(), Some("cloud"));
        assert_eq!(resolution.written_back, ["app-group"]);
        assert_eq!(f.primary.get(KEY).unwrap(), Some(fruit));
    }

    #[tokio::test]
    async fn test_empty_list_in_primary_counts_as_missing() {
        let f = fixture();
        f.primary.set(KEY, &FavoritesList::empty()).unwrap();
        f.secondary.set(KEY, &list(&["fig"])).unwrap();

        assert_eq!(f.sync.resolve().await, list(&["fig"]));
        assert_eq!(f.primary.get(KEY).unwrap(), Some(list(&["fig"])));
    }

    #[tokio::test]
    async fn test_unreachable_primary_falls_back_without_error() {
        let f = fixture();
        f.secondary.set(KEY, &list(&["fig"])).unwrap();
        f.primary.set_reachable(false);

        let resolution = f.sync.resolve_detailed().await;
        assert_eq!(resolution.list, list(&["fig"]));
        // Write-back to an unreachable store is attempted and dropped.
        assert!(resolution.written_back.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_with_all_stores_empty() {
        let f = fixture();
        let resolution = f.sync.resolve_detailed().await;
        assert!(resolution.list.is_empty());
        assert!(resolution.source.is_none());
    }

    #[tokio::test]
    async fn test_resolve_with_no_stores() {
        let sync = FavoritesSync::with_options(
            Vec::new(),
            KEY,
            Duration::from_millis(10),
            RefreshNotifier::default(),
        );
        assert!(sync.resolve().await.is_empty());
        assert!(matches!(
            sync.write(&list(&["a"])).await,
            Err(SyncError::NoStoreAccepted)
        ));
    }

    #[tokio::test]
    async fn test_write_with_unreachable_secondary_succeeds() {
        let f = fixture();
        f.secondary.set_reachable(false);

        let report = f.sync.write(&list(&["alpha"])).await.unwrap();
        assert!(report.primary_accepted());
        assert!(!report.accepted_by("cloud"));
        let failures: Vec<_> = report.failures().map(|o| o.store.as_str()).collect();
        assert_eq!(failures, ["cloud"]);
        assert_eq!(f.primary.get(KEY).unwrap(), Some(list(&["alpha"])));
    }

    #[tokio::test]
    async fn test_write_fails_when_every_store_rejects() {
        let f = fixture();
        f.primary.set_reachable(false);
        f.secondary.set_reachable(false);
        assert!(matches!(
            f.sync.write(&list(&["alpha"])).await,
            Err(SyncError::NoStoreAccepted)
        ));
    }

    #[tokio::test]
    async fn test_sync_timeout_returns_local_data_promptly() {
        // Watch ordering: remote first, local fallback.
        let remote = Arc::new(MemoryStore::remote("cloud"));
        let local = Arc::new(MemoryStore::local("app-group"));
        remote.set_sync_delay(Some(Duration::from_secs(30)));
        local.set(KEY, &list(&["local"])).unwrap();

        let stores: Vec<StoreHandle> = vec![remote.clone(), local.clone()];
        let sync = FavoritesSync::with_options(
            stores,
            KEY,
            Duration::from_millis(50),
            RefreshNotifier::default(),
        );

        let started = std::time::Instant::now();
        let resolution = sync.resolve_detailed().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(resolution.list, list(&["local"]));
        assert_eq!(resolution.source.as_deref(), Some("app-group"));

        // The slow remote still receives the write-back.
        assert_eq!(resolution.written_back, ["cloud"]);
        assert_eq!(remote.get(KEY).unwrap(), Some(list(&["local"])));
    }

    #[tokio::test]
    async fn test_sync_timeout_still_reads_remote_cache() {
        let f = fixture_with_timeout(Duration::from_millis(50));
        f.secondary.set_sync_delay(Some(Duration::from_secs(30)));
        f.secondary.set(KEY, &list(&["cached"])).unwrap();

        let started = std::time::Instant::now();
        assert_eq!(f.sync.resolve().await, list(&["cached"]));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_write_and_clear_request_refresh() {
        let f = fixture();
        let mut refresh = f.sync.notifier().subscribe();
        let mut updates = f.sync.updates();

        f.sync.write(&list(&["alpha"])).await.unwrap();
        assert_eq!(refresh.recv().await.unwrap().reason, RefreshReason::Saved);
        assert!(updates.has_changed().unwrap());
        assert_eq!(*updates.borrow_and_update(), list(&["alpha"]));

        f.sync.clear().await.unwrap();
        assert_eq!(refresh.recv().await.unwrap().reason, RefreshReason::Cleared);
        assert!(updates.borrow_and_update().is_empty());
    }

    #[tokio::test]
    async fn test_no_refresh_when_primary_rejects() {
        let f = fixture();
        f.primary.set_reachable(false);
        let mut refresh = f.sync.notifier().subscribe();

        let report = f.sync.write(&list(&["alpha"])).await.unwrap();
        assert!(!report.primary_accepted());
        assert!(report.accepted_by("cloud"));
        assert!(refresh.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_external_change_republishes() {
        let f = fixture();
        let mut updates = f.sync.updates();
        f.secondary.inject_external(KEY, Some(list(&["from", "watch"])));

        let list_now = f.sync.on_external_change("cloud").await;
        assert_eq!(list_now, list(&["from", "watch"]));
        assert!(updates.has_changed().unwrap());
        assert_eq!(*updates.borrow_and_update(), list(&["from", "watch"]));
    }
}
