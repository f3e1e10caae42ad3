//! Remote key-value store with an explicit synchronize round trip.
//!
//! Reads and writes hit a local replica. `synchronize` pushes dirty keys to
//! the shared cloud database (last writer wins) and pulls everything back.
//! Keys whose revision moved without a local write are announced to
//! subscribers as an external change.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::broadcast;

use super::{KeyValueStore, StoreChange, StoreKind};
use crate::db::{CloudEntry, Database};
use crate::error::{Result, SyncError};
use crate::favorites::FavoritesList;

const STORE_NAME: &str = "cloud";

#[derive(Default)]
struct Replica {
    values: HashMap<String, FavoritesList>,
    /// Last cloud revision seen per key.
    revisions: HashMap<String, i64>,
    /// Keys written locally since the last push. `None` in `values` = removed.
    dirty: HashSet<String>,
}

pub struct CloudStore {
    inner: Arc<Inner>,
}

/// State shared with the blocking round trip, which outlives a dropped
/// `synchronize` future.
struct Inner {
    device_id: String,
    backend: Arc<Database>,
    replica: Mutex<Replica>,
    /// One round trip at a time, so a late push never races a newer snapshot.
    sync_lock: Mutex<()>,
    changes: broadcast::Sender<StoreChange>,
}

/// Result of one push + pull against the backend.
struct RoundTrip {
    pushed: Vec<(String, Option<FavoritesList>, Option<i64>)>,
    entries: Vec<CloudEntry>,
}

impl CloudStore {
    /// Open the cloud database at `path` for this device.
    pub fn open(path: &Path, device_id: &str) -> Result<Self> {
        let backend = Database::open(path)
            .map_err(|e| SyncError::unavailable(STORE_NAME, e.to_string()))?;
        tracing::info!("Cloud store database: {}", path.display());
        Ok(Self::with_backend(Arc::new(backend), device_id))
    }

    /// Attach to an already open backend. Several devices may share one.
    pub fn with_backend(backend: Arc<Database>, device_id: &str) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                device_id: device_id.to_string(),
                backend,
                replica: Mutex::new(Replica::default()),
                sync_lock: Mutex::new(()),
                changes,
            }),
        }
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, Replica> {
        self.replica.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dirty_snapshot(&self) -> Vec<(String, Option<FavoritesList>)> {
        let replica = self.lock();
        replica
            .dirty
            .iter()
            .map(|key| (key.clone(), replica.values.get(key).cloned()))
            .collect()
    }

    /// Push, pull and merge in one blocking call. Runs to completion even if
    /// the caller stopped waiting.
    fn synchronize_blocking(&self) -> Result<()> {
        let _guard = self.sync_lock.lock().unwrap_or_else(|e| e.into_inner());
        let dirty = self.dirty_snapshot();
        let round_trip = self.round_trip(dirty)?;

        let pushed = round_trip.pushed.len();
        let changed = self.apply(round_trip);
        tracing::debug!(
            device = %self.device_id,
            pushed,
            changed = changed.len(),
            "Cloud synchronize completed"
        );

        if !changed.is_empty() {
            let _ = self.changes.send(StoreChange {
                store: STORE_NAME.to_string(),
                keys: changed,
            });
        }
        Ok(())
    }

    fn round_trip(&self, dirty: Vec<(String, Option<FavoritesList>)>) -> Result<RoundTrip> {
        let mut pushed = Vec::with_capacity(dirty.len());
        for (key, value) in dirty {
            let revision = match &value {
                Some(list) => Some(self.backend.put_value(&key, list, &self.device_id)?),
                None => {
                    self.backend.delete_value(&key)?;
                    None
                }
            };
            pushed.push((key, value, revision));
        }
        let entries = self.backend.all_entries()?;
        Ok(RoundTrip { pushed, entries })
    }

    /// Merge a completed round trip into the replica. Returns externally changed keys.
    fn apply(&self, round_trip: RoundTrip) -> Vec<String> {
        let mut replica = self.lock();

        for (key, value, revision) in round_trip.pushed {
            // Only settle keys that were not rewritten while the push was in flight.
            if replica.values.get(&key) == value.as_ref() {
                replica.dirty.remove(&key);
            }
            match revision {
                Some(rev) => replica.revisions.insert(key, rev),
                None => replica.revisions.remove(&key),
            };
        }

        let mut changed = Vec::new();
        let mut seen = HashSet::new();
        for entry in round_trip.entries {
            seen.insert(entry.key.clone());
            if replica.dirty.contains(&entry.key) {
                continue;
            }
            if replica.revisions.get(&entry.key) != Some(&entry.revision) {
                replica.revisions.insert(entry.key.clone(), entry.revision);
                replica.values.insert(entry.key.clone(), entry.value);
                changed.push(entry.key);
            }
        }

        let removed: Vec<String> = replica
            .revisions
            .keys()
            .filter(|key| !seen.contains(*key) && !replica.dirty.contains(*key))
            .cloned()
            .collect();
        for key in removed {
            replica.revisions.remove(&key);
            replica.values.remove(&key);
            changed.push(key);
        }

        changed
    }
}

impl KeyValueStore for CloudStore {
    fn name(&self) -> &str {
        STORE_NAME
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Remote
    }

    fn get(&self, key: &str) -> Result<Option<FavoritesList>> {
        Ok(self.inner.lock().values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &FavoritesList) -> Result<()> {
        let mut replica = self.inner.lock();
        replica.values.insert(key.to_string(), value.clone());
        replica.dirty.insert(key.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut replica = self.inner.lock();
        replica.values.remove(key);
        replica.dirty.insert(key.to_string());
        Ok(())
    }

    fn synchronize(&self) -> BoxFuture<'_, bool> {
        let inner = self.inner.clone();
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || inner.synchronize_blocking()).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::warn!("Cloud synchronize failed: {}", e);
                    false
                }
                Err(e) => {
                    tracing::warn!("Cloud synchronize task failed: {}", e);
                    false
                }
            }
        })
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StoreChange>> {
        Some(self.inner.changes.subscribe())
    }
}
