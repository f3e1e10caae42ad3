//! App group store: a JSON defaults file inside the shared container.
//!
//! The widget and watch extensions read the same file from their own
//! processes, so every `get` goes back to disk instead of caching.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{KeyValueStore, StoreKind};
use crate::error::{Result, SyncError};
use crate::favorites::FavoritesList;

const STORE_NAME: &str = "app-group";
const DEFAULTS_FILE: &str = "shared_defaults.json";

type Defaults = BTreeMap<String, serde_json::Value>;

pub struct SharedContainerStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl SharedContainerStore {
    /// Open the container for `app_group_id` under `container_root`.
    pub fn open(container_root: &Path, app_group_id: &str) -> Result<Self> {
        let valid = app_group_id
            .strip_prefix("group.")
            .is_some_and(|rest| !rest.is_empty() && !rest.contains(['/', '\\']));
        if !valid {
            return Err(SyncError::unavailable(
                STORE_NAME,
                format!("invalid app group id '{}'", app_group_id),
            ));
        }

        let container = container_root.join(app_group_id);
        std::fs::create_dir_all(&container).map_err(|e| {
            SyncError::unavailable(
                STORE_NAME,
                format!("cannot open container {}: {}", container.display(), e),
            )
        })?;

        Ok(Self {
            path: container.join(DEFAULTS_FILE),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_defaults(&self) -> Result<Defaults> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Defaults::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Defaults::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_defaults(&self, defaults: &Defaults) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        // Unique temp file per writer; other processes share this container.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, defaults)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Read-modify-write. A corrupt file is set aside and replaced so writes
    /// keep working.
    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Defaults),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut defaults = match self.read_defaults() {
            Ok(defaults) => defaults,
            Err(SyncError::Json(e)) => {
                let backup = self.path.with_extension("json.corrupt");
                tracing::warn!(
                    "App group defaults unreadable ({}), starting over; old file kept at {}",
                    e,
                    backup.display()
                );
                if let Err(e) = std::fs::copy(&self.path, &backup) {
                    tracing::warn!("Could not back up app group defaults: {}", e);
                }
                Defaults::new()
            }
            Err(e) => return Err(e),
        };
        f(&mut defaults);
        self.write_defaults(&defaults)
    }
}

impl KeyValueStore for SharedContainerStore {
    fn name(&self) -> &str {
        STORE_NAME
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Local
    }

    fn get(&self, key: &str) -> Result<Option<FavoritesList>> {
        let defaults = self.read_defaults()?;
        match defaults.get(key) {
            None => Ok(None),
            Some(value) => match FavoritesList::from_json(value) {
                Ok(list) => Ok(Some(list)),
                Err(e) => {
                    tracing::warn!("Ignoring non-list value for '{}' in app group: {}", key, e);
                    Ok(None)
                }
            },
        }
    }

    fn set(&self, key: &str, value: &FavoritesList) -> Result<()> {
        self.update(|defaults| {
            defaults.insert(key.to_string(), value.to_json());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|defaults| {
            defaults.remove(key);
        })
    }
}
