//! Key-value stores the favorites list is persisted in.
//!
//! Three backends implement [`KeyValueStore`]:
//! 1. **Shared container**: app group store read by the widget and the watch
//! 2. **Cloud**: remote store with an explicit `synchronize` round trip
//! 3. **Memory**: in-process store for embedding hosts and tests
//!
//! Stores are passed around as [`StoreHandle`]s. Their priority order depends
//! on who is reading, see [`StoreProfile`].

pub mod cloud;
pub mod memory;
pub mod shared;

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::favorites::FavoritesList;
use crate::settings::Settings;

pub use cloud::CloudStore;
pub use memory::MemoryStore;
pub use shared::SharedContainerStore;

/// Where a store keeps its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum StoreKind {
    /// Same-device storage, reads are always fresh.
    Local,
    /// Replicated storage; reads are only fresh after `synchronize`.
    Remote,
}

/// Out-of-process change reported by a remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub store: String,
    /// Keys that changed. Empty means "unknown, assume everything".
    pub keys: Vec<String>,
}

impl StoreChange {
    pub fn touches(&self, key: &str) -> bool {
        self.keys.is_empty() || self.keys.iter().any(|k| k == key)
    }
}

/// A named key-value store holding string lists.
///
/// Implementations serialize their own access; callers never lock across stores.
pub trait KeyValueStore: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> StoreKind;

    fn get(&self, key: &str) -> Result<Option<FavoritesList>>;

    fn set(&self, key: &str, value: &FavoritesList) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Force a remote round trip. Returns whether it completed.
    /// Local stores have nothing to do and report success.
    fn synchronize(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }

    /// Subscribe to out-of-process changes. `None` if the store never reports any.
    fn subscribe(&self) -> Option<broadcast::Receiver<StoreChange>> {
        None
    }
}

pub type StoreHandle = Arc<dyn KeyValueStore>;

/// Which consumer is reading, deciding the store priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreProfile {
    /// Primary application: shared container first, cloud second.
    App,
    /// Watch companion: cloud first, shared container as fallback.
    Watch,
    /// Home-screen widget: shared container only.
    Widget,
}

impl std::fmt::Display for StoreProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreProfile::App => write!(f, "app"),
            StoreProfile::Watch => write!(f, "watch"),
            StoreProfile::Widget => write!(f, "widget"),
        }
    }
}

impl std::str::FromStr for StoreProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "app" => Ok(StoreProfile::App),
            "watch" => Ok(StoreProfile::Watch),
            "widget" => Ok(StoreProfile::Widget),
            other => Err(format!("unknown profile '{}'", other)),
        }
    }
}

/// The stores available on this device. A store that failed to open is `None`.
#[derive(Clone, Default)]
pub struct StoreSet {
    pub shared: Option<StoreHandle>,
    pub cloud: Option<StoreHandle>,
}

impl StoreSet {
    /// Open the shared container and cloud stores described by `settings`.
    ///
    /// Failures are logged and leave the slot empty; readers then fall back.
    pub fn open(settings: &Settings) -> Self {
        let shared = match SharedContainerStore::open(&settings.container_root(), &settings.app_group_id)
        {
            Ok(store) => {
                tracing::info!("Using app group store: {}", settings.app_group_id);
                Some(Arc::new(store) as StoreHandle)
            }
            Err(e) => {
                tracing::error!("{}", e);
                tracing::error!("Make sure the app group is configured for every target");
                None
            }
        };

        let cloud = match CloudStore::open(&settings.cloud_db_path(), &settings.device_id) {
            Ok(store) => Some(Arc::new(store) as StoreHandle),
            Err(e) => {
                tracing::warn!("Cloud store unavailable: {}", e);
                None
            }
        };

        Self { shared, cloud }
    }

    /// The store a profile treats as authoritative, if it could be opened.
    pub fn primary(&self, profile: StoreProfile) -> Option<&StoreHandle> {
        match profile {
            StoreProfile::App | StoreProfile::Widget => self.shared.as_ref(),
            StoreProfile::Watch => self.cloud.as_ref(),
        }
    }

    /// Available stores in priority order for `profile`.
    pub fn ordered(&self, profile: StoreProfile) -> Vec<StoreHandle> {
        let order = match profile {
            StoreProfile::App => vec![&self.shared, &self.cloud],
            StoreProfile::Watch => vec![&self.cloud, &self.shared],
            StoreProfile::Widget => vec![&self.shared],
        };
        order.into_iter().flatten().cloned().collect()
    }
}
