pub mod bridge;
pub mod db;
pub mod error;
pub mod favorites;
pub mod refresh;
pub mod settings;
pub mod store;
pub mod surfaces;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

pub use error::{Result, SyncError};
pub use favorites::FavoritesList;
pub use settings::Settings;

use bridge::StorageBridge;
use refresh::RefreshNotifier;
use store::{StoreProfile, StoreSet};
use sync::FavoritesSync;

/// Initialize logging. `RUST_LOG` overrides the default `favsync=info`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("favsync=info,favsync_lib=info")),
        )
        .try_init();
}

/// Get the default settings path.
pub fn settings_path() -> PathBuf {
    settings::app_data_dir().join("settings.json")
}

/// State shared by the bridge and every surface of one process.
pub struct FavoritesApp {
    pub settings: Settings,
    pub stores: StoreSet,
    pub notifier: RefreshNotifier,
}

impl FavoritesApp {
    /// Open the stores described by `settings`. Never fails: unavailable
    /// stores are logged and skipped.
    pub fn bootstrap(settings: Settings) -> Self {
        tracing::info!("Starting favsync v{}", env!("CARGO_PKG_VERSION"));
        let stores = StoreSet::open(&settings);
        tracing::info!(
            "Stores available: app group = {}, cloud = {}",
            stores.shared.is_some(),
            stores.cloud.is_some()
        );
        Self::with_stores(settings, stores)
    }

    pub fn with_stores(settings: Settings, stores: StoreSet) -> Self {
        Self {
            settings,
            stores,
            notifier: RefreshNotifier::default(),
        }
    }

    /// Sync policy with the store priority of `profile`.
    pub fn sync_for(&self, profile: StoreProfile) -> Arc<FavoritesSync> {
        Arc::new(FavoritesSync::new(
            self.stores.ordered(profile),
            &self.settings,
            self.notifier.clone(),
        ))
    }

    pub fn bridge(&self) -> StorageBridge {
        StorageBridge::new(&self.stores, &self.settings, self.notifier.clone())
    }
}
