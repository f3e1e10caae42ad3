//! Persistent sync settings.
//!
//! Settings are stored as JSON in the app data directory and survive restarts.
//! Every field has a serde default so older or partial files still load.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by the bridge, the watch companion and the widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// App group identifier naming the shared container (must start with `group.`).
    #[serde(default = "default_app_group_id")]
    pub app_group_id: String,

    /// Logical key the favorites list is stored under in every store.
    #[serde(default = "default_favorites_key")]
    pub favorites_key: String,

    /// Upper bound on a remote store's synchronize round trip.
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// Periodic re-render interval for passive surfaces.
    #[serde(default = "default_refresh_interval_minutes")]
    pub refresh_interval_minutes: u32,

    /// How many favorites the widget shows before collapsing into "+ N more".
    #[serde(default = "default_widget_max_items")]
    pub widget_max_items: usize,

    /// Method channel name the primary application calls into.
    #[serde(default = "default_storage_channel")]
    pub storage_channel: String,

    /// Root directory holding app group containers. `None` = platform data dir.
    #[serde(default)]
    pub container_root: Option<String>,

    /// SQLite file backing the cloud store. `None` = platform data dir.
    #[serde(default)]
    pub cloud_db_path: Option<String>,

    /// Identifies this device as a writer in the cloud store.
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

fn default_app_group_id() -> String {
    "group.com.livecast.flutterApp".into()
}
fn default_favorites_key() -> String {
    "favorites".into()
}
fn default_sync_timeout_ms() -> u64 {
    500
}
fn default_refresh_interval_minutes() -> u32 {
    5
}
fn default_widget_max_items() -> usize {
    5
}
fn default_storage_channel() -> String {
    "com.livecast.flutterApp/storage".into()
}
fn default_device_id() -> String {
    "local".into()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_group_id: default_app_group_id(),
            favorites_key: default_favorites_key(),
            sync_timeout_ms: default_sync_timeout_ms(),
            refresh_interval_minutes: default_refresh_interval_minutes(),
            widget_max_items: default_widget_max_items(),
            storage_channel: default_storage_channel(),
            container_root: None,
            cloud_db_path: None,
            device_id: default_device_id(),
        }
    }
}

/// Get the app data directory.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("com.livecast.favsync")
}

impl Settings {
    /// Load settings from a JSON file. Returns defaults if file doesn't exist.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse settings file: {} — using defaults", e);
                Self::default()
            }),
            Err(_) => {
                tracing::info!("No settings file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save settings to a JSON file.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.refresh_interval_minutes.max(1)) * 60)
    }

    /// Root directory under which app group containers live.
    pub fn container_root(&self) -> PathBuf {
        self.container_root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| app_data_dir().join("containers"))
    }

    pub fn cloud_db_path(&self) -> PathBuf {
        self.cloud_db_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| app_data_dir().join("ubiquity.db"))
    }
}
