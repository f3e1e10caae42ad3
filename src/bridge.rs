//! Storage bridge for the primary application.
//!
//! The cross-platform app calls `saveFavorites`, `loadFavorites` and
//! `clearFavorites` over a method channel. Only `save` can fail outward:
//! load and clear degrade to empty-list semantics.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::favorites::FavoritesList;
use crate::refresh::RefreshNotifier;
use crate::settings::Settings;
use crate::store::{StoreProfile, StoreSet};
use crate::sync::FavoritesSync;

pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
pub const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";

/// Error returned over the channel: a stable code plus a human message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct BridgeError {
    pub code: &'static str,
    pub message: String,
}

impl BridgeError {
    fn storage(message: impl Into<String>) -> Self {
        Self {
            code: STORAGE_ERROR,
            message: message.into(),
        }
    }

    fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_ARGUMENT,
            message: message.into(),
        }
    }
}

/// One call arriving on the storage channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: &str, arguments: Value) -> Self {
        Self {
            method: method.to_string(),
            arguments,
        }
    }
}

pub struct StorageBridge {
    sync: Arc<FavoritesSync>,
    channel: String,
    /// Whether the app group store, the one the widget reads, could be opened.
    primary_available: bool,
}

impl StorageBridge {
    pub fn new(stores: &StoreSet, settings: &Settings, notifier: RefreshNotifier) -> Self {
        let sync = FavoritesSync::new(stores.ordered(StoreProfile::App), settings, notifier);
        Self {
            sync: Arc::new(sync),
            channel: settings.storage_channel.clone(),
            primary_available: stores.primary(StoreProfile::App).is_some(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn sync(&self) -> &Arc<FavoritesSync> {
        &self.sync
    }

    pub async fn save(&self, favorites: &FavoritesList) -> Result<(), BridgeError> {
        if !self.primary_available {
            return Err(BridgeError::storage(
                "Failed to access app group. Check entitlements configuration.",
            ));
        }

        let report = self
            .sync
            .write(favorites)
            .await
            .map_err(|e| BridgeError::storage(e.to_string()))?;

        if !report.primary_accepted() {
            let reason = report
                .outcomes
                .first()
                .and_then(|o| o.error.clone())
                .unwrap_or_default();
            return Err(BridgeError::storage(format!(
                "Failed to write app group store: {}",
                reason
            )));
        }

        for failure in report.failures() {
            tracing::warn!(
                "Saved favorites, but '{}' did not accept them: {}",
                failure.store,
                failure.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }

    pub async fn load(&self) -> FavoritesList {
        self.sync.resolve().await
    }

    pub async fn clear(&self) {
        if let Err(e) = self.sync.clear().await {
            tracing::warn!("Failed to clear favorites: {}", e);
        }
    }

    /// Dispatch a raw method call.
    pub async fn handle(&self, call: MethodCall) -> Result<Value, BridgeError> {
        tracing::debug!("{} <- {}", self.channel, call.method);
        match call.method.as_str() {
            "saveFavorites" => {
                let favorites = call
                    .arguments
                    .get("favorites")
                    .ok_or_else(|| BridgeError::invalid_argument("Invalid arguments"))
                    .and_then(|value| {
                        FavoritesList::from_json(value)
                            .map_err(|e| BridgeError::invalid_argument(e.to_string()))
                    })?;
                self.save(&favorites).await?;
                Ok(Value::Null)
            }
            "loadFavorites" => Ok(self.load().await.to_json()),
            "clearFavorites" => {
                self.clear().await;
                Ok(Value::Null)
            }
            other => Err(BridgeError {
                code: NOT_IMPLEMENTED,
                message: format!("Method '{}' is not implemented", other),
            }),
        }
    }
}
