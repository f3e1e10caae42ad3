//! Passive display surfaces: the home-screen widget and the watch list.
//!
//! Surfaces only read. A [`SurfaceDriver`] renders once on appearance, again
//! on every refresh request, and on a periodic timer as a safety net. The
//! view models here carry data only; layout belongs to the host UI.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::favorites::FavoritesList;
use crate::sync::FavoritesSync;

/// Upper-case the first letter of every word, lower-case the rest.
pub fn capitalize_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

/// One widget timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetEntry {
    pub date: DateTime<Utc>,
    pub favorites: FavoritesList,
    /// Capitalized titles of the items that fit.
    pub visible: Vec<String>,
    /// Items not shown ("+ N more").
    pub overflow: usize,
    /// When the host should render the next entry.
    pub next_refresh: DateTime<Utc>,
}

impl WidgetEntry {
    pub fn from_list(
        favorites: FavoritesList,
        now: DateTime<Utc>,
        max_items: usize,
        refresh_interval: Duration,
    ) -> Self {
        let visible: Vec<String> = favorites
            .iter()
            .take(max_items)
            .map(|f| capitalize_words(f))
            .collect();
        let overflow = favorites.len().saturating_sub(visible.len());
        let interval =
            chrono::Duration::from_std(refresh_interval).unwrap_or_else(|_| chrono::Duration::minutes(5));
        Self {
            date: now,
            favorites,
            visible,
            overflow,
            next_refresh: now + interval,
        }
    }

    /// Entry shown while the real data is loading.
    pub fn placeholder(now: DateTime<Utc>) -> Self {
        Self::from_list(
            ["apple", "banana", "cherry"].into_iter().collect(),
            now,
            5,
            Duration::from_secs(300),
        )
    }

    pub fn overflow_label(&self) -> Option<String> {
        (self.overflow > 0).then(|| format!("+ {} more", self.overflow))
    }
}

/// The watch companion's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListView {
    pub titles: Vec<String>,
    pub footer: String,
}

impl ListView {
    pub fn from_list(favorites: &FavoritesList) -> Self {
        let count = favorites.len();
        Self {
            titles: favorites.iter().map(|f| capitalize_words(f)).collect(),
            footer: format!("{} favorite{}", count, if count == 1 { "" } else { "s" }),
        }
    }

    /// Whether to show the "No favorites yet" empty state.
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// Something that re-renders the favorites list. Never writes.
pub trait DisplaySurface: Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, favorites: &FavoritesList);
}

/// Home-screen widget keeping its latest timeline entry.
pub struct WidgetSurface {
    max_items: usize,
    refresh_interval: Duration,
    latest: Mutex<Option<WidgetEntry>>,
}

impl WidgetSurface {
    pub fn new(max_items: usize, refresh_interval: Duration) -> Self {
        Self {
            max_items,
            refresh_interval,
            latest: Mutex::new(None),
        }
    }

    /// The latest entry, or the placeholder before the first render.
    pub fn entry(&self) -> WidgetEntry {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(|| WidgetEntry::placeholder(Utc::now()))
    }
}

impl DisplaySurface for WidgetSurface {
    fn name(&self) -> &str {
        "widget"
    }

    fn render(&self, favorites: &FavoritesList) {
        let entry = WidgetEntry::from_list(
            favorites.clone(),
            Utc::now(),
            self.max_items,
            self.refresh_interval,
        );
        tracing::debug!(count = favorites.len(), "Widget entry updated");
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(entry);
    }
}

/// Watch list keeping its latest view. `None` until the first load finishes.
#[derive(Default)]
pub struct ListSurface {
    latest: Mutex<Option<ListView>>,
}

impl ListSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> Option<ListView> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_loading(&self) -> bool {
        self.view().is_none()
    }
}

impl DisplaySurface for ListSurface {
    fn name(&self) -> &str {
        "watch-list"
    }

    fn render(&self, favorites: &FavoritesList) {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(ListView::from_list(favorites));
    }
}

/// Pull the current list and render it (appearance, pull-to-refresh).
pub async fn refresh(surface: &dyn DisplaySurface, sync: &FavoritesSync) -> FavoritesList {
    let favorites = sync.resolve().await;
    surface.render(&favorites);
    favorites
}

/// Keeps a surface rendered for as long as the handle is alive.
pub struct SurfaceDriver {
    task: JoinHandle<()>,
}

impl SurfaceDriver {
    /// Must be called inside a Tokio runtime.
    pub fn spawn(
        surface: Arc<dyn DisplaySurface>,
        sync: Arc<FavoritesSync>,
        refresh_interval: Duration,
    ) -> Self {
        let mut requests = sync.notifier().subscribe();
        let mut updates = sync.updates();

        let task = tokio::spawn(async move {
            // First tick fires immediately: render on appearance.
            let mut timer = tokio::time::interval(refresh_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut updates_open = true;

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        refresh(surface.as_ref(), &sync).await;
                    }
                    changed = updates.changed(), if updates_open => match changed {
                        Ok(()) => {
                            let favorites = updates.borrow_and_update().clone();
                            tracing::debug!("{} rendering republished list", surface.name());
                            surface.render(&favorites);
                        }
                        Err(_) => updates_open = false,
                    },
                    request = requests.recv() => match request {
                        Ok(request) => {
                            tracing::debug!("{} refreshing ({:?})", surface.name(), request.reason);
                            refresh(surface.as_ref(), &sync).await;
                        }
                        Err(RecvError::Lagged(_)) => {
                            refresh(surface.as_ref(), &sync).await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        Self { task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SurfaceDriver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::RefreshNotifier;
    use crate::store::{KeyValueStore, MemoryStore, StoreHandle};

    fn list(items: &[&str]) -> FavoritesList {
        items.iter().copied().collect()
    }

    #[test]
    fn test_capitalize_words() {
        assert_eq!(capitalize_words("apple"), "Apple");
        assert_eq!(capitalize_words("green APPLE pie"), "Green Apple Pie");
        assert_eq!(capitalize_words("rock-n-roll"), "Rock-N-Roll");
        assert_eq!(capitalize_words(""), "");
    }

    #[test]
    fn test_widget_entry_overflow() {
        let now = Utc::now();
        let entry = WidgetEntry::from_list(
            list(&["a", "b", "c", "d", "e", "f", "g"]),
            now,
            5,
            Duration::from_secs(300),
        );
        assert_eq!(entry.visible, ["A", "B", "C", "D", "E"]);
        assert_eq!(entry.overflow, 2);
        assert_eq!(entry.overflow_label().as_deref(), Some("+ 2 more"));
        assert_eq!(entry.next_refresh - now, chrono::Duration::minutes(5));
    }

    #[test]
    fn test_widget_entry_fits() {
        let entry = WidgetEntry::from_list(list(&["kiwi"]), Utc::now(), 5, Duration::from_secs(60));
        assert_eq!(entry.overflow, 0);
        assert!(entry.overflow_label().is_none());
    }

    #[test]
    fn test_placeholder() {
        let entry = WidgetSurface::new(5, Duration::from_secs(300)).entry();
        assert_eq!(entry.favorites, list(&["apple", "banana", "cherry"]));
    }

    #[test]
    fn test_list_view_footer() {
        assert_eq!(ListView::from_list(&list(&["a"])).footer, "1 favorite");
        let view = ListView::from_list(&list(&["a", "a"]));
        assert_eq!(view.footer, "2 favorites");
        assert_eq!(view.titles, ["A", "A"]);
        assert!(ListView::from_list(&FavoritesList::empty()).is_empty());
    }

    #[tokio::test]
    async fn test_driver_renders_on_start_and_on_refresh() {
        let shared = Arc::new(MemoryStore::local("app-group"));
        let stores: Vec<StoreHandle> = vec![shared.clone()];
        let sync = Arc::new(FavoritesSync::with_options(
            stores,
            "favorites",
            Duration::from_millis(100),
            RefreshNotifier::default(),
        ));
        shared.set("favorites", &list(&["first"])).unwrap();

        let surface = Arc::new(ListSurface::new());
        assert!(surface.is_loading());
        let _driver = SurfaceDriver::spawn(surface.clone(), sync.clone(), Duration::from_secs(3600));

        wait_for(|| surface.view().map(|v| v.titles) == Some(vec!["First".to_string()])).await;

        sync.write(&list(&["second", "third"])).await.unwrap();
        wait_for(|| surface.view().map(|v| v.footer) == Some("2 favorites".to_string())).await;
    }

    #[tokio::test]
    async fn test_driver_renders_republished_list() {
        let stores: Vec<StoreHandle> = vec![Arc::new(MemoryStore::local("app-group"))];
        let sync = Arc::new(FavoritesSync::with_options(
            stores,
            "favorites",
            Duration::from_millis(100),
            RefreshNotifier::default(),
        ));

        let surface = Arc::new(ListSurface::new());
        let _driver = SurfaceDriver::spawn(surface.clone(), sync.clone(), Duration::from_secs(3600));
        wait_for(|| surface.view().is_some_and(|v| v.is_empty())).await;

        // Published without touching any store or sending a refresh request.
        sync.publish(list(&["pushed"]));
        wait_for(|| surface.view().map(|v| v.titles) == Some(vec!["Pushed".to_string()])).await;
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
