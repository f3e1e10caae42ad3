use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use favsync_lib::store::StoreProfile;
use favsync_lib::surfaces::{DisplaySurface, ListView, SurfaceDriver};
use favsync_lib::{FavoritesApp, FavoritesList, Settings};

#[derive(Parser)]
#[command(name = "favsync", version, about = "Favorites list sync for companion surfaces")]
struct Cli {
    /// Settings file (defaults to the app data directory).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Store priority to read with: app, watch or widget.
    #[arg(long, global = true, default_value = "app")]
    profile: StoreProfile,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save the favorites list through the storage bridge.
    Save { items: Vec<String> },
    /// Print the resolved favorites list as JSON.
    Load,
    /// Clear the favorites list from every store.
    Clear,
    /// Keep a list rendered, reloading on external changes, until Ctrl-C.
    Watch,
}

/// Prints the watch list view to stdout on every render.
struct ConsoleSurface;

impl DisplaySurface for ConsoleSurface {
    fn name(&self) -> &str {
        "console"
    }

    fn render(&self, favorites: &FavoritesList) {
        let view = ListView::from_list(favorites);
        if view.is_empty() {
            println!("No favorites yet");
            return;
        }
        for title in &view.titles {
            println!("* {}", title);
        }
        println!("{}", view.footer);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    favsync_lib::init_logging();
    let cli = Cli::parse();

    let settings_path = cli.settings.unwrap_or_else(favsync_lib::settings_path);
    let settings = Settings::load(&settings_path);
    let app = FavoritesApp::bootstrap(settings);

    match cli.command {
        Command::Save { items } => {
            let favorites = FavoritesList::new(items);
            app.bridge().save(&favorites).await?;
            println!("Saved {} favorites", favorites.len());
        }
        Command::Load => {
            let favorites = app.sync_for(cli.profile).resolve().await;
            println!("{}", serde_json::to_string(&favorites)?);
        }
        Command::Clear => {
            app.bridge().clear().await;
            println!("Cleared favorites");
        }
        Command::Watch => {
            let sync = app.sync_for(cli.profile);
            let _listeners = sync.listen();
            let _driver = SurfaceDriver::spawn(
                Arc::new(ConsoleSurface),
                sync,
                app.settings.refresh_interval(),
            );
            tokio::signal::ctrl_c().await?;
        }
    }

    Ok(())
}
