//! Home-screen launcher core: a usage-ranked dock, an application
//! directory, an icon cache, a widget lifecycle, and the SQLite usage
//! store backing them.
//!
//! The crate is platform-agnostic. The embedding shell supplies the two
//! OS-facing seams ([`registry::ComponentRegistry`] and
//! [`registry::WidgetHost`]) and wires everything together through
//! [`Launcher`].

pub mod db;
pub mod directory;
pub mod dock;
pub mod icon;
pub mod model;
pub mod registry;
pub mod settings;
pub mod widget;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio::sync::mpsc;

pub use db::Database;
pub use directory::{DirectoryScanner, DirectoryUpdate};
pub use dock::{DockRanker, DOCK_SLOTS};
pub use icon::IconCache;
pub use model::{AppEntry, ComponentKey, WidgetLayout};
pub use registry::{ComponentRegistry, WidgetHost, WidgetProvider};
pub use settings::{SettingsStore, WidgetSlot};
pub use widget::{WidgetCommand, WidgetLifecycle, WidgetState};

/// Install the default logger (reads RUST_LOG, defaults to info).
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

pub struct LauncherConfig {
    /// Directory holding the usage database and the settings file.
    pub data_dir: PathBuf,
    /// Display density scale factor (1.0 = baseline); drives the
    /// rendered icon size.
    pub display_density: f32,
}

/// Composition root. Owns every launcher subsystem and hands the
/// OS-facing seams to the pieces that need them.
pub struct Launcher {
    db: Database,
    icons: Arc<IconCache>,
    settings: Arc<SettingsStore>,
    dock: DockRanker,
    directory: DirectoryScanner,
    widget: WidgetLifecycle,
}

impl Launcher {
    pub fn new(
        config: LauncherConfig,
        registry: Arc<dyn ComponentRegistry>,
        host: Box<dyn WidgetHost>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let db = Database::new(config.data_dir.join("launcher.sqlite3"))?;
        let settings = Arc::new(SettingsStore::new(config.data_dir.join("settings.json"))?);
        let icons = Arc::new(IconCache::new());
        let icon_px = icon::icon_px(config.display_density);

        let dock = DockRanker::new(
            db.clone(),
            Arc::clone(&registry),
            Arc::clone(&icons),
            icon_px,
        );
        let directory = DirectoryScanner::new(
            db.clone(),
            Arc::clone(&registry),
            Arc::clone(&icons),
            icon_px,
        );
        let widget = WidgetLifecycle::new(host, Arc::clone(&settings));

        info!("launcher core ready, data dir {}", config.data_dir.display());

        Ok(Self {
            db,
            icons,
            settings,
            dock,
            directory,
            widget,
        })
    }

    pub fn dock(&self) -> &DockRanker {
        &self.dock
    }

    pub fn directory(&mut self) -> &mut DirectoryScanner {
        &mut self.directory
    }

    pub fn widget(&mut self) -> &mut WidgetLifecycle {
        &mut self.widget
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// React to an install, update, or removal reported by the host:
    /// cached icons may be stale, and the directory needs a rescan. The
    /// dock heals itself on its next update pass.
    pub fn on_packages_changed(&mut self, updates: mpsc::Sender<DirectoryUpdate>) {
        info!("package set changed, invalidating icons and rescanning");
        self.icons.invalidate();
        self.directory.refresh(updates);
    }

    pub async fn shutdown(&mut self) {
        self.directory.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fakes::{FakeComponentRegistry, FakeWidgetHost};
    use tempfile::TempDir;

    fn launcher(registry: Arc<FakeComponentRegistry>) -> (TempDir, Launcher) {
        let dir = TempDir::new().unwrap();
        let config = LauncherConfig {
            data_dir: dir.path().join("data"),
            display_density: 1.0,
        };
        let launcher = Launcher::new(config, registry, Box::new(FakeWidgetHost::new(true))).unwrap();
        (dir, launcher)
    }

    #[tokio::test]
    async fn launches_flow_from_dock_into_the_store() {
        let registry = Arc::new(FakeComponentRegistry::new());
        let key = registry.install_simple("pkg.mail", "Inbox");
        let (_dir, launcher) = launcher(registry);

        let dock = launcher.dock().record_launch(key.clone()).await.unwrap();
        assert_eq!(dock.len(), 1);
        assert_eq!(dock[0].key, key);
    }

    #[tokio::test]
    async fn package_change_triggers_a_fresh_directory_scan() {
        let registry = Arc::new(FakeComponentRegistry::new());
        registry.install_simple("pkg.a", "Main");
        let (_dir, mut launcher) = launcher(registry.clone());

        registry.install_simple("pkg.b", "Main");
        let (tx, mut rx) = mpsc::channel(16);
        launcher.on_packages_changed(tx);
        launcher.shutdown().await;

        let mut complete = None;
        while let Some(update) = rx.recv().await {
            if let DirectoryUpdate::Complete(entries) = update {
                complete = Some(entries);
            }
        }
        assert_eq!(complete.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn widget_slot_round_trips_through_settings() {
        let registry = Arc::new(FakeComponentRegistry::new());
        let (_dir, mut launcher) = launcher(registry);

        launcher.widget().set_layout(WidgetLayout::TopHalf).unwrap();
        assert_eq!(launcher.settings().widget_slot().layout, WidgetLayout::TopHalf);
    }
}
