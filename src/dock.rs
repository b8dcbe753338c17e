//! Usage ranking engine behind the most-used-apps dock.

use std::sync::Arc;

use anyhow::Result;
use log::info;

use crate::db::Database;
use crate::icon::{resolve_icon, IconCache};
use crate::model::{AppEntry, ComponentKey, UsageRecord};
use crate::registry::{ComponentRegistry, InstalledComponent};

/// Number of visible dock slots; the ranked list never exceeds it.
pub const DOCK_SLOTS: usize = 6;

/// Derives the bounded, ordered most-used list from the usage store.
///
/// Reads only; the single mutation it performs is deleting stale records
/// through the store when a ranked component no longer resolves.
pub struct DockRanker {
    db: Database,
    registry: Arc<dyn ComponentRegistry>,
    icons: Arc<IconCache>,
    icon_px: u32,
}

impl DockRanker {
    pub fn new(
        db: Database,
        registry: Arc<dyn ComponentRegistry>,
        icons: Arc<IconCache>,
        icon_px: u32,
    ) -> Self {
        Self {
            db,
            registry,
            icons,
            icon_px,
        }
    }

    /// Recompute the ranked dock entries.
    ///
    /// A row that no longer resolves to a live, OS-enabled component is
    /// deleted and the pass restarts: the limited query may admit a
    /// different trailing row once a stale one is gone. Loops until a pass
    /// completes without a deletion, so repeated calls with no intervening
    /// mutation return identical output.
    pub async fn update_applications(&self) -> Result<Vec<AppEntry>> {
        loop {
            let records = self.db.most_used(DOCK_SLOTS).await?;
            let mut entries = Vec::with_capacity(records.len());
            let mut deleted_stale = false;

            for record in records {
                match self.registry.resolve(&record.key) {
                    Some(component) if component.enabled => {
                        entries.push(self.to_entry(record, component).await);
                    }
                    _ => {
                        info!("removing stale usage record for {}", record.key);
                        self.db.delete_usage(record.key).await?;
                        deleted_stale = true;
                        break;
                    }
                }
            }

            if !deleted_stale {
                return Ok(entries);
            }
        }
    }

    /// Count a launch, then hand back the refreshed dock.
    pub async fn record_launch(&self, key: ComponentKey) -> Result<Vec<AppEntry>> {
        self.db.add_usage(key).await?;
        self.update_applications().await
    }

    pub async fn reset_usage(&self, key: ComponentKey) -> Result<Vec<AppEntry>> {
        self.db.reset_usage(key).await?;
        self.update_applications().await
    }

    pub async fn toggle_sticky(&self, key: ComponentKey) -> Result<Vec<AppEntry>> {
        self.db.toggle_sticky(key).await?;
        self.update_applications().await
    }

    pub async fn toggle_disabled(&self, key: ComponentKey) -> Result<Vec<AppEntry>> {
        self.db.toggle_disabled(key).await?;
        self.update_applications().await
    }

    async fn to_entry(&self, record: UsageRecord, component: InstalledComponent) -> AppEntry {
        let label = component
            .label
            .unwrap_or_else(|| record.key.class.clone());
        let icon = resolve_icon(
            &self.icons,
            self.icon_px,
            &record.key.cache_key(),
            component.icon,
        )
        .await;

        AppEntry {
            key: record.key,
            label,
            icon,
            disabled: record.disabled,
            sticky: record.sticky,
        }
    }
}
